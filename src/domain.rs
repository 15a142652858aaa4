//! Domain models for request processing.
//!
//! This module contains the filesystem-agnostic core: tickets, the ordering
//! policy, the reversible queue, the lifecycle processor and statistics.

/// Ticket data types and field validation.
pub mod ticket;
pub use ticket::{
    Category, Disposition, FieldError, Priority, RejectionReason, Status, SubjectId, Ticket,
    TicketId,
};

pub mod ordering;

pub mod queue;
pub use queue::{Operation, QueueError, ReversibleQueue, TicketFilter};

pub mod lifecycle;
pub use lifecycle::{
    AuditSink, Contact, ContactDirectory, DispositionRecord, Notification, Notifier, NotifyError,
    ProcessError, Processed, Processor, Selection,
};

pub mod stats;
pub use stats::{Bucket, Statistics};

mod config;
pub use config::Config;
