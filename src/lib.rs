//! Employee Service Request Desk
//!
//! Requests are queued by priority and age, processed into an append-only
//! audit log, and every queue operation can be undone and redone.

pub mod domain;
pub use domain::{
    Category, Config, Disposition, Priority, RejectionReason, ReversibleQueue, Statistics,
    SubjectId, Ticket, TicketId,
};

/// Filesystem storage for the queue, audit log and collaborators.
pub mod storage;
pub use storage::{Desk, DeskError};
