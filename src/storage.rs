/// The append-only audit log of processed requests.
pub mod audit_log;
mod desk;
pub mod employees;
/// Notification delivery to a local outbox file.
pub mod outbox;
pub mod queue_file;

pub use audit_log::{AuditLog, ParseError, Replay};
pub use desk::{Desk, DeskError, STATE_DIR, Snapshot};
pub use employees::{DirectoryError, EmployeeDirectory};
pub use outbox::Outbox;
pub use queue_file::{QueueFileError, SavedQueue};
