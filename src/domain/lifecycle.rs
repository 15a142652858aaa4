//! Moving tickets from the queue to a terminal disposition.
//!
//! [`Processor`] is the only place a ticket changes status. It works against
//! three collaborators supplied by the caller: an [`AuditSink`] that durably
//! records the outcome, a [`ContactDirectory`] and a [`Notifier`]. The audit
//! append happens before anything else is touched, so a failed append leaves
//! the queue and statistics exactly as they were. Notification comes last and
//! is best-effort.

use std::io;

use chrono::{DateTime, Utc};
use tracing::instrument;

use crate::domain::{
    Category, Disposition, Priority, QueueError, ReversibleQueue, Statistics, SubjectId, Ticket,
    TicketId, ticket::AlreadyResolved,
};

/// One terminal disposition, as written to and read from the audit log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispositionRecord {
    /// When the disposition was made.
    pub logged_at: DateTime<Utc>,
    /// The outcome.
    pub disposition: Disposition,
    /// The ticket's id, when known. Older log lines may not carry it.
    pub ticket: Option<TicketId>,
    /// The requester.
    pub subject: SubjectId,
    /// The ticket's category.
    pub category: Category,
    /// The ticket's priority.
    pub priority: Priority,
    /// The ticket's description.
    pub details: String,
    /// When the ticket was originally submitted.
    pub created_at: DateTime<Utc>,
}

impl DispositionRecord {
    /// Builds the record for a resolved ticket.
    #[must_use]
    pub fn new(ticket: &Ticket, disposition: Disposition, logged_at: DateTime<Utc>) -> Self {
        Self {
            logged_at,
            disposition,
            ticket: Some(ticket.id()),
            subject: ticket.subject(),
            category: ticket.category().clone(),
            priority: ticket.priority(),
            details: ticket.details().to_string(),
            created_at: ticket.created_at(),
        }
    }
}

/// Durable storage for disposition records.
pub trait AuditSink {
    /// Appends one record.
    ///
    /// The record must be fully persisted when this returns `Ok`; a reader
    /// must never observe part of it.
    ///
    /// # Errors
    ///
    /// Returns any I/O error raised while opening or writing the store.
    fn append(&self, record: &DispositionRecord) -> io::Result<()>;
}

/// Contact details for an employee.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Contact {
    /// Display name.
    pub name: String,
    /// Email address.
    pub email: String,
}

/// Looks up who to notify about a ticket.
pub trait ContactDirectory {
    /// Returns the contact for an employee, or `None` if unknown.
    fn find_contact(&self, subject: SubjectId) -> Option<Contact>;
}

/// Delivers messages to employees.
pub trait Notifier {
    /// Sends one message.
    ///
    /// # Errors
    ///
    /// Returns [`NotifyError`] describing why delivery failed.
    fn notify(&self, contact: &Contact, subject: &str, body: &str) -> Result<(), NotifyError>;
}

/// Why a notification could not be delivered.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("{0}")]
pub struct NotifyError(pub String);

/// Which pending ticket to process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    /// The most urgent pending ticket.
    Next,
    /// A specific pending ticket.
    Ticket(TicketId),
}

/// What happened to the notification for a disposition.
#[derive(Debug, PartialEq, Eq)]
pub enum Notification {
    /// The message was delivered.
    Sent,
    /// Notifications are switched off.
    Disabled,
    /// The directory has no contact for the requester.
    NoContact,
    /// Delivery failed.
    Failed(NotifyError),
}

/// The result of processing a ticket.
#[derive(Debug)]
pub struct Processed {
    /// The ticket in its terminal state.
    pub ticket: Ticket,
    /// The record appended to the audit log.
    pub record: DispositionRecord,
    /// Outcome of the best-effort notification.
    pub notification: Notification,
}

/// Errors that abort processing. The ticket stays pending when these occur.
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    /// The ticket could not be selected.
    #[error(transparent)]
    Queue(#[from] QueueError),
    /// The ticket was not pending.
    #[error(transparent)]
    AlreadyResolved(#[from] AlreadyResolved),
    /// The audit log could not be written, so the disposition did not happen.
    #[error("failed to append to the audit log; the request remains pending")]
    Log(#[source] io::Error),
}

/// Drives tickets from pending to their terminal disposition.
pub struct Processor<'a> {
    sink: &'a dyn AuditSink,
    directory: &'a dyn ContactDirectory,
    notifier: Option<&'a dyn Notifier>,
}

impl<'a> Processor<'a> {
    /// Creates a processor. Pass `None` as the notifier to skip
    /// notifications.
    #[must_use]
    pub fn new(
        sink: &'a dyn AuditSink,
        directory: &'a dyn ContactDirectory,
        notifier: Option<&'a dyn Notifier>,
    ) -> Self {
        Self {
            sink,
            directory,
            notifier,
        }
    }

    /// Applies a disposition to a pending ticket.
    ///
    /// In order: the ticket is resolved, the audit record appended, the
    /// ticket removed from the queue (a normal, undoable removal), the
    /// statistics updated and finally the requester notified.
    ///
    /// # Errors
    ///
    /// - [`ProcessError::Queue`] if the selected ticket is not pending.
    /// - [`ProcessError::Log`] if the audit record could not be appended. No
    ///   state has changed in that case.
    #[instrument(level = "debug", skip(self, queue, stats))]
    pub fn process(
        &self,
        queue: &mut ReversibleQueue,
        stats: &mut Statistics,
        selection: Selection,
        disposition: Disposition,
        now: DateTime<Utc>,
    ) -> Result<Processed, ProcessError> {
        let selected = match selection {
            Selection::Next => queue.peek().ok_or(QueueError::EmptyQueue)?,
            Selection::Ticket(id) => queue.get(id).ok_or(QueueError::TicketNotFound(id))?,
        };
        let mut ticket = selected.clone();
        ticket.resolve(disposition.clone(), now)?;

        let record = DispositionRecord::new(&ticket, disposition, now);
        self.sink.append(&record).map_err(ProcessError::Log)?;

        queue.remove_specific(ticket.id())?;
        stats.record(
            ticket.category(),
            ticket.priority(),
            record.disposition.is_approved(),
        );
        tracing::info!(id = %ticket.id(), "request {}", record.disposition);

        let notification = self.notify(&ticket, &record.disposition);
        Ok(Processed {
            ticket,
            record,
            notification,
        })
    }

    fn notify(&self, ticket: &Ticket, disposition: &Disposition) -> Notification {
        let Some(notifier) = self.notifier else {
            return Notification::Disabled;
        };
        let Some(contact) = self.directory.find_contact(ticket.subject()) else {
            tracing::warn!(
                subject = %ticket.subject(),
                "employee not found; cannot send notification"
            );
            return Notification::NoContact;
        };

        let (subject, body) = compose(&contact, ticket, disposition);
        match notifier.notify(&contact, subject, &body) {
            Ok(()) => Notification::Sent,
            Err(error) => {
                tracing::warn!(email = %contact.email, "notification could not be sent: {error}");
                Notification::Failed(error)
            }
        }
    }
}

fn compose(contact: &Contact, ticket: &Ticket, disposition: &Disposition) -> (&'static str, String) {
    let (subject, message) = match disposition {
        Disposition::Approved => (
            "Your Request Has Been Approved",
            format!(
                "Your request has been approved.\n\nRequest Details:\n{ticket}\n\nThank you for \
                 your submission."
            ),
        ),
        Disposition::Rejected(reason) => (
            "Your Request Was Not Approved",
            format!(
                "Your request has been rejected.\n\nReason: {reason}\n\nRequest \
                 Details:\n{ticket}\n\nPlease contact HR if you have questions."
            ),
        ),
    };
    let body = format!(
        "Dear {},\n\n{message}\n\nRegards,\nManagement",
        contact.name
    );
    (subject, body)
}

#[cfg(test)]
mod tests {
    use std::{cell::RefCell, collections::HashMap};

    use chrono::{Duration, TimeZone};

    use super::*;
    use crate::domain::{RejectionReason, Status};

    #[derive(Default)]
    struct MemorySink {
        records: RefCell<Vec<DispositionRecord>>,
        broken: bool,
    }

    impl AuditSink for MemorySink {
        fn append(&self, record: &DispositionRecord) -> io::Result<()> {
            if self.broken {
                return Err(io::Error::new(io::ErrorKind::PermissionDenied, "read-only"));
            }
            self.records.borrow_mut().push(record.clone());
            Ok(())
        }
    }

    #[derive(Default)]
    struct Contacts(HashMap<SubjectId, Contact>);

    impl ContactDirectory for Contacts {
        fn find_contact(&self, subject: SubjectId) -> Option<Contact> {
            self.0.get(&subject).cloned()
        }
    }

    #[derive(Default)]
    struct Mailbox {
        sent: RefCell<Vec<(String, String, String)>>,
        broken: bool,
    }

    impl Notifier for Mailbox {
        fn notify(&self, contact: &Contact, subject: &str, body: &str) -> Result<(), NotifyError> {
            if self.broken {
                return Err(NotifyError("smtp unavailable".to_string()));
            }
            self.sent.borrow_mut().push((
                contact.email.clone(),
                subject.to_string(),
                body.to_string(),
            ));
            Ok(())
        }
    }

    fn contacts() -> Contacts {
        let mut map = HashMap::new();
        map.insert(
            SubjectId::new(10001),
            Contact {
                name: "Ada Tan".to_string(),
                email: "ada.tan@example.com".to_string(),
            },
        );
        Contacts(map)
    }

    fn queue_with(priorities: &[u8]) -> ReversibleQueue {
        let start = Utc.with_ymd_and_hms(2025, 2, 3, 9, 0, 0).unwrap();
        let mut queue = ReversibleQueue::new();
        for (offset, priority) in (0_i64..).zip(priorities) {
            let ticket = queue.issue_ticket(
                SubjectId::new(10001),
                Category::Technical,
                Priority::new(*priority).unwrap(),
                "Report system bug".to_string(),
                start + Duration::minutes(offset),
            );
            queue.insert(ticket);
        }
        queue
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 2, 4, 9, 0, 0).unwrap()
    }

    #[test]
    fn rejection_logs_counts_and_notifies() {
        let sink = MemorySink::default();
        let contacts = contacts();
        let mailbox = Mailbox::default();
        let processor = Processor::new(&sink, &contacts, Some(&mailbox));
        let mut queue = queue_with(&[3]);
        let mut stats = Statistics::default();
        let reason = RejectionReason::BudgetConstraints;

        let processed = processor
            .process(
                &mut queue,
                &mut stats,
                Selection::Next,
                Disposition::Rejected(reason.clone()),
                now(),
            )
            .unwrap();

        assert_eq!(processed.ticket.status(), &Status::Rejected(reason));
        assert_eq!(processed.ticket.resolved_at(), Some(now()));
        assert_eq!(processed.notification, Notification::Sent);
        assert!(queue.is_empty());

        let records = sink.records.borrow();
        assert_eq!(records.len(), 1);
        assert_eq!(
            records[0].disposition.to_string(),
            "REJECTED: Budget constraints"
        );

        assert_eq!(stats.total_processed, 1);
        assert_eq!(stats.rejected, 1);
        assert_eq!(stats.category(&Category::Technical).rejected, 1);

        let sent = mailbox.sent.borrow();
        assert_eq!(sent[0].1, "Your Request Was Not Approved");
        assert!(sent[0].2.starts_with("Dear Ada Tan,"));
        assert!(sent[0].2.contains("Reason: Budget constraints"));
    }

    #[test]
    fn failed_append_leaves_everything_untouched() {
        let sink = MemorySink {
            broken: true,
            ..MemorySink::default()
        };
        let contacts = contacts();
        let processor = Processor::new(&sink, &contacts, None);
        let mut queue = queue_with(&[2, 1]);
        let before = queue.clone();
        let mut stats = Statistics::default();

        let error = processor
            .process(
                &mut queue,
                &mut stats,
                Selection::Next,
                Disposition::Approved,
                now(),
            )
            .unwrap_err();

        assert!(matches!(error, ProcessError::Log(_)));
        assert_eq!(queue, before);
        assert_eq!(stats, Statistics::default());
    }

    #[test]
    fn notification_failure_does_not_roll_back() {
        let sink = MemorySink::default();
        let contacts = contacts();
        let mailbox = Mailbox {
            broken: true,
            ..Mailbox::default()
        };
        let processor = Processor::new(&sink, &contacts, Some(&mailbox));
        let mut queue = queue_with(&[4]);
        let mut stats = Statistics::default();

        let processed = processor
            .process(
                &mut queue,
                &mut stats,
                Selection::Next,
                Disposition::Approved,
                now(),
            )
            .unwrap();

        assert_eq!(
            processed.notification,
            Notification::Failed(NotifyError("smtp unavailable".to_string()))
        );
        assert_eq!(stats.approved, 1);
        assert_eq!(sink.records.borrow().len(), 1);
    }

    #[test]
    fn unknown_contact_skips_notification() {
        let sink = MemorySink::default();
        let contacts = Contacts::default();
        let mailbox = Mailbox::default();
        let processor = Processor::new(&sink, &contacts, Some(&mailbox));
        let mut queue = queue_with(&[1]);
        let mut stats = Statistics::default();

        let processed = processor
            .process(
                &mut queue,
                &mut stats,
                Selection::Next,
                Disposition::Approved,
                now(),
            )
            .unwrap();

        assert_eq!(processed.notification, Notification::NoContact);
        assert!(mailbox.sent.borrow().is_empty());
        assert_eq!(stats.approved, 1);
    }

    #[test]
    fn specific_selection_and_undo_restore_pending_ticket() {
        let sink = MemorySink::default();
        let contacts = contacts();
        let processor = Processor::new(&sink, &contacts, None);
        let mut queue = queue_with(&[1, 5]);
        let target = queue.pending()[1].clone();
        let mut stats = Statistics::default();

        processor
            .process(
                &mut queue,
                &mut stats,
                Selection::Ticket(target.id()),
                Disposition::Approved,
                now(),
            )
            .unwrap();
        assert!(queue.get(target.id()).is_none());

        queue.undo().unwrap();

        // Membership comes back; the disposition does not.
        assert_eq!(queue.get(target.id()), Some(&target));
        assert_eq!(stats.approved, 1);
        assert_eq!(sink.records.borrow().len(), 1);
    }

    #[test]
    fn empty_queue_and_unknown_ticket_are_reported() {
        let sink = MemorySink::default();
        let contacts = contacts();
        let processor = Processor::new(&sink, &contacts, None);
        let mut queue = ReversibleQueue::new();
        let mut stats = Statistics::default();

        let empty = processor
            .process(
                &mut queue,
                &mut stats,
                Selection::Next,
                Disposition::Approved,
                now(),
            )
            .unwrap_err();
        assert!(matches!(empty, ProcessError::Queue(QueueError::EmptyQueue)));

        let missing = processor
            .process(
                &mut queue,
                &mut stats,
                Selection::Ticket(TicketId::new(99)),
                Disposition::Approved,
                now(),
            )
            .unwrap_err();
        assert!(matches!(
            missing,
            ProcessError::Queue(QueueError::TicketNotFound(_))
        ));
        assert!(sink.records.borrow().is_empty());
    }
}
