//! A filesystem backed request desk.
//!
//! The [`Desk`] ties the filesystem agnostic domain together with its
//! on-disk state: the configuration, the persisted queue, the audit log, the
//! employee directory and the notification outbox. Everything lives in a
//! `.desk/` directory under the desk's root.

use std::{
    io,
    path::{Path, PathBuf},
};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::instrument;

use crate::{
    domain::{
        Category, Config, Disposition, DispositionRecord, Notifier, Operation, Priority,
        ProcessError, Processed, Processor, QueueError, ReversibleQueue, Selection, Statistics,
        SubjectId, Ticket,
    },
    storage::{
        AuditLog, EmployeeDirectory, Outbox,
        employees::DirectoryError,
        queue_file::{self, QueueFileError, SavedQueue},
    },
};

/// Name of the state directory under the desk root.
pub const STATE_DIR: &str = ".desk";

/// Errors raised while opening or saving a desk.
#[derive(Debug, thiserror::Error)]
pub enum DeskError {
    /// No `.desk/` directory exists under the root.
    #[error("no request desk found at {0} (run `desk init` first)")]
    NotInitialised(PathBuf),
    /// `init` was run on a root that already has a desk.
    #[error("a request desk already exists at {0}")]
    AlreadyInitialised(PathBuf),
    /// The configuration could not be written.
    #[error("{0}")]
    Config(String),
    /// The state directory could not be created.
    #[error("failed to create {path}")]
    CreateDir {
        /// The directory involved.
        path: PathBuf,
        /// The underlying error.
        source: io::Error,
    },
    /// The persisted queue could not be loaded or saved.
    #[error(transparent)]
    Queue(#[from] QueueFileError),
    /// The audit log exists but could not be read.
    #[error("failed to read audit log")]
    Log(#[source] io::Error),
    /// The employee directory could not be loaded.
    #[error(transparent)]
    Directory(#[from] DirectoryError),
}

/// The pending queue and lifetime statistics at a point in time.
///
/// This is the read-only view handed to reporting collaborators.
#[derive(Debug, Serialize)]
pub struct Snapshot<'a> {
    /// When the snapshot was taken.
    pub generated_at: DateTime<Utc>,
    /// Pending tickets in service order.
    pub pending: &'a [Ticket],
    /// Lifetime processing statistics.
    pub statistics: &'a Statistics,
}

/// A request desk rooted at a directory.
#[derive(Debug)]
pub struct Desk {
    state_dir: PathBuf,
    config: Config,
    queue: ReversibleQueue,
    /// Audit records reflected in `queue`.
    audited: usize,
    stats: Statistics,
    log: AuditLog,
    employees: EmployeeDirectory,
    outbox: Outbox,
    skipped_log_lines: usize,
}

impl Desk {
    /// Creates the state directory and a default configuration under `root`.
    ///
    /// Returns the path of the new state directory.
    ///
    /// # Errors
    ///
    /// Returns an error if a desk already exists at `root` or if the files
    /// cannot be created.
    #[instrument]
    pub fn init(root: &Path) -> Result<PathBuf, DeskError> {
        let state_dir = root.join(STATE_DIR);
        if state_dir.exists() {
            return Err(DeskError::AlreadyInitialised(root.to_path_buf()));
        }
        std::fs::create_dir_all(&state_dir).map_err(|source| DeskError::CreateDir {
            path: state_dir.clone(),
            source,
        })?;
        Config::default()
            .save(&state_dir.join("config.toml"))
            .map_err(DeskError::Config)?;
        Ok(state_dir)
    }

    /// Opens the desk under `root`.
    ///
    /// The pending queue is loaded from its file and statistics are rebuilt
    /// by replaying the entire audit log. Tickets the log records as processed
    /// after the queue was last saved are taken out of the queue.
    ///
    /// # Errors
    ///
    /// Returns an error if the desk has not been initialised, or if the
    /// queue file, audit log or employee directory cannot be read.
    #[instrument]
    pub fn open(root: PathBuf) -> Result<Self, DeskError> {
        let state_dir = root.join(STATE_DIR);
        if !state_dir.is_dir() {
            return Err(DeskError::NotInitialised(root));
        }
        let config = load_config(&state_dir);

        let SavedQueue { mut queue, audited } = queue_file::load(&config.queue_path(&state_dir))?;
        let log = AuditLog::new(config.audit_log_path(&state_dir));
        let replay = log.replay().map_err(DeskError::Log)?;
        let unsaved = replay.records.get(audited..).unwrap_or_default();
        reconcile(&mut queue, unsaved);
        if replay.skipped > 0 {
            tracing::warn!(
                "skipped {} malformed line(s) in {}",
                replay.skipped,
                log.path().display()
            );
        }
        let employees = EmployeeDirectory::load(&config.employees_path(&state_dir))?;
        let outbox = Outbox::new(config.outbox_path(&state_dir));

        Ok(Self {
            stats: replay.statistics(),
            skipped_log_lines: replay.skipped,
            audited: replay.records.len(),
            state_dir,
            config,
            queue,
            log,
            employees,
            outbox,
        })
    }

    /// The desk's configuration.
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// The pending queue.
    #[must_use]
    pub const fn queue(&self) -> &ReversibleQueue {
        &self.queue
    }

    /// Lifetime processing statistics.
    #[must_use]
    pub const fn statistics(&self) -> &Statistics {
        &self.stats
    }

    /// The audit log.
    #[must_use]
    pub const fn audit_log(&self) -> &AuditLog {
        &self.log
    }

    /// The employee directory.
    #[must_use]
    pub const fn employees(&self) -> &EmployeeDirectory {
        &self.employees
    }

    /// Malformed audit log lines skipped when the desk was opened.
    #[must_use]
    pub const fn skipped_log_lines(&self) -> usize {
        self.skipped_log_lines
    }

    /// Pending tickets that look like the described submission.
    #[must_use]
    pub fn similar_pending(
        &self,
        subject: SubjectId,
        category: &Category,
        details: &str,
    ) -> Vec<&Ticket> {
        self.queue.find_similar(subject, category, details).collect()
    }

    /// Queues a new ticket stamped with the current time.
    #[instrument(skip(self, details))]
    pub fn submit(
        &mut self,
        subject: SubjectId,
        category: Category,
        priority: Priority,
        details: String,
    ) -> Ticket {
        let ticket = self
            .queue
            .issue_ticket(subject, category, priority, details, Utc::now());
        self.queue.insert(ticket.clone());
        tracing::info!(id = %ticket.id(), "request queued");
        ticket
    }

    /// Applies a disposition to a pending ticket.
    ///
    /// # Errors
    ///
    /// See [`Processor::process`].
    pub fn process(
        &mut self,
        selection: Selection,
        disposition: Disposition,
    ) -> Result<Processed, ProcessError> {
        let notifier = self.config.notify.then_some(&self.outbox as &dyn Notifier);
        let processed = Processor::new(&self.log, &self.employees, notifier).process(
            &mut self.queue,
            &mut self.stats,
            selection,
            disposition,
            Utc::now(),
        )?;
        self.audited += 1;
        Ok(processed)
    }

    /// Reverts the most recent queue operation.
    ///
    /// # Errors
    ///
    /// See [`ReversibleQueue::undo`].
    pub fn undo(&mut self) -> Result<&Operation, QueueError> {
        self.queue.undo()
    }

    /// Reapplies the most recently undone queue operation.
    ///
    /// # Errors
    ///
    /// See [`ReversibleQueue::redo`].
    pub fn redo(&mut self) -> Result<&Operation, QueueError> {
        self.queue.redo()
    }

    /// A read-only view of the pending queue and statistics.
    #[must_use]
    pub fn snapshot(&self) -> Snapshot<'_> {
        Snapshot {
            generated_at: Utc::now(),
            pending: self.queue.pending(),
            statistics: &self.stats,
        }
    }

    /// Writes the queue and its history to disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the queue file cannot be written.
    pub fn flush(&self) -> Result<(), DeskError> {
        let saved = SavedQueue {
            queue: self.queue.clone(),
            audited: self.audited,
        };
        queue_file::save(&self.config.queue_path(&self.state_dir), &saved)?;
        Ok(())
    }
}

/// Removes tickets that were processed but whose removal never reached the
/// queue file.
fn reconcile(queue: &mut ReversibleQueue, unsaved: &[DispositionRecord]) {
    for id in unsaved.iter().filter_map(|record| record.ticket) {
        if queue.remove_specific(id).is_ok() {
            tracing::warn!(%id, "request was already processed; removed from the queue");
        }
    }
}

fn load_config(state_dir: &Path) -> Config {
    let path = state_dir.join("config.toml");
    Config::load(&path).unwrap_or_else(|e| {
        tracing::debug!("Failed to load config: {e}");
        Config::default()
    })
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::tempdir;

    use super::*;
    use crate::domain::{Notification, RejectionReason, Status};

    fn priority(value: u8) -> Priority {
        Priority::new(value).unwrap()
    }

    fn desk(root: &Path) -> Desk {
        Desk::open(root.to_path_buf()).unwrap()
    }

    fn write_employees(root: &Path) {
        fs::write(
            root.join(STATE_DIR).join("employees.json"),
            r#"{"employees": [{"employee_id": 10001, "name": "Ada Tan", "email": "ada@example.com"}]}"#,
        )
        .unwrap();
    }

    #[test]
    fn open_requires_init() {
        let tmp = tempdir().unwrap();

        assert!(matches!(
            Desk::open(tmp.path().to_path_buf()),
            Err(DeskError::NotInitialised(_))
        ));

        Desk::init(tmp.path()).unwrap();
        assert!(matches!(
            Desk::init(tmp.path()),
            Err(DeskError::AlreadyInitialised(_))
        ));
        assert!(Desk::open(tmp.path().to_path_buf()).is_ok());
    }

    #[test]
    fn statistics_survive_restart() {
        let tmp = tempdir().unwrap();
        Desk::init(tmp.path()).unwrap();
        write_employees(tmp.path());

        let mut first = desk(tmp.path());
        first.submit(
            SubjectId::new(10001),
            Category::It,
            priority(2),
            "VPN access issue".to_string(),
        );
        first.submit(
            SubjectId::new(10001),
            Category::Logistics,
            priority(1),
            "Need HDMI cable".to_string(),
        );
        let rejected = first
            .process(
                Selection::Next,
                Disposition::Rejected(RejectionReason::BudgetConstraints),
            )
            .unwrap();
        assert_eq!(rejected.ticket.category(), &Category::Logistics);
        assert_eq!(rejected.notification, Notification::Sent);
        first.flush().unwrap();
        let stats_before = first.statistics().clone();
        drop(first);

        let second = desk(tmp.path());

        assert_eq!(second.statistics(), &stats_before);
        assert_eq!(second.statistics().rejected, 1);
        assert_eq!(second.queue().len(), 1);
        assert_eq!(second.skipped_log_lines(), 0);
        let log = fs::read_to_string(second.audit_log().path()).unwrap();
        assert_eq!(log.lines().count(), 1);
        assert!(log.contains("| REJECTED: Budget constraints |"));
        let outbox = fs::read_to_string(tmp.path().join(STATE_DIR).join("outbox.txt")).unwrap();
        assert!(outbox.contains("Subject: Your Request Was Not Approved"));
    }

    #[test]
    fn undo_history_survives_restart() {
        let tmp = tempdir().unwrap();
        Desk::init(tmp.path()).unwrap();

        let mut first = desk(tmp.path());
        let id = first
            .submit(
                SubjectId::new(7),
                Category::Support,
                priority(3),
                "Access card issue".to_string(),
            )
            .id();
        first.flush().unwrap();
        drop(first);

        let mut second = desk(tmp.path());
        let undone = second.undo().unwrap();
        assert_eq!(undone.ticket().id(), id);
        assert!(second.queue().is_empty());
        second.flush().unwrap();
        drop(second);

        let mut third = desk(tmp.path());
        third.redo().unwrap();
        assert_eq!(
            third.queue().get(id).map(Ticket::status),
            Some(&Status::Pending)
        );
    }

    #[test]
    fn notifications_can_be_disabled() {
        let tmp = tempdir().unwrap();
        let state_dir = Desk::init(tmp.path()).unwrap();
        fs::write(
            state_dir.join("config.toml"),
            "_version = \"1\"\nnotify = false\n",
        )
        .unwrap();
        write_employees(tmp.path());

        let mut desk = desk(tmp.path());
        desk.submit(
            SubjectId::new(10001),
            Category::Technical,
            priority(4),
            "Scanner calibration".to_string(),
        );
        let processed = desk.process(Selection::Next, Disposition::Approved).unwrap();

        assert_eq!(processed.notification, Notification::Disabled);
        assert!(!state_dir.join("outbox.txt").exists());
    }

    #[test]
    fn corrupt_log_lines_are_counted_on_open() {
        let tmp = tempdir().unwrap();
        let state_dir = Desk::init(tmp.path()).unwrap();
        fs::write(
            state_dir.join("processed_requests.log"),
            "garbage\n2025-01-01T00:00:00Z | APPROVED | subject=1 | category=IT | priority=1 | \
             created=2025-01-01T00:00:00Z | details=ok\n",
        )
        .unwrap();

        let desk = desk(tmp.path());

        assert_eq!(desk.skipped_log_lines(), 1);
        assert_eq!(desk.statistics().approved, 1);
    }

    #[test]
    fn processed_ticket_stays_processed_when_queue_save_fails() {
        let tmp = tempdir().unwrap();
        let state_dir = Desk::init(tmp.path()).unwrap();

        let mut first = desk(tmp.path());
        let id = first
            .submit(
                SubjectId::new(10001),
                Category::It,
                priority(2),
                "VPN access issue".to_string(),
            )
            .id();
        first.flush().unwrap();
        first.process(Selection::Next, Disposition::Approved).unwrap();
        fs::create_dir(state_dir.join("queue.json.tmp")).unwrap();
        assert!(first.flush().is_err());
        drop(first);

        let mut second = desk(tmp.path());

        assert!(second.queue().get(id).is_none());
        assert_eq!(second.statistics().approved, 1);
        assert!(matches!(
            second.process(Selection::Ticket(id), Disposition::Approved),
            Err(ProcessError::Queue(QueueError::TicketNotFound(_)))
        ));
        let log = fs::read_to_string(second.audit_log().path()).unwrap();
        assert_eq!(log.lines().count(), 1);
    }

    #[test]
    fn undone_processing_is_not_reconciled_away() {
        let tmp = tempdir().unwrap();
        Desk::init(tmp.path()).unwrap();

        let mut first = desk(tmp.path());
        let id = first
            .submit(
                SubjectId::new(4),
                Category::Logistics,
                priority(3),
                "Restock pantry".to_string(),
            )
            .id();
        first.process(Selection::Next, Disposition::Approved).unwrap();
        first.undo().unwrap();
        first.flush().unwrap();
        drop(first);

        let second = desk(tmp.path());

        assert!(second.queue().get(id).is_some());
        assert_eq!(second.statistics().approved, 1);
    }

    #[test]
    fn similar_pending_outlives_the_query() {
        let tmp = tempdir().unwrap();
        Desk::init(tmp.path()).unwrap();
        let mut desk = desk(tmp.path());
        let id = desk
            .submit(
                SubjectId::new(7),
                Category::It,
                priority(2),
                "VPN access issue".to_string(),
            )
            .id();

        let similar = {
            let details = String::from("vpn ACCESS issue");
            desk.similar_pending(SubjectId::new(7), &Category::It, &details)
        };

        assert_eq!(similar.iter().map(|t| t.id()).collect::<Vec<_>>(), vec![id]);
    }

    #[test]
    fn snapshot_serializes_pending_and_statistics() {
        let tmp = tempdir().unwrap();
        Desk::init(tmp.path()).unwrap();
        let mut desk = desk(tmp.path());
        desk.submit(
            SubjectId::new(3),
            Category::Maintenance,
            priority(5),
            "Lighting replacement".to_string(),
        );

        let json = serde_json::to_value(desk.snapshot()).unwrap();

        assert_eq!(json["pending"].as_array().unwrap().len(), 1);
        assert_eq!(json["pending"][0]["category"], "Maintenance");
        assert_eq!(json["statistics"]["total_processed"], 0);
    }
}
