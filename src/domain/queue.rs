//! The pending-ticket queue with reversible membership history.
//!
//! [`ReversibleQueue`] knows nothing about dispositions or the filesystem. It
//! keeps pending tickets in [`queue_order`] and records every structural
//! change (insert or remove) as an [`Operation`] so it can be undone and
//! redone. Undo/redo only ever touches membership: a ticket that has been
//! processed stays processed even if its removal is undone.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::domain::{
    Category, Priority, SubjectId, Ticket, TicketId,
    ordering::{order_key, queue_order},
};

/// A recorded change to queue membership.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", content = "ticket", rename_all = "snake_case")]
pub enum Operation {
    /// The ticket was added to the queue.
    Insert(Ticket),
    /// The ticket was taken out of the queue.
    Remove(Ticket),
}

impl Operation {
    /// The ticket the operation applies to.
    #[must_use]
    pub const fn ticket(&self) -> &Ticket {
        match self {
            Self::Insert(ticket) | Self::Remove(ticket) => ticket,
        }
    }

    /// Short uppercase label used in history listings.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Insert(_) => "ADD",
            Self::Remove(_) => "REMOVE",
        }
    }
}

/// Errors reported by queue operations.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum QueueError {
    /// There is no pending ticket to take.
    #[error("no requests to process")]
    EmptyQueue,
    /// The requested ticket is not pending.
    #[error("request {0} is not in the queue")]
    TicketNotFound(TicketId),
    /// The undo history is empty.
    #[error("nothing to undo")]
    NothingToUndo,
    /// The redo history is empty.
    #[error("nothing to redo")]
    NothingToRedo,
    /// Replaying a recorded operation found the queue in an unexpected state.
    #[error("cannot replay {label} of request {id}: {problem}")]
    InconsistentState {
        /// Label of the operation being replayed.
        label: &'static str,
        /// The ticket the operation refers to.
        id: TicketId,
        /// What was wrong with the queue.
        problem: &'static str,
    },
}

/// Optional predicates for selecting pending tickets.
///
/// An absent predicate places no constraint.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TicketFilter {
    /// Only tickets in this category.
    pub category: Option<Category>,
    /// Only tickets with this priority.
    pub priority: Option<Priority>,
}

impl TicketFilter {
    /// Whether the ticket satisfies every present predicate.
    #[must_use]
    pub fn matches(&self, ticket: &Ticket) -> bool {
        self.category
            .as_ref()
            .is_none_or(|category| ticket.category() == category)
            && self
                .priority
                .is_none_or(|priority| ticket.priority() == priority)
    }
}

/// Pending tickets in service order, plus undo and redo histories.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Versions", into = "Versions")]
pub struct ReversibleQueue {
    /// Always sorted by [`queue_order`].
    pending: Vec<Ticket>,
    /// Most recent last.
    undo: Vec<Operation>,
    /// Most recent last. Emptied by every fresh insert or remove.
    redo: Vec<Operation>,
    next_id: u64,
}

impl Default for ReversibleQueue {
    fn default() -> Self {
        Self {
            pending: Vec::new(),
            undo: Vec::new(),
            redo: Vec::new(),
            next_id: 1,
        }
    }
}

impl ReversibleQueue {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new pending ticket with the next free id.
    ///
    /// The ticket is not inserted; call [`ReversibleQueue::insert`] for that.
    pub fn issue_ticket(
        &mut self,
        subject: SubjectId,
        category: Category,
        priority: Priority,
        details: String,
        created_at: DateTime<Utc>,
    ) -> Ticket {
        let id = TicketId::new(self.next_id);
        self.next_id += 1;
        Ticket::new(id, subject, category, priority, details, created_at)
    }

    /// Inserts a ticket at its ordered position.
    ///
    /// Duplicates are allowed; deduplication is the caller's concern.
    #[instrument(level = "debug", skip(self, ticket), fields(id = %ticket.id()))]
    pub fn insert(&mut self, ticket: Ticket) {
        self.next_id = self.next_id.max(ticket.id().get() + 1);
        self.place(ticket.clone());
        self.record(Operation::Insert(ticket));
    }

    /// Removes and returns the most urgent pending ticket.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::EmptyQueue`] if nothing is pending.
    #[instrument(level = "debug", skip(self))]
    pub fn remove_next(&mut self) -> Result<Ticket, QueueError> {
        if self.pending.is_empty() {
            return Err(QueueError::EmptyQueue);
        }
        let ticket = self.pending.remove(0);
        self.record(Operation::Remove(ticket.clone()));
        Ok(ticket)
    }

    /// Removes and returns the ticket with the given id.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::TicketNotFound`] if no pending ticket has that id.
    #[instrument(level = "debug", skip(self))]
    pub fn remove_specific(&mut self, id: TicketId) -> Result<Ticket, QueueError> {
        let ticket = self.take(id).ok_or(QueueError::TicketNotFound(id))?;
        self.record(Operation::Remove(ticket.clone()));
        Ok(ticket)
    }

    /// Reverts the most recent recorded operation.
    ///
    /// On success the operation moves to the redo history and a reference to
    /// it is returned.
    ///
    /// # Errors
    ///
    /// - [`QueueError::NothingToUndo`] if the undo history is empty.
    /// - [`QueueError::InconsistentState`] if the ticket is not where the
    ///   operation says it should be. The operation is discarded in that case.
    #[instrument(level = "debug", skip(self))]
    pub fn undo(&mut self) -> Result<&Operation, QueueError> {
        let operation = self.undo.pop().ok_or(QueueError::NothingToUndo)?;
        self.revert(&operation)?;
        let index = self.redo.len();
        self.redo.push(operation);
        Ok(&self.redo[index])
    }

    /// Reapplies the most recently undone operation.
    ///
    /// # Errors
    ///
    /// - [`QueueError::NothingToRedo`] if the redo history is empty.
    /// - [`QueueError::InconsistentState`] if the queue no longer matches the
    ///   operation. The operation is discarded in that case.
    #[instrument(level = "debug", skip(self))]
    pub fn redo(&mut self) -> Result<&Operation, QueueError> {
        let operation = self.redo.pop().ok_or(QueueError::NothingToRedo)?;
        self.apply(&operation)?;
        let index = self.undo.len();
        self.undo.push(operation);
        Ok(&self.undo[index])
    }

    /// Lazily yields pending tickets matching the filter, in service order.
    ///
    /// The iterator is `Clone`, so it can be restarted without re-filtering
    /// by hand.
    pub fn filter(&self, filter: TicketFilter) -> impl Iterator<Item = &Ticket> + Clone {
        self.pending.iter().filter(move |ticket| filter.matches(ticket))
    }

    /// Yields pending tickets that look like the described submission.
    pub fn find_similar<'a, 'q>(
        &'a self,
        subject: SubjectId,
        category: &'q Category,
        details: &'q str,
    ) -> impl Iterator<Item = &'a Ticket> + Clone {
        self.pending
            .iter()
            .filter(move |ticket| ticket.resembles(subject, category, details))
    }

    /// Pending tickets in service order.
    pub fn iter(&self) -> std::slice::Iter<'_, Ticket> {
        self.pending.iter()
    }

    /// Pending tickets in service order, as a slice.
    #[must_use]
    pub fn pending(&self) -> &[Ticket] {
        &self.pending
    }

    /// The ticket that [`ReversibleQueue::remove_next`] would return.
    #[must_use]
    pub fn peek(&self) -> Option<&Ticket> {
        self.pending.first()
    }

    /// Looks up a pending ticket by id.
    #[must_use]
    pub fn get(&self, id: TicketId) -> Option<&Ticket> {
        self.pending.iter().find(|ticket| ticket.id() == id)
    }

    /// The number of pending tickets.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Whether nothing is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Recorded operations that can be undone, most recent last.
    #[must_use]
    pub fn undo_history(&self) -> &[Operation] {
        &self.undo
    }

    /// Undone operations that can be redone, most recent last.
    #[must_use]
    pub fn redo_history(&self) -> &[Operation] {
        &self.redo
    }

    fn record(&mut self, operation: Operation) {
        self.undo.push(operation);
        self.redo.clear();
    }

    fn revert(&mut self, operation: &Operation) -> Result<(), QueueError> {
        match operation {
            Operation::Insert(ticket) => self
                .take(ticket.id())
                .map(drop)
                .ok_or_else(|| missing(operation)),
            Operation::Remove(ticket) => self.restore(operation, ticket),
        }
    }

    fn apply(&mut self, operation: &Operation) -> Result<(), QueueError> {
        match operation {
            Operation::Insert(ticket) => self.restore(operation, ticket),
            Operation::Remove(ticket) => self
                .take(ticket.id())
                .map(drop)
                .ok_or_else(|| missing(operation)),
        }
    }

    fn restore(&mut self, operation: &Operation, ticket: &Ticket) -> Result<(), QueueError> {
        if self.get(ticket.id()).is_some() {
            return Err(QueueError::InconsistentState {
                label: operation.label(),
                id: ticket.id(),
                problem: "request is already pending",
            });
        }
        self.place(ticket.clone());
        Ok(())
    }

    fn place(&mut self, ticket: Ticket) {
        let index = self
            .pending
            .partition_point(|existing| queue_order(existing, &ticket) == Ordering::Less);
        self.pending.insert(index, ticket);
    }

    fn take(&mut self, id: TicketId) -> Option<Ticket> {
        let index = self.pending.iter().position(|ticket| ticket.id() == id)?;
        Some(self.pending.remove(index))
    }
}

fn missing(operation: &Operation) -> QueueError {
    tracing::warn!(
        id = %operation.ticket().id(),
        "recorded {} refers to a request that is no longer pending",
        operation.label()
    );
    QueueError::InconsistentState {
        label: operation.label(),
        id: operation.ticket().id(),
        problem: "request is not pending",
    }
}

impl<'a> IntoIterator for &'a ReversibleQueue {
    type Item = &'a Ticket;
    type IntoIter = std::slice::Iter<'a, Ticket>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// The serialized versions of the queue.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "_version")]
enum Versions {
    #[serde(rename = "1")]
    V1 {
        next_id: u64,
        #[serde(default)]
        pending: Vec<Ticket>,
        #[serde(default)]
        undo: Vec<Operation>,
        #[serde(default)]
        redo: Vec<Operation>,
    },
}

impl From<Versions> for ReversibleQueue {
    fn from(versions: Versions) -> Self {
        match versions {
            Versions::V1 {
                next_id,
                mut pending,
                undo,
                redo,
            } => {
                // Hand-edited files may be out of order.
                pending.sort_by_key(order_key);
                let highest_id = pending
                    .iter()
                    .chain(undo.iter().chain(&redo).map(Operation::ticket))
                    .map(|ticket| ticket.id().get())
                    .max()
                    .unwrap_or(0);
                Self {
                    pending,
                    undo,
                    redo,
                    next_id: next_id.max(highest_id + 1),
                }
            }
        }
    }
}

impl From<ReversibleQueue> for Versions {
    fn from(queue: ReversibleQueue) -> Self {
        Self::V1 {
            next_id: queue.next_id,
            pending: queue.pending,
            undo: queue.undo,
            redo: queue.redo,
        }
    }
}
