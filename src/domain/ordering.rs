//! The ordering policy shared by the queue and the statistics views.
//!
//! Tickets are served most urgent first, and within one priority level in
//! order of arrival. Creation timestamps can collide (tickets generated in a
//! tight loop, coarse clocks), so the monotonic ticket id breaks the last tie.
//! That keeps the order total and stable without ever comparing mutable
//! fields.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};

use crate::domain::{Priority, Ticket, TicketId};

/// The key a ticket is ordered by.
pub type OrderKey = (Priority, DateTime<Utc>, TicketId);

/// Returns the ordering key of a ticket.
#[must_use]
pub fn order_key(ticket: &Ticket) -> OrderKey {
    (ticket.priority(), ticket.created_at(), ticket.id())
}

/// Compares two tickets by `(priority asc, created_at asc, id asc)`.
#[must_use]
pub fn queue_order(a: &Ticket, b: &Ticket) -> Ordering {
    order_key(a).cmp(&order_key(b))
}

/// Whether a slice of tickets is sorted by [`queue_order`].
#[must_use]
pub fn is_queue_ordered(tickets: &[Ticket]) -> bool {
    tickets
        .windows(2)
        .all(|pair| queue_order(&pair[0], &pair[1]) != Ordering::Greater)
}
