//! Aggregate counts over processed tickets.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::domain::{Category, Priority};

/// Approved and rejected counts for one slice of the processed tickets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Bucket {
    /// Number of approvals.
    pub approved: u64,
    /// Number of rejections.
    pub rejected: u64,
}

impl Bucket {
    /// Total dispositions in this bucket.
    #[must_use]
    pub const fn total(&self) -> u64 {
        self.approved + self.rejected
    }

    /// The fraction of dispositions that were approvals.
    ///
    /// Returns `None` for an empty bucket: there is no meaningful rate, and
    /// callers must decide how to present that rather than receive a
    /// misleading `0.0`.
    #[must_use]
    pub fn approval_rate(&self) -> Option<f64> {
        match self.total() {
            0 => None,
            #[allow(clippy::cast_precision_loss)]
            total => Some(self.approved as f64 / total as f64),
        }
    }

    const fn count(&mut self, approved: bool) {
        if approved {
            self.approved += 1;
        } else {
            self.rejected += 1;
        }
    }
}

/// Lifetime processing statistics.
///
/// Built by replaying the audit log once at startup and then updated with
/// each disposition made in the session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Statistics {
    /// Every disposition ever recorded.
    pub total_processed: u64,
    /// Number of approvals.
    pub approved: u64,
    /// Number of rejections.
    pub rejected: u64,
    /// Counts per category.
    pub by_category: BTreeMap<Category, Bucket>,
    /// Counts per priority, most urgent first.
    pub by_priority: BTreeMap<Priority, Bucket>,
}

impl Statistics {
    /// Counts one disposition.
    pub fn record(&mut self, category: &Category, priority: Priority, approved: bool) {
        self.total_processed += 1;
        if approved {
            self.approved += 1;
        } else {
            self.rejected += 1;
        }
        self.by_category
            .entry(category.clone())
            .or_default()
            .count(approved);
        self.by_priority.entry(priority).or_default().count(approved);
    }

    /// The overall approve/reject split as a bucket.
    #[must_use]
    pub const fn overall(&self) -> Bucket {
        Bucket {
            approved: self.approved,
            rejected: self.rejected,
        }
    }

    /// Counts for one category; empty if none were processed.
    #[must_use]
    pub fn category(&self, category: &Category) -> Bucket {
        self.by_category.get(category).copied().unwrap_or_default()
    }

    /// Counts for one priority; empty if none were processed.
    #[must_use]
    pub fn priority(&self, priority: Priority) -> Bucket {
        self.by_priority.get(&priority).copied().unwrap_or_default()
    }
}

impl<'a> Extend<(&'a Category, Priority, bool)> for Statistics {
    fn extend<I: IntoIterator<Item = (&'a Category, Priority, bool)>>(&mut self, iter: I) {
        for (category, priority, approved) in iter {
            self.record(category, priority, approved);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn priority(value: u8) -> Priority {
        Priority::new(value).unwrap()
    }

    #[test]
    fn record_updates_totals_and_both_buckets() {
        let mut stats = Statistics::default();

        stats.record(&Category::It, priority(2), true);
        stats.record(&Category::It, priority(4), false);
        stats.record(&Category::Logistics, priority(2), false);

        assert_eq!(stats.total_processed, 3);
        assert_eq!(stats.approved, 1);
        assert_eq!(stats.rejected, 2);
        assert_eq!(
            stats.category(&Category::It),
            Bucket {
                approved: 1,
                rejected: 1
            }
        );
        assert_eq!(
            stats.priority(priority(2)),
            Bucket {
                approved: 1,
                rejected: 1
            }
        );
        assert_eq!(stats.priority(priority(4)).rejected, 1);
    }

    #[test]
    fn approval_rate_is_absent_for_empty_bucket() {
        let stats = Statistics::default();

        assert_eq!(stats.category(&Category::Support).approval_rate(), None);
        assert_eq!(stats.overall().approval_rate(), None);
    }

    #[test]
    fn approval_rate_divides_by_bucket_total() {
        let bucket = Bucket {
            approved: 3,
            rejected: 1,
        };
        assert_eq!(bucket.approval_rate(), Some(0.75));

        let all_rejected = Bucket {
            approved: 0,
            rejected: 2,
        };
        assert_eq!(all_rejected.approval_rate(), Some(0.0));
    }

    #[test]
    fn priority_buckets_iterate_most_urgent_first() {
        let mut stats = Statistics::default();
        for value in [5, 1, 3] {
            stats.record(&Category::Support, priority(value), true);
        }

        let order: Vec<u8> = stats.by_priority.keys().map(|p| p.get()).collect();
        assert_eq!(order, vec![1, 3, 5]);
    }
}
