use std::path::PathBuf;

use clap::Parser;
use desk::{Desk, domain::DispositionRecord};
use tracing::instrument;

use super::terminal::{Colorize, is_narrow, truncate};

#[derive(Debug, Parser, Default)]
#[command(about = "Show the history of processed requests")]
pub struct Log {
    /// Only show the most recent N entries.
    #[arg(long, short = 'n')]
    limit: Option<usize>,

    /// Only show rejections.
    #[arg(long, conflicts_with = "approved")]
    rejected: bool,

    /// Only show approvals.
    #[arg(long)]
    approved: bool,
}

impl Log {
    #[instrument(level = "debug", skip(self))]
    pub fn run(self, root: PathBuf) -> anyhow::Result<()> {
        let desk = Desk::open(root)?;
        let replay = desk.audit_log().replay()?;

        if replay.records.is_empty() && replay.skipped == 0 {
            println!("{}", "The processed requests log is empty.".warning());
            return Ok(());
        }

        let records = self.select(&replay.records);
        let narrow = is_narrow();
        for record in records {
            println!("{}", render(record, narrow));
        }

        if replay.skipped > 0 {
            println!();
            println!(
                "{}",
                format!(
                    "{} malformed line(s) in {} were skipped",
                    replay.skipped,
                    desk.audit_log().path().display()
                )
                .warning()
            );
        }
        Ok(())
    }

    /// The matching records, keeping only the last `limit` of them.
    fn select<'a>(&self, records: &'a [DispositionRecord]) -> Vec<&'a DispositionRecord> {
        let matching: Vec<_> = records
            .iter()
            .filter(|record| {
                if self.approved {
                    record.disposition.is_approved()
                } else if self.rejected {
                    !record.disposition.is_approved()
                } else {
                    true
                }
            })
            .collect();
        let skip = self
            .limit
            .map_or(0, |limit| matching.len().saturating_sub(limit));
        matching.into_iter().skip(skip).collect()
    }
}

fn render(record: &DispositionRecord, narrow: bool) -> String {
    let outcome = if record.disposition.is_approved() {
        record.disposition.to_string().success()
    } else {
        record.disposition.to_string().failure()
    };
    let ticket = record
        .ticket
        .map_or_else(|| "-".to_string(), |id| id.to_string());
    let when = record.logged_at.format("%Y-%m-%d %H:%M:%S");

    if narrow {
        return format!(
            "{when} {ticket} {outcome}\n  employee {} · {} · P{} · {}",
            record.subject,
            record.category,
            record.priority,
            truncate(&record.details, 40)
        );
    }
    format!(
        "{} {:<5} {outcome}  {}",
        when.to_string().dim(),
        ticket,
        format!(
            "[employee {}, {}, P{}] {}",
            record.subject,
            record.category,
            record.priority,
            truncate(&record.details, 60)
        )
        .dim()
    )
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};
    use desk::{Category, Disposition, Priority, RejectionReason, SubjectId, TicketId};

    use super::*;

    fn records() -> Vec<DispositionRecord> {
        let start = Utc.with_ymd_and_hms(2025, 7, 1, 10, 0, 0).unwrap();
        (1..=4)
            .map(|n| DispositionRecord {
                logged_at: start + Duration::minutes(n),
                disposition: if n % 2 == 0 {
                    Disposition::Rejected(RejectionReason::PolicyViolation)
                } else {
                    Disposition::Approved
                },
                ticket: Some(TicketId::new(n.unsigned_abs())),
                subject: SubjectId::new(10001),
                category: Category::Support,
                priority: Priority::new(2).unwrap(),
                details: format!("request {n}"),
                created_at: start,
            })
            .collect()
    }

    fn ids(records: &[&DispositionRecord]) -> Vec<u64> {
        records
            .iter()
            .filter_map(|record| record.ticket.map(TicketId::get))
            .collect()
    }

    #[test]
    fn limit_keeps_most_recent() {
        let records = records();
        let log = Log {
            limit: Some(3),
            ..Log::default()
        };

        assert_eq!(ids(&log.select(&records)), vec![2, 3, 4]);
    }

    #[test]
    fn outcome_filters_apply_before_limit() {
        let records = records();
        let rejected = Log {
            rejected: true,
            limit: Some(1),
            ..Log::default()
        };
        let approved = Log {
            approved: true,
            ..Log::default()
        };

        assert_eq!(ids(&rejected.select(&records)), vec![4]);
        assert_eq!(ids(&approved.select(&records)), vec![1, 3]);
    }
}
