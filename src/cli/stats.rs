use std::path::PathBuf;

use clap::Parser;
use desk::{
    Desk, Priority, Statistics,
    domain::Bucket,
};
use serde::Serialize;
use tracing::instrument;

use super::terminal::{Colorize, is_narrow, percentage};

#[derive(Debug, Parser, Default)]
#[command(about = "Show approval statistics by category and priority")]
pub struct Stats {
    /// Output format (table, json)
    #[arg(long, value_name = "FORMAT", default_value = "table")]
    output: OutputFormat,
}

#[derive(Debug, Clone, Copy, Default, clap::ValueEnum)]
enum OutputFormat {
    #[default]
    Table,
    Json,
}

/// One row of the report; the rate is `None` when nothing was processed.
#[derive(Debug, PartialEq, Serialize)]
struct Row {
    label: String,
    approved: u64,
    rejected: u64,
    total: u64,
    approval_rate: Option<f64>,
}

impl Row {
    fn new(label: impl Into<String>, bucket: Bucket) -> Self {
        Self {
            label: label.into(),
            approved: bucket.approved,
            rejected: bucket.rejected,
            total: bucket.total(),
            approval_rate: bucket.approval_rate(),
        }
    }
}

#[derive(Debug, Serialize)]
struct Report {
    overall: Row,
    by_category: Vec<Row>,
    by_priority: Vec<Row>,
}

impl Report {
    fn new(stats: &Statistics) -> Self {
        Self {
            overall: Row::new("All", stats.overall()),
            by_category: stats
                .by_category
                .iter()
                .map(|(category, bucket)| Row::new(category.as_str(), *bucket))
                .collect(),
            // Every priority is listed, including those with nothing processed.
            by_priority: Priority::all()
                .map(|priority| Row::new(format!("P{priority}"), stats.priority(priority)))
                .collect(),
        }
    }
}

impl Stats {
    #[instrument(level = "debug", skip(self))]
    pub fn run(self, root: PathBuf) -> anyhow::Result<()> {
        let desk = Desk::open(root)?;
        let report = Report::new(desk.statistics());

        match self.output {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
            OutputFormat::Table => {
                if report.overall.total == 0 {
                    println!("No requests have been processed yet.");
                    return Ok(());
                }
                Self::output_table(&report);
            }
        }
        Ok(())
    }

    fn output_table(report: &Report) {
        println!(
            "Processed: {}  approved {}  rejected {}  rate {}",
            report.overall.total,
            report.overall.approved.to_string().success(),
            report.overall.rejected.to_string().warning(),
            percentage(report.overall.approval_rate)
        );

        for (title, rows) in [
            ("By category", &report.by_category),
            ("By priority", &report.by_priority),
        ] {
            println!();
            println!("{title}");
            println!("{}", "─".repeat(title.len()).dim());
            Self::output_rows(rows);
        }
    }

    fn output_rows(rows: &[Row]) {
        if is_narrow() {
            for row in rows {
                println!(
                    "{}: {}/{} ({})",
                    row.label,
                    row.approved,
                    row.total,
                    percentage(row.approval_rate)
                );
            }
            return;
        }

        let width = rows
            .iter()
            .map(|row| row.label.chars().count())
            .max()
            .unwrap_or(0)
            .max(8);
        println!(
            "{:<width$}  {:>8}  {:>8}  {:>6}  {:>7}",
            "", "Approved", "Rejected", "Total", "Rate"
        );
        for row in rows {
            let line = format!(
                "{:<width$}  {:>8}  {:>8}  {:>6}  {:>7}",
                row.label,
                row.approved,
                row.rejected,
                row.total,
                percentage(row.approval_rate)
            );
            if row.total == 0 {
                println!("{}", line.dim());
            } else {
                println!("{line}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use desk::Category;

    use super::*;

    #[test]
    fn report_lists_every_priority_with_guarded_rates() {
        let mut stats = Statistics::default();
        stats.record(&Category::It, Priority::new(2).unwrap(), true);
        stats.record(&Category::It, Priority::new(2).unwrap(), false);
        stats.record(&Category::Support, Priority::new(4).unwrap(), true);

        let report = Report::new(&stats);

        assert_eq!(report.overall.total, 3);
        assert_eq!(report.by_priority.len(), 5);
        assert_eq!(report.by_priority[0], Row::new("P1", Bucket::default()));
        assert_eq!(report.by_priority[0].approval_rate, None);
        assert_eq!(report.by_priority[1].approval_rate, Some(0.5));
        assert_eq!(
            report
                .by_category
                .iter()
                .map(|row| row.label.as_str())
                .collect::<Vec<_>>(),
            vec!["Support", "IT"]
        );
    }

    #[test]
    fn json_shows_missing_rate_as_null() {
        let report = Report::new(&Statistics::default());

        let json = serde_json::to_value(&report).unwrap();

        assert_eq!(json["overall"]["approval_rate"], serde_json::Value::Null);
        assert_eq!(json["by_category"], serde_json::json!([]));
    }
}
