use std::path::PathBuf;

use clap::Parser;
use desk::Desk;
use tracing::instrument;

use super::terminal::{Colorize, percentage, truncate};

#[derive(Debug, Parser, Default)]
#[command(about = "Show the pending queue and processing totals")]
pub struct Status {
    /// Output format (table, json)
    #[arg(long, value_name = "FORMAT", default_value = "table")]
    output: OutputFormat,

    /// Suppress headers and format for scripting
    #[arg(long)]
    quiet: bool,
}

#[derive(Debug, Clone, Copy, Default, clap::ValueEnum)]
enum OutputFormat {
    #[default]
    Table,
    Json,
}

impl Status {
    #[instrument(level = "debug", skip(self))]
    pub fn run(self, root: PathBuf) -> anyhow::Result<()> {
        let desk = Desk::open(root)?;

        match self.output {
            OutputFormat::Json => Self::output_json(&desk)?,
            OutputFormat::Table if self.quiet => Self::output_quiet(&desk),
            OutputFormat::Table => Self::output_table(&desk),
        }
        Ok(())
    }

    fn output_json(desk: &Desk) -> anyhow::Result<()> {
        use serde_json::json;

        let queue = desk.queue();
        let stats = desk.statistics();
        let output = json!({
            "pending": queue.len(),
            "next": queue.peek(),
            "processed": {
                "total": stats.total_processed,
                "approved": stats.approved,
                "rejected": stats.rejected,
                "approval_rate": stats.overall().approval_rate(),
            },
            "undo_available": queue.undo_history().len(),
            "redo_available": queue.redo_history().len(),
            "skipped_log_lines": desk.skipped_log_lines(),
        });

        println!("{}", serde_json::to_string_pretty(&output)?);
        Ok(())
    }

    fn output_quiet(desk: &Desk) {
        let stats = desk.statistics();
        println!(
            "pending={} processed={} approved={} rejected={}",
            desk.queue().len(),
            stats.total_processed,
            stats.approved,
            stats.rejected
        );
    }

    fn output_table(desk: &Desk) {
        let queue = desk.queue();
        let stats = desk.statistics();

        println!("Request desk");
        println!("{}", "────────────".dim());

        match queue.peek() {
            None => println!("Pending: {} ✅", "0".success()),
            Some(next) => {
                println!("Pending: {}", queue.len().to_string().info());
                println!(
                    "Next:    {} P{} {} (employee {}) {}",
                    next.id(),
                    next.priority(),
                    next.category(),
                    next.subject(),
                    truncate(next.details(), 40).dim()
                );
            }
        }

        println!();
        println!(
            "Processed: {} (approved {}, rejected {}, approval rate {})",
            stats.total_processed,
            stats.approved.to_string().success(),
            stats.rejected.to_string().warning(),
            percentage(stats.overall().approval_rate())
        );

        if !queue.undo_history().is_empty() || !queue.redo_history().is_empty() {
            println!(
                "{}",
                format!(
                    "History: {} undoable, {} redoable",
                    queue.undo_history().len(),
                    queue.redo_history().len()
                )
                .dim()
            );
        }

        if desk.skipped_log_lines() > 0 {
            println!();
            println!(
                "Audit log: {} malformed line(s) skipped ⚠️",
                desk.skipped_log_lines().to_string().warning()
            );
            println!("{}", "Run 'desk log' to inspect the log.".dim());
        }
    }
}
