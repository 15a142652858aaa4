use std::path::{Path, PathBuf};

mod list;
mod log;
mod process;
mod stats;
mod status;
mod terminal;

use anyhow::Context;
use clap::ArgAction;
use desk::{
    Category, Desk, Priority, SubjectId,
    domain::{Operation, QueueError},
    storage::STATE_DIR,
};
use dialoguer::Confirm;
use list::List;
use log::Log;
use process::Process;
use stats::Stats;
use status::Status;
use terminal::{Colorize, is_interactive, truncate};
use tracing::instrument;

#[derive(Debug, clap::Parser)]
#[command(version, about)]
pub struct Cli {
    /// Verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = ArgAction::Count, global=true)]
    verbose: u8,

    /// The directory holding the request desk
    #[arg(short, long, default_value = ".", global = true)]
    root: PathBuf,

    #[command(subcommand)]
    command: Option<Command>,
}

impl Cli {
    pub fn run(self) -> anyhow::Result<()> {
        Self::setup_logging(self.verbose);

        self.command
            .unwrap_or_else(|| Command::Status(Status::default()))
            .run(self.root)
    }

    fn setup_logging(verbosity: u8) {
        use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

        let level = match verbosity {
            0 => tracing::Level::WARN,
            1 => tracing::Level::INFO,
            2 => tracing::Level::DEBUG,
            _ => tracing::Level::TRACE,
        };

        let filter = tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into());

        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .with_thread_names(false)
            .with_line_number(false);

        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer)
            .init();
    }
}

#[derive(Debug, clap::Parser)]
pub enum Command {
    /// Show the pending queue and processing totals (default)
    Status(Status),

    /// Initialize a new request desk
    Init,

    /// Submit a new request
    Submit(Submit),

    /// List pending requests
    List(List),

    /// Approve or reject a pending request
    Process(Process),

    /// Undo the last queue operation
    ///
    /// Undo restores queue membership only. A processed request that is put
    /// back in the queue stays in the audit log and statistics.
    Undo,

    /// Redo the last undone queue operation
    Redo,

    /// Show the undo and redo history
    History(History),

    /// Show approval statistics
    Stats(Stats),

    /// Show the processed requests log
    Log(Log),

    /// Export the pending queue and statistics as JSON
    Export(Export),
}

impl Command {
    fn run(self, root: PathBuf) -> anyhow::Result<()> {
        match self {
            Self::Status(command) => command.run(root)?,
            Self::Init => init(&root)?,
            Self::Submit(command) => command.run(root)?,
            Self::List(command) => command.run(root)?,
            Self::Process(command) => command.run(root)?,
            Self::Undo => undo(root)?,
            Self::Redo => redo(root)?,
            Self::History(command) => command.run(root)?,
            Self::Stats(command) => command.run(root)?,
            Self::Log(command) => command.run(root)?,
            Self::Export(command) => command.run(root)?,
        }
        Ok(())
    }
}

#[instrument]
fn init(root: &Path) -> anyhow::Result<()> {
    let state_dir = Desk::init(root)?;

    println!("Initialized request desk in {}", root.display());
    println!("  Created: {STATE_DIR}/config.toml");
    println!();
    println!(
        "Employee contacts are read from {}",
        state_dir.join("employees.json").display()
    );
    println!();
    println!("Next steps:");
    println!("  desk submit --employee 10001 --category IT --priority 2 \"VPN access issue\"");

    Ok(())
}

#[derive(Debug, clap::Parser)]
pub struct Submit {
    /// The id of the employee raising the request.
    #[arg(long, short)]
    employee: SubjectId,

    /// The request category (Logistics, Maintenance, Support, Technical, IT,
    /// or any other name).
    #[arg(long, short)]
    category: Category,

    /// Priority from 1 (most urgent) to 5.
    #[arg(long, short)]
    priority: Priority,

    /// What is being requested.
    details: String,

    /// Queue the request even if a similar one is already pending.
    #[arg(long, short)]
    yes: bool,
}

impl Submit {
    #[instrument(skip(self))]
    fn run(self, root: PathBuf) -> anyhow::Result<()> {
        let mut desk = Desk::open(root)?;

        if !desk.employees().is_empty() && !desk.employees().contains(self.employee) {
            anyhow::bail!("employee {} not found in the directory", self.employee);
        }

        if desk.config().warn_on_duplicates && !self.yes {
            let similar = desk.similar_pending(self.employee, &self.category, &self.details);
            if !similar.is_empty() {
                println!("{}", "Similar pending requests found:".warning());
                for ticket in &similar {
                    println!(
                        "  {} priority {}, submitted {}",
                        ticket.id(),
                        ticket.priority(),
                        ticket.created_at().format("%Y-%m-%d")
                    );
                }
                if !confirm("A similar request already exists. Add anyway?")? {
                    println!("{}", "Request not added.".warning());
                    return Ok(());
                }
            }
        }

        let ticket = desk.submit(self.employee, self.category, self.priority, self.details);
        desk.flush()?;

        println!(
            "{}",
            format!("✅ Request {} queued for employee {}", ticket.id(), ticket.subject()).success()
        );
        println!("Type: {}, Priority: {}", ticket.category(), ticket.priority());
        println!("Details: {}", truncate(ticket.details(), 50));
        Ok(())
    }
}

fn confirm(prompt: &str) -> anyhow::Result<bool> {
    if !is_interactive() {
        anyhow::bail!("{prompt} (not running in a terminal; pass --yes to confirm)");
    }
    Ok(Confirm::new()
        .with_prompt(prompt)
        .default(false)
        .interact()?)
}

#[instrument]
fn undo(root: PathBuf) -> anyhow::Result<()> {
    let mut desk = Desk::open(root)?;
    let outcome = desk.undo().map(describe_undo);
    // A failed undo still consumes the history entry, so always persist.
    desk.flush()?;
    report_history_step(outcome)
}

#[instrument]
fn redo(root: PathBuf) -> anyhow::Result<()> {
    let mut desk = Desk::open(root)?;
    let outcome = desk.redo().map(describe_redo);
    desk.flush()?;
    report_history_step(outcome)
}

fn describe_undo(op: &Operation) -> String {
    match op {
        Operation::Insert(ticket) => format!("Undo: removed request {}", ticket.id()),
        Operation::Remove(ticket) => format!("Undo: restored request {}", ticket.id()),
    }
}

fn describe_redo(op: &Operation) -> String {
    match op {
        Operation::Insert(ticket) => format!("Redo: added request {}", ticket.id()),
        Operation::Remove(ticket) => format!("Redo: removed request {}", ticket.id()),
    }
}

fn report_history_step(outcome: Result<String, QueueError>) -> anyhow::Result<()> {
    match outcome {
        Ok(message) => {
            println!("{}", message.success());
            Ok(())
        }
        Err(error @ (QueueError::NothingToUndo | QueueError::NothingToRedo)) => {
            println!("{}", format!("{error}!").warning());
            Ok(())
        }
        Err(error) => Err(error.into()),
    }
}

#[derive(Debug, clap::Parser)]
pub struct History {
    /// Show at most N entries per stack.
    #[arg(long, short = 'n', default_value_t = 10)]
    limit: usize,
}

impl History {
    #[instrument(skip(self))]
    fn run(self, root: PathBuf) -> anyhow::Result<()> {
        let desk = Desk::open(root)?;
        let queue = desk.queue();

        for (title, stack) in [
            ("Undo history", queue.undo_history()),
            ("Redo history", queue.redo_history()),
        ] {
            println!("{title}");
            println!("{}", "─".repeat(title.len()).dim());
            if stack.is_empty() {
                println!("{}", "  (empty)".dim());
            }
            // Most recent first.
            for op in stack.iter().rev().take(self.limit) {
                let ticket = op.ticket();
                println!(
                    "  {:<6} {} P{} {} (employee {})",
                    op.label(),
                    ticket.id(),
                    ticket.priority(),
                    ticket.category(),
                    ticket.subject()
                );
            }
            if stack.len() > self.limit {
                println!("  ... and {} more", stack.len() - self.limit);
            }
            println!();
        }
        Ok(())
    }
}

#[derive(Debug, clap::Parser)]
pub struct Export {
    /// Write to this file instead of stdout.
    #[arg(long, short)]
    output: Option<PathBuf>,
}

impl Export {
    #[instrument(skip(self))]
    fn run(self, root: PathBuf) -> anyhow::Result<()> {
        let desk = Desk::open(root)?;
        let json = serde_json::to_string_pretty(&desk.snapshot())?;

        match self.output {
            Some(path) => {
                std::fs::write(&path, json)
                    .with_context(|| format!("failed to write {}", path.display()))?;
                println!("Exported snapshot to {}", path.display());
            }
            None => println!("{json}"),
        }
        Ok(())
    }
}
