use std::path::PathBuf;

use clap::Parser;
use desk::{
    Category, Desk, Disposition, RejectionReason, Ticket, TicketId,
    domain::{Notification, Processed, ReversibleQueue, Selection, TicketFilter},
};
use dialoguer::{Input, Select};
use tracing::instrument;

use super::terminal::{Colorize, is_interactive};

/// Approve or reject a pending request.
///
/// Without `--approve` or `--reject` the decision is asked for interactively.
#[derive(Debug, Parser, Default)]
pub struct Process {
    /// Process this request instead of the next one in line.
    #[arg(long, conflicts_with = "category")]
    id: Option<TicketId>,

    /// Process the next request in this category.
    #[arg(long, short)]
    category: Option<Category>,

    /// Approve the request.
    #[arg(long, conflicts_with = "reject")]
    approve: bool,

    /// Reject the request.
    #[arg(long)]
    reject: bool,

    /// Why the request is rejected: a catalog reason or free text.
    #[arg(long, requires = "reject")]
    reason: Option<String>,
}

impl Process {
    #[instrument(skip(self))]
    pub fn run(self, root: PathBuf) -> anyhow::Result<()> {
        let mut desk = Desk::open(root)?;

        let Some(ticket) = self.preview(desk.queue())? else {
            println!("{}", self.nothing_to_process().warning());
            return Ok(());
        };
        let selection = Selection::Ticket(ticket.id());

        println!("{}", "Processing request:".info());
        println!("{ticket}");

        let Some(disposition) = self.decide()? else {
            println!(
                "{}",
                "Processing cancelled. Request remains in queue.".warning()
            );
            return Ok(());
        };

        let processed = desk.process(selection, disposition)?;
        desk.flush()?;
        report(&processed);
        Ok(())
    }

    /// The ticket that will be processed, if any is pending.
    fn preview(&self, queue: &ReversibleQueue) -> anyhow::Result<Option<Ticket>> {
        if let Some(id) = self.id {
            return queue
                .get(id)
                .cloned()
                .map(Some)
                .ok_or_else(|| anyhow::anyhow!("request {id} is not in the queue"));
        }
        let ticket = match &self.category {
            Some(category) => queue
                .filter(TicketFilter {
                    category: Some(category.clone()),
                    priority: None,
                })
                .next(),
            None => queue.peek(),
        };
        Ok(ticket.cloned())
    }

    fn nothing_to_process(&self) -> String {
        self.category.as_ref().map_or_else(
            || "No requests to process!".to_string(),
            |category| format!("No pending {category} requests"),
        )
    }

    fn decide(&self) -> anyhow::Result<Option<Disposition>> {
        if self.approve {
            return Ok(Some(Disposition::Approved));
        }
        if self.reject {
            let reason = match &self.reason {
                Some(text) => RejectionReason::from_text(text)?,
                None => match prompt_reason()? {
                    Some(reason) => reason,
                    None => return Ok(None),
                },
            };
            return Ok(Some(Disposition::Rejected(reason)));
        }
        prompt_disposition()
    }
}

fn require_terminal(hint: &str) -> anyhow::Result<()> {
    if !is_interactive() {
        anyhow::bail!("not running in a terminal; {hint}");
    }
    Ok(())
}

fn prompt_disposition() -> anyhow::Result<Option<Disposition>> {
    require_terminal("pass --approve or --reject")?;

    let choice = Select::new()
        .with_prompt("Choose action")
        .items(&["Approve request", "Reject request", "Cancel"])
        .default(0)
        .interact()?;
    match choice {
        0 => Ok(Some(Disposition::Approved)),
        1 => Ok(prompt_reason()?.map(Disposition::Rejected)),
        _ => Ok(None),
    }
}

fn prompt_reason() -> anyhow::Result<Option<RejectionReason>> {
    require_terminal("pass --reason")?;

    let mut items: Vec<String> = RejectionReason::CATALOG
        .into_iter()
        .map(String::from)
        .collect();
    items.extend(["Other (specify)".to_string(), "Cancel".to_string()]);

    let choice = Select::new()
        .with_prompt("Select rejection reason")
        .items(&items)
        .default(0)
        .interact()?;

    if let Some(reason) = RejectionReason::CATALOG.into_iter().nth(choice) {
        return Ok(Some(reason));
    }
    if choice == RejectionReason::CATALOG.len() {
        let text: String = Input::new()
            .with_prompt("Enter rejection reason")
            .validate_with(|input: &String| {
                RejectionReason::from_text(input)
                    .map(|_| ())
                    .map_err(|e| e.to_string())
            })
            .interact_text()?;
        return Ok(Some(RejectionReason::from_text(&text)?));
    }
    Ok(None)
}

fn report(processed: &Processed) {
    let id = processed.ticket.id();
    match &processed.record.disposition {
        Disposition::Approved => {
            println!("{}", format!("✅ Request {id} approved").success());
        }
        Disposition::Rejected(reason) => {
            println!("{}", format!("Request {id} rejected: {reason}").warning());
        }
    }

    match &processed.notification {
        Notification::Sent => println!("{}", "Requester notified.".dim()),
        Notification::Disabled => {}
        Notification::NoContact => println!(
            "{}",
            format!(
                "No contact details for employee {}; requester not notified.",
                processed.ticket.subject()
            )
            .warning()
        ),
        Notification::Failed(error) => {
            println!("{}", format!("Notification failed: {error}").warning());
        }
    }
}
