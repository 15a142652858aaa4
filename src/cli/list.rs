use std::{fmt, path::PathBuf};

use anyhow::Context;
use clap::{Parser, ValueEnum};
use desk::{
    Category, Desk, Priority, SubjectId, Ticket,
    domain::{ReversibleQueue, TicketFilter},
};
use regex::Regex;
use serde::Serialize;
use tracing::instrument;

use super::terminal::{is_narrow, truncate};

const DEFAULT_LIMIT: usize = 200;
const DETAILS_WIDTH: usize = 48;

/// Command arguments for `desk list`.
#[derive(Debug, Parser, Default)]
#[command(about = "List pending requests with filters")]
pub struct List {
    /// Filter by category (case-insensitive).
    #[arg(long, short)]
    category: Option<Category>,

    /// Filter by priority (1-5).
    #[arg(long, short)]
    priority: Option<Priority>,

    /// Filter by employee id.
    #[arg(long, short)]
    employee: Option<SubjectId>,

    /// Case-insensitive substring match against the details.
    #[arg(long, conflicts_with = "regex")]
    contains: Option<String>,

    /// Regular expression match against the details.
    #[arg(long)]
    regex: Option<String>,

    /// Columns to display (comma-separated).
    #[arg(long, value_delimiter = ',', value_name = "COL")]
    columns: Vec<ListColumn>,

    /// Sort field (default: queue order).
    #[arg(long, value_enum, default_value_t)]
    sort: SortField,

    /// Output format (default: table).
    #[arg(long, value_enum, default_value_t)]
    output: OutputFormat,

    /// Suppress headers and format rows for scripting.
    #[arg(long)]
    quiet: bool,

    /// Limit number of rows returned.
    #[arg(long)]
    limit: Option<usize>,

    /// Skip the first N rows.
    #[arg(long)]
    offset: Option<usize>,
}

/// Supported output formats.
#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum, Default)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
    Csv,
}

/// Sortable fields.
#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum, Default)]
pub enum SortField {
    /// The order requests will be served in.
    #[default]
    Queue,
    /// Submission order.
    Id,
    /// Category name, then queue order.
    Category,
    /// Employee id, then queue order.
    Employee,
}

/// Available table columns.
#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum ListColumn {
    Id,
    Priority,
    Category,
    Employee,
    Submitted,
    Details,
}

#[derive(Debug)]
struct Filters {
    ticket: TicketFilter,
    employee: Option<SubjectId>,
    contains: Option<String>,
    regex: Option<Regex>,
}

#[derive(Debug, Serialize)]
struct SerializableRow<'a> {
    id: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    priority: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    category: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    employee: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    submitted: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<&'a str>,
}

impl List {
    #[instrument(level = "debug", skip_all)]
    pub fn run(self, root: PathBuf) -> anyhow::Result<()> {
        let desk = Desk::open(root)?;
        let tickets = self.select(desk.queue())?;

        if tickets.is_empty() && self.output == OutputFormat::Table && !self.quiet {
            println!("No pending requests match.");
            return Ok(());
        }

        match self.output {
            OutputFormat::Table => {
                render_table(&tickets, &self.columns, self.quiet);
                Ok(())
            }
            OutputFormat::Json => render_json(&tickets, &self.columns),
            OutputFormat::Csv => {
                render_csv(&tickets, &self.columns, self.quiet);
                Ok(())
            }
        }
    }

    fn select<'a>(&self, queue: &'a ReversibleQueue) -> anyhow::Result<Vec<&'a Ticket>> {
        let filters = Filters::new(self)?;
        let mut tickets: Vec<&Ticket> = queue
            .filter(filters.ticket.clone())
            .filter(|ticket| filters.matches(ticket))
            .collect();

        match self.sort {
            SortField::Queue => {}
            SortField::Id => tickets.sort_by_key(|ticket| ticket.id()),
            SortField::Category => tickets.sort_by(|a, b| a.category().cmp(b.category())),
            SortField::Employee => tickets.sort_by_key(|ticket| ticket.subject()),
        }

        let limit = self
            .limit
            .and_then(|value| (value > 0).then_some(value))
            .unwrap_or(DEFAULT_LIMIT);
        Ok(tickets
            .into_iter()
            .skip(self.offset.unwrap_or(0))
            .take(limit)
            .collect())
    }
}

impl Filters {
    fn new(cmd: &List) -> anyhow::Result<Self> {
        let regex = if let Some(pattern) = &cmd.regex {
            Some(Regex::new(pattern).with_context(|| format!("invalid regex: {pattern}"))?)
        } else {
            None
        };

        Ok(Self {
            ticket: TicketFilter {
                category: cmd.category.clone(),
                priority: cmd.priority,
            },
            employee: cmd.employee,
            contains: cmd.contains.as_deref().map(str::to_lowercase),
            regex,
        })
    }

    fn matches(&self, ticket: &Ticket) -> bool {
        if self.employee.is_some_and(|employee| ticket.subject() != employee) {
            return false;
        }
        if self
            .contains
            .as_ref()
            .is_some_and(|needle| !ticket.details().to_lowercase().contains(needle))
        {
            return false;
        }
        self.regex
            .as_ref()
            .is_none_or(|regex| regex.is_match(ticket.details()))
    }
}

fn selected_columns(columns: &[ListColumn], quiet: bool) -> Vec<ListColumn> {
    if !columns.is_empty() {
        return columns.to_vec();
    }
    if quiet {
        vec![ListColumn::Id]
    } else {
        vec![
            ListColumn::Id,
            ListColumn::Priority,
            ListColumn::Category,
            ListColumn::Employee,
            ListColumn::Submitted,
            ListColumn::Details,
        ]
    }
}

fn render_table(tickets: &[&Ticket], columns: &[ListColumn], quiet: bool) {
    let selected_columns = selected_columns(columns, quiet);

    if !quiet && is_narrow() {
        // Stacked output for narrow terminals
        for ticket in tickets {
            println!("{ticket}");
        }
        return;
    }

    let data: Vec<Vec<String>> = tickets
        .iter()
        .map(|ticket| {
            selected_columns
                .iter()
                .map(|column| column.value(ticket, !quiet))
                .collect()
        })
        .collect();

    if quiet {
        for row in data {
            println!("{}", row.join("\t"));
        }
        return;
    }

    let headers: Vec<&str> = selected_columns.iter().map(|column| column.header()).collect();

    // Determine column widths for alignment.
    let widths = headers
        .iter()
        .enumerate()
        .map(|(idx, header)| {
            data.iter()
                .map(|row| row[idx].chars().count())
                .max()
                .unwrap_or(0)
                .max(header.len())
        })
        .collect::<Vec<_>>();

    for (header, width) in headers.iter().zip(&widths) {
        print!("{header:<width$}  ");
    }
    println!();
    for width in &widths {
        print!("{:-<width$}  ", "");
    }
    println!();

    for row in data {
        for (value, width) in row.iter().zip(&widths) {
            print!("{value:<width$}  ");
        }
        println!();
    }
}

fn render_json(tickets: &[&Ticket], columns: &[ListColumn]) -> anyhow::Result<()> {
    let selected_columns = if columns.is_empty() {
        ListColumn::value_variants().to_vec()
    } else {
        columns.to_vec()
    };

    let rows_out: Vec<_> = tickets
        .iter()
        .map(|ticket| build_serializable_row(ticket, &selected_columns))
        .collect();

    serde_json::to_writer_pretty(std::io::stdout(), &rows_out)
        .context("failed to render json output")?;
    println!();
    Ok(())
}

fn render_csv(tickets: &[&Ticket], columns: &[ListColumn], quiet: bool) {
    let selected_columns = if columns.is_empty() {
        ListColumn::value_variants().to_vec()
    } else {
        columns.to_vec()
    };

    if !quiet {
        let header_line = selected_columns
            .iter()
            .map(|column| csv_escape(column.header()))
            .collect::<Vec<_>>()
            .join(",");
        println!("{header_line}");
    }

    for ticket in tickets {
        let values = selected_columns
            .iter()
            .map(|column| csv_escape(&column.value(ticket, false)))
            .collect::<Vec<_>>();
        println!("{}", values.join(","));
    }
}

fn build_serializable_row<'a>(ticket: &'a Ticket, columns: &[ListColumn]) -> SerializableRow<'a> {
    let mut row = SerializableRow {
        id: ticket.id().get(),
        priority: None,
        category: None,
        employee: None,
        submitted: None,
        details: None,
    };

    for column in columns {
        match column {
            ListColumn::Id => {}
            ListColumn::Priority => row.priority = Some(ticket.priority().get()),
            ListColumn::Category => row.category = Some(ticket.category().as_str()),
            ListColumn::Employee => row.employee = Some(ticket.subject().get()),
            ListColumn::Submitted => row.submitted = Some(ticket.created_at().to_rfc3339()),
            ListColumn::Details => row.details = Some(ticket.details()),
        }
    }

    row
}

fn csv_escape(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') || value.contains('\r') {
        let escaped = value.replace('"', "\"\"");
        format!("\"{escaped}\"")
    } else {
        value.to_string()
    }
}

impl ListColumn {
    const fn header(self) -> &'static str {
        match self {
            Self::Id => "ID",
            Self::Priority => "Pri",
            Self::Category => "Category",
            Self::Employee => "Employee",
            Self::Submitted => "Submitted",
            Self::Details => "Details",
        }
    }

    fn value(self, ticket: &Ticket, abbreviate: bool) -> String {
        match self {
            Self::Id => ticket.id().to_string(),
            Self::Priority => ticket.priority().to_string(),
            Self::Category => ticket.category().to_string(),
            Self::Employee => ticket.subject().to_string(),
            Self::Submitted if abbreviate => {
                ticket.created_at().format("%Y-%m-%d %H:%M").to_string()
            }
            Self::Submitted => ticket.created_at().to_rfc3339(),
            Self::Details if abbreviate => truncate(ticket.details(), DETAILS_WIDTH),
            Self::Details => ticket.details().to_string(),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Table => "table",
            Self::Json => "json",
            Self::Csv => "csv",
        })
    }
}
