//! The append-only log of processed requests.
//!
//! Each disposition is one line:
//!
//! ```text
//! 2025-02-04T09:00:00.000000Z | REJECTED: Budget constraints | ticket=3 | subject=10001 | category=IT | priority=3 | created=2025-02-03T09:00:00.000000Z | details=VPN access issue
//! ```
//!
//! The first two fields are positional (log time and disposition tag); the
//! rest are `key=value` pairs in any order. Unknown keys are ignored so newer
//! writers can add fields without breaking older readers. A literal `|`,
//! backslash or line break inside a value is escaped with a backslash.
//!
//! Logs written by the earlier desk tool use a comma-separated layout and are
//! still read, without ticket ids:
//!
//! ```text
//! 2025-02-04 09:00:00.250000: REJECTED: Employee ID: 10001, Type: IT, Priority: 3, Details: VPN access issue, Status: REJECTED: Budget constraints, Timestamp: 2025-02-03 09:00:00.123456
//! ```
//!
//! Replay treats every line independently. A line that cannot be parsed is
//! counted and skipped, so a crash halfway through a write never prevents the
//! rest of the log from loading.

use std::{
    collections::HashMap,
    fs::{File, OpenOptions},
    io::{self, BufRead, BufReader, Write},
    path::{Path, PathBuf},
    sync::LazyLock,
};

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use regex::Regex;
use tracing::instrument;

use crate::domain::{
    AuditSink, Category, Disposition, DispositionRecord, FieldError, Priority, RejectionReason,
    Statistics, SubjectId, TicketId,
};

const DELIMITER: char = '|';
const APPROVED: &str = "APPROVED";
const REJECTED_PREFIX: &str = "REJECTED:";

static COMMA_SEPARATED_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?<logged>\d{4}-\d{2}-\d{2} \d{2}:\d{2}:\d{2}(?:\.\d+)?): (?:APPROVED|REJECTED): Employee ID: (?<subject>[^,]*), Type: (?<category>.*?), Priority: (?<priority>[^,]*), Details: (?<details>.*), Status: (?<status>.*), Timestamp: (?<created>[^,]*)$",
    )
    .expect("valid log line pattern")
});

/// A file-backed, append-only audit log.
#[derive(Debug, Clone)]
pub struct AuditLog {
    path: PathBuf,
}

impl AuditLog {
    /// Opens the log at the given path. The file is created on first append.
    #[must_use]
    pub const fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// The log file's location.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads every record in the log.
    ///
    /// A missing file is an empty log. Malformed lines are skipped and
    /// counted in [`Replay::skipped`].
    ///
    /// # Errors
    ///
    /// Returns an error only if the file exists but cannot be read.
    #[instrument(level = "debug", skip(self), fields(path = %self.path.display()))]
    pub fn replay(&self) -> io::Result<Replay> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::debug!("no audit log yet");
                return Ok(Replay::default());
            }
            Err(e) => return Err(e),
        };
        Self::read(BufReader::new(file))
    }

    fn read<R: BufRead>(reader: R) -> io::Result<Replay> {
        let mut replay = Replay::default();
        for (index, raw) in reader.split(b'\n').enumerate() {
            let raw = raw?;
            let Ok(line) = std::str::from_utf8(&raw) else {
                tracing::warn!(line = index + 1, "skipping audit log line: not valid UTF-8");
                replay.skipped += 1;
                continue;
            };
            if line.trim().is_empty() {
                continue;
            }
            match parse_line(line) {
                Ok(record) => replay.records.push(record),
                Err(error) => {
                    tracing::warn!(line = index + 1, "skipping audit log line: {error}");
                    replay.skipped += 1;
                }
            }
        }
        tracing::debug!(
            records = replay.records.len(),
            skipped = replay.skipped,
            "replayed audit log"
        );
        Ok(replay)
    }
}

impl AuditSink for AuditLog {
    /// Appends the record as a single line with one write call, then syncs.
    ///
    /// The file handle is scoped to this call, so it is released on every
    /// path, including errors.
    fn append(&self, record: &DispositionRecord) -> io::Result<()> {
        let line = format_line(record);
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(line.as_bytes())?;
        file.sync_data()
    }
}

/// The outcome of reading the whole audit log.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Replay {
    /// Well-formed records, in file order.
    pub records: Vec<DispositionRecord>,
    /// Number of lines that could not be parsed.
    pub skipped: usize,
}

impl Replay {
    /// Rebuilds statistics from the replayed records.
    #[must_use]
    pub fn statistics(&self) -> Statistics {
        let mut stats = Statistics::default();
        stats.extend(self.records.iter().map(|record| {
            (
                &record.category,
                record.priority,
                record.disposition.is_approved(),
            )
        }));
        stats
    }
}

/// Errors describing why a single log line was skipped.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ParseError {
    /// A required field was absent.
    #[error("missing field '{0}'")]
    MissingField(&'static str),
    /// A timestamp could not be parsed.
    #[error("invalid timestamp '{0}'")]
    Timestamp(String),
    /// The disposition tag was not recognised.
    #[error("unrecognised disposition '{0}'")]
    Disposition(String),
    /// A field value failed validation.
    #[error("invalid {key}: {source}")]
    Field {
        /// The offending key.
        key: &'static str,
        /// What was wrong with it.
        source: FieldError,
    },
    /// The line ends in the middle of an escape sequence.
    #[error("dangling escape at end of line")]
    DanglingEscape,
}

/// Renders a record as one newline-terminated log line.
#[must_use]
pub fn format_line(record: &DispositionRecord) -> String {
    let mut fields = vec![
        timestamp(record.logged_at),
        escape(&record.disposition.to_string()),
    ];
    if let Some(id) = record.ticket {
        fields.push(format!("ticket={}", id.get()));
    }
    fields.extend([
        format!("subject={}", record.subject),
        format!("category={}", escape(record.category.as_str())),
        format!("priority={}", record.priority),
        format!("created={}", timestamp(record.created_at)),
        format!("details={}", escape(&record.details)),
    ]);
    let mut line = fields.join(" | ");
    line.push('\n');
    line
}

/// Parses one log line (without its trailing newline).
///
/// # Errors
///
/// Returns a [`ParseError`] describing the first problem found.
pub fn parse_line(line: &str) -> Result<DispositionRecord, ParseError> {
    if let Some(captures) = COMMA_SEPARATED_LINE.captures(line.trim_end_matches('\r')) {
        return parse_comma_separated(&captures);
    }
    let fields = split_fields(line)?;
    let mut fields = fields.into_iter();

    let logged_at = fields
        .next()
        .ok_or(ParseError::MissingField("timestamp"))
        .and_then(|field| parse_timestamp(&field))?;
    let disposition = fields
        .next()
        .ok_or(ParseError::MissingField("disposition"))
        .and_then(|field| parse_disposition(&field))?;

    let pairs: HashMap<String, String> = fields
        .filter_map(|field| {
            field
                .split_once('=')
                .map(|(key, value)| (key.trim().to_string(), value.trim().to_string()))
        })
        .collect();
    let get = |key: &'static str| {
        pairs
            .get(key)
            .map(String::as_str)
            .ok_or(ParseError::MissingField(key))
    };
    let field_error = |key: &'static str| move |source| ParseError::Field { key, source };

    let ticket = pairs
        .get("ticket")
        .map(|value| value.parse::<TicketId>().map_err(field_error("ticket")))
        .transpose()?;

    Ok(DispositionRecord {
        logged_at,
        disposition,
        ticket,
        subject: get("subject")?
            .parse::<SubjectId>()
            .map_err(field_error("subject"))?,
        category: get("category")?
            .parse::<Category>()
            .map_err(field_error("category"))?,
        priority: get("priority")?
            .parse::<Priority>()
            .map_err(field_error("priority"))?,
        details: get("details")?.to_string(),
        created_at: parse_timestamp(get("created")?)?,
    })
}

fn parse_comma_separated(captures: &regex::Captures<'_>) -> Result<DispositionRecord, ParseError> {
    let field_error = |key: &'static str| move |source| ParseError::Field { key, source };
    Ok(DispositionRecord {
        logged_at: parse_timestamp(&captures["logged"])?,
        disposition: parse_disposition(&captures["status"])?,
        ticket: None,
        subject: captures["subject"]
            .trim()
            .parse::<SubjectId>()
            .map_err(field_error("subject"))?,
        category: captures["category"]
            .parse::<Category>()
            .map_err(field_error("category"))?,
        priority: captures["priority"]
            .trim()
            .parse::<Priority>()
            .map_err(field_error("priority"))?,
        details: captures["details"].trim().to_string(),
        created_at: parse_timestamp(&captures["created"])?,
    })
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Accepts RFC 3339, and the space-separated local format of comma-separated
/// lines which is read as UTC.
fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, ParseError> {
    let value = value.trim();
    DateTime::parse_from_rfc3339(value)
        .map(|at| at.with_timezone(&Utc))
        .or_else(|_| {
            NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%.f")
                .map(|naive| naive.and_utc())
        })
        .map_err(|_| ParseError::Timestamp(value.to_string()))
}

fn parse_disposition(value: &str) -> Result<Disposition, ParseError> {
    let value = value.trim();
    if value == APPROVED {
        return Ok(Disposition::Approved);
    }
    let reason = value
        .strip_prefix(REJECTED_PREFIX)
        .ok_or_else(|| ParseError::Disposition(value.to_string()))?;
    RejectionReason::from_text(reason)
        .map(Disposition::Rejected)
        .map_err(|source| ParseError::Field {
            key: "reason",
            source,
        })
}

fn escape(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            DELIMITER => escaped.push_str("\\|"),
            '\n' => escaped.push_str("\\n"),
            '\r' => escaped.push_str("\\r"),
            c => escaped.push(c),
        }
    }
    escaped
}

/// Splits on unescaped delimiters, unescaping as it goes.
fn split_fields(line: &str) -> Result<Vec<String>, ParseError> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut chars = line.trim_end_matches('\r').chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next().ok_or(ParseError::DanglingEscape)? {
                'n' => current.push('\n'),
                'r' => current.push('\r'),
                other => current.push(other),
            },
            DELIMITER => fields.push(std::mem::take(&mut current).trim().to_string()),
            c => current.push(c),
        }
    }
    fields.push(current.trim().to_string());
    Ok(fields)
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn record(disposition: Disposition, details: &str) -> DispositionRecord {
        DispositionRecord {
            logged_at: Utc.with_ymd_and_hms(2025, 2, 4, 9, 0, 0).unwrap(),
            disposition,
            ticket: Some(TicketId::new(3)),
            subject: SubjectId::new(10001),
            category: Category::It,
            priority: Priority::new(3).unwrap(),
            details: details.to_string(),
            created_at: Utc.with_ymd_and_hms(2025, 2, 3, 9, 0, 0).unwrap(),
        }
    }

    fn budget() -> Disposition {
        Disposition::Rejected(RejectionReason::BudgetConstraints)
    }

    #[test]
    fn line_is_human_readable() {
        let line = format_line(&record(budget(), "VPN access issue"));

        assert_eq!(
            line,
            "2025-02-04T09:00:00.000000Z | REJECTED: Budget constraints | ticket=3 | \
             subject=10001 | category=IT | priority=3 | created=2025-02-03T09:00:00.000000Z | \
             details=VPN access issue\n"
        );
    }

    #[test]
    fn delimiters_and_newlines_in_values_survive() {
        let tricky = record(
            Disposition::Rejected(RejectionReason::from_text("Use form A|B \\ C").unwrap()),
            "line one\nline two | with pipe",
        );
        let line = format_line(&tricky);

        assert_eq!(line.matches('\n').count(), 1);
        assert_eq!(parse_line(line.trim_end()).unwrap(), tricky);
    }

    #[test]
    fn unknown_trailing_fields_are_ignored() {
        let line = format_line(&record(Disposition::Approved, "Chair replacement"));
        let extended = format!("{} | reviewer=ops-2 | score=7", line.trim_end());

        let parsed = parse_line(&extended).unwrap();

        assert_eq!(parsed, record(Disposition::Approved, "Chair replacement"));
    }

    #[test]
    fn comma_separated_approval_parses() {
        let line = "2025-02-04 09:00:00.250000: APPROVED: Employee ID: 10001, Type: IT, \
                    Priority: 2, Details: VPN, Status: APPROVED, \
                    Timestamp: 2025-02-03 09:00:00.123456";

        let parsed = parse_line(line).unwrap();

        assert_eq!(parsed.ticket, None);
        assert_eq!(parsed.disposition, Disposition::Approved);
        assert_eq!(parsed.subject, SubjectId::new(10001));
        assert_eq!(parsed.category, Category::It);
        assert_eq!(parsed.priority, Priority::new(2).unwrap());
        assert_eq!(parsed.details, "VPN");
        assert_eq!(
            parsed.logged_at,
            Utc.with_ymd_and_hms(2025, 2, 4, 9, 0, 0).unwrap() + chrono::Duration::milliseconds(250)
        );
        assert_eq!(
            parsed.created_at,
            Utc.with_ymd_and_hms(2025, 2, 3, 9, 0, 0).unwrap()
                + chrono::Duration::microseconds(123_456)
        );
    }

    #[test]
    fn comma_separated_rejection_keeps_reason_and_commas_in_details() {
        let line = "2025-02-04 09:00:00: REJECTED: Employee ID: 10007, Type: Others, \
                    Priority: 5, Details: Chairs, desks, lamps, \
                    Status: REJECTED: Budget constraints, Timestamp: 2025-02-01 08:00:00";

        let parsed = parse_line(line).unwrap();

        assert_eq!(parsed.disposition, budget());
        assert_eq!(parsed.category, Category::Other("Others".to_string()));
        assert_eq!(parsed.details, "Chairs, desks, lamps");
        assert_eq!(
            parsed.created_at,
            Utc.with_ymd_and_hms(2025, 2, 1, 8, 0, 0).unwrap()
        );
    }

    #[test]
    fn comma_separated_log_replays_into_statistics() {
        let log = "2025-02-04 09:00:00.250000: APPROVED: Employee ID: 10001, Type: IT, \
                   Priority: 2, Details: VPN, Status: APPROVED, \
                   Timestamp: 2025-02-03 09:00:00.123456\n\
                   2025-02-04 09:05:00.000001: REJECTED: Employee ID: 10002, Type: IT, \
                   Priority: 4, Details: New monitor required, \
                   Status: REJECTED: Budget constraints, Timestamp: 2025-02-03 10:00:00\n";

        let replay = AuditLog::read(log.as_bytes()).unwrap();

        assert_eq!(replay.skipped, 0);
        let stats = replay.statistics();
        assert_eq!(stats.approved, 1);
        assert_eq!(stats.rejected, 1);
    }

    #[test]
    fn malformed_lines_are_reported() {
        assert_eq!(
            parse_line("yesterday | APPROVED"),
            Err(ParseError::Timestamp("yesterday".to_string()))
        );
        assert_eq!(
            parse_line("2025-02-04T09:00:00Z | MAYBE"),
            Err(ParseError::Disposition("MAYBE".to_string()))
        );
        assert_eq!(
            parse_line("2025-02-04T09:00:00Z | APPROVED | subject=1"),
            Err(ParseError::MissingField("category"))
        );
        assert!(matches!(
            parse_line(
                "2025-02-04T09:00:00Z | APPROVED | subject=1 | category=IT | priority=9 | \
                 created=2025-02-04T09:00:00Z | details=x"
            ),
            Err(ParseError::Field {
                key: "priority",
                ..
            })
        ));
        assert_eq!(
            parse_line("2025-02-04T09:00:00Z | APPROVED\\"),
            Err(ParseError::DanglingEscape)
        );
    }

    #[test]
    fn replay_skips_corrupt_lines_between_good_ones() {
        let tmp = tempfile::tempdir().unwrap();
        let log = AuditLog::new(tmp.path().join("processed.log"));
        let first = record(Disposition::Approved, "Printer not working");
        let second = record(budget(), "Need HDMI cable");

        log.append(&first).unwrap();
        {
            let mut file = OpenOptions::new().append(true).open(log.path()).unwrap();
            file.write_all(b"2025-02-04T09:00:00Z | APPROVED | subj\n")
                .unwrap();
            file.write_all(&[0xff, 0xfe, b'\n']).unwrap();
        }
        log.append(&second).unwrap();

        let replay = log.replay().unwrap();

        assert_eq!(replay.records, vec![first, second]);
        assert_eq!(replay.skipped, 2);
    }

    #[test]
    fn truncated_final_line_does_not_block_replay() {
        let tmp = tempfile::tempdir().unwrap();
        let log = AuditLog::new(tmp.path().join("processed.log"));
        log.append(&record(Disposition::Approved, "Scanner calibration"))
            .unwrap();
        let partial = format_line(&record(budget(), "Power socket damaged"));
        {
            let mut file = OpenOptions::new().append(true).open(log.path()).unwrap();
            file.write_all(&partial.as_bytes()[..40]).unwrap();
        }

        let replay = log.replay().unwrap();

        assert_eq!(replay.records.len(), 1);
        assert_eq!(replay.skipped, 1);
    }

    #[test]
    fn replay_is_deterministic() {
        let tmp = tempfile::tempdir().unwrap();
        let log = AuditLog::new(tmp.path().join("processed.log"));
        for (i, disposition) in [Disposition::Approved, budget(), Disposition::Approved]
            .into_iter()
            .enumerate()
        {
            log.append(&record(disposition, &format!("request {i}")))
                .unwrap();
        }

        let first = log.replay().unwrap().statistics();
        let second = log.replay().unwrap().statistics();

        assert_eq!(first, second);
        assert_eq!(first.total_processed, 3);
        assert_eq!(first.approved, 2);
        assert_eq!(first.category(&Category::It).rejected, 1);
    }

    #[test]
    fn missing_log_replays_as_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let log = AuditLog::new(tmp.path().join("absent.log"));

        assert_eq!(log.replay().unwrap(), Replay::default());
    }
}
