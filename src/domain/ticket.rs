use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use non_empty_string::NonEmptyString;
use serde::{Deserialize, Serialize};

/// Stable identity of a ticket.
///
/// Ids are handed out by the queue from a monotonic counter, so two tickets
/// with identical fields can still be told apart, and a lower id always means
/// an earlier submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TicketId(u64);

impl TicketId {
    /// Wraps a raw sequence number.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Returns the raw sequence number.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TicketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl FromStr for TicketId {
    type Err = FieldError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s.trim().trim_start_matches('#');
        digits
            .parse()
            .map(Self)
            .map_err(|_| FieldError::TicketId(s.to_string()))
    }
}

/// The employee who raised a ticket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubjectId(u32);

impl SubjectId {
    /// Wraps a raw employee id.
    #[must_use]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Returns the raw employee id.
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for SubjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SubjectId {
    type Err = FieldError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse()
            .map(Self)
            .map_err(|_| FieldError::SubjectId(s.to_string()))
    }
}

/// The kind of service being requested.
///
/// The closed set covers the categories the desk is staffed for; anything
/// else is kept verbatim as [`Category::Other`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum Category {
    /// Deliveries, equipment moves, supplies.
    Logistics,
    /// Building and facilities repairs.
    Maintenance,
    /// General help-desk support.
    Support,
    /// Technical engineering requests.
    Technical,
    /// Computers, accounts and networking.
    It,
    /// A free-text category outside the closed set.
    Other(String),
}

impl Category {
    /// The closed set of named categories, in menu order.
    pub const NAMED: [Self; 5] = [
        Self::Logistics,
        Self::Maintenance,
        Self::Support,
        Self::Technical,
        Self::It,
    ];

    /// Returns the display name of the category.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Logistics => "Logistics",
            Self::Maintenance => "Maintenance",
            Self::Support => "Support",
            Self::Technical => "Technical",
            Self::It => "IT",
            Self::Other(text) => text,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = FieldError;

    /// Parses a category name case-insensitively.
    ///
    /// Names from the closed set always map to their variant, so
    /// `"it"` and `"IT"` are the same category. Any other non-empty text
    /// becomes [`Category::Other`].
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(FieldError::EmptyCategory);
        }
        let named = Self::NAMED
            .into_iter()
            .find(|category| category.as_str().eq_ignore_ascii_case(trimmed));
        Ok(named.unwrap_or_else(|| Self::Other(trimmed.to_string())))
    }
}

impl From<Category> for String {
    fn from(category: Category) -> Self {
        match category {
            Category::Other(text) => text,
            named => named.as_str().to_string(),
        }
    }
}

impl TryFrom<String> for Category {
    type Error = FieldError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Urgency of a ticket, from 1 (most urgent) to 5.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub struct Priority(u8);

impl Priority {
    /// The most urgent priority.
    pub const HIGHEST: Self = Self(1);
    /// The least urgent priority.
    pub const LOWEST: Self = Self(5);

    /// Creates a priority, checking that it lies in `1..=5`.
    ///
    /// # Errors
    ///
    /// Returns [`FieldError::Priority`] if the value is out of range.
    pub const fn new(value: u8) -> Result<Self, FieldError> {
        if value >= Self::HIGHEST.0 && value <= Self::LOWEST.0 {
            Ok(Self(value))
        } else {
            Err(FieldError::Priority(value as i64))
        }
    }

    /// Returns the numeric priority.
    #[must_use]
    pub const fn get(self) -> u8 {
        self.0
    }

    /// Iterates over every priority, most urgent first.
    pub fn all() -> impl Iterator<Item = Self> {
        (Self::HIGHEST.0..=Self::LOWEST.0).map(Self)
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Priority {
    type Err = FieldError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value: i64 = s
            .trim()
            .parse()
            .map_err(|_| FieldError::NotANumber(s.to_string()))?;
        u8::try_from(value)
            .map_err(|_| FieldError::Priority(value))
            .and_then(Self::new)
    }
}

impl From<Priority> for u8 {
    fn from(priority: Priority) -> Self {
        priority.0
    }
}

impl TryFrom<u8> for Priority {
    type Error = FieldError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

/// Why a ticket was turned down.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum RejectionReason {
    /// The request did not carry enough information to act on.
    IncompleteInformation,
    /// The request conflicts with company policy.
    PolicyViolation,
    /// There is no budget for the request.
    BudgetConstraints,
    /// The request cannot be handled at this time.
    TimingNotAppropriate,
    /// An operator-supplied reason.
    Other(NonEmptyString),
}

impl RejectionReason {
    /// The fixed catalog of reasons offered to operators.
    pub const CATALOG: [Self; 4] = [
        Self::IncompleteInformation,
        Self::PolicyViolation,
        Self::BudgetConstraints,
        Self::TimingNotAppropriate,
    ];

    /// Returns the human-readable reason text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::IncompleteInformation => "Incomplete information provided",
            Self::PolicyViolation => "Request not compliant with company policy",
            Self::BudgetConstraints => "Budget constraints",
            Self::TimingNotAppropriate => "Timing not appropriate",
            Self::Other(text) => text.as_str(),
        }
    }

    /// Builds a reason from free text, mapping catalog wording back onto the
    /// catalog entry.
    ///
    /// # Errors
    ///
    /// Returns [`FieldError::EmptyReason`] if the text is blank.
    pub fn from_text(text: &str) -> Result<Self, FieldError> {
        let trimmed = text.trim();
        if let Some(known) = Self::CATALOG
            .into_iter()
            .find(|reason| reason.as_str().eq_ignore_ascii_case(trimmed))
        {
            return Ok(known);
        }
        NonEmptyString::new(trimmed.to_string())
            .map(Self::Other)
            .map_err(|_| FieldError::EmptyReason)
    }
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<RejectionReason> for String {
    fn from(reason: RejectionReason) -> Self {
        reason.as_str().to_string()
    }
}

impl TryFrom<String> for RejectionReason {
    type Error = FieldError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_text(&value)
    }
}

/// The terminal outcome chosen for a ticket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    /// The request is granted.
    Approved,
    /// The request is turned down.
    Rejected(RejectionReason),
}

impl Disposition {
    /// Whether this disposition counts as an approval.
    #[must_use]
    pub const fn is_approved(&self) -> bool {
        matches!(self, Self::Approved)
    }
}

impl fmt::Display for Disposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Approved => f.write_str("APPROVED"),
            Self::Rejected(reason) => write!(f, "REJECTED: {reason}"),
        }
    }
}

/// Where a ticket is in its lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum Status {
    /// Waiting in the queue.
    Pending,
    /// Granted; terminal.
    Approved,
    /// Turned down; terminal.
    Rejected(RejectionReason),
}

impl Status {
    /// Whether the ticket is still waiting for a decision.
    #[must_use]
    pub const fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }
}

impl From<Disposition> for Status {
    fn from(disposition: Disposition) -> Self {
        match disposition {
            Disposition::Approved => Self::Approved,
            Disposition::Rejected(reason) => Self::Rejected(reason),
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => f.write_str("Pending"),
            Self::Approved => f.write_str("Approved"),
            Self::Rejected(reason) => write!(f, "Rejected: {reason}"),
        }
    }
}

/// A single employee service request.
///
/// Identity and content are fixed at creation. Only the status moves, and
/// only once: [`Ticket::resolve`] stamps the terminal state together with
/// `resolved_at`, which keeps the two in lockstep.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "TicketRecord")]
pub struct Ticket {
    id: TicketId,
    subject: SubjectId,
    category: Category,
    priority: Priority,
    details: String,
    created_at: DateTime<Utc>,
    status: Status,
    #[serde(skip_serializing_if = "Option::is_none")]
    resolved_at: Option<DateTime<Utc>>,
}

impl Ticket {
    /// Creates a pending ticket.
    #[must_use]
    pub const fn new(
        id: TicketId,
        subject: SubjectId,
        category: Category,
        priority: Priority,
        details: String,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            subject,
            category,
            priority,
            details,
            created_at,
            status: Status::Pending,
            resolved_at: None,
        }
    }

    /// The ticket's identity.
    #[must_use]
    pub const fn id(&self) -> TicketId {
        self.id
    }

    /// The employee who raised the ticket.
    #[must_use]
    pub const fn subject(&self) -> SubjectId {
        self.subject
    }

    /// The requested service category.
    #[must_use]
    pub const fn category(&self) -> &Category {
        &self.category
    }

    /// The ticket's urgency.
    #[must_use]
    pub const fn priority(&self) -> Priority {
        self.priority
    }

    /// Free-text description.
    #[must_use]
    pub fn details(&self) -> &str {
        &self.details
    }

    /// When the ticket was submitted.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Current lifecycle status.
    #[must_use]
    pub const fn status(&self) -> &Status {
        &self.status
    }

    /// When the ticket left the pending state, if it has.
    #[must_use]
    pub const fn resolved_at(&self) -> Option<DateTime<Utc>> {
        self.resolved_at
    }

    /// Moves the ticket to a terminal state.
    ///
    /// `at` is clamped to `created_at` so a skewed clock can never produce a
    /// ticket resolved before it existed.
    ///
    /// # Errors
    ///
    /// Returns [`AlreadyResolved`] if the ticket has already left the pending
    /// state.
    pub fn resolve(
        &mut self,
        disposition: Disposition,
        at: DateTime<Utc>,
    ) -> Result<(), AlreadyResolved> {
        if !self.status.is_pending() {
            return Err(AlreadyResolved(self.id));
        }
        self.status = disposition.into();
        self.resolved_at = Some(at.max(self.created_at));
        Ok(())
    }

    /// Whether this ticket looks like a resubmission of the given fields.
    ///
    /// Category and details are compared case-insensitively.
    #[must_use]
    pub fn resembles(&self, subject: SubjectId, category: &Category, details: &str) -> bool {
        self.subject == subject
            && self
                .category
                .as_str()
                .eq_ignore_ascii_case(category.as_str())
            && self.details.trim().eq_ignore_ascii_case(details.trim())
    }
}

impl fmt::Display for Ticket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Request {} [Employee: {}, Type: {}, Priority: {}, Status: {}, Details: {}, Time: {}]",
            self.id,
            self.subject,
            self.category,
            self.priority,
            self.status,
            self.details,
            self.created_at.format("%Y-%m-%d %H:%M:%S"),
        )
    }
}

/// Error returned when resolving a ticket that is no longer pending.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("ticket {0} has already been resolved")]
pub struct AlreadyResolved(pub TicketId);

/// Errors raised when a ticket field fails validation.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum FieldError {
    /// The priority was outside `1..=5`.
    #[error("priority must be between 1 and 5, got {0}")]
    Priority(i64),
    /// A numeric field could not be parsed.
    #[error("'{0}' is not a number")]
    NotANumber(String),
    /// The category was blank.
    #[error("category must not be empty")]
    EmptyCategory,
    /// A free-text rejection reason was blank.
    #[error("rejection reason must not be empty")]
    EmptyReason,
    /// The employee id could not be parsed.
    #[error("invalid employee id '{0}'")]
    SubjectId(String),
    /// The ticket id could not be parsed.
    #[error("invalid ticket id '{0}'")]
    TicketId(String),
    /// A stored ticket violates the status/resolution invariant.
    #[error("ticket {0} has inconsistent status and resolution time")]
    Resolution(TicketId),
}

/// The serialized shape of a ticket, validated on the way in.
#[derive(Debug, Deserialize)]
struct TicketRecord {
    id: TicketId,
    subject: SubjectId,
    category: Category,
    priority: Priority,
    details: String,
    created_at: DateTime<Utc>,
    status: Status,
    #[serde(default)]
    resolved_at: Option<DateTime<Utc>>,
}

impl TryFrom<TicketRecord> for Ticket {
    type Error = FieldError;

    fn try_from(record: TicketRecord) -> Result<Self, Self::Error> {
        let consistent = match record.resolved_at {
            None => record.status.is_pending(),
            Some(resolved_at) => !record.status.is_pending() && resolved_at >= record.created_at,
        };
        if !consistent {
            return Err(FieldError::Resolution(record.id));
        }
        Ok(Self {
            id: record.id,
            subject: record.subject,
            category: record.category,
            priority: record.priority,
            details: record.details,
            created_at: record.created_at,
            status: record.status,
            resolved_at: record.resolved_at,
        })
    }
}
