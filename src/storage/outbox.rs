//! A notifier that delivers messages to a local outbox file.
//!
//! Each message is appended as a plain-text block that a mail relay (or a
//! person) can pick up later.

use std::{
    fs::OpenOptions,
    io::Write,
    path::{Path, PathBuf},
    sync::LazyLock,
};

use chrono::{SecondsFormat, Utc};
use regex::Regex;

use crate::domain::{Contact, Notifier, NotifyError};

static EMAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9_.+-]+@[a-zA-Z0-9-]+\.[a-zA-Z0-9.-]+$").expect("valid email pattern")
});

/// Writes notifications to a file.
#[derive(Debug, Clone)]
pub struct Outbox {
    path: PathBuf,
}

impl Outbox {
    /// Creates an outbox writing to `path`. The file is created on first use.
    #[must_use]
    pub const fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// The outbox file's location.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Notifier for Outbox {
    fn notify(&self, contact: &Contact, subject: &str, body: &str) -> Result<(), NotifyError> {
        if !EMAIL.is_match(&contact.email) {
            return Err(NotifyError(format!(
                "invalid email address '{}'",
                contact.email
            )));
        }

        let message = format!(
            "Date: {}\nTo: {} <{}>\nSubject: {subject}\n\n{body}\n\n",
            Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            contact.name,
            contact.email,
        );
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .and_then(|mut file| file.write_all(message.as_bytes()))
            .map_err(|e| NotifyError(format!("failed to write outbox: {e}")))?;

        tracing::debug!(to = %contact.email, "queued notification");
        Ok(())
    }
}
