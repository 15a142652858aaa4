use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Configuration for a request desk.
///
/// File locations are relative to the desk's state directory (`.desk/`)
/// unless given as absolute paths.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Versions", into = "Versions")]
pub struct Config {
    /// The append-only log of processed requests.
    audit_log: PathBuf,

    /// Where the pending queue and its undo/redo history are kept between
    /// runs.
    queue_file: PathBuf,

    /// JSON employee directory used to address notifications.
    employees: PathBuf,

    /// File that notification messages are delivered to.
    outbox: PathBuf,

    /// Whether requesters are notified of dispositions.
    pub notify: bool,

    /// Whether to ask for confirmation before queueing a request that looks
    /// like one already pending.
    pub warn_on_duplicates: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            audit_log: default_audit_log(),
            queue_file: default_queue_file(),
            employees: default_employees(),
            outbox: default_outbox(),
            notify: true,
            warn_on_duplicates: true,
        }
    }
}

impl Config {
    /// Reads the desk settings from `path`.
    ///
    /// # Errors
    ///
    /// Returns a message naming `path` if it is unreadable or not valid
    /// settings TOML.
    pub fn load(path: &Path) -> Result<Self, String> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read desk config {}: {e}", path.display()))?;
        toml::from_str(&text)
            .map_err(|e| format!("Invalid desk config {}: {e}", path.display()))
    }

    /// Writes the desk settings to `path`, replacing what was there.
    ///
    /// # Errors
    ///
    /// Returns a message naming `path` if it cannot be written.
    pub fn save(&self, path: &Path) -> Result<(), String> {
        let text = toml::to_string_pretty(self)
            .map_err(|e| format!("Failed to encode desk config: {e}"))?;
        std::fs::write(path, text)
            .map_err(|e| format!("Failed to write desk config {}: {e}", path.display()))
    }

    /// Location of the audit log within `state_dir`.
    #[must_use]
    pub fn audit_log_path(&self, state_dir: &Path) -> PathBuf {
        state_dir.join(&self.audit_log)
    }

    /// Location of the persisted queue within `state_dir`.
    #[must_use]
    pub fn queue_path(&self, state_dir: &Path) -> PathBuf {
        state_dir.join(&self.queue_file)
    }

    /// Location of the employee directory within `state_dir`.
    #[must_use]
    pub fn employees_path(&self, state_dir: &Path) -> PathBuf {
        state_dir.join(&self.employees)
    }

    /// Location of the notification outbox within `state_dir`.
    #[must_use]
    pub fn outbox_path(&self, state_dir: &Path) -> PathBuf {
        state_dir.join(&self.outbox)
    }
}

fn default_audit_log() -> PathBuf {
    PathBuf::from("processed_requests.log")
}

fn default_queue_file() -> PathBuf {
    PathBuf::from("queue.json")
}

fn default_employees() -> PathBuf {
    PathBuf::from("employees.json")
}

fn default_outbox() -> PathBuf {
    PathBuf::from("outbox.txt")
}

const fn enabled() -> bool {
    true
}

/// The serialized versions of the configuration.
/// This allows for future changes to the configuration format and to the domain
/// type without breaking compatibility.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "_version")]
enum Versions {
    #[serde(rename = "1")]
    V1 {
        #[serde(default = "default_audit_log")]
        audit_log: PathBuf,

        #[serde(default = "default_queue_file")]
        queue_file: PathBuf,

        #[serde(default = "default_employees")]
        employees: PathBuf,

        #[serde(default = "default_outbox")]
        outbox: PathBuf,

        #[serde(default = "enabled")]
        notify: bool,

        #[serde(default = "enabled")]
        warn_on_duplicates: bool,
    },
}

impl From<Versions> for Config {
    fn from(versions: Versions) -> Self {
        match versions {
            Versions::V1 {
                audit_log,
                queue_file,
                employees,
                outbox,
                notify,
                warn_on_duplicates,
            } => Self {
                audit_log,
                queue_file,
                employees,
                outbox,
                notify,
                warn_on_duplicates,
            },
        }
    }
}

impl From<Config> for Versions {
    fn from(config: Config) -> Self {
        Self::V1 {
            audit_log: config.audit_log,
            queue_file: config.queue_file,
            employees: config.employees,
            outbox: config.outbox,
            notify: config.notify,
            warn_on_duplicates: config.warn_on_duplicates,
        }
    }
}
