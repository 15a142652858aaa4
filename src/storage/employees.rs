//! The employee directory, read from a JSON file.
//!
//! Only the fields needed to address notifications are read; any other
//! fields in the file are ignored.

use std::{collections::BTreeMap, fs, io, path::Path};

use serde::Deserialize;

use crate::domain::{Contact, ContactDirectory, SubjectId};

/// Employees known to the desk, keyed by id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EmployeeDirectory {
    contacts: BTreeMap<SubjectId, Contact>,
}

#[derive(Debug, Deserialize)]
struct DirectoryFile {
    #[serde(default)]
    employees: Vec<EmployeeEntry>,
}

#[derive(Debug, Deserialize)]
struct EmployeeEntry {
    employee_id: SubjectId,
    name: String,
    email: String,
}

/// Errors raised while loading the directory.
#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    /// The file could not be read.
    #[error("failed to read employee directory")]
    Io(#[from] io::Error),
    /// The file is not valid JSON.
    #[error("failed to parse employee directory")]
    Json(#[from] serde_json::Error),
}

impl EmployeeDirectory {
    /// Loads the directory from `path`. A missing file is an empty directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, DirectoryError> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::debug!("no employee directory at {}", path.display());
                return Ok(Self::default());
            }
            Err(e) => return Err(e.into()),
        };
        let file: DirectoryFile = serde_json::from_str(&content)?;
        Ok(file
            .employees
            .into_iter()
            .map(|entry| {
                (
                    entry.employee_id,
                    Contact {
                        name: entry.name,
                        email: entry.email,
                    },
                )
            })
            .collect())
    }

    /// Whether an employee with this id exists.
    #[must_use]
    pub fn contains(&self, subject: SubjectId) -> bool {
        self.contacts.contains_key(&subject)
    }

    /// The number of known employees.
    #[must_use]
    pub fn len(&self) -> usize {
        self.contacts.len()
    }

    /// Whether the directory is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.contacts.is_empty()
    }
}

impl FromIterator<(SubjectId, Contact)> for EmployeeDirectory {
    fn from_iter<I: IntoIterator<Item = (SubjectId, Contact)>>(iter: I) -> Self {
        Self {
            contacts: iter.into_iter().collect(),
        }
    }
}

impl ContactDirectory for EmployeeDirectory {
    fn find_contact(&self, subject: SubjectId) -> Option<Contact> {
        self.contacts.get(&subject).cloned()
    }
}
