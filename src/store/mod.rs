//! Durable per-user storage of accounts and semester results.
//!
//! Every backend implements [`ResultStore`]. Callers construct one with
//! [`crate::config::open_store`] (or a backend's own constructor) and pass it
//! in; nothing here is global.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, StoreResult};
use crate::record::{SemesterRecord, SubjectRow};

pub mod archive;
pub mod json;
pub mod memory;
pub mod sqlite;

pub use archive::ArchiveStore;
pub use json::JsonStore;
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// A registered user.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Account {
    /// Username (unique identifier for the user)
    pub username: String,

    /// Argon2 PHC string, never the plain password
    pub password_hash: String,

    pub full_name: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
}

impl Account {
    pub fn create(username: &str, password_hash: &str, full_name: &str, email: &str) -> Self {
        Account {
            username: username.to_string(),
            password_hash: password_hash.to_string(),
            full_name: full_name.to_string(),
            email: email.to_string(),
            created_at: Utc::now(),
            last_login: None,
        }
    }
}

/// Which backend a store is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    Memory,
    Json,
    Archive,
    Sqlite,
}

impl StoreKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreKind::Memory => "memory",
            StoreKind::Json => "json",
            StoreKind::Archive => "archive",
            StoreKind::Sqlite => "sqlite",
        }
    }
}

impl fmt::Display for StoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for StoreKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "memory" => Ok(StoreKind::Memory),
            "json" => Ok(StoreKind::Json),
            "archive" => Ok(StoreKind::Archive),
            "sqlite" => Ok(StoreKind::Sqlite),
            other => Err(ConfigError::UnknownBackend(other.to_string())),
        }
    }
}

/// Storage contract shared by all backends.
///
/// Records are unique per (username, academic year, term): saving an existing
/// key replaces its rows. Row order within a semester is preserved.
pub trait ResultStore: Send {
    /// `Ok(false)` if the username is already taken.
    fn create_account(
        &mut self,
        username: &str,
        password_hash: &str,
        full_name: &str,
        email: &str,
    ) -> StoreResult<bool>;

    fn get_account(&self, username: &str) -> StoreResult<Option<Account>>;

    /// Stamp `last_login` with the current time. Unknown users are ignored.
    fn record_login(&mut self, username: &str) -> StoreResult<()>;

    /// Upsert one semester. `Ok(false)` (and no change) when `rows` is empty.
    fn save(
        &mut self,
        username: &str,
        academic_year: &str,
        term: &str,
        rows: &[SubjectRow],
    ) -> StoreResult<bool>;

    fn fetch(&self, username: &str) -> StoreResult<Vec<SemesterRecord>>;

    /// `Ok(true)` if a record was removed.
    fn delete_semester(&mut self, username: &str, academic_year: &str, term: &str)
    -> StoreResult<bool>;

    /// Remove every record of a user. `Ok(true)` if anything was removed.
    fn clear(&mut self, username: &str) -> StoreResult<bool>;

    fn backend(&self) -> StoreKind;
}

/// Accounts and results held as plain maps. The memory, JSON and archive
/// backends differ only in where this lives between calls.
#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq)]
pub(crate) struct StoreState {
    pub accounts: BTreeMap<String, Account>,
    pub results: BTreeMap<String, Vec<SemesterRecord>>,
}

impl StoreState {
    pub fn create_account(
        &mut self,
        username: &str,
        password_hash: &str,
        full_name: &str,
        email: &str,
    ) -> bool {
        if self.accounts.contains_key(username) {
            return false;
        }
        self.accounts.insert(
            username.to_string(),
            Account::create(username, password_hash, full_name, email),
        );
        true
    }

    pub fn record_login(&mut self, username: &str) -> bool {
        match self.accounts.get_mut(username) {
            Some(account) => {
                account.last_login = Some(Utc::now());
                true
            }
            None => false,
        }
    }

    pub fn save(&mut self, username: &str, academic_year: &str, term: &str, rows: &[SubjectRow]) -> bool {
        if rows.is_empty() {
            return false;
        }
        let records = self.results.entry(username.to_string()).or_default();
        let fresh = SemesterRecord::create(academic_year, term, rows.to_vec());

        match records.iter_mut().find(|r| r.matches(academic_year, term)) {
            Some(existing) => *existing = fresh,
            None => records.push(fresh),
        }
        true
    }

    pub fn fetch(&self, username: &str) -> Vec<SemesterRecord> {
        self.results.get(username).cloned().unwrap_or_default()
    }

    pub fn delete_semester(&mut self, username: &str, academic_year: &str, term: &str) -> bool {
        let Some(records) = self.results.get_mut(username) else {
            return false;
        };
        let before = records.len();
        records.retain(|r| !r.matches(academic_year, term));
        let removed = records.len() != before;
        if records.is_empty() {
            self.results.remove(username);
        }
        removed
    }

    pub fn clear(&mut self, username: &str) -> bool {
        self.results
            .remove(username)
            .is_some_and(|records| !records.is_empty())
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_kind_parsing() {
        assert_eq!("SQLite".parse::<StoreKind>(), Ok(StoreKind::Sqlite));
        assert_eq!(" json ".parse::<StoreKind>(), Ok(StoreKind::Json));
        assert_eq!(
            "postgres".parse::<StoreKind>(),
            Err(ConfigError::UnknownBackend("postgres".to_string()))
        );
        assert_eq!(StoreKind::Archive.to_string(), "archive");
    }

    #[test]
    fn test_state_upsert_keeps_position() {
        let mut state = StoreState::default();
        let row = |name: &str| vec![SubjectRow::create(name)];
        state.save("u", "2023-24", "Semester 1", &row("A"));
        state.save("u", "2023-24", "Semester 2", &row("B"));
        state.save("u", "2023-24", "Semester 1", &row("C"));

        let records = state.fetch("u");
        assert_eq!(records[0].term, "Semester 1");
        assert_eq!(records[0].rows[0].subject, "C");
        assert_eq!(records[1].rows[0].subject, "B");
    }
}
