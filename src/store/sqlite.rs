//! Relational storage in a single SQLite database.

use std::path::Path;

use chrono::{DateTime, Utc};
use log::{info, warn};
use rusqlite::{Connection, OptionalExtension, params};

use crate::error::{StoreError, StoreResult};
use crate::record::{SemesterRecord, SubjectRow};
use crate::store::{Account, ResultStore, StoreKind};

/// Schema version for migration tracking.
pub const SCHEMA_VERSION: u32 = 2;

/// Create tables and indexes if they don't exist. Safe to call repeatedly.
pub fn initialize_schema(conn: &Connection) -> StoreResult<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        )",
        [],
    )?;

    let current_version: Option<u32> = conn
        .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| {
            row.get(0)
        })
        .optional()?;

    match current_version {
        None => {
            create_tables(conn)?;
            conn.execute(
                "INSERT INTO schema_version (version) VALUES (?1)",
                [SCHEMA_VERSION],
            )?;
        }
        Some(1) => {
            add_semester_sequence(conn)?;
            conn.execute("UPDATE schema_version SET version = ?1", [SCHEMA_VERSION])?;
            info!("Migrated SQLite schema from version 1 to {}", SCHEMA_VERSION);
        }
        Some(version) if version > SCHEMA_VERSION => {
            warn!(
                "Database schema version {} is newer than supported version {}",
                version, SCHEMA_VERSION
            );
        }
        Some(_) => {}
    }

    Ok(())
}

fn create_tables(conn: &Connection) -> StoreResult<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS users (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            username TEXT UNIQUE NOT NULL,
            password_hash TEXT NOT NULL,
            full_name TEXT NOT NULL,
            email TEXT NOT NULL,
            created_at TEXT NOT NULL,
            last_login TEXT
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS student_results (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            username TEXT NOT NULL,
            academic_year TEXT NOT NULL,
            semester TEXT NOT NULL,
            subject TEXT NOT NULL,
            ca_marks REAL NOT NULL DEFAULT 0,
            ese_marks REAL NOT NULL DEFAULT 0,
            lab_marks REAL NOT NULL DEFAULT 0,
            total_marks REAL NOT NULL DEFAULT 0,
            sgpa REAL NOT NULL DEFAULT 0,
            uploaded_at TEXT NOT NULL,
            semester_seq INTEGER NOT NULL DEFAULT 0
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_results_user_semester
            ON student_results(username, academic_year, semester)",
        [],
    )?;

    Ok(())
}

// Version 1 had no per-semester sequence; number existing semesters by
// their first row id so they keep upload order.
fn add_semester_sequence(conn: &Connection) -> StoreResult<()> {
    conn.execute_batch(
        "ALTER TABLE student_results ADD COLUMN semester_seq INTEGER NOT NULL DEFAULT 0;
         UPDATE student_results SET semester_seq = (
             SELECT MIN(r.id) FROM student_results r
             WHERE r.username = student_results.username
               AND r.academic_year = student_results.academic_year
               AND r.semester = student_results.semester
         );",
    )?;
    Ok(())
}

fn parse_timestamp(value: &str) -> StoreResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::invalid_data(format!("bad timestamp '{}': {}", value, e)))
}

/// SQLite-backed store. Saving a semester deletes its old rows and inserts
/// the new ones in one transaction.
///
/// Every semester carries a `semester_seq`: a re-saved semester keeps its
/// number, a new one gets the user's next number. Fetching orders by it, so
/// semesters come back in first-upload order like the other backends.
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open or create a database file and initialize the schema.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        if let Some(parent) = path.as_ref().parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path.as_ref())?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        initialize_schema(&conn)?;
        info!("Opened SQLite store at {}", path.as_ref().display());
        Ok(SqliteStore { conn })
    }

    /// A private in-memory database, mainly for tests.
    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(SqliteStore { conn })
    }
}

impl ResultStore for SqliteStore {
    fn create_account(
        &mut self,
        username: &str,
        password_hash: &str,
        full_name: &str,
        email: &str,
    ) -> StoreResult<bool> {
        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO users (username, password_hash, full_name, email, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                username,
                password_hash,
                full_name,
                email,
                Utc::now().to_rfc3339()
            ],
        )?;
        if inserted == 1 {
            info!("Registered user {}", username);
        }
        Ok(inserted == 1)
    }

    fn get_account(&self, username: &str) -> StoreResult<Option<Account>> {
        let row = self
            .conn
            .query_row(
                "SELECT username, password_hash, full_name, email, created_at, last_login
                 FROM users WHERE username = ?1",
                [username],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, Option<String>>(5)?,
                    ))
                },
            )
            .optional()?;

        let Some((username, password_hash, full_name, email, created_at, last_login)) = row else {
            return Ok(None);
        };

        Ok(Some(Account {
            username,
            password_hash,
            full_name,
            email,
            created_at: parse_timestamp(&created_at)?,
            last_login: last_login.as_deref().map(parse_timestamp).transpose()?,
        }))
    }

    fn record_login(&mut self, username: &str) -> StoreResult<()> {
        self.conn.execute(
            "UPDATE users SET last_login = ?1 WHERE username = ?2",
            params![Utc::now().to_rfc3339(), username],
        )?;
        Ok(())
    }

    fn save(
        &mut self,
        username: &str,
        academic_year: &str,
        term: &str,
        rows: &[SubjectRow],
    ) -> StoreResult<bool> {
        if rows.is_empty() {
            return Ok(false);
        }

        let uploaded_at = Utc::now().to_rfc3339();
        let tx = self.conn.transaction()?;
        let existing: Option<i64> = tx.query_row(
            "SELECT MIN(semester_seq) FROM student_results
             WHERE username = ?1 AND academic_year = ?2 AND semester = ?3",
            params![username, academic_year, term],
            |row| row.get(0),
        )?;
        let semester_seq = match existing {
            Some(seq) => seq,
            None => tx.query_row(
                "SELECT COALESCE(MAX(semester_seq), 0) + 1 FROM student_results
                 WHERE username = ?1",
                [username],
                |row| row.get::<_, i64>(0),
            )?,
        };
        tx.execute(
            "DELETE FROM student_results
             WHERE username = ?1 AND academic_year = ?2 AND semester = ?3",
            params![username, academic_year, term],
        )?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO student_results
                 (username, academic_year, semester, subject, ca_marks, ese_marks,
                  lab_marks, total_marks, sgpa, uploaded_at, semester_seq)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            )?;
            for row in rows {
                stmt.execute(params![
                    username,
                    academic_year,
                    term,
                    row.subject,
                    row.ca_marks,
                    row.ese_marks,
                    row.lab_marks,
                    row.total,
                    row.sgpa,
                    uploaded_at,
                    semester_seq,
                ])?;
            }
        }
        tx.commit()?;

        info!("Saved {} rows for {} ({} - {})", rows.len(), username, academic_year, term);
        Ok(true)
    }

    fn fetch(&self, username: &str) -> StoreResult<Vec<SemesterRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT academic_year, semester, subject, ca_marks, ese_marks, lab_marks,
                    total_marks, sgpa, uploaded_at
             FROM student_results
             WHERE username = ?1
             ORDER BY semester_seq, id",
        )?;

        let rows = stmt.query_map([username], |row| {
            let subject = SubjectRow::create(&row.get::<_, String>(2)?)
                .with_marks(row.get(3)?, row.get(4)?, row.get(5)?, row.get(6)?)
                .with_sgpa(row.get(7)?);
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                subject,
                row.get::<_, String>(8)?,
            ))
        })?;

        let mut records: Vec<SemesterRecord> = Vec::new();
        for row in rows {
            let (academic_year, term, subject, uploaded_at) = row?;
            match records.last_mut() {
                Some(record) if record.matches(&academic_year, &term) => record.rows.push(subject),
                _ => {
                    let mut record = SemesterRecord::create(&academic_year, &term, vec![subject]);
                    record.uploaded_at = parse_timestamp(&uploaded_at)?;
                    records.push(record);
                }
            }
        }
        Ok(records)
    }

    fn delete_semester(
        &mut self,
        username: &str,
        academic_year: &str,
        term: &str,
    ) -> StoreResult<bool> {
        let deleted = self.conn.execute(
            "DELETE FROM student_results
             WHERE username = ?1 AND academic_year = ?2 AND semester = ?3",
            params![username, academic_year, term],
        )?;
        Ok(deleted > 0)
    }

    fn clear(&mut self, username: &str) -> StoreResult<bool> {
        let deleted = self.conn.execute(
            "DELETE FROM student_results WHERE username = ?1",
            [username],
        )?;
        if deleted > 0 {
            info!("Cleared {} result rows for {}", deleted, username);
        }
        Ok(deleted > 0)
    }

    fn backend(&self) -> StoreKind {
        StoreKind::Sqlite
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::contract;
    use tempfile::TempDir;

    #[test]
    fn test_sqlite_store_contract() {
        contract::all(|| Box::new(SqliteStore::open_in_memory().unwrap()));
    }

    #[test]
    fn test_schema_is_idempotent() {
        let store = SqliteStore::open_in_memory().unwrap();
        initialize_schema(&store.conn).unwrap();
        initialize_schema(&store.conn).unwrap();
        let version: u32 = store
            .conn
            .query_row("SELECT version FROM schema_version", [], |row| row.get(0))
            .unwrap();
        assert_eq!(version, SCHEMA_VERSION);
    }

    #[test]
    fn test_upsert_leaves_one_set_of_rows() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let first = [SubjectRow::create("Math"), SubjectRow::create("Physics")];
        let second = [SubjectRow::create("Biology")];
        store.save("asha", "2024-25", "Semester 1", &first).unwrap();
        store.save("asha", "2024-25", "Semester 1", &second).unwrap();

        let count: i64 = store
            .conn
            .query_row(
                "SELECT COUNT(*) FROM student_results WHERE username = 'asha'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_version_one_database_is_migrated() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE schema_version (version INTEGER PRIMARY KEY);
             INSERT INTO schema_version (version) VALUES (1);
             CREATE TABLE users (
                 id INTEGER PRIMARY KEY AUTOINCREMENT,
                 username TEXT UNIQUE NOT NULL,
                 password_hash TEXT NOT NULL,
                 full_name TEXT NOT NULL,
                 email TEXT NOT NULL,
                 created_at TEXT NOT NULL,
                 last_login TEXT
             );
             CREATE TABLE student_results (
                 id INTEGER PRIMARY KEY AUTOINCREMENT,
                 username TEXT NOT NULL,
                 academic_year TEXT NOT NULL,
                 semester TEXT NOT NULL,
                 subject TEXT NOT NULL,
                 ca_marks REAL NOT NULL DEFAULT 0,
                 ese_marks REAL NOT NULL DEFAULT 0,
                 lab_marks REAL NOT NULL DEFAULT 0,
                 total_marks REAL NOT NULL DEFAULT 0,
                 sgpa REAL NOT NULL DEFAULT 0,
                 uploaded_at TEXT NOT NULL
             );
             INSERT INTO student_results (username, academic_year, semester, subject, uploaded_at)
             VALUES ('asha', '2024-25', 'Semester 9', 'Math', '2024-06-01T10:00:00+00:00'),
                    ('asha', '2024-25', 'Semester 10', 'OS', '2024-12-01T10:00:00+00:00');",
        )
        .unwrap();
        initialize_schema(&conn).unwrap();

        let mut store = SqliteStore { conn };
        store
            .save("asha", "2025-26", "Semester 11", &[SubjectRow::create("AI")])
            .unwrap();
        let terms: Vec<String> = store
            .fetch("asha")
            .unwrap()
            .into_iter()
            .map(|r| r.term)
            .collect();
        assert_eq!(terms, vec!["Semester 9", "Semester 10", "Semester 11"]);
    }

    #[test]
    fn test_file_database_persists() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("results.db");
        {
            let mut store = SqliteStore::open(&path).unwrap();
            store.create_account("ravi", "hash", "Ravi", "r@example.com").unwrap();
            store
                .save("ravi", "2024-25", "Semester 2", &[SubjectRow::create("OS").with_sgpa(8.1)])
                .unwrap();
        }
        let store = SqliteStore::open(&path).unwrap();
        assert_eq!(store.fetch("ravi").unwrap()[0].sgpa(), 8.1);
        assert!(store.get_account("ravi").unwrap().is_some());
    }
}
