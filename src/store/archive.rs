use std::fs::{self, File, create_dir_all};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use bincode::{deserialize_from, serialize_into};
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use log::info;

use crate::error::StoreResult;
use crate::record::{SemesterRecord, SubjectRow};
use crate::store::{Account, ResultStore, StoreKind, StoreState};

/// Default archive file name inside the data directory.
pub const ARCHIVE_FILE: &str = "results.bin.gz";

/// Whole-store snapshot in a single gzip-compressed bincode file.
///
/// The snapshot is kept in memory and rewritten after every mutation.
#[derive(Debug)]
pub struct ArchiveStore {
    path: PathBuf,
    state: StoreState,
}

impl ArchiveStore {
    /// Open an archive, starting empty if the file does not exist yet.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        let state = if path.exists() {
            load_snapshot(&path)?
        } else {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                create_dir_all(parent)?;
            }
            StoreState::default()
        };

        info!(
            "Opened archive store at {} ({} users)",
            path.display(),
            state.accounts.len()
        );
        Ok(ArchiveStore { path, state })
    }

    fn persist(&self) -> StoreResult<()> {
        save_snapshot(&self.state, &self.path)
    }
}

fn save_snapshot(state: &StoreState, path: &Path) -> StoreResult<()> {
    let staging = path.with_extension("tmp");
    {
        let file = File::create(&staging)?;
        let encoder = GzEncoder::new(file, Compression::default());
        let mut writer = BufWriter::new(encoder);
        serialize_into(&mut writer, state)?;
        writer.flush()?;
        let encoder = writer.into_inner().map_err(|e| e.into_error())?;
        encoder.finish()?;
    }
    fs::rename(&staging, path)?;
    Ok(())
}

fn load_snapshot(path: &Path) -> StoreResult<StoreState> {
    let file = File::open(path)?;
    let decoder = GzDecoder::new(file);
    let mut reader = BufReader::new(decoder);
    Ok(deserialize_from(&mut reader)?)
}

impl ResultStore for ArchiveStore {
    fn create_account(
        &mut self,
        username: &str,
        password_hash: &str,
        full_name: &str,
        email: &str,
    ) -> StoreResult<bool> {
        if !self
            .state
            .create_account(username, password_hash, full_name, email)
        {
            return Ok(false);
        }
        self.persist()?;
        Ok(true)
    }

    fn get_account(&self, username: &str) -> StoreResult<Option<Account>> {
        Ok(self.state.accounts.get(username).cloned())
    }

    fn record_login(&mut self, username: &str) -> StoreResult<()> {
        if self.state.record_login(username) {
            self.persist()?;
        }
        Ok(())
    }

    fn save(
        &mut self,
        username: &str,
        academic_year: &str,
        term: &str,
        rows: &[SubjectRow],
    ) -> StoreResult<bool> {
        if !self.state.save(username, academic_year, term, rows) {
            return Ok(false);
        }
        self.persist()?;
        info!("Saved {} rows for {} ({} - {})", rows.len(), username, academic_year, term);
        Ok(true)
    }

    fn fetch(&self, username: &str) -> StoreResult<Vec<SemesterRecord>> {
        Ok(self.state.fetch(username))
    }

    fn delete_semester(
        &mut self,
        username: &str,
        academic_year: &str,
        term: &str,
    ) -> StoreResult<bool> {
        let removed = self.state.delete_semester(username, academic_year, term);
        if removed {
            self.persist()?;
        }
        Ok(removed)
    }

    fn clear(&mut self, username: &str) -> StoreResult<bool> {
        let removed = self.state.clear(username);
        if removed {
            self.persist()?;
        }
        Ok(removed)
    }

    fn backend(&self) -> StoreKind {
        StoreKind::Archive
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::store::contract;
    use tempfile::TempDir;

    #[test]
    fn test_archive_store_contract() {
        let temp = TempDir::new().unwrap();
        let mut n = 0;
        let mut fresh = || {
            n += 1;
            ArchiveStore::open(temp.path().join(format!("store{}.bin.gz", n))).unwrap()
        };
        contract::accounts(&mut fresh());
        contract::upsert(&mut fresh());
        contract::row_order(&mut fresh());
        contract::delete_and_clear(&mut fresh());
    }

    #[test]
    fn test_snapshot_survives_reopen() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join(ARCHIVE_FILE);
        {
            let mut store = ArchiveStore::open(&path).unwrap();
            store.create_account("ravi", "hash", "Ravi", "r@example.com").unwrap();
            store
                .save(
                    "ravi",
                    "2023-24",
                    "Semester 4",
                    &[SubjectRow::create("Compilers").with_marks(21.0, 50.0, 15.0, 86.0)],
                )
                .unwrap();
        }
        assert!(path.exists());

        let store = ArchiveStore::open(&path).unwrap();
        let records = store.fetch("ravi").unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].rows[0].total, 86.0);
        assert_eq!(store.get_account("ravi").unwrap().unwrap().email, "r@example.com");
    }

    #[test]
    fn test_garbage_file_is_rejected() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(ARCHIVE_FILE);
        fs::write(&path, b"definitely not gzip").unwrap();
        let err = ArchiveStore::open(&path).unwrap_err();
        assert!(matches!(err, StoreError::Archive(_) | StoreError::Io(_)));
    }
}
