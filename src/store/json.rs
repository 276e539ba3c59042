use std::collections::BTreeMap;
use std::fs::{self, File, create_dir_all};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use log::{debug, info};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::StoreResult;
use crate::record::{SemesterRecord, SubjectRow};
use crate::store::{Account, ResultStore, StoreKind, StoreState};

const USERS_FILE: &str = "users.json";
const RESULTS_FILE: &str = "results.json";

/// Flat-file store: `users.json` and `results.json` under one directory.
///
/// Both files are re-read on every call and rewritten after every mutation,
/// so several processes may share a directory as long as they do not write
/// at the same time.
#[derive(Debug)]
pub struct JsonStore {
    dir: PathBuf,
}

impl JsonStore {
    /// Open (and if necessary initialize) a store rooted at `dir`
    ///
    /// Creates the directory and empty `{}` files if they don't exist.
    ///
    /// # Arguments
    /// * `dir` - Data directory
    ///
    /// # Returns
    /// * `StoreResult<JsonStore>` - The store or an I/O error
    pub fn open(dir: impl AsRef<Path>) -> StoreResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        if !dir.exists() {
            create_dir_all(&dir)?;
        }

        for name in [USERS_FILE, RESULTS_FILE] {
            let path = dir.join(name);
            if !path.exists() {
                let mut file = File::create(&path)?;
                file.write_all(b"{}")?;
            }
        }

        info!("Opened JSON store at {}", dir.display());
        Ok(JsonStore { dir })
    }

    fn read_map<T: DeserializeOwned>(&self, name: &str) -> StoreResult<BTreeMap<String, T>> {
        let mut contents = String::new();
        File::open(self.dir.join(name))?.read_to_string(&mut contents)?;
        if contents.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        Ok(serde_json::from_str(&contents)?)
    }

    // Write to a sibling file, then rename over the original.
    fn write_map<T: Serialize>(&self, name: &str, map: &BTreeMap<String, T>) -> StoreResult<()> {
        let json = serde_json::to_string_pretty(map)?;
        let target = self.dir.join(name);
        let staging = self.dir.join(format!("{}.tmp", name));

        let mut file = File::create(&staging)?;
        file.write_all(json.as_bytes())?;
        file.sync_all()?;
        fs::rename(&staging, &target)?;

        debug!("Wrote {}", target.display());
        Ok(())
    }

    fn load(&self) -> StoreResult<StoreState> {
        Ok(StoreState {
            accounts: self.read_map(USERS_FILE)?,
            results: self.read_map(RESULTS_FILE)?,
        })
    }
}

impl ResultStore for JsonStore {
    fn create_account(
        &mut self,
        username: &str,
        password_hash: &str,
        full_name: &str,
        email: &str,
    ) -> StoreResult<bool> {
        let mut state = self.load()?;
        if !state.create_account(username, password_hash, full_name, email) {
            return Ok(false);
        }
        self.write_map(USERS_FILE, &state.accounts)?;
        info!("Registered user {}", username);
        Ok(true)
    }

    fn get_account(&self, username: &str) -> StoreResult<Option<Account>> {
        let mut accounts: BTreeMap<String, Account> = self.read_map(USERS_FILE)?;
        Ok(accounts.remove(username))
    }

    fn record_login(&mut self, username: &str) -> StoreResult<()> {
        let mut state = self.load()?;
        if state.record_login(username) {
            self.write_map(USERS_FILE, &state.accounts)?;
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
        let mut state = self.load()?;
        if !state.save(username, academic_year, term, rows) {
            return Ok(false);
        }
        self.write_map(RESULTS_FILE, &state.results)?;
        info!("Saved {} rows for {} ({} - {})", rows.len(), username, academic_year, term);
        Ok(true)
    }

    fn fetch(&self, username: &str) -> StoreResult<Vec<SemesterRecord>> {
        let mut results: BTreeMap<String, Vec<SemesterRecord>> = self.read_map(RESULTS_FILE)?;
        Ok(results.remove(username).unwrap_or_default())
    }

    fn delete_semester(
        &mut self,
        username: &str,
        academic_year: &str,
        term: &str,
    ) -> StoreResult<bool> {
        let mut state = self.load()?;
        let removed = state.delete_semester(username, academic_year, term);
        if removed {
            self.write_map(RESULTS_FILE, &state.results)?;
            info!("Deleted {} - {} for {}", academic_year, term, username);
        }
        Ok(removed)
    }

    fn clear(&mut self, username: &str) -> StoreResult<bool> {
        let mut state = self.load()?;
        let removed = state.clear(username);
        if removed {
            self.write_map(RESULTS_FILE, &state.results)?;
            info!("Cleared all results for {}", username);
        }
        Ok(removed)
    }

    fn backend(&self) -> StoreKind {
        StoreKind::Json
    }
}
