use log::info;

use crate::error::StoreResult;
use crate::record::{SemesterRecord, SubjectRow};
use crate::store::{Account, ResultStore, StoreKind, StoreState};

/// Process-local store. Contents are lost when it is dropped.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: StoreState,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ResultStore for MemoryStore {
    fn create_account(
        &mut self,
        username: &str,
        password_hash: &str,
        full_name: &str,
        email: &str,
    ) -> StoreResult<bool> {
        Ok(self
            .state
            .create_account(username, password_hash, full_name, email))
    }

    fn get_account(&self, username: &str) -> StoreResult<Option<Account>> {
        Ok(self.state.accounts.get(username).cloned())
    }

    fn record_login(&mut self, username: &str) -> StoreResult<()> {
        self.state.record_login(username);
        Ok(())
    }

    fn save(
        &mut self,
        username: &str,
        academic_year: &str,
        term: &str,
        rows: &[SubjectRow],
    ) -> StoreResult<bool> {
        let saved = self.state.save(username, academic_year, term, rows);
        if saved {
            info!("Saved {} rows for {} ({} - {})", rows.len(), username, academic_year, term);
        }
        Ok(saved)
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
        Ok(self.state.delete_semester(username, academic_year, term))
    }

    fn clear(&mut self, username: &str) -> StoreResult<bool> {
        Ok(self.state.clear(username))
    }

    fn backend(&self) -> StoreKind {
        StoreKind::Memory
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::contract;

    #[test]
    fn test_memory_store_contract() {
        contract::all(|| Box::new(MemoryStore::new()));
    }

    #[test]
    fn test_backend_kind() {
        assert_eq!(MemoryStore::new().backend(), StoreKind::Memory);
    }
}
