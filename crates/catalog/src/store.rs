//! The Catalog Store service: shared access to one catalog database plus
//! bounded write sessions.
//!
//! A [`StoreSession`] is one unit of work: open, read/write, commit, drop.
//! Dropping an uncommitted session rolls the work back, so every exit path
//! (including cancellation) leaves the database at a committed boundary.
//! Sessions serialize against each other; the store is never handed out as
//! a long-lived open write handle.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use core_types::CatalogId;

use crate::db::{Catalog, CatalogDb, DbResult};
use crate::{CatalogError, Result};

#[derive(Clone)]
pub struct CatalogStore {
    db: Arc<Mutex<CatalogDb>>,
}

impl CatalogStore {
    pub fn open(path: &Path) -> Result<Self> {
        let db = CatalogDb::open(&path.to_string_lossy())?;
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
        })
    }

    pub fn in_memory() -> Result<Self> {
        let db = CatalogDb::in_memory()?;
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
        })
    }

    /// Runs a read-only closure against the database under the store lock.
    pub fn with_db<T>(&self, f: impl FnOnce(&CatalogDb) -> DbResult<T>) -> Result<T> {
        let guard = self.db.lock().expect("catalog store poisoned");
        f(&guard).map_err(CatalogError::from)
    }

    pub fn create_catalog(&self, name: &str) -> Result<Catalog> {
        let now = Utc::now();
        let catalog = Catalog {
            id: CatalogId::new(),
            name: name.to_string(),
            created_at: now,
            updated_at: now,
        };
        self.with_db(|db| catalog.insert(db))?;
        Ok(catalog)
    }

    /// Finds a catalog by name, creating it when absent.
    pub fn open_or_create_catalog(&self, name: &str) -> Result<Catalog> {
        if let Some(existing) = self.with_db(|db| Catalog::find_by_name(db, name))? {
            return Ok(existing);
        }
        self.create_catalog(name)
    }

    pub fn find_catalog(&self, id: CatalogId) -> Result<Option<Catalog>> {
        self.with_db(|db| Catalog::load(db, id))
    }

    pub fn list_catalogs(&self) -> Result<Vec<Catalog>> {
        self.with_db(Catalog::load_all)
    }

    /// Opens a write session. Blocks until any other session or reader has
    /// released the store.
    pub fn session(&self) -> Result<StoreSession<'_>> {
        let guard = self.db.lock().expect("catalog store poisoned");
        guard.conn().execute_batch("BEGIN IMMEDIATE")?;
        Ok(StoreSession { guard, open: true })
    }
}

/// One bounded unit of catalog work. Commit-or-discard: an explicit
/// [`StoreSession::commit`] persists, dropping without one rolls back.
pub struct StoreSession<'a> {
    guard: MutexGuard<'a, CatalogDb>,
    open: bool,
}

impl<'a> StoreSession<'a> {
    pub fn db(&self) -> &CatalogDb {
        &self.guard
    }

    /// Commits everything written so far and immediately opens the next
    /// sub-batch, keeping single transactions bounded.
    pub fn commit_batch(&mut self) -> Result<()> {
        self.guard.conn().execute_batch("COMMIT")?;
        self.guard.conn().execute_batch("BEGIN IMMEDIATE")?;
        Ok(())
    }

    /// Commits and closes the session.
    pub fn commit(mut self) -> Result<()> {
        self.guard.conn().execute_batch("COMMIT")?;
        self.open = false;
        Ok(())
    }
}

impl<'a> Drop for StoreSession<'a> {
    fn drop(&mut self) {
        if self.open {
            // Discard on any exit without commit, cancellation included.
            let _ = self.guard.conn().execute_batch("ROLLBACK");
        }
    }
}
