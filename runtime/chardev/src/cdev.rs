//! Cdev Table - routes device numbers to driver operations
//!
//! `cdev_add` binds one device number to an operations object; callers that
//! open the number get the same object back. The table is generic over the
//! operations type so it carries no knowledge of any particular driver.

use alloc::collections::BTreeMap;
use alloc::sync::Arc;
use core::sync::atomic::{AtomicU64, Ordering};

use spin::Mutex;

use crate::{CdevToken, ChardevError, DevNum, IoBinding, Result};

struct CdevEntry<T: ?Sized> {
    id: u64,
    ops: Arc<T>,
}

/// Binding table from device number to operations
pub struct CdevMap<T: ?Sized> {
    entries: Mutex<BTreeMap<DevNum, CdevEntry<T>>>,
    next_id: AtomicU64,
}

impl<T: ?Sized> CdevMap<T> {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(BTreeMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Operations bound to `devnum`, if any
    pub fn lookup(&self, devnum: DevNum) -> Option<Arc<T>> {
        self.entries.lock().get(&devnum).map(|e| Arc::clone(&e.ops))
    }

    pub fn is_bound(&self, devnum: DevNum) -> bool {
        self.entries.lock().contains_key(&devnum)
    }

    /// Number of active bindings
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl<T: ?Sized> Default for CdevMap<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ?Sized + Send + Sync> IoBinding<T> for CdevMap<T> {
    fn bind(&self, devnum: DevNum, ops: Arc<T>) -> Result<CdevToken> {
        let mut entries = self.entries.lock();
        if entries.contains_key(&devnum) {
            return Err(ChardevError::AlreadyBound { devnum });
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        entries.insert(devnum, CdevEntry { id, ops });
        log::debug!("cdev {} bound (token {})", devnum, id);
        Ok(CdevToken::new(id, devnum))
    }

    fn unbind(&self, token: CdevToken) {
        let mut entries = self.entries.lock();
        // A stale token must not tear down a later binding of the same number
        match entries.get(&token.devnum()) {
            Some(entry) if entry.id == token.id() => {
                entries.remove(&token.devnum());
                log::debug!("cdev {} unbound (token {})", token.devnum(), token.id());
            }
            _ => log::warn!("cdev {}: stale unbind token {}", token.devnum(), token.id()),
        }
    }
}
