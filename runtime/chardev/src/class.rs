//! Device Class - named device nodes
//!
//! `class_create` followed by `device_create` publishes a node such as
//! `pcdev-0` that user space resolves by name. A class here is just the
//! name table; nodes map to the device number they were created for.

use alloc::collections::BTreeMap;
use alloc::string::{String, ToString};
use alloc::vec::Vec;
use core::sync::atomic::{AtomicU64, Ordering};

use spin::Mutex;

use crate::{ChardevError, DevNum, DeviceToken, Exposure, Result};

#[derive(Debug, Clone, Copy)]
struct NodeEntry {
    id: u64,
    devnum: DevNum,
}

/// Device class holding published nodes
pub struct DeviceClass {
    name: String,
    nodes: Mutex<BTreeMap<String, NodeEntry>>,
    next_id: AtomicU64,
}

impl DeviceClass {
    /// Create a class (`class_create`)
    pub fn create(name: &str) -> Self {
        log::debug!("device class {} created", name);
        Self {
            name: name.to_string(),
            nodes: Mutex::new(BTreeMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Class name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Resolve a node name to its device number
    pub fn find_by_name(&self, name: &str) -> Option<DevNum> {
        self.nodes.lock().get(name).map(|n| n.devnum)
    }

    /// Node name published for `devnum`
    pub fn name_of(&self, devnum: DevNum) -> Option<String> {
        self.nodes
            .lock()
            .iter()
            .find(|(_, n)| n.devnum == devnum)
            .map(|(name, _)| name.clone())
    }

    /// Published node names, sorted
    pub fn names(&self) -> Vec<String> {
        self.nodes.lock().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.nodes.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.lock().is_empty()
    }
}

impl Exposure for DeviceClass {
    fn expose(&self, devnum: DevNum, name: &str) -> Result<DeviceToken> {
        let mut nodes = self.nodes.lock();
        if nodes.contains_key(name) {
            return Err(ChardevError::NameTaken {
                name: name.to_string(),
            });
        }
        if nodes.values().any(|n| n.devnum == devnum) {
            return Err(ChardevError::AlreadyExposed { devnum });
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        nodes.insert(name.to_string(), NodeEntry { id, devnum });
        log::debug!("{}: node {} -> {} created", self.name, name, devnum);
        Ok(DeviceToken::new(id, devnum, name.to_string()))
    }

    fn withdraw(&self, token: DeviceToken) {
        let mut nodes = self.nodes.lock();
        match nodes.get(token.name()) {
            Some(node) if node.id == token.id() => {
                nodes.remove(token.name());
                log::debug!("{}: node {} destroyed", self.name, token.name());
            }
            _ => log::warn!("{}: stale withdraw for node {}", self.name, token.name()),
        }
    }
}
