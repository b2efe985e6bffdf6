use bactsm_core::types::MaxApdu;
use bactsm_datalink::DataLinkAddress;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Who a confirmed request is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recipient {
    /// A device instance, resolved through a [`DeviceDirectory`].
    Device(u32),
    /// A known peer; `max_apdu` is what it is assumed to accept.
    Address {
        address: DataLinkAddress,
        max_apdu: MaxApdu,
    },
}

impl Recipient {
    pub fn address(address: DataLinkAddress) -> Self {
        Self::Address {
            address,
            max_apdu: MaxApdu::UpTo1476,
        }
    }
}

/// Snapshot of what is known about a peer, taken once per transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceTableEntry {
    pub address: DataLinkAddress,
    pub max_apdu: MaxApdu,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceLookup {
    Found(DeviceTableEntry),
    Timeout(Recipient),
}

pub type LookupCallback = Box<dyn FnOnce(DeviceLookup) + Send>;

/// Asynchronous peer resolution. The callback runs exactly once, possibly
/// before `search_for_device` returns.
pub trait DeviceDirectory: Send + Sync {
    fn search_for_device(&self, recipient: Recipient, callback: LookupCallback);
}

struct PendingSearch {
    id: u64,
    callback: LookupCallback,
}

#[derive(Default)]
struct TableState {
    entries: HashMap<u32, DeviceTableEntry>,
    pending: HashMap<u32, Vec<PendingSearch>>,
    next_search_id: u64,
}

/// In-memory [`DeviceDirectory`] keyed by device instance.
///
/// Searches for an unknown instance wait up to the lookup timeout for
/// [`insert`](Self::insert) to supply the entry, then resolve to
/// [`DeviceLookup::Timeout`].
#[derive(Clone)]
pub struct DeviceTable {
    state: Arc<Mutex<TableState>>,
    lookup_timeout: Duration,
    runtime: tokio::runtime::Handle,
}

impl std::fmt::Debug for DeviceTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("DeviceTable")
            .field("entries", &state.entries)
            .field("pending", &state.pending.len())
            .field("lookup_timeout", &self.lookup_timeout)
            .finish()
    }
}

impl DeviceTable {
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime.
    pub fn new(lookup_timeout: Duration) -> Self {
        Self {
            state: Arc::new(Mutex::new(TableState::default())),
            lookup_timeout,
            runtime: tokio::runtime::Handle::current(),
        }
    }

    pub fn get(&self, instance: u32) -> Option<DeviceTableEntry> {
        self.state.lock().entries.get(&instance).copied()
    }

    /// Records `entry` and completes every search waiting on `instance`.
    pub fn insert(&self, instance: u32, entry: DeviceTableEntry) {
        let waiting = {
            let mut state = self.state.lock();
            state.entries.insert(instance, entry);
            state.pending.remove(&instance).unwrap_or_default()
        };
        if !waiting.is_empty() {
            log::debug!(
                "device {instance} resolved to {}; completing {} search(es)",
                entry.address,
                waiting.len()
            );
        }
        for search in waiting {
            (search.callback)(DeviceLookup::Found(entry));
        }
    }

    pub fn remove(&self, instance: u32) -> Option<DeviceTableEntry> {
        self.state.lock().entries.remove(&instance)
    }

    fn expire(&self, instance: u32, id: u64) {
        let expired = {
            let mut state = self.state.lock();
            let Some(waiting) = state.pending.get_mut(&instance) else {
                return;
            };
            let position = waiting.iter().position(|search| search.id == id);
            let expired = position.map(|idx| waiting.swap_remove(idx));
            if waiting.is_empty() {
                state.pending.remove(&instance);
            }
            expired
        };
        if let Some(search) = expired {
            log::debug!("device {instance} lookup timed out");
            (search.callback)(DeviceLookup::Timeout(Recipient::Device(instance)));
        }
    }
}

impl DeviceDirectory for DeviceTable {
    fn search_for_device(&self, recipient: Recipient, callback: LookupCallback) {
        let instance = match recipient {
            Recipient::Address { address, max_apdu } => {
                callback(DeviceLookup::Found(DeviceTableEntry { address, max_apdu }));
                return;
            }
            Recipient::Device(instance) => instance,
        };

        let id = {
            let mut state = self.state.lock();
            if let Some(entry) = state.entries.get(&instance).copied() {
                drop(state);
                callback(DeviceLookup::Found(entry));
                return;
            }
            let id = state.next_search_id;
            state.next_search_id += 1;
            state
                .pending
                .entry(instance)
                .or_default()
                .push(PendingSearch { id, callback });
            id
        };

        let table = self.clone();
        let lookup_timeout = self.lookup_timeout;
        self.runtime.spawn(async move {
            tokio::time::sleep(lookup_timeout).await;
            table.expire(instance, id);
        });
    }
}
