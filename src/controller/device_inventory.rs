use super::{same_connector, Progress, RequestEvent, RequestSlot};
use crate::api::{ApiRequest, Endpoint, ErrorCode, RequestOutcome};
use crate::cache::DiskCache;
use crate::connector::Connector;
use crate::model::{as_object, StorageSystem};
use crate::notify::{update_field, Notifier};
use crate::RequestStatus;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;

type CacheLoad = oneshot::Receiver<Option<Vec<Value>>>;

#[derive(Debug, Clone, PartialEq)]
pub enum DeviceInventoryEvent {
    Request(RequestEvent),
    ConnectorChanged,
    CachedChanged(bool),
    /// All entries were replaced.
    ModelReset,
    CountChanged(usize),
    PrimarySerialNumberChanged(String),
}

impl From<RequestEvent> for DeviceInventoryEvent {
    fn from(event: RequestEvent) -> Self {
        DeviceInventoryEvent::Request(event)
    }
}

/// Storage systems bound to the application (`getEssList`), in API order.
///
/// The last successful response is persisted to a `DiskCache` and replayed once after
/// construction. Replaying changes the entries but not the status. The replay runs on the first
/// `finished()`, on an explicit `replay_cache().await`, or in the background after
/// `schedule_replay()` for owners that only call `process_pending()`.
#[derive(Debug)]
pub struct DeviceInventory {
    connector: Option<Arc<Connector>>,
    cached: bool,
    disk_cache: Option<DiskCache>,
    replay_pending: bool,
    replay_load: Option<CacheLoad>,
    cache_write: Option<JoinHandle<()>>,
    systems: Vec<StorageSystem>,
    primary_serial_number: String,
    progress: Progress,
    slot: RequestSlot,
    notifier: Notifier<DeviceInventoryEvent>,
}

impl DeviceInventory {
    /// Inventory cached at the platform default location.
    ///
    /// Nothing is read from disk until the replay runs, see `schedule_replay()`.
    pub fn new(connector: Option<Arc<Connector>>) -> Self {
        DeviceInventory::with_disk_cache(connector, DiskCache::storage_systems())
    }

    pub fn with_disk_cache(connector: Option<Arc<Connector>>, disk_cache: Option<DiskCache>) -> Self {
        DeviceInventory {
            connector,
            cached: true,
            disk_cache,
            replay_pending: true,
            replay_load: None,
            cache_write: None,
            systems: Vec::new(),
            primary_serial_number: String::new(),
            progress: Progress::default(),
            slot: RequestSlot::new(),
            notifier: Notifier::new(),
        }
    }

    pub fn connector(&self) -> Option<&Arc<Connector>> {
        self.connector.as_ref()
    }

    /// Replaces the connector, the current entries are kept.
    pub fn set_connector(&mut self, connector: Option<Arc<Connector>>) {
        if same_connector(&self.connector, &connector) {
            return;
        }
        self.connector = connector;
        self.notifier.emit(DeviceInventoryEvent::ConnectorChanged);
    }

    pub fn cached(&self) -> bool {
        self.cached
    }

    pub fn set_cached(&mut self, cached: bool) {
        update_field(
            &mut self.cached,
            cached,
            &self.notifier,
            DeviceInventoryEvent::CachedChanged,
        );
    }

    pub fn cache(&self) -> Option<&DiskCache> {
        self.disk_cache.as_ref()
    }

    pub fn entries(&self) -> &[StorageSystem] {
        &self.systems
    }

    pub fn get(&self, index: usize) -> Option<&StorageSystem> {
        self.systems.get(index)
    }

    pub fn len(&self) -> usize {
        self.systems.len()
    }

    pub fn is_empty(&self) -> bool {
        self.systems.is_empty()
    }

    /// Raw entries as received from the API.
    pub fn raw_json(&self) -> Value {
        Value::Array(
            self.systems
                .iter()
                .map(|system| Value::Object(system.json.clone()))
                .collect(),
        )
    }

    /// Serial number of the first storage system, empty if there is none.
    pub fn primary_serial_number(&self) -> &str {
        &self.primary_serial_number
    }

    pub fn status(&self) -> RequestStatus {
        self.progress.status
    }

    pub fn error(&self) -> ErrorCode {
        self.progress.error
    }

    pub fn error_string(&self) -> &str {
        &self.progress.error_string
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DeviceInventoryEvent> {
        self.notifier.subscribe()
    }

    /// Applies the disk cache, once, if caching is enabled.
    ///
    /// Runs automatically on the first `finished()`; call it directly to show cached entries
    /// before any request completes. Returns whether cached entries were applied.
    pub async fn replay_cache(&mut self) -> bool {
        if let Some(load) = self.replay_load.take() {
            return match load.await {
                Ok(loaded) => self.apply_cached(loaded),
                Err(_) => false,
            };
        }

        if !std::mem::replace(&mut self.replay_pending, false) || !self.cached {
            return false;
        }

        let disk_cache = match &self.disk_cache {
            Some(disk_cache) => disk_cache.clone(),
            None => return false,
        };

        match disk_cache.load().await {
            Some(array) => {
                log::debug!(
                    "Loaded {} storage systems from {}",
                    array.len(),
                    disk_cache.path().display()
                );
                self.apply(&array);
                true
            }
            None => false,
        }
    }

    /// Reads the disk cache in a background task. `process_pending()` applies it once loaded.
    ///
    /// Returns false if the replay already ran, caching is disabled, there is no disk cache or
    /// no tokio runtime.
    pub fn schedule_replay(&mut self) -> bool {
        if !self.replay_pending || !self.cached {
            return false;
        }

        let disk_cache = match &self.disk_cache {
            Some(disk_cache) => disk_cache.clone(),
            None => return false,
        };

        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(e) => {
                log::warn!("Cannot read cache outside of a tokio runtime: {}", e);
                return false;
            }
        };

        let (sender, receiver) = oneshot::channel();
        runtime.spawn(async move {
            let _ = sender.send(disk_cache.load().await);
        });

        self.replay_pending = false;
        self.replay_load = Some(receiver);
        true
    }

    pub fn reload(&mut self) -> bool {
        let connector = match &self.connector {
            Some(connector) => Arc::clone(connector),
            None => {
                log::error!("Cannot reload storage systems without a connector");
                return false;
            }
        };

        if self.slot.cancel() {
            log::debug!("Cancelling storage systems request in flight");
        }

        if !self.slot.start(ApiRequest::new(connector, Endpoint::EssList)) {
            return false;
        }

        self.progress.set_status(RequestStatus::Loading, &self.notifier);
        true
    }

    pub fn reset(&mut self) {
        self.slot.cancel();
        self.apply(&[]);
        self.progress.clear(&self.notifier);
    }

    pub async fn finished(&mut self) -> RequestStatus {
        self.replay_cache().await;
        if let Some(outcome) = self.slot.next().await {
            self.process(outcome);
        }
        self.status()
    }

    pub fn process_pending(&mut self) {
        if let Some(mut load) = self.replay_load.take() {
            match load.try_recv() {
                Ok(loaded) => {
                    self.apply_cached(loaded);
                }
                Err(oneshot::error::TryRecvError::Empty) => self.replay_load = Some(load),
                Err(oneshot::error::TryRecvError::Closed) => {}
            }
        }

        while let Some(outcome) = self.slot.try_next() {
            self.process(outcome);
        }
    }

    /// Waits for the last disk cache write to complete.
    pub async fn cache_written(&mut self) {
        if let Some(write) = self.cache_write.take() {
            if let Err(e) = write.await {
                log::warn!("Cache write task failed: {}", e);
            }
        }
    }

    fn process(&mut self, outcome: RequestOutcome) {
        match outcome {
            Ok(data) => {
                /* fresher than anything on disk */
                self.replay_pending = false;
                self.replay_load = None;

                let array = match data {
                    Value::Array(array) => array,
                    _ => Vec::new(),
                };
                self.apply(&array);

                if self.cached {
                    if let Some(disk_cache) = &self.disk_cache {
                        self.cache_write = disk_cache.store(Value::Array(array));
                    }
                }

                self.progress.succeed(&self.notifier);
            }
            Err(error) => self.progress.fail(error, &self.notifier),
        }
    }

    /// Applies entries read by a background replay, unless caching was disabled meanwhile.
    fn apply_cached(&mut self, loaded: Option<Vec<Value>>) -> bool {
        match loaded {
            Some(array) if self.cached => {
                log::debug!("Loaded {} storage systems from cache", array.len());
                self.apply(&array);
                true
            }
            _ => false,
        }
    }

    /// Replaces the entries if `array` differs from them. Returns whether it did.
    fn apply(&mut self, array: &[Value]) -> bool {
        let dirty = array.len() != self.systems.len()
            || array
                .iter()
                .zip(&self.systems)
                .any(|(value, system)| as_object(value) != system.json);

        if !dirty {
            return false;
        }

        let old_count = self.systems.len();
        self.systems = array.iter().map(StorageSystem::from_json).collect();
        self.notifier.emit(DeviceInventoryEvent::ModelReset);
        if self.systems.len() != old_count {
            self.notifier
                .emit(DeviceInventoryEvent::CountChanged(self.systems.len()));
        }

        let primary = self
            .systems
            .first()
            .map(|system| system.serial_number.clone())
            .unwrap_or_default();
        update_field(
            &mut self.primary_serial_number,
            primary,
            &self.notifier,
            DeviceInventoryEvent::PrimarySerialNumberChanged,
        );

        true
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::notify::drain;
    use crate::SystemStatus;
    use serde_json::json;

    fn system(serial: &str) -> Value {
        json!({
            "sysSn": serial,
            "popv": 10,
            "minv": "INVERTER",
            "poinv": 10,
            "cobat": 8.19,
            "mbat": "BATTERY",
            "surplusCobat": 7.8,
            "usCapacity": 95,
            "emsStatus": "Normal"
        })
    }

    fn inventory() -> DeviceInventory {
        DeviceInventory::with_disk_cache(None, None)
    }

    #[test]
    fn identical_payload_is_not_dirty() {
        let mut inventory = inventory();
        let mut receiver = inventory.subscribe();

        assert!(inventory.apply(&[system("SERIAL")]));
        assert_eq!(
            vec![
                DeviceInventoryEvent::ModelReset,
                DeviceInventoryEvent::CountChanged(1),
                DeviceInventoryEvent::PrimarySerialNumberChanged(String::from("SERIAL")),
            ],
            drain(&mut receiver)
        );

        assert!(!inventory.apply(&[system("SERIAL")]));
        assert!(drain(&mut receiver).is_empty());
    }

    #[test]
    fn changed_entry_keeps_primary() {
        let mut inventory = inventory();
        inventory.apply(&[system("SERIALA"), system("SERIALB")]);
        let mut receiver = inventory.subscribe();

        let mut changed = system("SERIALB");
        changed["emsStatus"] = json!("Fault");
        assert!(inventory.apply(&[system("SERIALA"), changed]));

        assert_eq!(vec![DeviceInventoryEvent::ModelReset], drain(&mut receiver));
        assert_eq!(SystemStatus::Fault, inventory.get(1).unwrap().status);
    }

    #[test]
    fn primary_serial_number_follows_first_entry() {
        let mut inventory = inventory();
        inventory.apply(&[system("SERIALA"), system("SERIALB")]);
        assert_eq!("SERIALA", inventory.primary_serial_number());

        let mut receiver = inventory.subscribe();
        inventory.apply(&[system("SERIALB"), system("SERIALA")]);
        assert_eq!("SERIALB", inventory.primary_serial_number());
        assert!(drain(&mut receiver).contains(&DeviceInventoryEvent::PrimarySerialNumberChanged(
            String::from("SERIALB")
        )));

        inventory.reset();
        assert_eq!("", inventory.primary_serial_number());
        assert!(inventory.is_empty());
    }

    #[test]
    fn non_array_payload_clears() {
        let mut inventory = inventory();
        inventory.apply(&[system("SERIAL")]);
        inventory.process(Ok(json!({"unexpected": true})));
        assert!(inventory.is_empty());
        assert_eq!(RequestStatus::Finished, inventory.status());
    }

    #[test]
    fn reload_without_connector() {
        let mut inventory = inventory();
        assert!(!inventory.reload());
        assert_eq!(RequestStatus::NoRequest, inventory.status());
    }

    #[tokio::test]
    async fn replay_keeps_status() {
        let dir = tempfile::tempdir().unwrap();
        let disk_cache = DiskCache::new(dir.path().join("cache.json"));
        std::fs::write(disk_cache.path(), json!([system("SERIAL")]).to_string()).unwrap();

        let mut inventory = DeviceInventory::with_disk_cache(None, Some(disk_cache));
        assert!(inventory.is_empty());

        assert!(inventory.replay_cache().await);
        assert_eq!(1, inventory.len());
        assert_eq!("SERIAL", inventory.primary_serial_number());
        assert_eq!(RequestStatus::NoRequest, inventory.status());

        /* only once */
        assert!(!inventory.replay_cache().await);
    }

    #[tokio::test]
    async fn replay_respects_cached_flag() {
        let dir = tempfile::tempdir().unwrap();
        let disk_cache = DiskCache::new(dir.path().join("cache.json"));
        std::fs::write(disk_cache.path(), json!([system("SERIAL")]).to_string()).unwrap();

        let mut inventory = DeviceInventory::with_disk_cache(None, Some(disk_cache));
        inventory.set_cached(false);
        assert!(!inventory.replay_cache().await);
        assert!(inventory.is_empty());
    }

    #[tokio::test]
    async fn scheduled_replay_applies_on_process_pending() {
        let dir = tempfile::tempdir().unwrap();
        let disk_cache = DiskCache::new(dir.path().join("cache.json"));
        std::fs::write(disk_cache.path(), json!([system("SERIAL")]).to_string()).unwrap();

        let mut inventory = DeviceInventory::with_disk_cache(None, Some(disk_cache));
        assert!(inventory.schedule_replay());
        assert!(!inventory.schedule_replay());

        for _ in 0..100 {
            inventory.process_pending();
            if !inventory.is_empty() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }

        assert_eq!("SERIAL", inventory.primary_serial_number());
        assert_eq!(RequestStatus::NoRequest, inventory.status());
        assert!(!inventory.replay_cache().await);
    }

    #[tokio::test]
    async fn network_result_discards_scheduled_replay() {
        let dir = tempfile::tempdir().unwrap();
        let disk_cache = DiskCache::new(dir.path().join("cache.json"));
        std::fs::write(disk_cache.path(), json!([system("OLD")]).to_string()).unwrap();

        let mut inventory = DeviceInventory::with_disk_cache(None, Some(disk_cache));
        assert!(inventory.schedule_replay());
        inventory.process(Ok(json!([system("NEW")])));
        inventory.cache_written().await;

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        inventory.process_pending();
        assert_eq!("NEW", inventory.primary_serial_number());
    }

    #[tokio::test]
    async fn network_result_cancels_replay() {
        let dir = tempfile::tempdir().unwrap();
        let disk_cache = DiskCache::new(dir.path().join("cache.json"));
        std::fs::write(disk_cache.path(), json!([system("OLD")]).to_string()).unwrap();

        let mut inventory = DeviceInventory::with_disk_cache(None, Some(disk_cache.clone()));
        inventory.process(Ok(json!([system("NEW")])));
        inventory.cache_written().await;

        assert!(!inventory.replay_cache().await);
        assert_eq!("NEW", inventory.primary_serial_number());
        assert_eq!(Some(vec![system("NEW")]), disk_cache.load().await);
    }
}
