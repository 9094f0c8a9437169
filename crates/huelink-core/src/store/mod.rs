//! Reactive resource cache.
//!
//! [`ResourceStore`] holds the five resource collections for one bridge.
//! Bulk reads replace a collection; push batches and optimistic command
//! patches are overlaid by id. Both paths use the same rule, so their
//! interleaving never loses fields.

mod collection;
pub mod merge;

use huelink_api::{GroupedLight, Light, ResourceKind, Room, Scene, Zone};
use serde_json::{Map, Value};
use tokio::sync::watch;
use tracing::debug;

pub use collection::Snapshot;
use collection::ResourceCollection;

/// Outcome of merging one push batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeSummary {
    /// Records updated in place.
    pub updated: usize,
    /// Patches for known classes that matched no cached record.
    pub ignored: usize,
}

pub struct ResourceStore {
    lights: ResourceCollection<Light>,
    grouped_lights: ResourceCollection<GroupedLight>,
    rooms: ResourceCollection<Room>,
    zones: ResourceCollection<Zone>,
    scenes: ResourceCollection<Scene>,
}

impl Default for ResourceStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceStore {
    pub fn new() -> Self {
        Self {
            lights: ResourceCollection::new(),
            grouped_lights: ResourceCollection::new(),
            rooms: ResourceCollection::new(),
            zones: ResourceCollection::new(),
            scenes: ResourceCollection::new(),
        }
    }

    // ── Bulk replacement ─────────────────────────────────────────────

    pub fn replace_lights(&self, items: Vec<Light>) {
        self.lights.replace(items);
    }

    pub fn replace_grouped_lights(&self, items: Vec<GroupedLight>) {
        self.grouped_lights.replace(items);
    }

    pub fn replace_rooms(&self, items: Vec<Room>) {
        self.rooms.replace(items);
    }

    pub fn replace_zones(&self, items: Vec<Zone>) {
        self.zones.replace(items);
    }

    pub fn replace_scenes(&self, items: Vec<Scene>) {
        self.scenes.replace(items);
    }

    // ── Snapshots ────────────────────────────────────────────────────

    pub fn lights(&self) -> Snapshot<Light> {
        self.lights.snapshot()
    }

    pub fn grouped_lights(&self) -> Snapshot<GroupedLight> {
        self.grouped_lights.snapshot()
    }

    pub fn rooms(&self) -> Snapshot<Room> {
        self.rooms.snapshot()
    }

    pub fn zones(&self) -> Snapshot<Zone> {
        self.zones.snapshot()
    }

    pub fn scenes(&self) -> Snapshot<Scene> {
        self.scenes.snapshot()
    }

    pub fn light(&self, id: &str) -> Option<std::sync::Arc<Light>> {
        self.lights.get(id)
    }

    pub fn grouped_light(&self, id: &str) -> Option<std::sync::Arc<GroupedLight>> {
        self.grouped_lights.get(id)
    }

    /// Number of cached records per class.
    pub fn counts(&self) -> [(ResourceKind, usize); 5] {
        [
            (ResourceKind::Light, self.lights.len()),
            (ResourceKind::GroupedLight, self.grouped_lights.len()),
            (ResourceKind::Room, self.rooms.len()),
            (ResourceKind::Zone, self.zones.len()),
            (ResourceKind::Scene, self.scenes.len()),
        ]
    }

    // ── Subscriptions ────────────────────────────────────────────────

    pub fn subscribe_lights(&self) -> watch::Receiver<Snapshot<Light>> {
        self.lights.subscribe()
    }

    pub fn subscribe_grouped_lights(&self) -> watch::Receiver<Snapshot<GroupedLight>> {
        self.grouped_lights.subscribe()
    }

    pub fn subscribe_rooms(&self) -> watch::Receiver<Snapshot<Room>> {
        self.rooms.subscribe()
    }

    pub fn subscribe_zones(&self) -> watch::Receiver<Snapshot<Zone>> {
        self.zones.subscribe()
    }

    pub fn subscribe_scenes(&self) -> watch::Receiver<Snapshot<Scene>> {
        self.scenes.subscribe()
    }

    // ── Merging ──────────────────────────────────────────────────────

    /// Apply one push batch.
    pub fn apply_event_batch(&self, batch: &[Value]) -> MergeSummary {
        let mut summary = MergeSummary::default();
        for (kind, patches) in merge::partition_batch(batch) {
            let updated = self.merge(kind, &patches);
            summary.updated += updated;
            summary.ignored += patches.len() - updated;
        }
        if summary.ignored > 0 {
            debug!(ignored = summary.ignored, "push updates for uncached resources dropped");
        }
        summary
    }

    /// Overlay patches onto one class. Returns how many records changed.
    pub fn merge(&self, kind: ResourceKind, patches: &[Map<String, Value>]) -> usize {
        match kind {
            ResourceKind::Light => self.lights.merge(patches),
            ResourceKind::GroupedLight => self.grouped_lights.merge(patches),
            ResourceKind::Room => self.rooms.merge(patches),
            ResourceKind::Zone => self.zones.merge(patches),
            ResourceKind::Scene => self.scenes.merge(patches),
        }
    }

    /// A cached record as JSON.
    pub fn record(&self, kind: ResourceKind, id: &str) -> Option<Map<String, Value>> {
        match kind {
            ResourceKind::Light => self.lights.record(id),
            ResourceKind::GroupedLight => self.grouped_lights.record(id),
            ResourceKind::Room => self.rooms.record(id),
            ResourceKind::Zone => self.zones.record(id),
            ResourceKind::Scene => self.scenes.record(id),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    fn seeded() -> ResourceStore {
        let store = ResourceStore::new();
        store.replace_lights(vec![
            serde_json::from_value(json!({
                "id": "l1", "type": "light",
                "metadata": { "name": "Desk" },
                "on": { "on": false },
                "dimming": { "brightness": 30.0 }
            }))
            .unwrap(),
        ]);
        store.replace_grouped_lights(vec![
            serde_json::from_value(json!({ "id": "g1", "type": "grouped_light", "on": { "on": false } })).unwrap(),
        ]);
        store
    }

    #[test]
    fn batch_updates_known_records_only() {
        let store = seeded();
        let summary = store.apply_event_batch(&[json!({ "type": "update", "data": [
            { "id": "l1", "type": "light", "on": { "on": true } },
            { "id": "l2", "type": "light", "on": { "on": true } },
            { "id": "g1", "type": "grouped_light", "on": { "on": true } }
        ]})]);

        assert_eq!(summary, MergeSummary { updated: 2, ignored: 1 });
        let light = store.light("l1").unwrap();
        assert!(light.on.on);
        assert_eq!(light.metadata.name, "Desk");
        assert!(store.grouped_light("g1").unwrap().on.unwrap().on);
        assert_eq!(store.lights().len(), 1);
    }

    #[test]
    fn merge_is_idempotent() {
        let store = seeded();
        let batch = [json!({ "id": "l1", "type": "light", "dimming": { "brightness": 75.0 } })];
        store.apply_event_batch(&batch);
        let once = store.record(ResourceKind::Light, "l1").unwrap();
        store.apply_event_batch(&batch);
        assert_eq!(store.record(ResourceKind::Light, "l1").unwrap(), once);
    }

    #[test]
    fn counts_per_class() {
        let store = seeded();
        let counts = store.counts();
        assert_eq!(counts[0], (ResourceKind::Light, 1));
        assert_eq!(counts[4], (ResourceKind::Scene, 0));
    }
}
