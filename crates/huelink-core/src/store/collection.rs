// ── Reactive resource collection ──
//
// Ordered storage for one resource class with push-based change
// notification via a `watch` channel. The channel value is the only copy:
// every mutation builds a new snapshot and publishes it.

use std::sync::Arc;

use huelink_api::Resource;
use serde_json::{Map, Value};
use tokio::sync::watch;
use tracing::warn;

use super::merge::overlay;

/// Snapshot handed to subscribers.
pub type Snapshot<T> = Arc<Vec<Arc<T>>>;

pub(crate) struct ResourceCollection<T: Resource> {
    snapshot: watch::Sender<Snapshot<T>>,
}

impl<T: Resource> ResourceCollection<T> {
    pub(crate) fn new() -> Self {
        let (snapshot, _) = watch::channel(Arc::new(Vec::new()));
        Self { snapshot }
    }

    /// Replace the whole collection, e.g. after a bulk read.
    pub(crate) fn replace(&self, items: Vec<T>) {
        let items: Vec<Arc<T>> = items.into_iter().map(Arc::new).collect();
        // `send_replace` updates even with zero receivers.
        self.snapshot.send_replace(Arc::new(items));
    }

    pub(crate) fn snapshot(&self) -> Snapshot<T> {
        self.snapshot.borrow().clone()
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<Snapshot<T>> {
        self.snapshot.subscribe()
    }

    pub(crate) fn get(&self, id: &str) -> Option<Arc<T>> {
        self.snapshot.borrow().iter().find(|r| r.id() == id).cloned()
    }

    pub(crate) fn len(&self) -> usize {
        self.snapshot.borrow().len()
    }

    /// Current record as a JSON object.
    pub(crate) fn record(&self, id: &str) -> Option<Map<String, Value>> {
        let item = self.get(id)?;
        match serde_json::to_value(item.as_ref()) {
            Ok(Value::Object(map)) => Some(map),
            _ => None,
        }
    }

    /// Shallow-overlay each patch onto the record with the same id, in
    /// place. Patches for ids not in the collection are ignored.
    ///
    /// Returns the number of records changed.
    pub(crate) fn merge(&self, patches: &[Map<String, Value>]) -> usize {
        let mut changed = 0;
        self.snapshot.send_if_modified(|snap| {
            let mut items: Option<Vec<Arc<T>>> = None;
            for patch in patches {
                let Some(id) = patch.get("id").and_then(Value::as_str) else {
                    continue;
                };
                let current = items.as_deref().unwrap_or(snap.as_slice());
                let Some(pos) = current.iter().position(|r| r.id() == id) else {
                    continue;
                };
                let Some(updated) = overlaid(current[pos].as_ref(), patch) else {
                    continue;
                };
                let working = items.get_or_insert_with(|| (**snap).clone());
                working[pos] = Arc::new(updated);
                changed += 1;
            }
            match items {
                Some(items) => {
                    *snap = Arc::new(items);
                    true
                }
                None => false,
            }
        });
        changed
    }
}

fn overlaid<T: Resource>(current: &T, patch: &Map<String, Value>) -> Option<T> {
    let Ok(Value::Object(mut record)) = serde_json::to_value(current) else {
        return None;
    };
    overlay(&mut record, patch);
    match serde_json::from_value(Value::Object(record)) {
        Ok(updated) => Some(updated),
        Err(e) => {
            warn!(kind = %T::KIND, id = current.id(), error = %e, "update does not fit the record; skipped");
            None
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use huelink_api::Light;
    use serde_json::json;

    use super::*;

    fn light(id: &str, name: &str, on: bool) -> Light {
        serde_json::from_value(json!({
            "id": id,
            "type": "light",
            "metadata": { "name": name },
            "on": { "on": on },
            "dimming": { "brightness": 50.0 }
        }))
        .unwrap()
    }

    fn patch(value: Value) -> Map<String, Value> {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn merge_updates_in_place_and_keeps_order() {
        let lights = ResourceCollection::<Light>::new();
        lights.replace(vec![light("a", "Desk", false), light("b", "Hall", false)]);

        let changed = lights.merge(&[patch(json!({ "id": "b", "type": "light", "on": { "on": true } }))]);
        assert_eq!(changed, 1);

        let snap = lights.snapshot();
        assert_eq!(snap[0].id, "a");
        assert_eq!(snap[1].id, "b");
        assert!(snap[1].on.on);
        // Untouched fields survive.
        assert_eq!(snap[1].metadata.name, "Hall");
        assert!((snap[1].dimming.as_ref().unwrap().brightness - 50.0).abs() < f64::EPSILON);
    }

    #[test]
    fn unknown_ids_are_not_inserted() {
        let lights = ResourceCollection::<Light>::new();
        lights.replace(vec![light("a", "Desk", false)]);
        let changed = lights.merge(&[patch(json!({ "id": "zz", "on": { "on": true } }))]);
        assert_eq!(changed, 0);
        assert_eq!(lights.len(), 1);
    }

    #[test]
    fn subscribers_see_merges() {
        let lights = ResourceCollection::<Light>::new();
        lights.replace(vec![light("a", "Desk", false)]);
        let mut rx = lights.subscribe();

        lights.merge(&[patch(json!({ "id": "a", "on": { "on": true } }))]);
        assert!(rx.has_changed().unwrap());
        assert!(rx.borrow_and_update()[0].on.on);

        // A no-op merge does not notify.
        lights.merge(&[patch(json!({ "id": "nope", "on": { "on": true } }))]);
        assert!(!rx.has_changed().unwrap());
    }

    #[test]
    fn ill_typed_patch_is_skipped() {
        let lights = ResourceCollection::<Light>::new();
        lights.replace(vec![light("a", "Desk", false)]);
        let changed = lights.merge(&[patch(json!({ "id": "a", "on": "yes" }))]);
        assert_eq!(changed, 0);
        assert!(!lights.get("a").unwrap().on.on);
    }

    #[test]
    fn null_clears_optional_field() {
        let lights = ResourceCollection::<Light>::new();
        lights.replace(vec![light("a", "Desk", false)]);
        let changed = lights.merge(&[patch(json!({ "id": "a", "dimming": null }))]);
        assert_eq!(changed, 1);
        let light = lights.get("a").unwrap();
        assert!(light.dimming.is_none());
        assert_eq!(light.metadata.name, "Desk");
    }
}
