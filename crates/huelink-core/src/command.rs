// ── Optimistic commands ──
//
// A command changes the cache before the bridge confirms, so subscribers see
// the new state immediately. If the bridge rejects the request (or the
// queue refuses it) the fields it touched are put back. Fields it did not
// touch keep whatever the event stream delivered in the meantime.

use std::sync::Arc;

use huelink_api::ResourceKind;
use serde_json::{Map, Value};
use tracing::debug;

use crate::store::ResourceStore;

/// A patch applied to the store ahead of the bridge's confirmation.
#[must_use = "a pending change must be committed or undone"]
pub struct PendingChange {
    store: Arc<ResourceStore>,
    kind: ResourceKind,
    id: String,
    inverse: Option<Map<String, Value>>,
}

impl PendingChange {
    /// Capture the prior value of every field in `patch`, then overlay
    /// `patch` onto the record.
    ///
    /// A record that is not cached is left alone; undoing such a change
    /// does nothing.
    pub fn apply(store: &Arc<ResourceStore>, kind: ResourceKind, id: &str, mut patch: Map<String, Value>) -> Self {
        let inverse = store.record(kind, id).map(|record| {
            let mut inverse: Map<String, Value> = patch
                .keys()
                .filter(|key| key.as_str() != "id")
                .map(|key| (key.clone(), record.get(key).cloned().unwrap_or(Value::Null)))
                .collect();
            inverse.insert("id".into(), Value::String(id.to_owned()));
            inverse
        });
        if inverse.is_some() {
            patch.insert("id".into(), Value::String(id.to_owned()));
            store.merge(kind, &[patch]);
        }
        Self {
            store: Arc::clone(store),
            kind,
            id: id.to_owned(),
            inverse,
        }
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Keep the change; the bridge accepted it.
    pub fn commit(self) {
        debug!(kind = %self.kind, id = %self.id, "change confirmed");
    }

    /// Put the touched fields back. Returns `true` if the store changed.
    pub fn undo(self) -> bool {
        debug!(kind = %self.kind, id = %self.id, "reverting change");
        match self.inverse {
            Some(inverse) => self.store.merge(self.kind, &[inverse]) > 0,
            None => false,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use huelink_api::LightUpdate;
    use serde_json::json;

    use super::*;

    fn store() -> Arc<ResourceStore> {
        let store = Arc::new(ResourceStore::new());
        store.replace_lights(vec![
            serde_json::from_value(json!({
                "id": "l1", "type": "light",
                "metadata": { "name": "Desk" },
                "on": { "on": false },
                "dimming": { "brightness": 30.0 }
            }))
            .unwrap(),
        ]);
        store
    }

    #[test]
    fn apply_is_visible_immediately() {
        let store = store();
        let change = PendingChange::apply(
            &store,
            ResourceKind::Light,
            "l1",
            LightUpdate::default().on(true).brightness(80.0).to_patch(),
        );
        let light = store.light("l1").unwrap();
        assert!(light.on.on);
        assert!((light.dimming.as_ref().unwrap().brightness - 80.0).abs() < f64::EPSILON);
        change.commit();
        assert!(store.light("l1").unwrap().on.on);
    }

    #[test]
    fn undo_restores_previous_state() {
        let store = store();
        let change = PendingChange::apply(
            &store,
            ResourceKind::Light,
            "l1",
            LightUpdate::default().on(true).to_patch(),
        );
        assert!(change.undo());
        let light = store.light("l1").unwrap();
        assert!(!light.on.on);
        assert_eq!(light.metadata.name, "Desk");
    }

    #[test]
    fn undo_keeps_fields_pushed_while_pending() {
        let store = store();
        let change = PendingChange::apply(
            &store,
            ResourceKind::Light,
            "l1",
            LightUpdate::default().on(true).to_patch(),
        );
        store.apply_event_batch(&[json!({
            "type": "update",
            "data": [{ "id": "l1", "type": "light", "dimming": { "brightness": 75.0 } }]
        })]);

        assert!(change.undo());
        let light = store.light("l1").unwrap();
        assert!(!light.on.on);
        assert!((light.dimming.as_ref().unwrap().brightness - 75.0).abs() < f64::EPSILON);
    }

    #[test]
    fn undo_clears_fields_the_record_lacked() {
        let store = store();
        let change = PendingChange::apply(
            &store,
            ResourceKind::Light,
            "l1",
            LightUpdate::default().mirek(370).to_patch(),
        );
        assert!(store.light("l1").unwrap().color_temperature.is_some());
        assert!(change.undo());
        assert!(store.light("l1").unwrap().color_temperature.is_none());
    }

    #[test]
    fn uncached_target_is_untouched() {
        let store = store();
        let change = PendingChange::apply(&store, ResourceKind::Light, "missing", LightUpdate::default().on(true).to_patch());
        assert!(!change.undo());
        assert_eq!(store.lights().len(), 1);
    }
}
