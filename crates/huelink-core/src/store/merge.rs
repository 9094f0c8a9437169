// ── Push event merge rules ──
//
// A push batch is a JSON array. Elements are either resource objects
// (`{"type": "light", "id": ..., fields...}`) or event envelopes
// (`{"type": "update", "data": [resource...]}`). Resources are grouped by
// class, same-id items within the batch are folded together, and the result
// is overlaid onto existing records by id.

use std::collections::HashMap;

use huelink_api::ResourceKind;
use serde_json::{Map, Value};
use tracing::{debug, trace};

/// Envelope types whose resources are merged.
const UPDATE_EVENT: &str = "update";

/// Envelope types that describe membership changes or failures; logged only.
const SKIPPED_EVENTS: [&str; 3] = ["add", "delete", "error"];

/// Resource patches from one batch, grouped by class.
pub type Partitioned = HashMap<ResourceKind, Vec<Map<String, Value>>>;

/// Copy every top-level field of `patch` onto `target`.
pub fn overlay(target: &mut Map<String, Value>, patch: &Map<String, Value>) {
    for (key, value) in patch {
        target.insert(key.clone(), value.clone());
    }
}

/// Turn one batch into per-class, per-id patches.
pub fn partition_batch(batch: &[Value]) -> Partitioned {
    let mut grouped: Partitioned = HashMap::new();
    for item in flatten(batch) {
        let Some(kind) = item
            .get("type")
            .and_then(Value::as_str)
            .and_then(|t| t.parse::<ResourceKind>().ok())
        else {
            trace!(kind = ?item.get("type"), "ignoring resource class");
            continue;
        };
        grouped.entry(kind).or_default().push(item);
    }

    for patches in grouped.values_mut() {
        *patches = coalesce(std::mem::take(patches));
    }
    grouped
}

/// Fold items sharing an id into one, later fields over earlier ones.
///
/// Order follows each id's first appearance. Items without an id are dropped.
pub fn coalesce(items: Vec<Map<String, Value>>) -> Vec<Map<String, Value>> {
    let mut order: Vec<String> = Vec::new();
    let mut merged: HashMap<String, Map<String, Value>> = HashMap::new();

    for item in items {
        let Some(id) = item.get("id").and_then(Value::as_str).map(str::to_owned) else {
            continue;
        };
        match merged.get_mut(&id) {
            Some(existing) => overlay(existing, &item),
            None => {
                order.push(id.clone());
                merged.insert(id, item);
            }
        }
    }

    order.into_iter().filter_map(|id| merged.remove(&id)).collect()
}

/// Unwrap event envelopes into the resource objects they carry.
fn flatten(batch: &[Value]) -> Vec<Map<String, Value>> {
    let mut out = Vec::new();
    for element in batch {
        let Some(object) = element.as_object() else {
            trace!("ignoring non-object event element");
            continue;
        };

        let event_type = object.get("type").and_then(Value::as_str);
        match (event_type, object.get("data").and_then(Value::as_array)) {
            (Some(UPDATE_EVENT), Some(data)) => {
                out.extend(data.iter().filter_map(Value::as_object).cloned());
            }
            (Some(t), Some(data)) if SKIPPED_EVENTS.contains(&t) => {
                debug!(event = t, count = data.len(), "skipping membership event");
            }
            _ => out.push(object.clone()),
        }
    }
    out
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    fn obj(value: Value) -> Map<String, Value> {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn overlay_is_shallow() {
        let mut target = obj(json!({ "id": "a", "dimming": { "brightness": 10, "min_dim_level": 1 }, "on": { "on": true } }));
        overlay(&mut target, &obj(json!({ "dimming": { "brightness": 90 } })));
        assert_eq!(Value::Object(target), json!({ "id": "a", "dimming": { "brightness": 90 }, "on": { "on": true } }));
    }

    #[test]
    fn same_batch_items_are_folded() {
        let folded = coalesce(vec![
            obj(json!({ "id": "a", "on": { "on": true } })),
            obj(json!({ "id": "b", "on": { "on": false } })),
            obj(json!({ "id": "a", "dimming": { "brightness": 40 } })),
            obj(json!({ "id": "a", "on": { "on": false } })),
        ]);
        assert_eq!(folded.len(), 2);
        assert_eq!(
            Value::Object(folded[0].clone()),
            json!({ "id": "a", "on": { "on": false }, "dimming": { "brightness": 40 } })
        );
        assert_eq!(folded[1]["id"], "b");
    }

    #[test]
    fn batch_is_partitioned_by_class() {
        let batch = vec![
            json!({ "type": "update", "data": [
                { "id": "l1", "type": "light", "on": { "on": true } },
                { "id": "g1", "type": "grouped_light", "on": { "on": true } },
                { "id": "d1", "type": "device", "metadata": {} }
            ]}),
            json!({ "id": "l1", "type": "light", "dimming": { "brightness": 5 } }),
        ];
        let parts = partition_batch(&batch);
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[&ResourceKind::Light].len(), 1);
        assert_eq!(parts[&ResourceKind::Light][0]["dimming"]["brightness"], 5);
        assert_eq!(parts[&ResourceKind::Light][0]["on"]["on"], true);
        assert_eq!(parts[&ResourceKind::GroupedLight][0]["id"], "g1");
    }

    #[test]
    fn add_and_delete_events_are_skipped() {
        let batch = vec![
            json!({ "type": "add", "data": [{ "id": "l9", "type": "light" }] }),
            json!({ "type": "delete", "data": [{ "id": "l1", "type": "light" }] }),
        ];
        assert!(partition_batch(&batch).is_empty());
    }

    #[test]
    fn items_without_id_are_dropped() {
        let parts = partition_batch(&[json!({ "type": "light", "on": { "on": true } })]);
        assert!(parts[&ResourceKind::Light].is_empty());
    }
}
