// Resource types for the bridge's CLIP v2 API.
//
// Only the fields the core reads are typed; everything else the bridge sends
// is kept in `extra` so a round trip through these types loses nothing.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ── ResourceKind ─────────────────────────────────────────────────────

/// The resource classes this client reads, updates, and merges.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::AsRefStr,
    strum::EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ResourceKind {
    Light,
    GroupedLight,
    Room,
    Zone,
    Scene,
}

impl ResourceKind {
    /// Relative path of the collection endpoint, e.g. `clip/v2/resource/light`.
    pub fn collection_path(self) -> String {
        format!("clip/v2/resource/{self}")
    }

    /// Relative path of a single resource.
    pub fn item_path(self, id: &str) -> String {
        format!("clip/v2/resource/{self}/{id}")
    }
}

/// A bridge resource with a stable identity.
pub trait Resource: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    const KIND: ResourceKind;

    fn id(&self) -> &str;
}

// ── Shared pieces ────────────────────────────────────────────────────

/// Reference to another resource: `{"rid": "...", "rtype": "light"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRef {
    pub rid: String,
    pub rtype: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archetype: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OnState {
    pub on: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dimming {
    /// Brightness percentage, 0-100.
    pub brightness: f64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct XyPoint {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ColorState {
    pub xy: XyPoint,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ColorTemperature {
    /// Color temperature in mirek; absent when the light is in xy mode.
    #[serde(default)]
    pub mirek: Option<u16>,
    #[serde(default)]
    pub mirek_valid: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

// ── Resources ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Light {
    pub id: String,
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<ResourceRef>,
    #[serde(default)]
    pub on: OnState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimming: Option<Dimming>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<ColorState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color_temperature: Option<ColorTemperature>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Resource for Light {
    const KIND: ResourceKind = ResourceKind::Light;

    fn id(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupedLight {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<ResourceRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on: Option<OnState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimming: Option<Dimming>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Resource for GroupedLight {
    const KIND: ResourceKind = ResourceKind::GroupedLight;

    fn id(&self) -> &str {
        &self.id
    }
}

/// A room or zone: a named group of devices with a grouped-light service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    pub id: String,
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(default)]
    pub children: Vec<ResourceRef>,
    #[serde(default)]
    pub services: Vec<ResourceRef>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Group {
    /// The grouped-light service that switches this whole group.
    pub fn grouped_light_id(&self) -> Option<&str> {
        self.services
            .iter()
            .find(|s| s.rtype == "grouped_light")
            .map(|s| s.rid.as_str())
    }
}

/// Rooms and zones share a shape but are distinct resource classes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Room(pub Group);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Zone(pub Group);

impl Resource for Room {
    const KIND: ResourceKind = ResourceKind::Room;

    fn id(&self) -> &str {
        &self.0.id
    }
}

impl Resource for Zone {
    const KIND: ResourceKind = ResourceKind::Zone;

    fn id(&self) -> &str {
        &self.0.id
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scene {
    pub id: String,
    #[serde(default)]
    pub metadata: Metadata,
    /// The room or zone this scene belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<ResourceRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Resource for Scene {
    const KIND: ResourceKind = ResourceKind::Scene;

    fn id(&self) -> &str {
        &self.id
    }
}

// ── Update payloads ──────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DimmingUpdate {
    pub brightness: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ColorUpdate {
    pub xy: XyPoint,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ColorTemperatureUpdate {
    pub mirek: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DynamicsUpdate {
    /// Transition duration in milliseconds.
    pub duration: u32,
}

/// Partial state for a light or grouped light. Only set fields are sent.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LightUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub on: Option<OnState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dimming: Option<DimmingUpdate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<ColorUpdate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color_temperature: Option<ColorTemperatureUpdate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dynamics: Option<DynamicsUpdate>,
}

impl LightUpdate {
    pub fn on(mut self, on: bool) -> Self {
        self.on = Some(OnState { on });
        self
    }

    /// Brightness percentage, clamped to 0-100.
    pub fn brightness(mut self, brightness: f64) -> Self {
        self.dimming = Some(DimmingUpdate {
            brightness: brightness.clamp(0.0, 100.0),
        });
        self
    }

    pub fn xy(mut self, x: f64, y: f64) -> Self {
        self.color = Some(ColorUpdate {
            xy: XyPoint { x, y },
        });
        self
    }

    pub fn mirek(mut self, mirek: u16) -> Self {
        self.color_temperature = Some(ColorTemperatureUpdate { mirek });
        self
    }

    pub fn transition_ms(mut self, duration: u32) -> Self {
        self.dynamics = Some(DynamicsUpdate { duration });
        self
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// This update as a JSON object, for overlaying onto cached records.
    ///
    /// `dynamics` is a transition hint, not state, so it is left out.
    pub fn to_patch(&self) -> Map<String, Value> {
        let mut patch = match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        };
        patch.remove("dynamics");
        patch
    }
}

/// Scene recall request body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SceneRecall {
    pub recall: RecallAction,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecallAction {
    pub action: String,
}

impl SceneRecall {
    pub fn active() -> Self {
        Self {
            recall: RecallAction {
                action: "active".into(),
            },
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────
