// ── Bridge session ──
//
// Owns one authenticated client, its push stream, and the task that merges
// pushed batches into the resource store. Dropping the session (or calling
// `shutdown`) stops the stream and the merge task.

use std::sync::Arc;

use huelink_api::{BridgeClient, EventBatch, EventStreamHandle, LightUpdate, ResourceKind, StreamStatus};
use serde_json::Value;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::command::PendingChange;
use crate::config::{BridgeConfig, LinkConfig};
use crate::error::CoreError;
use crate::store::ResourceStore;

/// A live connection to one bridge.
pub struct Bridge {
    id: String,
    client: BridgeClient,
    store: Arc<ResourceStore>,
    events: EventStreamHandle,
    cancel: CancellationToken,
    merge_task: JoinHandle<()>,
}

impl Bridge {
    /// Connect to a saved bridge over the pinned transport.
    pub async fn connect(config: &BridgeConfig, link: &LinkConfig) -> Result<Self, CoreError> {
        let transport = config.transport(link);
        let client = BridgeClient::connect(&transport, config.username.clone(), link.queues)?;
        Self::start(config.id.clone(), client).await
    }

    /// Verify the credential, open the push stream, and load every
    /// resource collection.
    ///
    /// The stream is opened before the bulk reads so no change made during
    /// the reads is missed.
    pub async fn start(id: String, client: BridgeClient) -> Result<Self, CoreError> {
        client.verify().await?;

        let store = Arc::new(ResourceStore::new());
        let cancel = CancellationToken::new();
        let events = client.open_event_stream(cancel.child_token())?;
        let merge_task = tokio::spawn(merge_task(Arc::clone(&store), events.subscribe(), cancel.clone()));

        let bridge = Self {
            id,
            client,
            store,
            events,
            cancel,
            merge_task,
        };
        bridge.refresh_all().await?;
        info!(bridge_id = %bridge.id, "bridge session started");
        Ok(bridge)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn client(&self) -> &BridgeClient {
        &self.client
    }

    pub fn store(&self) -> &Arc<ResourceStore> {
        &self.store
    }

    /// Observe the push stream's state.
    pub fn stream_status(&self) -> watch::Receiver<StreamStatus> {
        self.events.status()
    }

    // ── Reads ────────────────────────────────────────────────────────

    /// Reload every collection from the bridge.
    pub async fn refresh_all(&self) -> Result<(), CoreError> {
        let (lights, grouped, rooms, zones, scenes) = tokio::try_join!(
            self.client.get_lights(),
            self.client.get_grouped_lights(),
            self.client.get_rooms(),
            self.client.get_zones(),
            self.client.get_scenes(),
        )?;

        debug!(
            lights = lights.len(),
            grouped_lights = grouped.len(),
            rooms = rooms.len(),
            zones = zones.len(),
            scenes = scenes.len(),
            "refreshed resources"
        );
        self.store.replace_lights(lights);
        self.store.replace_grouped_lights(grouped);
        self.store.replace_rooms(rooms);
        self.store.replace_zones(zones);
        self.store.replace_scenes(scenes);
        Ok(())
    }

    /// Find a light by id or case-insensitive name.
    pub fn find_light(&self, query: &str) -> Option<String> {
        self.store
            .lights()
            .iter()
            .find(|l| l.id == query || l.metadata.name.eq_ignore_ascii_case(query))
            .map(|l| l.id.clone())
    }

    /// Find the grouped light of a room or zone, by group id or name.
    pub fn find_group(&self, query: &str) -> Option<String> {
        let rooms = self.store.rooms();
        let zones = self.store.zones();
        rooms
            .iter()
            .map(|r| &r.0)
            .chain(zones.iter().map(|z| &z.0))
            .find(|g| g.id == query || g.metadata.name.eq_ignore_ascii_case(query))
            .and_then(|g| g.grouped_light_id().map(str::to_owned))
    }

    /// Find a scene by id or case-insensitive name.
    pub fn find_scene(&self, query: &str) -> Option<String> {
        self.store
            .scenes()
            .iter()
            .find(|s| s.id == query || s.metadata.name.eq_ignore_ascii_case(query))
            .map(|s| s.id.clone())
    }

    // ── Writes ───────────────────────────────────────────────────────

    /// Change one light. The cache shows the change at once and is rolled
    /// back if the bridge refuses it.
    pub async fn set_light(&self, id: &str, update: &LightUpdate) -> Result<Vec<Value>, CoreError> {
        self.optimistic(ResourceKind::Light, id, update, self.client.update_light(id, update))
            .await
    }

    /// Change a room or zone through its grouped light.
    pub async fn set_grouped_light(&self, id: &str, update: &LightUpdate) -> Result<Vec<Value>, CoreError> {
        self.optimistic(
            ResourceKind::GroupedLight,
            id,
            update,
            self.client.update_grouped_light(id, update),
        )
        .await
    }

    pub async fn recall_scene(&self, id: &str) -> Result<Vec<Value>, CoreError> {
        Ok(self.client.recall_scene(id).await?)
    }

    async fn optimistic(
        &self,
        kind: ResourceKind,
        id: &str,
        update: &LightUpdate,
        request: impl Future<Output = Result<Vec<Value>, huelink_api::Error>>,
    ) -> Result<Vec<Value>, CoreError> {
        if update.is_empty() {
            return Ok(Vec::new());
        }
        let change = PendingChange::apply(&self.store, kind, id, update.to_patch());
        match request.await {
            Ok(ack) => {
                change.commit();
                Ok(ack)
            }
            Err(e) => {
                change.undo();
                Err(e.into())
            }
        }
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Stop the push stream and the merge task.
    pub fn shutdown(&self) {
        debug!(bridge_id = %self.id, "closing bridge session");
        self.cancel.cancel();
        self.events.shutdown();
    }

    pub fn is_closed(&self) -> bool {
        self.merge_task.is_finished()
    }
}

impl Drop for Bridge {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Merge pushed batches into the store until cancelled.
async fn merge_task(store: Arc<ResourceStore>, mut rx: broadcast::Receiver<EventBatch>, cancel: CancellationToken) {
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            batch = rx.recv() => match batch {
                Ok(batch) => {
                    let summary = store.apply_event_batch(&batch);
                    trace!(updated = summary.updated, ignored = summary.ignored, "merged push batch");
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "merge task fell behind the push stream");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    }
    debug!("merge task stopped");
}
