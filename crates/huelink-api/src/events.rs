//! Push event stream.
//!
//! The bridge pushes server-sent events on `/eventstream/clip/v2`. Each
//! `data:` line carries part of a JSON array; one array may be split across
//! many lines and across network reads. [`EventStreamDecoder`] reassembles
//! the arrays and [`EventStreamHandle`] runs the read loop in the background,
//! broadcasting each completed array as one batch.
//!
//! The stream is not re-established when it ends. Reconnecting means
//! building a new client, which is the owner's decision.
//!
//! ```rust,ignore
//! let handle = EventStreamHandle::open(http, url, app_key, cancel);
//! let mut rx = handle.subscribe();
//! while let Ok(batch) = rx.recv().await {
//!     println!("{} updates", batch.len());
//! }
//! ```

use std::sync::Arc;

use futures_util::StreamExt;
use reqwest::header::ACCEPT;
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};
use url::Url;

use crate::client::APP_KEY_HEADER;
use crate::error::Error;

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// One completed top-level array from the push stream.
pub type EventBatch = Arc<Vec<Value>>;

// ── ArrayParser ──────────────────────────────────────────────────────

/// Outcome of feeding bytes to an [`ArrayParser`].
#[derive(Debug, PartialEq)]
pub enum Feed {
    /// The array is still open; all bytes were consumed.
    Pending,
    /// The array closed. `rest` is the offset of the first unconsumed byte.
    Complete { elements: Vec<Value>, rest: usize },
}

/// Incremental parser for exactly one top-level JSON array.
///
/// Tracks nesting and string state byte by byte, buffering the array text
/// until its closing bracket. Once it has produced a value it refuses more
/// input; the caller creates a fresh parser for the next array.
#[derive(Debug, Default)]
pub struct ArrayParser {
    buf: Vec<u8>,
    depth: usize,
    in_string: bool,
    escaped: bool,
    done: bool,
}

impl ArrayParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// `true` once the opening bracket has been seen and the array is not yet closed.
    pub fn in_progress(&self) -> bool {
        !self.done && self.depth > 0
    }

    pub fn feed(&mut self, bytes: &[u8]) -> Result<Feed, Error> {
        if self.done {
            return Err(Error::EventStream(
                "parser already produced a value; a second top-level value is not allowed".into(),
            ));
        }

        for (i, &b) in bytes.iter().enumerate() {
            if self.depth == 0 {
                match b {
                    b'[' => {
                        self.depth = 1;
                        self.buf.push(b);
                    }
                    b if b.is_ascii_whitespace() => {}
                    other => {
                        return Err(Error::EventStream(format!(
                            "expected '[' to open an event array, found {:?}",
                            char::from(other)
                        )));
                    }
                }
                continue;
            }

            self.buf.push(b);
            if self.in_string {
                if self.escaped {
                    self.escaped = false;
                } else if b == b'\\' {
                    self.escaped = true;
                } else if b == b'"' {
                    self.in_string = false;
                }
                continue;
            }

            match b {
                b'"' => self.in_string = true,
                b'[' | b'{' => self.depth += 1,
                b']' | b'}' => {
                    self.depth -= 1;
                    if self.depth == 0 {
                        self.done = true;
                        let elements: Vec<Value> = serde_json::from_slice(&self.buf).map_err(|e| {
                            Error::EventStream(format!("malformed event array: {e}"))
                        })?;
                        return Ok(Feed::Complete {
                            elements,
                            rest: i + 1,
                        });
                    }
                }
                _ => {}
            }
        }
        Ok(Feed::Pending)
    }
}

// ── EventStreamDecoder ───────────────────────────────────────────────

/// Turns raw response chunks into completed event arrays.
///
/// Splits the byte stream into lines, keeps only `data:` payloads, and feeds
/// them to an [`ArrayParser`], replacing the parser after every array.
#[derive(Debug, Default)]
pub struct EventStreamDecoder {
    line: Vec<u8>,
    parser: ArrayParser,
}

impl EventStreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume one network read and return every array it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Vec<Value>> {
        let mut batches = Vec::new();
        let mut start = 0;
        for (i, &b) in chunk.iter().enumerate() {
            if b == b'\n' {
                self.line.extend_from_slice(&chunk[start..i]);
                let line = std::mem::take(&mut self.line);
                self.handle_line(&line, &mut batches);
                start = i + 1;
            }
        }
        self.line.extend_from_slice(&chunk[start..]);
        batches
    }

    /// Close the decoder at end of stream, flushing a final unterminated line.
    ///
    /// Returns `true` if an array was left incomplete.
    pub fn finish(&mut self) -> (Vec<Vec<Value>>, bool) {
        let mut batches = Vec::new();
        if !self.line.is_empty() {
            let line = std::mem::take(&mut self.line);
            self.handle_line(&line, &mut batches);
        }
        let truncated = self.parser.in_progress();
        self.parser = ArrayParser::new();
        (batches, truncated)
    }

    fn handle_line(&mut self, line: &[u8], batches: &mut Vec<Vec<Value>>) {
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        let Some(payload) = line.strip_prefix(b"data:") else {
            // id:, event:, retry:, comments and blank separators carry nothing we merge.
            return;
        };
        let payload = payload.strip_prefix(b" ").unwrap_or(payload);
        trace!(bytes = payload.len(), "event stream data line");

        let mut remaining = payload;
        loop {
            match self.parser.feed(remaining) {
                Ok(Feed::Pending) => break,
                Ok(Feed::Complete { elements, rest }) => {
                    batches.push(elements);
                    self.parser = ArrayParser::new();
                    remaining = &remaining[rest..];
                    if remaining.iter().all(u8::is_ascii_whitespace) {
                        break;
                    }
                }
                Err(e) => {
                    warn!(error = %e, "discarding malformed event data");
                    self.parser = ArrayParser::new();
                    break;
                }
            }
        }
        // Arrays span lines; the line break is insignificant JSON whitespace.
        if self.parser.in_progress() {
            let _ = self.parser.feed(b"\n");
        }
    }
}

// ── EventStreamHandle ────────────────────────────────────────────────

/// Lifecycle of the background read loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamStatus {
    Connecting,
    Open,
    Closed { reason: Option<String> },
}

/// Handle to a running event stream.
///
/// Dropping the handle cancels the read loop.
#[derive(Debug)]
pub struct EventStreamHandle {
    batches: broadcast::Sender<EventBatch>,
    status: watch::Receiver<StreamStatus>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl EventStreamHandle {
    /// Spawn the read loop against `url`.
    ///
    /// Returns immediately; the connection is made in the background.
    /// Subscribe before awaiting anything else, since batches are not
    /// replayed to late subscribers.
    pub fn open(http: reqwest::Client, url: Url, app_key: SecretString, cancel: CancellationToken) -> Self {
        let (batches, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (status_tx, status) = watch::channel(StreamStatus::Connecting);

        let task_cancel = cancel.clone();
        let tx = batches.clone();
        let task = tokio::spawn(async move {
            stream_loop(http, url, app_key, tx, status_tx, task_cancel).await;
        });

        Self {
            batches,
            status,
            cancel,
            task,
        }
    }

    /// Receive every batch completed from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<EventBatch> {
        self.batches.subscribe()
    }

    /// Observe the read loop's state.
    pub fn status(&self) -> watch::Receiver<StreamStatus> {
        self.status.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.task.is_finished()
    }

    /// Signal the read loop to stop.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

impl Drop for EventStreamHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn stream_loop(
    http: reqwest::Client,
    url: Url,
    app_key: SecretString,
    tx: broadcast::Sender<EventBatch>,
    status: watch::Sender<StreamStatus>,
    cancel: CancellationToken,
) {
    let result = tokio::select! {
        biased;
        () = cancel.cancelled() => Ok(()),
        result = read_stream(&http, &url, &app_key, &tx, &status) => result,
    };

    let reason = match result {
        Ok(()) => {
            info!("event stream closed");
            None
        }
        Err(e) => {
            warn!(error = %e, "event stream failed");
            Some(e.to_string())
        }
    };
    status.send_replace(StreamStatus::Closed { reason });
}

async fn read_stream(
    http: &reqwest::Client,
    url: &Url,
    app_key: &SecretString,
    tx: &broadcast::Sender<EventBatch>,
    status: &watch::Sender<StreamStatus>,
) -> Result<(), Error> {
    info!(url = %url, "opening event stream");

    let resp = http
        .get(url.clone())
        .header(APP_KEY_HEADER, app_key.expose_secret())
        .header(ACCEPT, "text/event-stream")
        .send()
        .await?;

    let code = resp.status();
    if code == reqwest::StatusCode::FORBIDDEN {
        return Err(Error::CredentialRejected);
    }
    if !code.is_success() {
        return Err(Error::Bridge {
            status: code.as_u16(),
            message: format!("event stream refused: {code}"),
        });
    }

    status.send_replace(StreamStatus::Open);
    debug!("event stream open");

    let mut decoder = EventStreamDecoder::new();
    let mut body = resp.bytes_stream();
    while let Some(chunk) = body.next().await {
        let chunk = chunk.map_err(|e| Error::EventStream(e.to_string()))?;
        for batch in decoder.push(&chunk) {
            // No subscribers right now is fine.
            let _ = tx.send(Arc::new(batch));
        }
    }

    let (tail, truncated) = decoder.finish();
    for batch in tail {
        let _ = tx.send(Arc::new(batch));
    }
    if truncated {
        warn!("event stream ended in the middle of an array");
    }
    Ok(())
}

// ── Tests ────────────────────────────────────────────────────────────
