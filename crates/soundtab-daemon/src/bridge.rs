/// Browser bridge over the native-messaging pipe.
///
/// Architecture:
///
/// ```text
///   NativeBridge::spawn(stdin, stdout)
///         │
///         ├── writer_task   ← receives encoded frames via mpsc → stdout
///         └── reader_task   ← reads frames from stdin
///                                ├── reply (has id)      → matched oneshot::Sender
///                                └── tab_updated/removed → DaemonEvent::Host
/// ```
///
/// Every frame is a 4-byte length in native byte order followed by that many
/// bytes of UTF-8 JSON.  When the browser closes stdin the bridge asks the
/// core to shut down.
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use soundtab_proto::media::{HostTab, TabId};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::core::DaemonEvent;
use crate::host::{
    ElementInfo, ElementRef, HostError, HostEvent, HostPlatform, KeyTarget, MediaKey,
    MediaSessionAction, PageContext, PlayerHandle,
};
use crate::indicator::{IconState, Indicator};

/// Largest frame accepted from the browser.
pub const MAX_INCOMING_FRAME: usize = 64 * 1024 * 1024;

// ── wire types ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "call", rename_all = "snake_case")]
pub enum HostCall {
    QueryTabs,
    GetTab { tab_id: TabId },
    SetMuted { tab_id: TabId, muted: bool },
    ActivateTab { tab_id: TabId },
    InjectController { tab_id: TabId },
    SetIndicator { icon: IconState, title: String },
    Page { tab_id: TabId, op: PageOp },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum PageOp {
    QueryElements { selector: String },
    Click { element: ElementRef },
    HasMediaSession,
    DispatchMediaSession { action: MediaSessionAction },
    FindPlayers { globals: Vec<String>, frameworks: Vec<String> },
    InvokePlayer { path: String, method: String },
    DispatchKey { target: KeyTarget, key: MediaKey },
    TogglePlayback,
}

#[derive(Debug, Serialize)]
struct HostRequest<'a> {
    id: u64,
    #[serde(flatten)]
    call: &'a HostCall,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BridgeErrorKind {
    TabGone,
    NotScriptable,
    Script,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BridgeError {
    pub kind: BridgeErrorKind,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Incoming {
    Reply {
        id: u64,
        #[serde(default)]
        ok: Value,
        #[serde(default)]
        error: Option<BridgeError>,
    },
    TabUpdated {
        tab: HostTab,
    },
    TabRemoved {
        tab_id: TabId,
    },
}

fn into_host_error(err: BridgeError, tab_id: Option<TabId>) -> HostError {
    match (err.kind, tab_id) {
        (BridgeErrorKind::TabGone, Some(id)) => HostError::TabGone(id),
        (BridgeErrorKind::NotScriptable, _) => HostError::NotScriptable(err.message),
        (BridgeErrorKind::Script, _) => HostError::Script(err.message),
        _ => HostError::Call(err.message),
    }
}

// ── framing ───────────────────────────────────────────────────────────────────

pub fn encode_frame(payload: &[u8]) -> Vec<u8> {
    let len = payload.len() as u32;
    let mut buf = Vec::with_capacity(4 + payload.len());
    buf.extend_from_slice(&len.to_ne_bytes());
    buf.extend_from_slice(payload);
    buf
}

/// Read one frame.  `Ok(None)` on a clean EOF between frames.
pub async fn read_frame<R>(reader: &mut R) -> std::io::Result<Option<Vec<u8>>>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    }
    let len = u32::from_ne_bytes(len_buf) as usize;
    if len > MAX_INCOMING_FRAME {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("frame of {} bytes exceeds limit", len),
        ));
    }
    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;
    Ok(Some(payload))
}

// ── bridge ────────────────────────────────────────────────────────────────────

type ReplySender = oneshot::Sender<Result<Value, BridgeError>>;

/// Reply channels by request id.  `None` once the browser side has gone away.
/// Only locked for map updates, never across an await.
type PendingMap = Arc<Mutex<Option<HashMap<u64, ReplySender>>>>;

/// Owns one entry in the pending map.  Dropping it removes the entry, so a
/// call that times out or is cancelled by its caller leaves nothing behind.
struct PendingEntry {
    id: u64,
    pending: PendingMap,
}

impl Drop for PendingEntry {
    fn drop(&mut self) {
        if let Ok(mut guard) = self.pending.lock() {
            if let Some(map) = guard.as_mut() {
                map.remove(&self.id);
            }
        }
    }
}

struct BridgeInner {
    tx: mpsc::Sender<Vec<u8>>,
    pending: PendingMap,
    next_id: AtomicU64,
    call_timeout: Duration,
}

impl BridgeInner {
    /// Register a reply channel for `id`.  Fails once the browser is gone.
    fn register(&self, id: u64, reply: ReplySender) -> Result<PendingEntry, HostError> {
        let mut guard = self.pending.lock().map_err(|_| HostError::Disconnected)?;
        match guard.as_mut() {
            Some(map) => {
                map.insert(id, reply);
                Ok(PendingEntry {
                    id,
                    pending: self.pending.clone(),
                })
            }
            None => Err(HostError::Disconnected),
        }
    }

    async fn call<T: DeserializeOwned>(&self, call: HostCall) -> Result<T, HostError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let tab_id = match &call {
            HostCall::GetTab { tab_id }
            | HostCall::SetMuted { tab_id, .. }
            | HostCall::ActivateTab { tab_id }
            | HostCall::InjectController { tab_id }
            | HostCall::Page { tab_id, .. } => Some(*tab_id),
            _ => None,
        };
        let payload = serde_json::to_vec(&HostRequest { id, call: &call })
            .map_err(|e| HostError::Call(e.to_string()))?;

        // Registered before the frame is queued so the reader can match a
        // fast reply.
        let (reply_tx, reply_rx) = oneshot::channel();
        let _entry = self.register(id, reply_tx)?;

        self.tx
            .send(encode_frame(&payload))
            .await
            .map_err(|_| HostError::Disconnected)?;

        let outcome = match tokio::time::timeout(self.call_timeout, reply_rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => return Err(HostError::Disconnected),
            Err(_) => return Err(HostError::Timeout(self.call_timeout)),
        };

        let value = outcome.map_err(|e| into_host_error(e, tab_id))?;
        serde_json::from_value(value).map_err(|e| HostError::Call(format!("malformed reply: {}", e)))
    }
}

/// `HostPlatform` backed by the browser extension on the other end of
/// stdin/stdout.  Cheap to clone.
#[derive(Clone)]
pub struct NativeBridge {
    inner: Arc<BridgeInner>,
}

impl NativeBridge {
    pub fn spawn<R, W>(reader: R, writer: W, event_tx: mpsc::Sender<DaemonEvent>, call_timeout: Duration) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let pending: PendingMap = Arc::new(Mutex::new(Some(HashMap::new())));
        let (tx, rx) = mpsc::channel::<Vec<u8>>(64);

        tokio::spawn(writer_task(writer, rx, pending.clone()));
        tokio::spawn(reader_task(reader, pending.clone(), event_tx));

        Self {
            inner: Arc::new(BridgeInner {
                tx,
                pending,
                next_id: AtomicU64::new(1),
                call_timeout,
            }),
        }
    }

    /// Calls still waiting on the browser.
    pub fn pending_calls(&self) -> usize {
        match self.inner.pending.lock() {
            Ok(guard) => guard.as_ref().map_or(0, |map| map.len()),
            Err(_) => 0,
        }
    }
}

#[async_trait]
impl HostPlatform for NativeBridge {
    async fn query_tabs(&self) -> Result<Vec<HostTab>, HostError> {
        self.inner.call(HostCall::QueryTabs).await
    }

    async fn get_tab(&self, tab_id: TabId) -> Result<HostTab, HostError> {
        self.inner.call(HostCall::GetTab { tab_id }).await
    }

    async fn set_muted(&self, tab_id: TabId, muted: bool) -> Result<(), HostError> {
        self.inner
            .call::<Value>(HostCall::SetMuted { tab_id, muted })
            .await
            .map(|_| ())
    }

    async fn activate_tab(&self, tab_id: TabId) -> Result<(), HostError> {
        self.inner
            .call::<Value>(HostCall::ActivateTab { tab_id })
            .await
            .map(|_| ())
    }

    async fn inject_controller(&self, tab_id: TabId) -> Result<(), HostError> {
        self.inner
            .call::<Value>(HostCall::InjectController { tab_id })
            .await
            .map(|_| ())
    }

    async fn set_indicator(&self, indicator: &Indicator) -> Result<(), HostError> {
        self.inner
            .call::<Value>(HostCall::SetIndicator {
                icon: indicator.icon,
                title: indicator.title.clone(),
            })
            .await
            .map(|_| ())
    }

    fn page(&self, tab_id: TabId) -> Arc<dyn PageContext> {
        Arc::new(BridgePage {
            inner: self.inner.clone(),
            tab_id,
        })
    }
}

struct BridgePage {
    inner: Arc<BridgeInner>,
    tab_id: TabId,
}

impl BridgePage {
    async fn op<T: DeserializeOwned>(&self, op: PageOp) -> Result<T, HostError> {
        self.inner
            .call(HostCall::Page {
                tab_id: self.tab_id,
                op,
            })
            .await
    }

    async fn op_unit(&self, op: PageOp) -> Result<(), HostError> {
        self.op::<Value>(op).await.map(|_| ())
    }
}

#[async_trait]
impl PageContext for BridgePage {
    async fn query_elements(&self, selector: &str) -> Result<Vec<ElementInfo>, HostError> {
        self.op(PageOp::QueryElements {
            selector: selector.to_string(),
        })
        .await
    }

    async fn click(&self, element: ElementRef) -> Result<(), HostError> {
        self.op_unit(PageOp::Click { element }).await
    }

    async fn has_media_session(&self) -> Result<bool, HostError> {
        self.op(PageOp::HasMediaSession).await
    }

    async fn dispatch_media_session(&self, action: MediaSessionAction) -> Result<(), HostError> {
        self.op_unit(PageOp::DispatchMediaSession { action }).await
    }

    async fn find_players(&self, globals: &[&str], frameworks: &[&str]) -> Result<Vec<PlayerHandle>, HostError> {
        self.op(PageOp::FindPlayers {
            globals: globals.iter().map(|s| s.to_string()).collect(),
            frameworks: frameworks.iter().map(|s| s.to_string()).collect(),
        })
        .await
    }

    async fn invoke_player(&self, player: &PlayerHandle, method: &str) -> Result<(), HostError> {
        self.op_unit(PageOp::InvokePlayer {
            path: player.path.clone(),
            method: method.to_string(),
        })
        .await
    }

    async fn dispatch_key(&self, target: KeyTarget, key: MediaKey) -> Result<(), HostError> {
        self.op_unit(PageOp::DispatchKey { target, key }).await
    }

    async fn toggle_playback(&self) -> Result<Option<bool>, HostError> {
        self.op(PageOp::TogglePlayback).await
    }
}

// ── reader task ───────────────────────────────────────────────────────────────

async fn reader_task<R>(mut reader: R, pending: PendingMap, event_tx: mpsc::Sender<DaemonEvent>)
where
    R: AsyncRead + Unpin,
{
    loop {
        let frame = match read_frame(&mut reader).await {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                info!("bridge reader: browser closed the pipe");
                break;
            }
            Err(e) => {
                warn!("bridge reader: read error: {}", e);
                break;
            }
        };

        let incoming: Incoming = match serde_json::from_slice(&frame) {
            Ok(m) => m,
            Err(e) => {
                debug!("bridge reader: unparseable frame: {}", e);
                continue;
            }
        };

        match incoming {
            Incoming::Reply { id, ok, error } => {
                let tx = take_pending(&pending, id);
                match tx {
                    Some(tx) => {
                        let _ = tx.send(match error {
                            Some(err) => Err(err),
                            None => Ok(ok),
                        });
                    }
                    None => debug!("bridge reader: reply for unknown id={}", id),
                }
            }
            Incoming::TabUpdated { tab } => {
                let _ = event_tx.send(DaemonEvent::Host(HostEvent::TabUpdated(tab))).await;
            }
            Incoming::TabRemoved { tab_id } => {
                let _ = event_tx.send(DaemonEvent::Host(HostEvent::TabRemoved(tab_id))).await;
            }
        }
    }

    // Waiting calls fail with Disconnected; later calls are refused at
    // registration.
    close_pending(&pending);
    let _ = event_tx.send(DaemonEvent::Shutdown).await;
}

fn take_pending(pending: &PendingMap, id: u64) -> Option<ReplySender> {
    let mut guard = pending.lock().ok()?;
    guard.as_mut().and_then(|map| map.remove(&id))
}

/// Mark the browser as gone.  Dropping the senders wakes every waiting call.
fn close_pending(pending: &PendingMap) {
    if let Ok(mut guard) = pending.lock() {
        *guard = None;
    }
}

// ── writer task ───────────────────────────────────────────────────────────────

async fn writer_task<W>(mut writer: W, mut rx: mpsc::Receiver<Vec<u8>>, pending: PendingMap)
where
    W: AsyncWrite + Unpin,
{
    while let Some(frame) = rx.recv().await {
        let written = async {
            writer.write_all(&frame).await?;
            writer.flush().await
        }
        .await;
        if let Err(e) = written {
            warn!("bridge writer: write error: {}", e);
            close_pending(&pending);
            break;
        }
    }
    debug!("bridge writer: task exiting");
}
