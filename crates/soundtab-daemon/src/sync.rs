//! PopupHub: the set of connected popups and the push side of the protocol.
//!
//! A popup gets one `Hello` with the current snapshot when it registers and a
//! full `TabsChanged` snapshot after every cache mutation.  Nothing is queued
//! for popups that are not connected.
//!
//! Each popup has two lanes.  `Hello`, replies and log lines go through a
//! bounded queue.  Snapshots go through a single overwritable slot, so a slow
//! popup skips intermediate states but always ends on the newest one, and a
//! slow or dead popup never holds up the others.

use std::collections::BTreeMap;

use soundtab_proto::media::TabsSnapshot;
use soundtab_proto::protocol::{Broadcast, PROTOCOL_VERSION};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

pub type ListenerId = usize;

/// Queue depth per popup for hello, replies and log lines.
pub const LISTENER_QUEUE: usize = 64;

/// The daemon's side of one popup connection.
#[derive(Debug)]
pub struct PopupLink {
    messages: mpsc::Sender<Broadcast>,
    snapshots: watch::Sender<Option<TabsSnapshot>>,
}

impl PopupLink {
    /// Sender for command replies addressed to this popup.
    pub fn messages(&self) -> mpsc::Sender<Broadcast> {
        self.messages.clone()
    }
}

/// The connection's side: what to write to the popup next.
#[derive(Debug)]
pub struct PopupFeed {
    pub messages: mpsc::Receiver<Broadcast>,
    snapshots: watch::Receiver<Option<TabsSnapshot>>,
}

pub fn popup_channel() -> (PopupLink, PopupFeed) {
    let (msg_tx, msg_rx) = mpsc::channel(LISTENER_QUEUE);
    let (snap_tx, snap_rx) = watch::channel(None);
    (
        PopupLink {
            messages: msg_tx,
            snapshots: snap_tx,
        },
        PopupFeed {
            messages: msg_rx,
            snapshots: snap_rx,
        },
    )
}

impl PopupFeed {
    /// Newest snapshot published since the last call, if any.
    pub fn take_snapshot(&mut self) -> Option<TabsSnapshot> {
        if !self.snapshots.has_changed().unwrap_or(false) {
            return None;
        }
        self.snapshots.borrow_and_update().clone()
    }

    /// Next message to write.  Queued messages go first, so `Hello` always
    /// precedes the snapshots published after it.  `None` once the hub has
    /// dropped this popup.
    pub async fn recv(&mut self) -> Option<Broadcast> {
        loop {
            tokio::select! {
                biased;

                msg = self.messages.recv() => return msg,

                changed = self.snapshots.changed() => {
                    if changed.is_err() {
                        return None;
                    }
                    if let Some(snapshot) = self.snapshots.borrow_and_update().clone() {
                        return Some(Broadcast::TabsChanged { snapshot });
                    }
                }
            }
        }
    }
}

#[derive(Default)]
pub struct PopupHub {
    listeners: BTreeMap<ListenerId, PopupLink>,
}

impl PopupHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    pub fn is_connected(&self, id: ListenerId) -> bool {
        self.listeners.contains_key(&id)
    }

    /// Register a popup and hand it the current snapshot straight away.
    pub fn connect(&mut self, id: ListenerId, link: PopupLink, snapshot: TabsSnapshot) {
        let hello = Broadcast::Hello {
            protocol_version: PROTOCOL_VERSION,
            snapshot,
        };
        if let Err(e) = link.messages.try_send(hello) {
            warn!("popup {}: could not deliver hello: {}", id, e);
            return;
        }
        self.listeners.insert(id, link);
        info!("popup {} registered ({} connected)", id, self.listeners.len());
    }

    pub fn disconnect(&mut self, id: ListenerId) -> bool {
        let removed = self.listeners.remove(&id).is_some();
        if removed {
            info!("popup {} deregistered ({} connected)", id, self.listeners.len());
        }
        removed
    }

    /// Push `snapshot` to every registered popup.  Returns how many took it.
    pub fn publish(&mut self, snapshot: &TabsSnapshot) -> usize {
        if self.listeners.is_empty() {
            return 0;
        }
        debug!(
            "pushing rev {} ({} tabs) to {} popups",
            snapshot.rev,
            snapshot.tabs.len(),
            self.listeners.len()
        );

        let mut dead = Vec::new();
        for (id, link) in &self.listeners {
            if link.snapshots.send(Some(snapshot.clone())).is_err() {
                dead.push(*id);
            }
        }
        self.drop_dead(dead);
        self.listeners.len()
    }

    /// Queue a log line for every popup.  A popup with a full queue misses it.
    pub fn broadcast_log(&mut self, message: &str) -> usize {
        let mut delivered = 0;
        let mut dead = Vec::new();

        for (id, link) in &self.listeners {
            match link.messages.try_send(Broadcast::Log {
                message: message.to_string(),
            }) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    warn!("popup {} is not keeping up, dropping a log line", id);
                }
                Err(TrySendError::Closed(_)) => dead.push(*id),
            }
        }
        self.drop_dead(dead);
        delivered
    }

    fn drop_dead(&mut self, dead: Vec<ListenerId>) {
        for id in dead {
            self.listeners.remove(&id);
            info!("popup {} channel closed, deregistered", id);
        }
    }
}
