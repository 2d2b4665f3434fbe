/// DaemonCore: single-owner event loop for the audible-tab cache.
///
/// Browser notifications, popup connections, popup commands and the eviction
/// ticker all arrive as `DaemonEvent`s on one channel.  The core owns the
/// `AudibleTabCache` and the `PopupHub` exclusively; each event is applied and
/// its push delivered before the next event is read.
///
/// Commands that talk to a page run in their own task.  Their reply goes
/// straight back to the caller, and a refreshed `HostTab` re-enters the loop
/// as an ordinary host event so the cache never sees a write from outside.
use std::sync::Arc;

use chrono::{DateTime, Utc};
use soundtab_proto::config::Config;
use soundtab_proto::media::{TabMediaRecord, TabsSnapshot};
use soundtab_proto::protocol::{Command, Reply};
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, warn};

use crate::cache::AudibleTabCache;
use crate::commands::CommandRunner;
use crate::host::{with_timeout, HostEvent, HostPlatform};
use crate::indicator::Indicator;
use crate::scan;
use crate::skip::SkipResolver;
use crate::sync::{ListenerId, PopupHub, PopupLink};

// ── DaemonEvent ───────────────────────────────────────────────────────────────

/// All inputs into the DaemonCore loop.
#[derive(Debug)]
pub enum DaemonEvent {
    Host(HostEvent),
    PopupConnected {
        id: ListenerId,
        link: PopupLink,
    },
    PopupDisconnected {
        id: ListenerId,
    },
    /// A command from a popup or the HTTP API.
    Request {
        command: Command,
        reply: oneshot::Sender<Reply>,
    },
    EvictTick,
    /// A WARN/ERROR line for popups.
    Log(String),
    Shutdown,
}

pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

// ── DaemonCore ────────────────────────────────────────────────────────────────

pub struct DaemonCore {
    config: Config,
    cache: AudibleTabCache,
    hub: PopupHub,
    host: Arc<dyn HostPlatform>,
    runner: Arc<CommandRunner>,
    event_tx: mpsc::Sender<DaemonEvent>,
    indicator_tx: watch::Sender<Indicator>,
    clock: Clock,
}

impl DaemonCore {
    pub fn new(config: Config, host: Arc<dyn HostPlatform>, event_tx: mpsc::Sender<DaemonEvent>) -> Self {
        let runner = Arc::new(CommandRunner::new(
            host.clone(),
            Arc::new(SkipResolver::new()),
            config.host.command_timeout(),
        ));
        let (indicator_tx, indicator_rx) = watch::channel(Indicator::default());
        tokio::spawn(indicator_task(host.clone(), indicator_rx));

        Self {
            cache: AudibleTabCache::new(config.cache.retention()),
            hub: PopupHub::new(),
            config,
            host,
            runner,
            event_tx,
            indicator_tx,
            clock: Arc::new(Utc::now),
        }
    }

    /// Replace the wall clock used for activity timestamps and eviction.
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Seed the cache from the tabs that are already audible, then prepare
    /// their pages in the background.  A failed enumeration leaves the cache
    /// empty; live host events fill it in from there.
    pub async fn initialize(&mut self) {
        let tabs = match with_timeout(self.config.host.page_timeout(), self.host.query_tabs()).await {
            Ok(tabs) => tabs,
            Err(e) => {
                warn!("DaemonCore: initial tab enumeration failed: {}", e);
                return;
            }
        };

        let now = self.now();
        self.cache.seed(&tabs, now);
        info!(
            "DaemonCore: {} open tabs, {} audible",
            tabs.len(),
            self.cache.len()
        );
        let snapshot = self.snapshot();
        self.hub.publish(&snapshot);
        self.render_indicator(&snapshot.tabs, true);

        let host = self.host.clone();
        let batch_size = self.config.host.scan_batch_size;
        let timeout = self.config.host.page_timeout();
        tokio::spawn(async move {
            scan::prepare_pages(host.as_ref(), &tabs, batch_size, timeout).await;
        });
    }

    /// Run the core event loop.  Returns when a `Shutdown` event is received
    /// or every sender is gone.
    pub async fn run(mut self, mut event_rx: mpsc::Receiver<DaemonEvent>) -> anyhow::Result<()> {
        info!("DaemonCore: starting event loop");

        let tick_tx = self.event_tx.clone();
        let period = self.config.cache.eviction_interval();
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(period).await;
                if tick_tx.send(DaemonEvent::EvictTick).await.is_err() {
                    break;
                }
            }
        });

        while let Some(evt) = event_rx.recv().await {
            if !self.handle_event(evt) {
                info!("DaemonCore: shutdown requested");
                break;
            }
        }

        info!(
            "DaemonCore: stopped with {} tabs cached, {} popups connected",
            self.cache.len(),
            self.hub.len()
        );
        Ok(())
    }

    /// Apply one event.  Returns false when the loop should stop.
    fn handle_event(&mut self, evt: DaemonEvent) -> bool {
        match evt {
            DaemonEvent::Shutdown => return false,

            DaemonEvent::Host(HostEvent::TabUpdated(tab)) => {
                let now = self.now();
                let change = self.cache.upsert(&tab, now);
                if change.is_change() {
                    debug!("DaemonCore: tab {} {:?}", tab.id, change);
                    self.publish();
                }
            }

            DaemonEvent::Host(HostEvent::TabRemoved(id)) => {
                if self.cache.remove(id) {
                    debug!("DaemonCore: tab {} closed", id);
                    self.publish();
                }
            }

            DaemonEvent::EvictTick => {
                self.evict();
            }

            DaemonEvent::PopupConnected { id, link } => {
                self.evict();
                let snapshot = self.snapshot();
                self.hub.connect(id, link, snapshot);
            }

            DaemonEvent::PopupDisconnected { id } => {
                self.hub.disconnect(id);
            }

            DaemonEvent::Request { command, reply } => {
                self.handle_request(command, reply);
            }

            DaemonEvent::Log(message) => {
                self.hub.broadcast_log(&message);
            }
        }
        true
    }

    fn handle_request(&mut self, command: Command, reply: oneshot::Sender<Reply>) {
        debug!("DaemonCore: command {:?}", command);

        let tab_id = match command.tab_id() {
            Some(id) => id,
            None => {
                self.evict();
                let _ = reply.send(Reply::MediaTabs {
                    snapshot: self.snapshot(),
                });
                return;
            }
        };

        let cached_muted = self.cache.get(tab_id).map(|r| r.muted);
        let runner = self.runner.clone();
        let event_tx = self.event_tx.clone();

        tokio::spawn(async move {
            let result = match &command {
                Command::TogglePlayPause { .. } => runner.toggle_play_pause(tab_id).await,
                Command::ToggleMute { .. } => runner.toggle_mute(tab_id, cached_muted).await,
                Command::SkipTrack { direction, .. } => runner.skip_track(tab_id, *direction).await,
                Command::FocusTab { .. } => runner.focus_tab(tab_id).await,
                Command::GetMediaTabs => return,
            };

            let changed_tab = result.is_success() && !matches!(command, Command::FocusTab { .. });
            let _ = reply.send(result);

            if changed_tab {
                if let Some(tab) = runner.refresh(tab_id).await {
                    let _ = event_tx.send(DaemonEvent::Host(HostEvent::TabUpdated(tab))).await;
                }
            }
        });
    }

    fn evict(&mut self) {
        let now = self.now();
        let evicted = self.cache.evict_stale(now);
        if !evicted.is_empty() {
            info!("DaemonCore: evicted {} idle tabs", evicted.len());
            self.publish();
        }
    }

    fn snapshot(&mut self) -> TabsSnapshot {
        let now = self.now();
        self.cache.tabs_snapshot(now)
    }

    /// Push the cache to popups and re-render the indicator if it changed.
    fn publish(&mut self) {
        let snapshot = self.snapshot();
        self.hub.publish(&snapshot);
        self.render_indicator(&snapshot.tabs, false);
    }

    fn render_indicator(&self, records: &[TabMediaRecord], force: bool) {
        let indicator = Indicator::from_records(records);
        self.indicator_tx.send_if_modified(|current| {
            if !force && *current == indicator {
                false
            } else {
                *current = indicator;
                true
            }
        });
    }

    fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }
}

/// Applies indicator changes one at a time, always rendering the latest.
async fn indicator_task(host: Arc<dyn HostPlatform>, mut rx: watch::Receiver<Indicator>) {
    while rx.changed().await.is_ok() {
        let indicator = rx.borrow_and_update().clone();
        if let Err(e) = host.set_indicator(&indicator).await {
            warn!("indicator update failed: {}", e);
        }
    }
}
