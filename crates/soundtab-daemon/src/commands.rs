//! Popup commands executed against the browser.
//!
//! Every method resolves to a `Reply`; host failures and timeouts become
//! `success: false` with the error text instead of propagating.

use std::sync::Arc;
use std::time::Duration;

use soundtab_proto::media::{Direction, HostTab, SkipResult, TabId};
use soundtab_proto::protocol::Reply;
use tracing::{debug, info, warn};

use crate::host::{with_timeout, HostError, HostPlatform};
use crate::skip::SkipResolver;

pub struct CommandRunner {
    host: Arc<dyn HostPlatform>,
    resolver: Arc<SkipResolver>,
    command_timeout: Duration,
}

impl CommandRunner {
    pub fn new(host: Arc<dyn HostPlatform>, resolver: Arc<SkipResolver>, command_timeout: Duration) -> Self {
        Self {
            host,
            resolver,
            command_timeout,
        }
    }

    /// Flip the mute flag.  `cached_muted` is the cache's view of the tab;
    /// the host is asked when the tab is not cached.
    pub async fn toggle_mute(&self, tab_id: TabId, cached_muted: Option<bool>) -> Reply {
        let result = with_timeout(self.command_timeout, async {
            let muted = match cached_muted {
                Some(m) => m,
                None => self.host.get_tab(tab_id).await?.muted,
            };
            self.host.set_muted(tab_id, !muted).await?;
            Ok(!muted)
        })
        .await;

        match result {
            Ok(is_muted) => {
                info!("tab {}: muted={}", tab_id, is_muted);
                Reply::Mute {
                    success: true,
                    is_muted: Some(is_muted),
                    error: None,
                }
            }
            Err(e) => {
                warn!("tab {}: toggle mute failed: {}", tab_id, e);
                Reply::Mute {
                    success: false,
                    is_muted: None,
                    error: Some(e.to_string()),
                }
            }
        }
    }

    pub async fn toggle_play_pause(&self, tab_id: TabId) -> Reply {
        let page = self.host.page(tab_id);
        let result = with_timeout(self.command_timeout, async {
            page.toggle_playback()
                .await?
                .ok_or_else(|| HostError::Call("No media element found".to_string()))
        })
        .await;

        match result {
            Ok(is_playing) => {
                info!("tab {}: playing={}", tab_id, is_playing);
                Reply::PlayPause {
                    success: true,
                    is_playing: Some(is_playing),
                    error: None,
                }
            }
            Err(e) => {
                warn!("tab {}: toggle playback failed: {}", tab_id, e);
                Reply::PlayPause {
                    success: false,
                    is_playing: None,
                    error: Some(e.to_string()),
                }
            }
        }
    }

    pub async fn skip_track(&self, tab_id: TabId, direction: Direction) -> Reply {
        let page = self.host.page(tab_id);
        let result = match tokio::time::timeout(
            self.command_timeout,
            self.resolver.resolve(page.as_ref(), direction),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => {
                warn!("tab {}: skip {} timed out", tab_id, direction.as_str());
                SkipResult::failed(HostError::Timeout(self.command_timeout).to_string())
            }
        };
        Reply::Skip(result)
    }

    pub async fn focus_tab(&self, tab_id: TabId) -> Reply {
        match with_timeout(self.command_timeout, self.host.activate_tab(tab_id)).await {
            Ok(()) => Reply::Focus {
                success: true,
                error: None,
            },
            Err(e) => {
                warn!("tab {}: focus failed: {}", tab_id, e);
                Reply::Focus {
                    success: false,
                    error: Some(e.to_string()),
                }
            }
        }
    }

    /// Current host view of the tab, for feeding back into the cache after a
    /// command changed it.
    pub async fn refresh(&self, tab_id: TabId) -> Option<HostTab> {
        match with_timeout(self.command_timeout, self.host.get_tab(tab_id)).await {
            Ok(tab) => Some(tab),
            Err(e) => {
                debug!("tab {}: refresh after command failed: {}", tab_id, e);
                None
            }
        }
    }
}
