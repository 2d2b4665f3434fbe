//! The browser as seen from the daemon.
//!
//! `HostPlatform` covers tab enumeration and tab-level calls; `PageContext`
//! covers calls that execute inside one tab's page.  The daemon never talks to
//! the browser except through these two traits, so tests drive the whole
//! system with in-memory fakes and the real process plugs in the
//! native-messaging bridge.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use soundtab_proto::media::{HostTab, TabId};
use thiserror::Error;

use crate::indicator::Indicator;

/// Unsolicited tab notifications from the browser.
#[derive(Debug, Clone, PartialEq)]
pub enum HostEvent {
    /// A tab was created or one of its properties changed.
    TabUpdated(HostTab),
    TabRemoved(TabId),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum HostError {
    #[error("tab {0} no longer exists")]
    TabGone(TabId),
    #[error("page is not scriptable: {0}")]
    NotScriptable(String),
    #[error("host call timed out after {0:?}")]
    Timeout(Duration),
    #[error("host connection closed")]
    Disconnected,
    /// The page threw while running our code.
    #[error("page script error: {0}")]
    Script(String),
    #[error("{0}")]
    Call(String),
}

/// Page-side handle for an element returned by `query_elements`.  Only valid
/// until the page navigates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ElementRef(pub u64);

/// Layout facts about one matched element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementInfo {
    pub element: ElementRef,
    pub width: f64,
    pub height: f64,
    #[serde(default)]
    pub display: String,
    #[serde(default)]
    pub visibility: String,
    #[serde(default = "default_opacity")]
    pub opacity: f64,
}

fn default_opacity() -> f64 {
    1.0
}

impl ElementInfo {
    /// Rendered with a non-zero box and not hidden by computed style.
    pub fn is_visible(&self) -> bool {
        self.width > 0.0
            && self.height > 0.0
            && self.display != "none"
            && self.visibility != "hidden"
            && self.opacity > 0.0
    }
}

/// A player object found on the page, with the callable method names it exposes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerHandle {
    /// Page-side path, e.g. `jwplayer()` or `videojs.players.vjs_1`.
    pub path: String,
    #[serde(default)]
    pub methods: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaSessionAction {
    NextTrack,
    PreviousTrack,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MediaKey {
    MediaTrackNext,
    MediaTrackPrevious,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyTarget {
    Document,
    Window,
    ActiveElement,
}

impl KeyTarget {
    pub const ALL: [KeyTarget; 3] = [KeyTarget::Document, KeyTarget::Window, KeyTarget::ActiveElement];
}

#[async_trait]
pub trait HostPlatform: Send + Sync {
    async fn query_tabs(&self) -> Result<Vec<HostTab>, HostError>;
    async fn get_tab(&self, tab_id: TabId) -> Result<HostTab, HostError>;
    async fn set_muted(&self, tab_id: TabId, muted: bool) -> Result<(), HostError>;
    /// Focus the tab and raise its window.
    async fn activate_tab(&self, tab_id: TabId) -> Result<(), HostError>;
    /// Install the page-side controller `PageContext` calls rely on.
    async fn inject_controller(&self, tab_id: TabId) -> Result<(), HostError>;
    async fn set_indicator(&self, indicator: &Indicator) -> Result<(), HostError>;
    fn page(&self, tab_id: TabId) -> Arc<dyn PageContext>;
}

#[async_trait]
pub trait PageContext: Send + Sync {
    async fn query_elements(&self, selector: &str) -> Result<Vec<ElementInfo>, HostError>;
    async fn click(&self, element: ElementRef) -> Result<(), HostError>;
    async fn has_media_session(&self) -> Result<bool, HostError>;
    async fn dispatch_media_session(&self, action: MediaSessionAction) -> Result<(), HostError>;
    async fn find_players(
        &self,
        globals: &[&str],
        frameworks: &[&str],
    ) -> Result<Vec<PlayerHandle>, HostError>;
    async fn invoke_player(&self, player: &PlayerHandle, method: &str) -> Result<(), HostError>;
    async fn dispatch_key(&self, target: KeyTarget, key: MediaKey) -> Result<(), HostError>;
    /// Toggle the page's primary media element.  `Ok(None)` when the page has
    /// no media element; otherwise whether it is playing afterwards.
    async fn toggle_playback(&self) -> Result<Option<bool>, HostError>;
}

/// Bound a host future by `limit`, folding expiry into `HostError::Timeout`.
pub async fn with_timeout<T, F>(limit: Duration, fut: F) -> Result<T, HostError>
where
    F: std::future::Future<Output = Result<T, HostError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(HostError::Timeout(limit)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn element(width: f64, height: f64) -> ElementInfo {
        ElementInfo {
            element: ElementRef(1),
            width,
            height,
            display: "block".into(),
            visibility: "visible".into(),
            opacity: 1.0,
        }
    }

    #[test]
    fn test_visibility_rules() {
        assert!(element(24.0, 24.0).is_visible());
        assert!(!element(0.0, 24.0).is_visible());
        assert!(!element(24.0, 0.0).is_visible());

        let mut hidden = element(24.0, 24.0);
        hidden.display = "none".into();
        assert!(!hidden.is_visible());

        let mut hidden = element(24.0, 24.0);
        hidden.visibility = "hidden".into();
        assert!(!hidden.is_visible());

        let mut hidden = element(24.0, 24.0);
        hidden.opacity = 0.0;
        assert!(!hidden.is_visible());
    }

    #[test]
    fn test_missing_style_fields_default_visible() {
        let info: ElementInfo =
            serde_json::from_str(r#"{"element": 9, "width": 10, "height": 10}"#).unwrap();
        assert!(info.is_visible());
    }

    #[tokio::test(start_paused = true)]
    async fn test_with_timeout_expires() {
        let limit = Duration::from_secs(5);
        let result: Result<(), HostError> = with_timeout(limit, async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        })
        .await;
        assert_eq!(result, Err(HostError::Timeout(limit)));
    }

    #[test]
    fn test_wire_names() {
        assert_eq!(
            serde_json::to_value(MediaSessionAction::PreviousTrack).unwrap(),
            "previoustrack"
        );
        assert_eq!(serde_json::to_value(MediaKey::MediaTrackNext).unwrap(), "MediaTrackNext");
        assert_eq!(serde_json::to_value(KeyTarget::ActiveElement).unwrap(), "active_element");
    }
}
