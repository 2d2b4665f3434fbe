#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use soundtab_daemon::host::{
    ElementInfo, ElementRef, HostError, HostPlatform, KeyTarget, MediaKey, MediaSessionAction,
    PageContext, PlayerHandle,
};
use soundtab_daemon::indicator::Indicator;
use soundtab_proto::media::{HostTab, TabId};

pub fn tab(id: u64, title: &str, audible: bool) -> HostTab {
    HostTab {
        id: TabId(id),
        title: title.to_string(),
        url: format!("https://music.example.com/{}", id),
        audible,
        muted: false,
    }
}

pub fn visible(id: u64) -> ElementInfo {
    ElementInfo {
        element: ElementRef(id),
        width: 32.0,
        height: 32.0,
        display: "inline-block".into(),
        visibility: "visible".into(),
        opacity: 1.0,
    }
}

pub fn hidden(id: u64) -> ElementInfo {
    ElementInfo {
        display: "none".into(),
        ..visible(id)
    }
}

/// Let spawned tasks on the current-thread runtime catch up.
pub async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}

// ── FakePage ──────────────────────────────────────────────────────────────────

/// Scriptable stand-in for one tab's page.  Every call is appended to `calls`
/// as `"<op>"` or `"<op>:<arg>"`.
#[derive(Default)]
pub struct FakePage {
    pub elements: Mutex<HashMap<String, Vec<ElementInfo>>>,
    pub bad_selectors: Mutex<HashSet<String>>,
    pub query_error: Mutex<Option<HostError>>,
    pub click_error: Mutex<Option<HostError>>,
    pub media_session: Mutex<bool>,
    pub players: Mutex<Vec<PlayerHandle>>,
    pub key_error: Mutex<Option<HostError>>,
    pub target_key_errors: Mutex<HashMap<KeyTarget, HostError>>,
    /// `None` means no media element on the page.
    pub playing: Mutex<Option<bool>>,
    pub delay: Mutex<Option<Duration>>,
    pub calls: Mutex<Vec<String>>,
}

impl FakePage {
    pub fn with_element(self, selector: &str, info: ElementInfo) -> Self {
        self.elements
            .lock()
            .unwrap()
            .entry(selector.to_string())
            .or_default()
            .push(info);
        self
    }

    pub fn with_media_session(self) -> Self {
        *self.media_session.lock().unwrap() = true;
        self
    }

    pub fn with_player(self, path: &str, methods: &[&str]) -> Self {
        self.players.lock().unwrap().push(PlayerHandle {
            path: path.to_string(),
            methods: methods.iter().map(|m| m.to_string()).collect(),
        });
        self
    }

    pub fn with_key_error(self, err: HostError) -> Self {
        *self.key_error.lock().unwrap() = Some(err);
        self
    }

    /// Fail key dispatch on `target` only.
    pub fn with_key_error_on(self, target: KeyTarget, err: HostError) -> Self {
        self.target_key_errors.lock().unwrap().insert(target, err);
        self
    }

    /// Fail every element query with `err`.
    pub fn with_query_error(self, err: HostError) -> Self {
        *self.query_error.lock().unwrap() = Some(err);
        self
    }

    pub fn with_click_error(self, err: HostError) -> Self {
        *self.click_error.lock().unwrap() = Some(err);
        self
    }

    pub fn with_bad_selector(self, selector: &str) -> Self {
        self.bad_selectors.lock().unwrap().insert(selector.to_string());
        self
    }

    pub fn with_playing(self, playing: bool) -> Self {
        *self.playing.lock().unwrap() = Some(playing);
        self
    }

    pub fn with_delay(self, delay: Duration) -> Self {
        *self.delay.lock().unwrap() = Some(delay);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Number of recorded calls whose op is `op`.
    pub fn count(&self, op: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.split(':').next() == Some(op))
            .count()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    async fn pause(&self) {
        let delay = *self.delay.lock().unwrap();
        if let Some(d) = delay {
            tokio::time::sleep(d).await;
        }
    }
}

#[async_trait]
impl PageContext for FakePage {
    async fn query_elements(&self, selector: &str) -> Result<Vec<ElementInfo>, HostError> {
        self.pause().await;
        self.record(format!("query:{}", selector));
        if let Some(e) = self.query_error.lock().unwrap().clone() {
            return Err(e);
        }
        if self.bad_selectors.lock().unwrap().contains(selector) {
            return Err(HostError::Script(format!("'{}' is not a valid selector", selector)));
        }
        Ok(self
            .elements
            .lock()
            .unwrap()
            .get(selector)
            .cloned()
            .unwrap_or_default())
    }

    async fn click(&self, element: ElementRef) -> Result<(), HostError> {
        self.record(format!("click:{}", element.0));
        match self.click_error.lock().unwrap().clone() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn has_media_session(&self) -> Result<bool, HostError> {
        self.record("media_session?".to_string());
        Ok(*self.media_session.lock().unwrap())
    }

    async fn dispatch_media_session(&self, action: MediaSessionAction) -> Result<(), HostError> {
        self.record(format!("media_session:{:?}", action));
        Ok(())
    }

    async fn find_players(
        &self,
        _globals: &[&str],
        _frameworks: &[&str],
    ) -> Result<Vec<PlayerHandle>, HostError> {
        self.record("find_players".to_string());
        Ok(self.players.lock().unwrap().clone())
    }

    async fn invoke_player(&self, player: &PlayerHandle, method: &str) -> Result<(), HostError> {
        self.record(format!("invoke:{}.{}", player.path, method));
        Ok(())
    }

    async fn dispatch_key(&self, target: KeyTarget, key: MediaKey) -> Result<(), HostError> {
        self.record(format!("key:{:?}/{:?}", target, key));
        if let Some(e) = self.target_key_errors.lock().unwrap().get(&target) {
            return Err(e.clone());
        }
        match self.key_error.lock().unwrap().clone() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn toggle_playback(&self) -> Result<Option<bool>, HostError> {
        self.pause().await;
        self.record("toggle_playback".to_string());
        let mut playing = self.playing.lock().unwrap();
        *playing = playing.map(|p| !p);
        Ok(*playing)
    }
}

// ── FakeHost ──────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct FakeHost {
    pub tabs: Mutex<BTreeMap<TabId, HostTab>>,
    pub pages: Mutex<HashMap<TabId, Arc<FakePage>>>,
    pub indicators: Mutex<Vec<Indicator>>,
    pub injected: Mutex<Vec<TabId>>,
    pub inject_failures: Mutex<HashSet<TabId>>,
    pub inject_hangs: Mutex<HashSet<TabId>>,
    pub activated: Mutex<Vec<TabId>>,
    pub query_fails: Mutex<bool>,
}

impl FakeHost {
    pub fn with_tabs(tabs: Vec<HostTab>) -> Self {
        let host = Self::default();
        for t in tabs {
            host.put_tab(t);
        }
        host
    }

    pub fn put_tab(&self, tab: HostTab) {
        self.tabs.lock().unwrap().insert(tab.id, tab);
    }

    pub fn tab(&self, id: u64) -> Option<HostTab> {
        self.tabs.lock().unwrap().get(&TabId(id)).cloned()
    }

    pub fn set_page(&self, id: u64, page: FakePage) -> Arc<FakePage> {
        let page = Arc::new(page);
        self.pages.lock().unwrap().insert(TabId(id), page.clone());
        page
    }

    pub fn last_indicator(&self) -> Option<Indicator> {
        self.indicators.lock().unwrap().last().cloned()
    }

    pub fn injected(&self) -> Vec<TabId> {
        let mut ids = self.injected.lock().unwrap().clone();
        ids.sort();
        ids
    }
}

#[async_trait]
impl HostPlatform for FakeHost {
    async fn query_tabs(&self) -> Result<Vec<HostTab>, HostError> {
        if *self.query_fails.lock().unwrap() {
            return Err(HostError::Disconnected);
        }
        Ok(self.tabs.lock().unwrap().values().cloned().collect())
    }

    async fn get_tab(&self, tab_id: TabId) -> Result<HostTab, HostError> {
        self.tabs
            .lock()
            .unwrap()
            .get(&tab_id)
            .cloned()
            .ok_or(HostError::TabGone(tab_id))
    }

    async fn set_muted(&self, tab_id: TabId, muted: bool) -> Result<(), HostError> {
        let mut tabs = self.tabs.lock().unwrap();
        let tab = tabs.get_mut(&tab_id).ok_or(HostError::TabGone(tab_id))?;
        tab.muted = muted;
        Ok(())
    }

    async fn activate_tab(&self, tab_id: TabId) -> Result<(), HostError> {
        if !self.tabs.lock().unwrap().contains_key(&tab_id) {
            return Err(HostError::TabGone(tab_id));
        }
        self.activated.lock().unwrap().push(tab_id);
        Ok(())
    }

    async fn inject_controller(&self, tab_id: TabId) -> Result<(), HostError> {
        let hangs = self.inject_hangs.lock().unwrap().contains(&tab_id);
        if hangs {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        if self.inject_failures.lock().unwrap().contains(&tab_id) {
            return Err(HostError::NotScriptable("restricted page".into()));
        }
        self.injected.lock().unwrap().push(tab_id);
        Ok(())
    }

    async fn set_indicator(&self, indicator: &Indicator) -> Result<(), HostError> {
        self.indicators.lock().unwrap().push(indicator.clone());
        Ok(())
    }

    fn page(&self, tab_id: TabId) -> Arc<dyn PageContext> {
        let page = self
            .pages
            .lock()
            .unwrap()
            .entry(tab_id)
            .or_insert_with(|| Arc::new(FakePage::default()))
            .clone();
        page
    }
}
