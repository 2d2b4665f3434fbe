//! Popup-side view of the daemon: the latest snapshot, the selection, and
//! per-button feedback for commands in flight.
//!
//! A button moves `Ready -> Pending -> Succeeded | Failed -> Ready`.  The last
//! step happens after `FEEDBACK_DELAY`; a `Pending` button with no reply after
//! `PENDING_TIMEOUT` is failed by `tick`, so no button stays stuck.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use soundtab_proto::media::{Direction, TabId, TabMediaRecord, TabsSnapshot};
use soundtab_proto::protocol::{Command, Reply, Request};

pub const FEEDBACK_DELAY: Duration = Duration::from_secs(2);
/// A little longer than the daemon's own command bound.
pub const PENDING_TIMEOUT: Duration = Duration::from_secs(20);
const LOG_LINES: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Control {
    Previous,
    PlayPause,
    Next,
    Mute,
    Focus,
}

impl Control {
    pub const ALL: [Control; 5] = [
        Control::Previous,
        Control::PlayPause,
        Control::Next,
        Control::Mute,
        Control::Focus,
    ];

    fn command(&self, tab_id: TabId) -> Command {
        match self {
            Control::Previous => Command::SkipTrack {
                tab_id,
                direction: Direction::Previous,
            },
            Control::Next => Command::SkipTrack {
                tab_id,
                direction: Direction::Next,
            },
            Control::PlayPause => Command::TogglePlayPause { tab_id },
            Control::Mute => Command::ToggleMute { tab_id },
            Control::Focus => Command::FocusTab { tab_id },
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ButtonState {
    Ready,
    Pending { since: Instant },
    Succeeded { at: Instant },
    Failed { at: Instant, error: String },
}

#[derive(Default)]
pub struct PopupState {
    pub connected: bool,
    pub snapshot: TabsSnapshot,
    pub selected: usize,
    buttons: HashMap<(TabId, Control), ButtonState>,
    in_flight: HashMap<u64, (TabId, Control)>,
    next_request_id: u64,
    pub log: VecDeque<String>,
}

impl PopupState {
    pub fn new() -> Self {
        Self::default()
    }

    // ── snapshots ─────────────────────────────────────────────────────────────

    /// Hello from a (re)connected daemon.  Always replaces what we hold; a
    /// restarted daemon counts revisions from zero again.
    pub fn apply_hello(&mut self, snapshot: TabsSnapshot) {
        self.connected = true;
        self.snapshot = snapshot;
        self.clamp_selection();
    }

    /// Pushed snapshot.  Returns false if it was older than the one held.
    pub fn apply_snapshot(&mut self, snapshot: TabsSnapshot) -> bool {
        if snapshot.rev < self.snapshot.rev {
            return false;
        }
        let selected_id = self.selected_tab().map(|t| t.id);
        self.snapshot = snapshot;
        // Keep the same tab selected when it survived the update.
        if let Some(pos) = selected_id.and_then(|id| self.snapshot.tabs.iter().position(|t| t.id == id)) {
            self.selected = pos;
        }
        self.clamp_selection();
        true
    }

    pub fn tabs(&self) -> &[TabMediaRecord] {
        &self.snapshot.tabs
    }

    pub fn selected_tab(&self) -> Option<&TabMediaRecord> {
        self.snapshot.tabs.get(self.selected)
    }

    pub fn select_next(&mut self) {
        if self.selected + 1 < self.snapshot.tabs.len() {
            self.selected += 1;
        }
    }

    pub fn select_prev(&mut self) {
        self.selected = self.selected.saturating_sub(1);
    }

    fn clamp_selection(&mut self) {
        self.selected = self.selected.min(self.snapshot.tabs.len().saturating_sub(1));
    }

    // ── commands ──────────────────────────────────────────────────────────────

    /// Start `control` on the selected tab.  `None` when there is no tab or
    /// the same button is already waiting on a reply.
    pub fn begin(&mut self, control: Control, now: Instant) -> Option<Request> {
        let tab_id = self.selected_tab()?.id;
        if matches!(self.button(tab_id, control), ButtonState::Pending { .. }) {
            return None;
        }

        self.next_request_id += 1;
        let id = self.next_request_id;
        self.in_flight.insert(id, (tab_id, control));
        self.buttons
            .insert((tab_id, control), ButtonState::Pending { since: now });

        Some(Request {
            id,
            command: control.command(tab_id),
        })
    }

    /// Apply the daemon's answer to request `id`.
    pub fn complete(&mut self, id: u64, reply: &Reply, now: Instant) {
        let Some((tab_id, control)) = self.in_flight.remove(&id) else {
            return;
        };

        let state = if reply.is_success() {
            ButtonState::Succeeded { at: now }
        } else {
            let error = reply.error().unwrap_or("Command failed").to_string();
            self.push_log(format!("tab {}: {}", tab_id, error));
            ButtonState::Failed { at: now, error }
        };
        self.buttons.insert((tab_id, control), state);

        if let Reply::Mute {
            is_muted: Some(muted),
            ..
        } = reply
        {
            if let Some(tab) = self.snapshot.tabs.iter_mut().find(|t| t.id == tab_id) {
                tab.muted = *muted;
            }
        }
    }

    /// Expire feedback and fail requests that never got an answer.
    pub fn tick(&mut self, now: Instant) {
        let mut timed_out = Vec::new();
        for (key, state) in self.buttons.iter_mut() {
            match state {
                ButtonState::Succeeded { at } | ButtonState::Failed { at, .. } => {
                    if now.duration_since(*at) >= FEEDBACK_DELAY {
                        *state = ButtonState::Ready;
                    }
                }
                ButtonState::Pending { since } => {
                    if now.duration_since(*since) >= PENDING_TIMEOUT {
                        *state = ButtonState::Failed {
                            at: now,
                            error: "No response from daemon".to_string(),
                        };
                        timed_out.push(*key);
                    }
                }
                ButtonState::Ready => {}
            }
        }
        self.buttons.retain(|_, s| *s != ButtonState::Ready);
        self.in_flight.retain(|_, key| !timed_out.contains(key));
    }

    /// Connection lost: every pending button fails now.
    pub fn disconnected(&mut self, now: Instant) {
        self.connected = false;
        for state in self.buttons.values_mut() {
            if matches!(state, ButtonState::Pending { .. }) {
                *state = ButtonState::Failed {
                    at: now,
                    error: "Disconnected from daemon".to_string(),
                };
            }
        }
        self.in_flight.clear();
    }

    pub fn button(&self, tab_id: TabId, control: Control) -> ButtonState {
        self.buttons
            .get(&(tab_id, control))
            .cloned()
            .unwrap_or(ButtonState::Ready)
    }

    pub fn push_log(&mut self, line: String) {
        if self.log.len() == LOG_LINES {
            self.log.pop_front();
        }
        self.log.push_back(line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use soundtab_proto::media::{SkipResult, StrategyId};

    fn record(id: u64, title: &str) -> TabMediaRecord {
        TabMediaRecord {
            id: TabId(id),
            title: title.to_string(),
            url: String::new(),
            audible: true,
            muted: false,
            last_active_at: Default::default(),
        }
    }

    fn state_with(ids: &[u64]) -> PopupState {
        let mut state = PopupState::new();
        state.apply_hello(TabsSnapshot {
            rev: 1,
            tabs: ids.iter().map(|id| record(*id, "t")).collect(),
        });
        state
    }

    #[test]
    fn test_older_snapshot_is_ignored() {
        let mut state = state_with(&[1]);
        assert!(state.apply_snapshot(TabsSnapshot {
            rev: 5,
            tabs: vec![record(1, "new")],
        }));
        assert!(!state.apply_snapshot(TabsSnapshot {
            rev: 4,
            tabs: vec![],
        }));
        assert_eq!(state.tabs()[0].title, "new");
    }

    #[test]
    fn test_hello_resets_revision() {
        let mut state = state_with(&[1]);
        state.apply_snapshot(TabsSnapshot { rev: 9, tabs: vec![] });
        state.apply_hello(TabsSnapshot {
            rev: 0,
            tabs: vec![record(2, "after restart")],
        });
        assert_eq!(state.tabs()[0].id, TabId(2));
    }

    #[test]
    fn test_selection_follows_tab_and_clamps() {
        let mut state = state_with(&[1, 2, 3]);
        state.select_next();
        state.select_next();
        state.select_next();
        assert_eq!(state.selected_tab().unwrap().id, TabId(3));

        // Tab 3 moves to the front.
        state.apply_snapshot(TabsSnapshot {
            rev: 2,
            tabs: vec![record(3, "t"), record(1, "t")],
        });
        assert_eq!(state.selected, 0);

        // Tab 3 goes away; selection stays in range.
        state.select_next();
        state.apply_snapshot(TabsSnapshot {
            rev: 3,
            tabs: vec![record(3, "t")],
        });
        assert_eq!(state.selected, 0);

        state.apply_snapshot(TabsSnapshot { rev: 4, tabs: vec![] });
        assert!(state.selected_tab().is_none());
    }

    #[test]
    fn test_begin_builds_command_for_selected_tab() {
        let mut state = state_with(&[7]);
        let now = Instant::now();

        let request = state.begin(Control::Next, now).unwrap();
        assert_eq!(
            request.command,
            Command::SkipTrack {
                tab_id: TabId(7),
                direction: Direction::Next
            }
        );
        assert_eq!(
            state.button(TabId(7), Control::Next),
            ButtonState::Pending { since: now }
        );
        // Pending buttons ignore repeats.
        assert!(state.begin(Control::Next, now).is_none());
        // Other buttons are independent.
        assert!(state.begin(Control::Mute, now).is_some());
    }

    #[test]
    fn test_begin_without_tabs() {
        let mut state = PopupState::new();
        assert!(state.begin(Control::PlayPause, Instant::now()).is_none());
    }

    #[test]
    fn test_failure_shows_then_reverts() {
        let mut state = state_with(&[7]);
        let start = Instant::now();
        let request = state.begin(Control::Next, start).unwrap();

        let reply = Reply::Skip(SkipResult::exhausted(StrategyId::ALL.to_vec()));
        state.complete(request.id, &reply, start);
        assert!(matches!(
            state.button(TabId(7), Control::Next),
            ButtonState::Failed { .. }
        ));
        assert!(state.log.back().unwrap().contains("No supported track skipping method"));

        state.tick(start + Duration::from_millis(1999));
        assert!(matches!(
            state.button(TabId(7), Control::Next),
            ButtonState::Failed { .. }
        ));
        state.tick(start + FEEDBACK_DELAY);
        assert_eq!(state.button(TabId(7), Control::Next), ButtonState::Ready);
    }

    #[test]
    fn test_success_updates_mute_flag() {
        let mut state = state_with(&[7]);
        let now = Instant::now();
        let request = state.begin(Control::Mute, now).unwrap();
        state.complete(
            request.id,
            &Reply::Mute {
                success: true,
                is_muted: Some(true),
                error: None,
            },
            now,
        );
        assert!(state.tabs()[0].muted);
        assert!(matches!(
            state.button(TabId(7), Control::Mute),
            ButtonState::Succeeded { .. }
        ));
    }

    #[test]
    fn test_unanswered_request_fails_after_timeout() {
        let mut state = state_with(&[7]);
        let start = Instant::now();
        let request = state.begin(Control::PlayPause, start).unwrap();

        state.tick(start + PENDING_TIMEOUT);
        match state.button(TabId(7), Control::PlayPause) {
            ButtonState::Failed { error, .. } => assert_eq!(error, "No response from daemon"),
            other => panic!("unexpected {:?}", other),
        }

        // A late reply is dropped.
        state.complete(
            request.id,
            &Reply::PlayPause {
                success: true,
                is_playing: Some(true),
                error: None,
            },
            start + PENDING_TIMEOUT,
        );
        assert!(matches!(
            state.button(TabId(7), Control::PlayPause),
            ButtonState::Failed { .. }
        ));
    }

    #[test]
    fn test_disconnect_fails_pending_buttons() {
        let mut state = state_with(&[7]);
        let now = Instant::now();
        state.begin(Control::Focus, now).unwrap();
        state.disconnected(now);
        assert!(!state.connected);
        assert!(matches!(
            state.button(TabId(7), Control::Focus),
            ButtonState::Failed { .. }
        ));
    }
}
