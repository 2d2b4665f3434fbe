//! AudibleTabCache: which tabs are (or recently were) making sound.
//!
//! Owned by `DaemonCore`; nothing else mutates it.  Records are keyed by tab
//! id and carry an insertion sequence number so snapshots come out in the
//! order tabs were first seen, independent of hash order.
//!
//! Per-record lifecycle:
//!   absent -> active (audible) <-> retained (silent, inside window) -> absent
//!   any state -> absent on tab close

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use soundtab_proto::media::{HostTab, TabId, TabMediaRecord, TabsSnapshot};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Added,
    Updated,
    Removed,
    None,
}

impl ChangeKind {
    pub fn is_change(&self) -> bool {
        !matches!(self, ChangeKind::None)
    }
}

#[derive(Debug)]
struct Entry {
    seq: u64,
    record: TabMediaRecord,
}

pub struct AudibleTabCache {
    entries: HashMap<TabId, Entry>,
    retention: Duration,
    next_seq: u64,
    /// Bumped on every mutation; carried in snapshots.
    rev: u64,
}

impl AudibleTabCache {
    pub fn new(retention: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            retention,
            next_seq: 0,
            rev: 0,
        }
    }

    pub fn rev(&self) -> u64 {
        self.rev
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, tab_id: TabId) -> Option<&TabMediaRecord> {
        self.entries.get(&tab_id).map(|e| &e.record)
    }

    /// Initial population from a full enumeration.  Only audible tabs get a
    /// record.  Returns how many were inserted.
    pub fn seed(&mut self, tabs: &[HostTab], now: DateTime<Utc>) -> usize {
        let mut inserted = 0;
        for tab in tabs.iter().filter(|t| t.audible) {
            if self.upsert(tab, now) == ChangeKind::Added {
                inserted += 1;
            }
        }
        inserted
    }

    /// Apply one host-reported tab snapshot.
    pub fn upsert(&mut self, tab: &HostTab, now: DateTime<Utc>) -> ChangeKind {
        if tab.audible {
            if let Some(entry) = self.entries.get_mut(&tab.id) {
                let record = &mut entry.record;
                record.title = tab.title.clone();
                record.url = tab.url.clone();
                record.muted = tab.muted;
                record.audible = true;
                if now > record.last_active_at {
                    record.last_active_at = now;
                }
                self.rev += 1;
                return ChangeKind::Updated;
            }

            let seq = self.next_seq;
            self.next_seq += 1;
            self.entries.insert(
                tab.id,
                Entry {
                    seq,
                    record: TabMediaRecord {
                        id: tab.id,
                        title: tab.title.clone(),
                        url: tab.url.clone(),
                        audible: true,
                        muted: tab.muted,
                        last_active_at: now,
                    },
                },
            );
            self.rev += 1;
            debug!("cache: tab {} added", tab.id);
            return ChangeKind::Added;
        }

        match self.entries.get_mut(&tab.id) {
            Some(entry) => {
                // Went quiet: keep the record, start the retention countdown.
                let record = &mut entry.record;
                record.title = tab.title.clone();
                record.url = tab.url.clone();
                record.muted = tab.muted;
                record.audible = false;
                self.rev += 1;
                ChangeKind::Updated
            }
            None => ChangeKind::None,
        }
    }

    /// Unconditional delete; used when the host reports the tab closed.
    pub fn remove(&mut self, tab_id: TabId) -> bool {
        let existed = self.entries.remove(&tab_id).is_some();
        if existed {
            self.rev += 1;
            debug!("cache: tab {} removed", tab_id);
        }
        existed
    }

    /// Drop silent records whose retention window has run out.  Returns the
    /// evicted ids.
    pub fn evict_stale(&mut self, now: DateTime<Utc>) -> Vec<TabId> {
        let retention = self.retention;
        let stale: Vec<TabId> = self
            .entries
            .values()
            .filter(|e| !e.record.audible && now - e.record.last_active_at >= retention)
            .map(|e| e.record.id)
            .collect();

        for id in &stale {
            self.entries.remove(id);
            debug!("cache: tab {} evicted", id);
        }
        if !stale.is_empty() {
            self.rev += 1;
        }
        stale
    }

    /// Live records after eviction, in first-seen order.
    pub fn snapshot(&mut self, now: DateTime<Utc>) -> Vec<TabMediaRecord> {
        self.evict_stale(now);
        self.ordered_records()
    }

    pub fn tabs_snapshot(&mut self, now: DateTime<Utc>) -> TabsSnapshot {
        let tabs = self.snapshot(now);
        TabsSnapshot { rev: self.rev, tabs }
    }

    fn ordered_records(&self) -> Vec<TabMediaRecord> {
        let mut entries: Vec<&Entry> = self.entries.values().collect();
        entries.sort_by_key(|e| e.seq);
        entries.into_iter().map(|e| e.record.clone()).collect()
    }
}
