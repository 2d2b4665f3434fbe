//! Toolbar icon + tooltip derived from the cache.

use serde::{Deserialize, Serialize};
use soundtab_proto::media::TabMediaRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IconState {
    Idle,
    Audible,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Indicator {
    pub icon: IconState,
    pub title: String,
}

impl Indicator {
    pub fn from_records(records: &[TabMediaRecord]) -> Self {
        let playing = records.iter().filter(|r| r.audible).count();
        let icon = if playing > 0 {
            IconState::Audible
        } else {
            IconState::Idle
        };
        let title = match playing {
            0 => "No tabs playing audio".to_string(),
            1 => "1 tab playing audio".to_string(),
            n => format!("{} tabs playing audio", n),
        };
        Self { icon, title }
    }
}

impl Default for Indicator {
    fn default() -> Self {
        Self::from_records(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use soundtab_proto::media::TabId;

    fn record(id: u64, audible: bool) -> TabMediaRecord {
        TabMediaRecord {
            id: TabId(id),
            title: String::new(),
            url: String::new(),
            audible,
            muted: false,
            last_active_at: Utc::now(),
        }
    }

    #[test]
    fn test_idle_when_only_retained_tabs() {
        let indicator = Indicator::from_records(&[record(1, false)]);
        assert_eq!(indicator.icon, IconState::Idle);
        assert_eq!(indicator.title, "No tabs playing audio");
    }

    #[test]
    fn test_counts_audible_tabs() {
        let one = Indicator::from_records(&[record(1, true), record(2, false)]);
        assert_eq!(one.icon, IconState::Audible);
        assert_eq!(one.title, "1 tab playing audio");

        let two = Indicator::from_records(&[record(1, true), record(2, true)]);
        assert_eq!(two.title, "2 tabs playing audio");
    }
}
