use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Host-assigned tab identifier.  Opaque to us; only used as a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TabId(pub u64);

impl fmt::Display for TabId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A tab as reported by the host platform at one point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostTab {
    pub id: TabId,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub audible: bool,
    #[serde(default)]
    pub muted: bool,
}

impl HostTab {
    /// True for pages the host lets us inject a controller into.
    /// Browser-internal pages (chrome://, about:, extension pages) are not.
    pub fn is_scriptable(&self) -> bool {
        self.url.starts_with("http://")
            || self.url.starts_with("https://")
            || self.url.starts_with("file://")
    }
}

/// One cached tab that has produced sound since the cache was initialised.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TabMediaRecord {
    pub id: TabId,
    pub title: String,
    pub url: String,
    pub audible: bool,
    pub muted: bool,
    /// Last time the tab was observed audible.  Never moves backwards.
    pub last_active_at: DateTime<Utc>,
}

/// Full ordered list of cached records.  `rev` is bumped on every cache
/// mutation; clients drop snapshots older than the one they hold.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TabsSnapshot {
    pub rev: u64,
    pub tabs: Vec<TabMediaRecord>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Next,
    Previous,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Next => "next",
            Direction::Previous => "previous",
        }
    }
}

impl std::str::FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "next" => Ok(Direction::Next),
            "previous" | "prev" => Ok(Direction::Previous),
            other => Err(format!("unknown direction: {}", other)),
        }
    }
}

/// The four skip strategies, in the order the resolver tries them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StrategyId {
    #[serde(rename = "button-click")]
    ButtonClick,
    #[serde(rename = "media-session")]
    MediaSession,
    #[serde(rename = "player-api")]
    PlayerApi,
    #[serde(rename = "keyboard-events")]
    KeyboardEvents,
}

impl StrategyId {
    pub const ALL: [StrategyId; 4] = [
        StrategyId::ButtonClick,
        StrategyId::MediaSession,
        StrategyId::PlayerApi,
        StrategyId::KeyboardEvents,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyId::ButtonClick => "button-click",
            StrategyId::MediaSession => "media-session",
            StrategyId::PlayerApi => "player-api",
            StrategyId::KeyboardEvents => "keyboard-events",
        }
    }
}

/// Which method actually moved the track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SkipMethod {
    #[serde(rename = "button-click")]
    ButtonClick,
    #[serde(rename = "media-session")]
    MediaSession,
    #[serde(rename = "player-api-next")]
    PlayerApiNext,
    #[serde(rename = "player-api-prev")]
    PlayerApiPrev,
    #[serde(rename = "keyboard-events")]
    KeyboardEvents,
    #[serde(rename = "none")]
    None,
}

pub const NO_SKIP_METHOD: &str = "No supported track skipping method found on this page";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkipResult {
    pub success: bool,
    pub method: SkipMethod,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub methods_tried: Vec<StrategyId>,
}

impl SkipResult {
    pub fn succeeded(method: SkipMethod, methods_tried: Vec<StrategyId>) -> Self {
        Self {
            success: true,
            method,
            error: None,
            methods_tried,
        }
    }

    pub fn exhausted(methods_tried: Vec<StrategyId>) -> Self {
        Self {
            success: false,
            method: SkipMethod::None,
            error: Some(NO_SKIP_METHOD.to_string()),
            methods_tried,
        }
    }

    /// Failure that happened before any strategy ran (tab gone, timeout).
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            method: SkipMethod::None,
            error: Some(error.into()),
            methods_tried: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_skip_result_wire_names() {
        let result = SkipResult::exhausted(StrategyId::ALL.to_vec());
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["method"], "none");
        assert_eq!(json["error"], NO_SKIP_METHOD);
        assert_eq!(
            json["methods_tried"],
            serde_json::json!(["button-click", "media-session", "player-api", "keyboard-events"])
        );
    }

    #[test]
    fn test_success_omits_error() {
        let result = SkipResult::succeeded(SkipMethod::PlayerApiPrev, vec![]);
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["method"], "player-api-prev");
        assert!(json.get("error").is_none());
    }

    #[test]
    fn test_scriptable_urls() {
        let mut tab = HostTab {
            id: TabId(1),
            title: String::new(),
            url: "https://example.com".into(),
            audible: false,
            muted: false,
        };
        assert!(tab.is_scriptable());
        tab.url = "chrome://settings".into();
        assert!(!tab.is_scriptable());
    }

    #[test]
    fn test_direction_parse() {
        assert_eq!("next".parse::<Direction>().unwrap(), Direction::Next);
        assert_eq!("prev".parse::<Direction>().unwrap(), Direction::Previous);
        assert!("sideways".parse::<Direction>().is_err());
    }
}
