//! Skip-track resolution against an unknown page.
//!
//! Strategies run in a fixed order, cheapest and most precise first:
//!
//! ```text
//!   button-click  ->  media-session  ->  player-api  ->  keyboard-events
//! ```
//!
//! A strategy either reports the method it used or that it found nothing to
//! act on.  Errors raised inside a strategy count as "found nothing": they are
//! logged and the resolver moves on.  Only running out of strategies fails.

use async_trait::async_trait;
use soundtab_proto::media::{Direction, SkipMethod, SkipResult, StrategyId};
use tracing::{debug, info, warn};

use crate::host::{HostError, KeyTarget, MediaKey, MediaSessionAction, PageContext};
use crate::selectors;

/// Well-known global variable names pages use for their player object.
pub const PLAYER_GLOBALS: &[&str] = &[
    "player",
    "ytPlayer",
    "videoPlayer",
    "audioPlayer",
    "mediaPlayer",
    "musicPlayer",
    "myPlayer",
    "plyr",
];

/// Player frameworks that keep a registry of their instances.
pub const PLAYER_FRAMEWORKS: &[&str] = &["videojs", "jwplayer", "flowplayer"];

const NEXT_METHODS: &[&str] = &["nextTrack", "next", "playNext", "skipNext", "nextVideo"];
const PREVIOUS_METHODS: &[&str] = &[
    "previousTrack",
    "prevTrack",
    "previous",
    "prev",
    "playPrevious",
    "skipPrevious",
    "previousVideo",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attempt {
    Done(SkipMethod),
    NotFound,
}

#[async_trait]
pub trait SkipStrategy: Send + Sync {
    fn id(&self) -> StrategyId;
    async fn attempt(&self, page: &dyn PageContext, direction: Direction) -> Result<Attempt, HostError>;
}

/// Click the first visible control matched by the selector table.
pub struct ButtonClick;

#[async_trait]
impl SkipStrategy for ButtonClick {
    fn id(&self) -> StrategyId {
        StrategyId::ButtonClick
    }

    async fn attempt(&self, page: &dyn PageContext, direction: Direction) -> Result<Attempt, HostError> {
        for (family, selector) in selectors::selectors(direction) {
            let matches = match page.query_elements(selector).await {
                Ok(m) => m,
                Err(HostError::Script(e)) => {
                    // Unsupported selector syntax on this page, keep walking.
                    debug!("skip: selector {:?} ({}) rejected: {}", selector, family, e);
                    continue;
                }
                // The page itself is unreachable; no other selector will fare better.
                Err(e) => return Err(e),
            };
            if let Some(target) = matches.iter().find(|el| el.is_visible()) {
                page.click(target.element).await?;
                info!("skip: clicked {:?} ({})", selector, family);
                return Ok(Attempt::Done(SkipMethod::ButtonClick));
            }
        }
        Ok(Attempt::NotFound)
    }
}

/// Fire the page's media-session action handler.
pub struct MediaSession;

#[async_trait]
impl SkipStrategy for MediaSession {
    fn id(&self) -> StrategyId {
        StrategyId::MediaSession
    }

    async fn attempt(&self, page: &dyn PageContext, direction: Direction) -> Result<Attempt, HostError> {
        if !page.has_media_session().await? {
            return Ok(Attempt::NotFound);
        }
        let action = match direction {
            Direction::Next => MediaSessionAction::NextTrack,
            Direction::Previous => MediaSessionAction::PreviousTrack,
        };
        // There is no way to tell whether the page registered a real handler.
        page.dispatch_media_session(action).await?;
        Ok(Attempt::Done(SkipMethod::MediaSession))
    }
}

/// Call a next/previous method on a known player object.
pub struct PlayerApi;

#[async_trait]
impl SkipStrategy for PlayerApi {
    fn id(&self) -> StrategyId {
        StrategyId::PlayerApi
    }

    async fn attempt(&self, page: &dyn PageContext, direction: Direction) -> Result<Attempt, HostError> {
        let (names, method) = match direction {
            Direction::Next => (NEXT_METHODS, SkipMethod::PlayerApiNext),
            Direction::Previous => (PREVIOUS_METHODS, SkipMethod::PlayerApiPrev),
        };

        let players = page.find_players(PLAYER_GLOBALS, PLAYER_FRAMEWORKS).await?;
        for player in &players {
            for name in names.iter().filter(|n| player.methods.iter().any(|m| m.as_str() == **n)) {
                match page.invoke_player(player, name).await {
                    Ok(()) => {
                        info!("skip: called {}.{}()", player.path, name);
                        return Ok(Attempt::Done(method));
                    }
                    Err(e) => debug!("skip: {}.{}() failed: {}", player.path, name, e),
                }
            }
        }
        Ok(Attempt::NotFound)
    }
}

/// Synthesize a media key and send it everywhere a page might listen.
pub struct KeyboardEvents;

#[async_trait]
impl SkipStrategy for KeyboardEvents {
    fn id(&self) -> StrategyId {
        StrategyId::KeyboardEvents
    }

    async fn attempt(&self, page: &dyn PageContext, direction: Direction) -> Result<Attempt, HostError> {
        let key = match direction {
            Direction::Next => MediaKey::MediaTrackNext,
            Direction::Previous => MediaKey::MediaTrackPrevious,
        };

        let mut delivered = 0;
        for target in KeyTarget::ALL {
            match page.dispatch_key(target, key).await {
                Ok(()) => delivered += 1,
                Err(e) => debug!("skip: {:?} dispatch to {:?} failed: {}", key, target, e),
            }
        }

        if delivered > 0 {
            Ok(Attempt::Done(SkipMethod::KeyboardEvents))
        } else {
            Ok(Attempt::NotFound)
        }
    }
}

pub struct SkipResolver {
    strategies: Vec<Box<dyn SkipStrategy>>,
}

impl Default for SkipResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl SkipResolver {
    pub fn new() -> Self {
        Self::with_strategies(vec![
            Box::new(ButtonClick),
            Box::new(MediaSession),
            Box::new(PlayerApi),
            Box::new(KeyboardEvents),
        ])
    }

    pub fn with_strategies(strategies: Vec<Box<dyn SkipStrategy>>) -> Self {
        Self { strategies }
    }

    pub async fn resolve(&self, page: &dyn PageContext, direction: Direction) -> SkipResult {
        let mut tried = Vec::with_capacity(self.strategies.len());

        for strategy in &self.strategies {
            let id = strategy.id();
            tried.push(id);
            match strategy.attempt(page, direction).await {
                Ok(Attempt::Done(method)) => {
                    info!("skip {}: resolved via {:?}", direction.as_str(), method);
                    return SkipResult::succeeded(method, tried);
                }
                Ok(Attempt::NotFound) => {
                    debug!("skip {}: {} found nothing", direction.as_str(), id.as_str());
                }
                Err(e) => {
                    warn!("skip {}: {} failed: {}", direction.as_str(), id.as_str(), e);
                }
            }
        }

        warn!("skip {}: no strategy worked", direction.as_str());
        SkipResult::exhausted(tried)
    }
}
