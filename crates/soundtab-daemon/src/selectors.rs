//! Ordered CSS selectors for next/previous controls.
//!
//! Known player families come first, then accessible-name patterns, then
//! class-name guesses.  The button-click strategy walks this table top to
//! bottom and clicks the first visible match, so order is priority.

use soundtab_proto::media::Direction;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SelectorTier {
    /// Markup of a specific site's player.
    Platform,
    /// `aria-label` / `title` text.
    Accessible,
    /// Class-name conventions.
    Generic,
}

#[derive(Debug)]
pub struct SelectorGroup {
    pub family: &'static str,
    pub tier: SelectorTier,
    pub next: &'static [&'static str],
    pub previous: &'static [&'static str],
}

impl SelectorGroup {
    pub fn for_direction(&self, direction: Direction) -> &'static [&'static str] {
        match direction {
            Direction::Next => self.next,
            Direction::Previous => self.previous,
        }
    }
}

pub const SELECTOR_GROUPS: &[SelectorGroup] = &[
    SelectorGroup {
        family: "youtube",
        tier: SelectorTier::Platform,
        next: &[".ytp-next-button"],
        previous: &[".ytp-prev-button"],
    },
    SelectorGroup {
        family: "youtube-music",
        tier: SelectorTier::Platform,
        next: &["ytmusic-player-bar .next-button", "tp-yt-paper-icon-button.next-button"],
        previous: &[
            "ytmusic-player-bar .previous-button",
            "tp-yt-paper-icon-button.previous-button",
        ],
    },
    SelectorGroup {
        family: "spotify",
        tier: SelectorTier::Platform,
        next: &["[data-testid='control-button-skip-forward']"],
        previous: &["[data-testid='control-button-skip-back']"],
    },
    SelectorGroup {
        family: "soundcloud",
        tier: SelectorTier::Platform,
        next: &[".skipControl__next"],
        previous: &[".skipControl__previous"],
    },
    SelectorGroup {
        family: "deezer",
        tier: SelectorTier::Platform,
        next: &["[data-testid='next_track_button']"],
        previous: &["[data-testid='previous_track_button']"],
    },
    SelectorGroup {
        family: "tidal",
        tier: SelectorTier::Platform,
        next: &["[data-test='next']"],
        previous: &["[data-test='previous']"],
    },
    SelectorGroup {
        family: "pandora",
        tier: SelectorTier::Platform,
        next: &["[data-qa='skip_button']"],
        previous: &["[data-qa='replay_button']"],
    },
    SelectorGroup {
        family: "bandcamp",
        tier: SelectorTier::Platform,
        next: &[".inline_player .nextbutton", ".nextbutton"],
        previous: &[".inline_player .prevbutton", ".prevbutton"],
    },
    SelectorGroup {
        family: "netflix",
        tier: SelectorTier::Platform,
        next: &["[data-uia='control-next']"],
        previous: &[],
    },
    SelectorGroup {
        family: "aria",
        tier: SelectorTier::Accessible,
        next: &[
            "button[aria-label*='next track' i]",
            "button[aria-label*='next' i]",
            "[role='button'][aria-label*='next' i]",
            "[aria-label*='skip forward' i]",
            "button[title*='next' i]",
        ],
        previous: &[
            "button[aria-label*='previous track' i]",
            "button[aria-label*='previous' i]",
            "[role='button'][aria-label*='previous' i]",
            "[aria-label*='skip back' i]",
            "button[title*='previous' i]",
        ],
    },
    SelectorGroup {
        family: "generic",
        tier: SelectorTier::Generic,
        next: &[
            "button.next",
            ".next-button",
            ".btn-next",
            "[class*='next-track']",
            "[class*='skip-next']",
        ],
        previous: &[
            "button.prev",
            ".prev-button",
            ".previous-button",
            ".btn-prev",
            "[class*='prev-track']",
            "[class*='skip-prev']",
        ],
    },
];

/// Every selector for `direction`, highest priority first, tagged with the
/// family it belongs to.
pub fn selectors(direction: Direction) -> impl Iterator<Item = (&'static str, &'static str)> {
    SELECTOR_GROUPS.iter().flat_map(move |group| {
        group
            .for_direction(direction)
            .iter()
            .map(move |selector| (group.family, *selector))
    })
}
