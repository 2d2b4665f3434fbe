mod common;

use common::{hidden, visible, FakePage};
use soundtab_daemon::host::{HostError, KeyTarget};
use soundtab_daemon::skip::SkipResolver;
use soundtab_proto::media::{Direction, SkipMethod, StrategyId, NO_SKIP_METHOD};

#[tokio::test]
async fn test_visible_platform_button_short_circuits() {
    let page = FakePage::default().with_element(".ytp-next-button", visible(11));
    let result = SkipResolver::new().resolve(&page, Direction::Next).await;

    assert!(result.success);
    assert_eq!(result.method, SkipMethod::ButtonClick);
    assert_eq!(result.methods_tried, vec![StrategyId::ButtonClick]);
    assert_eq!(page.count("click"), 1);
    assert!(page.calls().contains(&"click:11".to_string()));
    // No later strategy ran.
    assert_eq!(page.count("media_session?"), 0);
    assert_eq!(page.count("find_players"), 0);
    assert_eq!(page.count("key"), 0);
}

#[tokio::test]
async fn test_hidden_buttons_are_passed_over() {
    let page = FakePage::default()
        .with_element(".ytp-next-button", hidden(1))
        .with_element("button[aria-label*='next' i]", visible(2));
    let result = SkipResolver::new().resolve(&page, Direction::Next).await;

    assert_eq!(result.method, SkipMethod::ButtonClick);
    assert_eq!(page.calls().iter().filter(|c| c.starts_with("click")).collect::<Vec<_>>(), vec!["click:2"]);
}

#[tokio::test]
async fn test_bad_selector_does_not_abort_the_walk() {
    let page = FakePage::default()
        .with_bad_selector(".ytp-prev-button")
        .with_element(".skipControl__previous", visible(5));
    let result = SkipResolver::new().resolve(&page, Direction::Previous).await;

    assert!(result.success);
    assert_eq!(result.method, SkipMethod::ButtonClick);
    assert!(page.calls().contains(&"click:5".to_string()));
}

#[tokio::test]
async fn test_unreachable_page_stops_the_selector_walk() {
    let page = FakePage::default()
        .with_query_error(HostError::Timeout(std::time::Duration::from_secs(5)));
    let result = SkipResolver::new().resolve(&page, Direction::Next).await;

    // One failed query is enough; the remaining strategies still run.
    assert_eq!(page.count("query"), 1);
    assert!(result.success);
    assert_eq!(result.method, SkipMethod::KeyboardEvents);
    assert_eq!(result.methods_tried, StrategyId::ALL.to_vec());
}

#[tokio::test]
async fn test_click_error_falls_through_to_media_session() {
    let page = FakePage::default()
        .with_element(".ytp-next-button", visible(1))
        .with_click_error(HostError::Script("element detached".into()))
        .with_media_session();
    let result = SkipResolver::new().resolve(&page, Direction::Next).await;

    assert!(result.success);
    assert_eq!(result.method, SkipMethod::MediaSession);
    assert_eq!(
        result.methods_tried,
        vec![StrategyId::ButtonClick, StrategyId::MediaSession]
    );
    assert!(page.calls().contains(&"media_session:NextTrack".to_string()));
}

#[tokio::test]
async fn test_player_api_picks_direction_specific_method() {
    let page = FakePage::default().with_player("jwplayer()", &["play", "pause", "next", "prev"]);

    let next = SkipResolver::new().resolve(&page, Direction::Next).await;
    assert_eq!(next.method, SkipMethod::PlayerApiNext);
    assert_eq!(
        next.methods_tried,
        vec![
            StrategyId::ButtonClick,
            StrategyId::MediaSession,
            StrategyId::PlayerApi
        ]
    );

    let prev = SkipResolver::new().resolve(&page, Direction::Previous).await;
    assert_eq!(prev.method, SkipMethod::PlayerApiPrev);

    let calls = page.calls();
    assert!(calls.contains(&"invoke:jwplayer().next".to_string()));
    assert!(calls.contains(&"invoke:jwplayer().prev".to_string()));
}

#[tokio::test]
async fn test_player_without_skip_methods_is_ignored() {
    let page = FakePage::default().with_player("player", &["play", "pause"]);
    let result = SkipResolver::new().resolve(&page, Direction::Next).await;

    assert_eq!(result.method, SkipMethod::KeyboardEvents);
    assert_eq!(page.count("invoke"), 0);
}

#[tokio::test]
async fn test_keyboard_fallback_reaches_every_target() {
    let page = FakePage::default();
    let result = SkipResolver::new().resolve(&page, Direction::Next).await;

    assert!(result.success);
    assert_eq!(result.method, SkipMethod::KeyboardEvents);
    assert_eq!(result.methods_tried, StrategyId::ALL.to_vec());
    assert_eq!(page.count("key"), 3);
    assert!(page
        .calls()
        .contains(&"key:ActiveElement/MediaTrackNext".to_string()));
}

#[tokio::test]
async fn test_keyboard_target_failure_does_not_stop_the_others() {
    let page = FakePage::default()
        .with_key_error_on(KeyTarget::Document, HostError::Script("blocked".into()));
    let result = SkipResolver::new().resolve(&page, Direction::Previous).await;

    assert!(result.success);
    assert_eq!(result.method, SkipMethod::KeyboardEvents);
    assert_eq!(page.count("key"), 3);
    let calls = page.calls();
    assert!(calls.contains(&"key:Document/MediaTrackPrevious".to_string()));
    assert!(calls.contains(&"key:Window/MediaTrackPrevious".to_string()));
    assert!(calls.contains(&"key:ActiveElement/MediaTrackPrevious".to_string()));
}

#[tokio::test]
async fn test_exhaustion_reports_every_strategy_in_order() {
    let page = FakePage::default().with_key_error(HostError::Script("blocked".into()));
    let result = SkipResolver::new().resolve(&page, Direction::Previous).await;

    assert!(!result.success);
    assert_eq!(result.method, SkipMethod::None);
    assert_eq!(result.error.as_deref(), Some(NO_SKIP_METHOD));
    assert_eq!(
        result.methods_tried,
        vec![
            StrategyId::ButtonClick,
            StrategyId::MediaSession,
            StrategyId::PlayerApi,
            StrategyId::KeyboardEvents
        ]
    );
}
