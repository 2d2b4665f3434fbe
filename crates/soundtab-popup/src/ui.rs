use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, ListState, Paragraph},
    Frame,
};
use soundtab_proto::media::TabMediaRecord;
use unicode_width::UnicodeWidthStr;

use crate::state::{ButtonState, Control, PopupState};
use crate::theme::*;

pub const FAILED_GLYPH: &str = "✗";
const SUCCEEDED_GLYPH: &str = "✓";
const PENDING_GLYPH: &str = "…";

pub fn draw(frame: &mut Frame, state: &PopupState) {
    frame.render_widget(
        Block::default().style(ratatui::style::Style::default().bg(C_BG)),
        frame.area(),
    );

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Min(3),
            Constraint::Length(3),
            Constraint::Length(1),
        ])
        .split(frame.area());

    draw_header(frame, chunks[0], state);
    draw_tabs(frame, chunks[1], state);
    draw_controls(frame, chunks[2], state);
    draw_footer(frame, chunks[3], state);
}

fn draw_header(frame: &mut Frame, area: Rect, state: &PopupState) {
    let playing = state.tabs().iter().filter(|t| t.audible).count();
    let status = if state.connected {
        Span::styled("● connected", style_playing())
    } else {
        Span::styled("○ connecting…", style_pending())
    };
    let line = Line::from(vec![
        Span::styled(" soundtab ", style_accent()),
        status,
        Span::styled(format!("  {} playing, {} listed", playing, state.tabs().len()), style_secondary()),
    ]);
    frame.render_widget(Paragraph::new(line), area);
}

fn draw_tabs(frame: &mut Frame, area: Rect, state: &PopupState) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(style_border(true))
        .title(" Tabs ");

    if state.tabs().is_empty() {
        let empty = Paragraph::new(Line::from(Span::styled(
            "No tabs playing audio",
            style_secondary(),
        )))
        .block(block);
        frame.render_widget(empty, area);
        return;
    }

    let width = area.width.saturating_sub(8) as usize;
    let items: Vec<ListItem> = state
        .tabs()
        .iter()
        .map(|tab| ListItem::new(tab_line(tab, width)))
        .collect();

    let list = List::new(items)
        .block(block)
        .highlight_style(style_selected())
        .highlight_symbol("▶ ");
    let mut list_state = ListState::default().with_selected(Some(state.selected));
    frame.render_stateful_widget(list, area, &mut list_state);
}

fn tab_line(tab: &TabMediaRecord, width: usize) -> Line<'static> {
    let badge = if tab.muted {
        Span::styled("🔇 ", style_muted())
    } else if tab.audible {
        Span::styled("♪ ", style_playing())
    } else {
        Span::styled("  ", style_muted())
    };
    let title_style = if tab.audible { style_default() } else { style_secondary() };
    let title = if tab.title.is_empty() { tab.url.as_str() } else { tab.title.as_str() };
    Line::from(vec![badge, Span::styled(truncate(title, width), title_style)])
}

/// Cut `text` to at most `width` columns, marking the cut with `…`.
pub fn truncate(text: &str, width: usize) -> String {
    if text.width() <= width {
        return text.to_string();
    }
    let mut out = String::new();
    let mut used = 0;
    for ch in text.chars() {
        let w = unicode_width::UnicodeWidthChar::width(ch).unwrap_or(0);
        if used + w + 1 > width {
            break;
        }
        out.push(ch);
        used += w;
    }
    out.push('…');
    out
}

fn control_label(control: Control, tab: &TabMediaRecord) -> &'static str {
    match control {
        Control::Previous => "⏮ prev",
        Control::PlayPause => "⏯ play/pause",
        Control::Next => "⏭ next",
        Control::Mute if tab.muted => "🔈 unmute",
        Control::Mute => "🔇 mute",
        Control::Focus => "↗ focus",
    }
}

fn draw_controls(frame: &mut Frame, area: Rect, state: &PopupState) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(style_border(false));

    let Some(tab) = state.selected_tab() else {
        frame.render_widget(block, area);
        return;
    };

    let mut spans = Vec::new();
    for control in Control::ALL {
        let label = control_label(control, tab);
        let span = match state.button(tab.id, control) {
            ButtonState::Ready => Span::styled(format!(" {} ", label), style_default()),
            ButtonState::Pending { .. } => {
                Span::styled(format!(" {} {} ", label, PENDING_GLYPH), style_pending())
            }
            ButtonState::Succeeded { .. } => {
                Span::styled(format!(" {} {} ", label, SUCCEEDED_GLYPH), style_playing())
            }
            ButtonState::Failed { .. } => {
                Span::styled(format!(" {} {} ", label, FAILED_GLYPH), style_error())
            }
        };
        spans.push(span);
        spans.push(Span::styled("│", style_muted()));
    }
    spans.pop();

    frame.render_widget(Paragraph::new(Line::from(spans)).block(block), area);
}

fn draw_footer(frame: &mut Frame, area: Rect, state: &PopupState) {
    let line = match state.log.back() {
        Some(last) => Line::from(Span::styled(last.clone(), style_error())),
        None => Line::from(Span::styled(
            "↑/↓ select  space play/pause  m mute  n/p skip  enter focus  q quit",
            style_secondary(),
        )),
    };
    frame.render_widget(Paragraph::new(line), area);
}
