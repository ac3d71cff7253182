/// Ratatui draw entry-point for loandesk.
/// Thin dispatcher; tab content lives in chat.rs and the *_view.rs files.
use ratatui::{
    Frame,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Wrap},
};

use super::{AppState, Mode, Tab};
use super::chat::{SPINNER_GLYPHS, phase_tag};
use crate::ui::truncate;

pub fn draw(f: &mut Frame, state: &AppState) {
    let area = f.area();

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),  // tab bar
            Constraint::Min(0),     // content area
            Constraint::Length(1),  // status bar
            Constraint::Length(3),  // input box
        ])
        .split(area);

    draw_tab_bar(f, state, chunks[0]);

    // Content area by active tab
    match state.active_tab {
        Tab::Customers => super::customers_view::draw(f, state, chunks[1]),
        Tab::Chat      => super::chat::draw_chat(f, state, chunks[1]),
        Tab::Admin     => super::admin_view::draw(f, state, chunks[1]),
        Tab::Persona   => super::persona_view::draw(f, state, chunks[1]),
    }

    draw_status_bar(f, state, chunks[2]);
    draw_input(f, state, chunks[3]);

    if state.active_tab == Tab::Chat {
        super::overlays::draw_slash_complete(f, state, chunks[3]);
    }
    if state.mode == Mode::AdminLogin {
        super::overlays::draw_login(f, state, area);
    }
}

fn draw_tab_bar(f: &mut Frame, state: &AppState, area: Rect) {
    let tabs: &[(&str, Tab)] = &[
        ("[1] Customers", Tab::Customers),
        ("[2] Chat     ", Tab::Chat),
        ("[3] Admin    ", Tab::Admin),
        ("[4] Persona  ", Tab::Persona),
    ];

    let mut spans = vec![Span::raw(" ")];
    for (label, tab) in tabs {
        let active = state.active_tab == *tab;
        let style = if active {
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD | Modifier::UNDERLINED)
        } else {
            Style::default().fg(Color::Rgb(60, 55, 90))
        };
        spans.push(Span::styled(label.to_string(), style));
        spans.push(Span::styled("  ", Style::default()));
    }

    f.render_widget(
        Paragraph::new(Line::from(spans))
            .style(Style::default().bg(Color::Rgb(6, 6, 12))),
        area,
    );
}

fn draw_status_bar(f: &mut Frame, state: &AppState, area: Rect) {
    // Animated spinner glyph in status bar while anything is outstanding
    let (status_glyph, status_color) = if state.is_busy() {
        let g = SPINNER_GLYPHS[(state.spinner_tick as usize) % SPINNER_GLYPHS.len()];
        (g, Color::Cyan)
    } else {
        ("▲", Color::White)
    };

    let (phase_glyph, phase_color) = phase_tag(state.chat.phase());
    let customer = state
        .chat_customer
        .as_ref()
        .map(|c| format!("{} {}", c.id, truncate(&c.name, 20)))
        .unwrap_or_else(|| "no customer".to_string());

    let mut spans = vec![
        Span::raw(" "),
        Span::styled(status_glyph, Style::default().fg(status_color).add_modifier(Modifier::BOLD)),
        Span::styled(" loandesk", Style::default().fg(Color::White).add_modifier(Modifier::BOLD)),
        Span::raw("  "),
        Span::styled(state.profile.clone(), Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)),
        Span::styled("  ·  ", Style::default().fg(Color::DarkGray)),
        Span::styled(truncate(&state.endpoint, 32), Style::default().fg(Color::Rgb(100, 180, 220))),
        Span::styled("  ·  ", Style::default().fg(Color::DarkGray)),
        Span::styled(customer, Style::default().fg(Color::Rgb(140, 120, 220))),
        Span::raw("  "),
        Span::styled(phase_glyph, Style::default().fg(phase_color)),
        Span::styled(format!(" {}", state.chat.phase().label()), Style::default().fg(phase_color)),
    ];
    if let Some(msg) = &state.status_msg {
        spans.push(Span::styled(format!("   {msg}"), Style::default().fg(Color::Rgb(200, 160, 50))));
    }

    f.render_widget(
        Paragraph::new(Line::from(spans)).style(Style::default().bg(Color::Rgb(10, 10, 18))),
        area,
    );
}

fn draw_input(f: &mut Frame, state: &AppState, area: Rect) {
    let chatting = state.active_tab == Tab::Chat && state.mode == Mode::Normal;
    let busy = state.chat.session().is_some_and(|s| s.dispatcher().is_busy());
    let (border_color, prompt_color, prompt_char) = if !chatting || busy {
        (Color::Rgb(40, 40, 60), Color::DarkGray, "·")
    } else {
        (Color::Rgb(60, 60, 80), Color::Cyan, "❯")
    };

    let prompt_span = Span::styled(
        format!("  {prompt_char} "),
        Style::default().fg(prompt_color).add_modifier(Modifier::BOLD),
    );

    let content_span = if !chatting {
        Span::styled(
            "1-4 switch tabs · Ctrl+C quit",
            Style::default().fg(Color::Rgb(60, 60, 80)),
        )
    } else if state.input.is_empty() {
        let hint = if busy {
            "waiting for the assistant…"
        } else {
            "message · /upload <path> · /download · /help"
        };
        Span::styled(hint, Style::default().fg(Color::Rgb(70, 70, 90)))
    } else {
        Span::styled(state.input.clone(), Style::default().fg(Color::White))
    };

    let block = Block::default()
        .borders(Borders::TOP)
        .border_style(Style::default().fg(border_color))
        .style(Style::default().bg(Color::Rgb(8, 8, 14)));

    let paragraph = Paragraph::new(Line::from(vec![prompt_span, content_span]))
        .block(block)
        .wrap(Wrap { trim: false });

    f.render_widget(paragraph, area);

    // Position cursor at the actual edit cursor, not end of string
    if chatting {
        use unicode_width::UnicodeWidthStr;
        // prompt "  ❯ " is 4 columns wide
        let prompt_width: u16 = 4;
        let text_before_cursor = &state.input[..state.cursor.min(state.input.len())];
        let cursor_x = area.x + prompt_width + text_before_cursor.width() as u16;
        let cursor_y = area.y + 1; // +1 for top border
        if cursor_x < area.x + area.width {
            f.set_cursor_position((cursor_x, cursor_y));
        }
    }
}
