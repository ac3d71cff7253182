/// Overlay/popup draw functions: admin login and slash-complete.
use ratatui::{
    Frame,
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, List, ListItem, Paragraph},
};

use super::{AppState, slash_filtered};

fn centered(area: Rect, width: u16, height: u16) -> Rect {
    let width = width.min(area.width.saturating_sub(4));
    let height = height.min(area.height.saturating_sub(4));
    let x = area.x + (area.width.saturating_sub(width)) / 2;
    let y = area.y + (area.height.saturating_sub(height)) / 2;
    Rect { x, y, width, height }
}

// ── Admin login ────────────────────────────────────────────────────────────────

pub fn draw_login(f: &mut Frame, state: &AppState, area: Rect) {
    let popup_area = centered(area, 48, 10);
    f.render_widget(Clear, popup_area);

    let block = Block::default()
        .title(Span::styled(
            " Admin Login ",
            Style::default().fg(Color::White).add_modifier(Modifier::BOLD),
        ))
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan));

    let login = &state.login;
    let field_line = |label: &'static str, value: String, focused: bool| {
        let (marker, fg) = if focused { ("▸ ", Color::Cyan) } else { ("  ", Color::DarkGray) };
        Line::from(vec![
            Span::styled(marker, Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)),
            Span::styled(format!("{label:<10}"), Style::default().fg(fg)),
            Span::styled(value, Style::default().fg(Color::White)),
        ])
    };

    let mut lines = vec![
        Line::raw(""),
        field_line("Username", login.username.clone(), login.field == 0),
        field_line("Password", "•".repeat(login.password.chars().count()), login.field == 1),
        Line::raw(""),
    ];
    if let Some(err) = &login.error {
        lines.push(Line::from(Span::styled(format!("  ✗ {err}"), Style::default().fg(Color::Red))));
    } else {
        lines.push(Line::raw(""));
    }
    lines.push(Line::from(Span::styled(
        "  Tab switch field · Enter submit · Esc cancel",
        Style::default().fg(Color::Rgb(70, 70, 90)),
    )));

    f.render_widget(Paragraph::new(lines).block(block), popup_area);
}

// ── Slash autocomplete ─────────────────────────────────────────────────────────

/// Suggestion list just above the input box while a `/command` is being typed.
pub fn draw_slash_complete(f: &mut Frame, state: &AppState, input_area: Rect) {
    if !state.input.starts_with('/') || state.input.contains(char::is_whitespace) {
        return;
    }
    let matches = slash_filtered(&state.input);
    if matches.is_empty() {
        return;
    }

    let height = (matches.len() as u16 + 2).min(input_area.y);
    let width = 52u16.min(input_area.width.saturating_sub(2));
    let popup_area = Rect {
        x: input_area.x + 2,
        y: input_area.y.saturating_sub(height),
        width,
        height,
    };
    f.render_widget(Clear, popup_area);

    let items: Vec<ListItem<'static>> = matches
        .iter()
        .map(|c| {
            ListItem::new(Line::from(vec![
                Span::styled(format!(" {:<11}", c.key), Style::default().fg(Color::Cyan)),
                Span::styled(c.label.to_string(), Style::default().fg(Color::DarkGray)),
            ]))
        })
        .collect();

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Rgb(60, 60, 80)));
    f.render_widget(List::new(items).block(block), popup_area);
}
