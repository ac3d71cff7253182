/// Persona tab: the voice assistant session and what it has said so far.
use ratatui::{
    Frame,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, Paragraph},
};

use super::AppState;
use super::chat::{spinner_frame, wrap_text};
use crate::persona::PersonaStatus;

pub fn draw(f: &mut Frame, state: &AppState, area: Rect) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(4), Constraint::Min(1), Constraint::Length(1)])
        .split(area);

    let status = state.persona.as_ref().map(|p| p.status()).unwrap_or_default();
    let (dot, dot_color) = if status.connected {
        ("●", Color::Green)
    } else if status.connecting {
        (spinner_frame(state.spinner_tick).0, Color::Yellow)
    } else {
        ("○", Color::DarkGray)
    };

    let mut header = vec![
        Line::raw(""),
        Line::from(vec![
            Span::styled(format!("  {dot} "), Style::default().fg(dot_color).add_modifier(Modifier::BOLD)),
            Span::styled(state.persona_name().to_string(), Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)),
            Span::styled("  Loan Assistant", Style::default().fg(Color::DarkGray)),
            Span::styled(if status.muted { "  🔇 muted" } else { "" }, Style::default().fg(Color::Yellow)),
        ]),
        Line::from(Span::styled(format!("  {}", status.text), Style::default().fg(Color::Rgb(140, 120, 220)))),
    ];
    if let Some(err) = status.error.as_ref().or(state.persona_error.as_ref()) {
        header.push(Line::from(Span::styled(format!("  ✗ {err}"), Style::default().fg(Color::Red))));
    }
    f.render_widget(Paragraph::new(header), chunks[0]);

    let lines = state.persona_avatar.as_ref().map(|a| a.lines()).unwrap_or_default();
    let wrap_width = (chunks[1].width as usize).saturating_sub(6).max(10);
    let items: Vec<ListItem<'static>> = lines
        .iter()
        .flat_map(|l| wrap_text(l, wrap_width))
        .map(|w| ListItem::new(Line::from(vec![Span::raw("    "), Span::styled(w, Style::default().fg(Color::White))])))
        .collect();
    let skip = items.len().saturating_sub(chunks[1].height.saturating_sub(1) as usize);
    f.render_widget(
        List::new(items.into_iter().skip(skip).collect::<Vec<_>>())
            .block(Block::default().borders(Borders::TOP).border_style(Style::default().fg(Color::Rgb(40, 40, 60)))),
        chunks[1],
    );

    f.render_widget(
        Paragraph::new(Line::from(Span::styled(hint(&status), Style::default().fg(Color::Rgb(80, 80, 110))))),
        chunks[2],
    );
}

fn hint(status: &PersonaStatus) -> &'static str {
    if status.connected {
        "  m mute/unmute · x end session"
    } else if status.connecting {
        "  connecting…"
    } else {
        "  s start session"
    }
}
