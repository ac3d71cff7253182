/// Admin tab: the four back-office tables, one at a time.
use ratatui::{
    Frame,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Row, Table},
};

use super::AppState;
use super::chat::spinner_frame;
use crate::admin::AdminTable;

pub fn draw(f: &mut Frame, state: &AppState, area: Rect) {
    let Some(admin) = &state.admin else {
        f.render_widget(
            Paragraph::new(vec![
                Line::raw(""),
                Line::from(Span::styled("  Admin access required", Style::default().fg(Color::Yellow))),
                Line::from(Span::styled("  Press Enter to log in.", Style::default().fg(Color::DarkGray))),
            ]),
            area,
        );
        return;
    };

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Min(1), Constraint::Length(1)])
        .split(area);

    // ── Table selector ────────────────────────────────────────────────────────
    let mut tabs = vec![Span::raw("  ")];
    for table in AdminTable::ALL {
        let style = if table == state.admin_table {
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD | Modifier::UNDERLINED)
        } else {
            Style::default().fg(Color::Rgb(60, 55, 90))
        };
        tabs.push(Span::styled(table.label(), style));
        tabs.push(Span::raw("   "));
    }
    let count = state.admin_rows.as_ref().map(|r| r.len()).unwrap_or(0);
    let mut detail = vec![
        Span::styled(format!("  {}", state.admin_table.description()), Style::default().fg(Color::DarkGray)),
        Span::styled(format!("  ·  {count} records"), Style::default().fg(Color::Rgb(100, 90, 180))),
    ];
    if let Some(err) = &state.admin_error {
        detail.push(Span::styled(format!("  ✗ {err}"), Style::default().fg(Color::Red)));
    }
    let header = vec![Line::from(tabs), Line::from(detail)];
    f.render_widget(Paragraph::new(header), chunks[0]);

    // ── Rows ──────────────────────────────────────────────────────────────────
    if state.admin_loading {
        let (glyph, _, color) = spinner_frame(state.spinner_tick);
        f.render_widget(
            Paragraph::new(Line::from(vec![
                Span::styled(format!("  {glyph} "), Style::default().fg(color)),
                Span::styled(format!("Loading {}…", state.admin_table.label()), Style::default().fg(Color::DarkGray)),
            ])),
            chunks[1],
        );
    } else {
        let headers = state.admin_table.headers();
        let rows: Vec<Row<'static>> = state
            .admin_rows
            .as_ref()
            .map(|r| r.rows().into_iter().map(Row::new).collect())
            .unwrap_or_default();
        let widths = vec![Constraint::Ratio(1, headers.len() as u32); headers.len()];
        let table = Table::new(rows, widths)
            .header(
                Row::new(headers.iter().copied())
                    .style(Style::default().fg(Color::DarkGray).add_modifier(Modifier::BOLD)),
            )
            .block(Block::default().borders(Borders::TOP).border_style(Style::default().fg(Color::Rgb(40, 40, 60))));
        f.render_widget(table, chunks[1]);
    }

    f.render_widget(
        Paragraph::new(Line::from(vec![
            Span::styled(format!("  {} ", admin.username()), Style::default().fg(Color::Cyan)),
            Span::styled(
                format!("since {}", admin.since().with_timezone(&chrono::Local).format("%H:%M")),
                Style::default().fg(Color::DarkGray),
            ),
            Span::styled("  ←→ table · r reload · o logout", Style::default().fg(Color::Rgb(80, 80, 110))),
        ])),
        chunks[2],
    );
}
