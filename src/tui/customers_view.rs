/// Customers tab: pick the customer whose loan journey to start.
///
/// Shortcuts:
///   j/↓ k/↑  move selection
///   Enter    start a session for the highlighted customer
///   r        reload the list
use ratatui::{
    Frame,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Paragraph, Row, Table, TableState},
};

use super::AppState;
use super::chat::spinner_frame;
use crate::client::Customer;
use crate::state::ScoreBand;
use crate::ui::{fmt_inr, truncate};

fn score_color(score: u32) -> Color {
    match ScoreBand::from_score(score) {
        ScoreBand::Good => Color::Green,
        ScoreBand::Fair => Color::Yellow,
        ScoreBand::Poor => Color::Red,
    }
}

fn customer_row(c: &Customer) -> Row<'static> {
    Row::new(vec![
        Cell::from(c.id.clone()).style(Style::default().fg(Color::Rgb(100, 180, 220))),
        Cell::from(truncate(&c.name, 24)),
        Cell::from(c.city.clone()),
        Cell::from(format!("{}/mo", fmt_inr(c.monthly_salary as f64))),
        Cell::from(c.credit_score.to_string()).style(Style::default().fg(score_color(c.credit_score))),
        Cell::from(fmt_inr(c.pre_approved_limit as f64)),
    ])
}

pub fn draw(f: &mut Frame, state: &AppState, area: Rect) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Min(1), Constraint::Length(2)])
        .split(area);

    let header = vec![
        Line::raw(""),
        Line::from(vec![
            Span::styled("  Select a customer", Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)),
            Span::styled("  to begin a personal loan application", Style::default().fg(Color::DarkGray)),
        ]),
    ];
    f.render_widget(Paragraph::new(header), chunks[0]);

    if state.customers_loading && state.customers.is_empty() {
        let (glyph, _, color) = spinner_frame(state.spinner_tick);
        f.render_widget(
            Paragraph::new(Line::from(vec![
                Span::styled(format!("  {glyph} "), Style::default().fg(color)),
                Span::styled("Loading customers…", Style::default().fg(Color::DarkGray)),
            ])),
            chunks[1],
        );
    } else {
        let rows: Vec<Row<'static>> = state.customers.iter().map(customer_row).collect();
        let table = Table::new(
            rows,
            [
                Constraint::Length(8),
                Constraint::Min(16),
                Constraint::Length(12),
                Constraint::Length(14),
                Constraint::Length(7),
                Constraint::Length(12),
            ],
        )
        .header(
            Row::new(["ID", "Name", "City", "Salary", "Score", "Pre-approved"])
                .style(Style::default().fg(Color::DarkGray).add_modifier(Modifier::BOLD)),
        )
        .block(Block::default().borders(Borders::TOP).border_style(Style::default().fg(Color::Rgb(40, 40, 60))))
        .row_highlight_style(Style::default().bg(Color::Rgb(28, 26, 52)).add_modifier(Modifier::BOLD))
        .highlight_symbol("▸ ");

        let mut table_state = TableState::default();
        if !state.customers.is_empty() {
            table_state.select(Some(state.customer_selected));
        }
        f.render_stateful_widget(table, chunks[1], &mut table_state);
    }

    let footer = if let Some(err) = &state.customers_error {
        Line::from(vec![
            Span::styled(format!("  ✗ {err}"), Style::default().fg(Color::Red)),
            Span::styled("  r retry", Style::default().fg(Color::Rgb(80, 80, 110))),
        ])
    } else if state.starting_session {
        Line::from(Span::styled("  Starting session…", Style::default().fg(Color::Cyan)))
    } else {
        Line::from(Span::styled(
            "  ↑↓ select · Enter start chat · r reload",
            Style::default().fg(Color::Rgb(80, 80, 110)),
        ))
    };
    f.render_widget(Paragraph::new(vec![Line::raw(""), footer]), chunks[2]);
}
