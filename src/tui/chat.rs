/// Chat tab rendering: transcript bubbles, the application status panel, spinner, utilities.
use ratatui::{
    Frame,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, Paragraph, Wrap},
};

use super::AppState;
use crate::session::{ChatSession, ChatView, SessionPhase};
use crate::state::{ApplicationState, ScoreBand, StepStatus};
use crate::transcript::{Role, TranscriptEntry};
use crate::ui::{band_label, fmt_inr, role_glyph, step_glyph};

// ── Spinner ────────────────────────────────────────────────────────────────────

pub const SPINNER_GLYPHS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];
const SPINNER_MSGS: &[(&str, Color)] = &[
    ("thinking…",          Color::Cyan),
    ("checking eligibility…", Color::Rgb(0, 200, 255)),
    ("talking to the desk…",  Color::Rgb(0, 220, 180)),
    ("almost there…",      Color::Rgb(100, 200, 255)),
];

pub fn spinner_frame(tick: u32) -> (&'static str, &'static str, Color) {
    let glyph = SPINNER_GLYPHS[(tick as usize) % SPINNER_GLYPHS.len()];
    // Message changes every ~2 seconds (120ms × 16 ticks)
    let msg_idx = (tick as usize / 16) % SPINNER_MSGS.len();
    let (msg, color) = SPINNER_MSGS[msg_idx];
    (glyph, msg, color)
}

const STATUS_PANEL_WIDTH: u16 = 34;

// ── Transcript items ───────────────────────────────────────────────────────────

fn role_colors(role: Role) -> (Color, Color) {
    match role {
        Role::User      => (Color::Rgb(160, 140, 255), Color::Rgb(235, 232, 255)),
        Role::Assistant => (Color::Cyan, Color::White),
        Role::System    => (Color::Yellow, Color::Rgb(230, 200, 120)),
    }
}

pub fn build_items(entries: &[TranscriptEntry], term_width: u16) -> Vec<ListItem<'static>> {
    let mut items: Vec<ListItem<'static>> = Vec::new();
    let wrap_width = (term_width as usize).saturating_sub(6).max(10);

    for entry in entries {
        let (label_fg, text_fg) = role_colors(entry.role);
        let label = match (entry.role, entry.agent.as_deref()) {
            (Role::User, _) => "you".to_string(),
            (Role::Assistant, Some(agent)) if !agent.is_empty() => format!("assistant · {agent}"),
            (Role::Assistant, _) => "assistant".to_string(),
            (Role::System, _) => "notice".to_string(),
        };
        items.push(ListItem::new(Line::from(vec![
            Span::raw("  "),
            Span::styled(format!("{} ", role_glyph(entry.role)), Style::default().fg(label_fg).add_modifier(Modifier::BOLD)),
            Span::styled(label, Style::default().fg(label_fg).add_modifier(Modifier::BOLD)),
            Span::styled(
                format!("  {}", entry.timestamp.with_timezone(&chrono::Local).format("%H:%M")),
                Style::default().fg(Color::DarkGray),
            ),
        ])));

        for src_line in entry.content.lines() {
            for w in wrap_text(src_line, wrap_width) {
                items.push(ListItem::new(Line::from(vec![
                    Span::raw("    "),
                    Span::styled(w, Style::default().fg(text_fg)),
                ])));
            }
        }
        items.push(ListItem::new(Line::raw("")));
    }
    items
}

// ── Status panel ───────────────────────────────────────────────────────────────

fn band_color(band: ScoreBand) -> Color {
    match band {
        ScoreBand::Good => Color::Green,
        ScoreBand::Fair => Color::Yellow,
        ScoreBand::Poor => Color::Red,
    }
}

fn step_color(status: StepStatus) -> Color {
    match status {
        StepStatus::Completed => Color::Green,
        StepStatus::Pending   => Color::DarkGray,
        StepStatus::Error     => Color::Red,
    }
}

fn field(label: &'static str, value: String) -> Line<'static> {
    Line::from(vec![
        Span::styled(format!(" {label:<11}"), Style::default().fg(Color::DarkGray)),
        Span::styled(value, Style::default().fg(Color::White)),
    ])
}

/// Lines of the status panel for one snapshot.
pub fn status_lines(snap: &ApplicationState) -> Vec<Line<'static>> {
    let mut lines = vec![
        Line::from(Span::styled(" Customer", Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD))),
        field("Name", snap.customer_name.clone()),
    ];
    if let Some(city) = &snap.customer_city {
        lines.push(field("City", city.clone()));
    }
    if let Some(salary) = snap.customer_salary {
        lines.push(field("Salary", format!("{}/mo", fmt_inr(salary as f64))));
    }
    if let Some(limit) = snap.pre_approved_limit {
        lines.push(field("Pre-approved", fmt_inr(limit as f64)));
    }
    if let Some(score) = snap.credit_score {
        let band = ScoreBand::from_score(score);
        lines.push(Line::from(vec![
            Span::styled(format!(" {:<11}", "Credit"), Style::default().fg(Color::DarkGray)),
            Span::styled(score.to_string(), Style::default().fg(band_color(band)).add_modifier(Modifier::BOLD)),
            Span::styled(format!(" ({})", band_label(band)), Style::default().fg(band_color(band))),
        ]));
    }

    lines.push(Line::raw(""));
    lines.push(Line::from(vec![
        Span::styled(" Application ", Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)),
        Span::styled(snap.application_status.as_str().to_string(), Style::default().fg(Color::Rgb(200, 160, 50))),
    ]));
    if let Some(app) = &snap.loan_application {
        lines.push(field("Amount", fmt_inr(app.loan_amount)));
        if app.tenure_months > 0 {
            lines.push(field("Tenure", format!("{} months", app.tenure_months)));
        }
    }

    lines.push(Line::raw(""));
    for step in snap.progress() {
        let color = step_color(step.status);
        let mut spans = vec![
            Span::styled(format!(" {} ", step_glyph(step.status)), Style::default().fg(color).add_modifier(Modifier::BOLD)),
            Span::styled(step.label, Style::default().fg(color)),
        ];
        if let Some(detail) = step.detail {
            spans.push(Span::styled(format!("  {detail}"), Style::default().fg(Color::DarkGray)));
        }
        lines.push(Line::from(spans));
    }

    if let Some(reference) = snap.sanction_reference() {
        lines.push(Line::raw(""));
        lines.push(Line::from(Span::styled(" ✓ Sanction letter ready", Style::default().fg(Color::Green).add_modifier(Modifier::BOLD))));
        lines.push(field("Ref", reference.to_string()));
        lines.push(Line::from(Span::styled(" d or /download to save", Style::default().fg(Color::Rgb(80, 80, 110)))));
    }
    lines
}

fn draw_status_panel(f: &mut Frame, session: &ChatSession, area: Rect) {
    let block = Block::default()
        .borders(Borders::LEFT)
        .border_style(Style::default().fg(Color::Rgb(40, 40, 60)))
        .title(Span::styled(" Status ", Style::default().fg(Color::Cyan)))
        .style(Style::default().bg(Color::Rgb(10, 10, 18)));

    let lines = match session.mirror().snapshot() {
        Some(snap) => status_lines(&snap),
        None => {
            let mut lines = vec![Line::from(Span::styled(" Loading status…", Style::default().fg(Color::DarkGray)))];
            if let Some(err) = session.mirror().last_error() {
                lines.push(Line::raw(""));
                lines.push(Line::from(Span::styled(format!(" ✗ {err}"), Style::default().fg(Color::Red))));
            }
            lines
        }
    };
    f.render_widget(Paragraph::new(lines).block(block).wrap(Wrap { trim: false }), area);
}

// ── Draw functions ─────────────────────────────────────────────────────────────

pub fn draw_chat(f: &mut Frame, state: &AppState, area: Rect) {
    match &state.chat {
        ChatView::Uninitialized => draw_placeholder(
            f,
            area,
            "No active chat",
            "Pick a customer on [1] Customers and press Enter.",
            Color::DarkGray,
        ),
        ChatView::Invalid(err) => draw_placeholder(
            f,
            area,
            "Invalid Session",
            &format!("{err}. Go back to [1] Customers and start again."),
            Color::Red,
        ),
        ChatView::Active(session) => {
            let cols = Layout::default()
                .direction(Direction::Horizontal)
                .constraints([Constraint::Min(0), Constraint::Length(STATUS_PANEL_WIDTH)])
                .split(area);
            draw_history(f, state, session, cols[0]);
            draw_status_panel(f, session, cols[1]);
        }
    }
}

fn draw_placeholder(f: &mut Frame, area: Rect, title: &str, body: &str, color: Color) {
    let y = area.height.saturating_sub(3) / 2;
    let inner = Rect { x: area.x, y: area.y + y, width: area.width, height: area.height.saturating_sub(y) };
    let lines = vec![
        Line::from(Span::styled(title.to_string(), Style::default().fg(color).add_modifier(Modifier::BOLD))),
        Line::raw(""),
        Line::from(Span::styled(body.to_string(), Style::default().fg(Color::Rgb(120, 120, 150)))),
    ];
    f.render_widget(Paragraph::new(lines).alignment(Alignment::Center).wrap(Wrap { trim: true }), inner);
}

fn draw_history(f: &mut Frame, state: &AppState, session: &ChatSession, area: Rect) {
    let mut all_items = build_items(&session.transcript().all(), area.width);
    if session.dispatcher().is_busy() {
        let (glyph, msg, color) = spinner_frame(state.spinner_tick);
        all_items.push(ListItem::new(Line::from(vec![
            Span::raw("  "),
            Span::styled(glyph, Style::default().fg(color)),
            Span::styled(format!(" {msg}"), Style::default().fg(color).add_modifier(Modifier::ITALIC)),
        ])));
    }
    let total = all_items.len();
    let visible = area.height as usize;

    let skip = if total > visible {
        (total - visible).saturating_sub(state.scroll)
    } else {
        0
    };

    let sliced: Vec<ListItem<'static>> = all_items.into_iter().skip(skip).collect();
    let list = List::new(sliced)
        .block(Block::default().style(Style::default().bg(Color::Rgb(8, 8, 14))));
    f.render_widget(list, area);
}

/// Short phase tag for the status bar.
pub fn phase_tag(phase: SessionPhase) -> (&'static str, Color) {
    match phase {
        SessionPhase::Uninitialized => ("·", Color::DarkGray),
        SessionPhase::Invalid       => ("✗", Color::Red),
        SessionPhase::Loading       => ("…", Color::Yellow),
        SessionPhase::Ready         => ("●", Color::Green),
        SessionPhase::Refreshing    => ("↻", Color::Cyan),
    }
}

// ── Utilities ──────────────────────────────────────────────────────────────────

/// Word-wrap a single line of text to `max_width` columns.
/// Splits on whitespace; never truncates mid-word unless the word alone exceeds max_width.
pub fn wrap_text(text: &str, max_width: usize) -> Vec<String> {
    use unicode_width::UnicodeWidthStr;
    if text.is_empty() {
        return vec![String::new()];
    }
    let mut lines = Vec::new();
    let mut current = String::new();
    let mut current_width = 0usize;

    for word in text.split_whitespace() {
        let word_width = word.width();
        if current_width == 0 {
            // First word on line
            current.push_str(word);
            current_width = word_width;
        } else if current_width + 1 + word_width <= max_width {
            current.push(' ');
            current.push_str(word);
            current_width += 1 + word_width;
        } else {
            lines.push(current.clone());
            current = word.to_string();
            current_width = word_width;
        }
    }
    if !current.is_empty() || lines.is_empty() {
        lines.push(current);
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{SanctionLetter, ApplicationStatus};

    fn text(lines: &[Line]) -> String {
        lines
            .iter()
            .map(|l| l.spans.iter().map(|s| s.content.as_ref()).collect::<String>())
            .collect::<Vec<_>>()
            .join("\n")
    }

    #[test]
    fn test_wrap_text_breaks_on_words() {
        assert_eq!(wrap_text("one two three", 7), ["one two", "three"]);
        assert_eq!(wrap_text("", 10), [""]);
    }

    #[test]
    fn test_status_lines_show_sanction_reference() {
        let snap = ApplicationState {
            customer_name: "Rajesh Kumar".into(),
            credit_score: Some(780),
            pre_approved_limit: Some(500000),
            application_status: ApplicationStatus::SanctionGenerated,
            kyc_verified: true,
            sanction_letter: Some(SanctionLetter {
                sanction_reference: "TC-SL-0042".into(),
                customer_name: "Rajesh Kumar".into(),
                loan_amount: 300000.0,
                interest_rate: 10.5,
                tenure_months: 36,
                emi_amount: 9751.0,
                generated_date: String::new(),
            }),
            ..Default::default()
        };
        let rendered = text(&status_lines(&snap));
        assert!(rendered.contains("₹5,00,000"));
        assert!(rendered.contains("780 (good)"));
        assert!(rendered.contains("✓ Sanction Letter"));
        assert!(rendered.contains("TC-SL-0042"));
    }

    #[test]
    fn test_transcript_items_label_agent() {
        let entries = vec![
            TranscriptEntry::user("hi"),
            TranscriptEntry::assistant("hello there", Some("sales".into())),
        ];
        let items = build_items(&entries, 80);
        // header + body + spacer per entry
        assert_eq!(items.len(), 6);
    }
}
