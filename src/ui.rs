/// UI helpers shared between the TUI and plain-stdout modes.
use crate::state::{ScoreBand, StepStatus};
use crate::transcript::Role;

// ── Glyphs ────────────────────────────────────────────────────────────────────

pub fn role_glyph(role: Role) -> &'static str {
    match role {
        Role::User      => "❯",
        Role::Assistant => "◆",
        Role::System    => "⚠",
    }
}

pub fn step_glyph(status: StepStatus) -> &'static str {
    match status {
        StepStatus::Completed => "✓",
        StepStatus::Pending   => "○",
        StepStatus::Error     => "✗",
    }
}

pub fn band_label(band: ScoreBand) -> &'static str {
    match band {
        ScoreBand::Good => "good",
        ScoreBand::Fair => "fair",
        ScoreBand::Poor => "poor",
    }
}

// ── Amounts ───────────────────────────────────────────────────────────────────

/// Rupee amount with Indian digit grouping: 1234567 → "₹12,34,567".
/// Fractions are rounded to whole rupees.
pub fn fmt_inr(amount: f64) -> String {
    let rounded = amount.round();
    let negative = rounded < 0.0;
    let digits = format!("{}", rounded.abs() as u64);
    let grouped = group_indian(&digits);
    if negative { format!("-₹{grouped}") } else { format!("₹{grouped}") }
}

fn group_indian(digits: &str) -> String {
    if digits.len() <= 3 {
        return digits.to_string();
    }
    let (head, last3) = digits.split_at(digits.len() - 3);
    let mut parts: Vec<&str> = Vec::new();
    let mut end = head.len();
    while end > 2 {
        parts.push(&head[end - 2..end]);
        end -= 2;
    }
    parts.push(&head[..end]);
    parts.reverse();
    format!("{},{last3}", parts.join(","))
}

/// Truncate to `max` chars, appending `…` when cut.
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let cut: String = s.chars().take(max.saturating_sub(1)).collect();
    format!("{cut}…")
}
