//! Raw confidence extraction from generated answers.

/// Confidence assumed when the backend reports none.
pub const NEUTRAL_CONFIDENCE: f32 = 0.5;

/// Bare values up to this bound are overshooting fractions, clamped to 1.
/// Larger bare values are percentages.
const FRACTION_OVERSHOOT: f32 = 1.5;

/// Split a trailing `Confidence: <value>` line off `text`.
///
/// Accepts fractions (`0.8`) and percentages (`80%` or `80`). A bare value
/// just above 1 (`1.2`) is read as a fraction and clamped. Returns the answer
/// without the trailer and the parsed value, if any.
pub fn split_confidence_trailer(text: &str) -> (String, Option<f32>) {
    let trimmed = text.trim_end();
    let (body, last_line) = match trimmed.rfind('\n') {
        Some(pos) => (&trimmed[..pos], &trimmed[pos + 1..]),
        None => ("", trimmed),
    };

    match parse_trailer(last_line) {
        Some(value) => (body.trim_end().to_string(), Some(value)),
        None => (trimmed.to_string(), None),
    }
}

fn parse_trailer(line: &str) -> Option<f32> {
    let line = line.trim().trim_start_matches(['*', '_']).trim();
    let (label, rest) = line.split_once(':')?;
    if !label.trim().eq_ignore_ascii_case("confidence") {
        return None;
    }

    let rest = rest.trim().trim_end_matches(['*', '_', '.']).trim();
    let (number, percent) = match rest.strip_suffix('%') {
        Some(n) => (n.trim(), true),
        None => (rest, false),
    };

    let value: f32 = number.parse().ok()?;
    if !value.is_finite() || value < 0.0 {
        return None;
    }

    if percent || value > FRACTION_OVERSHOOT {
        (value <= 100.0).then_some(value / 100.0)
    } else {
        Some(value.min(1.0))
    }
}
