// ============================================================
// Layer 3 — Event Label
// ============================================================
// The ground truth attached to one event-stream sample.
//
// The manifest stores a two-element interval per sample:
//   [-1, -1]   → no mouth event in the window
//   [a,  b]    → event between a and b seconds
//
// The label code is what the CRNN learns to read:
//   no event   → "no"
//   [3.2, 7.9] → "37"   (integer parts concatenated)
//
// Rendered images carry the code in their file name:
//   "{sample_id}&{code}.png"

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Label code used when the interval holds no event
pub const NO_EVENT_CODE: &str = "no";

/// Separates the sample id from the label code in file names
pub const NAME_SEPARATOR: char = '&';

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum EventLabel {
    NoEvent,
    Segment { start: f64, end: f64 },
}

/// Manifest start value of a sample without an event
pub const NO_EVENT_START: f64 = -1.0;

impl EventLabel {
    /// Interpret a manifest interval. A start of exactly `-1` marks "no event".
    pub fn from_interval(interval: [f64; 2]) -> Self {
        if interval[0] == NO_EVENT_START {
            Self::NoEvent
        } else {
            Self::Segment { start: interval[0], end: interval[1] }
        }
    }

    /// The character sequence the model is trained to emit
    pub fn code(&self) -> String {
        match self {
            Self::NoEvent => NO_EVENT_CODE.to_string(),
            Self::Segment { start, end } => {
                format!("{}{}", start.trunc() as i64, end.trunc() as i64)
            }
        }
    }

    /// Segment bounds in seconds, if any
    pub fn segment(&self) -> Option<(f64, f64)> {
        match *self {
            Self::NoEvent => None,
            Self::Segment { start, end } => Some((start, end)),
        }
    }

    /// File name of the rendered image for `sample_id`
    pub fn file_name(&self, sample_id: &str) -> String {
        format!("{sample_id}{NAME_SEPARATOR}{}.png", self.code())
    }
}

impl fmt::Display for EventLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.code())
    }
}

/// Split a rendered image name into `(sample_id, label_code)`.
///
/// Everything after the first `.p` of the code part is dropped,
/// so both `x&37.png` and `x&37.png.bak` yield `"37"`.
pub fn parse_file_name(name: &str) -> Result<(String, String)> {
    let (id, rest) = name
        .split_once(NAME_SEPARATOR)
        .with_context(|| format!("'{name}' has no '{NAME_SEPARATOR}' label separator"))?;

    let code = rest.split(".p").next().unwrap_or(rest);
    if code.is_empty() {
        bail!("'{name}' carries an empty label code");
    }
    Ok((id.to_string(), code.to_string()))
}

/// Per-head class targets for the multi-label trainer.
///
/// A numeric code maps each digit to its class (0..=9); the
/// no-event code maps every head to class 10.
pub fn head_targets(code: &str, heads: usize) -> Result<Vec<usize>> {
    if code == NO_EVENT_CODE {
        return Ok(vec![NO_EVENT_CLASS; heads]);
    }
    let digits: Vec<usize> = code
        .chars()
        .map(|c| {
            c.to_digit(10)
                .map(|d| d as usize)
                .with_context(|| format!("label '{code}' is neither digits nor '{NO_EVENT_CODE}'"))
        })
        .collect::<Result<_>>()?;
    if digits.len() != heads {
        bail!("label '{code}' has {} digits, expected {heads}", digits.len());
    }
    Ok(digits)
}

/// Class shared by every head when there is no event
pub const NO_EVENT_CLASS: usize = 10;

/// Number of classes per head: ten digits plus no-event
pub const HEAD_CLASSES: usize = 11;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minus_one_start_is_no_event() {
        assert_eq!(EventLabel::from_interval([-1.0, -1.0]), EventLabel::NoEvent);
        assert_eq!(EventLabel::from_interval([-1.0, -1.0]).code(), "no");
    }

    #[test]
    fn test_other_negative_start_is_a_segment() {
        let l = EventLabel::from_interval([-0.5, 2.0]);
        assert_eq!(l, EventLabel::Segment { start: -0.5, end: 2.0 });
        assert_eq!(l.code(), "02");
    }

    #[test]
    fn test_segment_code_truncates() {
        let l = EventLabel::from_interval([3.9, 7.2]);
        assert_eq!(l.code(), "37");
        assert_eq!(l.segment(), Some((3.9, 7.2)));
    }

    #[test]
    fn test_file_name_round_trip() {
        let l = EventLabel::from_interval([1.0, 4.0]);
        let name = l.file_name("spk03_take12");
        assert_eq!(name, "spk03_take12&14.png");
        let (id, code) = parse_file_name(&name).unwrap();
        assert_eq!(id, "spk03_take12");
        assert_eq!(code, "14");
    }

    #[test]
    fn test_parse_no_event_name() {
        let (_, code) = parse_file_name("a&no.png").unwrap();
        assert_eq!(code, "no");
    }

    #[test]
    fn test_parse_rejects_missing_separator() {
        assert!(parse_file_name("plain.png").is_err());
        assert!(parse_file_name("x&.png").is_err());
    }

    #[test]
    fn test_head_targets() {
        assert_eq!(head_targets("37", 2).unwrap(), vec![3, 7]);
        assert_eq!(head_targets("no", 2).unwrap(), vec![NO_EVENT_CLASS, NO_EVENT_CLASS]);
        assert!(head_targets("123", 2).is_err());
        assert!(head_targets("x1", 2).is_err());
    }
}
