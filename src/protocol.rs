//! Token Protocol shared by the instrumenter and the result interpreter.
//!
//! Markers are written inline into the candidate program's stdout. Every
//! marker kind is described once as a list of [`Segment`]s; the language
//! generators render those segments into C/C++ emission code and the scanner
//! below matches stdout against the very same segments.

use std::fmt;

/// Literal prefix shared by every marker.
pub const PREFIX: &str = "AASP";

/// Width the instrumented program zero-pads microsecond fields to.
///
/// Markers are not newline terminated, so a trailing numeric field is read
/// for at most this many digits to keep candidate digits printed right after
/// a marker out of it.
pub const MICROS_WIDTH: usize = 16;

/// Upper bound on digits for the other numeric fields (`u64::MAX` has 20).
const MAX_DIGITS: usize = 20;

pub const SUFFICIENT: &str = "SUFFICIENT";
pub const INSUFFICIENT: &str = "INSUFFICIENT";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerKind {
    Count,
    Started,
    Ended,
    Elapsed,
}

impl MarkerKind {
    pub const ALL: [MarkerKind; 4] = [
        MarkerKind::Count,
        MarkerKind::Started,
        MarkerKind::Ended,
        MarkerKind::Elapsed,
    ];

    /// The wire grammar of this kind
    pub fn template(self) -> Vec<Segment> {
        use Segment::*;

        match self {
            MarkerKind::Count => vec![
                Literal(format!("{PREFIX}_")),
                Field(FieldKind::Count),
                Literal("_THREADS_CREATED_".to_string()),
                Field(FieldKind::Sufficiency),
            ],
            MarkerKind::Started => vec![
                Literal(format!("{PREFIX}_STARTED_THREAD_")),
                Field(FieldKind::ThreadId),
                Literal("_".to_string()),
                Field(FieldKind::Micros),
            ],
            MarkerKind::Ended => vec![
                Literal(format!("{PREFIX}_ENDED_THREAD_")),
                Field(FieldKind::ThreadId),
                Literal("_".to_string()),
                Field(FieldKind::Micros),
            ],
            MarkerKind::Elapsed => vec![
                Literal(format!("{PREFIX}_ELAPSED_THREAD_")),
                Field(FieldKind::ThreadId),
                Literal("_".to_string()),
                Field(FieldKind::Micros),
            ],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Literal(String),
    Field(FieldKind),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Running number of threads created so far
    Count,
    /// Either [`SUFFICIENT`] or [`INSUFFICIENT`]
    Sufficiency,
    /// Logical id handed out by the create wrapper, starting at 1
    ThreadId,
    /// Microseconds, zero-padded to [`MICROS_WIDTH`]
    Micros,
}

/// A decoded marker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Marker {
    Count { created: u64, sufficient: bool },
    ThreadStart { thread_id: u64, micros: u64 },
    ThreadEnd { thread_id: u64, micros: u64 },
    ThreadElapsed { thread_id: u64, micros: u64 },
}

impl Marker {
    /// The marker every instrumented program prints on entry
    pub const BASELINE: Marker = Marker::Count {
        created: 0,
        sufficient: false,
    };

    pub fn kind(&self) -> MarkerKind {
        match self {
            Marker::Count { .. } => MarkerKind::Count,
            Marker::ThreadStart { .. } => MarkerKind::Started,
            Marker::ThreadEnd { .. } => MarkerKind::Ended,
            Marker::ThreadElapsed { .. } => MarkerKind::Elapsed,
        }
    }

    fn from_fields(kind: MarkerKind, numbers: &[u64], sufficiency: Option<bool>) -> Option<Self> {
        let marker = match kind {
            MarkerKind::Count => Marker::Count {
                created: *numbers.first()?,
                sufficient: sufficiency?,
            },
            MarkerKind::Started => Marker::ThreadStart {
                thread_id: *numbers.first()?,
                micros: *numbers.get(1)?,
            },
            MarkerKind::Ended => Marker::ThreadEnd {
                thread_id: *numbers.first()?,
                micros: *numbers.get(1)?,
            },
            MarkerKind::Elapsed => Marker::ThreadElapsed {
                thread_id: *numbers.first()?,
                micros: *numbers.get(1)?,
            },
        };
        Some(marker)
    }
}

impl fmt::Display for Marker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (count, sufficient, thread_id, micros) = match *self {
            Marker::Count {
                created,
                sufficient,
            } => (created, sufficient, 0, 0),
            Marker::ThreadStart { thread_id, micros }
            | Marker::ThreadEnd { thread_id, micros }
            | Marker::ThreadElapsed { thread_id, micros } => (0, false, thread_id, micros),
        };

        for segment in self.kind().template() {
            match segment {
                Segment::Literal(text) => f.write_str(&text)?,
                Segment::Field(FieldKind::Count) => write!(f, "{count}")?,
                Segment::Field(FieldKind::Sufficiency) => {
                    f.write_str(if sufficient { SUFFICIENT } else { INSUFFICIENT })?
                }
                Segment::Field(FieldKind::ThreadId) => write!(f, "{thread_id}")?,
                Segment::Field(FieldKind::Micros) => {
                    write!(f, "{micros:0width$}", width = MICROS_WIDTH)?
                }
            }
        }
        Ok(())
    }
}

/// A marker located in a piece of text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarkerMatch {
    /// Byte offset of the first character
    pub start: usize,
    /// Byte offset one past the last character
    pub end: usize,
    pub marker: Marker,
}

/// Finds all non-overlapping markers, left to right, in emission order.
///
/// Text that merely looks like the prefix is skipped; this never fails.
pub fn scan(text: &str) -> Vec<MarkerMatch> {
    let templates: Vec<(MarkerKind, Vec<Segment>)> = MarkerKind::ALL
        .iter()
        .map(|&kind| (kind, kind.template()))
        .collect();

    let mut found = Vec::new();
    let mut cursor = 0;

    while let Some(offset) = text[cursor..].find(PREFIX) {
        let start = cursor + offset;
        let matched = templates
            .iter()
            .find_map(|(kind, template)| match_template(text, start, *kind, template));

        match matched {
            Some((end, marker)) => {
                found.push(MarkerMatch { start, end, marker });
                cursor = end;
            }
            None => cursor = start + PREFIX.len(),
        }
    }

    found
}

/// Decoded markers only, in emission order
pub fn markers(text: &str) -> Vec<Marker> {
    scan(text).into_iter().map(|m| m.marker).collect()
}

/// Removes every marker from `text`, leaving surrounding output untouched.
///
/// Removal is repeated until no marker remains, so the result never contains
/// a marker even if two fragments around a removed marker join into one.
pub fn strip(text: &str) -> String {
    let mut current = text.to_string();

    loop {
        let matches = scan(&current);
        if matches.is_empty() {
            return current;
        }

        let mut cleaned = String::with_capacity(current.len());
        let mut last = 0;
        for m in &matches {
            cleaned.push_str(&current[last..m.start]);
            last = m.end;
        }
        cleaned.push_str(&current[last..]);
        current = cleaned;
    }
}

/// Whether `stdout` opens with the baseline marker printed at program entry
pub fn starts_with_baseline(stdout: &str) -> bool {
    scan(stdout)
        .first()
        .is_some_and(|m| m.start == 0 && m.marker == Marker::BASELINE)
}

fn match_template(
    text: &str,
    start: usize,
    kind: MarkerKind,
    template: &[Segment],
) -> Option<(usize, Marker)> {
    let bytes = text.as_bytes();
    let mut pos = start;
    let mut numbers = Vec::with_capacity(2);
    let mut sufficiency = None;

    for segment in template {
        match segment {
            Segment::Literal(literal) => {
                if !text[pos..].starts_with(literal.as_str()) {
                    return None;
                }
                pos += literal.len();
            }
            Segment::Field(FieldKind::Sufficiency) => {
                if text[pos..].starts_with(INSUFFICIENT) {
                    sufficiency = Some(false);
                    pos += INSUFFICIENT.len();
                } else if text[pos..].starts_with(SUFFICIENT) {
                    sufficiency = Some(true);
                    pos += SUFFICIENT.len();
                } else {
                    return None;
                }
            }
            Segment::Field(field) => {
                let limit = match field {
                    FieldKind::Micros => MICROS_WIDTH,
                    _ => MAX_DIGITS,
                };
                let digits = bytes[pos..]
                    .iter()
                    .take(limit)
                    .take_while(|b| b.is_ascii_digit())
                    .count();
                if digits == 0 {
                    return None;
                }
                let value = text[pos..pos + digits].parse::<u64>().ok()?;
                numbers.push(value);
                pos += digits;
            }
        }
    }

    Marker::from_fields(kind, &numbers, sufficiency).map(|marker| (pos, marker))
}
