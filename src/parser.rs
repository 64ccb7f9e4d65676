use std::collections::BTreeMap;

use chrono::{DateTime, Local};
use regex::Regex;

use crate::field::Field;

/// Upper bound on bytes buffered while waiting for a line terminator.
pub const DEFAULT_MAX_LINE_LEN: usize = 4096;

const TOKEN_PATTERN: &str = r"^\s*(?P<label>[A-Za-z][A-Za-z0-9 _.]*?)\s*:\s*(?P<value>[-+]?(?:\d+\.?\d*|\.\d+)(?:[eE][-+]?\d+)?)(?P<unit>.*)$";

/// One parsed telemetry line.
#[derive(Clone, Debug)]
pub struct TelemetryFrame {
    pub time: DateTime<Local>,
    pub values: BTreeMap<Field, f64>,
}

impl TelemetryFrame {
    pub fn new(values: BTreeMap<Field, f64>) -> Self {
        TelemetryFrame {
            time: Local::now(),
            values,
        }
    }

    pub fn get(&self, field: Field) -> Option<f64> {
        self.values.get(&field).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Field, f64)> + '_ {
        self.values.iter().map(|(f, v)| (*f, *v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[derive(Clone, Debug)]
pub enum ParseOutcome {
    /// Blank line, nothing to report.
    Empty,
    /// At least one known field was found. `skipped` counts tokens that
    /// were unknown or not numeric.
    Frame {
        frame: TelemetryFrame,
        skipped: usize,
    },
    /// Non-empty line without a single known field.
    Unmatched { line: String },
}

pub struct LineParser {
    token: Regex,
}

impl LineParser {
    pub fn new() -> Self {
        LineParser {
            // The pattern is a constant, so failure here is a programming error.
            token: Regex::new(TOKEN_PATTERN).expect("token pattern is valid"),
        }
    }

    pub fn parse(&self, line: &str) -> ParseOutcome {
        let line = line.trim();
        if line.is_empty() {
            return ParseOutcome::Empty;
        }

        let mut values = BTreeMap::new();
        let mut skipped = 0;

        for token in line.split(',') {
            if token.trim().is_empty() {
                continue;
            }

            let Some(caps) = self.token.captures(token) else {
                skipped += 1;
                continue;
            };

            let Some(field) = Field::from_label(&caps["label"]) else {
                skipped += 1;
                continue;
            };

            match caps["value"].parse::<f64>() {
                Ok(value) => {
                    values.insert(field, value);
                }
                Err(_) => skipped += 1,
            }
        }

        if values.is_empty() {
            log::warn!("Unmatched telemetry line: {line}");
            return ParseOutcome::Unmatched {
                line: line.to_string(),
            };
        }

        ParseOutcome::Frame {
            frame: TelemetryFrame::new(values),
            skipped,
        }
    }
}

impl Default for LineParser {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Assembled {
    Line(String),
    /// A line grew past the limit and was dropped. The rest of it, up to
    /// the next terminator, is dropped too.
    Overflow { discarded: usize },
}

/// Reassembles newline-terminated lines from arbitrarily split byte chunks.
///
/// Bytes are kept undecoded until a full line is available, so multi-byte
/// UTF-8 sequences split across reads decode correctly. Invalid sequences
/// become U+FFFD. A line is limited to `max_len` bytes before its
/// terminator, however it was split.
pub struct LineBuffer {
    pending: Vec<u8>,
    max_len: usize,
    discarding: bool,
}

impl LineBuffer {
    pub fn new(max_len: usize) -> Self {
        LineBuffer {
            pending: Vec::new(),
            max_len,
            discarding: false,
        }
    }

    pub fn push(&mut self, mut bytes: &[u8]) -> Vec<Assembled> {
        let mut out = Vec::new();

        while !bytes.is_empty() {
            let (segment, terminated) = match bytes.iter().position(|&b| b == b'\n') {
                Some(pos) => {
                    let segment = &bytes[..pos];
                    bytes = &bytes[pos + 1..];
                    (segment, true)
                }
                None => (std::mem::take(&mut bytes), false),
            };

            if self.discarding {
                self.discarding = !terminated;
                continue;
            }

            if self.pending.len() + segment.len() > self.max_len {
                out.push(Assembled::Overflow {
                    discarded: self.pending.len() + segment.len(),
                });
                self.pending.clear();
                self.discarding = !terminated;
                continue;
            }

            self.pending.extend_from_slice(segment);
            if terminated {
                let text = String::from_utf8_lossy(&self.pending);
                out.push(Assembled::Line(text.trim_end_matches('\r').to_string()));
                self.pending.clear();
            }
        }

        out
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn clear(&mut self) {
        self.pending.clear();
        self.discarding = false;
    }
}

impl Default for LineBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_LINE_LEN)
    }
}
