//! Line codec for the history log
//!
//! One channel is one line: samples joined by [`FIELD_DELIMITER`] and
//! terminated by [`RECORD_TERMINATOR`], oldest sample first.

use std::collections::VecDeque;

/// Separates samples within a line
pub const FIELD_DELIMITER: char = '|';

/// Terminates every encoded line
pub const RECORD_TERMINATOR: char = '\n';

/// Splits an encoded line into its fields
///
/// Any line terminator is ignored, and a single trailing empty field (left
/// by a trailing delimiter) is dropped. An empty line decodes to no fields.
pub fn parse_line(line: &str) -> Vec<String> {
    let line = line.trim_end_matches(['\n', '\r']);
    let mut fields: Vec<String> = line.split(FIELD_DELIMITER).map(str::to_string).collect();
    if fields.last().is_some_and(|field| field.is_empty()) {
        fields.pop();
    }
    fields
}

/// Joins fields into a terminated line
pub fn encode_line<S: AsRef<str>>(fields: &[S]) -> String {
    let mut line = fields
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<&str>>()
        .join(FIELD_DELIMITER.to_string().as_str());
    line.push(RECORD_TERMINATOR);
    line
}

/// Checks that a sample can be stored as a single field
///
/// Returns the reason the value is unencodable, if any.
pub fn validate_field(value: &str) -> Result<(), String> {
    // An empty newest field would read back as a trailing delimiter.
    if value.is_empty() {
        return Err("is empty".to_string());
    }
    if value.contains(FIELD_DELIMITER) {
        return Err(format!("contains the field delimiter '{}'", FIELD_DELIMITER));
    }
    if value.contains(['\n', '\r']) {
        return Err("contains a line break".to_string());
    }
    Ok(())
}

/// Fixed-capacity FIFO of samples for one channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryWindow {
    capacity: usize,
    fields: VecDeque<String>,
}

impl HistoryWindow {
    /// An empty window
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            fields: VecDeque::with_capacity(capacity),
        }
    }

    /// Rebuilds a window from stored fields
    ///
    /// Keeps only the newest `capacity` fields; returns how many were
    /// dropped so the caller can report an over-long line.
    pub fn from_fields(capacity: usize, fields: Vec<String>) -> (Self, usize) {
        let mut fields = VecDeque::from(fields);
        let mut trimmed = 0;
        while fields.len() > capacity {
            fields.pop_front();
            trimmed += 1;
        }
        (Self { capacity, fields }, trimmed)
    }

    /// Decodes a stored line into a window
    pub fn decode(capacity: usize, line: &str) -> (Self, usize) {
        Self::from_fields(capacity, parse_line(line))
    }

    /// Appends the newest sample, evicting the oldest when full
    ///
    /// Returns the evicted sample.
    pub fn push(&mut self, value: String) -> Option<String> {
        if self.capacity == 0 {
            return Some(value);
        }
        let evicted = if self.fields.len() >= self.capacity {
            self.fields.pop_front()
        } else {
            None
        };
        self.fields.push_back(value);
        evicted
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.fields.len() >= self.capacity
    }

    /// Samples, oldest first
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(String::as_str)
    }

    pub fn into_fields(self) -> Vec<String> {
        self.fields.into()
    }

    /// Encodes the window as a terminated line
    pub fn encode(&self) -> String {
        let fields: Vec<&str> = self.iter().collect();
        encode_line(&fields)
    }
}
