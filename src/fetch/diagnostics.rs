//! Bounded capture and best-effort classification of fetch tool output

use crate::types::FailureCategory;
use std::collections::VecDeque;

/// Keeps only the last `capacity` bytes of everything pushed into it
#[derive(Debug, Clone)]
pub struct TailBuffer {
    bytes: VecDeque<u8>,
    capacity: usize,
}

impl TailBuffer {
    /// Create a buffer retaining at most `capacity` bytes
    pub fn new(capacity: usize) -> Self {
        Self {
            bytes: VecDeque::with_capacity(capacity.min(64 * 1024)),
            capacity,
        }
    }

    /// Append one line of output (a newline is added)
    pub fn push_line(&mut self, line: &str) {
        self.bytes.extend(line.as_bytes());
        self.bytes.push_back(b'\n');
        let excess = self.bytes.len().saturating_sub(self.capacity);
        self.bytes.drain(..excess);
    }

    /// Whether nothing has been captured
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Captured text; a multi-byte character cut at the front is replaced
    pub fn contents(&self) -> String {
        let (front, back) = self.bytes.as_slices();
        let mut joined = Vec::with_capacity(front.len() + back.len());
        joined.extend_from_slice(front);
        joined.extend_from_slice(back);
        String::from_utf8_lossy(&joined).into_owned()
    }
}

/// Substrings (all must appear, case-sensitive) that identify a failure.
///
/// This is a narrow heuristic over free-form tool output and may misclassify;
/// anything unmatched is [`FailureCategory::Unknown`]. Do not add markers the
/// fetch tool does not print.
const MARKERS: &[(&[&str], FailureCategory)] =
    &[(&["Episode", "not found"], FailureCategory::EpisodeNotFound)];

/// Map captured diagnostics to a user-facing failure category
pub fn classify(diagnostics: &str) -> FailureCategory {
    MARKERS
        .iter()
        .find(|(needles, _)| needles.iter().all(|n| diagnostics.contains(n)))
        .map(|(_, category)| *category)
        .unwrap_or(FailureCategory::Unknown)
}
