use std::collections::VecDeque;

/// Upper bound on how many entries a single `history` listing shows.
pub const DISPLAY_LIMIT: usize = 10;

/// Bounded log of accepted input lines, most recent last.
///
/// Consecutive duplicates collapse into one entry, and once `capacity` is
/// reached every new entry evicts the oldest one.
#[derive(Debug, Clone)]
pub struct History {
    entries: VecDeque<String>,
    capacity: usize,
}

impl History {
    /// Create an empty log. A capacity of zero is bumped to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a line unless it repeats the most recent entry.
    pub fn push(&mut self, line: impl Into<String>) {
        let line = line.into();
        if self.entries.back() == Some(&line) {
            return;
        }
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(line);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The last `min(n, DISPLAY_LIMIT)` entries paired with their 1-based
    /// position in the log, oldest first.
    pub fn tail(&self, n: usize) -> impl Iterator<Item = (usize, &str)> {
        let shown = n.min(DISPLAY_LIMIT).min(self.entries.len());
        let skip = self.entries.len() - shown;
        self.entries
            .iter()
            .enumerate()
            .skip(skip)
            .map(|(i, line)| (i + 1, line.as_str()))
    }
}

/// Render one listing line: zero-padded ordinal, a space, the text.
pub fn format_entry(ordinal: usize, line: &str) -> String {
    format!("{ordinal:03} {line}")
}
