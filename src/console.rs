//! Console buffer - ordered, append-only capture of guest console activity
//! for the current generation.

use std::time::SystemTime;

/// Kind of a captured console event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleKind {
    Log,
    Warn,
    Error,
    Info,
}

impl ConsoleKind {
    /// Parse the wire representation. Anything else is not a console kind.
    pub(crate) fn from_wire(kind: &str) -> Option<Self> {
        match kind {
            "log" => Some(Self::Log),
            "warn" => Some(Self::Warn),
            "error" => Some(Self::Error),
            "info" => Some(Self::Info),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Log => "log",
            Self::Warn => "warn",
            Self::Error => "error",
            Self::Info => "info",
        }
    }
}

/// One captured console event or uncaught error.
#[derive(Debug, Clone)]
pub struct ConsoleEntry {
    pub kind: ConsoleKind,
    pub message: String,
    /// Host arrival time. Ordering in the buffer is arrival order over the
    /// channel, not causal order inside the guest.
    pub captured_at: SystemTime,
}

impl ConsoleEntry {
    pub(crate) fn now(kind: ConsoleKind, message: String) -> Self {
        Self {
            kind,
            message,
            captured_at: SystemTime::now(),
        }
    }
}

/// Append-only event collection for the current generation. Reset at the
/// start of every load; clearable by the caller at any time. Unbounded.
#[derive(Debug, Default)]
pub struct ConsoleBuffer {
    entries: Vec<ConsoleEntry>,
}

impl ConsoleBuffer {
    pub fn append(&mut self, entry: ConsoleEntry) {
        self.entries.push(entry);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn snapshot(&self) -> Vec<ConsoleEntry> {
        self.entries.clone()
    }

    /// True iff any captured entry is an error.
    pub fn has_error(&self) -> bool {
        self.entries
            .iter()
            .any(|entry| entry.kind == ConsoleKind::Error)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(kind: ConsoleKind, message: &str) -> ConsoleEntry {
        ConsoleEntry::now(kind, message.to_string())
    }

    #[test]
    fn test_append_preserves_arrival_order() {
        let mut buffer = ConsoleBuffer::default();
        buffer.append(entry(ConsoleKind::Log, "first"));
        buffer.append(entry(ConsoleKind::Warn, "second"));
        buffer.append(entry(ConsoleKind::Info, "third"));

        let snapshot = buffer.snapshot();
        let messages: Vec<&str> = snapshot.iter().map(|e| e.message.as_str()).collect();
        assert_eq!(messages, vec!["first", "second", "third"]);
    }

    #[test]
    fn test_has_error_tracks_error_entries() {
        let mut buffer = ConsoleBuffer::default();
        buffer.append(entry(ConsoleKind::Log, "fine"));
        assert!(!buffer.has_error());

        buffer.append(entry(ConsoleKind::Error, "boom"));
        assert!(buffer.has_error());

        buffer.clear();
        assert!(!buffer.has_error());
    }

    #[test]
    fn test_clear_empties_the_buffer() {
        let mut buffer = ConsoleBuffer::default();
        buffer.append(entry(ConsoleKind::Log, "something"));
        buffer.clear();
        assert!(buffer.is_empty());
        assert_eq!(buffer.snapshot().len(), 0);
    }
}
