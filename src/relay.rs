//! Message relay - validates frames crossing the isolation boundary and
//! filters out frames from superseded generations.
//!
//! The generation comparison here is the entire "refresh supersedes in-flight
//! work" mechanism: an abandoned guest cannot be forcibly stopped, but every
//! frame it emits carries the generation that created it and is dropped on
//! arrival once the host has moved on.

use crate::console::{ConsoleEntry, ConsoleKind};
use serde::Deserialize;

/// Wire `type` value for console events. Any other type is rejected.
pub(crate) const CONSOLE_EVENT_TYPE: &str = "console-event";

/// One frame crossing the isolation boundary, tagged at the source with the
/// generation of the load that produced it.
#[derive(Debug)]
pub(crate) struct RelayFrame {
    pub generation: u64,
    pub payload: FramePayload,
}

#[derive(Debug)]
pub(crate) enum FramePayload {
    /// Unparsed wire message emitted by guest script.
    Wire(String),
    /// The guest finished evaluating its document.
    Loaded,
    /// The guest could not be created or its document failed to load.
    LoadFailed(String),
}

/// Host-side effect of an accepted frame.
#[derive(Debug)]
pub(crate) enum RelayUpdate {
    Console(ConsoleEntry),
    Loaded,
    LoadFailed(String),
}

/// Validate a frame against the current generation.
///
/// Returns `None` for stale and malformed frames alike; both are dropped
/// silently (debug-logged, never surfaced to the caller).
pub(crate) fn accept(frame: RelayFrame, current_generation: u64) -> Option<RelayUpdate> {
    if frame.generation != current_generation {
        tracing::debug!(
            frame_generation = frame.generation,
            current_generation,
            "dropping frame from superseded generation"
        );
        return None;
    }

    match frame.payload {
        FramePayload::Loaded => Some(RelayUpdate::Loaded),
        FramePayload::LoadFailed(reason) => Some(RelayUpdate::LoadFailed(reason)),
        FramePayload::Wire(raw) => match parse_wire(&raw) {
            Some(entry) => Some(RelayUpdate::Console(entry)),
            None => {
                tracing::debug!(raw = %raw, "dropping malformed wire message");
                None
            }
        },
    }
}

#[derive(Debug, Deserialize)]
struct WireEvent {
    #[serde(rename = "type")]
    event_type: String,
    kind: String,
    message: String,
}

fn parse_wire(raw: &str) -> Option<ConsoleEntry> {
    let event: WireEvent = serde_json::from_str(raw).ok()?;
    if event.event_type != CONSOLE_EVENT_TYPE {
        return None;
    }
    let kind = ConsoleKind::from_wire(&event.kind)?;
    Some(ConsoleEntry::now(kind, event.message))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wire_frame(generation: u64, raw: &str) -> RelayFrame {
        RelayFrame {
            generation,
            payload: FramePayload::Wire(raw.to_string()),
        }
    }

    #[test]
    fn test_accepts_well_formed_console_event() {
        let frame = wire_frame(3, r#"{"type":"console-event","kind":"log","message":"hi"}"#);
        match accept(frame, 3) {
            Some(RelayUpdate::Console(entry)) => {
                assert_eq!(entry.kind, ConsoleKind::Log);
                assert_eq!(entry.message, "hi");
            }
            other => panic!("expected console update, got {other:?}"),
        }
    }

    #[test]
    fn test_drops_stale_generation() {
        let frame = wire_frame(2, r#"{"type":"console-event","kind":"log","message":"late"}"#);
        assert!(accept(frame, 3).is_none());
    }

    #[test]
    fn test_drops_unknown_type() {
        let frame = wire_frame(1, r#"{"type":"telemetry","kind":"log","message":"x"}"#);
        assert!(accept(frame, 1).is_none());
    }

    #[test]
    fn test_drops_unknown_kind() {
        let frame = wire_frame(1, r#"{"type":"console-event","kind":"debug","message":"x"}"#);
        assert!(accept(frame, 1).is_none());
    }

    #[test]
    fn test_drops_missing_fields() {
        let frame = wire_frame(1, r#"{"type":"console-event","kind":"log"}"#);
        assert!(accept(frame, 1).is_none());

        let frame = wire_frame(1, "not json at all");
        assert!(accept(frame, 1).is_none());
    }

    #[test]
    fn test_control_signals_pass_the_generation_filter() {
        let loaded = RelayFrame {
            generation: 4,
            payload: FramePayload::Loaded,
        };
        assert!(matches!(accept(loaded, 4), Some(RelayUpdate::Loaded)));

        let stale = RelayFrame {
            generation: 3,
            payload: FramePayload::LoadFailed("old".to_string()),
        };
        assert!(accept(stale, 4).is_none());
    }
}
