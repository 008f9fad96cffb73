//! Execution host - owns the lifecycle state machine, the generation
//! counter, and the console buffer.
//!
//! The host runs on a single coordinating control flow. `refresh()` is
//! fire-and-forget: it starts a new guest and returns; the host only reacts
//! to frames arriving on the relay channel, drained non-blockingly by
//! `pump()` (or driven by the async helpers). A refresh issued while a load
//! is in flight supersedes it: the old guest is abandoned, not killed, and
//! its frames fail the generation comparison from then on.

use crate::console::{ConsoleBuffer, ConsoleEntry};
use crate::export::{self, ExportedPreview};
use crate::external::ExternalFetchPolicy;
use crate::policy::{Capability, CapabilityPolicy};
use crate::relay::{self, RelayFrame, RelayUpdate};
use crate::runtime::{spawn_guest, GuestCommand, GuestHandle, RelayHandle};
use crate::synthesize::{synthesize, FragmentSet};
use anyhow::Result;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

/// Externally visible lifecycle state. The only long-lived mutable record
/// the engine keeps between loads, next to the console buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionState {
    Idle,
    Loading,
    Ready,
    Errored,
}

/// Host configuration, fixed for the lifetime of a [`PreviewHost`].
#[derive(Debug, Clone)]
pub struct PreviewConfig {
    pub policy: CapabilityPolicy,
    /// Maximum guest heap in bytes (default: 64MB, None = unlimited).
    pub max_heap_size: Option<usize>,
    /// Cosmetic floor on how long the Loading state stays visible, so very
    /// fast loads don't flicker. Not a correctness mechanism.
    pub min_loading_duration: Duration,
    /// Directory exports are written to.
    pub export_dir: PathBuf,
    /// Origin allowlist for external resource locators (empty = disabled).
    pub external: ExternalFetchPolicy,
    /// Refresh automatically on every fragment change.
    pub auto_run: bool,
    /// Console panel initially open.
    pub console_open: bool,
    /// Minimum visible height for the console panel, in pixels.
    pub console_min_height: u32,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            policy: CapabilityPolicy,
            max_heap_size: Some(64 * 1024 * 1024), // 64MB default
            min_loading_duration: Duration::from_millis(300),
            export_dir: std::env::temp_dir().join("preview-sandbox"),
            external: ExternalFetchPolicy::default(),
            auto_run: true,
            console_open: false,
            console_min_height: 120,
        }
    }
}

/// The live-preview engine.
pub struct PreviewHost {
    config: PreviewConfig,
    fragments: FragmentSet,
    state: ExecutionState,
    generation: u64,
    console: ConsoleBuffer,
    frames_tx: UnboundedSender<RelayFrame>,
    frames_rx: UnboundedReceiver<RelayFrame>,
    guest: Option<GuestHandle>,
    load_error: Option<String>,
    loading_since: Option<Instant>,
    /// Pending Ready transition, gated by the minimum loading duration.
    ready_after: Option<Instant>,
    auto_run: bool,
    fullscreen: bool,
    console_open: bool,
}

impl PreviewHost {
    pub fn new(config: PreviewConfig) -> Self {
        let (frames_tx, frames_rx) = unbounded_channel();
        let auto_run = config.auto_run;
        let console_open = config.console_open;
        Self {
            config,
            fragments: FragmentSet::default(),
            state: ExecutionState::Idle,
            generation: 0,
            console: ConsoleBuffer::default(),
            frames_tx,
            frames_rx,
            guest: None,
            load_error: None,
            loading_since: None,
            ready_after: None,
            auto_run,
            fullscreen: false,
            console_open,
        }
    }

    pub fn state(&self) -> ExecutionState {
        self.state
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn fragments(&self) -> &FragmentSet {
        &self.fragments
    }

    /// Reason for the last load failure, while `Errored`.
    pub fn load_error(&self) -> Option<&str> {
        self.load_error.as_deref()
    }

    /// The fixed capability allow-list the guest runs under.
    pub fn capabilities(&self) -> &'static [Capability] {
        self.config.policy.granted()
    }

    /// Replace the fragment set. In auto-run mode this triggers a refresh.
    pub fn set_fragments(&mut self, fragments: FragmentSet) {
        self.fragments = fragments;
        if self.auto_run {
            self.refresh();
        }
    }

    /// Start a new load cycle: bump the generation, clear the console
    /// buffer, abandon any in-flight guest, and spawn a fresh one.
    pub fn refresh(&mut self) {
        self.generation += 1;
        self.console.clear();
        self.load_error = None;
        self.ready_after = None;
        self.loading_since = Some(Instant::now());
        self.state = ExecutionState::Loading;

        let document = synthesize(&self.fragments);

        // Dropping the old handle closes its command channel; the abandoned
        // guest winds down on its own and its frames are stale from here on.
        self.guest = None;
        let relay = RelayHandle::new(self.generation, self.frames_tx.clone());
        self.guest = Some(spawn_guest(
            document,
            relay,
            self.config.policy,
            self.config.max_heap_size,
            self.config.external.clone(),
        ));

        tracing::debug!(generation = self.generation, "refresh: new load cycle");
    }

    /// Drain every frame currently queued on the relay channel. Non-blocking;
    /// meant to be called from the host UI loop.
    pub fn pump(&mut self) {
        while let Ok(frame) = self.frames_rx.try_recv() {
            self.apply_frame(frame);
        }
        self.apply_pending_ready();
    }

    /// Drive the relay until the current load cycle resolves to `Ready` or
    /// `Errored`. Returns immediately outside a load.
    pub async fn settle(&mut self) {
        self.pump();
        while self.state == ExecutionState::Loading {
            if let Some(at) = self.ready_after {
                tokio::time::sleep_until(tokio::time::Instant::from_std(at)).await;
                self.apply_pending_ready();
                continue;
            }
            match self.frames_rx.recv().await {
                Some(frame) => {
                    self.apply_frame(frame);
                    self.apply_pending_ready();
                }
                None => break,
            }
        }
    }

    /// Process frames for a bounded wall-clock window. Useful for collecting
    /// events produced after load, e.g. by dispatched interactions.
    pub async fn drain_for(&mut self, window: Duration) {
        let deadline = tokio::time::Instant::now() + window;
        loop {
            match tokio::time::timeout_at(deadline, self.frames_rx.recv()).await {
                Ok(Some(frame)) => self.apply_frame(frame),
                Ok(None) | Err(_) => break,
            }
        }
        self.apply_pending_ready();
    }

    fn apply_frame(&mut self, frame: RelayFrame) {
        let Some(update) = relay::accept(frame, self.generation) else {
            return;
        };
        match update {
            RelayUpdate::Console(entry) => {
                tracing::debug!(
                    kind = entry.kind.as_str(),
                    message = %entry.message,
                    "console event"
                );
                self.console.append(entry);
            }
            RelayUpdate::Loaded => {
                let not_before = self
                    .loading_since
                    .map(|since| since + self.config.min_loading_duration)
                    .unwrap_or_else(Instant::now);
                self.ready_after = Some(not_before);
            }
            RelayUpdate::LoadFailed(reason) => {
                tracing::debug!(generation = self.generation, reason = %reason, "load failed");
                self.load_error = Some(reason);
                self.ready_after = None;
                self.state = ExecutionState::Errored;
            }
        }
    }

    fn apply_pending_ready(&mut self) {
        if self.state != ExecutionState::Loading {
            return;
        }
        if let Some(at) = self.ready_after {
            if Instant::now() >= at {
                self.ready_after = None;
                self.state = ExecutionState::Ready;
            }
        }
    }

    // ------------------------------------------------------------------
    // Console
    // ------------------------------------------------------------------

    pub fn console(&self) -> &ConsoleBuffer {
        &self.console
    }

    pub fn console_snapshot(&self) -> Vec<ConsoleEntry> {
        self.console.snapshot()
    }

    pub fn has_error(&self) -> bool {
        self.console.has_error()
    }

    /// Empty the console buffer. Independent of the lifecycle: never touches
    /// the execution state.
    pub fn clear_console(&mut self) {
        self.console.clear();
    }

    // ------------------------------------------------------------------
    // Interaction
    // ------------------------------------------------------------------

    /// Forward a click to the live generation's guest. Inert when the guest
    /// is gone or already superseded.
    pub fn dispatch_click(&self, element_id: &str) {
        let delivered = self
            .guest
            .as_ref()
            .map(|guest| guest.dispatch(GuestCommand::Click(element_id.to_string())))
            .unwrap_or(false);
        if !delivered {
            tracing::warn!(element = %element_id, "click dispatch ignored: no live guest");
        }
    }

    // ------------------------------------------------------------------
    // Export
    // ------------------------------------------------------------------

    /// Package the document the live preview would load right now.
    pub fn export_current(&self) -> Result<ExportedPreview> {
        export::export_document(&synthesize(&self.fragments), &self.config.export_dir)
    }

    // ------------------------------------------------------------------
    // UI-facing toggles
    // ------------------------------------------------------------------

    pub fn toggle_fullscreen(&mut self) -> bool {
        self.fullscreen = !self.fullscreen;
        self.fullscreen
    }

    pub fn is_fullscreen(&self) -> bool {
        self.fullscreen
    }

    pub fn toggle_console_panel(&mut self) -> bool {
        self.console_open = !self.console_open;
        self.console_open
    }

    pub fn console_panel_open(&self) -> bool {
        self.console_open
    }

    pub fn console_min_height(&self) -> u32 {
        self.config.console_min_height
    }

    pub fn set_auto_run(&mut self, auto_run: bool) {
        self.auto_run = auto_run;
    }

    pub fn auto_run(&self) -> bool {
        self.auto_run
    }
}
