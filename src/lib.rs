//! # Preview Sandbox
//!
//! A sandboxed live-preview execution engine built on deno_core.
//!
//! Caller-supplied markup, style, and script fragments (or a full custom
//! document, or an external resource locator) are composed into one
//! executable document and run inside an isolated V8 context on a dedicated
//! thread. Console activity and uncaught errors stream back to the host over
//! an asynchronous, generation-tagged message channel.
//!
//! ## Security Guarantees
//!
//! - **Fixed capability allow-list**: script execution, same-origin storage,
//!   form submission, popups, modal dialogs - everything else is denied and
//!   there is no runtime escalation path
//! - **No module loading**: static and dynamic imports are rejected
//! - **No filesystem access**: the guest has no file ops
//! - **No network access from the guest**: external resources are fetched by
//!   the host under an origin allowlist
//! - **No environment access**: `process.env`, `Deno.env` don't exist
//! - **Soft cancellation**: a superseded load may keep running, but its
//!   output is dropped at the relay boundary by generation comparison
//!
//! ## Usage
//!
//! ```rust,ignore
//! use preview_sandbox::{FragmentSet, PreviewConfig, PreviewHost};
//!
//! #[tokio::main]
//! async fn main() {
//!     let mut host = PreviewHost::new(PreviewConfig::default());
//!     host.set_fragments(FragmentSet {
//!         markup: "<button id=\"go\">Go</button>".into(),
//!         script: "console.log('hello from the preview')".into(),
//!         ..Default::default()
//!     });
//!     host.settle().await;
//!     for entry in host.console_snapshot() {
//!         println!("[{}] {}", entry.kind.as_str(), entry.message);
//!     }
//! }
//! ```

mod console;
mod export;
mod external;
mod host;
mod loader;
mod policy;
mod relay;
mod runtime;
mod synthesize;

pub use console::{ConsoleBuffer, ConsoleEntry, ConsoleKind};
pub use export::{ExportLocation, ExportedPreview};
pub use external::ExternalFetchPolicy;
pub use host::{ExecutionState, PreviewConfig, PreviewHost};
pub use policy::{Capability, CapabilityPolicy};
pub use synthesize::{synthesize, FragmentSet, SynthesizedDocument};
