//! Guest runtime - executes one synthesized document in a sandboxed V8
//! isolate on a dedicated thread.
//!
//! Provides only the minimal APIs a preview document needs:
//! - console.log/warn/error/info (relayed across the boundary by the shim)
//! - atob, btoa
//! - crypto.randomUUID, crypto.getRandomValues, crypto.subtle.digest
//! - Capability-gated stubs: localStorage, form submit, window.open, modals
//! - No module loading, no fs, no net, no env, no system access
//!
//! Each load cycle gets a fresh isolate, a fresh bootstrap, and a fresh shim
//! installation; nothing leaks across generations. An abandoned guest is not
//! terminated - its command channel closes, it winds down on its own, and
//! anything it still emits is dropped at the relay boundary.

use crate::external::{self, ExternalFetchPolicy};
use crate::loader::DenyAllLoader;
use crate::policy::CapabilityPolicy;
use crate::relay::{FramePayload, RelayFrame};
use crate::synthesize::SynthesizedDocument;
use anyhow::{anyhow, Error};
use deno_core::{op2, JsRuntime, OpState, PollEventLoopOptions, RuntimeOptions};
use std::rc::Rc;
use std::sync::mpsc::{Receiver, Sender};
use tokio::sync::mpsc::UnboundedSender;

/// Channel endpoint held in the isolate's op state. Every frame it emits
/// carries the generation of the load that created it.
#[derive(Debug, Clone)]
pub(crate) struct RelayHandle {
    generation: u64,
    sender: UnboundedSender<RelayFrame>,
}

impl RelayHandle {
    pub(crate) fn new(generation: u64, sender: UnboundedSender<RelayFrame>) -> Self {
        Self { generation, sender }
    }

    pub(crate) fn generation(&self) -> u64 {
        self.generation
    }

    fn send(&self, payload: FramePayload) {
        // A closed channel means the host is gone; the frame would have been
        // dropped as stale anyway.
        let _ = self.sender.send(RelayFrame {
            generation: self.generation,
            payload,
        });
    }

    fn post_wire(&self, raw: &str) {
        self.send(FramePayload::Wire(raw.to_string()));
    }

    fn loaded(&self) {
        self.send(FramePayload::Loaded);
    }

    fn load_failed(&self, reason: String) {
        self.send(FramePayload::LoadFailed(reason));
    }
}

// ============================================================================
// Relay Ops
// ============================================================================

#[op2(fast)]
fn op_relay_post(state: &mut OpState, #[string] raw: &str) {
    if let Some(relay) = state.try_borrow::<RelayHandle>() {
        relay.post_wire(raw);
    }
}

/// The "original console action" behind the shim: guest console output lands
/// in the host's diagnostic log, never in the console buffer.
#[op2(fast)]
fn op_guest_console(#[string] kind: &str, #[string] message: &str) {
    tracing::debug!(target: "preview_sandbox::guest", kind, message, "guest console");
}

// ============================================================================
// Crypto Ops
// ============================================================================

#[op2]
#[string]
fn op_crypto_random_uuid() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[op2(fast)]
fn op_crypto_get_random_values(#[buffer] buf: &mut [u8]) {
    use rand::RngCore;
    rand::thread_rng().fill_bytes(buf);
}

#[op2]
#[buffer]
fn op_crypto_subtle_digest(
    #[string] algorithm: &str,
    #[buffer] data: &[u8],
) -> Result<Vec<u8>, Error> {
    use sha2::{Digest, Sha256, Sha384, Sha512};

    let result = match algorithm.to_uppercase().replace("-", "").as_str() {
        "SHA256" => {
            let mut hasher = Sha256::new();
            hasher.update(data);
            hasher.finalize().to_vec()
        }
        "SHA384" => {
            let mut hasher = Sha384::new();
            hasher.update(data);
            hasher.finalize().to_vec()
        }
        "SHA512" => {
            let mut hasher = Sha512::new();
            hasher.update(data);
            hasher.finalize().to_vec()
        }
        _ => {
            return Err(anyhow!(
                "Unsupported algorithm: {}. Supported: SHA-256, SHA-384, SHA-512",
                algorithm
            ))
        }
    };

    Ok(result)
}

// ============================================================================
// Encoding Ops
// ============================================================================

#[op2]
#[string]
fn op_btoa(#[string] data: &str) -> Result<String, Error> {
    use base64::Engine;
    // btoa expects Latin-1, but we'll be lenient and accept UTF-8
    Ok(base64::engine::general_purpose::STANDARD.encode(data.as_bytes()))
}

#[op2]
#[string]
fn op_atob(#[string] data: &str) -> Result<String, Error> {
    use base64::Engine;
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(data)
        .map_err(|e| anyhow!("Invalid base64: {}", e))?;
    String::from_utf8(bytes).map_err(|e| anyhow!("Invalid UTF-8 in decoded data: {}", e))
}

deno_core::extension!(
    preview_runtime,
    ops = [
        op_relay_post,
        op_guest_console,
        op_crypto_random_uuid,
        op_crypto_get_random_values,
        op_crypto_subtle_digest,
        op_btoa,
        op_atob,
    ],
    esm_entry_point = "ext:preview_runtime/bootstrap.js",
    esm = ["ext:preview_runtime/bootstrap.js" = "src/bootstrap.js"],
);

/// Create a sandboxed isolate for one load cycle.
///
/// The capability policy is consulted exactly here: the bootstrap receives
/// the granted flags and installs only the matching globals before any
/// caller-authored code can run.
fn create_runtime(
    policy: &CapabilityPolicy,
    max_heap_size: Option<usize>,
    relay: RelayHandle,
) -> Result<JsRuntime, Error> {
    let create_params =
        max_heap_size.map(|max_bytes| deno_core::v8::Isolate::create_params().heap_limits(0, max_bytes));

    let mut runtime = JsRuntime::new(RuntimeOptions {
        module_loader: Some(Rc::new(DenyAllLoader)),
        extensions: vec![preview_runtime::init_ops_and_esm()],
        create_params,
        ..Default::default()
    });

    if max_heap_size.is_some() {
        runtime.add_near_heap_limit_callback(|current, initial| {
            // Don't raise the limit - let V8 fail the guest gracefully
            // instead of aborting the host process.
            tracing::warn!(
                current_mb = current / (1024 * 1024),
                initial_mb = initial / (1024 * 1024),
                "guest isolate near heap limit"
            );
            current
        });
    }

    runtime.op_state().borrow_mut().put(relay);

    let init = format!(
        "globalThis.__previewInit__({});",
        policy.bootstrap_flags()
    );
    runtime.execute_script("<preview-init>", init)?;

    Ok(runtime)
}

/// Command sent into a live guest by the host.
#[derive(Debug)]
pub(crate) enum GuestCommand {
    Click(String),
}

/// Host-side handle to one guest generation. Dropping it closes the command
/// channel, which is the only shutdown signal an abandoned guest gets.
pub(crate) struct GuestHandle {
    commands: Sender<GuestCommand>,
}

impl GuestHandle {
    /// Forward a command; returns false if the guest is already gone.
    pub(crate) fn dispatch(&self, command: GuestCommand) -> bool {
        self.commands.send(command).is_ok()
    }
}

/// Spawn the guest thread for one generation. Fire-and-forget: every outcome,
/// including a failure to start at all, comes back over the relay channel.
pub(crate) fn spawn_guest(
    document: SynthesizedDocument,
    relay: RelayHandle,
    policy: CapabilityPolicy,
    max_heap_size: Option<usize>,
    fetch_policy: ExternalFetchPolicy,
) -> GuestHandle {
    let (commands_tx, commands_rx) = std::sync::mpsc::channel();
    let spawn_relay = relay.clone();

    let spawned = std::thread::Builder::new()
        .name(format!("preview-guest-{}", relay.generation()))
        .spawn(move || {
            let event_loop = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(rt) => rt,
                Err(err) => {
                    relay.load_failed(format!("failed to start guest event loop: {err}"));
                    return;
                }
            };
            event_loop.block_on(run_guest(
                document,
                relay,
                policy,
                max_heap_size,
                fetch_policy,
                commands_rx,
            ));
        });

    if let Err(err) = spawned {
        spawn_relay.load_failed(format!("failed to spawn guest thread: {err}"));
    }

    GuestHandle {
        commands: commands_tx,
    }
}

async fn run_guest(
    document: SynthesizedDocument,
    relay: RelayHandle,
    policy: CapabilityPolicy,
    max_heap_size: Option<usize>,
    fetch_policy: ExternalFetchPolicy,
    commands: Receiver<GuestCommand>,
) {
    let text = match &document {
        SynthesizedDocument::Inline(text) => text.clone(),
        SynthesizedDocument::External(locator) => {
            match external::fetch_external(locator, &fetch_policy).await {
                Ok(text) => text,
                Err(err) => {
                    relay.load_failed(format!("external resource load failed: {err:#}"));
                    return;
                }
            }
        }
    };

    let mut runtime = match create_runtime(&policy, max_heap_size, relay.clone()) {
        Ok(runtime) => runtime,
        Err(err) => {
            relay.load_failed(format!("failed to create isolate: {err:#}"));
            return;
        }
    };

    if let Err(err) = evaluate_document(&mut runtime, &text).await {
        relay.load_failed(format!("document evaluation failed: {err:#}"));
        return;
    }

    relay.loaded();

    // Stay alive for interaction dispatch until the host abandons this
    // generation by dropping the command channel.
    while let Ok(command) = commands.recv() {
        match command {
            GuestCommand::Click(element_id) => {
                if let Err(err) = dispatch_click(&mut runtime, &element_id).await {
                    tracing::warn!(
                        element = %element_id,
                        error = %format!("{err:#}"),
                        "click dispatch failed"
                    );
                }
            }
        }
    }

    tracing::debug!(generation = relay.generation(), "guest abandoned, winding down");
}

/// Hand the document to the bootstrap's evaluator. Caller-script exceptions
/// are contained inside the guest; an error here means the load itself
/// failed.
async fn evaluate_document(runtime: &mut JsRuntime, text: &str) -> Result<(), Error> {
    let load = format!(
        "globalThis.__previewLoad__({});",
        serde_json::to_string(text)?
    );
    runtime.execute_script("<preview-load>", load)?;
    runtime
        .run_event_loop(PollEventLoopOptions::default())
        .await?;
    Ok(())
}

async fn dispatch_click(runtime: &mut JsRuntime, element_id: &str) -> Result<(), Error> {
    let dispatch = format!(
        "globalThis.__previewDispatchClick__({});",
        serde_json::to_string(element_id)?
    );
    runtime.execute_script("<preview-dispatch>", dispatch)?;
    runtime
        .run_event_loop(PollEventLoopOptions::default())
        .await?;
    Ok(())
}
