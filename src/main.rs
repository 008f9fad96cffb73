//! Preview Sandbox CLI
//!
//! Single-shot mode:
//!   preview-sandbox <script.js> [options]
//!
//! Server mode (persistent process, reads from stdin):
//!   preview-sandbox --server [options]
//!
//! Protocol (server mode):
//!   Request (stdin, one JSON object per line):
//!     {"markup":"<p>hi</p>","script":"console.log('hi')"}
//!
//!   Response (stdout):
//!     Status:Ok
//!     Length:42
//!
//!     [{"kind":"log","message":"hi"}]
//!
//!   Error response:
//!     Status:Error
//!     Length:35
//!
//!     external resource load failed: ...

use anyhow::{anyhow, Result};
use preview_sandbox::{
    ExecutionState, ExportLocation, ExternalFetchPolicy, FragmentSet, PreviewConfig, PreviewHost,
};
use serde::Deserialize;
use std::io::{BufRead, Write};
use std::time::Duration;

fn print_usage() {
    eprintln!("Preview Sandbox - sandboxed live-preview execution engine");
    eprintln!();
    eprintln!("Single-shot mode:");
    eprintln!("  preview-sandbox <script.js> [options]");
    eprintln!();
    eprintln!("Server mode (persistent process):");
    eprintln!("  preview-sandbox --server [options]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --markup <file>        markup fragment");
    eprintln!("  --style <file>         style fragment");
    eprintln!("  --document <file>      full document override (script arg optional)");
    eprintln!("  --external <url>       external resource locator (needs --allow-origin)");
    eprintln!("  --allow-origin <o>     allow an origin for external resources (repeatable)");
    eprintln!("  --export <path>        also write the synthesized document to <path>");
    eprintln!();
    eprintln!("Examples:");
    eprintln!("  preview-sandbox demo.js --markup demo.html --style demo.css");
    eprintln!("  preview-sandbox --external https://demos.example.com/x.html \\");
    eprintln!("      --allow-origin https://demos.example.com");
    eprintln!("  preview-sandbox --server");
}

struct CliOptions {
    script: Option<String>,
    markup: Option<String>,
    style: Option<String>,
    document: Option<String>,
    external: Option<String>,
    allowed_origins: Vec<String>,
    export: Option<String>,
    server: bool,
}

fn parse_args(args: &[String]) -> Result<CliOptions> {
    let mut options = CliOptions {
        script: None,
        markup: None,
        style: None,
        document: None,
        external: None,
        allowed_origins: Vec::new(),
        export: None,
        server: false,
    };

    fn next_value(iter: &mut std::slice::Iter<'_, String>, flag: &str) -> Result<String> {
        iter.next()
            .cloned()
            .ok_or_else(|| anyhow!("{flag} requires a value"))
    }

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--server" => options.server = true,
            "--markup" => options.markup = Some(next_value(&mut iter, "--markup")?),
            "--style" => options.style = Some(next_value(&mut iter, "--style")?),
            "--document" => options.document = Some(next_value(&mut iter, "--document")?),
            "--external" => options.external = Some(next_value(&mut iter, "--external")?),
            "--allow-origin" => options.allowed_origins.push(next_value(&mut iter, "--allow-origin")?),
            "--export" => options.export = Some(next_value(&mut iter, "--export")?),
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            other if other.starts_with("--") => {
                return Err(anyhow!("Unknown option: {other}"));
            }
            other => {
                if options.script.is_some() {
                    return Err(anyhow!("Unexpected extra argument: {other}"));
                }
                options.script = Some(other.to_string());
            }
        }
    }

    Ok(options)
}

fn cli_config(allowed_origins: Vec<String>) -> PreviewConfig {
    PreviewConfig {
        // The anti-flicker floor is pointless without a UI.
        min_loading_duration: Duration::ZERO,
        auto_run: false,
        external: ExternalFetchPolicy { allowed_origins },
        ..Default::default()
    }
}

fn read_fragment(path: &str) -> Result<String> {
    std::fs::read_to_string(path).map_err(|e| anyhow!("Failed to read '{path}': {e}"))
}

fn fragments_from_options(options: &CliOptions) -> Result<FragmentSet> {
    Ok(FragmentSet {
        markup: options.markup.as_deref().map(read_fragment).transpose()?.unwrap_or_default(),
        style: options.style.as_deref().map(read_fragment).transpose()?.unwrap_or_default(),
        script: options.script.as_deref().map(read_fragment).transpose()?.unwrap_or_default(),
        document_override: options.document.as_deref().map(read_fragment).transpose()?,
        external_resource: options.external.clone(),
    })
}

fn print_console(host: &PreviewHost) {
    for entry in host.console_snapshot() {
        eprintln!("[{}] {}", entry.kind.as_str().to_uppercase(), entry.message);
    }
}

/// Run one preview to settlement and print the results.
async fn run_single_shot(options: CliOptions) -> Result<()> {
    let fragments = fragments_from_options(&options)?;

    let mut host = PreviewHost::new(cli_config(options.allowed_origins.clone()));
    host.set_fragments(fragments);
    host.refresh();
    host.settle().await;

    print_console(&host);

    if let Some(export_to) = &options.export {
        let exported = host.export_current()?;
        match &exported.location {
            ExportLocation::File(path) => {
                std::fs::copy(path, export_to)
                    .map_err(|e| anyhow!("Failed to write export to '{export_to}': {e}"))?;
                eprintln!("[preview-sandbox] exported to {export_to}");
            }
            ExportLocation::Remote(url) => {
                eprintln!("[preview-sandbox] external preview, export location: {url}");
            }
        }
    }

    match host.state() {
        ExecutionState::Errored => Err(anyhow!(
            "Load failed: {}",
            host.load_error().unwrap_or("unknown error")
        )),
        _ => {
            // Print the synthesized document to stdout, like the preview pane
            // would receive it.
            if let Some(text) = preview_sandbox::synthesize(host.fragments()).text() {
                println!("{text}");
            }
            Ok(())
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct PreviewRequest {
    #[serde(default)]
    markup: String,
    #[serde(default)]
    style: String,
    #[serde(default)]
    script: String,
    #[serde(default)]
    document: Option<String>,
    #[serde(default)]
    external: Option<String>,
}

impl From<PreviewRequest> for FragmentSet {
    fn from(request: PreviewRequest) -> Self {
        FragmentSet {
            markup: request.markup,
            style: request.style,
            script: request.script,
            document_override: request.document,
            external_resource: request.external,
        }
    }
}

/// Run in server mode (persistent process, one JSON fragment set per line).
async fn run_server(allowed_origins: Vec<String>) -> Result<()> {
    let mut host = PreviewHost::new(cli_config(allowed_origins));

    let stdin = std::io::stdin();
    let mut stdout = std::io::stdout();
    let mut reader = stdin.lock();

    eprintln!("[preview-sandbox] Server ready, reading from stdin...");

    loop {
        let mut line = String::new();
        let bytes_read = reader.read_line(&mut line)?;
        if bytes_read == 0 {
            // EOF - stdin closed, exit gracefully
            break;
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let request: PreviewRequest = match serde_json::from_str(line) {
            Ok(request) => request,
            Err(e) => {
                write_response(&mut stdout, false, &format!("Invalid request JSON: {e}"))?;
                continue;
            }
        };

        host.set_fragments(request.into());
        host.refresh();
        host.settle().await;

        if host.state() == ExecutionState::Errored {
            let reason = host.load_error().unwrap_or("unknown error").to_string();
            write_response(&mut stdout, false, &reason)?;
            continue;
        }

        let entries: Vec<serde_json::Value> = host
            .console_snapshot()
            .iter()
            .map(|entry| {
                serde_json::json!({
                    "kind": entry.kind.as_str(),
                    "message": entry.message,
                })
            })
            .collect();
        write_response(&mut stdout, true, &serde_json::to_string(&entries)?)?;
    }

    eprintln!("[preview-sandbox] Server shutting down");
    Ok(())
}

/// Write response in length-prefixed protocol
fn write_response(stdout: &mut std::io::Stdout, ok: bool, body: &str) -> Result<()> {
    let status = if ok { "Ok" } else { "Error" };

    writeln!(stdout, "Status:{status}")?;
    writeln!(stdout, "Length:{}", body.len())?;
    writeln!(stdout)?; // Empty line separator
    write!(stdout, "{body}")?;
    writeln!(stdout)?;
    stdout.flush()?;

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let options = match parse_args(&args) {
        Ok(options) => options,
        Err(e) => {
            print_usage();
            return Err(e);
        }
    };

    if options.server {
        return run_server(options.allowed_origins).await;
    }

    if options.script.is_none() && options.document.is_none() && options.external.is_none() {
        print_usage();
        return Err(anyhow!("Missing required arguments"));
    }

    run_single_shot(options).await
}
