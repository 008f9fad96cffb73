//! Document synthesizer - composes caller fragments into the single
//! executable artifact for one load cycle.
//!
//! Synthesis is pure and total: the same fragment set always yields the same
//! document, and no input can make it fail. Source selection follows a fixed
//! priority: external resource, then full-document override, then fragment
//! composition. Only the first matching path is consulted.

/// Interception shim injected ahead of caller script.
const SHIM: &str = include_str!("shim.js");

/// Caller-supplied fragments for one preview.
///
/// The fragment set is owned and mutated by the caller; the engine only ever
/// reads it at synthesis time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FragmentSet {
    pub markup: String,
    pub style: String,
    pub script: String,
    /// Complete caller-authored document. Takes precedence over the three
    /// fragments; the shim and guarded script block are still injected so the
    /// document gets instrumented.
    pub document_override: Option<String>,
    /// Remote document source. Takes precedence over everything else and is
    /// used verbatim: the host cannot instrument content it does not author,
    /// so no shim is injected.
    pub external_resource: Option<String>,
}

/// The executable artifact for one load cycle.
///
/// Ephemeral by design: rebuilt on every refresh, owned by the execution
/// host for the duration of one load, never persisted by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SynthesizedDocument {
    /// Document text authored or instrumented by the synthesizer.
    Inline(String),
    /// Remote document source, never instrumented.
    External(String),
}

impl SynthesizedDocument {
    pub fn is_external(&self) -> bool {
        matches!(self, Self::External(_))
    }

    /// Inline document text, if this document was synthesized locally.
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Inline(text) => Some(text),
            Self::External(_) => None,
        }
    }
}

/// Build the document for a fragment set. Deterministic for a given input.
pub fn synthesize(fragments: &FragmentSet) -> SynthesizedDocument {
    if let Some(locator) = &fragments.external_resource {
        return SynthesizedDocument::External(locator.clone());
    }

    let instrumented = instrumentation_block(&fragments.script);

    if let Some(document) = &fragments.document_override {
        return SynthesizedDocument::Inline(inject_before_close(document, &instrumented));
    }

    SynthesizedDocument::Inline(format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<style>\n{style}\n</style>\n</head>\n<body>\n{markup}\n{instrumented}</body>\n</html>\n",
        style = fragments.style,
        markup = fragments.markup,
    ))
}

/// The shim, then the caller script wrapped in a guarded call. A throw inside
/// the guard becomes exactly one relayed error entry instead of aborting
/// document evaluation.
fn instrumentation_block(script: &str) -> String {
    format!(
        "<script>\n{SHIM}\n</script>\n<script>\ntry {{\n{script}\n}} catch (err) {{\n  globalThis.__previewOnError__(err && err.message ? err.message : String(err), \"inline script\");\n}}\n</script>\n"
    )
}

/// Insert the instrumentation block immediately before the document close.
/// Falls back to appending when the override has no recognizable close tag.
fn inject_before_close(document: &str, block: &str) -> String {
    let lower = document.to_ascii_lowercase();
    let insert_at = lower.rfind("</body>").or_else(|| lower.rfind("</html>"));

    match insert_at {
        Some(index) => {
            let mut out = String::with_capacity(document.len() + block.len());
            out.push_str(&document[..index]);
            out.push_str(block);
            out.push_str(&document[index..]);
            out
        }
        None => {
            let mut out = String::with_capacity(document.len() + block.len() + 1);
            out.push_str(document);
            out.push('\n');
            out.push_str(block);
            out
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_synthesis_is_deterministic() {
        let fragments = FragmentSet {
            markup: "<p>hello</p>".to_string(),
            style: "p { color: red; }".to_string(),
            script: "console.log('hi')".to_string(),
            ..Default::default()
        };
        assert_eq!(synthesize(&fragments), synthesize(&fragments));
    }

    #[test]
    fn test_fragment_composition_orders_shim_before_script() {
        let fragments = FragmentSet {
            markup: "<p>m</p>".to_string(),
            style: "p {}".to_string(),
            script: "console.log('caller')".to_string(),
            ..Default::default()
        };
        let document = synthesize(&fragments);
        let text = document.text().expect("inline document");

        let shim_at = text.find("__previewOnError__").expect("shim present");
        let script_at = text.find("console.log('caller')").expect("script present");
        let markup_at = text.find("<p>m</p>").expect("markup present");
        assert!(markup_at < shim_at);
        assert!(shim_at < script_at);
    }

    #[test]
    fn test_external_resource_wins_and_is_never_instrumented() {
        let fragments = FragmentSet {
            markup: "<p>ignored</p>".to_string(),
            script: "console.log('ignored')".to_string(),
            document_override: Some("<html>ignored</html>".to_string()),
            external_resource: Some("https://example.com/demo.html".to_string()),
            ..Default::default()
        };
        let document = synthesize(&fragments);
        assert!(document.is_external());
        assert_eq!(
            document,
            SynthesizedDocument::External("https://example.com/demo.html".to_string())
        );
    }

    #[test]
    fn test_override_wins_over_fragments_and_still_gets_the_shim() {
        let fragments = FragmentSet {
            markup: "<p>ignored</p>".to_string(),
            document_override: Some(
                "<html><body><h1>custom</h1></body></html>".to_string(),
            ),
            ..Default::default()
        };
        let text = synthesize(&fragments).text().unwrap().to_string();

        assert!(text.contains("<h1>custom</h1>"));
        assert!(!text.contains("<p>ignored</p>"));
        let shim_at = text.find("__previewOnError__").expect("shim injected");
        let close_at = text.rfind("</body>").unwrap();
        assert!(shim_at < close_at, "shim sits before the document close");
    }

    #[test]
    fn test_override_without_close_tag_appends_instrumentation() {
        let fragments = FragmentSet {
            document_override: Some("<h1>bare</h1>".to_string()),
            ..Default::default()
        };
        let text = synthesize(&fragments).text().unwrap().to_string();
        let content_at = text.find("<h1>bare</h1>").unwrap();
        let shim_at = text.find("__previewOnError__").unwrap();
        assert!(content_at < shim_at);
    }

    #[test]
    fn test_empty_fragment_set_still_synthesizes() {
        let document = synthesize(&FragmentSet::default());
        let text = document.text().unwrap();
        assert!(text.starts_with("<!DOCTYPE html>"));
        assert!(text.contains("__previewOnError__"));
    }
}
