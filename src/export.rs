//! Export pathway - packages the current synthesized document as a
//! standalone retrievable resource.
//!
//! The export is built by the same synthesizer call over the same fragment
//! set as the live preview, so it reflects the same source-selection rules.
//! Opening an export re-executes the script from scratch; carrying runtime
//! state over from the live preview is an explicit non-goal.

use crate::synthesize::SynthesizedDocument;
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Where an export ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportLocation {
    /// Inline document written to the local filesystem.
    File(PathBuf),
    /// External resource previews export as the remote location itself.
    Remote(String),
}

/// Handle to one exported preview.
#[derive(Debug, Clone)]
pub struct ExportedPreview {
    pub location: ExportLocation,
}

impl ExportedPreview {
    pub fn path(&self) -> Option<&Path> {
        match &self.location {
            ExportLocation::File(path) => Some(path),
            ExportLocation::Remote(_) => None,
        }
    }
}

pub(crate) fn export_document(
    document: &SynthesizedDocument,
    export_dir: &Path,
) -> Result<ExportedPreview> {
    match document {
        SynthesizedDocument::External(locator) => Ok(ExportedPreview {
            location: ExportLocation::Remote(locator.clone()),
        }),
        SynthesizedDocument::Inline(text) => {
            fs::create_dir_all(export_dir).with_context(|| {
                format!("failed to create export directory '{}'", export_dir.display())
            })?;
            let path = export_dir.join(format!("preview-{}.html", uuid::Uuid::new_v4()));
            fs::write(&path, text)
                .with_context(|| format!("failed to write export '{}'", path.display()))?;
            Ok(ExportedPreview {
                location: ExportLocation::File(path),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_repeated_export_is_byte_identical() {
        let dir = tempdir().unwrap();
        let document = SynthesizedDocument::Inline("<html><body>demo</body></html>".to_string());

        let first = export_document(&document, dir.path()).unwrap();
        let second = export_document(&document, dir.path()).unwrap();

        let first_path = first.path().unwrap();
        let second_path = second.path().unwrap();
        assert_ne!(first_path, second_path);
        assert_eq!(
            fs::read(first_path).unwrap(),
            fs::read(second_path).unwrap()
        );
    }

    #[test]
    fn test_external_document_exports_as_remote_location() {
        let dir = tempdir().unwrap();
        let document = SynthesizedDocument::External("https://example.com/demo.html".to_string());

        let exported = export_document(&document, dir.path()).unwrap();
        assert_eq!(
            exported.location,
            ExportLocation::Remote("https://example.com/demo.html".to_string())
        );
        assert!(exported.path().is_none());
    }
}
