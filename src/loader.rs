//! Module loader that refuses every import.
//!
//! Preview documents are self-contained: the capability policy grants no
//! module-loading power, so static and dynamic imports alike are rejected
//! regardless of specifier - no network, no filesystem, no data: URLs.

use deno_core::{
    anyhow::{anyhow, Error},
    ModuleLoadResponse, ModuleLoader, ModuleSpecifier, RequestedModuleType, ResolutionKind,
};

pub(crate) struct DenyAllLoader;

impl ModuleLoader for DenyAllLoader {
    fn resolve(
        &self,
        specifier: &str,
        _referrer: &str,
        _kind: ResolutionKind,
    ) -> Result<ModuleSpecifier, Error> {
        Err(anyhow!(
            "imports are not available in the preview sandbox: {}",
            specifier
        ))
    }

    fn load(
        &self,
        module_specifier: &ModuleSpecifier,
        _maybe_referrer: Option<&ModuleSpecifier>,
        _is_dyn_import: bool,
        _requested_module_type: RequestedModuleType,
    ) -> ModuleLoadResponse {
        // Unreachable through resolve(), but a loader must answer anyway.
        ModuleLoadResponse::Sync(Err(anyhow!(
            "imports are not available in the preview sandbox: {}",
            module_specifier
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_remote_imports() {
        let result = DenyAllLoader.resolve(
            "https://evil.com/payload.js",
            "file:///preview.html",
            ResolutionKind::Import,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_rejects_relative_imports() {
        let result =
            DenyAllLoader.resolve("./helper.js", "file:///preview.html", ResolutionKind::Import);
        assert!(result.is_err());
    }

    #[test]
    fn test_rejects_bare_specifiers() {
        let result = DenyAllLoader.resolve("lodash", "file:///preview.html", ResolutionKind::Import);
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("not available in the preview sandbox"));
    }
}
