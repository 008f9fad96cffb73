//! Fixed capability allow-list for the isolated preview context.
//!
//! The list is sealed: these five capabilities are granted, everything else
//! is denied because no code path exists to grant it. The policy is consulted
//! once per load, when the execution host instantiates the guest runtime, to
//! decide which globals the bootstrap installs.

use serde_json::json;

/// A power the isolated context may hold.
///
/// The enum is the whole universe of grantable capabilities; there is no
/// string-based escape hatch and no runtime escalation path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// Evaluate script blocks found in the synthesized document.
    ScriptExecution,
    /// Same-origin storage (`localStorage` / `sessionStorage` stubs).
    SameOriginAccess,
    /// `submit()` on form elements.
    FormSubmission,
    /// `window.open` stub.
    PopupCreation,
    /// `alert` / `confirm` / `prompt` stubs.
    ModalDialogs,
}

const GRANTED: &[Capability] = &[
    Capability::ScriptExecution,
    Capability::SameOriginAccess,
    Capability::FormSubmission,
    Capability::PopupCreation,
    Capability::ModalDialogs,
];

/// The engine's immutable capability policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CapabilityPolicy;

impl CapabilityPolicy {
    /// The fixed allow-list. Identical across every call for the lifetime of
    /// the engine.
    pub const fn granted(&self) -> &'static [Capability] {
        GRANTED
    }

    pub fn is_granted(&self, capability: Capability) -> bool {
        self.granted().contains(&capability)
    }

    /// Flags handed to the guest bootstrap when a runtime is created.
    pub(crate) fn bootstrap_flags(&self) -> serde_json::Value {
        json!({
            "scriptExecution": self.is_granted(Capability::ScriptExecution),
            "sameOriginAccess": self.is_granted(Capability::SameOriginAccess),
            "formSubmission": self.is_granted(Capability::FormSubmission),
            "popupCreation": self.is_granted(Capability::PopupCreation),
            "modalDialogs": self.is_granted(Capability::ModalDialogs),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allow_list_is_fixed() {
        let policy = CapabilityPolicy;
        let first = policy.granted();
        let second = policy.granted();
        assert_eq!(first, second);
        assert_eq!(first.len(), 5);
    }

    #[test]
    fn test_every_declared_capability_is_granted() {
        let policy = CapabilityPolicy;
        assert!(policy.is_granted(Capability::ScriptExecution));
        assert!(policy.is_granted(Capability::SameOriginAccess));
        assert!(policy.is_granted(Capability::FormSubmission));
        assert!(policy.is_granted(Capability::PopupCreation));
        assert!(policy.is_granted(Capability::ModalDialogs));
    }

    #[test]
    fn test_bootstrap_flags_mirror_the_allow_list() {
        let flags = CapabilityPolicy.bootstrap_flags();
        for key in [
            "scriptExecution",
            "sameOriginAccess",
            "formSubmission",
            "popupCreation",
            "modalDialogs",
        ] {
            assert_eq!(flags[key], serde_json::Value::Bool(true), "{key}");
        }
    }
}
