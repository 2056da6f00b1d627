//! Event-name derivation for the module bridge.
//!
//! Every module owns an event namespace derived from its name, so that
//! independently authored modules never collide on the shared transport.
//! A request issued on one side of the bridge and answered on the other must
//! arrive at byte-identical names with no shared registry, so derivation is a
//! pure function of `(module, event)`:
//!
//! ```text
//! event_name("updater", "check")           -> "updater__check"
//! response_event_name("updater", "check")  -> "updater__check__response"
//! ```
//!
//! The separator is reserved: module and event names containing `__` are
//! rejected up front. Without that restriction `event_name("a", "b__c")` and
//! `event_name("a__b", "c")` would be indistinguishable on the wire.

use thiserror::Error;

/// Separator placed between the module prefix and the bare event name.
pub const SEPARATOR: &str = "__";

/// Suffix appended to a namespaced name to form the matching response name.
pub const RESPONSE_SUFFIX: &str = "__response";

/// Errors produced by name validation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NamingError {
    /// The module or event name was empty.
    #[error("module and event names must not be empty")]
    Empty,

    /// The name contains the reserved separator sequence.
    #[error("name {0:?} contains the reserved separator {SEPARATOR:?}")]
    ContainsSeparator(String),
}

/// Validates a bare module or event name.
///
/// # Errors
///
/// Returns [`NamingError::Empty`] for the empty string and
/// [`NamingError::ContainsSeparator`] when the name embeds the reserved
/// `__` sequence.
pub fn validate_name(name: &str) -> Result<(), NamingError> {
    if name.is_empty() {
        return Err(NamingError::Empty);
    }
    if name.contains(SEPARATOR) {
        return Err(NamingError::ContainsSeparator(name.to_string()));
    }
    Ok(())
}

/// Derives the namespaced event name for `(module, event)`.
///
/// # Errors
///
/// Returns a [`NamingError`] if either input fails [`validate_name`].
pub fn event_name(module: &str, event: &str) -> Result<String, NamingError> {
    validate_name(module)?;
    validate_name(event)?;
    Ok(format!("{module}{SEPARATOR}{event}"))
}

/// Derives the response event name for `(module, event)`.
///
/// Always distinct from [`event_name`] for the same inputs because the bare
/// event name can never itself end in the suffix (it would contain `__`).
///
/// # Errors
///
/// Returns a [`NamingError`] if either input fails [`validate_name`].
pub fn response_event_name(module: &str, event: &str) -> Result<String, NamingError> {
    Ok(format!("{}{RESPONSE_SUFFIX}", event_name(module, event)?))
}

/// Returns `true` if a namespaced name on the wire is a response name.
pub fn is_response_event(name: &str) -> bool {
    name.len() > RESPONSE_SUFFIX.len() && name.ends_with(RESPONSE_SUFFIX)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_name_joins_module_and_event() {
        // Arrange / Act
        let name = event_name("updater", "check").expect("valid names");

        // Assert
        assert_eq!(name, "updater__check");
    }

    #[test]
    fn test_event_name_is_deterministic() {
        let a = event_name("mod", "evt").unwrap();
        let b = event_name("mod", "evt").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_distinct_modules_produce_distinct_names() {
        // Same bare event under two modules must never collide.
        let a = event_name("m1", "refresh").unwrap();
        let b = event_name("m2", "refresh").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_response_name_differs_from_event_name() {
        let req = event_name("svc", "fetch").unwrap();
        let resp = response_event_name("svc", "fetch").unwrap();
        assert_ne!(req, resp);
        assert_eq!(resp, "svc__fetch__response");
    }

    #[test]
    fn test_response_name_is_pure_function_of_inputs() {
        let a = response_event_name("svc", "fetch").unwrap();
        let b = response_event_name("svc", "fetch").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_empty_module_name_is_rejected() {
        assert_eq!(event_name("", "evt"), Err(NamingError::Empty));
    }

    #[test]
    fn test_empty_event_name_is_rejected() {
        assert_eq!(event_name("mod", ""), Err(NamingError::Empty));
    }

    #[test]
    fn test_name_containing_separator_is_rejected() {
        // "a__b" would make "a__b__c" ambiguous with module "a", event "b__c".
        let result = event_name("a__b", "c");
        assert_eq!(
            result,
            Err(NamingError::ContainsSeparator("a__b".to_string()))
        );
    }

    #[test]
    fn test_event_containing_separator_is_rejected() {
        let result = event_name("a", "b__c");
        assert!(matches!(result, Err(NamingError::ContainsSeparator(_))));
    }

    #[test]
    fn test_single_underscores_are_allowed() {
        // Only the double-underscore sequence is reserved.
        let name = event_name("my_module", "my_event").unwrap();
        assert_eq!(name, "my_module__my_event");
    }

    #[test]
    fn test_is_response_event_detects_suffix() {
        let resp = response_event_name("svc", "fetch").unwrap();
        assert!(is_response_event(&resp));
        assert!(!is_response_event("svc__fetch"));
    }

    #[test]
    fn test_bare_suffix_is_not_a_response_event() {
        // The suffix alone is not a valid derived name.
        assert!(!is_response_event(RESPONSE_SUFFIX));
    }
}
