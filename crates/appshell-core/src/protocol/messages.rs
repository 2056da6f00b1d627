//! Wire frame types and the shared event-name constants.
//!
//! A bridge frame is one JSON object carried as a WebSocket text frame:
//!
//! ```json
//! { "event": "updater__check", "args": [ { "channel": "stable" } ] }
//! ```
//!
//! `args` is an ordered list of arbitrary JSON values. The bridge forwards
//! arguments without interpreting them; typing the payload is the business of
//! the module that owns the event.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::naming;

/// The bootstrap event: module `bridge`, event `ready`.
///
/// The renderer emits this exact frame, with no arguments, as the very first
/// frame of every connection. The host uses it to capture its renderer
/// reference before any application event can need one.
pub const BOOTSTRAP_EVENT_NAME: &str = "bridge__ready";

/// Module name the bootstrap event is derived from.
pub const BOOTSTRAP_MODULE: &str = "bridge";

/// Bare event name the bootstrap event is derived from.
pub const BOOTSTRAP_EVENT: &str = "ready";

/// Event names of the update signalling channel.
///
/// These are pass-through signals for the external updater: the bridge
/// forwards them and never interprets the payload.
pub mod update_events {
    /// Module owning the update channel namespace.
    pub const MODULE: &str = "appUpdater";
    /// Renderer → host: ask the updater collaborator to check for updates.
    pub const CHECK_FOR_UPDATES: &str = "checkForUpdates";
    /// Host → renderer: a new bundle version is downloaded and ready.
    pub const NEW_VERSION_READY: &str = "onNewVersionReady";
    /// Host → renderer: the updater reported an error.
    pub const UPDATE_ERROR: &str = "error";
    /// Host → renderer: superseded bundle versions were removed from disk.
    pub const VERSIONS_CLEANED_UP: &str = "onVersionsCleanedUp";
}

/// A single bridge frame: a namespaced event name plus its arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireEvent {
    /// Namespaced event name (or a global event name for broadcasts).
    pub event: String,
    /// Ordered event arguments; absent on the wire when empty.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<Value>,
}

impl WireEvent {
    /// Creates a frame with arguments.
    pub fn new(event: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            event: event.into(),
            args,
        }
    }

    /// Creates an argument-less frame.
    pub fn bare(event: impl Into<String>) -> Self {
        Self::new(event, Vec::new())
    }

    /// The bootstrap frame sent first on every renderer connection.
    pub fn bootstrap() -> Self {
        Self::bare(BOOTSTRAP_EVENT_NAME)
    }
}

/// Version descriptor forwarded on `onNewVersionReady`.
///
/// Also the schema of the rebuild-version marker file the external watcher
/// maintains next to the bundle. The core forwards the descriptor verbatim
/// and never acts on its contents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionDescriptor {
    /// Opaque version string (content hash or semver, updater-defined).
    pub version: String,
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_bootstrap_constant_matches_derivation() {
        // The constant must stay in lockstep with the naming scheme.
        let derived = naming::event_name(BOOTSTRAP_MODULE, BOOTSTRAP_EVENT).unwrap();
        assert_eq!(derived, BOOTSTRAP_EVENT_NAME);
    }

    #[test]
    fn test_bootstrap_frame_has_no_args() {
        let frame = WireEvent::bootstrap();
        assert_eq!(frame.event, BOOTSTRAP_EVENT_NAME);
        assert!(frame.args.is_empty());
    }

    #[test]
    fn test_update_event_names_are_valid_bare_names() {
        // Every update-channel name must survive namespacing.
        for event in [
            update_events::CHECK_FOR_UPDATES,
            update_events::NEW_VERSION_READY,
            update_events::UPDATE_ERROR,
            update_events::VERSIONS_CLEANED_UP,
        ] {
            assert!(naming::event_name(update_events::MODULE, event).is_ok());
        }
    }

    #[test]
    fn test_wire_event_serializes_without_empty_args() {
        // Arrange
        let frame = WireEvent::bare("updater__check");

        // Act
        let text = serde_json::to_string(&frame).unwrap();

        // Assert – empty args are omitted on the wire
        assert!(!text.contains("args"), "empty args must be omitted: {text}");
    }

    #[test]
    fn test_wire_event_deserializes_missing_args_as_empty() {
        let frame: WireEvent = serde_json::from_str(r#"{"event":"a__b"}"#).unwrap();
        assert_eq!(frame.event, "a__b");
        assert!(frame.args.is_empty());
    }

    #[test]
    fn test_wire_event_preserves_argument_order() {
        // Arrange
        let frame = WireEvent::new("svc__apply", vec![json!(1), json!("two"), json!(null)]);

        // Act
        let text = serde_json::to_string(&frame).unwrap();
        let restored: WireEvent = serde_json::from_str(&text).unwrap();

        // Assert
        assert_eq!(restored.args, vec![json!(1), json!("two"), json!(null)]);
    }

    #[test]
    fn test_version_descriptor_matches_marker_file_schema() {
        // The watcher's marker file is a JSON object with a single `version`
        // string field.
        let marker: VersionDescriptor =
            serde_json::from_str(r#"{"version":"2024.06.1-9f3ab2"}"#).unwrap();
        assert_eq!(marker.version, "2024.06.1-9f3ab2");
    }
}
