//! Update signalling channel.
//!
//! Thin pass-through between the external updater collaborator and the
//! renderer, built entirely on the bridge's public surface. The channel never
//! downloads, verifies, or applies anything; it only relays signals in both
//! directions under the `appUpdater` namespace.

use serde_json::json;
use tracing::debug;

use appshell_core::protocol::messages::{update_events, VersionDescriptor};

use super::registry::{Bridge, BridgeError, Module};

/// Host-side endpoint of the update channel.
pub struct UpdateChannel {
    module: Module,
}

impl UpdateChannel {
    /// Registers the `appUpdater` module on the bridge.
    ///
    /// # Errors
    ///
    /// [`BridgeError::ModuleAlreadyRegistered`] if the channel was already
    /// attached to this bridge.
    pub fn attach(bridge: &Bridge) -> Result<Self, BridgeError> {
        let module = bridge.register(update_events::MODULE)?;
        Ok(Self { module })
    }

    /// Subscribes `handler` to renderer-initiated update checks. The handler
    /// is expected to poke the external updater; the channel itself performs
    /// no check.
    ///
    /// # Errors
    ///
    /// Propagates bridge subscription errors.
    pub fn on_check_for_updates<F>(&self, handler: F) -> Result<(), BridgeError>
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.module.on(update_events::CHECK_FOR_UPDATES, move |_args| {
            debug!("renderer requested an update check");
            handler();
        })
    }

    /// Announces a downloaded-and-ready bundle version to the renderer.
    ///
    /// # Errors
    ///
    /// Propagates renderer-reference errors from [`Module::send`].
    pub fn notify_new_version_ready(
        &self,
        descriptor: &VersionDescriptor,
    ) -> Result<(), BridgeError> {
        self.module.send(
            update_events::NEW_VERSION_READY,
            vec![json!({ "version": descriptor.version.clone() })],
        )
    }

    /// Relays an updater error message to the renderer.
    ///
    /// # Errors
    ///
    /// Propagates renderer-reference errors from [`Module::send`].
    pub fn notify_error(&self, message: &str) -> Result<(), BridgeError> {
        self.module
            .send(update_events::UPDATE_ERROR, vec![json!(message)])
    }

    /// Tells the renderer that superseded bundle versions were removed.
    ///
    /// # Errors
    ///
    /// Propagates renderer-reference errors from [`Module::send`].
    pub fn notify_versions_cleaned_up(&self) -> Result<(), BridgeError> {
        self.module.send(update_events::VERSIONS_CLEANED_UP, vec![])
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
