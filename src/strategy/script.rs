//! Site key extraction from page markup.
//!
//! The renderer evaluates a small script reading one attribute of the
//! document element and replies with the JSON-encoded result.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use super::ExtractionStrategy;
use crate::candidate::KeyCandidate;
use crate::config::DEFAULT_KEY_ATTRIBUTE;
use crate::coordinator::ExtractionCallback;
use crate::request::ResourceRequest;
use crate::session::SessionBinding;

/// Error indicator relayed by the renderer when a script fails.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ScriptError {
    message: String,
}

impl ScriptError {
    /// Creates an error with the renderer's message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Returns the renderer's message.
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Callback the renderer invokes once with the script's JSON-encoded result.
pub type ScriptReply = Box<dyn FnOnce(Result<String, ScriptError>) + Send + 'static>;

/// The page renderer's script injection capability.
///
/// Implementations evaluate `script` against the session's current document
/// and invoke `reply` when done, on whatever thread the renderer uses. If
/// the page navigates first they may drop `reply` instead.
pub trait ScriptRenderer: Send + Sync {
    /// Evaluates `script` in the document of `session`.
    fn evaluate(&self, session: &SessionBinding, script: &str, reply: ScriptReply);
}

/// Extracts the site key from an attribute of the document element.
pub struct ScriptStrategy {
    renderer: Arc<dyn ScriptRenderer>,
    script: String,
    main_frame_only: bool,
}

impl ScriptStrategy {
    /// Creates a strategy reading `attribute` from `<html>`.
    ///
    /// The page's markup is the same for all its requests, so only
    /// main-frame requests are accepted unless
    /// [`main_frame_only(false)`](Self::main_frame_only) is set.
    pub fn new(renderer: Arc<dyn ScriptRenderer>, attribute: &str) -> Self {
        Self {
            renderer,
            script: attribute_script(attribute),
            main_frame_only: true,
        }
    }

    /// Creates a strategy reading the default `data-adblockkey` attribute.
    pub fn with_default_attribute(renderer: Arc<dyn ScriptRenderer>) -> Self {
        Self::new(renderer, DEFAULT_KEY_ATTRIBUTE)
    }

    /// Restricts (or not) extraction to main-frame requests.
    pub fn main_frame_only(mut self, main_frame_only: bool) -> Self {
        self.main_frame_only = main_frame_only;
        self
    }

    /// Returns the script handed to the renderer.
    pub fn script(&self) -> &str {
        &self.script
    }
}

impl fmt::Debug for ScriptStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptStrategy")
            .field("script", &self.script)
            .field("main_frame_only", &self.main_frame_only)
            .finish_non_exhaustive()
    }
}

impl ExtractionStrategy for ScriptStrategy {
    fn name(&self) -> &'static str {
        "script"
    }

    fn accepts(&self, request: &ResourceRequest) -> bool {
        !self.main_frame_only || request.is_main_frame()
    }

    fn extract(
        &self,
        session: &SessionBinding,
        request: &ResourceRequest,
        on_result: ExtractionCallback,
    ) {
        if !session.is_valid() {
            tracing::debug!(request_id = %request.id(), "session gone before script injection");
            return;
        }

        let request_id = request.id();
        self.renderer.evaluate(
            session,
            &self.script,
            Box::new(move |reply| {
                let candidate = match reply {
                    Ok(raw) => decode_reply(&raw),
                    Err(err) => {
                        tracing::warn!(request_id = %request_id, error = %err, "site key script failed");
                        None
                    }
                };
                on_result.report(candidate);
            }),
        );
    }
}

fn attribute_script(attribute: &str) -> String {
    let attribute = serde_json::Value::String(attribute.to_string());
    format!(
        "(function() {{ var root = document.documentElement; \
         return root ? root.getAttribute({}) : null; }})();",
        attribute
    )
}

/// Decodes the renderer's JSON result: `null`, or a string holding the key.
fn decode_reply(raw: &str) -> Option<KeyCandidate> {
    match serde_json::from_str::<Option<String>>(raw) {
        Ok(value) => value.and_then(KeyCandidate::new),
        Err(err) => {
            tracing::debug!(error = %err, "unexpected site key script result");
            None
        }
    }
}
