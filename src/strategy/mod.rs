//! Pluggable ways of locating a site key candidate.
//!
//! A strategy receives the request, a [`SessionBinding`] and an
//! [`ExtractionCallback`]. It must not block the caller: it schedules its
//! work (a side fetch, a script round trip through the renderer) and reports
//! back through the callback, possibly from another thread.
//!
//! # Variants
//!
//! - [`HeaderStrategy`]: re-fetches the resource and reads a response header
//! - [`ScriptStrategy`]: asks the page renderer to read the key from markup
//!
//! Both are selected by [`StrategyKind`] through [`build`]. Custom strategies
//! only need to implement [`ExtractionStrategy`].

mod header;
mod script;

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::CoordinatorConfig;
use crate::coordinator::ExtractionCallback;
use crate::error::{Error, Result};
use crate::request::ResourceRequest;
use crate::session::SessionBinding;

pub use header::{HeaderStrategy, HttpFetcher, ResourceFetcher};
pub use script::{ScriptError, ScriptRenderer, ScriptReply, ScriptStrategy};

/// A method of obtaining a raw site key candidate for a request.
///
/// # Contract
///
/// - `extract` returns promptly; the work happens elsewhere
/// - `on_result` is reported at most once (enforced by its type)
/// - dropping `on_result` unreported counts as "no key found"
/// - failures are reported as `None`, never surfaced to the coordinator
///
/// # Examples
///
/// ```
/// use sitekey_core::{ExtractionCallback, ExtractionStrategy, KeyCandidate};
/// use sitekey_core::{ResourceRequest, SessionBinding};
///
/// /// Reports the same key for every request.
/// struct FixedKey(&'static str);
///
/// impl ExtractionStrategy for FixedKey {
///     fn name(&self) -> &'static str {
///         "fixed"
///     }
///
///     fn extract(
///         &self,
///         _session: &SessionBinding,
///         _request: &ResourceRequest,
///         on_result: ExtractionCallback,
///     ) {
///         on_result.report(KeyCandidate::new(self.0));
///     }
/// }
/// ```
pub trait ExtractionStrategy: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Returns `false` for requests this strategy does not look at.
    fn accepts(&self, _request: &ResourceRequest) -> bool {
        true
    }

    /// Starts extraction for `request` and reports through `on_result`.
    fn extract(
        &self,
        session: &SessionBinding,
        request: &ResourceRequest,
        on_result: ExtractionCallback,
    );
}

/// Strategy selector used by configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    /// Read a response header from a side fetch
    #[default]
    Header,
    /// Read page markup through the renderer
    Script,
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StrategyKind::Header => write!(f, "header"),
            StrategyKind::Script => write!(f, "script"),
        }
    }
}

/// Host-provided capabilities the built-in strategies call into.
#[derive(Clone, Default)]
pub struct Collaborators {
    /// Side-fetch capability for [`HeaderStrategy`]
    pub fetcher: Option<Arc<dyn ResourceFetcher>>,
    /// Script evaluation capability for [`ScriptStrategy`]
    pub renderer: Option<Arc<dyn ScriptRenderer>>,
}

impl Collaborators {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Supplies the side-fetch capability.
    pub fn with_fetcher(mut self, fetcher: Arc<dyn ResourceFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    /// Supplies the script evaluation capability.
    pub fn with_renderer(mut self, renderer: Arc<dyn ScriptRenderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }
}

impl fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collaborators")
            .field("fetcher", &self.fetcher.is_some())
            .field("renderer", &self.renderer.is_some())
            .finish()
    }
}

/// Builds the strategy selected by `config`.
///
/// # Errors
///
/// Returns [`Error::MissingCollaborator`] when the selected variant needs a
/// collaborator that `collaborators` does not provide.
pub fn build(
    config: &CoordinatorConfig,
    collaborators: &Collaborators,
) -> Result<Arc<dyn ExtractionStrategy>> {
    match config.strategy {
        StrategyKind::Header => {
            let fetcher = collaborators
                .fetcher
                .clone()
                .ok_or(Error::MissingCollaborator {
                    strategy: "header",
                    collaborator: "resource fetcher",
                })?;
            Ok(Arc::new(
                HeaderStrategy::new(fetcher, config.header_name.clone())
                    .main_frame_only(config.main_frame_only),
            ))
        }
        StrategyKind::Script => {
            let renderer = collaborators
                .renderer
                .clone()
                .ok_or(Error::MissingCollaborator {
                    strategy: "script",
                    collaborator: "script renderer",
                })?;
            Ok(Arc::new(
                ScriptStrategy::new(renderer, &config.key_attribute)
                    .main_frame_only(config.main_frame_only),
            ))
        }
    }
}
