use thiserror::Error;

use crate::strategy::ScriptError;

/// Errors surfaced by construction and configuration APIs.
///
/// The check path itself never returns an `Error`: every failure while
/// extracting or verifying a site key is folded into a
/// [`Verdict`](crate::Verdict) so the blocked caller is always released.
#[derive(Debug, Error)]
pub enum Error {
    /// A request URL could not be parsed
    #[error("invalid request url '{url}': {source}")]
    InvalidUrl {
        /// The rejected input
        url: String,
        /// Parser error
        #[source]
        source: url::ParseError,
    },

    /// A configuration value is out of range or malformed
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The selected strategy needs a collaborator that was not supplied
    #[error("strategy '{strategy}' requires a {collaborator}")]
    MissingCollaborator {
        /// Strategy being built
        strategy: &'static str,
        /// Missing collaborator description
        collaborator: &'static str,
    },

    /// The side fetch used for header extraction failed
    #[error("side fetch failed: {0}")]
    Fetch(#[from] reqwest::Error),

    /// The renderer reported a script failure
    #[error("script evaluation failed: {0}")]
    Script(#[from] ScriptError),

    /// A worker thread could not be started
    #[error("failed to spawn extraction worker: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
