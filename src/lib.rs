//! Site key extraction and verification for content-filtering browser surfaces.
//!
//! A *site key* is a signed token a web site presents to prove it may be
//! exempted from content-blocking rules. For every intercepted resource
//! request this crate decides, synchronously, whether the request carries a
//! valid site key:
//!
//! - **Strategies** locate the raw key: from a response header of a side
//!   fetch, or from page markup through the renderer
//! - **Verification** checks the key's signature against the request
//! - **Coordination** blocks the interception thread until a verdict is
//!   known, bounded by a timeout, and drops results that belong to a page
//!   the user already navigated away from
//!
//! # Core Types
//!
//! - [`ExtractionCoordinator`]: the blocking check and its lifecycle hooks
//! - [`ExtractionStrategy`]: pluggable extraction, with [`HeaderStrategy`]
//!   and [`ScriptStrategy`]
//! - [`PageSession`] / [`SessionBinding`]: the host page and the
//!   coordinator's non-owning view of it
//! - [`KeyVerifier`] / [`SignedKeyVerifier`]: signature checking
//! - [`Verdict`]: `Verified`, `Rejected` or `NoVerdict`
//!
//! # Examples
//!
//! ```
//! use std::sync::Arc;
//! use std::time::Duration;
//! use sitekey_core::{
//!     ExtractionCallback, ExtractionCoordinator, ExtractionStrategy, NoVerdictReason,
//!     PageSession, RequestId, ResourceRequest, SessionBinding, Verdict,
//! };
//!
//! /// A strategy that never finds a key.
//! struct Nothing;
//!
//! impl ExtractionStrategy for Nothing {
//!     fn name(&self) -> &'static str {
//!         "nothing"
//!     }
//!
//!     fn extract(&self, _: &SessionBinding, _: &ResourceRequest, on_result: ExtractionCallback) {
//!         on_result.report(None);
//!     }
//! }
//!
//! let coordinator = ExtractionCoordinator::new(Arc::new(Nothing))
//!     .with_timeout(Duration::from_millis(200));
//! let session = PageSession::new();
//! let request = ResourceRequest::new(RequestId(1), "https://example.com/")
//!     .expect("valid url")
//!     .main_frame(true);
//!
//! let verdict = coordinator.obtain_and_check_site_key(&session, &request);
//! assert_eq!(verdict, Verdict::NoVerdict(NoVerdictReason::NoKeyPresent));
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod candidate;
mod config;
mod coordinator;
mod error;
mod logging;
mod rendezvous;
mod request;
mod session;
mod stats;
pub mod strategy;
mod verdict;
mod verified;
mod verifier;

pub use candidate::KeyCandidate;
pub use config::{
    CoordinatorConfig, DEFAULT_HEADER_NAME, DEFAULT_KEY_ATTRIBUTE, DEFAULT_TIMEOUT_MS,
    MAX_TIMEOUT_MS,
};
pub use coordinator::{ExtractionCallback, ExtractionCoordinator};
pub use error::{Error, Result};
pub use request::{RequestId, ResourceRequest};
pub use session::{PageSession, SessionBinding, SessionId};
pub use stats::StatsSnapshot;
pub use strategy::{
    Collaborators, ExtractionStrategy, HeaderStrategy, HttpFetcher, ResourceFetcher,
    ScriptError, ScriptRenderer, ScriptReply, ScriptStrategy, StrategyKind,
};
pub use url::Url;
pub use verdict::{NoVerdictReason, Verdict};
pub use verified::VerifiedSiteKey;
pub use verifier::{
    KeyVerifier, SignedKeyVerifier, TrustRegistry, VerificationConfig, VerifiedKeys,
    PUBLIC_KEY_LEN, SIGNATURE_LEN,
};
