//! Site key extraction from a response header.
//!
//! The strategy re-fetches the intercepted resource with a plain `GET` on a
//! worker thread and reads one header from the response. Only `GET`
//! requests are handled, so the side fetch never replays a form submission.

use std::fmt;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use reqwest::blocking::Client;

use super::ExtractionStrategy;
use crate::candidate::KeyCandidate;
use crate::config::DEFAULT_HEADER_NAME;
use crate::coordinator::ExtractionCallback;
use crate::error::Result;
use crate::request::ResourceRequest;
use crate::session::SessionBinding;

/// Issues an independent fetch of a resource and reads one response header.
pub trait ResourceFetcher: Send + Sync {
    /// Fetches the resource of `request` again with `GET` and returns the
    /// value of `header`, if present.
    ///
    /// # Errors
    ///
    /// Any transport failure. The strategy reports it as "no key".
    fn fetch_header(&self, request: &ResourceRequest, header: &str) -> Result<Option<String>>;
}

/// [`ResourceFetcher`] backed by a blocking `reqwest` client.
///
/// The side fetch is always a bodiless `GET` carrying the intercepted
/// request's headers, minus those describing a body. The client runs its own
/// I/O; create it outside any async runtime.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    /// Creates a fetcher whose requests give up after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Fetch`](crate::Error::Fetch) if the TLS backend
    /// cannot be initialised.
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

impl ResourceFetcher for HttpFetcher {
    fn fetch_header(&self, request: &ResourceRequest, header: &str) -> Result<Option<String>> {
        let mut builder = self.client.get(request.url().as_str());
        for (name, value) in request.headers() {
            if !is_body_header(name) {
                builder = builder.header(name, value);
            }
        }

        let response = builder.send()?;
        Ok(response
            .headers()
            .get(header)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string))
    }
}

fn is_body_header(name: &str) -> bool {
    ["content-length", "content-type", "transfer-encoding"]
        .iter()
        .any(|body| name.eq_ignore_ascii_case(body))
}

/// Extracts the site key from a response header of a side fetch.
///
/// The fetch runs on its own named worker thread so the blocked caller is
/// never the one doing I/O. Only `GET` requests are accepted.
pub struct HeaderStrategy {
    fetcher: Arc<dyn ResourceFetcher>,
    header_name: String,
    main_frame_only: bool,
}

impl HeaderStrategy {
    /// Creates a strategy reading `header_name` through `fetcher`.
    ///
    /// Only main-frame requests are accepted unless
    /// [`main_frame_only(false)`](Self::main_frame_only) is set.
    pub fn new(fetcher: Arc<dyn ResourceFetcher>, header_name: impl Into<String>) -> Self {
        Self {
            fetcher,
            header_name: header_name.into(),
            main_frame_only: true,
        }
    }

    /// Creates a strategy reading the default `X-Adblock-Key` header.
    pub fn with_default_header(fetcher: Arc<dyn ResourceFetcher>) -> Self {
        Self::new(fetcher, DEFAULT_HEADER_NAME)
    }

    /// Restricts (or not) extraction to main-frame requests.
    pub fn main_frame_only(mut self, main_frame_only: bool) -> Self {
        self.main_frame_only = main_frame_only;
        self
    }

    /// Returns the header being read.
    pub fn header_name(&self) -> &str {
        &self.header_name
    }
}

impl fmt::Debug for HeaderStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HeaderStrategy")
            .field("header_name", &self.header_name)
            .field("main_frame_only", &self.main_frame_only)
            .finish_non_exhaustive()
    }
}

impl ExtractionStrategy for HeaderStrategy {
    fn name(&self) -> &'static str {
        "header"
    }

    fn accepts(&self, request: &ResourceRequest) -> bool {
        request.method().eq_ignore_ascii_case("GET")
            && (!self.main_frame_only || request.is_main_frame())
    }

    fn extract(
        &self,
        _session: &SessionBinding,
        request: &ResourceRequest,
        on_result: ExtractionCallback,
    ) {
        let fetcher = Arc::clone(&self.fetcher);
        let header_name = self.header_name.clone();
        let request = request.clone();

        let spawned = thread::Builder::new()
            .name("sitekey-header-fetch".to_string())
            .spawn(move || {
                if !on_result.is_current() {
                    on_result.dismiss();
                    return;
                }
                let fetched = fetcher.fetch_header(&request, &header_name);
                if !on_result.is_current() {
                    tracing::debug!(request_id = %request.id(), "check released during side fetch");
                    on_result.dismiss();
                    return;
                }
                let candidate = match fetched {
                    Ok(Some(value)) => KeyCandidate::new(value),
                    Ok(None) => {
                        tracing::debug!(
                            request_id = %request.id(),
                            header = %header_name,
                            "response carries no site key header"
                        );
                        None
                    }
                    Err(err) => {
                        tracing::warn!(request_id = %request.id(), error = %err, "site key side fetch failed");
                        None
                    }
                };
                on_result.report(candidate);
            });

        // On failure the closure, and the callback with it, is dropped,
        // which resolves the extraction as "no key".
        if let Err(err) = spawned {
            tracing::warn!(error = %err, "failed to spawn site key fetch worker");
        }
    }
}
