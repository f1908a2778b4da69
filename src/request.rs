//! Intercepted resource requests.
//!
//! A [`ResourceRequest`] is what the interception hook hands to the
//! coordinator. It is immutable once built and owned by the hook; the
//! coordinator clones what it needs for the duration of one check.

use std::collections::HashMap;
use std::fmt;

use url::Url;

use crate::error::{Error, Result};

/// Stable identity of one intercepted fetch, usable as a map key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(pub u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "req-{}", self.0)
    }
}

/// One intercepted resource fetch.
///
/// # Examples
///
/// ```
/// use sitekey_core::{RequestId, ResourceRequest};
///
/// let request = ResourceRequest::new(RequestId(7), "https://example.com/index.html?a=1")
///     .expect("valid url")
///     .main_frame(true)
///     .with_header("User-Agent", "TestBrowser/1.0");
///
/// assert_eq!(request.domain(), "example.com");
/// assert!(request.is_main_frame());
/// assert_eq!(request.user_agent(), Some("TestBrowser/1.0"));
/// ```
#[derive(Debug, Clone)]
pub struct ResourceRequest {
    id: RequestId,
    url: Url,
    main_frame: bool,
    method: String,
    /// Keyed by lowercased header name
    headers: HashMap<String, (String, String)>,
}

impl ResourceRequest {
    /// Creates a `GET` request for `url`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidUrl`] if `url` does not parse.
    pub fn new(id: RequestId, url: &str) -> Result<Self> {
        let parsed = Url::parse(url).map_err(|source| Error::InvalidUrl {
            url: url.to_string(),
            source,
        })?;
        Ok(Self::from_url(id, parsed))
    }

    /// Creates a `GET` request from an already parsed URL.
    pub fn from_url(id: RequestId, url: Url) -> Self {
        Self {
            id,
            url,
            main_frame: false,
            method: "GET".to_string(),
            headers: HashMap::new(),
        }
    }

    /// Marks whether this request loads the top-level document.
    pub fn main_frame(mut self, main_frame: bool) -> Self {
        self.main_frame = main_frame;
        self
    }

    /// Sets the HTTP method.
    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = method.into();
        self
    }

    /// Adds a request header. Later values replace earlier ones with the
    /// same (case-insensitive) name.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into();
        self.headers
            .insert(name.to_ascii_lowercase(), (name, value.into()));
        self
    }

    /// Returns the request identity.
    pub fn id(&self) -> RequestId {
        self.id
    }

    /// Returns the target URL.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Returns the host of the target URL, or an empty string for host-less URLs.
    pub fn domain(&self) -> &str {
        self.url.host_str().unwrap_or_default()
    }

    /// Returns `true` for the top-level document request.
    pub fn is_main_frame(&self) -> bool {
        self.main_frame
    }

    /// Returns the HTTP method.
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Looks up a header by case-insensitive name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(|(_, value)| value.as_str())
    }

    /// Iterates over headers with their original names.
    pub fn headers(&self) -> impl Iterator<Item = (&str, &str)> {
        self.headers
            .values()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }

    /// Returns the `User-Agent` header, if the hook supplied one.
    pub fn user_agent(&self) -> Option<&str> {
        self.header("user-agent")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_rejects_unparsable_url() {
        let result = ResourceRequest::new(RequestId(1), "::not a url::");
        assert!(matches!(result, Err(Error::InvalidUrl { .. })));
    }

    #[test]
    fn defaults_to_get_subresource() {
        let request = ResourceRequest::new(RequestId(2), "https://cdn.example.org/a.js").unwrap();

        assert_eq!(request.method(), "GET");
        assert!(!request.is_main_frame());
        assert_eq!(request.domain(), "cdn.example.org");
        assert_eq!(request.headers().count(), 0);
    }

    #[test]
    fn header_lookup_is_case_insensitive() {
        let request = ResourceRequest::new(RequestId(3), "https://example.com/")
            .unwrap()
            .with_header("Accept-Language", "en")
            .with_header("accept-language", "de");

        assert_eq!(request.header("ACCEPT-LANGUAGE"), Some("de"));
        assert_eq!(request.headers().count(), 1);
    }

    #[test]
    fn hostless_url_has_empty_domain() {
        let request = ResourceRequest::new(RequestId(4), "data:text/plain,hello").unwrap();
        assert_eq!(request.domain(), "");
    }

    #[test]
    fn request_id_displays_with_prefix() {
        assert_eq!(RequestId(42).to_string(), "req-42");
    }
}
