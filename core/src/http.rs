//! Options and result records for a single request.
//!
//! # Design
//! `RequestOptions` is consumed by one call and never shared. Host, port,
//! path, method and headers are handed to the transport verbatim; the runner
//! only adds a `Host` header when the caller did not supply one, and a
//! `content-length` header for path sources.
//!
//! Headers use owned `(String, String)` pairs so they read the same on the way
//! in and on the way out.

use std::time::Duration;

use bytes::Bytes;

use crate::types::{Body, ByteSink, ByteSource};

/// HTTP method for a request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum HttpMethod {
    #[default]
    Get,
    Head,
    Post,
    Put,
    Patch,
    Delete,
    Options,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Head => "HEAD",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Options => "OPTIONS",
        }
    }
}

impl From<HttpMethod> for http::Method {
    fn from(method: HttpMethod) -> Self {
        match method {
            HttpMethod::Get => http::Method::GET,
            HttpMethod::Head => http::Method::HEAD,
            HttpMethod::Post => http::Method::POST,
            HttpMethod::Put => http::Method::PUT,
            HttpMethod::Patch => http::Method::PATCH,
            HttpMethod::Delete => http::Method::DELETE,
            HttpMethod::Options => http::Method::OPTIONS,
        }
    }
}

/// Everything one call needs. Built with `new` plus the `with_*` setters.
#[derive(Debug)]
pub struct RequestOptions {
    pub host: String,
    pub port: u16,
    pub path: String,
    pub method: HttpMethod,
    pub headers: Vec<(String, String)>,
    /// Idle timeout on the connection. Zero means no timeout.
    pub timeout: Option<Duration>,
    pub source: Option<ByteSource>,
    pub body: Option<Body>,
    pub dest: Option<ByteSink>,
}

impl RequestOptions {
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            host: host.to_string(),
            port,
            path: "/".to_string(),
            method: HttpMethod::Get,
            headers: Vec::new(),
            timeout: None,
            source: None,
            body: None,
            dest: None,
        }
    }

    pub fn with_path(mut self, path: &str) -> Self {
        self.path = path.to_string();
        self
    }

    pub fn with_method(mut self, method: HttpMethod) -> Self {
        self.method = method;
        self
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_source(mut self, source: impl Into<ByteSource>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<Body>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn with_dest(mut self, dest: ByteSink) -> Self {
        self.dest = Some(dest);
        self
    }

    /// The idle timeout actually armed for this call.
    pub(crate) fn idle_timeout(&self) -> Option<Duration> {
        self.timeout.filter(|t| !t.is_zero())
    }

    /// Value for the `Host` header, omitting the default port. IPv6
    /// literals are bracketed.
    pub(crate) fn authority(&self) -> String {
        let host = if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]", self.host)
        } else {
            self.host.clone()
        };
        if self.port == 80 {
            host
        } else {
            format!("{host}:{}", self.port)
        }
    }

    pub(crate) fn has_header(&self, name: &str) -> bool {
        self.headers.iter().any(|(n, _)| n.eq_ignore_ascii_case(name))
    }
}

/// The outcome of a successful call.
#[derive(Debug, Clone)]
pub struct RequestResult {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    /// The full response body; `None` when it was routed to a dest.
    pub body: Option<Bytes>,
}

impl RequestResult {
    /// First header value matching `name`, ignoring case.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_defaults_to_get_root() {
        let opts = RequestOptions::new("localhost", 3000);
        assert_eq!(opts.method, HttpMethod::Get);
        assert_eq!(opts.path, "/");
        assert!(opts.headers.is_empty());
        assert!(opts.idle_timeout().is_none());
    }

    #[test]
    fn zero_timeout_is_disabled() {
        let opts = RequestOptions::new("localhost", 3000).with_timeout(Duration::ZERO);
        assert!(opts.idle_timeout().is_none());
        let opts = opts.with_timeout(Duration::from_millis(100));
        assert_eq!(opts.idle_timeout(), Some(Duration::from_millis(100)));
    }

    #[test]
    fn authority_omits_default_port() {
        assert_eq!(RequestOptions::new("example.com", 80).authority(), "example.com");
        assert_eq!(RequestOptions::new("localhost", 3000).authority(), "localhost:3000");
    }

    #[test]
    fn authority_brackets_ipv6_literals() {
        assert_eq!(RequestOptions::new("::1", 3000).authority(), "[::1]:3000");
        assert_eq!(RequestOptions::new("::1", 80).authority(), "[::1]");
        assert_eq!(RequestOptions::new("[::1]", 3000).authority(), "[::1]:3000");
    }

    #[test]
    fn header_lookup_ignores_case() {
        let opts = RequestOptions::new("localhost", 3000).header("Content-Type", "application/json");
        assert!(opts.has_header("content-type"));
        assert!(!opts.has_header("host"));

        let result = RequestResult {
            status: 200,
            headers: vec![("content-length".to_string(), "4".to_string())],
            body: None,
        };
        assert_eq!(result.header("Content-Length"), Some("4"));
    }

    #[test]
    fn method_maps_onto_http() {
        assert_eq!(http::Method::from(HttpMethod::Patch), http::Method::PATCH);
        assert_eq!(HttpMethod::Options.as_str(), "OPTIONS");
    }
}
