/// Origin allow-list
///
/// The Origin header is client-supplied and trivially spoofed by non-browser
/// callers. This guard only keeps other websites from driving the endpoints
/// from a visitor's browser; it is not an access control boundary.
use axum::http::{header, HeaderMap};
use url::Url;

/// Origin header as received
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeclaredOrigin {
    Absent,
    /// Present but not visible ASCII
    Unreadable,
    Value(String),
}

impl DeclaredOrigin {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        match headers.get(header::ORIGIN) {
            None => DeclaredOrigin::Absent,
            Some(value) => match value.to_str() {
                Ok(origin) => DeclaredOrigin::Value(origin.to_string()),
                Err(_) => DeclaredOrigin::Unreadable,
            },
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct OriginGuard {
    allowed_hosts: Vec<String>,
}

impl OriginGuard {
    /// Guard over `hosts` (host, or host:port); an empty list allows everything
    pub fn new<I, S>(hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            allowed_hosts: hosts
                .into_iter()
                .map(|h| h.as_ref().trim().to_lowercase())
                .filter(|h| !h.is_empty())
                .collect(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        !self.allowed_hosts.is_empty()
    }

    /// Whether a request declaring `origin` may proceed.
    ///
    /// Requests without an Origin header are allowed, since server-side
    /// callers never send one. Unparseable origins are refused.
    pub fn is_allowed(&self, origin: Option<&str>) -> bool {
        if !self.is_enabled() {
            return true;
        }

        let origin = match origin.map(str::trim) {
            None | Some("") => return true,
            Some(origin) => origin,
        };

        match origin_host(origin) {
            Some(host) => self.allowed_hosts.iter().any(|allowed| *allowed == host),
            None => false,
        }
    }

    /// [`OriginGuard::is_allowed`] over a raw header; unreadable bytes are refused
    pub fn admits(&self, origin: &DeclaredOrigin) -> bool {
        match origin {
            DeclaredOrigin::Absent => self.is_allowed(None),
            DeclaredOrigin::Unreadable => !self.is_enabled(),
            DeclaredOrigin::Value(origin) => self.is_allowed(Some(origin)),
        }
    }
}

/// Lowercased `host[:port]` of an origin URL
fn origin_host(origin: &str) -> Option<String> {
    let url = Url::parse(origin).ok()?;
    let host = url.host_str()?.to_lowercase();
    Some(match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host,
    })
}
