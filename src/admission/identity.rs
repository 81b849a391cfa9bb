//! Client identity derivation from request metadata.
//!
//! The identity is built from proxy headers and the user agent, so any client
//! able to set those headers can pick its own key. It partitions counters; it
//! does not authenticate anyone.

use serde::Serialize;

/// Maximum length of a resolved identity, in characters.
pub const MAX_IDENTITY_LEN: usize = 50;

/// Placeholder used for every missing or empty header.
const UNKNOWN: &str = "unknown";

/// Separator between the address part and the user agent part.
const SEPARATOR: char = '-';

/// Header names consulted by [`RequestMetadata::from_headers`].
pub const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";
pub const REAL_IP_HEADER: &str = "x-real-ip";
pub const USER_AGENT_HEADER: &str = "user-agent";

/// The subset of inbound request metadata used to identify a client.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestMetadata {
    /// Raw `X-Forwarded-For` value, possibly a comma-separated chain
    pub forwarded_for: Option<String>,
    /// Raw `X-Real-IP` value
    pub real_ip: Option<String>,
    /// Raw `User-Agent` value
    pub user_agent: Option<String>,
}

impl RequestMetadata {
    /// Create empty metadata; every field resolves to `unknown`.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_forwarded_for(mut self, value: impl Into<String>) -> Self {
        self.forwarded_for = Some(value.into());
        self
    }

    pub fn with_real_ip(mut self, value: impl Into<String>) -> Self {
        self.real_ip = Some(value.into());
        self
    }

    pub fn with_user_agent(mut self, value: impl Into<String>) -> Self {
        self.user_agent = Some(value.into());
        self
    }

    /// Collect the relevant headers from `(name, value)` pairs.
    ///
    /// Header names are matched case-insensitively. When a header appears more
    /// than once, the first occurrence wins.
    pub fn from_headers<'a, I>(headers: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut metadata = Self::default();
        for (name, value) in headers {
            let slot = if name.eq_ignore_ascii_case(FORWARDED_FOR_HEADER) {
                &mut metadata.forwarded_for
            } else if name.eq_ignore_ascii_case(REAL_IP_HEADER) {
                &mut metadata.real_ip
            } else if name.eq_ignore_ascii_case(USER_AGENT_HEADER) {
                &mut metadata.user_agent
            } else {
                continue;
            };
            if slot.is_none() {
                *slot = Some(value.to_string());
            }
        }
        metadata
    }

    /// The client address as reported by proxies, or `unknown`.
    ///
    /// Only the first forwarded-for hop is considered; when it is blank the
    /// real-ip header is used and later hops are never consulted.
    fn client_address(&self) -> &str {
        self.forwarded_for
            .as_deref()
            .and_then(|chain| non_blank(chain.split(',').next().unwrap_or("")))
            .or_else(|| self.real_ip.as_deref().and_then(non_blank))
            .unwrap_or(UNKNOWN)
    }

    fn agent(&self) -> &str {
        self.user_agent
            .as_deref()
            .and_then(non_blank)
            .unwrap_or(UNKNOWN)
    }

    /// Resolve the identity for this request.
    pub fn identity(&self) -> ClientIdentity {
        ClientIdentity::resolve(self)
    }
}

fn non_blank(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}

/// A sanitized per-client key: at most [`MAX_IDENTITY_LEN`] characters, all
/// within `[a-zA-Z0-9-]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ClientIdentity(String);

impl ClientIdentity {
    /// Derive the identity for a request.
    ///
    /// The first forwarded-for hop wins, then the real-ip header, then
    /// `unknown`; the result is joined with the user agent and sanitized.
    /// Never fails.
    pub fn resolve(metadata: &RequestMetadata) -> Self {
        let raw = format!(
            "{}{}{}",
            metadata.client_address(),
            SEPARATOR,
            metadata.agent()
        );
        Self::sanitize(&raw)
    }

    /// Strip characters outside `[a-zA-Z0-9-]` and truncate.
    pub fn sanitize(raw: &str) -> Self {
        let cleaned: String = raw
            .chars()
            .filter(|c| c.is_ascii_alphanumeric() || *c == SEPARATOR)
            .take(MAX_IDENTITY_LEN)
            .collect();
        Self(cleaned)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for ClientIdentity {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ClientIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
