use std::sync::OnceLock;

use http::header::{self, HeaderMap, HeaderName, HeaderValue};
use regex::Regex;
use serde::Deserialize;

/// Rule for transforming HTTP headers on outgoing requests
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HeaderRule {
    /// Forward a header from the incoming request
    Forward(HeaderForward),
    /// Insert a static header value
    Insert(HeaderInsert),
    /// Remove a header
    Remove(HeaderRemove),
    /// Duplicate a header under a new name
    RenameDuplicate(HeaderRenameDuplicate),
}

/// Forward a header from the incoming request, optionally renaming it
#[derive(Debug, Clone, Deserialize)]
pub struct HeaderForward {
    /// Header name or glob pattern to match
    pub name: NameOrPattern,
    /// Rename the header in the outgoing request
    #[serde(default)]
    pub rename: Option<ValidHeaderName>,
    /// Default value if the header is not present
    #[serde(default)]
    pub default: Option<ValidHeaderValue>,
}

/// Insert a static header value
#[derive(Debug, Clone, Deserialize)]
pub struct HeaderInsert {
    /// Header name to insert
    pub name: ValidHeaderName,
    /// Header value
    pub value: ValidHeaderValue,
}

/// Remove a header by name or pattern
#[derive(Debug, Clone, Deserialize)]
pub struct HeaderRemove {
    /// Header name or glob pattern
    pub name: NameOrPattern,
}

/// Duplicate a header: keep original and insert copy under new name
#[derive(Debug, Clone, Deserialize)]
pub struct HeaderRenameDuplicate {
    /// Source header name
    pub name: ValidHeaderName,
    /// New name for the duplicated header
    pub rename: ValidHeaderName,
    /// Default value if the source header is missing
    #[serde(default)]
    pub default: Option<ValidHeaderValue>,
}

/// Either a specific header name or a regex pattern
#[derive(Debug, Clone)]
pub enum NameOrPattern {
    /// Exact header name
    Name(ValidHeaderName),
    /// Regex pattern to match header names
    Pattern(HeaderPattern),
}

/// Wrapper for a validated HTTP header name
#[derive(Debug, Clone)]
pub struct ValidHeaderName(HeaderName);

impl ValidHeaderName {
    /// Create from a known-valid header name
    pub const fn new(name: HeaderName) -> Self {
        Self(name)
    }
}

impl AsRef<HeaderName> for ValidHeaderName {
    fn as_ref(&self) -> &HeaderName {
        &self.0
    }
}

/// Wrapper for a validated HTTP header value
#[derive(Debug, Clone)]
pub struct ValidHeaderValue(HeaderValue);

impl ValidHeaderValue {
    /// Create from a known-valid header value
    pub const fn new(value: HeaderValue) -> Self {
        Self(value)
    }
}

impl AsRef<HeaderValue> for ValidHeaderValue {
    fn as_ref(&self) -> &HeaderValue {
        &self.0
    }
}

/// Compiled regex pattern for matching header names
#[derive(Debug, Clone)]
pub struct HeaderPattern(pub Regex);

/// `libManagedHeaders`: hop-by-hop and content-negotiation headers the HTTP
/// library itself manages, never copied verbatim from inbound to outbound
static DENY_LIST: OnceLock<[HeaderName; 21]> = OnceLock::new();

/// `blockedHeaders`/`sensitiveHeaders`: credentials that must never survive
/// from an inbound request onto an outbound one, regardless of any
/// forwarding rule
static SENSITIVE_HEADERS: OnceLock<[HeaderName; 5]> = OnceLock::new();

/// `X-Api-*Secret*`-shaped header names, matched case-insensitively
static SENSITIVE_PATTERN: OnceLock<Regex> = OnceLock::new();

/// Get the header deny list (hop-by-hop / library-managed headers)
pub fn get_deny_list() -> &'static [HeaderName] {
    DENY_LIST.get_or_init(|| {
        [
            header::ACCEPT,
            header::ACCEPT_CHARSET,
            header::ACCEPT_ENCODING,
            header::ACCEPT_RANGES,
            header::CONTENT_LENGTH,
            header::CONTENT_TYPE,
            header::CONNECTION,
            HeaderName::from_static("keep-alive"),
            header::PROXY_AUTHENTICATE,
            header::PROXY_AUTHORIZATION,
            header::TE,
            header::TRAILER,
            header::TRANSFER_ENCODING,
            header::UPGRADE,
            header::ORIGIN,
            header::HOST,
            header::SEC_WEBSOCKET_VERSION,
            header::SEC_WEBSOCKET_KEY,
            header::SEC_WEBSOCKET_ACCEPT,
            header::SEC_WEBSOCKET_PROTOCOL,
            header::SEC_WEBSOCKET_EXTENSIONS,
        ]
    })
}

/// Get the sensitive/blocked header set: `Authorization`, `Api-Key`,
/// `X-Api-Key`, `Content-Length`, `Transfer-Encoding`
pub fn get_sensitive_headers() -> &'static [HeaderName] {
    SENSITIVE_HEADERS.get_or_init(|| {
        [
            header::AUTHORIZATION,
            HeaderName::from_static("api-key"),
            HeaderName::from_static("x-api-key"),
            header::CONTENT_LENGTH,
            header::TRANSFER_ENCODING,
        ]
    })
}

fn sensitive_pattern() -> &'static Regex {
    SENSITIVE_PATTERN.get_or_init(|| Regex::new(r"(?i)^x-api-.*secret.*$").expect("static pattern is valid"))
}

/// Check if a header name must never be copied from inbound to outbound:
/// either it's hop-by-hop/library-managed, an exact sensitive name, or
/// matches the `X-Api-*Secret*` shape
pub fn is_header_denied(name: &HeaderName) -> bool {
    get_deny_list().contains(name) || get_sensitive_headers().contains(name) || sensitive_pattern().is_match(name.as_str())
}

/// Replace sensitive header values with `******` for logging
///
/// Leaves header names and all non-sensitive values untouched; only the
/// value of a sensitive header is masked, so the resulting map is still
/// useful for diagnosing which headers were present.
#[must_use]
pub fn mask_sensitive_headers(headers: &HeaderMap) -> HeaderMap {
    let masked_value = HeaderValue::from_static("******");
    let mut masked = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        if get_sensitive_headers().contains(name) || sensitive_pattern().is_match(name.as_str()) {
            masked.append(name.clone(), masked_value.clone());
        } else {
            masked.append(name.clone(), value.clone());
        }
    }
    masked
}

/// Merge inbound headers onto a base outbound header map, applying the
/// canonical header discipline: sensitive/library-managed headers are
/// never copied; headers named in `append_names` are appended (both
/// base and inbound values survive) rather than overwritten.
#[must_use]
pub fn merge_headers(base: &HeaderMap, incoming: &HeaderMap, append_names: &[HeaderName]) -> HeaderMap {
    let mut result = base.clone();
    for (name, value) in incoming {
        if is_header_denied(name) {
            continue;
        }
        if append_names.contains(name) {
            result.append(name.clone(), value.clone());
        } else {
            result.insert(name.clone(), value.clone());
        }
    }
    result
}

/// Apply header rules to build a new header map for outgoing requests
///
/// # Arguments
/// * `incoming` - Headers from the incoming request
/// * `rules` - Rules to apply in order
pub fn apply_header_rules(incoming: &HeaderMap, rules: &[HeaderRule]) -> HeaderMap {
    let mut result = HeaderMap::new();

    if rules.is_empty() {
        return result;
    }

    for rule in rules {
        match rule {
            HeaderRule::Forward(forward) => {
                apply_forward(incoming, forward, &mut result);
            }
            HeaderRule::Insert(insert) => {
                result.insert(insert.name.0.clone(), insert.value.0.clone());
            }
            HeaderRule::Remove(remove) => {
                apply_remove(remove, &mut result);
            }
            HeaderRule::RenameDuplicate(dup) => {
                apply_rename_duplicate(incoming, dup, &mut result);
            }
        }
    }

    result
}

fn apply_forward(incoming: &HeaderMap, forward: &HeaderForward, result: &mut HeaderMap) {
    match &forward.name {
        NameOrPattern::Name(header_name) => {
            if is_header_denied(header_name.as_ref()) {
                return;
            }

            result.remove(header_name.as_ref());

            let value = incoming
                .get(header_name.as_ref())
                .cloned()
                .or_else(|| forward.default.as_ref().map(|d| d.0.clone()));

            if let Some(val) = value {
                if let Some(new_name) = &forward.rename {
                    result.insert(new_name.0.clone(), val);
                } else {
                    result.insert(header_name.0.clone(), val);
                }
            }
        }
        NameOrPattern::Pattern(pattern) => {
            let headers_to_forward: Vec<_> = incoming
                .keys()
                .filter(|k| !is_header_denied(k) && pattern.0.is_match(k.as_str()))
                .map(|k| (k.clone(), incoming.get(k).cloned().unwrap()))
                .collect();

            for (original_name, value) in headers_to_forward {
                if let Some(new_name) = &forward.rename {
                    result.insert(new_name.0.clone(), value);
                } else {
                    result.insert(original_name, value);
                }
            }
        }
    }
}

fn apply_remove(remove: &HeaderRemove, result: &mut HeaderMap) {
    match &remove.name {
        NameOrPattern::Name(header_name) => {
            result.remove(header_name.as_ref());
        }
        NameOrPattern::Pattern(pattern) => {
            let to_remove: Vec<_> = result
                .keys()
                .filter(|key| pattern.0.is_match(key.as_str()))
                .cloned()
                .collect();

            for key in to_remove {
                result.remove(&key);
            }
        }
    }
}

fn apply_rename_duplicate(incoming: &HeaderMap, dup: &HeaderRenameDuplicate, result: &mut HeaderMap) {
    let value = incoming
        .get(dup.name.as_ref())
        .cloned()
        .or_else(|| dup.default.as_ref().map(|d| d.0.clone()));

    if let Some(val) = value {
        result.insert(dup.name.0.clone(), val.clone());
        result.insert(dup.rename.0.clone(), val);
    }
}

// Serde implementations for header types

impl<'de> Deserialize<'de> for ValidHeaderName {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        HeaderName::try_from(s.as_str())
            .map(ValidHeaderName)
            .map_err(serde::de::Error::custom)
    }
}

impl<'de> Deserialize<'de> for ValidHeaderValue {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        HeaderValue::try_from(s.as_str())
            .map(ValidHeaderValue)
            .map_err(serde::de::Error::custom)
    }
}

impl<'de> Deserialize<'de> for NameOrPattern {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;

        // If the string contains regex metacharacters, treat as pattern
        if s.contains('*') || s.contains('?') || s.contains('[') || s.contains('(') {
            let regex = Regex::new(&s).map_err(|e| serde::de::Error::custom(format!("invalid pattern: {e}")))?;
            Ok(Self::Pattern(HeaderPattern(regex)))
        } else {
            let name = HeaderName::try_from(s.as_str()).map_err(serde::de::Error::custom)?;
            Ok(Self::Name(ValidHeaderName(name)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header_map(pairs: &[(&str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(HeaderName::try_from(*name).unwrap(), HeaderValue::from_str(value).unwrap());
        }
        map
    }

    #[test]
    fn merge_strips_sensitive_and_library_managed_headers() {
        let base = HeaderMap::new();
        let incoming = header_map(&[
            ("authorization", "Bearer secret"),
            ("api-key", "sk-live-123"),
            ("x-api-key", "sk-ant-live-456"),
            ("x-api-signing-secret", "shh"),
            ("content-length", "42"),
            ("transfer-encoding", "chunked"),
            ("x-request-id", "abc"),
        ]);

        let merged = merge_headers(&base, &incoming, &[]);

        assert!(!merged.contains_key(header::AUTHORIZATION));
        assert!(!merged.contains_key("api-key"));
        assert!(!merged.contains_key("x-api-key"));
        assert!(!merged.contains_key("x-api-signing-secret"));
        assert!(!merged.contains_key(header::CONTENT_LENGTH));
        assert!(!merged.contains_key(header::TRANSFER_ENCODING));
        assert!(merged.contains_key("x-request-id"));
    }

    #[test]
    fn merge_appends_registered_names_instead_of_overwriting() {
        let mut base = HeaderMap::new();
        base.insert(header::USER_AGENT, HeaderValue::from_static("portal/1.0"));
        let incoming = header_map(&[("user-agent", "curl/8.0")]);

        let merged = merge_headers(&base, &incoming, &[header::USER_AGENT]);

        let values: Vec<_> = merged.get_all(header::USER_AGENT).iter().collect();
        assert_eq!(values.len(), 2);
    }

    #[test]
    fn mask_replaces_sensitive_values_only() {
        let headers = header_map(&[("authorization", "Bearer secret"), ("x-request-id", "abc")]);
        let masked = mask_sensitive_headers(&headers);
        assert_eq!(masked.get(header::AUTHORIZATION).unwrap(), "******");
        assert_eq!(masked.get("x-request-id").unwrap(), "abc");
    }
}
