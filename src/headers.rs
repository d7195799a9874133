//! Bidirectional header translation between SPDY name/value pairs and
//! HTTP/1.x header lines.
//!
//! SPDY names always arrive lowercase; HTTP names are produced with just
//! the first character capitalized (the rest kept exactly as SPDY gave
//! it — SPDY names are already lowercase so this effectively yields
//! `Accept`, `X-forwarded-for`, etc., matching the one normalization
//! rule the spec calls for, no more).

use crate::error::ProxyError;

/// Hop-by-hop headers that are never forwarded from the origin response
/// to the SPDY client.
const HOP_BY_HOP: &[&str] = &["connection", "keep-alive"];

/// An ordered SPDY-style name -> multi-value multimap. Insertion order is
/// preserved; a given name can appear only once as a key, with all of its
/// values held in the per-key vector (NUL-separated on the real SPDY
/// wire — represented here as a `Vec<String>` since the wire encoding is
/// the transport's concern, not the translator's).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderMultiMap(Vec<(String, Vec<String>)>);

impl HeaderMultiMap {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Add `(name, value)`. `name` is expected to already be lowercase.
    ///
    /// If `name` already has a value byte-identical to `value`, the
    /// duplicate is silently elided. Otherwise the value is appended
    /// under the existing name, or a new entry is created.
    pub fn add(&mut self, name: &str, value: &str) {
        if let Some((_, values)) = self.0.iter_mut().find(|(n, _)| n == name) {
            if values.iter().any(|v| v == value) {
                return;
            }
            values.push(value.to_string());
        } else {
            self.0.push((name.to_string(), vec![value.to_string()]));
        }
    }

    /// Remove `name` entirely, returning its values if present. Used to
    /// pull SPDY pseudo-headers (`:method`, `:path`, …) out of a decoded
    /// header block before the remainder is treated as ordinary headers.
    pub fn remove(&mut self, name: &str) -> Option<Vec<String>> {
        let idx = self.0.iter().position(|(n, _)| n == name)?;
        Some(self.0.remove(idx).1)
    }

    pub fn get(&self, name: &str) -> Option<&[String]> {
        self.0
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_slice())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.0.iter().map(|(n, v)| (n.as_str(), v.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Capitalize the first character of a (lowercase) SPDY header name,
/// leaving the rest untouched.
fn capitalize_first(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) => c.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

/// Translate inbound SPDY request headers into HTTP/1.x header lines
/// (without trailing CRLF — the transport adds that when serializing the
/// request). SPDY pseudo-headers (`:method`, `:path`, `:version`,
/// `:host`, `:scheme`) are never passed through `headers` — the caller
/// surfaces those as scalar fields and composes the request line itself.
pub fn spdy_to_http_header_lines(headers: &HeaderMultiMap) -> Vec<String> {
    headers
        .iter()
        .map(|(name, values)| format!("{}: {}", capitalize_first(name), values.join(", ")))
        .collect()
}

/// Parsed origin HTTP/1.x response line + headers.
pub struct OriginResponseHead {
    pub status_code: u16,
    /// Preserved byte-for-byte from the origin's status line; empty if
    /// the origin omitted the reason phrase.
    pub status_text: String,
    pub version: String,
    pub headers: HeaderMultiMap,
    /// Byte offset into the input where the header block ended (start of
    /// body), so the caller can hand the remainder to the body reader.
    pub consumed: usize,
}

/// Parse a raw HTTP/1.x response (status line + headers, up to and
/// including the terminating blank line) out of `buf`. Returns `Ok(None)`
/// if more bytes are needed. Trailers (anything the underlying parser
/// would see after a chunked body) are never passed to this function —
/// it only ever looks at the head of the response.
pub fn parse_origin_response(buf: &[u8]) -> Result<Option<OriginResponseHead>, ProxyError> {
    let mut raw_headers = [httparse::EMPTY_HEADER; 64];
    let mut resp = httparse::Response::new(&mut raw_headers);

    let status = resp
        .parse(buf)
        .map_err(|e| ProxyError::Protocol(format!("malformed origin status line: {e}")))?;

    let consumed = match status {
        httparse::Status::Complete(n) => n,
        httparse::Status::Partial => return Ok(None),
    };

    let status_code = resp
        .code
        .ok_or_else(|| ProxyError::Protocol("origin response missing status code".to_string()))?;
    let status_text = resp.reason.unwrap_or("").to_string();
    let version = match resp.version {
        Some(1) => "HTTP/1.1".to_string(),
        Some(0) => "HTTP/1.0".to_string(),
        _ => "HTTP/1.1".to_string(),
    };

    let mut headers = HeaderMultiMap::new();
    for h in resp.headers.iter() {
        let name = h.name.to_ascii_lowercase();
        if HOP_BY_HOP.contains(&name.as_str()) {
            continue;
        }
        let value = std::str::from_utf8(h.value)
            .map_err(|_| ProxyError::Protocol(format!("non-UTF8 value for header {name}")))?
            .trim_end_matches('\r')
            .to_string();
        headers.add(&name, &value);
    }

    Ok(Some(OriginResponseHead {
        status_code,
        status_text,
        version,
        headers,
        consumed,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mm(pairs: &[(&str, &[&str])]) -> HeaderMultiMap {
        let mut m = HeaderMultiMap::new();
        for (name, values) in pairs {
            for v in *values {
                m.add(name, v);
            }
        }
        m
    }

    #[test]
    fn capitalizes_only_first_character() {
        assert_eq!(capitalize_first("x-forwarded-for"), "X-forwarded-for");
        assert_eq!(capitalize_first("accept"), "Accept");
    }

    #[test]
    fn multi_value_join_uses_comma_space() {
        let headers = mm(&[("accept", &["a", "b"])]);
        let lines = spdy_to_http_header_lines(&headers);
        assert_eq!(lines, vec!["Accept: a, b".to_string()]);
    }

    #[test]
    fn request_header_names_match_capitalize_rule() {
        let headers = mm(&[("accept", &["a", "b"]), ("x-y", &["z"])]);
        let lines = spdy_to_http_header_lines(&headers);
        let re = regex::Regex::new(r"^[A-Z][a-z0-9-]*: ").unwrap();
        for line in &lines {
            assert!(re.is_match(line), "line did not match capitalize rule: {line}");
        }
    }

    #[test]
    fn round_trip_preserves_name_to_values_as_a_set() {
        let original = mm(&[("accept", &["a", "b"]), ("x-y", &["z"])]);
        let lines = spdy_to_http_header_lines(&original);

        // Re-parse the produced HTTP lines back into SPDY-shape pairs.
        let mut reconstructed = HeaderMultiMap::new();
        for line in &lines {
            let (name, value) = line.split_once(": ").unwrap();
            let name = name.to_ascii_lowercase();
            for v in value.split(", ") {
                reconstructed.add(&name, v);
            }
        }

        assert_eq!(reconstructed, original);
    }

    #[test]
    fn duplicate_header_same_value_is_deduped() {
        let raw = b"HTTP/1.1 200 OK\r\nX-Dup: v\r\nX-Dup: v\r\n\r\n";
        let head = parse_origin_response(raw).unwrap().unwrap();
        assert_eq!(head.headers.get("x-dup"), Some(&["v".to_string()][..]));
    }

    #[test]
    fn duplicate_header_different_value_is_accumulated() {
        let raw = b"HTTP/1.1 200 OK\r\nX-Dup: v1\r\nX-Dup: v2\r\n\r\n";
        let head = parse_origin_response(raw).unwrap().unwrap();
        assert_eq!(
            head.headers.get("x-dup"),
            Some(&["v1".to_string(), "v2".to_string()][..])
        );
    }

    #[test]
    fn hop_by_hop_headers_are_dropped() {
        let raw = b"HTTP/1.1 301 Moved\r\nLocation: /y\r\nConnection: close\r\n\r\n";
        let head = parse_origin_response(raw).unwrap().unwrap();
        assert_eq!(head.status_code, 301);
        assert_eq!(head.status_text, "Moved");
        assert_eq!(head.headers.get("connection"), None);
        assert_eq!(head.headers.get("location"), Some(&["/y".to_string()][..]));
    }

    #[test]
    fn status_with_no_message_leaves_text_empty() {
        let raw = b"HTTP/1.1 204 \r\n\r\n";
        let head = parse_origin_response(raw).unwrap().unwrap();
        assert_eq!(head.status_code, 204);
        assert_eq!(head.status_text, "");
    }

    #[test]
    fn status_line_with_no_space_or_reason_still_parses() {
        let raw = b"HTTP/1.1 204\r\n\r\n";
        let head = parse_origin_response(raw).unwrap().unwrap();
        assert_eq!(head.status_code, 204);
        assert_eq!(head.status_text, "");
    }

    #[test]
    fn partial_response_requests_more_bytes() {
        let raw = b"HTTP/1.1 200 OK\r\nX-A: 1\r\n";
        assert!(parse_origin_response(raw).unwrap().is_none());
    }

    #[test]
    fn header_names_are_lowercased() {
        let raw = b"HTTP/1.1 200 OK\r\nX-Custom-Header: v\r\n\r\n";
        let head = parse_origin_response(raw).unwrap().unwrap();
        assert_eq!(head.headers.get("x-custom-header"), Some(&["v".to_string()][..]));
    }
}
