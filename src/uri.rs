//! RFC 2396 request-target parsing.
//!
//! Splits a request-target string into scheme / authority / host / port /
//! path / query / fragment. This is intentionally a thin grammar layer —
//! it does not validate that the result makes sense as a fetchable URL;
//! that judgement belongs to the request handler (transparent vs
//! non-transparent mode, §4.3 of the design doc).

use crate::error::ProxyError;
use std::sync::OnceLock;

/// `^(([^:/?#]+):)?(//([^/?#]*))?([^?#]*)(\?([^#]*))?(#(.*))?`
fn grammar() -> &'static regex::Regex {
    static RE: OnceLock<regex::Regex> = OnceLock::new();
    RE.get_or_init(|| {
        regex::Regex::new(r"^(([^:/?#]+):)?(//([^/?#]*))?([^?#]*)(\?([^#]*))?(#(.*))?")
            .expect("static URI grammar is valid regex")
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Uri {
    pub scheme: String,
    pub host_and_port: String,
    pub host: String,
    /// 0 if no port was present in the authority.
    pub port: u16,
    pub path: String,
    /// path + query (with leading `?`) + fragment (with leading `#`),
    /// each only appended when the corresponding group matched.
    pub path_and_more: String,
    pub query: String,
    pub fragment: String,
}

impl Uri {
    /// Parse a request-target string per RFC 2396. An empty scheme or
    /// empty host are legal parse outcomes — it is the caller's job to
    /// reject those where the operating mode requires an absolute URL.
    pub fn parse(input: &str) -> Result<Uri, ProxyError> {
        let caps = grammar()
            .captures(input)
            .ok_or_else(|| ProxyError::Parse(format!("request-target did not match URI grammar: {input}")))?;

        let scheme = caps.get(2).map(|m| m.as_str()).unwrap_or("").to_string();
        let host_and_port = caps.get(4).map(|m| m.as_str()).unwrap_or("").to_string();
        let path = caps.get(5).map(|m| m.as_str()).unwrap_or("").to_string();
        let query = caps.get(7).map(|m| m.as_str()).unwrap_or("").to_string();
        let fragment = caps.get(9).map(|m| m.as_str()).unwrap_or("").to_string();

        let (host, port) = split_host_port(&host_and_port)?;

        let mut path_and_more = path.clone();
        if caps.get(7).is_some() {
            path_and_more.push('?');
            path_and_more.push_str(&query);
        }
        if caps.get(9).is_some() {
            path_and_more.push('#');
            path_and_more.push_str(&fragment);
        }

        Ok(Uri {
            scheme,
            host_and_port,
            host,
            port,
            path,
            path_and_more,
            query,
            fragment,
        })
    }
}

/// Split `host_and_port` on the *last* `:` (so IPv6-bracketed literals
/// with no explicit port, e.g. `[::1]`, are handled as "no colon"
/// relative to the bracket, but a `host:port` suffix after the bracket
/// is still recognized).
fn split_host_port(host_and_port: &str) -> Result<(String, u16), ProxyError> {
    if host_and_port.is_empty() {
        return Ok((String::new(), 0));
    }

    match host_and_port.rfind(':') {
        None => Ok((host_and_port.to_string(), 0)),
        Some(idx) => {
            let host = &host_and_port[..idx];
            let port_str = &host_and_port[idx + 1..];
            let port: u16 = port_str
                .parse()
                .ok()
                .filter(|p| *p >= 1)
                .ok_or_else(|| ProxyError::Parse(format!("UriInvalidPort: {port_str}")))?;
            Ok((host.to_string(), port))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_absolute_url() {
        let u = Uri::parse("https://origin.test:8443/a/b?x=1&y=2#frag").unwrap();
        assert_eq!(u.scheme, "https");
        assert_eq!(u.host, "origin.test");
        assert_eq!(u.port, 8443);
        assert_eq!(u.path, "/a/b");
        assert_eq!(u.query, "x=1&y=2");
        assert_eq!(u.fragment, "frag");
        assert_eq!(u.path_and_more, "/a/b?x=1&y=2#frag");
    }

    #[test]
    fn round_trips_each_component_byte_for_byte() {
        let u = Uri::parse("http://h:1/p?q#f").unwrap();
        assert_eq!(u.scheme, "http");
        assert_eq!(u.host, "h");
        assert_eq!(u.port, 1);
        assert_eq!(u.path, "/p");
        assert_eq!(u.query, "q");
        assert_eq!(u.fragment, "f");
    }

    #[test]
    fn no_port_defaults_to_zero() {
        let u = Uri::parse("http://origin.test/a").unwrap();
        assert_eq!(u.port, 0);
        assert_eq!(u.host, "origin.test");
    }

    #[test]
    fn path_and_more_without_query_or_fragment_is_just_path() {
        let u = Uri::parse("http://h/only/path").unwrap();
        assert_eq!(u.path_and_more, "/only/path");
    }

    #[test]
    fn path_and_more_with_query_but_no_fragment() {
        let u = Uri::parse("http://h/p?q=1").unwrap();
        assert_eq!(u.path_and_more, "/p?q=1");
    }

    #[test]
    fn path_and_more_with_fragment_but_no_query() {
        let u = Uri::parse("http://h/p#f").unwrap();
        assert_eq!(u.path_and_more, "/p#f");
    }

    #[test]
    fn empty_scheme_and_host_are_legal() {
        let u = Uri::parse("/just/a/path?x=1").unwrap();
        assert_eq!(u.scheme, "");
        assert_eq!(u.host, "");
        assert_eq!(u.path, "/just/a/path");
    }

    #[test]
    fn port_zero_is_invalid() {
        let err = Uri::parse("http://h:0/p").unwrap_err();
        assert!(matches!(err, ProxyError::Parse(_)));
    }

    #[test]
    fn port_out_of_range_is_invalid() {
        let err = Uri::parse("http://h:65536/p").unwrap_err();
        assert!(matches!(err, ProxyError::Parse(_)));
    }

    #[test]
    fn port_non_numeric_is_invalid() {
        let err = Uri::parse("http://h:abc/p").unwrap_err();
        assert!(matches!(err, ProxyError::Parse(_)));
    }

    #[test]
    fn port_max_value_is_valid() {
        let u = Uri::parse("http://h:65535/p").unwrap();
        assert_eq!(u.port, 65535);
    }
}
