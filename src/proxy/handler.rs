//! Request Handler: invoked once per inbound SPDY request. Resolves the
//! outbound target, translates headers, and hands the assembled request
//! off to the HTTP Client Pool.

use crate::config::GlobalOptions;
use crate::error::ProxyError;
use crate::headers::spdy_to_http_header_lines;
use crate::httpclient::{self, OutboundFetch, OutboundRequest};
use crate::proxy::transaction::ProxyTransaction;
use crate::spdy::InboundRequest;
use crate::uri::Uri;

/// Resolve the absolute outbound URL for an inbound request (§4.3).
pub fn resolve_url(req: &InboundRequest, opts: &GlobalOptions) -> Result<Uri, ProxyError> {
    if opts.transparent {
        let host = match &opts.backend_server {
            Some((h, Some(p))) => format!("{h}:{p}"),
            Some((h, None)) => h.clone(),
            None => req.host.clone(),
        };
        let url = format!("{}://{}{}", req.scheme, host, req.path);
        Uri::parse(&url)
    } else {
        let parsed = Uri::parse(&req.path)?;
        if parsed.scheme.is_empty() || parsed.host.is_empty() {
            return Err(ProxyError::Parse(format!(
                "non-transparent mode requires an absolute request-target, got: {}",
                req.path
            )));
        }

        match &opts.backend_server {
            Some((h, port_override)) => {
                let authority = match port_override {
                    Some(p) => format!("{h}:{p}"),
                    None => h.clone(),
                };
                let url = format!("{}://{}{}", parsed.scheme, authority, parsed.path_and_more);
                Uri::parse(&url)
            }
            None => Ok(parsed),
        }
    }
}

/// Default port for a scheme when the authority did not specify one.
fn default_port(scheme: &str) -> u16 {
    if scheme.eq_ignore_ascii_case("https") {
        443
    } else {
        80
    }
}

/// Build the outbound request-header-line list: the translated SPDY
/// headers, plus a synthesized `Host` and `Connection: close` — both of
/// which the original implementation got for free from libcurl's request
/// construction and which a raw-socket client must add explicitly to stay
/// a valid HTTP/1.x request.
fn build_header_lines(req: &InboundRequest, url: &Uri) -> Vec<String> {
    let mut lines = spdy_to_http_header_lines(&req.headers);
    let host_header = if url.port == 0 {
        url.host.clone()
    } else {
        format!("{}:{}", url.host, url.port)
    };
    lines.push(format!("Host: {host_header}"));
    lines.push("Connection: close".to_string());
    lines
}

/// Outcome of handling one inbound request: the transaction shell plus the
/// handles needed to drive it (fetch task, head future, body consumer).
pub struct HandledRequest {
    pub transaction: ProxyTransaction,
    pub fetch: OutboundFetch,
}

/// Resolve, translate, and dispatch one inbound SPDY request to the HTTP
/// Client Pool. Any failure here is scoped to this transaction (§4.3): the
/// caller synthesizes a SPDY error response and the daemon continues
/// serving other connections.
pub async fn handle_request(
    id: u64,
    req: &InboundRequest,
    opts: &GlobalOptions,
) -> Result<HandledRequest, ProxyError> {
    let url = resolve_url(req, opts)?;
    let header_lines = build_header_lines(req, &url);

    let outbound = OutboundRequest {
        method: req.method.clone(),
        scheme: url.scheme.clone(),
        host: url.host.clone(),
        port: if url.port == 0 { default_port(&url.scheme) } else { url.port },
        path_and_query: if url.path_and_more.is_empty() {
            "/".to_string()
        } else {
            url.path_and_more.clone()
        },
        version: if opts.http10 { "HTTP/1.0" } else { "HTTP/1.1" },
        header_lines: header_lines.clone(),
    };

    let fetch = httpclient::fetch(outbound, opts.origin_verbose).await?;

    let outbound_url = format!(
        "{}://{}{}",
        url.scheme,
        if url.port == 0 {
            url.host.clone()
        } else {
            format!("{}:{}", url.host, url.port)
        },
        url.path_and_more
    );

    Ok(HandledRequest {
        transaction: ProxyTransaction::new(id, outbound_url, header_lines),
        fetch,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headers::HeaderMultiMap;

    fn opts(transparent: bool, backend: Option<(&str, Option<u16>)>, http10: bool) -> GlobalOptions {
        GlobalOptions {
            port: 8443,
            certificate: "/dev/null".into(),
            certificate_key: "/dev/null".into(),
            backend_server: backend.map(|(h, p)| (h.to_string(), p)),
            verbose: false,
            origin_verbose: false,
            http10,
            transparent,
            admin_listen: "127.0.0.1:9091".to_string(),
        }
    }

    fn req(scheme: &str, host: &str, path: &str, method: &str) -> InboundRequest {
        InboundRequest {
            method: method.to_string(),
            scheme: scheme.to_string(),
            host: host.to_string(),
            path: path.to_string(),
            version: "HTTP/1.1".to_string(),
            headers: HeaderMultiMap::new(),
        }
    }

    #[test]
    fn scenario_1_non_transparent_absolute_url_no_backend() {
        let r = req("https", "unused", "https://origin.test/a?b=1", "GET");
        let url = resolve_url(&r, &opts(false, None, false)).unwrap();
        assert_eq!(url.scheme, "https");
        assert_eq!(url.host, "origin.test");
        assert_eq!(url.path_and_more, "/a?b=1");
    }

    #[test]
    fn scenario_3_transparent_with_backend_override() {
        let r = req("https", "h.example", "/x", "GET");
        let url = resolve_url(&r, &opts(true, Some(("10.0.0.1", Some(8080))), false)).unwrap();
        assert_eq!(url.scheme, "https");
        assert_eq!(url.host, "10.0.0.1");
        assert_eq!(url.port, 8080);
        assert_eq!(url.path_and_more, "/x");
    }

    #[test]
    fn transparent_without_backend_uses_inbound_host() {
        let r = req("http", "h.example", "/x", "GET");
        let url = resolve_url(&r, &opts(true, None, false)).unwrap();
        assert_eq!(url.host, "h.example");
    }

    #[test]
    fn non_transparent_rejects_relative_path() {
        let r = req("https", "unused", "/just/a/path", "GET");
        let err = resolve_url(&r, &opts(false, None, false)).unwrap_err();
        assert!(matches!(err, ProxyError::Parse(_)));
    }

    #[test]
    fn non_transparent_with_backend_replaces_authority_only() {
        let r = req("x", "unused", "https://origin.test/a?b=1", "GET");
        let url = resolve_url(&r, &opts(false, Some(("10.0.0.2", None)), false)).unwrap();
        assert_eq!(url.scheme, "https");
        assert_eq!(url.host, "10.0.0.2");
        assert_eq!(url.path_and_more, "/a?b=1");
    }

    #[test]
    fn host_header_includes_port_when_non_default() {
        let url = Uri::parse("https://origin.test:8443/a").unwrap();
        let r = req("https", "origin.test", "https://origin.test:8443/a", "GET");
        let lines = build_header_lines(&r, &url);
        assert!(lines.contains(&"Host: origin.test:8443".to_string()));
        assert!(lines.contains(&"Connection: close".to_string()));
    }
}
