use std::fmt;

/// Error taxonomy for the proxy.
///
/// `Config` and `Startup` are process-fatal (checked before the daemon
/// starts accepting connections). Everything else is scoped to a single
/// transaction or connection and must never take the daemon down.
#[derive(Debug)]
pub enum ProxyError {
    Config(String),
    Startup(String),
    Parse(String),
    Protocol(String),
    Resource(String),
    Io(String),
}

impl ProxyError {
    /// The SPDY response status this error should be surfaced as when it
    /// aborts a single transaction rather than the whole process.
    pub fn status_code(&self) -> u16 {
        match self {
            ProxyError::Parse(_) => 400,
            ProxyError::Protocol(_) => 502,
            ProxyError::Resource(_) => 503,
            ProxyError::Io(_) => 502,
            ProxyError::Config(_) | ProxyError::Startup(_) => 500,
        }
    }
}

impl fmt::Display for ProxyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProxyError::Config(msg) => write!(f, "config error: {}", msg),
            ProxyError::Startup(msg) => write!(f, "startup error: {}", msg),
            ProxyError::Parse(msg) => write!(f, "parse error: {}", msg),
            ProxyError::Protocol(msg) => write!(f, "protocol error: {}", msg),
            ProxyError::Resource(msg) => write!(f, "resource error: {}", msg),
            ProxyError::Io(msg) => write!(f, "io error: {}", msg),
        }
    }
}

impl std::error::Error for ProxyError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_match_taxonomy() {
        assert_eq!(ProxyError::Parse("bad uri".into()).status_code(), 400);
        assert_eq!(ProxyError::Protocol("bad status line".into()).status_code(), 502);
        assert_eq!(ProxyError::Resource("channel full".into()).status_code(), 503);
        assert_eq!(ProxyError::Io("connect refused".into()).status_code(), 502);
    }
}
