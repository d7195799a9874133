//! CLI argument parsing and validation, producing an immutable
//! [`GlobalOptions`] shared (via `Arc`) by every connection and transaction.

use crate::error::ProxyError;
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "spdy2http", about = "SPDY/2-to-HTTP/1.x protocol-translating reverse proxy")]
struct Cli {
    /// Listen port for inbound SPDY/2 connections.
    #[arg(short = 'p', long)]
    port: u16,

    /// PEM-encoded TLS certificate for the inbound listener.
    #[arg(short = 'c', long)]
    certificate: PathBuf,

    /// PEM-encoded TLS private key for the inbound listener.
    #[arg(short = 'k', long = "certificate-key")]
    certificate_key: PathBuf,

    /// Optional backend override authority (host[:port]); replaces the
    /// request's own host/authority when set.
    #[arg(short = 'b', long)]
    backend_server: Option<String>,

    /// Enable proxy debug logging.
    #[arg(short = 'v', long)]
    verbose: bool,

    /// Enable origin-client debug logging.
    #[arg(short = 'o', long)]
    origin_verbose: bool,

    /// Prefer HTTP/1.0 instead of HTTP/1.1 towards the origin.
    #[arg(short = '0', long)]
    http10: bool,

    /// Synthesize the outbound URL from Host + path instead of requiring
    /// an absolute-URL request-target.
    #[arg(short = 't', long)]
    transparent: bool,

    /// Bind address for the admin endpoint (/healthz, /readyz, /metrics).
    #[arg(long, default_value = "127.0.0.1:9091")]
    admin_listen: String,
}

/// Validated, immutable configuration for the lifetime of the process.
#[derive(Debug, Clone)]
pub struct GlobalOptions {
    pub port: u16,
    pub certificate: PathBuf,
    pub certificate_key: PathBuf,
    pub backend_server: Option<(String, Option<u16>)>,
    pub verbose: bool,
    pub origin_verbose: bool,
    pub http10: bool,
    pub transparent: bool,
    pub admin_listen: String,
}

impl GlobalOptions {
    /// Parse `std::env::args()` and validate the result.
    pub fn from_args() -> Result<Self, ProxyError> {
        Self::from_cli(Cli::parse())
    }

    fn from_cli(cli: Cli) -> Result<Self, ProxyError> {
        if cli.port == 0 {
            return Err(ProxyError::Config("--port must be in 1..=65535".to_string()));
        }
        if !cli.certificate.is_file() {
            return Err(ProxyError::Config(format!(
                "--certificate path does not exist: {}",
                cli.certificate.display()
            )));
        }
        if !cli.certificate_key.is_file() {
            return Err(ProxyError::Config(format!(
                "--certificate-key path does not exist: {}",
                cli.certificate_key.display()
            )));
        }

        let backend_server = cli
            .backend_server
            .as_deref()
            .map(parse_backend_authority)
            .transpose()?;

        Ok(GlobalOptions {
            port: cli.port,
            certificate: cli.certificate,
            certificate_key: cli.certificate_key,
            backend_server,
            verbose: cli.verbose,
            origin_verbose: cli.origin_verbose,
            http10: cli.http10,
            transparent: cli.transparent,
            admin_listen: cli.admin_listen,
        })
    }
}

fn parse_backend_authority(s: &str) -> Result<(String, Option<u16>), ProxyError> {
    match s.rsplit_once(':') {
        Some((host, port_str)) => {
            let port: u16 = port_str
                .parse()
                .map_err(|_| ProxyError::Config(format!("invalid --backend-server port: {s}")))?;
            Ok((host.to_string(), Some(port)))
        }
        None => Ok((s.to_string(), None)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_cli() -> Cli {
        Cli {
            port: 8443,
            certificate: PathBuf::from("/dev/null"),
            certificate_key: PathBuf::from("/dev/null"),
            backend_server: None,
            verbose: false,
            origin_verbose: false,
            http10: false,
            transparent: false,
            admin_listen: "127.0.0.1:9091".to_string(),
        }
    }

    #[test]
    fn rejects_port_zero() {
        let mut cli = base_cli();
        cli.port = 0;
        assert!(matches!(
            GlobalOptions::from_cli(cli),
            Err(ProxyError::Config(_))
        ));
    }

    #[test]
    fn rejects_missing_certificate_file() {
        let mut cli = base_cli();
        cli.certificate = PathBuf::from("/nonexistent/path/to/cert.pem");
        assert!(matches!(
            GlobalOptions::from_cli(cli),
            Err(ProxyError::Config(_))
        ));
    }

    #[test]
    fn parses_backend_with_port() {
        let (host, port) = parse_backend_authority("10.0.0.1:8080").unwrap();
        assert_eq!(host, "10.0.0.1");
        assert_eq!(port, Some(8080));
    }

    #[test]
    fn parses_backend_without_port() {
        let (host, port) = parse_backend_authority("origin.test").unwrap();
        assert_eq!(host, "origin.test");
        assert_eq!(port, None);
    }

    #[test]
    fn rejects_non_numeric_backend_port() {
        assert!(matches!(
            parse_backend_authority("origin.test:abc"),
            Err(ProxyError::Config(_))
        ));
    }
}
