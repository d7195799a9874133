//! SPDY Transport: the in-scope, from-scratch SPDY/2 framing and
//! TLS-terminating daemon that the bridging core treats as its I/O
//! boundary (§4.6 of the design doc).

pub mod daemon;
pub mod frame;
pub mod zlib_dict;

pub use daemon::{ResponseSink, SpdyDaemon};

use crate::headers::HeaderMultiMap;

/// One inbound SPDY request, scalar pseudo-header fields pulled out of the
/// compressed header block, with `headers` holding everything else.
#[derive(Debug, Clone)]
pub struct InboundRequest {
    pub method: String,
    pub scheme: String,
    pub host: String,
    /// The raw `:path` pseudo-header value — already includes the query
    /// string, per SPDY convention.
    pub path: String,
    pub version: String,
    pub headers: HeaderMultiMap,
}
