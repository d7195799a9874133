//! The per-request object binding one inbound SPDY stream to one outbound
//! HTTP transaction.
//!
//! Handles that belong exclusively to one side (the SPDY response sink,
//! the HTTP fetch's `JoinHandle`, the body channel's consumer half) are
//! *not* stored here — each is owned by whichever task actually drives it,
//! per the no-back-pointers resolution in the design doc's Design Notes.
//! `ProxyTransaction` carries the data both sides need to agree on:
//! the resolved request and the response metadata once it arrives.

use crate::headers::{HeaderMultiMap, OriginResponseHead};

pub struct ProxyTransaction {
    pub id: u64,
    pub outbound_url: String,
    pub request_header_lines: Vec<String>,
    pub response_status_code: u16,
    /// Preserved byte-for-byte from the origin; empty until the response
    /// head arrives, and may remain empty even after (e.g. `204 \r\n`).
    pub response_status_text: String,
    pub response_version: String,
    pub response_headers: HeaderMultiMap,
    pub origin_done: bool,
}

impl ProxyTransaction {
    pub fn new(id: u64, outbound_url: String, request_header_lines: Vec<String>) -> Self {
        Self {
            id,
            outbound_url,
            request_header_lines,
            response_status_code: 0,
            response_status_text: String::new(),
            response_version: String::new(),
            response_headers: HeaderMultiMap::new(),
            origin_done: false,
        }
    }

    /// `inbound_response` becomes non-null (in the original model) exactly
    /// when this is called — origin headers fully received.
    pub fn apply_origin_head(&mut self, head: &OriginResponseHead) {
        self.response_status_code = head.status_code;
        self.response_status_text = head.status_text.clone();
        self.response_version = head.version.clone();
        self.response_headers = head.headers.clone();
    }

    pub fn mark_origin_done(&mut self) {
        self.origin_done = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headers::parse_origin_response;

    #[test]
    fn apply_origin_head_copies_all_response_fields() {
        let mut txn = ProxyTransaction::new(1, "http://h/p".to_string(), vec![]);
        let raw = b"HTTP/1.1 301 Moved\r\nLocation: /y\r\nConnection: close\r\n\r\n";
        let head = parse_origin_response(raw).unwrap().unwrap();
        txn.apply_origin_head(&head);

        assert_eq!(txn.response_status_code, 301);
        assert_eq!(txn.response_status_text, "Moved");
        assert_eq!(txn.response_headers.get("location"), Some(&["/y".to_string()][..]));
        assert_eq!(txn.response_headers.get("connection"), None);
        assert!(!txn.origin_done);

        txn.mark_origin_done();
        assert!(txn.origin_done);
    }
}
