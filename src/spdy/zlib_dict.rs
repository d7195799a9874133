//! Header-block (de)compression for the SPDY transport.
//!
//! Real SPDY/2 shares one zlib deflate/inflate context for the lifetime of
//! a connection, primed with a fixed dictionary of common HTTP tokens so
//! even the first header block compresses well. Byte-level interop with
//! production SPDY/2 stacks is explicitly out of scope here (§1, §4.6);
//! what the core bridging logic actually depends on is that header blocks
//! round-trip through *some* shared per-connection compression state, so
//! `HeaderCodec` keeps one persistent `Compress`/`Decompress` pair per
//! connection and primes both with `DICTIONARY` at construction time.

use crate::error::ProxyError;
use crate::headers::HeaderMultiMap;
use flate2::{Compress, Compression, Decompress, FlushCompress, FlushDecompress};

/// A shared vocabulary of common HTTP tokens, used to prime the deflate
/// window for both directions of a connection.
pub const DICTIONARY: &[u8] = b"optionsgetheadpostputdeletetraceconnectaccept\
accept-charsetaccept-encodingaccept-languageauthorizationexpectfromhostif-\
modified-sinceif-matchif-none-matchif-rangeif-unmodified-sincemax-forwards\
proxy-authorizationrangerefereruser-agent100101200201202203204205206300301\
302303304305306307400401402403404405406407408409410411412413414415416417\
500501502503504505accept-rangesageetaglocationproxy-authenticatepublic\
retry-afterservervarywarningwww-authenticateallowcontentbasecontent-encoding\
cache-controlconnectiondatetrailertransfer-encodingupgradeviawarning\
content-languagecontent-lengthcontent-locationcontent-md5content-range\
content-typeetagexpireslast-modifiedset-cookie:method:path:version:host:scheme";

pub struct HeaderCodec {
    compress: Compress,
    decompress: Decompress,
}

impl HeaderCodec {
    pub fn new() -> Self {
        let mut compress = Compress::new(Compression::default(), true);
        let mut decompress = Decompress::new(true);

        let mut primer = Vec::new();
        let _ = compress.compress_vec(DICTIONARY, &mut primer, FlushCompress::Sync);
        let mut sink = Vec::new();
        let _ = decompress.decompress_vec(&primer, &mut sink, FlushDecompress::Sync);

        Self { compress, decompress }
    }

    pub fn compress_headers(&mut self, headers: &HeaderMultiMap) -> Result<Vec<u8>, ProxyError> {
        let raw = encode_name_value_block(headers);
        let mut out = Vec::with_capacity(raw.len() + 16);
        self.compress
            .compress_vec(&raw, &mut out, FlushCompress::Sync)
            .map_err(|e| ProxyError::Protocol(format!("header compression failed: {e}")))?;
        Ok(out)
    }

    pub fn decompress_headers(&mut self, block: &[u8]) -> Result<HeaderMultiMap, ProxyError> {
        let mut out = Vec::with_capacity(block.len() * 4 + 16);
        self.decompress
            .decompress_vec(block, &mut out, FlushDecompress::Sync)
            .map_err(|e| ProxyError::Protocol(format!("header decompression failed: {e}")))?;
        decode_name_value_block(&out)
    }
}

impl Default for HeaderCodec {
    fn default() -> Self {
        Self::new()
    }
}

fn encode_name_value_block(headers: &HeaderMultiMap) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&(headers.len() as u32).to_be_bytes());
    for (name, values) in headers.iter() {
        out.extend_from_slice(&(name.len() as u32).to_be_bytes());
        out.extend_from_slice(name.as_bytes());
        let value = values.join("\0");
        out.extend_from_slice(&(value.len() as u32).to_be_bytes());
        out.extend_from_slice(value.as_bytes());
    }
    out
}

fn decode_name_value_block(buf: &[u8]) -> Result<HeaderMultiMap, ProxyError> {
    let mut headers = HeaderMultiMap::new();
    let mut pos = 0usize;
    let count = read_u32(buf, &mut pos)?;
    for _ in 0..count {
        let name_len = read_u32(buf, &mut pos)? as usize;
        let name = read_str(buf, &mut pos, name_len)?;
        let value_len = read_u32(buf, &mut pos)? as usize;
        let value = read_str(buf, &mut pos, value_len)?;
        for v in value.split('\0') {
            headers.add(&name.to_ascii_lowercase(), v);
        }
    }
    Ok(headers)
}

fn read_u32(buf: &[u8], pos: &mut usize) -> Result<u32, ProxyError> {
    if *pos + 4 > buf.len() {
        return Err(ProxyError::Protocol("truncated SPDY header block".to_string()));
    }
    let v = u32::from_be_bytes([buf[*pos], buf[*pos + 1], buf[*pos + 2], buf[*pos + 3]]);
    *pos += 4;
    Ok(v)
}

fn read_str(buf: &[u8], pos: &mut usize, len: usize) -> Result<String, ProxyError> {
    if *pos + len > buf.len() {
        return Err(ProxyError::Protocol("truncated SPDY header block".to_string()));
    }
    let s = String::from_utf8_lossy(&buf[*pos..*pos + len]).to_string();
    *pos += len;
    Ok(s)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_block_round_trips_through_compression() {
        let mut headers = HeaderMultiMap::new();
        headers.add(":method", "GET");
        headers.add(":path", "/a?b=1");
        headers.add("accept", "a");
        headers.add("accept", "b");

        let mut codec = HeaderCodec::new();
        let compressed = codec.compress_headers(&headers).unwrap();
        let decoded = codec.decompress_headers(&compressed).unwrap();

        assert_eq!(decoded.get(":method"), Some(&["GET".to_string()][..]));
        assert_eq!(decoded.get(":path"), Some(&["/a?b=1".to_string()][..]));
        assert_eq!(
            decoded.get("accept"),
            Some(&["a".to_string(), "b".to_string()][..])
        );
    }

    #[test]
    fn persistent_codec_handles_multiple_blocks_on_one_connection() {
        let mut codec = HeaderCodec::new();
        let mut first = HeaderMultiMap::new();
        first.add(":method", "GET");
        let compressed_first = codec.compress_headers(&first).unwrap();

        let mut second = HeaderMultiMap::new();
        second.add(":method", "POST");
        let compressed_second = codec.compress_headers(&second).unwrap();

        let mut decoder = HeaderCodec::new();
        let decoded_first = decoder.decompress_headers(&compressed_first).unwrap();
        let decoded_second = decoder.decompress_headers(&compressed_second).unwrap();

        assert_eq!(decoded_first.get(":method"), Some(&["GET".to_string()][..]));
        assert_eq!(decoded_second.get(":method"), Some(&["POST".to_string()][..]));
    }
}
