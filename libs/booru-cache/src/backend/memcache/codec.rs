//! memcached text protocol, the `get` and `set` subset.
//!
//! ```text
//! get <key>\r\n
//!   → VALUE <key> <flags> <bytes>\r\n<data>\r\nEND\r\n | END\r\n
//! set <key> <flags> <exptime> <bytes>\r\n<data>\r\n
//!   → STORED\r\n | NOT_STORED\r\n
//! any → ERROR\r\n | CLIENT_ERROR <msg>\r\n | SERVER_ERROR <msg>\r\n
//! ```

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::CacheError;

const CRLF: &[u8] = b"\r\n";
const VALUE_TRAILER: &[u8] = b"\r\nEND\r\n";
const MAX_KEY_LEN: usize = 250;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request<'a> {
    Get {
        key: &'a str,
    },
    Set {
        key: &'a str,
        exptime: u32,
        payload: &'a [u8],
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// Reply to `get`: the payload, or `None` on a miss.
    Value(Option<Bytes>),
    Stored,
    NotStored,
    /// `ERROR`, `CLIENT_ERROR ..` or `SERVER_ERROR ..`, verbatim.
    Error(String),
}

impl Response {
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Response::Value(_) => "VALUE",
            Response::Stored => "STORED",
            Response::NotStored => "NOT_STORED",
            Response::Error(_) => "ERROR",
        }
    }
}

/// Keys are 1..=250 printable ASCII bytes without spaces.
pub fn validate_key(key: &str) -> Result<(), CacheError> {
    if key.is_empty() || key.len() > MAX_KEY_LEN {
        return Err(CacheError::Backend(format!(
            "memcached key must be 1..={MAX_KEY_LEN} bytes, got {}",
            key.len()
        )));
    }
    if !key.bytes().all(|b| b.is_ascii_graphic()) {
        return Err(CacheError::Backend(format!(
            "memcached key contains whitespace or control characters: `{key}`"
        )));
    }
    Ok(())
}

#[derive(Debug, Default)]
pub struct MemcacheCodec;

impl Encoder<Request<'_>> for MemcacheCodec {
    type Error = CacheError;

    fn encode(&mut self, item: Request<'_>, dst: &mut BytesMut) -> Result<(), CacheError> {
        match item {
            Request::Get { key } => {
                validate_key(key)?;
                dst.reserve(key.len() + 6);
                dst.put_slice(b"get ");
                dst.put_slice(key.as_bytes());
                dst.put_slice(CRLF);
            }
            Request::Set {
                key,
                exptime,
                payload,
            } => {
                validate_key(key)?;
                let header = format!("set {key} 0 {exptime} {}\r\n", payload.len());
                dst.reserve(header.len() + payload.len() + CRLF.len());
                dst.put_slice(header.as_bytes());
                dst.put_slice(payload);
                dst.put_slice(CRLF);
            }
        }
        Ok(())
    }
}

impl Decoder for MemcacheCodec {
    type Item = Response;
    type Error = CacheError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Response>, CacheError> {
        let Some(line_end) = find_crlf(src) else {
            return Ok(None);
        };
        let line = String::from_utf8_lossy(&src[..line_end]).into_owned();
        let after_line = line_end + CRLF.len();

        let simple = match line.as_str() {
            "END" => Some(Response::Value(None)),
            "STORED" => Some(Response::Stored),
            "NOT_STORED" => Some(Response::NotStored),
            l if l == "ERROR" || l.starts_with("CLIENT_ERROR") || l.starts_with("SERVER_ERROR") => {
                Some(Response::Error(line.clone()))
            }
            _ => None,
        };
        if let Some(response) = simple {
            src.advance(after_line);
            return Ok(Some(response));
        }

        let Some(header) = line.strip_prefix("VALUE ") else {
            return Err(CacheError::Backend(format!(
                "unexpected memcached reply: `{line}`"
            )));
        };
        let len: usize = header
            .split_ascii_whitespace()
            .nth(2)
            .and_then(|n| n.parse().ok())
            .ok_or_else(|| CacheError::Backend(format!("malformed VALUE line: `{line}`")))?;

        let data_end = after_line + len;
        let frame_len = data_end + VALUE_TRAILER.len();
        if src.len() < frame_len {
            src.reserve(frame_len - src.len());
            return Ok(None);
        }
        if &src[data_end..frame_len] != VALUE_TRAILER {
            return Err(CacheError::Backend(
                "memcached VALUE block is not terminated by END".to_owned(),
            ));
        }

        let frame = src.split_to(frame_len).freeze();
        Ok(Some(Response::Value(Some(frame.slice(after_line..data_end)))))
    }
}

fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(CRLF.len()).position(|w| w == CRLF)
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    fn encode(req: Request<'_>) -> Vec<u8> {
        let mut buf = BytesMut::new();
        MemcacheCodec.encode(req, &mut buf).unwrap();
        buf.to_vec()
    }

    #[test]
    fn encodes_requests() {
        assert_eq!(encode(Request::Get { key: "allSources" }), b"get allSources\r\n");
        assert_eq!(
            encode(Request::Set {
                key: "sourceById_1",
                exptime: 300,
                payload: br#"{"id":1}"#,
            }),
            b"set sourceById_1 0 300 8\r\n{\"id\":1}\r\n"
        );
    }

    #[test]
    fn rejects_bad_keys() {
        let mut buf = BytesMut::new();
        assert!(MemcacheCodec.encode(Request::Get { key: "has space" }, &mut buf).is_err());
        assert!(MemcacheCodec.encode(Request::Get { key: "" }, &mut buf).is_err());
        let long = "k".repeat(251);
        assert!(MemcacheCodec.encode(Request::Get { key: &long }, &mut buf).is_err());
        assert!(buf.is_empty());
    }

    #[test]
    fn decodes_hit_across_partial_reads() {
        let mut codec = MemcacheCodec;
        let mut buf = BytesMut::from(&b"VALUE k 0 5\r\nhel"[..]);
        assert_eq!(codec.decode(&mut buf).unwrap(), None);

        buf.extend_from_slice(b"lo\r\nEND\r\nSTORED\r\n");
        assert_eq!(
            codec.decode(&mut buf).unwrap(),
            Some(Response::Value(Some(Bytes::from_static(b"hello"))))
        );
        assert_eq!(codec.decode(&mut buf).unwrap(), Some(Response::Stored));
        assert!(buf.is_empty());
    }

    #[test]
    fn payload_may_contain_crlf() {
        let mut buf = BytesMut::from(&b"VALUE k 0 4\r\na\r\nb\r\nEND\r\n"[..]);
        assert_eq!(
            MemcacheCodec.decode(&mut buf).unwrap(),
            Some(Response::Value(Some(Bytes::from_static(b"a\r\nb"))))
        );
    }

    #[test]
    fn decodes_miss_and_errors() {
        let mut codec = MemcacheCodec;
        let mut buf = BytesMut::from(&b"END\r\nSERVER_ERROR out of memory\r\nNOT_STORED\r\n"[..]);
        assert_eq!(codec.decode(&mut buf).unwrap(), Some(Response::Value(None)));
        assert_eq!(
            codec.decode(&mut buf).unwrap(),
            Some(Response::Error("SERVER_ERROR out of memory".into()))
        );
        assert_eq!(codec.decode(&mut buf).unwrap(), Some(Response::NotStored));
    }

    #[test]
    fn garbage_is_an_error() {
        let mut buf = BytesMut::from(&b"HELLO\r\n"[..]);
        assert!(MemcacheCodec.decode(&mut buf).is_err());

        let mut buf = BytesMut::from(&b"VALUE k 0 1\r\nxEND!!\r\n"[..]);
        assert!(MemcacheCodec.decode(&mut buf).is_err());
    }
}
