use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_util::codec::Framed;
use tracing::{debug, warn};

use super::CacheBackend;
use crate::CacheError;

mod codec;

use codec::{MemcacheCodec, Request, Response};

/// Longest TTL memcached reads as relative seconds; larger values are taken
/// as a unix timestamp.
const MAX_RELATIVE_TTL: u32 = 60 * 60 * 24 * 30;

type Conn = Framed<TcpStream, MemcacheCodec>;

struct Server {
    addr: String,
    conn: Mutex<Option<Conn>>,
}

/// memcached over TCP, one connection per server opened on first use.
///
/// Keys are spread across servers by FNV-1a hash. A connection that errors or
/// times out is dropped and reopened by the next call.
pub struct MemcacheBackend {
    servers: Vec<Server>,
    timeout: Duration,
}

impl MemcacheBackend {
    /// # Errors
    /// Returns `CacheError::Config` when `servers` is empty.
    pub fn new<S: AsRef<str>>(servers: &[S], timeout: Duration) -> Result<Self, CacheError> {
        if servers.is_empty() {
            return Err(CacheError::Config(
                "memcache backend needs at least one server".to_owned(),
            ));
        }
        let servers = servers
            .iter()
            .map(|s| Server {
                addr: s.as_ref().trim_start_matches("memcache://").to_owned(),
                conn: Mutex::new(None),
            })
            .collect();
        Ok(Self { servers, timeout })
    }

    fn server_for(&self, key: &str) -> &Server {
        let len = u64::try_from(self.servers.len()).unwrap_or(1);
        let idx = usize::try_from(fnv1a(key) % len).unwrap_or(0);
        &self.servers[idx]
    }

    /// One request/response exchange. Waiting for the server's connection and
    /// talking to the server share a single deadline of `self.timeout`.
    async fn round_trip(&self, key: &str, request: Request<'_>) -> Result<Response, CacheError> {
        codec::validate_key(key)?;
        let server = self.server_for(key);
        let deadline = Instant::now() + self.timeout;

        let Ok(mut slot) = tokio::time::timeout_at(deadline, server.conn.lock()).await else {
            return Err(self.timed_out(server));
        };
        match tokio::time::timeout_at(deadline, exchange(&server.addr, &mut slot, request)).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(e)) => {
                *slot = None;
                Err(e)
            }
            Err(_) => {
                // a reply may still be in flight on this connection
                *slot = None;
                Err(self.timed_out(server))
            }
        }
    }

    fn timed_out(&self, server: &Server) -> CacheError {
        let timeout_ms = self.timeout.as_millis();
        warn!(addr = %server.addr, timeout_ms, "memcached call timed out");
        CacheError::Backend(format!("{} did not answer within {timeout_ms}ms", server.addr))
    }
}

async fn exchange(
    addr: &str,
    slot: &mut Option<Conn>,
    request: Request<'_>,
) -> Result<Response, CacheError> {
    if slot.is_none() {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        debug!(addr, "memcached connection opened");
        *slot = Some(Framed::new(stream, MemcacheCodec));
    }
    let Some(conn) = slot.as_mut() else {
        return Err(CacheError::Backend(format!("no connection to {addr}")));
    };
    conn.send(request).await?;
    conn.next()
        .await
        .ok_or_else(|| CacheError::Backend(format!("{addr} closed the connection")))?
}

#[async_trait]
impl CacheBackend for MemcacheBackend {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        match self.round_trip(key, Request::Get { key }).await? {
            Response::Value(None) => Ok(None),
            Response::Value(Some(bytes)) => String::from_utf8(bytes.to_vec())
                .map(Some)
                .map_err(|e| CacheError::Backend(format!("payload for `{key}` is not UTF-8: {e}"))),
            Response::Error(msg) => Err(CacheError::Backend(msg)),
            other => Err(CacheError::Backend(format!(
                "unexpected reply to get: {}",
                other.kind()
            ))),
        }
    }

    async fn set(&self, key: &str, payload: String, ttl_secs: u32) -> Result<(), CacheError> {
        let request = Request::Set {
            key,
            exptime: exptime(ttl_secs, SystemTime::now()),
            payload: payload.as_bytes(),
        };
        match self.round_trip(key, request).await? {
            Response::Stored => Ok(()),
            Response::NotStored => Err(CacheError::Backend(format!("`{key}` was not stored"))),
            Response::Error(msg) => Err(CacheError::Backend(msg)),
            other @ Response::Value(_) => Err(CacheError::Backend(format!(
                "unexpected reply to set: {}",
                other.kind()
            ))),
        }
    }

    fn name(&self) -> &'static str {
        "memcache"
    }
}

/// TTLs up to thirty days are sent as-is; longer ones become an absolute
/// unix timestamp.
fn exptime(ttl_secs: u32, now: SystemTime) -> u32 {
    if ttl_secs <= MAX_RELATIVE_TTL {
        return ttl_secs;
    }
    let now = now.duration_since(UNIX_EPOCH).map_or(0, |d| d.as_secs());
    u32::try_from(now + u64::from(ttl_secs)).unwrap_or(u32::MAX)
}

fn fnv1a(key: &str) -> u64 {
    key.bytes().fold(0xcbf2_9ce4_8422_2325, |hash, b| {
        (hash ^ u64::from(b)).wrapping_mul(0x0100_0000_01b3)
    })
}
