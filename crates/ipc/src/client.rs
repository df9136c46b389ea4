use anyhow::{Context, Result, bail};
use tokio::net::TcpStream;
use tokio::time::{Duration, sleep};
use tracing::warn;

use crate::framing::{self, DEFAULT_MAX_FRAME_BYTES};
use crate::{Request, RequestKind, Response};

const DEFAULT_ADDR: &str = "127.0.0.1:7878";
const DEFAULT_TIMEOUT_MS: u64 = 750;
const DEFAULT_RETRIES: u32 = 2;
const DEFAULT_BACKOFF_MS: u64 = 50;

/// TCP client for the embserve protocol.
///
/// Each request opens a fresh connection; failures are retried with a linear
/// backoff and every attempt is bounded by the request timeout.
#[derive(Debug, Clone)]
pub struct TcpClient {
    addr: String,
    request_timeout: Duration,
    retries: u32,
    backoff: Duration,
    max_frame_bytes: usize,
}

impl Default for TcpClient {
    fn default() -> Self {
        Self::new(DEFAULT_ADDR)
    }
}

impl TcpClient {
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            request_timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            retries: DEFAULT_RETRIES,
            backoff: Duration::from_millis(DEFAULT_BACKOFF_MS),
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_max_frame_bytes(mut self, max: usize) -> Self {
        self.max_frame_bytes = max;
        self
    }

    pub async fn send(&self, kind: RequestKind) -> Result<Response> {
        self.request(&Request::new(kind)).await
    }

    pub async fn request(&self, req: &Request) -> Result<Response> {
        let payload = framing::encode_message(req)?;

        let mut attempt = 0;
        let mut last_err: Option<anyhow::Error> = None;

        while attempt <= self.retries {
            match tokio::time::timeout(self.request_timeout, self.round_trip(&payload)).await {
                Ok(Ok(resp)) => {
                    // A nil id marks a frame the server rejected before decoding it.
                    if resp.id != req.id && !resp.id.is_nil() {
                        bail!("response id {} does not match request {}", resp.id, req.id);
                    }
                    return Ok(resp);
                }
                Ok(Err(e)) => {
                    warn!("request attempt {} failed: {e:?}", attempt + 1);
                    last_err = Some(e);
                }
                Err(e) => {
                    warn!("request attempt {} timed out: {e:?}", attempt + 1);
                    last_err = Some(e.into());
                }
            }

            attempt += 1;
            if attempt <= self.retries {
                sleep(self.backoff * attempt).await;
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("request failed")))
    }

    async fn round_trip(&self, payload: &[u8]) -> Result<Response> {
        let mut conn = TcpStream::connect(&self.addr)
            .await
            .with_context(|| format!("connect to {}", self.addr))?;
        framing::write_frame(&mut conn, payload, self.max_frame_bytes).await?;
        let Some(frame) = framing::read_frame(&mut conn, self.max_frame_bytes).await? else {
            bail!("server closed the connection without a response");
        };
        Ok(framing::decode_message(&frame)?)
    }
}
