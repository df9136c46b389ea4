//! TCP front end: one task per connection, one response frame per request frame.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use ipc::framing::{self, FrameError};
use ipc::{Request, Response};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use uuid::Uuid;

use crate::dispatcher::RequestHandler;

/// Oversized request bodies up to this multiple of the limit are drained before replying.
const DRAIN_LIMIT_FACTOR: usize = 64;

pub async fn bind(addr: &str) -> Result<TcpListener> {
    TcpListener::bind(addr)
        .await
        .with_context(|| format!("bind {addr}"))
}

/// Accept connections until `shutdown` resolves.
pub async fn serve<F>(
    listener: TcpListener,
    handler: Arc<dyn RequestHandler>,
    max_frame_bytes: usize,
    shutdown: F,
) -> Result<()>
where
    F: Future<Output = ()>,
{
    let local = listener.local_addr()?;
    tracing::info!(addr = %local, "listening");
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                tracing::info!(addr = %local, "shutdown requested; no longer accepting");
                return Ok(());
            }
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => spawn_connection(stream, peer, handler.clone(), max_frame_bytes),
                Err(e) => tracing::warn!(error = %e, "accept failed"),
            },
        }
    }
}

fn spawn_connection(
    stream: TcpStream,
    peer: SocketAddr,
    handler: Arc<dyn RequestHandler>,
    max_frame_bytes: usize,
) {
    tokio::spawn(async move {
        tracing::debug!(%peer, "connection opened");
        let (mut reader, mut writer) = stream.into_split();
        match handle_connection(&mut reader, &mut writer, handler, max_frame_bytes).await {
            Ok(()) => tracing::debug!(%peer, "connection closed"),
            Err(e) => tracing::warn!(%peer, error = %e, "connection error"),
        }
    });
}

async fn handle_connection<R, W>(
    reader: &mut R,
    writer: &mut W,
    handler: Arc<dyn RequestHandler>,
    max_frame_bytes: usize,
) -> Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    loop {
        let payload = match framing::read_frame(reader, max_frame_bytes).await {
            Ok(Some(payload)) => payload,
            Ok(None) => return Ok(()),
            Err(FrameError::TooLarge { len, max }) => {
                tracing::warn!(len, max, "request frame exceeds limit; closing connection");
                if len <= DRAIN_LIMIT_FACTOR * max {
                    // Consume the body so the close is clean and the reply is readable.
                    tokio::io::copy(&mut (&mut *reader).take(len as u64), &mut tokio::io::sink())
                        .await?;
                }
                let reply = Response::empty(
                    Uuid::nil(),
                    format!("request of {len} bytes exceeds frame limit of {max}"),
                );
                framing::write_frame(writer, &framing::encode_message(&reply)?, max_frame_bytes)
                    .await?;
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };
        let resp = match framing::decode_message::<Request>(&payload) {
            Ok(req) => {
                let handler = handler.clone();
                // Neighbor scans are CPU-bound; keep them off the reactor.
                tokio::task::spawn_blocking(move || handler.handle(req)).await?
            }
            Err(e) => {
                tracing::warn!(error = %e, "malformed request frame");
                Response::empty(Uuid::nil(), format!("malformed request: {e}"))
            }
        };

        let mut bytes = framing::encode_message(&resp)?;
        if bytes.len() > max_frame_bytes {
            tracing::warn!(id = %resp.id, len = bytes.len(), "response exceeds frame limit");
            bytes = framing::encode_message(&Response::empty(
                resp.id,
                format!("response of {} bytes exceeds frame limit", bytes.len()),
            ))?;
        }
        framing::write_frame(writer, &bytes, max_frame_bytes).await?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ipc::{RequestKind, ResponseBody, TcpClient};
    use tokio::io::AsyncWriteExt;
    use tokio::sync::oneshot;
    use tokio::time::Duration;

    /// Answers everything with an empty body, like a service with no tables loaded.
    struct Unloaded;

    impl RequestHandler for Unloaded {
        fn handle(&self, req: Request) -> Response {
            Response::empty(req.id, "embeddings not loaded")
        }
    }

    struct Echo;

    impl RequestHandler for Echo {
        fn handle(&self, req: Request) -> Response {
            let body = match req.kind {
                RequestKind::GetEmbedding { curies } => ResponseBody::Curies(curies),
                RequestKind::Status => ResponseBody::Curies(
                    (0..100).map(|i| format!("CHEBI:{i:05}").into()).collect(),
                ),
                _ => ResponseBody::Empty,
            };
            Response::new(req.id, body)
        }
    }

    async fn start(
        handler: Arc<dyn RequestHandler>,
        max: usize,
    ) -> (SocketAddr, oneshot::Sender<()>, tokio::task::JoinHandle<Result<()>>) {
        let listener = bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = oneshot::channel::<()>();
        let task = tokio::spawn(serve(listener, handler, max, async move {
            let _ = rx.await;
        }));
        (addr, tx, task)
    }

    #[tokio::test]
    async fn client_round_trip_and_shutdown() {
        let (addr, tx, task) = start(Arc::new(Echo), framing::DEFAULT_MAX_FRAME_BYTES).await;
        let client = TcpClient::new(addr.to_string()).with_request_timeout(Duration::from_secs(2));

        let resp = client
            .send(RequestKind::GetEmbedding {
                curies: vec!["CHEBI:45783".into()],
            })
            .await
            .unwrap();
        assert_eq!(resp.body, ResponseBody::Curies(vec!["CHEBI:45783".into()]));

        tx.send(()).unwrap();
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn empty_handler_response_carries_logs() {
        let (addr, _tx, _task) = start(Arc::new(Unloaded), 4096).await;
        let resp = TcpClient::new(addr.to_string())
            .send(RequestKind::Status)
            .await
            .unwrap();
        assert!(resp.is_empty());
        assert_eq!(resp.logs, vec!["embeddings not loaded".to_string()]);
    }

    #[tokio::test]
    async fn malformed_frame_gets_empty_response() {
        let (addr, _tx, _task) = start(Arc::new(Echo), 4096).await;
        let mut conn = TcpStream::connect(addr).await.unwrap();
        framing::write_frame(&mut conn, &[0xff; 3], 4096).await.unwrap();
        let frame = framing::read_frame(&mut conn, 4096).await.unwrap().unwrap();
        let resp: Response = framing::decode_message(&frame).unwrap();
        assert_eq!(resp.id, Uuid::nil());
        assert!(resp.logs[0].starts_with("malformed request"));
        conn.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn oversized_response_is_replaced() {
        let (addr, _tx, _task) = start(Arc::new(Echo), 512).await;
        let resp = TcpClient::new(addr.to_string())
            .send(RequestKind::Status)
            .await
            .unwrap();
        assert!(resp.is_empty());
        assert!(resp.logs[0].contains("exceeds frame limit"), "{:?}", resp.logs);
    }

    #[tokio::test]
    async fn oversized_request_gets_empty_response() {
        let (addr, _tx, _task) = start(Arc::new(Echo), 512).await;
        let curies = (0..100).map(|i| format!("CHEBI:{i:05}").into()).collect();
        let resp = TcpClient::new(addr.to_string())
            .with_retries(0)
            .send(RequestKind::GetEmbedding { curies })
            .await
            .unwrap();
        assert_eq!(resp.id, Uuid::nil());
        assert!(resp.is_empty());
        assert!(resp.logs[0].contains("exceeds frame limit of 512"), "{:?}", resp.logs);

        // The listener keeps serving requests that fit.
        let resp = TcpClient::new(addr.to_string())
            .send(RequestKind::GetEmbedding {
                curies: vec!["CHEBI:45783".into()],
            })
            .await
            .unwrap();
        assert_eq!(resp.body, ResponseBody::Curies(vec!["CHEBI:45783".into()]));
    }
}
