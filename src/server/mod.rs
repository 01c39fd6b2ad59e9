//! Tokio TCP server speaking HTTP/1.1.
//!
//! One task per connection. Connections are persistent unless the request
//! asks otherwise, and pipelined requests are answered in order.

use std::{future::Future, net::SocketAddr, sync::Arc};

use bytes::BytesMut;
use thiserror::Error;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
};
use tracing::{debug, error, info, warn};

use crate::http::{
    StatusCode,
    request::{Request, RequestError},
    response::Response,
};

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to bind to {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
}

/// Largest request (head plus body) accepted; bigger ones get `413`.
const MAX_REQUEST_SIZE: usize = 8 * 1024 * 1024;
const INITIAL_BUF_SIZE: usize = 4096;

/// A bound listener waiting for a handler.
///
/// ```rust,no_run
/// use thunder::{Request, Response, StatusCode, server::Server};
///
/// # async fn demo() -> Result<(), thunder::ServerError> {
/// let server = Server::bind("127.0.0.1:8080").await?;
/// server
///     .run(|req: Request| async move {
///         Response::new(StatusCode::Ok).body(req.path().to_owned())
///     })
///     .await
/// # }
/// ```
pub struct Server {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl Server {
    /// # Errors
    ///
    /// [`ServerError::Bind`] when the address is unusable or taken.
    pub async fn bind(addr: impl AsRef<str>) -> Result<Self, ServerError> {
        let addr = addr.as_ref();
        let listener = TcpListener::bind(addr).await.map_err(|source| ServerError::Bind {
            addr: addr.to_owned(),
            source,
        })?;
        let local_addr = listener.local_addr()?;
        Ok(Self {
            listener,
            local_addr,
        })
    }

    /// Useful after binding port `0`.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Serves forever; see [`run_until`](Self::run_until) to stop.
    pub async fn run<H, F>(self, handler: H) -> Result<(), ServerError>
    where
        H: Fn(Request) -> F + Send + Sync + 'static,
        F: Future<Output = Response> + Send + 'static,
    {
        self.run_until(handler, std::future::pending()).await
    }

    /// Like [`run`](Self::run), but stops accepting connections once
    /// `shutdown` resolves. Connections already accepted finish on their own.
    ///
    /// ```rust,no_run
    /// use thunder::{Response, StatusCode, server::Server};
    ///
    /// # async fn demo() -> Result<(), thunder::ServerError> {
    /// let server = Server::bind("127.0.0.1:0").await?;
    /// server
    ///     .run_until(
    ///         |_req| async { Response::new(StatusCode::Ok) },
    ///         async { let _ = tokio::signal::ctrl_c().await; },
    ///     )
    ///     .await
    /// # }
    /// ```
    pub async fn run_until<H, F, S>(self, handler: H, shutdown: S) -> Result<(), ServerError>
    where
        H: Fn(Request) -> F + Send + Sync + 'static,
        F: Future<Output = Response> + Send + 'static,
        S: Future<Output = ()>,
    {
        let handler = Arc::new(handler);
        info!(address = %self.local_addr, "thunder listening");
        tokio::pin!(shutdown);

        loop {
            let (stream, peer_addr) = tokio::select! {
                biased;
                () = &mut shutdown => {
                    info!(address = %self.local_addr, "shutting down");
                    return Ok(());
                }
                accepted = self.listener.accept() => match accepted {
                    Ok(pair) => pair,
                    Err(e) => {
                        error!(error = %e, "failed to accept connection");
                        continue;
                    }
                },
            };

            debug!(peer = %peer_addr, "connection accepted");
            let handler = Arc::clone(&handler);

            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, peer_addr, handler).await {
                    warn!(peer = %peer_addr, error = %e, "connection closed with error");
                }
            });
        }
    }
}

// Answers every complete request already buffered before reading more.
async fn handle_connection<H, F>(
    mut stream: TcpStream,
    peer_addr: SocketAddr,
    handler: Arc<H>,
) -> Result<(), std::io::Error>
where
    H: Fn(Request) -> F + Send + Sync + 'static,
    F: Future<Output = Response> + Send + 'static,
{
    let mut buf = BytesMut::with_capacity(INITIAL_BUF_SIZE);

    loop {
        let parsed = Request::parse(&buf);
        let message_len = match &parsed {
            Ok((_, len)) => *len,
            Err(_) => buf.len(),
        };
        if message_len > MAX_REQUEST_SIZE {
            warn!(peer = %peer_addr, size = message_len, "request too large, sending 413");
            let response = Response::new(StatusCode::PayloadTooLarge)
                .body("Request entity too large")
                .keep_alive(false);
            stream.write_all(&response.into_bytes()).await?;
            break;
        }

        match parsed {
            Ok((request, message_len)) => {
                if buf.len() >= message_len {
                    let keep_alive = request.is_keep_alive();
                    respond(&mut stream, peer_addr, &handler, request, keep_alive).await?;
                    let _ = buf.split_to(message_len);
                    if !keep_alive {
                        debug!(peer = %peer_addr, "Connection: close, shutting down");
                        break;
                    }
                    continue;
                }
            }
            // Head or chunked body not yet fully received.
            Err(RequestError::Incomplete) => {}
            Err(e) => {
                warn!(peer = %peer_addr, error = %e, "bad request, sending 400");
                let response = Response::new(StatusCode::BadRequest)
                    .body(format!("Bad Request: {e}"))
                    .keep_alive(false);
                stream.write_all(&response.into_bytes()).await?;
                break;
            }
        }

        if stream.read_buf(&mut buf).await? == 0 {
            // The peer stopped sending mid-body; the handler sees the short
            // body and `Request::read_body` reports it.
            if let Ok((request, _)) = Request::parse(&buf) {
                debug!(peer = %peer_addr, "peer closed with a truncated body");
                respond(&mut stream, peer_addr, &handler, request, false).await?;
            } else {
                debug!(peer = %peer_addr, "connection closed by peer");
            }
            break;
        }
    }

    Ok(())
}

async fn respond<H, F>(
    stream: &mut TcpStream,
    peer_addr: SocketAddr,
    handler: &Arc<H>,
    request: Request,
    keep_alive: bool,
) -> Result<(), std::io::Error>
where
    H: Fn(Request) -> F + Send + Sync + 'static,
    F: Future<Output = Response> + Send + 'static,
{
    debug!(
        peer = %peer_addr,
        method = %request.method(),
        path = %request.path(),
        "dispatching request"
    );
    let response = handler(request).await.keep_alive(keep_alive);
    stream.write_all(&response.into_bytes()).await?;
    stream.flush().await
}

#[cfg(test)]
mod tests {
    use tokio::sync::oneshot;

    use super::*;

    async fn spawn_echo() -> (SocketAddr, oneshot::Sender<()>, tokio::task::JoinHandle<()>) {
        let server = Server::bind("127.0.0.1:0").await.unwrap();
        let addr = server.local_addr();
        let (tx, rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            server
                .run_until(
                    |req: Request| async move {
                        match req.read_body() {
                            Ok(body) => Response::new(StatusCode::Ok).body_bytes(body),
                            Err(_) => Response::new(StatusCode::InternalServerError),
                        }
                    },
                    async {
                        let _ = rx.await;
                    },
                )
                .await
                .unwrap();
        });
        (addr, tx, task)
    }

    async fn exchange(addr: SocketAddr, raw: &[u8], half_close: bool) -> String {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(raw).await.unwrap();
        if half_close {
            stream.shutdown().await.unwrap();
        }
        let mut out = Vec::new();
        stream.read_to_end(&mut out).await.unwrap();
        String::from_utf8(out).unwrap()
    }

    #[tokio::test]
    async fn body_waits_for_content_length() {
        let (addr, tx, task) = spawn_echo().await;
        let text = exchange(
            addr,
            b"POST /echo HTTP/1.1\r\nContent-Length: 5\r\nConnection: close\r\n\r\nhello",
            false,
        )
        .await;
        assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(text.ends_with("hello"));

        tx.send(()).unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn pipelined_requests_are_answered_in_order() {
        let (addr, tx, task) = spawn_echo().await;
        let text = exchange(
            addr,
            b"POST /a HTTP/1.1\r\nContent-Length: 3\r\n\r\none\
              POST /b HTTP/1.1\r\nContent-Length: 3\r\nConnection: close\r\n\r\ntwo",
            false,
        )
        .await;
        let first = text.find("one").unwrap();
        let second = text.find("two").unwrap();
        assert!(first < second);

        tx.send(()).unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn truncated_body_reaches_the_handler() {
        let (addr, tx, task) = spawn_echo().await;
        let text = exchange(
            addr,
            b"POST /echo HTTP/1.1\r\nContent-Length: 50\r\n\r\nshort",
            true,
        )
        .await;
        assert!(text.starts_with("HTTP/1.1 500 Internal Server Error\r\n"));

        tx.send(()).unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn posts_without_length_are_answered_separately() {
        let (addr, tx, task) = spawn_echo().await;
        let text = exchange(
            addr,
            b"POST /api/x HTTP/1.1\r\nHost: a\r\n\r\n\
              POST /api/x HTTP/1.1\r\nHost: a\r\nConnection: close\r\n\r\n",
            false,
        )
        .await;
        assert_eq!(text.matches("HTTP/1.1 200 OK\r\n").count(), 2);
        assert_eq!(text.matches("Content-Length: 0\r\n").count(), 2);

        tx.send(()).unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn chunked_body_is_decoded_before_dispatch() {
        let (addr, tx, task) = spawn_echo().await;
        let text = exchange(
            addr,
            b"POST /echo HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n\
              b\r\n{\"q\":\"foo\"}\r\n0\r\n\r\n\
              POST /echo HTTP/1.1\r\nContent-Length: 3\r\nConnection: close\r\n\r\ntwo",
            false,
        )
        .await;
        assert!(text.contains("Content-Length: 11\r\n\r\n{\"q\":\"foo\"}"));
        assert!(text.ends_with("two"));
        assert!(!text.contains("400 Bad Request"));

        tx.send(()).unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn oversized_declared_length_is_refused_up_front() {
        let (addr, tx, task) = spawn_echo().await;
        let raw = format!(
            "POST /echo HTTP/1.1\r\nContent-Length: {}\r\n\r\nabc",
            MAX_REQUEST_SIZE + 1
        );
        let text = exchange(addr, raw.as_bytes(), false).await;
        assert!(text.starts_with("HTTP/1.1 413 Payload Too Large\r\n"));

        tx.send(()).unwrap();
        task.await.unwrap();
    }
}
