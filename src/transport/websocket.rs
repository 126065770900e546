//! WebSocket client transport.
//!
//! Connects to a `ws://` or `wss://` endpoint and splits the stream into two
//! background tasks:
//!
//! - **Writer**: drains the outbound queue filled by [`Transport::enqueue`]
//! - **Reader**: forwards text and binary frames to the session
//!
//! Both stop when the attempt's cancellation token fires, even mid-frame to a
//! peer that stopped reading. The writer then attempts a close handshake for
//! at most the close timeout. A remote close, a
//! stream error or the end of the stream ends the reader with an error so the
//! session treats it as a failure.

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{FutureExt, SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};
use url::Url;

use crate::error::{Error, Result};

use super::{BackgroundTask, InboundSender, RawMessage, Transport};

// ============================================================================
// Constants
// ============================================================================

/// Default timeout for the TCP connect plus WebSocket handshake.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default limit for the close handshake when the writer stops.
pub const DEFAULT_CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

// ============================================================================
// Types
// ============================================================================

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

/// State of one established link.
struct Link {
    /// Outbound queue feeding the writer task.
    outbound_tx: mpsc::UnboundedSender<RawMessage>,
    /// Stream and queue receiver, taken by `background_tasks`.
    pending: Option<(WsStream, mpsc::UnboundedReceiver<RawMessage>)>,
}

// ============================================================================
// WebSocketTransport
// ============================================================================

/// [`Transport`] over a WebSocket client connection.
///
/// # Example
///
/// ```ignore
/// use std::sync::Arc;
/// use socket_session::{Session, WebSocketTransport};
///
/// let session = Session::builder()
///     .transport(Arc::new(WebSocketTransport::new()))
///     .handler(handler)
///     .cancellation(shutdown.token())
///     .build()?;
///
/// session.open("ws://127.0.0.1:9001").await?;
/// ```
pub struct WebSocketTransport {
    /// Limit for connect plus handshake.
    connect_timeout: Duration,
    /// Limit for the close handshake.
    close_timeout: Duration,
    /// Current link, if connected.
    link: Mutex<Option<Link>>,
}

impl Default for WebSocketTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl WebSocketTransport {
    /// Creates a transport with the default connect timeout.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::with_connect_timeout(DEFAULT_CONNECT_TIMEOUT)
    }

    /// Creates a transport with a custom connect timeout.
    #[inline]
    #[must_use]
    pub fn with_connect_timeout(connect_timeout: Duration) -> Self {
        Self {
            connect_timeout,
            close_timeout: DEFAULT_CLOSE_TIMEOUT,
            link: Mutex::new(None),
        }
    }

    /// Sets the close handshake limit.
    #[inline]
    #[must_use]
    pub fn with_close_timeout(mut self, close_timeout: Duration) -> Self {
        self.close_timeout = close_timeout;
        self
    }

    /// Returns the connect timeout.
    #[inline]
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    /// Returns the close handshake limit.
    #[inline]
    #[must_use]
    pub fn close_timeout(&self) -> Duration {
        self.close_timeout
    }

    /// Returns `true` while a link is held.
    #[inline]
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.link.lock().is_some()
    }

    /// Parses and checks a WebSocket endpoint.
    fn parse_endpoint(host: &str) -> Result<Url> {
        let url = Url::parse(host)?;
        match url.scheme() {
            "ws" | "wss" => Ok(url),
            scheme => Err(Error::protocol(format!(
                "Unsupported scheme '{scheme}', expected ws or wss"
            ))),
        }
    }

    /// Writer loop: outbound queue → socket.
    async fn run_writer(
        mut sink: WsSink,
        mut outbound_rx: mpsc::UnboundedReceiver<RawMessage>,
        cancel: CancellationToken,
        close_timeout: Duration,
    ) -> Result<()> {
        loop {
            tokio::select! {
                biased;

                () = cancel.cancelled() => {
                    debug!("Writer cancelled");
                    break;
                }

                message = outbound_rx.recv() => {
                    let Some(message) = message else {
                        debug!("Outbound queue closed");
                        break;
                    };

                    let frame = match message {
                        RawMessage::Text(text) => Message::Text(text.into()),
                        RawMessage::Binary(data) => Message::Binary(data.into()),
                    };

                    tokio::select! {
                        biased;

                        () = cancel.cancelled() => {
                            debug!("Writer cancelled mid-frame");
                            break;
                        }

                        result = sink.send(frame) => {
                            result?;
                            trace!("Frame written");
                        }
                    }
                }
            }
        }

        match timeout(close_timeout, sink.close()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!(error = %e, "Close handshake failed"),
            Err(_) => debug!(?close_timeout, "Close handshake timed out"),
        }
        Ok(())
    }

    /// Reader loop: socket → session.
    async fn run_reader(
        mut source: WsSource,
        inbound: InboundSender,
        cancel: CancellationToken,
    ) -> Result<()> {
        loop {
            tokio::select! {
                biased;

                () = cancel.cancelled() => {
                    debug!("Reader cancelled");
                    return Ok(());
                }

                message = source.next() => {
                    match message {
                        Some(Ok(Message::Text(text))) => {
                            inbound.deliver(RawMessage::Text(text.as_str().to_owned()))?;
                        }

                        Some(Ok(Message::Binary(data))) => {
                            inbound.deliver(RawMessage::Binary(data.to_vec()))?;
                        }

                        Some(Ok(Message::Close(frame))) => {
                            debug!(?frame, "WebSocket closed by remote");
                            return Err(Error::ConnectionClosed);
                        }

                        Some(Err(e)) => {
                            warn!(error = %e, "WebSocket error");
                            return Err(e.into());
                        }

                        None => {
                            debug!("WebSocket stream ended");
                            return Err(Error::ConnectionClosed);
                        }

                        // Ping/Pong are answered by tungstenite itself
                        Some(Ok(_)) => {}
                    }
                }
            }
        }
    }
}

// ============================================================================
// Transport Implementation
// ============================================================================

#[async_trait]
impl Transport for WebSocketTransport {
    async fn connect(&self, host: &str, cancel: CancellationToken) -> Result<()> {
        let url = Self::parse_endpoint(host)?;
        let limit = self.connect_timeout;

        let ws_stream = tokio::select! {
            biased;

            () = cancel.cancelled() => return Err(Error::Cancelled),

            result = timeout(limit, connect_async(url.as_str())) => {
                let (ws_stream, _response) = result
                    .map_err(|_| Error::connection_timeout_after(limit))?
                    .map_err(|e| Error::connection(format!("WebSocket handshake failed: {e}")))?;
                ws_stream
            }
        };

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let previous = self.link.lock().replace(Link {
            outbound_tx,
            pending: Some((ws_stream, outbound_rx)),
        });
        if previous.is_some() {
            warn!("Replaced a link that was never disconnected");
        }

        info!(%url, "WebSocket connection established");
        Ok(())
    }

    async fn disconnect(&self) {
        // Dropping the queue sender ends the writer, which closes the socket.
        if self.link.lock().take().is_some() {
            debug!("WebSocket link released");
        }
    }

    fn enqueue(&self, message: RawMessage) -> Result<()> {
        let link = self.link.lock();
        let link = link.as_ref().ok_or(Error::ConnectionClosed)?;
        link.outbound_tx
            .send(message)
            .map_err(|_| Error::ConnectionClosed)
    }

    fn background_tasks(
        &self,
        cancel: CancellationToken,
        inbound: InboundSender,
    ) -> Vec<BackgroundTask> {
        let pending = self
            .link
            .lock()
            .as_mut()
            .and_then(|link| link.pending.take());

        let Some((ws_stream, outbound_rx)) = pending else {
            return vec![async { Err::<(), _>(Error::ConnectionClosed) }.boxed()];
        };

        let (sink, source) = ws_stream.split();

        vec![
            Self::run_writer(sink, outbound_rx, cancel.clone(), self.close_timeout).boxed(),
            Self::run_reader(source, inbound, cancel).boxed(),
        ]
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use tokio::net::TcpListener;
    use tokio::sync::oneshot;
    use tokio::task::JoinHandle;
    use tokio::time::sleep;

    /// Starts a one-connection echo server and returns its URL.
    async fn echo_server() -> (String, JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let handle = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            while let Some(Ok(message)) = ws.next().await {
                if message.is_text() || message.is_binary() {
                    if ws.send(message).await.is_err() {
                        break;
                    }
                } else if message.is_close() {
                    break;
                }
            }
        });

        (format!("ws://127.0.0.1:{port}"), handle)
    }

    #[test]
    fn test_default_timeout() {
        let transport = WebSocketTransport::new();
        assert_eq!(transport.connect_timeout(), Duration::from_secs(30));
        assert_eq!(transport.close_timeout(), Duration::from_secs(5));
        assert!(!transport.is_connected());

        let transport = WebSocketTransport::new().with_close_timeout(Duration::from_millis(50));
        assert_eq!(transport.close_timeout(), Duration::from_millis(50));
    }

    #[test]
    fn test_enqueue_without_link() {
        let transport = WebSocketTransport::new();
        let result = transport.enqueue(RawMessage::text("ping"));
        assert!(matches!(result, Err(Error::ConnectionClosed)));
    }

    #[tokio::test]
    async fn test_rejects_non_websocket_scheme() {
        let transport = WebSocketTransport::new();
        let result = transport
            .connect("http://127.0.0.1:1", CancellationToken::new())
            .await;
        assert!(matches!(result, Err(Error::Protocol { .. })));
    }

    #[tokio::test]
    async fn test_rejects_malformed_url() {
        let transport = WebSocketTransport::new();
        let result = transport
            .connect("not a url", CancellationToken::new())
            .await;
        assert!(matches!(result, Err(Error::Url(_))));
    }

    #[tokio::test]
    async fn test_cancelled_before_connect() {
        let transport = WebSocketTransport::new();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = transport.connect("ws://127.0.0.1:1", cancel).await;
        assert!(matches!(result, Err(Error::Cancelled)));
    }

    #[tokio::test]
    async fn test_connection_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let transport = WebSocketTransport::with_connect_timeout(Duration::from_secs(5));
        let result = transport
            .connect(&format!("ws://127.0.0.1:{port}"), CancellationToken::new())
            .await;

        let err = result.unwrap_err();
        assert!(err.is_connection_error());
    }

    #[tokio::test]
    async fn test_echo_roundtrip() {
        let (url, server) = echo_server().await;
        let transport = WebSocketTransport::new();
        let cancel = CancellationToken::new();

        transport.connect(&url, cancel.clone()).await.unwrap();
        assert!(transport.is_connected());

        let (inbound, mut inbound_rx) = InboundSender::channel();
        let tasks: Vec<_> = transport
            .background_tasks(cancel.clone(), inbound)
            .into_iter()
            .map(tokio::spawn)
            .collect();
        assert_eq!(tasks.len(), 2);

        transport.enqueue(RawMessage::text("hello")).unwrap();
        transport.enqueue(RawMessage::binary(vec![1, 2, 3])).unwrap();

        let echoed = timeout(Duration::from_secs(5), inbound_rx.recv())
            .await
            .expect("echo should arrive");
        assert_eq!(echoed, Some(RawMessage::text("hello")));

        let echoed = timeout(Duration::from_secs(5), inbound_rx.recv())
            .await
            .expect("echo should arrive");
        assert_eq!(echoed, Some(RawMessage::binary(vec![1, 2, 3])));

        cancel.cancel();
        for task in tasks {
            let result = timeout(Duration::from_secs(5), task)
                .await
                .expect("task should stop on cancel")
                .unwrap();
            assert!(result.is_ok());
        }

        transport.disconnect().await;
        assert!(!transport.is_connected());
        let _ = timeout(Duration::from_secs(5), server).await;
    }

    #[tokio::test]
    async fn test_remote_close_fails_reader() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            let _ = ws.close(None).await;
        });

        let transport = WebSocketTransport::new();
        let cancel = CancellationToken::new();
        transport
            .connect(&format!("ws://127.0.0.1:{port}"), cancel.clone())
            .await
            .unwrap();

        let (inbound, _inbound_rx) = InboundSender::channel();
        let mut tasks = transport.background_tasks(cancel.clone(), inbound);
        let reader = tasks.pop().unwrap();

        let result = timeout(Duration::from_secs(5), reader)
            .await
            .expect("reader should observe close");
        let err = result.unwrap_err();
        assert!(err.is_connection_error());

        cancel.cancel();
        let _ = server.await;
    }

    #[tokio::test]
    async fn test_cancel_stops_writer_blocked_on_stalled_peer() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let (release_tx, release_rx) = oneshot::channel::<()>();

        // Completes the handshake, then never reads.
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            let _ = release_rx.await;
            drop(ws);
        });

        let transport =
            WebSocketTransport::new().with_close_timeout(Duration::from_millis(200));
        let cancel = CancellationToken::new();
        transport
            .connect(&format!("ws://127.0.0.1:{port}"), cancel.clone())
            .await
            .unwrap();

        let (inbound, _inbound_rx) = InboundSender::channel();
        let mut tasks = transport.background_tasks(cancel.clone(), inbound);
        let _reader = tasks.pop().unwrap();
        let writer = tokio::spawn(tasks.pop().unwrap());

        for _ in 0..32 {
            transport
                .enqueue(RawMessage::binary(vec![0; 1 << 20]))
                .unwrap();
        }
        sleep(Duration::from_millis(200)).await;
        assert!(!writer.is_finished(), "writer should be stuck on the full socket");

        cancel.cancel();
        let result = timeout(Duration::from_secs(5), writer)
            .await
            .expect("writer should stop despite the stalled peer")
            .unwrap();
        assert!(result.is_ok());

        let _ = release_tx.send(());
        let _ = server.await;
    }

    #[test]
    fn test_tasks_without_link_fail() {
        let transport = WebSocketTransport::new();
        let (inbound, _rx) = InboundSender::channel();
        let tasks = transport.background_tasks(CancellationToken::new(), inbound);
        assert_eq!(tasks.len(), 1);
    }
}
