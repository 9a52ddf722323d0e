//! WebSocket transport to the channel FSM service.
//!
//! One persistent full-duplex text-frame connection per channel. A
//! reader task forwards inbound frames onto an mpsc channel; the write
//! half stays with the worker. Connection loss is surfaced as a final
//! [`TransportEvent::Closed`] item.

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};
use url::Url;

use aesc_core::ChannelError;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Inbound transport events.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransportEvent {
    /// A text frame arrived.
    Frame(String),
    /// The connection closed; carries the close reason when the remote
    /// supplied one.
    Closed(Option<String>),
}

/// The write half of a channel connection.
#[derive(Debug)]
pub struct Transport {
    sink: SplitSink<WsStream, Message>,
    reader: JoinHandle<()>,
}

impl Transport {
    /// Connect to the node and start the reader task.
    ///
    /// Returns the transport and the inbound event stream. A connect
    /// failure is fatal for the session.
    pub async fn connect(url: &Url) -> Result<(Self, mpsc::Receiver<TransportEvent>), ChannelError> {
        let (ws, _response) = connect_async(url.as_str())
            .await
            .map_err(|e| ChannelError::Connection(format!("connect to {url} failed: {e}")))?;
        info!(%url, "channel transport connected");

        let (sink, stream) = ws.split();
        let (event_tx, event_rx) = mpsc::channel(64);
        let reader = tokio::spawn(read_loop(stream, event_tx));

        Ok((
            Self { sink, reader },
            event_rx,
        ))
    }

    /// Send one text frame.
    pub async fn send(&mut self, frame: String) -> Result<(), ChannelError> {
        self.sink
            .send(Message::Text(frame))
            .await
            .map_err(|e| ChannelError::Connection(format!("send failed: {e}")))
    }

    /// Close the connection and stop the reader.
    pub async fn close(&mut self) {
        let _ = self.sink.send(Message::Close(None)).await;
        let _ = self.sink.close().await;
        self.reader.abort();
    }
}

/// Forward inbound frames until the stream ends.
///
/// Pings are answered by the protocol layer while the stream is polled;
/// binary frames that hold UTF-8 are treated as text (some proxies
/// rewrap frames), anything else is dropped with a warning.
async fn read_loop(mut stream: SplitStream<WsStream>, events: mpsc::Sender<TransportEvent>) {
    let reason = loop {
        match stream.next().await {
            Some(Ok(Message::Text(text))) => {
                if events.send(TransportEvent::Frame(text)).await.is_err() {
                    return;
                }
            }
            Some(Ok(Message::Binary(data))) => match String::from_utf8(data) {
                Ok(text) => {
                    if events.send(TransportEvent::Frame(text)).await.is_err() {
                        return;
                    }
                }
                Err(_) => warn!("dropping non-UTF8 binary frame"),
            },
            Some(Ok(Message::Close(frame))) => {
                debug!(?frame, "remote close frame");
                break frame.map(|f| f.reason.to_string());
            }
            Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => {}
            Some(Err(e)) => {
                warn!(error = %e, "websocket read error");
                break Some(e.to_string());
            }
            None => break None,
        }
    };
    let _ = events.send(TransportEvent::Closed(reason)).await;
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;
    use tokio_tungstenite::accept_async;

    async fn ws_server<F, Fut>(handler: F) -> Url
    where
        F: FnOnce(WebSocketStream<TcpStream>) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = ()> + Send,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let _ = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let ws = accept_async(stream).await.unwrap();
            handler(ws).await;
        });
        Url::parse(&format!("ws://{addr}")).unwrap()
    }

    #[tokio::test]
    async fn connect_failure_is_connection_error() {
        // Port 1 is never listening.
        let url = Url::parse("ws://127.0.0.1:1").unwrap();
        let err = Transport::connect(&url).await.unwrap_err();
        assert!(matches!(err, ChannelError::Connection(_)));
    }

    #[tokio::test]
    async fn frames_flow_both_ways() {
        let url = ws_server(|mut ws| async move {
            // Echo one frame then push one of our own.
            if let Some(Ok(Message::Text(text))) = ws.next().await {
                ws.send(Message::Text(text)).await.unwrap();
            }
            ws.send(Message::Text("{\"method\":\"x\"}".into()))
                .await
                .unwrap();
        })
        .await;

        let (mut transport, mut rx) = Transport::connect(&url).await.unwrap();
        transport.send("{\"hello\":1}".into()).await.unwrap();

        assert_eq!(
            rx.recv().await.unwrap(),
            TransportEvent::Frame("{\"hello\":1}".into())
        );
        assert_eq!(
            rx.recv().await.unwrap(),
            TransportEvent::Frame("{\"method\":\"x\"}".into())
        );
    }

    #[tokio::test]
    async fn binary_utf8_frames_are_accepted() {
        let url = ws_server(|mut ws| async move {
            ws.send(Message::Binary(b"{\"method\":\"y\"}".to_vec()))
                .await
                .unwrap();
        })
        .await;

        let (_transport, mut rx) = Transport::connect(&url).await.unwrap();
        assert_eq!(
            rx.recv().await.unwrap(),
            TransportEvent::Frame("{\"method\":\"y\"}".into())
        );
    }

    #[tokio::test]
    async fn remote_close_surfaces_closed_event() {
        let url = ws_server(|mut ws| async move {
            ws.close(None).await.unwrap();
        })
        .await;

        let (_transport, mut rx) = Transport::connect(&url).await.unwrap();
        match rx.recv().await.unwrap() {
            TransportEvent::Closed(_) => {}
            other => panic!("expected close, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn send_after_remote_drop_fails() {
        let url = ws_server(|ws| async move {
            drop(ws);
        })
        .await;

        let (mut transport, mut rx) = Transport::connect(&url).await.unwrap();
        // Wait until the reader notices the drop.
        while let Some(ev) = rx.recv().await {
            if matches!(ev, TransportEvent::Closed(_)) {
                break;
            }
        }
        // The first send may still be buffered; eventually a send fails.
        let mut failed = false;
        for _ in 0..5 {
            if transport.send("{}".into()).await.is_err() {
                failed = true;
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert!(failed, "send should fail after remote drop");
    }
}
