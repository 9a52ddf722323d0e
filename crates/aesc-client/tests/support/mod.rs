//! Scripted mock channel node for integration tests.
//!
//! Each test spawns one `NodeConn` script per client connection and
//! drives the wire dialogue explicitly: what the node sends, what it
//! expects back.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio_tungstenite::tungstenite::handshake::server::{Request, Response};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

pub const RECV_TIMEOUT: Duration = Duration::from_secs(5);

/// One accepted client connection, node side.
pub struct NodeConn {
    ws: WebSocketStream<TcpStream>,
    /// Query string of the upgrade request.
    pub query: String,
}

impl NodeConn {
    /// Send a raw JSON frame.
    pub async fn send(&mut self, frame: Value) {
        self.ws
            .send(Message::Text(frame.to_string()))
            .await
            .expect("mock node send");
    }

    /// Send a notification.
    pub async fn notify(&mut self, method: &str, params: Value) {
        self.send(json!({ "jsonrpc": "2.0", "method": method, "params": params }))
            .await;
    }

    /// Send a `channels.info` lifecycle event.
    pub async fn info(&mut self, event: &str) {
        self.notify("channels.info", json!({ "data": { "event": event } }))
            .await;
    }

    /// Receive the next JSON frame from the client.
    pub async fn recv(&mut self) -> Value {
        let frame = tokio::time::timeout(RECV_TIMEOUT, async {
            loop {
                match self.ws.next().await {
                    Some(Ok(Message::Text(text))) => {
                        break serde_json::from_str::<Value>(&text).expect("client sent JSON");
                    }
                    Some(Ok(Message::Ping(_) | Message::Pong(_))) => {}
                    other => panic!("mock node: unexpected ws item: {other:?}"),
                }
            }
        })
        .await;
        frame.expect("mock node: timed out waiting for client frame")
    }

    /// Receive the next frame and assert its method.
    pub async fn recv_method(&mut self, method: &str) -> Value {
        let frame = self.recv().await;
        assert_eq!(frame["method"], method, "unexpected method in {frame}");
        frame
    }

    /// Ask the client to sign `tx` under `tag`; returns the signed blob.
    pub async fn request_sign(&mut self, tag: &str, tx: &str) -> String {
        self.request_sign_with(tag, tx, None).await
    }

    /// Ask for a signature, optionally attaching an updates list.
    pub async fn request_sign_with(
        &mut self,
        tag: &str,
        tx: &str,
        updates: Option<Value>,
    ) -> String {
        let mut data = json!({ "tx": tx });
        if let Some(updates) = updates {
            data["updates"] = updates;
        }
        self.notify(&format!("channels.sign.{tag}"), json!({ "data": data }))
            .await;
        let reply = self.recv_method(&format!("channels.{tag}")).await;
        reply["params"]["signed_tx"]
            .as_str()
            .expect("signed_tx in sign reply")
            .to_owned()
    }

    /// Drive one side of the opening handshake to `open`.
    ///
    /// Returns the signed create transaction the client produced.
    pub async fn drive_open(&mut self, initiator: bool, channel_id: &str, fsm_id: &str) -> String {
        self.notify(
            "channels.info",
            json!({ "data": { "event": "fsm_up", "fsm_id": fsm_id } }),
        )
        .await;

        let signed = if initiator {
            self.info("channel_accept").await;
            let signed = self.request_sign("initiator_sign", "tx_create").await;
            self.info("funding_signed").await;
            signed
        } else {
            self.info("channel_open").await;
            let signed = self.request_sign("responder_sign", "tx_create").await;
            self.info("funding_created").await;
            signed
        };

        self.notify(
            "channels.on_chain_tx",
            json!({ "data": { "tx": "tx_create_cosigned", "info": "channel_create_tx" } }),
        )
        .await;
        self.info("own_funding_locked").await;
        self.info("funding_locked").await;
        self.notify(
            "channels.info",
            json!({ "channel_id": channel_id, "data": { "event": "open" } }),
        )
        .await;
        // Initial co-signed state for round 1.
        self.notify(
            "channels.update",
            json!({ "data": { "state": "tx_state_round1" } }),
        )
        .await;
        signed
    }
}

/// Spawn a one-connection mock node; returns its channel endpoint URL.
pub async fn spawn_node<F, Fut>(script: F) -> String
where
    F: FnOnce(NodeConn) -> Fut + Send + 'static,
    Fut: std::future::Future<Output = ()> + Send,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let _ = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.expect("mock node accept");
        let (query_tx, query_rx) = oneshot::channel();
        let ws = tokio_tungstenite::accept_hdr_async(stream, |req: &Request, resp: Response| {
            let _ = query_tx.send(req.uri().query().unwrap_or("").to_owned());
            Ok(resp)
        })
        .await
        .expect("mock node handshake");
        let query = query_rx.await.unwrap_or_default();
        script(NodeConn { ws, query }).await;
    });

    format!("ws://{addr}/channel")
}

/// Poll `cond` until it holds or five seconds pass.
pub async fn wait_until(what: &str, cond: impl Fn() -> bool) {
    let ok = tokio::time::timeout(RECV_TIMEOUT, async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(ok.is_ok(), "timed out waiting for {what}");
}
