use std::time::Duration;

use tokio::{
    io::{AsyncRead, AsyncWrite},
    sync::mpsc::{Sender, UnboundedReceiver},
    time
};

use tokio_stream::wrappers::IntervalStream;

use futures::{
    sink::SinkExt,
    stream::StreamExt
};

use serde_json::{json, Map, Value as JsonValue};

use tokio_tungstenite::WebSocketStream;
use tungstenite::protocol::Message;

use tracing::{debug, trace};

use crate::{
    error::ProtocolError,
    msg::{Msg2MudProtocol, Msg2Portal, ProtocolLink},
    protocols::{GameData, link::ConnectionIn}
};

const PING_INTERVAL: Duration = Duration::from_secs(30);

/// A webclient connection. Both directions carry JSON arrays of the form
/// `[cmd, args, kwargs]`, e.g. `["text", ["Hello world!"], {}]`.
pub struct WebsocketProtocol<T> {
    client_id: String,
    tx_portal: Sender<Msg2Portal>,
    rx_protocol: UnboundedReceiver<Msg2MudProtocol>,
    running: bool,
    reason: String,
    conn: WebSocketStream<T>
}

impl<T> WebsocketProtocol<T> where T: AsyncRead + AsyncWrite + Unpin + Send + 'static {
    pub fn new(link: ProtocolLink, conn: WebSocketStream<T>, tx_portal: Sender<Msg2Portal>) -> Self {
        Self {
            client_id: link.client_id,
            tx_portal,
            rx_protocol: link.rx_protocol,
            running: true,
            reason: String::from("connection closed"),
            conn
        }
    }

    pub async fn run(&mut self) {
        let mut interval_timer = IntervalStream::new(time::interval_at(time::Instant::now() + PING_INTERVAL, PING_INTERVAL));

        while self.running {
            tokio::select! {
                t_msg = self.conn.next() => self.handle_conn(t_msg).await,
                p_msg = self.rx_protocol.recv() => {
                    match p_msg {
                        Some(msg) => self.process_protocol_message(msg).await,
                        None => {
                            self.reason = String::from("portal shut down");
                            self.running = false;
                        }
                    }
                },
                _ = interval_timer.next() => {
                    self.send(Message::Ping(Vec::new())).await;
                }
            }
        }

        let _ = self.conn.close(None).await;
        debug!(client_id = %self.client_id, reason = %self.reason, "websocket connection finished");
        let _ = self.tx_portal.send(Msg2Portal::ClientDisconnected(self.client_id.clone(), self.reason.clone())).await;
    }

    async fn send(&mut self, msg: Message) {
        if let Err(e) = self.conn.send(msg).await {
            self.reason = e.to_string();
            self.running = false;
        }
    }

    async fn handle_conn(&mut self, t_msg: Option<Result<Message, tungstenite::Error>>) {
        match t_msg {
            Some(Ok(Message::Text(s))) => self.handle_text_message(&s).await,
            Some(Ok(Message::Binary(b))) => {
                match std::str::from_utf8(&b) {
                    Ok(s) => self.handle_text_message(s).await,
                    Err(_) => trace!(client_id = %self.client_id, "ignoring non-utf8 binary frame")
                }
            },
            Some(Ok(Message::Close(_))) | None => self.running = false,
            Some(Ok(_)) => {},
            Some(Err(e)) => {
                self.reason = e.to_string();
                self.running = false;
            }
        }
    }

    async fn process_protocol_message(&mut self, msg: Msg2MudProtocol) {
        match msg {
            Msg2MudProtocol::Disconnect(reason) => {
                self.reason = reason;
                self.running = false;
            },
            Msg2MudProtocol::Data(v) => {
                for d in v {
                    let data = json!([d.cmd, d.args, d.kwargs]);
                    self.send(Message::Text(data.to_string())).await;
                }
            },
            Msg2MudProtocol::ServerStatus(status) => {
                let kwargs: Map<String, JsonValue> = status.into_iter()
                    .map(|(k, v)| (k, JsonValue::String(v)))
                    .collect();
                self.send(Message::Text(json!(["mssp", [], kwargs]).to_string())).await;
            }
        }
    }

    async fn handle_text_message(&mut self, s: &str) {
        match parse_client_json(s) {
            Ok(d) => {
                let ev = if d.cmd == "mssp" {
                    ConnectionIn::ReqStatus
                } else {
                    ConnectionIn::GameData(vec![d])
                };
                let _ = self.tx_portal.send(Msg2Portal::FromClient(self.client_id.clone(), ev)).await;
            },
            Err(e) => debug!(client_id = %self.client_id, error = %e, "dropping malformed webclient message")
        }
    }
}

// Accepts `[cmd, args, kwargs]` with args and kwargs optional.
pub fn parse_client_json(s: &str) -> Result<GameData, ProtocolError> {
    let value: JsonValue = serde_json::from_str(s)?;
    let JsonValue::Array(mut parts) = value else {
        return Err(ProtocolError::UnexpectedFrame("expected a json array"));
    };
    if parts.is_empty() || parts.len() > 3 {
        return Err(ProtocolError::UnexpectedFrame("expected [cmd, args, kwargs]"));
    }
    let kwargs = if parts.len() == 3 { parts.pop() } else { None };
    let args = if parts.len() == 2 { parts.pop() } else { None };

    let cmd = match parts.pop() {
        Some(JsonValue::String(cmd)) => cmd,
        _ => return Err(ProtocolError::UnexpectedFrame("cmd must be a string"))
    };
    let args = match args {
        None | Some(JsonValue::Null) => Vec::new(),
        Some(JsonValue::Array(a)) => a,
        Some(other) => vec![other]
    };
    let kwargs = match kwargs {
        None | Some(JsonValue::Null) => Map::new(),
        Some(JsonValue::Object(o)) => o,
        Some(_) => return Err(ProtocolError::UnexpectedFrame("kwargs must be an object"))
    };

    Ok(GameData { cmd, args, kwargs })
}
