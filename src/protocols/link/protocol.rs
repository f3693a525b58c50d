use std::marker::PhantomData;

use tokio::{
    sync::mpsc::{Sender, UnboundedReceiver, UnboundedSender, unbounded_channel},
    io::{AsyncRead, AsyncWrite}
};

use tokio_util::sync::CancellationToken;

use futures::{StreamExt, SinkExt};

use tracing::{debug, info, trace, warn};

use tokio_tungstenite::WebSocketStream;
use tungstenite::protocol::Message as WsMessage;

use crate::{
    error::ProtocolError,
    protocols::link::messages::Envelope
};


/// What a link reports to the actor that owns it.
#[derive(Debug)]
pub enum LinkEvent<In, Out> {
    Connected(LinkStub<Out>),
    Message(usize, In),
    Disconnected(usize, String)
}

/// The owner's handle on a running link. Dropping every stub, or calling close(),
/// ends the link and discards whatever was still queued.
#[derive(Debug)]
pub struct LinkStub<Out> {
    pub link_id: usize,
    pub peer: String,
    tx_link: UnboundedSender<Out>,
    cancel: CancellationToken
}

impl<Out> Clone for LinkStub<Out> {
    fn clone(&self) -> Self {
        Self {
            link_id: self.link_id,
            peer: self.peer.clone(),
            tx_link: self.tx_link.clone(),
            cancel: self.cancel.clone()
        }
    }
}

impl<Out> LinkStub<Out> {
    /// Queues one envelope, handing it back if the link is already gone.
    pub fn send(&self, msg: Out) -> Result<(), Out> {
        if self.cancel.is_cancelled() {
            return Err(msg);
        }
        self.tx_link.send(msg).map_err(|e| e.0)
    }

    pub fn close(&self) {
        self.cancel.cancel();
    }

    /// A stub with no websocket behind it; whatever is sent lands on the returned receiver.
    #[cfg(test)]
    pub(crate) fn detached(link_id: usize) -> (Self, UnboundedReceiver<Out>) {
        let (tx_link, rx_link) = unbounded_channel();
        let stub = Self {
            link_id,
            peer: format!("test-{}", link_id),
            tx_link,
            cancel: CancellationToken::new()
        };
        (stub, rx_link)
    }
}

pub struct LinkProtocol<T, In, Out, M> {
    link_id: usize,
    conn: WebSocketStream<T>,
    rx_link: UnboundedReceiver<Out>,
    tx_owner: Sender<M>,
    cancel: CancellationToken,
    _in: PhantomData<In>
}

/// Wraps an established websocket into a link, returning the stub for the owner and the
/// protocol to be run.
pub fn new_link<T, In, Out, M>(link_id: usize, peer: String, conn: WebSocketStream<T>, tx_owner: Sender<M>)
    -> (LinkStub<Out>, LinkProtocol<T, In, Out, M>)
{
    let (tx_link, rx_link) = unbounded_channel();
    let cancel = CancellationToken::new();
    let stub = LinkStub {
        link_id,
        peer,
        tx_link,
        cancel: cancel.clone()
    };
    let prot = LinkProtocol {
        link_id,
        conn,
        rx_link,
        tx_owner,
        cancel,
        _in: PhantomData
    };
    (stub, prot)
}

impl<T, In, Out, M> LinkProtocol<T, In, Out, M>
    where
        T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
        In: Envelope + Send + 'static,
        Out: Envelope + Send + 'static,
        M: From<LinkEvent<In, Out>> + Send + 'static
{
    pub async fn run(self) {
        let Self { link_id, conn, mut rx_link, tx_owner, cancel, .. } = self;
        let (mut sink, mut stream) = conn.split();

        // Read duty: decode each frame and hand it to the owner.
        let reader = async {
            while let Some(frame) = stream.next().await {
                let data = match frame {
                    Ok(WsMessage::Text(s)) => s.into_bytes(),
                    Ok(WsMessage::Binary(b)) => b,
                    Ok(WsMessage::Close(_)) => return String::from("closed by peer"),
                    Ok(_) => continue,
                    Err(e) => return e.to_string()
                };
                match decode_frame::<In>(&data) {
                    Ok(msg) => {
                        trace!(link_id, "link frame received");
                        if tx_owner.send(M::from(LinkEvent::<In, Out>::Message(link_id, msg))).await.is_err() {
                            return String::from("owner went away");
                        }
                    },
                    Err(e) => {
                        warn!(link_id, error = %e, "dropping malformed link frame");
                    }
                }
            }
            String::from("stream ended")
        };

        // Write duty: drain the outbound queue in order.
        let writer = async {
            while let Some(msg) = rx_link.recv().await {
                let text = match msg.encode() {
                    Ok(t) => t,
                    Err(e) => {
                        warn!(link_id, error = %e, "could not serialize link envelope");
                        continue;
                    }
                };
                if let Err(e) = sink.send(WsMessage::Text(text)).await {
                    return e.to_string();
                }
            }
            String::from("owner dropped the link")
        };

        let reason = tokio::select! {
            biased;
            _ = cancel.cancelled() => String::from("replaced"),
            r = reader => r,
            w = writer => w,
        };

        cancel.cancel();
        let _ = sink.close().await;
        info!(link_id, reason = %reason, "link closed");
        if tx_owner.send(M::from(LinkEvent::<In, Out>::Disconnected(link_id, reason))).await.is_err() {
            debug!(link_id, "owner gone before link disconnect was reported");
        }
    }
}

fn decode_frame<In: Envelope>(data: &[u8]) -> Result<In, ProtocolError> {
    if data.is_empty() {
        return Err(ProtocolError::UnexpectedFrame("empty"));
    }
    In::decode(data)
}
