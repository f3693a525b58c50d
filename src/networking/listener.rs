use std::net::SocketAddr;

use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::{TcpListener, TcpStream},
    sync::{mpsc::Sender, oneshot}
};

use tokio_rustls::TlsAcceptor;
use tokio_tungstenite::accept_async;
use tokio_util::codec::Framed;

use tracing::{debug, info, warn};

use crate::{
    error::NetError,
    msg::{ConnectRequest, Msg2Portal, ProtocolLink},
    portal::ListenerDef,
    protocols::{
        Protocol,
        telnet::{TelnetCodec, TelnetProtocol},
        websocket::WebsocketProtocol
    }
};

/// Accepts client sockets for one configured listener and hands each to its protocol.
pub struct ClientListener {
    def: ListenerDef,
    listener: TcpListener,
    tls_acceptor: Option<TlsAcceptor>,
    tx_portal: Sender<Msg2Portal>
}

impl ClientListener {
    pub async fn bind(def: ListenerDef, tls_acceptor: Option<TlsAcceptor>, tx_portal: Sender<Msg2Portal>) -> Result<Self, NetError> {
        let addr = format!("{}:{}", def.host, def.port);
        let listener = TcpListener::bind(&addr).await
            .map_err(|source| NetError::Bind { addr: addr.clone(), source })?;
        info!(listener = %def.name, protocol = %def.protocol, %addr, tls = tls_acceptor.is_some(), "listening");

        Ok(Self {
            def,
            listener,
            tls_acceptor,
            tx_portal
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, NetError> {
        Ok(self.listener.local_addr()?)
    }

    pub async fn run(&mut self) {
        loop {
            match self.listener.accept().await {
                Ok((stream, addr)) => {
                    let name = self.def.name.clone();
                    let protocol = self.def.protocol;
                    let tls_acceptor = self.tls_acceptor.clone();
                    let tx_portal = self.tx_portal.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_client(name.clone(), protocol, stream, addr, tls_acceptor, tx_portal).await {
                            debug!(listener = %name, %addr, error = %e, "client setup failed");
                        }
                    });
                },
                Err(e) => {
                    warn!(listener = %self.def.name, error = %e, "error accepting connection");
                }
            }
        }
    }
}

async fn handle_client(listener: String, protocol: Protocol, stream: TcpStream, addr: SocketAddr,
                       tls_acceptor: Option<TlsAcceptor>, tx_portal: Sender<Msg2Portal>) -> Result<(), NetError> {
    match tls_acceptor {
        Some(acceptor) => {
            let tls_stream = acceptor.accept(stream).await?;
            serve_client(listener, protocol, tls_stream, addr, true, tx_portal).await
        },
        None => serve_client(listener, protocol, stream, addr, false, tx_portal).await
    }
}

async fn serve_client<S>(listener: String, protocol: Protocol, socket: S, addr: SocketAddr, tls: bool,
                         tx_portal: Sender<Msg2Portal>) -> Result<(), NetError>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static
{
    match protocol {
        Protocol::Telnet => {
            let link = register_client(listener, protocol, addr, tls, &tx_portal).await?;
            let mut prot = TelnetProtocol::new(link, Framed::new(socket, TelnetCodec::default()), tx_portal);
            prot.run().await;
        },
        Protocol::WebSocket => {
            let ws_stream = accept_async(socket).await?;
            let link = register_client(listener, protocol, addr, tls, &tx_portal).await?;
            let mut prot = WebsocketProtocol::new(link, ws_stream, tx_portal);
            prot.run().await;
        }
    }
    Ok(())
}

// Asks the portal for a client id and the channel it will use to reach this connection.
async fn register_client(listener: String, protocol: Protocol, addr: SocketAddr, tls: bool,
                         tx_portal: &Sender<Msg2Portal>) -> Result<ProtocolLink, NetError> {
    let (tx_response, rx_response) = oneshot::channel();
    let req = ConnectRequest {
        listener,
        protocol,
        addr,
        tls,
        tx_response
    };
    tx_portal.send(Msg2Portal::ClientAccepted(req)).await.map_err(|_| NetError::Closed("portal"))?;
    rx_response.await.map_err(|_| NetError::Closed("portal"))
}
