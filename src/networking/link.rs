use std::net::SocketAddr;

use tokio::{
    net::{TcpListener, TcpStream},
    sync::mpsc::Sender,
    time
};

use tokio_tungstenite::{accept_async, connect_async};

use tracing::{debug, info, warn};

use crate::{
    error::NetError,
    msg::{Msg2Portal, Msg2Server},
    protocols::link::{
        LinkEvent, LINK_RECONNECT_DELAY, PortalOutMessage, ServerInMessage,
        protocol::new_link
    }
};

/// The portal's end of the link. Every accepted connection is handed to the portal, which
/// keeps only the newest one.
pub struct LinkAcceptor {
    listener: TcpListener,
    tx_portal: Sender<Msg2Portal>,
    next_link_id: usize
}

impl LinkAcceptor {
    pub async fn bind(host: &str, port: u16, tx_portal: Sender<Msg2Portal>) -> Result<Self, NetError> {
        let addr = format!("{}:{}", host, port);
        let listener = TcpListener::bind(&addr).await
            .map_err(|source| NetError::Bind { addr: addr.clone(), source })?;
        info!(%addr, "link listening");

        Ok(LinkAcceptor {
            listener,
            tx_portal,
            next_link_id: 0
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, NetError> {
        Ok(self.listener.local_addr()?)
    }

    pub async fn run(&mut self) {
        loop {
            match self.listener.accept().await {
                Ok((stream, addr)) => {
                    self.next_link_id += 1;
                    let link_id = self.next_link_id;
                    let tx_portal = self.tx_portal.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_link(link_id, stream, addr, tx_portal).await {
                            warn!(link_id, %addr, error = %e, "link handshake failed");
                        }
                    });
                },
                Err(e) => {
                    warn!(error = %e, "error accepting link connection");
                }
            }
        }
    }
}

async fn handle_link(link_id: usize, stream: TcpStream, addr: SocketAddr, tx_portal: Sender<Msg2Portal>) -> Result<(), NetError> {
    let ws_stream = accept_async(stream).await?;
    let (stub, prot) = new_link::<_, PortalOutMessage, ServerInMessage, Msg2Portal>(
        link_id, addr.to_string(), ws_stream, tx_portal.clone());

    tx_portal.send(Msg2Portal::Link(LinkEvent::Connected(stub))).await
        .map_err(|_| NetError::Closed("portal"))?;
    prot.run().await;
    Ok(())
}

/// The server's end of the link. Dials the portal, runs the link until it drops, then tries
/// again after a fixed delay, forever.
pub struct LinkConnector {
    url: String,
    tx_server: Sender<Msg2Server>,
    next_link_id: usize
}

impl LinkConnector {
    pub fn new(host: &str, port: u16, tx_server: Sender<Msg2Server>) -> Self {
        Self {
            url: format!("ws://{}:{}", host, port),
            tx_server,
            next_link_id: 0
        }
    }

    pub async fn run(&mut self) {
        loop {
            if let Err(e) = self.connect_once().await {
                debug!(url = %self.url, error = %e, "link attempt failed");
            }
            if self.tx_server.is_closed() {
                return;
            }
            time::sleep(LINK_RECONNECT_DELAY).await;
        }
    }

    async fn connect_once(&mut self) -> Result<(), NetError> {
        let (ws_stream, _) = connect_async(self.url.as_str()).await?;
        self.next_link_id += 1;
        let (stub, prot) = new_link::<_, ServerInMessage, PortalOutMessage, Msg2Server>(
            self.next_link_id, self.url.clone(), ws_stream, self.tx_server.clone());

        self.tx_server.send(Msg2Server::Link(LinkEvent::Connected(stub))).await
            .map_err(|_| NetError::Closed("server"))?;
        prot.run().await;
        Ok(())
    }
}
