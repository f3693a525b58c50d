use std::net::SocketAddr;

use tokio::sync::{
    mpsc::UnboundedReceiver,
    oneshot
};

use crate::protocols::{
    ConnectionDetails, GameData, Protocol,
    link::{ConnectionIn, LinkEvent, PortalOutMessage, ServerInMessage}
};


/// Sent from the portal to one client connection task.
#[derive(Debug, Clone, PartialEq)]
pub enum Msg2MudProtocol {
    Data(Vec<GameData>),
    // Mud Server Status Protocol answer, key/value pairs.
    ServerStatus(Vec<(String, String)>),
    Disconnect(String)
}

/// A freshly accepted socket asking the portal for an identity.
#[derive(Debug)]
pub struct ConnectRequest {
    pub listener: String,
    pub protocol: Protocol,
    pub addr: SocketAddr,
    pub tls: bool,
    pub tx_response: oneshot::Sender<ProtocolLink>
}

/// Everything a connection task needs once the portal has registered it.
#[derive(Debug)]
pub struct ProtocolLink {
    pub client_id: String,
    pub details: ConnectionDetails,
    pub rx_protocol: UnboundedReceiver<Msg2MudProtocol>
}

#[derive(Debug)]
pub enum Msg2Portal {
    Kill,
    ClientAccepted(ConnectRequest),
    FromClient(String, ConnectionIn),
    ClientUpdate(String, ConnectionDetails),
    ClientDisconnected(String, String),
    Link(LinkEvent<PortalOutMessage, ServerInMessage>),
    ListConnections(oneshot::Sender<Vec<ConnectionDetails>>)
}

impl From<LinkEvent<PortalOutMessage, ServerInMessage>> for Msg2Portal {
    fn from(ev: LinkEvent<PortalOutMessage, ServerInMessage>) -> Self {
        Msg2Portal::Link(ev)
    }
}

#[derive(Debug)]
pub enum Msg2Server {
    Kill,
    Link(LinkEvent<ServerInMessage, PortalOutMessage>),
    ListSessions(oneshot::Sender<Vec<ConnectionDetails>>)
}

impl From<LinkEvent<ServerInMessage, PortalOutMessage>> for Msg2Server {
    fn from(ev: LinkEvent<ServerInMessage, PortalOutMessage>) -> Self {
        Msg2Server::Link(ev)
    }
}
