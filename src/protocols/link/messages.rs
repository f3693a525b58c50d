//! Envelopes carried over the link between the portal and the game server.
//!
//! Per-connection messages (`ConnectionInMessage`, `ConnectionOutMessage`) are always
//! carried in batches inside one of the process-level envelopes. Within a batch, the
//! messages for a given client id keep the order in which they were produced.

use serde::{Serialize, Deserialize};
use serde_json::Value as JsonValue;

use crate::error::ProtocolError;
use crate::protocols::{ConnectionDetails, GameData};

/// Something a client connection did, as seen by the game server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "payload")]
pub enum ConnectionIn {
    #[serde(rename = "GAMEDATA")]
    GameData(Vec<GameData>),
    #[serde(rename = "CONNECT")]
    Connect,
    #[serde(rename = "READY")]
    Ready(ConnectionDetails),
    #[serde(rename = "REQSTATUS")]
    ReqStatus,
    #[serde(rename = "DISCONNECT")]
    Disconnect(String),
    #[serde(rename = "UPDATE")]
    Update(ConnectionDetails),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConnectionInMessage {
    pub client_id: String,
    pub msg: ConnectionIn
}

impl ConnectionInMessage {
    pub fn new(client_id: &str, msg: ConnectionIn) -> Self {
        Self {
            client_id: client_id.to_string(),
            msg
        }
    }
}

/// Something the game server wants done to a client connection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "payload")]
pub enum ConnectionOut {
    #[serde(rename = "GAMEDATA")]
    GameData(Vec<GameData>),
    #[serde(rename = "MSSP")]
    Mssp(Vec<(String, String)>),
    #[serde(rename = "DISCONNECT")]
    Disconnect(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConnectionOutMessage {
    pub client_id: String,
    pub msg: ConnectionOut
}

impl ConnectionOutMessage {
    pub fn new(client_id: &str, msg: ConnectionOut) -> Self {
        Self {
            client_id: client_id.to_string(),
            msg
        }
    }
}

/// Portal to server: everything going into the game server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "payload")]
pub enum ServerIn {
    #[serde(rename = "EVENTS")]
    Events(Vec<ConnectionInMessage>),
    // The full snapshot of every started connection.
    #[serde(rename = "HELLO")]
    Hello(Vec<ConnectionDetails>),
    #[serde(rename = "SYSTEM")]
    System(JsonValue),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerInMessage {
    pub process_id: u32,
    pub msg: ServerIn
}

impl ServerInMessage {
    pub fn new(msg: ServerIn) -> Self {
        Self {
            process_id: std::process::id(),
            msg
        }
    }
}

/// Server to portal: everything the game server sends out to the portal.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "payload")]
pub enum PortalOut {
    #[serde(rename = "EVENTS")]
    Events(Vec<ConnectionOutMessage>),
    // Asks the portal for a full snapshot.
    #[serde(rename = "HELLO")]
    Hello,
    #[serde(rename = "SYSTEM")]
    System(JsonValue),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PortalOutMessage {
    pub process_id: u32,
    pub msg: PortalOut
}

impl PortalOutMessage {
    pub fn new(msg: PortalOut) -> Self {
        Self {
            process_id: std::process::id(),
            msg
        }
    }
}

/// Encoding used for one link frame.
pub trait Envelope: Sized {
    fn encode(&self) -> Result<String, ProtocolError>;
    fn decode(data: &[u8]) -> Result<Self, ProtocolError>;
}

impl<T> Envelope for T where T: Serialize + serde::de::DeserializeOwned {
    fn encode(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }

    fn decode(data: &[u8]) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_slice(data)?)
    }
}
