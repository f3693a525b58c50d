use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};
use serde_json::{Map, Value as JsonValue};

pub mod link;
pub mod telnet;
pub mod websocket;

pub const UNKNOWN: &str = "UNKNOWN";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Protocol {
    #[serde(alias = "telnet")]
    Telnet = 0,
    #[serde(alias = "websocket")]
    WebSocket = 1,
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Protocol::Telnet => write!(f, "Telnet"),
            Protocol::WebSocket => write!(f, "WebSocket"),
        }
    }
}

// Ordered so that color support can only ever be upgraded with max().
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum Color {
    #[default]
    NoColor = 0,
    Standard = 1,
    Xterm256 = 2,
    TrueColor = 3
}

/// Everything known about one client. Sent whole across the link on READY, UPDATE and HELLO.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ConnectionDetails {
    pub protocol: Protocol,
    pub client_id: String,
    pub client_name: String,
    pub client_version: String,
    pub host_address: String,
    pub host_port: u16,
    pub connected: DateTime<Utc>,
    pub tls: bool,
    pub utf8: bool,
    pub color: Color,
    pub screen_reader: bool,
    pub proxy: bool,
    pub osc_color_palette: bool,
    pub vt100: bool,
    pub mouse_tracking: bool,
    pub naws: bool,
    pub width: u16,
    pub height: u16,
    pub mccp2: bool,
    pub mccp2_active: bool,
    pub mccp3: bool,
    pub mccp3_active: bool,
    pub mtts: bool,
    pub ttype: bool,
    pub mnes: bool,
    pub suppress_ga: bool,
    pub force_endline: bool,
    pub linemode: bool,
    pub mssp: bool,
    pub gmcp: bool,
    pub msdp: bool,
    pub mxp: bool,
    pub mxp_active: bool,
    pub oob: bool
}

impl Default for ConnectionDetails {
    fn default() -> Self {
        Self {
            protocol: Protocol::Telnet,
            client_id: UNKNOWN.to_string(),
            client_name: UNKNOWN.to_string(),
            client_version: UNKNOWN.to_string(),
            host_address: UNKNOWN.to_string(),
            host_port: 0,
            connected: Utc::now(),
            tls: false,
            utf8: false,
            color: Color::NoColor,
            screen_reader: false,
            proxy: false,
            osc_color_palette: false,
            vt100: false,
            mouse_tracking: false,
            naws: false,
            width: 78,
            height: 24,
            mccp2: false,
            mccp2_active: false,
            mccp3: false,
            mccp3_active: false,
            mtts: false,
            ttype: false,
            mnes: false,
            suppress_ga: false,
            force_endline: false,
            linemode: false,
            mssp: false,
            gmcp: false,
            msdp: false,
            mxp: false,
            mxp_active: false,
            oob: false
        }
    }
}

impl ConnectionDetails {
    pub fn new(client_id: &str, protocol: Protocol) -> Self {
        Self {
            client_id: client_id.to_string(),
            protocol,
            ..Default::default()
        }
    }
}

/// One `(cmd, args, kwargs)` unit of application traffic.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct GameData {
    pub cmd: String,
    #[serde(default)]
    pub args: Vec<JsonValue>,
    #[serde(default)]
    pub kwargs: Map<String, JsonValue>
}

impl GameData {
    pub fn new(cmd: &str, args: Vec<JsonValue>) -> Self {
        Self {
            cmd: cmd.to_string(),
            args,
            kwargs: Default::default()
        }
    }

    pub fn line(text: &str) -> Self {
        Self::new("line", vec![JsonValue::String(text.to_string())])
    }
}
