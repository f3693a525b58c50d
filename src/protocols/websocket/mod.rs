pub mod protocol;

pub use protocol::WebsocketProtocol;
