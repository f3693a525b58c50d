pub mod codec;
pub mod codes;
pub mod protocol;

pub use codec::{TelnetCodec, TelnetEvent};
pub use protocol::TelnetProtocol;
