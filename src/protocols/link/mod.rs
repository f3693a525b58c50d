pub mod messages;
pub mod protocol;

pub use messages::{
    ConnectionIn, ConnectionInMessage, ConnectionOut, ConnectionOutMessage,
    Envelope, PortalOut, PortalOutMessage, ServerIn, ServerInMessage
};
pub use protocol::{LinkEvent, LinkStub};

use std::time::Duration;

/// Delay between attempts while the server is trying to reach the portal.
pub const LINK_RECONNECT_DELAY: Duration = Duration::from_millis(100);
