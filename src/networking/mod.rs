pub mod link;
pub mod listener;
pub mod tls;

pub use link::{LinkAcceptor, LinkConnector};
pub use listener::ClientListener;
