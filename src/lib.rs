pub mod config;
pub mod error;
pub mod msg;
pub mod networking;
pub mod portal;
pub mod protocols;
pub mod server;
pub mod session;
pub mod util;
