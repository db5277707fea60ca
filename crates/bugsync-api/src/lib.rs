// bugsync-api: Async Rust client for the bug tracker REST API and live update channel

pub mod bugs;
pub mod client;
pub mod error;
pub mod models;
pub mod transport;
pub mod websocket;

pub use client::BugClient;
pub use error::Error;
pub use models::BugDto;
pub use transport::{TlsMode, TransportConfig};
pub use websocket::{LiveChannel, LiveConfig, LiveEvent, LiveEventKind, ReconnectConfig};
