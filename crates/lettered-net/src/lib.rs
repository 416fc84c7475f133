// Authenticated P2P transport: TLS 1.3 with node-id pinning instead of CA
// validation, one request/response frame per connection.

pub mod client;
pub mod error;
pub mod peer;
pub mod registry;
pub mod server;
pub mod tls;

pub use client::Client;
pub use error::TransportError;
pub use peer::Peer;
pub use registry::Registry;
pub use server::P2pServer;
