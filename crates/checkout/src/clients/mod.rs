//! Peer-service clients.
//!
//! In a single process the domain services implement the ports directly.
//! [`HttpPeerClient`] implements the same ports over HTTP for deployments
//! where the invoice and product owners run as separate processes.

mod http;

pub use http::{HttpPeerClient, PeerClientConfig};
