// athdash-api: async client for the athlete dashboard's JSON data boundary

pub mod client;
pub mod error;
pub mod models;
pub mod transport;

pub use client::{API_NAMESPACE, DashboardClient};
pub use error::Error;
pub use transport::{TlsMode, TransportConfig};
