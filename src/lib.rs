// Client-side messaging core for the SmartCruit recruitment platform
pub mod directory;
pub mod models;
pub mod relay;
pub mod rest;
pub mod session;

// Re-export main types for convenience
pub use directory::ContactDirectory;
pub use models::*;
pub use relay::{ConnectionState, RelayClient, RelayConfig};
pub use rest::RestClient;
pub use session::ChatSession;
