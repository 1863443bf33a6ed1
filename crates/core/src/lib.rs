//! lanchat-core – Gemeinsame Typen und Fehlertypen
//!
//! Dieses Crate stellt die Bausteine bereit, die von allen anderen
//! LAN-Chat-Crates gemeinsam genutzt werden: die Fehler-Taxonomie des
//! Relays und die Sitzungs-ID.

pub mod error;
pub mod types;

// Re-Exporte fuer bequemen Zugriff
pub use error::{RelayError, RelayResult};
pub use types::SessionId;
