//! lanchat-relay – Verbindungs- und Relay-Kern des LAN-Chat-Servers
//!
//! ## Architektur
//! ```text
//! TcpListener
//!     |
//!     v
//! RelayServer (Accept-Loop, JoinSet)
//!     |
//!     +-- ClientConnection (ein Task pro Verbindung)
//!             |
//!             +-- Handshake -> SessionRegistry
//!             |
//!             +-- Leseschleife -> MessageDispatcher
//!                                   |
//!                                   +-- text / friend_req / friend_reply -> Ziel-Verbindung
//!                                   +-- user_query -> Absender
//!                                   +-- image -> BildTransfer
//!
//! ShutdownKoordinator (watch-Kanal) -> Acceptor, Sitzungen, Registry
//! ```
//!
//! Jeder Dispatch haelt die Registry-Sperre, jede Verbindung hat ihre eigene
//! Schreib-Sperre. Gesperrt wird immer zuerst die Registry, dann eine
//! Verbindung.

pub mod bild_transfer;
pub mod connection;
pub mod dispatcher;
pub mod registry;
pub mod server_state;
pub mod session;
pub mod shutdown;
pub mod tcp;

pub use connection::{ClientConnection, SitzungsEnde};
pub use dispatcher::{DispatchErgebnis, MessageDispatcher};
pub use registry::{SessionRegistry, SitzungsEintrag};
pub use server_state::{RelayConfig, RelayState};
pub use session::{Sitzung, VerbindungsHandle};
pub use shutdown::{auf_signal_warten, BetriebsZustand, ShutdownKoordinator};
pub use tcp::RelayServer;
