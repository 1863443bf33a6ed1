//! lanchat-protocol – Wire-Protokoll des LAN-Chat-Relays
//!
//! Dieses Crate definiert alles, was zwischen Client und Server ueber die
//! Leitung geht:
//!
//! - `handshake`: Namens-Registrierung direkt nach dem Verbindungsaufbau
//! - `frame`: eingehende Text-Frames `typ|ziel|inhalt`
//! - `benachrichtigung`: ausgehende Nachrichten vom Server an Clients
//! - `wire`: Frame-Leser fuer den gemischten Text/Binaer-Strom

pub mod benachrichtigung;
pub mod frame;
pub mod handshake;
pub mod wire;

pub use benachrichtigung::Benachrichtigung;
pub use frame::{Frame, FrameTyp};
pub use wire::FrameLeser;
