//! Fehlertypen fuer den LAN-Chat-Relay
//!
//! Ein zentraler Fehler-Enum fuer Handshake, Protokoll, Routing und
//! Transport. Ob ein Fehler dem Absender gemeldet wird oder die Sitzung
//! beendet, entscheiden `ist_meldbar` und `beendet_sitzung`.

use thiserror::Error;

/// Result-Alias fuer den Relay
pub type RelayResult<T> = std::result::Result<T, RelayError>;

/// Alle Fehlerzustaende des Relays
#[derive(Debug, Error)]
pub enum RelayError {
    // --- Handshake ---
    #[error("Handshake-Zeitlimit ueberschritten")]
    HandshakeZeitlimit,

    #[error("Leerer Name im Handshake")]
    LeererName,

    #[error("Ungueltiger Name: {0}")]
    UngueltigerName(String),

    #[error("Name bereits vergeben: {0}")]
    NameVergeben(String),

    // --- Protokoll & Routing ---
    #[error("Ungueltiger Frame: {0}")]
    UngueltigerFrame(String),

    #[error("Ziel nicht gefunden: {0}")]
    ZielNichtGefunden(String),

    #[error("Freundschaftsanfrage an sich selbst")]
    SelbstAnfrage,

    #[error("Bilduebertragung unvollstaendig: {empfangen}/{erwartet} Bytes")]
    UebertragungUnvollstaendig { erwartet: u64, empfangen: u64 },

    #[error("Zustellung an {0} fehlgeschlagen")]
    ZustellungFehlgeschlagen(String),

    // --- Verbindung ---
    #[error("Verbindung vom Peer getrennt")]
    PeerGetrennt,

    #[error("Transportfehler: {0}")]
    Transport(#[from] std::io::Error),

    // --- Server ---
    #[error("Server voll: maximale Sitzungsanzahl erreicht")]
    ServerVoll,

    #[error("Server wird heruntergefahren")]
    ServerFaehrtHerunter,
}

impl RelayError {
    /// Erstellt einen Frame-Fehler
    pub fn frame(grund: impl Into<String>) -> Self {
        Self::UngueltigerFrame(grund.into())
    }

    /// true wenn der Fehler dem Absender als Frame gemeldet wird und die
    /// Sitzung weiterlaeuft
    pub fn ist_meldbar(&self) -> bool {
        matches!(
            self,
            Self::UngueltigerFrame(_)
                | Self::ZielNichtGefunden(_)
                | Self::SelbstAnfrage
                | Self::UebertragungUnvollstaendig { .. }
                | Self::ZustellungFehlgeschlagen(_)
        )
    }

    /// true wenn der Fehler die betroffene Sitzung beendet
    pub fn beendet_sitzung(&self) -> bool {
        matches!(self, Self::PeerGetrennt | Self::Transport(_))
    }

    /// true wenn der Fehler schon die Sitzungsgruendung verhindert
    pub fn ist_handshake_fehler(&self) -> bool {
        matches!(
            self,
            Self::HandshakeZeitlimit
                | Self::LeererName
                | Self::UngueltigerName(_)
                | Self::NameVergeben(_)
                | Self::ServerVoll
                | Self::ServerFaehrtHerunter
        )
    }
}
