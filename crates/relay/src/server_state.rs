//! Gemeinsamer Server-Zustand fuer den Relay
//!
//! Haelt Konfiguration, Registry und Shutdown-Koordinator als
//! Arc-Referenzen, die sicher zwischen tokio-Tasks geteilt werden koennen.

use std::sync::Arc;
use std::time::Duration;

use crate::registry::SessionRegistry;
use crate::shutdown::ShutdownKoordinator;

/// Konfiguration des Relay-Kerns
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Maximale gleichzeitige Sitzungen (0 = unbegrenzt)
    pub max_sitzungen: usize,
    /// Zeitlimit fuer das Lesen des Namens nach dem Connect
    pub handshake_timeout: Duration,
    /// Inaktive Sitzungen werden nach dieser Zeit getrennt (None = nie)
    pub leerlauf_timeout: Option<Duration>,
    /// Zeitlimit fuer einen einzelnen Schreibvorgang auf eine Verbindung
    pub schreib_timeout: Duration,
    /// Zeitlimit fuer jeden Lesevorgang vom Absender waehrend einer Bilduebertragung
    pub bild_chunk_timeout: Duration,
    /// Wie lange der Acceptor nach dem Shutdown auf Sitzungs-Tasks wartet
    pub abschluss_timeout: Duration,
    /// Maximale Groesse eines Text-Frames (ein Lesevorgang)
    pub max_frame_bytes: usize,
    /// Chunk-Groesse beim Weiterleiten von Bilddaten
    pub bild_chunk_bytes: usize,
    /// Ausgehende Text-Nachrichten mit `\n` abschliessen (Standard: nein,
    /// Clients lesen eine Nachricht pro Lesevorgang)
    pub zeilenumbruch: bool,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            max_sitzungen: 512,
            handshake_timeout: Duration::from_secs(5),
            leerlauf_timeout: Some(Duration::from_secs(3000)),
            schreib_timeout: Duration::from_secs(10),
            bild_chunk_timeout: Duration::from_secs(10),
            abschluss_timeout: Duration::from_secs(5),
            max_frame_bytes: 1024,
            bild_chunk_bytes: 1024,
            zeilenumbruch: false,
        }
    }
}

/// Gemeinsamer Relay-Zustand (Arc-geteilt)
pub struct RelayState {
    pub config: Arc<RelayConfig>,
    pub registry: SessionRegistry,
    pub shutdown: ShutdownKoordinator,
}

impl RelayState {
    pub fn neu(config: RelayConfig) -> Arc<Self> {
        let registry = SessionRegistry::neu();
        let shutdown = ShutdownKoordinator::neu(registry.clone());
        Arc::new(Self {
            config: Arc::new(config),
            registry,
            shutdown,
        })
    }
}
