//! Server-Konfiguration
//!
//! Wird beim Start aus einer TOML-Datei geladen. Alle Felder haben
//! sinnvolle Standardwerte, sodass der Server ohne Konfigurationsdatei
//! lauffaehig ist.

use std::path::Path;
use std::time::Duration;

use lanchat_relay::RelayConfig;
use serde::{Deserialize, Serialize};

/// Vollstaendige Server-Konfiguration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Allgemeine Server-Einstellungen
    pub server: ServerEinstellungen,
    /// Netzwerk-Einstellungen
    pub netzwerk: NetzwerkEinstellungen,
    /// Zeitlimits fuer Handshake, Leerlauf und Uebertragungen
    pub zeitlimits: ZeitlimitEinstellungen,
    /// Wire-Protokoll
    pub protokoll: ProtokollEinstellungen,
    /// Logging-Einstellungen
    pub logging: LoggingEinstellungen,
}

/// Allgemeine Server-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerEinstellungen {
    /// Anzeigename des Servers (nur fuer Logs)
    pub name: String,
    /// Maximale Anzahl gleichzeitiger Verbindungen (0 = unbegrenzt)
    pub max_sitzungen: usize,
}

impl Default for ServerEinstellungen {
    fn default() -> Self {
        Self {
            name: "LAN-Chat".into(),
            max_sitzungen: 512,
        }
    }
}

/// Netzwerk-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetzwerkEinstellungen {
    pub bind_adresse: String,
    pub port: u16,
}

impl Default for NetzwerkEinstellungen {
    fn default() -> Self {
        Self {
            bind_adresse: "0.0.0.0".into(),
            port: 8888,
        }
    }
}

/// Zeitlimits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ZeitlimitEinstellungen {
    /// Zeit bis der Name nach dem Connect eintreffen muss
    pub handshake_ms: u64,
    /// Leerlauf bis zur Trennung (0 = nie)
    pub leerlauf_sek: u64,
    /// Obergrenze fuer einen Schreibvorgang auf eine Verbindung
    pub schreib_ms: u64,
    /// Obergrenze fuer jeden Lesevorgang waehrend einer Bilduebertragung
    pub bild_chunk_ms: u64,
    /// Wartezeit auf Sitzungs-Tasks beim Shutdown
    pub abschluss_ms: u64,
}

impl Default for ZeitlimitEinstellungen {
    fn default() -> Self {
        Self {
            handshake_ms: 5000,
            leerlauf_sek: 3000,
            schreib_ms: 10_000,
            bild_chunk_ms: 10_000,
            abschluss_ms: 5000,
        }
    }
}

/// Wire-Protokoll-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtokollEinstellungen {
    /// Maximale Groesse eines Text-Frames
    pub max_frame_bytes: usize,
    /// Chunk-Groesse beim Weiterleiten von Bilddaten
    pub bild_chunk_bytes: usize,
    /// Ausgehende Text-Nachrichten mit `\n` abschliessen
    pub zeilenumbruch: bool,
}

impl Default for ProtokollEinstellungen {
    fn default() -> Self {
        Self {
            max_frame_bytes: 1024,
            bild_chunk_bytes: 1024,
            zeilenumbruch: false,
        }
    }
}

/// Logging-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingEinstellungen {
    /// Log-Level oder Filter-Direktive
    pub level: String,
    /// Format: "json" oder "text"
    pub format: String,
}

impl Default for LoggingEinstellungen {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

impl ServerConfig {
    /// Laedt die Konfiguration aus einer TOML-Datei.
    /// Gibt die Standardkonfiguration zurueck wenn die Datei nicht existiert.
    pub fn laden(pfad: impl AsRef<Path>) -> anyhow::Result<Self> {
        let pfad = pfad.as_ref();
        match std::fs::read_to_string(pfad) {
            Ok(inhalt) => {
                let config: Self = toml::from_str(&inhalt).map_err(|e| {
                    anyhow::anyhow!("Konfigurationsfehler in '{}': {e}", pfad.display())
                })?;
                config.pruefen()?;
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(
                    pfad = %pfad.display(),
                    "Konfigurationsdatei nicht gefunden, verwende Standardwerte"
                );
                Ok(Self::default())
            }
            Err(e) => Err(anyhow::anyhow!(
                "Konfigurationsdatei '{}' nicht lesbar: {e}",
                pfad.display()
            )),
        }
    }

    /// Weist Werte zurueck, mit denen der Relay nicht arbeiten kann
    pub fn pruefen(&self) -> anyhow::Result<()> {
        if self.protokoll.max_frame_bytes == 0 {
            anyhow::bail!("protokoll.max_frame_bytes muss groesser als 0 sein");
        }
        if self.protokoll.bild_chunk_bytes == 0 {
            anyhow::bail!("protokoll.bild_chunk_bytes muss groesser als 0 sein");
        }
        if self.zeitlimits.handshake_ms == 0 {
            anyhow::bail!("zeitlimits.handshake_ms muss groesser als 0 sein");
        }
        Ok(())
    }

    /// Gibt die vollstaendige Bind-Adresse fuer TCP zurueck
    pub fn bind_adresse(&self) -> String {
        format!("{}:{}", self.netzwerk.bind_adresse, self.netzwerk.port)
    }

    /// Uebersetzt die Datei-Konfiguration in die Relay-Konfiguration
    pub fn relay_config(&self) -> RelayConfig {
        let z = &self.zeitlimits;
        RelayConfig {
            max_sitzungen: self.server.max_sitzungen,
            handshake_timeout: Duration::from_millis(z.handshake_ms),
            leerlauf_timeout: (z.leerlauf_sek > 0).then(|| Duration::from_secs(z.leerlauf_sek)),
            schreib_timeout: Duration::from_millis(z.schreib_ms),
            bild_chunk_timeout: Duration::from_millis(z.bild_chunk_ms),
            abschluss_timeout: Duration::from_millis(z.abschluss_ms),
            max_frame_bytes: self.protokoll.max_frame_bytes,
            bild_chunk_bytes: self.protokoll.bild_chunk_bytes,
            zeilenumbruch: self.protokoll.zeilenumbruch,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn standard_config_ist_valide() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.server.max_sitzungen, 512);
        assert_eq!(cfg.netzwerk.port, 8888);
        assert_eq!(cfg.logging.level, "info");
        assert!(cfg.pruefen().is_ok());
    }

    #[test]
    fn bind_adresse() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.bind_adresse(), "0.0.0.0:8888");
    }

    #[test]
    fn config_aus_toml_string() {
        let toml = r#"
            [server]
            name = "Buero"
            max_sitzungen = 10

            [netzwerk]
            port = 9000

            [zeitlimits]
            leerlauf_sek = 0
        "#;
        let cfg: ServerConfig = toml::from_str(toml).unwrap();
        assert_eq!(cfg.server.name, "Buero");
        assert_eq!(cfg.server.max_sitzungen, 10);
        assert_eq!(cfg.netzwerk.port, 9000);
        // Nicht angegebene Felder behalten Standardwerte
        assert_eq!(cfg.netzwerk.bind_adresse, "0.0.0.0");
        assert_eq!(cfg.zeitlimits.handshake_ms, 5000);

        let relay = cfg.relay_config();
        assert_eq!(relay.max_sitzungen, 10);
        assert_eq!(relay.leerlauf_timeout, None);
        assert_eq!(relay.handshake_timeout, Duration::from_secs(5));
    }

    #[test]
    fn relay_config_standardwerte() {
        let relay = ServerConfig::default().relay_config();
        let standard = RelayConfig::default();
        assert_eq!(relay.leerlauf_timeout, standard.leerlauf_timeout);
        assert_eq!(relay.schreib_timeout, standard.schreib_timeout);
        assert_eq!(relay.max_frame_bytes, standard.max_frame_bytes);
        assert_eq!(relay.zeilenumbruch, standard.zeilenumbruch);
    }

    #[test]
    fn fehlende_datei_liefert_standardwerte() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = ServerConfig::laden(dir.path().join("gibt_es_nicht.toml")).unwrap();
        assert_eq!(cfg.netzwerk.port, 8888);
    }

    #[test]
    fn datei_wird_geladen() {
        let mut datei = tempfile::NamedTempFile::new().unwrap();
        writeln!(datei, "[protokoll]\nzeilenumbruch = true").unwrap();
        let cfg = ServerConfig::laden(datei.path()).unwrap();
        assert!(cfg.protokoll.zeilenumbruch);
    }

    #[test]
    fn kaputte_datei_ist_fehler() {
        let mut datei = tempfile::NamedTempFile::new().unwrap();
        writeln!(datei, "[netzwerk\nport = ").unwrap();
        assert!(ServerConfig::laden(datei.path()).is_err());
    }

    #[test]
    fn null_chunk_wird_abgelehnt() {
        let mut datei = tempfile::NamedTempFile::new().unwrap();
        writeln!(datei, "[protokoll]\nbild_chunk_bytes = 0").unwrap();
        assert!(ServerConfig::laden(datei.path()).is_err());
    }
}
