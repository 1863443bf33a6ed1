//! lanchat-server – Bibliotheks-Root
//!
//! Verdrahtet Konfiguration, Relay und Signal-Behandlung.

pub mod config;

use std::net::IpAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use config::ServerConfig;
use lanchat_relay::{auf_signal_warten, RelayServer, RelayState};

/// Haelt den laufenden Server-Zustand zusammen
pub struct Server {
    pub config: ServerConfig,
}

impl Server {
    /// Erstellt einen neuen Server aus der gegebenen Konfiguration
    pub fn neu(config: ServerConfig) -> Self {
        Self { config }
    }

    /// Startet den Relay und laeuft bis zum Shutdown-Signal
    ///
    /// Reihenfolge:
    /// 1. TCP-Listener binden
    /// 2. LAN-Adresse ermitteln und ausgeben
    /// 3. Acceptor starten
    /// 4. Auf Ctrl-C / SIGTERM warten, dann geordnet herunterfahren
    pub async fn starten(self) -> Result<()> {
        let state = RelayState::neu(self.config.relay_config());
        let bind_adresse = self.config.bind_adresse();

        let relay = RelayServer::binden(Arc::clone(&state), bind_adresse.as_str())
            .await
            .with_context(|| format!("Port {} nicht verfuegbar", self.config.netzwerk.port))?;
        let lokal = relay.lokale_adresse()?;

        tracing::info!(
            server_name = %self.config.server.name,
            adresse = %lokal,
            lan_ip = %lan_adresse_ermitteln().await,
            port = lokal.port(),
            "Server gestartet, Clients koennen sich verbinden"
        );

        let mut acceptor = tokio::spawn(relay.starten());

        tokio::select! {
            signal = auf_signal_warten() => {
                let signal = signal.context("Signal-Handler konnte nicht installiert werden")?;
                tracing::info!(signal, "Shutdown-Signal empfangen, Server wird beendet");
            }
            beendet = &mut acceptor => {
                // Acceptor endet nur bei einem Fehler vorzeitig
                beendet.context("Acceptor-Task abgestuerzt")??;
                tracing::warn!("Acceptor unerwartet beendet");
            }
        }

        let geschlossen = state.shutdown.herunterfahren().await;
        if !acceptor.is_finished() {
            acceptor.await.context("Acceptor-Task abgestuerzt")??;
        }

        tracing::info!(sitzungen = geschlossen, "Server beendet");
        Ok(())
    }
}

/// Ermittelt die LAN-Adresse ueber eine ausgehende UDP-Route
///
/// Es werden keine Pakete gesendet. Faellt auf 127.0.0.1 zurueck.
pub async fn lan_adresse_ermitteln() -> IpAddr {
    async fn route() -> std::io::Result<IpAddr> {
        let socket = tokio::net::UdpSocket::bind("0.0.0.0:0").await?;
        socket.connect("8.8.8.8:80").await?;
        Ok(socket.local_addr()?.ip())
    }

    match route().await {
        Ok(ip) if !ip.is_unspecified() => ip,
        Ok(_) | Err(_) => IpAddr::from([127, 0, 0, 1]),
    }
}
