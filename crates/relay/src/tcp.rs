//! TCP-Listener – Bindet Socket, akzeptiert Verbindungen
//!
//! Der `RelayServer` startet fuer jede eingehende Verbindung einen eigenen
//! tokio-Task mit einer `ClientConnection`. Die Tasks liegen in einem
//! `JoinSet`, damit sie beim Shutdown eingesammelt werden koennen.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use lanchat_protocol::Benachrichtigung;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio::task::JoinSet;

use crate::connection::ClientConnection;
use crate::server_state::RelayState;

/// TCP-Relay-Server
pub struct RelayServer {
    state: Arc<RelayState>,
    listener: TcpListener,
}

impl RelayServer {
    /// Bindet den Listener
    ///
    /// Port 0 waehlt einen freien Port, siehe `lokale_adresse`.
    pub async fn binden(state: Arc<RelayState>, adresse: impl ToSocketAddrs) -> io::Result<Self> {
        let listener = TcpListener::bind(adresse).await?;
        Ok(Self { state, listener })
    }

    /// Tatsaechlich gebundene Adresse
    pub fn lokale_adresse(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Akzeptiert Verbindungen, bis der Shutdown eingeleitet wird
    ///
    /// Danach wird der Listener geschlossen und bis zu `abschluss_timeout`
    /// auf die Sitzungs-Tasks gewartet. Uebrige Tasks werden abgebrochen.
    pub async fn starten(self) -> io::Result<()> {
        let Self { state, listener } = self;
        let mut shutdown_rx = state.shutdown.abonnieren();
        let mut sitzungen: JoinSet<()> = JoinSet::new();

        tracing::info!(adresse = %listener.local_addr()?, "Relay-Server lauscht");

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, peer_addr)) => {
                            let max = state.config.max_sitzungen;
                            if max > 0 && sitzungen.len() >= max {
                                tracing::warn!(peer = %peer_addr, max, "Server voll – Verbindung abgelehnt");
                                tokio::spawn(ablehnen(stream, Arc::clone(&state)));
                                continue;
                            }

                            tracing::debug!(peer = %peer_addr, "Verbindung akzeptiert");
                            if let Err(e) = stream.set_nodelay(true) {
                                tracing::trace!(peer = %peer_addr, fehler = %e, "TCP_NODELAY nicht gesetzt");
                            }
                            let verbindung = ClientConnection::neu(Arc::clone(&state), peer_addr);
                            sitzungen.spawn(verbindung.verarbeiten(stream, shutdown_rx.clone()));
                        }
                        Err(e) => {
                            tracing::error!(fehler = %e, "TCP-Accept-Fehler");
                            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
                        }
                    }
                }

                Some(beendet) = sitzungen.join_next(), if !sitzungen.is_empty() => {
                    if let Err(e) = beendet {
                        if e.is_panic() {
                            tracing::error!(fehler = %e, "Sitzungs-Task ist abgestuerzt");
                        }
                    }
                }

                geaendert = shutdown_rx.changed() => {
                    if geaendert.is_err() || !shutdown_rx.borrow().ist_laufend() {
                        tracing::info!("Relay-Server: Shutdown-Signal empfangen");
                        break;
                    }
                }
            }
        }

        drop(listener);

        let offen = sitzungen.len();
        let abschluss = state.config.abschluss_timeout;
        let eingesammelt = tokio::time::timeout(abschluss, async {
            while sitzungen.join_next().await.is_some() {}
        })
        .await;
        if eingesammelt.is_err() {
            tracing::warn!(
                verbleibend = sitzungen.len(),
                "Sitzungs-Tasks nach Zeitlimit abgebrochen"
            );
            sitzungen.abort_all();
            while sitzungen.join_next().await.is_some() {}
        }

        tracing::info!(sitzungen = offen, "Relay-Server gestoppt");
        Ok(())
    }
}

/// Meldet einem ueberzaehligen Client `error: server full` und trennt
async fn ablehnen(mut stream: TcpStream, state: Arc<RelayState>) {
    let nachricht =
        Benachrichtigung::Fehler("server full".into()).als_bytes(state.config.zeilenumbruch);
    let senden = async {
        stream.write_all(&nachricht).await?;
        stream.shutdown().await
    };
    if let Err(e) = tokio::time::timeout(state.config.schreib_timeout, senden)
        .await
        .unwrap_or_else(|_| Err(io::ErrorKind::TimedOut.into()))
    {
        tracing::debug!(fehler = %e, "Ablehnung nicht zustellbar");
    }
}
