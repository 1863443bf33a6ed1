//! Client-Connection – Verwaltet eine einzelne TCP-Verbindung
//!
//! Jede TCP-Verbindung bekommt eine `ClientConnection` in einem eigenen
//! tokio-Task.
//!
//! ## Ablauf
//! ```text
//! Verbunden -> Handshake (Name lesen) -> Aktiv (Leseschleife) -> Geschlossen
//!                  |                                               ^
//!                  +---- Name vergeben / ungueltig / Zeitlimit ----+
//! ```
//!
//! Die Leseschleife endet bei `offline`, wenn der Peer trennt, nach
//! Leerlauf oder beim Shutdown. Danach wird die Sitzung aus der Registry
//! entfernt, aber nur wenn der Eintrag noch ihr selbst gehoert.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use lanchat_core::RelayError;
use lanchat_protocol::handshake::name_parsen;
use lanchat_protocol::{Benachrichtigung, FrameLeser};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::watch;

use crate::dispatcher::{DispatchErgebnis, MessageDispatcher};
use crate::server_state::RelayState;
use crate::session::{Sitzung, VerbindungsHandle};
use crate::shutdown::BetriebsZustand;

// ---------------------------------------------------------------------------
// Sitzungsende
// ---------------------------------------------------------------------------

/// Grund, aus dem eine aktive Sitzung endet
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SitzungsEnde {
    /// Client hat `offline` gesendet
    Abgemeldet,
    /// Peer hat die Verbindung geschlossen
    PeerGetrennt,
    /// Leerlauf-Zeitlimit ueberschritten
    Leerlauf,
    /// Vom Relay getrennt, weil der Strom nicht mehr synchron ist
    Getrennt,
    /// Server faehrt herunter
    Herunterfahren,
    /// Lese- oder Schreibfehler auf der Verbindung
    Fehler(String),
}

impl fmt::Display for SitzungsEnde {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Abgemeldet => f.write_str("abgemeldet"),
            Self::PeerGetrennt => f.write_str("vom Peer getrennt"),
            Self::Leerlauf => f.write_str("Leerlauf"),
            Self::Getrennt => f.write_str("vom Relay getrennt"),
            Self::Herunterfahren => f.write_str("Shutdown"),
            Self::Fehler(grund) => write!(f, "Fehler: {grund}"),
        }
    }
}

// ---------------------------------------------------------------------------
// ClientConnection
// ---------------------------------------------------------------------------

/// Verarbeitet eine einzelne Client-Verbindung
pub struct ClientConnection {
    state: Arc<RelayState>,
    peer_addr: SocketAddr,
}

impl ClientConnection {
    pub fn neu(state: Arc<RelayState>, peer_addr: SocketAddr) -> Self {
        Self { state, peer_addr }
    }

    /// Fuehrt Handshake und Leseschleife aus, bis die Sitzung endet
    pub async fn verarbeiten<S>(self, stream: S, mut shutdown_rx: watch::Receiver<BetriebsZustand>)
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let peer_addr = self.peer_addr;
        let config = Arc::clone(&self.state.config);

        let (lese_haelfte, schreib_haelfte) = tokio::io::split(stream);
        let mut leser = FrameLeser::with_max_size(lese_haelfte, config.max_frame_bytes);
        let verbindung = VerbindungsHandle::neu(
            peer_addr,
            schreib_haelfte,
            config.zeilenumbruch,
            config.schreib_timeout,
        );

        tracing::debug!(peer = %peer_addr, "Neue Verbindung");

        if !shutdown_rx.borrow_and_update().ist_laufend() {
            ablehnen(&verbindung, &Benachrichtigung::Herunterfahren).await;
            return;
        }

        let mut sitzung = match self.handshake(&mut leser, verbindung.clone()).await {
            Ok(sitzung) => sitzung,
            Err(fehler) => {
                if fehler.ist_handshake_fehler() {
                    tracing::info!(peer = %peer_addr, fehler = %fehler, "Handshake abgelehnt");
                } else {
                    tracing::debug!(peer = %peer_addr, fehler = %fehler, "Verbindung vor dem Handshake verloren");
                }
                match handshake_antwort(&fehler) {
                    Some(antwort) => ablehnen(&verbindung, &antwort).await,
                    None => verbindung.schliessen().await,
                }
                return;
            }
        };

        let online = self.state.registry.namen().await;
        tracing::info!(
            name = %sitzung.name,
            peer = %peer_addr,
            online = ?online,
            "Client online"
        );

        let ende = self
            .leseschleife(&mut sitzung, &mut leser, &mut shutdown_rx)
            .await;

        self.state.registry.abmelden(&sitzung.name, sitzung.id).await;
        sitzung.schliessen();
        sitzung.verbindung.schliessen().await;

        let online = self.state.registry.namen().await;
        tracing::info!(
            name = %sitzung.name,
            peer = %peer_addr,
            grund = %ende,
            online = ?online,
            "Client offline"
        );
    }

    /// Liest den Namen und registriert die Sitzung
    async fn handshake<R>(
        &self,
        leser: &mut FrameLeser<R>,
        verbindung: VerbindungsHandle,
    ) -> Result<Sitzung, RelayError>
    where
        R: AsyncRead + Unpin,
    {
        let roh = tokio::time::timeout(self.state.config.handshake_timeout, leser.naechster_frame())
            .await
            .map_err(|_| RelayError::HandshakeZeitlimit)??
            .ok_or(RelayError::PeerGetrennt)?;

        let name = name_parsen(&roh)?;
        let mut sitzung = Sitzung::neu(name, verbindung);
        self.state.registry.registrieren(sitzung.eintrag()).await?;
        sitzung.aktivieren();
        Ok(sitzung)
    }

    async fn leseschleife<R>(
        &self,
        sitzung: &mut Sitzung,
        leser: &mut FrameLeser<R>,
        shutdown_rx: &mut watch::Receiver<BetriebsZustand>,
    ) -> SitzungsEnde
    where
        R: AsyncRead + Unpin,
    {
        let dispatcher = MessageDispatcher::neu(Arc::clone(&self.state));
        let leerlauf = self.state.config.leerlauf_timeout;

        loop {
            tokio::select! {
                gelesen = frame_lesen(leser, leerlauf) => {
                    let roh = match gelesen {
                        Ok(Some(roh)) => roh,
                        Ok(None) => return SitzungsEnde::PeerGetrennt,
                        Err(LeseFehler::Leerlauf) => return SitzungsEnde::Leerlauf,
                        Err(LeseFehler::Io(e)) => return SitzungsEnde::Fehler(e.to_string()),
                    };
                    sitzung.aktivitaet_merken();

                    match dispatcher.dispatch(&roh, sitzung, leser).await {
                        Ok(DispatchErgebnis::Weiter) => {}
                        Ok(DispatchErgebnis::Beenden) => return SitzungsEnde::Abgemeldet,
                        Err(RelayError::PeerGetrennt) => return SitzungsEnde::PeerGetrennt,
                        Err(e) if e.beendet_sitzung() => return SitzungsEnde::Fehler(e.to_string()),
                        Err(e) => {
                            tracing::warn!(name = %sitzung.name, fehler = %e, "Unerwarteter Dispatch-Fehler");
                            return SitzungsEnde::Fehler(e.to_string());
                        }
                    }
                }

                _ = sitzung.verbindung.getrennt() => {
                    return SitzungsEnde::Getrennt;
                }

                geaendert = shutdown_rx.changed() => {
                    if geaendert.is_err() || !shutdown_rx.borrow().ist_laufend() {
                        return SitzungsEnde::Herunterfahren;
                    }
                }
            }
        }
    }
}

enum LeseFehler {
    Leerlauf,
    Io(std::io::Error),
}

/// Liest den naechsten Frame, optional begrenzt durch das Leerlauf-Zeitlimit
async fn frame_lesen<R>(
    leser: &mut FrameLeser<R>,
    leerlauf: Option<Duration>,
) -> Result<Option<Vec<u8>>, LeseFehler>
where
    R: AsyncRead + Unpin,
{
    let ergebnis = match leerlauf {
        Some(dauer) => tokio::time::timeout(dauer, leser.naechster_frame())
            .await
            .map_err(|_| LeseFehler::Leerlauf)?,
        None => leser.naechster_frame().await,
    };
    ergebnis.map_err(LeseFehler::Io)
}

/// Sendet die Ablehnung und schliesst die Verbindung
async fn ablehnen(verbindung: &VerbindungsHandle, antwort: &Benachrichtigung) {
    if let Err(e) = verbindung.senden(antwort).await {
        tracing::trace!(peer = %verbindung.peer_addr(), fehler = %e, "Ablehnung nicht zustellbar");
    }
    verbindung.schliessen().await;
}

/// Antwort an einen abgelehnten Client, falls eine vorgesehen ist
fn handshake_antwort(fehler: &RelayError) -> Option<Benachrichtigung> {
    match fehler {
        RelayError::NameVergeben(_) => Some(Benachrichtigung::NameVergeben),
        RelayError::UngueltigerName(_) => Some(Benachrichtigung::Fehler("invalid name".into())),
        RelayError::ServerFaehrtHerunter => Some(Benachrichtigung::Herunterfahren),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
