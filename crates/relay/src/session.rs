//! Sitzung und Verbindungs-Handle
//!
//! Eine `Sitzung` gehoert exklusiv dem Task ihrer Verbindung. Andere
//! Sitzungen erreichen sie nur ueber den `VerbindungsHandle`, den die
//! Registry referenziert.

use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use lanchat_core::SessionId;
use lanchat_protocol::Benachrichtigung;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{Mutex, MutexGuard, Notify};

use crate::registry::SitzungsEintrag;

/// Typ-geloeschte Schreib-Haelfte einer Verbindung
pub type Schreiber = Box<dyn AsyncWrite + Send + Unpin>;

// ---------------------------------------------------------------------------
// VerbindungsHandle
// ---------------------------------------------------------------------------

/// Geteilter Zugriff auf die Schreib-Haelfte einer Client-Verbindung
///
/// Clone teilt die Verbindung. Jeder Schreibvorgang haelt den Mutex der
/// Verbindung, Bytes verschiedener Schreiber vermischen sich nie.
#[derive(Clone)]
pub struct VerbindungsHandle {
    peer_addr: SocketAddr,
    schreiber: Arc<Mutex<Schreiber>>,
    trennung: Arc<Notify>,
    zeilenumbruch: bool,
    schreib_timeout: Duration,
}

impl VerbindungsHandle {
    /// Erstellt einen Handle um eine Schreib-Haelfte
    pub fn neu<W>(
        peer_addr: SocketAddr,
        schreiber: W,
        zeilenumbruch: bool,
        schreib_timeout: Duration,
    ) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            peer_addr,
            schreiber: Arc::new(Mutex::new(Box::new(schreiber))),
            trennung: Arc::new(Notify::new()),
            zeilenumbruch,
            schreib_timeout,
        }
    }

    /// Adresse des Peers
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Sendet eine Benachrichtigung
    pub async fn senden(&self, nachricht: &Benachrichtigung) -> io::Result<()> {
        self.bytes_senden(&nachricht.als_bytes(self.zeilenumbruch))
            .await
    }

    /// Sendet rohe Bytes
    pub async fn bytes_senden(&self, daten: &[u8]) -> io::Result<()> {
        self.exklusiv().await.schreiben(daten).await
    }

    /// Sperrt die Verbindung fuer eine zusammenhaengende Folge von Schreibvorgaengen
    pub async fn exklusiv(&self) -> ExklusiverSchreiber<'_> {
        ExklusiverSchreiber {
            guard: self.schreiber.lock().await,
            zeilenumbruch: self.zeilenumbruch,
            schreib_timeout: self.schreib_timeout,
        }
    }

    /// Schliesst die Schreib-Haelfte (best effort)
    pub async fn schliessen(&self) {
        let mut guard = self.schreiber.lock().await;
        match tokio::time::timeout(self.schreib_timeout, guard.shutdown()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::trace!(peer = %self.peer_addr, fehler = %e, "Schliessen fehlgeschlagen");
            }
            Err(_) => {
                tracing::debug!(peer = %self.peer_addr, "Schliessen: Zeitlimit ueberschritten");
            }
        }
    }

    /// Schliesst die Verbindung und weckt den Task der Sitzung
    ///
    /// Fuer Verbindungen, deren Strom nicht mehr synchron ist.
    pub async fn trennen(&self) {
        self.trennung.notify_one();
        self.schliessen().await;
    }

    /// Wartet bis `trennen` aufgerufen wurde
    ///
    /// Abbruchsicher: ein frueherer `trennen`-Aufruf wird nicht verpasst.
    pub async fn getrennt(&self) {
        self.trennung.notified().await;
    }

    /// true wenn beide Handles dieselbe Verbindung teilen
    pub fn gleiche_verbindung(&self, andere: &VerbindungsHandle) -> bool {
        Arc::ptr_eq(&self.schreiber, &andere.schreiber)
    }
}

impl fmt::Debug for VerbindungsHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VerbindungsHandle")
            .field("peer_addr", &self.peer_addr)
            .field("zeilenumbruch", &self.zeilenumbruch)
            .finish_non_exhaustive()
    }
}

/// Exklusiver Schreibzugriff, solange der Wert lebt
pub struct ExklusiverSchreiber<'a> {
    guard: MutexGuard<'a, Schreiber>,
    zeilenumbruch: bool,
    schreib_timeout: Duration,
}

impl ExklusiverSchreiber<'_> {
    /// Schreibt alle Bytes und flusht, begrenzt durch das Schreib-Zeitlimit
    pub async fn schreiben(&mut self, daten: &[u8]) -> io::Result<()> {
        let schreiber = &mut self.guard;
        let vorgang = async {
            schreiber.write_all(daten).await?;
            schreiber.flush().await
        };
        match tokio::time::timeout(self.schreib_timeout, vorgang).await {
            Ok(ergebnis) => ergebnis,
            Err(_) => Err(io::Error::new(
                io::ErrorKind::TimedOut,
                "Schreib-Zeitlimit ueberschritten",
            )),
        }
    }

    /// Schreibt eine Benachrichtigung
    pub async fn senden(&mut self, nachricht: &Benachrichtigung) -> io::Result<()> {
        let bytes = nachricht.als_bytes(self.zeilenumbruch);
        self.schreiben(&bytes).await
    }
}

// ---------------------------------------------------------------------------
// Sitzung
// ---------------------------------------------------------------------------

/// Lebenszyklus einer Sitzung
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SitzungsZustand {
    /// Name gelesen, Registrierung laeuft
    Handshake,
    /// In der Registry, Leseschleife laeuft
    Aktiv,
    /// Aus der Registry entfernt, Verbindung geschlossen
    Geschlossen,
}

/// Serverseitiger Zustand eines verbundenen, benannten Clients
#[derive(Debug)]
pub struct Sitzung {
    pub id: SessionId,
    /// Unveraenderlich nach dem Handshake
    pub name: String,
    pub zustand: SitzungsZustand,
    pub letzte_aktivitaet: DateTime<Utc>,
    pub verbindung: VerbindungsHandle,
}

impl Sitzung {
    pub fn neu(name: String, verbindung: VerbindungsHandle) -> Self {
        Self {
            id: SessionId::new(),
            name,
            zustand: SitzungsZustand::Handshake,
            letzte_aktivitaet: Utc::now(),
            verbindung,
        }
    }

    /// Registry-Eintrag fuer diese Sitzung
    pub fn eintrag(&self) -> SitzungsEintrag {
        SitzungsEintrag {
            id: self.id,
            name: self.name.clone(),
            verbindung: self.verbindung.clone(),
            angemeldet_seit: Utc::now(),
        }
    }

    pub fn aktivieren(&mut self) {
        self.zustand = SitzungsZustand::Aktiv;
    }

    pub fn aktivitaet_merken(&mut self) {
        self.letzte_aktivitaet = Utc::now();
    }

    pub fn schliessen(&mut self) {
        self.zustand = SitzungsZustand::Geschlossen;
    }

    pub fn ist_aktiv(&self) -> bool {
        self.zustand == SitzungsZustand::Aktiv
    }
}
