//! Shutdown-Koordinator
//!
//! ```text
//! Laufend --(SIGINT/SIGTERM)--> Herunterfahrend --(Registry geleert)--> Gestoppt
//! ```
//!
//! Der Zustand wird ueber einen `watch`-Kanal verteilt. Acceptor und
//! Sitzungs-Tasks warten in ihrem `select!` darauf und beenden sich
//! kooperativ. Geweckt werden sie erst mit `Gestoppt`, nachdem jede
//! Sitzung ihren Shutdown-Hinweis bekommen hat. `Herunterfahrend` ist
//! trotzdem sofort sichtbar, neue Verbindungen werden damit abgewiesen.
//!
//! Eine laufende Bilduebertragung haelt die Registry-Sperre und wird
//! deshalb zu Ende gefuehrt (oder scheitert an ihren Zeitlimits), bevor
//! die Registry geleert wird.

use std::sync::Arc;

use lanchat_protocol::Benachrichtigung;
use tokio::sync::watch;
use tokio::task::JoinSet;

use crate::registry::SessionRegistry;

/// Betriebszustand des Servers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BetriebsZustand {
    Laufend,
    Herunterfahrend,
    Gestoppt,
}

impl BetriebsZustand {
    pub fn ist_laufend(&self) -> bool {
        *self == Self::Laufend
    }
}

/// Steuert das geordnete Herunterfahren
///
/// Clone teilt den Zustand.
#[derive(Clone)]
pub struct ShutdownKoordinator {
    zustand_tx: Arc<watch::Sender<BetriebsZustand>>,
    registry: SessionRegistry,
}

impl ShutdownKoordinator {
    pub fn neu(registry: SessionRegistry) -> Self {
        let (zustand_tx, _) = watch::channel(BetriebsZustand::Laufend);
        Self {
            zustand_tx: Arc::new(zustand_tx),
            registry,
        }
    }

    /// Empfaenger fuer Zustandsaenderungen
    pub fn abonnieren(&self) -> watch::Receiver<BetriebsZustand> {
        self.zustand_tx.subscribe()
    }

    pub fn zustand(&self) -> BetriebsZustand {
        *self.zustand_tx.borrow()
    }

    /// Faehrt den Server herunter
    ///
    /// 1. Zustand auf `Herunterfahrend`, ohne die Tasks zu wecken
    /// 2. Registry fuer neue Sitzungen sperren und leeren
    /// 3. Jeder Sitzung einen Hinweis senden und die Verbindung schliessen
    /// 4. Zustand auf `Gestoppt`: Acceptor schliesst den Listener,
    ///    Sitzungen verlassen ihre Leseschleife
    ///
    /// Nur der erste Aufruf wirkt. Gibt die Anzahl der geschlossenen
    /// Sitzungen zurueck.
    pub async fn herunterfahren(&self) -> usize {
        let mut gestartet = false;
        // false: Wert setzen, Empfaenger nicht benachrichtigen
        self.zustand_tx.send_if_modified(|zustand| {
            if zustand.ist_laufend() {
                *zustand = BetriebsZustand::Herunterfahrend;
                gestartet = true;
            }
            false
        });
        if !gestartet {
            tracing::debug!("Shutdown bereits eingeleitet");
            return 0;
        }
        tracing::info!("Shutdown eingeleitet, keine neuen Verbindungen mehr");

        let eintraege = self.registry.schliessen_und_leeren().await;
        let anzahl = eintraege.len();

        let mut benachrichtigungen = JoinSet::new();
        for eintrag in eintraege {
            benachrichtigungen.spawn(async move {
                if let Err(e) = eintrag.verbindung.senden(&Benachrichtigung::Herunterfahren).await {
                    tracing::debug!(
                        name = %eintrag.name,
                        fehler = %e,
                        "Shutdown-Hinweis nicht zustellbar"
                    );
                }
                eintrag.verbindung.schliessen().await;
            });
        }
        while benachrichtigungen.join_next().await.is_some() {}

        self.zustand_tx.send_replace(BetriebsZustand::Gestoppt);
        tracing::info!(sitzungen = anzahl, "Alle Sitzungen geschlossen, Server gestoppt");
        anzahl
    }
}

/// Wartet auf SIGINT oder SIGTERM
///
/// Gibt den Namen des empfangenen Signals zurueck.
pub async fn auf_signal_warten() -> std::io::Result<&'static str> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate())?;
        tokio::select! {
            ergebnis = tokio::signal::ctrl_c() => {
                ergebnis?;
                Ok("SIGINT")
            }
            _ = sigterm.recv() => Ok("SIGTERM"),
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        Ok("Ctrl-C")
    }
}
