//! Session-Registry – Wer ist online, unter welchem Namen?
//!
//! Die Registry ist der einzige Zustand, den mehrere Verbindungs-Tasks
//! veraendern. Alle Zugriffe laufen ueber einen einzigen async Mutex.
//! `registrieren` prueft und fuegt unter derselben Sperre ein und ist damit
//! die einzige Stelle, die die Eindeutigkeit der Namen durchsetzt.
//!
//! Der Router haelt die Sperre ueber `sperren()` fuer die gesamte Dauer
//! eines Dispatches, inklusive Bilduebertragungen.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use lanchat_core::{RelayError, RelayResult, SessionId};
use tokio::sync::{Mutex, MutexGuard};

use crate::session::VerbindungsHandle;

// ---------------------------------------------------------------------------
// SitzungsEintrag
// ---------------------------------------------------------------------------

/// Eintrag einer aktiven Sitzung
#[derive(Debug, Clone)]
pub struct SitzungsEintrag {
    pub id: SessionId,
    pub name: String,
    /// Referenz auf die Verbindung, Eigentuemer ist der Sitzungs-Task
    pub verbindung: VerbindungsHandle,
    pub angemeldet_seit: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// SessionRegistry
// ---------------------------------------------------------------------------

/// Thread-safe Name -> Sitzung Zuordnung
///
/// Clone teilt den inneren Zustand. Namen sind case-sensitive und
/// sortiert abgelegt.
#[derive(Clone, Default)]
pub struct SessionRegistry {
    inner: Arc<Mutex<RegistryInner>>,
}

#[derive(Default)]
struct RegistryInner {
    sitzungen: BTreeMap<String, SitzungsEintrag>,
    /// Nach dem Shutdown-Beginn werden keine Sitzungen mehr aufgenommen
    geschlossen: bool,
}

impl SessionRegistry {
    pub fn neu() -> Self {
        Self::default()
    }

    /// Nimmt eine Sitzung auf, wenn ihr Name noch frei ist
    ///
    /// # Fehler
    /// - `NameVergeben` wenn bereits eine Sitzung mit diesem Namen existiert
    /// - `ServerFaehrtHerunter` nach `schliessen_und_leeren`
    pub async fn registrieren(&self, eintrag: SitzungsEintrag) -> RelayResult<()> {
        let mut inner = self.inner.lock().await;
        if inner.geschlossen {
            return Err(RelayError::ServerFaehrtHerunter);
        }

        match inner.sitzungen.entry(eintrag.name.clone()) {
            Entry::Occupied(_) => Err(RelayError::NameVergeben(eintrag.name)),
            Entry::Vacant(frei) => {
                tracing::debug!(name = %eintrag.name, id = %eintrag.id, "Sitzung registriert");
                frei.insert(eintrag);
                Ok(())
            }
        }
    }

    /// Entfernt die Sitzung `id` unter `name`
    ///
    /// Gehoert der Name inzwischen einer anderen Sitzung, bleibt deren
    /// Eintrag unberuehrt. Gibt `true` zurueck wenn etwas entfernt wurde.
    pub async fn abmelden(&self, name: &str, id: SessionId) -> bool {
        let mut inner = self.inner.lock().await;
        let eigene = inner.sitzungen.get(name).is_some_and(|e| e.id == id);
        if !eigene {
            return false;
        }
        if let Some(eintrag) = inner.sitzungen.remove(name) {
            let dauer = Utc::now() - eintrag.angemeldet_seit;
            tracing::debug!(
                name = %name,
                id = %id,
                dauer_sek = dauer.num_seconds(),
                "Sitzung abgemeldet"
            );
        }
        true
    }

    /// Verbindung der Sitzung `name`
    pub async fn nachschlagen(&self, name: &str) -> Option<VerbindungsHandle> {
        self.inner
            .lock()
            .await
            .sitzungen
            .get(name)
            .map(|e| e.verbindung.clone())
    }

    /// Alle aktiven Sitzungen, sortiert nach Namen
    pub async fn schnappschuss(&self) -> Vec<(String, VerbindungsHandle)> {
        self.inner
            .lock()
            .await
            .sitzungen
            .iter()
            .map(|(name, e)| (name.clone(), e.verbindung.clone()))
            .collect()
    }

    /// Namen aller aktiven Sitzungen, sortiert
    pub async fn namen(&self) -> Vec<String> {
        self.inner.lock().await.sitzungen.keys().cloned().collect()
    }

    pub async fn anzahl(&self) -> usize {
        self.inner.lock().await.sitzungen.len()
    }

    pub async fn ist_geschlossen(&self) -> bool {
        self.inner.lock().await.geschlossen
    }

    /// Sperrt neue Registrierungen und entfernt alle Sitzungen
    ///
    /// Gibt die entfernten Eintraege zurueck, damit der Aufrufer ihre
    /// Verbindungen benachrichtigen und schliessen kann.
    pub async fn schliessen_und_leeren(&self) -> Vec<SitzungsEintrag> {
        let mut inner = self.inner.lock().await;
        inner.geschlossen = true;
        std::mem::take(&mut inner.sitzungen).into_values().collect()
    }

    /// Exklusiver Zugriff fuer die Dauer eines Dispatches
    pub async fn sperren(&self) -> RegistryGuard<'_> {
        RegistryGuard {
            inner: self.inner.lock().await,
        }
    }
}

// ---------------------------------------------------------------------------
// RegistryGuard
// ---------------------------------------------------------------------------

/// Gesperrte Sicht auf die Registry
///
/// Solange der Guard lebt, kann keine andere Sitzung routen, sich an- oder
/// abmelden.
pub struct RegistryGuard<'a> {
    inner: MutexGuard<'a, RegistryInner>,
}

impl RegistryGuard<'_> {
    pub fn nachschlagen(&self, name: &str) -> Option<&VerbindungsHandle> {
        self.inner.sitzungen.get(name).map(|e| &e.verbindung)
    }

    /// Sortierte Namen aller Sitzungen ausser `ausgenommen`
    pub fn namen_ausser(&self, ausgenommen: &str) -> Vec<String> {
        self.inner
            .sitzungen
            .keys()
            .filter(|name| name.as_str() != ausgenommen)
            .cloned()
            .collect()
    }

    pub fn anzahl(&self) -> usize {
        self.inner.sitzungen.len()
    }

    /// Entfernt die Sitzung `name`, ohne ihre Verbindung anzufassen
    pub fn entfernen(&mut self, name: &str) -> Option<SitzungsEintrag> {
        self.inner.sitzungen.remove(name)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
