//! Gemeinsame Identifikationstypen

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Eindeutige ID einer Sitzung
///
/// Der Name einer Sitzung ist nach dem Abmelden wieder frei, die ID nie.
/// Damit laesst sich ein Registry-Eintrag eindeutig seiner Verbindung
/// zuordnen, auch wenn sich ein Client unter demselben Namen neu verbindet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    /// Erstellt eine neue zufaellige SessionId
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Gibt die innere UUID zurueck
    pub fn inner(&self) -> Uuid {
        self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "session:{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_ids_sind_eindeutig() {
        assert_ne!(SessionId::new(), SessionId::new());
    }

    #[test]
    fn anzeige_mit_praefix() {
        let id = SessionId::new();
        assert!(id.to_string().starts_with("session:"));
        assert!(id.to_string().ends_with(&id.inner().to_string()));
    }
}
