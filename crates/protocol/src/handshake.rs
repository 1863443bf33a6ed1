//! Handshake – Namens-Registrierung nach dem Verbindungsaufbau
//!
//! Der Client sendet direkt nach dem Connect seinen gewuenschten Namen als
//! rohen UTF-8-String. Der Server antwortet nur im Fehlerfall.

use lanchat_core::{RelayError, RelayResult};

use crate::frame::TRENNZEICHEN;

/// Trennzeichen der Online-Liste, darf in Namen nicht vorkommen
pub const LISTEN_TRENNZEICHEN: char = ',';

/// Prueft den im Handshake gesendeten Namen
///
/// Umgebende Leerzeichen werden entfernt. Namen sind case-sensitive.
pub fn name_parsen(roh: &[u8]) -> RelayResult<String> {
    let text = std::str::from_utf8(roh)
        .map_err(|_| RelayError::UngueltigerName("kein gueltiges UTF-8".into()))?;
    let name = text.trim();

    if name.is_empty() {
        return Err(RelayError::LeererName);
    }
    if name.contains(TRENNZEICHEN) || name.contains(LISTEN_TRENNZEICHEN) {
        return Err(RelayError::UngueltigerName(format!(
            "'{name}' enthaelt ein Trennzeichen"
        )));
    }
    if name.chars().any(char::is_control) {
        return Err(RelayError::UngueltigerName(
            "Steuerzeichen im Namen".into(),
        ));
    }

    Ok(name.to_string())
}
