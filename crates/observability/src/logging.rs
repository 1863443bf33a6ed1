//! Structured Logging Setup via tracing-subscriber
//!
//! Konfigurierbar per Umgebungsvariable (ueberschreibt die Konfigurationsdatei):
//! - `LANCHAT_LOG_LEVEL`: Filter-Direktive (z.B. `info`, `lanchat_relay=debug`), Standard: info
//! - `LANCHAT_LOG_FORMAT`: Format (text/json), Standard: text

use std::fmt;
use std::str::FromStr;

use anyhow::{anyhow, Result};
use tracing_subscriber::{fmt as fmt_layer, EnvFilter};

/// Umgebungsvariable fuer den Log-Filter
pub const ENV_LOG_LEVEL: &str = "LANCHAT_LOG_LEVEL";
/// Umgebungsvariable fuer das Log-Format
pub const ENV_LOG_FORMAT: &str = "LANCHAT_LOG_FORMAT";

/// Ausgabeformat der Logs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            andere => Err(anyhow!("Unbekanntes Log-Format: {andere} (erlaubt: text, json)")),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text => f.write_str("text"),
            Self::Json => f.write_str("json"),
        }
    }
}

/// Initialisiert das Logging-System
///
/// `level` und `format` stammen aus der Konfiguration, die
/// Umgebungsvariablen haben Vorrang. Ein ungueltiger Filter faellt auf
/// `info` zurueck, ein ungueltiges Format ist ein Fehler.
pub fn logging_initialisieren(level: &str, format: &str) -> Result<()> {
    let filter = EnvFilter::try_from_env(ENV_LOG_LEVEL)
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let format = format_waehlen(std::env::var(ENV_LOG_FORMAT).ok(), format)?;

    let ergebnis = match format {
        LogFormat::Json => fmt_layer()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .with_thread_ids(true)
            .with_current_span(true)
            .try_init(),
        LogFormat::Text => fmt_layer()
            .with_env_filter(filter)
            .with_target(true)
            .try_init(),
    };
    ergebnis.map_err(|e| anyhow!("Logging bereits initialisiert: {e}"))
}

/// Umgebung vor Konfiguration
fn format_waehlen(aus_env: Option<String>, konfiguriert: &str) -> Result<LogFormat> {
    match aus_env {
        Some(wert) if !wert.is_empty() => wert.parse(),
        _ => konfiguriert.parse(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_format_parsen() {
        assert_eq!("text".parse::<LogFormat>().unwrap(), LogFormat::Text);
        assert_eq!("json".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert!("xml".parse::<LogFormat>().is_err());
        assert!("JSON".parse::<LogFormat>().is_err());
        assert_eq!(LogFormat::default().to_string(), "text");
    }

    #[test]
    fn umgebung_hat_vorrang() {
        assert_eq!(
            format_waehlen(Some("json".into()), "text").unwrap(),
            LogFormat::Json
        );
        assert_eq!(format_waehlen(None, "json").unwrap(), LogFormat::Json);
        assert_eq!(format_waehlen(Some(String::new()), "text").unwrap(), LogFormat::Text);
        assert!(format_waehlen(Some("yaml".into()), "text").is_err());
    }
}
