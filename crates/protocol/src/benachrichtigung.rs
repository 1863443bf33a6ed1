//! Ausgehende Nachrichten vom Server an einen Client

use std::fmt;

/// Eine Nachricht, die der Server auf eine Client-Verbindung schreibt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Benachrichtigung {
    /// Weitergeleitete Textnachricht: `[absender] inhalt`
    Nachricht { absender: String, inhalt: String },
    /// Eingehende Freundschaftsanfrage: `friend_req|absender`
    FreundAnfrage { absender: String },
    /// Antwort auf eine Anfrage: `friend_reply|absender|ergebnis`
    FreundAntwort { absender: String, ergebnis: String },
    /// Online-Liste: `user_list|a,b,c`
    BenutzerListe(Vec<String>),
    /// Kopf einer eingehenden Bilduebertragung: `image|absender|dateiname`
    BildKopf { absender: String, dateiname: String },
    /// Erfolgsmeldung: `ok: ...`
    Bestaetigung(String),
    /// Fehlermeldung: `error: ...`
    Fehler(String),
    /// Handshake abgelehnt, Name vergeben
    NameVergeben,
    /// Server faehrt herunter
    Herunterfahren,
}

impl Benachrichtigung {
    /// Fehler fuer ein unbekanntes oder abwesendes Ziel
    pub fn ziel_nicht_gefunden(ziel: &str) -> Self {
        Self::Fehler(format!("user '{ziel}' is offline or does not exist"))
    }

    /// Kodiert die Nachricht als Text ohne Zeilenende
    pub fn kodieren(&self) -> String {
        self.to_string()
    }

    /// Kodiert die Nachricht als Bytes, optional mit `\n` am Ende
    pub fn als_bytes(&self, zeilenumbruch: bool) -> Vec<u8> {
        let mut text = self.kodieren();
        if zeilenumbruch {
            text.push('\n');
        }
        text.into_bytes()
    }
}

impl fmt::Display for Benachrichtigung {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nachricht { absender, inhalt } => write!(f, "[{absender}] {inhalt}"),
            Self::FreundAnfrage { absender } => write!(f, "friend_req|{absender}"),
            Self::FreundAntwort { absender, ergebnis } => {
                write!(f, "friend_reply|{absender}|{ergebnis}")
            }
            Self::BenutzerListe(namen) => write!(f, "user_list|{}", namen.join(",")),
            Self::BildKopf {
                absender,
                dateiname,
            } => write!(f, "image|{absender}|{dateiname}"),
            Self::Bestaetigung(text) => write!(f, "ok: {text}"),
            Self::Fehler(text) => write!(f, "error: {text}"),
            Self::NameVergeben => f.write_str("name already in use"),
            Self::Herunterfahren => f.write_str("server shutting down"),
        }
    }
}
