//! Parser fuer eingehende Text-Frames
//!
//! Format: `typ|ziel|inhalt`
//!
//! Es wird hoechstens in drei Felder getrennt. Das Inhaltsfeld darf selbst
//! `|` enthalten und bleibt unveraendert erhalten.

use std::fmt;

use lanchat_core::{RelayError, RelayResult};

/// Trennzeichen zwischen den Frame-Feldern
pub const TRENNZEICHEN: char = '|';

/// Anzahl der Felder eines vollstaendigen Frames
pub const FELDANZAHL: usize = 3;

/// Typ-Tag eines Frames
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameTyp {
    Text,
    FriendRequest,
    FriendReply,
    UserQuery,
    Offline,
    Image,
}

impl FrameTyp {
    /// Tag wie er auf der Leitung steht
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::FriendRequest => "friend_req",
            Self::FriendReply => "friend_reply",
            Self::UserQuery => "user_query",
            Self::Offline => "offline",
            Self::Image => "image",
        }
    }

    /// Erkennt ein Tag, Gross-/Kleinschreibung zaehlt
    pub fn aus_tag(tag: &str) -> Option<Self> {
        match tag {
            "text" => Some(Self::Text),
            "friend_req" => Some(Self::FriendRequest),
            "friend_reply" => Some(Self::FriendReply),
            "user_query" => Some(Self::UserQuery),
            "offline" => Some(Self::Offline),
            "image" => Some(Self::Image),
            _ => None,
        }
    }
}

impl fmt::Display for FrameTyp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Ein geparster eingehender Frame
///
/// Der Absender ist implizit der Name der Sitzung, auf der der Frame
/// gelesen wurde.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// `text|ziel|inhalt`
    Text { ziel: String, inhalt: String },
    /// `friend_req|ziel|apply`
    FriendRequest { ziel: String },
    /// `friend_reply|ziel|accept` bzw. `reject`
    FriendReply { ziel: String, ergebnis: String },
    /// `user_query|none|none`
    UserQuery,
    /// `offline|eigener-name|grund`
    Offline { grund: String },
    /// `image|ziel|dateiname`, gefolgt von Laenge und Nutzdaten
    ImageHeader { ziel: String, dateiname: String },
}

impl Frame {
    /// Parst einen Frame aus Rohbytes
    pub fn aus_bytes(roh: &[u8]) -> RelayResult<Self> {
        let zeile = std::str::from_utf8(roh)
            .map_err(|_| RelayError::frame("kein gueltiges UTF-8"))?;
        Self::parsen(zeile)
    }

    /// Parst eine Frame-Zeile
    pub fn parsen(zeile: &str) -> RelayResult<Self> {
        let felder: Vec<&str> = zeile.splitn(FELDANZAHL, TRENNZEICHEN).collect();
        if felder.len() < FELDANZAHL {
            return Err(RelayError::frame(format!(
                "erwartet {} Felder, erhalten {}",
                FELDANZAHL,
                felder.len()
            )));
        }
        let (tag, ziel, inhalt) = (felder[0], felder[1], felder[2]);

        let typ = FrameTyp::aus_tag(tag)
            .ok_or_else(|| RelayError::frame(format!("unbekannter Typ '{tag}'")))?;

        let ziel_pflicht = |ziel: &str| -> RelayResult<String> {
            if ziel.is_empty() {
                Err(RelayError::frame("leeres Ziel"))
            } else {
                Ok(ziel.to_string())
            }
        };

        let frame = match typ {
            FrameTyp::Text => Self::Text {
                ziel: ziel_pflicht(ziel)?,
                inhalt: inhalt.to_string(),
            },
            FrameTyp::FriendRequest => Self::FriendRequest {
                ziel: ziel_pflicht(ziel)?,
            },
            FrameTyp::FriendReply => Self::FriendReply {
                ziel: ziel_pflicht(ziel)?,
                ergebnis: inhalt.to_string(),
            },
            FrameTyp::UserQuery => Self::UserQuery,
            FrameTyp::Offline => Self::Offline {
                grund: inhalt.to_string(),
            },
            FrameTyp::Image => {
                if inhalt.is_empty() {
                    return Err(RelayError::frame("leerer Dateiname"));
                }
                Self::ImageHeader {
                    ziel: ziel_pflicht(ziel)?,
                    dateiname: inhalt.to_string(),
                }
            }
        };
        Ok(frame)
    }

    /// Typ-Tag des Frames
    pub fn typ(&self) -> FrameTyp {
        match self {
            Self::Text { .. } => FrameTyp::Text,
            Self::FriendRequest { .. } => FrameTyp::FriendRequest,
            Self::FriendReply { .. } => FrameTyp::FriendReply,
            Self::UserQuery => FrameTyp::UserQuery,
            Self::Offline { .. } => FrameTyp::Offline,
            Self::ImageHeader { .. } => FrameTyp::Image,
        }
    }

    /// Ziel des Frames, falls der Typ eines hat
    pub fn ziel(&self) -> Option<&str> {
        match self {
            Self::Text { ziel, .. }
            | Self::FriendRequest { ziel }
            | Self::FriendReply { ziel, .. }
            | Self::ImageHeader { ziel, .. } => Some(ziel),
            Self::UserQuery | Self::Offline { .. } => None,
        }
    }

    /// Serialisiert den Frame so, wie ein Client ihn sendet
    pub fn kodieren(&self, eigener_name: &str) -> String {
        match self {
            Self::Text { ziel, inhalt } => format!("text|{ziel}|{inhalt}"),
            Self::FriendRequest { ziel } => format!("friend_req|{ziel}|apply"),
            Self::FriendReply { ziel, ergebnis } => format!("friend_reply|{ziel}|{ergebnis}"),
            Self::UserQuery => "user_query|none|none".to_string(),
            Self::Offline { grund } => format!("offline|{eigener_name}|{grund}"),
            Self::ImageHeader { ziel, dateiname } => format!("image|{ziel}|{dateiname}"),
        }
    }
}
