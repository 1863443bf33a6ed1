//! Wire-Format fuer TCP-Verbindungen
//!
//! Auf einer Client-Verbindung wechseln sich Text-Frames und binaere
//! Bild-Nutzdaten ab:
//!
//! ```text
//! name                              (Handshake, einmalig)
//! typ|ziel|inhalt                   (Text-Frame)
//! image|ziel|dateiname              (Bild-Kopf)
//! +--------+--------+--------+--------+----...----+
//! | Laenge N (u32 big-endian)         | N Bytes    |
//! +--------+--------+--------+--------+----...----+
//! ```
//!
//! Ein Text-Frame endet am ersten `\n` im gepufferten Strom. Enthaelt der
//! Puffer kein `\n`, bildet der Inhalt eines einzelnen Lesevorgangs (hoechstens
//! `max_frame_bytes`) den Frame. Bytes hinter einem `\n` bleiben gepuffert und
//! werden vom naechsten Lesevorgang zuerst geliefert, auch fuer Bilddaten.

use std::io;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};

// ---------------------------------------------------------------------------
// Konstanten
// ---------------------------------------------------------------------------

/// Standard-maximale Frame-Groesse (ein Lesevorgang)
pub const DEFAULT_MAX_FRAME_SIZE: usize = 1024;

/// Groesse des Laengen-Felds der Bilduebertragung in Bytes
pub const LENGTH_FIELD_SIZE: usize = 4;

/// Kodiert das Laengen-Feld einer Bilduebertragung
pub fn laenge_kodieren(laenge: u32) -> [u8; LENGTH_FIELD_SIZE] {
    laenge.to_be_bytes()
}

// ---------------------------------------------------------------------------
// FrameLeser
// ---------------------------------------------------------------------------

/// Gepufferter Leser fuer die Lese-Haelfte einer Client-Verbindung
///
/// Liefert Text-Frames und, nach einem Bild-Kopf, das Laengen-Feld und die
/// Nutzdaten aus demselben Puffer.
#[derive(Debug)]
pub struct FrameLeser<R> {
    inner: BufReader<R>,
    /// Bereits gelesene Bytes eines unterbrochenen Laengen-Felds
    laenge_puffer: [u8; LENGTH_FIELD_SIZE],
    laenge_gelesen: usize,
}

impl<R> FrameLeser<R>
where
    R: AsyncRead + Unpin,
{
    /// Erstellt einen `FrameLeser` mit Standard-Frame-Groesse
    pub fn new(reader: R) -> Self {
        Self::with_max_size(reader, DEFAULT_MAX_FRAME_SIZE)
    }

    /// Erstellt einen `FrameLeser` mit benutzerdefinierter Frame-Groesse
    pub fn with_max_size(reader: R, max_frame_size: usize) -> Self {
        Self {
            inner: BufReader::with_capacity(max_frame_size.max(1), reader),
            laenge_puffer: [0; LENGTH_FIELD_SIZE],
            laenge_gelesen: 0,
        }
    }

    /// Liest den naechsten nicht-leeren Text-Frame
    ///
    /// Gibt `Ok(None)` zurueck wenn der Peer die Verbindung geschlossen hat.
    /// Ein abschliessendes `\r` wird entfernt. Abbruchsicher: wird der Future
    /// vor dem Lesen fallen gelassen, geht kein Byte verloren.
    pub async fn naechster_frame(&mut self) -> io::Result<Option<Vec<u8>>> {
        // Ein angefangenes Laengen-Feld gehoert zu einer abgebrochenen Uebertragung
        self.laenge_gelesen = 0;
        loop {
            let (mut frame, verbraucht) = {
                let puffer = self.inner.fill_buf().await?;
                if puffer.is_empty() {
                    return Ok(None);
                }
                match puffer.iter().position(|&b| b == b'\n') {
                    Some(pos) => (puffer[..pos].to_vec(), pos + 1),
                    None => (puffer.to_vec(), puffer.len()),
                }
            };
            self.inner.consume(verbraucht);

            if frame.last() == Some(&b'\r') {
                frame.pop();
            }
            if !frame.is_empty() {
                return Ok(Some(frame));
            }
        }
    }

    /// Liest das 4-Byte-Laengen-Feld einer Bilduebertragung
    ///
    /// Abbruchsicher: wird der Future nach einem Teil der Bytes fallen
    /// gelassen (z.B. durch ein Zeitlimit), setzt der naechste Aufruf an
    /// derselben Stelle fort.
    ///
    /// # Fehler
    /// - `UnexpectedEof` wenn die Verbindung vorher getrennt wird
    pub async fn laenge_lesen(&mut self) -> io::Result<u32> {
        while self.laenge_gelesen < LENGTH_FIELD_SIZE {
            let n = self
                .inner
                .read(&mut self.laenge_puffer[self.laenge_gelesen..])
                .await?;
            if n == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "Verbindung waehrend des Laengen-Felds getrennt",
                ));
            }
            self.laenge_gelesen += n;
        }
        self.laenge_gelesen = 0;
        Ok(u32::from_be_bytes(self.laenge_puffer))
    }

    /// Liest bis zu `puffer.len()` Nutzdaten-Bytes
    ///
    /// Gepufferte Bytes werden zuerst geliefert. `Ok(0)` bedeutet, dass der
    /// Peer die Verbindung geschlossen hat.
    pub async fn chunk_lesen(&mut self, puffer: &mut [u8]) -> io::Result<usize> {
        self.inner.read(puffer).await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
