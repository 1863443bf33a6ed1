//! Bilduebertragung zwischen zwei Sitzungen
//!
//! Nach einem gueltigen `image|ziel|dateiname`:
//!
//! 1. Kopf `image|absender|dateiname` an das Ziel
//! 2. 4 Bytes Laenge N (u32 big-endian) vom Absender lesen, unveraendert weiterleiten
//! 3. N Bytes in Chunks vom Absender zum Ziel kopieren
//!
//! Die Schreib-Haelfte des Ziels bleibt fuer die gesamte Uebertragung
//! gesperrt. Der Aufrufer haelt zusaetzlich die Registry-Sperre.
//! Scheitert das Schreiben zum Ziel, werden die restlichen angekuendigten
//! Bytes trotzdem vom Absender gelesen und verworfen, damit dessen Strom
//! synchron bleibt.

use std::time::Duration;

use lanchat_protocol::wire::{laenge_kodieren, FrameLeser};
use lanchat_protocol::Benachrichtigung;
use tokio::io::AsyncRead;

use crate::session::VerbindungsHandle;

/// Ergebnis einer Bilduebertragung
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransferBericht {
    /// Angekuendigte Laenge, None wenn das Laengen-Feld nicht gelesen wurde
    pub erwartet: Option<u32>,
    /// Vom Absender gelesene Nutzdaten-Bytes
    pub empfangen: u64,
    /// An das Ziel geschriebene Nutzdaten-Bytes
    pub weitergeleitet: u64,
    /// Absender hat die Verbindung geschlossen oder einen Lesefehler geliefert
    pub absender_getrennt: bool,
    /// Ein Lesevorgang vom Absender hat das Zeitlimit ueberschritten
    pub zeitlimit: bool,
    /// Schreiben zum Ziel ist gescheitert
    pub ziel_fehlgeschlagen: bool,
}

impl TransferBericht {
    /// true wenn alle angekuendigten Bytes beim Ziel angekommen sind
    pub fn ist_vollstaendig(&self) -> bool {
        match self.erwartet {
            Some(n) => {
                !self.ziel_fehlgeschlagen
                    && self.empfangen == u64::from(n)
                    && self.weitergeleitet == u64::from(n)
            }
            None => false,
        }
    }

    /// Angekuendigte Laenge in Bytes (0 wenn unbekannt)
    pub fn erwartete_bytes(&self) -> u64 {
        self.erwartet.map(u64::from).unwrap_or(0)
    }
}

/// Fuehrt eine einzelne Bilduebertragung durch
pub struct BildTransfer<'a> {
    absender: &'a str,
    ziel: &'a VerbindungsHandle,
    chunk_bytes: usize,
    chunk_timeout: Duration,
}

impl<'a> BildTransfer<'a> {
    pub fn neu(
        absender: &'a str,
        ziel: &'a VerbindungsHandle,
        chunk_bytes: usize,
        chunk_timeout: Duration,
    ) -> Self {
        Self {
            absender,
            ziel,
            chunk_bytes: chunk_bytes.max(1),
            chunk_timeout,
        }
    }

    /// Leitet Kopf, Laenge und Nutzdaten vom Absender-Leser zum Ziel weiter
    pub async fn weiterleiten<R>(&self, dateiname: &str, leser: &mut FrameLeser<R>) -> TransferBericht
    where
        R: AsyncRead + Unpin,
    {
        let mut bericht = TransferBericht::default();
        let mut ziel = self.ziel.exklusiv().await;

        // 1. Kopf
        let kopf = Benachrichtigung::BildKopf {
            absender: self.absender.to_string(),
            dateiname: dateiname.to_string(),
        };
        if let Err(e) = ziel.senden(&kopf).await {
            tracing::warn!(peer = %self.ziel.peer_addr(), fehler = %e, "Bild-Kopf nicht zustellbar");
            bericht.ziel_fehlgeschlagen = true;
        }

        // 2. Laengen-Feld
        let laenge = match tokio::time::timeout(self.chunk_timeout, leser.laenge_lesen()).await {
            Ok(Ok(n)) => n,
            Ok(Err(e)) => {
                tracing::debug!(absender = %self.absender, fehler = %e, "Laengen-Feld nicht lesbar");
                bericht.absender_getrennt = true;
                return bericht;
            }
            Err(_) => {
                bericht.zeitlimit = true;
                return bericht;
            }
        };
        bericht.erwartet = Some(laenge);

        if !bericht.ziel_fehlgeschlagen {
            if let Err(e) = ziel.schreiben(&laenge_kodieren(laenge)).await {
                tracing::warn!(peer = %self.ziel.peer_addr(), fehler = %e, "Laengen-Feld nicht zustellbar");
                bericht.ziel_fehlgeschlagen = true;
            }
        }

        // 3. Nutzdaten
        let mut puffer = vec![0u8; self.chunk_bytes];
        let mut rest = u64::from(laenge);
        while rest > 0 {
            let max = rest.min(puffer.len() as u64) as usize;
            let gelesen = match tokio::time::timeout(
                self.chunk_timeout,
                leser.chunk_lesen(&mut puffer[..max]),
            )
            .await
            {
                Ok(Ok(0)) => {
                    bericht.absender_getrennt = true;
                    break;
                }
                Ok(Ok(n)) => n,
                Ok(Err(e)) => {
                    tracing::debug!(absender = %self.absender, fehler = %e, "Lesefehler waehrend Bilduebertragung");
                    bericht.absender_getrennt = true;
                    break;
                }
                Err(_) => {
                    bericht.zeitlimit = true;
                    break;
                }
            };

            bericht.empfangen += gelesen as u64;
            rest -= gelesen as u64;

            if bericht.ziel_fehlgeschlagen {
                continue;
            }
            match ziel.schreiben(&puffer[..gelesen]).await {
                Ok(()) => bericht.weitergeleitet += gelesen as u64,
                Err(e) => {
                    tracing::warn!(peer = %self.ziel.peer_addr(), fehler = %e, "Bilddaten nicht zustellbar");
                    bericht.ziel_fehlgeschlagen = true;
                }
            }
        }

        bericht
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};

    fn ziel_verbindung(puffer: usize, timeout: Duration) -> (VerbindungsHandle, DuplexStream) {
        let (a, b) = tokio::io::duplex(puffer);
        (
            VerbindungsHandle::neu("127.0.0.1:2".parse().unwrap(), a, true, timeout),
            b,
        )
    }

    #[tokio::test]
    async fn vollstaendige_uebertragung() {
        let daten: Vec<u8> = (0..5000u32).map(|i| (i % 251) as u8).collect();
        let (ziel, mut ziel_empfang) = ziel_verbindung(64 * 1024, Duration::from_secs(1));

        let (mut absender, absender_server) = tokio::io::duplex(64 * 1024);
        absender.write_all(&laenge_kodieren(daten.len() as u32)).await.unwrap();
        absender.write_all(&daten).await.unwrap();

        let mut leser = FrameLeser::new(absender_server);
        let transfer = BildTransfer::neu("alice", &ziel, 1024, Duration::from_secs(1));
        let bericht = transfer.weiterleiten("katze.png", &mut leser).await;

        assert!(bericht.ist_vollstaendig(), "{bericht:?}");
        assert_eq!(bericht.weitergeleitet, 5000);
        drop(transfer);
        drop(ziel);

        let mut empfangen = Vec::new();
        ziel_empfang.read_to_end(&mut empfangen).await.unwrap();
        let kopf = b"image|alice|katze.png\n";
        assert_eq!(&empfangen[..kopf.len()], kopf);
        assert_eq!(&empfangen[kopf.len()..kopf.len() + 4], &laenge_kodieren(5000));
        assert_eq!(&empfangen[kopf.len() + 4..], &daten[..]);
    }

    #[tokio::test]
    async fn absender_bricht_ab() {
        let (ziel, _ziel_empfang) = ziel_verbindung(64 * 1024, Duration::from_secs(1));
        let (mut absender, absender_server) = tokio::io::duplex(1024);
        absender.write_all(&laenge_kodieren(100)).await.unwrap();
        absender.write_all(&[7u8; 40]).await.unwrap();
        drop(absender);

        let mut leser = FrameLeser::new(absender_server);
        let bericht = BildTransfer::neu("alice", &ziel, 16, Duration::from_secs(1))
            .weiterleiten("x.png", &mut leser)
            .await;

        assert!(!bericht.ist_vollstaendig());
        assert!(bericht.absender_getrennt);
        assert_eq!(bericht.erwartet, Some(100));
        assert_eq!(bericht.empfangen, 40);
    }

    #[tokio::test]
    async fn zeitlimit_beim_laengen_feld() {
        let (ziel, _ziel_empfang) = ziel_verbindung(1024, Duration::from_secs(1));
        let (_absender, absender_server) = tokio::io::duplex(1024);

        let mut leser = FrameLeser::new(absender_server);
        let bericht = BildTransfer::neu("alice", &ziel, 16, Duration::from_millis(50))
            .weiterleiten("x.png", &mut leser)
            .await;

        assert!(bericht.zeitlimit);
        assert_eq!(bericht.erwartet, None);
        assert!(!bericht.ist_vollstaendig());
    }

    #[tokio::test]
    async fn ziel_blockiert_absender_bleibt_synchron() {
        // Ziel liest nie, Puffer 8 Bytes: Schreiben scheitert am Zeitlimit
        let (ziel, _ziel_empfang) = ziel_verbindung(8, Duration::from_millis(50));
        let (mut absender, absender_server) = tokio::io::duplex(64 * 1024);
        absender.write_all(&laenge_kodieren(3000)).await.unwrap();
        absender.write_all(&[1u8; 3000]).await.unwrap();
        absender.write_all(b"text|bob|danach\n").await.unwrap();

        let mut leser = FrameLeser::new(absender_server);
        let bericht = BildTransfer::neu("alice", &ziel, 512, Duration::from_secs(1))
            .weiterleiten("x.png", &mut leser)
            .await;

        assert!(bericht.ziel_fehlgeschlagen);
        assert_eq!(bericht.empfangen, 3000);
        assert!(!bericht.ist_vollstaendig());

        // Der naechste Frame des Absenders ist intakt
        assert_eq!(
            leser.naechster_frame().await.unwrap().unwrap(),
            b"text|bob|danach".to_vec()
        );
    }

    #[tokio::test]
    async fn leeres_bild() {
        let (ziel, _ziel_empfang) = ziel_verbindung(1024, Duration::from_secs(1));
        let (mut absender, absender_server) = tokio::io::duplex(1024);
        absender.write_all(&laenge_kodieren(0)).await.unwrap();

        let mut leser = FrameLeser::new(absender_server);
        let bericht = BildTransfer::neu("alice", &ziel, 16, Duration::from_secs(1))
            .weiterleiten("leer.png", &mut leser)
            .await;
        assert!(bericht.ist_vollstaendig());
        assert_eq!(bericht.erwartete_bytes(), 0);
    }
}
