//! Message-Dispatcher – Routet Frames an die richtige Ziel-Sitzung
//!
//! | Typ            | Vorbedingung                | Aktion                                   |
//! |----------------|-----------------------------|------------------------------------------|
//! | `text`         | Ziel online                 | `[absender] inhalt` an das Ziel          |
//! | `friend_req`   | Ziel online, Ziel != selbst | `friend_req|absender` an das Ziel        |
//! | `friend_reply` | Ziel online                 | `friend_reply|absender|ergebnis`         |
//! | `user_query`   | –                           | `user_list|...` an den Absender          |
//! | `offline`      | –                           | Leseschleife beenden                     |
//! | `image`        | Ziel online                 | Bilduebertragung                         |
//!
//! Jeder Dispatch haelt die Registry-Sperre von der Analyse des Frames bis
//! zur letzten Antwort. Meldbare Fehler gehen als `error: ...` an den
//! Absender, die Sitzung laeuft weiter.

use std::sync::Arc;

use lanchat_core::{RelayError, RelayResult};
use lanchat_protocol::{Benachrichtigung, Frame, FrameLeser};
use tokio::io::AsyncRead;

use crate::bild_transfer::BildTransfer;
use crate::registry::RegistryGuard;
use crate::server_state::RelayState;
use crate::session::{Sitzung, VerbindungsHandle};

/// Wie es nach einem Dispatch mit der Sitzung weitergeht
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchErgebnis {
    Weiter,
    /// Der Client hat sich mit `offline` abgemeldet
    Beenden,
}

/// Zentraler Message-Dispatcher
pub struct MessageDispatcher {
    state: Arc<RelayState>,
}

impl MessageDispatcher {
    pub fn neu(state: Arc<RelayState>) -> Self {
        Self { state }
    }

    /// Verarbeitet einen rohen Frame der Sitzung `sitzung`
    ///
    /// Fuer Bild-Frames liest der Dispatcher Laenge und Nutzdaten aus
    /// `leser`. Gibt nur Fehler zurueck, die die Sitzung beenden.
    pub async fn dispatch<R>(
        &self,
        roh: &[u8],
        sitzung: &Sitzung,
        leser: &mut FrameLeser<R>,
    ) -> RelayResult<DispatchErgebnis>
    where
        R: AsyncRead + Unpin,
    {
        let mut guard = self.state.registry.sperren().await;

        let ergebnis = match Frame::aus_bytes(roh) {
            Ok(frame) => {
                tracing::trace!(name = %sitzung.name, typ = %frame.typ(), "Frame empfangen");
                self.routen(frame, sitzung, &mut guard, leser).await
            }
            Err(e) => Err(e),
        };

        match ergebnis {
            Ok(weiter) => Ok(weiter),
            Err(fehler) if fehler.ist_meldbar() => {
                tracing::debug!(name = %sitzung.name, fehler = %fehler, "Fehler an Absender gemeldet");
                sitzung
                    .verbindung
                    .senden(&fehler_benachrichtigung(&fehler))
                    .await?;
                Ok(DispatchErgebnis::Weiter)
            }
            Err(fehler) => Err(fehler),
        }
    }

    async fn routen<R>(
        &self,
        frame: Frame,
        sitzung: &Sitzung,
        guard: &mut RegistryGuard<'_>,
        leser: &mut FrameLeser<R>,
    ) -> RelayResult<DispatchErgebnis>
    where
        R: AsyncRead + Unpin,
    {
        let absender = sitzung.name.clone();

        match frame {
            Frame::Text { ziel, inhalt } => {
                let verbindung = ziel_holen(guard, &ziel)?;
                zustellen(
                    verbindung,
                    &ziel,
                    &Benachrichtigung::Nachricht { absender, inhalt },
                )
                .await?;
            }

            Frame::FriendRequest { ziel } => {
                if ziel == sitzung.name {
                    return Err(RelayError::SelbstAnfrage);
                }
                let verbindung = ziel_holen(guard, &ziel)?;
                zustellen(verbindung, &ziel, &Benachrichtigung::FreundAnfrage { absender }).await?;
                sitzung
                    .verbindung
                    .senden(&Benachrichtigung::Bestaetigung(format!(
                        "friend request sent to {ziel}"
                    )))
                    .await?;
            }

            Frame::FriendReply { ziel, ergebnis } => {
                let verbindung = ziel_holen(guard, &ziel)?;
                zustellen(
                    verbindung,
                    &ziel,
                    &Benachrichtigung::FreundAntwort { absender, ergebnis },
                )
                .await?;
            }

            Frame::UserQuery => {
                let namen = guard.namen_ausser(&sitzung.name);
                sitzung
                    .verbindung
                    .senden(&Benachrichtigung::BenutzerListe(namen))
                    .await?;
            }

            Frame::Offline { grund } => {
                tracing::info!(name = %sitzung.name, grund = %grund, "Client meldet sich ab");
                return Ok(DispatchErgebnis::Beenden);
            }

            Frame::ImageHeader { ziel, dateiname } => {
                let verbindung = ziel_holen(guard, &ziel)?.clone();
                self.bild_weiterleiten(sitzung, &verbindung, &ziel, &dateiname, guard, leser)
                    .await?;
            }
        }

        Ok(DispatchErgebnis::Weiter)
    }

    async fn bild_weiterleiten<R>(
        &self,
        sitzung: &Sitzung,
        ziel_verbindung: &VerbindungsHandle,
        ziel: &str,
        dateiname: &str,
        guard: &mut RegistryGuard<'_>,
        leser: &mut FrameLeser<R>,
    ) -> RelayResult<()>
    where
        R: AsyncRead + Unpin,
    {
        let config = &self.state.config;
        let bericht = BildTransfer::neu(
            &sitzung.name,
            ziel_verbindung,
            config.bild_chunk_bytes,
            config.bild_chunk_timeout,
        )
        .weiterleiten(dateiname, leser)
        .await;

        if bericht.ist_vollstaendig() {
            tracing::info!(
                absender = %sitzung.name,
                ziel = %ziel,
                datei = %dateiname,
                bytes = bericht.weitergeleitet,
                "Bild uebertragen"
            );
            sitzung
                .verbindung
                .senden(&Benachrichtigung::Bestaetigung(format!(
                    "transfer complete ({} bytes)",
                    bericht.weitergeleitet
                )))
                .await?;
            return Ok(());
        }

        tracing::warn!(
            absender = %sitzung.name,
            ziel = %ziel,
            datei = %dateiname,
            erwartet = bericht.erwartete_bytes(),
            empfangen = bericht.empfangen,
            weitergeleitet = bericht.weitergeleitet,
            zeitlimit = bericht.zeitlimit,
            ziel_fehlgeschlagen = bericht.ziel_fehlgeschlagen,
            "Bilduebertragung unvollstaendig"
        );
        let fehler = RelayError::UebertragungUnvollstaendig {
            erwartet: bericht.erwartete_bytes(),
            empfangen: bericht.weitergeleitet,
        };

        // Das Ziel wartet noch auf Bilddaten, jede weitere Nachricht an
        // diese Verbindung wuerde als Nutzdaten gelesen.
        if let Some(eintrag) = guard.entfernen(ziel) {
            tracing::warn!(ziel = %ziel, "Ziel nach unvollstaendiger Bilduebertragung getrennt");
            eintrag.verbindung.trennen().await;
        }

        if bericht.absender_getrennt {
            // Best effort, der Absender ist vermutlich schon weg
            if let Err(e) = sitzung
                .verbindung
                .senden(&fehler_benachrichtigung(&fehler))
                .await
            {
                tracing::trace!(name = %sitzung.name, fehler = %e, "Fehlermeldung nicht zustellbar");
            }
            return Err(RelayError::PeerGetrennt);
        }
        Err(fehler)
    }
}

/// Verbindung des Ziels oder `ZielNichtGefunden`
fn ziel_holen<'g>(guard: &'g RegistryGuard<'_>, ziel: &str) -> RelayResult<&'g VerbindungsHandle> {
    guard
        .nachschlagen(ziel)
        .ok_or_else(|| RelayError::ZielNichtGefunden(ziel.to_string()))
}

/// Schreibt eine Nachricht auf die Verbindung des Ziels
async fn zustellen(
    verbindung: &VerbindungsHandle,
    ziel: &str,
    nachricht: &Benachrichtigung,
) -> RelayResult<()> {
    verbindung.senden(nachricht).await.map_err(|e| {
        tracing::warn!(ziel = %ziel, fehler = %e, "Zustellung fehlgeschlagen");
        RelayError::ZustellungFehlgeschlagen(ziel.to_string())
    })
}

/// Uebersetzt einen meldbaren Fehler in die Nachricht an den Absender
pub fn fehler_benachrichtigung(fehler: &RelayError) -> Benachrichtigung {
    match fehler {
        RelayError::UngueltigerFrame(_) => {
            Benachrichtigung::Fehler("malformed frame, expected type|target|content".into())
        }
        RelayError::ZielNichtGefunden(ziel) => Benachrichtigung::ziel_nicht_gefunden(ziel),
        RelayError::SelbstAnfrage => {
            Benachrichtigung::Fehler("cannot send a friend request to yourself".into())
        }
        RelayError::UebertragungUnvollstaendig {
            erwartet,
            empfangen,
        } => Benachrichtigung::Fehler(format!(
            "incomplete transfer ({empfangen}/{erwartet} bytes)"
        )),
        RelayError::ZustellungFehlgeschlagen(ziel) => {
            Benachrichtigung::Fehler(format!("delivery to '{ziel}' failed"))
        }
        RelayError::UngueltigerName(_) | RelayError::LeererName => {
            Benachrichtigung::Fehler("invalid name".into())
        }
        RelayError::NameVergeben(_) => Benachrichtigung::NameVergeben,
        RelayError::ServerVoll => Benachrichtigung::Fehler("server full".into()),
        RelayError::ServerFaehrtHerunter => Benachrichtigung::Herunterfahren,
        andere => Benachrichtigung::Fehler(andere.to_string()),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server_state::RelayConfig;
    use lanchat_protocol::wire::laenge_kodieren;
    use std::time::Duration;
    use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader, DuplexStream};

    struct TestClient {
        sitzung: Sitzung,
        empfang: BufReader<DuplexStream>,
    }

    async fn client(state: &Arc<RelayState>, name: &str) -> TestClient {
        let (a, b) = tokio::io::duplex(64 * 1024);
        let verbindung = VerbindungsHandle::neu(
            "127.0.0.1:3".parse().unwrap(),
            a,
            true,
            Duration::from_secs(1),
        );
        let mut sitzung = Sitzung::neu(name.to_string(), verbindung);
        state.registry.registrieren(sitzung.eintrag()).await.unwrap();
        sitzung.aktivieren();
        TestClient {
            sitzung,
            empfang: BufReader::new(b),
        }
    }

    async fn zeile(client: &mut TestClient) -> String {
        let mut zeile = String::new();
        tokio::time::timeout(Duration::from_secs(1), client.empfang.read_line(&mut zeile))
            .await
            .expect("Zeitlimit beim Lesen")
            .unwrap();
        zeile.trim_end_matches('\n').to_string()
    }

    async fn nichts_empfangen(client: &mut TestClient) -> bool {
        let mut zeile = String::new();
        tokio::time::timeout(Duration::from_millis(50), client.empfang.read_line(&mut zeile))
            .await
            .is_err()
    }

    fn leerer_leser() -> FrameLeser<DuplexStream> {
        FrameLeser::new(tokio::io::duplex(16).1)
    }

    async fn senden(
        dispatcher: &MessageDispatcher,
        client: &TestClient,
        frame: &str,
    ) -> RelayResult<DispatchErgebnis> {
        dispatcher
            .dispatch(frame.as_bytes(), &client.sitzung, &mut leerer_leser())
            .await
    }

    #[tokio::test]
    async fn text_wird_nur_an_ziel_zugestellt() {
        let state = RelayState::neu(RelayConfig::default());
        let dispatcher = MessageDispatcher::neu(Arc::clone(&state));
        let mut alice = client(&state, "alice").await;
        let mut bob = client(&state, "bob").await;
        let mut carol = client(&state, "carol").await;

        let ergebnis = senden(&dispatcher, &alice, "text|bob|hallo | welt").await.unwrap();
        assert_eq!(ergebnis, DispatchErgebnis::Weiter);

        assert_eq!(zeile(&mut bob).await, "[alice] hallo | welt");
        assert!(nichts_empfangen(&mut alice).await);
        assert!(nichts_empfangen(&mut carol).await);
    }

    #[tokio::test]
    async fn unbekanntes_ziel_meldet_fehler() {
        let state = RelayState::neu(RelayConfig::default());
        let dispatcher = MessageDispatcher::neu(Arc::clone(&state));
        let mut alice = client(&state, "alice").await;
        let mut bob = client(&state, "bob").await;

        senden(&dispatcher, &alice, "text|carol|hi").await.unwrap();
        assert_eq!(
            zeile(&mut alice).await,
            "error: user 'carol' is offline or does not exist"
        );
        assert!(nichts_empfangen(&mut bob).await);
    }

    #[tokio::test]
    async fn ungueltiger_frame_beendet_sitzung_nicht() {
        let state = RelayState::neu(RelayConfig::default());
        let dispatcher = MessageDispatcher::neu(Arc::clone(&state));
        let mut alice = client(&state, "alice").await;

        for frame in ["hallo", "text|bob", "gibtsnicht|bob|x"] {
            let ergebnis = senden(&dispatcher, &alice, frame).await.unwrap();
            assert_eq!(ergebnis, DispatchErgebnis::Weiter);
            assert!(zeile(&mut alice).await.starts_with("error: malformed frame"));
        }
    }

    #[tokio::test]
    async fn freundschaft_handshake() {
        let state = RelayState::neu(RelayConfig::default());
        let dispatcher = MessageDispatcher::neu(Arc::clone(&state));
        let mut alice = client(&state, "alice").await;
        let mut bob = client(&state, "bob").await;

        senden(&dispatcher, &alice, "friend_req|bob|apply").await.unwrap();
        assert_eq!(zeile(&mut bob).await, "friend_req|alice");
        assert_eq!(zeile(&mut alice).await, "ok: friend request sent to bob");

        senden(&dispatcher, &bob, "friend_reply|alice|accept").await.unwrap();
        assert_eq!(zeile(&mut alice).await, "friend_reply|bob|accept");
        assert!(nichts_empfangen(&mut bob).await);
    }

    #[tokio::test]
    async fn freundschaftsanfrage_an_sich_selbst() {
        let state = RelayState::neu(RelayConfig::default());
        let dispatcher = MessageDispatcher::neu(Arc::clone(&state));
        let mut alice = client(&state, "alice").await;

        senden(&dispatcher, &alice, "friend_req|alice|apply").await.unwrap();
        assert_eq!(
            zeile(&mut alice).await,
            "error: cannot send a friend request to yourself"
        );
    }

    #[tokio::test]
    async fn benutzerliste_ohne_eigenen_namen() {
        let state = RelayState::neu(RelayConfig::default());
        let dispatcher = MessageDispatcher::neu(Arc::clone(&state));
        let mut bob = client(&state, "bob").await;
        let _carol = client(&state, "carol").await;
        let _alice = client(&state, "alice").await;

        senden(&dispatcher, &bob, "user_query|none|none").await.unwrap();
        assert_eq!(zeile(&mut bob).await, "user_list|alice,carol");
    }

    #[tokio::test]
    async fn offline_beendet() {
        let state = RelayState::neu(RelayConfig::default());
        let dispatcher = MessageDispatcher::neu(Arc::clone(&state));
        let mut alice = client(&state, "alice").await;

        let ergebnis = senden(&dispatcher, &alice, "offline|alice|feierabend").await.unwrap();
        assert_eq!(ergebnis, DispatchErgebnis::Beenden);
        assert!(nichts_empfangen(&mut alice).await);
    }

    #[tokio::test]
    async fn bild_wird_weitergeleitet() {
        let state = RelayState::neu(RelayConfig::default());
        let dispatcher = MessageDispatcher::neu(Arc::clone(&state));
        let mut alice = client(&state, "alice").await;
        let mut bob = client(&state, "bob").await;

        let daten: Vec<u8> = (0..3000u32).map(|i| (i * 7 % 256) as u8).collect();
        let (mut absender, absender_server) = tokio::io::duplex(64 * 1024);
        absender.write_all(&laenge_kodieren(daten.len() as u32)).await.unwrap();
        absender.write_all(&daten).await.unwrap();
        let mut leser = FrameLeser::new(absender_server);

        dispatcher
            .dispatch(b"image|bob|foto.jpg", &alice.sitzung, &mut leser)
            .await
            .unwrap();

        assert_eq!(zeile(&mut bob).await, "image|alice|foto.jpg");
        let laenge = bob.empfang.read_u32().await.unwrap();
        assert_eq!(laenge, 3000);
        let mut empfangen = vec![0u8; 3000];
        bob.empfang.read_exact(&mut empfangen).await.unwrap();
        assert_eq!(empfangen, daten);

        assert_eq!(zeile(&mut alice).await, "ok: transfer complete (3000 bytes)");
    }

    #[tokio::test]
    async fn bild_an_unbekanntes_ziel() {
        let state = RelayState::neu(RelayConfig::default());
        let dispatcher = MessageDispatcher::neu(Arc::clone(&state));
        let mut alice = client(&state, "alice").await;

        senden(&dispatcher, &alice, "image|niemand|x.png").await.unwrap();
        assert_eq!(
            zeile(&mut alice).await,
            "error: user 'niemand' is offline or does not exist"
        );
    }

    #[tokio::test]
    async fn abgebrochenes_bild_beendet_sitzung() {
        let state = RelayState::neu(RelayConfig::default());
        let dispatcher = MessageDispatcher::neu(Arc::clone(&state));
        let mut alice = client(&state, "alice").await;
        let mut bob = client(&state, "bob").await;

        let (mut absender, absender_server) = tokio::io::duplex(1024);
        absender.write_all(&laenge_kodieren(500)).await.unwrap();
        absender.write_all(&[0u8; 100]).await.unwrap();
        drop(absender);
        let mut leser = FrameLeser::new(absender_server);

        let fehler = dispatcher
            .dispatch(b"image|bob|x.png", &alice.sitzung, &mut leser)
            .await
            .unwrap_err();
        assert!(matches!(fehler, RelayError::PeerGetrennt));
        assert_eq!(
            zeile(&mut alice).await,
            "error: incomplete transfer (100/500 bytes)"
        );

        // Das Ziel bekommt die Teildaten und danach das Verbindungsende
        assert_eq!(zeile(&mut bob).await, "image|alice|x.png");
        assert_eq!(bob.empfang.read_u32().await.unwrap(), 500);
        let mut rest = Vec::new();
        bob.empfang.read_to_end(&mut rest).await.unwrap();
        assert_eq!(rest.len(), 100);
        assert!(state.registry.nachschlagen("bob").await.is_none());
    }

    #[tokio::test]
    async fn unvollstaendiges_bild_trennt_ziel() {
        let state = RelayState::neu(RelayConfig {
            bild_chunk_timeout: Duration::from_millis(50),
            ..RelayConfig::default()
        });
        let dispatcher = MessageDispatcher::neu(Arc::clone(&state));
        let mut alice = client(&state, "alice").await;
        let mut bob = client(&state, "bob").await;
        let mut carol = client(&state, "carol").await;

        // 20 Bytes angekuendigt, 5 gesendet, Absender bleibt verbunden
        let (mut absender, absender_server) = tokio::io::duplex(1024);
        absender.write_all(&laenge_kodieren(20)).await.unwrap();
        absender.write_all(&[7u8; 5]).await.unwrap();
        let mut leser = FrameLeser::new(absender_server);

        let ergebnis = dispatcher
            .dispatch(b"image|bob|halb.png", &alice.sitzung, &mut leser)
            .await
            .unwrap();
        assert_eq!(ergebnis, DispatchErgebnis::Weiter);
        assert_eq!(zeile(&mut alice).await, "error: incomplete transfer (5/20 bytes)");
        assert!(state.registry.nachschlagen("bob").await.is_none());

        // Nachrichten an bob landen nicht mehr in seinem Bildstrom
        senden(&dispatcher, &carol, "text|bob|hallo von carol").await.unwrap();
        assert_eq!(
            zeile(&mut carol).await,
            "error: user 'bob' is offline or does not exist"
        );

        assert_eq!(zeile(&mut bob).await, "image|alice|halb.png");
        assert_eq!(bob.empfang.read_u32().await.unwrap(), 20);
        let mut rest = Vec::new();
        bob.empfang.read_to_end(&mut rest).await.unwrap();
        assert_eq!(rest, vec![7u8; 5]);
        drop(absender);
    }

    #[test]
    fn fehlertexte() {
        assert_eq!(
            fehler_benachrichtigung(&RelayError::ZustellungFehlgeschlagen("bob".into())).kodieren(),
            "error: delivery to 'bob' failed"
        );
        assert_eq!(
            fehler_benachrichtigung(&RelayError::NameVergeben("bob".into())).kodieren(),
            "name already in use"
        );
        assert_eq!(
            fehler_benachrichtigung(&RelayError::ServerVoll).kodieren(),
            "error: server full"
        );
    }
}
