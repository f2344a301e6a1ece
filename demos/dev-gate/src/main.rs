use gatehouse::prelude::*;

// ---------------------------------------------------------------------------
// Server bootstrap
// ---------------------------------------------------------------------------

/// Accepts any numeric token as the player id. Development only.
struct TokenAuth;

impl Authenticator for TokenAuth {
    async fn authenticate(&self, token: &str) -> Result<PlayerId, SessionError> {
        let id: u64 = token.parse()
            .map_err(|_| SessionError::AuthFailed("token must be a number".into()))?;
        Ok(PlayerId(id))
    }
}

const SHUTDOWN_KEY: &str = "gatehouse.shutdown";

fn messages() -> LocaleTable {
    LocaleTable::new("en_us")
        .with("en_us", SHUTDOWN_KEY, "Server is shutting down")
        .with("de_de", SHUTDOWN_KEY, "Server wird heruntergefahren")
        .with("fr_fr", SHUTDOWN_KEY, "Le serveur s'arrête")
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let bind = std::env::var("GATEHOUSE_BIND").unwrap_or_else(|_| "0.0.0.0:8080".to_string());
    let server = GatehouseServerBuilder::new()
        .bind(&bind)
        .localizer(messages())
        .build(TokenAuth)
        .await?;
    tracing::info!(addr = %server.local_addr()?, "dev gate listening, ctrl-c to stop");

    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    server.run_until(ctrl_c, SHUTDOWN_KEY).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::{SinkExt, StreamExt};
    use std::time::Duration;
    use tokio_tungstenite::tungstenite::Message;

    type Ws = tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >;

    async fn ws(addr: &str) -> Ws {
        let (ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}"))
            .await
            .unwrap();
        ws
    }

    fn enc(message: SystemMessage) -> Message {
        Message::Binary(serde_json::to_vec(&Envelope::new(0, 0, message)).unwrap().into())
    }

    async fn dec(ws: &mut Ws) -> SystemMessage {
        let msg = ws.next().await.unwrap().unwrap();
        serde_json::from_slice::<Envelope>(&msg.into_data()).unwrap().message
    }

    #[tokio::test]
    async fn test_french_client_gets_french_shutdown_notice() {
        let server = GatehouseServerBuilder::new()
            .bind("127.0.0.1:0")
            .registry_config(RegistryConfig::default())
            .localizer(messages())
            .build(TokenAuth)
            .await
            .unwrap();
        let addr = server.local_addr().unwrap().to_string();
        let (stop, stopped) = tokio::sync::oneshot::channel::<()>();
        let running = tokio::spawn(server.run_until(
            async {
                let _ = stopped.await;
            },
            SHUTDOWN_KEY,
        ));

        let mut client = ws(&addr).await;
        client.send(enc(SystemMessage::Handshake {
            version: PROTOCOL_VERSION,
            token: Some("11".into()),
            locale: Some("fr_FR".into()),
            account_id: None,
        })).await.unwrap();
        assert!(matches!(dec(&mut client).await, SystemMessage::HandshakeAck { .. }));

        stop.send(()).unwrap();
        running.await.unwrap().unwrap();

        let notice = tokio::time::timeout(Duration::from_secs(2), dec(&mut client))
            .await
            .unwrap();
        assert_eq!(
            notice,
            SystemMessage::Disconnect { reason: "Le serveur s'arrête".into() }
        );
    }

    #[tokio::test]
    async fn test_bad_token_is_unauthorized() {
        let server = GatehouseServerBuilder::new()
            .bind("127.0.0.1:0")
            .registry_config(RegistryConfig::default())
            .build(TokenAuth)
            .await
            .unwrap();
        let addr = server.local_addr().unwrap().to_string();
        tokio::spawn(async move {
            let _ = server.run().await;
        });
        tokio::time::sleep(Duration::from_millis(10)).await;

        let mut client = ws(&addr).await;
        client.send(enc(SystemMessage::Handshake {
            version: PROTOCOL_VERSION,
            token: Some("guest".into()),
            locale: None,
            account_id: None,
        })).await.unwrap();
        assert!(matches!(
            dec(&mut client).await,
            SystemMessage::Error { code: error_codes::UNAUTHORIZED, .. }
        ));
    }
}
