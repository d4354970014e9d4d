//! Drives the real router over TCP with the real client.

use base64::prelude::BASE64_STANDARD;
use base64::Engine;
use futures_util::{SinkExt, StreamExt};
use p256::ecdsa::SigningKey;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;
use wsk_client::socket_auth::AuthError;
use wsk_client::WsClientError;
use wsk_server::config::{HttpConfig, LogConfig, ServerConfig};
use wsk_server::routes::build_router;
use wsk_server::serve::AppState;
use wskeyid_rs::api::{ClientMessage, ServerMessage};
use wskeyid_rs::handshake::HandshakeConfig;

async fn spawn_server(handshake: HandshakeConfig) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let config = ServerConfig {
        server: HttpConfig {
            bind_address: addr,
            testing_only_tls_config: None,
        },
        handshake,
        log: LogConfig::default(),
    };
    let router = build_router(AppState::new(config));
    tokio::spawn(async move {
        axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
    });
    addr
}

#[tokio::test]
async fn client_authenticates() {
    let addr = spawn_server(HandshakeConfig::default()).await;
    let key = SigningKey::from_slice(&[0x42; 32]).unwrap();

    let result = wsk_client::connect_with_key(&format!("ws://{addr}/auth"), &key).await;
    assert!(result.is_ok(), "{:?}", result.err());
}

#[tokio::test]
async fn client_authenticates_with_hardening_enabled() {
    let addr = spawn_server(HandshakeConfig {
        response_timeout: Some(std::time::Duration::from_secs(10)),
        max_malformed_responses: Some(1),
        require_challenge_binding: true,
        accept_compact_client_ids: true,
    })
    .await;
    let key = wsk_client::keys::generate_signing_key();

    let result = wsk_client::connect_with_key(&format!("ws://{addr}/auth"), &key).await;
    assert!(result.is_ok(), "{:?}", result.err());
}

#[tokio::test]
async fn binary_challenge_response_is_accepted() {
    let addr = spawn_server(HandshakeConfig::default()).await;
    let key = SigningKey::from_slice(&[0x42; 32]).unwrap();

    let url = wsk_client::auth_url(&format!("ws://{addr}/auth"), &key).unwrap();
    let (mut ws, _) = tokio_tungstenite::connect_async(url.as_str()).await.unwrap();

    let Some(Ok(Message::Text(text))) = ws.next().await else {
        panic!("expected a text message");
    };
    let ServerMessage::Challenge(challenge) = serde_json::from_str(&text).unwrap() else {
        panic!("expected CHALLENGE, got {text}");
    };
    let payload = BASE64_STANDARD.decode(&challenge.payload).unwrap();
    let response =
        ClientMessage::ChallengeResponse(wsk_client::socket_auth::sign_challenge(&key, &payload));
    ws.send(Message::Binary(serde_json::to_vec(&response).unwrap()))
        .await
        .unwrap();

    let Some(Ok(Message::Text(text))) = ws.next().await else {
        panic!("expected a text message");
    };
    assert_eq!(
        serde_json::from_str::<ServerMessage>(&text).unwrap(),
        ServerMessage::Connected
    );
}

#[tokio::test]
async fn bad_client_id_is_reported_and_closed() {
    let addr = spawn_server(HandshakeConfig::default()).await;

    let (mut ws, _) =
        tokio_tungstenite::connect_async(format!("ws://{addr}/auth?client_id=nonsense"))
            .await
            .unwrap();

    let Some(Ok(Message::Text(text))) = ws.next().await else {
        panic!("expected a text message");
    };
    match serde_json::from_str::<ServerMessage>(&text).unwrap() {
        ServerMessage::ClientError(e) => {
            assert_eq!(e.title, "Bad client ID was supplied");
            assert_eq!(e.meta.get("client_id").map(String::as_str), Some("nonsense"));
        }
        other => panic!("unexpected message: {other:?}"),
    }

    // The server hangs up after reporting the error.
    loop {
        match ws.next().await {
            Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
            Some(Ok(_)) => continue,
        }
    }
}

#[tokio::test]
async fn missing_client_id_is_reported() {
    let addr = spawn_server(HandshakeConfig::default()).await;

    let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/auth"))
        .await
        .unwrap();

    let Some(Ok(Message::Text(text))) = ws.next().await else {
        panic!("expected a text message");
    };
    let ServerMessage::ClientError(e) = serde_json::from_str::<ServerMessage>(&text).unwrap()
    else {
        panic!("expected CLIENT_ERROR, got {text}");
    };
    assert!(e.detail.contains("not supplied"), "{}", e.detail);
}

#[tokio::test]
async fn wrong_identifier_for_key_is_rejected() {
    let addr = spawn_server(HandshakeConfig::default()).await;
    let key = SigningKey::from_slice(&[0x42; 32]).unwrap();
    let other = SigningKey::from_slice(&[0x43; 32]).unwrap();

    // Present the identifier of `other` but sign with `key`.
    let url = wsk_client::auth_url(&format!("ws://{addr}/auth"), &other).unwrap();
    let (mut ws, _) = tokio_tungstenite::connect_async(url.as_str()).await.unwrap();
    let err = wsk_client::socket_auth::authenticate(&mut ws, &key)
        .await
        .unwrap_err();
    match err {
        AuthError::Rejected(e) => assert_eq!(e.title, "Signature verification failed"),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn unknown_route() {
    let addr = spawn_server(HandshakeConfig::default()).await;
    let err = wsk_client::connect_with_key(
        &format!("ws://{addr}/elsewhere"),
        &SigningKey::from_slice(&[0x42; 32]).unwrap(),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, WsClientError::Connection(_)));
}
