mod support;

use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{Message, protocol::frame::coding::CloseCode},
};

async fn query_relay() -> support::RelayProcess {
    support::spawn_relay(&[("RELAY_TARGET_MODE", "query".to_string())]).await
}

#[tokio::test]
async fn missing_port_closes_with_policy_violation() {
    let game = support::FakeGameServer::bind().await;
    let relay = query_relay().await;

    let (mut ws, _) = connect_async(relay.ws_url(&format!("/?host={}", support::HOST)))
        .await
        .expect("upgrade happens before the target is checked");

    let frame = tokio::time::timeout(Duration::from_secs(5), ws.next())
        .await
        .expect("close within 5s");
    match frame {
        Some(Ok(Message::Close(Some(close)))) => {
            assert_eq!(close.code, CloseCode::Policy);
            assert_eq!(close.reason.as_str(), "missing host/port");
        }
        other => panic!("expected close frame, got {other:?}"),
    }

    let mut buf = [0u8; 16];
    let nothing =
        tokio::time::timeout(Duration::from_millis(200), game.socket.recv_from(&mut buf)).await;
    assert!(nothing.is_err(), "no datagram may reach the game server");
}

#[tokio::test]
async fn query_parameters_choose_the_game_server() {
    let game = support::FakeGameServer::bind().await;
    let relay = query_relay().await;

    let url = relay.ws_url(&format!("/?host={}&port={}", support::HOST, game.port));
    let (mut ws, _) = connect_async(url).await.unwrap();

    ws.send(Message::binary(b"\xFF\xFF\xFF\xFFgetstatus".to_vec()))
        .await
        .unwrap();

    let (packet, from) = game.recv().await;
    assert_eq!(packet, b"\xFF\xFF\xFF\xFFgetstatus");

    game.send_oob("statusResponse\n\\sv_hostname\\q", from).await;
    match ws.next().await.unwrap().unwrap() {
        Message::Binary(data) => {
            assert_eq!(&data[..], b"\xFF\xFF\xFF\xFFstatusResponse\n\\sv_hostname\\q")
        }
        other => panic!("expected binary frame, got {other:?}"),
    }
}
