//! Integration tests exercising the server over real UDP sockets.
//!
//! Each test spawns its own server task on an ephemeral port, drives it with
//! plain client sockets speaking the wire protocol, and asserts on the
//! decoded event stream.

use server::config::Options;
use server::network::Server;
use shared::{parse_datagram, ClientMessage, Event, TurnDirection};
use std::collections::HashSet;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::timeout;

fn options(seed: u32) -> Options {
    Options {
        port: 0,
        seed,
        turning_speed: 6,
        rounds_per_sec: 200,
        width: 6,
        height: 6,
    }
}

/// Binds a server on an ephemeral port, runs it in the background, and
/// returns the loopback address clients should send to.
async fn spawn_server(options: Options) -> SocketAddr {
    let mut server = Server::bind(&options).await.expect("failed to bind server");
    let port = server.local_addr().expect("local addr").port();
    tokio::spawn(async move {
        let _ = server.run().await;
    });
    format!("[::1]:{}", port).parse().unwrap()
}

async fn client_socket() -> UdpSocket {
    UdpSocket::bind("[::1]:0").await.expect("failed to bind client")
}

fn join_message(session_id: u64, name: &str) -> Vec<u8> {
    ClientMessage {
        session_id,
        turn_direction: TurnDirection::Right.wire_value(),
        next_expected_event_no: 0,
        player_name: name.to_string(),
    }
    .encode()
}

/// Receives broadcast datagrams until a GAME_OVER event arrives, returning
/// every `(event_no, event)` seen, in arrival order.
async fn collect_until_game_over(socket: &UdpSocket) -> Vec<(u32, Event)> {
    let mut events = Vec::new();
    let mut buf = [0u8; 600];
    loop {
        let (len, _) = timeout(Duration::from_secs(5), socket.recv_from(&mut buf))
            .await
            .expect("timed out waiting for a broadcast")
            .expect("recv failed");
        let (_, batch) = parse_datagram(&buf[..len]).expect("broadcast failed to decode");
        let over = batch.iter().any(|(_, e)| *e == Event::GameOver);
        events.extend(batch);
        if over {
            return events;
        }
    }
}

fn assert_well_formed_round(events: &[(u32, Event)], width: u32, height: u32) {
    // Contiguous numbering from zero, in broadcast order.
    for (index, (event_no, _)) in events.iter().enumerate() {
        assert_eq!(*event_no, index as u32, "event numbers must be contiguous");
    }
    assert!(
        matches!(events[0].1, Event::NewGame { .. }),
        "round must open with NEW_GAME"
    );
    assert_eq!(events.last().unwrap().1, Event::GameOver);

    let mut painted = HashSet::new();
    let mut eliminated = HashSet::new();
    for (_, event) in events {
        match event {
            Event::Pixel { player, x, y } => {
                assert!(!eliminated.contains(player), "dead player painted");
                assert!(*x < width && *y < height, "pixel out of bounds");
                assert!(painted.insert((*x, *y)), "cell painted twice");
            }
            Event::PlayerEliminated { player } => {
                assert!(eliminated.insert(*player), "player eliminated twice");
            }
            _ => {}
        }
    }
}

#[tokio::test]
async fn two_players_complete_a_round() {
    let server = spawn_server(options(123)).await;
    let a = client_socket().await;
    let b = client_socket().await;

    a.send_to(&join_message(1, "A"), server).await.unwrap();
    b.send_to(&join_message(1, "B"), server).await.unwrap();

    let events = collect_until_game_over(&a).await;
    assert_well_formed_round(&events, 6, 6);
    match &events[0].1 {
        Event::NewGame {
            width,
            height,
            names,
        } => {
            assert_eq!((*width, *height), (6, 6));
            assert_eq!(names, &["A", "B"]);
        }
        other => panic!("expected NEW_GAME, got {:?}", other),
    }

    // The other player sees the same prefix-consistent stream.
    let events_b = collect_until_game_over(&b).await;
    assert_eq!(events, events_b);
}

#[tokio::test]
async fn history_replays_identically_from_any_cursor() {
    let server = spawn_server(options(321)).await;
    let a = client_socket().await;
    let b = client_socket().await;

    a.send_to(&join_message(1, "A"), server).await.unwrap();
    b.send_to(&join_message(1, "B"), server).await.unwrap();
    let original = collect_until_game_over(&a).await;

    // Ask for the full history twice; both replies must be identical and
    // must match what was broadcast live.
    let replay_request = ClientMessage {
        session_id: 1,
        turn_direction: TurnDirection::Straight.wire_value(),
        next_expected_event_no: 0,
        player_name: "A".to_string(),
    }
    .encode();

    for _ in 0..2 {
        a.send_to(&replay_request, server).await.unwrap();
        let replayed = collect_until_game_over(&a).await;
        assert_eq!(replayed, original);
    }

    // A cursor in the middle yields exactly the suffix from there.
    let cursor = (original.len() / 2) as u32;
    let mid_request = ClientMessage {
        session_id: 1,
        turn_direction: TurnDirection::Straight.wire_value(),
        next_expected_event_no: cursor,
        player_name: "A".to_string(),
    }
    .encode();
    a.send_to(&mid_request, server).await.unwrap();
    let suffix = collect_until_game_over(&a).await;
    assert_eq!(suffix, &original[cursor as usize..]);
}

#[tokio::test]
async fn malformed_datagrams_are_ignored_and_observers_hear_everything() {
    let server = spawn_server(options(7)).await;
    let observer = client_socket().await;
    let a = client_socket().await;
    let b = client_socket().await;

    // Garbage of various shapes: too short, too long, bad name bytes.
    observer.send_to(&[0u8; 5], server).await.unwrap();
    observer.send_to(&[0xFF; 40], server).await.unwrap();
    let mut bad_name = join_message(1, "ok");
    bad_name.push(b'\n');
    observer.send_to(&bad_name, server).await.unwrap();

    // A real observer registration: empty name, no steering.
    let watch = ClientMessage {
        session_id: 9,
        turn_direction: TurnDirection::Straight.wire_value(),
        next_expected_event_no: 0,
        player_name: String::new(),
    }
    .encode();
    observer.send_to(&watch, server).await.unwrap();

    a.send_to(&join_message(1, "A"), server).await.unwrap();
    b.send_to(&join_message(1, "B"), server).await.unwrap();

    // Observers are broadcast targets like everyone else, and the garbage
    // neither crashed the server nor registered a player.
    let events = collect_until_game_over(&observer).await;
    assert_well_formed_round(&events, 6, 6);
    match &events[0].1 {
        Event::NewGame { names, .. } => assert_eq!(names, &["A", "B"]),
        other => panic!("expected NEW_GAME, got {:?}", other),
    }
}
