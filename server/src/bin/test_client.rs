//! Manual smoke-test client: joins the server, steers in a lazy circle, and
//! prints every event it receives. Not part of the game proper.
//!
//! Usage: `test_client [server_addr] [name]`, defaulting to
//! `[::1]:2021` and the name `tester`.

use shared::{parse_datagram, ClientMessage, Event, TurnDirection, MAX_DATAGRAM_SIZE};
use std::net::SocketAddr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::net::UdpSocket;
use tokio::time::timeout;

fn session_id() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_millis() as u64
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut args = std::env::args().skip(1);
    let server_addr: SocketAddr = args
        .next()
        .unwrap_or_else(|| "[::1]:2021".to_string())
        .parse()?;
    let name = args.next().unwrap_or_else(|| "tester".to_string());

    let socket = UdpSocket::bind("[::]:0").await?;
    println!("client socket bound to {}", socket.local_addr()?);
    println!("joining {} as {:?}", server_addr, name);

    let mut session_id = session_id();
    let mut current_game: Option<u32> = None;
    let mut next_expected = 0u32;
    let mut buf = [0u8; MAX_DATAGRAM_SIZE];

    loop {
        // Keep a turn key held so the server counts us as ready, and keep
        // sending so the 2-second silence sweep never cuts us off.
        let message = ClientMessage {
            session_id,
            turn_direction: TurnDirection::Right.wire_value(),
            next_expected_event_no: next_expected,
            player_name: name.clone(),
        };
        socket.send_to(&message.encode(), server_addr).await?;

        match timeout(Duration::from_millis(100), socket.recv_from(&mut buf)).await {
            Ok(Ok((len, _))) => match parse_datagram(&buf[..len]) {
                Ok((game_id, events)) => {
                    if current_game != Some(game_id) {
                        current_game = Some(game_id);
                        next_expected = 0;
                    }
                    for (event_no, event) in events {
                        if event_no >= next_expected {
                            next_expected = event_no + 1;
                        }
                        println!("game {:#010x} event {}: {:?}", game_id, event_no, event);
                        if event == Event::GameOver {
                            // Only a fresh session id re-enters the lobby.
                            println!("round over, rejoining for the next one");
                            session_id += 1;
                        }
                    }
                }
                Err(e) => println!("undecodable datagram: {}", e),
            },
            Ok(Err(e)) => {
                println!("recv error: {}", e);
                return Err(e.into());
            }
            Err(_) => {} // nothing broadcast yet; send again
        }
    }
}
