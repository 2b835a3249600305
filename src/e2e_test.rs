//! End-to-end scenarios over real sockets: supervisors on a shared port and
//! an in-process board speaking the board protocol.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use crate::card::{Card, CardStatus, SymbolCard};
use crate::config::FeatureFlags;
use crate::config::test_helpers::{all_flags, free_port, test_config};
use crate::frame::{BoardEvent, BoardMessage, BoardRequest};
use crate::query::Query;
use crate::store::StoreEvent;
use crate::supervisor::{Mode, Supervisor};

const TOKEN: &str = "e2e-token";

// =============================================================================
// FAKE BOARD
// =============================================================================

/// Board that keeps reconnecting to `/board` and answers the leader's
/// queries from its own card list.
struct FakeBoard {
    connections: Arc<AtomicUsize>,
    task: JoinHandle<()>,
}

impl FakeBoard {
    fn spawn(port: u16, board_id: &'static str, name: &'static str, cards: Vec<Card>) -> Self {
        let connections = Arc::new(AtomicUsize::new(0));
        let cards = Arc::new(Mutex::new(cards));
        let url = format!("ws://127.0.0.1:{port}/board");

        let task = tokio::spawn({
            let connections = connections.clone();
            async move {
                loop {
                    if let Ok((ws, _)) = connect_async(url.as_str()).await {
                        connections.fetch_add(1, Ordering::SeqCst);
                        serve(ws, board_id, name, &cards).await;
                    }
                    tokio::time::sleep(Duration::from_millis(30)).await;
                }
            }
        });
        Self { connections, task }
    }

    fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }
}

impl Drop for FakeBoard {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn serve(
    ws: tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>,
    board_id: &str,
    name: &str,
    cards: &Mutex<Vec<Card>>,
) {
    let (mut sink, mut source) = ws.split();
    while let Some(Ok(msg)) = source.next().await {
        let Message::Text(text) = msg else { continue };
        let Ok(BoardRequest::Query { name: query, request_id, data }) = serde_json::from_str::<BoardRequest>(&text) else {
            continue;
        };
        let response = match query.as_str() {
            "getBoardInfo" => json!({"boardId": board_id, "name": name}),
            "cards" => serde_json::to_value(&*cards.lock().unwrap()).unwrap(),
            "attachCard" => {
                let mut cards = cards.lock().unwrap();
                let mut placed = data[0].clone();
                placed["miroLink"] = json!(format!("https://miro.test/{board_id}/{}", cards.len() + 1));
                let card: Card = serde_json::from_value(placed.clone()).unwrap();
                cards.push(card);
                placed
            }
            _ => Value::Null,
        };
        let reply = serde_json::to_string(&BoardMessage::QueryResult { request_id, response }).unwrap();
        if sink.send(Message::Text(reply.into())).await.is_err() {
            break;
        }
    }
}

fn card(title: &str, link: Option<&str>) -> Card {
    Card::Symbol(SymbolCard {
        board_id: "b1".into(),
        title: title.into(),
        path: format!("src/{title}.rs"),
        symbol: title.into(),
        miro_link: link.map(str::to_owned),
        code_link: None,
        status: CardStatus::Connected,
    })
}

// =============================================================================
// HELPERS
// =============================================================================

fn no_self_connect() -> FeatureFlags {
    FeatureFlags { enable_workspace_websockets: false, ..all_flags() }
}

async fn wait_for_mode(supervisor: &Supervisor, predicate: impl Fn(&Mode) -> bool) {
    let mut modes = supervisor.watch_mode();
    timeout(Duration::from_secs(5), modes.wait_for(|m| predicate(m)))
        .await
        .unwrap_or_else(|_| panic!("mode never reached, last {:?}", supervisor.mode()))
        .unwrap();
}

async fn wait_until(what: &str, mut check: impl FnMut() -> bool) {
    timeout(Duration::from_secs(5), async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for {what}"));
}

async fn next_update(events: &mut tokio::sync::broadcast::Receiver<BoardEvent>) -> (Option<String>, Option<Card>) {
    timeout(Duration::from_secs(2), async {
        loop {
            if let BoardEvent::UpdateCard { miro_link, card } = events.recv().await.unwrap() {
                return (miro_link, card);
            }
        }
    })
    .await
    .expect("no updateCard event")
}

// =============================================================================
// SCENARIOS
// =============================================================================

#[tokio::test]
async fn attach_card_from_follower_reaches_leader_store_and_followers() {
    let port = free_port();

    let a = Supervisor::start(test_config(port, no_self_connect()), TOKEN);
    wait_for_mode(&a, |m| *m == Mode::Server).await;
    let leader_state = a.server_state().await.unwrap();
    let mut a_events = a.subscribe();

    let observed = Arc::new(Mutex::new(Vec::<StoreEvent>::new()));
    leader_state.store().subscribe({
        let observed = observed.clone();
        move |event| observed.lock().unwrap().push(event.clone())
    });

    let _board = FakeBoard::spawn(port, "b1", "Architecture", vec![card("alpha", Some("l1")), card("beta", Some("l2"))]);
    wait_until("board sync", || {
        leader_state.store().get_board("b1").is_some_and(|b| b.cards.len() == 2)
            && leader_state.store().get_connected_boards() == vec!["b1".to_owned()]
    })
    .await;

    let c = Supervisor::start(test_config(port, no_self_connect()), TOKEN);
    wait_for_mode(&c, |m| matches!(m, Mode::Client { .. })).await;
    let mut c_events = c.subscribe();
    wait_until("follower registration", || {
        leader_state.clients.try_read().is_ok_and(|clients| clients.len() == 1)
    })
    .await;

    let placed = c.query("b1", Query::AttachCard(card("gamma", None))).await.unwrap();
    let link = placed["miroLink"].as_str().unwrap().to_owned();

    assert_eq!(leader_state.store().get_board("b1").unwrap().cards.len(), 3);
    assert!(leader_state.store().get_card_by_link(&link).is_some());
    assert!(observed.lock().unwrap().iter().any(|event| matches!(
        event,
        StoreEvent::CardUpdate { card_id, card: Some(_), .. } if *card_id == link
    )));

    let (c_link, c_card) = next_update(&mut c_events).await;
    assert_eq!(c_link.as_deref(), Some(link.as_str()));
    assert_eq!(c_card.unwrap().title(), "gamma");

    let (a_link, _) = next_update(&mut a_events).await;
    assert_eq!(a_link.as_deref(), Some(link.as_str()));

    c.shutdown().await;
    a.shutdown().await;
}

#[tokio::test]
async fn follower_takes_over_and_board_reconnects() {
    let port = free_port();

    let a = Supervisor::start(test_config(port, no_self_connect()), TOKEN);
    wait_for_mode(&a, |m| *m == Mode::Server).await;
    let board = FakeBoard::spawn(port, "b1", "Architecture", vec![card("alpha", Some("l1")), card("beta", Some("l2"))]);
    let a_state = a.server_state().await.unwrap();
    wait_until("board on A", || !a_state.store().get_connected_boards().is_empty()).await;

    let c = Supervisor::start(test_config(port, no_self_connect()), TOKEN);
    wait_for_mode(&c, |m| matches!(m, Mode::Client { .. })).await;

    a.shutdown().await;

    wait_for_mode(&c, |m| *m == Mode::Server).await;
    let c_state = c.server_state().await.unwrap();
    wait_until("board on C", || {
        c_state.store().get_connected_boards() == vec!["b1".to_owned()]
            && c_state.store().get_board("b1").is_some_and(|b| b.cards.len() == 2)
    })
    .await;
    assert!(board.connections() >= 2);

    let cards = c.query("b1", Query::Cards).await.unwrap();
    assert_eq!(cards.as_array().map(Vec::len), Some(2));

    c.shutdown().await;
}
