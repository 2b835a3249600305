use super::*;
use crate::card::{CardStatus, SymbolCard};
use crate::state::test_helpers::{self, fake_link, register_client};
use serde_json::json;
use tokio::time::timeout;

fn symbol(title: &str, link: Option<&str>) -> Card {
    Card::Symbol(SymbolCard {
        board_id: "b1".into(),
        title: title.into(),
        path: "src/lib.rs".into(),
        symbol: title.into(),
        miro_link: link.map(str::to_owned),
        code_link: None,
        status: CardStatus::Connected,
    })
}

fn board_answers(name: &'static str, cards: Vec<Card>) -> impl Fn(&str, &[Value]) -> Option<Value> + Send + 'static {
    move |query, _| match query {
        "getBoardInfo" => Some(json!({"boardId": "b1", "name": name})),
        "cards" => Some(serde_json::to_value(&cards).unwrap()),
        _ => Some(Value::Null),
    }
}

async fn recv_event(rx: &mut mpsc::Receiver<ClientMessage>) -> BoardEvent {
    let message = timeout(Duration::from_millis(500), rx.recv())
        .await
        .expect("event receive timed out")
        .expect("client channel closed unexpectedly");
    match message {
        ClientMessage::Event { event } => event,
        other => panic!("expected event, got {other:?}"),
    }
}

#[tokio::test]
async fn handshake_adds_board_syncs_cards_and_announces() {
    let state = test_helpers::test_app_state();
    let (_client_id, mut client_rx) = register_client(&state).await;
    let mut local = state.events.subscribe();
    let fake = fake_link(board_answers("Architecture", vec![symbol("a", Some("l1")), symbol("b", Some("l2"))]));

    let board_id = connect_board(&state, fake.link.clone()).await.unwrap();

    assert_eq!(board_id, "b1");
    assert_eq!(fake.names(), vec!["getBoardInfo", "cards"]);
    assert_eq!(state.store().get_board("b1").unwrap().cards.len(), 2);
    assert_eq!(state.store().get_connected_boards(), vec!["b1".to_owned()]);

    let expected = BoardEvent::Connect { board_info: BoardInfo { id: "b1".into(), name: "Architecture".into() } };
    assert_eq!(recv_event(&mut client_rx).await, expected);
    assert_eq!(local.recv().await.unwrap(), expected);
}

#[tokio::test]
async fn reconnect_with_new_name_renames_board() {
    let state = test_helpers::test_app_state();
    state.store().add_board("b1", "Old");

    let fake = fake_link(board_answers("New", vec![]));
    connect_board(&state, fake.link.clone()).await.unwrap();

    assert_eq!(state.store().get_board("b1").unwrap().name, "New");
}

#[tokio::test]
async fn newer_connection_supersedes_and_old_close_is_silent() {
    let state = test_helpers::test_app_state();
    let (_client_id, mut client_rx) = register_client(&state).await;

    let first = fake_link(board_answers("Board", vec![]));
    connect_board(&state, first.link.clone()).await.unwrap();
    let second = fake_link(board_answers("Board", vec![]));
    connect_board(&state, second.link.clone()).await.unwrap();
    let _ = recv_event(&mut client_rx).await;
    let _ = recv_event(&mut client_rx).await;

    part_board(&state, first.link.connection_id).await;
    assert_eq!(state.store().connection_for("b1"), Some(second.link.connection_id));
    assert!(timeout(Duration::from_millis(80), client_rx.recv()).await.is_err(), "expected no disconnect");

    part_board(&state, second.link.connection_id).await;
    assert!(state.store().get_connected_boards().is_empty());
    assert!(state.link_for("b1").await.is_none());
    assert_eq!(recv_event(&mut client_rx).await, BoardEvent::Disconnect {});
}

#[tokio::test]
async fn closed_link_is_never_registered() {
    let state = test_helpers::test_app_state();
    let (tx, rx) = mpsc::channel(4);
    let link = BoardLink::new(Uuid::new_v4(), tx);
    drop(rx);

    let err = connect_board(&state, link).await.unwrap_err();
    assert!(matches!(err, QueryError::ChannelClosed));
    assert!(state.store().get_connected_boards().is_empty());
}

#[tokio::test]
async fn malformed_board_info_is_rejected() {
    let state = test_helpers::test_app_state();
    let fake = fake_link(|_, _| Some(json!("not an object")));
    let err = connect_board(&state, fake.link.clone()).await.unwrap_err();
    assert!(matches!(err, QueryError::InvalidResponse { name: "getBoardInfo", .. }));
}

#[tokio::test]
async fn unanswered_query_times_out_and_drops_entry() {
    let fake = fake_link(|_, _| None);
    let err = fake.link.query(&Query::Tags, Duration::from_millis(50)).await.unwrap_err();
    assert!(matches!(err, QueryError::Timeout { name: "tags", .. }));
    assert!(fake.link.pending().is_empty());
}

#[tokio::test]
async fn results_correlate_by_request_id_not_order() {
    let (tx, mut rx) = mpsc::channel(8);
    let link = BoardLink::new(Uuid::new_v4(), tx);

    let first = tokio::spawn({
        let link = link.clone();
        async move { link.query(&Query::SelectCard("l1".into()), Duration::from_secs(1)).await }
    });
    let BoardRequest::Query { request_id: first_id, .. } = rx.recv().await.unwrap();
    let second = tokio::spawn({
        let link = link.clone();
        async move { link.query(&Query::SelectCard("l2".into()), Duration::from_secs(1)).await }
    });
    let BoardRequest::Query { request_id: second_id, .. } = rx.recv().await.unwrap();

    let state = test_helpers::test_app_state();
    handle_board_message(&state, &link, BoardMessage::QueryResult { request_id: second_id, response: json!("second") }).await;
    handle_board_message(&state, &link, BoardMessage::QueryResult { request_id: first_id, response: json!("first") }).await;
    handle_board_message(&state, &link, BoardMessage::QueryResult { request_id: "stale".into(), response: json!(1) }).await;

    assert_eq!(first.await.unwrap().unwrap(), json!("first"));
    assert_eq!(second.await.unwrap().unwrap(), json!("second"));
}

#[tokio::test]
async fn card_event_updates_store_and_broadcasts() {
    let state = test_helpers::test_app_state();
    let fake = test_helpers::seed_connected_board(&state, "b1", |_, _| None).await;
    let (_client_id, mut client_rx) = register_client(&state).await;

    let card = symbol("c", Some("l3"));
    handle_board_message(&state, &fake.link, BoardMessage::Card { url: "l3".into(), card: Some(card.clone()) }).await;
    assert_eq!(state.store().get_card_by_link("l3"), Some(&card));
    assert_eq!(
        recv_event(&mut client_rx).await,
        BoardEvent::UpdateCard { miro_link: Some("l3".into()), card: Some(card) }
    );

    handle_board_message(&state, &fake.link, BoardMessage::Card { url: "l3".into(), card: None }).await;
    assert!(state.store().get_card_by_link("l3").is_none());
    assert_eq!(recv_event(&mut client_rx).await, BoardEvent::UpdateCard { miro_link: Some("l3".into()), card: None });
}

#[tokio::test]
async fn navigate_event_is_forwarded() {
    let state = test_helpers::test_app_state();
    let fake = fake_link(|_, _| None);
    let (_client_id, mut client_rx) = register_client(&state).await;

    let card = symbol("n", Some("l4"));
    handle_board_message(&state, &fake.link, BoardMessage::NavigateTo { card: card.clone() }).await;
    assert_eq!(recv_event(&mut client_rx).await, BoardEvent::NavigateToCard { card });
}
