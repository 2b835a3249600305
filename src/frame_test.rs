use super::*;
use crate::card::{CardStatus, SymbolCard};
use serde_json::json;

fn sample_card() -> Card {
    Card::Symbol(SymbolCard {
        board_id: "b1".into(),
        title: "main".into(),
        path: "src/main.rs".into(),
        symbol: "main".into(),
        miro_link: Some("link".into()),
        code_link: None,
        status: CardStatus::Connected,
    })
}

#[test]
fn board_query_wire_shape() {
    let req = BoardRequest::Query { name: "cards".into(), request_id: "r1".into(), data: vec![] };
    assert_eq!(
        serde_json::to_value(&req).unwrap(),
        json!({"type": "query", "name": "cards", "requestId": "r1", "data": []})
    );
}

#[test]
fn board_messages_parse() {
    let result: BoardMessage =
        serde_json::from_value(json!({"type": "queryResult", "requestId": "r1", "response": [1, 2]})).unwrap();
    assert_eq!(result, BoardMessage::QueryResult { request_id: "r1".into(), response: json!([1, 2]) });

    let missing_response: BoardMessage =
        serde_json::from_value(json!({"type": "queryResult", "requestId": "r2"})).unwrap();
    assert_eq!(missing_response, BoardMessage::QueryResult { request_id: "r2".into(), response: Value::Null });

    let removed: BoardMessage = serde_json::from_value(json!({"type": "card", "url": "link", "card": null})).unwrap();
    assert_eq!(removed, BoardMessage::Card { url: "link".into(), card: None });
}

#[test]
fn client_query_defaults_missing_data() {
    let req: ClientRequest =
        serde_json::from_value(json!({"type": "query", "boardId": "b1", "name": "tags", "requestId": "r"})).unwrap();
    let ClientRequest::Query { board_id, data, .. } = req;
    assert_eq!(board_id, "b1");
    assert!(data.is_empty());
}

#[test]
fn events_use_camel_case_fields() {
    let event = BoardEvent::UpdateCard { miro_link: Some("link".into()), card: Some(sample_card()) };
    let value = serde_json::to_value(ClientMessage::Event { event }).unwrap();
    assert_eq!(value["type"], "event");
    assert_eq!(value["event"]["type"], "updateCard");
    assert_eq!(value["event"]["miroLink"], "link");
    assert_eq!(value["event"]["card"]["boardId"], "b1");

    let connect = BoardEvent::Connect { board_info: BoardInfo { id: "b1".into(), name: "n".into() } };
    assert_eq!(serde_json::to_value(connect).unwrap(), json!({"type": "connect", "boardInfo": {"id": "b1", "name": "n"}}));

    assert_eq!(serde_json::to_value(BoardEvent::Disconnect {}).unwrap(), json!({"type": "disconnect"}));
}

#[test]
fn reply_distinguishes_null_value_from_failure() {
    #[derive(Debug, thiserror::Error)]
    #[error("no connection to board b9")]
    struct Offline;

    impl ErrorCode for Offline {
        fn error_code(&self) -> &'static str {
            "E_NOT_CONNECTED"
        }
    }

    let null_ok = Reply::success(Value::Null);
    assert_eq!(serde_json::to_value(&null_ok).unwrap(), json!({"ok": true, "value": null}));
    assert_eq!(null_ok.into_result(), Ok(Value::Null));

    let failed = Reply::failure(&Offline);
    assert_eq!(
        serde_json::to_value(&failed).unwrap(),
        json!({"ok": false, "reason": "no connection to board b9", "code": "E_NOT_CONNECTED"})
    );
    assert_eq!(
        failed.into_result(),
        Err(("E_NOT_CONNECTED".to_owned(), "no connection to board b9".to_owned()))
    );
}

#[test]
fn request_ids_are_unique() {
    assert_ne!(new_request_id(), new_request_id());
}
