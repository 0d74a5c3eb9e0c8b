//! Sessions against a loopback language server over real sockets.

use std::net::TcpListener as StdListener;
use std::time::Duration;

use gosandbox_lsp::{LspConfig, LspError, Session, SessionEvent, SessionState, Transport, TransportEvent};
use gosandbox_types::{DiagnosticSeverity, EditorOffset};
use serde_json::json;
use tokio::sync::mpsc;

use crate::common::{DOC, DOC_URI, FakeServer, ServerConn, config_for};

async fn ready_session(
    server: &mut FakeServer,
) -> (Session, mpsc::UnboundedReceiver<SessionEvent>, ServerConn) {
    let (session, events) = Session::connect(server.config(), DOC).unwrap();
    let mut conn = server.accept().await;
    conn.serve_handshake().await;
    session.wait_ready().await.unwrap();
    (session, events, conn)
}

async fn next_diagnostics(
    events: &mut mpsc::UnboundedReceiver<SessionEvent>,
) -> Vec<gosandbox_types::Diagnostic> {
    let wait = async {
        loop {
            if let SessionEvent::Diagnostics(items) = events.recv().await.expect("events closed") {
                return items;
            }
        }
    };
    tokio::time::timeout(Duration::from_secs(5), wait)
        .await
        .expect("no diagnostics pushed")
}

#[tokio::test]
async fn pushed_diagnostics_arrive_in_editor_coordinates() {
    let mut server = FakeServer::websocket().await;
    let (session, mut events, mut conn) = ready_session(&mut server).await;

    conn.publish_diagnostics(
        DOC_URI,
        json!([{
            "range": {"start": {"line": 0, "character": 0}, "end": {"line": 0, "character": 7}},
            "severity": 1,
            "source": "compiler",
            "message": "syntax error"
        }]),
    )
    .await;

    let items = next_diagnostics(&mut events).await;
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].from(), EditorOffset::new(0));
    assert_eq!(items[0].to(), EditorOffset::new(7));
    assert_eq!(items[0].severity(), Some(DiagnosticSeverity::Error));
    assert_eq!(items[0].message(), "syntax error");
    assert_eq!(session.diagnostics().status_string(), "E:1 W:0");
}

#[tokio::test]
async fn each_push_replaces_the_previous_set() {
    let mut server = FakeServer::websocket().await;
    let (session, mut events, mut conn) = ready_session(&mut server).await;
    let at = |line: u32| json!({"start": {"line": line, "character": 0}, "end": {"line": line, "character": 4}});

    conn.publish_diagnostics(
        DOC_URI,
        json!([
            {"range": at(0), "severity": 2, "message": "first"},
            {"range": at(2), "severity": 1, "message": "second"}
        ]),
    )
    .await;
    assert_eq!(next_diagnostics(&mut events).await.len(), 2);

    conn.publish_diagnostics(DOC_URI, json!([{"range": at(3), "severity": 2, "message": "third"}]))
        .await;
    let items = next_diagnostics(&mut events).await;
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].message(), "third");

    conn.publish_diagnostics(DOC_URI, json!([])).await;
    assert!(next_diagnostics(&mut events).await.is_empty());
    assert!(session.diagnostics().is_empty());
}

#[tokio::test]
async fn request_ids_increase_across_queries() {
    let mut server = FakeServer::websocket().await;
    let (session, _events, mut conn) = ready_session(&mut server).await;
    let offset = EditorOffset::new(30);

    let server_side = async {
        let mut ids = Vec::new();
        for _ in 0..3 {
            let request = conn.recv().await;
            ids.push(request["id"].as_u64().unwrap());
            conn.reply(&request, json!(null)).await;
        }
        ids
    };
    let client_side = async {
        assert_eq!(session.hover(offset).await.unwrap(), None);
        assert!(session.definition(offset).await.unwrap().is_empty());
        assert!(session.references(offset).await.unwrap().is_empty());
    };

    let (ids, ()) = tokio::join!(server_side, client_side);
    // The handshake's initialize took id 1.
    assert_eq!(ids, vec![2, 3, 4]);
}

#[tokio::test]
async fn hover_and_completion_decode_server_shapes() {
    let mut server = FakeServer::websocket().await;
    let (session, _events, mut conn) = ready_session(&mut server).await;

    let server_side = async {
        let hover = conn.expect_method("textDocument/hover").await;
        assert_eq!(hover["params"]["position"], json!({"line": 3, "character": 2}));
        conn.reply(
            &hover,
            json!({"contents": {"kind": "markdown", "value": "func println(args ...Type)"}}),
        )
        .await;

        let completion = conn.expect_method("textDocument/completion").await;
        conn.reply(
            &completion,
            json!({"isIncomplete": false, "items": [
                {"label": "Println", "kind": 3, "detail": "func(a ...any)"},
                {"label": "Sprintf", "kind": 3}
            ]}),
        )
        .await;
    };
    let client_side = async {
        let hover = session.hover(EditorOffset::new(30)).await.unwrap().unwrap();
        let items = session.completion(EditorOffset::new(30)).await.unwrap();
        (hover, items)
    };

    let ((), (hover, items)) = tokio::join!(server_side, client_side);
    assert_eq!(hover.text(), "func println(args ...Type)");
    assert_eq!(items.len(), 2);
    assert_eq!(items[0].kind_label(), "Function");
    assert_eq!(items[1].text_to_insert(), "Sprintf");
}

#[tokio::test]
async fn error_envelope_resolves_empty_and_reports_once() {
    let mut server = FakeServer::websocket().await;
    let (session, mut events, mut conn) = ready_session(&mut server).await;

    let server_side = async {
        let request = conn.expect_method("textDocument/definition").await;
        conn.reply_error(&request, -32603, "internal failure").await;
    };
    let (locations, ()) = tokio::join!(session.definition(EditorOffset::new(30)), server_side);
    assert!(locations.unwrap().is_empty());

    let error = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if let Some(SessionEvent::Error(message)) = events.recv().await {
                return message;
            }
        }
    })
    .await
    .unwrap();
    assert!(error.contains("internal failure"));
}

#[tokio::test]
async fn error_reply_without_code_settles_the_request() {
    let mut server = FakeServer::websocket().await;
    let config = LspConfig {
        request_timeout_ms: 60_000,
        ..server.config()
    };
    let (session, mut events) = Session::connect(config, DOC).unwrap();
    let mut conn = server.accept().await;
    conn.serve_handshake().await;
    session.wait_ready().await.unwrap();

    let server_side = async {
        let request = conn.expect_method("textDocument/hover").await;
        conn.send(json!({"jsonrpc": "2.0", "id": request["id"], "error": {"message": "boom"}}))
            .await;
    };
    // Settled by the reply, well before the request timeout.
    let (hover, ()) = tokio::time::timeout(
        Duration::from_secs(5),
        async { tokio::join!(session.hover(EditorOffset::new(30)), server_side) },
    )
    .await
    .expect("error reply did not settle the request");
    assert_eq!(hover.unwrap(), None);

    let error = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if let Some(SessionEvent::Error(message)) = events.recv().await {
                return message;
            }
        }
    })
    .await
    .unwrap();
    assert_eq!(error, "boom");
}

#[tokio::test]
async fn close_rejects_outstanding_requests() {
    let mut server = FakeServer::websocket().await;
    let (session, _events, mut conn) = ready_session(&mut server).await;

    let server_side = async {
        // Never answered.
        conn.expect_method("textDocument/hover").await;
        session.close();
    };
    let (result, ()) = tokio::join!(session.hover(EditorOffset::new(30)), server_side);

    let err = result.unwrap_err();
    assert!(matches!(err.root(), LspError::ConnectionClosed), "{err}");
    assert!(err.to_string().starts_with("error getting hover info from language server"));
}

#[tokio::test]
async fn server_hangup_ends_the_session() {
    let mut server = FakeServer::websocket().await;
    let (session, _events, conn) = ready_session(&mut server).await;
    let mut state = session.subscribe_state();

    conn.close().await;

    tokio::time::timeout(Duration::from_secs(5), state.wait_for(SessionState::is_terminal))
        .await
        .unwrap()
        .unwrap();
    // Closed, or Errored if the close reply raced the socket teardown.
    assert!(session.state().is_terminal());
    assert!(!session.keep_alive());
}

#[tokio::test]
async fn unreachable_server_errors_the_session() {
    // Grab a free port, then release it so nothing is listening.
    let port = StdListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap().port();
    let (session, _events) = Session::connect(config_for(&format!("ws://127.0.0.1:{port}")), DOC).unwrap();

    let err = session.wait_ready().await.unwrap_err();
    assert!(matches!(err, LspError::InvalidState { .. }), "{err}");
    assert!(matches!(session.state(), SessionState::Errored(_)));
}

#[tokio::test]
async fn reconnect_replays_the_handshake_with_synced_text() {
    let mut server = FakeServer::websocket().await;
    let (mut session, _events, mut conn) = ready_session(&mut server).await;

    session.did_change(2, "package main\n");
    let change = conn.expect_method("textDocument/didChange").await;
    assert_eq!(change["params"]["textDocument"]["version"], 2);

    assert!(session.reconnect().is_err(), "reconnect while ready must fail");
    session.close();
    let mut state = session.subscribe_state();
    tokio::time::timeout(Duration::from_secs(5), state.wait_for(SessionState::is_terminal))
        .await
        .unwrap()
        .unwrap();

    session.reconnect().unwrap();
    let mut conn = server.accept().await;
    let did_open = conn.serve_handshake().await;
    assert_eq!(did_open["textDocument"]["text"], "package main\n");
    assert_eq!(did_open["textDocument"]["version"], 1);
    session.wait_ready().await.unwrap();
}

#[tokio::test]
async fn framed_tcp_session_answers_symbols() {
    let mut server = FakeServer::tcp().await;
    let (session, _events, mut conn) = ready_session(&mut server).await;

    let server_side = async {
        let request = conn.expect_method("textDocument/documentSymbol").await;
        assert_eq!(request["params"]["textDocument"]["uri"], DOC_URI);
        conn.reply(
            &request,
            json!([{
                "name": "main",
                "kind": 12,
                "range": {"start": {"line": 2, "character": 0}, "end": {"line": 4, "character": 1}},
                "selectionRange": {"start": {"line": 2, "character": 5}, "end": {"line": 2, "character": 9}}
            }]),
        )
        .await;
    };
    let (symbols, ()) = tokio::join!(session.document_symbols(), server_side);

    let symbols = symbols.unwrap();
    assert_eq!(symbols.len(), 1);
    assert_eq!(symbols[0].name, "main");
    assert_eq!(symbols[0].symbol_kind().map(|k| k.label()), Some("Function"));
}

#[tokio::test]
async fn transport_flushes_queued_messages_in_order() {
    let mut server = FakeServer::websocket().await;
    let (transport, mut events) = Transport::connect(&server.url);

    // Queued before the connection is accepted.
    transport.send(json!({"seq": 1}).to_string());
    transport.send(json!({"seq": 2}).to_string());

    let mut conn = server.accept().await;
    assert_eq!(conn.recv().await["seq"], 1);
    assert_eq!(conn.recv().await["seq"], 2);
    assert!(matches!(events.recv().await, Some(TransportEvent::Open)));
    assert!(transport.is_open());

    conn.send(json!({"jsonrpc": "2.0", "method": "window/logMessage", "params": {}}))
        .await;
    match events.recv().await {
        Some(TransportEvent::Message(text)) => assert!(text.contains("window/logMessage")),
        other => panic!("expected a message, got {other:?}"),
    }
}
