//! End-to-end scenarios against a mock server, mirroring spec.md §8's
//! concrete scenarios 1-6.

mod support;

use serde_json::json;

use reethink_core::client;
use reethink_core::RunResult;

#[tokio::test]
async fn atom_response_resolves_to_a_single_value() {
    let (listener, config) = support::mock_server().await;

    let server = tokio::spawn(async move {
        let mut stream = support::accept_and_handshake(&listener).await;
        let (token, request) = support::read_request(&mut stream).await;
        assert_eq!(request, json!([1, [1, ["foo"]], {}]));
        support::write_response(&mut stream, token, 1, json!(["foo"]), None).await;
    });

    let client = client::connect(config).await.unwrap();
    let result = client.run(json!([[1, ["foo"]], {}])).await.unwrap();

    match result {
        RunResult::Atom(value) => assert_eq!(value, json!("foo")),
        other => panic!("expected an atom, got {other:?}"),
    }

    server.await.unwrap();
}

#[tokio::test]
async fn full_sequence_response_resolves_to_a_complete_vec() {
    let (listener, config) = support::mock_server().await;

    let server = tokio::spawn(async move {
        let mut stream = support::accept_and_handshake(&listener).await;
        let (token, _request) = support::read_request(&mut stream).await;
        support::write_response(&mut stream, token, 2, json!([1, 2, 3]), None).await;
    });

    let client = client::connect(config).await.unwrap();
    let result = client.run(json!([[15, [[14, ["test"]], "people"]]])).await.unwrap();

    match result {
        RunResult::Sequence(values) => assert_eq!(values, vec![json!(1), json!(2), json!(3)]),
        other => panic!("expected a sequence, got {other:?}"),
    }

    server.await.unwrap();
}

#[tokio::test]
async fn paged_cursor_concatenates_batches_in_order_and_sends_no_stop() {
    let (listener, config) = support::mock_server().await;

    let server = tokio::spawn(async move {
        let mut stream = support::accept_and_handshake(&listener).await;

        let (token, _request) = support::read_request(&mut stream).await;
        support::write_response(&mut stream, token, 3, json!([1, 2]), None).await;

        let (token, continue_req) = support::read_request(&mut stream).await;
        assert_eq!(continue_req, json!([2]));
        support::write_response(&mut stream, token, 3, json!([3, 4]), None).await;

        let (token, continue_req) = support::read_request(&mut stream).await;
        assert_eq!(continue_req, json!([2]));
        support::write_response(&mut stream, token, 2, json!([5]), None).await;

        // The cursor must not emit a STOP after naturally exhausting.
        let extra = tokio::time::timeout(std::time::Duration::from_millis(200), {
            let mut buf = [0u8; 1];
            async move {
                use tokio::io::AsyncReadExt;
                stream.read(&mut buf).await
            }
        })
        .await;
        assert!(extra.is_err(), "unexpected extra bytes after exhaustion");
    });

    let client = client::connect(config).await.unwrap();
    let result = client.run(json!([[15, [[14, ["test"]], "people"]]])).await.unwrap();

    let mut cursor = match result {
        RunResult::Cursor(cursor) => cursor,
        other => panic!("expected a cursor, got {other:?}"),
    };

    let mut collected = Vec::new();
    while let Some(value) = cursor.next().await.unwrap() {
        collected.push(value);
    }

    assert_eq!(
        collected,
        vec![json!(1), json!(2), json!(3), json!(4), json!(5)]
    );

    server.await.unwrap();
}

#[tokio::test]
async fn closing_a_cursor_early_sends_exactly_one_stop() {
    let (listener, config) = support::mock_server().await;

    let server = tokio::spawn(async move {
        let mut stream = support::accept_and_handshake(&listener).await;

        let (token, _request) = support::read_request(&mut stream).await;
        support::write_response(&mut stream, token, 3, json!([1, 2]), None).await;

        let (stop_token, stop_req) = support::read_request(&mut stream).await;
        assert_eq!(stop_token, token);
        assert_eq!(stop_req, json!([3]));
    });

    let client = client::connect(config).await.unwrap();
    let result = client.run(json!([[15, [[14, ["test"]], "people"]]])).await.unwrap();

    let mut cursor = match result {
        RunResult::Cursor(cursor) => cursor,
        other => panic!("expected a cursor, got {other:?}"),
    };

    assert_eq!(cursor.next().await.unwrap(), Some(json!(1)));
    cursor.close().await;
    assert_eq!(cursor.next().await.unwrap(), None);

    server.await.unwrap();
}

#[tokio::test]
async fn runtime_error_is_local_to_the_query_and_the_connection_stays_usable() {
    let (listener, config) = support::mock_server().await;

    let server = tokio::spawn(async move {
        let mut stream = support::accept_and_handshake(&listener).await;

        let (token, _request) = support::read_request(&mut stream).await;
        support::write_response(
            &mut stream,
            token,
            18,
            json!(["No such table"]),
            Some(json!([0])),
        )
        .await;

        let (token, _request) = support::read_request(&mut stream).await;
        support::write_response(&mut stream, token, 1, json!(["bar"]), None).await;
    });

    let client = client::connect(config).await.unwrap();

    let err = client
        .run(json!([[15, [[14, ["test"]], "missing"]]]))
        .await
        .unwrap_err();

    match err {
        reethink_core::Error::Server { message, .. } => assert_eq!(message, "No such table"),
        other => panic!("expected a server error, got {other:?}"),
    }

    let result = client.run(json!([[1, ["bar"]], {}])).await.unwrap();
    match result {
        RunResult::Atom(value) => assert_eq!(value, json!("bar")),
        other => panic!("expected an atom, got {other:?}"),
    }

    server.await.unwrap();
}

#[tokio::test]
async fn connection_closing_mid_cursor_fails_the_next_read() {
    let (listener, config) = support::mock_server().await;

    let server = tokio::spawn(async move {
        let mut stream = support::accept_and_handshake(&listener).await;
        let (token, _request) = support::read_request(&mut stream).await;
        support::write_response(&mut stream, token, 3, json!([1]), None).await;
        // Drop the stream: the socket half-closes from the server side.
    });

    let client = client::connect(config).await.unwrap();
    let result = client.run(json!([[15, [[14, ["test"]], "people"]]])).await.unwrap();

    let mut cursor = match result {
        RunResult::Cursor(cursor) => cursor,
        other => panic!("expected a cursor, got {other:?}"),
    };

    assert_eq!(cursor.next().await.unwrap(), Some(json!(1)));

    server.await.unwrap();

    let err = cursor.next().await.unwrap_err();
    assert!(matches!(err, reethink_core::Error::ConnectionClosed));
}

#[tokio::test]
async fn default_db_is_appended_to_a_two_element_ast() {
    let (listener, config) = support::mock_server().await;
    let config = config.default_db("marvel");

    let server = tokio::spawn(async move {
        let mut stream = support::accept_and_handshake(&listener).await;
        let (token, request) = support::read_request(&mut stream).await;
        assert_eq!(
            request,
            json!([1, [1, ["foo"]], {}, { "db": [14, ["marvel"]] }])
        );
        support::write_response(&mut stream, token, 1, json!(["foo"]), None).await;
    });

    let client = client::connect(config).await.unwrap();
    client.run(json!([[1, ["foo"]], {}])).await.unwrap();

    server.await.unwrap();
}

#[tokio::test]
async fn default_db_is_not_appended_to_a_three_element_ast() {
    let (listener, config) = support::mock_server().await;
    let config = config.default_db("marvel");

    let server = tokio::spawn(async move {
        let mut stream = support::accept_and_handshake(&listener).await;
        let (token, request) = support::read_request(&mut stream).await;
        // Length-3 START queries (the caller already supplied global
        // options plus a `db` of their own choosing) pass through
        // unchanged even with `default_db` configured (spec.md §8).
        assert_eq!(
            request,
            json!([1, [1, ["foo"]], {}, { "db": [14, ["avengers"]] }])
        );
        support::write_response(&mut stream, token, 1, json!(["foo"]), None).await;
    });

    let client = client::connect(config).await.unwrap();
    client
        .run(json!([
            [1, ["foo"]],
            {},
            { "db": [14, ["avengers"]] }
        ]))
        .await
        .unwrap();

    server.await.unwrap();
}

#[tokio::test]
async fn handshake_failure_surfaces_the_banner() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let config = reethink_core::Config::new("127.0.0.1").port(port);

    let server = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        use tokio::io::{AsyncReadExt, AsyncWriteExt};
        let _version = stream.read_u32_le().await.unwrap();
        let auth_len = stream.read_u32_le().await.unwrap();
        let mut auth = vec![0u8; auth_len as usize];
        stream.read_exact(&mut auth).await.unwrap();
        let _protocol = stream.read_u32_le().await.unwrap();
        stream.write_all(b"ERROR: bad auth key\0").await.unwrap();
        stream.flush().await.unwrap();
    });

    let err = client::connect(config).await.unwrap_err();
    match err {
        reethink_core::Error::Handshake { banner, .. } => {
            assert_eq!(banner, "ERROR: bad auth key");
        }
        other => panic!("expected a handshake error, got {other:?}"),
    }

    server.await.unwrap();
}
