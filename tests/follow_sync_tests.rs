//! Follow sync and publishing against a live local HTTP server.

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use chrono::{Duration, Utc};
use reqwest::Url;
use spring83::board::{parse_http_date, time_element};
use spring83::follow::{sync_follows, FetchOutcome, Follow, FollowClient};
use spring83::{Board, Creator, SpringError, Store, HEADER_SIGNATURE};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tokio::net::TcpListener;

/// A minimal board server with switchable misbehaviour.
#[derive(Default)]
struct MockServer {
    boards: Mutex<HashMap<String, Board>>,
    ignore_if_modified_since: bool,
    fail_with: Option<StatusCode>,
    puts: Mutex<Vec<(String, Option<String>, Vec<u8>)>>,
}

impl MockServer {
    fn with_board(self, board: &Board) -> Self {
        self.boards
            .lock()
            .unwrap()
            .insert(board.key(), board.clone());
        self
    }
}

async fn mock_get(
    State(mock): State<Arc<MockServer>>,
    Path(key): Path<String>,
    headers: HeaderMap,
) -> Response {
    if let Some(status) = mock.fail_with {
        return status.into_response();
    }
    let Some(board) = mock.boards.lock().unwrap().get(&key.to_lowercase()).cloned() else {
        return StatusCode::NOT_FOUND.into_response();
    };

    if !mock.ignore_if_modified_since {
        let since = headers
            .get(header::IF_MODIFIED_SINCE)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_http_date);
        if matches!(since, Some(since) if !board.is_after_time(since)) {
            return StatusCode::NOT_MODIFIED.into_response();
        }
    }

    (
        StatusCode::OK,
        [(HEADER_SIGNATURE, board.signature().to_hex())],
        board.content().to_vec(),
    )
        .into_response()
}

async fn mock_put(
    State(mock): State<Arc<MockServer>>,
    Path(key): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    if let Some(status) = mock.fail_with {
        return status;
    }
    let signature = headers
        .get(HEADER_SIGNATURE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    mock.puts.lock().unwrap().push((key, signature, body.to_vec()));
    StatusCode::NO_CONTENT
}

async fn spawn(mock: MockServer) -> (Url, Arc<MockServer>) {
    let mock = Arc::new(mock);
    let app = Router::new()
        .route("/:key", get(mock_get).put(mock_put))
        .with_state(mock.clone());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (Url::parse(&format!("http://{addr}/")).unwrap(), mock)
}

fn board_at(creator: &Creator, hours_ago: i64, body: &str) -> Board {
    let t = Utc::now() - Duration::hours(hours_ago);
    creator
        .publish(format!("{}{}", time_element(t), body).into_bytes())
        .unwrap()
}

#[tokio::test]
async fn test_fetch_is_conditional() {
    let creator = Creator::generate().unwrap();
    let board = board_at(&creator, 1, "<p>hello</p>");
    let (server, _) = spawn(MockServer::default().with_board(&board)).await;
    let follow = Follow::on_server(&server, &board.key(), None).unwrap();
    let client = FollowClient::new().unwrap();

    match client.fetch(&follow, None).await.unwrap() {
        FetchOutcome::Fetched(fetched) => assert_eq!(fetched, board),
        FetchOutcome::NotModified => panic!("expected a board"),
    }
    assert!(matches!(
        client.fetch(&follow, Some(board.timestamp())).await.unwrap(),
        FetchOutcome::NotModified
    ));
}

#[tokio::test]
async fn test_fetch_rejects_unsigned_response() {
    let creator = Creator::generate().unwrap();
    let board = board_at(&creator, 1, "<p>hello</p>");
    let (server, _) = spawn(MockServer::default().with_board(&board)).await;

    // the server holds the board under a key that did not sign it
    let impostor = Creator::generate().unwrap();
    let mut boards = HashMap::new();
    boards.insert(impostor.publisher().to_hex(), board.clone());
    let (impostor_server, _) = spawn(MockServer {
        boards: Mutex::new(boards),
        ..Default::default()
    })
    .await;

    let client = FollowClient::new().unwrap();
    let follow = Follow::on_server(&impostor_server, &impostor.publisher().to_hex(), None).unwrap();
    let err = client.fetch(&follow, None).await.unwrap_err();
    assert!(err.board_error().is_some());

    let missing = Follow::on_server(&server, &impostor.publisher().to_hex(), None).unwrap();
    assert!(matches!(
        client.fetch(&missing, None).await,
        Err(SpringError::Status(404))
    ));
}

#[tokio::test]
async fn test_sync_marks_new_then_unchanged() {
    let alice = Creator::generate().unwrap();
    let bob = Creator::generate().unwrap();
    let alice_board = board_at(&alice, 2, "<p>alice</p>");
    let bob_board = board_at(&bob, 1, "<p>bob</p>");
    let (server, mock) = spawn(
        MockServer::default()
            .with_board(&alice_board)
            .with_board(&bob_board),
    )
    .await;

    let follows = vec![
        Follow::on_server(&server, &alice_board.key(), Some("alice".into())).unwrap(),
        Follow::on_server(&server, &bob_board.key(), None).unwrap(),
    ];
    let dir = TempDir::new().unwrap();
    let local = Store::open(dir.path()).unwrap();
    let client = FollowClient::new().unwrap();

    let report = sync_follows(&client, &follows, &local).await;
    assert_eq!(report.total, 2);
    assert_eq!(report.failed, 0);
    assert_eq!(report.new_count(), 2);
    assert_eq!(report.boards[0].handle.as_deref(), Some("alice"));
    assert_eq!(report.boards[1].board, bob_board);
    assert_eq!(local.count(), 2);

    let report = sync_follows(&client, &follows, &local).await;
    assert_eq!(report.new_count(), 0);
    assert_eq!(report.boards.len(), 2);

    // alice publishes again
    let fresh = board_at(&alice, 0, "<p>alice again</p>");
    mock.boards
        .lock()
        .unwrap()
        .insert(fresh.key(), fresh.clone());

    let report = sync_follows(&client, &follows, &local).await;
    let new: Vec<_> = report.new_boards().collect();
    assert_eq!(new.len(), 1);
    assert_eq!(new[0].board, fresh);
    assert_eq!(local.get(&fresh.key()).unwrap(), fresh);
}

#[tokio::test]
async fn test_sync_with_server_ignoring_if_modified_since() {
    let creator = Creator::generate().unwrap();
    let board = board_at(&creator, 1, "<p>same old</p>");
    let (server, _) = spawn(MockServer {
        ignore_if_modified_since: true,
        ..Default::default()
    }
    .with_board(&board))
    .await;

    let follows = vec![Follow::on_server(&server, &board.key(), None).unwrap()];
    let dir = TempDir::new().unwrap();
    let local = Store::open(dir.path()).unwrap();
    local.add(&board).unwrap();

    let report = sync_follows(&FollowClient::new().unwrap(), &follows, &local).await;
    assert_eq!(report.failed, 0);
    assert_eq!(report.new_count(), 0);
    assert_eq!(report.boards.len(), 1);
}

#[tokio::test]
async fn test_sync_partial_and_total_failure() {
    let creator = Creator::generate().unwrap();
    let board = board_at(&creator, 1, "<p>up</p>");
    let (up, _) = spawn(MockServer::default().with_board(&board)).await;
    let (down, _) = spawn(MockServer {
        fail_with: Some(StatusCode::INTERNAL_SERVER_ERROR),
        ..Default::default()
    })
    .await;

    let other = Creator::generate().unwrap();
    let dir = TempDir::new().unwrap();
    let local = Store::open(dir.path()).unwrap();
    // a local copy survives a failed fetch
    let cached = board_at(&other, 3, "<p>cached</p>");
    local.add(&cached).unwrap();

    let client = FollowClient::new().unwrap();
    let follows = vec![
        Follow::on_server(&up, &board.key(), None).unwrap(),
        Follow::on_server(&down, &cached.key(), None).unwrap(),
    ];
    let report = sync_follows(&client, &follows, &local).await;
    assert!(report.is_partial_failure());
    assert_eq!(report.boards.len(), 2);
    assert_eq!(report.boards[1].board, cached);
    assert!(report.into_result().is_ok());

    let report = sync_follows(&client, &follows[1..], &local).await;
    assert!(matches!(
        report.into_result(),
        Err(SpringError::FollowsFailed(1))
    ));
}

#[tokio::test]
async fn test_publish() {
    let creator = Creator::generate().unwrap();
    let board = board_at(&creator, 0, "<p>publish me</p>");
    let (server, mock) = spawn(MockServer::default()).await;

    FollowClient::new()
        .unwrap()
        .publish(&server, &board)
        .await
        .unwrap();

    let puts = mock.puts.lock().unwrap();
    assert_eq!(puts.len(), 1);
    let (key, signature, body) = &puts[0];
    assert_eq!(key, &board.key());
    assert_eq!(signature.as_deref(), Some(board.signature().to_hex().as_str()));
    assert_eq!(body.as_slice(), board.content());
}

#[tokio::test]
async fn test_publish_rejected() {
    let creator = Creator::generate().unwrap();
    let board = board_at(&creator, 0, "<p>stale</p>");
    let (server, _) = spawn(MockServer {
        fail_with: Some(StatusCode::CONFLICT),
        ..Default::default()
    })
    .await;

    assert!(matches!(
        FollowClient::new().unwrap().publish(&server, &board).await,
        Err(SpringError::Status(409))
    ));
}
