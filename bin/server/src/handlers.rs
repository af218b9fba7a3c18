//! Routes and request handlers.
//!
//! Every response carries the protocol version, an HTML content type and the
//! CORS headers. Board content is always written back byte for byte.

use crate::error::ApiError;
use crate::state::SharedState;
use crate::test_board;
use askama::Template;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::header::{self, HeaderMap, HeaderName, HeaderValue};
use axum::http::{Method, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use chrono::Utc;
use spring83::board::parse_http_date;
use spring83::{Board, Publisher, HEADER_SIGNATURE, HEADER_VERSION, SPRING_VERSION, TEST_PUBLIC};
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, instrument, warn};

const ALLOW_METHODS: &str = "GET, PUT, OPTIONS";
const ALLOW_HEADERS: &str = "Content-Type, If-Modified-Since, Spring-Signature, Spring-Version";
const EXPOSE_HEADERS: &str = "Content-Type, Last-Modified, Spring-Signature, Spring-Version";
const CONTENT_TYPE_HTML: &str = "text/html;charset=utf-8";

/// Builds the application router.
pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/", get(home).options(preflight))
        .route("/favicon.ico", get(favicon).options(preflight))
        .route("/:key", get(get_board).put(put_board).options(preflight))
        .fallback(fallback)
        .with_state(state)
        .layer(SetResponseHeaderLayer::overriding(
            HeaderName::from_static("spring-version"),
            HeaderValue::from_static(SPRING_VERSION),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::CONTENT_TYPE,
            HeaderValue::from_static(CONTENT_TYPE_HTML),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static(ALLOW_METHODS),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::ACCESS_CONTROL_ALLOW_ORIGIN,
            HeaderValue::from_static("*"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static(ALLOW_HEADERS),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::ACCESS_CONTROL_EXPOSE_HEADERS,
            HeaderValue::from_static(EXPOSE_HEADERS),
        ))
        .layer(TraceLayer::new_for_http())
}

/// CORS preflight
async fn preflight() -> StatusCode {
    StatusCode::NO_CONTENT
}

async fn favicon() -> StatusCode {
    StatusCode::NOT_FOUND
}

/// Anything that is neither `/` nor a single path segment.
async fn fallback(method: Method) -> Result<StatusCode, ApiError> {
    if method == Method::OPTIONS {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::bad_request("invalid key"))
    }
}

/// A board embedded in the home page.
struct BoardView {
    key: String,
    content: String,
}

impl From<&Board> for BoardView {
    fn from(board: &Board) -> Self {
        Self {
            key: board.key(),
            content: board.content_str().to_string(),
        }
    }
}

#[derive(Template)]
#[template(path = "home.html")]
struct HomeTemplate<'a> {
    title: &'a str,
    num_boards: usize,
    ttl: i64,
    admin_board: Option<BoardView>,
    test_board: Option<BoardView>,
}

/// Home page
#[instrument(skip(state))]
async fn home(State(state): State<SharedState>) -> Result<Html<String>, ApiError> {
    let admin_board = match state.admin {
        Some(admin) => {
            let lookup_state = state.clone();
            let key = admin.to_hex();
            let lookup = tokio::task::spawn_blocking(move || lookup_state.store.get(&key))
                .await
                .map_err(ApiError::internal)?;
            match lookup {
                Ok(board) if !state.is_expired(&board, Utc::now()) => {
                    Some(BoardView::from(&board))
                }
                Ok(_) => None,
                Err(e) => {
                    debug!("admin board unavailable for home page: {}", e);
                    None
                }
            }
        }
        None => None,
    };

    let test_board = match test_board::generate(&state.test_creator) {
        Ok(board) => Some(BoardView::from(&board)),
        Err(e) => {
            warn!("error generating test board for home page: {}", e);
            None
        }
    };

    let template = HomeTemplate {
        title: &state.title,
        num_boards: state.store.count(),
        ttl: state.ttl_days,
        admin_board,
        test_board,
    };

    Ok(Html(template.render().map_err(ApiError::internal)?))
}

fn parse_key(key: &str) -> Result<Publisher, ApiError> {
    Publisher::from_hex(key).map_err(|_| ApiError::bad_request("invalid key"))
}

/// Serve the board for a key
#[instrument(skip(state, headers))]
async fn get_board(
    State(state): State<SharedState>,
    Path(key): Path<String>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let publisher = parse_key(&key)?;
    if state.is_blocked(&publisher) {
        return Err(ApiError::forbidden("key blocked"));
    }
    let key = publisher.to_hex();
    let now = Utc::now();

    let board = if key == TEST_PUBLIC {
        test_board::generate(&state.test_creator).map_err(ApiError::internal)?
    } else {
        let store_state = state.clone();
        let lookup_key = key.clone();
        let lookup = tokio::task::spawn_blocking(move || store_state.store.get(&lookup_key))
            .await
            .map_err(ApiError::internal)?;
        match lookup {
            Ok(board) => board,
            Err(e) if e.is_not_found() => return Err(ApiError::not_found()),
            Err(e) if e.board_error().is_some() => {
                return Err(ApiError::internal(format!("stored board for {key} is invalid: {e}")))
            }
            Err(e) => return Err(ApiError::internal(e)),
        }
    };

    if !board.verify_signature() {
        return Err(ApiError::internal(format!(
            "board from store failed signature validation: {key}"
        )));
    }

    if state.is_expired(&board, now) {
        let evict_state = state.clone();
        let evict_key = key.clone();
        tokio::task::spawn_blocking(move || evict_state.evict_if_expired(&evict_key, now))
            .await
            .map_err(ApiError::internal)??;
        return Err(ApiError::not_found());
    }

    let since = headers
        .get(header::IF_MODIFIED_SINCE)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_http_date);
    if let Some(since) = since {
        if !board.is_after_time(since) {
            debug!(key = %key, "board not newer than {}", since);
            return Ok(StatusCode::NOT_MODIFIED.into_response());
        }
    }

    let signature =
        HeaderValue::from_str(&board.signature().to_hex()).map_err(ApiError::internal)?;
    let last_modified = HeaderValue::from_str(&board.last_modified()).map_err(ApiError::internal)?;

    let mut response = board.content().to_vec().into_response();
    let response_headers = response.headers_mut();
    response_headers.insert(HEADER_SIGNATURE, signature);
    response_headers.insert(header::LAST_MODIFIED, last_modified);
    Ok(response)
}

/// Accept a board for a key
#[instrument(skip(state, headers, body), fields(size = body.len()))]
async fn put_board(
    State(state): State<SharedState>,
    Path(key): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    let publisher = parse_key(&key)?;
    if state.is_blocked(&publisher) {
        return Err(ApiError::forbidden("key blocked").with_log(format!("PUT blocked for key: {publisher}")));
    }

    if let Some(version) = headers.get(HEADER_VERSION).and_then(|v| v.to_str().ok()) {
        if version != SPRING_VERSION {
            debug!("client sent {}: {}", HEADER_VERSION, version);
        }
    }

    let signature = headers
        .get(HEADER_SIGNATURE)
        .and_then(|v| v.to_str().ok());
    let board = Board::from_http(&publisher.to_hex(), signature, body.to_vec())?;

    let now = Utc::now();
    let admit_state = state.clone();
    let admit_board = board.clone();
    let is_new = tokio::task::spawn_blocking(move || admit_state.admit(&admit_board, now))
        .await
        .map_err(ApiError::internal)??;

    info!(key = %publisher, new = is_new, "stored board");
    Ok(StatusCode::NO_CONTENT)
}
