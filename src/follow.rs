//! Following boards.
//!
//! For every followed key the client loads its local copy (if any), asks the
//! server for the board with `If-Modified-Since` set to the local timestamp,
//! and reconciles the answer:
//!
//! - `304`, a transport error or an unusable response keep the local copy
//! - a fetched board identical to the local copy is not new, which covers
//!   servers that ignore the conditional header
//! - anything else replaces the local copy and is marked new
//!
//! One failing follow never stops the others. Failing every follow is
//! reported separately from a partial failure.

use crate::board::Board;
use crate::error::{Result, SpringError};
use crate::identity::Publisher;
use crate::store::Store;
use crate::{HEADER_SIGNATURE, HEADER_VERSION, SPRING_VERSION};
use chrono::{DateTime, Utc};
use regex::Regex;
use reqwest::header::IF_MODIFIED_SINCE;
use reqwest::{Client, StatusCode, Url};
use std::fmt;
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Per-request timeout for board fetches
const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

fn follow_url_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^https?://(.*)/([0-9A-Fa-f]{57}83e(0[1-9]|1[0-2])\d\d)$")
            .expect("static follow pattern compiles")
    })
}

/// A subscription to one publisher's board on one server.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Follow {
    publisher: Publisher,
    url: Url,
    handle: Option<String>,
}

impl Follow {
    /// A follow of `key` at the full board URL `url`.
    pub fn new(key: &str, url: &str, handle: Option<String>) -> Result<Self> {
        let publisher = Publisher::from_hex(key)?;
        let url = Url::parse(url)
            .map_err(|e| SpringError::config(format!("invalid follow url {url}: {e}")))?;
        Ok(Self {
            publisher,
            url,
            handle: handle.filter(|h| !h.is_empty()),
        })
    }

    /// A follow of `key` on `server`, with the key appended to the server path.
    pub fn on_server(server: &Url, key: &str, handle: Option<String>) -> Result<Self> {
        let publisher = Publisher::from_hex(key)?;
        let mut url = server.clone();
        url.path_segments_mut()
            .map_err(|_| SpringError::config(format!("server url cannot be a base: {server}")))?
            .pop_if_empty()
            .push(&publisher.to_hex());
        Ok(Self {
            publisher,
            url,
            handle: handle.filter(|h| !h.is_empty()),
        })
    }

    pub fn publisher(&self) -> &Publisher {
        &self.publisher
    }

    pub fn key(&self) -> String {
        self.publisher.to_hex()
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn handle(&self) -> Option<&str> {
        self.handle.as_deref()
    }
}

impl fmt::Display for Follow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} @ {}",
            self.publisher,
            self.handle.as_deref().unwrap_or(""),
            self.url.host_str().unwrap_or("")
        )
    }
}

/// Extracts follows from profile text.
///
/// A follow is a line holding a board URL (`http(s)://host/.../<key>`). The
/// line just before it, if it is not itself a follow, becomes the follow's
/// handle. Blank lines and `#` comments reset the pending handle. Other lines
/// (such as `secret = ...`) are only ever taken as handles.
pub fn parse_follows(text: &str) -> Vec<Follow> {
    let mut follows = Vec::new();
    let mut handle: Option<String> = None;

    for line in text.lines() {
        let line = line.trim_end_matches('\r');
        if line.is_empty() || line.starts_with('#') {
            handle = None;
            continue;
        }

        match follow_url_pattern().captures(line) {
            Some(caps) => {
                match Follow::new(&caps[2], line, handle.take()) {
                    Ok(follow) => follows.push(follow),
                    Err(e) => debug!("skipping follow line {line}: {e}"),
                }
            }
            None => handle = Some(line.trim().to_string()),
        }
    }

    follows
}

/// Result of one conditional fetch.
#[derive(Debug)]
pub enum FetchOutcome {
    /// The server answered `304 Not Modified`
    NotModified,
    /// The server returned a board that validated
    Fetched(Board),
}

/// What to do with one follow after fetching.
#[derive(Debug)]
pub enum Reconciled {
    /// A board that differs from the local copy; persist and show as new
    New(Board),
    /// Nothing new; the local copy (if any) stands
    Unchanged(Option<Board>),
    /// The fetch failed; the local copy (if any) stands
    Failed(Option<Board>, SpringError),
}

/// Decides between a local copy and a fetch result.
pub fn reconcile(local: Option<Board>, fetched: Result<FetchOutcome>) -> Reconciled {
    match fetched {
        Err(e) => Reconciled::Failed(local, e),
        Ok(FetchOutcome::NotModified) => Reconciled::Unchanged(local),
        Ok(FetchOutcome::Fetched(board)) => match local {
            Some(local) if local.same_as(&board) => Reconciled::Unchanged(Some(local)),
            _ => Reconciled::New(board),
        },
    }
}

/// HTTP client for fetching followed boards and publishing.
#[derive(Clone, Debug)]
pub struct FollowClient {
    client: Client,
}

impl FollowClient {
    pub fn new() -> Result<Self> {
        let client = Client::builder().timeout(FETCH_TIMEOUT).build()?;
        Ok(Self { client })
    }

    /// Fetches the board behind `follow`, conditional on `since`.
    #[instrument(skip(self, follow), fields(follow = %follow))]
    pub async fn fetch(
        &self,
        follow: &Follow,
        since: Option<DateTime<Utc>>,
    ) -> Result<FetchOutcome> {
        let mut request = self
            .client
            .get(follow.url().clone())
            .header(HEADER_VERSION, SPRING_VERSION);
        if let Some(since) = since {
            request = request.header(
                IF_MODIFIED_SINCE,
                since.format(crate::board::HTTP_DATE_FORMAT).to_string(),
            );
        }

        let response = request.send().await?;
        match response.status() {
            StatusCode::NOT_MODIFIED => Ok(FetchOutcome::NotModified),
            StatusCode::OK => {
                let signature = response
                    .headers()
                    .get(HEADER_SIGNATURE)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_owned);
                let body = response.bytes().await?;
                let board = Board::from_http(&follow.key(), signature.as_deref(), body.to_vec())?;
                Ok(FetchOutcome::Fetched(board))
            }
            status => Err(SpringError::Status(status.as_u16())),
        }
    }

    /// Pushes `board` to `server` with `PUT <server>/<key>`.
    #[instrument(skip(self, board), fields(key = %board.publisher()))]
    pub async fn publish(&self, server: &Url, board: &Board) -> Result<()> {
        let target = Follow::on_server(server, &board.key(), None)?;
        let response = self
            .client
            .put(target.url().clone())
            .header(reqwest::header::CONTENT_TYPE, "text/html;charset=utf-8")
            .header(HEADER_VERSION, SPRING_VERSION)
            .header(HEADER_SIGNATURE, board.signature().to_hex())
            .body(board.content().to_vec())
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            info!("published board to {}", target.url());
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            warn!("publish rejected: {} {}", status, body.trim());
            Err(SpringError::Status(status.as_u16()))
        }
    }
}

/// One followed board after a sync pass.
#[derive(Clone, Debug)]
pub struct SyncedBoard {
    pub board: Board,
    pub handle: Option<String>,
    pub is_new: bool,
}

/// Outcome of a sync pass over a list of follows.
#[derive(Debug, Default)]
pub struct SyncReport {
    /// Boards to show, in follow order
    pub boards: Vec<SyncedBoard>,
    /// Follows whose fetch failed
    pub failed: usize,
    /// Follows attempted
    pub total: usize,
}

impl SyncReport {
    pub fn new_boards(&self) -> impl Iterator<Item = &SyncedBoard> {
        self.boards.iter().filter(|b| b.is_new)
    }

    pub fn new_count(&self) -> usize {
        self.new_boards().count()
    }

    /// Some but not all follows failed.
    pub fn is_partial_failure(&self) -> bool {
        self.failed > 0 && self.failed < self.total
    }

    /// Turns "every follow failed" into an error; partial failure is fine.
    pub fn into_result(self) -> Result<Self> {
        if self.total > 0 && self.failed == self.total {
            Err(SpringError::FollowsFailed(self.total))
        } else {
            Ok(self)
        }
    }
}

/// Fetches every follow and merges the results into `local`.
pub async fn sync_follows(client: &FollowClient, follows: &[Follow], local: &Store) -> SyncReport {
    let mut report = SyncReport {
        total: follows.len(),
        ..Default::default()
    };

    for follow in follows {
        let local_board = match local.get(&follow.key()) {
            Ok(board) => Some(board),
            Err(e) => {
                if !e.is_not_found() {
                    warn!("ignoring local copy for {}: {}", follow, e);
                }
                None
            }
        };

        let since = local_board.as_ref().map(Board::timestamp);
        let fetched = client.fetch(follow, since).await;

        let (board, is_new) = match reconcile(local_board, fetched) {
            Reconciled::New(board) => {
                if let Err(e) = local.add(&board) {
                    warn!("failed to save board for {}: {}", follow, e);
                }
                info!("new board for {}", follow);
                (Some(board), true)
            }
            Reconciled::Unchanged(board) => {
                debug!("no new board for {}", follow);
                (board, false)
            }
            Reconciled::Failed(board, e) => {
                warn!("failed to get board for {}: {}", follow, e);
                report.failed += 1;
                (board, false)
            }
        };

        if let Some(board) = board {
            report.boards.push(SyncedBoard {
                board,
                handle: follow.handle().map(str::to_owned),
                is_new,
            });
        }
    }

    report
}
