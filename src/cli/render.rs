//! The "Daily Spring" digest page.

use crate::board::TIME_FORMAT;
use crate::error::{Result, SpringError};
use crate::follow::SyncedBoard;
use askama::Template;
use chrono::{DateTime, Utc};

/// One board as shown in the digest.
pub struct DigestEntry {
    pub key: String,
    pub handle: String,
    pub is_new: bool,
    pub timestamp: String,
    pub content: String,
}

impl From<&SyncedBoard> for DigestEntry {
    fn from(synced: &SyncedBoard) -> Self {
        let key = synced.board.key();
        let handle = synced
            .handle
            .clone()
            .unwrap_or_else(|| format!("{}..", &key[..12]));
        Self {
            handle,
            is_new: synced.is_new,
            timestamp: synced.board.timestamp().format(TIME_FORMAT).to_string(),
            content: synced.board.content_str().to_string(),
            key,
        }
    }
}

#[derive(Template)]
#[template(path = "digest.html")]
struct DigestTemplate<'a> {
    profile: &'a str,
    time: String,
    date: String,
    new_count: usize,
    boards: Vec<DigestEntry>,
}

/// Renders `boards` in order. With `new_only`, boards that were already held
/// locally are left out.
pub fn render_digest(
    profile: &str,
    boards: &[SyncedBoard],
    new_only: bool,
    now: DateTime<Utc>,
) -> Result<String> {
    let entries: Vec<DigestEntry> = boards
        .iter()
        .filter(|b| b.is_new || !new_only)
        .map(DigestEntry::from)
        .collect();

    let template = DigestTemplate {
        profile,
        time: now.format("%-I:%M%p").to_string(),
        date: now.format("%a, %d %b %Y").to_string(),
        new_count: boards.iter().filter(|b| b.is_new).count(),
        boards: entries,
    };

    template
        .render()
        .map_err(|e| SpringError::render(format!("digest: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::Creator;
    use crate::TEST_PRIVATE;

    fn synced(content: &str, handle: Option<&str>, is_new: bool) -> SyncedBoard {
        let board = Creator::from_private_hex(TEST_PRIVATE)
            .unwrap()
            .publish(content.as_bytes().to_vec())
            .unwrap();
        SyncedBoard {
            board,
            handle: handle.map(str::to_string),
            is_new,
        }
    }

    #[test]
    fn test_digest_escapes_board_html() {
        let boards = vec![
            synced("<h1>fresh & new</h1>", Some("alice"), true),
            synced("<p>seen before</p>", None, false),
        ];
        let html = render_digest("default", &boards, false, Utc::now()).unwrap();

        assert!(html.contains("1 new"));
        assert!(html.contains("alice"));
        assert!(html.contains("&lt;h1&gt;fresh &amp; new&lt;/h1&gt;"));
        assert!(!html.contains("<h1>fresh"));
        assert!(html.contains("seen before"));
    }

    #[test]
    fn test_digest_new_only() {
        let boards = vec![
            synced("<p>fresh</p>", None, true),
            synced("<p>seen before</p>", None, false),
        ];
        let html = render_digest("default", &boards, true, Utc::now()).unwrap();
        assert!(html.contains("fresh"));
        assert!(!html.contains("seen before"));
    }
}
