//! Boards: signed, timestamped, size-bounded HTML documents.
//!
//! Every board is built through [`Board::new`], which runs the same checks in
//! the same order whether the bytes came from a PUT body, a file on disk or a
//! server response:
//!
//! 1. the key parses
//! 2. the content is UTF-8
//! 3. the content is at most 2217 bytes
//! 4. the signature verifies over exactly the content
//! 5. the content carries a `<time datetime="YYYY-MM-DDTHH:MM:SSZ">` element
//!
//! The embedded timestamp is only read after the signature has been checked.
//! When several time elements are present the first well-formed one wins.
//!
//! ## Wire and disk format
//!
//! `<128 hex signature>\n<raw content bytes>`

use crate::error::{BoardError, Result};
use crate::identity::{Creator, Publisher};
use crate::signature::Signature;
use crate::MAX_BOARD_LEN;
use chrono::{DateTime, NaiveDateTime, Utc};
use std::fmt;

/// Format of the `datetime` attribute
pub const TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// HTTP-date format used for `Last-Modified` and `If-Modified-Since`
pub const HTTP_DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S GMT";

/// Elements whose contents are plain text up to the matching end tag.
const RAW_TEXT_ELEMENTS: &[&[u8]] = &[
    b"iframe",
    b"noembed",
    b"noframes",
    b"noscript",
    b"plaintext",
    b"script",
    b"style",
    b"textarea",
    b"title",
    b"xmp",
];

/// A start tag as the tokenizer sees it. Names are raw, compare them
/// case-insensitively.
struct StartTag<'a> {
    name: &'a [u8],
    attributes: Vec<(&'a [u8], &'a [u8])>,
    self_closing: bool,
}

/// Walks the start tags of a document in order.
///
/// Comments, doctypes, end tags and the contents of raw text elements are
/// consumed without yielding anything, and quoted attribute values are read
/// as part of their tag, so markup inside any of them is never mistaken for
/// an element. A tag cut off by the end of input is dropped.
struct StartTags<'a> {
    html: &'a [u8],
    pos: usize,
}

impl<'a> StartTags<'a> {
    fn new(html: &'a [u8]) -> Self {
        Self { html, pos: 0 }
    }

    fn peek(&self) -> Option<u8> {
        self.html.get(self.pos).copied()
    }

    fn skip_past(&mut self, needle: &[u8]) {
        self.pos = find(&self.html[self.pos..], needle)
            .map_or(self.html.len(), |i| self.pos + i + needle.len());
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(|b| b.is_ascii_whitespace()) {
            self.pos += 1;
        }
    }

    fn read_name(&mut self) -> &'a [u8] {
        let html = self.html;
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|b| !b.is_ascii_whitespace() && b != b'/' && b != b'>')
        {
            self.pos += 1;
        }
        &html[start..self.pos]
    }

    /// Reads attributes up to and including the closing `>`.
    fn read_attributes(&mut self) -> Option<(Vec<(&'a [u8], &'a [u8])>, bool)> {
        let html = self.html;
        let mut attributes = Vec::new();
        loop {
            let mut self_closing = false;
            loop {
                match self.peek()? {
                    b'/' => self_closing = true,
                    b if b.is_ascii_whitespace() => self_closing = false,
                    _ => break,
                }
                self.pos += 1;
            }
            if self.peek()? == b'>' {
                self.pos += 1;
                return Some((attributes, self_closing));
            }

            // a leading `=` belongs to the name
            let name_start = self.pos;
            self.pos += 1;
            while self.peek().is_some_and(|b| {
                !b.is_ascii_whitespace() && !matches!(b, b'/' | b'>' | b'=')
            }) {
                self.pos += 1;
            }
            let name = &html[name_start..self.pos];

            self.skip_whitespace();
            let mut value: &'a [u8] = b"";
            if self.peek() == Some(b'=') {
                self.pos += 1;
                self.skip_whitespace();
                match self.peek()? {
                    quote @ (b'"' | b'\'') => {
                        let start = self.pos + 1;
                        let len = html[start..].iter().position(|&b| b == quote)?;
                        value = &html[start..start + len];
                        self.pos = start + len + 1;
                    }
                    _ => {
                        let start = self.pos;
                        while self
                            .peek()
                            .is_some_and(|b| !b.is_ascii_whitespace() && b != b'>')
                        {
                            self.pos += 1;
                        }
                        value = &html[start..self.pos];
                    }
                }
            }
            attributes.push((name, value));
        }
    }

    /// Moves past the text of a raw text element, stopping at its end tag.
    fn skip_raw_text(&mut self, name: &[u8]) {
        if !RAW_TEXT_ELEMENTS
            .iter()
            .any(|raw| raw.eq_ignore_ascii_case(name))
        {
            return;
        }
        let html = self.html;
        if name.eq_ignore_ascii_case(b"plaintext") {
            self.pos = html.len();
            return;
        }
        while let Some(i) = find(&html[self.pos..], b"</") {
            let open = self.pos + i;
            let after = open + 2 + name.len();
            let closes = html
                .get(open + 2..after)
                .is_some_and(|n| n.eq_ignore_ascii_case(name))
                && html
                    .get(after)
                    .map_or(true, |&b| b.is_ascii_whitespace() || b == b'/' || b == b'>');
            if closes {
                self.pos = open;
                return;
            }
            self.pos = open + 2;
        }
        self.pos = html.len();
    }
}

impl<'a> Iterator for StartTags<'a> {
    type Item = StartTag<'a>;

    fn next(&mut self) -> Option<StartTag<'a>> {
        let html = self.html;
        loop {
            let lt = self.pos + html[self.pos..].iter().position(|&b| b == b'<')?;
            self.pos = lt + 1;
            let rest = &html[self.pos..];

            if rest.starts_with(b"!--") {
                self.pos += 3;
                // `<!-->` and `<!--->` are empty comments
                if html[self.pos..].starts_with(b">") {
                    self.pos += 1;
                } else if html[self.pos..].starts_with(b"->") {
                    self.pos += 2;
                } else {
                    self.skip_past(b"-->");
                }
            } else if rest.starts_with(b"!") || rest.starts_with(b"?") {
                self.skip_past(b">");
            } else if rest.starts_with(b"/") {
                self.pos += 1;
                if self.peek().is_some_and(|b| b.is_ascii_alphabetic()) {
                    self.read_name();
                    self.read_attributes()?;
                } else {
                    self.skip_past(b">");
                }
            } else if rest.first().is_some_and(|b| b.is_ascii_alphabetic()) {
                let name = self.read_name();
                let (attributes, self_closing) = self.read_attributes()?;
                if !self_closing {
                    self.skip_raw_text(name);
                }
                return Some(StartTag {
                    name,
                    attributes,
                    self_closing,
                });
            }
            // anything else after `<` is text
        }
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Finds the first well-formed time element in document order.
///
/// Only a `time` start tag whose single attribute is `datetime` counts.
pub fn parse_timestamp(content: &[u8]) -> Result<DateTime<Utc>> {
    for tag in StartTags::new(content) {
        if tag.self_closing || !tag.name.eq_ignore_ascii_case(b"time") {
            continue;
        }
        let [(name, value)] = tag.attributes.as_slice() else {
            continue;
        };
        if !name.eq_ignore_ascii_case(b"datetime") {
            continue;
        }
        let Ok(value) = std::str::from_utf8(value) else {
            continue;
        };
        if let Ok(parsed) = NaiveDateTime::parse_from_str(value, TIME_FORMAT) {
            return Ok(parsed.and_utc());
        }
    }
    Err(BoardError::NoTimestamp.into())
}

/// Renders a time element for `t`, truncated to whole seconds.
pub fn time_element(t: DateTime<Utc>) -> String {
    format!(r#"<time datetime="{}">"#, t.format(TIME_FORMAT))
}

/// Parses an `If-Modified-Since` style date.
pub fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(value.trim())
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

/// A validated board. Immutable once built; a newer board replaces it whole.
#[derive(Clone, PartialEq, Eq)]
pub struct Board {
    publisher: Publisher,
    signature: Signature,
    content: Vec<u8>,
    timestamp: DateTime<Utc>,
}

impl Board {
    /// Validates `(key, signature, content)` and builds a board.
    pub fn new(key_hex: &str, signature: Signature, content: Vec<u8>) -> Result<Self> {
        let publisher = Publisher::from_hex(key_hex)?;

        if std::str::from_utf8(&content).is_err() {
            return Err(BoardError::NotUtf8.into());
        }
        if content.len() > MAX_BOARD_LEN {
            return Err(BoardError::TooLarge(content.len()).into());
        }
        if !signature.verify(&publisher, &content) {
            return Err(BoardError::InvalidSignature.into());
        }
        let timestamp = parse_timestamp(&content)?;

        Ok(Self {
            publisher,
            signature,
            content,
            timestamp,
        })
    }

    /// Builds a board from a request or response: the `Spring-Signature`
    /// header value plus the body.
    pub fn from_http(key_hex: &str, signature_header: Option<&str>, body: Vec<u8>) -> Result<Self> {
        let signature = Signature::from_hex(signature_header.unwrap_or_default().trim())?;
        Self::new(key_hex, signature, body)
    }

    /// Decodes the stored form: signature line, newline, content.
    pub fn from_bytes(key_hex: &str, data: &[u8]) -> Result<Self> {
        let newline = data
            .iter()
            .position(|&b| b == b'\n')
            .ok_or(BoardError::MissingSignatureLine)?;
        let sig_line =
            std::str::from_utf8(&data[..newline]).map_err(|_| BoardError::BadSignatureEncoding)?;
        let signature = Signature::from_hex(sig_line)?;
        Self::new(key_hex, signature, data[newline + 1..].to_vec())
    }

    /// Encodes the stored form. Content is written verbatim.
    pub fn to_bytes(&self) -> Vec<u8> {
        let sig = self.signature.to_hex();
        let mut data = Vec::with_capacity(sig.len() + 1 + self.content.len());
        data.extend_from_slice(sig.as_bytes());
        data.push(b'\n');
        data.extend_from_slice(&self.content);
        data
    }

    pub fn publisher(&self) -> &Publisher {
        &self.publisher
    }

    /// Hex key of the publisher
    pub fn key(&self) -> String {
        self.publisher.to_hex()
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    pub fn content(&self) -> &[u8] {
        &self.content
    }

    /// Content as text. Boards are UTF-8 by construction.
    pub fn content_str(&self) -> &str {
        std::str::from_utf8(&self.content).unwrap_or_default()
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// The timestamp as an HTTP-date, for `Last-Modified`/`If-Modified-Since`.
    pub fn last_modified(&self) -> String {
        self.timestamp.format(HTTP_DATE_FORMAT).to_string()
    }

    /// Re-checks the signature. Always true for a board built by this module;
    /// servers call it again before serving anything from storage.
    pub fn verify_signature(&self) -> bool {
        self.signature.verify(&self.publisher, &self.content)
    }

    /// Strictly newer than `other`
    pub fn is_after(&self, other: &Board) -> bool {
        self.timestamp > other.timestamp
    }

    /// Strictly newer than `t`
    pub fn is_after_time(&self, t: DateTime<Utc>) -> bool {
        self.timestamp > t
    }

    /// Same publisher, timestamp, signature and content.
    pub fn same_as(&self, other: &Board) -> bool {
        self == other
    }
}

impl fmt::Display for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "verifies  : {}", self.verify_signature())?;
        writeln!(f, "creator   : {}", self.publisher)?;
        writeln!(f, "timestamp : {}", self.timestamp.format(TIME_FORMAT))?;
        writeln!(f, "signature : {}", self.signature)?;
        f.write_str(self.content_str())
    }
}

impl fmt::Debug for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Board")
            .field("publisher", &self.publisher.to_hex())
            .field("timestamp", &self.timestamp)
            .field("size", &self.content.len())
            .finish()
    }
}

impl Creator {
    /// Signs `content` as a board for this creator.
    ///
    /// Content without a time element gets one for the current time prepended.
    /// A time element dated in the future is rejected. The result goes through
    /// [`Board::new`] so a publisher never produces a board a server would
    /// refuse on validation grounds.
    pub fn publish(&self, content: Vec<u8>) -> Result<Board> {
        self.publish_at(content, Utc::now())
    }

    /// [`Creator::publish`] with an explicit clock.
    pub fn publish_at(&self, content: Vec<u8>, now: DateTime<Utc>) -> Result<Board> {
        let content = match parse_timestamp(&content) {
            Ok(ts) if ts > now => return Err(BoardError::FutureTimestamp.into()),
            Ok(_) => content,
            Err(_) => {
                let mut stamped = time_element(now).into_bytes();
                stamped.extend_from_slice(&content);
                stamped
            }
        };

        let signature = self.sign(&content);
        Board::new(&self.publisher().to_hex(), signature, content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SpringError;
    use crate::{TEST_PRIVATE, TEST_PUBLIC};
    use chrono::{Duration, TimeZone};

    fn creator() -> Creator {
        Creator::from_private_hex(TEST_PRIVATE).unwrap()
    }

    fn board_error(result: Result<Board>) -> BoardError {
        result.unwrap_err().board_error().expect("board error")
    }

    #[test]
    fn test_publish_prepends_timestamp() {
        let now = Utc.with_ymd_and_hms(2026, 5, 4, 3, 2, 1).unwrap();
        let board = creator().publish_at(b"foo".to_vec(), now).unwrap();

        assert!(board.verify_signature());
        assert_eq!(board.timestamp(), now);
        assert_eq!(
            board.content(),
            b"<time datetime=\"2026-05-04T03:02:01Z\">foo".as_slice()
        );
        assert_eq!(board.signature().to_hex().len(), crate::SIG_LEN);
        assert_eq!(board.key(), TEST_PUBLIC);
    }

    #[test]
    fn test_first_timestamp_wins() {
        let now = Utc::now();
        let first = now - Duration::hours(1);
        let second = now - Duration::days(365);
        let content = format!("{}{}", time_element(first), time_element(second));

        let board = creator().publish(content.into_bytes()).unwrap();
        assert_eq!(board.timestamp().timestamp(), first.timestamp());
    }

    #[test]
    fn test_future_timestamp_rejected() {
        let future = Utc::now() + Duration::days(1);
        let result = creator().publish(time_element(future).into_bytes());
        assert_eq!(board_error(result), BoardError::FutureTimestamp);
    }

    #[test]
    fn test_validation_order() {
        let c = creator();
        let sig = c.sign(b"whatever");

        assert!(matches!(
            Board::new("abc", sig.clone(), b"x".to_vec()),
            Err(SpringError::MalformedKey(_))
        ));

        let latin1 = vec![0xff, 0xfe, b'a'];
        assert_eq!(
            board_error(Board::new(TEST_PUBLIC, c.sign(&latin1), latin1)),
            BoardError::NotUtf8
        );

        // size is checked before the signature
        let big = vec![b'a'; MAX_BOARD_LEN + 1];
        assert_eq!(
            board_error(Board::new(TEST_PUBLIC, sig.clone(), big)),
            BoardError::TooLarge(MAX_BOARD_LEN + 1)
        );

        let content = time_element(Utc::now()).into_bytes();
        assert_eq!(
            board_error(Board::new(TEST_PUBLIC, sig, content)),
            BoardError::InvalidSignature
        );

        let untimed = b"<p>no time here</p>".to_vec();
        assert_eq!(
            board_error(Board::new(TEST_PUBLIC, c.sign(&untimed), untimed)),
            BoardError::NoTimestamp
        );
    }

    #[test]
    fn test_max_size_accepted() {
        let mut content = time_element(Utc::now()).into_bytes();
        content.resize(MAX_BOARD_LEN, b'a');
        let c = creator();
        let board = Board::new(TEST_PUBLIC, c.sign(&content), content).unwrap();
        assert_eq!(board.content().len(), MAX_BOARD_LEN);
    }

    #[test]
    fn test_parse_timestamp_variants() {
        let expected = Utc.with_ymd_and_hms(2022, 6, 1, 12, 0, 0).unwrap();

        let cases: &[&[u8]] = &[
            br#"<time datetime="2022-06-01T12:00:00Z">"#,
            br#"<TIME DateTime="2022-06-01T12:00:00Z">"#,
            br#"<time datetime='2022-06-01T12:00:00Z'>"#,
            br#"<time datetime=2022-06-01T12:00:00Z>"#,
            br#"<time datetime="nope"><time datetime="2022-06-01T12:00:00Z">"#,
            br#"<!-- <time datetime="2001-01-01T00:00:00Z"> --><time datetime="2022-06-01T12:00:00Z">"#,
            br#"<script>var t = '<time datetime="2001-01-01T00:00:00Z">';</script><time datetime="2022-06-01T12:00:00Z">"#,
            br#"<STYLE>/* <time datetime="2001-01-01T00:00:00Z"> */</style ><time datetime="2022-06-01T12:00:00Z">"#,
            br#"<textarea></text><time datetime="2001-01-01T00:00:00Z"></textarea><time datetime="2022-06-01T12:00:00Z">"#,
            br#"<p title='<time datetime="2001-01-01T00:00:00Z">'>x</p><time datetime="2022-06-01T12:00:00Z">"#,
            br#"<a href="x>y" data-t=<time>z</a><time datetime="2022-06-01T12:00:00Z">"#,
            br#"<!DOCTYPE html><p>1 < 2</p><time datetime="2022-06-01T12:00:00Z">"#,
        ];
        for case in cases {
            assert_eq!(parse_timestamp(case).unwrap(), expected);
        }

        let rejected: &[&[u8]] = &[
            b"",
            br#"<time>"#,
            br#"<time datetime="2022-06-01T12:00:00Z" class="x">"#,
            br#"<time datetime="2022-06-01 12:00:00">"#,
            br#"<timer datetime="2022-06-01T12:00:00Z">"#,
            br#"<time datetime="2022-06-01T12:00:00Z"/>"#,
            br#"<script><time datetime="2022-06-01T12:00:00Z">"#,
            br#"<title><time datetime="2022-06-01T12:00:00Z"></title>"#,
            br#"<p title="<time datetime='2022-06-01T12:00:00Z'>">"#,
            br#"<time datetime="2022-06-01T12:00:00Z""#,
        ];
        for case in rejected {
            assert!(parse_timestamp(case).is_err());
        }
    }

    #[test]
    fn test_stored_form_roundtrip() {
        let board = creator().publish(b"<p>hi</p>\n\nbye".to_vec()).unwrap();
        let decoded = Board::from_bytes(TEST_PUBLIC, &board.to_bytes()).unwrap();
        assert!(decoded.same_as(&board));

        assert_eq!(
            board_error(Board::from_bytes(TEST_PUBLIC, b"no newline")),
            BoardError::MissingSignatureLine
        );
        assert_eq!(
            board_error(Board::from_bytes(TEST_PUBLIC, b"abcd\ncontent")),
            BoardError::BadSignatureEncoding
        );
    }

    #[test]
    fn test_from_http_requires_signature_header() {
        let board = creator().publish(b"hello".to_vec()).unwrap();
        let sig = board.signature().to_hex();

        let ok = Board::from_http(TEST_PUBLIC, Some(&sig), board.content().to_vec()).unwrap();
        assert_eq!(ok, board);
        assert_eq!(
            board_error(Board::from_http(TEST_PUBLIC, None, board.content().to_vec())),
            BoardError::BadSignatureEncoding
        );
    }

    #[test]
    fn test_http_dates() {
        let board = creator()
            .publish_at(
                b"x".to_vec(),
                Utc.with_ymd_and_hms(2022, 6, 1, 12, 0, 0).unwrap(),
            )
            .unwrap();
        assert_eq!(board.last_modified(), "Wed, 01 Jun 2022 12:00:00 GMT");
        assert_eq!(
            parse_http_date(&board.last_modified()),
            Some(board.timestamp())
        );
        assert_eq!(parse_http_date("yesterday"), None);
    }
}
