//! The ever-changing board served for the well-known test key.

use askama::Template;
use chrono::Utc;
use rand::seq::SliceRandom;
use spring83::{Board, Creator, Result, SpringError};

const MAGIC_8_BALL: &[&str] = &[
    "It is certain.",
    "It is decidedly so.",
    "Without a doubt.",
    "Yes definitely.",
    "You may rely on it.",
    "As I see it, yes.",
    "Most likely.",
    "Outlook good.",
    "Yes.",
    "Signs point to yes.",
    "Reply hazy, try again.",
    "Ask again later.",
    "Better not tell you now.",
    "Cannot predict now.",
    "Concentrate and ask again.",
    "Don't count on it.",
    "My reply is no.",
    "My sources say no.",
    "Outlook not so good.",
    "Very doubtful.",
];

const COLORS: &[&str] = &[
    "aquamarine",
    "coral",
    "gold",
    "khaki",
    "lavender",
    "lightblue",
    "lightgreen",
    "lightpink",
    "orchid",
    "peachpuff",
    "plum",
    "salmon",
    "skyblue",
    "thistle",
    "wheat",
];

#[derive(Template)]
#[template(path = "test_board.html")]
struct TestBoardTemplate<'a> {
    color: &'a str,
    message: &'a str,
    time: String,
}

/// Builds a fresh board with a random message and colour, stamped now and
/// signed by `creator`.
pub fn generate(creator: &Creator) -> Result<Board> {
    let mut rng = rand::thread_rng();
    let template = TestBoardTemplate {
        color: COLORS.choose(&mut rng).copied().unwrap_or("white"),
        message: MAGIC_8_BALL.choose(&mut rng).copied().unwrap_or("Ask again later."),
        time: Utc::now().format("%a, %d %b %Y %H:%M:%S UTC").to_string(),
    };
    let content = template
        .render()
        .map_err(|e| SpringError::render(format!("test board: {e}")))?;
    creator.publish(content.into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use spring83::{MAX_BOARD_LEN, TEST_PRIVATE, TEST_PUBLIC};

    #[test]
    fn test_generate() {
        let creator = Creator::from_private_hex(TEST_PRIVATE).unwrap();
        let board = generate(&creator).unwrap();

        assert_eq!(board.key(), TEST_PUBLIC);
        assert!(board.verify_signature());
        assert!(board.content().len() <= MAX_BOARD_LEN);
        assert!(MAGIC_8_BALL
            .iter()
            .any(|m| board.content_str().contains(&m.replace('\'', "&#x27;"))
                || board.content_str().contains(m)));
    }
}
