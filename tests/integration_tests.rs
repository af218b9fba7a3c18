//! Integration tests for spring83
//!
//! These tests drive boards through the whole library: keys, publishing,
//! validation, the stored form and the directory store.

use chrono::{Duration, Utc};
use spring83::board::time_element;
use spring83::{
    Board, BoardError, Creator, Publisher, Signature, SpringError, Store, MAX_BOARD_LEN,
    TEST_PRIVATE, TEST_PUBLIC,
};
use std::fs;
use tempfile::TempDir;

/// Test that a published board survives storage and a store reopen unchanged
#[test]
fn test_publish_store_reopen() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let creator = Creator::generate().expect("Failed to generate creator");
    let board = creator
        .publish(b"<h1>Hello from the spring</h1>".to_vec())
        .expect("Failed to publish");

    {
        let store = Store::open(dir.path()).expect("Failed to open store");
        assert!(store.add(&board).unwrap());
        assert_eq!(store.get(&board.key()).unwrap(), board);
    }

    let store = Store::open(dir.path()).expect("Failed to reopen store");
    assert_eq!(store.count(), 1);
    let loaded = store.get(&board.key()).unwrap();
    assert!(loaded.same_as(&board));
    assert!(loaded.verify_signature());
    assert_eq!(loaded.timestamp(), board.timestamp());

    // the file is the signature line followed by the raw content
    let raw = fs::read(dir.path().join(format!("{}.s83", board.key()))).unwrap();
    let expected = format!("{}\n", board.signature().to_hex());
    assert!(raw.starts_with(expected.as_bytes()));
    assert!(raw.ends_with(board.content()));
}

/// Test that oversize content is rejected before the signature is looked at
#[test]
fn test_oversize_rejected_regardless_of_signature() {
    let creator = Creator::from_private_hex(TEST_PRIVATE).unwrap();
    let content = format!("{}{}", time_element(Utc::now()), "x".repeat(MAX_BOARD_LEN));

    let signed = creator.sign(content.as_bytes());
    let bogus = Signature::from_hex(&"00".repeat(64)).unwrap();

    for signature in [signed, bogus] {
        let err = Board::new(TEST_PUBLIC, signature, content.clone().into_bytes()).unwrap_err();
        assert!(matches!(
            err.board_error(),
            Some(BoardError::TooLarge(len)) if len == content.len()
        ));
    }
}

/// Test that signed content without a usable time element is refused
#[test]
fn test_timestamp_required_even_when_signed() {
    let creator = Creator::from_private_hex(TEST_PRIVATE).unwrap();
    let cases = [
        "<p>no time at all</p>",
        r#"<time datetime="yesterday">"#,
        r#"<!-- <time datetime="2022-06-01T12:00:00Z"> -->"#,
        r#"<time class="x" datetime="2022-06-01T12:00:00Z">"#,
    ];

    for content in cases {
        let signature = creator.sign(content.as_bytes());
        let err = Board::new(TEST_PUBLIC, signature, content.as_bytes().to_vec()).unwrap_err();
        assert_eq!(
            err.board_error(),
            Some(BoardError::NoTimestamp),
            "content: {content}"
        );
    }
}

/// Test that a stored board outranks older and equal boards, but not newer ones
#[test]
fn test_board_ordering() {
    let creator = Creator::generate().unwrap();
    let now = Utc::now();
    let at = |t| {
        creator
            .publish(format!("{}<p>board</p>", time_element(t)).into_bytes())
            .unwrap()
    };

    let older = at(now - Duration::days(1));
    let newer = at(now);
    assert!(newer.is_after(&older));
    assert!(!older.is_after(&newer));
    assert!(!newer.is_after(&newer.clone()));
}

/// Test that store counts track distinct keys across adds, overwrites and removes
#[test]
fn test_store_count_tracks_keys() {
    let dir = TempDir::new().unwrap();
    let store = Store::open(dir.path()).unwrap();
    let creators: Vec<Creator> = (0..3).map(|_| Creator::generate().unwrap()).collect();

    for creator in &creators {
        let board = creator.publish(b"<p>one</p>".to_vec()).unwrap();
        assert!(store.add(&board).unwrap());
    }
    assert_eq!(store.count(), 3);

    let again = creators[0].publish(b"<p>two</p>".to_vec()).unwrap();
    assert!(!store.add(&again).unwrap());
    assert_eq!(store.count(), 3);

    store.remove(&creators[1].publisher().to_hex()).unwrap();
    assert_eq!(store.count(), 2);
    assert!(matches!(
        store.get(&creators[1].publisher().to_hex()),
        Err(SpringError::NotFound(_))
    ));

    let mut keys = store.keys();
    keys.sort();
    let mut expected = vec![creators[0].publisher().to_hex(), creators[2].publisher().to_hex()];
    expected.sort();
    assert_eq!(keys, expected);
}

/// Test the well-known keys
#[test]
fn test_well_known_keys() {
    let test_creator = Creator::from_private_hex(TEST_PRIVATE).unwrap();
    assert_eq!(test_creator.publisher().to_hex(), TEST_PUBLIC);
    // encodes 1983, long past
    assert!(!test_creator.is_valid());

    let parsed = Publisher::from_hex(&TEST_PUBLIC.to_uppercase()).unwrap();
    assert_eq!(&parsed, test_creator.publisher());
}
