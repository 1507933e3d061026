//! Tests for the project-owned user data store.

mod common;

use calkit_engine::Error;
use common::{BookSpec, FixtureLibrary};

#[tokio::test]
async fn comment_round_trip() {
    let fixture = FixtureLibrary::new();
    fixture.add_book(&BookSpec::titled("Dune", "Frank Herbert"));
    let engine = fixture.engine();
    let userdata = engine.userdata();

    assert!(userdata.comment_get(1, None).await.unwrap().is_none());

    let saved = userdata
        .comment_upsert(1, "Slow start, great payoff.", None)
        .await
        .unwrap();
    assert_eq!(saved.comment_text, "Slow start, great payoff.");
    assert_eq!(saved.book_id, 1);
    assert!(saved.user_id.is_none());

    let read_back = userdata.comment_get(1, None).await.unwrap().unwrap();
    assert_eq!(read_back.id, saved.id);

    // Upsert replaces rather than duplicating.
    userdata.comment_upsert(1, "Revised opinion.", None).await.unwrap();
    let all = userdata.comments_for_book(1).await.unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].comment_text, "Revised opinion.");

    assert!(userdata.comment_delete(1, None).await.unwrap());
    assert!(!userdata.comment_delete(1, None).await.unwrap());
}

#[tokio::test]
async fn comments_are_scoped_per_user() {
    let fixture = FixtureLibrary::new();
    fixture.add_book(&BookSpec::titled("Dune", "Frank Herbert"));
    let engine = fixture.engine();
    let userdata = engine.userdata();

    userdata.comment_upsert(1, "anonymous note", None).await.unwrap();
    userdata
        .comment_upsert(1, "alice's note", Some("alice"))
        .await
        .unwrap();

    let anon = userdata.comment_get(1, None).await.unwrap().unwrap();
    assert_eq!(anon.comment_text, "anonymous note");
    let alice = userdata.comment_get(1, Some("alice")).await.unwrap().unwrap();
    assert_eq!(alice.comment_text, "alice's note");
    assert_eq!(alice.user_id.as_deref(), Some("alice"));

    assert_eq!(userdata.comments_for_book(1).await.unwrap().len(), 2);
}

#[tokio::test]
async fn comment_append_builds_paragraphs() {
    let fixture = FixtureLibrary::new();
    fixture.add_book(&BookSpec::titled("Dune", "Frank Herbert"));
    let engine = fixture.engine();
    let userdata = engine.userdata();

    let first = userdata.comment_append(1, "First thought.", None).await.unwrap();
    assert_eq!(first.comment_text, "First thought.");

    let second = userdata.comment_append(1, "Second thought.", None).await.unwrap();
    assert_eq!(second.comment_text, "First thought.\n\nSecond thought.");
}

#[tokio::test]
async fn extended_metadata_partial_upserts() {
    let fixture = FixtureLibrary::new();
    fixture.add_book(&BookSpec::titled("The Odyssey", "Homer"));
    let engine = fixture.engine();
    let userdata = engine.userdata();

    assert!(userdata.extended_get(1).await.unwrap().is_none());

    let meta = userdata
        .extended_set_translator(1, "Emily Wilson")
        .await
        .unwrap();
    assert_eq!(meta.translator.as_deref(), Some("Emily Wilson"));
    assert!(meta.first_published.is_none());

    // Setting the other field keeps the first.
    let meta = userdata
        .extended_set_first_published(1, "8th century BC")
        .await
        .unwrap();
    assert_eq!(meta.translator.as_deref(), Some("Emily Wilson"));
    assert_eq!(meta.first_published.as_deref(), Some("8th century BC"));

    // One row per (book, library).
    let again = userdata
        .extended_upsert(1, Some("Robert Fagles"), None)
        .await
        .unwrap();
    assert_eq!(again.id, meta.id);
    assert_eq!(again.translator.as_deref(), Some("Robert Fagles"));

    assert!(userdata.extended_delete(1).await.unwrap());
    assert!(userdata.extended_get(1).await.unwrap().is_none());
}

#[tokio::test]
async fn extended_upsert_requires_a_field() {
    let fixture = FixtureLibrary::new();
    fixture.add_book(&BookSpec::titled("The Odyssey", "Homer"));
    let engine = fixture.engine();

    let err = engine
        .userdata()
        .extended_upsert(1, None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
}
