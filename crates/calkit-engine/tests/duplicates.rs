//! Tests for duplicate detection.

mod common;

use calkit_engine::duplicates::DuplicateCriteria;
use common::{BookSpec, FixtureLibrary};

#[tokio::test]
async fn near_identical_titles_with_shared_author_group() {
    let fixture = FixtureLibrary::new();
    fixture.add_book(&BookSpec::titled("The Hobbit", "J. R. R. Tolkien"));
    fixture.add_book(&BookSpec::titled("Hobbit", "J. R. R. Tolkien"));
    fixture.add_book(&BookSpec::titled("The Silmarillion", "J. R. R. Tolkien"));
    let engine = fixture.engine();

    let groups = engine
        .duplicates()
        .find(&DuplicateCriteria::default())
        .await
        .unwrap();
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].members.len(), 2);
    assert!(!groups[0].matched_by_isbn);
    assert!(groups[0].similarity > 0.99);
    let mut titles = groups[0].titles();
    titles.sort();
    assert_eq!(titles, vec!["Hobbit", "The Hobbit"]);
}

#[tokio::test]
async fn author_overlap_gate_blocks_coincidental_titles() {
    let fixture = FixtureLibrary::new();
    fixture.add_book(&BookSpec::titled("Collected Poems", "W. B. Yeats"));
    fixture.add_book(&BookSpec::titled("Collected Poems", "Sylvia Plath"));
    let engine = fixture.engine();

    let strict = engine
        .duplicates()
        .find(&DuplicateCriteria::default())
        .await
        .unwrap();
    assert!(strict.is_empty());

    let loose = engine
        .duplicates()
        .find(&DuplicateCriteria {
            require_author_overlap: false,
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(loose.len(), 1);
}

#[tokio::test]
async fn identical_isbns_group_regardless_of_title() {
    let fixture = FixtureLibrary::new();
    fixture.add_book(&BookSpec {
        isbn: Some("9780140439083".into()),
        ..BookSpec::titled("A Study in Scarlet", "Arthur Conan Doyle")
    });
    fixture.add_book(&BookSpec {
        isbn: Some("9780140439083".into()),
        ..BookSpec::titled("Study in Scarlet (Annotated Edition)", "A. C. Doyle")
    });
    let engine = fixture.engine();

    let groups = engine
        .duplicates()
        .find(&DuplicateCriteria::default())
        .await
        .unwrap();
    assert_eq!(groups.len(), 1);
    assert!(groups[0].matched_by_isbn);
}

#[tokio::test]
async fn clean_library_reports_nothing() {
    let fixture = FixtureLibrary::new();
    fixture.add_book(&BookSpec::titled("Dune", "Frank Herbert"));
    fixture.add_book(&BookSpec::titled("Foundation", "Isaac Asimov"));
    let engine = fixture.engine();

    let groups = engine
        .duplicates()
        .find(&DuplicateCriteria::default())
        .await
        .unwrap();
    assert!(groups.is_empty());
}
