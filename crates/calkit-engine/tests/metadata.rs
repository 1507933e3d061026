//! Tests for metadata workflow operations.

mod common;

use calkit_engine::Error;
use calkit_engine::metadata::MetadataUpdate;
use common::{BookSpec, FixtureLibrary};

#[tokio::test]
async fn update_rejects_empty_and_bad_ratings() {
    let fixture = FixtureLibrary::new();
    fixture.add_book(&BookSpec::titled("Dune", "Frank Herbert"));
    let engine = fixture.engine();

    let err = engine
        .metadata()
        .update(1, &MetadataUpdate::default())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)));

    let err = engine
        .metadata()
        .update(
            1,
            &MetadataUpdate {
                rating: Some(11),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
}

#[tokio::test]
async fn organize_tags_groups_near_duplicates() {
    let fixture = FixtureLibrary::new();
    fixture.add_book(&BookSpec {
        tags: vec!["Science Fiction".into()],
        ..BookSpec::titled("Dune", "Frank Herbert")
    });
    fixture.add_book(&BookSpec {
        tags: vec!["Science Fiction".into()],
        ..BookSpec::titled("Dune Messiah", "Frank Herbert")
    });
    fixture.add_book(&BookSpec {
        tags: vec!["Science-Fiction".into(), "History".into()],
        ..BookSpec::titled("Foundation", "Isaac Asimov")
    });
    let engine = fixture.engine();

    let report = engine.metadata().organize_tags(false).await.unwrap();
    assert!(report.dry_run);
    assert_eq!(report.merged, 0);
    assert_eq!(report.groups.len(), 1);
    let group = &report.groups[0];
    // The more-used spelling survives.
    assert_eq!(group.keep, "Science Fiction");
    assert_eq!(group.merge, vec!["Science-Fiction".to_string()]);
    assert!(group.similarity > 0.99);
}

#[tokio::test]
async fn organize_tags_apply_merges_in_database() {
    let fixture = FixtureLibrary::new();
    fixture.add_book(&BookSpec {
        tags: vec!["Science Fiction".into()],
        ..BookSpec::titled("Dune", "Frank Herbert")
    });
    fixture.add_book(&BookSpec {
        tags: vec!["Science-Fiction".into()],
        ..BookSpec::titled("Foundation", "Isaac Asimov")
    });
    let engine = fixture.engine();

    let report = engine.metadata().organize_tags(true).await.unwrap();
    assert_eq!(report.merged, 1);

    let catalog = engine.client().database().unwrap().catalog();
    let survivor = catalog.tag_by_name("Science Fiction").await.unwrap().unwrap();
    assert_eq!(survivor.book_count, 2);
    assert!(catalog.tag_by_name("Science-Fiction").await.unwrap().is_none());
}

#[tokio::test]
async fn fix_issues_detects_problems_without_touching_anything() {
    let fixture = FixtureLibrary::new();
    fixture.add_book(&BookSpec {
        title: "  Messy   Title ".into(),
        authors: vec!["Jane Doe".into()],
        author_sort: Some("Doe, Jane".into()),
        ..Default::default()
    });
    fixture.add_book(&BookSpec {
        title: "No Sort".into(),
        authors: vec!["Arthur Conan Doyle".into()],
        author_sort: None,
        ..Default::default()
    });
    fixture.add_book(&BookSpec {
        isbn: Some("0-306-40615-1".into()),
        ..BookSpec::titled("Bad ISBN", "Someone")
    });
    fixture.add_book(&BookSpec {
        isbn: Some("978-0-306-40615-7".into()),
        ..BookSpec::titled("Fine Book", "Someone Else")
    });
    let engine = fixture.engine();

    let report = engine.metadata().fix_issues(false).await.unwrap();
    assert!(report.dry_run);
    assert_eq!(report.fixed, 0);

    let fields: Vec<(&i64, &str)> = report
        .issues
        .iter()
        .map(|i| (&i.book_id, i.field.as_str()))
        .collect();
    assert!(fields.contains(&(&1, "title")));
    assert!(fields.contains(&(&2, "author_sort")));
    assert!(fields.contains(&(&3, "isbn")));
    // The clean book raises nothing.
    assert!(!report.issues.iter().any(|i| i.book_id == 4));

    let title_fix = report
        .issues
        .iter()
        .find(|i| i.field == "title")
        .unwrap();
    assert_eq!(title_fix.proposed.as_deref(), Some("Messy Title"));

    let sort_fix = report
        .issues
        .iter()
        .find(|i| i.field == "author_sort")
        .unwrap();
    assert_eq!(sort_fix.proposed.as_deref(), Some("Doyle, Arthur Conan"));
}
