//! Tests for multi-library discovery and statistics.

mod common;

use calkit_engine::{Engine, Error};
use common::{BookSpec, FixtureLibrary, init_bare_library};
use tempfile::TempDir;

#[tokio::test]
async fn discover_finds_libraries_under_base_dir() {
    let base = TempDir::new().unwrap();
    init_bare_library(&base.path().join("alpha"));
    init_bare_library(&base.path().join("beta"));
    std::fs::create_dir_all(base.path().join("not-a-library")).unwrap();

    let engine = Engine::new(base.path().join("alpha"));
    let libraries = engine.libraries().discover(base.path()).await.unwrap();

    assert_eq!(libraries.len(), 2);
    assert_eq!(libraries[0].name, "alpha");
    assert!(libraries[0].current);
    assert_eq!(libraries[1].name, "beta");
    assert!(!libraries[1].current);
    assert_eq!(libraries[0].book_count, Some(0));
}

#[tokio::test]
async fn discover_includes_current_library_from_elsewhere() {
    let base = TempDir::new().unwrap();
    let fixture = FixtureLibrary::new();
    fixture.add_book(&BookSpec::titled("Dune", "Frank Herbert"));

    let engine = fixture.engine();
    // Base dir holds no libraries, but the active one still shows up.
    let err = Engine::new(base.path().join("missing"))
        .libraries()
        .discover(base.path())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NoLibrariesFound(_)));

    let libraries = engine.libraries().discover(base.path()).await.unwrap();
    assert_eq!(libraries.len(), 1);
    assert!(libraries[0].current);
    assert_eq!(libraries[0].book_count, Some(1));
}

#[tokio::test]
async fn current_describes_the_active_library() {
    let fixture = FixtureLibrary::new();
    fixture.add_book(&BookSpec::titled("Dune", "Frank Herbert"));
    let engine = fixture.engine();

    let info = engine.libraries().current().await.unwrap();
    assert!(info.current);
    assert_eq!(info.book_count, Some(1));
}

#[tokio::test]
async fn stats_summarize_the_active_library() {
    let fixture = FixtureLibrary::new();
    fixture.add_book(&BookSpec {
        tags: vec!["fiction".into()],
        rating_stars: Some(4),
        formats: vec![("EPUB".into(), 1000)],
        ..BookSpec::titled("Dune", "Frank Herbert")
    });
    fixture.add_book(&BookSpec::titled("Foundation", "Isaac Asimov"));
    let engine = fixture.engine();

    let stats = engine.libraries().stats().await.unwrap();
    assert_eq!(stats.total_books, 2);
    assert_eq!(stats.total_authors, 2);
    assert_eq!(stats.format_counts, vec![("EPUB".to_string(), 1)]);
    assert_eq!(stats.rating_counts, vec![(8, 1)]);
}
