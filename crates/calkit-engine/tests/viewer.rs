//! Tests for viewer sessions, using a real CBZ fixture.

mod common;

use std::io::Write;

use calkit_engine::Error;
use common::{BookSpec, FixtureLibrary};
use zip::write::SimpleFileOptions;

/// Replace the seeded CBZ stub with a real zip holding comic pages.
fn write_cbz(fixture: &FixtureLibrary, title: &str, entries: &[(&str, &[u8])]) {
    let path = fixture.format_file(title, "cbz");
    let file = std::fs::File::create(path).unwrap();
    let mut writer = zip::ZipWriter::new(file);
    for (name, bytes) in entries {
        writer
            .start_file(name.to_string(), SimpleFileOptions::default())
            .unwrap();
        writer.write_all(bytes).unwrap();
    }
    writer.finish().unwrap();
}

fn comic_fixture() -> FixtureLibrary {
    let fixture = FixtureLibrary::new();
    fixture.add_book(&BookSpec {
        formats: vec![("CBZ".into(), 4096)],
        ..BookSpec::titled("One Punch", "Saitama")
    });
    write_cbz(
        &fixture,
        "One Punch",
        &[
            ("pages/002.png", b"page-two".as_slice()),
            ("pages/001.png", b"page-one".as_slice()),
            ("pages/003.png", b"page-three".as_slice()),
            ("ComicInfo.xml", b"<ComicInfo/>".as_slice()),
        ],
    );
    fixture
}

#[tokio::test]
async fn open_lists_pages_in_order() {
    let fixture = comic_fixture();
    let engine = fixture.engine();

    let info = engine.viewer().open(1, None).await.unwrap();
    assert_eq!(info.book_id, 1);
    assert_eq!(info.format, "CBZ");
    assert_eq!(info.page_count, 3);
    assert!(info.paginated);
    assert_eq!(info.state.page, 0);
}

#[tokio::test]
async fn get_page_extracts_bytes_and_tracks_progress() {
    let fixture = comic_fixture();
    let engine = fixture.engine();

    let info = engine.viewer().open(1, None).await.unwrap();
    let page = engine.viewer().get_page(&info.session_id, 1).await.unwrap();
    assert_eq!(page.index, 1);
    assert_eq!(page.name, "pages/002.png");
    assert_eq!(std::fs::read(&page.path).unwrap(), b"page-two");

    let state = engine.viewer().get_state(&info.session_id).unwrap();
    assert_eq!(state.state.page, 1);

    let err = engine
        .viewer()
        .get_page(&info.session_id, 7)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::PageOutOfRange { page: 7, pages: 3 }));
}

#[tokio::test]
async fn update_state_clamps() {
    let fixture = comic_fixture();
    let engine = fixture.engine();

    let info = engine.viewer().open(1, None).await.unwrap();
    let state = engine
        .viewer()
        .update_state(&info.session_id, Some(99), Some(100.0))
        .unwrap();
    assert_eq!(state.page, 2);
    assert!((state.zoom - 8.0).abs() < f64::EPSILON);

    let state = engine
        .viewer()
        .update_state(&info.session_id, None, Some(0.0))
        .unwrap();
    assert!((state.zoom - 0.1).abs() < f64::EPSILON);
}

#[tokio::test]
async fn close_ends_the_session() {
    let fixture = comic_fixture();
    let engine = fixture.engine();

    let info = engine.viewer().open(1, None).await.unwrap();
    assert!(engine.viewer().close(&info.session_id));
    assert!(!engine.viewer().close(&info.session_id));

    let err = engine.viewer().get_state(&info.session_id).unwrap_err();
    assert!(matches!(err, Error::SessionNotFound(_)));
}

#[tokio::test]
async fn sessions_survive_engine_clones() {
    let fixture = comic_fixture();
    let engine = fixture.engine();

    let info = engine.viewer().open(1, None).await.unwrap();
    let clone = engine.clone();
    assert!(clone.viewer().get_state(&info.session_id).is_ok());
}

#[tokio::test]
async fn cbr_is_rejected() {
    let fixture = FixtureLibrary::new();
    fixture.add_book(&BookSpec {
        formats: vec![("CBR".into(), 4096)],
        ..BookSpec::titled("Rar Comic", "Someone")
    });
    let engine = fixture.engine();

    let err = engine.viewer().open(1, Some("cbr")).await.unwrap_err();
    assert!(matches!(err, Error::UnsupportedViewerFormat(_)));
}

#[tokio::test]
async fn unpaginated_formats_open_without_pages() {
    let fixture = FixtureLibrary::new();
    fixture.add_book(&BookSpec {
        formats: vec![("PDF".into(), 4096)],
        ..BookSpec::titled("Plain PDF", "Someone")
    });
    let engine = fixture.engine();

    let info = engine.viewer().open(1, None).await.unwrap();
    assert!(!info.paginated);
    assert_eq!(info.page_count, 0);

    let err = engine
        .viewer()
        .get_page(&info.session_id, 0)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::UnsupportedViewerFormat(_)));
}

#[tokio::test]
async fn open_random_picks_something() {
    let fixture = comic_fixture();
    let engine = fixture.engine();

    let info = engine.viewer().open_random().await.unwrap();
    assert_eq!(info.book_id, 1);
}
