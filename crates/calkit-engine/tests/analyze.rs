//! Tests for analysis workflow operations.

mod common;

use chrono::Utc;
use common::{BookSpec, FixtureLibrary};

#[tokio::test]
async fn tag_statistics_counts_usage() {
    let fixture = FixtureLibrary::new();
    fixture.add_book(&BookSpec {
        tags: vec!["mystery".into(), "classic".into()],
        ..BookSpec::titled("A", "X")
    });
    fixture.add_book(&BookSpec {
        tags: vec!["mystery".into()],
        ..BookSpec::titled("B", "X")
    });
    let engine = fixture.engine();

    let stats = engine.analyze().tag_statistics(1).await.unwrap();
    assert_eq!(stats.total_tags, 2);
    assert_eq!(stats.singletons, 1);
    assert_eq!(stats.top.len(), 1);
    assert_eq!(stats.top[0].name, "mystery");
    assert_eq!(stats.top[0].book_count, 2);
}

#[tokio::test]
async fn series_analysis_reports_gaps() {
    let fixture = FixtureLibrary::new();
    for index in [1.0, 2.0, 4.0] {
        fixture.add_book(&BookSpec {
            series: Some(("Foundation".into(), index)),
            ..BookSpec::titled(&format!("Foundation {}", index), "Isaac Asimov")
        });
    }
    for index in [1.0, 2.0] {
        fixture.add_book(&BookSpec {
            series: Some(("Complete".into(), index)),
            ..BookSpec::titled(&format!("Complete {}", index), "Someone")
        });
    }
    let engine = fixture.engine();

    let gaps = engine.analyze().series_analysis().await.unwrap();
    assert_eq!(gaps.len(), 1);
    assert_eq!(gaps[0].series, "Foundation");
    assert_eq!(gaps[0].have, 3);
    assert_eq!(gaps[0].max_index, 4);
    assert_eq!(gaps[0].missing, vec![3]);
}

#[tokio::test]
async fn library_health_scores_problem_books() {
    let fixture = FixtureLibrary::new();
    fixture.add_book(&BookSpec {
        formats: vec![("EPUB".into(), 10)],
        comments: Some("fine".into()),
        rating_stars: Some(4),
        tags: vec!["t".into()],
        has_cover: true,
        ..BookSpec::titled("Complete Book", "Author")
    });
    fixture.add_book(&BookSpec {
        title: "Bare Book".into(),
        ..Default::default()
    });
    let engine = fixture.engine();

    let health = engine.analyze().library_health().await.unwrap();
    assert_eq!(health.counts.total_books, 2);
    assert_eq!(health.counts.without_authors, 1);
    assert_eq!(health.counts.without_formats, 1);
    assert_eq!(health.counts.unrated, 1);
    assert_eq!(health.score, 50);
}

#[tokio::test]
async fn unread_priority_prefers_long_shelved_books() {
    let fixture = FixtureLibrary::new();
    fixture.add_book(&BookSpec {
        added: Some("2020-01-01 00:00:00+00:00".into()),
        ..BookSpec::titled("Old Unread", "A")
    });
    fixture.add_book(&BookSpec {
        added: Some("2024-01-01 00:00:00+00:00".into()),
        ..BookSpec::titled("New Unread", "B")
    });
    fixture.add_book(&BookSpec {
        rating_stars: Some(5),
        ..BookSpec::titled("Already Read", "C")
    });
    let engine = fixture.engine();

    let candidates = engine.analyze().unread_priority(10).await.unwrap();
    assert_eq!(candidates.len(), 2);
    assert_eq!(candidates[0].title, "Old Unread");
    assert!(candidates[0].days_shelved > candidates[1].days_shelved);
}

#[tokio::test]
async fn reading_stats_cover_ratings_and_recency() {
    let fixture = FixtureLibrary::new();
    fixture.add_book(&BookSpec {
        rating_stars: Some(4),
        ..BookSpec::titled("Rated A", "X")
    });
    fixture.add_book(&BookSpec {
        rating_stars: Some(2),
        ..BookSpec::titled("Rated B", "X")
    });
    let recent = Utc::now() - chrono::Duration::days(3);
    fixture.add_book(&BookSpec {
        added: Some(recent.format("%Y-%m-%d %H:%M:%S+00:00").to_string()),
        ..BookSpec::titled("Fresh Arrival", "Y")
    });
    let engine = fixture.engine();

    let stats = engine.analyze().reading_stats().await.unwrap();
    assert_eq!(stats.total_books, 3);
    assert_eq!(stats.rated_books, 2);
    assert_eq!(stats.average_stars, Some(3.0));
    assert_eq!(stats.added_last_30_days, 1);
    assert_eq!(stats.added_last_365_days, 1);
}
