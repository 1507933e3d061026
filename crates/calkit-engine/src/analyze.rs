//! Library analysis: tag statistics, series completeness, health checks,
//! unread priorities and reading statistics.

use calkit::{CalibreClient, HealthCounts, SearchQuery, Tag};
use chrono::Utc;
use serde::Serialize;

use crate::Result;

/// Scan cap for analysis passes.
const SCAN_LIMIT: i64 = 100_000;

/// Tag usage analysis.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TagStatistics {
    pub total_tags: i64,
    /// Most used tags, descending.
    pub top: Vec<Tag>,
    /// Tags used by exactly one book.
    pub singletons: i64,
    /// Tags used by no book at all.
    pub unused: i64,
}

/// Completeness report for one series.
#[derive(Debug, Clone, Serialize)]
pub struct SeriesGaps {
    pub series_id: i64,
    pub series: String,
    /// Books present in the series.
    pub have: usize,
    /// Highest series position seen.
    pub max_index: i64,
    /// Whole-number positions missing below `max_index`.
    pub missing: Vec<i64>,
}

/// Library health summary derived from [`HealthCounts`].
#[derive(Debug, Clone, Serialize)]
pub struct LibraryHealth {
    pub counts: HealthCounts,
    /// 0-100; percentage of books free of any tracked problem class.
    pub score: i64,
}

/// A book suggested for reading, with its priority score.
#[derive(Debug, Clone, Serialize)]
pub struct UnreadCandidate {
    pub book_id: i64,
    pub title: String,
    pub authors: Vec<String>,
    /// Days the book has been sitting in the library.
    pub days_shelved: i64,
}

/// Acquisition-pace statistics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReadingStats {
    pub total_books: i64,
    pub rated_books: i64,
    /// Mean rating in stars across rated books.
    pub average_stars: Option<f64>,
    pub added_last_30_days: i64,
    pub added_last_365_days: i64,
}

/// Analysis workflow engine.
#[derive(Debug)]
pub struct AnalyzeEngine<'a> {
    client: &'a CalibreClient,
}

impl<'a> AnalyzeEngine<'a> {
    pub(crate) fn new(client: &'a CalibreClient) -> Self {
        Self { client }
    }

    /// Tag usage breakdown.
    pub async fn tag_statistics(&self, top: usize) -> Result<TagStatistics> {
        let tags = self
            .client
            .database()?
            .catalog()
            .tags(SCAN_LIMIT, 0)
            .await?;

        let singletons = tags.iter().filter(|t| t.book_count == 1).count() as i64;
        let unused = tags.iter().filter(|t| t.book_count == 0).count() as i64;
        let mut by_count = tags.clone();
        by_count.sort_by(|a, b| b.book_count.cmp(&a.book_count));
        by_count.truncate(top);

        Ok(TagStatistics {
            total_tags: tags.len() as i64,
            top: by_count,
            singletons,
            unused,
        })
    }

    /// Find series with missing whole-number positions.
    pub async fn series_analysis(&self) -> Result<Vec<SeriesGaps>> {
        let db = self.client.database()?;
        let all_series = db.catalog().series(SCAN_LIMIT, 0).await?;

        let mut reports = Vec::new();
        for series in all_series {
            let page = db.books().by_series(series.id, SCAN_LIMIT, 0).await?;
            let indices: Vec<f64> = page.books.iter().filter_map(|b| b.series_index).collect();
            let missing = missing_indices(&indices);
            let max_index = indices.iter().fold(0f64, |m, &i| m.max(i)) as i64;
            if !missing.is_empty() {
                reports.push(SeriesGaps {
                    series_id: series.id,
                    series: series.name,
                    have: page.books.len(),
                    max_index,
                    missing,
                });
            }
        }
        Ok(reports)
    }

    /// Health counts plus a single score out of 100.
    pub async fn library_health(&self) -> Result<LibraryHealth> {
        let counts = self.client.database()?.stats().health_counts().await?;
        Ok(LibraryHealth {
            score: health_score(&counts),
            counts,
        })
    }

    /// Unrated books ranked by how long they have been shelved.
    ///
    /// A missing rating is the closest signal the schema has for "unread";
    /// the longest-waiting books come first.
    pub async fn unread_priority(&self, limit: usize) -> Result<Vec<UnreadCandidate>> {
        let mut query = SearchQuery::new();
        query.unrated = true;
        query.limit = SCAN_LIMIT;
        let page = self.client.database()?.books().search(&query).await?;

        let now = Utc::now();
        let mut candidates: Vec<UnreadCandidate> = page
            .books
            .iter()
            .map(|book| UnreadCandidate {
                book_id: book.id,
                title: book.title.clone(),
                authors: book.authors.clone(),
                days_shelved: book
                    .added
                    .map(|added| (now - added).num_days())
                    .unwrap_or(0),
            })
            .collect();
        candidates.sort_by(|a, b| b.days_shelved.cmp(&a.days_shelved));
        candidates.truncate(limit);
        Ok(candidates)
    }

    /// Rating coverage and acquisition pace.
    pub async fn reading_stats(&self) -> Result<ReadingStats> {
        let db = self.client.database()?;
        let stats = db.stats().library_stats(0).await?;

        let rated_books: i64 = stats.rating_counts.iter().map(|(_, n)| n).sum();
        let rating_sum: i64 = stats.rating_counts.iter().map(|(r, n)| r * n).sum();
        let average_stars = if rated_books > 0 {
            Some(rating_sum as f64 / rated_books as f64 / 2.0)
        } else {
            None
        };

        let today = Utc::now().date_naive();
        let db_ref = &db;
        let added_since = |days: i64| async move {
            let mut query = SearchQuery::new();
            query.added_after = Some(today - chrono::Duration::days(days));
            query.limit = 1;
            Ok::<_, crate::Error>(db_ref.books().search(&query).await?.total)
        };

        Ok(ReadingStats {
            total_books: stats.total_books,
            rated_books,
            average_stars,
            added_last_30_days: added_since(30).await?,
            added_last_365_days: added_since(365).await?,
        })
    }
}

/// Whole-number series positions missing below the highest one present.
fn missing_indices(indices: &[f64]) -> Vec<i64> {
    let max = indices.iter().fold(0f64, |m, &i| m.max(i));
    if max < 2.0 {
        return Vec::new();
    }
    let have: Vec<i64> = indices.iter().map(|&i| i.round() as i64).collect();
    (1..=max.round() as i64)
        .filter(|n| !have.contains(n))
        .collect()
}

/// Percentage of books free of every tracked problem (coarse: takes the
/// worst single problem class).
fn health_score(counts: &HealthCounts) -> i64 {
    if counts.total_books == 0 {
        return 100;
    }
    let worst = [
        counts.without_authors,
        counts.without_formats,
        counts.without_cover,
        counts.with_empty_comments,
    ]
    .into_iter()
    .max()
    .unwrap_or(0);
    (100 * (counts.total_books - worst).max(0)) / counts.total_books
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_indices_finds_gaps() {
        assert_eq!(missing_indices(&[1.0, 2.0, 4.0]), vec![3]);
        assert_eq!(missing_indices(&[2.0, 5.0]), vec![1, 3, 4]);
        assert_eq!(missing_indices(&[1.0, 2.0, 3.0]), Vec::<i64>::new());
        // A lone volume is not a gap.
        assert_eq!(missing_indices(&[1.0]), Vec::<i64>::new());
        assert_eq!(missing_indices(&[]), Vec::<i64>::new());
    }

    #[test]
    fn half_indices_round() {
        assert_eq!(missing_indices(&[1.0, 1.5, 3.0]), vec![2]);
    }

    #[test]
    fn health_score_bounds() {
        let mut counts = HealthCounts::default();
        assert_eq!(health_score(&counts), 100);
        counts.total_books = 10;
        counts.without_cover = 5;
        assert_eq!(health_score(&counts), 50);
        counts.without_authors = 10;
        assert_eq!(health_score(&counts), 0);
    }
}
