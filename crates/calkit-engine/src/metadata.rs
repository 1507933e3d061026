//! Metadata editing, tag grooming and consistency fixes.
//!
//! Field updates go through `calibredb set_metadata` so Calibre's own
//! bookkeeping (sort fields, search index, modification times) stays
//! consistent. The scanning halves of `organize_tags` and `fix_issues` read
//! the database directly and are side-effect free unless `apply` is set.

use calkit::{BookDetails, CalibreClient, SearchQuery};
use serde::Serialize;

use crate::{Error, Result};

/// Similarity above which two tag names are considered near-duplicates.
const TAG_SIMILARITY_THRESHOLD: f64 = 0.85;

/// Scan cap for consistency passes.
const SCAN_LIMIT: i64 = 100_000;

/// A typed metadata update; unset fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct MetadataUpdate {
    pub title: Option<String>,
    /// Ampersand-separated author names.
    pub authors: Option<String>,
    /// Replaces the full tag list.
    pub tags: Option<Vec<String>>,
    pub publisher: Option<String>,
    /// Rating in stars (0-5); 0 clears.
    pub rating: Option<i64>,
    pub series: Option<String>,
    pub series_index: Option<f64>,
    pub comments: Option<String>,
    pub isbn: Option<String>,
}

impl MetadataUpdate {
    /// True when no field is set.
    pub fn is_empty(&self) -> bool {
        self.to_fields().is_empty()
    }

    /// Render as `calibredb set_metadata --field` pairs.
    pub fn to_fields(&self) -> Vec<(String, String)> {
        let mut fields = Vec::new();
        let mut push = |name: &str, value: Option<String>| {
            if let Some(value) = value {
                fields.push((name.to_string(), value));
            }
        };
        push("title", self.title.clone());
        push("authors", self.authors.clone());
        push("tags", self.tags.as_ref().map(|t| t.join(",")));
        push("publisher", self.publisher.clone());
        // Calibre's CLI takes stars here, unlike the raw 0-10 column.
        push("rating", self.rating.map(|r| r.to_string()));
        push("series", self.series.clone());
        push("series_index", self.series_index.map(|i| i.to_string()));
        push("comments", self.comments.clone());
        push("isbn", self.isbn.clone());
        fields
    }
}

/// A group of near-duplicate tags proposed for merging.
#[derive(Debug, Clone, Serialize)]
pub struct TagMergeGroup {
    /// The tag kept (highest book count wins).
    pub keep: String,
    pub keep_id: i64,
    /// Tags merged into `keep`.
    pub merge: Vec<String>,
    pub merge_ids: Vec<i64>,
    /// Lowest pairwise similarity inside the group.
    pub similarity: f64,
}

/// Report from a tag grooming pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TagOrganizeReport {
    pub groups: Vec<TagMergeGroup>,
    /// Number of tags merged away (0 on a dry run).
    pub merged: usize,
    pub dry_run: bool,
}

/// One detected metadata problem.
#[derive(Debug, Clone, Serialize)]
pub struct MetadataIssue {
    pub book_id: i64,
    pub field: String,
    pub problem: String,
    /// The replacement value, when the issue is auto-fixable.
    pub proposed: Option<String>,
}

/// Report from a consistency pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FixReport {
    pub issues: Vec<MetadataIssue>,
    /// Number of fixes applied (0 on a dry run).
    pub fixed: usize,
    pub dry_run: bool,
}

/// Metadata workflow engine.
#[derive(Debug)]
pub struct MetadataEngine<'a> {
    client: &'a CalibreClient,
}

impl<'a> MetadataEngine<'a> {
    pub(crate) fn new(client: &'a CalibreClient) -> Self {
        Self { client }
    }

    /// Full metadata for one book.
    pub async fn show(&self, book_id: i64) -> Result<BookDetails> {
        Ok(self.client.database()?.books().details(book_id).await?)
    }

    /// Apply a metadata update via `calibredb set_metadata`.
    pub async fn update(&self, book_id: i64, update: &MetadataUpdate) -> Result<()> {
        let fields = update.to_fields();
        if fields.is_empty() {
            return Err(Error::Validation(
                "metadata update has no fields set".to_string(),
            ));
        }
        if let Some(rating) = update.rating {
            if !(0..=5).contains(&rating) {
                return Err(Error::Validation(format!(
                    "rating must be 0-5 stars, got {}",
                    rating
                )));
            }
        }
        self.client.books().set_metadata(book_id, &fields).await?;
        Ok(())
    }

    /// Find near-duplicate tags; merge them when `apply` is set.
    ///
    /// Tags whose normalized names are within the similarity threshold are
    /// grouped; the most-used spelling survives.
    pub async fn organize_tags(&self, apply: bool) -> Result<TagOrganizeReport> {
        let catalog = self.client.database()?.catalog();
        let tags = catalog.tags(SCAN_LIMIT, 0).await?;

        let mut groups: Vec<Vec<usize>> = Vec::new();
        for (idx, tag) in tags.iter().enumerate() {
            let mut placed = false;
            for group in &mut groups {
                let rep = &tags[group[0]];
                if tag_similarity(&rep.name, &tag.name) >= TAG_SIMILARITY_THRESHOLD {
                    group.push(idx);
                    placed = true;
                    break;
                }
            }
            if !placed {
                groups.push(vec![idx]);
            }
        }

        let mut report = TagOrganizeReport {
            dry_run: !apply,
            ..Default::default()
        };
        for group in groups.into_iter().filter(|g| g.len() > 1) {
            let mut members: Vec<_> = group.iter().map(|&i| &tags[i]).collect();
            members.sort_by(|a, b| {
                b.book_count
                    .cmp(&a.book_count)
                    .then_with(|| a.name.len().cmp(&b.name.len()))
            });
            let keep = members[0];
            let similarity = members[1..]
                .iter()
                .map(|t| tag_similarity(&keep.name, &t.name))
                .fold(f64::INFINITY, f64::min);

            report.groups.push(TagMergeGroup {
                keep: keep.name.clone(),
                keep_id: keep.id,
                merge: members[1..].iter().map(|t| t.name.clone()).collect(),
                merge_ids: members[1..].iter().map(|t| t.id).collect(),
                similarity,
            });
        }

        if apply {
            for group in &report.groups {
                for &tag_id in &group.merge_ids {
                    catalog.rename_tag(tag_id, &group.keep).await?;
                    report.merged += 1;
                }
            }
        }

        Ok(report)
    }

    /// Scan for metadata problems; fix the auto-fixable ones when `apply`.
    ///
    /// Detected: whitespace-damaged titles (fixed), missing author sort
    /// (fixed), malformed ISBNs (reported only).
    pub async fn fix_issues(&self, apply: bool) -> Result<FixReport> {
        let mut query = SearchQuery::new();
        query.limit = SCAN_LIMIT;
        let page = self.client.database()?.books().search(&query).await?;

        let mut report = FixReport {
            dry_run: !apply,
            ..Default::default()
        };

        for book in &page.books {
            let collapsed = collapse_whitespace(&book.title);
            if collapsed != book.title {
                report.issues.push(MetadataIssue {
                    book_id: book.id,
                    field: "title".to_string(),
                    problem: "stray whitespace in title".to_string(),
                    proposed: Some(collapsed),
                });
            }

            let sort_missing = book
                .author_sort
                .as_deref()
                .map(|s| s.trim().is_empty())
                .unwrap_or(true);
            if sort_missing && !book.authors.is_empty() {
                report.issues.push(MetadataIssue {
                    book_id: book.id,
                    field: "author_sort".to_string(),
                    problem: "author sort missing".to_string(),
                    proposed: Some(author_sort_for(&book.authors[0])),
                });
            }

            if let Some(isbn) = &book.isbn {
                if !is_valid_isbn(isbn) {
                    report.issues.push(MetadataIssue {
                        book_id: book.id,
                        field: "isbn".to_string(),
                        problem: format!("ISBN '{}' fails checksum", isbn),
                        proposed: None,
                    });
                }
            }
        }

        if apply {
            for issue in &report.issues {
                let Some(value) = &issue.proposed else { continue };
                self.client
                    .books()
                    .set_metadata(issue.book_id, &[(issue.field.clone(), value.clone())])
                    .await?;
                report.fixed += 1;
            }
        }

        Ok(report)
    }
}

/// Similarity of two tag names after normalization.
fn tag_similarity(a: &str, b: &str) -> f64 {
    strsim::normalized_levenshtein(&normalize_tag(a), &normalize_tag(b))
}

/// Lowercase, trim, and collapse separators for tag comparison.
fn normalize_tag(name: &str) -> String {
    name.to_lowercase()
        .replace(['-', '_'], " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Build Calibre's "Last, First" sort form for one author name.
fn author_sort_for(name: &str) -> String {
    let parts: Vec<&str> = name.split_whitespace().collect();
    match parts.split_last() {
        Some((last, rest)) if !rest.is_empty() => format!("{}, {}", last, rest.join(" ")),
        _ => name.to_string(),
    }
}

/// Validate ISBN-10 or ISBN-13 (hyphens/spaces ignored).
fn is_valid_isbn(raw: &str) -> bool {
    let digits: String = raw.chars().filter(|c| !matches!(c, '-' | ' ')).collect();
    match digits.len() {
        10 => {
            let mut sum = 0u32;
            for (i, c) in digits.chars().enumerate() {
                let value = match c {
                    '0'..='9' => c as u32 - '0' as u32,
                    'X' | 'x' if i == 9 => 10,
                    _ => return false,
                };
                sum += value * (10 - i as u32);
            }
            sum % 11 == 0
        }
        13 => {
            let mut sum = 0u32;
            for (i, c) in digits.chars().enumerate() {
                let Some(value) = c.to_digit(10) else {
                    return false;
                };
                sum += value * if i % 2 == 0 { 1 } else { 3 };
            }
            sum % 10 == 0
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_renders_only_set_fields() {
        let update = MetadataUpdate {
            title: Some("New Title".into()),
            rating: Some(4),
            tags: Some(vec!["a".into(), "b".into()]),
            ..Default::default()
        };
        assert_eq!(
            update.to_fields(),
            vec![
                ("title".to_string(), "New Title".to_string()),
                ("tags".to_string(), "a,b".to_string()),
                ("rating".to_string(), "4".to_string()),
            ]
        );
        assert!(MetadataUpdate::default().is_empty());
    }

    #[test]
    fn tag_normalization_unifies_separators() {
        assert_eq!(normalize_tag("Science-Fiction"), "science fiction");
        assert_eq!(normalize_tag("  science_fiction "), "science fiction");
        assert!(tag_similarity("SciFi", "Sci-Fi") > 0.8);
    }

    #[test]
    fn author_sort_moves_last_name_first() {
        assert_eq!(author_sort_for("Arthur Conan Doyle"), "Doyle, Arthur Conan");
        assert_eq!(author_sort_for("Plato"), "Plato");
    }

    #[test]
    fn isbn_checksums() {
        assert!(is_valid_isbn("0-306-40615-2"));
        assert!(is_valid_isbn("978-0-306-40615-7"));
        assert!(is_valid_isbn("080442957X"));
        assert!(!is_valid_isbn("0-306-40615-1"));
        assert!(!is_valid_isbn("978-0-306-40615-8"));
        assert!(!is_valid_isbn("12345"));
    }

    #[test]
    fn whitespace_collapse() {
        assert_eq!(collapse_whitespace("  A   Study  "), "A Study");
        assert_eq!(collapse_whitespace("Clean"), "Clean");
    }
}
