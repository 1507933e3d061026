//! Duplicate book detection.
//!
//! Books are compared pairwise on normalized titles (similarity ratio) with
//! author or ISBN corroboration. The scan is O(n²) over the title index,
//! which holds up to the size libraries actually reach; the index rows are
//! three strings each.
//!
//! # Example
//!
//! ```no_run
//! use calkit_engine::Engine;
//! use calkit_engine::duplicates::DuplicateCriteria;
//!
//! # async fn example() -> calkit_engine::Result<()> {
//! let engine = Engine::new("/books");
//!
//! let groups = engine.duplicates().find(&DuplicateCriteria::default()).await?;
//! for group in &groups {
//!     println!("{:?} look like the same book", group.titles());
//! }
//! # Ok(())
//! # }
//! ```

use calkit::CalibreClient;
use serde::Serialize;

use crate::Result;

/// Tuning knobs for duplicate detection.
#[derive(Debug, Clone)]
pub struct DuplicateCriteria {
    /// Normalized-title similarity at or above which two books may be
    /// duplicates.
    pub min_title_similarity: f64,
    /// Require at least one shared author (ISBN matches bypass this).
    pub require_author_overlap: bool,
}

impl Default for DuplicateCriteria {
    fn default() -> Self {
        Self {
            min_title_similarity: 0.85,
            require_author_overlap: true,
        }
    }
}

/// One book inside a duplicate group.
#[derive(Debug, Clone, Serialize)]
pub struct DuplicateMember {
    pub book_id: i64,
    pub title: String,
    pub authors: String,
}

/// A group of books that look like the same work.
#[derive(Debug, Clone, Serialize)]
pub struct DuplicateGroup {
    pub members: Vec<DuplicateMember>,
    /// Lowest title similarity against the group's first member.
    pub similarity: f64,
    /// True when the group was formed by identical ISBNs.
    pub matched_by_isbn: bool,
}

impl DuplicateGroup {
    /// Member titles, for display.
    pub fn titles(&self) -> Vec<&str> {
        self.members.iter().map(|m| m.title.as_str()).collect()
    }
}

/// Duplicate detection engine.
#[derive(Debug)]
pub struct DuplicateEngine<'a> {
    client: &'a CalibreClient,
}

impl<'a> DuplicateEngine<'a> {
    pub(crate) fn new(client: &'a CalibreClient) -> Self {
        Self { client }
    }

    /// Scan the library for likely duplicates.
    pub async fn find(&self, criteria: &DuplicateCriteria) -> Result<Vec<DuplicateGroup>> {
        let entries = self.client.database()?.books().title_index().await?;

        struct Candidate {
            id: i64,
            title: String,
            authors: String,
            normalized: String,
            author_set: Vec<String>,
            isbn: Option<String>,
        }

        let candidates: Vec<Candidate> = entries
            .into_iter()
            .map(|e| Candidate {
                normalized: normalize_title(&e.title),
                author_set: author_set(&e.authors),
                id: e.id,
                title: e.title,
                authors: e.authors,
                isbn: e.isbn,
            })
            .collect();

        // Greedy grouping: each book joins the first group whose
        // representative it matches, else starts its own.
        let mut groups: Vec<(Vec<usize>, f64, bool)> = Vec::new();
        for (idx, candidate) in candidates.iter().enumerate() {
            let mut placed = false;
            for (members, worst_sim, by_isbn) in &mut groups {
                let rep = &candidates[members[0]];

                let isbn_match = match (&rep.isbn, &candidate.isbn) {
                    (Some(a), Some(b)) => a == b,
                    _ => false,
                };
                if isbn_match {
                    members.push(idx);
                    *by_isbn = true;
                    placed = true;
                    break;
                }

                let similarity =
                    strsim::normalized_levenshtein(&rep.normalized, &candidate.normalized);
                if similarity >= criteria.min_title_similarity {
                    let authors_ok = !criteria.require_author_overlap
                        || rep.author_set.iter().any(|a| candidate.author_set.contains(a))
                        || rep.author_set.is_empty()
                        || candidate.author_set.is_empty();
                    if authors_ok {
                        members.push(idx);
                        *worst_sim = worst_sim.min(similarity);
                        placed = true;
                        break;
                    }
                }
            }
            if !placed {
                groups.push((vec![idx], 1.0, false));
            }
        }

        Ok(groups
            .into_iter()
            .filter(|(members, _, _)| members.len() > 1)
            .map(|(members, similarity, matched_by_isbn)| DuplicateGroup {
                members: members
                    .into_iter()
                    .map(|i| DuplicateMember {
                        book_id: candidates[i].id,
                        title: candidates[i].title.clone(),
                        authors: candidates[i].authors.clone(),
                    })
                    .collect(),
                similarity,
                matched_by_isbn,
            })
            .collect())
    }
}

/// Normalize a title for comparison: lowercase, strip punctuation, collapse
/// whitespace, drop a leading article.
fn normalize_title(title: &str) -> String {
    let lowered: String = title
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    let mut words: Vec<&str> = lowered.split_whitespace().collect();
    if words.len() > 1 && matches!(words[0], "the" | "a" | "an") {
        words.remove(0);
    }
    words.join(" ")
}

/// Split an ampersand-joined author string into a lowercase set.
fn author_set(authors: &str) -> Vec<String> {
    authors
        .split('&')
        .map(|a| a.trim().to_lowercase())
        .filter(|a| !a.is_empty())
        .collect()
}
