//! Format conversion workflows over `ebook-convert`.

use std::path::{Path, PathBuf};

use calkit::CalibreClient;
use serde::Serialize;

use crate::{Error, Result};

/// Source format preference when the caller doesn't pick one. Earlier
/// entries convert with less loss.
const SOURCE_PREFERENCE: &[&str] = &["EPUB", "AZW3", "MOBI", "DOCX", "HTMLZ", "FB2", "PDF", "TXT"];

/// Report for one converted book.
#[derive(Debug, Clone, Serialize)]
pub struct ConvertReport {
    pub book_id: i64,
    /// The format the conversion read from.
    pub from_format: String,
    pub to_format: String,
    pub output: PathBuf,
    /// Whether the result was attached back onto the book.
    pub added_to_library: bool,
}

/// Report for a bulk conversion run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BulkConvertReport {
    pub converted: Vec<ConvertReport>,
    /// Books that failed, with the error message.
    pub failed: Vec<(i64, String)>,
}

/// Conversion workflow engine.
#[derive(Debug)]
pub struct ConvertEngine<'a> {
    client: &'a CalibreClient,
}

impl<'a> ConvertEngine<'a> {
    pub(crate) fn new(client: &'a CalibreClient) -> Self {
        Self { client }
    }

    /// Convert one book to `target_format`, writing into `output_dir`.
    ///
    /// The source file is picked by [`SOURCE_PREFERENCE`] unless
    /// `source_format` is given. With `add_to_library` the result is
    /// attached to the book via `calibredb add_format`.
    pub async fn book(
        &self,
        book_id: i64,
        target_format: &str,
        output_dir: &Path,
        source_format: Option<&str>,
        add_to_library: bool,
    ) -> Result<ConvertReport> {
        let target = target_format.to_uppercase();
        let details = self.client.database()?.books().details(book_id).await?;

        let available: Vec<String> = details.files.iter().map(|f| f.format.clone()).collect();
        let source = match source_format {
            Some(f) => {
                let f = f.to_uppercase();
                if !available.iter().any(|a| a.eq_ignore_ascii_case(&f)) {
                    return Err(Error::Client(calkit::Error::FormatNotFound {
                        book_id,
                        format: f,
                    }));
                }
                f
            }
            None => pick_source_format(&available).ok_or(Error::Client(
                calkit::Error::FormatNotFound {
                    book_id,
                    format: "any".to_string(),
                },
            ))?,
        };
        if source == target {
            return Err(Error::Validation(format!(
                "book {} already has a {} file",
                book_id, target
            )));
        }

        let input = self
            .client
            .database()?
            .books()
            .format_path(book_id, &source)
            .await?;

        std::fs::create_dir_all(output_dir)?;
        let output = output_dir.join(format!(
            "{}.{}",
            sanitize_file_stem(&details.book.title),
            target.to_lowercase()
        ));

        self.client.convert().file(&input, &output, &[]).await?;

        if add_to_library {
            self.client
                .books()
                .add_format(book_id, &output.to_string_lossy())
                .await?;
        }

        Ok(ConvertReport {
            book_id,
            from_format: source,
            to_format: target,
            output,
            added_to_library: add_to_library,
        })
    }

    /// Convert several books, collecting per-book failures instead of
    /// stopping at the first.
    pub async fn bulk(
        &self,
        book_ids: &[i64],
        target_format: &str,
        output_dir: &Path,
        add_to_library: bool,
    ) -> Result<BulkConvertReport> {
        let mut report = BulkConvertReport::default();
        for &book_id in book_ids {
            match self
                .book(book_id, target_format, output_dir, None, add_to_library)
                .await
            {
                Ok(converted) => report.converted.push(converted),
                Err(e) => report.failed.push((book_id, e.to_string())),
            }
        }
        Ok(report)
    }
}

/// Pick the best source format out of what the book has.
fn pick_source_format(available: &[String]) -> Option<String> {
    for preferred in SOURCE_PREFERENCE {
        if let Some(found) = available.iter().find(|a| a.eq_ignore_ascii_case(preferred)) {
            return Some(found.to_uppercase());
        }
    }
    available.first().map(|f| f.to_uppercase())
}

/// Make a title usable as a file stem.
fn sanitize_file_stem(title: &str) -> String {
    let cleaned: String = title
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == ' ' || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    let trimmed = cleaned.trim();
    if trimmed.is_empty() {
        "book".to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_preference_order() {
        let available = vec!["PDF".to_string(), "EPUB".to_string()];
        assert_eq!(pick_source_format(&available).as_deref(), Some("EPUB"));

        let available = vec!["pdf".to_string(), "txt".to_string()];
        assert_eq!(pick_source_format(&available).as_deref(), Some("PDF"));

        let available = vec!["CBZ".to_string()];
        assert_eq!(pick_source_format(&available).as_deref(), Some("CBZ"));

        assert_eq!(pick_source_format(&[]), None);
    }

    #[test]
    fn file_stems_are_safe() {
        assert_eq!(sanitize_file_stem("A Study: in/Scarlet?"), "A Study_ in_Scarlet_");
        assert_eq!(sanitize_file_stem("???"), "book");
    }
}
