//! Book operations via `calibredb`.
//!
//! All mutations go through here: Calibre keeps its own bookkeeping (file
//! layout, search index, modification times) consistent only when changes
//! are made with its tools.
//!
//! # Example
//!
//! ```no_run
//! use calkit::{CalibreClient, actions::AddOptions};
//!
//! # async fn example() -> calkit::Result<()> {
//! let client = CalibreClient::new("/books");
//!
//! let ids = client
//!     .books()
//!     .add(
//!         "/tmp/novel.epub",
//!         AddOptions {
//!             title: Some("A Study in Scarlet".into()),
//!             authors: Some("Arthur Conan Doyle".into()),
//!             ..Default::default()
//!         },
//!     )
//!     .await?;
//! println!("added: {:?}", ids);
//! # Ok(())
//! # }
//! ```

use crate::client::CalibreClient;
use crate::error::{Error, Result};
use crate::types::CliBook;

/// Fields passed to `calibredb add`.
#[derive(Debug, Clone, Default)]
pub struct AddOptions {
    pub title: Option<String>,
    /// Author string, `&`-separated for multiple authors.
    pub authors: Option<String>,
    /// Comma-separated tag list.
    pub tags: Option<String>,
    pub series: Option<String>,
    pub series_index: Option<f64>,
    pub isbn: Option<String>,
    /// Add even when Calibre considers the book a duplicate.
    pub allow_duplicates: bool,
}

/// Provides access to book operations backed by `calibredb`.
///
/// Obtained via [`CalibreClient::books()`].
#[derive(Debug)]
pub struct BookActions<'a> {
    pub(crate) client: &'a CalibreClient,
}

impl<'a> BookActions<'a> {
    /// Run a Calibre search expression, returning matching book ids.
    ///
    /// An expression that matches nothing returns an empty vec (calibredb
    /// reports this case as a failure; it is not one here).
    pub async fn search(&self, expression: &str, limit: Option<i64>) -> Result<Vec<i64>> {
        let mut args = vec!["search".to_string(), expression.to_string()];
        if let Some(limit) = limit {
            args.push("--limit".to_string());
            args.push(limit.to_string());
        }

        let output = match self.client.run_calibredb(&args).await {
            Ok(output) => output,
            Err(Error::CommandFailed { stderr, .. }) if stderr.contains("No books matched") => {
                return Ok(Vec::new());
            }
            Err(e) => return Err(e),
        };

        parse_id_list(&output.stdout)
    }

    /// List books as JSON via `calibredb list --for-machine`.
    pub async fn list(
        &self,
        search: Option<&str>,
        fields: &[&str],
        limit: Option<i64>,
    ) -> Result<Vec<CliBook>> {
        let mut args = vec![
            "list".to_string(),
            "--for-machine".to_string(),
            "--fields".to_string(),
            fields.join(","),
        ];
        if let Some(search) = search {
            args.push("--search".to_string());
            args.push(search.to_string());
        }
        if let Some(limit) = limit {
            args.push("--limit".to_string());
            args.push(limit.to_string());
        }

        let output = self.client.run_calibredb(&args).await?;
        Ok(serde_json::from_str(&output.stdout)?)
    }

    /// Add a book file to the library. Returns the new book ids.
    pub async fn add(&self, file_path: &str, options: AddOptions) -> Result<Vec<i64>> {
        let args = build_add_args(file_path, &options);
        let output = self.client.run_calibredb(&args).await?;
        parse_added_ids(&output.stdout)
    }

    /// Remove books by id.
    ///
    /// With `permanent` the files skip Calibre's recycle bin.
    pub async fn remove(&self, ids: &[i64], permanent: bool) -> Result<()> {
        let mut args = vec!["remove".to_string(), join_ids(ids)];
        if permanent {
            args.push("--permanent".to_string());
        }
        self.client.run_calibredb(&args).await?;
        Ok(())
    }

    /// Update metadata fields on a book via `calibredb set_metadata`.
    ///
    /// Field names are Calibre's (`title`, `authors`, `tags`, `publisher`,
    /// `rating`, `series`, `comments`, ...).
    pub async fn set_metadata(&self, book_id: i64, fields: &[(String, String)]) -> Result<()> {
        if fields.is_empty() {
            return Ok(());
        }
        let args = build_set_metadata_args(book_id, fields);
        self.client.run_calibredb(&args).await?;
        Ok(())
    }

    /// Attach a file to an existing book as a new format.
    pub async fn add_format(&self, book_id: i64, file_path: &str) -> Result<()> {
        let args = vec![
            "add_format".to_string(),
            book_id.to_string(),
            file_path.to_string(),
        ];
        self.client.run_calibredb(&args).await?;
        Ok(())
    }

    /// Fetch a book's metadata in OPF form, as printed by
    /// `calibredb show_metadata --as-opf`.
    pub async fn show_metadata(&self, book_id: i64) -> Result<String> {
        let args = vec![
            "show_metadata".to_string(),
            book_id.to_string(),
            "--as-opf".to_string(),
        ];
        let output = self.client.run_calibredb(&args).await?;
        Ok(output.stdout)
    }
}

fn join_ids(ids: &[i64]) -> String {
    ids.iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

fn build_add_args(file_path: &str, options: &AddOptions) -> Vec<String> {
    let mut args = vec!["add".to_string(), file_path.to_string()];
    if let Some(title) = &options.title {
        args.push("--title".to_string());
        args.push(title.clone());
    }
    if let Some(authors) = &options.authors {
        args.push("--authors".to_string());
        args.push(authors.clone());
    }
    if let Some(tags) = &options.tags {
        args.push("--tags".to_string());
        args.push(tags.clone());
    }
    if let Some(series) = &options.series {
        args.push("--series".to_string());
        args.push(series.clone());
    }
    if let Some(index) = options.series_index {
        args.push("--series-index".to_string());
        args.push(index.to_string());
    }
    if let Some(isbn) = &options.isbn {
        args.push("--isbn".to_string());
        args.push(isbn.clone());
    }
    if options.allow_duplicates {
        args.push("--duplicates".to_string());
    }
    args
}

fn build_set_metadata_args(book_id: i64, fields: &[(String, String)]) -> Vec<String> {
    let mut args = vec!["set_metadata".to_string(), book_id.to_string()];
    for (field, value) in fields {
        args.push("--field".to_string());
        args.push(format!("{}:{}", field, value));
    }
    args
}

/// Parse `calibredb add` output of the form `Added book ids: 5, 6`.
fn parse_added_ids(stdout: &str) -> Result<Vec<i64>> {
    for line in stdout.lines() {
        if let Some(rest) = line.trim().strip_prefix("Added book ids:") {
            return parse_id_list(rest);
        }
    }
    Err(Error::OutputParse(format!(
        "no 'Added book ids' line in output: {}",
        stdout.trim()
    )))
}

/// Parse a comma/newline separated id list as printed by calibredb.
fn parse_id_list(text: &str) -> Result<Vec<i64>> {
    text.split([',', '\n'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<i64>()
                .map_err(|_| Error::OutputParse(format!("expected a book id, got '{}'", s)))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_args_include_only_set_fields() {
        let args = build_add_args(
            "/tmp/b.epub",
            &AddOptions {
                title: Some("T".into()),
                tags: Some("a,b".into()),
                allow_duplicates: true,
                ..Default::default()
            },
        );
        assert_eq!(
            args,
            vec![
                "add",
                "/tmp/b.epub",
                "--title",
                "T",
                "--tags",
                "a,b",
                "--duplicates"
            ]
        );
    }

    #[test]
    fn set_metadata_args_repeat_field_flag() {
        let fields = vec![
            ("title".to_string(), "New".to_string()),
            ("rating".to_string(), "8".to_string()),
        ];
        let args = build_set_metadata_args(7, &fields);
        assert_eq!(
            args,
            vec![
                "set_metadata",
                "7",
                "--field",
                "title:New",
                "--field",
                "rating:8"
            ]
        );
    }

    #[test]
    fn added_ids_single_and_multiple() {
        assert_eq!(parse_added_ids("Added book ids: 12\n").unwrap(), vec![12]);
        assert_eq!(
            parse_added_ids("Backing up metadata\nAdded book ids: 3, 4, 5\n").unwrap(),
            vec![3, 4, 5]
        );
        assert!(parse_added_ids("nothing useful").is_err());
    }

    #[test]
    fn id_list_tolerates_newlines_and_blanks() {
        assert_eq!(parse_id_list("1,2,3").unwrap(), vec![1, 2, 3]);
        assert_eq!(parse_id_list("4\n5\n").unwrap(), vec![4, 5]);
        assert!(parse_id_list("4,x").is_err());
    }

    #[test]
    fn for_machine_output_deserializes() {
        let raw = r#"[{"id": 7, "title": "Dune", "authors": "Frank Herbert",
                       "tags": ["scifi"], "formats": ["/lib/Dune/Dune.epub"],
                       "series": null, "series_index": null}]"#;
        let books: Vec<crate::types::CliBook> = serde_json::from_str(raw).unwrap();
        assert_eq!(books[0].id, 7);
        assert_eq!(books[0].authors, "Frank Herbert");
        assert_eq!(books[0].formats.len(), 1);
        assert!(books[0].series.is_none());
    }
}
