//! Book export via `calibredb export`.

use std::path::Path;

use crate::client::CalibreClient;
use crate::error::Result;

/// Options for `calibredb export`.
#[derive(Debug, Clone, Default)]
pub struct ExportOptions {
    /// Restrict to these formats (upper-cased by calibredb).
    pub formats: Vec<String>,
    /// Put all files directly in the target directory instead of
    /// per-author/per-title subdirectories.
    pub single_dir: bool,
    /// Skip cover files.
    pub no_cover: bool,
    /// Skip OPF metadata files.
    pub no_opf: bool,
}

/// Provides access to export operations.
///
/// Obtained via [`CalibreClient::export()`].
#[derive(Debug)]
pub struct ExportActions<'a> {
    pub(crate) client: &'a CalibreClient,
}

impl<'a> ExportActions<'a> {
    /// Export the given books to a directory.
    pub async fn books(&self, ids: &[i64], to_dir: &Path, options: &ExportOptions) -> Result<()> {
        let mut args = build_export_args(to_dir, options);
        args.push(
            ids.iter()
                .map(|id| id.to_string())
                .collect::<Vec<_>>()
                .join(","),
        );
        self.client.run_calibredb(&args).await?;
        Ok(())
    }

    /// Export every book in the library to a directory.
    pub async fn all(&self, to_dir: &Path, options: &ExportOptions) -> Result<()> {
        let mut args = build_export_args(to_dir, options);
        args.push("--all".to_string());
        self.client.run_calibredb(&args).await?;
        Ok(())
    }
}

fn build_export_args(to_dir: &Path, options: &ExportOptions) -> Vec<String> {
    let mut args = vec![
        "export".to_string(),
        "--to-dir".to_string(),
        to_dir.to_string_lossy().into_owned(),
    ];
    if !options.formats.is_empty() {
        args.push("--formats".to_string());
        args.push(options.formats.join(","));
    }
    if options.single_dir {
        args.push("--single-dir".to_string());
    }
    if options.no_cover {
        args.push("--dont-save-cover".to_string());
    }
    if options.no_opf {
        args.push("--dont-write-opf".to_string());
    }
    args
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn export_args_carry_options() {
        let opts = ExportOptions {
            formats: vec!["EPUB".into(), "PDF".into()],
            single_dir: true,
            no_cover: true,
            no_opf: false,
        };
        let args = build_export_args(&PathBuf::from("/out"), &opts);
        assert_eq!(
            args,
            vec![
                "export",
                "--to-dir",
                "/out",
                "--formats",
                "EPUB,PDF",
                "--single-dir",
                "--dont-save-cover"
            ]
        );
    }
}
