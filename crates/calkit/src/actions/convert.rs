//! Format conversion via `ebook-convert`.

use std::path::{Path, PathBuf};

use crate::client::CalibreClient;
use crate::error::Result;

/// Provides access to format conversion.
///
/// Obtained via [`CalibreClient::convert()`].
#[derive(Debug)]
pub struct ConvertActions<'a> {
    pub(crate) client: &'a CalibreClient,
}

impl<'a> ConvertActions<'a> {
    /// Convert `input` to `output`; the target format is taken from the
    /// output file extension, as `ebook-convert` itself does.
    ///
    /// `extra_args` is passed through verbatim for conversion tuning
    /// (`--output-profile`, `--margin-top`, ...).
    pub async fn file(
        &self,
        input: &Path,
        output: &Path,
        extra_args: &[String],
    ) -> Result<PathBuf> {
        let mut args = vec![
            input.to_string_lossy().into_owned(),
            output.to_string_lossy().into_owned(),
        ];
        args.extend_from_slice(extra_args);
        self.client.run_convert(&args).await?;
        Ok(output.to_path_buf())
    }
}
