//! Operation groups backed by the Calibre command-line tools.

mod books;
mod convert;
mod export;

pub use books::{AddOptions, BookActions};
pub use convert::ConvertActions;
pub use export::{ExportActions, ExportOptions};
