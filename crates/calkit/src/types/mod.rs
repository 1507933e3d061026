//! Typed records for Calibre library data.

mod book;
mod catalog;

pub use book::{Book, BookDetails, BookFile, CliBook, SearchPage};
pub use catalog::{Author, LetterCount, LibraryStats, Publisher, Series, Tag};
