//! Language detection and line counting.
//!
//! Both are collaborators of the processor and sit behind traits:
//! [`LanguageDetector`] classifies one file from its name and content,
//! [`LineCounter`] classifies the lines of files materialized on disk.

mod languages;
mod lines;

pub use languages::ExtensionDetector;
pub use lines::CommentAwareCounter;

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};

use crate::model::LineCounts;

/// Detects the programming language of a file.
pub trait LanguageDetector: Send + Sync {
    /// Language name, or `None` if it can't be determined.
    fn detect(&self, path: &str, content: &[u8]) -> Option<String>;
}

/// Splits lines of source files into blank, code and comment lines.
pub trait LineCounter: Send + Sync {
    /// Count lines of the given files, grouped by language name.
    fn count(&self, base: &Path, paths: &[PathBuf]) -> io::Result<HashMap<String, LineCounts>>;
}
