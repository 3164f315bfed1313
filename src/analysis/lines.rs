//! Blank/code/comment line classification.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use super::languages::{is_binary, ExtensionDetector, LanguageDef};
use super::LineCounter;
use crate::model::LineCounts;

/// Line counter driven by the comment syntax of each language.
///
/// A line inside a block comment, or starting with a comment marker, is a
/// comment line. A line with code before a comment counts as code.
#[derive(Default)]
pub struct CommentAwareCounter {
    detector: ExtensionDetector,
}

impl CommentAwareCounter {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LineCounter for CommentAwareCounter {
    fn count(&self, base: &Path, paths: &[PathBuf]) -> io::Result<HashMap<String, LineCounts>> {
        let mut counts: HashMap<String, LineCounts> = HashMap::new();
        for path in paths {
            let content = fs::read(path)?;
            if is_binary(&content) {
                continue;
            }
            let rel = path.strip_prefix(base).unwrap_or(path).to_string_lossy();
            let Some(def) = self.detector.definition(&rel, &content) else {
                continue;
            };
            let file = classify_lines(def, &String::from_utf8_lossy(&content));
            counts.entry(def.name.to_string()).or_default().add(file);
        }
        Ok(counts)
    }
}

fn classify_lines(def: &LanguageDef, text: &str) -> LineCounts {
    let mut counts = LineCounts::default();
    // Closing marker of the block comment we are in, if any.
    let mut block_end: Option<&str> = None;

    for line in text.lines() {
        let trimmed = line.trim();

        if let Some(end) = block_end {
            if trimmed.contains(end) {
                block_end = None;
            }
            counts.comments += 1;
            continue;
        }

        if trimmed.is_empty() {
            counts.blank += 1;
            continue;
        }

        if let Some((start, end)) = def
            .block_comments
            .iter()
            .find(|(start, _)| trimmed.starts_with(start))
        {
            if !trimmed[start.len()..].contains(end) {
                block_end = Some(*end);
            }
            counts.comments += 1;
            continue;
        }

        if def.line_comments.iter().any(|c| trimmed.starts_with(c)) {
            counts.comments += 1;
            continue;
        }

        counts.code += 1;
        // A block comment opened after code on the same line.
        for (start, end) in def.block_comments {
            if let Some(pos) = trimmed.find(start) {
                if !trimmed[pos + start.len()..].contains(end) {
                    block_end = Some(*end);
                }
                break;
            }
        }
    }

    counts
}
