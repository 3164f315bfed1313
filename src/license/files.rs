//! License discovery on disk.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::LicenseError;

use super::{LicenseCatalog, LicenseFamily};

/// Result of searching a directory for license files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LicenseSearch {
    /// No license file: the directory has no license.
    None,
    /// Exactly one license file.
    Single(PathBuf),
    /// More than one candidate, callers must not pick one silently.
    Ambiguous(Vec<PathBuf>),
}

/// A classified license file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LicenseFile {
    pub family: LicenseFamily,
    pub path: PathBuf,
}

impl LicenseCatalog {
    /// Find the regular files in `dir` (not recursing) whose names are
    /// well-known license file names. Matches are sorted by name.
    pub fn search_dir(&self, dir: &Path) -> Result<LicenseSearch, LicenseError> {
        let entries = fs::read_dir(dir).map_err(|source| LicenseError::Io {
            path: dir.to_path_buf(),
            source,
        })?;

        let mut found = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| LicenseError::Io {
                path: dir.to_path_buf(),
                source,
            })?;
            let file_type = entry.file_type().map_err(|source| LicenseError::Io {
                path: entry.path(),
                source,
            })?;
            if !file_type.is_file() {
                continue;
            }
            if self.is_license_file(&entry.file_name().to_string_lossy()) {
                found.push(entry.path());
            }
        }
        found.sort();

        Ok(match found.len() {
            0 => LicenseSearch::None,
            1 => LicenseSearch::Single(found.remove(0)),
            _ => LicenseSearch::Ambiguous(found),
        })
    }

    /// Read and classify a single license file.
    pub fn license_from_file(&self, path: &Path) -> Result<LicenseFile, LicenseError> {
        let bytes = fs::read(path).map_err(|source| LicenseError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let family = self
            .classify(&String::from_utf8_lossy(&bytes))
            .ok_or(LicenseError::Unrecognized)?;
        Ok(LicenseFile {
            family,
            path: path.to_path_buf(),
        })
    }

    /// Search `dir` and classify its license file, if there is exactly one.
    pub fn license_from_dir(&self, dir: &Path) -> Result<LicenseFile, LicenseError> {
        match self.search_dir(dir)? {
            LicenseSearch::None => Err(LicenseError::NoLicenseFile),
            LicenseSearch::Single(path) => self.license_from_file(&path),
            LicenseSearch::Ambiguous(paths) => Err(LicenseError::MultipleLicenses(paths)),
        }
    }
}
