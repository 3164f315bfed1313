//! CSV output.
//!
//! The exporter writes the header once and then one row per record in the
//! order records arrive on the channel, flushing after every row. It stops
//! when the channel is closed or when the cancel token is tripped, leaving
//! every row written so far in place.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::Path;
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::error::ExportError;
use crate::model::ExportRecord;
use crate::pipeline::CancelToken;

pub const CSV_HEADER: [&str; 14] = [
    "URL",
    "SIVA_FILENAMES",
    "FILE_COUNT",
    "LANGS",
    "LANGS_BYTE_COUNT",
    "LANGS_LINES_COUNT",
    "LANGS_FILES_COUNT",
    "COMMITS_COUNT",
    "BRANCHES_COUNT",
    "FORK_COUNT",
    "EMPTY_LINES_COUNT",
    "CODE_LINES_COUNT",
    "COMMENT_LINES_COUNT",
    "LICENSE",
];

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

fn join<T: ToString>(values: impl IntoIterator<Item = T>) -> String {
    values
        .into_iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

impl ExportRecord {
    /// CSV fields in header order. Per-language columns are parallel lists
    /// ordered by language name.
    pub fn to_row(&self) -> Vec<String> {
        let langs = &self.languages;
        vec![
            self.url.clone(),
            self.storage_files.join(","),
            self.files.to_string(),
            join(langs.keys()),
            join(langs.values().map(|l| l.usage.bytes)),
            join(langs.values().map(|l| l.usage.lines)),
            join(langs.values().map(|l| l.usage.files)),
            self.head_commits.to_string(),
            self.branches.to_string(),
            self.forks.to_string(),
            join(langs.values().map(|l| l.lines.blank)),
            join(langs.values().map(|l| l.lines.code)),
            join(langs.values().map(|l| l.lines.comments)),
            self.license
                .family()
                .map(|f| f.as_str().to_string())
                .unwrap_or_default(),
        ]
    }
}

fn needs_quotes(field: &str) -> bool {
    field.starts_with(' ')
        || field.starts_with('\t')
        || field.contains(|c| matches!(c, ',' | '"' | '\n' | '\r'))
}

/// Write one CSV line, quoting fields as needed.
pub fn write_row<W, S>(out: &mut W, fields: &[S]) -> io::Result<()>
where
    W: Write,
    S: AsRef<str>,
{
    for (i, field) in fields.iter().enumerate() {
        if i > 0 {
            out.write_all(b",")?;
        }
        let field = field.as_ref();
        if needs_quotes(field) {
            write!(out, "\"{}\"", field.replace('"', "\"\""))?;
        } else {
            out.write_all(field.as_bytes())?;
        }
    }
    out.write_all(b"\n")
}

/// Create the output file, deleting any previous file at `path`.
pub fn prepare_output(path: &Path) -> Result<File, ExportError> {
    let output_err = |source| ExportError::Output {
        path: path.to_path_buf(),
        source,
    };
    match fs::metadata(path) {
        Ok(_) => {
            warn!(file = %path.display(), "file exists, it will be deleted");
            fs::remove_file(path).map_err(output_err)?;
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(output_err(e)),
    }
    File::create(path).map_err(output_err)
}

/// Rows written versus rows that were expected.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExportSummary {
    pub written: u64,
    pub expected: u64,
    pub cancelled: bool,
}

pub struct StreamingExporter<W: Write> {
    out: W,
    cancel: CancelToken,
    poll_interval: Duration,
}

impl<W: Write> StreamingExporter<W> {
    pub fn new(out: W, cancel: CancelToken) -> Self {
        Self {
            out,
            cancel,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// How long to wait on an empty channel before checking for cancellation.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn write_line(&mut self, what: &'static str, fields: &[impl AsRef<str>]) -> Result<(), ExportError> {
        write_row(&mut self.out, fields)
            .and_then(|_| self.out.flush())
            .map_err(|source| ExportError::Write { what, source })
    }

    /// Write the header, then every record received until the channel is
    /// closed or the run is cancelled.
    pub fn export(
        &mut self,
        records: &Receiver<ExportRecord>,
        expected: u64,
    ) -> Result<ExportSummary, ExportError> {
        debug!("start writing result");
        let start = Instant::now();

        let mut summary = ExportSummary {
            expected,
            ..ExportSummary::default()
        };
        self.write_line("header", &CSV_HEADER[..])?;

        loop {
            if self.cancel.is_cancelled() {
                summary.cancelled = true;
                break;
            }
            let record = match records.recv_timeout(self.poll_interval) {
                Ok(record) => record,
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            };
            if self.cancel.is_cancelled() {
                summary.cancelled = true;
                break;
            }
            self.write_line("record", record.to_row().as_slice())?;
            summary.written += 1;
        }

        if summary.cancelled {
            info!(
                written = summary.written,
                expected = summary.expected,
                "export cancelled"
            );
        }
        debug!(elapsed = ?start.elapsed(), written = summary.written, "finished writing result");
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::license::{LicenseFamily, LicenseGuess};
    use crate::model::{Language, LanguageUsage, LineCounts};
    use std::sync::mpsc::channel;
    use std::thread;
    use tempfile::TempDir;

    fn sample() -> ExportRecord {
        let mut record = ExportRecord {
            url: "https://github.com/org/project".into(),
            storage_files: vec!["aaa.siva".into(), "bbb.siva".into()],
            files: 7,
            head_commits: 12,
            commits: 40,
            branches: 3,
            forks: 2,
            license: LicenseGuess::Recognized(LicenseFamily::Apache20),
            ..ExportRecord::default()
        };
        record.languages.insert(
            "Rust".into(),
            Language {
                usage: LanguageUsage {
                    files: 2,
                    bytes: 300,
                    lines: 20,
                },
                lines: LineCounts {
                    blank: 2,
                    code: 15,
                    comments: 3,
                },
            },
        );
        record.languages.insert(
            "Go".into(),
            Language {
                usage: LanguageUsage {
                    files: 1,
                    bytes: 50,
                    lines: 4,
                },
                lines: LineCounts::default(),
            },
        );
        record
    }

    fn lines(bytes: Vec<u8>) -> Vec<String> {
        String::from_utf8(bytes)
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn test_row_columns() {
        let row = sample().to_row();
        assert_eq!(row.len(), CSV_HEADER.len());
        assert_eq!(
            row,
            vec![
                "https://github.com/org/project",
                "aaa.siva,bbb.siva",
                "7",
                "Go,Rust",
                "50,300",
                "4,20",
                "1,2",
                "12",
                "3",
                "2",
                "0,2",
                "0,15",
                "0,3",
                "Apache-2.0",
            ]
        );
    }

    #[test]
    fn test_unrecognized_license_is_empty() {
        let mut record = sample();
        record.license = LicenseGuess::Unrecognized;
        assert_eq!(record.to_row()[13], "");
        record.license = LicenseGuess::Missing;
        assert_eq!(record.to_row()[13], "");
    }

    #[test]
    fn test_write_row_quotes() {
        let mut out = Vec::new();
        write_row(&mut out, &["plain", "a,b", "say \"hi\"", " lead", ""]).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "plain,\"a,b\",\"say \"\"hi\"\"\",\" lead\",\n"
        );
    }

    #[test]
    fn test_export_until_disconnected() {
        let (tx, rx) = channel();
        tx.send(sample()).unwrap();
        tx.send(sample()).unwrap();
        drop(tx);

        let mut exporter = StreamingExporter::new(Vec::new(), CancelToken::new());
        let summary = exporter.export(&rx, 2).unwrap();
        assert_eq!(
            summary,
            ExportSummary {
                written: 2,
                expected: 2,
                cancelled: false,
            }
        );

        let lines = lines(exporter.into_inner());
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("URL,SIVA_FILENAMES,FILE_COUNT,"));
        assert!(lines[1].starts_with("https://github.com/org/project,\"aaa.siva,bbb.siva\",7,"));
    }

    #[test]
    fn test_export_stops_on_cancel() {
        let (tx, rx) = channel();
        let cancel = CancelToken::new();
        tx.send(sample()).unwrap();

        let sender = {
            let cancel = cancel.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(50));
                cancel.cancel();
                // Sent after cancellation, never written.
                let _ = tx.send(sample());
                thread::sleep(Duration::from_millis(200));
            })
        };

        let mut exporter =
            StreamingExporter::new(Vec::new(), cancel).with_poll_interval(Duration::from_millis(10));
        let summary = exporter.export(&rx, 5).unwrap();
        sender.join().unwrap();

        assert!(summary.cancelled);
        assert_eq!(summary.written, 1);
        assert_eq!(summary.expected, 5);
        assert_eq!(lines(exporter.into_inner()).len(), 2);
    }

    #[test]
    fn test_prepare_output_replaces_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("result.csv");
        fs::write(&path, "old contents").unwrap();

        let mut file = prepare_output(&path).unwrap();
        file.write_all(b"new").unwrap();
        drop(file);
        assert_eq!(fs::read_to_string(&path).unwrap(), "new");
    }

    #[test]
    fn test_prepare_output_missing_dir_fails() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nope").join("result.csv");
        assert!(matches!(
            prepare_output(&path),
            Err(ExportError::Output { .. })
        ));
    }
}
