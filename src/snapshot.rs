use crate::entry::SubtitleEntry;
use crate::error::{Result, SubhistError};

use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::debug;

pub const DEFAULT_FILE_NAME: &str = "mpv-subtitles.json";

pub fn default_path() -> PathBuf {
    std::env::temp_dir().join(DEFAULT_FILE_NAME)
}

/// Replaces the interchange file with a full snapshot of the history.
#[derive(Debug, Clone)]
pub struct SnapshotWriter {
    path: PathBuf,
}

impl SnapshotWriter {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes to a temporary file next to the target and renames it over the
    /// target, so a concurrent reader sees either the old or the new payload.
    pub fn write(&self, entries: &[SubtitleEntry]) -> Result<()> {
        let mut tmp =
            NamedTempFile::new_in(parent_dir(&self.path)).map_err(|e| self.write_error(e))?;
        self.write_payload(tmp.as_file_mut(), entries)?;
        tmp.as_file().sync_all().map_err(|e| self.write_error(e))?;
        tmp.persist(&self.path).map_err(|e| self.write_error(e.error))?;
        debug!(path = %self.path.display(), entries = entries.len(), "wrote snapshot");
        Ok(())
    }

    /// Serialization failures are `Encode`; anything the sink rejects is `Write`.
    fn write_payload<W: Write>(&self, mut out: W, entries: &[SubtitleEntry]) -> Result<()> {
        let payload = serde_json::to_vec(entries)?;
        out.write_all(&payload)
            .and_then(|()| out.flush())
            .map_err(|e| self.write_error(e))
    }

    fn write_error(&self, source: std::io::Error) -> SubhistError {
        SubhistError::Write {
            path: self.path.clone(),
            source,
        }
    }
}

pub(crate) fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Snapshot {
    Entries(Vec<SubtitleEntry>),
    Missing,
}

#[derive(Debug, Clone)]
pub struct SnapshotReader {
    path: PathBuf,
}

impl SnapshotReader {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn read(&self) -> Result<Snapshot> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Snapshot::Missing),
            Err(source) => {
                return Err(SubhistError::Read {
                    path: self.path.clone(),
                    source,
                })
            }
        };
        parse_snapshot(&self.path, &content).map(Snapshot::Entries)
    }
}

pub fn parse_snapshot(path: &Path, content: &str) -> Result<Vec<SubtitleEntry>> {
    let entries: Vec<SubtitleEntry> =
        serde_json::from_str(content).map_err(|err| SubhistError::Parse {
            path: path.to_path_buf(),
            reason: err.to_string(),
        })?;
    if let Some(pos) = entries.iter().position(|e| !e.is_well_formed()) {
        return Err(SubhistError::Parse {
            path: path.to_path_buf(),
            reason: format!("entry {} violates the data model", pos),
        });
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hello() -> SubtitleEntry {
        SubtitleEntry::new("hello", 1.0, 1000).unwrap()
    }

    #[test]
    fn write_then_read_preserves_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("subs.json");
        let entries = vec![
            hello(),
            SubtitleEntry::new("second", 4.2, 1003).unwrap().with_end_time(6.0),
        ];
        SnapshotWriter::new(&path).write(&entries).unwrap();

        let got = SnapshotReader::new(&path).read().unwrap();
        assert_eq!(got, Snapshot::Entries(entries));
    }

    #[test]
    fn empty_history_writes_empty_array() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("subs.json");
        SnapshotWriter::new(&path).write(&[hello()]).unwrap();
        SnapshotWriter::new(&path).write(&[]).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "[]");
    }

    #[test]
    fn write_leaves_no_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("subs.json");
        let writer = SnapshotWriter::new(&path);
        for _ in 0..3 {
            writer.write(&[hello()]).unwrap();
        }
        let names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("subs.json")]);
    }

    #[test]
    fn unwritable_location_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("no-such-dir").join("subs.json");
        let err = SnapshotWriter::new(&path).write(&[hello()]).unwrap_err();
        assert!(matches!(err, SubhistError::Write { .. }));
    }

    struct FullDisk;

    impl Write for FullDisk {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Err(std::io::Error::new(ErrorKind::Other, "no space left on device"))
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn sink_failure_is_a_write_error() {
        let writer = SnapshotWriter::new("subs.json");
        let entries: Vec<_> = (0..3)
            .map(|i| SubtitleEntry::new(format!("line {}", i), i as f64, 1000).unwrap())
            .collect();
        let err = writer.write_payload(FullDisk, &entries).unwrap_err();
        match err {
            SubhistError::Write { path, .. } => assert_eq!(path, PathBuf::from("subs.json")),
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn missing_file_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let got = SnapshotReader::new(dir.path().join("absent.json"))
            .read()
            .unwrap();
        assert_eq!(got, Snapshot::Missing);
    }

    macro_rules! test_malformed {
        ($($name:ident: $value:expr,)*) => {
        $(
            #[test]
            fn $name() {
                let result = parse_snapshot(Path::new("subs.json"), $value);
                assert!(matches!(result, Err(SubhistError::Parse { .. })));
            }
        )*
        }
    }

    test_malformed! {
        test_malformed_empty: "",
        test_malformed_truncated: r#"[{"text":"hello","start_ti"#,
        test_malformed_object: r#"{"text":"hello"}"#,
        test_malformed_empty_text: r#"[{"text":"","start_time":1.0,"timestamp":1}]"#,
        test_malformed_negative_start: r#"[{"text":"a","start_time":-1.0,"timestamp":1}]"#,
        test_malformed_wrong_type: r#"[{"text":"a","start_time":"1","timestamp":1}]"#,
    }
}
