//! Append-mode checkpoint log for accumulated frames
//!
//! The checkpoint holds the frames stored during the current analysis window so
//! that a restarted run can rebuild exactly the same accumulation state. The
//! file is line oriented:
//!
//! ```text
//! #! SET old_normalization 0
//! REMARK TIME=0.2 LOG_WEIGHT=-1.5 OLD_NORM=0
//! REMARK d1=0.100000 d2=0.200000
//! ATOM 1 0.000000 1.000000 2.000000
//! END
//! ```
//!
//! The header constant is written whenever the log is (re)started. Every
//! record is flushed as soon as it is written, so a crash leaves a valid prefix
//! of complete records; a trailing record without `END` is discarded on read.
//! A restarted run rewrites the log from the records it replayed before
//! appending, so a crashed fragment never survives into the next record.
//!
//! Copyright (c) 2025 Mohammad Atashi <mohammadaliatashi@icloud.com>

use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use log::{debug, trace, warn};
use nalgebra::Vector3;
use thiserror::Error;

use crate::reference::StoredFrame;
use crate::temporal::format::NumberFormat;

const HEADER_PREFIX: &str = "#!";
const OLD_NORMALIZATION: &str = "old_normalization";

/// Checkpoint error
#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("malformed checkpoint at line {line}: {reason}")]
    Malformed { line: usize, reason: String },

    #[error("invalid numeric format {0}")]
    InvalidFormat(String),
}

/// One frame read back from a checkpoint
#[derive(Debug, Clone, PartialEq)]
pub struct CheckpointRecord {
    pub time: f64,
    pub log_weight: f64,
    pub old_norm: f64,
    pub arguments: Vec<(String, f64)>,
    pub positions: Vec<(usize, Vector3<f64>)>,
}

impl CheckpointRecord {
    pub fn argument(&self, name: &str) -> Option<f64> {
        self.arguments
            .iter()
            .find(|(n, _)| n == name)
            .map(|&(_, v)| v)
    }
}

/// Contents of a checkpoint file
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CheckpointLog {
    /// Running normalization in force when the log was started
    pub old_normalization: Option<f64>,
    pub records: Vec<CheckpointRecord>,
}

impl CheckpointLog {
    /// Read every complete record in `path`. A missing file yields an empty log.
    pub fn read(path: &Path) -> Result<Self, CheckpointError> {
        let file = match File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("No checkpoint found at {}", path.display());
                return Ok(Self::default());
            }
            Err(e) => return Err(e.into()),
        };

        let mut log = Self::default();
        let mut pending: Option<RecordBuilder> = None;

        for (index, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            let lineno = index + 1;
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            if let Some(header) = trimmed.strip_prefix(HEADER_PREFIX) {
                let fields: Vec<&str> = header.split_whitespace().collect();
                if let ["SET", OLD_NORMALIZATION, value] = fields.as_slice() {
                    log.old_normalization = Some(parse_number(value, lineno)?);
                }
                continue;
            }

            let mut fields = trimmed.split_whitespace();
            match fields.next() {
                Some("REMARK") => {
                    for field in fields {
                        if field.starts_with("TIME=")
                            && pending.as_ref().is_some_and(|b| b.time.is_some())
                        {
                            warn!(
                                "Discarding unterminated record before line {} of checkpoint {}",
                                lineno,
                                path.display()
                            );
                            pending = None;
                        }
                        pending
                            .get_or_insert_with(RecordBuilder::default)
                            .remark(field, lineno)?;
                    }
                }
                Some("ATOM") => {
                    let builder = pending.get_or_insert_with(RecordBuilder::default);
                    builder.atom(fields, lineno)?;
                }
                Some("END") => {
                    let builder = pending.take().ok_or_else(|| CheckpointError::Malformed {
                        line: lineno,
                        reason: "END without a record".into(),
                    })?;
                    log.records.push(builder.finish(lineno)?);
                }
                Some(other) => {
                    return Err(CheckpointError::Malformed {
                        line: lineno,
                        reason: format!("unexpected keyword {}", other),
                    })
                }
                None => {}
            }
        }

        if pending.is_some() {
            warn!(
                "Discarding incomplete trailing record in checkpoint {}",
                path.display()
            );
        }

        Ok(log)
    }
}

#[derive(Debug, Default)]
struct RecordBuilder {
    time: Option<f64>,
    log_weight: Option<f64>,
    old_norm: Option<f64>,
    arguments: Vec<(String, f64)>,
    positions: Vec<(usize, Vector3<f64>)>,
}

impl RecordBuilder {
    fn remark(&mut self, field: &str, line: usize) -> Result<(), CheckpointError> {
        let (key, value) = field.split_once('=').ok_or_else(|| CheckpointError::Malformed {
            line,
            reason: format!("expected key=value, found {}", field),
        })?;
        let value = parse_number(value, line)?;
        match key {
            "TIME" => self.time = Some(value),
            "LOG_WEIGHT" => self.log_weight = Some(value),
            "OLD_NORM" => self.old_norm = Some(value),
            name => self.arguments.push((name.to_owned(), value)),
        }
        Ok(())
    }

    fn atom<'a>(
        &mut self,
        mut fields: impl Iterator<Item = &'a str>,
        line: usize,
    ) -> Result<(), CheckpointError> {
        let malformed = |reason: &str| CheckpointError::Malformed {
            line,
            reason: reason.to_owned(),
        };
        let serial = fields
            .next()
            .ok_or_else(|| malformed("missing atom serial"))?
            .parse::<usize>()
            .map_err(|_| malformed("atom serial is not an integer"))?;
        let mut xyz = [0.0; 3];
        for component in &mut xyz {
            let raw = fields.next().ok_or_else(|| malformed("missing coordinate"))?;
            *component = parse_number(raw, line)?;
        }
        self.positions
            .push((serial, Vector3::new(xyz[0], xyz[1], xyz[2])));
        Ok(())
    }

    fn finish(self, line: usize) -> Result<CheckpointRecord, CheckpointError> {
        let missing = |field: &str| CheckpointError::Malformed {
            line,
            reason: format!("record has no {} field", field),
        };
        Ok(CheckpointRecord {
            time: self.time.ok_or_else(|| missing("TIME"))?,
            log_weight: self.log_weight.ok_or_else(|| missing("LOG_WEIGHT"))?,
            old_norm: self.old_norm.ok_or_else(|| missing("OLD_NORM"))?,
            arguments: self.arguments,
            positions: self.positions,
        })
    }
}

fn parse_number(raw: &str, line: usize) -> Result<f64, CheckpointError> {
    raw.parse().map_err(|_| CheckpointError::Malformed {
        line,
        reason: format!("{} is not a number", raw),
    })
}

/// Scoped writer for the checkpoint log
///
/// The file is opened on construction, flushed after every record and closed
/// when the writer is dropped.
#[derive(Debug)]
pub struct CheckpointWriter {
    path: PathBuf,
    file: BufWriter<File>,
    format: NumberFormat,
    records: usize,
}

impl CheckpointWriter {
    /// Start a fresh log, discarding any previous contents
    pub fn create(
        path: impl Into<PathBuf>,
        format: NumberFormat,
        old_norm: f64,
    ) -> Result<Self, CheckpointError> {
        let path = path.into();
        let file = Self::open_truncated(&path)?;
        let mut writer = Self {
            path,
            file,
            format,
            records: 0,
        };
        writer.write_header(old_norm)?;
        debug!("Created checkpoint {}", writer.path.display());
        Ok(writer)
    }

    /// Restart the log from the complete records of `log`
    ///
    /// The file is truncated and the header and records are written again, so
    /// anything after the last complete record is dropped.
    pub fn resume(
        path: impl Into<PathBuf>,
        format: NumberFormat,
        log: &CheckpointLog,
        old_norm: f64,
    ) -> Result<Self, CheckpointError> {
        let mut writer = Self::create(path, format, log.old_normalization.unwrap_or(old_norm))?;
        for record in &log.records {
            writer.write_entry(
                record.time,
                record.log_weight,
                record.old_norm,
                record.arguments.iter().map(|(name, value)| (name.as_str(), *value)),
                record.positions.iter().map(|(serial, position)| (*serial, position)),
            )?;
        }
        debug!(
            "Resumed checkpoint {} with {} records",
            writer.path.display(),
            writer.records
        );
        Ok(writer)
    }

    /// Truncate the log and start it again with a new running normalization
    pub fn rewind(&mut self, old_norm: f64) -> Result<(), CheckpointError> {
        self.file.flush()?;
        self.file = Self::open_truncated(&self.path)?;
        self.records = 0;
        self.write_header(old_norm)
    }

    /// Append one frame and flush it to disk
    pub fn write_frame(
        &mut self,
        time: f64,
        log_weight: f64,
        old_norm: f64,
        frame: &StoredFrame,
    ) -> Result<(), CheckpointError> {
        let layout = frame.layout();
        self.write_entry(
            time,
            log_weight,
            old_norm,
            layout.argument_names().zip(frame.arguments().iter().copied()),
            layout.atoms().iter().copied().zip(frame.positions()),
        )
    }

    fn write_entry<'a>(
        &mut self,
        time: f64,
        log_weight: f64,
        old_norm: f64,
        arguments: impl Iterator<Item = (&'a str, f64)>,
        positions: impl Iterator<Item = (usize, &'a Vector3<f64>)>,
    ) -> Result<(), CheckpointError> {
        writeln!(
            self.file,
            "REMARK TIME={} LOG_WEIGHT={} OLD_NORM={}",
            time, log_weight, old_norm
        )?;

        let mut arguments = arguments.peekable();
        if arguments.peek().is_some() {
            write!(self.file, "REMARK")?;
            for (name, value) in arguments {
                write!(self.file, " {}={}", name, self.format.format(value).trim())?;
            }
            writeln!(self.file)?;
        }

        for (serial, position) in positions {
            writeln!(
                self.file,
                "ATOM {} {} {} {}",
                serial,
                self.format.format(position.x).trim(),
                self.format.format(position.y).trim(),
                self.format.format(position.z).trim()
            )?;
        }
        writeln!(self.file, "END")?;
        self.file.flush()?;

        self.records += 1;
        trace!("Checkpointed frame at time {} ({} records)", time, self.records);
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Records written since the log was opened or last rewound
    pub fn records_written(&self) -> usize {
        self.records
    }

    fn open_truncated(path: &Path) -> Result<BufWriter<File>, CheckpointError> {
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        Ok(BufWriter::new(file))
    }

    fn write_header(&mut self, old_norm: f64) -> Result<(), CheckpointError> {
        writeln!(self.file, "{} SET {} {}", HEADER_PREFIX, OLD_NORMALIZATION, old_norm)?;
        self.file.flush()?;
        Ok(())
    }
}

impl Drop for CheckpointWriter {
    fn drop(&mut self) {
        if let Err(e) = self.file.flush() {
            warn!("Failed to flush checkpoint {}: {}", self.path.display(), e);
        }
        debug!("Closed checkpoint {}", self.path.display());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reference::{ArgumentSpec, FrameLayout, MetricRegistry};
    use std::fs;
    use std::sync::Arc;
    use tempfile::tempdir;

    fn argument_frame(values: &[f64]) -> StoredFrame {
        let layout = Arc::new(
            FrameLayout::new(
                MetricRegistry::create("EUCLIDEAN").unwrap(),
                vec![],
                vec![ArgumentSpec::new("d1"), ArgumentSpec::new("d2")],
            )
            .unwrap(),
        );
        let mut frame = StoredFrame::empty(layout);
        frame.set_reference_config(&[], values).unwrap();
        frame
    }

    #[test]
    fn test_write_then_read_records() -> Result<(), CheckpointError> {
        let dir = tempdir()?;
        let path = dir.path().join("analysis_a.chkpnt");

        {
            let mut writer = CheckpointWriter::create(&path, NumberFormat::default(), 0.0)?;
            writer.write_frame(0.2, -1.25, 0.0, &argument_frame(&[0.1, 0.2]))?;
            writer.write_frame(0.4, -0.123456789012345, 0.0, &argument_frame(&[0.3, 0.4]))?;
            assert_eq!(writer.records_written(), 2);
        }

        let log = CheckpointLog::read(&path)?;
        assert_eq!(log.old_normalization, Some(0.0));
        assert_eq!(log.records.len(), 2);
        assert_eq!(log.records[0].time, 0.2);
        assert_eq!(log.records[1].log_weight, -0.123456789012345);
        assert_eq!(log.records[1].argument("d2"), Some(0.4));
        assert!(log.records[0].positions.is_empty());
        Ok(())
    }

    #[test]
    fn test_atom_records() -> Result<(), CheckpointError> {
        let dir = tempdir()?;
        let path = dir.path().join("atoms.chkpnt");
        let layout = Arc::new(
            FrameLayout::new(MetricRegistry::create("SIMPLE").unwrap(), vec![3, 7], vec![])
                .unwrap(),
        );
        let mut frame = StoredFrame::empty(layout);
        frame
            .set_reference_config(&[Vector3::new(1.0, 2.0, 3.0), Vector3::new(-1.0, 0.5, 0.0)], &[])
            .unwrap();

        let mut writer = CheckpointWriter::create(&path, NumberFormat::default(), 2.5)?;
        writer.write_frame(1.0, 0.0, 2.5, &frame)?;
        drop(writer);

        let log = CheckpointLog::read(&path)?;
        assert_eq!(log.records[0].positions[1], (7, Vector3::new(-1.0, 0.5, 0.0)));
        assert_eq!(log.records[0].old_norm, 2.5);
        Ok(())
    }

    #[test]
    fn test_rewind_keeps_only_new_window() -> Result<(), CheckpointError> {
        let dir = tempdir()?;
        let path = dir.path().join("rewind.chkpnt");
        let mut writer = CheckpointWriter::create(&path, NumberFormat::default(), 0.0)?;
        writer.write_frame(0.1, 0.0, 0.0, &argument_frame(&[0.0, 0.0]))?;
        writer.rewind(3.5)?;
        writer.write_frame(0.2, 1.0, 3.5, &argument_frame(&[1.0, 1.0]))?;
        drop(writer);

        let log = CheckpointLog::read(&path)?;
        assert_eq!(log.old_normalization, Some(3.5));
        assert_eq!(log.records.len(), 1);
        assert_eq!(log.records[0].time, 0.2);
        Ok(())
    }

    #[test]
    fn test_resume_continues_existing_log() -> Result<(), CheckpointError> {
        let dir = tempdir()?;
        let path = dir.path().join("resume.chkpnt");
        {
            let mut writer = CheckpointWriter::create(&path, NumberFormat::default(), 1.5)?;
            writer.write_frame(0.1, 0.0, 1.5, &argument_frame(&[0.0, 0.0]))?;
        }
        {
            let log = CheckpointLog::read(&path)?;
            let mut writer = CheckpointWriter::resume(&path, NumberFormat::default(), &log, 0.0)?;
            assert_eq!(writer.records_written(), 1);
            writer.write_frame(0.2, 0.5, 1.5, &argument_frame(&[1.0, 1.0]))?;
        }
        let log = CheckpointLog::read(&path)?;
        assert_eq!(log.old_normalization, Some(1.5));
        assert_eq!(log.records.len(), 2);
        assert_eq!(log.records[1].argument("d1"), Some(1.0));
        Ok(())
    }

    #[test]
    fn test_resume_drops_crashed_fragment() -> Result<(), CheckpointError> {
        let dir = tempdir()?;
        let path = dir.path().join("crash.chkpnt");
        fs::write(
            &path,
            "#! SET old_normalization 0\n\
             REMARK TIME=0.5 LOG_WEIGHT=0 OLD_NORM=0\n\
             REMARK d1=1.000000 d2=0.000000\nEND\n\
             REMARK TIME=1 LOG_WEIGHT=0 OLD_NORM=0\n\
             REMARK d1=99.000000 d2=0.0",
        )?;

        {
            let log = CheckpointLog::read(&path)?;
            assert_eq!(log.records.len(), 1);
            let mut writer = CheckpointWriter::resume(&path, NumberFormat::default(), &log, 0.0)?;
            writer.write_frame(1.0, 0.0, 0.0, &argument_frame(&[2.0, 0.0]))?;
        }

        let log = CheckpointLog::read(&path)?;
        assert_eq!(log.records.len(), 2);
        assert_eq!(log.records[1].time, 1.0);
        assert_eq!(log.records[1].argument("d1"), Some(2.0));
        assert_eq!(log.records[1].arguments.len(), 2);
        Ok(())
    }

    #[test]
    fn test_repeated_time_starts_new_record() -> Result<(), CheckpointError> {
        let dir = tempdir()?;
        let path = dir.path().join("glued.chkpnt");
        fs::write(
            &path,
            "REMARK TIME=0.1 LOG_WEIGHT=0 OLD_NORM=0\n\
             REMARK d1=99.0\n\
             REMARK TIME=0.2 LOG_WEIGHT=1 OLD_NORM=0\n\
             REMARK d1=2.0\nEND\n",
        )?;
        let log = CheckpointLog::read(&path)?;
        assert_eq!(log.records.len(), 1);
        assert_eq!(log.records[0].time, 0.2);
        assert_eq!(log.records[0].arguments, vec![("d1".to_owned(), 2.0)]);
        Ok(())
    }

    #[test]
    fn test_incomplete_trailing_record_is_discarded() -> Result<(), CheckpointError> {
        let dir = tempdir()?;
        let path = dir.path().join("crash.chkpnt");
        fs::write(
            &path,
            "#! SET old_normalization 0\n\
             REMARK TIME=0.1 LOG_WEIGHT=0 OLD_NORM=0\nEND\n\
             REMARK TIME=0.2 LOG_WEIGHT=0\n",
        )?;
        let log = CheckpointLog::read(&path)?;
        assert_eq!(log.records.len(), 1);
        Ok(())
    }

    #[test]
    fn test_malformed_values_are_rejected() -> Result<(), CheckpointError> {
        let dir = tempdir()?;
        let path = dir.path().join("bad.chkpnt");
        fs::write(&path, "REMARK TIME=abc LOG_WEIGHT=0 OLD_NORM=0\nEND\n")?;
        assert!(matches!(
            CheckpointLog::read(&path),
            Err(CheckpointError::Malformed { line: 1, .. })
        ));

        fs::write(&path, "REMARK TIME=0.1 OLD_NORM=0\nEND\n")?;
        assert!(matches!(
            CheckpointLog::read(&path),
            Err(CheckpointError::Malformed { line: 2, .. })
        ));
        Ok(())
    }

    #[test]
    fn test_missing_file_reads_as_empty() -> Result<(), CheckpointError> {
        let dir = tempdir()?;
        let log = CheckpointLog::read(&dir.path().join("absent.chkpnt"))?;
        assert!(log.records.is_empty());
        assert!(log.old_normalization.is_none());
        Ok(())
    }
}
