//! File-backed sink lifecycle.
//!
//! Owns everything about a sink's on-disk presence: expanding the filename
//! template, advancing the rotation clock, applying age- and size-based
//! retention after each rotation, and deleting the current file at close
//! when nothing was written to it.

use crate::error::{Result, SinkError};
use chrono::{DateTime, Duration, Local, Utc};
use regex::Regex;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Template used when a configuration does not name one.
pub const DEFAULT_FILENAME_TEMPLATE: &str = "{0}_{1}";

const TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";
const LOCAL_TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S%z";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    LogName,
    RotationStart,
    RotationEnd,
}

/// A parsed filename template.
///
/// Positional placeholders: `{0}` the logical log name, `{1}` the
/// rotation-start timestamp, `{2}` the rotation-end timestamp. Any other
/// index is invalid. Timestamps render in UTC, or in local time with an
/// appended timezone offset when the sink asks for local stamps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilenameTemplate {
    raw: String,
    segments: Vec<Segment>,
}

impl FilenameTemplate {
    pub fn parse(raw: &str) -> Result<Self> {
        if raw.is_empty() {
            return Err(SinkError::InvalidConfiguration(
                "filename template cannot be empty".to_string(),
            ));
        }
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = raw.chars().peekable();

        while let Some(c) = chars.next() {
            if c != '{' {
                literal.push(c);
                continue;
            }
            let mut index = String::new();
            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(d) if d.is_ascii_digit() => index.push(d),
                    _ => {
                        return Err(SinkError::InvalidConfiguration(format!(
                            "malformed placeholder in filename template '{}'",
                            raw
                        )))
                    }
                }
            }
            let segment = match index.as_str() {
                "0" => Segment::LogName,
                "1" => Segment::RotationStart,
                "2" => Segment::RotationEnd,
                other => {
                    return Err(SinkError::InvalidConfiguration(format!(
                        "filename template index {{{}}} is out of range",
                        other
                    )))
                }
            };
            if !literal.is_empty() {
                segments.push(Segment::Literal(std::mem::take(&mut literal)));
            }
            segments.push(segment);
        }
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Ok(Self {
            raw: raw.to_string(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Expands the template for one rotation window. The extension includes
    /// its dot and is appended last.
    pub fn expand(
        &self,
        log_name: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        local_timestamps: bool,
        extension: &str,
    ) -> String {
        let render = |ts: DateTime<Utc>| -> String {
            if local_timestamps {
                ts.with_timezone(&Local).format(LOCAL_TIMESTAMP_FORMAT).to_string()
            } else {
                ts.format(TIMESTAMP_FORMAT).to_string()
            }
        };

        let mut name = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => name.push_str(text),
                Segment::LogName => name.push_str(log_name),
                Segment::RotationStart => name.push_str(&render(start)),
                Segment::RotationEnd => name.push_str(&render(end)),
            }
        }
        name.push_str(extension);
        name
    }

    /// A regex matching every filename this template can produce for the
    /// given log name, used by retention to find prior rotation files.
    pub fn matcher(&self, log_name: &str, extension: &str) -> Regex {
        let mut pattern = String::from("^");
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => pattern.push_str(&regex::escape(text)),
                Segment::LogName => pattern.push_str(&regex::escape(log_name)),
                Segment::RotationStart | Segment::RotationEnd => {
                    pattern.push_str(r"\d{14}(?:[+-]\d{4})?")
                }
            }
        }
        pattern.push_str(&regex::escape(extension));
        pattern.push('$');
        // The pattern is built from escaped literals and a fixed stamp
        // shape, so compilation cannot fail.
        Regex::new(&pattern).unwrap_or_else(|_| Regex::new("$^").unwrap())
    }
}

impl Default for FilenameTemplate {
    fn default() -> Self {
        Self::parse(DEFAULT_FILENAME_TEMPLATE).expect("default template parses")
    }
}

/// Tracks when the next time-based rotation is due.
#[derive(Debug, Clone)]
pub struct RotationClock {
    interval: Duration,
    next_rotation_at: DateTime<Utc>,
}

impl RotationClock {
    pub fn new(start: DateTime<Utc>, interval: Duration) -> Self {
        Self {
            interval,
            next_rotation_at: start + interval,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn next_rotation_at(&self) -> DateTime<Utc> {
        self.next_rotation_at
    }

    /// Whether a rotation is due at `now`.
    pub fn due(&self, now: DateTime<Utc>) -> bool {
        now >= self.next_rotation_at
    }

    /// Advances the deadline past `now` after a rotation.
    pub fn advance(&mut self, now: DateTime<Utc>) {
        while self.next_rotation_at <= now {
            self.next_rotation_at = self.next_rotation_at + self.interval;
        }
    }
}

/// Age and size limits applied to prior rotation files.
#[derive(Debug, Clone, Default)]
pub struct RetentionPolicy {
    /// Files older than this are deleted.
    pub max_age: Option<Duration>,
    /// Once the newest-first cumulative size exceeds this, everything
    /// strictly older is deleted.
    pub max_total_bytes: Option<u64>,
}

impl RetentionPolicy {
    pub fn is_empty(&self) -> bool {
        self.max_age.is_none() && self.max_total_bytes.is_none()
    }

    /// Applies both policies to the files matching `matcher` in
    /// `directory`, never touching `keep` (the live file). Returns the
    /// deleted paths.
    pub fn apply(
        &self,
        directory: &Path,
        matcher: &Regex,
        keep: &Path,
        now: DateTime<Utc>,
    ) -> io::Result<Vec<PathBuf>> {
        if self.is_empty() {
            return Ok(Vec::new());
        }

        let mut candidates: Vec<(PathBuf, DateTime<Utc>, u64)> = Vec::new();
        for entry in fs::read_dir(directory)? {
            let entry = entry?;
            let path = entry.path();
            if path == keep {
                continue;
            }
            let name = match path.file_name().and_then(|n| n.to_str()) {
                Some(name) => name,
                None => continue,
            };
            if !matcher.is_match(name) {
                continue;
            }
            let metadata = entry.metadata()?;
            if !metadata.is_file() {
                continue;
            }
            let modified = metadata
                .modified()
                .map(DateTime::<Utc>::from)
                .unwrap_or(now);
            candidates.push((path, modified, metadata.len()));
        }

        // Newest first; retention keeps a suffix of the chronological list.
        candidates.sort_by(|a, b| b.1.cmp(&a.1));

        let mut deleted = Vec::new();
        let mut survivors = Vec::new();
        for (path, modified, len) in candidates {
            let expired = self
                .max_age
                .map(|age| modified < now - age)
                .unwrap_or(false);
            if expired {
                deleted.push(path);
            } else {
                survivors.push((path, len));
            }
        }

        if let Some(max_total) = self.max_total_bytes {
            let mut total: u64 = 0;
            for (path, len) in survivors {
                if total > max_total {
                    deleted.push(path);
                } else {
                    total += len;
                }
            }
        }

        for path in &deleted {
            match fs::remove_file(path) {
                Ok(()) => tracing::debug!(path = %path.display(), "retention deleted file"),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "retention delete failed")
                }
            }
        }

        Ok(deleted)
    }
}

/// Everything needed to put a sink on disk.
#[derive(Debug, Clone)]
pub struct FileSinkSettings {
    /// Logical log name expanded into `{0}`.
    pub log_name: String,
    pub directory: PathBuf,
    /// Template string; `None` uses [`DEFAULT_FILENAME_TEMPLATE`].
    pub filename_template: Option<String>,
    pub timestamp_local: bool,
    /// Time-based rotation period; `None` disables the clock.
    pub rotation_interval: Option<Duration>,
    pub retention: RetentionPolicy,
}

/// The live on-disk half of a file-backed sink.
///
/// All methods run on the sink's writer thread, which is the per-sink
/// serialization point: rotation and retention never race with writes.
pub struct FileBackedWriter {
    settings: FileSinkSettings,
    template: FilenameTemplate,
    extension: &'static str,
    matcher: Regex,
    clock: Option<RotationClock>,
    current_path: PathBuf,
    file: Option<BufWriter<File>>,
    current_len: u64,
    rotations: u64,
}

impl FileBackedWriter {
    /// Creates the directory, expands the first filename and opens it for
    /// append.
    pub fn open(settings: FileSinkSettings, extension: &'static str, now: DateTime<Utc>) -> Result<Self> {
        if settings.log_name.is_empty() {
            return Err(SinkError::InvalidArgument(
                "file-backed sinks need a log name".to_string(),
            ));
        }
        let template = match &settings.filename_template {
            Some(raw) => FilenameTemplate::parse(raw)?,
            None => FilenameTemplate::default(),
        };
        fs::create_dir_all(&settings.directory)?;

        let matcher = template.matcher(&settings.log_name, extension);
        let clock = settings
            .rotation_interval
            .map(|interval| RotationClock::new(now, interval));

        let mut writer = Self {
            settings,
            template,
            extension,
            matcher,
            clock,
            current_path: PathBuf::new(),
            file: None,
            current_len: 0,
            rotations: 0,
        };
        writer.open_current(now)?;
        Ok(writer)
    }

    fn window_end(&self, start: DateTime<Utc>) -> DateTime<Utc> {
        match &self.clock {
            Some(clock) => start + clock.interval(),
            None => start,
        }
    }

    fn open_current(&mut self, start: DateTime<Utc>) -> io::Result<()> {
        let filename = self.template.expand(
            &self.settings.log_name,
            start,
            self.window_end(start),
            self.settings.timestamp_local,
            self.extension,
        );
        let path = self.settings.directory.join(filename);
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        self.current_len = file.metadata()?.len();
        self.file = Some(BufWriter::new(file));
        self.current_path = path;
        Ok(())
    }

    pub fn current_path(&self) -> &Path {
        &self.current_path
    }

    pub fn current_len(&self) -> u64 {
        self.current_len
    }

    pub fn rotations(&self) -> u64 {
        self.rotations
    }

    pub fn next_rotation_at(&self) -> Option<DateTime<Utc>> {
        self.clock.as_ref().map(RotationClock::next_rotation_at)
    }

    /// Writes one formatted line, rotating first when the clock is due.
    pub fn write_line(&mut self, line: &str, now: DateTime<Utc>) -> io::Result<()> {
        self.checked_rotate(now)?;
        let file = self.open_file(now)?;
        file.write_all(line.as_bytes())?;
        file.write_all(b"\n")?;
        self.current_len += line.len() as u64 + 1;
        Ok(())
    }

    /// Writes raw bytes, rotating first when the clock is due.
    pub fn write_all(&mut self, bytes: &[u8], now: DateTime<Utc>) -> io::Result<()> {
        self.checked_rotate(now)?;
        let file = self.open_file(now)?;
        file.write_all(bytes)?;
        self.current_len += bytes.len() as u64;
        Ok(())
    }

    /// The open handle, reopening after a failed rotation or a close.
    fn open_file(&mut self, now: DateTime<Utc>) -> io::Result<&mut BufWriter<File>> {
        if self.file.is_none() {
            self.open_current(now)?;
        }
        match self.file.as_mut() {
            Some(file) => Ok(file),
            None => Err(io::Error::new(io::ErrorKind::Other, "log file is closed")),
        }
    }

    /// Rotates iff the clock is due; repeated calls inside one interval are
    /// no-ops.
    pub fn checked_rotate(&mut self, now: DateTime<Utc>) -> io::Result<bool> {
        match &self.clock {
            Some(clock) if clock.due(now) => {
                self.rotate(now)?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Rotates unconditionally (demand rotation).
    pub fn force_rotate(&mut self, now: DateTime<Utc>) -> io::Result<bool> {
        self.rotate(now)?;
        Ok(true)
    }

    fn rotate(&mut self, now: DateTime<Utc>) -> io::Result<()> {
        if let Some(file) = self.file.as_mut() {
            file.flush()?;
        }
        self.file = None;
        self.open_current(now)?;
        // Advance only once the new file is open: a failed rotation stays
        // due and is retried on the next write.
        if let Some(clock) = self.clock.as_mut() {
            clock.advance(now);
        }
        self.rotations += 1;

        let deleted = self.settings.retention.apply(
            &self.settings.directory,
            &self.matcher,
            &self.current_path,
            now,
        )?;
        if !deleted.is_empty() {
            tracing::debug!(
                log = %self.settings.log_name,
                deleted = deleted.len(),
                "retention removed prior files"
            );
        }
        Ok(())
    }

    pub fn flush(&mut self) -> io::Result<()> {
        match self.file.as_mut() {
            Some(file) => file.flush(),
            None => Ok(()),
        }
    }

    /// Flushes and closes; a zero-length current file is deleted.
    pub fn close(&mut self) -> io::Result<()> {
        if let Some(mut file) = self.file.take() {
            file.flush()?;
        }
        if let Ok(metadata) = fs::metadata(&self.current_path) {
            if metadata.len() == 0 {
                let _ = fs::remove_file(&self.current_path);
            }
        }
        Ok(())
    }
}

impl Drop for FileBackedWriter {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::time::SystemTime;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap()
    }

    fn settings(dir: &Path, interval: Option<Duration>) -> FileSinkSettings {
        FileSinkSettings {
            log_name: "svc".to_string(),
            directory: dir.to_path_buf(),
            filename_template: None,
            timestamp_local: false,
            rotation_interval: interval,
            retention: RetentionPolicy::default(),
        }
    }

    #[test]
    fn test_template_parse_rejects_high_indices() {
        assert!(FilenameTemplate::parse("{0}_{3}").is_err());
        assert!(FilenameTemplate::parse("{10}").is_err());
        assert!(FilenameTemplate::parse("{x}").is_err());
        assert!(FilenameTemplate::parse("{0").is_err());
    }

    #[test]
    fn test_template_expansion() {
        let template = FilenameTemplate::parse("{0}-{1}-to-{2}").unwrap();
        let start = t0();
        let end = start + Duration::hours(1);
        let name = template.expand("svc", start, end, false, ".log");
        assert_eq!(name, "svc-20240301000000-to-20240301010000.log");
    }

    #[test]
    fn test_local_expansion_is_strictly_longer() {
        let template = FilenameTemplate::parse("{0}_{1}").unwrap();
        let utc = template.expand("svc", t0(), t0(), false, ".log");
        let local = template.expand("svc", t0(), t0(), true, ".log");
        assert!(local.len() > utc.len());
    }

    #[test]
    fn test_matcher_covers_expansions() {
        let template = FilenameTemplate::parse("{0}_{1}").unwrap();
        let matcher = template.matcher("svc", ".log");
        let utc = template.expand("svc", t0(), t0(), false, ".log");
        let local = template.expand("svc", t0(), t0(), true, ".log");
        assert!(matcher.is_match(&utc));
        assert!(matcher.is_match(&local));
        assert!(!matcher.is_match("other_20240301000000.log"));
        assert!(!matcher.is_match("svc_20240301000000.etl"));
    }

    #[test]
    fn test_rotation_clock_fires_once_per_interval() {
        let dir = tempfile::tempdir().unwrap();
        let interval = Duration::seconds(100);
        let mut writer =
            FileBackedWriter::open(settings(dir.path(), Some(interval)), ".log", t0()).unwrap();

        let mut rotations = 0;
        for step in 1..=5 {
            let now = t0() + Duration::seconds(20 * step);
            if writer.checked_rotate(now).unwrap() {
                rotations += 1;
            }
        }
        assert_eq!(rotations, 1);
        assert_eq!(writer.rotations(), 1);
    }

    #[test]
    fn test_consecutive_checked_rotates_are_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let interval = Duration::seconds(60);
        let mut writer =
            FileBackedWriter::open(settings(dir.path(), Some(interval)), ".log", t0()).unwrap();

        let now = t0() + Duration::seconds(61);
        assert!(writer.checked_rotate(now).unwrap());
        assert!(!writer.checked_rotate(now).unwrap());
    }

    #[test]
    fn test_rotation_switches_files() {
        let dir = tempfile::tempdir().unwrap();
        let interval = Duration::seconds(60);
        let mut writer =
            FileBackedWriter::open(settings(dir.path(), Some(interval)), ".log", t0()).unwrap();
        writer.write_line("first", t0()).unwrap();
        let before = writer.current_path().to_path_buf();

        writer
            .write_line("second", t0() + Duration::seconds(75))
            .unwrap();
        assert_ne!(writer.current_path(), before.as_path());
        writer.flush().unwrap();

        let first = fs::read_to_string(&before).unwrap();
        assert_eq!(first, "first\n");
    }

    #[test]
    fn test_empty_file_removed_on_close() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = FileBackedWriter::open(settings(dir.path(), None), ".log", t0()).unwrap();
        let path = writer.current_path().to_path_buf();
        assert!(path.exists());
        writer.close().unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn test_nonempty_file_kept_on_close() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = FileBackedWriter::open(settings(dir.path(), None), ".log", t0()).unwrap();
        writer.write_line("keep me", t0()).unwrap();
        let path = writer.current_path().to_path_buf();
        writer.close().unwrap();
        assert!(path.exists());
    }

    fn make_aged_file(dir: &Path, name: &str, age_days: i64, len: usize, now: DateTime<Utc>) {
        let path = dir.join(name);
        fs::write(&path, vec![b'x'; len]).unwrap();
        let stamp = now - Duration::days(age_days);
        let file = File::options().write(true).open(&path).unwrap();
        file.set_modified(SystemTime::from(stamp)).unwrap();
    }

    #[test]
    fn test_age_retention_keeps_recent_suffix() {
        let dir = tempfile::tempdir().unwrap();
        let template = FilenameTemplate::default();
        let matcher = template.matcher("svc", ".log");
        let now = Utc::now();

        for day in 0..15 {
            make_aged_file(
                dir.path(),
                &format!("svc_202401010000{:02}.log", day),
                day,
                10,
                now,
            );
        }

        let policy = RetentionPolicy {
            max_age: Some(Duration::days(7)),
            max_total_bytes: None,
        };
        let keep = dir.path().join("svc_20249999999999.log");
        let deleted = policy.apply(dir.path(), &matcher, &keep, now).unwrap();
        assert_eq!(deleted.len(), 7);

        let survivors = fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(survivors, 8);
    }

    #[test]
    fn test_size_retention_keeps_newest_over_threshold() {
        let dir = tempfile::tempdir().unwrap();
        let template = FilenameTemplate::default();
        let matcher = template.matcher("svc", ".log");
        let now = Utc::now();

        // Ten files of 100 bytes, cap at half the total.
        for day in 0..10 {
            make_aged_file(
                dir.path(),
                &format!("svc_202401010000{:02}.log", day),
                day,
                100,
                now,
            );
        }

        let policy = RetentionPolicy {
            max_age: None,
            max_total_bytes: Some(500),
        };
        let keep = dir.path().join("svc_20249999999999.log");
        let deleted = policy.apply(dir.path(), &matcher, &keep, now).unwrap();

        // The newest files whose cumulative size first exceeds the cap
        // survive: 600 bytes across six files; the four oldest go.
        assert_eq!(deleted.len(), 4);
        let survivors = fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(survivors, 6);
    }

    #[test]
    fn test_retention_ignores_unrelated_files() {
        let dir = tempfile::tempdir().unwrap();
        let template = FilenameTemplate::default();
        let matcher = template.matcher("svc", ".log");
        let now = Utc::now();

        make_aged_file(dir.path(), "svc_20240101000000.log", 30, 10, now);
        make_aged_file(dir.path(), "unrelated.log", 30, 10, now);

        let policy = RetentionPolicy {
            max_age: Some(Duration::days(7)),
            max_total_bytes: None,
        };
        let keep = dir.path().join("nope.log");
        let deleted = policy.apply(dir.path(), &matcher, &keep, now).unwrap();
        assert_eq!(deleted.len(), 1);
        assert!(dir.path().join("unrelated.log").exists());
    }
}
