use camino::{Utf8Path, Utf8PathBuf};
use chrono::Utc;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};
use tracing::warn;

use crate::event::{EventFields, EventKind};
use crate::AuditError;

/// Rotate the active file once it reaches this size.
pub const ROTATION_SIZE_BYTES: u64 = 10 * 1024 * 1024;
/// Fsync after this many lines...
pub const FSYNC_EVERY_N_LINES: u32 = 10;
/// ...or after this much wall time, whichever comes first.
pub const FSYNC_INTERVAL: Duration = Duration::from_secs(1);

/// Durability and rotation tuning for an [`AuditLog`].
#[derive(Debug, Clone, Copy)]
pub struct AuditOptions {
    pub rotation_bytes: u64,
    pub fsync_every_lines: u32,
    pub fsync_interval: Duration,
}

impl Default for AuditOptions {
    fn default() -> Self {
        Self {
            rotation_bytes: ROTATION_SIZE_BYTES,
            fsync_every_lines: FSYNC_EVERY_N_LINES,
            fsync_interval: FSYNC_INTERVAL,
        }
    }
}

struct Writer {
    file: Option<File>,
    lines_since_fsync: u32,
    last_fsync: Instant,
}

/// Append-only JSONL event log.
///
/// One instance owns the append handle; an internal lock serializes the
/// rotation check, the line write, and the fsync bookkeeping so the
/// three always happen together. Readers open the file independently.
pub struct AuditLog {
    path: Utf8PathBuf,
    options: AuditOptions,
    inner: Mutex<Writer>,
}

impl AuditLog {
    /// Open (or create) the log at `path` with default options.
    ///
    /// # Errors
    ///
    /// Fails only when the parent directory cannot be created or the
    /// file cannot be opened for append.
    pub fn open(path: impl AsRef<Utf8Path>) -> Result<Self, AuditError> {
        Self::with_options(path, AuditOptions::default())
    }

    /// Open the log at the platform default `<scout home>/audit.jsonl`.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`AuditLog::open`].
    pub fn open_default() -> Result<Self, AuditError> {
        Self::open(scout_utils::audit_log_path())
    }

    /// Open with explicit durability/rotation tuning.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`AuditLog::open`].
    pub fn with_options(
        path: impl AsRef<Utf8Path>,
        options: AuditOptions,
    ) -> Result<Self, AuditError> {
        let path = path.as_ref().to_owned();
        if let Some(parent) = path.parent() {
            scout_utils::ensure_dir_all(parent)?;
        }
        let mut file = Self::open_append(&path)?;
        Self::repair_trailing_partial_line(&path, &mut file)?;
        Ok(Self {
            path,
            options,
            inner: Mutex::new(Writer {
                file: Some(file),
                lines_since_fsync: 0,
                last_fsync: Instant::now(),
            }),
        })
    }

    /// Path of the active log file.
    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// Serialize one event and append it as a single `\n`-terminated
    /// line. Returns quickly on the buffered path; fsync happens on the
    /// configured cadence. Failures are logged and swallowed.
    pub fn log(&self, kind: EventKind, fields: EventFields) {
        let event = fields.into_event(kind, Utc::now());
        let mut line = match serde_json::to_string(&event) {
            Ok(line) => line,
            Err(e) => {
                warn!("audit log: dropping unencodable event: {e}");
                return;
            }
        };
        line.push('\n');

        let mut writer = self.lock();
        if let Err(e) = self.maybe_rotate(&mut writer) {
            warn!("audit log: rotation failed, continuing on oversized file: {e}");
        }
        match self.ensure_open(&mut writer) {
            Ok(file) => {
                if let Err(e) = file.write_all(line.as_bytes()) {
                    warn!("audit log: write failed: {e}");
                    return;
                }
            }
            Err(e) => {
                warn!("audit log: reopen failed: {e}");
                return;
            }
        }
        self.fsync_if_needed(&mut writer);
    }

    /// Force flush + fsync, e.g. before process exit or before reading
    /// the log back.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error when the sync fails.
    pub fn flush(&self) -> Result<(), AuditError> {
        let mut writer = self.lock();
        if let Some(file) = writer.file.as_mut() {
            file.flush()?;
            file.sync_all()?;
        }
        Ok(())
    }

    /// Flush and release the file handle. Subsequent `log` calls reopen.
    pub fn close(&self) {
        let mut writer = self.lock();
        Self::close_file(&mut writer);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Writer> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn open_append(path: &Utf8Path) -> std::io::Result<File> {
        OpenOptions::new().create(true).append(true).open(path)
    }

    /// A crash can leave the file ending mid-object with no newline.
    /// Terminate that fragment at open time so the next append starts on
    /// its own line; readers then skip the fragment as one malformed
    /// line instead of corrupting the following event.
    fn repair_trailing_partial_line(path: &Utf8Path, file: &mut File) -> std::io::Result<()> {
        use std::io::{Read, Seek, SeekFrom};
        let mut reader = File::open(path)?;
        let len = reader.metadata()?.len();
        if len == 0 {
            return Ok(());
        }
        reader.seek(SeekFrom::End(-1))?;
        let mut last = [0u8; 1];
        reader.read_exact(&mut last)?;
        if last[0] != b'\n' {
            warn!("audit log: terminating partial trailing line left by a previous crash");
            file.write_all(b"\n")?;
        }
        Ok(())
    }

    fn ensure_open<'a>(&self, writer: &'a mut Writer) -> std::io::Result<&'a mut File> {
        if writer.file.is_none() {
            writer.file = Some(Self::open_append(&self.path)?);
            writer.lines_since_fsync = 0;
            writer.last_fsync = Instant::now();
        }
        Ok(writer.file.as_mut().expect("file opened above"))
    }

    fn close_file(writer: &mut Writer) {
        if let Some(mut file) = writer.file.take() {
            let _ = file.flush();
            let _ = file.sync_all();
        }
    }

    /// Rotate once the active file reaches the threshold: gzip its bytes
    /// into `<stem>_YYYYMMDD_HHMMSS.jsonl.gz` beside it, remove the
    /// original, and let the next write reopen a fresh file. No event is
    /// lost; rotation happens before the pending line is written.
    fn maybe_rotate(&self, writer: &mut Writer) -> std::io::Result<()> {
        let size = match fs::metadata(&self.path) {
            Ok(meta) => meta.len(),
            Err(_) => return Ok(()),
        };
        if size < self.options.rotation_bytes {
            return Ok(());
        }

        Self::close_file(writer);
        let ts = Utc::now().format("%Y%m%d_%H%M%S").to_string();
        let stem = self.path.file_stem().unwrap_or("audit");
        let parent = self.path.parent().unwrap_or_else(|| Utf8Path::new("."));

        // Rotations can land inside the same wall-clock second; suffix
        // the archive name rather than clobber an earlier one.
        let mut archived = parent.join(format!("{stem}_{ts}.jsonl.gz"));
        let mut n = 0u32;
        while archived.exists() {
            n += 1;
            archived = parent.join(format!("{stem}_{ts}_{n}.jsonl.gz"));
        }

        let data = fs::read(&self.path)?;
        let mut gz = GzEncoder::new(File::create(&archived)?, Compression::default());
        gz.write_all(&data)?;
        gz.finish()?.sync_all()?;
        fs::remove_file(&self.path)?;
        Ok(())
    }

    fn fsync_if_needed(&self, writer: &mut Writer) {
        writer.lines_since_fsync += 1;
        let elapsed = writer.last_fsync.elapsed();
        if writer.lines_since_fsync >= self.options.fsync_every_lines
            || elapsed >= self.options.fsync_interval
        {
            if let Some(file) = writer.file.as_mut() {
                if let Err(e) = file.flush().and_then(|()| file.sync_all()) {
                    warn!("audit log: fsync failed: {e}");
                }
            }
            writer.lines_since_fsync = 0;
            writer.last_fsync = Instant::now();
        }
    }
}

impl Drop for AuditLog {
    fn drop(&mut self) {
        self.close();
    }
}
