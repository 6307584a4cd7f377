//! Filesystem layer for PBIR report folders.
//!
//! Documents are replaced, never rewritten in place: [`write_json`] serializes into a temp file
//! next to the destination, syncs it and renames it over the old document. A crash mid-write
//! leaves either the old document or the new one on disk.
//!
//! Reads are lenient on request: [`load_json_lenient`] logs and skips unreadable or malformed
//! documents so one bad file does not block a whole report.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use serde_json::Value;
use tempfile::NamedTempFile;

/// Number of attempts for a document write before the error is surfaced.
const WRITE_ATTEMPTS: usize = 3;
const WRITE_RETRY_DELAY: Duration = Duration::from_millis(50);

#[derive(Debug, thiserror::Error)]
pub enum JsonFileError {
    #[error("unable to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("unable to parse JSON in {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("unable to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl JsonFileError {
    pub fn path(&self) -> &Path {
        match self {
            JsonFileError::Read { path, .. }
            | JsonFileError::Parse { path, .. }
            | JsonFileError::Write { path, .. } => path,
        }
    }
}

/// Directory that will hold the temp file for `path`.
///
/// `Path::parent` yields `""` for a bare file name, which is the current directory.
fn staging_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

/// Replace `dest` with whatever `fill` writes into a staged temp file.
///
/// When `fill` fails the staged file is dropped (and deleted) and `dest` is left untouched.
fn replace_with(dest: &Path, fill: impl FnOnce(&mut File) -> io::Result<()>) -> io::Result<()> {
    let dir = staging_dir(dest);
    fs::create_dir_all(dir)?;

    let mut staged = NamedTempFile::new_in(dir)?;
    fill(staged.as_file_mut())?;
    staged.as_file_mut().flush()?;
    staged.as_file().sync_all()?;

    let staged = staged.into_temp_path();
    rename_over(&staged, dest)?;

    // The document is already in place; a failed directory sync only weakens durability.
    if let Err(err) = File::open(dir).and_then(|d| d.sync_all()) {
        log::trace!("directory sync skipped for {}: {err}", dir.display());
    }
    Ok(())
}

/// Atomically replace `dest` with `bytes`, creating parent directories as needed.
pub fn atomic_write_bytes(dest: impl AsRef<Path>, bytes: &[u8]) -> io::Result<()> {
    replace_with(dest.as_ref(), |file| file.write_all(bytes))
}

/// Serialize a document the way PBIR files are stored: pretty-printed with a 2-space indent.
pub fn to_pretty_json(value: &Value) -> String {
    // Serializing a `Value` into a string cannot fail.
    serde_json::to_string_pretty(value).unwrap_or_default()
}

/// Read and parse a JSON document. A leading UTF-8 BOM is tolerated.
pub fn read_json(path: impl AsRef<Path>) -> Result<Value, JsonFileError> {
    let path = path.as_ref();
    let text = fs::read_to_string(path).map_err(|source| JsonFileError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let text = text.strip_prefix('\u{feff}').unwrap_or(&text);
    serde_json::from_str(text).map_err(|source| JsonFileError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Like [`read_json`], but logs the failure and returns `None` instead of an error.
pub fn load_json_lenient(path: impl AsRef<Path>) -> Option<Value> {
    match read_json(path) {
        Ok(value) => Some(value),
        Err(err) => {
            log::warn!("skipping document: {err}");
            None
        }
    }
}

/// Atomically replace `path` with the pretty-printed `value`.
///
/// Transient failures (interrupted syscalls, sharing violations while another process briefly
/// holds the file) are retried before the error is returned.
pub fn write_json(path: impl AsRef<Path>, value: &Value) -> Result<(), JsonFileError> {
    let path = path.as_ref();
    let text = to_pretty_json(value);

    let mut attempt = 1;
    loop {
        match atomic_write_bytes(path, text.as_bytes()) {
            Ok(()) => return Ok(()),
            Err(err) if attempt < WRITE_ATTEMPTS && is_transient(&err) => {
                log::debug!(
                    "retrying write of {} after {err} (attempt {attempt})",
                    path.display()
                );
                attempt += 1;
                thread::sleep(WRITE_RETRY_DELAY);
            }
            Err(source) => {
                return Err(JsonFileError::Write {
                    path: path.to_path_buf(),
                    source,
                })
            }
        }
    }
}

fn is_transient(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::Interrupted | io::ErrorKind::PermissionDenied | io::ErrorKind::WouldBlock
    )
}

/// Remove a directory tree. Returns `false` when there was nothing to remove.
pub fn remove_dir_if_exists(path: impl AsRef<Path>) -> io::Result<bool> {
    let path = path.as_ref();
    if !path.is_dir() {
        return Ok(false);
    }
    fs::remove_dir_all(path)?;
    Ok(true)
}

/// Remove a single file. Returns `false` when there was nothing to remove.
pub fn remove_file_if_exists(path: impl AsRef<Path>) -> io::Result<bool> {
    let path = path.as_ref();
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(err) => Err(err),
    }
}

#[cfg(windows)]
fn rename_over(from: &Path, to: &Path) -> io::Result<()> {
    use std::os::windows::ffi::OsStrExt as _;
    use windows_sys::Win32::Storage::FileSystem::{MoveFileExW, MOVEFILE_REPLACE_EXISTING};

    let wide = |path: &Path| -> Vec<u16> {
        path.as_os_str().encode_wide().chain(std::iter::once(0)).collect()
    };
    let (from, to) = (wide(from), wide(to));
    // SAFETY: both buffers are NUL-terminated and outlive the call.
    if unsafe { MoveFileExW(from.as_ptr(), to.as_ptr(), MOVEFILE_REPLACE_EXISTING) } == 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

#[cfg(not(windows))]
fn rename_over(from: &Path, to: &Path) -> io::Result<()> {
    fs::rename(from, to)
}
