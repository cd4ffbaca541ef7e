use std::ffi::OsStr;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

/// Suffix carried by every in-progress temporary file.
pub const TEMP_FILE_SUFFIX: &str = ".tmp";

/// Prefix carried by every in-progress temporary file; hides it from casual listings.
const TEMP_FILE_PREFIX: &str = ".";

/// Returns true if `file_name` looks like a temporary file created by [`SafeFileCreator`].
pub fn is_temp_file_name(file_name: &OsStr) -> bool {
    let name = file_name.to_string_lossy();
    name.starts_with(TEMP_FILE_PREFIX) && name.ends_with(TEMP_FILE_SUFFIX)
}

/// A file writer that writes into a temporary file next to the destination and only
/// moves it into place on [`SafeFileCreator::close`].
///
/// Readers of the destination path either see the previous complete file or the new
/// complete file, never a partially written one. Concurrent creators for the same
/// destination each write their own temporary file; the last rename wins.
///
/// If the creator is dropped without being closed, the temporary file is removed.
pub struct SafeFileCreator {
    dest_path: PathBuf,
    temp_path: PathBuf,
    writer: Option<BufWriter<File>>,
}

impl SafeFileCreator {
    /// Creates the temporary file for `dest_path`, creating parent directories as needed.
    pub fn new(dest_path: impl AsRef<Path>) -> io::Result<Self> {
        let dest_path = dest_path.as_ref().to_path_buf();
        let parent = dest_path
            .parent()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "destination has no parent directory"))?;
        let file_name = dest_path
            .file_name()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "destination has no file name"))?;

        fs::create_dir_all(parent)?;

        let temp_path = parent.join(temp_file_name(file_name));
        let file = File::create(&temp_path)?;

        Ok(Self {
            dest_path,
            temp_path,
            writer: Some(BufWriter::new(file)),
        })
    }

    pub fn dest_path(&self) -> &Path {
        &self.dest_path
    }

    /// Flushes and syncs the temporary file, then atomically renames it onto the destination.
    pub fn close(mut self) -> io::Result<()> {
        let Some(writer) = self.writer.take() else {
            return Ok(());
        };

        let result = (|| {
            let file = writer.into_inner().map_err(|e| e.into_error())?;
            file.sync_all()?;
            drop(file);
            fs::rename(&self.temp_path, &self.dest_path)
        })();

        if result.is_err() {
            remove_temp(&self.temp_path);
        }
        result
    }

    fn writer(&mut self) -> io::Result<&mut BufWriter<File>> {
        self.writer
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "writing to a closed SafeFileCreator"))
    }
}

impl Write for SafeFileCreator {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.writer()?.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer()?.flush()
    }
}

impl Drop for SafeFileCreator {
    fn drop(&mut self) {
        if self.writer.take().is_some() {
            remove_temp(&self.temp_path);
        }
    }
}

fn temp_file_name(file_name: &OsStr) -> String {
    format!(
        "{TEMP_FILE_PREFIX}{}.{:016x}{TEMP_FILE_SUFFIX}",
        file_name.to_string_lossy(),
        rand::random::<u64>()
    )
}

fn remove_temp(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        if e.kind() != io::ErrorKind::NotFound {
            debug!("failed to remove temporary file {path:?}: {e}");
        }
    }
}
