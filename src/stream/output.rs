//! Memory-mapped file output for finalized images.
//!
//! This module provides the [`Output`] type used by [`crate::Image::write_to_files`]. Once a
//! stream is laid out the exact size of both the data blob and the relocation table is known,
//! so each file is created at its final size, memory-mapped, filled, and flushed.
//!
//! # Atomic Operations
//!
//! Bytes are written to a temporary file next to the target, in the same directory so the
//! final rename stays on one filesystem. Only [`Output::finalize`] renames it over the
//! target path; until then any file already at that path is left untouched.
//!
//! # Resource Management
//!
//! An [`Output`] that is dropped without [`Output::finalize`] having succeeded removes its
//! temporary file, so a failed write never leaves a half-written artifact behind.
//!
//! # Usage Examples
//!
//! ```rust,ignore
//! let mut output = Output::create("image.bin", 16)?;
//! output.write_at(0, &[1, 2, 3, 4])?;
//! output.flush()?;
//! output.finalize()?;
//! ```

use std::{
    ffi::OsString,
    path::{Path, PathBuf},
};

use memmap2::{MmapMut, MmapOptions};

use crate::{Error, Result};

/// A memory-mapped output file that only replaces its target once finalized.
///
/// Zero-sized files are created but not mapped, since an empty mapping is rejected by most
/// platforms.
pub struct Output {
    /// The memory mapping of the temporary file, absent for empty files
    mmap: Option<MmapMut>,

    /// The temporary file the bytes are written to
    temp_path: PathBuf,

    /// The target path
    target_path: PathBuf,

    /// Whether the temporary file has been moved to the target path
    finalized: bool,
}

/// Sibling path `.<name>.<pid>.tmp` of `target_path`.
fn temp_path_for(target_path: &Path) -> PathBuf {
    let mut name = OsString::from(".");
    name.push(target_path.file_name().unwrap_or_default());
    name.push(format!(".{}.tmp", std::process::id()));
    target_path.with_file_name(name)
}

impl Output {
    /// Creates a temporary file of `size` bytes next to `target_path` and maps it into memory.
    ///
    /// Nothing at `target_path` itself is touched until [`Output::finalize`].
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::FileError`] if the file cannot be created or sized, or
    /// [`crate::Error::MmapFailed`] if the mapping cannot be created.
    pub fn create<P: AsRef<Path>>(target_path: P, size: u64) -> Result<Self> {
        let target_path = target_path.as_ref().to_path_buf();
        let temp_path = temp_path_for(&target_path);

        let file = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&temp_path)?;

        let mut output = Self {
            mmap: None,
            temp_path,
            target_path,
            finalized: false,
        };

        // From here on a failure drops `output`, which removes the temporary file again
        file.set_len(size)?;

        if size > 0 {
            let mmap = unsafe {
                MmapOptions::new()
                    .map_mut(&file)
                    .map_err(|e| Error::MmapFailed(format!("Failed to create memory mapping: {e}")))?
            };
            output.mmap = Some(mmap);
        }

        Ok(output)
    }

    /// Writes data at a specific offset in the file.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::OutOfBounds`] if the write would exceed the file size.
    pub fn write_at(&mut self, offset: u64, data: &[u8]) -> Result<()> {
        if data.is_empty() {
            return Ok(());
        }

        let Some(mmap) = self.mmap.as_mut() else {
            return Err(Error::OutOfBounds);
        };

        let start = usize::try_from(offset).map_err(|_| Error::OutOfBounds)?;
        let Some(end) = start.checked_add(data.len()) else {
            return Err(Error::OutOfBounds);
        };
        if end > mmap.len() {
            return Err(Error::OutOfBounds);
        }

        mmap[start..end].copy_from_slice(data);
        Ok(())
    }

    /// Gets the total size of the file.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.mmap.as_ref().map_or(0, |mmap| mmap.len() as u64)
    }

    /// Gets the target path of the file.
    #[must_use]
    pub fn target_path(&self) -> &Path {
        &self.target_path
    }

    /// Gets the path of the temporary file the bytes are written to.
    #[must_use]
    pub fn temp_path(&self) -> &Path {
        &self.temp_path
    }

    /// Flushes all pending writes to the temporary file.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::MmapFailed`] if the flush fails.
    pub fn flush(&self) -> Result<()> {
        if let Some(mmap) = self.mmap.as_ref() {
            mmap.flush()
                .map_err(|e| Error::MmapFailed(format!("Failed to flush memory mapping: {e}")))?;
        }
        Ok(())
    }

    /// Flushes and moves the temporary file over the target path.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::MmapFailed`] if the flush fails or [`crate::Error::FileError`]
    /// if the rename fails; the temporary file is then removed and the target left as it was.
    pub fn finalize(mut self) -> Result<()> {
        self.flush()?;
        let size = self.size();

        // Release the mapping before the file it maps is renamed
        self.mmap = None;
        std::fs::rename(self.temp_path(), self.target_path())?;

        self.finalized = true;
        log::trace!("Finalized {} ({} bytes)", self.target_path.display(), size);
        Ok(())
    }
}

impl Drop for Output {
    fn drop(&mut self) {
        if !self.finalized {
            self.mmap = None;
            let _ = std::fs::remove_file(&self.temp_path);
        }
    }
}
