//! File backend abstraction
//!
//! The core never touches a file format directly. It opens files through a
//! [`Backend`], reads and writes slabs through the returned [`FileHandle`],
//! and releases the handle through the backend again. Every handle acquired
//! by the core is wrapped in a [`ScopedFile`] guard so it is closed on every
//! exit path.

use crate::errors::{FilecubeError, Result};
use crate::keyring::Keyring;
use ndarray::{ArrayD, ArrayViewD};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::Level;

/// Variable attributes, as found in a file
pub type Attributes = HashMap<String, JsonValue>;

/// How a file is opened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    Read,
    ReadWrite,
    Create,
}

impl fmt::Display for OpenMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mode = match self {
            Self::Read => "r",
            Self::ReadWrite => "r+",
            Self::Create => "w",
        };
        f.write_str(mode)
    }
}

/// An opened file
pub trait FileHandle {
    /// Path the handle was opened with
    fn path(&self) -> &Path;

    /// Dimension names of `variable`, in the order they are stored
    fn native_dimension_order(&self, variable: &str) -> Result<Vec<String>>;

    /// Values of a coordinate variable stored in the file
    fn coordinate_values(&self, dimension: &str) -> Result<Vec<f64>>;

    /// Read a slab of `variable`.
    ///
    /// `keyring` lists the dimensions of the variable in storage order. The
    /// returned array keeps one axis per key that keeps an axis
    /// ([`crate::keyring::Key::keeps_axis`]), in keyring order.
    fn read(&self, variable: &str, keyring: &Keyring) -> Result<ArrayD<f32>>;

    /// Write a slab of `variable`, `chunk` laid out as [`FileHandle::read`] would return it
    fn write(&mut self, variable: &str, keyring: &Keyring, chunk: ArrayViewD<'_, f32>)
        -> Result<()>;

    /// Attributes of `variable`
    fn variable_attributes(&self, variable: &str) -> Result<Attributes>;
}

/// Opens and closes files of one format
pub trait Backend: Send + Sync {
    fn open(&self, path: &Path, mode: OpenMode) -> Result<Box<dyn FileHandle>>;

    /// Release a handle. Called exactly once per opened handle.
    fn close(&self, handle: &mut dyn FileHandle) -> Result<()>;
}

/// Backend refusing to open anything.
///
/// Enough for filegroups whose coordinates are all found from filenames.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoBackend;

impl Backend for NoBackend {
    fn open(&self, path: &Path, _mode: OpenMode) -> Result<Box<dyn FileHandle>> {
        Err(FilecubeError::backend(path, "no file backend configured"))
    }

    fn close(&self, _handle: &mut dyn FileHandle) -> Result<()> {
        Ok(())
    }
}

/// A file handle released when the guard goes out of scope
pub struct ScopedFile<'b> {
    backend: &'b dyn Backend,
    handle: Box<dyn FileHandle>,
    path: PathBuf,
    closed: bool,
}

impl<'b> ScopedFile<'b> {
    /// Open `path`, logging at `level`
    pub fn open(backend: &'b dyn Backend, path: &Path, mode: OpenMode, level: Level) -> Result<Self> {
        crate::config::log_at(level, &format!("Opening {} ({mode})", path.display()));
        let handle = backend.open(path, mode)?;
        Ok(Self {
            backend,
            handle,
            path: path.to_path_buf(),
            closed: false,
        })
    }

    #[must_use]
    pub fn handle(&self) -> &dyn FileHandle {
        self.handle.as_ref()
    }

    pub fn handle_mut(&mut self) -> &mut dyn FileHandle {
        self.handle.as_mut()
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Close now, reporting the backend error if any
    pub fn close(mut self) -> Result<()> {
        self.closed = true;
        self.backend.close(self.handle.as_mut())
    }
}

impl Drop for ScopedFile<'_> {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Err(e) = self.backend.close(self.handle.as_mut()) {
            tracing::warn!(path = %self.path.display(), error = %e, "Failed to close file");
        }
    }
}

impl fmt::Debug for ScopedFile<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopedFile")
            .field("path", &self.path)
            .field("closed", &self.closed)
            .finish()
    }
}
