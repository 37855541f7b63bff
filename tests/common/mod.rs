//! Test helpers: an in-memory file backend over empty files on disk
//!
//! Files are created empty on disk so that directory scanning finds them,
//! their content lives in a `MockBackend` keyed by path.

#![allow(dead_code)]

use filecube::accessor;
use filecube::backend::{Attributes, Backend, FileHandle, OpenMode};
use filecube::errors::{FilecubeError, Result};
use filecube::keyring::Keyring;
use ndarray::{ArrayD, ArrayViewD};
use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Content of one mock file
#[derive(Debug, Clone, Default)]
pub struct MockFile {
    pub coords: HashMap<String, Vec<f64>>,
    /// Variables: dimension names in storage order and data
    pub variables: HashMap<String, (Vec<String>, ArrayD<f32>)>,
    pub attributes: HashMap<String, Attributes>,
}

impl MockFile {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn coord(mut self, name: &str, values: Vec<f64>) -> Self {
        self.coords.insert(name.to_string(), values);
        self
    }

    pub fn variable(mut self, name: &str, dims: &[&str], data: ArrayD<f32>) -> Self {
        assert_eq!(dims.len(), data.ndim(), "one dimension name per axis");
        let dims = dims.iter().map(|d| d.to_string()).collect();
        self.variables.insert(name.to_string(), (dims, data));
        self
    }

    pub fn attribute(mut self, variable: &str, name: &str, value: serde_json::Value) -> Self {
        self.attributes
            .entry(variable.to_string())
            .or_default()
            .insert(name.to_string(), value);
        self
    }
}

type Store = Arc<Mutex<HashMap<PathBuf, MockFile>>>;

/// Backend serving `MockFile`s and counting opened and closed handles
#[derive(Debug, Default)]
pub struct MockBackend {
    files: Store,
    opened: AtomicUsize,
    closed: AtomicUsize,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty file at `dir/name` and register its content
    pub fn add_file(&self, dir: &Path, name: &str, content: MockFile) -> PathBuf {
        let path = dir.join(name);
        touch(&path);
        self.files
            .lock()
            .expect("store poisoned")
            .insert(path.clone(), content);
        path
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    /// Current data of a variable
    pub fn data(&self, path: &Path, variable: &str) -> ArrayD<f32> {
        let files = self.files.lock().expect("store poisoned");
        files[path].variables[variable].1.clone()
    }
}

impl Backend for MockBackend {
    fn open(&self, path: &Path, _mode: OpenMode) -> Result<Box<dyn FileHandle>> {
        let file = self
            .files
            .lock()
            .expect("store poisoned")
            .get(path)
            .cloned()
            .ok_or_else(|| FilecubeError::backend(path, "unknown mock file"))?;
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockHandle {
            path: path.to_path_buf(),
            file,
            store: Arc::clone(&self.files),
        }))
    }

    fn close(&self, _handle: &mut dyn FileHandle) -> Result<()> {
        self.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct MockHandle {
    path: PathBuf,
    file: MockFile,
    store: Store,
}

impl MockHandle {
    fn variable(&self, name: &str) -> Result<&(Vec<String>, ArrayD<f32>)> {
        self.file
            .variables
            .get(name)
            .ok_or_else(|| FilecubeError::backend(&self.path, format!("no variable '{name}'")))
    }
}

impl FileHandle for MockHandle {
    fn path(&self) -> &Path {
        &self.path
    }

    fn native_dimension_order(&self, variable: &str) -> Result<Vec<String>> {
        Ok(self.variable(variable)?.0.clone())
    }

    fn coordinate_values(&self, dimension: &str) -> Result<Vec<f64>> {
        self.file
            .coords
            .get(dimension)
            .cloned()
            .ok_or_else(|| FilecubeError::backend(&self.path, format!("no coordinate '{dimension}'")))
    }

    fn read(&self, variable: &str, keyring: &Keyring) -> Result<ArrayD<f32>> {
        let (dims, data) = self.variable(variable)?;
        assert_eq!(&keyring.dims(), dims, "keyring follows storage order");
        accessor::take(keyring, data.view())
    }

    fn write(&mut self, variable: &str, keyring: &Keyring, chunk: ArrayViewD<'_, f32>) -> Result<()> {
        let path = self.path.clone();
        let (dims, data) = self
            .file
            .variables
            .get_mut(variable)
            .ok_or_else(|| FilecubeError::backend(&path, format!("no variable '{variable}'")))?;
        assert_eq!(&keyring.dims(), dims, "keyring follows storage order");
        accessor::place(keyring, data, chunk)?;
        self.store
            .lock()
            .expect("store poisoned")
            .insert(path, self.file.clone());
        Ok(())
    }

    fn variable_attributes(&self, variable: &str) -> Result<Attributes> {
        Ok(self.file.attributes.get(variable).cloned().unwrap_or_default())
    }
}

/// Create an empty file, and its parent directories
pub fn touch(path: &Path) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("Failed to create directory");
    }
    File::create(path).expect("Failed to create file");
}

/// Create empty files named `names` in `dir`
pub fn touch_all(dir: &Path, names: &[&str]) {
    for name in names {
        touch(&dir.join(name));
    }
}

/// Filenames of the commands, relative to `root`
pub fn command_files(commands: &[filecube::filegroup::Command], root: &Path) -> Vec<String> {
    commands
        .iter()
        .map(|c| {
            c.filename()
                .strip_prefix(root)
                .expect("command outside of root")
                .to_string_lossy()
                .into_owned()
        })
        .collect()
}
