//! NetCDF file backend
//!
//! Files are opened with the `netcdf` crate. Only the hyperslab a keyring
//! covers is read or written: ranges map to start/count/stride extents, an
//! explicit list of positions to the range bounding them.

use crate::accessor;
use crate::backend::{Attributes, Backend, FileHandle, OpenMode};
use crate::errors::{FilecubeError, Result};
use crate::keyring::{Key, Keyring};
use ndarray::{ArrayD, ArrayViewD, IxDyn};
use netcdf::{AttributeValue, Extent};
use serde_json::{json, Value as JsonValue};
use std::path::{Path, PathBuf};

/// Opens NetCDF files
#[derive(Debug, Default, Clone, Copy)]
pub struct NetcdfBackend;

impl NetcdfBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Backend for NetcdfBackend {
    fn open(&self, path: &Path, mode: OpenMode) -> Result<Box<dyn FileHandle>> {
        let file = match mode {
            OpenMode::Read => NetcdfFile::Read(netcdf::open(path)?),
            OpenMode::ReadWrite => NetcdfFile::Write(netcdf::append(path)?),
            OpenMode::Create => NetcdfFile::Write(netcdf::create(path)?),
        };
        Ok(Box::new(NetcdfHandle {
            path: path.to_path_buf(),
            file,
        }))
    }

    fn close(&self, handle: &mut dyn FileHandle) -> Result<()> {
        // The file is closed when the handle is dropped
        tracing::trace!(path = %handle.path().display(), "Closing NetCDF file");
        Ok(())
    }
}

enum NetcdfFile {
    Read(netcdf::File),
    Write(netcdf::FileMut),
}

/// An opened NetCDF file
pub struct NetcdfHandle {
    path: PathBuf,
    file: NetcdfFile,
}

impl NetcdfHandle {
    fn file(&self) -> &netcdf::File {
        match &self.file {
            NetcdfFile::Read(file) => file,
            NetcdfFile::Write(file) => &**file,
        }
    }

    fn variable(&self, name: &str) -> Result<netcdf::Variable<'_>> {
        self.file()
            .variable(name)
            .ok_or_else(|| FilecubeError::backend(&self.path, format!("no variable '{name}'")))
    }
}

/// Hyperslab covering a keyring, one key per dimension of the variable
struct Slab {
    extents: Vec<Extent>,
    shape: Vec<usize>,
    /// Keyring relative to the slab
    local: Keyring,
    /// Whether the slab holds positions the keyring does not select
    sparse: bool,
}

impl Slab {
    fn new(keyring: &Keyring, dims: &[usize], path: &Path) -> Result<Self> {
        if keyring.len() != dims.len() {
            return Err(FilecubeError::ShapeMismatch(format!(
                "keyring [{keyring}] has {} keys for a variable of {} dimensions in {}",
                keyring.len(),
                dims.len(),
                path.display()
            )));
        }

        let mut slab = Self {
            extents: Vec::with_capacity(dims.len()),
            shape: Vec::with_capacity(dims.len()),
            local: Keyring::new(),
            sparse: false,
        };
        for ((dim, key), &len) in keyring.iter().zip(dims) {
            let invalid = || FilecubeError::InvalidKey {
                dim: dim.to_string(),
                message: format!("key {key} on an axis of length {len} in {}", path.display()),
            };
            if key.max_position().is_some_and(|max| max >= len) {
                return Err(invalid());
            }
            let (start, count, stride, local) = match key {
                Key::None => return Err(invalid()),
                Key::Int(i) => (*i, 1, 1, Key::Int(0)),
                Key::Range { start, step, .. } => {
                    let count = key.cardinality();
                    (*start, count, (*step).max(1), Key::range(0, count))
                }
                Key::List(list) => {
                    let lo = list.iter().copied().min().unwrap_or(0);
                    let hi = list.iter().copied().max().map_or(lo, |m| m + 1);
                    let local: Vec<usize> = list.iter().map(|p| p - lo).collect();
                    if local != (0..hi - lo).collect::<Vec<_>>() {
                        slab.sparse = true;
                    }
                    (lo, hi - lo, 1, Key::List(local))
                }
            };
            slab.extents.push(Extent::SliceCount {
                start,
                count,
                stride: stride as isize,
            });
            slab.shape.push(count);
            slab.local.set(dim, local);
        }
        Ok(slab)
    }
}

impl NetcdfHandle {
    fn slab(&self, variable: &netcdf::Variable<'_>, keyring: &Keyring) -> Result<Slab> {
        let dims: Vec<usize> = variable.dimensions().iter().map(|d| d.len()).collect();
        Slab::new(keyring, &dims, &self.path)
    }

    fn read_slab(&self, variable: &netcdf::Variable<'_>, slab: &Slab) -> Result<ArrayD<f32>> {
        let data: Vec<f32> = variable.get_values::<f32, _>(slab.extents.clone())?;
        Ok(ArrayD::from_shape_vec(IxDyn(&slab.shape), data)?)
    }
}

fn attribute_to_json(value: AttributeValue) -> Option<JsonValue> {
    let json = match value {
        AttributeValue::Str(v) => json!(v),
        AttributeValue::Strs(v) => json!(v),
        AttributeValue::Float(v) => json!(v),
        AttributeValue::Floats(v) => json!(v),
        AttributeValue::Double(v) => json!(v),
        AttributeValue::Doubles(v) => json!(v),
        AttributeValue::Int(v) => json!(v),
        AttributeValue::Ints(v) => json!(v),
        AttributeValue::Short(v) => json!(v),
        AttributeValue::Shorts(v) => json!(v),
        AttributeValue::Longlong(v) => json!(v),
        AttributeValue::Longlongs(v) => json!(v),
        AttributeValue::Uchar(v) => json!(v),
        AttributeValue::Schar(v) => json!(v),
        _ => return None,
    };
    Some(json)
}

impl FileHandle for NetcdfHandle {
    fn path(&self) -> &Path {
        &self.path
    }

    fn native_dimension_order(&self, variable: &str) -> Result<Vec<String>> {
        let var = self.variable(variable)?;
        Ok(var.dimensions().iter().map(|d| d.name().to_string()).collect())
    }

    fn coordinate_values(&self, dimension: &str) -> Result<Vec<f64>> {
        let var = self.variable(dimension)?;
        Ok(var.get_values::<f64, _>(..)?)
    }

    fn read(&self, variable: &str, keyring: &Keyring) -> Result<ArrayD<f32>> {
        let var = self.variable(variable)?;
        let slab = self.slab(&var, keyring)?;
        tracing::trace!(path = %self.path.display(), variable, shape = ?slab.shape, "Reading slab");
        let data = self.read_slab(&var, &slab)?;
        accessor::take(&slab.local, data.view())
    }

    fn write(&mut self, variable: &str, keyring: &Keyring, chunk: ArrayViewD<'_, f32>) -> Result<()> {
        let (extents, data) = {
            let var = self.variable(variable)?;
            let slab = self.slab(&var, keyring)?;
            let mut data = if slab.sparse {
                // Positions between the listed ones keep their current values
                self.read_slab(&var, &slab)?
            } else {
                ArrayD::from_elem(IxDyn(&slab.shape), f32::NAN)
            };
            accessor::place(&slab.local, &mut data, chunk)?;
            (slab.extents, data)
        };
        let values: Vec<f32> = data.iter().copied().collect();

        let path = self.path.clone();
        let NetcdfFile::Write(file) = &mut self.file else {
            return Err(FilecubeError::backend(path, "file opened read-only"));
        };
        let mut var = file
            .variable_mut(variable)
            .ok_or_else(|| FilecubeError::backend(&path, format!("no variable '{variable}'")))?;
        tracing::trace!(path = %path.display(), variable, n = values.len(), "Writing slab");
        var.put_values(&values, extents)?;
        Ok(())
    }

    fn variable_attributes(&self, variable: &str) -> Result<Attributes> {
        let var = self.variable(variable)?;
        let mut attributes = Attributes::new();
        for attr in var.attributes() {
            match attribute_to_json(attr.value()?) {
                Some(value) => {
                    attributes.insert(attr.name().to_string(), value);
                }
                None => {
                    tracing::debug!(attribute = %attr.name(), "Skipped unsupported attribute type");
                }
            }
        }
        Ok(attributes)
    }
}
