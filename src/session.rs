//! Sessions: several filegroups over one set of dimensions
//!
//! A [`Session`] owns the dimensions of the available scope, its filegroups,
//! the custom parser registry and the backend used to open files. Scanning
//! fills the dimensions with the union of the values every filegroup holds;
//! selections then act on that union and are dispatched to each filegroup.

use crate::backend::{Attributes, Backend};
use crate::config::{FilegroupSpec, ScanConfig};
use crate::coord_scan::{FilenameParser, ParserRegistry, ValueParser};
use crate::dimension::{Dimension, EPOCH_UNITS};
use crate::errors::{FilecubeError, Result};
use crate::filegroup::{Command, Filegroup, ScanSummary};
use crate::keyring::{Key, Keyring};
use crate::parallel::ParallelConfig;
use ndarray::{ArrayD, ArrayViewD, IxDyn};
use rayon::prelude::*;
use std::sync::Arc;

/// Filegroups sharing dimensions, with the backend to reach their files
pub struct Session {
    dims: Vec<Dimension>,
    filegroups: Vec<Filegroup>,
    registry: ParserRegistry,
    config: ScanConfig,
    parallel: ParallelConfig,
    backend: Arc<dyn Backend>,
}

impl Session {
    pub fn new(dims: Vec<Dimension>, backend: Arc<dyn Backend>) -> Self {
        Self {
            dims,
            filegroups: Vec::new(),
            registry: ParserRegistry::new(),
            config: ScanConfig::default(),
            parallel: ParallelConfig::default(),
            backend,
        }
    }

    #[must_use]
    pub fn with_scan_config(mut self, config: ScanConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn with_parallel(mut self, parallel: ParallelConfig) -> Self {
        self.parallel = parallel;
        self
    }

    /// Register a parser for `%(dim:kind:custom=id)` matchers
    pub fn register_parser(&mut self, id: impl Into<String>, parser: FilenameParser) {
        self.registry.register(id, parser);
    }

    /// Add a filegroup. It must declare a coordinate for every dimension.
    pub fn add_filegroup(&mut self, spec: FilegroupSpec) -> Result<()> {
        if self.filegroups.iter().any(|fg| fg.name() == spec.name) {
            return Err(FilecubeError::Config(format!(
                "filegroup '{}' already exists",
                spec.name
            )));
        }
        let declared = spec.dims();
        if let Some(missing) = self.dims.iter().find(|d| !declared.iter().any(|n| n == d.name())) {
            return Err(FilecubeError::Config(format!(
                "filegroup '{}' does not declare dimension '{}'",
                spec.name,
                missing.name()
            )));
        }
        let filegroup = Filegroup::new(&spec, &self.dims)?;
        self.filegroups.push(filegroup);
        Ok(())
    }

    #[must_use]
    pub fn dims(&self) -> &[Dimension] {
        &self.dims
    }

    #[must_use]
    pub fn dim(&self, name: &str) -> Option<&Dimension> {
        self.dims.iter().find(|d| d.name() == name)
    }

    #[must_use]
    pub fn dim_names(&self) -> Vec<String> {
        self.dims.iter().map(|d| d.name().to_string()).collect()
    }

    #[must_use]
    pub fn filegroups(&self) -> &[Filegroup] {
        &self.filegroups
    }

    #[must_use]
    pub fn filegroup(&self, name: &str) -> Option<&Filegroup> {
        self.filegroups.iter().find(|fg| fg.name() == name)
    }

    #[must_use]
    pub fn backend(&self) -> &dyn Backend {
        self.backend.as_ref()
    }

    /// Attributes of `variable` from the first filegroup that scanned them
    #[must_use]
    pub fn attributes(&self, variable: &str) -> Option<&Attributes> {
        self.filegroups.iter().find_map(|fg| fg.attributes(variable))
    }

    /// Scan every filegroup, then set the available values of every dimension.
    ///
    /// Filegroups are scanned in parallel unless the session runs on a
    /// single thread. The first failure aborts the pass.
    pub fn scan(&mut self) -> Result<Vec<ScanSummary>> {
        if self.filegroups.is_empty() {
            return Err(FilecubeError::Config("no filegroup to scan".to_string()));
        }
        let backend = self.backend.as_ref();
        let registry = &self.registry;
        let config = &self.config;

        let summaries = if self.parallel.is_parallel() && self.filegroups.len() > 1 {
            let pool = self.parallel.build_pool()?;
            pool.install(|| {
                self.filegroups
                    .par_iter_mut()
                    .map(|fg| fg.scan(backend, registry, config))
                    .collect::<Result<Vec<_>>>()
            })?
        } else {
            self.filegroups
                .iter_mut()
                .map(|fg| fg.scan(backend, registry, config))
                .collect::<Result<Vec<_>>>()?
        };

        self.update_dims();
        for fg in &mut self.filegroups {
            fg.compute_contains(&self.dims);
        }
        Ok(summaries)
    }

    /// Union of the values found for each scanned dimension
    fn update_dims(&mut self) {
        for dim in &mut self.dims {
            let scans: Vec<_> = self
                .filegroups
                .iter()
                .filter_map(|fg| fg.coord_scan(dim.name()))
                .filter(|cs| cs.is_scanned())
                .collect();
            if scans.is_empty() {
                continue;
            }
            let values: Vec<f64> = scans.iter().flat_map(|cs| cs.values().iter().copied()).collect();
            dim.update_values(values);
            if dim.unit_str().is_empty() && scans.iter().any(|cs| matches!(cs.parser(), Some(ValueParser::Date))) {
                dim.set_units(EPOCH_UNITS);
            }
            tracing::info!(dim = %dim.name(), size = dim.size(), extent = %dim.extent_str(), "Dimension values");
        }
    }

    /// Build a selection from keys on some dimensions, others take their full range.
    ///
    /// Keys are checked against the dimension sizes. The selection follows
    /// the dimension order of the session.
    pub fn select<I, S>(&self, keys: I) -> Result<Keyring>
    where
        I: IntoIterator<Item = (S, Key)>,
        S: AsRef<str>,
    {
        let mut given = Keyring::new();
        for (dim, key) in keys {
            let dim = dim.as_ref();
            if self.dim(dim).is_none() {
                return Err(FilecubeError::dimension_not_found(dim));
            }
            given.set(dim, key);
        }

        let mut keyring = Keyring::new();
        for dim in &self.dims {
            let key = given.get(dim.name()).cloned().unwrap_or_else(|| Key::full(dim.size()));
            if key.is_none() {
                return Err(FilecubeError::InvalidKey {
                    dim: dim.name().to_string(),
                    message: "selection cannot be none".to_string(),
                });
            }
            if let Some(max) = key.max_position() {
                if max >= dim.size() {
                    return Err(FilecubeError::InvalidKey {
                        dim: dim.name().to_string(),
                        message: format!("index {max} out of {} values", dim.size()),
                    });
                }
            }
            keyring.set(dim.name(), key);
        }
        Ok(keyring)
    }

    /// Commands of every filegroup for a selection on the available scope.
    ///
    /// Filegroups holding none of the selection are left out.
    pub fn commands(&self, keyring: &Keyring) -> Result<Vec<(String, Vec<Command>)>> {
        let mut out = Vec::new();
        for fg in &self.filegroups {
            let commands = fg.commands_from_available(keyring)?;
            if !commands.is_empty() {
                out.push((fg.name().to_string(), commands));
            }
        }
        Ok(out)
    }

    /// Array shaped like the selection, filled with NaN
    #[must_use]
    pub fn allocate(&self, keyring: &Keyring) -> ArrayD<f32> {
        ArrayD::from_elem(IxDyn(&keyring.shape()), f32::NAN)
    }

    /// Load `variable` for a selection on the available scope.
    ///
    /// The array has one axis per key of the selection. Positions no
    /// filegroup holds stay NaN.
    pub fn load(&self, variable: &str, keyring: &Keyring) -> Result<ArrayD<f32>> {
        let mut data = self.allocate(keyring);
        let mut loaded = false;
        for fg in self.filegroups.iter().filter(|fg| fg.contains_variable(variable)) {
            loaded |= fg.load_from_available(self.backend(), variable, keyring, &mut data)?;
        }
        if !loaded {
            tracing::warn!(variable, selection = %keyring, "No data found for selection");
        }
        Ok(data)
    }

    /// Write `data`, shaped like the selection, back to the files holding it
    pub fn write(&self, variable: &str, keyring: &Keyring, data: ArrayViewD<'_, f32>) -> Result<()> {
        if data.shape() != keyring.shape().as_slice() {
            return Err(FilecubeError::ShapeMismatch(format!(
                "data of shape {:?} for selection [{keyring}]",
                data.shape()
            )));
        }
        let mut written = false;
        for fg in self.filegroups.iter().filter(|fg| fg.contains_variable(variable)) {
            written |= fg.write_from_available(self.backend(), variable, keyring, data.view())?;
        }
        if !written {
            tracing::warn!(variable, selection = %keyring, "No file holds the selection");
        }
        Ok(())
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("dims", &self.dims)
            .field("filegroups", &self.filegroups)
            .field("registry", &self.registry)
            .field("config", &self.config)
            .field("parallel", &self.parallel)
            .finish()
    }
}
