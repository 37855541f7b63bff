//! Filegroups: files sharing a filename structure and a set of variables
//!
//! A [`Filegroup`] owns the compiled pre-regex, one [`CoordScan`] per
//! coordinate and, once scanned, the filename segments used to rebuild
//! filenames. Scanning lives in [`scan`], command generation in [`command`]
//! and [`load`].

pub mod command;
pub mod load;
pub mod scan;

pub use command::{merge_cmd_per_file, CmdKeyrings, Command};
pub use scan::ScanSummary;

use crate::backend::Attributes;
use crate::config::{FilegroupSpec, VariableSpec};
use crate::coord_scan::CoordScan;
use crate::dimension::Dimension;
use crate::errors::{FilecubeError, Result};
use crate::pregex::{CompiledPregex, Segments};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// A set of files sharing a filename pattern and variables
#[derive(Debug, Clone)]
pub struct Filegroup {
    name: String,
    root: PathBuf,
    pregex: CompiledPregex,
    segments: Option<Segments>,
    cs: Vec<CoordScan>,
    variables: Vec<VariableSpec>,
    attributes: HashMap<String, Attributes>,
    /// For every dimension, position in this filegroup of each available value
    contains: HashMap<String, Vec<Option<usize>>>,
}

impl Filegroup {
    /// Compile the pre-regex and set up the coordinate scans.
    ///
    /// `dims` are the dimensions of the available scope. Every coordinate of
    /// the spec, and every matcher of the pre-regex, must name one of them.
    pub fn new(spec: &FilegroupSpec, dims: &[Dimension]) -> Result<Self> {
        spec.validate()?;
        let find = |name: &str| {
            dims.iter()
                .find(|d| d.name() == name)
                .ok_or_else(|| FilecubeError::UnknownDimension {
                    filegroup: spec.name.clone(),
                    dim: name.to_string(),
                })
        };

        let pregex =
            CompiledPregex::compile_for(&spec.pregex, &spec.replacements, &spec.dims(), &spec.name)?;

        let mut cs = Vec::with_capacity(spec.coords.len());
        for coord in &spec.coords {
            let dimension = find(&coord.dim)?;
            cs.push(CoordScan::new(coord, &pregex, dimension, &spec.name)?);
        }

        tracing::debug!(
            filegroup = %spec.name,
            root = %spec.root.display(),
            regex = %pregex.regex(),
            "Filegroup configured"
        );

        Ok(Self {
            name: spec.name.clone(),
            root: spec.root.clone(),
            pregex,
            segments: None,
            cs,
            variables: spec.variables.clone(),
            attributes: HashMap::new(),
            contains: HashMap::new(),
        })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn pregex(&self) -> &CompiledPregex {
        &self.pregex
    }

    /// Segments of the first matched filename, `None` before scanning
    #[must_use]
    pub fn segments(&self) -> Option<&Segments> {
        self.segments.as_ref()
    }

    #[must_use]
    pub fn coord_scans(&self) -> &[CoordScan] {
        &self.cs
    }

    #[must_use]
    pub fn coord_scan(&self, dim: &str) -> Option<&CoordScan> {
        self.cs.iter().find(|c| c.name() == dim)
    }

    pub fn coord_scan_checked(&self, dim: &str) -> Result<&CoordScan> {
        self.coord_scan(dim)
            .ok_or_else(|| FilecubeError::UnknownDimension {
                filegroup: self.name.clone(),
                dim: dim.to_string(),
            })
    }

    /// Coordinates of this filegroup, in declaration order
    #[must_use]
    pub fn dims(&self) -> Vec<String> {
        self.cs.iter().map(|c| c.name().to_string()).collect()
    }

    /// Coordinate scans that are (`true`) or are not (`false`) shared
    pub fn iter_shared(&self, shared: bool) -> impl Iterator<Item = &CoordScan> {
        self.cs.iter().filter(move |c| c.is_shared() == shared)
    }

    #[must_use]
    pub fn variables(&self) -> &[VariableSpec] {
        &self.variables
    }

    #[must_use]
    pub fn variable(&self, name: &str) -> Option<&VariableSpec> {
        self.variables.iter().find(|v| v.name == name)
    }

    #[must_use]
    pub fn contains_variable(&self, name: &str) -> bool {
        self.variable(name).is_some()
    }

    /// Attributes found by the attribute scan
    #[must_use]
    pub fn attributes(&self, variable: &str) -> Option<&Attributes> {
        self.attributes.get(variable)
    }

    /// Position in this filegroup of each value of the available dimension
    #[must_use]
    pub fn contains(&self, dim: &str) -> Option<&[Option<usize>]> {
        self.contains.get(dim).map(Vec::as_slice)
    }

    /// Match the available values against the scanned ones
    pub fn compute_contains(&mut self, dims: &[Dimension]) {
        self.contains.clear();
        for cs in &self.cs {
            let Some(dim) = dims.iter().find(|d| d.name() == cs.name()) else {
                continue;
            };
            let table: Vec<Option<usize>> =
                dim.values().iter().map(|&v| cs.index_of(v)).collect();
            let present = table.iter().filter(|i| i.is_some()).count();
            tracing::debug!(
                filegroup = %self.name,
                dim = %dim.name(),
                present,
                available = dim.size(),
                "Available values matched"
            );
            self.contains.insert(cs.name().to_string(), table);
        }
    }

    /// Translate in-file dimension names into coordinate names, keeping the order.
    ///
    /// Dimensions not associated with a coordinate keep their in-file name.
    #[must_use]
    pub fn order_in_file(&self, order_file: &[String]) -> Vec<String> {
        order_file
            .iter()
            .map(|d| {
                self.cs
                    .iter()
                    .find(|c| c.infile_name() == d)
                    .map_or_else(|| d.clone(), |c| c.name().to_string())
            })
            .collect()
    }

    /// In-file name of a coordinate, the name itself for unknown dimensions
    #[must_use]
    pub fn infile_name<'a>(&'a self, dim: &'a str) -> &'a str {
        self.coord_scan(dim).map_or(dim, CoordScan::infile_name)
    }
}
