//! Scan and filegroup configuration
//!
//! Everything here is plain data, built once before scanning and immutable
//! afterwards.

use crate::coord_scan::{default_reader, FilenameParser, InFileReader};
use crate::errors::{FilecubeError, Result};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use tracing::Level;

/// Options of a scan pass
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// Maximum depth below the root, `None` for unlimited
    pub max_depth: Option<usize>,
    pub follow_links: bool,
    /// Read variable attributes from the first matching file
    pub scan_attributes: bool,
    /// Level of per-file events (file opened, file matched)
    pub file_log_level: Level,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            max_depth: None,
            follow_links: false,
            scan_attributes: false,
            file_log_level: Level::DEBUG,
        }
    }
}

impl ScanConfig {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    #[must_use]
    pub fn follow_links(mut self, follow: bool) -> Self {
        self.follow_links = follow;
        self
    }

    #[must_use]
    pub fn scan_attributes(mut self, scan: bool) -> Self {
        self.scan_attributes = scan;
        self
    }

    #[must_use]
    pub fn file_log_level(mut self, level: Level) -> Self {
        self.file_log_level = level;
        self
    }
}

/// Emit `message` at a level chosen at runtime
pub fn log_at(level: Level, message: &str) {
    match level {
        Level::ERROR => tracing::error!("{message}"),
        Level::WARN => tracing::warn!("{message}"),
        Level::INFO => tracing::info!("{message}"),
        Level::DEBUG => tracing::debug!("{message}"),
        _ => tracing::trace!("{message}"),
    }
}

/// Where the values of a coordinate live
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// Identical in every file, an axis of the file
    In,
    /// Varies from file to file, not an axis of the file
    Shared,
    /// Varies from file to file and is an axis of each file
    Hybrid,
}

impl Placement {
    /// Whether values are found from filenames
    #[must_use]
    pub const fn is_shared(self) -> bool {
        matches!(self, Self::Shared | Self::Hybrid)
    }

    /// Whether the dimension is an axis of the files
    #[must_use]
    pub const fn is_in_file(self) -> bool {
        matches!(self, Self::In | Self::Hybrid)
    }
}

impl FromStr for Placement {
    type Err = FilecubeError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "in" => Ok(Self::In),
            "out" | "shared" => Ok(Self::Shared),
            "inout" | "hybrid" => Ok(Self::Hybrid),
            other => Err(FilecubeError::Config(format!(
                "unknown coordinate placement '{other}' (expected in, out or inout)"
            ))),
        }
    }
}

impl fmt::Display for Placement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::In => "in",
            Self::Shared => "out",
            Self::Hybrid => "inout",
        };
        f.write_str(s)
    }
}

/// How one coordinate of a filegroup is found
#[derive(Clone)]
pub struct CoordScanSpec {
    pub dim: String,
    pub placement: Placement,
    /// Name of the dimension inside the files, defaults to `dim`
    pub infile_name: Option<String>,
    /// Reads coordinate values from opened files
    pub reader: Option<InFileReader>,
    /// Filename parser, takes precedence over the matcher kinds
    pub parser: Option<FilenameParser>,
}

impl CoordScanSpec {
    pub fn new(dim: impl Into<String>, placement: Placement) -> Self {
        Self {
            dim: dim.into(),
            placement,
            infile_name: None,
            reader: None,
            parser: None,
        }
    }

    /// Coordinate varying across files, found in filenames
    pub fn shared(dim: impl Into<String>) -> Self {
        Self::new(dim, Placement::Shared)
    }

    /// Coordinate present identically in every file
    pub fn in_file(dim: impl Into<String>) -> Self {
        Self::new(dim, Placement::In)
    }

    /// Coordinate varying across files and stored as an axis of each file
    pub fn hybrid(dim: impl Into<String>) -> Self {
        Self::new(dim, Placement::Hybrid)
    }

    #[must_use]
    pub fn infile_name(mut self, name: impl Into<String>) -> Self {
        self.infile_name = Some(name.into());
        self
    }

    /// Read files with [`default_reader`]: read the coordinate variable
    #[must_use]
    pub fn scan_in_file(self) -> Self {
        self.reader(Arc::new(default_reader))
    }

    #[must_use]
    pub fn reader(mut self, reader: InFileReader) -> Self {
        self.reader = Some(reader);
        self
    }

    #[must_use]
    pub fn parser(mut self, parser: FilenameParser) -> Self {
        self.parser = Some(parser);
        self
    }

    #[must_use]
    pub fn infile_or_dim(&self) -> &str {
        self.infile_name.as_deref().unwrap_or(&self.dim)
    }
}

impl fmt::Debug for CoordScanSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CoordScanSpec")
            .field("dim", &self.dim)
            .field("placement", &self.placement)
            .field("infile_name", &self.infile_name)
            .field("reader", &self.reader.is_some())
            .field("parser", &self.parser.is_some())
            .finish()
    }
}

/// A variable stored in the files of a filegroup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableSpec {
    pub name: String,
    pub infile_name: String,
}

impl VariableSpec {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            infile_name: name.clone(),
            name,
        }
    }

    pub fn renamed(name: impl Into<String>, infile_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            infile_name: infile_name.into(),
        }
    }
}

/// Configuration of one filegroup
#[derive(Debug, Clone)]
pub struct FilegroupSpec {
    pub name: String,
    pub root: PathBuf,
    pub pregex: String,
    pub replacements: HashMap<String, String>,
    pub coords: Vec<CoordScanSpec>,
    pub variables: Vec<VariableSpec>,
}

impl FilegroupSpec {
    pub fn new(name: impl Into<String>, root: impl AsRef<Path>, pregex: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            root: root.as_ref().to_path_buf(),
            pregex: pregex.into(),
            replacements: HashMap::new(),
            coords: Vec::new(),
            variables: Vec::new(),
        }
    }

    /// Substitute `%(key)` by `value` in the pre-regex
    #[must_use]
    pub fn replace(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.replacements.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn coord(mut self, spec: CoordScanSpec) -> Self {
        self.coords.push(spec);
        self
    }

    #[must_use]
    pub fn variable(mut self, name: impl Into<String>) -> Self {
        self.variables.push(VariableSpec::new(name));
        self
    }

    #[must_use]
    pub fn variable_as(mut self, name: impl Into<String>, infile_name: impl Into<String>) -> Self {
        self.variables.push(VariableSpec::renamed(name, infile_name));
        self
    }

    /// Dimension names in declaration order
    #[must_use]
    pub fn dims(&self) -> Vec<String> {
        self.coords.iter().map(|c| c.dim.clone()).collect()
    }

    /// Reject repeated coordinates and variables
    pub fn validate(&self) -> Result<()> {
        for (i, coord) in self.coords.iter().enumerate() {
            if self.coords[..i].iter().any(|c| c.dim == coord.dim) {
                return Err(FilecubeError::Config(format!(
                    "coordinate '{}' declared twice in filegroup '{}'",
                    coord.dim, self.name
                )));
            }
        }
        for (i, var) in self.variables.iter().enumerate() {
            if self.variables[..i].iter().any(|v| v.name == var.name) {
                return Err(FilecubeError::Config(format!(
                    "variable '{}' declared twice in filegroup '{}'",
                    var.name, self.name
                )));
            }
        }
        Ok(())
    }
}
