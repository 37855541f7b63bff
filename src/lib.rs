//! filecube: address a dataset split across many files as one array
//!
//! Scientific datasets are often stored as one file per date, per depth or
//! per variable. filecube finds those files from a filename pattern, reads the
//! coordinate values they hold from their names (and optionally from inside
//! the files), and turns a selection on the whole dataset into the minimal
//! list of per-file read commands.
//!
//! ## Key Features
//!
//! - **Pre-regex**: Filename patterns with `%(dim:kind)` matchers compiled to regexes
//! - **Coordinate scanning**: Values found in filenames, in files, or both
//! - **Command generation**: One command per file, with contiguous keys merged
//! - **Chunk reordering**: In-file dimension order mapped to the requested order
//! - **Parallel Processing**: Independent filegroups scanned with Rayon
//! - **NetCDF Support**: Optional backend behind the `netcdf` feature
//!
//! ## Module Organization
//!
//! - [`pregex`]: Pre-regex compilation and filename segments
//! - [`coord_scan`]: Per-coordinate scanning state machine
//! - [`filegroup`]: Directory scanning, command generation and loading
//! - [`keyring`]: Keys and keyrings addressing array slabs
//! - [`accessor`]: Taking, placing and reordering chunks
//! - [`backend`]: File backend abstraction
//! - [`session`]: Several filegroups over one set of dimensions
//! - [`parallel`]: Parallel processing configuration
//! - [`errors`]: Centralized error handling
//!
//! ## Usage
//!
//! ```rust,no_run
//! use filecube::prelude::*;
//! use std::sync::Arc;
//!
//! let dims = vec![Dimension::new("time"), Dimension::with_values("lat", vec![-10.0, 0.0, 10.0])];
//! let mut session = Session::new(dims, Arc::new(NoBackend));
//! session
//!     .add_filegroup(
//!         FilegroupSpec::new("sst", "/data/sst", r"SST_%(time:Y)%(time:m)%(time:d)\.nc")
//!             .coord(CoordScanSpec::shared("time"))
//!             .coord(CoordScanSpec::in_file("lat"))
//!             .variable("SST"),
//!     )
//!     .unwrap();
//! session.scan().unwrap();
//!
//! let selection = session.select([("time", Key::range(0, 10))]).unwrap();
//! for (filegroup, commands) in session.commands(&selection).unwrap() {
//!     for cmd in commands {
//!         println!("{filegroup}: {cmd}");
//!     }
//! }
//! ```

pub mod accessor;
pub mod backend;
pub mod cli;
pub mod config;
pub mod coord_scan;
pub mod dimension;
pub mod errors;
pub mod filegroup;
pub mod keyring;
#[cfg(feature = "netcdf")]
pub mod netcdf_io;
pub mod parallel;
pub mod pregex;
pub mod session;

pub use errors::*;

// High-level convenience API
pub mod prelude {
    //! Commonly used imports for convenience
    pub use crate::backend::{Attributes, Backend, FileHandle, NoBackend, OpenMode, ScopedFile};
    pub use crate::config::{CoordScanSpec, FilegroupSpec, Placement, ScanConfig, VariableSpec};
    pub use crate::coord_scan::{
        CoordScan, FilenameParser, InFileReader, MatchedText, ParserRegistry, ScannedValue,
    };
    pub use crate::dimension::Dimension;
    pub use crate::errors::{FilecubeError, Result};
    pub use crate::filegroup::{CmdKeyrings, Command, Filegroup, ScanSummary};
    pub use crate::keyring::{Key, Keyring};
    #[cfg(feature = "netcdf")]
    pub use crate::netcdf_io::NetcdfBackend;
    pub use crate::parallel::ParallelConfig;
    pub use crate::pregex::{CompiledPregex, MatcherKind, Segments};
    pub use crate::session::Session;
}
