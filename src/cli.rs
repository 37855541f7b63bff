//! Defines command-line interface options using `clap` for the filecube application.

use crate::backend::Backend;
use crate::config::{CoordScanSpec, FilegroupSpec, Placement, ScanConfig};
use crate::dimension::Dimension;
use crate::keyring::Key;
use crate::parallel::ParallelConfig;
use crate::session::Session;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

/// Name of the filegroup built from the command line
pub const FILEGROUP: &str = "files";

/// Scan a directory of files and show how a selection maps onto them
#[derive(Parser, Debug)]
#[command(
    name = "filecube",
    version,
    about = "Find the files holding a multi-file dataset and the commands to load it"
)]
pub struct Args {
    /// Directory holding the files
    #[arg(short, long)]
    pub root: PathBuf,

    /// Filename pre-regex, e.g. '%(prefix)_%(time:Y)%(time:m)\.nc'
    #[arg(short, long)]
    pub pregex: String,

    /// Literal replacement for a '%(name)' placeholder, formatted as <name>=<text>
    #[arg(long = "replace", value_parser = parse_replacement)]
    pub replacements: Vec<(String, String)>,

    /// Coordinate, formatted as <name>[:<in|out|inout>[:scan]][=<v1>,<v2>,...] (default placement 'out').
    /// Values are required for in-file coordinates that are not scanned.
    #[arg(short, long = "coord", value_parser = parse_coord, required = true)]
    pub coords: Vec<CoordArg>,

    /// Variable whose attributes are read from the first matching file (needs a file backend)
    #[arg(long)]
    pub variable: Option<String>,

    /// Selection on a dimension: <dim>=<i>, <dim>=<start>:<stop>[:<step>] or <dim>=<i>,<j>,...
    #[arg(short, long = "select", value_parser = parse_selection)]
    pub selections: Vec<(String, Key)>,

    /// Maximum directory depth below the root
    #[arg(long)]
    pub max_depth: Option<usize>,

    /// Number of threads to use for scanning filegroups. Defaults to number of CPU cores.
    #[arg(short = 't', long)]
    pub threads: Option<usize>,

    /// Print the report as JSON
    #[arg(long, default_value_t = false)]
    pub json: bool,

    /// Enable verbose output.
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

impl Args {
    /// Session holding the single filegroup described by the arguments, not yet scanned
    pub fn session(&self, backend: Arc<dyn Backend>) -> crate::errors::Result<Session> {
        let mut spec = FilegroupSpec::new(FILEGROUP, &self.root, &self.pregex);
        for (name, text) in &self.replacements {
            spec = spec.replace(name, text);
        }
        for coord in &self.coords {
            spec = spec.coord(coord.to_spec());
        }
        if let Some(variable) = &self.variable {
            spec = spec.variable(variable);
        }

        let mut scan_config = ScanConfig::new().scan_attributes(self.variable.is_some());
        if let Some(depth) = self.max_depth {
            scan_config = scan_config.max_depth(depth);
        }
        let parallel = match self.threads {
            Some(n) => ParallelConfig::with_threads(n),
            None => ParallelConfig::default(),
        };

        let dims = self
            .coords
            .iter()
            .map(|c| Dimension::with_values(&c.name, c.values.clone()))
            .collect();
        let mut session = Session::new(dims, backend)
            .with_scan_config(scan_config)
            .with_parallel(parallel);
        session.add_filegroup(spec)?;
        Ok(session)
    }
}

/// A coordinate given on the command line
#[derive(Debug, Clone, PartialEq)]
pub struct CoordArg {
    pub name: String,
    pub placement: Placement,
    pub scan_in_file: bool,
    /// Values of an in-file coordinate that is not scanned
    pub values: Vec<f64>,
}

impl CoordArg {
    pub fn to_spec(&self) -> CoordScanSpec {
        let spec = CoordScanSpec::new(&self.name, self.placement);
        if self.scan_in_file {
            spec.scan_in_file()
        } else {
            spec
        }
    }
}

fn parse_replacement(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((name, text)) if !name.is_empty() => Ok((name.to_string(), text.to_string())),
        _ => Err("Invalid format: Expected '<name>=<text>'.".to_string()),
    }
}

fn parse_coord(s: &str) -> Result<CoordArg, String> {
    let (s, values) = match s.split_once('=') {
        Some((coord, values)) => {
            let values = values
                .split(',')
                .map(|v| {
                    v.trim()
                        .parse::<f64>()
                        .map_err(|_| format!("Invalid coordinate value '{v}'"))
                })
                .collect::<Result<Vec<_>, _>>()?;
            (coord, values)
        }
        None => (s, Vec::new()),
    };
    let parts: Vec<&str> = s.split(':').collect();
    let (name, placement, scan) = match parts.as_slice() {
        [name] => (*name, "out", false),
        [name, placement] => (*name, *placement, false),
        [name, placement, "scan"] => (*name, *placement, true),
        _ => return Err("Invalid format: Expected '<name>[:<in|out|inout>[:scan]]'.".to_string()),
    };
    if name.is_empty() {
        return Err("Coordinate name cannot be empty".to_string());
    }
    let placement: Placement = placement.parse().map_err(|e| format!("{e}"))?;
    if !values.is_empty() && (placement != Placement::In || scan) {
        return Err(format!(
            "Values can only be given to an in-file coordinate that is not scanned ('{name}:in=...')"
        ));
    }
    Ok(CoordArg {
        name: name.to_string(),
        placement,
        scan_in_file: scan,
        values,
    })
}

fn parse_index(s: &str, what: &str) -> Result<usize, String> {
    s.trim()
        .parse::<usize>()
        .map_err(|_| format!("Invalid {what} index '{s}'"))
}

/// Parse `<dim>=<key>` where the key is an index, a range or a list
pub fn parse_selection(s: &str) -> Result<(String, Key), String> {
    let (dim, key) = s
        .split_once('=')
        .ok_or_else(|| "Invalid format: Expected '<dim>=<key>'.".to_string())?;
    if dim.is_empty() {
        return Err("Dimension name cannot be empty".to_string());
    }

    let key = if key.contains(':') {
        let parts: Vec<&str> = key.split(':').collect();
        match parts.as_slice() {
            [start, stop] => Key::range(parse_index(start, "start")?, parse_index(stop, "stop")?),
            [start, stop, step] => Key::range_step(
                parse_index(start, "start")?,
                parse_index(stop, "stop")?,
                parse_index(step, "step")?,
            ),
            _ => return Err("Invalid range: Expected '<start>:<stop>[:<step>]'".to_string()),
        }
    } else if key.contains(',') {
        let list = key
            .split(',')
            .map(|i| parse_index(i, "list"))
            .collect::<Result<Vec<_>, _>>()?;
        Key::List(list)
    } else {
        Key::Int(parse_index(key, "single")?)
    };
    Ok((dim.to_string(), key))
}
