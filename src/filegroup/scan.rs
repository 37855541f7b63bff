//! Directory scanning

use super::Filegroup;
use crate::backend::{Backend, OpenMode, ScopedFile};
use crate::config::{log_at, ScanConfig};
use crate::coord_scan::ParserRegistry;
use crate::errors::{FilecubeError, Result};
use crate::pregex::Segments;
use std::path::{Component, Path};
use walkdir::WalkDir;

/// Outcome of a scan pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanSummary {
    pub filegroup: String,
    /// Regular files seen under the root
    pub files_seen: usize,
    /// Files matching the pre-regex
    pub files_matched: usize,
    /// Files opened through the backend
    pub files_opened: usize,
    /// Number of values of every coordinate, in declaration order
    pub sizes: Vec<(String, usize)>,
}

/// Path relative to `root` with `/` separators
fn relative_name(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    let parts: Vec<String> = rel
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();
    parts.join("/")
}

impl Filegroup {
    /// Walk the root directory and find the values of every coordinate.
    ///
    /// Any previous scan result is discarded. Each matching file is opened at
    /// most once, and only if a coordinate must be read in it or the
    /// attribute scan is still pending.
    pub fn scan(
        &mut self,
        backend: &dyn Backend,
        registry: &ParserRegistry,
        config: &ScanConfig,
    ) -> Result<ScanSummary> {
        for cs in &mut self.cs {
            cs.reset();
        }
        self.segments = None;
        self.attributes.clear();
        self.contains.clear();

        tracing::info!(filegroup = %self.name, root = %self.root.display(), "Scanning files");

        let mut walker = WalkDir::new(&self.root)
            .min_depth(1)
            .follow_links(config.follow_links)
            .sort_by_file_name();
        if let Some(depth) = config.max_depth {
            walker = walker.max_depth(depth);
        }

        let mut summary = ScanSummary {
            filegroup: self.name.clone(),
            files_seen: 0,
            files_matched: 0,
            files_opened: 0,
            sizes: Vec::new(),
        };
        let mut attributes_pending = config.scan_attributes && !self.variables.is_empty();

        for entry in walker {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            summary.files_seen += 1;

            let name = relative_name(&self.root, entry.path());
            let Some(segments) = self.pregex.segments(&name) else {
                tracing::trace!(filegroup = %self.name, file = %name, "Not matching");
                continue;
            };
            summary.files_matched += 1;
            log_at(config.file_log_level, &format!("Found matching file {name}"));

            if self.segments.is_none() {
                self.segments = Some(segments.clone());
            }
            let opened =
                self.scan_matched(&segments, entry.path(), backend, registry, config, &mut attributes_pending)?;
            if opened {
                summary.files_opened += 1;
            }
        }

        if summary.files_matched == 0 {
            return Err(FilecubeError::NoMatchingFile {
                filegroup: self.name.clone(),
                root: self.root.clone(),
                regex: self.pregex.regex().to_string(),
            });
        }

        for cs in &mut self.cs {
            cs.finalize(&self.name)?;
        }
        summary.sizes = self
            .cs
            .iter()
            .map(|c| (c.name().to_string(), c.size()))
            .collect();

        tracing::info!(
            filegroup = %self.name,
            files = summary.files_matched,
            opened = summary.files_opened,
            "Scan finished"
        );
        Ok(summary)
    }

    /// Feed one matched file to the coordinate scans, returns whether it was opened
    fn scan_matched(
        &mut self,
        segments: &Segments,
        path: &Path,
        backend: &dyn Backend,
        registry: &ParserRegistry,
        config: &ScanConfig,
        attributes_pending: &mut bool,
    ) -> Result<bool> {
        let need_file = *attributes_pending || self.cs.iter().any(|c| c.needs_file());
        let file = if need_file {
            Some(ScopedFile::open(backend, path, OpenMode::Read, config.file_log_level)?)
        } else {
            None
        };
        let handle = file.as_ref().map(ScopedFile::handle);

        for cs in self.cs.iter_mut().filter(|c| c.is_scanned()) {
            cs.scan_file(segments, path, handle, registry, &self.name)?;
        }

        if *attributes_pending {
            if let Some(handle) = handle {
                for var in &self.variables {
                    let attrs = handle.variable_attributes(&var.infile_name)?;
                    tracing::debug!(
                        filegroup = %self.name,
                        variable = %var.name,
                        n = attrs.len(),
                        "Found variable attributes"
                    );
                    self.attributes.insert(var.name.clone(), attrs);
                }
            }
            *attributes_pending = false;
        }

        match file {
            Some(file) => {
                file.close()?;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
