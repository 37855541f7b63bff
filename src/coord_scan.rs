//! Per-coordinate scanning state machine
//!
//! A [`CoordScan`] collects the values of one coordinate of a filegroup while
//! files are matched, then freezes them into a sorted index recording for
//! every value the filename text it came from, its position inside the file
//! and the file itself.
//!
//! How values are found depends on the coordinate [`Placement`]:
//!
//! - shared coordinates are parsed from the text of their matchers,
//! - hybrid coordinates are parsed from filenames, or read in each file
//!   when a reader is configured,
//! - in-file coordinates are read in one representative file, or taken from
//!   the configured [`Dimension`] when no reader is set.

use crate::backend::FileHandle;
use crate::config::{CoordScanSpec, Placement};
use crate::dimension::Dimension;
use crate::errors::{FilecubeError, Result};
use crate::keyring::Key;
use crate::pregex::{CompiledPregex, Matcher, MatcherKind, Segments};
use chrono::{Datelike, Month, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A value found while scanning, with its position inside the file
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScannedValue {
    pub value: f64,
    pub in_idx: Option<usize>,
}

impl ScannedValue {
    #[must_use]
    pub const fn new(value: f64, in_idx: Option<usize>) -> Self {
        Self { value, in_idx }
    }

    /// A value of a coordinate that is not an axis of the file
    #[must_use]
    pub const fn out(value: f64) -> Self {
        Self::new(value, None)
    }
}

/// Text captured by one matcher of a filename
#[derive(Debug, Clone, Copy)]
pub struct MatchedText<'a> {
    pub kind: MatcherKind,
    pub text: &'a str,
    pub dummy: bool,
}

/// Turns the matched text of one coordinate into values
pub type FilenameParser = Arc<dyn Fn(&[MatchedText<'_>]) -> Result<Vec<ScannedValue>> + Send + Sync>;

/// Finds values inside an opened file.
///
/// Receives the handle, the in-file name of the dimension and the values
/// parsed from the filename (empty for in-file coordinates).
pub type InFileReader =
    Arc<dyn Fn(&dyn FileHandle, &str, &[ScannedValue]) -> Result<Vec<ScannedValue>> + Send + Sync>;

/// Read the coordinate variable, in-file index is the position
pub fn default_reader(
    handle: &dyn FileHandle,
    infile_name: &str,
    _from_filename: &[ScannedValue],
) -> Result<Vec<ScannedValue>> {
    let values = handle.coordinate_values(infile_name)?;
    Ok(values
        .into_iter()
        .enumerate()
        .map(|(i, v)| ScannedValue::new(v, Some(i)))
        .collect())
}

/// Custom filename parsers, by identifier
#[derive(Clone, Default)]
pub struct ParserRegistry {
    parsers: HashMap<String, FilenameParser>,
}

impl ParserRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `parser` under `id`, replacing a previous registration
    pub fn register(&mut self, id: impl Into<String>, parser: FilenameParser) {
        self.parsers.insert(id.into(), parser);
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<FilenameParser> {
        self.parsers.get(id).cloned()
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.parsers.contains_key(id)
    }
}

impl fmt::Debug for ParserRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut ids: Vec<&String> = self.parsers.keys().collect();
        ids.sort();
        f.debug_struct("ParserRegistry").field("parsers", &ids).finish()
    }
}

/// How filename text becomes a value
#[derive(Clone)]
pub enum ValueParser {
    /// Single numeric matcher, position among the coordinate's matchers
    Numeric(usize),
    /// Date-like matchers combined into seconds since 1970-01-01
    Date,
    /// Parser registered under this identifier
    Custom(String),
    /// Parser given with the coordinate configuration
    Callback(FilenameParser),
}

impl fmt::Debug for ValueParser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Numeric(i) => f.debug_tuple("Numeric").field(i).finish(),
            Self::Date => f.write_str("Date"),
            Self::Custom(id) => f.debug_tuple("Custom").field(id).finish(),
            Self::Callback(_) => f.write_str("Callback"),
        }
    }
}

impl ValueParser {
    /// Choose the parser of a coordinate from its matchers
    pub fn select(
        matchers: &[Matcher],
        callback: Option<&FilenameParser>,
        filegroup: &str,
        dim: &str,
    ) -> Result<Self> {
        if let Some(callback) = callback {
            return Ok(Self::Callback(Arc::clone(callback)));
        }
        let config = |message: String| {
            FilecubeError::Config(format!("{message} (filegroup '{filegroup}', dimension '{dim}')"))
        };

        let active: Vec<(usize, &Matcher)> =
            matchers.iter().enumerate().filter(|(_, m)| !m.dummy).collect();
        if active.is_empty() {
            return Err(config("shared coordinate without a non-dummy matcher".to_string()));
        }

        let mut customs = active.iter().filter_map(|(_, m)| m.custom.as_deref());
        if let Some(id) = customs.next() {
            if customs.any(|other| other != id) {
                return Err(config("matchers name different custom parsers".to_string()));
            }
            return Ok(Self::Custom(id.to_string()));
        }

        if active.iter().all(|(_, m)| m.kind.is_numeric()) {
            if active.len() > 1 {
                return Err(config(format!(
                    "{} numeric matchers, expected one",
                    active.len()
                )));
            }
            return Ok(Self::Numeric(active[0].0));
        }
        if active.iter().all(|(_, m)| m.kind.is_date()) {
            return Ok(Self::Date);
        }
        let kinds: Vec<String> = active.iter().map(|(_, m)| m.kind.to_string()).collect();
        Err(config(format!(
            "matcher kinds [{}] cannot be parsed without a custom parser",
            kinds.join(", ")
        )))
    }
}

fn parse_number<T: std::str::FromStr>(text: &str, dim: &str) -> Result<T>
where
    T::Err: fmt::Display,
{
    text.parse::<T>().map_err(|e| FilecubeError::ValueParse {
        dim: dim.to_string(),
        text: text.to_string(),
        message: e.to_string(),
    })
}

/// Combine date-like matches into seconds since 1970-01-01 00:00:00.
///
/// Fields not matched keep their epoch value.
pub fn parse_date(matches: &[MatchedText<'_>], dim: &str) -> Result<f64> {
    let bad = |text: &str, message: &str| FilecubeError::ValueParse {
        dim: dim.to_string(),
        text: text.to_string(),
        message: message.to_string(),
    };

    let (mut year, mut month, mut day) = (1970_i32, 1_u32, 1_u32);
    let (mut hour, mut minute, mut second) = (0_u32, 0_u32, 0_u32);
    let mut day_of_year: Option<u32> = None;

    for m in matches.iter().filter(|m| !m.dummy) {
        match m.kind {
            MatcherKind::Year => year = parse_number(m.text, dim)?,
            MatcherKind::Month => month = parse_number(m.text, dim)?,
            MatcherKind::Day => day = parse_number(m.text, dim)?,
            MatcherKind::DayOfYear => day_of_year = Some(parse_number(m.text, dim)?),
            MatcherKind::Hour => hour = parse_number(m.text, dim)?,
            MatcherKind::Minute => minute = parse_number(m.text, dim)?,
            MatcherKind::Second => second = parse_number(m.text, dim)?,
            MatcherKind::Date | MatcherKind::IsoDate => {
                let format = if m.kind == MatcherKind::Date { "%Y%m%d" } else { "%Y-%m-%d" };
                let date = NaiveDate::parse_from_str(m.text, format)
                    .map_err(|e| bad(m.text, &e.to_string()))?;
                (year, month, day) = (date.year(), date.month(), date.day());
            }
            MatcherKind::Time => {
                let time = NaiveTime::parse_from_str(m.text, "%H%M%S")
                    .map_err(|e| bad(m.text, &e.to_string()))?;
                (hour, minute, second) = (time.hour(), time.minute(), time.second());
            }
            MatcherKind::MonthName => {
                let name: Month = m
                    .text
                    .parse()
                    .map_err(|_| bad(m.text, "not a month name"))?;
                month = name.number_from_month();
            }
            kind => return Err(bad(m.text, &format!("matcher kind '{kind}' is not date-like"))),
        }
    }

    let date = match day_of_year {
        Some(doy) => NaiveDate::from_yo_opt(year, doy),
        None => NaiveDate::from_ymd_opt(year, month, day),
    }
    .ok_or_else(|| bad(&format!("{year}-{month}-{day}"), "invalid date"))?;
    let time = NaiveTime::from_hms_opt(hour, minute, second)
        .ok_or_else(|| bad(&format!("{hour}:{minute}:{second}"), "invalid time"))?;

    Ok(NaiveDateTime::new(date, time).and_utc().timestamp() as f64)
}

/// Progress of a [`CoordScan`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    Empty,
    Accumulating,
    Frozen,
}

#[derive(Debug, Clone)]
struct Record {
    value: f64,
    in_idx: Option<usize>,
    matches: Vec<String>,
    file: PathBuf,
}

/// Sorted values of a coordinate with their provenance
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrozenIndex {
    pub values: Vec<f64>,
    pub in_idx: Vec<Option<usize>>,
    /// Matched text per value, aligned with the coordinate's matchers
    pub matches: Vec<Vec<String>>,
    /// Source file per value, `None` for values not found by scanning
    pub files: Vec<Option<PathBuf>>,
}

impl FrozenIndex {
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Scanning state of one coordinate of a filegroup
#[derive(Clone)]
pub struct CoordScan {
    name: String,
    infile_name: String,
    placement: Placement,
    matchers: Vec<Matcher>,
    parser: Option<ValueParser>,
    resolved: Option<FilenameParser>,
    reader: Option<InFileReader>,
    preset: Vec<f64>,
    values_read: bool,
    state: ScanState,
    records: Vec<Record>,
    index: FrozenIndex,
}

impl CoordScan {
    /// Set up the scan of `spec.dim`, taking its matchers from `pregex`
    pub fn new(
        spec: &CoordScanSpec,
        pregex: &CompiledPregex,
        dimension: &Dimension,
        filegroup: &str,
    ) -> Result<Self> {
        let matchers: Vec<Matcher> = pregex.matchers_for(&spec.dim).cloned().collect();
        let parser = if spec.placement.is_shared() {
            Some(ValueParser::select(&matchers, spec.parser.as_ref(), filegroup, &spec.dim)?)
        } else {
            None
        };
        if spec.placement == Placement::Shared && spec.reader.is_some() {
            return Err(FilecubeError::Config(format!(
                "coordinate '{}' of filegroup '{filegroup}' is not in the files and cannot be read in them",
                spec.dim
            )));
        }
        tracing::debug!(
            filegroup,
            dim = %spec.dim,
            placement = %spec.placement,
            parser = ?parser,
            matchers = matchers.len(),
            "Coordinate scan configured"
        );

        Ok(Self {
            name: spec.dim.clone(),
            infile_name: spec.infile_or_dim().to_string(),
            placement: spec.placement,
            matchers,
            parser,
            resolved: None,
            reader: spec.reader.clone(),
            preset: dimension.values().to_vec(),
            values_read: false,
            state: ScanState::Empty,
            records: Vec::new(),
            index: FrozenIndex::default(),
        })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn infile_name(&self) -> &str {
        &self.infile_name
    }

    #[must_use]
    pub fn placement(&self) -> Placement {
        self.placement
    }

    #[must_use]
    pub fn is_shared(&self) -> bool {
        self.placement.is_shared()
    }

    #[must_use]
    pub fn matchers(&self) -> &[Matcher] {
        &self.matchers
    }

    #[must_use]
    pub fn parser(&self) -> Option<&ValueParser> {
        self.parser.as_ref()
    }

    #[must_use]
    pub fn state(&self) -> ScanState {
        self.state
    }

    /// Whether values are discovered by scanning rather than configured
    #[must_use]
    pub fn is_scanned(&self) -> bool {
        self.is_shared() || self.reader.is_some()
    }

    /// Whether the next matched file must be opened for this coordinate
    #[must_use]
    pub fn needs_file(&self) -> bool {
        match self.placement {
            Placement::Hybrid => self.reader.is_some(),
            Placement::In => self.reader.is_some() && !self.values_read,
            Placement::Shared => false,
        }
    }

    /// Forget everything scanned, back to [`ScanState::Empty`]
    pub fn reset(&mut self) {
        self.records.clear();
        self.index = FrozenIndex::default();
        self.values_read = false;
        self.resolved = None;
        self.state = ScanState::Empty;
    }

    /// Record the values found in one matched file
    pub fn scan_file(
        &mut self,
        segments: &Segments,
        path: &Path,
        handle: Option<&dyn FileHandle>,
        registry: &ParserRegistry,
        filegroup: &str,
    ) -> Result<()> {
        if self.state == ScanState::Frozen {
            return Err(FilecubeError::Config(format!(
                "coordinate '{}' of filegroup '{filegroup}' is frozen, reset it before rescanning",
                self.name
            )));
        }

        let matches: Vec<String> = self
            .matchers
            .iter()
            .map(|m| segments.matched(m.idx).unwrap_or_default().to_string())
            .collect();

        let values = match self.placement {
            Placement::In => {
                if !self.needs_file() {
                    return Ok(());
                }
                let (Some(reader), Some(handle)) = (self.reader.as_ref(), handle) else {
                    return Err(FilecubeError::backend(path, "file needed for in-file scanning"));
                };
                self.values_read = true;
                reader(handle, &self.infile_name, &[])?
            }
            Placement::Shared | Placement::Hybrid => {
                let texts: Vec<MatchedText<'_>> = self
                    .matchers
                    .iter()
                    .zip(&matches)
                    .map(|(m, text)| MatchedText {
                        kind: m.kind,
                        text,
                        dummy: m.dummy,
                    })
                    .collect();
                let from_filename = self.parse(&texts, registry, filegroup)?;

                match (self.placement, self.reader.as_ref()) {
                    (Placement::Hybrid, Some(reader)) => {
                        let handle = handle.ok_or_else(|| {
                            FilecubeError::backend(path, "file needed for in-file scanning")
                        })?;
                        reader(handle, &self.infile_name, &from_filename)?
                    }
                    (Placement::Hybrid, None) => from_filename
                        .into_iter()
                        .map(|v| ScannedValue::new(v.value, Some(v.in_idx.unwrap_or(0))))
                        .collect(),
                    _ => from_filename
                        .into_iter()
                        .map(|v| ScannedValue::out(v.value))
                        .collect(),
                }
            }
        };

        tracing::trace!(
            filegroup,
            dim = %self.name,
            file = %path.display(),
            n = values.len(),
            "Values found"
        );
        for v in values {
            self.records.push(Record {
                value: v.value,
                in_idx: v.in_idx,
                matches: matches.clone(),
                file: path.to_path_buf(),
            });
        }
        self.state = ScanState::Accumulating;
        Ok(())
    }

    fn parse(
        &mut self,
        texts: &[MatchedText<'_>],
        registry: &ParserRegistry,
        filegroup: &str,
    ) -> Result<Vec<ScannedValue>> {
        let Some(parser) = self.parser.as_ref() else {
            return Ok(Vec::new());
        };
        match parser {
            ValueParser::Numeric(pos) => {
                let text = texts.get(*pos).map_or("", |t| t.text);
                Ok(vec![ScannedValue::out(parse_number(text, &self.name)?)])
            }
            ValueParser::Date => Ok(vec![ScannedValue::out(parse_date(texts, &self.name)?)]),
            ValueParser::Callback(callback) => callback(texts),
            ValueParser::Custom(id) => {
                if self.resolved.is_none() {
                    let parser =
                        registry
                            .get(id)
                            .ok_or_else(|| FilecubeError::UnregisteredParser {
                                filegroup: filegroup.to_string(),
                                dim: self.name.clone(),
                                parser: id.clone(),
                            })?;
                    self.resolved = Some(parser);
                }
                match self.resolved.as_ref() {
                    Some(parser) => parser(texts),
                    None => Ok(Vec::new()),
                }
            }
        }
    }

    /// Sort, deduplicate and freeze the values.
    ///
    /// Fails when the coordinate ends with no value (nothing scanned, or no
    /// configured values for an in-file coordinate without a reader), or
    /// when one value was found with two different filename texts or in-file
    /// indices.
    pub fn finalize(&mut self, filegroup: &str) -> Result<()> {
        if !self.is_scanned() {
            if self.preset.is_empty() {
                return Err(FilecubeError::NoValues {
                    filegroup: filegroup.to_string(),
                    dim: self.name.clone(),
                });
            }
            self.index = FrozenIndex {
                values: self.preset.clone(),
                in_idx: (0..self.preset.len()).map(Some).collect(),
                matches: vec![Vec::new(); self.preset.len()],
                files: vec![None; self.preset.len()],
            };
            self.state = ScanState::Frozen;
            return Ok(());
        }

        if self.records.is_empty() {
            return Err(FilecubeError::NoValues {
                filegroup: filegroup.to_string(),
                dim: self.name.clone(),
            });
        }

        let mut records = std::mem::take(&mut self.records);
        records.sort_by(|a, b| a.value.total_cmp(&b.value));

        let mut index = FrozenIndex::default();
        let mut last: Option<Record> = None;
        for record in records {
            if let Some(prev) = &last {
                if prev.value.total_cmp(&record.value) == Ordering::Equal {
                    if prev.matches != record.matches || prev.in_idx != record.in_idx {
                        return Err(FilecubeError::CoordinateConflict {
                            filegroup: filegroup.to_string(),
                            dim: self.name.clone(),
                            value: record.value,
                            first: prev.file.clone(),
                            second: record.file,
                        });
                    }
                    continue;
                }
            }
            index.values.push(record.value);
            index.in_idx.push(record.in_idx);
            index.matches.push(record.matches.clone());
            index.files.push(Some(record.file.clone()));
            last = Some(record);
        }

        tracing::debug!(
            filegroup,
            dim = %self.name,
            n = index.len(),
            first = ?index.values.first(),
            last = ?index.values.last(),
            "Coordinate values found"
        );
        self.index = index;
        self.state = ScanState::Frozen;
        Ok(())
    }

    #[must_use]
    pub fn index(&self) -> &FrozenIndex {
        &self.index
    }

    #[must_use]
    pub fn values(&self) -> &[f64] {
        &self.index.values
    }

    #[must_use]
    pub fn size(&self) -> usize {
        self.index.len()
    }

    /// In-file index of value `i`
    #[must_use]
    pub fn in_idx(&self, i: usize) -> Option<usize> {
        self.index.in_idx.get(i).copied().flatten()
    }

    /// Matched text of value `i`, aligned with [`CoordScan::matchers`]
    #[must_use]
    pub fn matches(&self, i: usize) -> Option<&[String]> {
        self.index.matches.get(i).map(Vec::as_slice)
    }

    /// File value `i` was found in
    #[must_use]
    pub fn file(&self, i: usize) -> Option<&Path> {
        self.index.files.get(i).and_then(|f| f.as_deref())
    }

    /// Position of `value` in the frozen index
    #[must_use]
    pub fn index_of(&self, value: f64) -> Option<usize> {
        self.index
            .values
            .binary_search_by(|v| v.total_cmp(&value))
            .ok()
    }

    /// Translate a key on this coordinate into a key inside the file.
    ///
    /// Gives [`Key::None`] when the coordinate is not an axis of the file.
    pub fn get_in_idx(&self, key: &Key) -> Result<Key> {
        if key.is_none() {
            return Ok(Key::None);
        }
        let positions = key.to_list();
        if let Some(&bad) = positions.iter().find(|&&p| p >= self.size()) {
            return Err(FilecubeError::InvalidKey {
                dim: self.name.clone(),
                message: format!("index {bad} out of {} values", self.size()),
            });
        }
        if positions.iter().all(|&p| self.index.in_idx[p].is_none()) {
            return Ok(Key::None);
        }
        key.index_into(&self.index.in_idx)
            .ok_or_else(|| FilecubeError::InvalidKey {
                dim: self.name.clone(),
                message: format!("key {key} mixes values inside and outside of the files"),
            })
    }
}

impl fmt::Debug for CoordScan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CoordScan")
            .field("name", &self.name)
            .field("infile_name", &self.infile_name)
            .field("placement", &self.placement)
            .field("matchers", &self.matchers)
            .field("parser", &self.parser)
            .field("state", &self.state)
            .field("size", &self.size())
            .finish()
    }
}
