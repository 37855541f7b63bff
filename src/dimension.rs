//! Named coordinate axes of the available scope

use std::cmp::Ordering;

/// Unit given to values produced by date-like filename matchers
pub const EPOCH_UNITS: &str = "seconds since 1970-01-01 00:00:00";

/// A named axis with sorted, deduplicated values
#[derive(Debug, Clone, PartialEq)]
pub struct Dimension {
    name: String,
    values: Vec<f64>,
    units: String,
}

impl Dimension {
    /// Create an empty dimension, its values are filled by scanning
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            values: Vec::new(),
            units: String::new(),
        }
    }

    /// Create a dimension with known values (sorted and deduplicated)
    pub fn with_values(name: impl Into<String>, values: Vec<f64>) -> Self {
        let mut dim = Self::new(name);
        dim.update_values(values);
        dim
    }

    /// Set the units, builder style
    #[must_use]
    pub fn units(mut self, units: impl Into<String>) -> Self {
        self.units = units.into();
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    #[must_use]
    pub fn size(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    #[must_use]
    pub fn unit_str(&self) -> &str {
        &self.units
    }

    pub fn set_units(&mut self, units: impl Into<String>) {
        self.units = units.into();
    }

    /// Replace the values, sorting and deduplicating them
    pub fn update_values(&mut self, mut values: Vec<f64>) {
        values.sort_by(f64::total_cmp);
        values.dedup_by(|a, b| a.total_cmp(b) == Ordering::Equal);
        self.values = values;
    }

    /// Index of a value, exact match
    #[must_use]
    pub fn index_of(&self, value: f64) -> Option<usize> {
        self.values.binary_search_by(|v| v.total_cmp(&value)).ok()
    }

    /// `first - last` summary used in log messages
    #[must_use]
    pub fn extent_str(&self) -> String {
        match (self.values.first(), self.values.last()) {
            (Some(first), Some(last)) => format!("{first} - {last}"),
            _ => "empty".to_string(),
        }
    }
}
