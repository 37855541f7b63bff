//! Per-dimension index specifications
//!
//! A [`Keyring`] maps dimension names to a [`Key`]. The same structure is used
//! to select data in the available scope, to address a slab inside a single
//! file, and to address the destination of that slab in memory. Keyrings are
//! ordered: the order of their dimensions is the order of the axes of the
//! array they describe.

use crate::errors::{FilecubeError, Result};
use std::fmt;

/// Index specification along one dimension
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Key {
    /// A single position, the axis is squeezed
    Int(usize),
    /// Explicit ordered positions
    List(Vec<usize>),
    /// Positions `start, start + step, ...` below `stop`
    Range { start: usize, stop: usize, step: usize },
    /// The dimension does not exist where this key is applied (a file without that axis)
    None,
}

impl Key {
    /// Contiguous range `start..stop`
    #[must_use]
    pub const fn range(start: usize, stop: usize) -> Self {
        Self::Range {
            start,
            stop,
            step: 1,
        }
    }

    /// Range with a step. A zero step is treated as one.
    #[must_use]
    pub fn range_step(start: usize, stop: usize, step: usize) -> Self {
        Self::Range {
            start,
            stop,
            step: step.max(1),
        }
    }

    /// Every position of a dimension of length `size`
    #[must_use]
    pub const fn full(size: usize) -> Self {
        Self::range(0, size)
    }

    /// Build a simplified key from explicit positions
    #[must_use]
    pub fn from_list(list: Vec<usize>) -> Self {
        let mut key = Self::List(list);
        key.simplify();
        key
    }

    /// Number of positions selected. `None` counts as one: a missing axis yields a single element.
    #[must_use]
    pub fn cardinality(&self) -> usize {
        match self {
            Self::Int(_) | Self::None => 1,
            Self::List(list) => list.len(),
            Self::Range { start, stop, step } => {
                if stop > start {
                    (stop - start).div_ceil((*step).max(1))
                } else {
                    0
                }
            }
        }
    }

    /// Whether the key keeps an axis in the array it selects.
    ///
    /// Keys of cardinality one never keep an axis, whatever their representation.
    #[must_use]
    pub fn keeps_axis(&self) -> bool {
        matches!(self, Self::List(_) | Self::Range { .. }) && self.cardinality() != 1
    }

    #[must_use]
    pub const fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    /// Expand into explicit positions. `None` gives an empty list.
    #[must_use]
    pub fn to_list(&self) -> Vec<usize> {
        match self {
            Self::Int(i) => vec![*i],
            Self::List(list) => list.clone(),
            Self::Range { start, stop, step } => (*start..*stop).step_by((*step).max(1)).collect(),
            Self::None => Vec::new(),
        }
    }

    /// Collapse the representation without changing the positions selected.
    ///
    /// A list of one position becomes an `Int`, an arithmetic progression with a
    /// positive step becomes a `Range`. Ranges get a canonical `stop`.
    pub fn simplify(&mut self) {
        match self {
            Self::List(list) if list.len() == 1 => *self = Self::Int(list[0]),
            Self::List(list) if list.len() > 1 => {
                let (first, second) = (list[0], list[1]);
                if second <= first {
                    return;
                }
                let step = second - first;
                let arithmetic = list.windows(2).all(|w| w[1] > w[0] && w[1] - w[0] == step);
                if arithmetic {
                    let last = list[list.len() - 1];
                    *self = Self::Range {
                        start: first,
                        stop: last + step,
                        step,
                    };
                }
            }
            Self::Range { start, stop, step } => {
                *step = (*step).max(1);
                let n = if *stop > *start {
                    (*stop - *start).div_ceil(*step)
                } else {
                    0
                };
                *stop = *start + n * *step;
            }
            _ => {}
        }
    }

    /// Same positions and same `None`-ness, whatever the representation.
    #[must_use]
    pub fn same_positions(&self, other: &Self) -> bool {
        self.is_none() == other.is_none() && self.to_list() == other.to_list()
    }

    /// Largest position selected
    #[must_use]
    pub fn max_position(&self) -> Option<usize> {
        match self {
            Self::Int(i) => Some(*i),
            Self::List(list) => list.iter().copied().max(),
            Self::Range { start, step, .. } => match self.cardinality() {
                0 => None,
                n => Some(start + (n - 1) * (*step).max(1)),
            },
            Self::None => None,
        }
    }

    /// Compose with an index table: position `i` becomes `table[i]`.
    ///
    /// An `Int` stays an `Int`, other keys become a simplified list.
    /// Returns `None` if a position falls outside the table or maps to a
    /// missing entry.
    #[must_use]
    pub fn index_into(&self, table: &[Option<usize>]) -> Option<Self> {
        match self {
            Self::Int(i) => table.get(*i).copied().flatten().map(Self::Int),
            Self::None => Some(Self::None),
            key => {
                let list = key
                    .to_list()
                    .into_iter()
                    .map(|i| table.get(i).copied().flatten())
                    .collect::<Option<Vec<_>>>()?;
                Some(Self::from_list(list))
            }
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(i) => write!(f, "{i}"),
            Self::List(list) => write!(f, "{list:?}"),
            Self::Range { start, stop, step: 1 } => write!(f, "{start}:{stop}"),
            Self::Range { start, stop, step } => write!(f, "{start}:{stop}:{step}"),
            Self::None => write!(f, "none"),
        }
    }
}

impl From<usize> for Key {
    fn from(i: usize) -> Self {
        Self::Int(i)
    }
}

impl From<Vec<usize>> for Key {
    fn from(list: Vec<usize>) -> Self {
        Self::List(list)
    }
}

impl From<std::ops::Range<usize>> for Key {
    fn from(range: std::ops::Range<usize>) -> Self {
        Self::range(range.start, range.end)
    }
}

/// Ordered mapping from dimension name to [`Key`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Keyring {
    keys: Vec<(String, Key)>,
}

impl Keyring {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from `(dimension, key)` pairs. A repeated dimension overrides the earlier key.
    pub fn from_pairs<I, S, K>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, K)>,
        S: Into<String>,
        K: Into<Key>,
    {
        let mut keyring = Self::new();
        for (dim, key) in pairs {
            keyring.set(dim, key);
        }
        keyring
    }

    #[must_use]
    pub fn get(&self, dim: &str) -> Option<&Key> {
        self.keys.iter().find(|(d, _)| d == dim).map(|(_, k)| k)
    }

    /// Like [`Keyring::get`], failing with a lookup error on a missing dimension
    pub fn get_checked(&self, dim: &str) -> Result<&Key> {
        self.get(dim)
            .ok_or_else(|| FilecubeError::dimension_not_found(dim))
    }

    fn get_mut(&mut self, dim: &str) -> Option<&mut Key> {
        self.keys.iter_mut().find(|(d, _)| d == dim).map(|(_, k)| k)
    }

    /// Set the key of a dimension, keeping its position if already present
    pub fn set(&mut self, dim: impl Into<String>, key: impl Into<Key>) {
        let dim = dim.into();
        let key = key.into();
        match self.get_mut(&dim) {
            Some(existing) => *existing = key,
            None => self.keys.push((dim, key)),
        }
    }

    pub fn remove(&mut self, dim: &str) -> Option<Key> {
        let pos = self.keys.iter().position(|(d, _)| d == dim)?;
        Some(self.keys.remove(pos).1)
    }

    #[must_use]
    pub fn contains(&self, dim: &str) -> bool {
        self.get(dim).is_some()
    }

    #[must_use]
    pub fn dims(&self) -> Vec<String> {
        self.keys.iter().map(|(d, _)| d.clone()).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Key)> {
        self.keys.iter().map(|(d, k)| (d.as_str(), k))
    }

    /// Cardinality of every key, in order
    #[must_use]
    pub fn shape(&self) -> Vec<usize> {
        self.keys.iter().map(|(_, k)| k.cardinality()).collect()
    }

    /// Simplify every key, see [`Key::simplify`]
    pub fn simplify(&mut self) {
        for (_, key) in &mut self.keys {
            key.simplify();
        }
    }

    /// Project onto `dims`, in the order of `dims`
    pub fn subset<S: AsRef<str>>(&self, dims: &[S]) -> Result<Self> {
        let mut out = Self::new();
        for dim in dims {
            let dim = dim.as_ref();
            out.set(dim, self.get_checked(dim)?.clone());
        }
        Ok(out)
    }

    /// Project onto the dimensions of `dims` that are present, in the order of `dims`
    #[must_use]
    pub fn subset_present<S: AsRef<str>>(&self, dims: &[S]) -> Self {
        let mut out = Self::new();
        for dim in dims {
            if let Some(key) = self.get(dim.as_ref()) {
                out.set(dim.as_ref(), key.clone());
            }
        }
        out
    }

    /// Same per-dimension cardinality, ignoring the key representation.
    ///
    /// Compared over the union of both dimension sets; a missing dimension counts as one.
    #[must_use]
    pub fn is_shape_equivalent(&self, other: &Self) -> bool {
        let card = |krg: &Self, dim: &str| krg.get(dim).map_or(1, Key::cardinality);
        self.keys
            .iter()
            .chain(other.keys.iter())
            .all(|(dim, _)| card(self, dim) == card(other, dim))
    }

    /// Materialize every key into an explicit list. `None` keys are left alone.
    pub fn make_list(&mut self) {
        for (_, key) in &mut self.keys {
            if !key.is_none() {
                *key = Key::List(key.to_list());
            }
        }
    }

    /// Turn every key selecting a single position into an `Int`
    pub fn make_int(&mut self) {
        for (_, key) in &mut self.keys {
            if !key.is_none() && key.cardinality() == 1 {
                *key = Key::Int(key.to_list()[0]);
            }
        }
    }

    /// Dimensions that keep an axis (cardinality above one), in order
    #[must_use]
    pub fn get_non_zero_dims(&self) -> Vec<String> {
        self.keys
            .iter()
            .filter(|(_, k)| k.keeps_axis())
            .map(|(d, _)| d.clone())
            .collect()
    }

    /// Put the dimensions of `dims` first, in that order; the others follow in their current order.
    pub fn order<S: AsRef<str>>(&mut self, dims: &[S]) {
        let mut ordered = Vec::with_capacity(self.keys.len());
        for dim in dims {
            if let Some(pos) = self.keys.iter().position(|(d, _)| d == dim.as_ref()) {
                ordered.push(self.keys.remove(pos));
            }
        }
        ordered.append(&mut self.keys);
        self.keys = ordered;
    }

    /// Set every key of `other` on this keyring
    pub fn update(&mut self, other: &Self) {
        for (dim, key) in &other.keys {
            self.set(dim.clone(), key.clone());
        }
    }
}

impl fmt::Display for Keyring {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.keys.iter().map(|(d, k)| format!("{d}: {k}")).collect();
        write!(f, "{}", parts.join(", "))
    }
}

impl<S: Into<String>> FromIterator<(S, Key)> for Keyring {
    fn from_iter<T: IntoIterator<Item = (S, Key)>>(iter: T) -> Self {
        Self::from_pairs(iter)
    }
}
