//! Load and write commands
//!
//! A [`Command`] is one file plus the slabs to move between that file and
//! memory. Each slab is a [`CmdKeyrings`] pair: where to read in the file,
//! where to put it in memory.

use crate::errors::{FilecubeError, Result};
use crate::keyring::{Key, Keyring};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// In-file and memory keyrings of one slab
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CmdKeyrings {
    pub infile: Keyring,
    pub memory: Keyring,
}

impl CmdKeyrings {
    #[must_use]
    pub fn new(infile: Keyring, memory: Keyring) -> Self {
        Self { infile, memory }
    }

    /// Add keys to both keyrings
    pub fn modify(&mut self, infile: &Keyring, memory: &Keyring) {
        self.infile.update(infile);
        self.memory.update(memory);
    }

    #[must_use]
    pub fn is_shape_equivalent(&self) -> bool {
        self.infile.is_shape_equivalent(&self.memory)
    }

    pub fn make_int(&mut self) {
        self.infile.make_int();
        self.memory.make_int();
    }

    pub fn order(&mut self, dims: &[String]) {
        self.infile.order(dims);
        self.memory.order(dims);
    }

    /// Whether both keyrings agree on every dimension but `dim`
    fn same_except(&self, other: &Self, dim: &str) -> bool {
        let agree = |a: &Keyring, b: &Keyring| {
            a.len() == b.len()
                && a.iter()
                    .filter(|(d, _)| *d != dim)
                    .all(|(d, k)| b.get(d).is_some_and(|o| o.same_positions(k)))
        };
        agree(&self.infile, &other.infile) && agree(&self.memory, &other.memory)
    }
}

impl fmt::Display for CmdKeyrings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "infile: {} | memory: {}", self.infile, self.memory)
    }
}

/// I/O for one file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    filename: PathBuf,
    pairs: Vec<CmdKeyrings>,
}

impl Command {
    pub fn new(filename: impl Into<PathBuf>) -> Self {
        Self {
            filename: filename.into(),
            pairs: Vec::new(),
        }
    }

    #[must_use]
    pub fn filename(&self) -> &Path {
        &self.filename
    }

    pub fn append(&mut self, infile: Keyring, memory: Keyring) {
        self.pairs.push(CmdKeyrings::new(infile, memory));
    }

    pub fn extend(&mut self, pairs: impl IntoIterator<Item = CmdKeyrings>) {
        self.pairs.extend(pairs);
    }

    #[must_use]
    pub fn pairs(&self) -> &[CmdKeyrings] {
        &self.pairs
    }

    pub fn iter(&self) -> std::slice::Iter<'_, CmdKeyrings> {
        self.pairs.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, CmdKeyrings> {
        self.pairs.iter_mut()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Prefix the filename with the filegroup root
    pub fn join_filename(&mut self, root: &Path) {
        self.filename = root.join(&self.filename);
    }

    /// Stack pairs along each of `dims` when they agree on every other dimension.
    ///
    /// Stacked keys are simplified, so a contiguous run of in-file indices
    /// becomes a single range. Pairs whose in-file key is `None` along the
    /// dimension are left alone.
    pub fn merge_keys<S: AsRef<str>>(&mut self, dims: &[S]) {
        let before = self.pairs.len();
        for dim in dims {
            let dim = dim.as_ref();
            let mut merged: Vec<CmdKeyrings> = Vec::with_capacity(self.pairs.len());

            for pair in self.pairs.drain(..) {
                let stackable = matches!(pair.infile.get(dim), Some(k) if !k.is_none())
                    && pair.memory.contains(dim);
                let target = if stackable {
                    merged.iter_mut().find(|m| {
                        matches!(m.infile.get(dim), Some(k) if !k.is_none()) && m.same_except(&pair, dim)
                    })
                } else {
                    None
                };

                match target {
                    Some(target) => {
                        stack(&mut target.infile, &pair.infile, dim);
                        stack(&mut target.memory, &pair.memory, dim);
                    }
                    None => merged.push(pair),
                }
            }

            for pair in &mut merged {
                for keyring in [&mut pair.infile, &mut pair.memory] {
                    if let Some(mut key) = keyring.get(dim).cloned() {
                        key.simplify();
                        keyring.set(dim, key);
                    }
                }
            }
            self.pairs = merged;
        }

        if self.pairs.len() != before {
            tracing::debug!(
                file = %self.filename.display(),
                before,
                after = self.pairs.len(),
                "Merged contiguous keys"
            );
        }
    }

    /// Reorder the keys of every pair, `dims` first
    pub fn order_keys<S: AsRef<str>>(&mut self, dims: &[S]) {
        let dims: Vec<String> = dims.iter().map(|d| d.as_ref().to_string()).collect();
        for pair in &mut self.pairs {
            pair.order(&dims);
        }
    }

    /// Fail if a pair has in-file and memory keyrings of different shapes
    pub fn check_shapes(&self) -> Result<()> {
        match self.pairs.iter().find(|p| !p.is_shape_equivalent()) {
            Some(pair) => Err(FilecubeError::ShapeMismatch(format!(
                "{}: {pair}",
                self.filename.display()
            ))),
            None => Ok(()),
        }
    }
}

/// Append the positions of `other[dim]` to `target[dim]`
fn stack(target: &mut Keyring, other: &Keyring, dim: &str) {
    let mut list = target.get(dim).map(Key::to_list).unwrap_or_default();
    list.extend(other.get(dim).map(Key::to_list).unwrap_or_default());
    target.set(dim, Key::List(list));
}

impl<'a> IntoIterator for &'a Command {
    type Item = &'a CmdKeyrings;
    type IntoIter = std::slice::Iter<'a, CmdKeyrings>;

    fn into_iter(self) -> Self::IntoIter {
        self.pairs.iter()
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.filename.display())?;
        for pair in &self.pairs {
            write!(f, "\n  {pair}")?;
        }
        Ok(())
    }
}

/// Merge commands on the same file, keeping the order files are first seen in
#[must_use]
pub fn merge_cmd_per_file(commands: Vec<Command>) -> Vec<Command> {
    let mut merged: Vec<Command> = Vec::new();
    let mut positions: HashMap<PathBuf, usize> = HashMap::new();
    let before = commands.len();

    for cmd in commands {
        match positions.get(&cmd.filename) {
            Some(&i) => merged[i].extend(cmd.pairs),
            None => {
                positions.insert(cmd.filename.clone(), merged.len());
                merged.push(cmd);
            }
        }
    }

    tracing::debug!(before, after = merged.len(), "Merged commands per file");
    merged
}
