//! Command generation, loading and writing
//!
//! A selection on the available scope is first translated into a selection
//! on this filegroup ([`Filegroup::get_fg_keyrings`]). Commands are then
//! built from the frozen coordinate indices ([`Filegroup::get_commands`]) and
//! executed through a backend.

use super::command::{merge_cmd_per_file, CmdKeyrings, Command};
use super::Filegroup;
use crate::accessor;
use crate::backend::{Backend, FileHandle, OpenMode, ScopedFile};
use crate::config::VariableSpec;
use crate::coord_scan::CoordScan;
use crate::errors::{FilecubeError, Result};
use crate::keyring::{Key, Keyring};
use ndarray::{ArrayD, ArrayViewD};
use tracing::Level;

/// Keyring used to access a file: the dimensions of the variable in storage
/// order. Dimensions unknown to the filegroup take their first index,
/// dimensions that are not in the file are dropped.
#[must_use]
pub fn internal_keyring(order: &[String], keyring: &Keyring) -> Keyring {
    let mut int_krg = Keyring::new();
    for dim in order {
        match keyring.get(dim) {
            Some(Key::None) => {}
            Some(key) => int_krg.set(dim.clone(), key.clone()),
            None => {
                tracing::warn!(dim = %dim, "Additional dimension in file, index 0 will be taken");
                int_krg.set(dim.clone(), Key::Int(0));
            }
        }
    }
    for (dim, key) in keyring.iter() {
        if !key.is_none() && !order.iter().any(|d| d == dim) {
            tracing::warn!(dim, key = %key, "Dimension not found in file, key ignored");
        }
    }
    int_krg
}

impl Filegroup {
    fn not_scanned(&self) -> FilecubeError {
        FilecubeError::Config(format!("filegroup '{}' has not been scanned", self.name))
    }

    fn variable_checked(&self, variable: &str) -> Result<&VariableSpec> {
        self.variable(variable).ok_or_else(|| {
            FilecubeError::Config(format!(
                "variable '{variable}' is not part of filegroup '{}'",
                self.name
            ))
        })
    }

    /// Translate a selection on the available scope into this filegroup.
    ///
    /// Positions the filegroup does not contain are dropped along with their
    /// memory positions. The memory keyring addresses an array shaped like
    /// the selection. Gives `None` when nothing is left along a dimension.
    pub fn get_fg_keyrings(&self, keyring: &Keyring) -> Result<Option<CmdKeyrings>> {
        if self.contains.is_empty() {
            return Err(self.not_scanned());
        }
        let mut infile = Keyring::new();
        let mut memory = Keyring::new();

        for (dim, key) in keyring.iter() {
            let table = self.contains.get(dim).ok_or_else(|| FilecubeError::UnknownDimension {
                filegroup: self.name.clone(),
                dim: dim.to_string(),
            })?;
            let outside = |g: usize| FilecubeError::InvalidKey {
                dim: dim.to_string(),
                message: format!("index {g} out of {} available values", table.len()),
            };

            match key {
                Key::None => {
                    return Err(FilecubeError::InvalidKey {
                        dim: dim.to_string(),
                        message: "selection cannot be none".to_string(),
                    })
                }
                Key::Int(g) => match table.get(*g).ok_or_else(|| outside(*g))? {
                    Some(local) => {
                        infile.set(dim, Key::Int(*local));
                        memory.set(dim, Key::Int(0));
                    }
                    None => return Ok(None),
                },
                key => {
                    let mut local = Vec::new();
                    let mut positions = Vec::new();
                    for (m, g) in key.to_list().into_iter().enumerate() {
                        if let Some(l) = table.get(g).ok_or_else(|| outside(g))? {
                            local.push(*l);
                            positions.push(m);
                        }
                    }
                    if local.is_empty() {
                        return Ok(None);
                    }
                    infile.set(dim, Key::List(local));
                    memory.set(dim, Key::List(positions));
                }
            }
        }

        for cs in &self.cs {
            if !infile.contains(cs.name()) {
                return Err(FilecubeError::dimension_not_found(cs.name()));
            }
        }

        infile.simplify();
        memory.simplify();
        let pair = CmdKeyrings::new(infile, memory);
        if !pair.is_shape_equivalent() {
            return Err(FilecubeError::ShapeMismatch(format!("filegroup keyrings {pair}")));
        }
        Ok(Some(pair))
    }

    /// Build the commands for a selection on this filegroup.
    ///
    /// `keyring` indexes the coordinate values of this filegroup, `memory`
    /// the destination array. Commands come out one per file, with their
    /// keys in the order of `keyring`.
    pub fn get_commands(&self, keyring: &Keyring, memory: &Keyring) -> Result<Vec<Command>> {
        let segments = self.segments.as_ref().ok_or_else(|| self.not_scanned())?;

        let shared: Vec<&CoordScan> = self.iter_shared(true).collect();
        let mut commands = if shared.is_empty() {
            let mut cmd = Command::new(segments.join());
            cmd.append(Keyring::new(), Keyring::new());
            vec![cmd]
        } else {
            let commands = self.commands_shared(&shared, keyring, memory)?;
            merge_cmd_per_file(commands)
        };

        let mut key_inf = Keyring::new();
        let mut key_mem = Keyring::new();
        for cs in self.iter_shared(false) {
            key_inf.set(cs.name(), cs.get_in_idx(keyring.get_checked(cs.name())?)?);
            key_mem.set(cs.name(), memory.get_checked(cs.name())?.clone());
        }
        key_inf.simplify();

        let shared_dims: Vec<&str> = shared.iter().map(|cs| cs.name()).collect();
        let order = keyring.dims();
        for cmd in &mut commands {
            cmd.join_filename(&self.root);
            cmd.merge_keys(&shared_dims);
            for pair in cmd.iter_mut() {
                pair.modify(&key_inf, &key_mem);
                pair.make_int();
            }
            cmd.check_shapes()?;
            cmd.order_keys(&order);
        }

        tracing::debug!(filegroup = %self.name, commands = commands.len(), "Commands generated");
        Ok(commands)
    }

    /// One command per combination of shared coordinate values
    fn commands_shared(
        &self,
        shared: &[&CoordScan],
        keyring: &Keyring,
        memory: &Keyring,
    ) -> Result<Vec<Command>> {
        let segments = self.segments.as_ref().ok_or_else(|| self.not_scanned())?;

        let mut local = Vec::with_capacity(shared.len());
        let mut mem = Vec::with_capacity(shared.len());
        for cs in shared {
            let key = keyring.get_checked(cs.name())?;
            let mkey = memory.get_checked(cs.name())?;
            if key.cardinality() != mkey.cardinality() {
                return Err(FilecubeError::ShapeMismatch(format!(
                    "dimension '{}': selection {key}, memory {mkey}",
                    cs.name()
                )));
            }
            local.push(key.to_list());
            mem.push(mkey.to_list());
        }
        if local.iter().any(Vec::is_empty) {
            return Ok(Vec::new());
        }

        let mut commands = Vec::new();
        let mut odometer = vec![0_usize; shared.len()];
        loop {
            let mut seg = segments.clone();
            let mut inf = Keyring::new();
            let mut krg_mem = Keyring::new();

            for (c, cs) in shared.iter().enumerate() {
                let i = local[c][odometer[c]];
                let matches = cs.matches(i).ok_or_else(|| FilecubeError::InvalidKey {
                    dim: cs.name().to_string(),
                    message: format!("index {i} out of {} values", cs.size()),
                })?;
                for (matcher, text) in cs.matchers().iter().zip(matches) {
                    seg.substitute(matcher.idx, text);
                }
                inf.set(cs.name(), cs.get_in_idx(&Key::Int(i))?);
                krg_mem.set(cs.name(), Key::Int(mem[c][odometer[c]]));
            }

            let mut cmd = Command::new(seg.join());
            cmd.append(inf, krg_mem);
            commands.push(cmd);

            // Advance, last dimension fastest
            let mut c = shared.len();
            loop {
                if c == 0 {
                    return Ok(commands);
                }
                c -= 1;
                odometer[c] += 1;
                if odometer[c] < local[c].len() {
                    break;
                }
                odometer[c] = 0;
            }
        }
    }

    /// Commands for a selection on the available scope, empty if the filegroup holds none of it
    pub fn commands_from_available(&self, keyring: &Keyring) -> Result<Vec<Command>> {
        match self.get_fg_keyrings(keyring)? {
            Some(pair) => self.get_commands(&pair.infile, &pair.memory),
            None => {
                tracing::debug!(filegroup = %self.name, "Nothing to load in this filegroup");
                Ok(Vec::new())
            }
        }
    }

    /// Load `variable` for a selection on the available scope into `dest`.
    ///
    /// `dest` is shaped like the selection. Returns `false` if the filegroup
    /// holds none of the selection.
    pub fn load_from_available(
        &self,
        backend: &dyn Backend,
        variable: &str,
        keyring: &Keyring,
        dest: &mut ArrayD<f32>,
    ) -> Result<bool> {
        match self.get_fg_keyrings(keyring)? {
            Some(pair) => {
                self.load(backend, variable, &pair.infile, &pair.memory, dest)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Load `variable` for a selection on this filegroup, returns the number of commands run
    pub fn load(
        &self,
        backend: &dyn Backend,
        variable: &str,
        keyring: &Keyring,
        memory: &Keyring,
        dest: &mut ArrayD<f32>,
    ) -> Result<usize> {
        let var = self.variable_checked(variable)?;
        let commands = self.get_commands(keyring, memory)?;
        for cmd in &commands {
            tracing::debug!("Command: {}", cmd.to_string().replace('\n', "\n\t"));
            let file = ScopedFile::open(backend, cmd.filename(), OpenMode::Read, Level::INFO)?;
            self.load_cmd(file.handle(), var, cmd, dest)?;
            file.close()?;
        }
        Ok(commands.len())
    }

    /// Run one load command on an opened file
    pub fn load_cmd(
        &self,
        handle: &dyn FileHandle,
        var: &VariableSpec,
        cmd: &Command,
        dest: &mut ArrayD<f32>,
    ) -> Result<()> {
        for pair in cmd {
            let chunk = self.load_slice(handle, &var.infile_name, &pair.infile)?;
            tracing::debug!(memory = %pair.memory, "Placing chunk");
            accessor::place(&pair.memory, dest, chunk.view())?;
        }
        Ok(())
    }

    /// Read one slab and put its axes in the order of `keyring`
    fn load_slice(&self, handle: &dyn FileHandle, ncname: &str, keyring: &Keyring) -> Result<ArrayD<f32>> {
        let order = self.order_in_file(&handle.native_dimension_order(ncname)?);
        let int_krg = internal_keyring(&order, keyring);
        tracing::debug!(variable = ncname, keys = %int_krg, "Taking keys");

        let chunk = handle.read(ncname, &self.to_infile_names(&int_krg))?;
        accessor::reorder_chunk(chunk, keyring, &int_krg)
    }

    /// Rename the dimensions of a keyring to their in-file names
    fn to_infile_names(&self, keyring: &Keyring) -> Keyring {
        keyring
            .iter()
            .map(|(dim, key)| (self.infile_name(dim).to_string(), key.clone()))
            .collect()
    }

    /// Write `data`, shaped like the selection, into the files holding it.
    ///
    /// Returns `false` if the filegroup holds none of the selection.
    pub fn write_from_available(
        &self,
        backend: &dyn Backend,
        variable: &str,
        keyring: &Keyring,
        data: ArrayViewD<'_, f32>,
    ) -> Result<bool> {
        match self.get_fg_keyrings(keyring)? {
            Some(pair) => {
                self.write(backend, variable, &pair.infile, &pair.memory, data)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Write `variable` for a selection on this filegroup, returns the number of commands run
    pub fn write(
        &self,
        backend: &dyn Backend,
        variable: &str,
        keyring: &Keyring,
        memory: &Keyring,
        data: ArrayViewD<'_, f32>,
    ) -> Result<usize> {
        let var = self.variable_checked(variable)?;
        let commands = self.get_commands(keyring, memory)?;
        for cmd in &commands {
            tracing::debug!("Command: {}", cmd.to_string().replace('\n', "\n\t"));
            let mut file = ScopedFile::open(backend, cmd.filename(), OpenMode::ReadWrite, Level::INFO)?;
            for pair in cmd {
                let chunk = accessor::take(&pair.memory, data.view())?;
                let order = self.order_in_file(&file.handle().native_dimension_order(&var.infile_name)?);
                let int_krg = internal_keyring(&order, &pair.infile);
                let chunk = accessor::reorder_chunk_for_write(chunk, &pair.infile, &int_krg)?;
                file.handle_mut()
                    .write(&var.infile_name, &self.to_infile_names(&int_krg), chunk.view())?;
            }
            file.close()?;
        }
        Ok(commands.len())
    }
}
