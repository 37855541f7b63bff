//! Array access through keyrings
//!
//! [`take`] extracts the part of an array a keyring selects, [`place`] puts a
//! chunk at the positions a keyring selects. In both, a key keeps an axis
//! only if [`Key::keeps_axis`]; single positions drop it.
//!
//! [`reorder_chunk`] fixes the axis order of a chunk read from a file, whose
//! axes follow the file storage order, to the order of the memory keyring.

use crate::errors::{FilecubeError, Result};
use crate::keyring::{Key, Keyring};
use ndarray::{ArrayD, ArrayViewD, ArrayViewMutD, Axis, IxDyn};

fn check_ndim(keyring: &Keyring, ndim: usize) -> Result<()> {
    if keyring.len() == ndim {
        Ok(())
    } else {
        Err(FilecubeError::ShapeMismatch(format!(
            "keyring [{keyring}] has {} keys for an array of {ndim} dimensions",
            keyring.len()
        )))
    }
}

fn check_bounds(dim: &str, key: &Key, len: usize) -> Result<()> {
    if key.is_none() {
        return Err(FilecubeError::InvalidKey {
            dim: dim.to_string(),
            message: "cannot index an array with a none key".to_string(),
        });
    }
    match key.max_position() {
        Some(max) if max >= len => Err(FilecubeError::InvalidKey {
            dim: dim.to_string(),
            message: format!("position {max} out of axis of length {len}"),
        }),
        _ => Ok(()),
    }
}

fn single_position(dim: &str, key: &Key) -> Result<usize> {
    key.to_list()
        .first()
        .copied()
        .ok_or_else(|| FilecubeError::InvalidKey {
            dim: dim.to_string(),
            message: format!("key {key} selects nothing"),
        })
}

/// Whether `key` selects the whole axis, in order
fn is_full(key: &Key, len: usize) -> bool {
    match key {
        Key::Range { start, stop, step } => *start == 0 && *step == 1 && *stop >= len,
        _ => key.to_list() == (0..len).collect::<Vec<_>>(),
    }
}

/// Extract the part of `array` selected by `keyring`, one key per axis
pub fn take<A: Clone>(keyring: &Keyring, array: ArrayViewD<'_, A>) -> Result<ArrayD<A>> {
    check_ndim(keyring, array.ndim())?;
    for ((dim, key), &len) in keyring.iter().zip(array.shape()) {
        check_bounds(dim, key, len)?;
    }

    let keys: Vec<(&str, &Key)> = keyring.iter().collect();
    let mut view = array;
    for (ax, (dim, key)) in keys.iter().enumerate().rev() {
        if !key.keeps_axis() {
            view = view.index_axis_move(Axis(ax), single_position(dim, key)?);
        }
    }

    let mut out = view.to_owned();
    for (ax, (_, key)) in keys.iter().filter(|(_, k)| k.keeps_axis()).enumerate() {
        if !is_full(key, out.len_of(Axis(ax))) {
            out = out.select(Axis(ax), &key.to_list());
        }
    }
    Ok(out)
}

/// Write `chunk` into `dest` at the positions selected by `keyring`
pub fn place<A: Clone>(keyring: &Keyring, dest: &mut ArrayD<A>, chunk: ArrayViewD<'_, A>) -> Result<()> {
    check_ndim(keyring, dest.ndim())?;
    for ((dim, key), &len) in keyring.iter().zip(dest.shape()) {
        check_bounds(dim, key, len)?;
    }

    let keys: Vec<(&str, &Key)> = keyring.iter().collect();
    let mut view: ArrayViewMutD<'_, A> = dest.view_mut();
    for (ax, (dim, key)) in keys.iter().enumerate().rev() {
        if !key.keeps_axis() {
            view = view.index_axis_move(Axis(ax), single_position(dim, key)?);
        }
    }

    let kept: Vec<Vec<usize>> = keys
        .iter()
        .filter(|(_, k)| k.keeps_axis())
        .map(|(_, k)| k.to_list())
        .collect();
    let expected: Vec<usize> = kept.iter().map(Vec::len).collect();
    if chunk.shape() != expected.as_slice() {
        return Err(FilecubeError::ShapeMismatch(format!(
            "chunk of shape {:?} placed with keyring [{keyring}] (expects {expected:?})",
            chunk.shape()
        )));
    }

    let full = kept
        .iter()
        .zip(view.shape())
        .all(|(list, &len)| list.len() == len && list.iter().enumerate().all(|(i, &p)| i == p));
    if full {
        view.assign(&chunk);
        return Ok(());
    }

    let mut target = vec![0; kept.len()];
    for (idx, value) in chunk.indexed_iter() {
        for (ax, list) in kept.iter().enumerate() {
            target[ax] = list[idx[ax]];
        }
        view[IxDyn(&target)] = value.clone();
    }
    Ok(())
}

/// Move axes to new positions.
///
/// Axis `source[i]` ends up at position `dest[i]`, the other axes keep their
/// relative order.
pub fn moveaxis<A>(array: ArrayD<A>, source: &[usize], dest: &[usize]) -> Result<ArrayD<A>> {
    let ndim = array.ndim();
    let valid = |axes: &[usize]| {
        axes.iter().all(|&a| a < ndim)
            && axes.iter().enumerate().all(|(i, a)| !axes[..i].contains(a))
    };
    if source.len() != dest.len() || !valid(source) || !valid(dest) {
        return Err(FilecubeError::ShapeMismatch(format!(
            "cannot move axes {source:?} to {dest:?} in an array of {ndim} dimensions"
        )));
    }

    let mut order: Vec<usize> = (0..ndim).filter(|a| !source.contains(a)).collect();
    let mut moves: Vec<(usize, usize)> = dest.iter().copied().zip(source.iter().copied()).collect();
    moves.sort_unstable();
    for (d, s) in moves {
        order.insert(d, s);
    }
    Ok(array.permuted_axes(IxDyn(&order)))
}

/// Axes of the chunk (file order) and their positions in memory order
fn permutation(keyring: &Keyring, int_keyring: &Keyring) -> (Vec<usize>, Vec<usize>) {
    let in_file = int_keyring.get_non_zero_dims();
    let in_data: Vec<String> = keyring
        .get_non_zero_dims()
        .into_iter()
        .filter(|d| in_file.contains(d))
        .collect();
    let source: Vec<usize> = (0..in_data.len()).collect();
    let dest: Vec<usize> = in_file
        .iter()
        .filter_map(|d| in_data.iter().position(|m| m == d))
        .collect();
    (source, dest)
}

/// Reorder a chunk read with `int_keyring` (file order) to the order of `keyring`
pub fn reorder_chunk<A>(chunk: ArrayD<A>, keyring: &Keyring, int_keyring: &Keyring) -> Result<ArrayD<A>> {
    let (source, dest) = permutation(keyring, int_keyring);
    if source == dest {
        return Ok(chunk);
    }
    tracing::debug!(?source, ?dest, "Reordering chunk");
    moveaxis(chunk, &source, &dest)
}

/// Inverse of [`reorder_chunk`]: from the order of `keyring` to the file order of `int_keyring`
pub fn reorder_chunk_for_write<A>(
    chunk: ArrayD<A>,
    keyring: &Keyring,
    int_keyring: &Keyring,
) -> Result<ArrayD<A>> {
    let (source, dest) = permutation(keyring, int_keyring);
    if source == dest {
        return Ok(chunk);
    }
    tracing::debug!(source = ?dest, dest = ?source, "Reordering chunk for writing");
    moveaxis(chunk, &dest, &source)
}
