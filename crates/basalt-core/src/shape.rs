//! Stride, broadcast and buffer-size arithmetic.
//!
//! Everything here is a pure function over `usize` shapes. Strides are in
//! elements, not bytes.

use crate::{Error, Result};

/// Row-major strides for `shape`: the last dimension has stride 1.
///
/// ```text
/// contiguous_strides(&[2, 3, 4]) -> [12, 4, 1]
/// contiguous_strides(&[])        -> []
/// ```
pub fn contiguous_strides(shape: &[usize]) -> Vec<usize> {
    let mut strides = vec![0; shape.len()];
    let mut stride = 1;
    for i in (0..shape.len()).rev() {
        strides[i] = stride;
        stride *= shape[i];
    }
    strides
}

/// Sizes and strides that read `input` as if it had `target`'s shape.
///
/// The input is right-aligned to the target and padded with leading 1s.
/// A dimension smaller than the target's is broadcast: its size becomes the
/// target size and its stride becomes 0. Other strides follow the input's
/// contiguous layout.
///
/// Fails if the input has a higher rank than the target.
///
/// ```text
/// broadcast_strides_and_sizes(&[1, 3], &[4, 3]) -> ([4, 3], [0, 1])
/// broadcast_strides_and_sizes(&[3],    &[2, 3]) -> ([2, 3], [0, 1])
/// ```
pub fn broadcast_strides_and_sizes(
    input: &[usize],
    target: &[usize],
) -> Result<(Vec<usize>, Vec<usize>)> {
    if input.len() > target.len() {
        return Err(Error::Shape(format!(
            "Cannot broadcast rank-{} shape {:?} to rank-{} shape {:?}",
            input.len(),
            input,
            target.len(),
            target
        )));
    }

    let pad = target.len() - input.len();
    let mut sizes = vec![1; target.len()];
    sizes[pad..].copy_from_slice(input);
    let mut strides = vec![0; target.len()];

    let mut stride = 1;
    for i in (0..target.len()).rev() {
        let size = sizes[i];
        if size < target[i] {
            strides[i] = 0;
            sizes[i] = target[i];
        } else {
            strides[i] = stride;
        }
        stride *= size;
    }

    Ok((sizes, strides))
}

/// Bytes a buffer needs so every element reachable through `sizes` and
/// `strides` is in bounds, rounded up to 4 bytes.
///
/// Returns 0 for zero-width elements or empty tensors.
pub fn buffer_size_bytes(sizes: &[usize], strides: &[usize], elem_bytes: usize) -> u64 {
    if elem_bytes == 0 || sizes.contains(&0) {
        return 0;
    }
    let max_index: u64 = sizes
        .iter()
        .zip(strides)
        .map(|(&size, &stride)| (size as u64 - 1) * stride as u64)
        .sum();
    align_up((max_index + 1) * elem_bytes as u64, 4)
}

/// Round `value` up to a multiple of `alignment` (a power of two).
pub fn align_up(value: u64, alignment: u64) -> u64 {
    (value + alignment - 1) & !(alignment - 1)
}

/// Broadcast hull of any number of shapes.
///
/// Shapes are aligned at the rightmost dimension. Aligned dimensions must be
/// equal or one of them must be 1.
///
/// ```text
/// broadcast_shape(&[&[2, 3, 4], &[3, 4]])       -> [2, 3, 4]
/// broadcast_shape(&[&[8, 1, 6, 1], &[7, 1, 5]]) -> [8, 7, 6, 5]
/// ```
pub fn broadcast_shape(shapes: &[&[usize]]) -> Result<Vec<usize>> {
    let max_rank = shapes.iter().map(|s| s.len()).max().unwrap_or(0);
    let mut result = vec![1; max_rank];

    for shape in shapes {
        let pad = max_rank - shape.len();
        for (i, &dim) in shape.iter().enumerate() {
            let out = &mut result[pad + i];
            if *out == dim || dim == 1 {
                continue;
            }
            if *out == 1 {
                *out = dim;
            } else {
                return Err(Error::Shape(format!(
                    "Cannot broadcast shapes {:?} at dimension {}",
                    shapes,
                    pad + i
                )));
            }
        }
    }

    Ok(result)
}

/// Whether `input` broadcasts to exactly `target` in one direction.
pub fn is_unidirectional_broadcast(input: &[usize], target: &[usize]) -> bool {
    input.len() <= target.len()
        && input
            .iter()
            .rev()
            .zip(target.iter().rev())
            .all(|(&i, &t)| i == t || i == 1)
}
