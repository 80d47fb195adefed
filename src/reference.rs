//! Straightforward dense-algebra versions of fc, used as ground truth for the
//! kernels in `ops::fc`. Independent of the graph and the kernels on purpose:
//! everything here goes through `ndarray`.

use ndarray::{Array1, Array2, ArrayD};

use crate::errors::FcError;
use crate::errors::FcError::{IncompatibleShape, ShapeMismatchError};

fn affine(
    input: &ArrayD<f32>,
    rows: usize,
    weights: &Array2<f32>,
    bias: &Array1<f32>,
) -> Result<Array2<f32>, FcError> {
    let cols = if rows == 0 { 0 } else { input.len() / rows };
    if rows * cols != input.len() {
        return Err(ShapeMismatchError);
    }
    let input2d = input
        .view()
        .into_shape((rows, cols))
        .map_err(|_| ShapeMismatchError)?;

    if cols != weights.nrows() || weights.ncols() != bias.len() {
        return Err(IncompatibleShape {
            msg: "input, weights and bias do not line up".into(),
            expected: vec![cols as i64, bias.len() as i64],
            found: weights.shape().iter().map(|d| *d as i64).collect(),
        });
    }

    let mut result = input2d.dot(weights);
    result += bias;
    Ok(result)
}

/// `input.reshape(shape[0], -1) . weights + bias`
pub fn fully_connected_naive(
    input: &ArrayD<f32>,
    weights: &Array2<f32>,
    bias: &Array1<f32>,
) -> Result<Array2<f32>, FcError> {
    let rows = *input.shape().first().ok_or(ShapeMismatchError)?;
    affine(input, rows, weights, bias)
}

/// `input.reshape(shape[0] * shape[1], -1) . weights + bias`
pub fn fully_connected_3d_naive(
    input: &ArrayD<f32>,
    weights: &Array2<f32>,
    bias: &Array1<f32>,
) -> Result<Array2<f32>, FcError> {
    if input.ndim() < 2 {
        return Err(ShapeMismatchError);
    }
    let rows = input.shape()[0] * input.shape()[1];
    affine(input, rows, weights, bias)
}
