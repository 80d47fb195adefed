use log::debug;
use serde::{Deserialize, Serialize};

use crate::attrs::AttributeMap;
use crate::errors::FcError;
use crate::errors::FcError::{Error, IncompatibleShape, InvalidType};
use crate::graph::{Graph, Op, Tensor};

use super::activation_op::Activation;
use super::quantize::saturate;
use super::{check_input_no, input_tensor, Compute};

/// Rows and columns added around the weights when `padding_weights` is set.
pub const WEIGHT_PADDING: i64 = 4;

/// Fully-connected layer: `Out = flatten(Input, in_num_col_dims) * W + Bias`.
///
/// Inputs are positional: `[Input, W]` or `[Input, W, Bias]`. `Input` may be
/// f32, or int8/uint8 as produced by a quantize op, in which case `scale_in`
/// and `scale_weights` describe how the integer domain maps back to f32.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FcOp {
    pub use_mkldnn: bool,
    pub in_num_col_dims: i64,
    pub scale_in: f32,
    pub scale_weights: Vec<f32>,
    pub activation_type: String,
    pub padding_weights: bool,
    pub fuse_relu: bool,
    pub fuse_sigmoid: bool,
}

impl Default for FcOp {
    fn default() -> Self {
        Self {
            use_mkldnn: false,
            in_num_col_dims: 1,
            scale_in: 1.0,
            scale_weights: vec![1.0],
            activation_type: String::new(),
            padding_weights: false,
            fuse_relu: false,
            fuse_sigmoid: false,
        }
    }
}

impl FcOp {
    pub fn new(use_mkldnn: bool, in_num_col_dims: i64) -> Self {
        Self {
            use_mkldnn,
            in_num_col_dims,
            ..Self::default()
        }
    }

    pub fn from_attrs(attrs: &AttributeMap) -> Result<Self, FcError> {
        let default = Self::default();
        let op = Self {
            use_mkldnn: attrs.get_bool("use_mkldnn", default.use_mkldnn)?,
            in_num_col_dims: attrs.get_int("in_num_col_dims", default.in_num_col_dims)?,
            scale_in: attrs.get_float("scale_in", default.scale_in)?,
            scale_weights: attrs.get_floats("scale_weights", default.scale_weights)?,
            activation_type: attrs.get_string("activation_type", &default.activation_type)?,
            padding_weights: attrs.get_bool("padding_weights", default.padding_weights)?,
            fuse_relu: attrs.get_bool("fuse_relu", default.fuse_relu)?,
            fuse_sigmoid: attrs.get_bool("fuse_sigmoid", default.fuse_sigmoid)?,
        };
        match op.activation_type.as_str() {
            "" | "relu" => {}
            other => {
                return Err(InvalidType {
                    expected: "activation_type \"\" or \"relu\"".to_string(),
                    found: other.to_string(),
                })
            }
        }
        Ok(op)
    }

    /// Post-op applied to every output element, if any.
    pub fn post_op(&self) -> Option<Activation> {
        if self.fuse_relu || self.activation_type == "relu" {
            Some(Activation::Relu)
        } else if self.fuse_sigmoid {
            Some(Activation::Sigmoid)
        } else {
            None
        }
    }

    /// Per-output-channel weight scales, broadcasting a single scale.
    fn channel_scales(&self, n: usize) -> Result<Vec<f32>, FcError> {
        match self.scale_weights.len() {
            1 => Ok(vec![self.scale_weights[0]; n]),
            len if len == n => Ok(self.scale_weights.clone()),
            len => Err(IncompatibleShape {
                msg: "scale_weights must hold one scale or one per output channel".into(),
                expected: vec![n as i64],
                found: vec![len as i64],
            }),
        }
    }
}

/// Split `dims` into a matrix at `num_col_dims`: rows are the product of the
/// leading dims, columns the product of the rest.
pub fn flatten_to_2d(dims: &[i64], num_col_dims: i64) -> Result<(i64, i64), FcError> {
    if num_col_dims < 1 || num_col_dims as usize > dims.len() {
        return Err(Error(format!(
            "in_num_col_dims must be in [1, {}], got {}",
            dims.len(),
            num_col_dims
        )));
    }
    let (lead, rest) = dims.split_at(num_col_dims as usize);
    Ok((lead.iter().product(), rest.iter().product()))
}

/// Output dims of fc: the first `in_num_col_dims` input dims followed by the
/// number of output channels.
pub fn fc_output_size(
    in_dims: &[i64],
    w_dims: &[i64],
    in_num_col_dims: i64,
    padding_weights: bool,
) -> Result<Vec<i64>, FcError> {
    if w_dims.len() != 2 {
        return Err(IncompatibleShape {
            msg: "fc weights must be 2-D".into(),
            expected: vec![2],
            found: vec![w_dims.len() as i64],
        });
    }
    let (_, in_mat_cols) = flatten_to_2d(in_dims, in_num_col_dims)?;
    let pad = if padding_weights { WEIGHT_PADDING } else { 0 };
    let (w_rows, w_cols) = (w_dims[0] - pad, w_dims[1] - pad);
    if w_rows <= 0 || w_cols <= 0 {
        return Err(IncompatibleShape {
            msg: "fc weights are smaller than their padding".into(),
            expected: vec![pad + 1, pad + 1],
            found: w_dims.to_vec(),
        });
    }
    if in_mat_cols != w_rows {
        return Err(IncompatibleShape {
            msg: "Fully Connected input and weight size do not match".into(),
            expected: vec![w_rows],
            found: vec![in_mat_cols],
        });
    }

    let mut out_dims = in_dims[..in_num_col_dims as usize].to_vec();
    out_dims.push(w_cols);
    Ok(out_dims)
}

/// Copy the leading `k x n` block out of a row-major matrix with row stride
/// `ld`.
fn unpad(w: &[f32], k: usize, n: usize, ld: usize) -> Vec<f32> {
    if ld == n {
        return w[..k * n].to_vec();
    }
    w.chunks(ld).take(k).flat_map(|row| &row[..n]).cloned().collect()
}

/// Reference loop order (i, p, j), weights read row by row.
pub fn gemm_naive(x: &[f32], w: &[f32], m: usize, k: usize, n: usize) -> Vec<f32> {
    let mut out = vec![0.0f32; m * n];
    for i in 0..m {
        let out_row = &mut out[i * n..(i + 1) * n];
        for p in 0..k {
            let a = x[i * k + p];
            let w_row = &w[p * n..(p + 1) * n];
            for (o, b) in out_row.iter_mut().zip(w_row) {
                *o += a * b;
            }
        }
    }
    out
}

/// Weights repacked column-major once, then every output is a contiguous dot
/// product with four independent accumulators.
pub fn gemm_packed(x: &[f32], w: &[f32], m: usize, k: usize, n: usize) -> Vec<f32> {
    let mut w_t = vec![0.0f32; k * n];
    for p in 0..k {
        for j in 0..n {
            w_t[j * k + p] = w[p * n + j];
        }
    }

    let mut out = vec![0.0f32; m * n];
    for i in 0..m {
        let x_row = &x[i * k..(i + 1) * k];
        for j in 0..n {
            out[i * n + j] = dot(x_row, &w_t[j * k..(j + 1) * k]);
        }
    }
    out
}

#[inline]
fn dot(a: &[f32], b: &[f32]) -> f32 {
    let mut acc = [0.0f32; 4];
    let chunks = a.len() / 4;
    for c in 0..chunks {
        for l in 0..4 {
            acc[l] += a[c * 4 + l] * b[c * 4 + l];
        }
    }
    let mut sum = (acc[0] + acc[1]) + (acc[2] + acc[3]);
    for t in chunks * 4..a.len() {
        sum += a[t] * b[t];
    }
    sum
}

/// Integer inputs times weights quantized per output channel, accumulated in
/// i32 and scaled back to f32 by `1 / (scale_in * scale_w[j])`.
pub fn gemm_int8<T: Copy + Into<i32>>(
    x: &[T],
    w: &[f32],
    m: usize,
    k: usize,
    n: usize,
    scale_in: f32,
    scale_w: &[f32],
) -> Vec<f32> {
    let mut w_q = vec![0i8; k * n];
    for p in 0..k {
        for j in 0..n {
            w_q[j * k + p] = saturate::<i8>(w[p * n + j] * scale_w[j]);
        }
    }

    let mut out = vec![0.0f32; m * n];
    for i in 0..m {
        let x_row = &x[i * k..(i + 1) * k];
        for j in 0..n {
            let acc: i32 = x_row
                .iter()
                .zip(&w_q[j * k..(j + 1) * k])
                .map(|(a, b)| Into::<i32>::into(*a) * i32::from(*b))
                .sum();
            out[i * n + j] = acc as f32 / (scale_in * scale_w[j]);
        }
    }
    out
}

impl Compute for FcOp {
    fn compute(&self, op: &Op, graph: &Graph) -> Result<Vec<Tensor>, FcError> {
        check_input_no(op, 2, 3)?;
        let input = input_tensor(op, graph, 0)?;
        let weights = input_tensor(op, graph, 1)?;
        let bias = if op.inputs.len() > 2 {
            Some(input_tensor(op, graph, 2)?)
        } else {
            None
        };

        let w_dims = weights.shape();
        let out_dims = fc_output_size(
            &input.shape(),
            &w_dims,
            self.in_num_col_dims,
            self.padding_weights,
        )?;
        let (m, k) = flatten_to_2d(&input.shape(), self.in_num_col_dims)?;
        let (m, k) = (m as usize, k as usize);
        let n = out_dims[out_dims.len() - 1] as usize;

        let w = unpad(weights.as_f32()?, k, n, w_dims[1] as usize);

        let mut out = match input {
            Tensor::F32 {
                values: Some(x), ..
            } => {
                if self.use_mkldnn {
                    gemm_packed(x, &w, m, k, n)
                } else {
                    gemm_naive(x, &w, m, k, n)
                }
            }
            Tensor::I8 {
                values: Some(x), ..
            } => gemm_int8(x, &w, m, k, n, self.scale_in, &self.channel_scales(n)?),
            Tensor::U8 {
                values: Some(x), ..
            } => gemm_int8(x, &w, m, k, n, self.scale_in, &self.channel_scales(n)?),
            _ => return Err(Error(format!("fc input `{}` has no values", op.inputs[0]))),
        };
        debug!(
            "fc `{}`: {}x{} * {}x{} ({})",
            op.op_name,
            m,
            k,
            k,
            n,
            input.type_name()
        );

        if let Some(bias) = bias {
            let b = bias.as_f32()?;
            if b.len() != n {
                return Err(IncompatibleShape {
                    msg: "fc bias must have one value per output channel".into(),
                    expected: vec![n as i64],
                    found: bias.shape(),
                });
            }
            for row in out.chunks_mut(n) {
                for (o, b) in row.iter_mut().zip(b) {
                    *o += b;
                }
            }
        }

        if let Some(act) = self.post_op() {
            act.apply_inplace(&mut out);
        }

        Ok(vec![Tensor::F32 {
            values: Some(out),
            shape: out_dims,
        }])
    }

    fn activable(&self) -> bool {
        self.post_op().is_none()
    }
}

#[cfg(test)]
mod tests {
    use crate::errors::FcError;
    use crate::graph::{Graph, Tensor};
    use crate::ops::OpType;
    use crate::utils::vec_close;

    use super::*;

    fn fc_graph(
        x: Vec<f32>,
        x_shape: Vec<i64>,
        w: Vec<f32>,
        w_shape: Vec<i64>,
        bias: Option<Vec<f32>>,
        attr: FcOp,
    ) -> Result<Graph, FcError> {
        let mut graph = Graph::new();
        graph.new_tensor_f32("X", Some(x), x_shape)?;
        graph.new_tensor_f32("W", Some(w), w_shape)?;
        graph.new_tensor_f32("output", None, vec![])?;
        let mut inputs = vec!["X", "W"];
        if let Some(b) = bias {
            let len = b.len() as i64;
            graph.new_tensor_f32("bias", Some(b), vec![len])?;
            inputs.push("bias");
        }
        graph.new_op(inputs, vec!["output"], "my_fc", OpType::Fc { attr })?;
        Ok(graph)
    }

    #[test]
    fn output_size_flattens_at_num_col_dims() -> Result<(), FcError> {
        assert_eq!(fc_output_size(&[2, 15, 2, 2], &[60, 48], 1, false)?, vec![2, 48]);
        assert_eq!(fc_output_size(&[1, 3, 2], &[2, 2], 2, false)?, vec![1, 3, 2]);
        assert_eq!(fc_output_size(&[1, 3, 2], &[6, 5], 2, true)?, vec![1, 3, 1]);
        Ok(())
    }

    #[test]
    fn mismatched_weights_are_rejected() {
        let res = fc_output_size(&[2, 3], &[4, 5], 1, false);
        assert!(matches!(res, Err(FcError::IncompatibleShape { .. })));
        let res = fc_output_size(&[2, 3], &[3, 5], 3, false);
        assert!(matches!(res, Err(FcError::Error(_))));
    }

    #[test]
    fn simple_fc() -> Result<(), FcError> {
        let mut graph = fc_graph(
            vec![1.0, 2.0, 3.0, 4.0],
            vec![2, 2],
            vec![1.0, 1.0],
            vec![2, 1],
            None,
            FcOp::default(),
        )?;
        graph.run()?;
        if let Some(Tensor::F32 { values, shape }) = graph.get_output("output") {
            assert_eq!(values, &Some(vec![3.0, 7.0]));
            assert_eq!(shape, &vec![2, 1]);
        } else {
            panic!("No output found")
        }
        Ok(())
    }

    #[test]
    fn fc_5x2_with_bias() -> Result<(), FcError> {
        for use_mkldnn in [false, true] {
            let mut graph = fc_graph(
                vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 10.0],
                vec![5, 2],
                vec![1.0, 1.0, 2.0, 2.0],
                vec![2, 2],
                Some(vec![1.0, -1.0]),
                FcOp::new(use_mkldnn, 1),
            )?;
            graph.run()?;
            let out = graph.get_output("output").unwrap();
            assert_eq!(
                out.as_f32()?,
                &[6.0, 4.0, 12.0, 10.0, 18.0, 16.0, 24.0, 22.0, 30.0, 28.0]
            );
        }
        Ok(())
    }

    #[test]
    fn fc_keeps_leading_dims() -> Result<(), FcError> {
        let mut graph = fc_graph(
            vec![1.0, 2.0, 4.0, 8.0, 4.0, 2.0],
            vec![1, 3, 2],
            vec![1.0, 3.0, 4.0, 5.0],
            vec![2, 2],
            Some(vec![0.0, 0.0]),
            FcOp::new(true, 2),
        )?;
        graph.run()?;
        let out = graph.get_output("output").unwrap();
        assert_eq!(out.shape(), vec![1, 3, 2]);
        assert_eq!(out.as_f32()?, &[9.0, 13.0, 36.0, 44.0, 12.0, 22.0]);
        Ok(())
    }

    #[test]
    fn fc_with_relu_activation_type() -> Result<(), FcError> {
        let attr = FcOp::from_attrs(&attrs! { "activation_type" => "relu" })?;
        let mut graph = fc_graph(
            vec![-1.0, -1.0, 1.0, 1.0],
            vec![2, 2],
            vec![1.0, 1.0],
            vec![2, 1],
            None,
            attr,
        )?;
        graph.run()?;
        assert_eq!(graph.get_output("output").unwrap().as_f32()?, &[0.0, 2.0]);
        Ok(())
    }

    #[test]
    fn fc_with_fused_sigmoid() -> Result<(), FcError> {
        let attr = FcOp::from_attrs(&attrs! { "fuse_sigmoid" => true })?;
        let mut graph = fc_graph(
            vec![-1.0, -1.0, 1.0, 1.0],
            vec![2, 2],
            vec![1.0, 1.0],
            vec![2, 1],
            None,
            attr,
        )?;
        graph.run()?;
        let expected = [-2.0f32, 2.0]
            .iter()
            .map(|v| 1.0 / (1.0 + (-v).exp()))
            .collect::<Vec<f32>>();
        assert!(vec_close(
            graph.get_output("output").unwrap().as_f32()?.to_vec(),
            expected
        ));
        Ok(())
    }

    #[test]
    fn padded_weights_ignore_padding() -> Result<(), FcError> {
        // 2x1 weights stored in a 6x5 buffer
        let mut w = vec![100.0f32; 6 * 5];
        w[0] = 1.0;
        w[5] = 2.0;
        let attr = FcOp::from_attrs(&attrs! { "padding_weights" => true })?;
        let mut graph = fc_graph(vec![1.0, 1.0, 2.0, 3.0], vec![2, 2], w, vec![6, 5], None, attr)?;
        graph.run()?;
        let out = graph.get_output("output").unwrap();
        assert_eq!(out.shape(), vec![2, 1]);
        assert_eq!(out.as_f32()?, &[3.0, 8.0]);
        Ok(())
    }

    #[test]
    fn int8_input_is_dequantized() -> Result<(), FcError> {
        let mut graph = Graph::new();
        graph.new_tensor_i8("X", Some(vec![2, -4, 6, 8]), vec![2, 2])?;
        graph.new_tensor_f32("W", Some(vec![0.5, 1.0, -1.0, 0.25]), vec![2, 2])?;
        graph.new_tensor_f32("bias", Some(vec![1.0, 0.0]), vec![2])?;
        graph.new_tensor_f32("output", None, vec![2, 2])?;
        let attr = FcOp::from_attrs(&attrs! {
            "scale_in" => 2.0,
            "scale_weights" => vec![4.0, 4.0],
        })?;
        graph.new_op(vec!["X", "W", "bias"], vec!["output"], "fc", OpType::Fc { attr })?;
        graph.run()?;

        // real input is X / 2 = [[1, -2], [3, 4]]
        assert_eq!(
            graph.get_output("output").unwrap().as_f32()?,
            &[1.0 + 2.5, 0.5, 1.0 - 2.5, 4.0]
        );
        Ok(())
    }

    #[test]
    fn bias_of_wrong_length_is_rejected() -> Result<(), FcError> {
        let mut graph = fc_graph(
            vec![1.0, 2.0],
            vec![1, 2],
            vec![1.0, 1.0],
            vec![2, 1],
            Some(vec![0.0, 0.0]),
            FcOp::default(),
        )?;
        assert!(matches!(graph.run(), Err(FcError::IncompatibleShape { .. })));
        Ok(())
    }

    #[test]
    fn kernels_agree() {
        let (m, k, n) = (3, 7, 5);
        let x = (0..m * k).map(|v| (v as f32 * 0.37).sin()).collect::<Vec<f32>>();
        let w = (0..k * n).map(|v| (v as f32 * 0.11).cos()).collect::<Vec<f32>>();
        assert!(vec_close(
            gemm_naive(&x, &w, m, k, n),
            gemm_packed(&x, &w, m, k, n)
        ));
    }
}
