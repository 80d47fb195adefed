use num_traits::{NumCast, PrimInt};
use serde::{Deserialize, Serialize};

use crate::attrs::AttributeMap;
use crate::errors::FcError;
use crate::errors::FcError::Error;
use crate::graph::{Graph, Op, Tensor};

use super::{check_input_no, input_tensor, Compute};

/// Converts f32 to 8-bit integers: `round(x * scale)`, saturated to the range
/// of `i8` for signed input or `u8` otherwise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuantizeOp {
    pub scale: f32,
    pub is_negative_input: bool,
}

impl Default for QuantizeOp {
    fn default() -> Self {
        Self {
            scale: 1.0,
            is_negative_input: false,
        }
    }
}

impl QuantizeOp {
    pub fn new(scale: f32, is_negative_input: bool) -> Self {
        Self {
            scale,
            is_negative_input,
        }
    }

    pub fn from_attrs(attrs: &AttributeMap) -> Result<Self, FcError> {
        let scale = attrs.get_float("Scale", 1.0)?;
        if !(scale.is_finite() && scale > 0.0) {
            return Err(Error(format!("quantize Scale must be positive, got {}", scale)));
        }
        Ok(Self {
            scale,
            is_negative_input: attrs.get_bool("is_negative_input", false)?,
        })
    }
}

/// Round to nearest and clamp into the range of `T`. NaN maps to zero.
pub fn saturate<T: PrimInt>(v: f32) -> T {
    let lo = T::min_value().to_f32().unwrap_or(f32::MIN);
    let hi = T::max_value().to_f32().unwrap_or(f32::MAX);
    <T as NumCast>::from(v.round().clamp(lo, hi)).unwrap_or_else(T::zero)
}

pub fn quantize_values<T: PrimInt>(values: &[f32], scale: f32) -> Vec<T> {
    values.iter().map(|v| saturate::<T>(v * scale)).collect()
}

impl Compute for QuantizeOp {
    fn compute(&self, op: &Op, graph: &Graph) -> Result<Vec<Tensor>, FcError> {
        check_input_no(op, 1, 1)?;
        let input = input_tensor(op, graph, 0)?;
        let values = input.as_f32()?;
        let shape = input.shape();

        let output = if self.is_negative_input {
            Tensor::I8 {
                values: Some(quantize_values::<i8>(values, self.scale)),
                shape,
            }
        } else {
            Tensor::U8 {
                values: Some(quantize_values::<u8>(values, self.scale)),
                shape,
            }
        };
        Ok(vec![output])
    }

    fn activable(&self) -> bool {
        false
    }
}
