use std::fmt;

use serde::{Deserialize, Serialize};

use crate::attrs::AttributeMap;
use crate::errors::FcError;
use crate::errors::FcError::{InvalidInputNo, TensorNotFound, UnsupportedOp};
use crate::graph::{Graph, Op, Tensor};

use self::activation_op::ActivationOp;
use self::fc::FcOp;
use self::quantize::QuantizeOp;

pub mod activation_op;
pub mod fc;
pub mod quantize;

/// A CPU kernel: reads its inputs from the graph, returns one tensor per output.
pub trait Compute {
    fn compute(&self, op: &Op, graph: &Graph) -> Result<Vec<Tensor>, FcError>;

    /// Whether an activation following this op may be fused into it.
    fn activable(&self) -> bool;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum OpType {
    Fc { attr: FcOp },
    Quantize { attr: QuantizeOp },
    Relu { attr: ActivationOp },
    Sigmoid { attr: ActivationOp },
}

impl OpType {
    /// Build a typed op from the framework op name and an opaque attribute map.
    pub fn from_attrs(op_type: &str, attrs: &AttributeMap) -> Result<Self, FcError> {
        let op_type = match op_type {
            "fc" => OpType::Fc {
                attr: FcOp::from_attrs(attrs)?,
            },
            "quantize" => OpType::Quantize {
                attr: QuantizeOp::from_attrs(attrs)?,
            },
            "relu" => OpType::Relu {
                attr: ActivationOp::relu(),
            },
            "sigmoid" => OpType::Sigmoid {
                attr: ActivationOp::sigmoid(),
            },
            _ => return Err(UnsupportedOp(op_type.to_string())),
        };
        Ok(op_type)
    }

    pub fn compute(&self, op: &Op, graph: &Graph) -> Result<Vec<Tensor>, FcError> {
        match self {
            OpType::Fc { attr } => attr.compute(op, graph),
            OpType::Quantize { attr } => attr.compute(op, graph),
            OpType::Relu { attr } | OpType::Sigmoid { attr } => attr.compute(op, graph),
        }
    }

    pub fn activable(&self) -> bool {
        match self {
            OpType::Fc { attr } => attr.activable(),
            OpType::Quantize { attr } => attr.activable(),
            OpType::Relu { attr } | OpType::Sigmoid { attr } => attr.activable(),
        }
    }
}

impl fmt::Display for OpType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OpType::Fc { .. } => write!(f, "fc"),
            OpType::Quantize { .. } => write!(f, "quantize"),
            OpType::Relu { .. } => write!(f, "relu"),
            OpType::Sigmoid { .. } => write!(f, "sigmoid"),
        }
    }
}

pub(crate) fn check_input_no(op: &Op, min: usize, max: usize) -> Result<(), FcError> {
    let found = op.inputs.len();
    if found < min {
        return Err(InvalidInputNo {
            expected: min,
            found,
        });
    }
    if found > max {
        return Err(InvalidInputNo {
            expected: max,
            found,
        });
    }
    Ok(())
}

/// The `idx`-th input of `op`, which must already hold values.
pub(crate) fn input_tensor<'a>(
    op: &Op,
    graph: &'a Graph,
    idx: usize,
) -> Result<&'a Tensor, FcError> {
    let name = op.inputs.get(idx).ok_or(InvalidInputNo {
        expected: idx + 1,
        found: op.inputs.len(),
    })?;
    match graph.tensor_map.get(name) {
        Some(t) if t.has_values() => Ok(t),
        _ => Err(TensorNotFound(name.clone())),
    }
}
