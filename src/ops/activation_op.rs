use serde::{Deserialize, Serialize};

use crate::errors::FcError;
use crate::graph::{Graph, Op, Tensor};

use super::{check_input_no, input_tensor, Compute};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Activation {
    Relu,
    Sigmoid,
}

impl Activation {
    #[inline]
    pub fn apply(&self, x: f32) -> f32 {
        match self {
            Activation::Relu => x.max(0.0),
            Activation::Sigmoid => 1.0 / (1.0 + (-x).exp()),
        }
    }

    pub fn apply_inplace(&self, values: &mut [f32]) {
        values.iter_mut().for_each(|v| *v = self.apply(*v));
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivationOp {
    pub activation: Activation,
}

impl ActivationOp {
    pub fn new(activation: Activation) -> Self {
        Self { activation }
    }

    pub fn relu() -> Self {
        Self::new(Activation::Relu)
    }

    pub fn sigmoid() -> Self {
        Self::new(Activation::Sigmoid)
    }
}

impl Compute for ActivationOp {
    fn compute(&self, op: &Op, graph: &Graph) -> Result<Vec<Tensor>, FcError> {
        check_input_no(op, 1, 1)?;
        let input = input_tensor(op, graph, 0)?;
        let mut values = input.as_f32()?.to_vec();
        self.activation.apply_inplace(&mut values);

        Ok(vec![Tensor::F32 {
            values: Some(values),
            shape: input.shape(),
        }])
    }

    fn activable(&self) -> bool {
        // nothing is fused after an activation
        false
    }
}
