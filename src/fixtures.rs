//! Input / weights / bias triples for exercising fc.

use log::debug;
use ndarray::{array, Array1, Array2, ArrayD, IxDyn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

#[derive(Debug, Clone)]
pub struct Matrix {
    pub input: ArrayD<f32>,
    pub weights: Array2<f32>,
    pub bias: Array1<f32>,
}

impl Matrix {
    /// Data of a 4-D `(mb, ic, h, w)` activation already flattened to
    /// `(mb, ic * h * w)`, all values uniform in `[0, 1)`.
    pub fn random4(mb: usize, ic: usize, oc: usize, h: usize, w: usize, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let k = ic * h * w;
        let matrix = Self {
            input: ArrayD::from_shape_fn(IxDyn(&[mb, k]), |_| rng.gen::<f32>()),
            weights: Array2::from_shape_fn((k, oc), |_| rng.gen::<f32>()),
            bias: Array1::from_shape_fn(oc, |_| rng.gen::<f32>()),
        };
        matrix.log();
        matrix
    }

    /// Random `(mb, ic, w)` input with `(w, oc)` weights.
    pub fn random3(mb: usize, ic: usize, oc: usize, w: usize, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let matrix = Self {
            input: ArrayD::from_shape_fn(IxDyn(&[mb, ic, w]), |_| rng.gen::<f32>()),
            weights: Array2::from_shape_fn((w, oc), |_| rng.gen::<f32>()),
            bias: Array1::from_shape_fn(oc, |_| rng.gen::<f32>()),
        };
        matrix.log();
        matrix
    }

    /// Small integral 3-D case whose result is exact in every precision.
    pub fn fixed3() -> Self {
        let matrix = Self {
            input: array![[[1.0f32, 2.0], [4.0, 8.0], [4.0, 2.0]]].into_dyn(),
            weights: array![[1.0f32, 3.0], [4.0, 5.0]],
            bias: array![0.0f32, 0.0],
        };
        matrix.log();
        matrix
    }

    pub fn rank(&self) -> usize {
        self.input.ndim()
    }

    fn log(&self) {
        debug!("input {:?}:\n{}", self.input.shape(), self.input);
        debug!("weights {:?}:\n{}", self.weights.shape(), self.weights);
        debug!("bias {:?}: {}", self.bias.shape(), self.bias);
    }
}
