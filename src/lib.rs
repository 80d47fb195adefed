#[macro_use]
pub mod macros;

pub mod attrs;
pub mod errors;
pub mod executor;
pub mod fixtures;
pub mod graph;
pub mod graph_optim;
pub mod ops;
pub mod reference;
pub mod utils;

pub use attrs::{Attribute, AttributeMap};
pub use errors::FcError;
pub use executor::{CPUExecutor, ExecutorConfig, Place};
pub use graph::{Graph, Op, Tensor, TensorType};
pub use graph_optim::Optimizer;
pub use ops::OpType;
