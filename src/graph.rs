use std::collections::HashMap;

use log::debug;
use ndarray::{ArrayD, IxDyn};
use serde::{Deserialize, Serialize};

use crate::errors::FcError;
use crate::errors::FcError::{
    Error, IncompatibleShape, InvalidType, TensorCreateError, TensorNotFound,
};
use crate::executor::{CPUExecutor, ExecutorConfig};
use crate::graph_optim;
use crate::ops::OpType;
use crate::utils::{numel, to_csv_str};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TensorType {
    F32,
    I8,
    U8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Tensor {
    F32 {
        values: Option<Vec<f32>>,
        shape: Vec<i64>,
    },
    I8 {
        values: Option<Vec<i8>>,
        shape: Vec<i64>,
    },
    U8 {
        values: Option<Vec<u8>>,
        shape: Vec<i64>,
    },
}

impl Tensor {
    pub fn shape(&self) -> Vec<i64> {
        match self {
            Tensor::F32 { values: _, shape } => shape.clone(),
            Tensor::I8 { values: _, shape } => shape.clone(),
            Tensor::U8 { values: _, shape } => shape.clone(),
        }
    }

    pub fn tensor_type(&self) -> TensorType {
        match self {
            Tensor::F32 { .. } => TensorType::F32,
            Tensor::I8 { .. } => TensorType::I8,
            Tensor::U8 { .. } => TensorType::U8,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Tensor::F32 { .. } => "float32",
            Tensor::I8 { .. } => "int8",
            Tensor::U8 { .. } => "uint8",
        }
    }

    pub fn has_values(&self) -> bool {
        match self {
            Tensor::F32 { values, .. } => values.is_some(),
            Tensor::I8 { values, .. } => values.is_some(),
            Tensor::U8 { values, .. } => values.is_some(),
        }
    }

    /// Number of stored values, `None` when the tensor is only declared.
    pub fn values_len(&self) -> Option<usize> {
        match self {
            Tensor::F32 { values, .. } => values.as_ref().map(|v| v.len()),
            Tensor::I8 { values, .. } => values.as_ref().map(|v| v.len()),
            Tensor::U8 { values, .. } => values.as_ref().map(|v| v.len()),
        }
    }

    /// Borrow the values of an f32 tensor.
    pub fn as_f32(&self) -> Result<&[f32], FcError> {
        match self {
            Tensor::F32 {
                values: Some(v), ..
            } => Ok(v),
            Tensor::F32 { values: None, .. } => {
                Err(Error("f32 tensor has no values yet".to_string()))
            }
            other => Err(FcError::InvalidType {
                expected: "float32".to_string(),
                found: other.type_name().to_string(),
            }),
        }
    }

    /// Widen any tensor to f32 values, used when comparing outputs.
    pub fn to_f32_vec(&self) -> Result<Vec<f32>, FcError> {
        match self {
            Tensor::F32 {
                values: Some(v), ..
            } => Ok(v.clone()),
            Tensor::I8 {
                values: Some(v), ..
            } => Ok(v.iter().map(|x| *x as f32).collect()),
            Tensor::U8 {
                values: Some(v), ..
            } => Ok(v.iter().map(|x| *x as f32).collect()),
            _ => Err(Error(format!("{} tensor has no values yet", self.type_name()))),
        }
    }

    pub fn from_array(array: &ArrayD<f32>) -> Tensor {
        Tensor::F32 {
            values: Some(array.iter().cloned().collect()),
            shape: array.shape().iter().map(|d| *d as i64).collect(),
        }
    }

    pub fn to_array(&self) -> Result<ArrayD<f32>, FcError> {
        let dims = self
            .shape()
            .iter()
            .map(|d| *d as usize)
            .collect::<Vec<usize>>();
        ArrayD::from_shape_vec(IxDyn(&dims), self.to_f32_vec()?)
            .map_err(|e| Error(e.to_string()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Op {
    pub op_type: OpType,
    pub op_name: String,
    #[serde(skip)]
    pub prevs: Vec<String>,
    #[serde(skip)]
    pub nexts: Vec<String>,
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
}

impl Op {
    pub fn activable(&self) -> bool {
        self.op_type.activable()
    }
}

/// A program: named variables plus the operator nodes reading and writing them.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Graph {
    pub tensor_map: HashMap<String, Tensor>,
    pub op_map: HashMap<String, Op>,
    #[serde(skip)]
    pub output_tensor_map: HashMap<String, Tensor>,
}

impl Graph {
    pub fn new() -> Self {
        Self {
            tensor_map: HashMap::new(),
            op_map: HashMap::new(),
            output_tensor_map: HashMap::new(),
        }
    }

    pub fn new_op(
        &mut self,
        input_names: Vec<&str>,
        output_names: Vec<&str>,
        op_name: &str,
        op_type: OpType,
    ) -> Result<(), FcError> {
        if self.op_map.contains_key(op_name) {
            return Err(Error(format!("Op `{}` already exists", op_name)));
        }
        self.op_map.insert(
            op_name.into(),
            Op {
                op_type,
                op_name: String::from(op_name),
                prevs: vec![],
                nexts: vec![], // this will be filled later
                inputs: input_names.iter().map(|s| s.to_string()).collect(),
                outputs: output_names.iter().map(|s| s.to_string()).collect(),
            },
        );
        Ok(())
    }

    /// Append an op under a generated unique name and return that name.
    pub fn append_op(
        &mut self,
        input_names: Vec<&str>,
        output_names: Vec<&str>,
        op_type: OpType,
    ) -> Result<String, FcError> {
        let op_name = format!("{}_{}", op_type, uuid::Uuid::new_v4().simple());
        self.new_op(input_names, output_names, &op_name, op_type)?;
        Ok(op_name)
    }

    /// For all (A, B) node pairs in graph, connect A and B if some output of A
    /// is an input of B and A != B
    pub(crate) fn build_connections(&mut self) -> Result<(), FcError> {
        for op in self.op_map.values_mut() {
            op.prevs.clear();
            op.nexts.clear();
        }

        let node_names = self.op_map.keys().cloned().collect::<Vec<String>>();
        let mut links = vec![];
        for from in &node_names {
            for to in &node_names {
                if from == to {
                    continue;
                }
                let from_n_outputs = &self.op_map[from].outputs;
                let to_n_inputs = &self.op_map[to].inputs;
                if from_n_outputs.iter().any(|n| to_n_inputs.contains(n)) {
                    links.push((from.clone(), to.clone()));
                }
            }
        }

        for (from, to) in links {
            if let Some(op) = self.op_map.get_mut(&from) {
                op.nexts.push(to.clone());
            }
            if let Some(op) = self.op_map.get_mut(&to) {
                op.prevs.push(from);
            }
        }
        Ok(())
    }

    pub fn run(&mut self) -> Result<(), FcError> {
        self.run_with_config(&ExecutorConfig::default())
    }

    pub fn run_with_config(&mut self, config: &ExecutorConfig) -> Result<(), FcError> {
        self.run_keeping(config, &[])
    }

    /// Run, never fusing away any variable named in `keep`.
    fn run_keeping(&mut self, config: &ExecutorConfig, keep: &[&str]) -> Result<(), FcError> {
        self.build_connections()?;
        if config.apply_fusion {
            graph_optim::fuse_activations(self, keep)?;
        }

        let mut executor = CPUExecutor::new(config.place);
        executor.execute(self)?;
        Ok(())
    }

    /// Feed the given variables, run the whole program and return the fetched
    /// tensors in `fetch_list` order.
    pub fn execute(
        &mut self,
        feeds: Vec<(&str, Tensor)>,
        fetch_list: &[&str],
    ) -> Result<Vec<Tensor>, FcError> {
        self.execute_with_config(feeds, fetch_list, &ExecutorConfig::default())
    }

    pub fn execute_with_config(
        &mut self,
        feeds: Vec<(&str, Tensor)>,
        fetch_list: &[&str],
        config: &ExecutorConfig,
    ) -> Result<Vec<Tensor>, FcError> {
        for (name, tensor) in feeds {
            debug!("feeding `{}` with shape [{}]", name, to_csv_str(&tensor.shape()));
            self.set_tensor(name, tensor)?;
        }
        self.run_keeping(config, fetch_list)?;

        let mut fetched = vec![];
        for name in fetch_list {
            match self.tensor_map.get(*name) {
                Some(t) if t.has_values() => fetched.push(t.clone()),
                _ => return Err(TensorNotFound(name.to_string())),
            }
        }
        Ok(fetched)
    }

    fn len_and_shape_valid(&self, len: usize, shape: &[i64]) -> bool {
        shape.iter().all(|d| *d >= 0) && len == numel(shape)
    }

    pub fn new_tensor_f32(
        &mut self,
        tensor_name: &str,
        values: Option<Vec<f32>>,
        shape: Vec<i64>,
    ) -> Result<(), FcError> {
        if let Some(vals) = &values {
            if !self.len_and_shape_valid(vals.len(), &shape) {
                return Err(TensorCreateError(format!(
                    "Cannot create f32 tensor and resize it to {:?}",
                    shape
                )));
            }
        }
        self.tensor_map
            .insert(tensor_name.into(), Tensor::F32 { values, shape });
        Ok(())
    }

    pub fn new_tensor_i8(
        &mut self,
        tensor_name: &str,
        values: Option<Vec<i8>>,
        shape: Vec<i64>,
    ) -> Result<(), FcError> {
        if let Some(vals) = &values {
            if !self.len_and_shape_valid(vals.len(), &shape) {
                return Err(TensorCreateError(format!(
                    "Cannot create i8 tensor and resize it to {:?}",
                    shape
                )));
            }
        }
        self.tensor_map
            .insert(tensor_name.into(), Tensor::I8 { values, shape });
        Ok(())
    }

    pub fn new_tensor_u8(
        &mut self,
        tensor_name: &str,
        values: Option<Vec<u8>>,
        shape: Vec<i64>,
    ) -> Result<(), FcError> {
        if let Some(vals) = &values {
            if !self.len_and_shape_valid(vals.len(), &shape) {
                return Err(TensorCreateError(format!(
                    "Cannot create u8 tensor and resize it to {:?}",
                    shape
                )));
            }
        }
        self.tensor_map
            .insert(tensor_name.into(), Tensor::U8 { values, shape });
        Ok(())
    }

    pub fn get_output(&self, arg: &str) -> Option<&Tensor> {
        self.output_tensor_map.get(arg)
    }

    /// Replace the contents of a declared variable. Type and shape must match
    /// the declaration and the values must fill the shape.
    pub fn set_tensor(&mut self, name: &str, tensor: Tensor) -> Result<(), FcError> {
        let old = self
            .tensor_map
            .get(name)
            .ok_or_else(|| TensorNotFound(name.to_string()))?;
        if old.tensor_type() != tensor.tensor_type() {
            return Err(InvalidType {
                expected: old.type_name().to_string(),
                found: tensor.type_name().to_string(),
            });
        }
        if let Some(len) = tensor.values_len() {
            if !self.len_and_shape_valid(len, &tensor.shape()) {
                return Err(TensorCreateError(format!(
                    "Cannot feed {} values into `{}` of shape {:?}",
                    len,
                    name,
                    tensor.shape()
                )));
            }
        }
        if old.shape() != tensor.shape() {
            return Err(IncompatibleShape {
                msg: format!("Cannot feed `{}`", name),
                expected: old.shape(),
                found: tensor.shape(),
            });
        }
        self.tensor_map.insert(name.into(), tensor);
        Ok(())
    }

    /// Remove a single-input single-output node. Its producer writes straight
    /// to the removed node's output and the intermediate variable is dropped.
    pub fn remove_node_and_connect_neighbors(&mut self, name: &str) -> Result<(), FcError> {
        let node = self
            .op_map
            .remove(name)
            .ok_or_else(|| Error(format!("Op `{}` not found", name)))?;
        if node.inputs.len() != 1 || node.outputs.len() != 1 {
            return Err(Error(format!(
                "Op `{}` must have exactly one input and one output to be removed",
                name
            )));
        }
        let intermediate = &node.inputs[0];
        let output = &node.outputs[0];

        for prev in &node.prevs {
            if let Some(p) = self.op_map.get_mut(prev) {
                for o in p.outputs.iter_mut() {
                    if *o == *intermediate {
                        *o = output.clone();
                    }
                }
                p.nexts.retain(|n| n != name);
                p.nexts.extend(node.nexts.iter().cloned());
            }
        }
        for next in &node.nexts {
            if let Some(n) = self.op_map.get_mut(next) {
                n.prevs.retain(|p| p != name);
                n.prevs.extend(node.prevs.iter().cloned());
            }
        }

        let still_used = self.op_map.values().any(|o| o.inputs.contains(intermediate));
        if !still_used {
            self.tensor_map.remove(intermediate);
        }
        Ok(())
    }

    pub fn to_json(&self) -> Result<String, FcError> {
        serde_json::to_string(self).map_err(|e| Error(e.to_string()))
    }

    pub fn from_json(json: &str) -> Result<Graph, FcError> {
        serde_json::from_str(json).map_err(|e| Error(e.to_string()))
    }
}

impl Graph {
    pub(crate) fn terminal_outputs(&self) -> Vec<String> {
        let mut outputs: Vec<String> = vec![];
        let terminal_nodes = self
            .op_map
            .values()
            .filter(|o| o.nexts.is_empty())
            .collect::<Vec<&Op>>();
        for t_node in terminal_nodes {
            for out in &t_node.outputs {
                outputs.push(out.clone());
            }
        }
        outputs
    }
}
