use std::collections::{HashMap, HashSet};

use log::debug;
use serde::{Deserialize, Serialize};

use crate::errors::FcError;
use crate::errors::FcError::Error;
use crate::graph::{Graph, Op};
use crate::utils::to_csv_str;

/// Where a program executes. Only the CPU is available.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Place {
    #[default]
    Cpu,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    pub place: Place,
    /// Fold relu/sigmoid nodes into the preceding fc before running.
    pub apply_fusion: bool,
}

impl ExecutorConfig {
    pub fn from_json(json: &str) -> Result<Self, FcError> {
        serde_json::from_str(json).map_err(|e| Error(e.to_string()))
    }
}

pub struct CPUExecutor {
    place: Place,
    pub executed_ops: Vec<String>,
}

impl CPUExecutor {
    pub fn new(place: Place) -> Self {
        Self {
            place,
            executed_ops: vec![],
        }
    }

    /// Run every node of `graph` in topological order, storing each result both
    /// as the variable's new value and in the graph's output map.
    pub fn execute(&mut self, graph: &mut Graph) -> Result<(), FcError> {
        let sorted_op_names = topo(&graph.op_map)?;
        debug!(
            "executing {} ops on {:?}: {}",
            sorted_op_names.len(),
            self.place,
            to_csv_str(&sorted_op_names)
        );

        for op_name in sorted_op_names {
            let (results, output_names) = {
                let op = graph
                    .op_map
                    .get(&op_name)
                    .ok_or_else(|| Error(format!("Op `{}` vanished", op_name)))?;
                debug!("running `{}` ({})", op.op_name, op.op_type);
                (op.op_type.compute(op, graph)?, op.outputs.clone())
            };

            if results.len() != output_names.len() {
                return Err(FcError::InvalidInputNo {
                    expected: output_names.len(),
                    found: results.len(),
                });
            }
            for (name, tensor) in output_names.into_iter().zip(results) {
                debug!("`{}` -> [{}]", name, to_csv_str(&tensor.shape()));
                graph.output_tensor_map.insert(name.clone(), tensor.clone());
                graph.tensor_map.insert(name, tensor);
            }
            self.executed_ops.push(op_name);
        }

        Ok(())
    }
}

fn topo_helper(
    op_map: &HashMap<String, Op>,
    sorted: &mut Vec<String>,
    visiting: &mut HashSet<String>,
    root: &String,
) -> Result<(), FcError> {
    // skip visited node
    if sorted.contains(root) {
        return Ok(());
    }
    if !visiting.insert(root.clone()) {
        return Err(Error(format!("Cycle detected at op `{}`", root)));
    }

    if let Some(op) = op_map.get(root) {
        for o in &op.prevs {
            topo_helper(op_map, sorted, visiting, o)?;
        }
        sorted.push(root.clone())
    }
    visiting.remove(root);
    Ok(())
}

pub fn topo(op_map: &HashMap<String, Op>) -> Result<Vec<String>, FcError> {
    let mut terminals = op_map
        .values()
        .filter(|o| o.nexts.is_empty())
        .map(|o| o.op_name.clone())
        .collect::<Vec<String>>();
    terminals.sort();

    if terminals.is_empty() && !op_map.is_empty() {
        return Err(Error("Graph has no terminal op".to_string()));
    }

    let mut sorted: Vec<String> = vec![];
    let mut visiting = HashSet::new();
    for t in terminals {
        topo_helper(op_map, &mut sorted, &mut visiting, &t)?;
    }
    Ok(sorted)
}
