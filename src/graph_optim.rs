use log::info;

use crate::errors::FcError;
use crate::executor::topo;
use crate::graph::Graph;
use crate::ops::activation_op::Activation;
use crate::ops::OpType;

pub struct Optimizer {}

impl Optimizer {
    pub fn new() -> Self {
        Self {}
    }

    pub fn optimize(&mut self, graph: Graph) -> Result<Graph, FcError> {
        let mut graph = graph;
        graph.build_connections()?;
        fuse_activations(&mut graph, &[])?;
        Ok(graph)
    }
}

impl Default for Optimizer {
    fn default() -> Self {
        Self::new()
    }
}

/// Fold every relu/sigmoid whose only producer is an fc into that fc as a
/// post-op. Connections must be built. Variables named in `keep` are fetched
/// by the caller and are never folded away. Returns the number of fused nodes.
pub(crate) fn fuse_activations(graph: &mut Graph, keep: &[&str]) -> Result<usize, FcError> {
    let sorted = topo(&graph.op_map)?;
    let mut found_fc_count = 0;

    for s in sorted {
        let curr = match graph.op_map.get(&s) {
            None => continue,
            Some(op) => op,
        };

        let activation = match &curr.op_type {
            OpType::Relu { .. } => Activation::Relu,
            OpType::Sigmoid { .. } => Activation::Sigmoid,
            _ => continue,
        };

        // Only a node fed by exactly one producer can be folded into it
        if curr.prevs.len() != 1 || curr.inputs.len() != 1 {
            continue;
        }
        if keep.contains(&curr.inputs[0].as_str()) {
            continue;
        }
        let curr_name = curr.op_name.clone();
        let prev_name = curr.prevs[0].clone();

        let prev = match graph.op_map.get_mut(&prev_name) {
            None => continue,
            Some(prev) => prev,
        };
        // The intermediate variable must feed nothing but this activation
        if !prev.activable() || prev.nexts.len() != 1 {
            continue;
        }
        if let OpType::Fc { attr } = &mut prev.op_type {
            match activation {
                Activation::Relu => attr.fuse_relu = true,
                Activation::Sigmoid => attr.fuse_sigmoid = true,
            }
        } else {
            continue;
        }

        graph.remove_node_and_connect_neighbors(&curr_name)?;
        found_fc_count += 1;
    }

    info!("fused {} activation(s) into fc", found_fc_count);
    Ok(found_fc_count)
}

#[cfg(test)]
mod test {
    use crate::errors::FcError;
    use crate::executor::ExecutorConfig;
    use crate::graph::{Graph, Tensor};
    use crate::graph_optim::Optimizer;
    use crate::ops::activation_op::ActivationOp;
    use crate::ops::fc::FcOp;
    use crate::ops::OpType;
    use crate::utils::vec_close;

    fn fc_then(activation: OpType) -> Result<Graph, FcError> {
        let mut graph = Graph::new();
        graph.new_tensor_f32("X", Some(vec![-1.0, -1.0, 1.0, 1.0]), vec![2, 2])?;
        graph.new_tensor_f32("W", Some(vec![1.0, 1.0]), vec![2, 1])?;
        graph.new_tensor_f32("b", Some(vec![0.5]), vec![1])?;
        graph.new_tensor_f32("fc_out", None, vec![2, 1])?;
        graph.new_tensor_f32("act_out", None, vec![2, 1])?;
        graph.new_op(
            vec!["X", "W", "b"],
            vec!["fc_out"],
            "fc",
            OpType::Fc {
                attr: FcOp::new(true, 1),
            },
        )?;
        graph.new_op(vec!["fc_out"], vec!["act_out"], "act", activation)?;
        Ok(graph)
    }

    #[test]
    fn test_fc_relu_opt() -> Result<(), FcError> {
        let graph = fc_then(OpType::Relu {
            attr: ActivationOp::relu(),
        })?;
        let mut graph = Optimizer::new().optimize(graph)?;
        graph.run()?;

        // relu is merged with fc, so graph's op_map should be of length 1
        assert_eq!(graph.op_map.len(), 1);
        assert!(!graph.tensor_map.contains_key("fc_out"));
        match &graph.op_map["fc"].op_type {
            OpType::Fc { attr } => assert!(attr.fuse_relu),
            other => panic!("Must be fc, found {}", other),
        }

        let out = graph.get_output("act_out");
        if let Some(Tensor::F32 { values, .. }) = out {
            assert_eq!(values, &Some(vec![0.0, 2.5]));
        } else {
            panic!("Must be f32, found {:?}", out);
        }
        Ok(())
    }

    #[test]
    fn test_fc_sigmoid_opt() -> Result<(), FcError> {
        let graph = fc_then(OpType::Sigmoid {
            attr: ActivationOp::sigmoid(),
        })?;
        let mut graph = Optimizer::new().optimize(graph)?;
        graph.run()?;

        assert_eq!(graph.op_map.len(), 1);
        let out = graph.get_output("act_out").unwrap();
        let expected: Vec<f32> = vec![-1.5f32, 2.5]
            .iter()
            .map(|v| 1.0 / (1.0 + (-v).exp()))
            .collect();
        assert!(vec_close(out.as_f32()?.to_vec(), expected));
        Ok(())
    }

    #[test]
    fn fusion_matches_unfused_run() -> Result<(), FcError> {
        let mut unfused = fc_then(OpType::Relu {
            attr: ActivationOp::relu(),
        })?;
        unfused.run()?;

        let mut fused = fc_then(OpType::Relu {
            attr: ActivationOp::relu(),
        })?;
        fused.run_with_config(&ExecutorConfig {
            apply_fusion: true,
            ..ExecutorConfig::default()
        })?;

        assert_eq!(unfused.op_map.len(), 2);
        assert_eq!(fused.op_map.len(), 1);
        assert_eq!(
            unfused.get_output("act_out").unwrap().as_f32()?,
            fused.get_output("act_out").unwrap().as_f32()?
        );
        Ok(())
    }

    #[test]
    fn fetched_fc_output_is_not_fused() -> Result<(), FcError> {
        let config = ExecutorConfig {
            apply_fusion: true,
            ..ExecutorConfig::default()
        };

        let mut graph = fc_then(OpType::Relu {
            attr: ActivationOp::relu(),
        })?;
        let fetched = graph.execute_with_config(vec![], &["fc_out", "act_out"], &config)?;
        assert_eq!(graph.op_map.len(), 2);
        assert_eq!(fetched[0].as_f32()?, &[-1.5, 2.5]);
        assert_eq!(fetched[1].as_f32()?, &[0.0, 2.5]);

        let mut graph = fc_then(OpType::Relu {
            attr: ActivationOp::relu(),
        })?;
        let fetched = graph.execute_with_config(vec![], &["act_out"], &config)?;
        assert_eq!(graph.op_map.len(), 1);
        assert_eq!(fetched[0].as_f32()?, &[0.0, 2.5]);
        Ok(())
    }

    #[test]
    fn shared_intermediate_is_not_fused() -> Result<(), FcError> {
        let mut graph = fc_then(OpType::Relu {
            attr: ActivationOp::relu(),
        })?;
        graph.new_tensor_f32("sig_out", None, vec![2, 1])?;
        graph.new_op(
            vec!["fc_out"],
            vec!["sig_out"],
            "sig",
            OpType::Sigmoid {
                attr: ActivationOp::sigmoid(),
            },
        )?;
        let graph = Optimizer::new().optimize(graph)?;
        assert_eq!(graph.op_map.len(), 3);
        Ok(())
    }

    #[test]
    fn already_activated_fc_is_not_fused_twice() -> Result<(), FcError> {
        let mut graph = fc_then(OpType::Relu {
            attr: ActivationOp::relu(),
        })?;
        graph.new_tensor_f32("sig_out", None, vec![2, 1])?;
        graph.new_op(
            vec!["act_out"],
            vec!["sig_out"],
            "sig",
            OpType::Sigmoid {
                attr: ActivationOp::sigmoid(),
            },
        )?;
        let mut graph = Optimizer::new().optimize(graph)?;
        assert_eq!(graph.op_map.len(), 2);
        graph.run()?;

        let expected: Vec<f32> = vec![0.0f32, 2.5]
            .iter()
            .map(|v| 1.0 / (1.0 + (-v).exp()))
            .collect();
        assert!(vec_close(
            graph.get_output("sig_out").unwrap().as_f32()?.to_vec(),
            expected
        ));
        Ok(())
    }
}
