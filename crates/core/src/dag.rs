//! Execution DAG for step ordering.
//!
//! Provisioning steps run in a strict total order: each step's preconditions
//! (toolchain present, source tree present, native library installed) are
//! established solely by the steps before it. Rather than trusting file
//! order alone, the manifest is lowered into an explicit graph — one node
//! per step, an edge from every step to its successor in declaration order,
//! plus an edge for each explicit source reference. A step that references a
//! source declared after it shows up as a cycle and is rejected at plan
//! time, before anything runs.

use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;

use crate::error::CoreError;
use crate::manifest::{Manifest, referenced_source};

/// A DAG over the manifest's steps, used for ordering and validation.
pub struct StepDag {
  /// The underlying graph; node weights are step indices into the manifest.
  graph: DiGraph<usize, ()>,

  /// Node index per step, in manifest order.
  nodes: Vec<NodeIndex>,
}

impl StepDag {
  /// Build the execution DAG from a manifest.
  ///
  /// # Errors
  ///
  /// Returns `ForwardReference` if a step references a source declared after
  /// it — with declaration order fixed, that reference can never be
  /// satisfied.
  pub fn from_manifest(manifest: &Manifest) -> Result<Self, CoreError> {
    let mut graph = DiGraph::new();
    let mut nodes = Vec::with_capacity(manifest.steps.len());

    for idx in 0..manifest.steps.len() {
      nodes.push(graph.add_node(idx));
    }

    // Declaration order: each step depends on its predecessor.
    for idx in 1..manifest.steps.len() {
      graph.add_edge(nodes[idx - 1], nodes[idx], ());
    }

    // Explicit references: the referenced source must come first.
    for (idx, def) in manifest.steps.iter().enumerate() {
      if let Some(ref_idx) = manifest.reference_index(def) {
        if ref_idx > idx {
          return Err(CoreError::ForwardReference {
            step: def.id.clone(),
            source_name: referenced_source(&def.step).unwrap_or_default().to_string(),
          });
        }
        if ref_idx != idx {
          graph.add_edge(nodes[ref_idx], nodes[idx], ());
        }
      }
    }

    let dag = Self { graph, nodes };
    dag.verify_acyclic()?;

    Ok(dag)
  }

  /// Verify that the graph is acyclic.
  fn verify_acyclic(&self) -> Result<(), CoreError> {
    toposort(&self.graph, None).map_err(|cycle| {
      let idx = self.graph[cycle.node_id()];
      CoreError::ForwardReference {
        step: format!("step #{}", idx + 1),
        source_name: "cycle".to_string(),
      }
    })?;
    Ok(())
  }

  /// Step indices in execution order.
  ///
  /// The declaration-order chain forces a unique topological order, so this
  /// is exactly manifest order for a valid recipe.
  pub fn execution_order(&self) -> Result<Vec<usize>, CoreError> {
    let sorted = toposort(&self.graph, None).map_err(|_| CoreError::ForwardReference {
      step: "unknown".to_string(),
      source_name: "cycle".to_string(),
    })?;

    Ok(sorted.into_iter().map(|n| self.graph[n]).collect())
  }

  /// Direct dependencies of a step, as step indices.
  pub fn dependencies(&self, idx: usize) -> Vec<usize> {
    let Some(&node) = self.nodes.get(idx) else {
      return Vec::new();
    };

    self
      .graph
      .neighbors_directed(node, Direction::Incoming)
      .map(|n| self.graph[n])
      .collect()
  }

  /// Number of steps in the DAG.
  pub fn step_count(&self) -> usize {
    self.nodes.len()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::manifest::Manifest;
  use kiln_lua::{EvalOptions, evaluate_recipe_string};

  fn manifest_from(src: &str) -> Manifest {
    let result = evaluate_recipe_string(src, &EvalOptions::default()).unwrap();
    Manifest::from_eval(result).unwrap()
  }

  #[test]
  fn empty_manifest() {
    let dag = StepDag::from_manifest(&Manifest::default()).unwrap();
    assert_eq!(dag.step_count(), 0);
    assert!(dag.execution_order().unwrap().is_empty());
  }

  #[test]
  fn execution_order_is_declaration_order() {
    let manifest = manifest_from(
      r#"
        packages { "git" }
        source { name = "nccl", git = "https://example.com/nccl.git" }
        native_build { source = "nccl", build = { "make" } }
        pip_install { packages = { "accelmath==0.27.2" } }
        post_install { run = { "true" } }
      "#,
    );

    let dag = StepDag::from_manifest(&manifest).unwrap();
    assert_eq!(dag.execution_order().unwrap(), vec![0, 1, 2, 3, 4]);
  }

  #[test]
  fn dependencies_include_chain_and_reference() {
    let manifest = manifest_from(
      r#"
        packages { "git" }
        source { name = "nccl", git = "https://example.com/nccl.git" }
        packages { "cmake" }
        native_build { source = "nccl", build = { "make" } }
      "#,
    );

    let dag = StepDag::from_manifest(&manifest).unwrap();

    // The native build depends on its chain predecessor (index 2) and on its
    // referenced source (index 1).
    let mut deps = dag.dependencies(3);
    deps.sort_unstable();
    assert_eq!(deps, vec![1, 2]);
  }

  #[test]
  fn first_step_has_no_dependencies() {
    let manifest = manifest_from(r#"packages { "git" }"#);
    let dag = StepDag::from_manifest(&manifest).unwrap();
    assert!(dag.dependencies(0).is_empty());
  }

  #[test]
  fn forward_reference_is_rejected() {
    // The build references a source declared after it; the precondition can
    // never be established.
    let manifest = manifest_from(
      r#"
        native_build { source = "nccl", build = { "make" } }
        source { name = "nccl", git = "https://example.com/nccl.git" }
      "#,
    );

    let result = StepDag::from_manifest(&manifest);
    assert!(matches!(result, Err(CoreError::ForwardReference { .. })));
  }
}
