//! Dependency graph built from a stage's steps
//!
//! Nodes carry the resolved action, the originating step, and the step's
//! declaration index. Edges come from `require` lists and are resolved to
//! node indices at build time.

use crate::manifest::{Action, Manifest, Stage, Step};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("action not found: {0}")]
    UnknownAction(String),
    #[error("step '{step}' requires unknown step: {require}")]
    UnknownRequire { step: String, require: String },
    #[error("circular dependency detected involving step: {0}")]
    Cycle(String),
}

/// One vertex: a step resolved against the manifest. The node's position in
/// [`Graph::nodes`] is its declaration index.
#[derive(Debug)]
pub struct Node<'a> {
    pub name: &'a str,
    pub action: &'a Action,
    pub step: &'a Step,
    /// Indices of the nodes this one requires.
    pub requires: Vec<usize>,
}

#[derive(Debug)]
pub struct Graph<'a> {
    pub nodes: Vec<Node<'a>>,
}

impl<'a> Graph<'a> {
    /// Builds the graph for a stage. Unknown actions are re-checked here
    /// defensively even though validation already rejects them.
    pub fn build(stage: &'a Stage, manifest: &'a Manifest) -> Result<Self, GraphError> {
        let mut index: HashMap<&str, usize> = HashMap::new();
        for (i, step) in stage.steps.iter().enumerate() {
            index.entry(step.action.as_str()).or_insert(i);
        }

        let mut nodes = Vec::with_capacity(stage.steps.len());
        for step in &stage.steps {
            let action = manifest
                .get_action(&step.action)
                .ok_or_else(|| GraphError::UnknownAction(step.action.clone()))?;

            let mut requires = Vec::with_capacity(step.require.len());
            for require in &step.require {
                let target = index.get(require.as_str()).copied().ok_or_else(|| {
                    GraphError::UnknownRequire {
                        step: step.action.clone(),
                        require: require.clone(),
                    }
                })?;
                requires.push(target);
            }

            nodes.push(Node {
                name: step.action.as_str(),
                action,
                step,
                requires,
            });
        }

        let graph = Graph { nodes };
        graph.detect_cycles()?;
        Ok(graph)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Depth-first traversal reporting one node on any back edge.
    fn detect_cycles(&self) -> Result<(), GraphError> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            White,
            Grey,
            Black,
        }

        fn visit(graph: &Graph<'_>, node: usize, marks: &mut [Mark]) -> Result<(), GraphError> {
            match marks[node] {
                Mark::Grey => return Err(GraphError::Cycle(graph.nodes[node].name.to_string())),
                Mark::Black => return Ok(()),
                Mark::White => {}
            }

            marks[node] = Mark::Grey;
            for &require in &graph.nodes[node].requires {
                visit(graph, require, marks)?;
            }
            marks[node] = Mark::Black;
            Ok(())
        }

        let mut marks = vec![Mark::White; self.nodes.len()];
        for node in 0..self.nodes.len() {
            visit(self, node, &mut marks)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::Manifest;

    fn manifest(yaml: &str) -> Manifest {
        Manifest::load_from_str(yaml).unwrap()
    }

    #[test]
    fn builds_linear_chain() {
        let m = manifest(
            r#"
project: { name: p }
actions:
  - { name: a, run: "true" }
  - { name: b, run: "true" }
  - { name: c, run: "true" }
stages:
  pre-push:
    steps:
      - action: a
      - action: b
        require: [a]
      - action: c
        require: [b]
"#,
        );
        let stage = m.get_stage("pre-push").unwrap();
        let graph = Graph::build(stage, &m).unwrap();

        assert_eq!(graph.len(), 3);
        assert!(graph.nodes[0].requires.is_empty());
        assert_eq!(graph.nodes[1].requires, vec![0]);
        assert_eq!(graph.nodes[2].requires, vec![1]);
    }

    #[test]
    fn rejects_require_outside_stage() {
        let m = manifest(
            r#"
project: { name: p }
actions:
  - { name: a, run: "true" }
  - { name: elsewhere, run: "true" }
stages:
  pre-push:
    steps:
      - action: a
        require: [elsewhere]
"#,
        );
        let stage = m.get_stage("pre-push").unwrap();
        let err = Graph::build(stage, &m).unwrap_err();
        assert!(matches!(err, GraphError::UnknownRequire { .. }), "{err}");
    }

    #[test]
    fn rejects_two_step_cycle() {
        let m = manifest(
            r#"
project: { name: p }
actions:
  - { name: a, run: "true" }
  - { name: b, run: "true" }
stages:
  pre-push:
    steps:
      - action: a
        require: [b]
      - action: b
        require: [a]
"#,
        );
        let stage = m.get_stage("pre-push").unwrap();
        let err = Graph::build(stage, &m).unwrap_err();
        assert!(matches!(err, GraphError::Cycle(_)), "{err}");
        assert!(err.to_string().contains("circular dependency"));
    }

    #[test]
    fn rejects_self_cycle() {
        let m = manifest(
            r#"
project: { name: p }
actions:
  - { name: a, run: "true" }
stages:
  pre-push:
    steps:
      - action: a
        require: [a]
"#,
        );
        let stage = m.get_stage("pre-push").unwrap();
        assert!(matches!(
            Graph::build(stage, &m).unwrap_err(),
            GraphError::Cycle(_)
        ));
    }

    #[test]
    fn diamond_is_not_a_cycle() {
        let m = manifest(
            r#"
project: { name: p }
actions:
  - { name: a, run: "true" }
  - { name: b, run: "true" }
  - { name: c, run: "true" }
  - { name: d, run: "true" }
stages:
  pre-push:
    steps:
      - action: a
      - action: b
        require: [a]
      - action: c
        require: [a]
      - action: d
        require: [b, c]
"#,
        );
        let stage = m.get_stage("pre-push").unwrap();
        let graph = Graph::build(stage, &m).unwrap();
        assert_eq!(graph.nodes[3].requires, vec![1, 2]);
    }
}
