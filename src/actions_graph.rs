//! The actions graph (spec §3) and the rewriter that lowers maximal
//! compilable subgraphs into single compiled-function nodes (spec §4.3,
//! §4.5). This is the largest module in the crate, mirroring how the
//! teacher's own IR-rewriting passes (e.g. `cranelift-codegen`'s legalizer)
//! are the bulk of their crates relative to the data structures they walk.

use crate::backend::JitBackend;
use crate::compile_dag::{CompileDag, CompileNode};
use crate::compiled_function::CompiledScalarFunction;
use crate::entity::{NodeId, PrimaryMap, SecondaryMap};
use crate::error::JitError;
use crate::function::{is_compilable_function, Scalar, ScalarFunctionDescriptor};
use crate::throttle;
use crate::types::{is_native_type, DataType};
use rustc_hash::{FxHashMap, FxHashSet};
use std::sync::Arc;

/// One actions-graph node kind (spec §3).
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum NodeKind {
    Input,
    Constant,
    Function,
    Alias,
}

/// One actions-graph node. `column` stands in for "optional materialised
/// constant column" (spec §3): since the columnar type system is external to
/// this core (`spec.md` §1), a constant is represented here by the single
/// `Scalar` value it would broadcast to, rather than a dense materialised
/// column — enough to drive `is_compilable_constant` and `CompileNode::Constant`
/// without reimplementing column materialisation.
#[derive(Clone, Debug)]
pub struct Node {
    pub kind: NodeKind,
    pub result_type: DataType,
    pub column: Option<Scalar>,
    pub function_base: Option<Arc<dyn ScalarFunctionDescriptor>>,
    pub children: Vec<NodeId>,
    pub is_function_compiled: bool,
}

impl Node {
    fn input(result_type: DataType) -> Self {
        Node { kind: NodeKind::Input, result_type, column: None, function_base: None, children: Vec::new(), is_function_compiled: false }
    }

    fn constant(result_type: DataType, value: Scalar) -> Self {
        Node { kind: NodeKind::Constant, result_type, column: Some(value), function_base: None, children: Vec::new(), is_function_compiled: false }
    }

    fn function(result_type: DataType, function: Arc<dyn ScalarFunctionDescriptor>, children: Vec<NodeId>) -> Self {
        Node { kind: NodeKind::Function, result_type, column: None, function_base: Some(function), children, is_function_compiled: false }
    }

    fn alias(result_type: DataType, aliased: NodeId) -> Self {
        Node { kind: NodeKind::Alias, result_type, column: None, function_base: None, children: vec![aliased], is_function_compiled: false }
    }
}

/// True iff `node` bears a constant value whose type is native (spec §4.1).
pub fn is_compilable_constant(node: &Node) -> bool {
    node.kind == NodeKind::Constant && node.column.is_some() && is_native_type(&node.result_type)
}

fn is_compilable_function_node(node: &Node) -> bool {
    node.kind == NodeKind::Function
        && node.function_base.as_deref().map(is_compilable_function).unwrap_or(false)
}

/// An arena of actions-graph nodes (spec §9 "Re-architecture guidance"):
/// nodes are addressed by stable `NodeId` indices rather than raw references,
/// so in-place mutation of a selected node is just mutation of an arena slot.
#[derive(Debug, Default)]
pub struct ActionsGraph {
    nodes: PrimaryMap<NodeId, Node>,
    outputs: Vec<NodeId>,
}

impl ActionsGraph {
    pub fn new() -> Self {
        ActionsGraph { nodes: PrimaryMap::new(), outputs: Vec::new() }
    }

    pub fn push_input(&mut self, result_type: DataType) -> NodeId {
        self.nodes.push(Node::input(result_type))
    }

    pub fn push_constant(&mut self, result_type: DataType, value: Scalar) -> NodeId {
        self.nodes.push(Node::constant(result_type, value))
    }

    pub fn push_function(&mut self, result_type: DataType, function: Arc<dyn ScalarFunctionDescriptor>, children: Vec<NodeId>) -> NodeId {
        self.nodes.push(Node::function(result_type, function, children))
    }

    pub fn push_alias(&mut self, result_type: DataType, aliased: NodeId) -> NodeId {
        self.nodes.push(Node::alias(result_type, aliased))
    }

    /// Marks `node` as an output (index) root: reachable by definition, and
    /// (spec §4.5 Pass 3) never itself absorbed into a parent's compiled
    /// region.
    pub fn mark_output(&mut self, node: NodeId) {
        self.outputs.push(node);
    }

    pub fn outputs(&self) -> &[NodeId] {
        &self.outputs
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Extracts the maximal `CompileDag` rooted at `root` (spec §4.3).
    /// Returns the dag and, in source order, the actions-graph nodes that
    /// became `Input` leaves.
    pub fn extract_subgraph(&self, root: NodeId) -> (CompileDag, Vec<NodeId>) {
        let mut dag = CompileDag::new();
        let mut external_children = Vec::new();
        let mut visited: FxHashMap<NodeId, usize> = FxHashMap::default();
        let mut stack: Vec<ExtractFrame> = Vec::new();

        self.push_leaf_or_frame(root, &mut dag, &mut external_children, &mut visited, &mut stack);

        while let Some(top) = stack.last_mut() {
            let node = self.node(top.node);
            if top.next_child < node.children.len() {
                let child = node.children[top.next_child];
                top.next_child += 1;
                if let Some(&pos) = visited.get(&child) {
                    stack.last_mut().unwrap().args.push(pos);
                } else {
                    self.push_leaf_or_frame(child, &mut dag, &mut external_children, &mut visited, &mut stack);
                }
            } else {
                let frame = stack.pop().unwrap();
                let node = self.node(frame.node);
                let compile_node = CompileNode::Function {
                    result_type: node.result_type.clone(),
                    function: node.function_base.clone().expect("frame was pushed only for compilable function nodes"),
                    arguments: frame.args,
                };
                let position = dag.add_node(compile_node).expect("argument positions were recorded in visit order, so all are earlier");
                visited.insert(frame.node, position);
                if let Some(parent) = stack.last_mut() {
                    parent.args.push(position);
                }
            }
        }

        (dag, external_children)
    }

    /// On first visit to `node_id`: either emits a leaf `CompileNode`
    /// directly (constant or external input) and records its position with
    /// the parent frame, or pushes a new frame to descend into its children.
    fn push_leaf_or_frame(
        &self,
        node_id: NodeId,
        dag: &mut CompileDag,
        external_children: &mut Vec<NodeId>,
        visited: &mut FxHashMap<NodeId, usize>,
        stack: &mut Vec<ExtractFrame>,
    ) {
        if let Some(&pos) = visited.get(&node_id) {
            if let Some(parent) = stack.last_mut() {
                parent.args.push(pos);
            }
            return;
        }

        let node = self.node(node_id);
        if is_compilable_constant(node) {
            let position = dag
                .add_node(CompileNode::Constant {
                    result_type: node.result_type.clone(),
                    value: node.column.clone().expect("is_compilable_constant guarantees a value"),
                })
                .expect("a leaf node has no arguments to violate position ordering");
            visited.insert(node_id, position);
            if let Some(parent) = stack.last_mut() {
                parent.args.push(position);
            }
        } else if !is_compilable_function_node(node) {
            let position = dag
                .add_node(CompileNode::Input { result_type: node.result_type.clone() })
                .expect("a leaf node has no arguments to violate position ordering");
            visited.insert(node_id, position);
            external_children.push(node_id);
            if let Some(parent) = stack.last_mut() {
                parent.args.push(position);
            }
        } else {
            stack.push(ExtractFrame { node: node_id, next_child: 0, args: Vec::new() });
        }
    }

    /// The rewriter's entry point (spec §4.5): classifies every node,
    /// selects the maximal compilable frontier, and rewrites each selected
    /// node in place with its compiled replacement.
    pub fn compile_functions(&mut self, min_count_to_compile: u32, backend: &Arc<dyn JitBackend>) -> Result<(), JitError> {
        let is_isolation = self.classify_isolation();
        let (compilable_children_size, children_size) = self.accumulate_bottom_up(&is_isolation);
        let all_parents_compilable = self.lift_frontier(&is_isolation, &compilable_children_size);

        let mut selected: Vec<NodeId> = self
            .nodes
            .keys()
            .filter(|&id| {
                is_isolation[id] && compilable_children_size[id] > 0 && !all_parents_compilable[id]
            })
            .collect();
        selected.sort_by_key(|&id| std::cmp::Reverse(children_size[id]));

        for node_id in selected {
            self.rewrite_node(node_id, min_count_to_compile, backend)?;
        }
        Ok(())
    }

    /// Pass 1 (spec §4.5): `is_compilable_in_isolation` per node.
    fn classify_isolation(&self) -> SecondaryMap<NodeId, bool> {
        let mut is_isolation = SecondaryMap::new();
        for id in self.nodes.keys() {
            let node = self.node(id);
            is_isolation[id] = is_compilable_function_node(node) && !is_compilable_constant(node);
        }
        is_isolation
    }

    /// Pass 2 (spec §4.5): bottom-up accumulation of `compilable_children_size`
    /// and `children_size`, iterative post-order over each output root. Reads
    /// `current_node.children` at each step — the fix for the Pass-2 bug
    /// spec.md §9 calls out (indexing off the wrong frame's children).
    fn accumulate_bottom_up(&self, is_isolation: &SecondaryMap<NodeId, bool>) -> (SecondaryMap<NodeId, usize>, SecondaryMap<NodeId, usize>) {
        let mut compilable_children_size: SecondaryMap<NodeId, usize> = SecondaryMap::new();
        let mut children_size: SecondaryMap<NodeId, usize> = SecondaryMap::new();
        let mut computed: FxHashSet<NodeId> = FxHashSet::default();

        for &root in &self.outputs {
            self.accumulate_from(root, is_isolation, &mut compilable_children_size, &mut children_size, &mut computed);
        }

        (compilable_children_size, children_size)
    }

    fn accumulate_from(
        &self,
        root: NodeId,
        is_isolation: &SecondaryMap<NodeId, bool>,
        compilable_children_size: &mut SecondaryMap<NodeId, usize>,
        children_size: &mut SecondaryMap<NodeId, usize>,
        computed: &mut FxHashSet<NodeId>,
    ) {
        struct Frame {
            node: NodeId,
            next_child: usize,
        }

        let mut stack = vec![Frame { node: root, next_child: 0 }];
        while let Some(top) = stack.last_mut() {
            if computed.contains(&top.node) {
                stack.pop();
                continue;
            }
            let current_node = self.node(top.node);
            if top.next_child < current_node.children.len() {
                let child = current_node.children[top.next_child];
                top.next_child += 1;
                if !computed.contains(&child) {
                    stack.push(Frame { node: child, next_child: 0 });
                }
            } else {
                let node_id = top.node;
                let current_node = self.node(node_id);
                if is_isolation[node_id] {
                    let mut compilable_size = 0usize;
                    let mut total_size = 0usize;
                    for &child in &current_node.children {
                        total_size += 1 + children_size[child];
                        if is_isolation[child] {
                            compilable_size += 1 + compilable_children_size[child];
                        }
                    }
                    compilable_children_size[node_id] = compilable_size;
                    children_size[node_id] = total_size;
                }
                computed.insert(node_id);
                stack.pop();
            }
        }
    }

    /// Pass 3 (spec §4.5): for every node, AND its "valid for compilation"
    /// status into each of its children's `all_parents_compilable` flag —
    /// not just the children of nodes that actually absorb them. A child
    /// with even one parent that cannot subsume it (non-isolation, or
    /// isolation with no compilable children of its own) must end up
    /// `false`, or it silently keeps the default `true` and is never
    /// selected even though no parent will ever absorb it. Finally, every
    /// output root is forced to remain a standalone compilation candidate.
    fn lift_frontier(&self, is_isolation: &SecondaryMap<NodeId, bool>, compilable_children_size: &SecondaryMap<NodeId, usize>) -> SecondaryMap<NodeId, bool> {
        let mut all_parents_compilable: SecondaryMap<NodeId, bool> = SecondaryMap::new();
        for id in self.nodes.keys() {
            all_parents_compilable[id] = true;
        }
        for id in self.nodes.keys() {
            let node_is_valid_for_compilation = is_isolation[id] && compilable_children_size[id] > 0;
            for &child in &self.node(id).children {
                all_parents_compilable[child] &= node_is_valid_for_compilation;
            }
        }
        for &output in &self.outputs {
            all_parents_compilable[output] = false;
        }
        all_parents_compilable
    }

    /// The rewrite step for one selected node (spec §4.5 "Rewrite").
    fn rewrite_node(&mut self, node_id: NodeId, min_count_to_compile: u32, backend: &Arc<dyn JitBackend>) -> Result<(), JitError> {
        let (dag, external_children) = self.extract_subgraph(node_id);
        if dag.input_count() == 0 {
            return Ok(());
        }

        let Some(entry) = throttle::compile(&dag, min_count_to_compile, backend)? else {
            return Ok(());
        };

        let argument_types = external_children.iter().map(|&id| self.node(id).result_type.clone()).collect();
        let compiled = Arc::new(CompiledScalarFunction::new(&dag, entry.module().clone(), argument_types));

        let node = self.node_mut(node_id);
        node.kind = NodeKind::Function;
        node.function_base = Some(compiled);
        node.children = external_children;
        node.is_function_compiled = true;
        node.column = None;
        Ok(())
    }
}

struct ExtractFrame {
    node: NodeId,
    next_child: usize,
    args: Vec<usize>,
}
