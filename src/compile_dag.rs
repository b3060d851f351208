//! `CompileDAG`: a flat, self-contained representation of one compilable
//! subgraph (spec §3, §4.2).

use crate::function::{Scalar, ScalarFunctionDescriptor};
use crate::types::DataType;
use crate::error::JitError;
use sha2::{Digest, Sha256};
use std::fmt::Write as _;
use std::sync::Arc;

/// One position in a `CompileDag`. Arguments to a `Function` node are
/// positions of earlier nodes (spec §3 invariant: strictly less than the
/// node's own index).
#[derive(Debug)]
pub enum CompileNode {
    Input { result_type: DataType },
    Constant { result_type: DataType, value: Scalar },
    Function {
        result_type: DataType,
        function: Arc<dyn ScalarFunctionDescriptor>,
        arguments: Vec<usize>,
    },
}

impl CompileNode {
    pub fn result_type(&self) -> &DataType {
        match self {
            CompileNode::Input { result_type }
            | CompileNode::Constant { result_type, .. }
            | CompileNode::Function { result_type, .. } => result_type,
        }
    }
}

/// 128-bit structural fingerprint of a `CompileDag` (spec §3, §4.2). Derived
/// by hashing the canonical `dump()` text with SHA-256 and truncating to the
/// first 16 bytes; see `SPEC_FULL.md` §4.2 for why this algorithm was
/// chosen over an ad hoc structural hash.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct Fingerprint(pub u128);

/// A linear, self-contained representation of one extracted compilable
/// subgraph (spec §4.2). Immutable and freely shareable once constructed;
/// construction itself is single-threaded.
#[derive(Debug, Default)]
pub struct CompileDag {
    nodes: Vec<CompileNode>,
}

impl CompileDag {
    pub fn new() -> Self {
        CompileDag { nodes: Vec::new() }
    }

    /// Appends `node`, returning the position assigned to it. Rejects a
    /// `Function` node whose argument positions are not strictly less than
    /// its own (about-to-be-assigned) position.
    pub fn add_node(&mut self, node: CompileNode) -> Result<usize, JitError> {
        let position = self.nodes.len();
        if let CompileNode::Function { ref arguments, .. } = node {
            for &arg in arguments {
                if arg >= position {
                    return Err(JitError::InvalidCompileDag {
                        detail: format!(
                            "function node at position {position} references argument \
                             at position {arg}, which is not strictly earlier"
                        ),
                    });
                }
            }
        }
        self.nodes.push(node);
        Ok(position)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn index(&self, i: usize) -> &CompileNode {
        &self.nodes[i]
    }

    pub fn back(&self) -> &CompileNode {
        self.nodes.last().expect("CompileDag is never empty once constructed")
    }

    pub fn input_count(&self) -> usize {
        self.nodes.iter().filter(|n| matches!(n, CompileNode::Input { .. })).count()
    }

    /// Canonical textual form: stable across runs, used as the compiled
    /// function's human name (module symbol name, log identifier). Embeds
    /// node kinds, function names, type names and argument positions.
    pub fn dump(&self) -> String {
        let mut out = String::new();
        for (i, node) in self.nodes.iter().enumerate() {
            if i > 0 {
                out.push(';');
            }
            match node {
                CompileNode::Input { result_type } => {
                    let _ = write!(out, "in{i}:{result_type}");
                }
                CompileNode::Constant { result_type, value } => {
                    let _ = write!(out, "const{i}:{result_type}={value:?}");
                }
                CompileNode::Function { result_type, function, arguments } => {
                    let _ = write!(out, "{}{i}:{result_type}(", function.name());
                    for (j, arg) in arguments.iter().enumerate() {
                        if j > 0 {
                            out.push(',');
                        }
                        let _ = write!(out, "{arg}");
                    }
                    out.push(')');
                }
            }
        }
        out
    }

    /// Structural fingerprint (spec §3). Two `CompileDag`s built from
    /// isomorphic subgraphs produce the same fingerprint because they
    /// produce the same `dump()` text.
    pub fn hash(&self) -> Fingerprint {
        let mut hasher = Sha256::new();
        hasher.update(self.dump().as_bytes());
        let digest = hasher.finalize();
        let mut bytes = [0u8; 16];
        bytes.copy_from_slice(&digest[..16]);
        Fingerprint(u128::from_be_bytes(bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::function::test_functions::BinaryIntFn;
    use crate::types::NativeKind;

    fn i32_ty() -> DataType {
        DataType::native(NativeKind::Int32)
    }

    #[test]
    fn rejects_forward_references() {
        let mut dag = CompileDag::new();
        dag.add_node(CompileNode::Input { result_type: i32_ty() }).unwrap();
        let err = dag
            .add_node(CompileNode::Function {
                result_type: i32_ty(),
                function: Arc::new(BinaryIntFn { name: "plus", op: |a, b| a + b, arg_types: [i32_ty(), i32_ty()], result_type: i32_ty() }),
                arguments: vec![0, 5],
            })
            .unwrap_err();
        assert!(matches!(err, JitError::InvalidCompileDag { .. }));
    }

    #[test]
    fn isomorphic_dags_fingerprint_equal() {
        let build = || {
            let mut dag = CompileDag::new();
            let a = dag.add_node(CompileNode::Input { result_type: i32_ty() }).unwrap();
            let b = dag.add_node(CompileNode::Input { result_type: i32_ty() }).unwrap();
            dag.add_node(CompileNode::Function {
                result_type: i32_ty(),
                function: Arc::new(BinaryIntFn { name: "plus", op: |x, y| x + y, arg_types: [i32_ty(), i32_ty()], result_type: i32_ty() }),
                arguments: vec![a, b],
            })
            .unwrap();
            dag
        };
        assert_eq!(build().hash().0, build().hash().0);
    }

    #[test]
    fn distinct_dags_fingerprint_differently() {
        let mut plus = CompileDag::new();
        let a = plus.add_node(CompileNode::Input { result_type: i32_ty() }).unwrap();
        let b = plus.add_node(CompileNode::Input { result_type: i32_ty() }).unwrap();
        plus.add_node(CompileNode::Function {
            result_type: i32_ty(),
            function: Arc::new(BinaryIntFn { name: "plus", op: |x, y| x + y, arg_types: [i32_ty(), i32_ty()], result_type: i32_ty() }),
            arguments: vec![a, b],
        })
        .unwrap();

        let mut mul = CompileDag::new();
        let a = mul.add_node(CompileNode::Input { result_type: i32_ty() }).unwrap();
        let b = mul.add_node(CompileNode::Input { result_type: i32_ty() }).unwrap();
        mul.add_node(CompileNode::Function {
            result_type: i32_ty(),
            function: Arc::new(BinaryIntFn { name: "mul", op: |x, y| x * y, arg_types: [i32_ty(), i32_ty()], result_type: i32_ty() }),
            arguments: vec![a, b],
        })
        .unwrap();

        assert_ne!(plus.hash().0, mul.hash().0);
    }

    #[test]
    fn input_count_counts_only_inputs() {
        let mut dag = CompileDag::new();
        dag.add_node(CompileNode::Input { result_type: i32_ty() }).unwrap();
        dag.add_node(CompileNode::Constant { result_type: i32_ty(), value: Scalar::I32(1) }).unwrap();
        assert_eq!(dag.input_count(), 1);
        assert_eq!(dag.len(), 2);
    }
}
