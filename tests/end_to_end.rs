//! End-to-end rewrite + execution scenarios (spec §8 "End-to-end scenarios"
//! S1-S6), driven through the in-crate `InterpretedBackend` test double —
//! the same shape as the teacher's own per-behavior integration test files
//! under `crates/cache/tests/`.

use expr_jit_core::backend::testing::InterpretedBackend;
use expr_jit_core::backend::JitBackend;
use expr_jit_core::column::Column;
use expr_jit_core::function::{ExecutableFunction, Monotonicity, Scalar, ScalarFunctionDescriptor};
use expr_jit_core::types::{DataType, NativeKind};
use expr_jit_core::{ActionsGraph, JitError};
use std::sync::Arc;

fn i32_ty() -> DataType {
    DataType::native(NativeKind::Int32)
}

fn i64_ty() -> DataType {
    DataType::native(NativeKind::Int64)
}

/// A tiny compilable binary function, parameterised by its own result type
/// so both i32 (S1, S2, S3, S6) and i64 (S5) graphs can be built from it.
#[derive(Debug)]
struct BinaryFn {
    name: &'static str,
    op: fn(i64, i64) -> i64,
    arg_types: [DataType; 2],
    result_type: DataType,
}

impl ScalarFunctionDescriptor for BinaryFn {
    fn name(&self) -> &str {
        self.name
    }
    fn argument_types(&self) -> &[DataType] {
        &self.arg_types
    }
    fn result_type(&self) -> &DataType {
        &self.result_type
    }
    fn is_compilable(&self) -> bool {
        true
    }
    fn is_deterministic(&self) -> bool {
        true
    }
    fn is_deterministic_in_scope_of_query(&self) -> bool {
        true
    }
    fn is_suitable_for_constant_folding(&self) -> bool {
        true
    }
    fn is_injective(&self, _sample_columns: &[Column]) -> bool {
        false
    }
    fn has_monotonicity_information(&self) -> bool {
        false
    }
    fn monotonicity_for_range(&self, _arg_type: &DataType, _left: &Scalar, _right: &Scalar) -> Monotonicity {
        Monotonicity::non_monotonic()
    }
    fn compile_into(&self, _builder: &mut dyn expr_jit_core::function::IrBuilder, input_values: &[expr_jit_core::function::IrValue]) -> expr_jit_core::function::IrValue {
        input_values.first().copied().unwrap_or(0)
    }
    fn prepare(&self, _arguments: &[Column]) -> Result<Box<dyn ExecutableFunction>, JitError> {
        Ok(Box::new(BinaryExec { op: self.op }))
    }
}

struct BinaryExec {
    op: fn(i64, i64) -> i64,
}

impl ExecutableFunction for BinaryExec {
    fn execute(&self, arguments: &[Column], result_type: &DataType, row_count: usize) -> Result<Column, JitError> {
        let lhs = arguments[0].as_i32_slice();
        let rhs = arguments[1].as_i32_slice();
        let mut out = vec![0i32; row_count];
        for i in 0..row_count {
            out[i] = (self.op)(lhs[i] as i64, rhs[i] as i64) as i32;
        }
        let mut result = Column::from_i32(result_type.clone(), &out);

        let lhs_mask = arguments[0].null_mask();
        let rhs_mask = arguments[1].null_mask();
        if lhs_mask.is_some() || rhs_mask.is_some() {
            let mut mask = vec![0u8; row_count];
            for i in 0..row_count {
                let a_null = lhs_mask.map(|m| m[i] != 0).unwrap_or(false);
                let b_null = rhs_mask.map(|m| m[i] != 0).unwrap_or(false);
                mask[i] = (a_null || b_null) as u8;
            }
            result = result.with_null_mask(&mask);
        }
        Ok(result)
    }
}

fn plus(name: &'static str, ty: DataType) -> Arc<dyn ScalarFunctionDescriptor> {
    Arc::new(BinaryFn { name, op: |a, b| a + b, arg_types: [ty.clone(), ty.clone()], result_type: ty })
}

fn mul(name: &'static str, ty: DataType) -> Arc<dyn ScalarFunctionDescriptor> {
    Arc::new(BinaryFn { name, op: |a, b| a * b, arg_types: [ty.clone(), ty.clone()], result_type: ty })
}

/// S1: `a + b * c` over three i32 inputs compiles to exactly one node whose
/// children are the three original inputs in order, and executes correctly.
#[test]
fn s1_three_input_arithmetic_graph() {
    let _ = env_logger::try_init();
    let mut graph = ActionsGraph::new();
    let a = graph.push_input(i32_ty());
    let b = graph.push_input(i32_ty());
    let c = graph.push_input(i32_ty());
    let bc = graph.push_function(i32_ty(), mul("s1_mul", i32_ty()), vec![b, c]);
    let root = graph.push_function(i32_ty(), plus("s1_plus", i32_ty()), vec![a, bc]);
    graph.mark_output(root);

    let backend: Arc<dyn JitBackend> = Arc::new(InterpretedBackend);
    graph.compile_functions(0, &backend).unwrap();

    let node = graph.node(root);
    assert!(node.is_function_compiled);
    assert_eq!(node.children, vec![a, b, c]);

    let compiled = node.function_base.clone().unwrap();
    let out = compiled
        .execute(
            &[
                Column::from_i32(i32_ty(), &[1, 2, 3]),
                Column::from_i32(i32_ty(), &[4, 5, 6]),
                Column::from_i32(i32_ty(), &[7, 8, 9]),
            ],
            &i32_ty(),
            3,
        )
        .unwrap();
    assert_eq!(out.as_i32_slice(), &[29, 42, 57]);
}

/// S2: `(a+b)+(a+b)` built so the inner `a+b` is one shared node. Extraction
/// must not duplicate it: four CompileDag nodes (two inputs, two function
/// nodes), not six, and `input_count() == 2`.
#[test]
fn s2_shared_subexpression_is_extracted_once() {
    let _ = env_logger::try_init();
    let mut graph = ActionsGraph::new();
    let a = graph.push_input(i32_ty());
    let b = graph.push_input(i32_ty());
    let inner = graph.push_function(i32_ty(), plus("s2_inner_plus", i32_ty()), vec![a, b]);
    let outer = graph.push_function(i32_ty(), plus("s2_outer_plus", i32_ty()), vec![inner, inner]);
    graph.mark_output(outer);

    let (dag, external_children) = graph.extract_subgraph(outer);
    assert_eq!(dag.len(), 4, "a, b, inner-plus, outer-plus -- not six");
    assert_eq!(dag.input_count(), 2);
    assert_eq!(external_children, vec![a, b]);
}

/// S3: with `min_count_to_compile = 2`, the same fingerprint must be
/// observed three times before a compile happens.
#[test]
fn s3_throttle_boundary() {
    let _ = env_logger::try_init();
    let build = || {
        let mut graph = ActionsGraph::new();
        let a = graph.push_input(i32_ty());
        let b = graph.push_input(i32_ty());
        let root = graph.push_function(i32_ty(), plus("s3_plus", i32_ty()), vec![a, b]);
        graph.mark_output(root);
        (graph, root)
    };

    let backend: Arc<dyn JitBackend> = Arc::new(InterpretedBackend);

    let (mut g1, r1) = build();
    g1.compile_functions(2, &backend).unwrap();
    assert!(!g1.node(r1).is_function_compiled, "first observation: still throttled");

    let (mut g2, r2) = build();
    g2.compile_functions(2, &backend).unwrap();
    assert!(!g2.node(r2).is_function_compiled, "second observation: still throttled");

    let (mut g3, r3) = build();
    g3.compile_functions(2, &backend).unwrap();
    assert!(g3.node(r3).is_function_compiled, "third observation: compiles");
}

/// S4: a non-native (string) function chain compiles nothing, and the
/// native function that merely consumes its result is never selected
/// either, because it ends up with zero compilable children.
#[test]
fn s4_non_native_chain_is_never_compiled() {
    let _ = env_logger::try_init();

    #[derive(Debug)]
    struct ConcatFn;
    impl ScalarFunctionDescriptor for ConcatFn {
        fn name(&self) -> &str {
            "s4_concat"
        }
        fn argument_types(&self) -> &[DataType] {
            &[DataType::String, DataType::String]
        }
        fn result_type(&self) -> &DataType {
            &DataType::String
        }
        fn is_compilable(&self) -> bool {
            true
        }
        fn is_deterministic(&self) -> bool {
            true
        }
        fn is_deterministic_in_scope_of_query(&self) -> bool {
            true
        }
        fn is_suitable_for_constant_folding(&self) -> bool {
            true
        }
        fn is_injective(&self, _sample_columns: &[Column]) -> bool {
            false
        }
        fn has_monotonicity_information(&self) -> bool {
            false
        }
        fn monotonicity_for_range(&self, _arg_type: &DataType, _left: &Scalar, _right: &Scalar) -> Monotonicity {
            Monotonicity::non_monotonic()
        }
        fn compile_into(&self, _builder: &mut dyn expr_jit_core::function::IrBuilder, _input_values: &[expr_jit_core::function::IrValue]) -> expr_jit_core::function::IrValue {
            0
        }
        fn prepare(&self, _arguments: &[Column]) -> Result<Box<dyn ExecutableFunction>, JitError> {
            unreachable!("never selected for compilation: its own result type is non-native")
        }
    }

    #[derive(Debug)]
    struct LengthFn {
        result_type: DataType,
    }
    impl ScalarFunctionDescriptor for LengthFn {
        fn name(&self) -> &str {
            "s4_length"
        }
        fn argument_types(&self) -> &[DataType] {
            &[DataType::String]
        }
        fn result_type(&self) -> &DataType {
            &self.result_type
        }
        fn is_compilable(&self) -> bool {
            true
        }
        fn is_deterministic(&self) -> bool {
            true
        }
        fn is_deterministic_in_scope_of_query(&self) -> bool {
            true
        }
        fn is_suitable_for_constant_folding(&self) -> bool {
            true
        }
        fn is_injective(&self, _sample_columns: &[Column]) -> bool {
            false
        }
        fn has_monotonicity_information(&self) -> bool {
            false
        }
        fn monotonicity_for_range(&self, _arg_type: &DataType, _left: &Scalar, _right: &Scalar) -> Monotonicity {
            Monotonicity::non_monotonic()
        }
        fn compile_into(&self, _builder: &mut dyn expr_jit_core::function::IrBuilder, _input_values: &[expr_jit_core::function::IrValue]) -> expr_jit_core::function::IrValue {
            0
        }
        fn prepare(&self, _arguments: &[Column]) -> Result<Box<dyn ExecutableFunction>, JitError> {
            unreachable!("never selected for compilation: its own argument type is non-native")
        }
    }

    let mut graph = ActionsGraph::new();
    let s = graph.push_input(DataType::String);
    let concat = graph.push_function(DataType::String, Arc::new(ConcatFn), vec![s, s]);
    let a = graph.push_input(i32_ty());
    // length(concat(s, s)) + a -- length and concat each fail the native-type
    // check in isolation, so `root` ends up with zero compilable children
    // and is never selected either.
    let length = graph.push_function(i32_ty(), Arc::new(LengthFn { result_type: i32_ty() }), vec![concat]);
    let root = graph.push_function(i32_ty(), plus("s4_plus", i32_ty()), vec![length, a]);
    graph.mark_output(root);

    let backend: Arc<dyn JitBackend> = Arc::new(InterpretedBackend);
    graph.compile_functions(0, &backend).unwrap();

    for id in [s, concat, a, length, root] {
        assert!(!graph.node(id).is_function_compiled);
    }
}

/// S5: two separate queries both containing `x * x + 1` over i64 share one
/// cache entry; the second is a hit.
#[test]
fn s5_cache_hit_across_queries() {
    let _ = env_logger::try_init();
    use expr_jit_core::cache::CompiledFunctionCache;

    let cache = CompiledFunctionCache::new(1 << 20);
    let backend: Arc<dyn JitBackend> = Arc::new(InterpretedBackend);

    let build_dag = || {
        let mut dag = expr_jit_core::CompileDag::new();
        let x = dag.add_node(expr_jit_core::CompileNode::Input { result_type: i64_ty() }).unwrap();
        let one = dag
            .add_node(expr_jit_core::CompileNode::Constant { result_type: i64_ty(), value: Scalar::I64(1) })
            .unwrap();
        let xx = dag
            .add_node(expr_jit_core::CompileNode::Function { result_type: i64_ty(), function: mul("s5_mul", i64_ty()), arguments: vec![x, x] })
            .unwrap();
        dag.add_node(expr_jit_core::CompileNode::Function { result_type: i64_ty(), function: plus("s5_plus", i64_ty()), arguments: vec![xx, one] })
            .unwrap();
        dag
    };

    let dag1 = build_dag();
    let fingerprint = dag1.hash();
    let name = dag1.dump();

    let produce = || -> Result<_, JitError> {
        let module_info = backend.compile(&dag1, &name)?;
        let entry = backend.find_compiled_function(&module_info, &name)?;
        let module = Arc::new(expr_jit_core::CompiledModule::new(module_info, entry, backend.clone()));
        Ok(expr_jit_core::CompiledFunctionCacheEntry::new(module, module_info.size_bytes))
    };
    let (_entry, was_inserted_1) = cache.get_or_set(fingerprint, produce).unwrap();
    assert!(was_inserted_1);

    let dag2 = build_dag();
    assert_eq!(dag2.hash().0, fingerprint.0, "isomorphic constructions fingerprint identically");
    let (_entry2, was_inserted_2) = cache.get_or_set(dag2.hash(), || -> Result<_, JitError> { unreachable!("should be a cache hit") }).unwrap();
    assert!(!was_inserted_2);
}

/// S6: nullable `a + b`, both i32 with their own null masks; the compiled
/// code (not default null handling) produces the OR-combined mask.
#[test]
fn s6_nullable_arithmetic_or_combines_null_masks() {
    let _ = env_logger::try_init();
    let mut graph = ActionsGraph::new();
    let a = graph.push_input(i32_ty().nullable());
    let b = graph.push_input(i32_ty().nullable());
    let root = graph.push_function(i32_ty().nullable(), plus("s6_plus", i32_ty()), vec![a, b]);
    graph.mark_output(root);

    let backend: Arc<dyn JitBackend> = Arc::new(InterpretedBackend);
    graph.compile_functions(0, &backend).unwrap();
    assert!(graph.node(root).is_function_compiled);

    let compiled = graph.node(root).function_base.clone().unwrap();
    let a_col = Column::from_i32(i32_ty(), &[10, 20, 30]).with_null_mask(&[0, 1, 0]);
    let b_col = Column::from_i32(i32_ty(), &[1, 2, 3]).with_null_mask(&[0, 0, 1]);
    let out = compiled.execute(&[a_col, b_col], &i32_ty().nullable(), 3).unwrap();

    assert_eq!(out.as_i32_slice()[0], 11);
    assert_eq!(out.null_mask().unwrap(), &[0, 1, 1]);
}
