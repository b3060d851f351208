//! The scalar-function descriptor interface (spec §6) and monotonicity
//! composition (spec §4.7).
//!
//! Lowering a function's body to IR, and the IR builder it lowers into, are
//! the codegen backend's problem (`spec.md` §1 Non-goals: "The code-generation
//! backend itself ... The core consumes it through a narrow interface").
//! This module only names that seam; it never interprets `IrValue`.

use crate::column::Column;
use crate::types::{is_native_type, DataType};
use std::fmt;

/// An opaque handle into the codegen backend's IR. Produced and consumed
/// only by `compile_into` implementations and the backend itself.
pub type IrValue = u32;

/// A constant scalar value, used for compile-time-constant operands and as
/// monotonicity interval endpoints. `Null` stands in for the "null
/// sentinel" spec §4.7 says interval endpoints must skip over.
#[derive(Clone, Debug, PartialEq)]
pub enum Scalar {
    Null,
    I32(i32),
    I64(i64),
    F64(f64),
}

impl Scalar {
    pub fn is_null(&self) -> bool {
        matches!(self, Scalar::Null)
    }
}

/// The codegen backend's IR-construction surface, as seen from a scalar
/// function's `compile_into` hook. A real implementation would build
/// Cranelift-style IR; that type is supplied by the backend, not the core.
pub trait IrBuilder {
    fn constant(&mut self, value: &Scalar, ty: &DataType) -> IrValue;
}

/// Monotonicity of a function over one interval, as returned per nested
/// step by `getMonotonicityForRange`-equivalent analysis (spec §4.7).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Monotonicity {
    pub is_monotonic: bool,
    pub is_positive: bool,
    pub is_always_monotonic: bool,
}

impl Monotonicity {
    pub const fn constant() -> Self {
        Monotonicity { is_monotonic: true, is_positive: true, is_always_monotonic: true }
    }

    pub const fn non_monotonic() -> Self {
        Monotonicity { is_monotonic: false, is_positive: true, is_always_monotonic: false }
    }
}

/// True iff `f` declares itself compilable and every type it touches — its
/// result and each argument — has a native machine representation (spec
/// §4.1). Pure: consults only `f`'s own declared shape, never actual data.
pub fn is_compilable_function(f: &dyn ScalarFunctionDescriptor) -> bool {
    f.is_compilable() && is_native_type(f.result_type()) && f.argument_types().iter().all(is_native_type)
}

/// An executable fallback produced by `prepare`, invoked when a function is
/// used uncompiled (or as the codegen-free interpretation path in tests).
pub trait ExecutableFunction: Send + Sync {
    fn execute(&self, arguments: &[Column], result_type: &DataType, row_count: usize) -> Result<Column, crate::error::JitError>;
}

/// The descriptor interface the core composes over (spec §6). Scalar
/// functions — both primitive (`+`, `*`, user scalar functions) and the
/// compiled composite the rewriter installs (`CompiledScalarFunction`) —
/// implement this trait uniformly.
pub trait ScalarFunctionDescriptor: fmt::Debug + Send + Sync {
    fn name(&self) -> &str;
    fn argument_types(&self) -> &[DataType];
    fn result_type(&self) -> &DataType;

    fn is_compilable(&self) -> bool;
    fn is_deterministic(&self) -> bool;
    fn is_deterministic_in_scope_of_query(&self) -> bool;
    fn is_suitable_for_constant_folding(&self) -> bool;
    fn is_injective(&self, sample_columns: &[Column]) -> bool;
    fn has_monotonicity_information(&self) -> bool;

    /// Monotonicity over one interval `[left, right]`. Only meaningful for
    /// unary functions; the composition in `CompiledScalarFunction` only
    /// ever calls this on a chain of unary nested functions (spec §4.7).
    fn monotonicity_for_range(&self, arg_type: &DataType, left: &Scalar, right: &Scalar) -> Monotonicity;

    /// The codegen hook: lowers this function applied to `input_values`
    /// into the IR under construction. The core never inspects the
    /// implementation, only its existence (`is_compilable`).
    fn compile_into(&self, builder: &mut dyn IrBuilder, input_values: &[IrValue]) -> IrValue;

    /// Produces an executable fallback bound to `arguments`' static shape.
    fn prepare(&self, arguments: &[Column]) -> Result<Box<dyn ExecutableFunction>, crate::error::JitError>;

    /// Convenience composition of `prepare` + `ExecutableFunction::execute`,
    /// for callers (such as the interpreted test backend) that have no
    /// reason to hold onto the intermediate executable.
    fn execute(&self, arguments: &[Column], result_type: &DataType, row_count: usize) -> Result<Column, crate::error::JitError> {
        self.prepare(arguments)?.execute(arguments, result_type, row_count)
    }
}

#[cfg(test)]
pub(crate) mod test_functions {
    //! Tiny scalar functions (`+`, `*`) used across unit and integration
    //! tests. `compile_into` is a stub: these tests exercise the
    //! `InterpretedBackend`, which never calls it, so it only needs to
    //! type-check as evidence the seam exists.
    use super::*;
    use crate::error::JitError;

    #[derive(Debug)]
    pub struct BinaryIntFn {
        pub name: &'static str,
        pub op: fn(i32, i32) -> i32,
        pub arg_types: [DataType; 2],
        pub result_type: DataType,
    }

    impl ScalarFunctionDescriptor for BinaryIntFn {
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
        fn compile_into(&self, _builder: &mut dyn IrBuilder, input_values: &[IrValue]) -> IrValue {
            input_values.first().copied().unwrap_or(0)
        }
        fn prepare(&self, _arguments: &[Column]) -> Result<Box<dyn ExecutableFunction>, JitError> {
            Ok(Box::new(BinaryIntExec { op: self.op }))
        }
    }

    struct BinaryIntExec {
        op: fn(i32, i32) -> i32,
    }

    impl ExecutableFunction for BinaryIntExec {
        fn execute(&self, arguments: &[Column], result_type: &DataType, row_count: usize) -> Result<Column, JitError> {
            let lhs = arguments[0].as_i32_slice();
            let rhs = arguments[1].as_i32_slice();
            let mut out = vec![0i32; row_count];
            for i in 0..row_count {
                out[i] = (self.op)(lhs[i], rhs[i]);
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
}
