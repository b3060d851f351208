//! Compilation core for JIT-lowering scalar expression subgraphs of a
//! columnar analytical query engine's actions graph.
//!
//! Given a logical expression graph evaluating scalar functions over
//! columnar batches, this crate identifies maximal subgraphs of compilable
//! operators, lowers them to native code through an externally supplied
//! code-generation backend ([`backend::JitBackend`]), caches the resulting
//! modules by structural fingerprint ([`cache`]), and rewrites the actions
//! graph ([`actions_graph::ActionsGraph`]) in place to replace each
//! compiled subgraph with a single opaque compiled-function node.
//!
//! The actions-graph builder/planner, the codegen backend's internals, the
//! columnar type system, and process bootstrap/configuration loading are
//! all external collaborators; this crate only consumes them through the
//! narrow interfaces in [`backend`] and [`function`].

pub mod actions_graph;
pub mod backend;
pub mod cache;
pub mod column;
pub mod compile_dag;
pub mod compiled_function;
pub mod config;
pub mod entity;
pub mod error;
pub mod function;
pub mod module;
pub mod throttle;
pub mod types;

pub use actions_graph::{ActionsGraph, Node, NodeKind};
pub use backend::{JitBackend, ModuleInfo};
pub use cache::{CacheFactory, CompiledFunctionCache};
pub use compile_dag::{CompileDag, CompileNode, Fingerprint};
pub use compiled_function::CompiledScalarFunction;
pub use config::JitConfig;
pub use entity::NodeId;
pub use error::JitError;
pub use function::{ExecutableFunction, Monotonicity, Scalar, ScalarFunctionDescriptor};
pub use module::{CompiledFunctionCacheEntry, CompiledModule};
pub use types::{is_native_type, DataType, NativeKind};
