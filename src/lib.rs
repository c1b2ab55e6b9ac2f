//! Turbo Specialize
//!
//! Declaration-driven specialization of numeric kernels. A kernel is written
//! once in a Python-like dialect, annotated with `@turbo(...)` type specs that
//! may name placeholders (`T`..`Z`). Binding the placeholders, statically or by
//! inference from call arguments, produces a concrete variant: its Cython
//! source is generated, persisted under `<module>_turbo/`, compiled once and
//! memoized.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use turbo_specialize::{CompileContext, Engine, Placeholder, ScalarType, TurboConfig, UnavailableCompiler};
//!
//! let engine = Engine::new(TurboConfig::default(), Arc::new(UnavailableCompiler));
//! let ctx = CompileContext::new();
//! let _scope = ctx.no_compile();
//! let source = "
//! @turbo(types = dict(n = np.uint32, x = [T], y = [T], out = [T], i = np.uint32))
//! def tsum(n, x, y, out):
//!     for i in range(n):
//!         out[i] = x[i] + y[i]
//! ";
//! let tsum = engine.declare(&ctx, "mymod", source).unwrap();
//! let tsum_float32 = tsum.bind(&ctx, Placeholder::T, ScalarType::Float32).unwrap();
//! println!("{}", tsum_float32.as_complete().unwrap().unit_text().unwrap());
//! ```

pub mod ast;
pub mod cache;
pub mod codegen;
pub mod config;
pub mod context;
pub mod decorated;
pub mod error;
pub mod facade;
pub mod generic;
pub mod lexer;
pub mod native;
pub mod parser;
pub mod store;
pub mod types;
pub mod typespec;
pub mod unroll;
pub mod value;
pub mod variant;

#[cfg(test)]
pub(crate) mod testing;

pub use ast::{Group, RawSpec};
pub use cache::{DeclaredModule, Engine};
pub use codegen::CodeGenerator;
pub use config::TurboConfig;
pub use context::{CompileContext, NoCompile};
pub use decorated::{Decorated, Decorator};
pub use error::{TurboError, TurboResult};
pub use facade::{Complete, InstanceSpecialized, Partial, Specialized};
pub use generic::{Generic, GenericRegistry};
pub use native::{Compiler, KernelCompiler, NativeError, NativeFn, NativeModule, UnavailableCompiler};
pub use types::{ConstValue, Placeholder, ScalarType, TypeArg};
pub use value::{Array, Object, Value};
pub use variant::Variant;

use std::path::Path;
use std::sync::Arc;

/// Declare every kernel in a source file with a fresh engine
pub fn declare_file(
    path: &Path,
    module: &str,
    config: TurboConfig,
    compiler: Arc<dyn Compiler>,
    ctx: &CompileContext,
) -> TurboResult<(Arc<Engine>, DeclaredModule)> {
    let source = std::fs::read_to_string(path).map_err(|e| TurboError::io(path, e))?;
    let engine = Engine::new(config, compiler);
    let declared = engine.declare_source(ctx, module, &source)?;
    Ok((engine, declared))
}
