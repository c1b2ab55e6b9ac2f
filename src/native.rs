//! Boundary to the native toolchain
//!
//! The engine never compiles anything itself. A [`Compiler`] turns a
//! persisted unit into a [`NativeModule`] exposing callables by name, and the
//! [`Loader`] memoizes those modules. [`Signature`] is the check a compiled
//! function applies to its arguments on entry.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use log::debug;
use serde::Serialize;
use thiserror::Error;

use crate::types::ScalarType;
use crate::value::{Number, Scalar, Value};

/// A compiled function: arguments are passed mutably so buffers can be written
pub type NativeFn = Arc<dyn Fn(&mut [Value]) -> Result<Value, NativeError> + Send + Sync>;

/// Errors raised by the toolchain or at a compiled function's boundary
#[derive(Debug, Error)]
pub enum NativeError {
    #[error("Compilation of {module} failed: {message}")]
    CompileFailed { module: String, message: String },

    #[error("No compiler available for {module}")]
    Unavailable { module: String },

    #[error("{function}() takes {expected} arguments, got {got}")]
    Arity {
        function: String,
        expected: usize,
        got: usize,
    },

    #[error("Argument {index} of {function}(): expected {expected}, got {got}")]
    ArgumentType {
        function: String,
        index: usize,
        expected: String,
        got: String,
    },

    #[error("{0}")]
    Kernel(String),
}

/// What to compile: a unit already persisted to disk
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompileRequest {
    /// Dotted module name, `<module>_turbo.<unit>`
    pub module: String,
    pub unit: String,
    pub source_path: PathBuf,
    pub build_path: PathBuf,
}

pub trait NativeModule: Send + Sync {
    fn name(&self) -> &str;

    fn function(&self, name: &str) -> Option<NativeFn>;
}

pub trait Compiler: Send + Sync {
    fn compile(&self, request: &CompileRequest) -> Result<Arc<dyn NativeModule>, NativeError>;
}

/// Compiler used when artifacts are only prepared, never built
#[derive(Debug, Default)]
pub struct UnavailableCompiler;

impl Compiler for UnavailableCompiler {
    fn compile(&self, request: &CompileRequest) -> Result<Arc<dyn NativeModule>, NativeError> {
        Err(NativeError::Unavailable {
            module: request.module.clone(),
        })
    }
}

/// In-process backend serving generated functions with Rust kernels
///
/// Every `def` in the persisted unit whose name is `base` or `base_<suffix>`
/// is bound to the kernel registered for `base`. Clones share the compile
/// counter.
#[derive(Clone, Default)]
pub struct KernelCompiler {
    kernels: Vec<(String, NativeFn)>,
    compiles: Arc<AtomicUsize>,
}

impl KernelCompiler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_kernel(mut self, base: &str, kernel: NativeFn) -> Self {
        self.kernels.push((base.to_string(), kernel));
        self
    }

    /// Units compiled so far
    pub fn compile_count(&self) -> usize {
        self.compiles.load(Ordering::SeqCst)
    }

    fn kernel_for(&self, function: &str) -> Option<NativeFn> {
        self.kernels
            .iter()
            .find(|(base, _)| {
                function
                    .strip_prefix(base.as_str())
                    .map_or(false, |rest| rest.is_empty() || rest.starts_with('_'))
            })
            .map(|(_, kernel)| kernel.clone())
    }
}

impl Compiler for KernelCompiler {
    fn compile(&self, request: &CompileRequest) -> Result<Arc<dyn NativeModule>, NativeError> {
        self.compiles.fetch_add(1, Ordering::SeqCst);
        let source = fs::read_to_string(&request.source_path).map_err(|e| NativeError::CompileFailed {
            module: request.module.clone(),
            message: e.to_string(),
        })?;
        let functions = source
            .lines()
            .filter_map(|line| line.strip_prefix("def ")?.split_once('('))
            .filter_map(|(name, _)| Some((name.to_string(), self.kernel_for(name)?)))
            .collect();
        debug!("Bound kernels for {}", request.module);
        Ok(Arc::new(KernelModule {
            name: request.module.clone(),
            functions,
        }))
    }
}

struct KernelModule {
    name: String,
    functions: HashMap<String, NativeFn>,
}

impl NativeModule for KernelModule {
    fn name(&self) -> &str {
        &self.name
    }

    fn function(&self, name: &str) -> Option<NativeFn> {
        self.functions.get(name).cloned()
    }
}

/// Memo of compiled modules keyed by dotted module name
pub struct Loader {
    compiler: Arc<dyn Compiler>,
    modules: Mutex<HashMap<String, Arc<dyn NativeModule>>>,
}

impl Loader {
    pub fn new(compiler: Arc<dyn Compiler>) -> Self {
        Self {
            compiler,
            modules: Mutex::new(HashMap::new()),
        }
    }

    pub fn is_loaded(&self, module: &str) -> bool {
        self.lock().contains_key(module)
    }

    pub fn get(&self, module: &str) -> Option<Arc<dyn NativeModule>> {
        self.lock().get(module).cloned()
    }

    /// Compile on first import, afterwards return the memoized module
    pub fn import(&self, request: &CompileRequest) -> Result<Arc<dyn NativeModule>, NativeError> {
        let mut modules = self.lock();
        if let Some(module) = modules.get(&request.module) {
            return Ok(module.clone());
        }
        debug!("Importing {} from {}", request.module, request.source_path.display());
        let module = self.compiler.compile(request)?;
        modules.insert(request.module.clone(), module.clone());
        Ok(module)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Arc<dyn NativeModule>>> {
        self.modules.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Declared kind of one parameter of a compiled function
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ParamKind {
    /// Any number converting losslessly to the type
    Scalar(ScalarType),
    /// Buffer with exactly this element type and dimensionality
    Array { dtype: ScalarType, ndim: usize },
    /// Object whose listed attributes follow the same rules
    Object(Vec<(String, ParamKind)>),
}

impl std::fmt::Display for ParamKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParamKind::Scalar(t) => write!(f, "{}", t),
            ParamKind::Array { dtype, ndim } => write!(f, "ndarray[{}, ndim={}]", dtype, ndim),
            ParamKind::Object(fields) => {
                f.write_str("object{")?;
                for (i, (name, kind)) in fields.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}: {}", name, kind)?;
                }
                f.write_str("}")
            }
        }
    }
}

impl ParamKind {
    /// Check one value in place; the error describes what was found instead
    fn check(&self, value: &mut Value) -> Result<(), String> {
        match (self, value) {
            (ParamKind::Scalar(ty), Value::Scalar(s)) => {
                let number = convert(*ty, s).ok_or_else(|| format!("{} {}", s.ty, describe(s.number)))?;
                *s = Scalar { ty: *ty, number };
                Ok(())
            }
            (ParamKind::Array { dtype, ndim }, Value::Array(a)) => {
                if a.dtype != *dtype || a.ndim() != *ndim {
                    return Err(format!("ndarray[{}, ndim={}]", a.dtype, a.ndim()));
                }
                Ok(())
            }
            (ParamKind::Object(fields), Value::Object(object)) => {
                for (name, kind) in fields {
                    let field = object
                        .fields
                        .get_mut(name)
                        .ok_or_else(|| format!("object without attribute {}", name))?;
                    kind.check(field).map_err(|got| format!("{} in attribute {}", got, name))?;
                }
                Ok(())
            }
            (_, other) => Err(other.kind().to_string()),
        }
    }
}

fn describe(number: Number) -> String {
    match number {
        Number::Int(n) => n.to_string(),
        Number::Float(x) => x.to_string(),
    }
}

/// Argument policy of one compiled function
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Signature {
    pub function: String,
    pub params: Vec<ParamKind>,
}

impl Signature {
    /// Validate arguments, converting scalars to their declared types
    pub fn check(&self, args: &mut [Value]) -> Result<(), NativeError> {
        if args.len() != self.params.len() {
            return Err(NativeError::Arity {
                function: self.function.clone(),
                expected: self.params.len(),
                got: args.len(),
            });
        }
        for (index, (kind, arg)) in self.params.iter().zip(args.iter_mut()).enumerate() {
            kind.check(arg).map_err(|got| NativeError::ArgumentType {
                function: self.function.clone(),
                index,
                expected: kind.to_string(),
                got,
            })?;
        }
        Ok(())
    }
}

/// Inclusive range of an integer type, as far as an `i64` reaches
fn int_bounds(ty: ScalarType) -> (i64, i64) {
    match ty {
        ScalarType::Int8 => (i8::MIN.into(), i8::MAX.into()),
        ScalarType::Int16 => (i16::MIN.into(), i16::MAX.into()),
        ScalarType::Int32 => (i32::MIN.into(), i32::MAX.into()),
        ScalarType::UInt8 => (0, u8::MAX.into()),
        ScalarType::UInt16 => (0, u16::MAX.into()),
        ScalarType::UInt32 => (0, u32::MAX.into()),
        ScalarType::UInt64 => (0, i64::MAX),
        _ => (i64::MIN, i64::MAX),
    }
}

/// Floats don't silently truncate into integer parameters, and integers must fit
fn convert(ty: ScalarType, value: &Scalar) -> Option<Number> {
    match (ty.is_float(), value.number) {
        (true, n) => Some(Number::Float(n.as_f64())),
        (false, Number::Int(n)) => {
            let (min, max) = int_bounds(ty);
            (min..=max).contains(&n).then_some(Number::Int(n))
        }
        (false, Number::Float(_)) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{Array, Object};

    struct Counting {
        compiles: AtomicUsize,
    }

    struct Empty(String);

    impl NativeModule for Empty {
        fn name(&self) -> &str {
            &self.0
        }

        fn function(&self, _name: &str) -> Option<NativeFn> {
            None
        }
    }

    impl Compiler for Counting {
        fn compile(&self, request: &CompileRequest) -> Result<Arc<dyn NativeModule>, NativeError> {
            self.compiles.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(Empty(request.module.clone())))
        }
    }

    fn request(module: &str) -> CompileRequest {
        CompileRequest {
            module: module.to_string(),
            unit: "f".to_string(),
            source_path: PathBuf::from("f.pyx"),
            build_path: PathBuf::from("f.pyxbld"),
        }
    }

    #[test]
    fn test_loader_memoizes() {
        let compiler = Arc::new(Counting {
            compiles: AtomicUsize::new(0),
        });
        let loader = Loader::new(compiler.clone());
        assert!(!loader.is_loaded("m_turbo.f"));
        loader.import(&request("m_turbo.f")).unwrap();
        loader.import(&request("m_turbo.f")).unwrap();
        assert!(loader.is_loaded("m_turbo.f"));
        assert_eq!(compiler.compiles.load(Ordering::SeqCst), 1);
        assert_eq!(loader.get("m_turbo.f").unwrap().name(), "m_turbo.f");
    }

    #[test]
    fn test_unavailable_compiler() {
        let loader = Loader::new(Arc::new(UnavailableCompiler));
        assert!(matches!(
            loader.import(&request("m_turbo.f")),
            Err(NativeError::Unavailable { .. })
        ));
        assert!(!loader.is_loaded("m_turbo.f"));
    }

    fn sum_signature() -> Signature {
        Signature {
            function: "tsum_float32".into(),
            params: vec![
                ParamKind::Scalar(ScalarType::UInt32),
                ParamKind::Array {
                    dtype: ScalarType::Float32,
                    ndim: 1,
                },
            ],
        }
    }

    #[test]
    fn test_exact_dtype() {
        let signature = sum_signature();
        let mut args = vec![Value::int(3), Array::zeros(ScalarType::Float32, &[3]).into()];
        signature.check(&mut args).unwrap();
        assert_eq!(args[0], Value::typed(ScalarType::UInt32, 3.0));

        let mut args = vec![Value::int(3), Array::zeros(ScalarType::Float64, &[3]).into()];
        assert!(matches!(
            signature.check(&mut args),
            Err(NativeError::ArgumentType { index: 1, .. })
        ));

        let mut args = vec![Value::int(3), Array::zeros(ScalarType::Float32, &[3, 1]).into()];
        assert!(signature.check(&mut args).is_err());
    }

    #[test]
    fn test_scalar_conversion() {
        let signature = Signature {
            function: "f".into(),
            params: vec![ParamKind::Scalar(ScalarType::Float64)],
        };
        let mut args = vec![Value::int(2)];
        signature.check(&mut args).unwrap();
        assert_eq!(args[0].as_number(), Some(Number::Float(2.0)));

        let signature = Signature {
            function: "f".into(),
            params: vec![ParamKind::Scalar(ScalarType::Int32)],
        };
        assert!(signature.check(&mut [Value::float(2.5)]).is_err());
        assert!(matches!(
            signature.check(&mut []),
            Err(NativeError::Arity { expected: 1, got: 0, .. })
        ));
    }

    #[test]
    fn test_kernel_compiler_binds_by_base_name() {
        let dir = tempfile::tempdir().unwrap();
        let source_path = dir.path().join("f_int8.pyx");
        fs::write(&source_path, "\ndef f_int8(x):\n    pass\ndef fx_int8(x):\n    pass\n").unwrap();
        let kernel: NativeFn = Arc::new(|_args: &mut [Value]| Ok(Value::int(1)));
        let compiler = KernelCompiler::new().with_kernel("f", kernel);
        let module = compiler
            .compile(&CompileRequest {
                source_path,
                ..request("m_turbo.f_int8")
            })
            .unwrap();
        assert!(module.function("f_int8").is_some());
        assert!(module.function("fx_int8").is_none());
        assert_eq!(compiler.compile_count(), 1);
    }

    #[test]
    fn test_kernel_compiler_missing_source() {
        let compiler = KernelCompiler::new();
        assert!(matches!(
            compiler.compile(&request("m_turbo.f")),
            Err(NativeError::CompileFailed { .. })
        ));
    }

    #[test]
    fn test_integer_range() {
        let unsigned = Signature {
            function: "f".into(),
            params: vec![ParamKind::Scalar(ScalarType::UInt32)],
        };
        assert!(matches!(
            unsigned.check(&mut [Value::int(-1)]),
            Err(NativeError::ArgumentType { index: 0, .. })
        ));
        let mut args = [Value::int(u32::MAX.into())];
        unsigned.check(&mut args).unwrap();

        let small = Signature {
            function: "f".into(),
            params: vec![ParamKind::Scalar(ScalarType::Int8)],
        };
        assert!(small.check(&mut [Value::int(300)]).is_err());
        assert!(small.check(&mut [Value::int(-128)]).is_ok());
        assert!(small.check(&mut [Value::int(-129)]).is_err());
    }

    #[test]
    fn test_object_fields_checked() {
        let signature = Signature {
            function: "fill_int16".into(),
            params: vec![ParamKind::Object(vec![
                (
                    "data".into(),
                    ParamKind::Array {
                        dtype: ScalarType::Int16,
                        ndim: 1,
                    },
                ),
                ("count".into(), ParamKind::Scalar(ScalarType::UInt32)),
            ])],
        };
        let object = |dtype: ScalarType| {
            Value::Object(
                Object::new()
                    .with("data", Array::zeros(dtype, &[2]).into())
                    .with("count", Value::int(2)),
            )
        };

        let mut args = [object(ScalarType::Int16)];
        signature.check(&mut args).unwrap();
        let count = args[0].as_object().unwrap().field("count").unwrap();
        assert_eq!(count, &Value::typed(ScalarType::UInt32, 2.0));

        let mut args = [object(ScalarType::Float64)];
        assert!(matches!(
            signature.check(&mut args),
            Err(NativeError::ArgumentType { index: 0, got, .. }) if got.contains("attribute data")
        ));

        let mut args = [Value::Object(Object::new().with("data", Array::zeros(ScalarType::Int16, &[2]).into()))];
        assert!(signature.check(&mut args).is_err());
    }
}
