//! Callable facade over declared kernels
//!
//! - [`Partial`]: some placeholders still unbound, bind more or call dynamically
//! - [`Complete`]: fully bound, forwards to the compiled function
//! - [`InstancePartial`] / [`InstanceComplete`]: the same, closed over an
//!   instance passed as the first argument
//!
//! A compiled entry holds a [`Handle`] that is either ready or pending. A
//! pending handle is what a cache miss produces inside a no-compile scope.

use std::fmt;
use std::sync::{Arc, OnceLock};

use crate::context::CompileContext;
use crate::decorated::Decorated;
use crate::error::{TurboError, TurboResult};
use crate::native::{CompileRequest, Loader, NativeFn, Signature};
use crate::types::{Placeholder, TypeArg};
use crate::value::Value;
use crate::variant::Variant;

/// Compiled function resolved on first invocation
pub struct Deferred {
    request: CompileRequest,
    function: String,
    loader: Arc<Loader>,
    resolved: OnceLock<NativeFn>,
}

impl Deferred {
    pub fn new(request: CompileRequest, function: String, loader: Arc<Loader>) -> Self {
        Self {
            request,
            function,
            loader,
            resolved: OnceLock::new(),
        }
    }

    pub fn module(&self) -> &str {
        &self.request.module
    }

    pub fn is_resolved(&self) -> bool {
        self.resolved.get().is_some()
    }

    /// Import the unit unless compilation is suppressed and it isn't loaded yet
    pub fn resolve(&self, ctx: &CompileContext) -> TurboResult<NativeFn> {
        if let Some(f) = self.resolved.get() {
            return Ok(f.clone());
        }
        if !ctx.compile_enabled() && !self.loader.is_loaded(&self.request.module) {
            return Err(TurboError::DeferredNotReady {
                module: self.request.module.clone(),
                function: self.function.clone(),
            });
        }
        let module = self.loader.import(&self.request)?;
        let f = module.function(&self.function).ok_or_else(|| TurboError::MissingFunction {
            module: self.request.module.clone(),
            function: self.function.clone(),
        })?;
        Ok(self.resolved.get_or_init(|| f).clone())
    }
}

pub enum Handle {
    Ready(NativeFn),
    Pending(Deferred),
}

impl Handle {
    pub fn is_ready(&self) -> bool {
        match self {
            Handle::Ready(_) => true,
            Handle::Pending(deferred) => deferred.is_resolved(),
        }
    }

    fn resolve(&self, ctx: &CompileContext) -> TurboResult<NativeFn> {
        match self {
            Handle::Ready(f) => Ok(f.clone()),
            Handle::Pending(deferred) => deferred.resolve(ctx),
        }
    }
}

/// One compiled (or prepared) specialization
pub struct Entry {
    function: String,
    request: CompileRequest,
    signature: Signature,
    handle: Handle,
}

impl Entry {
    pub fn new(function: String, request: CompileRequest, signature: Signature, handle: Handle) -> Self {
        Self {
            function,
            request,
            signature,
            handle,
        }
    }

    pub fn function_name(&self) -> &str {
        &self.function
    }

    pub fn request(&self) -> &CompileRequest {
        &self.request
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    /// Check arguments at the boundary, then run; scalars are converted in place
    pub fn invoke(&self, ctx: &CompileContext, args: &mut [Value]) -> TurboResult<Value> {
        let f = self.handle.resolve(ctx)?;
        self.signature.check(args)?;
        Ok(f(args)?)
    }
}

impl fmt::Debug for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = if self.handle.is_ready() { "Complete" } else { "Deferred" };
        write!(f, "{}({})", state, self.function)
    }
}

#[derive(Debug, Clone)]
pub struct Partial {
    decorated: Arc<Decorated>,
    variant: Variant,
}

impl Partial {
    pub fn bind(&self, ctx: &CompileContext, placeholder: Placeholder, arg: impl Into<TypeArg>) -> TurboResult<Specialized> {
        let variant = self.variant.spinoff(placeholder, arg.into())?;
        Specialized::from_variant(ctx, self.decorated.clone(), variant)
    }

    /// Infer the remaining placeholders from `args` and dispatch
    pub fn call(&self, ctx: &CompileContext, args: &mut [Value]) -> TurboResult<Value> {
        let variant = self.variant.complete(&self.decorated, args)?;
        let entry = self.decorated.engine().get_complete(ctx, &self.decorated, &variant)?;
        entry.invoke(ctx, args)
    }

    pub fn bind_instance(&self, instance: Value) -> InstancePartial {
        InstancePartial {
            instance,
            decorated: self.decorated.clone(),
            variant: self.variant.clone(),
        }
    }

    pub fn variant(&self) -> &Variant {
        &self.variant
    }
}

#[derive(Debug, Clone)]
pub struct Complete {
    decorated: Arc<Decorated>,
    variant: Variant,
    entry: Arc<Entry>,
}

impl Complete {
    pub fn call(&self, ctx: &CompileContext, args: &mut [Value]) -> TurboResult<Value> {
        self.entry.invoke(ctx, args)
    }

    /// Always fails: every placeholder is already bound
    pub fn bind(&self, placeholder: Placeholder, arg: impl Into<TypeArg>) -> TurboResult<Specialized> {
        self.variant.spinoff(placeholder, arg.into())?;
        Err(TurboError::NoSuchPlaceholder { placeholder })
    }

    pub fn bind_instance(&self, instance: Value) -> InstanceComplete {
        InstanceComplete {
            instance,
            complete: self.clone(),
        }
    }

    pub fn entry(&self) -> &Arc<Entry> {
        &self.entry
    }

    pub fn variant(&self) -> &Variant {
        &self.variant
    }

    pub fn function_name(&self) -> &str {
        self.entry.function_name()
    }

    /// Generated text of the unit this function lives in
    pub fn unit_text(&self) -> TurboResult<String> {
        self.decorated
            .engine()
            .generator()
            .unit_text(&self.decorated, &self.variant)
    }
}

/// A declared kernel, partially or fully bound
#[derive(Debug, Clone)]
pub enum Specialized {
    Partial(Partial),
    Complete(Complete),
}

impl Specialized {
    /// Nothing bound yet, compiled immediately if there is nothing to bind
    pub fn new(ctx: &CompileContext, decorated: Arc<Decorated>) -> TurboResult<Self> {
        let variant = Variant::new(decorated.placeholders());
        Self::from_variant(ctx, decorated, variant)
    }

    fn from_variant(ctx: &CompileContext, decorated: Arc<Decorated>, variant: Variant) -> TurboResult<Self> {
        if !variant.is_complete() {
            return Ok(Specialized::Partial(Partial { decorated, variant }));
        }
        let entry = decorated.engine().get_complete(ctx, &decorated, &variant)?;
        Ok(Specialized::Complete(Complete {
            decorated,
            variant,
            entry,
        }))
    }

    pub fn bind(&self, ctx: &CompileContext, placeholder: Placeholder, arg: impl Into<TypeArg>) -> TurboResult<Specialized> {
        match self {
            Specialized::Partial(p) => p.bind(ctx, placeholder, arg),
            Specialized::Complete(c) => c.bind(placeholder, arg),
        }
    }

    pub fn call(&self, ctx: &CompileContext, args: &mut [Value]) -> TurboResult<Value> {
        match self {
            Specialized::Partial(p) => p.call(ctx, args),
            Specialized::Complete(c) => c.call(ctx, args),
        }
    }

    pub fn bind_instance(&self, instance: Value) -> InstanceSpecialized {
        match self {
            Specialized::Partial(p) => InstanceSpecialized::Partial(p.bind_instance(instance)),
            Specialized::Complete(c) => InstanceSpecialized::Complete(c.bind_instance(instance)),
        }
    }

    pub fn decorated(&self) -> &Arc<Decorated> {
        match self {
            Specialized::Partial(p) => &p.decorated,
            Specialized::Complete(c) => &c.decorated,
        }
    }

    pub fn variant(&self) -> &Variant {
        match self {
            Specialized::Partial(p) => &p.variant,
            Specialized::Complete(c) => &c.variant,
        }
    }

    pub fn name(&self) -> &str {
        self.decorated().name()
    }

    pub fn is_complete(&self) -> bool {
        matches!(self, Specialized::Complete(_))
    }

    pub fn as_complete(&self) -> Option<&Complete> {
        match self {
            Specialized::Complete(c) => Some(c),
            Specialized::Partial(_) => None,
        }
    }
}

/// Run `f` over the instance followed by `args`, writing every value back
fn with_instance(
    instance: &mut Value,
    args: &mut [Value],
    f: impl FnOnce(&mut [Value]) -> TurboResult<Value>,
) -> TurboResult<Value> {
    let mut full: Vec<Value> = std::iter::once(std::mem::take(instance))
        .chain(args.iter_mut().map(std::mem::take))
        .collect();
    let result = f(&mut full);
    let mut values = full.into_iter();
    if let Some(first) = values.next() {
        *instance = first;
    }
    for (slot, value) in args.iter_mut().zip(values) {
        *slot = value;
    }
    result
}

/// A partial method closed over its instance
#[derive(Debug, Clone)]
pub struct InstancePartial {
    instance: Value,
    decorated: Arc<Decorated>,
    variant: Variant,
}

impl InstancePartial {
    pub fn call(&mut self, ctx: &CompileContext, args: &mut [Value]) -> TurboResult<Value> {
        let decorated = &self.decorated;
        let variant = &self.variant;
        with_instance(&mut self.instance, args, |full| {
            let complete = variant.complete(decorated, full)?;
            let entry = decorated.engine().get_complete(ctx, decorated, &complete)?;
            entry.invoke(ctx, full)
        })
    }

    pub fn bind(self, ctx: &CompileContext, placeholder: Placeholder, arg: impl Into<TypeArg>) -> TurboResult<InstanceSpecialized> {
        let variant = self.variant.spinoff(placeholder, arg.into())?;
        if !variant.is_complete() {
            return Ok(InstanceSpecialized::Partial(InstancePartial { variant, ..self }));
        }
        let entry = self.decorated.engine().get_complete(ctx, &self.decorated, &variant)?;
        Ok(InstanceSpecialized::Complete(InstanceComplete {
            instance: self.instance,
            complete: Complete {
                decorated: self.decorated,
                variant,
                entry,
            },
        }))
    }

    pub fn instance(&self) -> &Value {
        &self.instance
    }
}

/// A compiled method closed over its instance
#[derive(Debug, Clone)]
pub struct InstanceComplete {
    instance: Value,
    complete: Complete,
}

impl InstanceComplete {
    pub fn call(&mut self, ctx: &CompileContext, args: &mut [Value]) -> TurboResult<Value> {
        let entry = &self.complete.entry;
        with_instance(&mut self.instance, args, |full| entry.invoke(ctx, full))
    }

    pub fn instance(&self) -> &Value {
        &self.instance
    }

    pub fn into_instance(self) -> Value {
        self.instance
    }

    pub fn complete(&self) -> &Complete {
        &self.complete
    }
}

#[derive(Debug, Clone)]
pub enum InstanceSpecialized {
    Partial(InstancePartial),
    Complete(InstanceComplete),
}

impl InstanceSpecialized {
    pub fn call(&mut self, ctx: &CompileContext, args: &mut [Value]) -> TurboResult<Value> {
        match self {
            InstanceSpecialized::Partial(p) => p.call(ctx, args),
            InstanceSpecialized::Complete(c) => c.call(ctx, args),
        }
    }

    pub fn instance(&self) -> &Value {
        match self {
            InstanceSpecialized::Partial(p) => p.instance(),
            InstanceSpecialized::Complete(c) => c.instance(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{engine_with, tsum_kernel, FakeCompiler};
    use crate::types::ScalarType;
    use crate::value::{Array, Number, Object};
    use pretty_assertions::assert_eq;

    const TSUM: &str = "
@turbo(types = dict(n = np.uint32, x = [T], y = [T], out = [T], i = np.uint32), dynamic = True)
def tsum(n, x, y, out):
    for i in range(n):
        out[i] = x[i] + y[i]
";

    fn sum_args(dtype: ScalarType, n: usize) -> Vec<Value> {
        vec![
            Value::int(n as i64),
            Array::arange(dtype, n, 1.0).into(),
            Array::arange(dtype, n, 2.0).into(),
            Array::zeros(dtype, &[n]).into(),
        ]
    }

    #[test]
    fn test_static_binding_matches_reference() {
        let (engine, _dir) = engine_with(FakeCompiler::new().with_kernel("tsum", tsum_kernel()));
        let ctx = CompileContext::new();
        let tsum = engine.declare(&ctx, "mymod", TSUM).unwrap();
        let complete = tsum.bind(&ctx, Placeholder::T, ScalarType::Float32).unwrap();
        assert_eq!(complete.as_complete().unwrap().function_name(), "tsum_float32");
        for n in [0, 1, 100000] {
            let mut args = sum_args(ScalarType::Float32, n);
            complete.call(&ctx, &mut args).unwrap();
            let expected: Vec<f64> = (0..n).map(|i| 3.0 * i as f64).collect();
            assert_eq!(args[3].as_array().unwrap().data, expected);
        }
    }

    #[test]
    fn test_double_binding_rejected() {
        let (engine, _dir) = engine_with(FakeCompiler::new().with_kernel("tsum", tsum_kernel()));
        let ctx = CompileContext::new();
        let tsum = engine.declare(&ctx, "mymod", TSUM).unwrap();
        let complete = tsum.bind(&ctx, Placeholder::T, ScalarType::Float32).unwrap();
        assert!(matches!(
            complete.bind(&ctx, Placeholder::T, ScalarType::Float32),
            Err(TurboError::AlreadyBound { placeholder: Placeholder::T, .. })
        ));
        assert!(matches!(
            complete.bind(&ctx, Placeholder::U, ScalarType::Float32),
            Err(TurboError::NoSuchPlaceholder { .. })
        ));
    }

    #[test]
    fn test_exact_dtype_at_boundary() {
        let (engine, _dir) = engine_with(FakeCompiler::new().with_kernel("tsum", tsum_kernel()));
        let ctx = CompileContext::new();
        let tsum = engine.declare(&ctx, "mymod", TSUM).unwrap();
        let complete = tsum.bind(&ctx, Placeholder::T, ScalarType::Float32).unwrap();
        let mut args = sum_args(ScalarType::Float64, 3);
        assert!(matches!(complete.call(&ctx, &mut args), Err(TurboError::Native(_))));
    }

    #[test]
    fn test_conflicting_inference() {
        let (engine, _dir) = engine_with(FakeCompiler::new().with_kernel("tsum", tsum_kernel()));
        let ctx = CompileContext::new();
        let tsum = engine.declare(&ctx, "mymod", TSUM).unwrap();
        let mut args = sum_args(ScalarType::Float32, 2);
        args[2] = Array::zeros(ScalarType::Float64, &[2]).into();
        match tsum.call(&ctx, &mut args) {
            Err(TurboError::AlreadyBound { current, given, .. }) => {
                assert_eq!(current, TypeArg::Type(ScalarType::Float32));
                assert_eq!(given, TypeArg::Type(ScalarType::Float64));
            }
            other => panic!("expected AlreadyBound, got {:?}", other),
        }
    }

    #[test]
    fn test_not_dynamic() {
        let (engine, _dir) = engine_with(FakeCompiler::new());
        let ctx = CompileContext::new();
        let f = engine
            .declare(&ctx, "m", "@turbo(x = [T])\ndef f(x):\n    x[0] = 1\n")
            .unwrap();
        let mut args = vec![Array::zeros(ScalarType::Int8, &[1]).into()];
        assert!(matches!(f.call(&ctx, &mut args), Err(TurboError::NotDynamic { .. })));
    }

    #[test]
    fn test_uninferable() {
        let (engine, _dir) = engine_with(FakeCompiler::new());
        let ctx = CompileContext::new();
        let f = engine
            .declare(
                &ctx,
                "m",
                "@turbo(types = dict(x = [T], k = U), dynamic = True)\ndef f(x):\n    x[0] = k\n",
            )
            .unwrap();
        let mut args = vec![Array::zeros(ScalarType::Int8, &[1]).into()];
        assert!(matches!(
            f.call(&ctx, &mut args),
            Err(TurboError::Uninferable { placeholder: Placeholder::U, .. })
        ));
    }

    #[test]
    fn test_deferred_until_scope_ends() {
        let compiler = FakeCompiler::new().with_kernel("tsum", tsum_kernel());
        let (engine, dir) = engine_with(compiler.clone());
        let ctx = CompileContext::new();
        let tsum = engine.declare(&ctx, "mymod", TSUM).unwrap();
        let complete = {
            let _scope = ctx.no_compile();
            let complete = tsum.bind(&ctx, Placeholder::T, ScalarType::Int32).unwrap();
            assert!(dir.path().join("mymod_turbo/tsum_int32.pyx").exists());
            assert!(!complete.as_complete().unwrap().entry().handle().is_ready());
            let mut args = sum_args(ScalarType::Int32, 2);
            assert!(matches!(
                complete.call(&ctx, &mut args),
                Err(TurboError::DeferredNotReady { .. })
            ));
            complete
        };
        assert_eq!(compiler.compile_count(), 0);
        let mut args = sum_args(ScalarType::Int32, 2);
        complete.call(&ctx, &mut args).unwrap();
        assert_eq!(args[3].as_array().unwrap().data, vec![0.0, 3.0]);
        assert_eq!(compiler.compile_count(), 1);
        assert!(complete.as_complete().unwrap().entry().handle().is_ready());
    }

    const FILL: &str = "
@turbo(types = dict(self = dict(data = [T], count = np.uint32), v = T, i = np.uint32), dynamic = True)
def fill(self, v):
    for i in range(self.count):
        self.data[i] = v
";

    fn fill_kernel() -> NativeFn {
        Arc::new(|args: &mut [Value]| {
            let v = args[1].as_number().map(Number::as_f64).unwrap_or_default();
            let Value::Object(object) = &mut args[0] else {
                return Err(crate::native::NativeError::Kernel("self is not an object".into()));
            };
            if let Some(Value::Array(data)) = object.fields.get_mut("data") {
                data.data.iter_mut().for_each(|x| *x = v);
            }
            Ok(Value::None)
        })
    }

    #[test]
    fn test_instance_partial_infers_from_self() {
        let (engine, _dir) = engine_with(FakeCompiler::new().with_kernel("fill", fill_kernel()));
        let ctx = CompileContext::new();
        let fill = engine.declare(&ctx, "m", FILL).unwrap();
        assert!(fill.decorated().body().contains("range(self_count)"));
        let instance = Object::new()
            .with("data", Array::zeros(ScalarType::Float64, &[3]).into())
            .with("count", Value::int(3));
        let mut method = fill.bind_instance(instance.into());
        method.call(&ctx, &mut [Value::typed(ScalarType::Float64, 2.5)]).unwrap();
        let data = method.instance().as_object().unwrap().field("data").unwrap();
        assert_eq!(data.as_array().unwrap().data, vec![2.5, 2.5, 2.5]);
    }

    #[test]
    fn test_instance_bind_to_complete() {
        let (engine, _dir) = engine_with(FakeCompiler::new().with_kernel("fill", fill_kernel()));
        let ctx = CompileContext::new();
        let fill = engine.declare(&ctx, "m", FILL).unwrap();
        let instance = Object::new()
            .with("data", Array::zeros(ScalarType::Int16, &[2]).into())
            .with("count", Value::int(2));
        let Specialized::Partial(partial) = &fill else {
            panic!("expected partial");
        };
        let bound = partial
            .bind_instance(instance.into())
            .bind(&ctx, Placeholder::T, ScalarType::Int16)
            .unwrap();
        let InstanceSpecialized::Complete(mut method) = bound else {
            panic!("expected complete");
        };
        assert_eq!(method.complete().function_name(), "fill_int16");
        method.call(&ctx, &mut [Value::int(7)]).unwrap();
        let data = method.into_instance();
        let data = data.as_object().unwrap().field("data").unwrap().as_array().unwrap().clone();
        assert_eq!(data.data, vec![7.0, 7.0]);
    }

    #[test]
    fn test_instance_fields_checked_before_kernel() {
        let compiler = FakeCompiler::new().with_kernel("fill", fill_kernel());
        let (engine, _dir) = engine_with(compiler);
        let ctx = CompileContext::new();
        let fill = engine.declare(&ctx, "m", FILL).unwrap();
        let instance = Object::new()
            .with("data", Array::zeros(ScalarType::Float64, &[2]).into())
            .with("count", Value::int(2));
        let Specialized::Partial(partial) = &fill else {
            panic!("expected partial");
        };
        let bound = partial
            .bind_instance(instance.into())
            .bind(&ctx, Placeholder::T, ScalarType::Int16)
            .unwrap();
        let InstanceSpecialized::Complete(mut method) = bound else {
            panic!("expected complete");
        };
        match method.call(&ctx, &mut [Value::int(7)]) {
            Err(TurboError::Native(crate::native::NativeError::ArgumentType { index, expected, .. })) => {
                assert_eq!(index, 0);
                assert!(expected.contains("data: ndarray[int16, ndim=1]"));
            }
            other => panic!("expected ArgumentType, got {:?}", other),
        }
        let data = method.instance().as_object().unwrap().field("data").unwrap();
        assert_eq!(data.as_array().unwrap().data, vec![0.0, 0.0]);
    }
}
