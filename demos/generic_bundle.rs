//! Example: Generic Bundles
//!
//! A class whose methods share placeholders. Binding on the bundle binds every
//! method that still needs it, and the bundle name tracks what is bound.
//! Only `fill` gets a kernel, so `shift` stays prepared but never compiled.
//!
//! Run with: cargo run --example generic_bundle

use std::sync::Arc;

use turbo_specialize::{
    Array, CompileContext, Engine, GenericRegistry, InstanceSpecialized, KernelCompiler, NativeError, NativeFn,
    Object, Placeholder, ScalarType, TurboConfig, Value,
};

const SOURCE: &str = "
class Buffer(generic):

    @turbo(types = dict(self = dict(data = [T], count = np.uint32), v = T, i = np.uint32))
    def fill(self, v):
        for i in range(self.count):
            self.data[i] = v

    @turbo(types = dict(self = dict(data = [T], count = np.uint32), i = np.uint32, k = U))
    def shift(self):
        for i in range(self.count):
            self.data[i] += k
";

fn fill_kernel() -> NativeFn {
    Arc::new(|args: &mut [Value]| {
        let v = args[1].as_number().map(|n| n.as_f64()).unwrap_or_default();
        match &mut args[0] {
            Value::Object(object) => {
                if let Some(Value::Array(data)) = object.fields.get_mut("data") {
                    data.data.iter_mut().for_each(|x| *x = v);
                }
                Ok(Value::None)
            }
            other => Err(NativeError::Kernel(format!("fill expects an object, got {}", other.kind()))),
        }
    })
}

fn main() {
    env_logger::init();
    println!("=== Generic Bundle Example ===\n");

    let dir = tempfile::tempdir().unwrap();
    let compiler = KernelCompiler::new().with_kernel("fill", fill_kernel());
    let engine = Engine::new(
        TurboConfig::default().with_output_root(dir.path()),
        Arc::new(compiler),
    );
    let ctx = CompileContext::new();
    let mut declared = engine.declare_source(&ctx, "buffers", SOURCE).unwrap();
    let registry = GenericRegistry::new();
    let buffer = registry.register(declared.classes.remove("Buffer").unwrap());
    println!("Declared: {}", buffer.name());

    // Prepare only: each unit compiles on its first call
    let float_buffer = {
        let _scope = ctx.no_compile();
        let with_shift = registry.bind(&ctx, &buffer, Placeholder::U, 4i64).unwrap();
        println!("Bound U: {}", with_shift.name());
        let float_buffer = registry.bind(&ctx, &with_shift, Placeholder::T, ScalarType::Float64).unwrap();
        println!("Bound T: {}", float_buffer.name());
        float_buffer
    };
    for (name, member) in float_buffer.members() {
        let function = member.as_complete().map(|c| c.function_name().to_string());
        println!("  {} -> {}", name, function.unwrap_or_else(|| "partial".into()));
    }

    let instance = Object::new()
        .with("data", Array::zeros(ScalarType::Float64, &[4]).into())
        .with("count", Value::int(4));
    let mut fill = float_buffer.member("fill").unwrap().bind_instance(instance.into());
    fill.call(&ctx, &mut [Value::float(1.5)]).unwrap();
    if let InstanceSpecialized::Complete(method) = &fill {
        println!("\nAfter {}(1.5):", method.complete().function_name());
    }
    let data = fill.instance().as_object().unwrap().field("data").unwrap();
    println!("data = {:?}", data.as_array().unwrap().data);
}
