//! Example: Element-wise Sum
//!
//! Declares `tsum` once, binds it statically to float32, then lets a dynamic
//! call infer int64 from its buffers. Kernels are served in-process by a
//! `KernelCompiler`.
//!
//! Run with: cargo run --example elementwise_sum

use std::sync::Arc;

use turbo_specialize::{
    Array, CompileContext, Engine, KernelCompiler, NativeError, NativeFn, Placeholder, ScalarType, TurboConfig,
    Value,
};

const SOURCE: &str = "
@turbo(types = dict(n = np.uint32, x = [T], y = [T], out = [T], i = np.uint32), dynamic = True)
def tsum(n, x, y, out):
    for i in range(n):
        out[i] = x[i] + y[i]
";

fn tsum_kernel() -> NativeFn {
    Arc::new(|args: &mut [Value]| {
        let n = args[0].as_number().map(|n| n.as_i64()).unwrap_or_default() as usize;
        let (inputs, out) = args.split_at_mut(3);
        match (inputs[1].as_array(), inputs[2].as_array(), out[0].as_array_mut()) {
            (Some(x), Some(y), Some(out)) => {
                for i in 0..n.min(out.len()) {
                    out.data[i] = x.data[i] + y.data[i];
                }
                Ok(Value::None)
            }
            _ => Err(NativeError::Kernel("tsum expects three buffers".into())),
        }
    })
}

fn main() {
    env_logger::init();
    println!("=== Element-wise Sum Example ===\n");

    let dir = tempfile::tempdir().unwrap();
    let compiler = KernelCompiler::new().with_kernel("tsum", tsum_kernel());
    let engine = Engine::new(
        TurboConfig::default().with_output_root(dir.path()),
        Arc::new(compiler.clone()),
    );
    let ctx = CompileContext::new();
    let tsum = engine.declare(&ctx, "mymod", SOURCE).unwrap();

    // Static binding
    println!("Example 1: tsum bound to float32");
    let tsum_float32 = tsum.bind(&ctx, Placeholder::T, ScalarType::Float32).unwrap();
    let n = 5;
    let mut args = vec![
        Value::int(n as i64),
        Array::arange(ScalarType::Float32, n, 1.0).into(),
        Array::arange(ScalarType::Float32, n, 0.5).into(),
        Array::zeros(ScalarType::Float32, &[n]).into(),
    ];
    tsum_float32.call(&ctx, &mut args).unwrap();
    println!("out = {:?}\n", args[3].as_array().unwrap().data);

    println!("Generated unit:");
    println!("{}", tsum_float32.as_complete().unwrap().unit_text().unwrap());

    // Dynamic call: T inferred from the buffers
    println!("Example 2: dynamic call with int64 buffers");
    let mut args = vec![
        Value::int(n as i64),
        Array::arange(ScalarType::Int64, n, 2.0).into(),
        Array::arange(ScalarType::Int64, n, 3.0).into(),
        Array::zeros(ScalarType::Int64, &[n]).into(),
    ];
    tsum.call(&ctx, &mut args).unwrap();
    println!("out = {:?}", args[3].as_array().unwrap().data);

    // Same signature again: served from the memo
    tsum.call(&ctx, &mut args).unwrap();
    println!("\nUnits compiled: {}", compiler.compile_count());
    println!("Artifacts under {}", dir.path().join("mymod_turbo").display());
}
