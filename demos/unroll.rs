//! Example: Loop Unrolling
//!
//! Shows the text generated for an `UNROLL` loop whose count is a bound
//! constant and for one whose count is only known at run time. Nothing is
//! compiled: artifacts are prepared inside a no-compile scope.
//!
//! Run with: cargo run --example unroll

use std::sync::Arc;

use turbo_specialize::unroll::unroll;
use turbo_specialize::{CompileContext, ConstValue, Engine, Placeholder, TurboConfig, UnavailableCompiler};

const SOURCE: &str = "
@turbo(types = dict(n = np.uint32, acc = np.float64, x = [np.float64], step = X))
def accumulate(n, acc, x):
    for UNROLL in range(step):
        acc += x[0]
    for UNROLL in range(n):
        x[0] += 1
    return acc
";

fn main() {
    println!("=== Loop Unrolling Example ===\n");

    let dir = tempfile::tempdir().unwrap();
    let engine = Engine::new(
        TurboConfig::default().with_output_root(dir.path()),
        Arc::new(UnavailableCompiler),
    );
    let ctx = CompileContext::new();
    let _scope = ctx.no_compile();

    let accumulate = engine.declare(&ctx, "demo", SOURCE).unwrap();
    let accumulate_3 = accumulate.bind(&ctx, Placeholder::X, 3i64).unwrap();
    println!("Example 1: step bound to 3, n left to run time");
    println!("{}", accumulate_3.as_complete().unwrap().unit_text().unwrap());

    println!("Example 2: unrolling a body directly");
    let body = "    for UNROLL in range(k):\n        total += 1\n";
    let consts = [("k".to_string(), ConstValue::Int(2))].into_iter().collect();
    print!("{}", unroll(body, &consts).unwrap());
}
