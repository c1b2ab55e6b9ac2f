//! Helpers shared by the unit tests

use std::sync::Arc;

use tempfile::TempDir;

use crate::cache::Engine;
use crate::config::TurboConfig;
use crate::native::{NativeError, NativeFn};
use crate::value::{Number, Value};

pub use crate::native::KernelCompiler as FakeCompiler;

/// Engine writing into a fresh temporary directory; keep the guard alive
pub fn engine_with(compiler: FakeCompiler) -> (Arc<Engine>, TempDir) {
    let dir = TempDir::new().unwrap();
    let config = TurboConfig::default().with_output_root(dir.path());
    (Engine::new(config, Arc::new(compiler)), dir)
}

pub fn test_engine() -> (Arc<Engine>, TempDir) {
    engine_with(FakeCompiler::new())
}

/// `out[i] = x[i] + y[i]` for the first `n` elements
pub fn tsum_kernel() -> NativeFn {
    Arc::new(|args: &mut [Value]| {
        let n = args[0].as_number().map(Number::as_i64).unwrap_or_default() as usize;
        let (inputs, out) = args.split_at_mut(3);
        let (Some(x), Some(y), Some(out)) = (inputs[1].as_array(), inputs[2].as_array(), out[0].as_array_mut())
        else {
            return Err(NativeError::Kernel("tsum expects three buffers".into()));
        };
        if n > x.len() || n > y.len() || n > out.len() {
            return Err(NativeError::Kernel(format!("n = {} exceeds buffer length", n)));
        }
        for i in 0..n {
            out.data[i] = x.data[i] + y.data[i];
        }
        Ok(Value::None)
    })
}
