//! Explicit compile-suppression scope
//!
//! While a [`NoCompile`] guard is alive, a cache miss persists its unit but
//! hands back a deferred handle instead of compiling. Scopes nest.

use std::cell::Cell;

/// Threaded through every call that may create a specialization
///
/// Not `Sync`: a context belongs to one thread of calls.
#[derive(Debug, Default)]
pub struct CompileContext {
    suppressed: Cell<usize>,
}

impl CompileContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enter a no-compile scope, left when the guard drops
    pub fn no_compile(&self) -> NoCompile<'_> {
        self.suppressed.set(self.suppressed.get() + 1);
        NoCompile { ctx: self }
    }

    pub fn depth(&self) -> usize {
        self.suppressed.get()
    }

    pub fn compile_enabled(&self) -> bool {
        self.depth() == 0
    }
}

#[must_use = "compilation is only suppressed while the guard is alive"]
pub struct NoCompile<'a> {
    ctx: &'a CompileContext,
}

impl Drop for NoCompile<'_> {
    fn drop(&mut self) {
        self.ctx.suppressed.set(self.ctx.suppressed.get().saturating_sub(1));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nested_scopes() {
        let ctx = CompileContext::new();
        assert!(ctx.compile_enabled());
        {
            let _outer = ctx.no_compile();
            {
                let _inner = ctx.no_compile();
                assert_eq!(ctx.depth(), 2);
            }
            assert_eq!(ctx.depth(), 1);
            assert!(!ctx.compile_enabled());
        }
        assert!(ctx.compile_enabled());
    }
}
