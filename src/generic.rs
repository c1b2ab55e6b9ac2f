//! Generic bundles of specializable methods
//!
//! A [`Generic`] groups the methods of one class. Binding a placeholder on
//! the bundle binds it on every member that still has it unbound, and the
//! bundle's name records what is bound so far: `Cls_int32_?`.
//!
//! Bundles are plain values. [`GenericRegistry`] memoizes them by base name
//! and bindings so rebinding the same way hands back the same bundle.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex};

use log::debug;

use crate::context::CompileContext;
use crate::error::TurboResult;
use crate::facade::Specialized;
use crate::types::{Placeholder, TypeArg};
use crate::variant::Variant;

#[derive(Debug, Clone)]
pub struct Generic {
    base: String,
    variant: Variant,
    members: BTreeMap<String, Specialized>,
}

impl Generic {
    pub fn new(base: &str, members: BTreeMap<String, Specialized>) -> Self {
        let placeholders: BTreeSet<Placeholder> = members
            .values()
            .filter(|m| !m.is_complete())
            .flat_map(|m| m.decorated().placeholders().iter().copied())
            .collect();
        Self {
            base: base.to_string(),
            variant: Variant::new(&placeholders),
            members,
        }
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    /// Base name followed by each placeholder's discriminator, `?` if unbound
    pub fn name(&self) -> String {
        let placeholders: BTreeSet<Placeholder> = self
            .variant
            .bindings()
            .keys()
            .chain(self.variant.unbound())
            .copied()
            .collect();
        let mut words = vec![self.base.clone()];
        for placeholder in placeholders {
            words.push(match self.variant.arg(placeholder) {
                Some(arg) => arg.discriminator(),
                None => "?".to_string(),
            });
        }
        words.join("_")
    }

    pub fn member(&self, name: &str) -> Option<&Specialized> {
        self.members.get(name)
    }

    pub fn members(&self) -> &BTreeMap<String, Specialized> {
        &self.members
    }

    pub fn bindings(&self) -> &BTreeMap<Placeholder, TypeArg> {
        self.variant.bindings()
    }

    /// New bundle with `placeholder` bound on every member that has it unbound
    pub fn bind(&self, ctx: &CompileContext, placeholder: Placeholder, arg: impl Into<TypeArg>) -> TurboResult<Generic> {
        let arg = arg.into();
        let variant = self.variant.spinoff(placeholder, arg.clone())?;
        let mut members = BTreeMap::new();
        for (name, member) in &self.members {
            let member = match member {
                Specialized::Partial(partial) if partial.variant().unbound().contains(&placeholder) => {
                    partial.bind(ctx, placeholder, arg.clone())?
                }
                other => other.clone(),
            };
            members.insert(name.clone(), member);
        }
        Ok(Generic {
            base: self.base.clone(),
            variant,
            members,
        })
    }
}

type BundleKey = (String, Vec<(Placeholder, TypeArg)>);

/// Memo of constructed bundles keyed by base name and bindings
#[derive(Default)]
pub struct GenericRegistry {
    bundles: Mutex<HashMap<BundleKey, Arc<Generic>>>,
}

impl GenericRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(generic: &Generic) -> BundleKey {
        let bindings = generic
            .bindings()
            .iter()
            .map(|(p, arg)| (*p, arg.clone()))
            .collect();
        (generic.base.clone(), bindings)
    }

    /// Register an unbound bundle, or return the one already registered
    pub fn register(&self, generic: Generic) -> Arc<Generic> {
        let mut bundles = self.bundles.lock().unwrap_or_else(|e| e.into_inner());
        bundles
            .entry(Self::key(&generic))
            .or_insert_with(|| Arc::new(generic))
            .clone()
    }

    /// Memoized [`Generic::bind`]
    pub fn bind(
        &self,
        ctx: &CompileContext,
        generic: &Generic,
        placeholder: Placeholder,
        arg: impl Into<TypeArg>,
    ) -> TurboResult<Arc<Generic>> {
        let arg = arg.into();
        let mut key = Self::key(generic);
        key.1.push((placeholder, arg.clone()));
        key.1.sort_by(|a, b| a.0.cmp(&b.0));
        let mut bundles = self.bundles.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(bundle) = bundles.get(&key) {
            return Ok(bundle.clone());
        }
        let bound = Arc::new(generic.bind(ctx, placeholder, arg)?);
        debug!("New generic bundle: {}", bound.name());
        bundles.insert(key, bound.clone());
        Ok(bound)
    }

    pub fn len(&self) -> usize {
        self.bundles.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TurboError;
    use crate::testing::{engine_with, FakeCompiler};
    use crate::types::ScalarType;
    use pretty_assertions::assert_eq;

    const SOURCE: &str = "
class Buffers(generic):

    @turbo(types = dict(self = dict(data = [T]), n = np.uint32, v = T, i = np.uint32))
    def fill(self, n, v):
        for i in range(n):
            self.data[i] = v

    @turbo(types = dict(self = dict(data = [T]), n = np.uint32, k = U, i = np.uint32))
    def shift(self, n):
        for i in range(n):
            self.data[i] += k
";

    fn buffers() -> (Generic, tempfile::TempDir) {
        let (engine, dir) = engine_with(FakeCompiler::new());
        let ctx = CompileContext::new();
        let _scope = ctx.no_compile();
        let mut declared = engine.declare_source(&ctx, "m", SOURCE).unwrap();
        (declared.classes.remove("Buffers").unwrap(), dir)
    }

    #[test]
    fn test_names() {
        let (generic, _dir) = buffers();
        assert_eq!(generic.name(), "Buffers_?_?");
        let ctx = CompileContext::new();
        let _scope = ctx.no_compile();
        let bound = generic.bind(&ctx, Placeholder::U, 3i64).unwrap();
        assert_eq!(bound.name(), "Buffers_?_3");
        let bound = bound.bind(&ctx, Placeholder::T, ScalarType::Float32).unwrap();
        assert_eq!(bound.name(), "Buffers_float32_3");
        assert!(bound.member("fill").unwrap().is_complete());
        assert_eq!(
            bound.member("shift").unwrap().as_complete().unwrap().function_name(),
            "shift_float32_3"
        );
    }

    #[test]
    fn test_partial_members_only_bind_what_they_have() {
        let (generic, _dir) = buffers();
        let ctx = CompileContext::new();
        let _scope = ctx.no_compile();
        let bound = generic.bind(&ctx, Placeholder::T, ScalarType::Int8).unwrap();
        assert!(bound.member("fill").unwrap().is_complete());
        assert!(!bound.member("shift").unwrap().is_complete());
        assert!(matches!(
            bound.bind(&ctx, Placeholder::T, ScalarType::Int8),
            Err(TurboError::AlreadyBound { .. })
        ));
        assert!(matches!(
            bound.bind(&ctx, Placeholder::Z, ScalarType::Int8),
            Err(TurboError::NoSuchPlaceholder { .. })
        ));
    }

    #[test]
    fn test_registry_memoizes() {
        let (generic, _dir) = buffers();
        let ctx = CompileContext::new();
        let _scope = ctx.no_compile();
        let registry = GenericRegistry::new();
        let base = registry.register(generic);
        let a = registry.bind(&ctx, &base, Placeholder::T, ScalarType::Int8).unwrap();
        let b = registry.bind(&ctx, &base, Placeholder::T, ScalarType::Int8).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.len(), 2);
    }
}
