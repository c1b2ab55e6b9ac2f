//! Specialization cache
//!
//! [`Engine`] owns everything shared between declarations: configuration,
//! the artifact store, the code generator and the module loader. Each
//! [`Decorated`] keeps a [`Memo`] from discriminator suffix to compiled entry,
//! with one lock per suffix so a signature is generated and compiled at most
//! once even under concurrent callers.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use log::{debug, info};

use crate::ast::SourceModule;
use crate::codegen::CodeGenerator;
use crate::config::TurboConfig;
use crate::context::CompileContext;
use crate::decorated::{Decorated, Decorator};
use crate::error::{TurboError, TurboResult};
use crate::facade::{Deferred, Entry, Handle, Specialized};
use crate::generic::Generic;
use crate::native::{CompileRequest, Compiler, Loader};
use crate::parser::{parse_declaration, parse_source};
use crate::store::ArtifactStore;
use crate::variant::Variant;

type Slot = Arc<Mutex<Option<Arc<Entry>>>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Suffix to compiled entry
#[derive(Default)]
pub struct Memo {
    slots: Mutex<HashMap<String, Slot>>,
}

impl Memo {
    pub fn get(&self, suffix: &str) -> Option<Arc<Entry>> {
        let slot = lock(&self.slots).get(suffix).cloned()?;
        let entry = lock(&slot).clone();
        entry
    }

    /// Number of entries loaded so far
    pub fn len(&self) -> usize {
        let slots: Vec<Slot> = lock(&self.slots).values().cloned().collect();
        slots.iter().filter(|slot| lock(slot).is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Return the entry for `suffix`, running `load` under that suffix's lock on a miss
    pub fn get_or_load(
        &self,
        suffix: &str,
        load: impl FnOnce() -> TurboResult<Arc<Entry>>,
    ) -> TurboResult<Arc<Entry>> {
        let slot = lock(&self.slots).entry(suffix.to_string()).or_default().clone();
        let mut guard = lock(&slot);
        if let Some(entry) = guard.as_ref() {
            return Ok(entry.clone());
        }
        debug!("Memo miss: {}", suffix);
        let entry = load()?;
        *guard = Some(entry.clone());
        Ok(entry)
    }
}

/// Everything annotated in one source file, declared
pub struct DeclaredModule {
    pub functions: BTreeMap<String, Specialized>,
    pub classes: BTreeMap<String, Generic>,
}

pub struct Engine {
    config: TurboConfig,
    store: ArtifactStore,
    generator: CodeGenerator,
    loader: Arc<Loader>,
}

impl Engine {
    pub fn new(config: TurboConfig, compiler: Arc<dyn Compiler>) -> Arc<Self> {
        Arc::new(Self {
            store: ArtifactStore::new(config.output_root.clone()),
            generator: CodeGenerator::new(config.eol.clone()),
            loader: Arc::new(Loader::new(compiler)),
            config,
        })
    }

    pub fn config(&self) -> &TurboConfig {
        &self.config
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    pub fn generator(&self) -> &CodeGenerator {
        &self.generator
    }

    pub fn loader(&self) -> &Arc<Loader> {
        &self.loader
    }

    /// Declare the single annotated function in `source`
    pub fn declare(self: &Arc<Self>, ctx: &CompileContext, module: &str, source: &str) -> TurboResult<Specialized> {
        let declaration = parse_declaration(source)?;
        Decorator::from_args(declaration.decorator).decorate(ctx, module, &declaration.function, self)
    }

    /// Declare every annotated function and class in a source file
    pub fn declare_source(
        self: &Arc<Self>,
        ctx: &CompileContext,
        module: &str,
        source: &str,
    ) -> TurboResult<DeclaredModule> {
        let SourceModule { functions, classes } = parse_source(source)?;
        let mut declared = DeclaredModule {
            functions: BTreeMap::new(),
            classes: BTreeMap::new(),
        };
        for declaration in functions {
            let specialized =
                Decorator::from_args(declaration.decorator).decorate(ctx, module, &declaration.function, self)?;
            declared.functions.insert(declaration.function.name, specialized);
        }
        for class in classes {
            let mut members = BTreeMap::new();
            for method in class.methods {
                let specialized =
                    Decorator::from_args(method.decorator).decorate(ctx, module, &method.function, self)?;
                members.insert(method.function.name, specialized);
            }
            if class.generic {
                declared.classes.insert(class.name.clone(), Generic::new(&class.name, members));
            } else {
                // Plain methods, bound one at a time
                for (name, specialized) in members {
                    declared.functions.insert(format!("{}.{}", class.name, name), specialized);
                }
            }
        }
        Ok(declared)
    }

    /// Memoized lookup of the compiled entry for a complete variant
    pub fn get_complete(&self, ctx: &CompileContext, decorated: &Decorated, variant: &Variant) -> TurboResult<Arc<Entry>> {
        let suffix = variant.complete_suffix()?;
        decorated
            .memo()
            .get_or_load(&suffix, || self.load(ctx, decorated, variant))
    }

    /// Generate, persist and (unless suppressed) compile the unit holding `variant`
    pub fn load(&self, ctx: &CompileContext, decorated: &Decorated, variant: &Variant) -> TurboResult<Arc<Entry>> {
        let suffix = variant.complete_suffix()?;
        let group_suffix = variant.complete_group_suffix(decorated.groups())?;
        let function = format!("{}{}", decorated.name(), suffix);
        let unit = format!("{}{}", decorated.name(), group_suffix);
        let dir = self.store.module_dir(decorated.module());
        let request = CompileRequest {
            module: format!("{}_turbo.{}", decorated.module(), unit),
            source_path: dir.join(format!("{}.pyx", unit)),
            build_path: dir.join(format!("{}.pyxbld", unit)),
            unit,
        };
        let signature = self.generator.signature(decorated, variant)?;

        if let Some(module) = self.loader.get(&request.module) {
            debug!("Already loaded: {}", request.module);
            let native = module.function(&function).ok_or_else(|| TurboError::MissingFunction {
                module: request.module.clone(),
                function: function.clone(),
            })?;
            return Ok(Arc::new(Entry::new(function, request, signature, Handle::Ready(native))));
        }

        let text = self.generator.unit_text(decorated, variant)?;
        let outcome = self
            .store
            .persist(decorated.module(), &request.unit, &text, &self.generator.build_text())?;
        debug!("Persisted {} (written: {})", outcome.source_path.display(), outcome.written);

        if !ctx.compile_enabled() {
            info!("Prepared: {}", request.unit);
            let deferred = Deferred::new(request.clone(), function.clone(), self.loader.clone());
            return Ok(Arc::new(Entry::new(function, request, signature, Handle::Pending(deferred))));
        }
        info!("Compiling: {}", request.unit);
        let module = self.loader.import(&request)?;
        let native = module.function(&function).ok_or_else(|| TurboError::MissingFunction {
            module: request.module.clone(),
            function: function.clone(),
        })?;
        Ok(Arc::new(Entry::new(function, request, signature, Handle::Ready(native))))
    }
}
