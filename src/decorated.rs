//! Declaration descriptor
//!
//! [`Decorator`] carries the arguments of one `@turbo(...)` annotation and
//! turns a parsed function into a [`Decorated`]: immutable apart from its
//! memo of compiled entries.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;
use std::sync::Arc;

use crate::ast::{DecoratorArgs, FunctionDef, Group, RawSpec};
use crate::cache::{Engine, Memo};
use crate::context::CompileContext;
use crate::error::{TurboError, TurboResult};
use crate::facade::Specialized;
use crate::typespec::{Resolver, TypeSpec};
use crate::types::Placeholder;
use crate::variant::GroupSets;

/// Annotation arguments, also usable as a builder
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Decorator {
    types: Vec<(String, RawSpec)>,
    dynamic: bool,
    groups: Vec<(Placeholder, Group)>,
}

impl Decorator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_args(args: DecoratorArgs) -> Self {
        Self {
            types: args.types,
            dynamic: args.dynamic,
            groups: args.groups,
        }
    }

    pub fn with_type(mut self, name: &str, spec: impl Into<RawSpec>) -> Self {
        self.types.push((name.to_string(), spec.into()));
        self
    }

    pub fn dynamic(mut self, dynamic: bool) -> Self {
        self.dynamic = dynamic;
        self
    }

    pub fn group(mut self, placeholder: Placeholder, group: Group) -> Self {
        self.groups.push((placeholder, group));
        self
    }

    /// Build the descriptor for `function`, declared in `module`
    pub fn build(&self, module: &str, function: &FunctionDef, engine: &Arc<Engine>) -> TurboResult<Decorated> {
        let mut specs = BTreeMap::new();
        let mut declared = Vec::new();
        for (name, raw) in &self.types {
            let spec = TypeSpec::from_raw(raw).map_err(|message| TurboError::BadSpec {
                name: name.clone(),
                message,
            })?;
            if specs.insert(name.clone(), spec).is_none() {
                declared.push(name.clone());
            }
        }

        let all_names: HashSet<&String> = function.params.iter().chain(&function.locals).collect();
        if let Some(name) = function
            .params
            .iter()
            .chain(&function.locals)
            .find(|name| !specs.contains_key(*name))
        {
            return Err(TurboError::untyped(name.as_str()));
        }
        let mut const_names = Vec::new();
        for name in declared {
            if !all_names.contains(&name) {
                if !specs[&name].is_potential_const() {
                    return Err(TurboError::no_such_variable(name));
                }
                const_names.push(name);
            }
        }

        let placeholders: BTreeSet<Placeholder> = specs
            .values()
            .flat_map(|spec| spec.placeholders())
            .map(|(p, _)| p)
            .collect();
        let mut resolvers: BTreeMap<Placeholder, Vec<(usize, Resolver)>> = BTreeMap::new();
        for (position, name) in function.params.iter().enumerate() {
            for (placeholder, resolver) in specs[name].placeholders() {
                resolvers.entry(placeholder).or_default().push((position, resolver));
            }
        }

        let mut aliases: Vec<(String, String)> = function
            .params
            .iter()
            .flat_map(|name| specs[name].aliases(name))
            .collect();
        aliases.sort_by(|a, b| b.0.len().cmp(&a.0.len()));
        let mut body = function.body.clone();
        for (dotted, flat) in &aliases {
            body = replace_path(&body, dotted, flat);
        }

        Ok(Decorated {
            name: function.name.clone(),
            module: module.to_string(),
            param_names: function.params.clone(),
            local_names: function.locals.clone(),
            const_names,
            specs,
            body_indent: function.body_indent.clone(),
            body,
            placeholders,
            resolvers,
            dynamic: self.dynamic,
            groups: GroupSets::new(self.groups.iter().cloned()),
            engine: engine.clone(),
            memo: Memo::default(),
        })
    }

    /// Build and wrap in the callable facade
    pub fn decorate(
        &self,
        ctx: &CompileContext,
        module: &str,
        function: &FunctionDef,
        engine: &Arc<Engine>,
    ) -> TurboResult<Specialized> {
        let decorated = Arc::new(self.build(module, function, engine)?);
        Specialized::new(ctx, decorated)
    }
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Replace whole-word occurrences of a dotted path
fn replace_path(text: &str, dotted: &str, flat: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for (pos, _) in text.match_indices(dotted) {
        if pos < last {
            continue;
        }
        let end = pos + dotted.len();
        let clean_before = text[..pos]
            .chars()
            .next_back()
            .map_or(true, |c| !is_ident_char(c) && c != '.');
        let clean_after = text[end..].chars().next().map_or(true, |c| !is_ident_char(c));
        if clean_before && clean_after {
            out.push_str(&text[last..pos]);
            out.push_str(flat);
            last = end;
        }
    }
    out.push_str(&text[last..]);
    out
}

/// A declared kernel
pub struct Decorated {
    name: String,
    module: String,
    param_names: Vec<String>,
    local_names: Vec<String>,
    /// Declared names that are neither params nor locals, in declaration order
    const_names: Vec<String>,
    specs: BTreeMap<String, TypeSpec>,
    body_indent: String,
    body: String,
    /// Includes placeholders only reachable through consts
    placeholders: BTreeSet<Placeholder>,
    /// Every parameter position able to supply each placeholder
    resolvers: BTreeMap<Placeholder, Vec<(usize, Resolver)>>,
    dynamic: bool,
    groups: GroupSets,
    engine: Arc<Engine>,
    memo: Memo,
}

impl Decorated {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn module(&self) -> &str {
        &self.module
    }

    pub fn param_names(&self) -> &[String] {
        &self.param_names
    }

    pub fn local_names(&self) -> &[String] {
        &self.local_names
    }

    pub fn const_names(&self) -> &[String] {
        &self.const_names
    }

    pub fn spec(&self, name: &str) -> Option<&TypeSpec> {
        self.specs.get(name)
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn body_indent(&self) -> &str {
        &self.body_indent
    }

    pub fn placeholders(&self) -> &BTreeSet<Placeholder> {
        &self.placeholders
    }

    pub fn resolvers(&self, placeholder: Placeholder) -> &[(usize, Resolver)] {
        self.resolvers.get(&placeholder).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn dynamic(&self) -> bool {
        self.dynamic
    }

    pub fn groups(&self) -> &GroupSets {
        &self.groups
    }

    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    pub fn memo(&self) -> &Memo {
        &self.memo
    }
}

impl fmt::Debug for Decorated {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Decorated(<function {}>)", self.name)
    }
}
