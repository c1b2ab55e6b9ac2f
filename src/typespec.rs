//! TypeSpec tree: the declared shape of one name, and how it renders
//!
//! A raw shape becomes one of:
//! - `Scalar`: a bare type or placeholder
//! - `Array`: a list nested N deep, i.e. a buffer of ndim N
//! - `Composite`: a mapping of fields, i.e. an object with typed attributes
//!
//! Against a fully bound [`Variant`] each node renders its parameter
//! declaration and its `cdef` statements.

use crate::ast::RawSpec;
use crate::error::{TurboError, TurboResult};
use crate::types::{ConstValue, Placeholder, ScalarType, TypeArg};
use crate::value::Value;
use crate::variant::Variant;

/// Element of a scalar or array spec
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementSpec {
    Placeholder(Placeholder),
    Concrete(ScalarType),
}

impl ElementSpec {
    fn from_raw(raw: &RawSpec) -> Option<Self> {
        match raw {
            RawSpec::Type(t) => Some(ElementSpec::Concrete(*t)),
            RawSpec::Placeholder(p) => Some(ElementSpec::Placeholder(*p)),
            _ => None,
        }
    }

    pub fn placeholder(self) -> Option<Placeholder> {
        match self {
            ElementSpec::Placeholder(p) => Some(p),
            ElementSpec::Concrete(_) => None,
        }
    }

    /// What this element is under the variant's bindings
    pub fn resolved(self, variant: &Variant) -> TurboResult<TypeArg> {
        match self {
            ElementSpec::Concrete(t) => Ok(TypeArg::Type(t)),
            ElementSpec::Placeholder(p) => variant
                .arg(p)
                .cloned()
                .ok_or(TurboError::NoSuchPlaceholder { placeholder: p }),
        }
    }

    fn typename(self, variant: &Variant) -> TurboResult<&'static str> {
        self.resolved(variant)?.typename()
    }
}

/// A generated declaration: the name it introduces and its text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CDef {
    pub name: String,
    pub text: String,
}

impl CDef {
    fn new(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            text: text.into(),
        }
    }
}

impl std::fmt::Display for CDef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.text)
    }
}

/// Extracts the value of a placeholder from one argument
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolver {
    /// Buffer element type
    ElementType,
    /// Runtime type of a scalar
    RuntimeType,
    /// Project an attribute, then resolve that
    Field(String, Box<Resolver>),
}

impl Resolver {
    /// The error string says why the argument could not supply a type
    pub fn resolve(&self, value: &Value) -> Result<TypeArg, String> {
        match self {
            Resolver::ElementType => value
                .as_array()
                .map(|a| TypeArg::Type(a.dtype))
                .ok_or_else(|| format!("expected ndarray, got {}", value.kind())),
            Resolver::RuntimeType => match value {
                Value::Scalar(s) => Ok(TypeArg::Type(s.ty)),
                other => Err(format!("expected scalar, got {}", other.kind())),
            },
            Resolver::Field(name, inner) => {
                let object = value
                    .as_object()
                    .ok_or_else(|| format!("expected object with {}, got {}", name, value.kind()))?;
                let field = object
                    .field(name)
                    .ok_or_else(|| format!("object has no attribute {}", name))?;
                inner.resolve(field)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TypeSpec {
    Scalar(ElementSpec),
    Array { element: ElementSpec, ndim: usize },
    /// Fields sorted by name
    Composite(Vec<(String, TypeSpec)>),
}

impl TypeSpec {
    /// The error string says why the shape has no typed form
    pub fn from_raw(raw: &RawSpec) -> Result<TypeSpec, String> {
        Ok(match raw {
            RawSpec::Type(t) => TypeSpec::Scalar(ElementSpec::Concrete(*t)),
            RawSpec::Placeholder(p) => TypeSpec::Scalar(ElementSpec::Placeholder(*p)),
            RawSpec::List(inner) => {
                let mut ndim = 1;
                let mut element = inner.as_ref();
                while let RawSpec::List(deeper) = element {
                    element = deeper;
                    ndim += 1;
                }
                let element = ElementSpec::from_raw(element)
                    .ok_or_else(|| "list element must be a scalar type or placeholder".to_string())?;
                TypeSpec::Array { element, ndim }
            }
            RawSpec::Map(fields) => {
                let mut fields = fields
                    .iter()
                    .map(|(name, spec)| {
                        let spec = TypeSpec::from_raw(spec).map_err(|e| format!("field {}: {}", name, e))?;
                        Ok((name.clone(), spec))
                    })
                    .collect::<Result<Vec<(String, TypeSpec)>, String>>()?;
                fields.sort_by(|a, b| a.0.cmp(&b.0));
                TypeSpec::Composite(fields)
            }
        })
    }

    /// A scalar whose type is a placeholder may stand for a bound constant
    pub fn is_potential_const(&self) -> bool {
        matches!(self, TypeSpec::Scalar(ElementSpec::Placeholder(_)))
    }

    /// Text of this name in the function signature
    pub fn param_decl(&self, variant: &Variant, name: &str) -> TurboResult<CDef> {
        match self {
            TypeSpec::Scalar(element) => {
                let t = element.typename(variant)?;
                Ok(CDef::new(name, format!("np.{}_t {}", t, name)))
            }
            TypeSpec::Array { element, ndim } => {
                let t = element.typename(variant)?;
                let py_name = format!("py_{}", name);
                let text = format!("np.ndarray[np.{}_t{}] {}", t, ndim_text(*ndim), py_name);
                Ok(CDef::new(py_name, text))
            }
            TypeSpec::Composite(_) => Ok(CDef::new(name, name)),
        }
    }

    /// `cdef` statements for this name, as a parameter or as a local
    pub fn local_decls(&self, variant: &Variant, name: &str, is_param: bool) -> TurboResult<Vec<CDef>> {
        let mut decls = Vec::new();
        match self {
            TypeSpec::Scalar(element) => {
                if !is_param {
                    let t = element.typename(variant)?;
                    decls.push(CDef::new(name, format!("cdef np.{}_t {}", t, name)));
                }
            }
            TypeSpec::Array { element, ndim } => {
                let t = element.typename(variant)?;
                let text = if is_param {
                    format!("cdef np.{}_t* {} = &py_{}[{}]", t, name, name, zeros(*ndim))
                } else {
                    format!("cdef np.{}_t* {}", t, name)
                };
                decls.push(CDef::new(name, text));
            }
            TypeSpec::Composite(fields) => {
                for (field, spec) in fields {
                    spec.nested_decls(variant, name, name, field, &mut decls)?;
                }
            }
        }
        Ok(decls)
    }

    /// Declarations copying a field of an object into a flat local
    fn nested_decls(
        &self,
        variant: &Variant,
        und_parent: &str,
        dot_parent: &str,
        name: &str,
        decls: &mut Vec<CDef>,
    ) -> TurboResult<()> {
        let cname = format!("{}_{}", und_parent, name);
        match self {
            TypeSpec::Scalar(element) => {
                let t = element.typename(variant)?;
                let text = format!("cdef np.{}_t {} = {}.{}", t, cname, dot_parent, name);
                decls.push(CDef::new(cname, text));
            }
            TypeSpec::Array { element, ndim } => {
                let t = element.typename(variant)?;
                let py_name = format!("py_{}", cname);
                decls.push(CDef::new(
                    py_name.clone(),
                    format!(
                        "cdef np.ndarray[np.{}_t{}] {} = {}.{}",
                        t,
                        ndim_text(*ndim),
                        py_name,
                        dot_parent,
                        name
                    ),
                ));
                let text = format!("cdef np.{}_t* {} = &{}[{}]", t, cname, py_name, zeros(*ndim));
                decls.push(CDef::new(cname, text));
            }
            TypeSpec::Composite(fields) => {
                let dotted = format!("{}.{}", dot_parent, name);
                for (field, spec) in fields {
                    spec.nested_decls(variant, &cname, &dotted, field, decls)?;
                }
            }
        }
        Ok(())
    }

    /// Placeholders reachable from this spec, each with how to read it off an argument
    pub fn placeholders(&self) -> Vec<(Placeholder, Resolver)> {
        match self {
            TypeSpec::Scalar(element) => element
                .placeholder()
                .map(|p| (p, Resolver::RuntimeType))
                .into_iter()
                .collect(),
            TypeSpec::Array { element, .. } => element
                .placeholder()
                .map(|p| (p, Resolver::ElementType))
                .into_iter()
                .collect(),
            TypeSpec::Composite(fields) => fields
                .iter()
                .flat_map(|(field, spec)| {
                    spec.placeholders()
                        .into_iter()
                        .map(move |(p, r)| (p, Resolver::Field(field.clone(), Box::new(r))))
                })
                .collect(),
        }
    }

    /// The constant a potential-const scalar is bound to
    pub fn resolved_obj(&self, variant: &Variant, name: &str) -> TurboResult<ConstValue> {
        match self {
            TypeSpec::Scalar(element) => match element.resolved(variant)? {
                TypeArg::Obj(value) => Ok(value),
                arg @ TypeArg::Type(_) => Err(TurboError::BadArg { arg }),
            },
            _ => Err(TurboError::no_such_variable(name)),
        }
    }

    /// `(self.x, self_x)` pairs for every leaf field of a composite
    pub fn aliases(&self, name: &str) -> Vec<(String, String)> {
        let mut out = Vec::new();
        if let TypeSpec::Composite(fields) = self {
            collect_aliases(fields, name, name, &mut out);
        }
        out
    }
}

fn collect_aliases(fields: &[(String, TypeSpec)], dotted: &str, flat: &str, out: &mut Vec<(String, String)>) {
    for (field, spec) in fields {
        let dotted = format!("{}.{}", dotted, field);
        let flat = format!("{}_{}", flat, field);
        match spec {
            TypeSpec::Composite(inner) => collect_aliases(inner, &dotted, &flat, out),
            _ => out.push((dotted, flat)),
        }
    }
}

fn ndim_text(ndim: usize) -> String {
    if ndim == 1 {
        String::new()
    } else {
        format!(", ndim={}", ndim)
    }
}

fn zeros(ndim: usize) -> String {
    vec!["0"; ndim].join(", ")
}
