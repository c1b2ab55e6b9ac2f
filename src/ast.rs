//! Declaration IR: what a `@turbo` annotation and its function look like
//! once parsed, before any placeholder is bound.

use std::ops::Range;

use crate::types::{Placeholder, ScalarType, TypeArg};

/// Raw declared shape of one name
#[derive(Debug, Clone, PartialEq)]
pub enum RawSpec {
    /// Concrete scalar type: `np.uint32`
    Type(ScalarType),

    /// Placeholder: `T`
    Placeholder(Placeholder),

    /// One-element list, nesting depth is the dimensionality: `[[T]]`
    List(Box<RawSpec>),

    /// Mapping from field name to nested shape: `dict(x = np.int8)`
    Map(Vec<(String, RawSpec)>),
}

impl RawSpec {
    pub fn list(inner: RawSpec) -> Self {
        RawSpec::List(Box::new(inner))
    }
}

impl From<ScalarType> for RawSpec {
    fn from(t: ScalarType) -> Self {
        RawSpec::Type(t)
    }
}

impl From<Placeholder> for RawSpec {
    fn from(p: Placeholder) -> Self {
        RawSpec::Placeholder(p)
    }
}

/// A set of values sharing one compiled unit
#[derive(Debug, Clone, PartialEq)]
pub enum Group {
    Members(Vec<TypeArg>),
    /// Integer constants, half-open like `range(5, 10)`
    Range(Range<i64>),
}

/// Arguments of one `@turbo(...)` annotation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecoratorArgs {
    pub types: Vec<(String, RawSpec)>,
    pub dynamic: bool,
    pub groups: Vec<(Placeholder, Group)>,
}

/// A function definition with its body kept as pre-split text
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDef {
    pub name: String,
    pub params: Vec<String>,
    /// Assigned names in order of first appearance, params and `UNROLL` excluded
    pub locals: Vec<String>,
    /// Indentation of the body relative to the `def`
    pub body_indent: String,
    /// Body lines with the function's own indentation stripped
    pub body: String,
}

/// One annotated function
#[derive(Debug, Clone, PartialEq)]
pub struct Declaration {
    pub decorator: DecoratorArgs,
    pub function: FunctionDef,
}

/// A class holding annotated methods
#[derive(Debug, Clone, PartialEq)]
pub struct ClassDef {
    pub name: String,
    /// Declared with `generic` as its base/metaclass
    pub generic: bool,
    pub methods: Vec<Declaration>,
}

/// Everything annotated in one source file
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceModule {
    pub functions: Vec<Declaration>,
    pub classes: Vec<ClassDef>,
}
