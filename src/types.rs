//! Placeholders, concrete element types and the values they bind to

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::error::{TurboError, TurboResult};

/// An unbound type parameter, one of `T` through `Z`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Placeholder(char);

impl Placeholder {
    pub const T: Placeholder = Placeholder('T');
    pub const U: Placeholder = Placeholder('U');
    pub const V: Placeholder = Placeholder('V');
    pub const W: Placeholder = Placeholder('W');
    pub const X: Placeholder = Placeholder('X');
    pub const Y: Placeholder = Placeholder('Y');
    pub const Z: Placeholder = Placeholder('Z');

    pub const ALL: [Placeholder; 7] = [
        Self::T,
        Self::U,
        Self::V,
        Self::W,
        Self::X,
        Self::Y,
        Self::Z,
    ];

    pub fn name(self) -> char {
        self.0
    }

    pub fn parse(name: &str) -> Option<Self> {
        let mut chars = name.chars();
        let c = chars.next()?;
        if chars.next().is_some() {
            return None;
        }
        Self::ALL.iter().copied().find(|p| p.0 == c)
    }
}

impl fmt::Display for Placeholder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Concrete scalar/element type
///
/// `Int` and `Float` are the host's plain number types, which is what a bare
/// scalar argument infers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScalarType {
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Float32,
    Float64,
    Int,
    Float,
}

impl ScalarType {
    pub const ALL: [ScalarType; 12] = [
        ScalarType::Int8,
        ScalarType::Int16,
        ScalarType::Int32,
        ScalarType::Int64,
        ScalarType::UInt8,
        ScalarType::UInt16,
        ScalarType::UInt32,
        ScalarType::UInt64,
        ScalarType::Float32,
        ScalarType::Float64,
        ScalarType::Int,
        ScalarType::Float,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ScalarType::Int8 => "int8",
            ScalarType::Int16 => "int16",
            ScalarType::Int32 => "int32",
            ScalarType::Int64 => "int64",
            ScalarType::UInt8 => "uint8",
            ScalarType::UInt16 => "uint16",
            ScalarType::UInt32 => "uint32",
            ScalarType::UInt64 => "uint64",
            ScalarType::Float32 => "float32",
            ScalarType::Float64 => "float64",
            ScalarType::Int => "int",
            ScalarType::Float => "float",
        }
    }

    /// Accepts `float32` as well as the module-qualified `np.float32`
    pub fn from_name(name: &str) -> Option<Self> {
        let bare = name.rsplit('.').next().unwrap_or(name);
        Self::ALL.iter().copied().find(|t| t.name() == bare)
    }

    pub fn is_float(self) -> bool {
        matches!(self, ScalarType::Float32 | ScalarType::Float64 | ScalarType::Float)
    }
}

impl fmt::Display for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A constant bound where a value rather than a type is wanted
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConstValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl ConstValue {
    pub fn as_count(&self) -> Option<usize> {
        match self {
            ConstValue::Int(n) => usize::try_from(*n).ok(),
            _ => None,
        }
    }

    /// Literal text as it appears in a `DEF` line
    pub fn repr(&self) -> String {
        match self {
            ConstValue::Str(s) => format!("'{}'", s.replace('\\', "\\\\").replace('\'', "\\'")),
            other => other.to_string(),
        }
    }

    fn number(&self) -> Option<f64> {
        match self {
            ConstValue::Int(n) => Some(*n as f64),
            ConstValue::Float(x) => Some(*x),
            ConstValue::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            ConstValue::Str(_) => None,
        }
    }

    /// Numbers by value, anything else by text
    pub fn sort_cmp(&self, other: &Self) -> Ordering {
        match (self.number(), other.number()) {
            (Some(a), Some(b)) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
            _ => self.to_string().cmp(&other.to_string()),
        }
    }
}

impl fmt::Display for ConstValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstValue::Bool(true) => f.write_str("True"),
            ConstValue::Bool(false) => f.write_str("False"),
            ConstValue::Int(n) => write!(f, "{}", n),
            ConstValue::Float(x) if x.is_finite() && x.fract() == 0.0 => write!(f, "{:.1}", x),
            ConstValue::Float(x) => write!(f, "{}", x),
            ConstValue::Str(s) => f.write_str(s),
        }
    }
}

impl PartialEq for ConstValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (ConstValue::Bool(a), ConstValue::Bool(b)) => a == b,
            (ConstValue::Int(a), ConstValue::Int(b)) => a == b,
            (ConstValue::Float(a), ConstValue::Float(b)) => a.to_bits() == b.to_bits(),
            (ConstValue::Str(a), ConstValue::Str(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for ConstValue {}

impl Hash for ConstValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            ConstValue::Bool(b) => b.hash(state),
            ConstValue::Int(n) => n.hash(state),
            ConstValue::Float(x) => x.to_bits().hash(state),
            ConstValue::Str(s) => s.hash(state),
        }
    }
}

/// What a placeholder is bound to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TypeArg {
    Type(ScalarType),
    Obj(ConstValue),
}

impl TypeArg {
    pub fn typename(&self) -> TurboResult<&'static str> {
        match self {
            TypeArg::Type(t) => Ok(t.name()),
            TypeArg::Obj(_) => Err(TurboError::BadArg { arg: self.clone() }),
        }
    }

    pub fn scalar_type(&self) -> TurboResult<ScalarType> {
        match self {
            TypeArg::Type(t) => Ok(*t),
            TypeArg::Obj(_) => Err(TurboError::BadArg { arg: self.clone() }),
        }
    }

    pub fn discriminator(&self) -> String {
        match self {
            TypeArg::Type(t) => t.name().to_string(),
            TypeArg::Obj(o) => o.to_string(),
        }
    }
}

impl fmt::Display for TypeArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeArg::Type(t) => write!(f, "{}", t),
            TypeArg::Obj(o) => f.write_str(&o.repr()),
        }
    }
}

impl From<ScalarType> for TypeArg {
    fn from(t: ScalarType) -> Self {
        TypeArg::Type(t)
    }
}

impl From<ConstValue> for TypeArg {
    fn from(o: ConstValue) -> Self {
        TypeArg::Obj(o)
    }
}

impl From<i64> for TypeArg {
    fn from(n: i64) -> Self {
        TypeArg::Obj(ConstValue::Int(n))
    }
}

impl From<f64> for TypeArg {
    fn from(x: f64) -> Self {
        TypeArg::Obj(ConstValue::Float(x))
    }
}

impl From<bool> for TypeArg {
    fn from(b: bool) -> Self {
        TypeArg::Obj(ConstValue::Bool(b))
    }
}

impl From<&str> for TypeArg {
    fn from(s: &str) -> Self {
        TypeArg::Obj(ConstValue::Str(s.to_string()))
    }
}
