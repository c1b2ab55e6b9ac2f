//! Runtime argument model
//!
//! Compiled kernels are called with these: typed scalars, dense N-dimensional
//! buffers with an element type, and objects carrying named attributes.

use std::collections::BTreeMap;

use crate::types::ScalarType;

/// A number as held by a scalar or a buffer element
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    pub fn as_f64(self) -> f64 {
        match self {
            Number::Int(n) => n as f64,
            Number::Float(x) => x,
        }
    }

    pub fn as_i64(self) -> i64 {
        match self {
            Number::Int(n) => n,
            Number::Float(x) => x as i64,
        }
    }
}

/// A scalar that knows its runtime type
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Scalar {
    pub ty: ScalarType,
    pub number: Number,
}

/// Dense row-major buffer
#[derive(Debug, Clone, PartialEq)]
pub struct Array {
    pub dtype: ScalarType,
    pub shape: Vec<usize>,
    pub data: Vec<f64>,
}

impl Array {
    pub fn zeros(dtype: ScalarType, shape: &[usize]) -> Self {
        let len = shape.iter().product();
        Self {
            dtype,
            shape: shape.to_vec(),
            data: vec![0.0; len],
        }
    }

    pub fn from_vec(dtype: ScalarType, data: Vec<f64>) -> Self {
        Self {
            dtype,
            shape: vec![data.len()],
            data,
        }
    }

    /// `0, 1, ..., n - 1` scaled by `step`
    pub fn arange(dtype: ScalarType, n: usize, step: f64) -> Self {
        Self::from_vec(dtype, (0..n).map(|i| i as f64 * step).collect())
    }

    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// An object with attributes, used for `self` and struct-like arguments
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Object {
    pub fields: BTreeMap<String, Value>,
}

impl Object {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &str, value: Value) -> Self {
        self.fields.insert(name.to_string(), value);
        self
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub enum Value {
    #[default]
    None,
    Scalar(Scalar),
    Array(Array),
    Object(Object),
}

impl Value {
    /// A plain host integer
    pub fn int(n: i64) -> Self {
        Value::Scalar(Scalar {
            ty: ScalarType::Int,
            number: Number::Int(n),
        })
    }

    /// A plain host float
    pub fn float(x: f64) -> Self {
        Value::Scalar(Scalar {
            ty: ScalarType::Float,
            number: Number::Float(x),
        })
    }

    pub fn typed(ty: ScalarType, x: f64) -> Self {
        let number = if ty.is_float() {
            Number::Float(x)
        } else {
            Number::Int(x as i64)
        };
        Value::Scalar(Scalar { ty, number })
    }

    pub fn as_number(&self) -> Option<Number> {
        match self {
            Value::Scalar(s) => Some(s.number),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&Array> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_array_mut(&mut self) -> Option<&mut Array> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Object> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Value::None => "None",
            Value::Scalar(_) => "scalar",
            Value::Array(_) => "ndarray",
            Value::Object(_) => "object",
        }
    }
}

impl From<Array> for Value {
    fn from(a: Array) -> Self {
        Value::Array(a)
    }
}

impl From<Object> for Value {
    fn from(o: Object) -> Self {
        Value::Object(o)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typed_scalar() {
        let v = Value::typed(ScalarType::Int8, 10.7);
        assert_eq!(v.as_number(), Some(Number::Int(10)));
        let v = Value::typed(ScalarType::Float32, 1.5);
        assert_eq!(v.as_number(), Some(Number::Float(1.5)));
    }

    #[test]
    fn test_array_shape() {
        let a = Array::zeros(ScalarType::Float32, &[2, 3]);
        assert_eq!(a.ndim(), 2);
        assert_eq!(a.len(), 6);
        let b = Array::arange(ScalarType::Int32, 4, 2.0);
        assert_eq!(b.data, vec![0.0, 2.0, 4.0, 6.0]);
    }
}
