//! Tensor values as stored in checkpoints.
//!
//! Data is kept flat and row-major. Floating dtypes are widened to `f64` so
//! that `float16`/`bfloat16`/`float32` values written by the training side
//! survive a JSON round trip exactly.

use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use thiserror::Error;

/// Element type of a tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DType {
    Float16,
    BFloat16,
    Float32,
    Float64,
    Int32,
    Int64,
    UInt8,
    Bool,
}

/// How values of a dtype are compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementKind {
    Float,
    Int,
    Bool,
}

impl DType {
    pub fn kind(self) -> ElementKind {
        match self {
            Self::Float16 | Self::BFloat16 | Self::Float32 | Self::Float64 => ElementKind::Float,
            Self::Int32 | Self::Int64 | Self::UInt8 => ElementKind::Int,
            Self::Bool => ElementKind::Bool,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Float16 => "float16",
            Self::BFloat16 => "bfloat16",
            Self::Float32 => "float32",
            Self::Float64 => "float64",
            Self::Int32 => "int32",
            Self::Int64 => "int64",
            Self::UInt8 => "uint8",
            Self::Bool => "bool",
        }
    }

    fn int_range(self) -> Option<(i64, i64)> {
        match self {
            Self::Int32 => Some((i32::MIN as i64, i32::MAX as i64)),
            Self::UInt8 => Some((0, u8::MAX as i64)),
            _ => None,
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Flat tensor storage.
#[derive(Debug, Clone, PartialEq)]
pub enum TensorData {
    Float(Vec<f64>),
    Int(Vec<i64>),
    Bool(Vec<bool>),
}

impl TensorData {
    pub fn len(&self) -> usize {
        match self {
            Self::Float(v) => v.len(),
            Self::Int(v) => v.len(),
            Self::Bool(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn kind(&self) -> ElementKind {
        match self {
            Self::Float(_) => ElementKind::Float,
            Self::Int(_) => ElementKind::Int,
            Self::Bool(_) => ElementKind::Bool,
        }
    }
}

/// Reasons a tensor is malformed.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TensorError {
    #[error("shape {shape:?} needs {expected} elements, found {found}")]
    ElementCount {
        shape: Vec<usize>,
        expected: usize,
        found: usize,
    },

    #[error("shape {0:?} has too many elements")]
    ShapeOverflow(Vec<usize>),

    #[error("dtype {dtype} cannot hold {found} values")]
    KindMismatch { dtype: DType, found: &'static str },

    #[error("value {value} out of range for {dtype}")]
    OutOfRange { dtype: DType, value: i64 },

    #[error("unrecognised float token {0:?} (expected \"NaN\", \"inf\" or \"-inf\")")]
    BadToken(String),
}

/// A named parameter's value: dtype, shape and row-major data.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "RawTensor")]
pub struct Tensor {
    dtype: DType,
    shape: Vec<usize>,
    data: TensorData,
}

impl Tensor {
    pub fn new(dtype: DType, shape: Vec<usize>, data: TensorData) -> Result<Self, TensorError> {
        if dtype.kind() != data.kind() {
            return Err(TensorError::KindMismatch {
                dtype,
                found: kind_name(data.kind()),
            });
        }
        let Some(expected) = element_count(&shape) else {
            return Err(TensorError::ShapeOverflow(shape));
        };
        if expected != data.len() {
            return Err(TensorError::ElementCount {
                shape,
                expected,
                found: data.len(),
            });
        }
        if let (Some((lo, hi)), TensorData::Int(values)) = (dtype.int_range(), &data) {
            if let Some(&value) = values.iter().find(|v| **v < lo || **v > hi) {
                return Err(TensorError::OutOfRange { dtype, value });
            }
        }
        Ok(Self { dtype, shape, data })
    }

    /// One-dimensional `float32` tensor.
    pub fn from_f32s(values: &[f32]) -> Self {
        Self {
            dtype: DType::Float32,
            shape: vec![values.len()],
            data: TensorData::Float(values.iter().map(|v| f64::from(*v)).collect()),
        }
    }

    /// One-dimensional `float64` tensor.
    pub fn from_f64s(values: Vec<f64>) -> Self {
        Self {
            dtype: DType::Float64,
            shape: vec![values.len()],
            data: TensorData::Float(values),
        }
    }

    /// One-dimensional `int64` tensor.
    pub fn from_i64s(values: Vec<i64>) -> Self {
        Self {
            dtype: DType::Int64,
            shape: vec![values.len()],
            data: TensorData::Int(values),
        }
    }

    /// Zero-dimensional `float64` tensor.
    pub fn scalar(value: f64) -> Self {
        Self {
            dtype: DType::Float64,
            shape: Vec::new(),
            data: TensorData::Float(vec![value]),
        }
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn data(&self) -> &TensorData {
        &self.data
    }

    pub fn numel(&self) -> usize {
        self.data.len()
    }

    /// Mutable access to float storage, for producers building perturbed copies.
    pub fn float_data_mut(&mut self) -> Option<&mut Vec<f64>> {
        match &mut self.data {
            TensorData::Float(v) => Some(v),
            _ => None,
        }
    }
}

fn element_count(shape: &[usize]) -> Option<usize> {
    shape.iter().try_fold(1usize, |n, &dim| n.checked_mul(dim))
}

fn kind_name(kind: ElementKind) -> &'static str {
    match kind {
        ElementKind::Float => "floating-point",
        ElementKind::Int => "integer",
        ElementKind::Bool => "boolean",
    }
}

impl Serialize for Tensor {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("Tensor", 3)?;
        state.serialize_field("dtype", &self.dtype)?;
        state.serialize_field("shape", &self.shape)?;
        match &self.data {
            TensorData::Float(values) => state.serialize_field("data", &FloatSeq(values))?,
            TensorData::Int(values) => state.serialize_field("data", values)?,
            TensorData::Bool(values) => state.serialize_field("data", values)?,
        }
        state.end()
    }
}

struct FloatSeq<'a>(&'a [f64]);

impl Serialize for FloatSeq<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.0.iter().map(|v| FloatRepr(*v)))
    }
}

struct FloatRepr(f64);

impl Serialize for FloatRepr {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        float_token::serialize(&self.0, serializer)
    }
}

/// On-disk shape of a tensor before validation.
#[derive(Deserialize)]
struct RawTensor {
    dtype: DType,
    /// Omitted shape means a flat vector.
    #[serde(default)]
    shape: Option<Vec<usize>>,
    data: Vec<RawElement>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawElement {
    Bool(bool),
    Int(i64),
    Float(f64),
    Token(String),
}

impl TryFrom<RawTensor> for Tensor {
    type Error = TensorError;

    fn try_from(raw: RawTensor) -> Result<Self, Self::Error> {
        let shape = raw.shape.unwrap_or_else(|| vec![raw.data.len()]);
        let data = match raw.dtype.kind() {
            ElementKind::Float => TensorData::Float(
                raw.data
                    .into_iter()
                    .map(|e| match e {
                        RawElement::Float(v) => Ok(v),
                        RawElement::Int(v) => Ok(v as f64),
                        RawElement::Token(t) => float_token::parse(&t),
                        RawElement::Bool(_) => Err(TensorError::KindMismatch {
                            dtype: raw.dtype,
                            found: "boolean",
                        }),
                    })
                    .collect::<Result<_, _>>()?,
            ),
            ElementKind::Int => TensorData::Int(
                raw.data
                    .into_iter()
                    .map(|e| match e {
                        RawElement::Int(v) => Ok(v),
                        RawElement::Float(_) | RawElement::Token(_) => {
                            Err(TensorError::KindMismatch {
                                dtype: raw.dtype,
                                found: "floating-point",
                            })
                        }
                        RawElement::Bool(_) => Err(TensorError::KindMismatch {
                            dtype: raw.dtype,
                            found: "boolean",
                        }),
                    })
                    .collect::<Result<_, _>>()?,
            ),
            ElementKind::Bool => TensorData::Bool(
                raw.data
                    .into_iter()
                    .map(|e| match e {
                        RawElement::Bool(v) => Ok(v),
                        _ => Err(TensorError::KindMismatch {
                            dtype: raw.dtype,
                            found: "numeric",
                        }),
                    })
                    .collect::<Result<_, _>>()?,
            ),
        };
        Tensor::new(raw.dtype, shape, data)
    }
}

/// Serde adapter writing non-finite floats as `"NaN"`, `"inf"`, `"-inf"`.
pub mod float_token {
    use super::TensorError;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        if value.is_nan() {
            serializer.serialize_str("NaN")
        } else if value.is_infinite() {
            serializer.serialize_str(if *value > 0.0 { "inf" } else { "-inf" })
        } else {
            serializer.serialize_f64(*value)
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Number(f64),
            Token(String),
        }
        match Repr::deserialize(deserializer)? {
            Repr::Number(v) => Ok(v),
            Repr::Token(t) => parse(&t).map_err(serde::de::Error::custom),
        }
    }

    pub(crate) fn parse(token: &str) -> Result<f64, TensorError> {
        match token {
            "NaN" | "nan" => Ok(f64::NAN),
            "inf" | "Infinity" => Ok(f64::INFINITY),
            "-inf" | "-Infinity" => Ok(f64::NEG_INFINITY),
            other => Err(TensorError::BadToken(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_float_tensor() {
        let json = r#"{"dtype": "float32", "shape": [2, 2], "data": [1.0, 2, -0.5, 4.25]}"#;
        let t: Tensor = serde_json::from_str(json).unwrap();
        assert_eq!(t.dtype(), DType::Float32);
        assert_eq!(t.shape(), &[2, 2]);
        assert_eq!(t.data(), &TensorData::Float(vec![1.0, 2.0, -0.5, 4.25]));
    }

    #[test]
    fn test_non_finite_tokens_roundtrip() {
        let t = Tensor::from_f64s(vec![f64::NAN, f64::INFINITY, f64::NEG_INFINITY, 1.5]);
        let json = serde_json::to_string(&t).unwrap();
        assert!(json.contains(r#"["NaN","inf","-inf",1.5]"#));

        let back: Tensor = serde_json::from_str(&json).unwrap();
        match back.data() {
            TensorData::Float(v) => {
                assert!(v[0].is_nan());
                assert_eq!(v[1], f64::INFINITY);
                assert_eq!(v[2], f64::NEG_INFINITY);
                assert_eq!(v[3], 1.5);
            }
            other => panic!("unexpected data {other:?}"),
        }
    }

    #[test]
    fn test_scalar_shape() {
        let json = r#"{"dtype": "int64", "shape": [], "data": [7]}"#;
        let t: Tensor = serde_json::from_str(json).unwrap();
        assert_eq!(t.numel(), 1);
        assert!(t.shape().is_empty());
    }

    #[test]
    fn test_missing_shape_means_vector() {
        let json = r#"{"dtype": "float64", "data": [1.0, 2.0, 3.0]}"#;
        let t: Tensor = serde_json::from_str(json).unwrap();
        assert_eq!(t.shape(), &[3]);
    }

    #[test]
    fn test_element_count_mismatch_rejected() {
        let json = r#"{"dtype": "float32", "shape": [3], "data": [1.0, 2.0]}"#;
        let err = serde_json::from_str::<Tensor>(json).unwrap_err();
        assert!(err.to_string().contains("needs 3 elements"));
    }

    #[test]
    fn test_shape_overflow_rejected() {
        let json = r#"{"dtype": "float32", "shape": [4294967296, 4294967296], "data": []}"#;
        let err = serde_json::from_str::<Tensor>(json).unwrap_err();
        assert!(err.to_string().contains("too many elements"));

        let err = Tensor::new(
            DType::Float64,
            vec![usize::MAX, 2],
            TensorData::Float(Vec::new()),
        )
        .unwrap_err();
        assert_eq!(err, TensorError::ShapeOverflow(vec![usize::MAX, 2]));
    }

    #[test]
    fn test_kind_mismatch_rejected() {
        let json = r#"{"dtype": "int32", "shape": [1], "data": [1.5]}"#;
        assert!(serde_json::from_str::<Tensor>(json).is_err());

        let json = r#"{"dtype": "bool", "shape": [1], "data": [1]}"#;
        assert!(serde_json::from_str::<Tensor>(json).is_err());
    }

    #[test]
    fn test_int_range_enforced() {
        let json = r#"{"dtype": "uint8", "shape": [2], "data": [0, 256]}"#;
        let err = serde_json::from_str::<Tensor>(json).unwrap_err();
        assert!(err.to_string().contains("out of range for uint8"));
    }

    #[test]
    fn test_bad_token_rejected() {
        let json = r#"{"dtype": "float64", "shape": [1], "data": ["infinity-ish"]}"#;
        assert!(serde_json::from_str::<Tensor>(json).is_err());
    }

    #[test]
    fn test_new_validates_kind() {
        let err = Tensor::new(DType::Float32, vec![1], TensorData::Int(vec![1])).unwrap_err();
        assert_eq!(
            err,
            TensorError::KindMismatch {
                dtype: DType::Float32,
                found: "integer"
            }
        );
    }

    #[test]
    fn test_dtype_names() {
        assert_eq!(DType::BFloat16.to_string(), "bfloat16");
        assert_eq!(
            serde_json::to_string(&DType::UInt8).unwrap(),
            "\"uint8\""
        );
    }
}
