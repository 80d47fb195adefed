use std::fmt;

#[derive(Debug)]
pub enum FcError {
    AttributeNotFound(String),
    TensorCreateError(String),
    TensorNotFound(String),
    ShapeMismatchError,
    UnsupportedOp(String),
    InvalidInputNo {
        expected: usize,
        found: usize,
    },
    InvalidType {
        expected: String,
        found: String,
    },
    IncompatibleShape {
        msg: String,
        expected: Vec<i64>,
        found: Vec<i64>,
    },
    OutputMismatch {
        name: String,
        expected: String,
    },
    Error(String),
}

impl fmt::Display for FcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FcError::AttributeNotFound(name) => write!(f, "attribute `{}` not found", name),
            FcError::TensorCreateError(msg) => write!(f, "cannot create tensor: {}", msg),
            FcError::TensorNotFound(name) => write!(f, "tensor `{}` not found", name),
            FcError::ShapeMismatchError => write!(f, "shape mismatch"),
            FcError::UnsupportedOp(name) => write!(f, "op `{}` is unsupported", name),
            FcError::InvalidInputNo { expected, found } => {
                write!(f, "expected {} inputs, found {}", expected, found)
            }
            FcError::InvalidType { expected, found } => {
                write!(f, "expected type {}, found {}", expected, found)
            }
            FcError::IncompatibleShape {
                msg,
                expected,
                found,
            } => write!(f, "{}: expected {:?}, found {:?}", msg, expected, found),
            FcError::OutputMismatch { name, expected } => write!(f, "{} {}", name, expected),
            FcError::Error(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for FcError {}
