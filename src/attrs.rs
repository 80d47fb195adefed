use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::FcError;
use crate::errors::FcError::InvalidType;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Attribute {
    Bool(bool),
    Int(i64),
    Float(f32),
    Floats(Vec<f32>),
    String(String),
}

impl Attribute {
    pub fn type_name(&self) -> &'static str {
        match self {
            Attribute::Bool(_) => "bool",
            Attribute::Int(_) => "int",
            Attribute::Float(_) => "float",
            Attribute::Floats(_) => "floats",
            Attribute::String(_) => "string",
        }
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Attribute::Bool(v) => write!(f, "{}", v),
            Attribute::Int(v) => write!(f, "{}", v),
            Attribute::Float(v) => write!(f, "{}", v),
            Attribute::Floats(v) => write!(f, "{:?}", v),
            Attribute::String(v) => write!(f, "{:?}", v),
        }
    }
}

impl From<bool> for Attribute {
    fn from(v: bool) -> Self {
        Attribute::Bool(v)
    }
}

impl From<i32> for Attribute {
    fn from(v: i32) -> Self {
        Attribute::Int(v as i64)
    }
}

impl From<i64> for Attribute {
    fn from(v: i64) -> Self {
        Attribute::Int(v)
    }
}

impl From<f32> for Attribute {
    fn from(v: f32) -> Self {
        Attribute::Float(v)
    }
}

impl From<f64> for Attribute {
    fn from(v: f64) -> Self {
        Attribute::Float(v as f32)
    }
}

impl From<Vec<f32>> for Attribute {
    fn from(v: Vec<f32>) -> Self {
        Attribute::Floats(v)
    }
}

impl From<&str> for Attribute {
    fn from(v: &str) -> Self {
        Attribute::String(v.to_string())
    }
}

impl From<String> for Attribute {
    fn from(v: String) -> Self {
        Attribute::String(v)
    }
}

/// Named operator configuration, handed to operators opaquely.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AttributeMap(BTreeMap<String, Attribute>);

impl AttributeMap {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    pub fn insert(&mut self, name: &str, value: impl Into<Attribute>) {
        self.0.insert(name.to_string(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&Attribute> {
        self.0.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Attribute)> {
        self.0.iter()
    }

    pub fn get_bool(&self, name: &str, default: bool) -> Result<bool, FcError> {
        match self.0.get(name) {
            None => Ok(default),
            Some(Attribute::Bool(v)) => Ok(*v),
            Some(other) => Err(mismatch(name, "bool", other)),
        }
    }

    pub fn get_int(&self, name: &str, default: i64) -> Result<i64, FcError> {
        match self.0.get(name) {
            None => Ok(default),
            Some(Attribute::Int(v)) => Ok(*v),
            Some(other) => Err(mismatch(name, "int", other)),
        }
    }

    /// Integers are accepted for float attributes.
    pub fn get_float(&self, name: &str, default: f32) -> Result<f32, FcError> {
        match self.0.get(name) {
            None => Ok(default),
            Some(Attribute::Float(v)) => Ok(*v),
            Some(Attribute::Int(v)) => Ok(*v as f32),
            Some(other) => Err(mismatch(name, "float", other)),
        }
    }

    pub fn get_floats(&self, name: &str, default: Vec<f32>) -> Result<Vec<f32>, FcError> {
        match self.0.get(name) {
            None => Ok(default),
            Some(Attribute::Floats(v)) => Ok(v.clone()),
            Some(Attribute::Float(v)) => Ok(vec![*v]),
            Some(other) => Err(mismatch(name, "floats", other)),
        }
    }

    pub fn get_string(&self, name: &str, default: &str) -> Result<String, FcError> {
        match self.0.get(name) {
            None => Ok(default.to_string()),
            Some(Attribute::String(v)) => Ok(v.clone()),
            Some(other) => Err(mismatch(name, "string", other)),
        }
    }
}

fn mismatch(name: &str, expected: &str, found: &Attribute) -> FcError {
    InvalidType {
        expected: format!("{} for attribute `{}`", expected, name),
        found: found.type_name().to_string(),
    }
}

impl FromIterator<(String, Attribute)> for AttributeMap {
    fn from_iter<I: IntoIterator<Item = (String, Attribute)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
