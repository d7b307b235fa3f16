use crate::error::{ModelError, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Four-part version: `major.minor.micro[.qualifier]`.
///
/// The qualifier is compared lexically; an absent qualifier sorts before any
/// non-empty one, so `1.2.3 < 1.2.3.rc1`.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
    pub micro: u32,
    pub qualifier: String,
}

impl Version {
    pub fn new(major: u32, minor: u32, micro: u32) -> Self {
        Self {
            major,
            minor,
            micro,
            qualifier: String::new(),
        }
    }

    pub fn with_qualifier(mut self, qualifier: &str) -> Self {
        self.qualifier = qualifier.to_string();
        self
    }

    /// The lowest possible version, `0.0.0`.
    pub fn zero() -> Self {
        Self::default()
    }

    pub fn parse(s: &str) -> Result<Self> {
        if s.is_empty() {
            return Err(ModelError::InvalidVersion(s.to_string()));
        }
        let mut parts = s.splitn(4, '.');
        let number = |part: Option<&str>| -> Result<u32> {
            match part {
                None => Ok(0),
                Some(p) => p
                    .parse::<u32>()
                    .map_err(|_| ModelError::InvalidVersion(s.to_string())),
            }
        };
        let major = number(parts.next())?;
        let minor = number(parts.next())?;
        let micro = number(parts.next())?;
        let qualifier = parts.next().unwrap_or("").to_string();
        Ok(Self {
            major,
            minor,
            micro,
            qualifier,
        })
    }
}

impl FromStr for Version {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.micro)?;
        if !self.qualifier.is_empty() {
            write!(f, ".{}", self.qualifier)?;
        }
        Ok(())
    }
}

/// An attribute value on a capability.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Value {
    Str(String),
    Long(i64),
    Bool(bool),
    Version(Version),
    List(Vec<Value>),
}

impl Value {
    pub fn str(s: &str) -> Self {
        Value::Str(s.to_string())
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_version(&self) -> Option<&Version> {
        match self {
            Value::Version(v) => Some(v),
            _ => None,
        }
    }

    /// Ordering between values of the same variant; `None` across variants.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
            (Value::Long(a), Value::Long(b)) => Some(a.cmp(b)),
            (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
            (Value::Version(a), Value::Version(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(s) => write!(f, "{}", s),
            Value::Long(n) => write!(f, "{}", n),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Version(v) => write!(f, "{}", v),
            Value::List(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{}", item)?;
                }
                Ok(())
            }
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<Version> for Value {
    fn from(v: Version) -> Self {
        Value::Version(v)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Long(n)
    }
}
