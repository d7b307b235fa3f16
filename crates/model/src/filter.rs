use crate::value::{Value, Version};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

pub type Attributes = BTreeMap<String, Value>;
pub type Directives = BTreeMap<String, String>;

/// A predicate over capability attributes.
///
/// Requirements carry a filter; a capability satisfies the requirement when
/// it lives in the same namespace and its attributes match the filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Filter {
    /// Matches any attribute map. Used by wildcard dynamic imports.
    Any,
    Present(String),
    Eq(String, Value),
    Gte(String, Value),
    Lte(String, Value),
    Not(Box<Filter>),
    And(Vec<Filter>),
    Or(Vec<Filter>),
}

impl Filter {
    pub fn matches(&self, attrs: &Attributes) -> bool {
        match self {
            Filter::Any => true,
            Filter::Present(key) => attrs.contains_key(key),
            Filter::Eq(key, value) => attrs.get(key) == Some(value),
            Filter::Gte(key, value) => cmp_attr(attrs, key, value)
                .map(|o| o != Ordering::Less)
                .unwrap_or(false),
            Filter::Lte(key, value) => cmp_attr(attrs, key, value)
                .map(|o| o != Ordering::Greater)
                .unwrap_or(false),
            Filter::Not(inner) => !inner.matches(attrs),
            Filter::And(inner) => inner.iter().all(|f| f.matches(attrs)),
            Filter::Or(inner) => inner.iter().any(|f| f.matches(attrs)),
        }
    }

    /// Filter for a version attribute within `[min, max)`, or `[min, ∞)`
    /// when no upper bound is given.
    pub fn version_range(key: &str, min: Version, max: Option<Version>) -> Filter {
        let lower = Filter::Gte(key.to_string(), Value::Version(min));
        match max {
            None => lower,
            Some(max) => Filter::And(vec![
                lower,
                Filter::Not(Box::new(Filter::Gte(key.to_string(), Value::Version(max)))),
            ]),
        }
    }
}

fn cmp_attr(attrs: &Attributes, key: &str, value: &Value) -> Option<Ordering> {
    attrs.get(key).and_then(|actual| actual.compare(value))
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Filter::Any => write!(f, "(*)"),
            Filter::Present(key) => write!(f, "({}=*)", key),
            Filter::Eq(key, value) => write!(f, "({}={})", key, value),
            Filter::Gte(key, value) => write!(f, "({}>={})", key, value),
            Filter::Lte(key, value) => write!(f, "({}<={})", key, value),
            Filter::Not(inner) => write!(f, "(!{})", inner),
            Filter::And(inner) => {
                write!(f, "(&")?;
                for filter in inner {
                    write!(f, "{}", filter)?;
                }
                write!(f, ")")
            }
            Filter::Or(inner) => {
                write!(f, "(|")?;
                for filter in inner {
                    write!(f, "{}", filter)?;
                }
                write!(f, ")")
            }
        }
    }
}
