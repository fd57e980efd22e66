use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A single value in a feature's attribute bag.
///
/// This is a closed type: gazetteer sources only carry text, integer and
/// real columns, and absent columns are represented as `Null` rather than
/// being dropped from the bag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
}

impl AttrValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttrValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            AttrValue::Integer(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AttrValue::Real(x) => Some(*x),
            AttrValue::Integer(n) => Some(*n as f64),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, AttrValue::Null)
    }
}

impl std::fmt::Display for AttrValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AttrValue::Null => f.write_str("null"),
            AttrValue::Integer(n) => write!(f, "{n}"),
            AttrValue::Real(x) => write!(f, "{x}"),
            AttrValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for AttrValue {
    fn from(s: &str) -> Self {
        AttrValue::Text(s.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(s: String) -> Self {
        AttrValue::Text(s)
    }
}

impl From<i64> for AttrValue {
    fn from(n: i64) -> Self {
        AttrValue::Integer(n)
    }
}

impl From<f64> for AttrValue {
    fn from(x: f64) -> Self {
        AttrValue::Real(x)
    }
}

/// A canonical geographic record.
///
/// `(gazetteer, identifier)` is unique across the store, and a feature is
/// immutable once loaded. The attribute bag covers coordinates, population,
/// feature type and administrative hierarchy names, depending on what the
/// source gazetteer provides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    /// Name of the gazetteer this record belongs to.
    pub gazetteer: String,
    /// Identifier, unique within the gazetteer.
    pub identifier: String,
    /// Typed attribute map.
    pub attributes: BTreeMap<String, AttrValue>,
}

impl Feature {
    pub fn new(gazetteer: &str, identifier: &str) -> Self {
        Self {
            gazetteer: gazetteer.to_string(),
            identifier: identifier.to_string(),
            attributes: BTreeMap::new(),
        }
    }

    /// Look up an attribute; absent keys behave like `Null`.
    pub fn attr(&self, key: &str) -> &AttrValue {
        self.attributes.get(key).unwrap_or(&AttrValue::Null)
    }

    pub fn with_attr(mut self, key: &str, value: impl Into<AttrValue>) -> Self {
        self.attributes.insert(key.to_string(), value.into());
        self
    }
}

impl std::fmt::Display for Feature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.gazetteer, self.identifier)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attr_absent_is_null() {
        let feature = Feature::new("geonames", "2988507");
        assert!(feature.attr("population").is_null());
    }

    #[test]
    fn attr_accessors() {
        let feature = Feature::new("geonames", "2988507")
            .with_attr("name", "Paris")
            .with_attr("population", 2_138_551i64)
            .with_attr("latitude", 48.85341f64);

        assert_eq!(feature.attr("name").as_str(), Some("Paris"));
        assert_eq!(feature.attr("population").as_i64(), Some(2_138_551));
        assert_eq!(feature.attr("latitude").as_f64(), Some(48.85341));
        assert_eq!(feature.attr("name").as_i64(), None);
    }

    #[test]
    fn integer_widens_to_f64() {
        let v = AttrValue::Integer(7);
        assert_eq!(v.as_f64(), Some(7.0));
    }

    #[test]
    fn serde_round_trip_keeps_types() {
        let feature = Feature::new("geonames", "1")
            .with_attr("name", "Andorra la Vella")
            .with_attr("population", 20_430i64)
            .with_attr("elevation", AttrValue::Null);

        let json = serde_json::to_string(&feature).unwrap();
        let back: Feature = serde_json::from_str(&json).unwrap();
        assert_eq!(back, feature);
    }

    #[test]
    fn display_is_scoped_identifier() {
        let feature = Feature::new("geonames", "2988507");
        assert_eq!(feature.to_string(), "geonames:2988507");
    }
}
