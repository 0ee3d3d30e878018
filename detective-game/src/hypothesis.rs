//! Root-cause assertions shared by ground truth and player hypotheses.
//!
//! A root cause is a sum type over cause categories, each with its own entity
//! fields. Equality is total and order-independent: same category and the
//! same entity fields after trimming whitespace and ignoring ASCII case.
use serde::{Deserialize, Serialize};
use serde_json::Value;
use smallvec::{SmallVec, smallvec};
use std::fmt;
use thiserror::Error;

/// Cause categories a mission can be solved with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CauseCategory {
    Supplier,
    Warehouse,
    Route,
}

impl CauseCategory {
    pub const ALL: [Self; 3] = [Self::Supplier, Self::Warehouse, Self::Route];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Supplier => "supplier",
            Self::Warehouse => "warehouse",
            Self::Route => "route",
        }
    }

    /// Parse a category name, ignoring surrounding whitespace and ASCII case.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(raw.trim()))
    }

    /// Entity fields carried by this category, in canonical order.
    #[must_use]
    pub const fn fields(self) -> &'static [&'static str] {
        match self {
            Self::Supplier | Self::Warehouse => &["entity"],
            Self::Route => &["origin", "destination"],
        }
    }
}

impl fmt::Display for CauseCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reasons a JSON value is not a valid root cause.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HypothesisError {
    #[error("hypothesis must be a JSON object")]
    NotAnObject,
    #[error("hypothesis is missing its category")]
    MissingCategory,
    #[error("unknown cause category '{0}'")]
    UnknownCategory(String),
    #[error("{category} hypothesis is missing field '{field}'")]
    MissingField {
        category: CauseCategory,
        field: &'static str,
    },
    #[error("{category} hypothesis field '{field}' must be a string")]
    WrongType {
        category: CauseCategory,
        field: &'static str,
    },
    #[error("{category} hypothesis field '{field}' must not be empty")]
    EmptyField {
        category: CauseCategory,
        field: &'static str,
    },
}

/// A structured root-cause assertion.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "category", rename_all = "snake_case", try_from = "Value")]
pub enum RootCause {
    Supplier { entity: String },
    Warehouse { entity: String },
    Route { origin: String, destination: String },
}

pub(crate) fn same_entity(a: &str, b: &str) -> bool {
    a.trim().eq_ignore_ascii_case(b.trim())
}

impl RootCause {
    #[must_use]
    pub fn supplier(entity: impl Into<String>) -> Self {
        Self::Supplier {
            entity: entity.into(),
        }
    }

    #[must_use]
    pub fn warehouse(entity: impl Into<String>) -> Self {
        Self::Warehouse {
            entity: entity.into(),
        }
    }

    #[must_use]
    pub fn route(origin: impl Into<String>, destination: impl Into<String>) -> Self {
        Self::Route {
            origin: origin.into(),
            destination: destination.into(),
        }
    }

    /// Parse and validate a tagged JSON hypothesis. Unknown extra keys are
    /// ignored.
    ///
    /// # Errors
    ///
    /// Returns an error when the value is not an object, names no known
    /// category, or lacks a non-empty string for one of its entity fields.
    pub fn from_value(value: &Value) -> Result<Self, HypothesisError> {
        let object = value.as_object().ok_or(HypothesisError::NotAnObject)?;
        let raw_category = match object.get("category") {
            None | Some(Value::Null) => return Err(HypothesisError::MissingCategory),
            Some(Value::String(s)) => s.as_str(),
            Some(other) => return Err(HypothesisError::UnknownCategory(other.to_string())),
        };
        let category = CauseCategory::parse(raw_category)
            .ok_or_else(|| HypothesisError::UnknownCategory(raw_category.to_string()))?;

        let field = |name: &'static str| -> Result<String, HypothesisError> {
            match object.get(name) {
                None | Some(Value::Null) => Err(HypothesisError::MissingField {
                    category,
                    field: name,
                }),
                Some(Value::String(s)) if s.trim().is_empty() => Err(HypothesisError::EmptyField {
                    category,
                    field: name,
                }),
                Some(Value::String(s)) => Ok(s.trim().to_string()),
                Some(_) => Err(HypothesisError::WrongType {
                    category,
                    field: name,
                }),
            }
        };

        Ok(match category {
            CauseCategory::Supplier => Self::Supplier {
                entity: field("entity")?,
            },
            CauseCategory::Warehouse => Self::Warehouse {
                entity: field("entity")?,
            },
            CauseCategory::Route => Self::Route {
                origin: field("origin")?,
                destination: field("destination")?,
            },
        })
    }

    #[must_use]
    pub const fn category(&self) -> CauseCategory {
        match self {
            Self::Supplier { .. } => CauseCategory::Supplier,
            Self::Warehouse { .. } => CauseCategory::Warehouse,
            Self::Route { .. } => CauseCategory::Route,
        }
    }

    /// `(field, value)` pairs in the category's canonical order.
    #[must_use]
    pub fn fields(&self) -> SmallVec<[(&'static str, &str); 2]> {
        match self {
            Self::Supplier { entity } | Self::Warehouse { entity } => {
                smallvec![("entity", entity.as_str())]
            }
            Self::Route {
                origin,
                destination,
            } => smallvec![("origin", origin.as_str()), ("destination", destination.as_str())],
        }
    }

    #[must_use]
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields()
            .into_iter()
            .find(|(field, _)| *field == name)
            .map(|(_, value)| value)
    }

    /// Human-readable entity label, e.g. `Acme` or `Chicago -> Denver`.
    #[must_use]
    pub fn entity_label(&self) -> String {
        match self {
            Self::Supplier { entity } | Self::Warehouse { entity } => entity.clone(),
            Self::Route {
                origin,
                destination,
            } => format!("{origin} -> {destination}"),
        }
    }

    #[must_use]
    pub fn same_category(&self, other: &Self) -> bool {
        self.category() == other.category()
    }
}

impl PartialEq for RootCause {
    fn eq(&self, other: &Self) -> bool {
        self.same_category(other)
            && self
                .fields()
                .iter()
                .zip(other.fields().iter())
                .all(|((_, a), (_, b))| same_entity(a, b))
    }
}

impl Eq for RootCause {}

impl TryFrom<Value> for RootCause {
    type Error = HypothesisError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        Self::from_value(&value)
    }
}

impl fmt::Display for RootCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.category(), self.entity_label())
    }
}
