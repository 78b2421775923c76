//! Artifact rules: the tagged tuples that constrain a step's materials
//! and products.
//!
//! Rules are written on disk as heterogeneous JSON arrays, e.g.
//! `["CREATE", "*.py"]` or `["MATCH", "PRODUCT", "foo", "FROM", "write-code"]`.
//! The leading keyword is normalized to upper case before dispatch; every
//! other element of the tuple (including `src_type` and the `FROM`/`AS`
//! connectors) is matched case-sensitively, exactly as written.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Which side of a link a `MATCH` rule reads from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum ArtifactSide {
    /// The referenced link's `materials`.
    #[serde(rename = "MATERIAL")]
    Material,
    /// The referenced link's `products`.
    #[serde(rename = "PRODUCT")]
    Product,
}

impl ArtifactSide {
    fn parse(raw: &str) -> Result<Self, RuleSyntaxError> {
        match raw {
            "MATERIAL" => Ok(Self::Material),
            "PRODUCT" => Ok(Self::Product),
            other => Err(RuleSyntaxError::BadSrcType {
                found: other.to_string(),
            }),
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::Material => "MATERIAL",
            Self::Product => "PRODUCT",
        }
    }
}

/// A single artifact rule, decoded from its tuple form.
#[derive(Debug, Clone, PartialEq, Eq, JsonSchema)]
pub enum Rule {
    /// `("CREATE", pattern)`
    Create {
        /// Glob pattern selecting newly-produced artifacts.
        pattern: String,
    },
    /// `("DELETE", pattern)`
    Delete {
        /// Glob pattern selecting artifacts claimed absent.
        pattern: String,
    },
    /// `("MODIFY", pattern)`
    Modify {
        /// Glob pattern selecting artifacts claimed changed.
        pattern: String,
    },
    /// `("MATCH", src_type, pattern, "FROM", step_name)`
    Match {
        /// Which side of the referenced link to compare against.
        src_type: ArtifactSide,
        /// Pattern applied to both the working queue and the target set.
        pattern: String,
        /// Name of the step or inspection the target set is drawn from.
        from_step: String,
    },
    /// `("MATCH", src_type, pattern, "AS", dst_pattern, "FROM", step_name)`
    MatchAs {
        /// Which side of the referenced link to compare against.
        src_type: ArtifactSide,
        /// Pattern applied to the working queue.
        pattern: String,
        /// Pattern the matched path is rewritten into before lookup in the
        /// target set (single-wildcard substitution).
        dst_pattern: String,
        /// Name of the step or inspection the target set is drawn from.
        from_step: String,
    },
}

/// A rule tuple was malformed: wrong arity, unknown keyword, or a bad
/// `src_type`/connector keyword.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RuleSyntaxError {
    /// The tuple's first element was not a recognized rule keyword.
    #[error("unrecognized rule keyword {found:?}")]
    UnknownKeyword {
        /// The keyword actually found, upper-cased.
        found: String,
    },
    /// `src_type` was not exactly `MATERIAL` or `PRODUCT`.
    #[error("src_type must be MATERIAL or PRODUCT, found {found:?}")]
    BadSrcType {
        /// The value actually found.
        found: String,
    },
    /// A `MATCH` tuple's connector keyword (`FROM`/`AS`) was wrong or missing.
    #[error("expected connector keyword {expected:?} at position {position}, found {found:?}")]
    BadConnector {
        /// The connector keyword required at this position.
        expected: &'static str,
        /// What was actually found.
        found: String,
        /// Tuple index where the mismatch occurred.
        position: usize,
    },
    /// The tuple had the wrong number of elements for its keyword.
    #[error("rule {keyword:?} expects {expected} elements, found {found}")]
    BadArity {
        /// The rule keyword.
        keyword: String,
        /// Number of elements required.
        expected: usize,
        /// Number of elements actually present.
        found: usize,
    },
    /// A tuple element was not a JSON string where one was required.
    #[error("rule element at position {position} must be a string")]
    NotAString {
        /// Tuple index of the offending element.
        position: usize,
    },
}

impl Rule {
    fn element_str<'a>(elements: &'a [Value], position: usize) -> Result<&'a str, RuleSyntaxError> {
        elements
            .get(position)
            .and_then(Value::as_str)
            .ok_or(RuleSyntaxError::NotAString { position })
    }

    fn expect_connector(elements: &[Value], position: usize, expected: &'static str) -> Result<(), RuleSyntaxError> {
        let found = Self::element_str(elements, position)?;
        if found == expected {
            Ok(())
        } else {
            Err(RuleSyntaxError::BadConnector {
                expected,
                found: found.to_string(),
                position,
            })
        }
    }

    /// Parse a rule from its JSON tuple representation.
    ///
    /// # Errors
    ///
    /// Returns [`RuleSyntaxError`] on an unrecognized keyword, wrong arity,
    /// a malformed `src_type`, or a missing/incorrect connector keyword.
    pub fn from_tuple(elements: &[Value]) -> Result<Self, RuleSyntaxError> {
        let keyword_raw = Self::element_str(elements, 0)?;
        let keyword = keyword_raw.to_ascii_uppercase();
        match keyword.as_str() {
            "CREATE" | "DELETE" | "MODIFY" => {
                if elements.len() != 2 {
                    return Err(RuleSyntaxError::BadArity {
                        keyword,
                        expected: 2,
                        found: elements.len(),
                    });
                }
                let pattern = Self::element_str(elements, 1)?.to_string();
                Ok(match keyword.as_str() {
                    "CREATE" => Self::Create { pattern },
                    "DELETE" => Self::Delete { pattern },
                    _ => Self::Modify { pattern },
                })
            }
            "MATCH" => match elements.len() {
                5 => {
                    let src_type = ArtifactSide::parse(Self::element_str(elements, 1)?)?;
                    let pattern = Self::element_str(elements, 2)?.to_string();
                    Self::expect_connector(elements, 3, "FROM")?;
                    let from_step = Self::element_str(elements, 4)?.to_string();
                    Ok(Self::Match {
                        src_type,
                        pattern,
                        from_step,
                    })
                }
                7 => {
                    let src_type = ArtifactSide::parse(Self::element_str(elements, 1)?)?;
                    let pattern = Self::element_str(elements, 2)?.to_string();
                    Self::expect_connector(elements, 3, "AS")?;
                    let dst_pattern = Self::element_str(elements, 4)?.to_string();
                    Self::expect_connector(elements, 5, "FROM")?;
                    let from_step = Self::element_str(elements, 6)?.to_string();
                    Ok(Self::MatchAs {
                        src_type,
                        pattern,
                        dst_pattern,
                        from_step,
                    })
                }
                other => Err(RuleSyntaxError::BadArity {
                    keyword: "MATCH".into(),
                    expected: 5,
                    found: other,
                }),
            },
            other => Err(RuleSyntaxError::UnknownKeyword {
                found: other.to_string(),
            }),
        }
    }

    /// Render this rule back into its JSON tuple representation.
    #[must_use]
    pub fn to_tuple(&self) -> Vec<Value> {
        match self {
            Self::Create { pattern } => vec![Value::from("CREATE"), Value::from(pattern.clone())],
            Self::Delete { pattern } => vec![Value::from("DELETE"), Value::from(pattern.clone())],
            Self::Modify { pattern } => vec![Value::from("MODIFY"), Value::from(pattern.clone())],
            Self::Match {
                src_type,
                pattern,
                from_step,
            } => vec![
                Value::from("MATCH"),
                Value::from(src_type.as_str()),
                Value::from(pattern.clone()),
                Value::from("FROM"),
                Value::from(from_step.clone()),
            ],
            Self::MatchAs {
                src_type,
                pattern,
                dst_pattern,
                from_step,
            } => vec![
                Value::from("MATCH"),
                Value::from(src_type.as_str()),
                Value::from(pattern.clone()),
                Value::from("AS"),
                Value::from(dst_pattern.clone()),
                Value::from("FROM"),
                Value::from(from_step.clone()),
            ],
        }
    }
}

impl Serialize for Rule {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.to_tuple().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Rule {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let elements = Vec::<Value>::deserialize(deserializer)?;
        Self::from_tuple(&elements).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tuple(v: Value) -> Vec<Value> {
        v.as_array().unwrap().clone()
    }

    #[test]
    fn parses_create() {
        let rule = Rule::from_tuple(&tuple(json!(["CREATE", "*.py"]))).unwrap();
        assert_eq!(
            rule,
            Rule::Create {
                pattern: "*.py".into()
            }
        );
    }

    #[test]
    fn keyword_case_is_normalized() {
        let upper = Rule::from_tuple(&tuple(json!(["CREATE", "foo"]))).unwrap();
        let lower = Rule::from_tuple(&tuple(json!(["create", "foo"]))).unwrap();
        let mixed = Rule::from_tuple(&tuple(json!(["CrEaTe", "foo"]))).unwrap();
        assert_eq!(upper, lower);
        assert_eq!(upper, mixed);
    }

    #[test]
    fn src_type_is_case_sensitive() {
        let err = Rule::from_tuple(&tuple(json!(["MATCH", "material", "foo", "FROM", "x"]))).unwrap_err();
        assert!(matches!(err, RuleSyntaxError::BadSrcType { .. }));
    }

    #[test]
    fn parses_match_from() {
        let rule =
            Rule::from_tuple(&tuple(json!(["MATCH", "PRODUCT", "foo", "FROM", "write-code"]))).unwrap();
        assert_eq!(
            rule,
            Rule::Match {
                src_type: ArtifactSide::Product,
                pattern: "foo".into(),
                from_step: "write-code".into(),
            }
        );
    }

    #[test]
    fn parses_match_as() {
        let rule = Rule::from_tuple(&tuple(json!([
            "MATCH", "MATERIAL", "src/*", "AS", "dst/*", "FROM", "build"
        ])))
        .unwrap();
        assert_eq!(
            rule,
            Rule::MatchAs {
                src_type: ArtifactSide::Material,
                pattern: "src/*".into(),
                dst_pattern: "dst/*".into(),
                from_step: "build".into(),
            }
        );
    }

    #[test]
    fn rejects_wrong_connector() {
        let err = Rule::from_tuple(&tuple(json!(["MATCH", "PRODUCT", "foo", "WITH", "x"]))).unwrap_err();
        assert!(matches!(err, RuleSyntaxError::BadConnector { .. }));
    }

    #[test]
    fn rejects_unknown_keyword() {
        let err = Rule::from_tuple(&tuple(json!(["REPLACE", "foo"]))).unwrap_err();
        assert!(matches!(err, RuleSyntaxError::UnknownKeyword { .. }));
    }

    #[test]
    fn rejects_wrong_arity() {
        let err = Rule::from_tuple(&tuple(json!(["CREATE", "foo", "bar"]))).unwrap_err();
        assert!(matches!(err, RuleSyntaxError::BadArity { .. }));
    }

    #[test]
    fn roundtrips_through_tuple_form() {
        let rule = Rule::MatchAs {
            src_type: ArtifactSide::Material,
            pattern: "a".into(),
            dst_pattern: "b".into(),
            from_step: "c".into(),
        };
        let tuple_form = rule.to_tuple();
        assert_eq!(Rule::from_tuple(&tuple_form).unwrap(), rule);
    }

    #[test]
    fn roundtrips_through_serde_json() {
        let rule = Rule::Match {
            src_type: ArtifactSide::Product,
            pattern: "foo".into(),
            from_step: "write-code".into(),
        };
        let encoded = serde_json::to_string(&rule).unwrap();
        let decoded: Rule = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, rule);
    }
}
