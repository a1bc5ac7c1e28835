//! Fan-in merge operators.
//!
//! Pure value-level implementations of the four merge strategies. The
//! store resolves each contributor's source value (in `branch_index`
//! order) and the current target value, then delegates here.

use serde_json::Value;
use weft_core::TokenId;
use weft_workflow::MergeStrategy;

use crate::error::ContextError;

/// Combine contributor values into a new target value.
///
/// `contributions` must already be in `branch_index` order -- `Append`
/// ordering and the conflict-resolution direction of `Merge` both depend
/// on it. `existing` is the target's current value, if any.
pub fn apply(
    strategy: MergeStrategy,
    target_path: &str,
    existing: Option<Value>,
    contributions: &[(TokenId, Value)],
) -> Result<Value, ContextError> {
    match strategy {
        MergeStrategy::Append => {
            let mut items = match existing {
                None | Some(Value::Null) => Vec::new(),
                Some(Value::Array(items)) => items,
                Some(_) => {
                    return Err(ContextError::NotAnArray {
                        path: target_path.to_owned(),
                    });
                }
            };
            items.extend(contributions.iter().map(|(_, v)| v.clone()));
            Ok(Value::Array(items))
        }

        MergeStrategy::Merge => {
            let mut map = match existing {
                None | Some(Value::Null) => serde_json::Map::new(),
                Some(Value::Object(map)) => map,
                Some(_) => {
                    return Err(ContextError::NotAnObject {
                        path: target_path.to_owned(),
                    });
                }
            };
            for (token, value) in contributions {
                let Value::Object(contributed) = value else {
                    return Err(ContextError::InvalidKeyedSource { token: *token });
                };
                // Later branch_index wins on key conflict.
                for (k, v) in contributed {
                    map.insert(k.clone(), v.clone());
                }
            }
            Ok(Value::Object(map))
        }

        MergeStrategy::Keyed => {
            let mut map = match existing {
                None | Some(Value::Null) => serde_json::Map::new(),
                Some(Value::Object(map)) => map,
                Some(_) => {
                    return Err(ContextError::NotAnObject {
                        path: target_path.to_owned(),
                    });
                }
            };
            for (token, value) in contributions {
                let (key, entry) = keyed_parts(value)
                    .ok_or(ContextError::InvalidKeyedSource { token: *token })?;
                if map.contains_key(&key) {
                    return Err(ContextError::MergeConflict { key });
                }
                map.insert(key, entry);
            }
            Ok(Value::Object(map))
        }

        MergeStrategy::LastWins => contributions
            .last()
            .map(|(_, v)| v.clone())
            .ok_or(ContextError::MissingValue {
                path: target_path.to_owned(),
            }),
    }
}

/// Pull `(key, value)` out of a `{key, value}` contributor object.
fn keyed_parts(value: &Value) -> Option<(String, Value)> {
    let map = value.as_object()?;
    let key = map.get("key")?.as_str()?.to_owned();
    let entry = map.get("value")?.clone();
    Some((key, entry))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn contributions(values: &[Value]) -> Vec<(TokenId, Value)> {
        values
            .iter()
            .enumerate()
            .map(|(i, v)| (TokenId::new(i as u64 + 1), v.clone()))
            .collect()
    }

    #[test]
    fn append_preserves_contribution_order() {
        let result = apply(
            MergeStrategy::Append,
            "state.qs",
            Some(json!([])),
            &contributions(&[json!("Q0"), json!("Q1"), json!("Q2")]),
        )
        .unwrap();
        assert_eq!(result, json!(["Q0", "Q1", "Q2"]));
    }

    #[test]
    fn append_extends_existing_array() {
        let result = apply(
            MergeStrategy::Append,
            "state.qs",
            Some(json!(["seed"])),
            &contributions(&[json!("a")]),
        )
        .unwrap();
        assert_eq!(result, json!(["seed", "a"]));
    }

    #[test]
    fn append_rejects_scalar_target() {
        let err = apply(
            MergeStrategy::Append,
            "state.qs",
            Some(json!(42)),
            &contributions(&[json!("a")]),
        )
        .unwrap_err();
        assert!(err.to_string().contains("not an array"));
    }

    #[test]
    fn merge_shallow_later_branch_wins() {
        let result = apply(
            MergeStrategy::Merge,
            "state.combined",
            None,
            &contributions(&[json!({"a": 1, "b": 1}), json!({"b": 2, "c": 2})]),
        )
        .unwrap();
        assert_eq!(result, json!({"a": 1, "b": 2, "c": 2}));
    }

    #[test]
    fn keyed_stores_by_key() {
        let result = apply(
            MergeStrategy::Keyed,
            "state.by_region",
            None,
            &contributions(&[
                json!({"key": "eu", "value": 10}),
                json!({"key": "us", "value": 20}),
            ]),
        )
        .unwrap();
        assert_eq!(result, json!({"eu": 10, "us": 20}));
    }

    #[test]
    fn keyed_duplicate_key_conflicts() {
        let err = apply(
            MergeStrategy::Keyed,
            "state.by_region",
            None,
            &contributions(&[
                json!({"key": "eu", "value": 10}),
                json!({"key": "eu", "value": 20}),
            ]),
        )
        .unwrap_err();
        assert!(matches!(err, ContextError::MergeConflict { ref key } if key == "eu"));
    }

    #[test]
    fn keyed_malformed_source_is_an_error() {
        let err = apply(
            MergeStrategy::Keyed,
            "state.by_region",
            None,
            &contributions(&[json!({"not_key": 1})]),
        )
        .unwrap_err();
        assert!(err.to_string().contains("not a {key, value} object"));
    }

    #[test]
    fn last_wins_takes_highest_branch_index() {
        let result = apply(
            MergeStrategy::LastWins,
            "state.winner",
            Some(json!("old")),
            &contributions(&[json!("first"), json!("second"), json!("third")]),
        )
        .unwrap();
        assert_eq!(result, json!("third"));
    }

    #[test]
    fn last_wins_with_no_contributions_is_an_error() {
        let err = apply(MergeStrategy::LastWins, "state.winner", None, &[]).unwrap_err();
        assert!(err.to_string().contains("no value"));
    }
}
