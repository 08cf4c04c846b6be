//! Parsing oracle text into [`MergeProposal`]s.
//!
//! Model output is located (code fences stripped, outermost `{...}` taken) and
//! parsed with an order-preserving visitor, so duplicate keys survive until
//! the equivalence builder can report them.

use crate::error::OracleError;
use crate::request::ResponseShape;
use namegraph_core::{MergeProposal, NONE_LITERAL};
use serde::de::{Deserializer, MapAccess, Visitor};
use serde::Deserialize;
use serde_json::Value;
use std::fmt;

/// A JSON object as an ordered list of entries, duplicates kept.
#[derive(Debug, Clone, PartialEq)]
struct OrderedObject(Vec<(String, Value)>);

impl<'de> Deserialize<'de> for OrderedObject {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct OrderedVisitor;

        impl<'de> Visitor<'de> for OrderedVisitor {
            type Value = OrderedObject;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a JSON object")
            }

            fn visit_map<A>(self, mut map: A) -> Result<OrderedObject, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut entries = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some((k, v)) = map.next_entry::<String, Value>()? {
                    entries.push((k, v));
                }
                Ok(OrderedObject(entries))
            }
        }

        deserializer.deserialize_map(OrderedVisitor)
    }
}

/// Slice of `text` holding the response object.
pub fn extract_json_object(text: &str) -> Result<&str, OracleError> {
    let mut body = text.trim();
    if let Some(rest) = body.strip_prefix("```") {
        // Drop the fence line (possibly "```json") and the closing fence.
        // A one-line reply keeps everything after the opening backticks.
        body = rest.split_once('\n').map_or(rest, |(_, tail)| tail);
        if let Some(idx) = body.rfind("```") {
            body = &body[..idx];
        }
    }
    let start = body.find('{');
    let end = body.rfind('}');
    match (start, end) {
        (Some(s), Some(e)) if s < e => Ok(&body[s..=e]),
        _ => Err(OracleError::InvalidResponse(format!(
            "no JSON object in response: {}",
            preview(text)
        ))),
    }
}

/// Parse model text into the proposal shape a pass expects.
///
/// `{}` parses to an empty proposal. A JSON `null` rename target is read as
/// the `"None"` sentinel.
pub fn parse_proposal(text: &str, shape: ResponseShape) -> Result<MergeProposal, OracleError> {
    let json = extract_json_object(text)?;
    let mut de = serde_json::Deserializer::from_str(json);
    let OrderedObject(entries) = OrderedObject::deserialize(&mut de)
        .map_err(|e| OracleError::InvalidResponse(format!("malformed JSON object: {e}")))?;

    match shape {
        ResponseShape::Grouped => {
            let mut groups = Vec::with_capacity(entries.len());
            for (canonical, value) in entries {
                let variants = match value {
                    Value::Array(items) => items
                        .into_iter()
                        .map(|item| match item {
                            Value::String(s) => Ok(s),
                            other => Err(type_error(&canonical, "string variant", &other)),
                        })
                        .collect::<Result<Vec<_>, _>>()?,
                    Value::String(single) => vec![single],
                    other => return Err(type_error(&canonical, "array of variants", &other)),
                };
                groups.push((canonical, variants));
            }
            Ok(MergeProposal::Grouped(groups))
        }
        ResponseShape::Renames => {
            let mut pairs = Vec::with_capacity(entries.len());
            for (old, value) in entries {
                let new = match value {
                    Value::String(s) => s,
                    Value::Null => NONE_LITERAL.to_string(),
                    other => return Err(type_error(&old, "string target", &other)),
                };
                pairs.push((old, new));
            }
            Ok(MergeProposal::Renames(pairs))
        }
    }
}

fn type_error(key: &str, expected: &str, got: &Value) -> OracleError {
    OracleError::InvalidResponse(format!("`{key}`: expected {expected}, got {got}"))
}

fn preview(text: &str) -> String {
    let cut: String = text.chars().take(80).collect();
    if cut.len() < text.len() {
        format!("{cut}...")
    } else {
        cut
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_code_fences() {
        let text = "```json\n{\"Clinton\": \"Bill Clinton\"}\n```";
        let p = parse_proposal(text, ResponseShape::Renames).unwrap();
        assert_eq!(p, MergeProposal::renames([("Clinton", "Bill Clinton")]));

        let one_line = "```json {\"A\": \"B\"} ```";
        let p = parse_proposal(one_line, ResponseShape::Renames).unwrap();
        assert_eq!(p, MergeProposal::renames([("A", "B")]));
    }

    #[test]
    fn finds_object_inside_prose() {
        let text = "Here are the merges:\n{\"Bill Clinton\": [\"Clinton\"], \"None\": [\"Jeff\"]}\nDone.";
        let p = parse_proposal(text, ResponseShape::Grouped).unwrap();
        assert_eq!(
            p,
            MergeProposal::grouped([("Bill Clinton", vec!["Clinton"]), ("None", vec!["Jeff"])])
        );
    }

    #[test]
    fn duplicate_keys_are_preserved_in_order() {
        let text = r#"{"Bill": "Bill Gates", "Bill": "Bill Clinton", "E. Jeffrey": null}"#;
        let p = parse_proposal(text, ResponseShape::Renames).unwrap();
        assert_eq!(
            p.rename_pairs(),
            vec![
                ("Bill".to_string(), "Bill Gates".to_string()),
                ("Bill".to_string(), "Bill Clinton".to_string()),
                ("E. Jeffrey".to_string(), "None".to_string()),
            ]
        );
    }

    #[test]
    fn empty_object_means_no_changes() {
        assert!(parse_proposal("{}", ResponseShape::Renames).unwrap().is_empty());
    }

    #[test]
    fn malformed_responses_fail() {
        assert!(matches!(
            parse_proposal("I could not decide.", ResponseShape::Renames),
            Err(OracleError::InvalidResponse(_))
        ));
        assert!(matches!(
            parse_proposal(r#"{"A": 3}"#, ResponseShape::Renames),
            Err(OracleError::InvalidResponse(_))
        ));
        assert!(matches!(
            parse_proposal(r#"{"A": ["B", 1]}"#, ResponseShape::Grouped),
            Err(OracleError::InvalidResponse(_))
        ));
        assert!(parse_proposal(r#"{"A": "B",}"#, ResponseShape::Renames).is_err());
    }
}
