// Copyright 2026 BadCompany
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Declarative input schemas.
//!
//! Each tool declares one [`ObjectSchema`]. The same value validates incoming
//! `arguments` and renders the JSON-schema published through `tools/list`,
//! so what is documented is exactly what is enforced.

use serde_json::{json, Map, Value};

use crate::core::constants::limits;
use crate::core::errors::ServerError;

#[derive(Debug, Clone, PartialEq)]
pub enum Kind {
    String,
    /// SQL identifier: `[A-Za-z_][A-Za-z0-9_]*`
    Identifier,
    /// Non-empty list of identifiers
    IdentifierList,
    /// Identifier -> scalar (string, number, boolean, null)
    ScalarMap { min_properties: usize },
    Boolean,
    Integer { min: i64, max: i64 },
}

#[derive(Debug, Clone)]
pub struct Property {
    pub name: &'static str,
    pub kind: Kind,
    pub required: bool,
    pub description: &'static str,
}

impl Property {
    pub fn required(name: &'static str, kind: Kind, description: &'static str) -> Self {
        Self {
            name,
            kind,
            required: true,
            description,
        }
    }

    pub fn optional(name: &'static str, kind: Kind, description: &'static str) -> Self {
        Self {
            name,
            kind,
            required: false,
            description,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ObjectSchema {
    properties: Vec<Property>,
}

pub fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    s.len() <= limits::MAX_IDENTIFIER_LEN && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn invalid(msg: String) -> ServerError {
    ServerError::Validation(msg)
}

impl ObjectSchema {
    pub fn new(properties: Vec<Property>) -> Self {
        Self { properties }
    }

    pub fn properties(&self) -> &[Property] {
        &self.properties
    }

    /// Check `args` against the schema. Properties are checked in declaration
    /// order, so the first failure reported is deterministic.
    pub fn validate(&self, args: &Value) -> Result<(), ServerError> {
        let obj = args
            .as_object()
            .ok_or_else(|| invalid("arguments must be an object".to_string()))?;

        if let Some(unknown) = obj
            .keys()
            .find(|k| !self.properties.iter().any(|p| p.name == k.as_str()))
        {
            return Err(invalid(format!("unknown property \"{}\"", unknown)));
        }

        for prop in &self.properties {
            match obj.get(prop.name) {
                None if prop.required => {
                    return Err(invalid(format!("missing required property \"{}\"", prop.name)))
                }
                None => {}
                Some(value) => validate_kind(prop.name, &prop.kind, value)?,
            }
        }
        Ok(())
    }

    /// JSON-schema rendering for `tools/list`.
    pub fn to_json_schema(&self) -> Value {
        let mut properties = Map::new();
        for prop in &self.properties {
            let mut schema = kind_schema(&prop.kind);
            if let Some(obj) = schema.as_object_mut() {
                obj.insert("description".to_string(), json!(prop.description));
            }
            properties.insert(prop.name.to_string(), schema);
        }
        let required: Vec<&str> = self
            .properties
            .iter()
            .filter(|p| p.required)
            .map(|p| p.name)
            .collect();

        json!({
            "type": "object",
            "properties": properties,
            "required": required,
            "additionalProperties": false,
        })
    }
}

fn validate_kind(name: &str, kind: &Kind, value: &Value) -> Result<(), ServerError> {
    match kind {
        Kind::String => match value.as_str() {
            Some(s) if !s.is_empty() => Ok(()),
            _ => Err(invalid(format!("\"{}\" must be a non-empty string", name))),
        },
        Kind::Identifier => match value.as_str() {
            Some(s) if is_identifier(s) => Ok(()),
            _ => Err(invalid(format!("\"{}\" must be a column identifier", name))),
        },
        Kind::IdentifierList => {
            let items = value
                .as_array()
                .filter(|a| !a.is_empty())
                .ok_or_else(|| invalid(format!("\"{}\" must be a non-empty array", name)))?;
            for item in items {
                if !item.as_str().is_some_and(is_identifier) {
                    return Err(invalid(format!(
                        "\"{}\" entries must be column identifiers, got {}",
                        name, item
                    )));
                }
            }
            Ok(())
        }
        Kind::ScalarMap { min_properties } => {
            let map = value
                .as_object()
                .ok_or_else(|| invalid(format!("\"{}\" must be an object", name)))?;
            if map.len() < *min_properties {
                return Err(invalid(format!(
                    "\"{}\" must have at least {} entr{}",
                    name,
                    min_properties,
                    if *min_properties == 1 { "y" } else { "ies" }
                )));
            }
            for (key, val) in map {
                if !is_identifier(key) {
                    return Err(invalid(format!(
                        "\"{}\" key \"{}\" is not a column identifier",
                        name, key
                    )));
                }
                if val.is_object() || val.is_array() {
                    return Err(invalid(format!(
                        "\"{}.{}\" must be a string, number, boolean or null",
                        name, key
                    )));
                }
            }
            Ok(())
        }
        Kind::Boolean => {
            if value.is_boolean() {
                Ok(())
            } else {
                Err(invalid(format!("\"{}\" must be a boolean", name)))
            }
        }
        Kind::Integer { min, max } => match value.as_i64() {
            Some(n) if n >= *min && n <= *max => Ok(()),
            _ => Err(invalid(format!(
                "\"{}\" must be an integer between {} and {}",
                name, min, max
            ))),
        },
    }
}

const IDENTIFIER_PATTERN: &str = "^[A-Za-z_][A-Za-z0-9_]*$";

fn identifier_schema() -> Value {
    json!({
        "type": "string",
        "pattern": IDENTIFIER_PATTERN,
        "maxLength": limits::MAX_IDENTIFIER_LEN,
    })
}

fn kind_schema(kind: &Kind) -> Value {
    match kind {
        Kind::String => json!({"type": "string", "minLength": 1}),
        Kind::Identifier => identifier_schema(),
        Kind::IdentifierList => json!({
            "type": "array",
            "minItems": 1,
            "items": identifier_schema(),
        }),
        Kind::ScalarMap { min_properties } => json!({
            "type": "object",
            "minProperties": min_properties,
            "propertyNames": identifier_schema(),
            "additionalProperties": {"type": ["string", "number", "boolean", "null"]},
        }),
        Kind::Boolean => json!({"type": "boolean"}),
        Kind::Integer { min, max } => json!({"type": "integer", "minimum": min, "maximum": max}),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> ObjectSchema {
        ObjectSchema::new(vec![
            Property::required("table", Kind::String, "Table name"),
            Property::optional("columns", Kind::IdentifierList, "Columns"),
            Property::optional("where", Kind::ScalarMap { min_properties: 0 }, "Filters"),
            Property::optional("limit", Kind::Integer { min: 1, max: 200 }, "Row cap"),
        ])
    }

    fn message(err: ServerError) -> String {
        match err {
            ServerError::Validation(msg) => msg,
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_identifier_rules() {
        assert!(is_identifier("user_id"));
        assert!(is_identifier("_private"));
        assert!(!is_identifier("1abc"));
        assert!(!is_identifier("name; drop table"));
        assert!(!is_identifier(""));
        assert!(!is_identifier(&"a".repeat(64)));
    }

    #[test]
    fn test_missing_and_unknown_properties() {
        let err = schema().validate(&json!({"columns": ["id"]})).unwrap_err();
        assert!(message(err).contains("missing required property \"table\""));

        let err = schema()
            .validate(&json!({"table": "t", "select": "*"}))
            .unwrap_err();
        assert!(message(err).contains("unknown property \"select\""));
    }

    #[test]
    fn test_limit_bounds_and_integrality() {
        let s = schema();
        assert!(s.validate(&json!({"table": "t", "limit": 200})).is_ok());
        assert!(s.validate(&json!({"table": "t", "limit": 1})).is_ok());
        for bad in [json!(0), json!(-3), json!(201), json!(500), json!(2.5), json!("10")] {
            let err = s.validate(&json!({"table": "t", "limit": bad})).unwrap_err();
            assert!(message(err).contains("between 1 and 200"));
        }
    }

    #[test]
    fn test_scalar_map_rejects_nested_values() {
        let err = schema()
            .validate(&json!({"table": "t", "where": {"tags": ["a"]}}))
            .unwrap_err();
        assert!(message(err).contains("where.tags"));

        let err = schema()
            .validate(&json!({"table": "t", "where": {"a or 1=1": 1}}))
            .unwrap_err();
        assert!(message(err).contains("not a column identifier"));
    }

    #[test]
    fn test_non_object_arguments() {
        let err = schema().validate(&json!(["table"])).unwrap_err();
        assert!(message(err).contains("must be an object"));
    }

    #[test]
    fn test_json_schema_rendering() {
        let rendered = schema().to_json_schema();
        assert_eq!(rendered["type"], "object");
        assert_eq!(rendered["required"], json!(["table"]));
        assert_eq!(rendered["additionalProperties"], json!(false));
        assert_eq!(rendered["properties"]["limit"]["maximum"], json!(200));
        assert_eq!(rendered["properties"]["table"]["description"], "Table name");
    }

    #[test]
    fn test_rendered_identifiers_carry_length_cap() {
        let rendered = schema().to_json_schema();
        let items = &rendered["properties"]["columns"]["items"];
        assert_eq!(items["maxLength"], json!(limits::MAX_IDENTIFIER_LEN));
        assert_eq!(items["pattern"], json!(IDENTIFIER_PATTERN));

        let keys = &rendered["properties"]["where"]["propertyNames"];
        assert_eq!(keys["maxLength"], json!(limits::MAX_IDENTIFIER_LEN));

        let order = kind_schema(&Kind::Identifier);
        assert_eq!(order["maxLength"], json!(63));

        // The published cap is the enforced cap.
        let at_cap = "c".repeat(limits::MAX_IDENTIFIER_LEN);
        let over_cap = "c".repeat(limits::MAX_IDENTIFIER_LEN + 1);
        assert!(schema().validate(&json!({"table": "t", "columns": [at_cap]})).is_ok());
        assert!(schema().validate(&json!({"table": "t", "columns": [over_cap]})).is_err());
    }
}
