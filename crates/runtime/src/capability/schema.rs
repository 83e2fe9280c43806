//! Argument schemas: normalization of what servers report, and validation
//! of what models propose.

use serde_json::{Map, Number, Value, json};

use super::DispatchError;

/// JSON Schema primitive types we understand for parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    String,
    Number,
    Integer,
    Boolean,
    Object,
    Array,
}

impl ParamType {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "string" => Some(Self::String),
            "number" => Some(Self::Number),
            "integer" => Some(Self::Integer),
            "boolean" => Some(Self::Boolean),
            "object" => Some(Self::Object),
            "array" => Some(Self::Array),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Integer => "integer",
            Self::Boolean => "boolean",
            Self::Object => "object",
            Self::Array => "array",
        }
    }
}

/// One named parameter of a capability.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parameter {
    pub name: String,
    pub ty: ParamType,
    pub description: String,
    pub required: bool,
    /// Allowed values for string parameters declared with `enum`.
    pub choices: Vec<String>,
}

/// A normalized, always well-formed object schema.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArgumentSchema {
    params: Vec<Parameter>,
}

impl ArgumentSchema {
    /// Build a schema from whatever a server reported.
    ///
    /// Missing or unknown property types become `string`, missing
    /// descriptions get a generic one, and `required` only keeps names that
    /// are actually declared.
    pub fn normalize(raw: &Value) -> Self {
        let required: Vec<&str> = raw
            .get("required")
            .and_then(Value::as_array)
            .map(|names| names.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();

        let mut params: Vec<Parameter> = raw
            .get("properties")
            .and_then(Value::as_object)
            .map(|props| {
                props
                    .iter()
                    .map(|(name, prop)| Parameter {
                        name: name.clone(),
                        ty: prop
                            .get("type")
                            .and_then(Value::as_str)
                            .and_then(ParamType::parse)
                            .unwrap_or(ParamType::String),
                        description: prop
                            .get("description")
                            .and_then(Value::as_str)
                            .filter(|d| !d.trim().is_empty())
                            .map(str::to_string)
                            .unwrap_or_else(|| format!("The {name} parameter")),
                        required: required.contains(&name.as_str()),
                        choices: prop
                            .get("enum")
                            .and_then(Value::as_array)
                            .map(|vals| {
                                vals.iter()
                                    .filter_map(Value::as_str)
                                    .map(str::to_string)
                                    .collect()
                            })
                            .unwrap_or_default(),
                    })
                    .collect()
            })
            .unwrap_or_default();
        params.sort_by(|a, b| a.name.cmp(&b.name));

        Self { params }
    }

    /// The schema every resource capability takes: a single required topic.
    pub fn topic() -> Self {
        Self {
            params: vec![Parameter {
                name: "topic".to_string(),
                ty: ParamType::String,
                description: "The topic of the resource".to_string(),
                required: true,
                choices: Vec::new(),
            }],
        }
    }

    pub fn params(&self) -> &[Parameter] {
        &self.params
    }

    /// Render as a JSON Schema object for the model endpoint.
    pub fn to_json(&self) -> Value {
        let properties: Map<String, Value> = self
            .params
            .iter()
            .map(|p| {
                let mut prop = json!({ "type": p.ty.as_str(), "description": p.description });
                if !p.choices.is_empty() {
                    prop["enum"] = json!(p.choices);
                }
                (p.name.clone(), prop)
            })
            .collect();
        let required: Vec<&str> = self
            .params
            .iter()
            .filter(|p| p.required)
            .map(|p| p.name.as_str())
            .collect();

        json!({ "type": "object", "properties": properties, "required": required })
    }

    /// Check proposed arguments and return them as an object.
    ///
    /// Scalars are coerced where the intent is unambiguous (`"7"` for a
    /// number parameter, `7` for a string one). Undeclared keys pass
    /// through untouched; `null` counts as absent, and so does a blank
    /// string for a required parameter.
    pub fn validate(&self, input: &Value) -> Result<Map<String, Value>, DispatchError> {
        let mut args = match input {
            Value::Null => Map::new(),
            Value::Object(map) => map.clone(),
            Value::String(s) => match serde_json::from_str::<Value>(s) {
                Ok(Value::Object(map)) => map,
                _ => return Err(invalid("arguments must be a JSON object")),
            },
            _ => return Err(invalid("arguments must be a JSON object")),
        };

        for param in &self.params {
            let value = args
                .get(&param.name)
                .filter(|v| !v.is_null())
                .filter(|v| !(param.required && is_blank(v)))
                .cloned();
            match value {
                None => {
                    args.remove(&param.name);
                    if param.required {
                        return Err(invalid(format!(
                            "missing required argument `{}`",
                            param.name
                        )));
                    }
                }
                Some(value) => {
                    let value = coerce(param, &value)?;
                    args.insert(param.name.clone(), value);
                }
            }
        }

        Ok(args)
    }
}

fn is_blank(value: &Value) -> bool {
    value.as_str().is_some_and(|s| s.trim().is_empty())
}

fn invalid(reason: impl Into<String>) -> DispatchError {
    DispatchError::InvalidArguments(reason.into())
}

fn coerce(param: &Parameter, value: &Value) -> Result<Value, DispatchError> {
    let mismatch = || {
        invalid(format!(
            "expected {} for `{}`, got {value}",
            param.ty.as_str(),
            param.name
        ))
    };

    let coerced = match (param.ty, value) {
        (ParamType::String, Value::String(_)) => value.clone(),
        (ParamType::String, Value::Number(n)) => Value::String(n.to_string()),
        (ParamType::String, Value::Bool(b)) => Value::String(b.to_string()),
        (ParamType::Number, Value::Number(_)) => value.clone(),
        (ParamType::Number, Value::String(s)) => s
            .trim()
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number)
            .ok_or_else(mismatch)?,
        (ParamType::Integer, Value::Number(n)) if n.is_i64() || n.is_u64() => value.clone(),
        (ParamType::Integer, Value::Number(n)) => n
            .as_f64()
            .filter(|f| f.fract() == 0.0 && *f >= i64::MIN as f64 && *f < i64::MAX as f64)
            .map(|f| json!(f as i64))
            .ok_or_else(mismatch)?,
        (ParamType::Integer, Value::String(s)) => s
            .trim()
            .parse::<i64>()
            .map(|i| json!(i))
            .map_err(|_| mismatch())?,
        (ParamType::Boolean, Value::Bool(_)) => value.clone(),
        (ParamType::Boolean, Value::String(s)) => match s.trim() {
            "true" => Value::Bool(true),
            "false" => Value::Bool(false),
            _ => return Err(mismatch()),
        },
        (ParamType::Object, Value::Object(_)) | (ParamType::Array, Value::Array(_)) => {
            value.clone()
        }
        _ => return Err(mismatch()),
    };

    if !param.choices.is_empty() {
        let chosen = coerced.as_str().unwrap_or_default();
        if !param.choices.iter().any(|c| c == chosen) {
            return Err(invalid(format!(
                "`{}` must be one of {}, got {value}",
                param.name,
                param.choices.join(", ")
            )));
        }
    }

    Ok(coerced)
}
