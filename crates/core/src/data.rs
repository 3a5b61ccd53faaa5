use serde::Serialize;
use serde_json::{Map, Value};

/// Data used to fill a template: a possibly nested JSON object. Immutable.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct TemplateData {
    data: Value,
}

impl TemplateData {
    /// Empty object.
    pub fn empty() -> Self {
        Self {
            data: Value::Object(Map::new()),
        }
    }

    pub fn from_map(map: Map<String, Value>) -> Self {
        Self {
            data: Value::Object(map),
        }
    }

    /// Wrap an arbitrary JSON value. Only objects are accepted at the top level.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self::from_map(map)),
            _ => None,
        }
    }

    /// Parse template data from JSON text.
    pub fn from_json_str(json: &str) -> Result<Self, String> {
        let value: Value = serde_json::from_str(json).map_err(|e| e.to_string())?;
        Self::from_value(value).ok_or_else(|| "template data must be a JSON object".to_string())
    }

    pub fn as_value(&self) -> &Value {
        &self.data
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }
}

impl Default for TemplateData {
    fn default() -> Self {
        Self::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn only_objects_are_accepted() {
        assert!(TemplateData::from_value(json!({"a": 1})).is_some());
        assert!(TemplateData::from_value(json!([1, 2])).is_none());
        assert!(TemplateData::from_value(json!(3)).is_none());
    }

    #[test]
    fn parses_json_text() {
        let data = TemplateData::from_json_str(r#"{"customer": {"name": "Ada"}}"#).unwrap();
        assert_eq!(data.get("customer"), Some(&json!({"name": "Ada"})));

        let err = TemplateData::from_json_str("[1]").unwrap_err();
        assert!(err.contains("JSON object"));
        assert!(TemplateData::from_json_str("{").is_err());
    }

    #[test]
    fn empty_is_an_object() {
        assert_eq!(TemplateData::empty().as_value(), &json!({}));
        assert_eq!(TemplateData::default(), TemplateData::empty());
    }
}
