use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

pub const DEFAULT_MARKER_TAG: &str = "span";

/// How a `{key:content}` marker is rendered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MarkerSpec {
    pub tag: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class: Option<String>,
}

impl Default for MarkerSpec {
    fn default() -> Self {
        Self {
            tag: DEFAULT_MARKER_TAG.to_string(),
            class: None,
        }
    }
}

impl MarkerSpec {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            class: None,
        }
    }

    pub fn with_class(mut self, class: impl Into<String>) -> Self {
        self.class = Some(class.into());
        self
    }

    /// Reads one entry of a `markers` object. Anything that is not an object
    /// falls back to a plain `<span>`.
    fn from_value(value: &Value) -> Self {
        let Value::Object(fields) = value else {
            return Self::default();
        };
        let tag = match fields.get("tag") {
            None | Some(Value::Null) => DEFAULT_MARKER_TAG.to_string(),
            Some(Value::String(tag)) => tag.clone(),
            Some(other) => other.to_string(),
        };
        let class = match fields.get("class") {
            Some(Value::String(class)) if !class.is_empty() => Some(class.clone()),
            Some(Value::Number(n)) if n.as_f64() != Some(0.0) => Some(n.to_string()),
            Some(Value::Bool(true)) => Some("true".to_string()),
            _ => None,
        };
        Self { tag, class }
    }
}

/// Marker rules in configuration order. Keys are unique and case-sensitive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MarkerMap {
    entries: Vec<(String, MarkerSpec)>,
}

impl MarkerMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a marker, replacing the spec of an existing key in place.
    pub fn insert(&mut self, key: impl Into<String>, spec: MarkerSpec) {
        let key = key.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = spec,
            None => self.entries.push((key, spec)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&MarkerSpec> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, spec)| spec)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &MarkerSpec)> {
        self.entries.iter().map(|(k, spec)| (k.as_str(), spec))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn from_object(object: &Map<String, Value>) -> Self {
        let mut map = Self::new();
        for (key, value) in object {
            map.insert(key.clone(), MarkerSpec::from_value(value));
        }
        map
    }
}

/// Compiler options supplied by a preset.
///
/// Parsing never fails: a missing or malformed field turns the feature it
/// controls to its default instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RulesConfig {
    pub headings: bool,
    pub markers: Option<MarkerMap>,
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            headings: true,
            markers: None,
        }
    }
}

impl RulesConfig {
    pub fn with_headings(mut self, enabled: bool) -> Self {
        self.headings = enabled;
        self
    }

    pub fn with_marker(mut self, key: impl Into<String>, spec: MarkerSpec) -> Self {
        self.markers
            .get_or_insert_with(MarkerMap::new)
            .insert(key, spec);
        self
    }

    pub fn marker_keys(&self) -> Vec<&str> {
        self.markers
            .as_ref()
            .map(|m| m.keys().collect())
            .unwrap_or_default()
    }

    pub fn from_value(value: &Value) -> Self {
        let Value::Object(fields) = value else {
            return Self::default();
        };
        let headings = !matches!(fields.get("headings"), Some(Value::Bool(false)));
        let markers = match fields.get("markers") {
            Some(Value::Object(object)) => Some(MarkerMap::from_object(object)),
            _ => None,
        };
        Self { headings, markers }
    }

    pub fn from_json_str(raw: &str) -> serde_json::Result<Self> {
        let value: Value = serde_json::from_str(raw)?;
        Ok(Self::from_value(&value))
    }

    pub fn to_value(&self) -> Value {
        let mut fields = Map::new();
        fields.insert("headings".to_string(), Value::Bool(self.headings));
        if let Some(markers) = &self.markers {
            let mut object = Map::new();
            for (key, spec) in markers.iter() {
                let spec = serde_json::to_value(spec).unwrap_or(Value::Null);
                object.insert(key.to_string(), spec);
            }
            fields.insert("markers".to_string(), Value::Object(object));
        }
        Value::Object(fields)
    }
}

impl<'de> Deserialize<'de> for RulesConfig {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        Ok(Self::from_value(&value))
    }
}

impl Serialize for RulesConfig {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.to_value().serialize(serializer)
    }
}
