//! Config schemas.
//!
//! A handler describes its acceptable config shape with a [`Schema`] of
//! [`FieldDef`]s. The plan builder validates node config against it at plan
//! time; the editor renders forms from the same definitions. Values that
//! contain template expressions are type-checked at runtime instead, after
//! rendering.

use serde::{Deserialize, Serialize};

/// Primitive type of a config field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    /// UTF-8 string.
    String,
    /// Integer number.
    Integer,
    /// Any number.
    Number,
    /// Boolean.
    Boolean,
    /// JSON array.
    Array,
    /// JSON object.
    Object,
}

/// Editor rendering hint for a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldFormat {
    /// Multi-line text area.
    Textarea,
    /// Code editor.
    Code,
    /// Masked secret input.
    Password,
    /// Credential picker; the value is a credential id.
    Credential,
    /// Raw JSON editor.
    Json,
    /// URI input.
    Uri,
    /// ISO-8601 date input.
    Date,
}

/// One config field a handler accepts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDef {
    /// Config map key.
    pub name: String,
    /// Human-readable name shown in the editor.
    pub display_name: String,
    /// Primitive type.
    #[serde(rename = "type")]
    pub kind: FieldKind,
    /// Editor rendering hint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<FieldFormat>,
    /// Whether the field must be present.
    #[serde(default)]
    pub required: bool,
    /// Default value when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<serde_json::Value>,
    /// Enumerated allowed values.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<serde_json::Value>,
    /// Display labels matching `options` by position.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub option_labels: Vec<String>,
    /// Inclusive lower bound for numbers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum: Option<f64>,
    /// Inclusive upper bound for numbers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maximum: Option<f64>,
    /// Editor placeholder text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
    /// Element definition for `Array` fields.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<FieldDef>>,
    /// Member definitions for `Object` fields.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub properties: Vec<FieldDef>,
}

impl FieldDef {
    /// Create a field with the minimum required attributes.
    pub fn new(name: impl Into<String>, display_name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            display_name: display_name.into(),
            kind,
            format: None,
            required: false,
            default: None,
            options: Vec::new(),
            option_labels: Vec::new(),
            minimum: None,
            maximum: None,
            placeholder: None,
            items: None,
            properties: Vec::new(),
        }
    }

    /// Mark the field required.
    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Set the rendering hint.
    #[must_use]
    pub fn with_format(mut self, format: FieldFormat) -> Self {
        self.format = Some(format);
        self
    }

    /// Set the default value.
    #[must_use]
    pub fn with_default(mut self, default: serde_json::Value) -> Self {
        self.default = Some(default);
        self
    }

    /// Restrict to enumerated values with display labels.
    #[must_use]
    pub fn with_options(
        mut self,
        options: Vec<serde_json::Value>,
        labels: Vec<String>,
    ) -> Self {
        self.options = options;
        self.option_labels = labels;
        self
    }

    /// Set numeric bounds.
    #[must_use]
    pub fn with_range(mut self, minimum: Option<f64>, maximum: Option<f64>) -> Self {
        self.minimum = minimum;
        self.maximum = maximum;
        self
    }
}

/// A violation found while validating config against a schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    /// The offending field name.
    pub field: String,
    /// What is wrong.
    pub message: String,
}

impl Violation {
    /// Create a violation.
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// A handler's config schema: the set of accepted fields.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Schema {
    /// Accepted fields.
    pub fields: Vec<FieldDef>,
}

impl Schema {
    /// An empty schema (handler takes no config).
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a schema from fields.
    #[must_use]
    pub fn with_fields(fields: Vec<FieldDef>) -> Self {
        Self { fields }
    }

    /// Look up a field by name.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Validate a config map, reporting every violation rather than
    /// stopping at the first.
    #[must_use]
    pub fn validate(&self, config: &serde_json::Map<String, serde_json::Value>) -> Vec<Violation> {
        let mut violations = Vec::new();
        for field in &self.fields {
            match config.get(&field.name) {
                None => {
                    if field.required && field.default.is_none() {
                        violations
                            .push(Violation::new(&field.name, "required field is missing"));
                    }
                }
                Some(value) => validate_value(field, value, &mut violations),
            }
        }
        violations
    }
}

/// Returns `true` if a JSON value is a string containing a template
/// expression, whose type is only known after rendering.
fn is_templated(value: &serde_json::Value) -> bool {
    value
        .as_str()
        .is_some_and(|s| s.contains("{{") || s.contains("${"))
}

fn validate_value(field: &FieldDef, value: &serde_json::Value, out: &mut Vec<Violation>) {
    if is_templated(value) {
        return;
    }

    let type_ok = match field.kind {
        FieldKind::String => value.is_string(),
        FieldKind::Integer => value.is_i64() || value.is_u64(),
        FieldKind::Number => value.is_number(),
        FieldKind::Boolean => value.is_boolean(),
        FieldKind::Array => value.is_array(),
        FieldKind::Object => value.is_object(),
    };
    if !type_ok {
        out.push(Violation::new(
            &field.name,
            format!("expected {:?} value", field.kind),
        ));
        return;
    }

    if !field.options.is_empty() && !field.options.contains(value) {
        out.push(Violation::new(&field.name, "value is not one of the allowed options"));
    }

    if let Some(n) = value.as_f64() {
        if let Some(min) = field.minimum
            && n < min
        {
            out.push(Violation::new(&field.name, format!("value is below minimum {min}")));
        }
        if let Some(max) = field.maximum
            && n > max
        {
            out.push(Violation::new(&field.name, format!("value is above maximum {max}")));
        }
    }

    if let (FieldKind::Array, Some(items)) = (field.kind, field.items.as_deref())
        && let Some(elements) = value.as_array()
    {
        for element in elements {
            validate_value(items, element, out);
        }
    }

    if field.kind == FieldKind::Object
        && let Some(map) = value.as_object()
    {
        for prop in &field.properties {
            match map.get(&prop.name) {
                None if prop.required => {
                    out.push(Violation::new(
                        format!("{}.{}", field.name, prop.name),
                        "required field is missing",
                    ));
                }
                Some(inner) => validate_value(prop, inner, out),
                None => {}
            }
        }
    }
}
