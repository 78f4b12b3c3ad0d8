//! Request and response shape descriptions.
//!
//! Each transaction builds its [`Schema`] once, at registration, from
//! per-field annotations such as `json:"name" require:"true" isEmpty:"false"`.
//! The validator and the Procedure reply both read from it.

use serde_json::{json, Map, Value};

const OPTION_REQUIRE: &str = "require";
const OPTION_ISEMPTY: &str = "isEmpty";
const OPTION_JSON: &str = "json";

/// Parsed field annotation. `None` means the key was absent or unparseable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldTag {
    pub required: Option<bool>,
    pub allow_empty: Option<bool>,
    pub external_name: Option<String>,
}

impl FieldTag {
    /// Parses space separated `key:value` tokens. Unknown keys are ignored.
    pub fn parse(annotation: &str) -> Self {
        let mut tag = FieldTag::default();

        for token in annotation.split_whitespace() {
            let Some((key, value)) = token.split_once(':') else {
                continue;
            };
            let value = value.trim_matches('"');

            match key {
                OPTION_REQUIRE => tag.required = parse_flag(value),
                OPTION_ISEMPTY => tag.allow_empty = parse_flag(value),
                OPTION_JSON => {
                    let name = value.split(',').next().unwrap_or_default();
                    tag.external_name = Some(name.to_string());
                }
                _ => {}
            }
        }

        tag
    }

    pub fn is_required(&self) -> bool {
        self.required.unwrap_or(false)
    }

    /// True only when the annotation explicitly forbids empty values.
    pub fn rejects_empty(&self) -> bool {
        self.allow_empty == Some(false)
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    if value.eq_ignore_ascii_case("true") {
        Some(true)
    } else if value.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}

/// Value kind reported in Procedure descriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    String,
    Number,
    Boolean,
    Array,
    Object,
    Any,
}

impl FieldKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldKind::String => "String",
            FieldKind::Number => "Number",
            FieldKind::Boolean => "Boolean",
            FieldKind::Array => "Array",
            FieldKind::Object => "Object",
            FieldKind::Any => "Any",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    name: String,
    kind: FieldKind,
    tag: FieldTag,
}

impl FieldSpec {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> FieldKind {
        self.kind
    }

    pub fn tag(&self) -> &FieldTag {
        &self.tag
    }

    /// Key looked up in the form; falls back to the declared name.
    pub fn external_name(&self) -> &str {
        match self.tag.external_name.as_deref() {
            Some(name) if !name.is_empty() => name,
            _ => &self.name,
        }
    }
}

/// Shape of a request or response payload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Schema {
    fields: Vec<FieldSpec>,
    optional: bool,
}

impl Schema {
    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::default()
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    /// An optional shape accepts an absent payload (empty form) as a whole.
    pub fn is_optional(&self) -> bool {
        self.optional
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// `{external_name: {"require", "is_empty", "type"}}`
    pub fn describe(&self) -> Value {
        let mut described = Map::new();
        for field in &self.fields {
            described.insert(
                field.external_name().to_string(),
                json!({
                    "require": field.tag.is_required(),
                    "is_empty": field.tag.allow_empty.unwrap_or(false),
                    "type": field.kind.as_str(),
                }),
            );
        }
        Value::Object(described)
    }
}

#[derive(Debug, Default)]
pub struct SchemaBuilder {
    fields: Vec<FieldSpec>,
    optional: bool,
}

impl SchemaBuilder {
    pub fn field(mut self, name: impl Into<String>, kind: FieldKind, annotation: &str) -> Self {
        self.fields.push(FieldSpec {
            name: name.into(),
            kind,
            tag: FieldTag::parse(annotation),
        });
        self
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn build(self) -> Schema {
        Schema {
            fields: self.fields,
            optional: self.optional,
        }
    }
}
