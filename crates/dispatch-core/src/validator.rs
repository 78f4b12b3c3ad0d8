//! Shallow form validation against a request [`Schema`].

use crate::document::Form;
use crate::errors::FieldError;
use crate::schema::Schema;
use serde_json::Value;

/// Checks every declared field in order and reports the first violation.
///
/// Only top-level keys are inspected. An optional schema accepts an empty
/// form outright; once any key is present its fields are checked as usual.
pub fn validate_form(form: &Form, schema: &Schema) -> Result<(), FieldError> {
    if schema.is_optional() && form.is_empty() {
        return Ok(());
    }

    for field in schema.fields() {
        let tag = field.tag();
        if !tag.is_required() {
            continue;
        }

        match form.get(field.external_name()) {
            None => return Err(FieldError::FieldNotFound(field.name().to_string())),
            Some(value) if tag.rejects_empty() && is_empty_value(value) => {
                return Err(FieldError::FieldCannotBeEmpty(field.name().to_string()));
            }
            Some(_) => {}
        }
    }

    Ok(())
}

fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}
