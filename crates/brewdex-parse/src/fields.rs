//! Field accessors over untyped JSON objects.
//!
//! The remote directory is loose about types: identifiers arrive as strings
//! or integers, flags as `"Y"`/`"N"`, coordinates as numbers or numeric
//! strings. These helpers normalise all of that and treat blank strings as
//! absent.

use serde_json::{Map, Value};

use crate::{Error, Result};

pub type Object = Map<String, Value>;

/// Split a response into its `data` sub-documents.
///
/// A missing or `null` `data` member means zero results, not an error.
pub fn envelope(input: &str) -> Result<Vec<Value>> {
  let root: Value = serde_json::from_str(input)?;
  let Value::Object(root) = root else {
    return Err(Error::Malformed("top-level value is not an object".into()));
  };

  if root.get("status").and_then(Value::as_str) == Some("failure") {
    let message = text(&root, "errorMessage")
      .unwrap_or_else(|| "no error message".to_string());
    return Err(Error::RemoteFailure(message));
  }

  match root.get("data") {
    None | Some(Value::Null) => Ok(Vec::new()),
    Some(Value::Array(items)) => Ok(items.clone()),
    Some(item @ Value::Object(_)) => Ok(vec![item.clone()]),
    Some(other) => Err(Error::Malformed(format!(
      "`data` must be an array or object, found {}",
      type_name(other)
    ))),
  }
}

fn type_name(value: &Value) -> &'static str {
  match value {
    Value::Null => "null",
    Value::Bool(_) => "boolean",
    Value::Number(_) => "number",
    Value::String(_) => "string",
    Value::Array(_) => "array",
    Value::Object(_) => "object",
  }
}

/// A non-blank string, or a number rendered as a string.
pub fn text(obj: &Object, key: &str) -> Option<String> {
  match obj.get(key)? {
    Value::String(s) => {
      let trimmed = s.trim();
      (!trimmed.is_empty()).then(|| trimmed.to_string())
    }
    Value::Number(n) => Some(n.to_string()),
    _ => None,
  }
}

/// `"Y"`/`"N"` or a JSON boolean.
pub fn flag(obj: &Object, key: &str) -> Option<bool> {
  match obj.get(key)? {
    Value::Bool(b) => Some(*b),
    Value::String(s) if s.eq_ignore_ascii_case("y") => Some(true),
    Value::String(s) if s.eq_ignore_ascii_case("n") => Some(false),
    _ => None,
  }
}

/// A finite number, or a string holding one.
pub fn number(obj: &Object, key: &str) -> Option<f64> {
  let n = match obj.get(key)? {
    Value::Number(n) => n.as_f64()?,
    Value::String(s) => s.trim().parse().ok()?,
    _ => return None,
  };
  n.is_finite().then_some(n)
}

pub fn object<'a>(obj: &'a Object, key: &str) -> Option<&'a Object> {
  obj.get(key)?.as_object()
}

pub fn array<'a>(obj: &'a Object, key: &str) -> Option<&'a Vec<Value>> {
  obj.get(key)?.as_array()
}

/// First present image URL from an `images`/`labels` object, preferring the
/// medium rendition.
pub fn image(obj: &Object, key: &str) -> Option<String> {
  let images = object(obj, key)?;
  ["medium", "large", "icon"]
    .into_iter()
    .find_map(|size| text(images, size))
}

/// Require `key` to be present, or explain which field was missing.
pub fn required(obj: &Object, key: &str) -> std::result::Result<String, String> {
  text(obj, key).ok_or_else(|| format!("missing required field `{key}`"))
}
