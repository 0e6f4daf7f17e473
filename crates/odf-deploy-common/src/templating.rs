//! YAML manifest loading and rendering
//!
//! Manifests are handled as `serde_json::Value` documents so they can be
//! edited with JSON pointers before being written back out as YAML.

use std::io::Write;

use serde::Deserialize;
use serde_json::Value;
use tempfile::NamedTempFile;

use crate::Result;

/// Parse a (possibly multi-document) YAML string into JSON values.
///
/// Empty documents (e.g. a trailing `---`) are skipped.
pub fn parse_documents(input: &str) -> Result<Vec<Value>> {
    let mut docs = Vec::new();
    for document in serde_yaml::Deserializer::from_str(input) {
        let value = Value::deserialize(document)?;
        if !value.is_null() {
            docs.push(value);
        }
    }
    Ok(docs)
}

/// Parse a single-document YAML string
pub fn parse_document(input: &str) -> Result<Value> {
    Ok(serde_yaml::from_str(input)?)
}

/// Serialize documents as multi-document YAML
pub fn to_yaml(docs: &[Value]) -> Result<String> {
    let mut out = String::new();
    for (i, doc) in docs.iter().enumerate() {
        if i > 0 {
            out.push_str("---\n");
        }
        out.push_str(&serde_yaml::to_string(doc)?);
    }
    Ok(out)
}

/// Write documents to a new temporary file whose name starts with `prefix`.
///
/// The file is removed when the returned handle is dropped.
pub fn render_to_temp_file(docs: &[Value], prefix: &str) -> Result<NamedTempFile> {
    let mut file = tempfile::Builder::new()
        .prefix(prefix)
        .suffix(".yaml")
        .tempfile()?;
    file.write_all(to_yaml(docs)?.as_bytes())?;
    file.flush()?;
    Ok(file)
}
