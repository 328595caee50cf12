//! Text and tabular transforms for the document category.
//!
//! Line-oriented, markdown-like text goes to HTML or plain text; CSV and JSON
//! convert into each other. Every other pairing passes the text through.

use crate::error::ConvertError;
use crate::output::Artifact;
use crate::registry::mime_for;
use crate::request::InputFile;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use tracing::debug;

static HTML_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").unwrap());
static HEADING_MARKER: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^#{1,6} ").unwrap());
static BOLD_MARKER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*\*").unwrap());

/// Which transform applies to a (source extension, target) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextTransform {
    Html,
    PlainText,
    CsvToJson,
    JsonToCsv,
    Passthrough,
}

impl TextTransform {
    pub fn select(source_ext: Option<&str>, target: &str) -> Self {
        match (source_ext, target) {
            (_, "html") => TextTransform::Html,
            (_, "txt") => TextTransform::PlainText,
            (Some("csv"), "json") => TextTransform::CsvToJson,
            (Some("json"), "csv") => TextTransform::JsonToCsv,
            _ => TextTransform::Passthrough,
        }
    }
}

/// Convert `input` to the document format named by `target`.
pub fn transform(input: &InputFile, target: &str) -> Result<Artifact, ConvertError> {
    let target = target.trim_start_matches('.').to_lowercase();
    let text = String::from_utf8_lossy(&input.bytes);
    let ext = input.extension();
    let kind = TextTransform::select(ext.as_deref(), &target);
    debug!("Text transform {:?} for {}", kind, input.name);

    let body = match kind {
        TextTransform::Html => to_html(&text, input.base_name()),
        TextTransform::PlainText => to_plain_text(&text),
        TextTransform::CsvToJson => csv_to_json(&text)?,
        TextTransform::JsonToCsv => json_to_csv(&text)?,
        TextTransform::Passthrough => text.into_owned(),
    };

    Ok(Artifact::new(
        format!("{}.{}", input.base_name(), target),
        mime_for(&target),
        body.into_bytes(),
    ))
}

/// Headings, paragraphs and blank-line breaks, wrapped in a minimal document.
///
/// Content is emitted verbatim; markup in the source stays markup.
pub fn to_html(text: &str, title: &str) -> String {
    let body = text
        .split('\n')
        .map(|raw| {
            let line = raw.trim_end_matches('\r');
            if let Some(rest) = line.strip_prefix("### ") {
                format!("<h3>{rest}</h3>")
            } else if let Some(rest) = line.strip_prefix("## ") {
                format!("<h2>{rest}</h2>")
            } else if let Some(rest) = line.strip_prefix("# ") {
                format!("<h1>{rest}</h1>")
            } else if line.trim().is_empty() {
                "<br>".to_string()
            } else {
                format!("<p>{line}</p>")
            }
        })
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "<!DOCTYPE html>\n<html>\n<head><meta charset=\"utf-8\"><title>{title}</title></head>\n<body>\n{body}\n</body>\n</html>\n"
    )
}

/// Strip tags, heading markers and `**` emphasis.
pub fn to_plain_text(text: &str) -> String {
    let text = HTML_TAG.replace_all(text, "");
    let text = HEADING_MARKER.replace_all(&text, "");
    BOLD_MARKER.replace_all(&text, "").into_owned()
}

/// Strip one surrounding double quote from each end. Whitespace is kept.
fn unquote(field: &str) -> &str {
    let field = field.strip_prefix('"').unwrap_or(field);
    field.strip_suffix('"').unwrap_or(field)
}

/// First non-blank line is the header; one object per following row.
pub fn csv_to_json(text: &str) -> Result<String, ConvertError> {
    let mut lines = text
        .lines()
        .map(|l| l.trim_end_matches('\r'))
        .filter(|l| !l.trim().is_empty());

    let headers: Vec<&str> = match lines.next() {
        Some(header) => header.split(',').map(unquote).collect(),
        None => return Ok("[]".to_string()),
    };

    let rows: Vec<Value> = lines
        .map(|line| {
            let values: Vec<&str> = line.split(',').map(unquote).collect();
            let record: Map<String, Value> = headers
                .iter()
                .enumerate()
                .map(|(i, h)| {
                    let v = values.get(i).copied().unwrap_or("");
                    (h.to_string(), Value::String(v.to_string()))
                })
                .collect();
            Value::Object(record)
        })
        .collect();

    serde_json::to_string_pretty(&rows).map_err(ConvertError::encode)
}

fn cell(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Bool(b)) => b.to_string(),
        Some(Value::Number(n)) => n.to_string(),
        Some(nested) => nested.to_string(),
    }
}

/// Object or array of objects to CSV; headers come from the first element.
pub fn json_to_csv(text: &str) -> Result<String, ConvertError> {
    let parsed: Value = serde_json::from_str(text).map_err(ConvertError::parse)?;
    let items = match parsed {
        Value::Array(items) => items,
        obj @ Value::Object(_) => vec![obj],
        other => {
            return Err(ConvertError::parse(format!(
                "expected an object or an array, found {other}"
            )))
        }
    };

    let headers: Vec<String> = match items.first() {
        Some(Value::Object(first)) => first.keys().cloned().collect(),
        _ => Vec::new(),
    };

    let mut out = vec![headers.join(",")];
    for item in &items {
        let row = headers
            .iter()
            .map(|h| format!("\"{}\"", cell(item.get(h))))
            .collect::<Vec<_>>()
            .join(",");
        out.push(row);
    }
    Ok(out.join("\n"))
}
