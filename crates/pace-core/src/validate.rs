use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

const REQUIRED_FIELDS: &[&str] = &["id", "category", "description", "priority", "passes"];
const KNOWN_PRIORITIES: &[&str] = &["critical", "high", "medium", "low"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Issue {
    pub feature_id: String,
    pub field: String,
    pub message: String,
}

impl Issue {
    fn new(feature_id: &str, field: &str, message: impl Into<String>) -> Self {
        Self {
            feature_id: feature_id.to_string(),
            field: field.to_string(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Stats {
    pub total: usize,
    pub passing: usize,
    pub failing: usize,
    pub by_category: BTreeMap<String, usize>,
    pub by_priority: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<Issue>,
    pub warnings: Vec<Issue>,
    pub stats: Stats,
}

/// Validate the feature list at `path`. Unreadable or unparsable files
/// produce a report with a single error rather than an `Err`.
pub fn validate_file(path: &Path) -> ValidationReport {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) => return failed("file", format!("cannot read {}: {e}", path.display())),
    };
    match serde_json::from_str::<Value>(&raw) {
        Ok(doc) => validate_document(&doc),
        Err(e) => failed("json", format!("parse error: {e}")),
    }
}

fn failed(field: &str, message: String) -> ValidationReport {
    ValidationReport {
        valid: false,
        errors: vec![Issue::new("root", field, message)],
        ..Default::default()
    }
}

/// Structural checks over a parsed document. Works on `Value` so malformed
/// features are reported individually.
pub fn validate_document(doc: &Value) -> ValidationReport {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    let empty = Vec::new();
    let features = doc
        .get("features")
        .and_then(Value::as_array)
        .unwrap_or(&empty);
    if features.is_empty() {
        errors.push(Issue::new("root", "features", "no features found"));
    }

    for (i, f) in features.iter().enumerate() {
        let fallback = format!("index_{i}");
        let fid = f.get("id").and_then(Value::as_str).unwrap_or(&fallback);
        check_feature(fid, f, &mut errors, &mut warnings);
    }

    let mut seen: HashMap<&str, usize> = HashMap::new();
    for id in features.iter().filter_map(|f| f.get("id").and_then(Value::as_str)) {
        *seen.entry(id).or_default() += 1;
    }
    let mut dupes: Vec<&str> = seen
        .into_iter()
        .filter(|(id, n)| *n > 1 && !id.is_empty())
        .map(|(id, _)| id)
        .collect();
    dupes.sort_unstable();
    for id in dupes {
        errors.push(Issue::new(id, "id", "duplicate feature id"));
    }

    ValidationReport {
        valid: errors.is_empty(),
        errors,
        warnings,
        stats: stats(features),
    }
}

fn check_feature(fid: &str, f: &Value, errors: &mut Vec<Issue>, warnings: &mut Vec<Issue>) {
    let Some(obj) = f.as_object() else {
        errors.push(Issue::new(fid, "feature", "feature must be an object"));
        return;
    };

    for field in REQUIRED_FIELDS {
        match obj.get(*field) {
            None => errors.push(Issue::new(fid, field, "missing required field")),
            Some(Value::Null) => errors.push(Issue::new(fid, field, "field is null")),
            Some(_) => {}
        }
    }

    if let Some(p) = obj.get("priority").filter(|v| !v.is_null()) {
        let known = p.as_str().is_some_and(|s| KNOWN_PRIORITIES.contains(&s));
        if !known {
            errors.push(Issue::new(
                fid,
                "priority",
                format!("invalid priority {p}; must be one of critical, high, medium, low"),
            ));
        }
    }

    if let Some(p) = obj.get("passes").filter(|v| !v.is_null()) {
        if !p.is_boolean() {
            errors.push(Issue::new(fid, "passes", format!("must be boolean, got {}", type_name(p))));
        }
    }

    if let Some(d) = obj.get("description").filter(|v| !v.is_null()) {
        match d.as_str() {
            None => errors.push(Issue::new(fid, "description", "must be a string")),
            Some(s) if s.trim().is_empty() => {
                errors.push(Issue::new(fid, "description", "empty description"))
            }
            Some(_) => {}
        }
    }

    match obj.get("steps") {
        None | Some(Value::Null) => warnings.push(Issue::new(fid, "steps", "no verification steps")),
        Some(Value::Array(steps)) if steps.is_empty() => {
            warnings.push(Issue::new(fid, "steps", "no verification steps"))
        }
        Some(Value::Array(_)) => {}
        Some(_) => errors.push(Issue::new(fid, "steps", "steps must be an array")),
    }
}

fn stats(features: &[Value]) -> Stats {
    let mut stats = Stats {
        total: features.len(),
        ..Default::default()
    };
    for f in features {
        if f.get("passes").and_then(Value::as_bool).unwrap_or(false) {
            stats.passing += 1;
        }
        let category = f
            .get("category")
            .and_then(Value::as_str)
            .unwrap_or("uncategorized");
        *stats.by_category.entry(category.to_string()).or_default() += 1;
        let priority = f.get("priority").and_then(Value::as_str).unwrap_or("unknown");
        *stats.by_priority.entry(priority.to_string()).or_default() += 1;
    }
    stats.failing = stats.total - stats.passing;
    stats
}

fn type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
