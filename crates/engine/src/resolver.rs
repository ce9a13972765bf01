//! Variable resolution for task inputs.
//!
//! String input values may carry one placeholder:
//!
//! - `${task:<taskId>.<dot.path>}` reads the stored result of an earlier task
//!   and walks the path into it.
//! - `${input.<key>[.path]}` reads the workflow-level input.
//!
//! Only the first `${...}` in a value is considered and the substituted text
//! is not scanned again, so a result that itself contains `${...}` stays
//! literal. A value that is exactly one placeholder becomes the referenced
//! JSON value with its type intact; a placeholder surrounded by other text is
//! interpolated as text. Missing results and path segments resolve to `null`.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

/// What a placeholder points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reference<'a> {
    TaskOutput { task_id: &'a str, path: Vec<&'a str> },
    Input { path: Vec<&'a str> },
}

/// A recognised placeholder and its byte span in the source string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placeholder<'a> {
    pub start: usize,
    pub end: usize,
    pub reference: Reference<'a>,
}

impl Placeholder<'_> {
    fn spans_whole(&self, source: &str) -> bool {
        self.start == 0 && self.end == source.len()
    }
}

/// Find the first `${...}` in `source` and parse its body.
///
/// Returns `None` when there is no complete placeholder or the body is not
/// one of the two recognised forms.
pub fn parse_placeholder(source: &str) -> Option<Placeholder<'_>> {
    let start = source.find("${")?;
    let body_start = start + 2;
    let body_len = source[body_start..].find('}')?;
    let body = source[body_start..body_start + body_len].trim();
    let end = body_start + body_len + 1;

    let reference = if let Some(rest) = body.strip_prefix("task:") {
        let mut segments = rest.split('.');
        let task_id = segments.next().filter(|id| !id.is_empty())?;
        Reference::TaskOutput {
            task_id,
            path: segments.collect(),
        }
    } else if body == "input" {
        Reference::Input { path: Vec::new() }
    } else if let Some(rest) = body.strip_prefix("input.") {
        Reference::Input {
            path: rest.split('.').collect(),
        }
    } else {
        return None;
    };

    let (Reference::TaskOutput { path, .. } | Reference::Input { path }) = &reference;
    if path.iter().any(|segment| segment.is_empty()) {
        return None;
    }

    Some(Placeholder { start, end, reference })
}

/// Where placeholder values come from.
#[derive(Debug, Clone, Copy)]
pub struct ResolveContext<'a> {
    pub task_results: &'a BTreeMap<String, Value>,
    pub input: &'a Value,
}

impl<'a> ResolveContext<'a> {
    pub fn new(task_results: &'a BTreeMap<String, Value>, input: &'a Value) -> Self {
        Self { task_results, input }
    }

    fn lookup(&self, reference: &Reference<'_>) -> Value {
        match reference {
            Reference::TaskOutput { task_id, path } => self
                .task_results
                .get(*task_id)
                .map(|result| walk(result, path))
                .unwrap_or(Value::Null),
            Reference::Input { path } => walk(self.input, path),
        }
    }
}

/// Follow `path` through objects (by key) and arrays (by index).
pub fn walk(root: &Value, path: &[&str]) -> Value {
    let mut current = root;
    for segment in path {
        let next = match current {
            Value::Object(map) => map.get(*segment),
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        };
        match next {
            Some(value) => current = value,
            None => return Value::Null,
        }
    }
    current.clone()
}

/// Resolve one input value. Non-strings pass through unchanged.
pub fn resolve_value(value: &Value, ctx: &ResolveContext<'_>) -> Value {
    let Value::String(source) = value else {
        return value.clone();
    };
    let Some(placeholder) = parse_placeholder(source) else {
        return value.clone();
    };

    let resolved = ctx.lookup(&placeholder.reference);
    if placeholder.spans_whole(source) {
        return resolved;
    }

    let rendered = match resolved {
        Value::String(s) => s,
        other => other.to_string(),
    };
    Value::String(format!(
        "{}{}{}",
        &source[..placeholder.start],
        rendered,
        &source[placeholder.end..]
    ))
}

/// Resolve every top-level field of a task's input map.
pub fn resolve_input(input: &Map<String, Value>, ctx: &ResolveContext<'_>) -> Map<String, Value> {
    input
        .iter()
        .map(|(key, value)| (key.clone(), resolve_value(value, ctx)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn results() -> BTreeMap<String, Value> {
        let mut results = BTreeMap::new();
        results.insert("A".to_string(), json!({ "output": { "x": 1, "tags": ["seo", "perf"] } }));
        results.insert("greet".to_string(), json!("hello"));
        results
    }

    fn resolve(source: &str) -> Value {
        let results = results();
        let input = json!({ "url": "https://example.com", "depth": 3, "nested": { "k": true } });
        resolve_value(&json!(source), &ResolveContext::new(&results, &input))
    }

    #[test]
    fn task_output_path_keeps_json_type() {
        assert_eq!(resolve("${task:A.output.x}"), json!(1));
    }

    #[test]
    fn task_reference_without_path_yields_whole_result() {
        assert_eq!(resolve("${task:greet}"), json!("hello"));
        assert_eq!(resolve("${task:A}"), json!({ "output": { "x": 1, "tags": ["seo", "perf"] } }));
    }

    #[test]
    fn array_segments_index_into_lists() {
        assert_eq!(resolve("${task:A.output.tags.1}"), json!("perf"));
        assert_eq!(resolve("${task:A.output.tags.9}"), Value::Null);
    }

    #[test]
    fn input_references_read_workflow_input() {
        assert_eq!(resolve("${input.depth}"), json!(3));
        assert_eq!(resolve("${input.nested.k}"), json!(true));
        assert_eq!(resolve("${input}")["url"], "https://example.com");
    }

    #[test]
    fn missing_values_resolve_to_null() {
        assert_eq!(resolve("${task:A.output.y}"), Value::Null);
        assert_eq!(resolve("${task:unknown.output}"), Value::Null);
        assert_eq!(resolve("${input.missing}"), Value::Null);
    }

    #[test]
    fn embedded_placeholder_is_interpolated_as_text() {
        assert_eq!(resolve("crawl ${input.url} now"), json!("crawl https://example.com now"));
        assert_eq!(resolve("x=${task:A.output.x}"), json!("x=1"));
        assert_eq!(resolve("missing=${input.nope}"), json!("missing=null"));
    }

    #[test]
    fn only_the_first_placeholder_is_substituted() {
        assert_eq!(resolve("${input.depth}-${input.url}"), json!("3-${input.url}"));
    }

    #[test]
    fn substituted_text_is_not_rescanned() {
        let mut results = BTreeMap::new();
        results.insert("t".to_string(), json!("${input.secret}"));
        let input = json!({ "secret": "leak" });
        let ctx = ResolveContext::new(&results, &input);
        assert_eq!(resolve_value(&json!("${task:t}"), &ctx), json!("${input.secret}"));
    }

    #[test]
    fn unrecognised_or_malformed_placeholders_pass_through() {
        assert_eq!(resolve("${env.HOME}"), json!("${env.HOME}"));
        assert_eq!(resolve("${task:}"), json!("${task:}"));
        assert_eq!(resolve("${input.}"), json!("${input.}"));
        assert_eq!(resolve("${input.url"), json!("${input.url"));
        assert_eq!(resolve("plain text"), json!("plain text"));
    }

    #[test]
    fn empty_path_segments_are_rejected_for_both_forms() {
        assert_eq!(parse_placeholder("${task:A..x}"), None);
        assert_eq!(parse_placeholder("${task:A.output.}"), None);
        assert_eq!(parse_placeholder("${input.a..b}"), None);
        assert_eq!(resolve("${input.nested..k}"), json!("${input.nested..k}"));
        assert!(parse_placeholder("${input.nested.k}").is_some());
    }

    #[test]
    fn non_string_values_pass_through() {
        let results = results();
        let input = Value::Null;
        let ctx = ResolveContext::new(&results, &input);
        for value in [json!(7), json!(null), json!({ "v": "${input.url}" }), json!(["${task:A}"])] {
            assert_eq!(resolve_value(&value, &ctx), value);
        }
    }

    #[test]
    fn whole_input_map_is_resolved_field_by_field() {
        let results = results();
        let input = json!({ "url": "https://example.com" });
        let mut map = Map::new();
        map.insert("x".into(), json!("${task:A.output.x}"));
        map.insert("url".into(), json!("${input.url}"));
        map.insert("limit".into(), json!(10));

        let resolved = resolve_input(&map, &ResolveContext::new(&results, &input));
        assert_eq!(Value::Object(resolved), json!({ "x": 1, "url": "https://example.com", "limit": 10 }));
    }

    #[test]
    fn parser_reports_span_and_reference() {
        let p = parse_placeholder("go ${ task:fetch.body.title }!").expect("placeholder");
        assert_eq!(p.start, 3);
        assert_eq!(p.end, 29);
        assert_eq!(
            p.reference,
            Reference::TaskOutput { task_id: "fetch", path: vec!["body", "title"] }
        );
    }
}
