// Validation - raw records against a collection's fields, effects returned not applied

mod path;

pub use path::{FieldPath, PathSegment};

use crate::loader::RawRecord;
use crate::schema::{BuildConfig, CollectionDefinition, FieldDefinition, FieldType};
use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Warning,
    /// The record is dropped from its collection
    Fatal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationIssue {
    pub file: PathBuf,
    /// Dot/index notation, prefixed with `[i]` for multi-record files
    pub field: String,
    pub message: String,
    pub severity: Severity,
}

impl ValidationIssue {
    pub fn is_fatal(&self) -> bool {
        self.severity == Severity::Fatal
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = match self.severity {
            Severity::Warning => "warning",
            Severity::Fatal => "error",
        };
        if self.field.is_empty() {
            write!(f, "{level}: {}: {}", self.file.display(), self.message)
        } else {
            write!(
                f,
                "{level}: {} ({}): {}",
                self.file.display(),
                self.field,
                self.message
            )
        }
    }
}

/// Per-record context threaded explicitly through every field check
#[derive(Debug, Clone, Copy)]
pub struct FieldContext<'a> {
    pub file: &'a Path,
    /// Path relative to the content root, forward slashes
    pub relative_path: &'a str,
    /// Index of the record within its file
    pub index: usize,
    pub multi: bool,
    pub body: Option<&'a str>,
}

impl<'a> FieldContext<'a> {
    pub fn label(&self, path: &FieldPath) -> String {
        let field = path.to_string();
        match (self.multi, field.is_empty()) {
            (false, _) => field,
            (true, true) => format!("[{}]", self.index),
            (true, false) => format!("[{}].{field}", self.index),
        }
    }

    pub fn file_stem(&self) -> String {
        self.file
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Implicit `_meta` object attached to every record
    pub fn meta(&self) -> Value {
        let relative = Path::new(self.relative_path);
        let mut meta = Map::new();
        meta.insert("path".into(), Value::String(self.relative_path.to_string()));
        meta.insert(
            "fileName".into(),
            Value::String(
                relative
                    .file_name()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_default(),
            ),
        );
        meta.insert(
            "directory".into(),
            Value::String(
                relative
                    .parent()
                    .map(crate::util::slash_path)
                    .unwrap_or_default(),
            ),
        );
        meta.insert(
            "extension".into(),
            Value::String(
                relative
                    .extension()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_default(),
            ),
        );
        if self.multi {
            meta.insert("index".into(), Value::from(self.index));
        }
        Value::Object(meta)
    }
}

/// A side effect requested by a field, applied after structural validation
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Extract the referenced file and replace the value with its public URL
    /// or image descriptor
    Asset {
        path: FieldPath,
        reference: String,
        metadata: bool,
    },
    /// Claim the value in a uniqueness scope
    Claim {
        path: FieldPath,
        scope: String,
        value: String,
    },
}

/// Outcome of structural validation for one record
#[derive(Debug, Clone)]
pub enum Validation {
    Valid {
        record: Value,
        effects: Vec<Effect>,
        warnings: Vec<ValidationIssue>,
    },
    Invalid {
        issues: Vec<ValidationIssue>,
    },
}

impl Validation {
    pub fn is_valid(&self) -> bool {
        matches!(self, Validation::Valid { .. })
    }

    pub fn issues(&self) -> &[ValidationIssue] {
        match self {
            Validation::Valid { warnings, .. } => warnings,
            Validation::Invalid { issues } => issues,
        }
    }
}

/// Validate one raw record. Every field is checked even after a failure so
/// the report lists all problems in the record at once.
pub fn validate_record(
    config: &BuildConfig,
    collection_name: &str,
    collection: &CollectionDefinition,
    raw: &RawRecord,
    ctx: &FieldContext<'_>,
) -> Validation {
    let mut validator = Validator {
        config,
        collection_name,
        ctx,
        issues: Vec::new(),
        effects: Vec::new(),
        regexes: HashMap::new(),
    };

    let input = match raw.data.as_object() {
        Some(map) => map,
        None => {
            validator.fatal(
                &FieldPath::root(),
                format!("Record data must be a mapping, got {}", type_name(&raw.data)),
            );
            return validator.finish(Value::Null);
        }
    };

    let mut record = validator.validate_fields(
        &collection.fields,
        input,
        &FieldPath::root(),
        collection.additional_properties,
    );

    if let Some(body) = ctx.body {
        if !record.contains_key("content") {
            record.insert("content".into(), Value::String(body.to_string()));
        }
    }
    record.insert("_meta".into(), ctx.meta());

    validator.finish(Value::Object(record))
}

struct Validator<'a> {
    config: &'a BuildConfig,
    collection_name: &'a str,
    ctx: &'a FieldContext<'a>,
    issues: Vec<ValidationIssue>,
    effects: Vec<Effect>,
    regexes: HashMap<String, Regex>,
}

impl<'a> Validator<'a> {
    fn finish(self, record: Value) -> Validation {
        if self.issues.iter().any(ValidationIssue::is_fatal) {
            Validation::Invalid {
                issues: self.issues,
            }
        } else {
            Validation::Valid {
                record,
                effects: self.effects,
                warnings: self.issues,
            }
        }
    }

    fn issue(&mut self, path: &FieldPath, message: String, severity: Severity) {
        self.issues.push(ValidationIssue {
            file: self.ctx.file.to_path_buf(),
            field: self.ctx.label(path),
            message,
            severity,
        });
    }

    fn fatal(&mut self, path: &FieldPath, message: String) {
        self.issue(path, message, Severity::Fatal);
    }

    fn validate_fields(
        &mut self,
        fields: &BTreeMap<String, FieldDefinition>,
        input: &Map<String, Value>,
        path: &FieldPath,
        additional_properties: bool,
    ) -> Map<String, Value> {
        let mut out = Map::new();

        for (name, def) in fields {
            let field_path = path.key(name);
            let mut value = input.get(name).filter(|v| !v.is_null()).cloned();
            if value.is_none() {
                value = def.default.clone();
            }
            if value.is_none() && def.field_type == FieldType::Slug {
                value = self.derive_slug(def, input);
            }

            match value {
                None if def.required => {
                    self.fatal(&field_path, format!("Required field '{name}' is missing"));
                }
                None => {}
                Some(v) => {
                    if let Some(v) = self.validate_value(def, v, &field_path) {
                        out.insert(name.clone(), v);
                    }
                }
            }
        }

        for (key, value) in input {
            if fields.contains_key(key) {
                continue;
            }
            if additional_properties {
                out.insert(key.clone(), value.clone());
            } else {
                self.issue(
                    &path.key(key),
                    format!("Unexpected field '{key}' (additional_properties is false)"),
                    Severity::Warning,
                );
            }
        }

        out
    }

    /// Slug from the `from` sibling field, or from the file stem
    fn derive_slug(&self, def: &FieldDefinition, siblings: &Map<String, Value>) -> Option<Value> {
        let source = match &def.from {
            Some(field) => siblings.get(field)?.as_str()?.to_string(),
            None => self.ctx.file_stem(),
        };
        let slug = slug::slugify(source);
        (!slug.is_empty()).then_some(Value::String(slug))
    }

    fn validate_value(
        &mut self,
        def: &FieldDefinition,
        value: Value,
        path: &FieldPath,
    ) -> Option<Value> {
        match &def.field_type {
            FieldType::List => return self.validate_list(def, value, path),
            FieldType::Object => return self.validate_object(def.fields.as_ref(), value, path),
            FieldType::Custom(type_name) => {
                let config = self.config;
                return self.validate_object(config.get_custom_type(type_name), value, path);
            }
            _ => {}
        }

        match self.check_scalar(def, value) {
            Ok(value) => {
                self.scalar_effects(def, &value, path);
                Some(value)
            }
            Err(message) => {
                self.fatal(path, message);
                None
            }
        }
    }

    fn validate_list(&mut self, def: &FieldDefinition, value: Value, path: &FieldPath) -> Option<Value> {
        let items = match value {
            Value::Array(items) => items,
            other => {
                self.fatal(path, format!("expected list, got {}", type_name(&other)));
                return None;
            }
        };
        if let Err(message) = check_bounds(def, items.len() as f64, "items") {
            self.fatal(path, message);
        }

        let item_def = match &def.items {
            Some(item_type) => item_type.definition().into_owned(),
            None => return Some(Value::Array(items)),
        };
        let out = items
            .into_iter()
            .enumerate()
            .filter_map(|(i, item)| self.validate_value(&item_def, item, &path.index(i)))
            .collect();
        Some(Value::Array(out))
    }

    fn validate_object(
        &mut self,
        fields: Option<&BTreeMap<String, FieldDefinition>>,
        value: Value,
        path: &FieldPath,
    ) -> Option<Value> {
        let map = match value {
            Value::Object(map) => map,
            other => {
                self.fatal(path, format!("expected object, got {}", type_name(&other)));
                return None;
            }
        };
        match fields {
            Some(fields) => Some(Value::Object(self.validate_fields(fields, &map, path, true))),
            None => Some(Value::Object(map)),
        }
    }

    fn check_scalar(&mut self, def: &FieldDefinition, value: Value) -> Result<Value, String> {
        match &def.field_type {
            FieldType::String => {
                let s = expect_str(&value, "string")?;
                check_bounds(def, s.chars().count() as f64, "characters")?;
                if let Some(enum_values) = &def.enum_values {
                    if !enum_values.iter().any(|e| e == s) {
                        return Err(format!("value '{s}' is not in enum: {enum_values:?}"));
                    }
                }
                if let Some(pattern) = &def.pattern {
                    let regex = self.regex(pattern)?;
                    if !regex.is_match(s) {
                        return Err(format!("value '{s}' does not match pattern '{pattern}'"));
                    }
                }
                check_reserved(def, s)?;
                Ok(value)
            }
            FieldType::Slug => {
                let s = expect_str(&value, "slug")?;
                let normalized = slug::slugify(s);
                if normalized != s {
                    return Err(format!("'{s}' is not a valid slug (did you mean '{normalized}'?)"));
                }
                check_reserved(def, s)?;
                Ok(value)
            }
            FieldType::Number => {
                let n = value
                    .as_f64()
                    .ok_or_else(|| format!("expected number, got {}", type_name(&value)))?;
                check_bounds(def, n, "")?;
                Ok(value)
            }
            FieldType::Integer => {
                if !(value.is_i64() || value.is_u64()) {
                    return Err(format!("expected integer, got {}", type_name(&value)));
                }
                check_bounds(def, value.as_f64().unwrap_or_default(), "")?;
                Ok(value)
            }
            FieldType::Boolean => {
                if value.is_boolean() {
                    Ok(value)
                } else {
                    Err(format!("expected boolean, got {}", type_name(&value)))
                }
            }
            FieldType::Date => {
                let s = expect_str(&value, "date string")?;
                parse_date(s).map(Value::String)
            }
            FieldType::Datetime => {
                let s = expect_str(&value, "datetime string")?;
                parse_datetime(s).map(Value::String)
            }
            FieldType::Image | FieldType::File => {
                let s = expect_str(&value, "file reference")?;
                if s.trim().is_empty() {
                    return Err("file reference is empty".into());
                }
                Ok(value)
            }
            FieldType::Any | FieldType::List | FieldType::Object | FieldType::Custom(_) => {
                Ok(value)
            }
        }
    }

    fn scalar_effects(&mut self, def: &FieldDefinition, value: &Value, path: &FieldPath) {
        if let (FieldType::Image | FieldType::File, Some(reference)) =
            (&def.field_type, value.as_str())
        {
            self.effects.push(Effect::Asset {
                path: path.clone(),
                reference: reference.to_string(),
                metadata: def.field_type == FieldType::Image && def.metadata,
            });
        }

        let scope = def
            .unique
            .as_ref()
            .and_then(|u| u.scope_name(self.collection_name, &path.schema_path()));
        if let Some(scope) = scope {
            let claimed = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            self.effects.push(Effect::Claim {
                path: path.clone(),
                scope,
                value: claimed,
            });
        }
    }

    fn regex(&mut self, pattern: &str) -> Result<&Regex, String> {
        if !self.regexes.contains_key(pattern) {
            let regex = Regex::new(pattern).map_err(|e| format!("invalid pattern: {e}"))?;
            self.regexes.insert(pattern.to_string(), regex);
        }
        self.regexes
            .get(pattern)
            .ok_or_else(|| format!("invalid pattern '{pattern}'"))
    }
}

fn expect_str<'v>(value: &'v Value, expected: &str) -> Result<&'v str, String> {
    value
        .as_str()
        .ok_or_else(|| format!("expected {expected}, got {}", type_name(value)))
}

fn check_bounds(def: &FieldDefinition, n: f64, unit: &str) -> Result<(), String> {
    let unit = if unit.is_empty() { String::new() } else { format!(" {unit}") };
    if let Some(min) = def.min {
        if n < min {
            return Err(format!("must be at least {min}{unit}, got {n}"));
        }
    }
    if let Some(max) = def.max {
        if n > max {
            return Err(format!("must be at most {max}{unit}, got {n}"));
        }
    }
    Ok(())
}

fn check_reserved(def: &FieldDefinition, s: &str) -> Result<(), String> {
    if def.reserved.iter().any(|r| r == s) {
        Err(format!("'{s}' is a reserved value"))
    } else {
        Ok(())
    }
}

/// Normalize to `YYYY-MM-DD`; a full timestamp keeps its date part
fn parse_date(s: &str) -> Result<String, String> {
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Ok(date.format("%Y-%m-%d").to_string());
    }
    parse_timestamp(s)
        .map(|dt| dt.date_naive().format("%Y-%m-%d").to_string())
        .ok_or_else(|| format!("'{s}' is not a valid date (expected YYYY-MM-DD)"))
}

/// Normalize to RFC 3339 in UTC; naive values are taken as UTC
fn parse_datetime(s: &str) -> Result<String, String> {
    parse_timestamp(s)
        .or_else(|| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(|naive| naive.and_utc())
        })
        .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Secs, true))
        .ok_or_else(|| format!("'{s}' is not a valid datetime (expected RFC 3339)"))
}

fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(s, format).ok())
        .map(|naive| naive.and_utc())
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::parse_config_str;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn test_config() -> BuildConfig {
        parse_config_str(
            r#"
types:
  author:
    name: { type: string, required: true }
    email: { type: string, pattern: "^[^@]+@[^@]+$" }

collections:
  posts:
    pattern: "posts/*.md"
    fields:
      title: { type: string, required: true, min: 2, max: 80 }
      slug: { type: slug, from: title, unique: true, reserved: [admin, drafts] }
      status: { type: string, enum: [draft, published], default: draft }
      date: { type: date }
      updated: { type: datetime }
      rating: { type: number, min: 0, max: 5 }
      views: { type: integer }
      featured: { type: boolean }
      tags: { type: list, items: string, max: 3 }
      author: { type: author }
      cover: { type: image }
      attachment: { type: file }
      seo:
        type: object
        fields:
          description: { type: string, required: true }

  people:
    pattern: "people.yaml"
    additional_properties: false
    fields:
      name: { type: string, required: true }
      handle: { type: slug, unique: handles }
"#,
        )
        .unwrap()
    }

    fn ctx<'a>(file: &'a Path, relative: &'a str) -> FieldContext<'a> {
        FieldContext {
            file,
            relative_path: relative,
            index: 0,
            multi: false,
            body: Some("Body text"),
        }
    }

    fn run(collection: &str, data: Value) -> Validation {
        let config = test_config();
        let file = Path::new("/site/content/posts/hello-world.md");
        validate_record(
            &config,
            collection,
            &config.collections[collection],
            &RawRecord::data(data),
            &ctx(file, "posts/hello-world.md"),
        )
    }

    fn fields_with_issues(validation: &Validation) -> Vec<String> {
        validation.issues().iter().map(|i| i.field.clone()).collect()
    }

    #[test]
    fn test_valid_post_with_defaults_and_implicit_fields() {
        let validation = run("posts", json!({ "title": "Hello World", "date": "2024-03-01" }));
        let Validation::Valid { record, effects, warnings } = validation else {
            panic!("expected valid record");
        };
        assert!(warnings.is_empty());
        assert_eq!(record["status"], json!("draft"));
        assert_eq!(record["slug"], json!("hello-world"));
        assert_eq!(record["content"], json!("Body text"));
        assert_eq!(
            record["_meta"],
            json!({
                "path": "posts/hello-world.md",
                "fileName": "hello-world.md",
                "directory": "posts",
                "extension": "md"
            })
        );
        assert_eq!(
            effects,
            vec![Effect::Claim {
                path: FieldPath::root().key("slug"),
                scope: "posts.slug".into(),
                value: "hello-world".into(),
            }]
        );
    }

    #[test]
    fn test_report_all_issues_in_record() {
        let validation = run(
            "posts",
            json!({
                "status": "archived",
                "rating": 9,
                "views": 1.5,
                "featured": "yes",
                "tags": "rust"
            }),
        );
        assert!(!validation.is_valid());
        let mut fields = fields_with_issues(&validation);
        fields.sort();
        assert_eq!(
            fields,
            vec!["featured", "rating", "status", "tags", "title", "views"]
        );
        assert!(validation.issues().iter().all(ValidationIssue::is_fatal));
    }

    #[test]
    fn test_slug_derived_from_file_stem_when_no_source() {
        let validation = run("people", json!({ "name": "Ada" }));
        let Validation::Valid { record, effects, .. } = validation else {
            panic!("expected valid record");
        };
        assert_eq!(record["handle"], json!("hello-world"));
        assert!(matches!(&effects[0], Effect::Claim { scope, .. } if scope == "handles"));
    }

    #[test]
    fn test_invalid_and_reserved_slugs() {
        let invalid = run("posts", json!({ "title": "Hi", "slug": "Not A Slug" }));
        assert!(invalid.issues()[0].message.contains("did you mean 'not-a-slug'"));

        let reserved = run("posts", json!({ "title": "Admin" }));
        assert_eq!(fields_with_issues(&reserved), vec!["slug"]);
        assert!(reserved.issues()[0].message.contains("reserved"));
    }

    #[test]
    fn test_nested_paths_in_issues() {
        let validation = run(
            "posts",
            json!({
                "title": "Hello",
                "author": { "email": "nope" },
                "tags": ["a", 2],
                "seo": {}
            }),
        );
        let mut fields = fields_with_issues(&validation);
        fields.sort();
        assert_eq!(
            fields,
            vec!["author.email", "author.name", "seo.description", "tags[1]"]
        );
    }

    #[test]
    fn test_list_length_bound() {
        let validation = run("posts", json!({ "title": "Hello", "tags": ["a", "b", "c", "d"] }));
        assert_eq!(fields_with_issues(&validation), vec!["tags"]);
    }

    #[test]
    fn test_asset_effects() {
        let validation = run(
            "posts",
            json!({ "title": "Hello", "cover": "./cover.png", "attachment": "files/a.pdf" }),
        );
        let Validation::Valid { effects, .. } = validation else {
            panic!("expected valid record");
        };
        assert!(effects.contains(&Effect::Asset {
            path: FieldPath::root().key("cover"),
            reference: "./cover.png".into(),
            metadata: true,
        }));
        assert!(effects.contains(&Effect::Asset {
            path: FieldPath::root().key("attachment"),
            reference: "files/a.pdf".into(),
            metadata: false,
        }));
    }

    #[test]
    fn test_dates_are_normalized() {
        let validation = run(
            "posts",
            json!({ "title": "Hello", "date": "2024-03-01T10:00:00Z", "updated": "2024-03-01 08:30:00" }),
        );
        let Validation::Valid { record, .. } = validation else {
            panic!("expected valid record");
        };
        assert_eq!(record["date"], json!("2024-03-01"));
        assert_eq!(record["updated"], json!("2024-03-01T08:30:00Z"));

        let bad = run("posts", json!({ "title": "Hello", "date": "March 1st" }));
        assert_eq!(fields_with_issues(&bad), vec!["date"]);
    }

    #[test]
    fn test_unexpected_field_is_warning_and_dropped() {
        let validation = run("people", json!({ "name": "Ada", "extra": 1 }));
        let Validation::Valid { record, warnings, .. } = validation else {
            panic!("expected valid record");
        };
        assert!(record.get("extra").is_none());
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].severity, Severity::Warning);
        assert_eq!(warnings[0].field, "extra");
    }

    #[test]
    fn test_multi_record_files_prefix_index() {
        let config = test_config();
        let file = Path::new("/site/content/people.yaml");
        let context = FieldContext {
            file,
            relative_path: "people.yaml",
            index: 2,
            multi: true,
            body: None,
        };
        let validation = validate_record(
            &config,
            "people",
            &config.collections["people"],
            &RawRecord::data(json!({ "handle": "ok" })),
            &context,
        );
        assert_eq!(fields_with_issues(&validation), vec!["[2].name"]);
    }

    #[test]
    fn test_non_mapping_record_is_fatal() {
        let validation = run("posts", json!(["not", "a", "mapping"]));
        assert!(!validation.is_valid());
        assert!(validation.issues()[0].message.contains("got list"));
    }
}
