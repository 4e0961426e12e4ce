use super::types::{BuildConfig, FieldDefinition, FieldType};
use crate::asset::FileNameTemplate;
use crate::error::{ContentError, Result};
use std::collections::BTreeMap;
use std::path::Path;

/// Parse a contentkit.yaml file into a BuildConfig
pub fn parse_config(path: &Path) -> Result<BuildConfig> {
    let content = std::fs::read_to_string(path)?;
    parse_config_str(&content)
}

/// Parse a config YAML string and check it for semantic errors
pub fn parse_config_str(content: &str) -> Result<BuildConfig> {
    let config: BuildConfig = serde_yaml::from_str(content)?;
    let problems = check_config(&config);
    if !problems.is_empty() {
        return Err(ContentError::Config(problems.join("; ")));
    }
    Ok(config)
}

/// Collect every semantic problem in the config instead of stopping at the first.
pub fn check_config(config: &BuildConfig) -> Vec<String> {
    let mut problems = Vec::new();

    if let Err(e) = FileNameTemplate::parse(&config.assets.file_name) {
        problems.push(e.to_string());
    }
    if config.assets.preview_width == 0 {
        problems.push("assets.preview_width must be greater than zero".into());
    }

    for (type_name, fields) in &config.types {
        check_fields(config, &format!("type '{type_name}'"), fields, &mut problems);
    }

    for (name, collection) in &config.collections {
        if !name.chars().any(|c| c.is_ascii_alphabetic()) {
            problems.push(format!("Collection name '{name}' must contain a letter"));
        }
        let patterns = collection.patterns();
        if patterns.is_empty() {
            problems.push(format!("Collection '{name}' has no patterns"));
        }
        for pattern in patterns {
            if let Err(e) = glob::Pattern::new(pattern) {
                problems.push(format!("Collection '{name}': invalid pattern '{pattern}': {e}"));
            }
        }
        check_fields(config, &format!("collection '{name}'"), &collection.fields, &mut problems);
    }

    problems
}

fn check_fields(
    config: &BuildConfig,
    owner: &str,
    fields: &BTreeMap<String, FieldDefinition>,
    problems: &mut Vec<String>,
) {
    for (field_name, def) in fields {
        check_field(config, owner, field_name, def, problems);
    }
}

fn check_field(
    config: &BuildConfig,
    owner: &str,
    field_name: &str,
    def: &FieldDefinition,
    problems: &mut Vec<String>,
) {
    if let FieldType::Custom(type_name) = &def.field_type {
        if !config.types.contains_key(type_name) {
            problems.push(format!(
                "{owner}: field '{field_name}' has unknown type '{type_name}'"
            ));
        }
    }
    if let Some(pattern) = &def.pattern {
        if let Err(e) = regex::Regex::new(pattern) {
            problems.push(format!("{owner}: field '{field_name}' has invalid pattern: {e}"));
        }
    }
    if def.from.is_some() && def.field_type != FieldType::Slug {
        problems.push(format!(
            "{owner}: field '{field_name}' uses 'from' but is not a slug"
        ));
    }
    if def.unique.is_some() && !def.field_type.is_claimable() {
        problems.push(format!(
            "{owner}: field '{field_name}' cannot be unique (type {:?})",
            def.field_type
        ));
    }
    if let (Some(min), Some(max)) = (def.min, def.max) {
        if min > max {
            problems.push(format!("{owner}: field '{field_name}' has min > max"));
        }
    }
    if let Some(items) = &def.items {
        check_field(config, owner, &format!("{field_name}[]"), &items.definition(), problems);
    }
    if let Some(sub_fields) = &def.fields {
        for (sub_name, sub_def) in sub_fields {
            check_field(config, owner, &format!("{field_name}.{sub_name}"), sub_def, problems);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{PatternList, UniqueScope};

    #[test]
    fn test_parse_full_config() {
        let config = parse_config_str(
            r#"
content: site/content
output: site/.generated
strict: true
assets:
  dir: site/public/media
  public_path: /media/
  file_name: "[hash:12].[ext]"
  ignore: [svg]
types:
  author:
    name: { type: string, required: true }
collections:
  posts:
    pattern: ["posts/*.md", "drafts/*.md"]
    fields:
      title: { type: string, required: true }
      slug: { type: slug, from: title, unique: true, reserved: [admin] }
      tags: { type: list, items: string }
      author: { type: author }
  settings:
    pattern: settings.yaml
    single: true
"#,
        )
        .unwrap();

        assert!(config.strict);
        assert_eq!(config.assets.public_path, "/media/");
        assert_eq!(config.assets.ignore, vec!["svg".to_string()]);
        assert_eq!(config.assets.preview_width, 8);

        let posts = &config.collections["posts"];
        assert!(matches!(posts.pattern, PatternList::Many(_)));
        assert_eq!(posts.patterns(), vec!["posts/*.md", "drafts/*.md"]);
        assert!(posts.additional_properties);
        assert!(matches!(posts.fields["slug"].unique, Some(UniqueScope::Flag(true))));
        assert_eq!(posts.fields["slug"].reserved, vec!["admin".to_string()]);
        assert_eq!(
            posts.fields["author"].field_type,
            FieldType::Custom("author".into())
        );

        assert!(config.collections["settings"].single);
    }

    #[test]
    fn test_defaults_when_sections_missing() {
        let config = parse_config_str("collections: {}").unwrap();
        assert_eq!(config.content, std::path::PathBuf::from("content"));
        assert_eq!(config.assets.file_name, "[name]-[hash:8].[ext]");
        assert!(!config.strict);
    }

    #[test]
    fn test_unknown_custom_type_rejected() {
        let err = parse_config_str(
            r#"
collections:
  posts:
    pattern: "posts/*.md"
    fields:
      author: { type: person }
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("unknown type 'person'"));
    }

    #[test]
    fn test_all_problems_reported() {
        let err = parse_config_str(
            r#"
assets:
  file_name: "[name]-[checksum].[ext]"
collections:
  posts:
    pattern: "posts/[*.md"
    fields:
      title: { type: string, from: name }
      cover: { type: image, unique: true }
      code: { type: string, pattern: "(" }
"#,
        )
        .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("checksum"), "{message}");
        assert!(message.contains("invalid pattern 'posts/[*.md'"), "{message}");
        assert!(message.contains("'title' uses 'from'"), "{message}");
        assert!(message.contains("'cover' cannot be unique"), "{message}");
        assert!(message.contains("'code' has invalid pattern"), "{message}");
    }

    #[test]
    fn test_nested_item_definitions_checked() {
        let err = parse_config_str(
            r#"
collections:
  posts:
    pattern: "posts/*.md"
    fields:
      links:
        type: list
        items:
          type: object
          fields:
            href: { type: string, min: 5, max: 1 }
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("links[].href"));
    }
}
