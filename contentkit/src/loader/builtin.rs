use super::{Loaded, Loader, RawRecord};
use crate::document;
use crate::error::LoadError;
use serde::Deserialize;
use std::path::Path;

fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| extensions.iter().any(|x| e.eq_ignore_ascii_case(x)))
        .unwrap_or(false)
}

fn utf8<'a>(bytes: &'a [u8], path: &Path) -> Result<&'a str, LoadError> {
    std::str::from_utf8(bytes).map_err(|e| LoadError::Parse {
        path: path.to_path_buf(),
        message: format!("not valid UTF-8: {e}"),
    })
}

fn parse_error(path: &Path, e: impl std::fmt::Display) -> LoadError {
    LoadError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    }
}

/// Markdown with optional YAML front matter; the body becomes `content`
pub struct MarkdownLoader;

impl Loader for MarkdownLoader {
    fn name(&self) -> &str {
        "markdown"
    }

    fn test(&self, path: &Path) -> bool {
        has_extension(path, &["md", "markdown", "mdx"])
    }

    fn load(&self, bytes: &[u8], path: &Path) -> Result<Loaded, LoadError> {
        let doc = document::parse_document(utf8(bytes, path)?).map_err(|e| parse_error(path, e))?;
        Ok(Loaded::Single(RawRecord {
            data: doc.data,
            body: Some(doc.content),
        }))
    }
}

/// YAML data. A top-level sequence or a multi-document stream yields one
/// record per entry.
pub struct YamlLoader;

impl Loader for YamlLoader {
    fn name(&self) -> &str {
        "yaml"
    }

    fn test(&self, path: &Path) -> bool {
        has_extension(path, &["yaml", "yml"])
    }

    fn load(&self, bytes: &[u8], path: &Path) -> Result<Loaded, LoadError> {
        let text = utf8(bytes, path)?;
        let mut documents = Vec::new();
        for doc in serde_yaml::Deserializer::from_str(text) {
            let value = serde_json::Value::deserialize(doc).map_err(|e| parse_error(path, e))?;
            if !value.is_null() {
                documents.push(value);
            }
        }

        match documents.len() {
            0 => Ok(Loaded::Single(RawRecord::data(serde_json::Value::Object(
                Default::default(),
            )))),
            1 => Ok(Loaded::from_value(documents.remove(0))),
            _ => Ok(Loaded::Many(
                documents.into_iter().map(RawRecord::data).collect(),
            )),
        }
    }
}

/// JSON data. A top-level array yields one record per element.
pub struct JsonLoader;

impl Loader for JsonLoader {
    fn name(&self) -> &str {
        "json"
    }

    fn test(&self, path: &Path) -> bool {
        has_extension(path, &["json"])
    }

    fn load(&self, bytes: &[u8], path: &Path) -> Result<Loaded, LoadError> {
        let value: serde_json::Value =
            serde_json::from_slice(bytes).map_err(|e| parse_error(path, e))?;
        Ok(Loaded::from_value(value))
    }
}

/// Plain text: no data, the whole file is the body
pub struct TextLoader;

impl Loader for TextLoader {
    fn name(&self) -> &str {
        "text"
    }

    fn test(&self, path: &Path) -> bool {
        has_extension(path, &["txt"])
    }

    fn load(&self, bytes: &[u8], path: &Path) -> Result<Loaded, LoadError> {
        Ok(Loaded::Single(RawRecord {
            data: serde_json::Value::Object(Default::default()),
            body: Some(utf8(bytes, path)?.to_string()),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_markdown_loader() {
        let loaded = MarkdownLoader
            .load(b"---\ntitle: Hi\n---\nBody", Path::new("a.md"))
            .unwrap();
        assert_eq!(
            loaded,
            Loaded::Single(RawRecord {
                data: json!({ "title": "Hi" }),
                body: Some("Body".into()),
            })
        );
    }

    #[test]
    fn test_yaml_sequence_is_multi_record() {
        let (records, multi) = YamlLoader
            .load(b"- name: a\n- name: b\n", Path::new("people.yaml"))
            .unwrap()
            .into_records();
        assert!(multi);
        assert_eq!(records[0].data, json!({ "name": "a" }));
        assert_eq!(records[1].data, json!({ "name": "b" }));
    }

    #[test]
    fn test_yaml_multi_document_stream() {
        let (records, multi) = YamlLoader
            .load(b"name: a\n---\nname: b\n", Path::new("people.yaml"))
            .unwrap()
            .into_records();
        assert!(multi);
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn test_yaml_mapping_is_single() {
        let (records, multi) = YamlLoader
            .load(b"name: a\n", Path::new("one.yml"))
            .unwrap()
            .into_records();
        assert!(!multi);
        assert_eq!(records, vec![RawRecord::data(json!({ "name": "a" }))]);
    }

    #[test]
    fn test_json_array_is_multi_record() {
        let (records, multi) = JsonLoader
            .load(br#"[{"id": 1}, {"id": 2}, {"id": 3}]"#, Path::new("a.json"))
            .unwrap()
            .into_records();
        assert!(multi);
        assert_eq!(records.len(), 3);
    }

    #[test]
    fn test_invalid_json_is_parse_error() {
        let err = JsonLoader.load(b"{ nope", Path::new("a.json")).unwrap_err();
        assert!(matches!(err, LoadError::Parse { .. }));
    }

    #[test]
    fn test_text_loader_and_invalid_utf8() {
        let loaded = TextLoader.load(b"hello", Path::new("a.txt")).unwrap();
        assert_eq!(
            loaded,
            Loaded::Single(RawRecord {
                data: json!({}),
                body: Some("hello".into())
            })
        );
        assert!(TextLoader.load(&[0xff, 0xfe], Path::new("a.txt")).is_err());
    }
}
