// Document parsing - Markdown with YAML front matter

/// A Markdown document split into front matter data and body
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub data: serde_json::Value,
    pub content: String,
}

/// Split `---`-delimited front matter from the body.
///
/// Returns `(None, text)` when the document has no front matter. The closing
/// delimiter may be `---` or `...`; an unterminated block is not front matter.
pub fn split_front_matter(text: &str) -> (Option<&str>, &str) {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let first_line_end = match text.find('\n') {
        Some(i) => i,
        None => return (None, text),
    };
    if text[..first_line_end].trim_end() != "---" {
        return (None, text);
    }

    let rest = &text[first_line_end + 1..];
    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        let trimmed = line.trim_end();
        if trimmed == "---" || trimmed == "..." {
            let front = &rest[..offset];
            let body = &rest[offset + line.len()..];
            return (Some(front), body);
        }
        offset += line.len();
    }
    (None, text)
}

/// Parse a Markdown document. Missing or empty front matter yields an empty object.
pub fn parse_document(text: &str) -> Result<Document, serde_yaml::Error> {
    let (front, body) = split_front_matter(text);
    let data = match front {
        Some(yaml) if !yaml.trim().is_empty() => {
            let value: serde_json::Value = serde_yaml::from_str(yaml)?;
            if value.is_null() {
                serde_json::Value::Object(Default::default())
            } else {
                value
            }
        }
        _ => serde_json::Value::Object(Default::default()),
    };
    Ok(Document {
        data,
        content: body.trim_start_matches(['\r', '\n']).to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_parse_front_matter_and_body() {
        let doc = parse_document("---\ntitle: Hello\ntags: [a, b]\n---\n\n# Heading\nBody\n").unwrap();
        assert_eq!(doc.data, json!({ "title": "Hello", "tags": ["a", "b"] }));
        assert_eq!(doc.content, "# Heading\nBody\n");
    }

    #[test]
    fn test_no_front_matter() {
        let doc = parse_document("# Just markdown\n").unwrap();
        assert_eq!(doc.data, json!({}));
        assert_eq!(doc.content, "# Just markdown\n");
    }

    #[test]
    fn test_unterminated_front_matter_is_body() {
        let (front, body) = split_front_matter("---\ntitle: x\nno closing line\n");
        assert!(front.is_none());
        assert!(body.starts_with("---"));
    }

    #[test]
    fn test_dots_close_front_matter_and_bom_is_ignored() {
        let (front, body) = split_front_matter("\u{feff}---\r\na: 1\r\n...\r\nrest");
        assert_eq!(front, Some("a: 1\r\n"));
        assert_eq!(body, "rest");
    }

    #[test]
    fn test_empty_front_matter() {
        let doc = parse_document("---\n---\nbody").unwrap();
        assert_eq!(doc.data, json!({}));
        assert_eq!(doc.content, "body");
    }

    #[test]
    fn test_invalid_yaml_is_error() {
        assert!(parse_document("---\ntitle: [unclosed\n---\nbody").is_err());
    }
}
