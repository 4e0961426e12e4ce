// Destination filename templates: `[name]-[hash:8].[ext]`

use crate::error::{ContentError, Result};
use regex::Regex;
use std::sync::OnceLock;

#[derive(Debug, Clone)]
pub struct FileNameTemplate {
    pub raw: String,
    pub segments: Vec<TemplateSegment>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateSegment {
    Literal(String),
    Name,
    /// Content digest, truncated to the given number of hex chars
    Hash(Option<usize>),
    Ext,
}

fn placeholder_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[([a-z]+)(?::(\d+))?\]").expect("placeholder regex"))
}

impl FileNameTemplate {
    pub fn parse(template: &str) -> Result<Self> {
        let mut segments = Vec::new();
        let mut last = 0;

        for caps in placeholder_regex().captures_iter(template) {
            let whole = caps.get(0).expect("capture 0 always present");
            if whole.start() > last {
                segments.push(TemplateSegment::Literal(template[last..whole.start()].to_string()));
            }
            let length = caps.get(2).map(|m| m.as_str());
            let segment = match (&caps[1], length) {
                ("name", None) => TemplateSegment::Name,
                ("ext", None) => TemplateSegment::Ext,
                ("hash", None) => TemplateSegment::Hash(None),
                ("hash", Some(n)) => {
                    let n: usize = n.parse().map_err(|_| {
                        ContentError::Config(format!("Invalid hash length in '{template}'"))
                    })?;
                    if n == 0 {
                        return Err(ContentError::Config(format!(
                            "Hash length must be positive in file name template '{template}'"
                        )));
                    }
                    TemplateSegment::Hash(Some(n))
                }
                _ => {
                    return Err(ContentError::Config(format!(
                        "Unknown placeholder {} in file name template '{template}'",
                        whole.as_str()
                    )))
                }
            };
            segments.push(segment);
            last = whole.end();
        }
        if last < template.len() {
            segments.push(TemplateSegment::Literal(template[last..].to_string()));
        }

        if !segments.iter().any(|s| matches!(s, TemplateSegment::Hash(_))) {
            return Err(ContentError::Config(format!(
                "File name template '{template}' must contain [hash] or [hash:N]"
            )));
        }

        Ok(FileNameTemplate {
            raw: template.to_string(),
            segments,
        })
    }

    /// Render a filename. With an empty extension the dot before `[ext]` is dropped.
    pub fn render(&self, name: &str, hash: &str, ext: &str) -> String {
        let mut out = String::new();
        for (i, segment) in self.segments.iter().enumerate() {
            match segment {
                TemplateSegment::Literal(text) => {
                    let before_empty_ext = ext.is_empty()
                        && matches!(self.segments.get(i + 1), Some(TemplateSegment::Ext));
                    match text.strip_suffix('.') {
                        Some(trimmed) if before_empty_ext => out.push_str(trimmed),
                        _ => out.push_str(text),
                    }
                }
                TemplateSegment::Name => out.push_str(name),
                TemplateSegment::Hash(None) => out.push_str(hash),
                TemplateSegment::Hash(Some(n)) => out.push_str(&hash[..(*n).min(hash.len())]),
                TemplateSegment::Ext => out.push_str(ext),
            }
        }
        out
    }
}
