// Type generation - index.js accessors and the index.d.ts stub

use crate::schema::{BuildConfig, FieldDefinition, FieldType};
use heck::ToPascalCase;
use std::collections::BTreeMap;
use std::fmt::Write;

const HEADER: &str = "// This file is generated by contentkit. Do not edit.\n";

/// Type names the stub always declares
const BUILTIN_TYPES: [&str; 2] = ["Image", "Meta"];

/// "posts" -> "getPosts", "blog-posts" -> "getBlogPosts"
pub fn accessor_name(collection: &str) -> String {
    format!("get{}", collection.to_pascal_case())
}

/// Singular PascalCase record type: "posts" -> "Post", "categories" -> "Category".
/// Falls back to a `Record` suffix when the name is already taken.
pub fn record_type_name(collection: &str, config: &BuildConfig) -> String {
    let name = singularize(collection).to_pascal_case();
    let taken = BUILTIN_TYPES.contains(&name.as_str())
        || config.types.keys().any(|t| t.to_pascal_case() == name);
    if taken {
        format!("{name}Record")
    } else {
        name
    }
}

/// Naive singularization of English words
pub fn singularize(word: &str) -> String {
    let w = word.to_lowercase();
    if w.ends_with("ies") {
        format!("{}y", &w[..w.len() - 3])
    } else if w.ends_with("ses") || w.ends_with("xes") || w.ends_with("zes") {
        w[..w.len() - 2].to_string()
    } else if w.ends_with('s') && !w.ends_with("ss") {
        w[..w.len() - 1].to_string()
    } else {
        w
    }
}

pub fn index_js<'a>(collections: impl Iterator<Item = &'a String>) -> String {
    let mut out = String::from(HEADER);
    for name in collections {
        let _ = write!(
            out,
            "\nexport async function {}() {{\n  const {{ default: data }} = await import('./{}.json', {{ with: {{ type: 'json' }} }})\n  return data\n}}\n",
            accessor_name(name),
            name
        );
    }
    out
}

pub fn index_dts<'a>(
    config: &BuildConfig,
    collections: impl Iterator<Item = &'a String>,
) -> String {
    let mut out = String::from(HEADER);
    out.push_str(
        "\nexport interface Image {\n  src: string\n  width: number\n  height: number\n  blurDataUrl: string\n  blurWidth: number\n  blurHeight: number\n}\n",
    );
    out.push_str(
        "\nexport interface Meta {\n  path: string\n  fileName: string\n  directory: string\n  extension: string\n  index?: number\n}\n",
    );

    for (name, fields) in &config.types {
        let _ = write!(out, "\nexport interface {} {{\n", name.to_pascal_case());
        render_fields(&mut out, fields, 1);
        out.push_str("}\n");
    }

    let mut accessors = String::new();
    for name in collections {
        let accessor = accessor_name(name);
        let Some(definition) = config.collections.get(name) else {
            let _ = writeln!(accessors, "export declare function {accessor}(): Promise<unknown>");
            continue;
        };

        let type_name = record_type_name(name, config);
        let _ = write!(out, "\nexport interface {type_name} {{\n  _meta: Meta\n");
        if !definition.fields.contains_key("content") {
            out.push_str("  content?: string\n");
        }
        render_fields(&mut out, &definition.fields, 1);
        if definition.additional_properties {
            out.push_str("  [key: string]: unknown\n");
        }
        out.push_str("}\n");

        let returns = if definition.single {
            type_name
        } else {
            format!("{type_name}[]")
        };
        let _ = writeln!(accessors, "export declare function {accessor}(): Promise<{returns}>");
    }

    if !accessors.is_empty() {
        out.push('\n');
        out.push_str(&accessors);
    }
    out
}

fn render_fields(out: &mut String, fields: &BTreeMap<String, FieldDefinition>, depth: usize) {
    let pad = "  ".repeat(depth);
    for (name, def) in fields {
        let optional = !def.required && def.default.is_none() && def.field_type != FieldType::Slug;
        let _ = writeln!(
            out,
            "{pad}{}{}: {}",
            property_key(name),
            if optional { "?" } else { "" },
            ts_type(def, depth)
        );
    }
}

fn ts_type(def: &FieldDefinition, depth: usize) -> String {
    if let Some(values) = &def.enum_values {
        return values
            .iter()
            .map(|v| format!("'{}'", v.replace('\\', "\\\\").replace('\'', "\\'")))
            .collect::<Vec<_>>()
            .join(" | ");
    }

    match &def.field_type {
        FieldType::String
        | FieldType::Slug
        | FieldType::Date
        | FieldType::Datetime
        | FieldType::File => "string".into(),
        FieldType::Number | FieldType::Integer => "number".into(),
        FieldType::Boolean => "boolean".into(),
        FieldType::Image if def.metadata => "Image".into(),
        FieldType::Image => "string".into(),
        FieldType::Any => "unknown".into(),
        FieldType::List => match &def.items {
            Some(items) => {
                let inner = ts_type(&items.definition(), depth);
                if inner.contains(' ') && !inner.starts_with('{') {
                    format!("({inner})[]")
                } else {
                    format!("{inner}[]")
                }
            }
            None => "unknown[]".into(),
        },
        FieldType::Object => match &def.fields {
            Some(fields) => {
                let mut inline = String::from("{\n");
                render_fields(&mut inline, fields, depth + 1);
                inline.push_str(&"  ".repeat(depth));
                inline.push('}');
                inline
            }
            None => "Record<string, unknown>".into(),
        },
        FieldType::Custom(name) => name.to_pascal_case(),
    }
}

fn property_key(name: &str) -> String {
    let mut chars = name.chars();
    let is_ident = chars
        .next()
        .map(|c| c.is_ascii_alphabetic() || c == '_' || c == '$')
        .unwrap_or(false)
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$');
    if is_ident {
        name.to_string()
    } else {
        format!("'{}'", name.replace('\'', "\\'"))
    }
}
