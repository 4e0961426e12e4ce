use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Top-level build configuration parsed from contentkit.yaml
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    /// Content root, relative to the config file's directory
    pub content: PathBuf,
    /// Output directory for collection data and the index module
    pub output: PathBuf,
    /// Promote every recorded issue to a build failure
    pub strict: bool,
    pub assets: AssetConfig,
    /// Reusable object types referenced by name from field definitions
    pub types: BTreeMap<String, BTreeMap<String, FieldDefinition>>,
    pub collections: BTreeMap<String, CollectionDefinition>,
}

impl Default for BuildConfig {
    fn default() -> Self {
        BuildConfig {
            content: PathBuf::from("content"),
            output: PathBuf::from(".contentkit"),
            strict: false,
            assets: AssetConfig::default(),
            types: BTreeMap::new(),
            collections: BTreeMap::new(),
        }
    }
}

/// Asset extraction settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AssetConfig {
    /// Directory extracted assets are copied into
    pub dir: PathBuf,
    /// URL prefix under which `dir` is served
    pub public_path: String,
    /// Destination filename template: `[name]`, `[hash]`, `[hash:N]`, `[ext]`
    pub file_name: String,
    /// Extensions (without dot) passed through untouched
    pub ignore: Vec<String>,
    /// Width of the low-resolution image preview
    pub preview_width: u32,
}

impl Default for AssetConfig {
    fn default() -> Self {
        AssetConfig {
            dir: PathBuf::from("public/assets"),
            public_path: "/assets/".to_string(),
            file_name: "[name]-[hash:8].[ext]".to_string(),
            ignore: Vec::new(),
            preview_width: 8,
        }
    }
}

/// Definition of a single collection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionDefinition {
    pub pattern: PatternList,
    #[serde(default)]
    pub single: bool,
    #[serde(default)]
    pub fields: BTreeMap<String, FieldDefinition>,
    #[serde(default = "default_true")]
    pub additional_properties: bool,
}

impl CollectionDefinition {
    pub fn patterns(&self) -> Vec<&str> {
        match &self.pattern {
            PatternList::One(p) => vec![p.as_str()],
            PatternList::Many(ps) => ps.iter().map(String::as_str).collect(),
        }
    }
}

/// One glob or several
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PatternList {
    One(String),
    Many(Vec<String>),
}

/// Definition of a single field in a collection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldDefinition {
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default)]
    pub required: bool,
    #[serde(rename = "enum", default)]
    pub enum_values: Option<Vec<String>>,
    #[serde(default)]
    pub default: Option<serde_json::Value>,
    /// Length bound for strings and lists, value bound for numbers
    #[serde(default)]
    pub min: Option<f64>,
    #[serde(default)]
    pub max: Option<f64>,
    /// Regex a string value must match
    #[serde(default)]
    pub pattern: Option<String>,
    #[serde(default)]
    pub items: Option<ItemType>,
    /// Sub-fields of an inline object
    #[serde(default)]
    pub fields: Option<BTreeMap<String, FieldDefinition>>,
    #[serde(default)]
    pub unique: Option<UniqueScope>,
    /// Values rejected regardless of uniqueness
    #[serde(default)]
    pub reserved: Vec<String>,
    /// Slug source: sibling field name; the file stem when absent
    #[serde(default)]
    pub from: Option<String>,
    /// Images only: extract dimensions and a blurred preview
    #[serde(default = "default_true")]
    pub metadata: bool,
}

impl FieldDefinition {
    pub fn of_type(field_type: FieldType) -> Self {
        FieldDefinition {
            field_type,
            required: false,
            enum_values: None,
            default: None,
            min: None,
            max: None,
            pattern: None,
            items: None,
            fields: None,
            unique: None,
            reserved: Vec::new(),
            from: None,
            metadata: true,
        }
    }
}

/// Field type enumeration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    String,
    Number,
    Integer,
    Boolean,
    Date,
    Datetime,
    List,
    Object,
    Slug,
    Image,
    File,
    Any,
    #[serde(untagged)]
    Custom(std::string::String),
}

impl FieldType {
    /// Scalar types whose values can be claimed in a uniqueness scope
    pub fn is_claimable(&self) -> bool {
        matches!(
            self,
            FieldType::String | FieldType::Slug | FieldType::Number | FieldType::Integer
        )
    }
}

/// Item type for lists
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ItemType {
    Simple(FieldType),
    Complex(Box<FieldDefinition>),
}

impl ItemType {
    pub fn definition(&self) -> Cow<'_, FieldDefinition> {
        match self {
            ItemType::Simple(field_type) => Cow::Owned(FieldDefinition::of_type(field_type.clone())),
            ItemType::Complex(def) => Cow::Borrowed(def),
        }
    }
}

/// `unique: true` scopes values to `<collection>.<field>`; a string names a shared scope
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UniqueScope {
    Flag(bool),
    Named(String),
}

impl UniqueScope {
    pub fn scope_name(&self, collection: &str, field_path: &str) -> Option<String> {
        match self {
            UniqueScope::Flag(false) => None,
            UniqueScope::Flag(true) => Some(format!("{collection}.{field_path}")),
            UniqueScope::Named(name) => Some(name.clone()),
        }
    }
}

fn default_true() -> bool {
    true
}
