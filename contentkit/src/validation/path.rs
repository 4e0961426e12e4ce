use serde_json::Value;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

/// Location of a value inside a record, e.g. `author.name` or `tags[2]`
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct FieldPath(Vec<PathSegment>);

impl FieldPath {
    pub fn root() -> Self {
        FieldPath(Vec::new())
    }

    pub fn key(&self, key: &str) -> Self {
        let mut segments = self.0.clone();
        segments.push(PathSegment::Key(key.to_string()));
        FieldPath(segments)
    }

    pub fn index(&self, index: usize) -> Self {
        let mut segments = self.0.clone();
        segments.push(PathSegment::Index(index));
        FieldPath(segments)
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.0
    }

    /// Dotted keys with list indices removed: `gallery[1].src` -> `gallery.src`
    pub fn schema_path(&self) -> String {
        self.0
            .iter()
            .filter_map(|s| match s {
                PathSegment::Key(k) => Some(k.as_str()),
                PathSegment::Index(_) => None,
            })
            .collect::<Vec<_>>()
            .join(".")
    }

    pub fn get_mut<'v>(&self, mut value: &'v mut Value) -> Option<&'v mut Value> {
        for segment in &self.0 {
            value = match segment {
                PathSegment::Key(k) => value.as_object_mut()?.get_mut(k)?,
                PathSegment::Index(i) => value.as_array_mut()?.get_mut(*i)?,
            };
        }
        Some(value)
    }

    /// Replace the value at this path. Returns false if the path does not exist.
    pub fn set(&self, record: &mut Value, new_value: Value) -> bool {
        match self.get_mut(record) {
            Some(slot) => {
                *slot = new_value;
                true
            }
            None => false,
        }
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.0.iter().enumerate() {
            match segment {
                PathSegment::Key(k) if i == 0 => write!(f, "{k}")?,
                PathSegment::Key(k) => write!(f, ".{k}")?,
                PathSegment::Index(n) => write!(f, "[{n}]")?,
            }
        }
        Ok(())
    }
}
