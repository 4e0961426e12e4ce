mod parser;
mod types;

pub use parser::{check_config, parse_config, parse_config_str};
pub use types::*;

use std::collections::BTreeMap;

impl BuildConfig {
    /// Look up a reusable type definition by name
    pub fn get_custom_type(&self, name: &str) -> Option<&BTreeMap<String, FieldDefinition>> {
        self.types.get(name)
    }
}
