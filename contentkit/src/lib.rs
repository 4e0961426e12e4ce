pub mod asset;
pub mod builder;
pub mod cache;
pub mod context;
pub mod document;
pub mod emit;
pub mod error;
pub mod loader;
pub mod report;
pub mod resolver;
pub mod schema;
pub mod source;
pub mod uniqueness;
pub mod validation;
pub mod watcher;

mod util;

pub use builder::{BuildSummary, Builder, ChangeOutcome};
pub use context::{BuildContext, BuildHooks, Prepared};
pub use error::{ContentError, Result};
pub use loader::{Loader, LoaderRegistry, PatternLoader};
pub use resolver::CollectionData;
pub use schema::BuildConfig;
