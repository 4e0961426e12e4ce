// Collection resolver - concurrent load and validate, then ordered claims and cardinality

mod discover;
mod effects;

pub use discover::{discover, is_ignored, matches_collection};

use crate::context::BuildContext;
use crate::error::{ContentError, Result};
use crate::schema::CollectionDefinition;
use crate::uniqueness::{Claim, Claimant};
use crate::util::slash_path;
use crate::validation::{validate_record, FieldContext, Severity, Validation, ValidationIssue};
use effects::{apply_effects, PendingClaim, PendingRecord};
use futures::future::join_all;
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

/// Aggregated records of one collection as emitted
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CollectionData {
    Single(Value),
    Many(Vec<Value>),
}

impl CollectionData {
    pub fn len(&self) -> usize {
        match self {
            CollectionData::Single(_) => 1,
            CollectionData::Many(records) => records.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn records(&self) -> Vec<&Value> {
        match self {
            CollectionData::Single(record) => vec![record],
            CollectionData::Many(records) => records.iter().collect(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CollectionResult {
    pub name: String,
    pub data: CollectionData,
    pub issues: Vec<ValidationIssue>,
    /// Matched files in discovery order
    pub files: Vec<PathBuf>,
}

#[derive(Debug, Clone, Default)]
pub struct Resolution {
    pub collections: BTreeMap<String, CollectionResult>,
    pub recomputed: Vec<String>,
    /// Collections whose previous result was reused
    pub skipped: Vec<String>,
}

impl Resolution {
    pub fn issues(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.collections.values().flat_map(|c| c.issues.iter())
    }

    pub fn data(&self) -> BTreeMap<String, CollectionData> {
        self.collections
            .iter()
            .map(|(name, result)| (name.clone(), result.data.clone()))
            .collect()
    }
}

struct FileOutcome {
    path: PathBuf,
    records: Vec<PendingRecord>,
    issues: Vec<ValidationIssue>,
}

/// Resolve every collection. With a changed path, collections it cannot
/// affect reuse their previous result, uniqueness claims included.
pub async fn resolve(ctx: &BuildContext, changed: Option<&Path>) -> Result<Resolution> {
    let mut resolution = Resolution::default();
    let mut pending = Vec::new();

    for (name, definition) in &ctx.config.collections {
        if let Some(changed) = changed {
            if let Some(previous) = ctx.cache.previous(name) {
                if !affects(ctx, name, definition, &previous, changed) {
                    log::debug!("Reusing '{name}', unaffected by {}", changed.display());
                    resolution.skipped.push(name.clone());
                    resolution.collections.insert(name.clone(), previous);
                    continue;
                }
            }
        }

        let released = ctx.uniqueness.release_collection(name);
        if released > 0 {
            log::trace!("Released {released} uniqueness claim(s) held by '{name}'");
        }
        ctx.assets.forget_references(name);
        ctx.cache.forget(name);
        pending.push((name.as_str(), definition));
    }

    let loaded = join_all(
        pending
            .iter()
            .map(|(name, definition)| load_collection(ctx, name, definition)),
    )
    .await;

    for ((name, definition), outcomes) in pending.into_iter().zip(loaded) {
        let result = aggregate(ctx, name, definition, outcomes?)?;
        log::debug!(
            "Resolved '{name}': {} record(s), {} issue(s)",
            result.data.len(),
            result.issues.len()
        );
        ctx.cache.store(result.clone());
        resolution.recomputed.push(name.to_string());
        resolution.collections.insert(name.to_string(), result);
    }

    Ok(resolution)
}

fn affects(
    ctx: &BuildContext,
    name: &str,
    definition: &CollectionDefinition,
    previous: &CollectionResult,
    changed: &Path,
) -> bool {
    matches_collection(&ctx.content_root, definition, changed)
        || previous.files.iter().any(|f| f == changed)
        || ctx.assets.referenced_by(changed).iter().any(|c| c == name)
}

async fn load_collection(
    ctx: &BuildContext,
    name: &str,
    definition: &CollectionDefinition,
) -> Result<Vec<FileOutcome>> {
    let files = discover(&ctx.content_root, definition)?;
    if files.is_empty() {
        let patterns = definition.patterns().join(", ");
        if definition.single {
            return Err(ContentError::NoFiles {
                collection: name.to_string(),
                patterns,
            });
        }
        log::warn!("No files matched collection '{name}' ({patterns})");
    }

    Ok(join_all(files.into_iter().map(|path| load_file(ctx, name, definition, path))).await)
}

async fn load_file(
    ctx: &BuildContext,
    name: &str,
    definition: &CollectionDefinition,
    path: PathBuf,
) -> FileOutcome {
    let source = ctx.sources.load(&path, &ctx.loaders).await;
    let mut records = Vec::new();
    let mut issues = Vec::new();

    if let Some(error) = source.error() {
        issues.push(ValidationIssue {
            file: path.clone(),
            field: String::new(),
            message: error.to_string(),
            severity: Severity::Fatal,
        });
        return FileOutcome {
            path,
            records,
            issues,
        };
    }

    let relative = slash_path(path.strip_prefix(&ctx.content_root).unwrap_or(&path));
    for (index, raw) in source.records.iter().enumerate() {
        let field_ctx = FieldContext {
            file: &path,
            relative_path: &relative,
            index,
            multi: source.multi,
            body: raw.body.as_deref(),
        };
        match validate_record(&ctx.config, name, definition, raw, &field_ctx) {
            Validation::Invalid { issues: found } => issues.extend(found),
            Validation::Valid {
                record,
                effects,
                warnings,
            } => {
                issues.extend(warnings);
                records.push(apply_effects(ctx, name, &field_ctx, record, effects, &mut issues).await);
            }
        }
    }

    FileOutcome {
        path,
        records,
        issues,
    }
}

fn aggregate(
    ctx: &BuildContext,
    name: &str,
    definition: &CollectionDefinition,
    outcomes: Vec<FileOutcome>,
) -> Result<CollectionResult> {
    let mut records = Vec::new();
    let mut origins = Vec::new();
    let mut issues = Vec::new();
    let mut files = Vec::new();

    for outcome in outcomes {
        issues.extend(outcome.issues);
        for pending in outcome.records {
            if claim_all(ctx, name, &outcome.path, &pending.claims, &mut issues) {
                records.push(pending.record);
                origins.push(outcome.path.clone());
            }
        }
        files.push(outcome.path);
    }

    let data = if definition.single {
        let count = records.len();
        let Some(first) = records.into_iter().next() else {
            for issue in &issues {
                log::error!("{issue}");
            }
            return Err(ContentError::Cardinality {
                collection: name.to_string(),
                issues: issues.len(),
            });
        };
        if count > 1 {
            log::warn!("Single collection '{name}' resolved {count} records, using the first");
            issues.push(ValidationIssue {
                file: origins[1].clone(),
                field: String::new(),
                message: format!(
                    "Single collection '{name}' resolved {count} records; using the first from {}",
                    origins[0].display()
                ),
                severity: Severity::Warning,
            });
        }
        CollectionData::Single(first)
    } else {
        CollectionData::Many(records)
    };

    Ok(CollectionResult {
        name: name.to_string(),
        data,
        issues,
        files,
    })
}

/// Claims of one record are all-or-nothing: a record with any taken value
/// claims nothing and is dropped.
fn claim_all(
    ctx: &BuildContext,
    collection: &str,
    file: &Path,
    claims: &[PendingClaim],
    issues: &mut Vec<ValidationIssue>,
) -> bool {
    let mut accepted = true;
    let mut seen = HashSet::new();
    for claim in claims {
        if let Some(previous) = ctx.uniqueness.claimant(&claim.scope, &claim.value) {
            issues.push(duplicate_issue(file, claim, &previous));
            accepted = false;
        } else if !seen.insert((claim.scope.as_str(), claim.value.as_str())) {
            issues.push(ValidationIssue {
                file: file.to_path_buf(),
                field: claim.field.clone(),
                message: format!(
                    "Duplicate value '{}' in scope '{}' (repeated within the same record)",
                    claim.value, claim.scope
                ),
                severity: Severity::Fatal,
            });
            accepted = false;
        }
    }
    if !accepted {
        return false;
    }

    for claim in claims {
        let claimant = Claimant {
            collection: collection.to_string(),
            file: file.to_path_buf(),
        };
        if let Claim::Duplicate(previous) = ctx.uniqueness.claim(&claim.scope, &claim.value, claimant) {
            issues.push(duplicate_issue(file, claim, &previous));
            accepted = false;
        }
    }
    accepted
}

fn duplicate_issue(file: &Path, claim: &PendingClaim, previous: &Claimant) -> ValidationIssue {
    ValidationIssue {
        file: file.to_path_buf(),
        field: claim.field.clone(),
        message: format!(
            "Duplicate value '{}' in scope '{}' (already used by {})",
            claim.value,
            claim.scope,
            previous.file.display()
        ),
        severity: Severity::Fatal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::parse_config_str;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tempfile::TempDir;

    const CONFIG: &str = r#"
collections:
  posts:
    pattern: "posts/*.md"
    fields:
      title: { type: string }
      slug: { type: slug, unique: true }
      cover: { type: file }
  site:
    pattern: "site.yaml"
    single: true
    fields:
      name: { type: string, required: true }
  people:
    pattern: "people/*.json"
    fields:
      name: { type: string, required: true }
      handle: { type: slug, from: name, unique: handles }
"#;

    fn write(root: &Path, relative: &str, text: &str) -> PathBuf {
        let path = root.join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, text).unwrap();
        path
    }

    fn context(root: &Path) -> BuildContext {
        BuildContext::new(root, parse_config_str(CONFIG).unwrap()).unwrap()
    }

    fn seed(root: &Path) {
        write(root, "content/posts/1.md", "---\nslug: a\n---\nFirst");
        write(root, "content/posts/2.md", "---\nslug: a\n---\nSecond");
        write(root, "content/posts/3.md", "---\nslug: b\n---\nThird");
        write(root, "content/site.yaml", "name: Demo\n");
        write(root, "content/people/team.json", r#"[{"name": "Ada"}, {"name": "Grace"}]"#);
    }

    fn slugs(result: &CollectionResult) -> Vec<String> {
        result
            .data
            .records()
            .iter()
            .map(|r| r["slug"].as_str().unwrap().to_string())
            .collect()
    }

    #[tokio::test]
    async fn test_duplicate_slug_first_wins() {
        let tmp = TempDir::new().unwrap();
        seed(tmp.path());
        let ctx = context(tmp.path());

        let resolution = resolve(&ctx, None).await.unwrap();
        let posts = &resolution.collections["posts"];
        assert_eq!(slugs(posts), vec!["a", "b"]);
        assert_eq!(posts.issues.len(), 1);
        assert!(posts.issues[0].file.ends_with("posts/2.md"));
        assert!(posts.issues[0].message.contains("Duplicate value 'a'"));

        // a fresh pass releases the claims and accepts `a` again
        let again = resolve(&ctx, None).await.unwrap();
        assert_eq!(slugs(&again.collections["posts"]), vec!["a", "b"]);
        assert_eq!(again.collections["posts"].issues.len(), 1);
    }

    #[tokio::test]
    async fn test_record_repeating_a_unique_value_claims_nothing() {
        let tmp = TempDir::new().unwrap();
        seed(tmp.path());
        let config = CONFIG.replace(
            "      cover: { type: file }",
            "      cover: { type: file }\n      tags: { type: list, items: { type: string, unique: true } }",
        );
        write(tmp.path(), "content/posts/0.md", "---\nslug: z\ntags: [x, x]\n---\n");
        write(tmp.path(), "content/posts/4.md", "---\nslug: d\ntags: [x]\n---\n");
        let ctx = BuildContext::new(tmp.path(), parse_config_str(&config).unwrap()).unwrap();

        let resolution = resolve(&ctx, None).await.unwrap();
        let posts = &resolution.collections["posts"];
        assert_eq!(slugs(posts), vec!["a", "b", "d"]);
        assert!(!ctx.uniqueness.is_claimed("posts.slug", "z"));
        let repeated: Vec<_> = posts.issues.iter().filter(|i| i.file.ends_with("posts/0.md")).collect();
        assert_eq!(repeated.len(), 1);
        assert!(repeated[0].message.contains("repeated within the same record"));
    }

    #[tokio::test]
    async fn test_multi_record_file_flattens_in_order() {
        let tmp = TempDir::new().unwrap();
        seed(tmp.path());
        write(tmp.path(), "content/people/z.json", r#"{"name": "Ada"}"#);
        let ctx = context(tmp.path());

        let people = resolve(&ctx, None).await.unwrap().collections["people"].clone();
        let names: Vec<_> = people.data.records().iter().map(|r| r["name"].clone()).collect();
        assert_eq!(names, vec![json!("Ada"), json!("Grace")]);
        assert_eq!(people.issues[0].field, "handle");
        assert!(people.issues[0].file.ends_with("people/z.json"));
        assert_eq!(people.data.records()[1]["_meta"]["index"], json!(1));
    }

    #[tokio::test]
    async fn test_single_collection_cardinality() {
        let tmp = TempDir::new().unwrap();
        seed(tmp.path());
        std::fs::remove_file(tmp.path().join("content/site.yaml")).unwrap();
        let err = resolve(&context(tmp.path()), None).await.unwrap_err();
        assert!(matches!(err, ContentError::NoFiles { collection, .. } if collection == "site"));

        write(tmp.path(), "content/site.yaml", "name: [not, a, string]\n");
        let err = resolve(&context(tmp.path()), None).await.unwrap_err();
        assert!(matches!(err, ContentError::Cardinality { issues: 1, .. }));
    }

    #[tokio::test]
    async fn test_single_collection_with_two_records_keeps_first() {
        let tmp = TempDir::new().unwrap();
        seed(tmp.path());
        write(tmp.path(), "content/site.yaml", "- name: First\n- name: Second\n");

        let resolution = resolve(&context(tmp.path()), None).await.unwrap();
        let site = &resolution.collections["site"];
        assert!(matches!(&site.data, CollectionData::Single(record) if record["name"] == "First"));
        assert_eq!(site.issues.len(), 1);
        assert_eq!(site.issues[0].severity, Severity::Warning);
    }

    #[tokio::test]
    async fn test_failed_file_does_not_affect_siblings() {
        let tmp = TempDir::new().unwrap();
        seed(tmp.path());
        write(tmp.path(), "content/people/broken.json", "{ nope");

        let resolution = resolve(&context(tmp.path()), None).await.unwrap();
        let people = &resolution.collections["people"];
        assert_eq!(people.data.len(), 2);
        assert_eq!(people.issues.len(), 1);
        assert!(people.issues[0].is_fatal());
    }

    #[tokio::test]
    async fn test_incremental_pass_skips_unaffected_collections() {
        let tmp = TempDir::new().unwrap();
        seed(tmp.path());
        let ctx = context(tmp.path());
        resolve(&ctx, None).await.unwrap();

        let changed = write(tmp.path(), "content/posts/3.md", "---\nslug: c\n---\nThird");
        ctx.sources.invalidate(&changed);
        let resolution = resolve(&ctx, Some(&changed)).await.unwrap();

        assert_eq!(resolution.recomputed, vec!["posts"]);
        assert_eq!(resolution.skipped, vec!["people", "site"]);
        assert_eq!(slugs(&resolution.collections["posts"]), vec!["a", "c"]);
        // claims of skipped collections survive the pass
        assert!(ctx.uniqueness.is_claimed("handles", "grace"));
        assert!(!ctx.uniqueness.is_claimed("posts.slug", "b"));
    }

    #[tokio::test]
    async fn test_asset_change_recomputes_referencing_collection() {
        let tmp = TempDir::new().unwrap();
        seed(tmp.path());
        write(tmp.path(), "content/posts/4.md", "---\nslug: d\ncover: ./guide.pdf\n---\n");
        let asset = write(tmp.path(), "content/posts/guide.pdf", "v1");
        let ctx = context(tmp.path());
        resolve(&ctx, None).await.unwrap();

        let resolution = resolve(&ctx, Some(&asset)).await.unwrap();
        assert_eq!(resolution.recomputed, vec!["posts"]);
    }

    #[tokio::test]
    async fn test_parent_directory_asset_change_recomputes_collection() {
        let tmp = TempDir::new().unwrap();
        seed(tmp.path());
        write(tmp.path(), "content/posts/4.md", "---\nslug: d\ncover: ../shared/guide.pdf\n---\n");
        let asset = write(tmp.path(), "content/shared/guide.pdf", "v1");
        let ctx = context(tmp.path());
        let first = resolve(&ctx, None).await.unwrap();
        let cover = |r: &Resolution| r.collections["posts"].data.records()[2]["cover"].clone();
        let before = cover(&first);

        std::fs::write(&asset, "v2").unwrap();
        ctx.assets.invalidate(&asset);
        let resolution = resolve(&ctx, Some(&asset)).await.unwrap();
        assert_eq!(resolution.recomputed, vec!["posts"]);
        assert_ne!(cover(&resolution), before);
    }
}
