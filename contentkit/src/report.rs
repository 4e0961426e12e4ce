use crate::builder::BuildSummary;
use crate::resolver::CollectionResult;
use crate::validation::ValidationIssue;
use std::fmt;
use std::fmt::Write;

/// Issue listing for one collection, `None` when it has no issues
pub fn collection_report(result: &CollectionResult) -> Option<String> {
    if result.issues.is_empty() {
        return None;
    }
    let (errors, warnings) = count(&result.issues);
    let mut out = format!(
        "{}: {} error(s), {} warning(s)",
        result.name, errors, warnings
    );
    for issue in &result.issues {
        let _ = write!(out, "\n  {issue}");
    }
    Some(out)
}

/// Log every collection's issues, errors at `warn` level
pub fn log_collection_reports<'a>(results: impl Iterator<Item = &'a CollectionResult>) {
    for result in results {
        if let Some(report) = collection_report(result) {
            if result.issues.iter().any(ValidationIssue::is_fatal) {
                log::warn!("{report}");
            } else {
                log::info!("{report}");
            }
        }
    }
}

fn count(issues: &[ValidationIssue]) -> (usize, usize) {
    let errors = issues.iter().filter(|i| i.is_fatal()).count();
    (errors, issues.len() - errors)
}

impl fmt::Display for BuildSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let records: usize = self.records.values().sum();
        write!(
            f,
            "Built {} collection(s), {} record(s) in {}ms",
            self.records.len(),
            records,
            self.duration.as_millis()
        )?;
        if !self.skipped.is_empty() {
            write!(f, " ({} reused)", self.skipped.len())?;
        }
        if self.suppressed {
            write!(f, "; output suppressed")?;
        } else {
            write!(
                f,
                "; {} file(s) written, {} unchanged",
                self.written.len(),
                self.unchanged
            )?;
        }
        if self.assets.copied + self.assets.reused > 0 {
            write!(
                f,
                "; {} asset(s) copied, {} reused",
                self.assets.copied, self.assets.reused
            )?;
        }
        let (errors, warnings) = count(&self.issues);
        if errors + warnings > 0 {
            write!(f, "; {errors} error(s), {warnings} warning(s)")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::AssetStats;
    use crate::resolver::CollectionData;
    use crate::validation::Severity;
    use pretty_assertions::assert_eq;
    use std::collections::BTreeMap;
    use std::path::PathBuf;
    use std::time::Duration;

    fn issue(field: &str, severity: Severity) -> ValidationIssue {
        ValidationIssue {
            file: PathBuf::from("content/posts/a.md"),
            field: field.into(),
            message: "bad".into(),
            severity,
        }
    }

    #[test]
    fn test_collection_report() {
        let result = CollectionResult {
            name: "posts".into(),
            data: CollectionData::Many(vec![]),
            issues: vec![issue("title", Severity::Fatal), issue("", Severity::Warning)],
            files: vec![],
        };
        assert_eq!(
            collection_report(&result).unwrap(),
            "posts: 1 error(s), 1 warning(s)\n  error: content/posts/a.md (title): bad\n  warning: content/posts/a.md: bad"
        );
    }

    #[test]
    fn test_summary_line() {
        let summary = BuildSummary {
            records: BTreeMap::from([("posts".to_string(), 2), ("site".to_string(), 1)]),
            issues: vec![issue("slug", Severity::Fatal)],
            written: vec![PathBuf::from("a"), PathBuf::from("b")],
            unchanged: 3,
            suppressed: false,
            assets: AssetStats { copied: 1, reused: 0 },
            recomputed: vec!["posts".into()],
            skipped: vec!["site".into()],
            duration: Duration::from_millis(12),
        };
        assert_eq!(
            summary.to_string(),
            "Built 2 collection(s), 3 record(s) in 12ms (1 reused); 2 file(s) written, 3 unchanged; 1 asset(s) copied, 0 reused; 1 error(s), 0 warning(s)"
        );
    }
}
