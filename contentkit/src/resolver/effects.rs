use crate::context::BuildContext;
use crate::validation::{Effect, FieldContext, Severity, ValidationIssue};
use futures::future::join_all;
use serde_json::Value;

/// A uniqueness claim waiting for the ordered claim phase
#[derive(Debug, Clone)]
pub(crate) struct PendingClaim {
    pub field: String,
    pub scope: String,
    pub value: String,
}

/// A structurally valid record with its asset effects applied
#[derive(Debug, Clone)]
pub(crate) struct PendingRecord {
    pub record: Value,
    pub claims: Vec<PendingClaim>,
}

/// Run the asset effects of one record concurrently and collect its claims.
/// A failed asset keeps the raw reference and adds a warning.
pub(crate) async fn apply_effects(
    ctx: &BuildContext,
    collection: &str,
    field_ctx: &FieldContext<'_>,
    mut record: Value,
    effects: Vec<Effect>,
    issues: &mut Vec<ValidationIssue>,
) -> PendingRecord {
    let mut claims = Vec::new();
    let mut assets = Vec::new();
    for effect in effects {
        match effect {
            Effect::Asset {
                path,
                reference,
                metadata,
            } => assets.push((path, reference, metadata)),
            Effect::Claim { path, scope, value } => claims.push(PendingClaim {
                field: field_ctx.label(&path),
                scope,
                value,
            }),
        }
    }

    let outputs = join_all(
        assets
            .iter()
            .map(|(_, reference, metadata)| ctx.assets.process(reference, field_ctx.file, *metadata)),
    )
    .await;

    for ((path, reference, _), output) in assets.into_iter().zip(outputs) {
        if let Some(source) = ctx.assets.resolve_reference(&reference, field_ctx.file) {
            ctx.assets.record_reference(collection, source);
        }
        match output {
            Ok(output) => {
                path.set(&mut record, output.into_value());
            }
            Err(e) => issues.push(ValidationIssue {
                file: field_ctx.file.to_path_buf(),
                field: field_ctx.label(&path),
                message: e.to_string(),
                severity: Severity::Warning,
            }),
        }
    }

    PendingRecord { record, claims }
}
