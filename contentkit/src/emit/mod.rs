// Output emitter - collection JSON, index module, type stub

mod typegen;

pub use typegen::{accessor_name, index_dts, index_js, record_type_name};

use crate::context::BuildContext;
use crate::error::{ContentError, Result};
use crate::resolver::CollectionData;
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EmitSummary {
    pub written: Vec<PathBuf>,
    pub unchanged: usize,
}

pub async fn emit(
    ctx: &BuildContext,
    collections: &BTreeMap<String, CollectionData>,
) -> Result<EmitSummary> {
    let dir = &ctx.output_dir;
    let mut outputs = Vec::with_capacity(collections.len() + 2);
    for (name, data) in collections {
        let mut json = serde_json::to_vec_pretty(data)?;
        json.push(b'\n');
        outputs.push((dir.join(format!("{name}.json")), json));
    }
    outputs.push((dir.join("index.js"), index_js(collections.keys()).into_bytes()));
    outputs.push((
        dir.join("index.d.ts"),
        index_dts(&ctx.config, collections.keys()).into_bytes(),
    ));

    tokio::fs::create_dir_all(dir).await?;

    let mut summary = EmitSummary::default();
    for (path, bytes) in outputs {
        if !ctx.cache.should_write(&path, &bytes).await {
            log::trace!("Unchanged {}", path.display());
            summary.unchanged += 1;
            continue;
        }
        write_atomic(&path, &bytes).await?;
        log::debug!("Wrote {}", path.display());
        ctx.cache.record_emitted(&path, bytes);
        summary.written.push(path);
    }
    Ok(summary)
}

/// Write through a temp file in the same directory, then rename over the target
async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let path = path.to_path_buf();
    let bytes = bytes.to_vec();
    tokio::task::spawn_blocking(move || -> Result<()> {
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        let mut file = tempfile::NamedTempFile::new_in(dir)?;
        file.write_all(&bytes)?;
        file.persist(&path).map_err(|e| ContentError::Io(e.error))?;
        Ok(())
    })
    .await
    .map_err(|e| ContentError::Other(format!("Output task failed: {e}")))?
}

/// Remove the output directory and forget what was emitted into it
pub async fn clean(ctx: &BuildContext) -> Result<()> {
    match tokio::fs::remove_dir_all(&ctx.output_dir).await {
        Ok(()) => log::info!("Removed {}", ctx.output_dir.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }
    ctx.cache.clear_emitted();
    Ok(())
}
