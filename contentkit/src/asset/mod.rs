// Asset pipeline - content-addressed extraction and image metadata

mod template;

pub use template::{FileNameTemplate, TemplateSegment};

use crate::error::{AssetError, Result};
use crate::schema::AssetConfig;
use crate::util::{lock, normalize_path};
use base64::{engine::general_purpose, Engine as _};
use image::imageops::FilterType;
use image::ImageFormat;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::{BTreeSet, HashMap};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::OnceCell;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageMetadata {
    pub width: u32,
    pub height: u32,
    pub blur_data_url: String,
    pub blur_width: u32,
    pub blur_height: u32,
}

/// Value an image field is replaced with
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageDescriptor {
    pub src: String,
    #[serde(flatten)]
    pub metadata: ImageMetadata,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssetOutput {
    /// Reference left untouched (URLs, fragments, ignored extensions)
    Passthrough(String),
    Url(String),
    Image(ImageDescriptor),
}

impl AssetOutput {
    pub fn into_value(self) -> serde_json::Value {
        match self {
            AssetOutput::Passthrough(s) | AssetOutput::Url(s) => serde_json::Value::String(s),
            AssetOutput::Image(descriptor) => {
                serde_json::to_value(descriptor).unwrap_or(serde_json::Value::Null)
            }
        }
    }
}

/// One extracted file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetEntry {
    pub source: PathBuf,
    pub hash: String,
    pub file_name: String,
    pub url: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AssetStats {
    pub copied: usize,
    pub reused: usize,
}

#[derive(Debug)]
pub struct AssetPipeline {
    dir: PathBuf,
    public_path: String,
    template: FileNameTemplate,
    ignore: Vec<String>,
    preview_width: u32,
    entries: Mutex<HashMap<String, Arc<OnceCell<AssetEntry>>>>,
    images: Mutex<HashMap<String, Arc<OnceCell<ImageMetadata>>>>,
    /// collection -> source asset paths it referenced in its last pass
    references: Mutex<HashMap<String, BTreeSet<PathBuf>>>,
    copied: AtomicUsize,
    reused: AtomicUsize,
}

impl AssetPipeline {
    /// `root` is the directory relative paths in the config resolve against
    pub fn new(config: &AssetConfig, root: &Path) -> Result<Self> {
        let mut public_path = config.public_path.clone();
        if !public_path.ends_with('/') {
            public_path.push('/');
        }
        Ok(AssetPipeline {
            dir: root.join(&config.dir),
            public_path,
            template: FileNameTemplate::parse(&config.file_name)?,
            ignore: config
                .ignore
                .iter()
                .map(|ext| ext.trim_start_matches('.').to_ascii_lowercase())
                .collect(),
            preview_width: config.preview_width.max(1),
            entries: Mutex::new(HashMap::new()),
            images: Mutex::new(HashMap::new()),
            references: Mutex::new(HashMap::new()),
            copied: AtomicUsize::new(0),
            reused: AtomicUsize::new(0),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// References that are not local files, or whose extension is ignored
    pub fn is_passthrough(&self, reference: &str) -> bool {
        let r = reference.trim();
        if r.is_empty()
            || r.starts_with('#')
            || r.starts_with('?')
            || r.starts_with('/')
            || r.starts_with("data:")
            || r.starts_with("mailto:")
            || has_scheme(r)
        {
            return true;
        }
        Path::new(r)
            .extension()
            .map(|ext| {
                let ext = ext.to_string_lossy().to_ascii_lowercase();
                self.ignore.iter().any(|ignored| *ignored == ext)
            })
            .unwrap_or(false)
    }

    /// Absolute path of a local reference, resolved against the referencing file's directory
    pub fn resolve_reference(&self, reference: &str, source_file: &Path) -> Option<PathBuf> {
        if self.is_passthrough(reference) {
            return None;
        }
        let base = source_file.parent().unwrap_or_else(|| Path::new(""));
        Some(normalize_path(&base.join(reference.trim())))
    }

    pub async fn process(
        &self,
        reference: &str,
        source_file: &Path,
        want_metadata: bool,
    ) -> std::result::Result<AssetOutput, AssetError> {
        let Some(path) = self.resolve_reference(reference, source_file) else {
            return Ok(AssetOutput::Passthrough(reference.to_string()));
        };

        let bytes = tokio::fs::read(&path).await.map_err(|e| AssetError::Read {
            path: path.clone(),
            message: e.to_string(),
        })?;
        let hash = format!("{:x}", Sha256::digest(&bytes));
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let ext = path
            .extension()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let file_name = self.template.render(&name, &hash, &ext);

        if !want_metadata {
            let entry = self.extract(&path, &hash, &file_name, &bytes).await?;
            return Ok(AssetOutput::Url(entry.url));
        }

        // decode before copying so an unreadable image leaves nothing behind
        let metadata = self.image_metadata(&path, &file_name, &bytes).await?;
        let entry = self.extract(&path, &hash, &file_name, &bytes).await?;
        Ok(AssetOutput::Image(ImageDescriptor {
            src: entry.url,
            metadata,
        }))
    }

    async fn extract(
        &self,
        path: &Path,
        hash: &str,
        file_name: &str,
        bytes: &[u8],
    ) -> std::result::Result<AssetEntry, AssetError> {
        let cell = lock(&self.entries)
            .entry(file_name.to_string())
            .or_default()
            .clone();

        let initialized_here = AtomicBool::new(false);
        let flag = &initialized_here;
        let entry = cell
            .get_or_try_init(|| async move {
                flag.store(true, Ordering::Relaxed);
                let dest = self.dir.join(file_name);
                self.copy_if_needed(&dest, bytes).await?;
                Ok::<_, AssetError>(AssetEntry {
                    source: path.to_path_buf(),
                    hash: hash.to_string(),
                    file_name: file_name.to_string(),
                    url: format!("{}{}", self.public_path, file_name),
                })
            })
            .await?
            .clone();

        if !initialized_here.load(Ordering::Relaxed) {
            self.reused.fetch_add(1, Ordering::Relaxed);
            log::trace!("Reusing asset {file_name} for {}", path.display());
        }
        Ok(entry)
    }

    /// A destination left by an earlier process with the same size is kept as is
    async fn copy_if_needed(&self, dest: &Path, bytes: &[u8]) -> std::result::Result<(), AssetError> {
        let write_error = |e: std::io::Error| AssetError::Write {
            path: dest.to_path_buf(),
            message: e.to_string(),
        };
        if let Ok(existing) = tokio::fs::metadata(dest).await {
            if existing.len() == bytes.len() as u64 {
                self.reused.fetch_add(1, Ordering::Relaxed);
                return Ok(());
            }
        }
        tokio::fs::create_dir_all(&self.dir).await.map_err(write_error)?;
        tokio::fs::write(dest, bytes).await.map_err(write_error)?;
        self.copied.fetch_add(1, Ordering::Relaxed);
        log::debug!("Copied asset {}", dest.display());
        Ok(())
    }

    async fn image_metadata(
        &self,
        path: &Path,
        file_name: &str,
        bytes: &[u8],
    ) -> std::result::Result<ImageMetadata, AssetError> {
        let cell = lock(&self.images)
            .entry(file_name.to_string())
            .or_default()
            .clone();

        let preview_width = self.preview_width;
        let metadata = cell
            .get_or_try_init(|| async move {
                let owned = bytes.to_vec();
                tokio::task::spawn_blocking(move || decode_image(&owned, preview_width))
                    .await
                    .map_err(|e| AssetError::Task(e.to_string()))?
                    .map_err(|e| AssetError::Decode {
                        path: path.to_path_buf(),
                        message: e.to_string(),
                    })
            })
            .await?;
        Ok(metadata.clone())
    }

    pub fn record_reference(&self, collection: &str, asset: PathBuf) {
        lock(&self.references)
            .entry(collection.to_string())
            .or_default()
            .insert(asset);
    }

    /// Drop the reference list of a collection about to be recomputed
    pub fn forget_references(&self, collection: &str) {
        lock(&self.references).remove(collection);
    }

    /// Collections whose last pass referenced the given asset
    pub fn referenced_by(&self, asset: &Path) -> Vec<String> {
        lock(&self.references)
            .iter()
            .filter(|(_, assets)| assets.contains(asset))
            .map(|(collection, _)| collection.clone())
            .collect()
    }

    /// Forget a changed source asset so its next reference is hashed and copied again
    pub fn invalidate(&self, asset: &Path) {
        let mut entries = lock(&self.entries);
        let stale: Vec<String> = entries
            .iter()
            .filter(|(_, cell)| cell.get().map(|e| e.source == asset).unwrap_or(false))
            .map(|(name, _)| name.clone())
            .collect();
        for name in stale {
            entries.remove(&name);
            lock(&self.images).remove(&name);
        }
    }

    pub fn len(&self) -> usize {
        lock(&self.entries)
            .values()
            .filter(|cell| cell.initialized())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> AssetStats {
        AssetStats {
            copied: self.copied.load(Ordering::Relaxed),
            reused: self.reused.load(Ordering::Relaxed),
        }
    }

    pub fn reset_stats(&self) {
        self.copied.store(0, Ordering::Relaxed);
        self.reused.store(0, Ordering::Relaxed);
    }
}

fn has_scheme(reference: &str) -> bool {
    match reference.find("://") {
        Some(0) | None => false,
        Some(i) => reference[..i]
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.')),
    }
}

fn decode_image(bytes: &[u8], preview_width: u32) -> image::ImageResult<ImageMetadata> {
    let img = image::load_from_memory(bytes)?;
    let (width, height) = (img.width(), img.height());
    let blur_width = preview_width;
    let blur_height = ((height as f64 * blur_width as f64 / width.max(1) as f64).round() as u32).max(1);

    let preview = img.resize_exact(blur_width, blur_height, FilterType::Triangle);
    let mut png = Vec::new();
    preview.write_to(&mut Cursor::new(&mut png), ImageFormat::Png)?;

    Ok(ImageMetadata {
        width,
        height,
        blur_data_url: format!(
            "data:image/png;base64,{}",
            general_purpose::STANDARD.encode(&png)
        ),
        blur_width,
        blur_height,
    })
}
