//! On-disk module image format: pretty-printed JSON of the
//! [`ModuleImage`] object model.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use syncweave_ir::ModuleImage;

pub fn load_image(path: &Path) -> Result<ModuleImage> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read module image {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse module image {}", path.display()))
}

pub fn save_image(path: &Path, image: &ModuleImage) -> Result<()> {
    let raw = serde_json::to_string_pretty(image).context("failed to serialize module image")?;
    fs::write(path, raw)
        .with_context(|| format!("failed to write module image {}", path.display()))
}

/// Serialize any report-shaped value next to the woven image.
pub fn save_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    let raw = serde_json::to_string_pretty(value).context("failed to serialize report")?;
    fs::write(path, raw).with_context(|| format!("failed to write {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use syncweave_ir::TypeDef;

    #[test]
    fn image_survives_save_and_load() {
        let mut image = ModuleImage::default();
        image.add_type(TypeDef::new("Actor"));
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("image.json");
        save_image(&path, &image).unwrap();
        let restored = load_image(&path).unwrap();
        assert!(restored.find_type("Actor").is_some());
    }

    #[test]
    fn missing_file_reports_path() {
        let err = load_image(Path::new("/nonexistent/image.json")).unwrap_err();
        assert!(format!("{err:#}").contains("/nonexistent/image.json"));
    }
}
