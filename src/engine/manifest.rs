// Asset manifest — declarative list of resources, filtered down to loadable sprites.

use std::path::Path;

use anyhow::{Context, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Deserializer};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetKind {
    Image,
    Audio,
    Font,
    Data,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AssetDescriptor {
    #[serde(rename = "type")]
    pub kind: AssetKind,
    #[serde(default)]
    pub src: Option<String>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub width: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub height: Option<f64>,
}

// Any JSON number is accepted; other values are treated as absent.
fn lenient_number<'de, D>(deserializer: D) -> std::result::Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| v.as_f64()))
}

/// Whole pixels from a declared size. Negative or non-finite sizes are unknown.
fn pixels(size: Option<f64>) -> Option<u32> {
    size.filter(|v| v.is_finite() && *v >= 0.0).map(|v| v as u32)
}

impl AssetDescriptor {
    pub fn image(src: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            kind: AssetKind::Image,
            src: Some(src.into()),
            width: Some(width.into()),
            height: Some(height.into()),
        }
    }

    pub fn other(kind: AssetKind, src: Option<String>) -> Self {
        Self {
            kind,
            src,
            width: None,
            height: None,
        }
    }
}

/// Mapping from asset key to descriptor. Iterates in the order keys were
/// declared; re-inserting a key keeps its original position.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(transparent)]
pub struct Manifest {
    assets: IndexMap<String, AssetDescriptor>,
}

impl Manifest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("parsing asset manifest")
    }

    pub async fn load(path: &Path) -> Result<Self> {
        let json = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("reading manifest {}", path.display()))?;
        Self::from_json_str(&json)
    }

    pub fn insert(&mut self, key: impl Into<String>, asset: AssetDescriptor) {
        self.assets.insert(key.into(), asset);
    }

    pub fn with(mut self, key: impl Into<String>, asset: AssetDescriptor) -> Self {
        self.insert(key, asset);
        self
    }

    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &AssetDescriptor)> {
        self.assets.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// One loadable sprite extracted from a manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpriteEntry {
    pub key: String,
    pub path: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

/// Keep image entries with a non-empty `src`, in manifest order.
pub fn extract_paths(manifest: &Manifest) -> Vec<SpriteEntry> {
    manifest
        .iter()
        .filter(|(_, asset)| asset.kind == AssetKind::Image)
        .filter_map(|(key, asset)| {
            let src = asset.src.as_deref().filter(|s| !s.is_empty())?;
            Some(SpriteEntry {
                key: key.to_string(),
                path: src.to_string(),
                width: pixels(asset.width),
                height: pixels(asset.height),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_skips_non_images_and_empty_src() {
        let manifest = Manifest::new()
            .with("hero", AssetDescriptor::image("sprites/hero.png", 32, 48))
            .with("theme", AssetDescriptor::other(AssetKind::Audio, Some("theme.ogg".into())))
            .with(
                "blank",
                AssetDescriptor {
                    kind: AssetKind::Image,
                    src: Some(String::new()),
                    width: None,
                    height: None,
                },
            )
            .with("nosrc", AssetDescriptor::other(AssetKind::Image, None));

        let entries = extract_paths(&manifest);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].key, "hero");
        assert_eq!(entries[0].path, "sprites/hero.png");
        assert_eq!(entries[0].width, Some(32));
        assert_eq!(entries[0].height, Some(48));
    }

    #[test]
    fn test_manifest_json() {
        let manifest = Manifest::from_json_str(
            r#"{
                "b_tile": {"type": "image", "src": "tiles/b.png", "width": 16, "height": 16},
                "a_tile": {"type": "image", "src": "tiles/a.png"},
                "click": {"type": "sound", "src": "click.wav"}
            }"#,
        )
        .unwrap();

        assert_eq!(manifest.len(), 3);
        let entries = extract_paths(&manifest);
        let paths: Vec<&str> = entries.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["tiles/b.png", "tiles/a.png"]);
        assert_eq!(entries[0].width, Some(16));
        assert_eq!(entries[1].width, None);
    }

    #[test]
    fn test_manifest_keeps_declaration_order() {
        let manifest = Manifest::from_json_str(
            r#"{
                "zeta": {"type": "image", "src": "z.png"},
                "alpha": {"type": "image", "src": "a.png"},
                "mid": {"type": "image", "src": "m.png"}
            }"#,
        )
        .unwrap();
        let paths: Vec<String> = extract_paths(&manifest).into_iter().map(|e| e.path).collect();
        assert_eq!(paths, vec!["z.png", "a.png", "m.png"]);

        let built = Manifest::new()
            .with("z", AssetDescriptor::image("z.png", 1, 1))
            .with("a", AssetDescriptor::image("a.png", 1, 1));
        let keys: Vec<&str> = built.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["z", "a"]);
    }

    #[test]
    fn test_manifest_lenient_dimensions() {
        let manifest = Manifest::from_json_str(
            r#"{
                "half": {"type": "image", "src": "half.png", "width": 16.5, "height": 8.0},
                "neg": {"type": "image", "src": "neg.png", "width": -4, "height": 4},
                "text": {"type": "image", "src": "text.png", "width": "wide", "height": null}
            }"#,
        )
        .unwrap();

        let entries = extract_paths(&manifest);
        assert_eq!(entries.len(), 3);
        assert_eq!((entries[0].width, entries[0].height), (Some(16), Some(8)));
        assert_eq!((entries[1].width, entries[1].height), (None, Some(4)));
        assert_eq!((entries[2].width, entries[2].height), (None, None));
    }

    #[test]
    fn test_manifest_missing_type_is_error() {
        assert!(Manifest::from_json_str(r#"{"x": {"src": "x.png"}}"#).is_err());
    }
}
