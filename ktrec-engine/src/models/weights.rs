//! Model bundles: `config.json` + `vocab.json` + `model.safetensors`.
//!
//! A bundle is loaded once at startup. Anything that does not line up with
//! the declared architecture fails the whole load; there is no partial model.

use std::path::{Path, PathBuf};

use candle_core::{DType, Device};
use candle_nn::{VarBuilder, VarMap};

use super::{KtModel, ModelConfig};
use crate::error::{KtError, Result};
use crate::index::ItemIndex;

pub const CONFIG_FILE: &str = "config.json";
pub const VOCAB_FILE: &str = "vocab.json";
pub const WEIGHTS_FILE: &str = "model.safetensors";

/// Where a bundle lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelSource {
    /// Download from HuggingFace Hub (cached by hf-hub).
    HubDownload {
        repo_id: String,
        revision: Option<String>,
    },
    /// A directory on disk.
    LocalDir(PathBuf),
}

/// Resolved paths of the three bundle files.
#[derive(Debug, Clone)]
pub struct ModelFiles {
    pub config: PathBuf,
    pub vocab: PathBuf,
    pub weights: PathBuf,
}

impl ModelFiles {
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            config: dir.join(CONFIG_FILE),
            vocab: dir.join(VOCAB_FILE),
            weights: dir.join(WEIGHTS_FILE),
        }
    }
}

/// An existing path is a local bundle; anything else is a Hub repo id.
pub fn resolve_source(model_id: &str, revision: Option<&str>) -> ModelSource {
    let path = PathBuf::from(model_id);
    if path.exists() {
        return ModelSource::LocalDir(path);
    }
    ModelSource::HubDownload {
        repo_id: model_id.to_string(),
        revision: revision.map(String::from),
    }
}

impl ModelSource {
    /// Resolve to local file paths, downloading if necessary.
    pub fn resolve(&self) -> Result<ModelFiles> {
        match self {
            Self::HubDownload { repo_id, revision } => {
                tracing::info!(repo_id, revision = ?revision, "Fetching model bundle from HuggingFace Hub");
                let api = hf_hub::api::sync::Api::new().map_err(hub_error)?;
                let repo = match revision {
                    Some(rev) => api.repo(hf_hub::Repo::with_revision(
                        repo_id.clone(),
                        hf_hub::RepoType::Model,
                        rev.clone(),
                    )),
                    None => api.model(repo_id.clone()),
                };
                let files = ModelFiles {
                    config: repo.get(CONFIG_FILE).map_err(hub_error)?,
                    vocab: repo.get(VOCAB_FILE).map_err(hub_error)?,
                    weights: repo.get(WEIGHTS_FILE).map_err(hub_error)?,
                };
                tracing::info!(weights = %files.weights.display(), "Model bundle downloaded/cached");
                Ok(files)
            }
            Self::LocalDir(dir) => {
                let files = ModelFiles::in_dir(dir);
                for path in [&files.config, &files.vocab, &files.weights] {
                    if !path.exists() {
                        return Err(KtError::Io(std::io::Error::new(
                            std::io::ErrorKind::NotFound,
                            format!("Model file not found: {}", path.display()),
                        )));
                    }
                }
                Ok(files)
            }
        }
    }
}

fn hub_error(e: impl std::fmt::Display) -> KtError {
    KtError::Hub(e.to_string())
}

// ── Bundle ───────────────────────────────────────────────────────────────

/// Trained parameters plus the item index they were trained against.
pub struct ModelBundle {
    pub model: KtModel,
    pub index: ItemIndex,
}

impl ModelBundle {
    pub fn load(files: &ModelFiles, device: &Device) -> Result<Self> {
        tracing::info!(
            config = %files.config.display(),
            weights = %files.weights.display(),
            "Loading knowledge-tracing model"
        );

        let config: ModelConfig = serde_json::from_str(&std::fs::read_to_string(&files.config)?)?;
        config.validate()?;

        let vocab: Vec<String> = serde_json::from_str(&std::fs::read_to_string(&files.vocab)?)?;
        let index = ItemIndex::build(vocab.iter().map(String::as_str));
        if index.len() != vocab.len() {
            return Err(KtError::InvalidConfig(format!(
                "{} lists {} ids but only {} are distinct",
                VOCAB_FILE,
                vocab.len(),
                index.len()
            )));
        }
        if index.len() != config.n_items {
            return Err(KtError::IncompatibleWeights(format!(
                "config declares {} items but the vocabulary has {}",
                config.n_items,
                index.len()
            )));
        }

        if !files.weights.exists() {
            return Err(KtError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("Weights file not found: {}", files.weights.display()),
            )));
        }

        // SAFETY: the weights file is opened read-only and is not modified
        // while the model is alive; tensors are materialized as F32.
        let vb = unsafe {
            VarBuilder::from_mmaped_safetensors(&[files.weights.clone()], DType::F32, device)
        }
        .map_err(|e| KtError::IncompatibleWeights(e.to_string()))?;

        let model = KtModel::load(vb, &config)?;
        tracing::info!(
            n_items = config.n_items,
            embed_dim = config.embed_dim,
            hidden_dim = config.hidden_dim,
            window_len = config.window_len,
            "Model loaded"
        );

        Ok(Self { model, index })
    }
}

/// Write a bundle directory that [`ModelBundle::load`] can read back.
pub fn save_bundle(dir: &Path, config: &ModelConfig, index: &ItemIndex, varmap: &VarMap) -> Result<()> {
    std::fs::create_dir_all(dir)?;
    let files = ModelFiles::in_dir(dir);
    std::fs::write(&files.config, serde_json::to_string_pretty(config)?)?;
    std::fs::write(&files.vocab, serde_json::to_string_pretty(index.items())?)?;
    varmap.save(&files.weights)?;
    tracing::info!(dir = %dir.display(), "Model bundle saved");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::test_support::small_config;
    use crate::models::NextItemModel;
    use crate::sequence::build_inference_window;

    fn fresh_bundle(dir: &Path, config: &ModelConfig, index: &ItemIndex) -> KtModel {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        let model = KtModel::load(vb, config).unwrap();
        save_bundle(dir, config, index, &varmap).unwrap();
        model
    }

    #[test]
    fn save_then_load_reproduces_logits() {
        let dir = tempfile::tempdir().unwrap();
        let index = ItemIndex::build(["a", "b", "c"]);
        let config = small_config(3);
        let original = fresh_bundle(dir.path(), &config, &index);

        let files = ModelSource::LocalDir(dir.path().to_path_buf()).resolve().unwrap();
        let loaded = ModelBundle::load(&files, &Device::Cpu).unwrap();
        assert_eq!(loaded.index, index);
        assert_eq!(loaded.model.config(), &config);

        let seq = build_inference_window(&[1, 3], &[true, false], config.window_len).unwrap();
        let a = original.logits(&[&seq]).unwrap();
        let b = loaded.model.logits(&[&seq]).unwrap();
        for (x, y) in a[0].iter().zip(&b[0]) {
            assert!((x - y).abs() < 1e-6);
        }
    }

    #[test]
    fn vocabulary_size_disagreement_is_incompatible() {
        let dir = tempfile::tempdir().unwrap();
        let config = small_config(3);
        fresh_bundle(dir.path(), &config, &ItemIndex::build(["a", "b"]));

        let files = ModelFiles::in_dir(dir.path());
        assert!(matches!(
            ModelBundle::load(&files, &Device::Cpu),
            Err(KtError::IncompatibleWeights(_))
        ));
    }

    #[test]
    fn architecture_disagreement_is_incompatible() {
        let dir = tempfile::tempdir().unwrap();
        let config = small_config(3);
        let index = ItemIndex::build(["a", "b", "c"]);
        fresh_bundle(dir.path(), &config, &index);

        let mut wider = config.clone();
        wider.hidden_dim += 2;
        std::fs::write(dir.path().join(CONFIG_FILE), serde_json::to_string(&wider).unwrap()).unwrap();

        let files = ModelFiles::in_dir(dir.path());
        assert!(matches!(
            ModelBundle::load(&files, &Device::Cpu),
            Err(KtError::IncompatibleWeights(_))
        ));
    }

    #[test]
    fn duplicate_vocabulary_entries_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let config = small_config(3);
        fresh_bundle(dir.path(), &config, &ItemIndex::build(["a", "b", "c"]));
        std::fs::write(dir.path().join(VOCAB_FILE), r#"["a", "a", "b"]"#).unwrap();

        let files = ModelFiles::in_dir(dir.path());
        assert!(matches!(
            ModelBundle::load(&files, &Device::Cpu),
            Err(KtError::InvalidConfig(_))
        ));
    }

    #[test]
    fn missing_local_files_are_reported() {
        let dir = tempfile::tempdir().unwrap();
        let err = ModelSource::LocalDir(dir.path().to_path_buf()).resolve().unwrap_err();
        assert!(matches!(err, KtError::Io(ref e) if e.kind() == std::io::ErrorKind::NotFound));
    }

    #[test]
    fn resolve_source_prefers_existing_paths() {
        let dir = tempfile::tempdir().unwrap();
        let local = resolve_source(dir.path().to_str().unwrap(), None);
        assert_eq!(local, ModelSource::LocalDir(dir.path().to_path_buf()));

        let hub = resolve_source("org/kt-model-that-is-not-a-path", Some("v1"));
        assert_eq!(
            hub,
            ModelSource::HubDownload {
                repo_id: "org/kt-model-that-is-not-a-path".into(),
                revision: Some("v1".into()),
            }
        );
    }
}
