//! Model file resolution: local Hugging Face cache first, download on miss.

use std::path::PathBuf;

use anyhow::Result;
use hf_hub::api::sync::ApiBuilder;
use hf_hub::{Cache, Repo, RepoType};
use tracing::info;

use crate::transcribe::WhisperModel;

const WHISPER_REPO: &str = "ggerganov/whisper.cpp";
const DIARIZATION_REPO: &str = "thewh1teagle/pyannote-rs";
const SEGMENTATION_FILE: &str = "segmentation-3.0.onnx";
const EMBEDDING_FILE: &str = "wespeaker_en_voxceleb_CAM++.onnx";

#[derive(Debug, Clone)]
pub struct DiarizationModelPaths {
    pub segmentation: PathBuf,
    pub embedding: PathBuf,
}

fn fetch(repo_name: &str, file_name: &str, token: Option<&str>) -> Result<PathBuf> {
    let repo = Repo::with_revision(repo_name.to_string(), RepoType::Model, "main".to_string());

    let cache = Cache::default();
    if let Some(path) = cache.repo(repo.clone()).get(file_name) {
        info!("model found at {:?}", path);
        return Ok(path);
    }

    let api = ApiBuilder::new()
        .with_token(token.map(|t| t.to_string()))
        .build()?;

    info!("downloading model {} from {}", file_name, repo_name);
    let path = api.repo(repo).get(file_name)?;
    info!("model downloaded {}", file_name);

    Ok(path)
}

pub fn download_whisper_model(model: &WhisperModel) -> Result<PathBuf> {
    fetch(WHISPER_REPO, model.ggml_filename(), None)
}

/// Both diarization ONNX files. The token is the configured `hf_token`; the
/// download fails without it on gated mirrors.
pub fn download_diarization_models(hf_token: &str) -> Result<DiarizationModelPaths> {
    let segmentation = fetch(DIARIZATION_REPO, SEGMENTATION_FILE, Some(hf_token))?;
    let embedding = fetch(DIARIZATION_REPO, EMBEDDING_FILE, Some(hf_token))?;
    Ok(DiarizationModelPaths {
        segmentation,
        embedding,
    })
}
