use std::path::Path;

use anyhow::{anyhow, Result};
use pyannote_rs::{EmbeddingExtractor, EmbeddingManager};
use tracing::{debug, warn};

use crate::align::SpeakerSegment;
use crate::audio::{processing, AudioWindow};
use crate::models::DiarizationModelPaths;

/// Cosine-similarity threshold for matching a segment embedding to an
/// already-seen speaker within the window.
const SPEAKER_SEARCH_THRESHOLD: f32 = 0.5;

/// Batch diarization of one window into labelled speaker intervals. Labels
/// are local to each call; there is no cross-window speaker identity.
pub trait Diarizer {
    fn diarize(&mut self, window: &AudioWindow) -> Result<Vec<SpeakerSegment>>;
}

pub struct PyannoteDiarizer {
    segmentation_model: String,
    extractor: EmbeddingExtractor,
    max_speakers: usize,
}

impl PyannoteDiarizer {
    pub fn new(paths: &DiarizationModelPaths, max_speakers: usize) -> Result<Self> {
        let segmentation_model = path_str(&paths.segmentation)?.to_string();
        let extractor = EmbeddingExtractor::new(path_str(&paths.embedding)?)
            .map_err(|e| anyhow!("failed to load embedding model: {}", e))?;
        Ok(PyannoteDiarizer {
            segmentation_model,
            extractor,
            max_speakers,
        })
    }
}

fn path_str(path: &Path) -> Result<&str> {
    path.to_str()
        .ok_or_else(|| anyhow!("invalid model path: {:?}", path))
}

impl Diarizer for PyannoteDiarizer {
    fn diarize(&mut self, window: &AudioWindow) -> Result<Vec<SpeakerSegment>> {
        let samples_i16 = processing::f32_to_i16(&window.samples);
        let raw_segments =
            pyannote_rs::segment(&samples_i16, window.sample_rate, &self.segmentation_model)
                .map_err(|e| anyhow!("segmentation failed: {}", e))?;

        // Fresh manager per window: labels are deliberately window-local.
        let mut manager = EmbeddingManager::new(self.max_speakers);
        let mut seen_ids: Vec<usize> = Vec::new();
        let mut segments = Vec::with_capacity(raw_segments.len());

        for raw in raw_segments {
            if raw.samples.is_empty() {
                continue;
            }
            let embedding: Vec<f32> = match self.extractor.compute(&raw.samples) {
                Ok(values) => values.collect(),
                Err(e) => {
                    warn!("embedding failed for segment {:.2}-{:.2}: {}", raw.start, raw.end, e);
                    continue;
                }
            };

            let speaker_id = if manager.get_all_speakers().len() == self.max_speakers {
                match manager.get_best_speaker_match(embedding) {
                    Ok(id) => Some(id),
                    Err(e) => {
                        warn!("speaker match failed: {}", e);
                        None
                    }
                }
            } else {
                manager.search_speaker(embedding, SPEAKER_SEARCH_THRESHOLD)
            };

            let Some(id) = speaker_id else { continue };
            let label_index = match seen_ids.iter().position(|&seen| seen == id) {
                Some(index) => index,
                None => {
                    seen_ids.push(id);
                    seen_ids.len() - 1
                }
            };

            segments.push(SpeakerSegment {
                start: raw.start,
                end: raw.end,
                speaker: format!("SPEAKER_{:02}", label_index),
            });
        }

        debug!(
            "diarized window into {} segments across {} speakers",
            segments.len(),
            seen_ids.len()
        );
        Ok(segments)
    }
}
