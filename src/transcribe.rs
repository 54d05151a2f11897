use std::fmt;
use std::path::Path;
use std::str::FromStr;

use anyhow::{anyhow, Context, Result};
use tracing::debug;
use whisper_rs::{
    DtwModelPreset, DtwMode, FullParams, SamplingStrategy, WhisperContext,
    WhisperContextParameters,
};

use crate::align::Word;
use crate::audio::AudioWindow;
use crate::config::ComputeDevice;

/// Batch transcription of one window into word-timestamped tokens. Each call
/// is complete and blocking; there is no streaming output.
pub trait Transcriber {
    fn transcribe(&mut self, window: &AudioWindow) -> Result<Vec<Word>>;
}

#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub enum WhisperModel {
    Tiny,
    TinyQuantized,
    Base,
    Small,
    Medium,
    LargeV3,
    LargeV3Quantized,
    #[default]
    LargeV3Turbo,
    LargeV3TurboQuantized,
}

impl WhisperModel {
    pub fn ggml_filename(&self) -> &'static str {
        match self {
            WhisperModel::Tiny => "ggml-tiny.bin",
            WhisperModel::TinyQuantized => "ggml-tiny-q8_0.bin",
            WhisperModel::Base => "ggml-base.bin",
            WhisperModel::Small => "ggml-small.bin",
            WhisperModel::Medium => "ggml-medium.bin",
            WhisperModel::LargeV3 => "ggml-large-v3.bin",
            WhisperModel::LargeV3Quantized => "ggml-large-v3-q5_0.bin",
            WhisperModel::LargeV3Turbo => "ggml-large-v3-turbo.bin",
            WhisperModel::LargeV3TurboQuantized => "ggml-large-v3-turbo-q8_0.bin",
        }
    }

    fn dtw_preset(&self) -> DtwModelPreset {
        match self {
            WhisperModel::Tiny | WhisperModel::TinyQuantized => DtwModelPreset::Tiny,
            WhisperModel::Base => DtwModelPreset::Base,
            WhisperModel::Small => DtwModelPreset::Small,
            WhisperModel::Medium => DtwModelPreset::Medium,
            WhisperModel::LargeV3 | WhisperModel::LargeV3Quantized => DtwModelPreset::LargeV3,
            WhisperModel::LargeV3Turbo | WhisperModel::LargeV3TurboQuantized => {
                DtwModelPreset::LargeV3Turbo
            }
        }
    }
}

impl FromStr for WhisperModel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "tiny" => Ok(WhisperModel::Tiny),
            "tiny-q8" => Ok(WhisperModel::TinyQuantized),
            "base" => Ok(WhisperModel::Base),
            "small" => Ok(WhisperModel::Small),
            "medium" => Ok(WhisperModel::Medium),
            "large-v3" => Ok(WhisperModel::LargeV3),
            "large-v3-q5" => Ok(WhisperModel::LargeV3Quantized),
            "large-v3-turbo" => Ok(WhisperModel::LargeV3Turbo),
            "large-v3-turbo-q8" => Ok(WhisperModel::LargeV3TurboQuantized),
            other => Err(format!("unknown whisper model '{}'", other)),
        }
    }
}

impl fmt::Display for WhisperModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WhisperModel::Tiny => "tiny",
            WhisperModel::TinyQuantized => "tiny-q8",
            WhisperModel::Base => "base",
            WhisperModel::Small => "small",
            WhisperModel::Medium => "medium",
            WhisperModel::LargeV3 => "large-v3",
            WhisperModel::LargeV3Quantized => "large-v3-q5",
            WhisperModel::LargeV3Turbo => "large-v3-turbo",
            WhisperModel::LargeV3TurboQuantized => "large-v3-turbo-q8",
        };
        write!(f, "{}", name)
    }
}

/// whisper.cpp-backed transcriber. Word timestamps come from DTW-aligned
/// token timestamps with one word per decoded segment.
pub struct WhisperTranscriber {
    ctx: WhisperContext,
    language: String,
}

impl WhisperTranscriber {
    pub fn new(
        model_path: &Path,
        model: &WhisperModel,
        device: ComputeDevice,
        language: &str,
    ) -> Result<Self> {
        let mut ctx_params = WhisperContextParameters::default();
        ctx_params.use_gpu = device.use_gpu();
        ctx_params.dtw_parameters.mode = DtwMode::ModelPreset {
            model_preset: model.dtw_preset(),
        };

        let ctx = WhisperContext::new_with_params(
            model_path
                .to_str()
                .ok_or_else(|| anyhow!("invalid model path: {:?}", model_path))?,
            ctx_params,
        )
        .with_context(|| format!("failed to load whisper model {}", model))?;

        Ok(WhisperTranscriber {
            ctx,
            language: language.to_string(),
        })
    }
}

impl Transcriber for WhisperTranscriber {
    fn transcribe(&mut self, window: &AudioWindow) -> Result<Vec<Word>> {
        let mut state = self.ctx.create_state()?;
        let mut params = FullParams::new(SamplingStrategy::Greedy { best_of: 1 });

        params.set_print_special(false);
        params.set_print_progress(false);
        params.set_print_realtime(false);
        params.set_print_timestamps(false);
        params.set_suppress_blank(true);
        // One word per segment, timestamped at token granularity.
        params.set_token_timestamps(true);
        params.set_max_len(1);
        params.set_split_on_word(true);
        params.set_language(Some(&self.language));

        state.full(params, &window.samples)?;

        let num_segments = state.full_n_segments()?;
        let mut words = Vec::with_capacity(num_segments as usize);
        for i in 0..num_segments {
            let text = state.full_get_segment_text_lossy(i)?;
            if text.trim().is_empty() {
                continue;
            }
            // t0/t1 are centiseconds
            let start = state.full_get_segment_t0(i)? as f64 * 0.01;
            let end = state.full_get_segment_t1(i)? as f64 * 0.01;
            words.push(Word { text, start, end });
        }

        debug!("transcribed {} words from window", words.len());
        Ok(words)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_names_resolve_to_ggml_files() {
        assert_eq!(
            "tiny".parse::<WhisperModel>().unwrap().ggml_filename(),
            "ggml-tiny.bin"
        );
        assert_eq!(
            "large-v3-turbo"
                .parse::<WhisperModel>()
                .unwrap()
                .ggml_filename(),
            "ggml-large-v3-turbo.bin"
        );
        assert_eq!(
            "large-v3-q5".parse::<WhisperModel>().unwrap().ggml_filename(),
            "ggml-large-v3-q5_0.bin"
        );
    }

    #[test]
    fn unknown_model_name_is_rejected() {
        assert!("huge-v9".parse::<WhisperModel>().is_err());
    }

    #[test]
    fn display_round_trips_through_from_str() {
        for name in [
            "tiny",
            "tiny-q8",
            "base",
            "small",
            "medium",
            "large-v3",
            "large-v3-q5",
            "large-v3-turbo",
            "large-v3-turbo-q8",
        ] {
            let model: WhisperModel = name.parse().unwrap();
            assert_eq!(model.to_string(), name);
        }
    }
}
