use anyhow::Result;
use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};
use tracing::debug;

/// Average interleaved multi-channel samples down to mono.
pub fn audio_to_mono(audio: &[f32], channels: u16) -> Vec<f32> {
    if channels <= 1 {
        return audio.to_vec();
    }

    let mut mono = Vec::with_capacity(audio.len() / channels as usize);
    for frame in audio.chunks(channels as usize) {
        let sum: f32 = frame.iter().sum();
        mono.push(sum / channels as f32);
    }
    mono
}

pub fn resample(input: &[f32], from_sample_rate: u32, to_sample_rate: u32) -> Result<Vec<f32>> {
    if from_sample_rate == to_sample_rate {
        return Ok(input.to_vec());
    }

    debug!(
        "resampling {} samples from {} to {}",
        input.len(),
        from_sample_rate,
        to_sample_rate
    );
    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };

    let mut resampler = SincFixedIn::<f32>::new(
        to_sample_rate as f64 / from_sample_rate as f64,
        2.0,
        params,
        input.len(),
        1,
    )?;

    let waves_in = vec![input.to_vec()];
    let waves_out = resampler.process(&waves_in, None)?;
    Ok(waves_out.into_iter().next().unwrap_or_default())
}

/// The segmentation model consumes signed 16-bit PCM.
pub fn f32_to_i16(samples: &[f32]) -> Vec<i16> {
    samples
        .iter()
        .map(|&x| (x.clamp(-1.0, 1.0) * 32767.0) as i16)
        .collect()
}
