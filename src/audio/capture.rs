use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Result};
use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::StreamError;
use crossbeam::channel::{bounded, Receiver, RecvTimeoutError, Sender};
use tracing::{error, info, warn};

use super::device::{get_cpal_device_and_config, AudioDevice};
use super::{processing, SAMPLE_RATE};

/// One window of captured audio: mono samples at [`SAMPLE_RATE`]. Lives for
/// a single loop iteration.
#[derive(Debug, Clone)]
pub struct AudioWindow {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl AudioWindow {
    pub fn duration_secs(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// Blocking source of fixed-duration audio windows.
pub trait AudioSource {
    fn next_window(&mut self, duration: Duration) -> Result<AudioWindow>;
}

enum StreamControl {
    Stop(Sender<()>),
}

/// Live capture from a cpal device. The cpal stream lives on its own thread
/// (cpal streams are not `Send`); mono chunks flow over a bounded channel
/// and [`AudioSource::next_window`] accumulates them into windows.
pub struct CaptureStream {
    pub device: AudioDevice,
    device_sample_rate: u32,
    receiver: Receiver<Vec<f32>>,
    stream_control: Sender<StreamControl>,
    stream_thread: Option<thread::JoinHandle<()>>,
    is_disconnected: Arc<AtomicBool>,
}

fn window_sample_count(duration: Duration, sample_rate: u32) -> usize {
    (duration.as_secs_f64() * sample_rate as f64).ceil() as usize
}

impl CaptureStream {
    pub fn open(device: &AudioDevice) -> Result<Self> {
        let (cpal_device, config) = get_cpal_device_and_config(device)?;
        let channels = config.channels();
        let device_sample_rate = config.sample_rate().0;

        // Chunks are dropped when the consumer falls behind; the next window
        // then starts from fresher audio instead of an ever-growing backlog.
        let (tx, rx) = bounded::<Vec<f32>>(1024);
        let (control_tx, control_rx) = bounded::<StreamControl>(1);
        let (ready_tx, ready_rx) = bounded::<Result<()>>(1);

        let is_disconnected = Arc::new(AtomicBool::new(false));
        let is_disconnected_clone = is_disconnected.clone();
        let device_name = device.to_string();

        let stream_thread = thread::spawn(move || {
            let error_callback = move |err: StreamError| {
                error!("audio stream error: {}", err);
                is_disconnected_clone.store(true, Ordering::Relaxed);
            };

            let build_result = match config.sample_format() {
                cpal::SampleFormat::F32 => cpal_device.build_input_stream(
                    &config.into(),
                    {
                        let tx = tx.clone();
                        move |data: &[f32], _: &_| {
                            let _ = tx.try_send(processing::audio_to_mono(data, channels));
                        }
                    },
                    error_callback,
                    None,
                ),
                cpal::SampleFormat::I16 => cpal_device.build_input_stream(
                    &config.into(),
                    {
                        let tx = tx.clone();
                        move |data: &[i16], _: &_| {
                            let floats: Vec<f32> =
                                data.iter().map(|&s| s as f32 / 32768.0).collect();
                            let _ = tx.try_send(processing::audio_to_mono(&floats, channels));
                        }
                    },
                    error_callback,
                    None,
                ),
                cpal::SampleFormat::I32 => cpal_device.build_input_stream(
                    &config.into(),
                    {
                        let tx = tx.clone();
                        move |data: &[i32], _: &_| {
                            let floats: Vec<f32> =
                                data.iter().map(|&s| s as f32 / 2_147_483_648.0).collect();
                            let _ = tx.try_send(processing::audio_to_mono(&floats, channels));
                        }
                    },
                    error_callback,
                    None,
                ),
                cpal::SampleFormat::U16 => cpal_device.build_input_stream(
                    &config.into(),
                    {
                        let tx = tx.clone();
                        move |data: &[u16], _: &_| {
                            let floats: Vec<f32> = data
                                .iter()
                                .map(|&s| (s as f32 - 32768.0) / 32768.0)
                                .collect();
                            let _ = tx.try_send(processing::audio_to_mono(&floats, channels));
                        }
                    },
                    error_callback,
                    None,
                ),
                other => {
                    let _ = ready_tx.send(Err(anyhow!("unsupported sample format: {}", other)));
                    return;
                }
            };

            let stream = match build_result {
                Ok(stream) => stream,
                Err(e) => {
                    let _ = ready_tx.send(Err(anyhow!("failed to build input stream: {}", e)));
                    return;
                }
            };

            if let Err(e) = stream.play() {
                let _ = ready_tx.send(Err(anyhow!("failed to start stream: {}", e)));
                return;
            }
            let _ = ready_tx.send(Ok(()));

            if let Ok(StreamControl::Stop(ack)) = control_rx.recv() {
                info!("stopping capture stream for {}", device_name);
                stream.pause().ok();
                drop(stream);
                let _ = ack.send(());
            }
        });

        ready_rx
            .recv()
            .map_err(|_| anyhow!("capture thread exited before reporting readiness"))??;

        info!(
            "opened capture stream for {} at {} Hz",
            device, device_sample_rate
        );

        Ok(CaptureStream {
            device: device.clone(),
            device_sample_rate,
            receiver: rx,
            stream_control: control_tx,
            stream_thread: Some(stream_thread),
            is_disconnected,
        })
    }

    pub fn is_disconnected(&self) -> bool {
        self.is_disconnected.load(Ordering::Relaxed)
    }
}

impl AudioSource for CaptureStream {
    /// Blocks until one full window of audio has been captured, then hands
    /// it back resampled to [`SAMPLE_RATE`] mono.
    fn next_window(&mut self, duration: Duration) -> Result<AudioWindow> {
        let target_len = window_sample_count(duration, self.device_sample_rate);
        let mut collected: Vec<f32> = Vec::with_capacity(target_len);

        while collected.len() < target_len {
            if self.is_disconnected() {
                return Err(anyhow!("audio device {} disconnected", self.device));
            }
            match self.receiver.recv_timeout(Duration::from_millis(100)) {
                Ok(chunk) => collected.extend(chunk),
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(anyhow!("audio stream for {} closed", self.device));
                }
            }
        }
        collected.truncate(target_len);

        let samples = if self.device_sample_rate != SAMPLE_RATE {
            processing::resample(&collected, self.device_sample_rate, SAMPLE_RATE)?
        } else {
            collected
        };

        Ok(AudioWindow {
            samples,
            sample_rate: SAMPLE_RATE,
        })
    }
}

impl Drop for CaptureStream {
    fn drop(&mut self) {
        let (ack_tx, ack_rx) = bounded(1);
        if self.stream_control.send(StreamControl::Stop(ack_tx)).is_ok() {
            if ack_rx.recv_timeout(Duration::from_secs(1)).is_err() {
                warn!("capture thread did not acknowledge stop in time");
            }
        }
        if let Some(handle) = self.stream_thread.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_sample_count_rounds_up() {
        assert_eq!(window_sample_count(Duration::from_secs(10), 16_000), 160_000);
        assert_eq!(window_sample_count(Duration::from_millis(1), 16_000), 16);
        assert_eq!(window_sample_count(Duration::from_millis(100), 44_100), 4_410);
    }

    #[test]
    fn window_duration_reflects_sample_rate() {
        let window = AudioWindow {
            samples: vec![0.0; 32_000],
            sample_rate: 16_000,
        };
        assert!((window.duration_secs() - 2.0).abs() < f64::EPSILON);
    }
}
