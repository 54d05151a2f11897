//! The capture-transcribe-diarize-align loop and its session state machine.
//!
//! Exactly one worker thread runs the Loading -> Running sequence. The
//! presentation layer only sees `SessionEvent`s; it never calls into the
//! model objects. The stop flag is checked between iterations only, so a
//! stop request lets the in-flight window finish.

use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use crossbeam::channel::{unbounded, Receiver, Sender};
use tracing::{error, info};

use crate::align::{align, format_lines};
use crate::audio::{select_capture_device, AudioSource, CaptureStream};
use crate::config::Settings;
use crate::diarize::{Diarizer, PyannoteDiarizer};
use crate::error::SessionError;
use crate::models::{download_diarization_models, download_whisper_model};
use crate::transcribe::{Transcriber, WhisperModel, WhisperTranscriber};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Loading,
    Running,
    Stopping,
    Failed,
}

/// One-way worker-to-presentation messages.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    Text(String),
    Error(String),
}

pub struct Session;

pub struct SessionHandle {
    stop: Arc<AtomicBool>,
    state: Arc<Mutex<SessionState>>,
    worker: Option<thread::JoinHandle<()>>,
    events: Receiver<SessionEvent>,
}

impl SessionHandle {
    pub fn state(&self) -> SessionState {
        *self.state.lock().expect("state lock poisoned")
    }

    pub fn events(&self) -> &Receiver<SessionEvent> {
        &self.events
    }

    /// Request a cooperative stop. The current window, if one is in flight,
    /// completes before the worker exits.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }

    /// Block until the worker has exited.
    pub fn join(mut self) {
        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }
    }
}

fn set_state(state: &Mutex<SessionState>, next: SessionState) {
    *state.lock().expect("state lock poisoned") = next;
}

impl Session {
    /// Validate the configuration and spawn the worker. Configuration
    /// problems are reported here, before any thread or device exists.
    pub fn start(settings: Settings) -> Result<SessionHandle, SessionError> {
        settings.validate()?;
        let whisper_model = WhisperModel::from_str(&settings.whisper_model)
            .map_err(SessionError::Configuration)?;

        let (event_tx, event_rx) = unbounded();
        let stop = Arc::new(AtomicBool::new(false));
        let state = Arc::new(Mutex::new(SessionState::Idle));

        let worker_stop = stop.clone();
        let worker_state = state.clone();
        let worker = thread::Builder::new()
            .name("diascribe-worker".to_string())
            .spawn(move || {
                match run_worker(
                    &settings,
                    &whisper_model,
                    &worker_stop,
                    &worker_state,
                    &event_tx,
                ) {
                    Ok(()) => {
                        set_state(&worker_state, SessionState::Idle);
                        info!("session ended");
                    }
                    Err(e) => {
                        error!("session failed: {}", e);
                        let _ = event_tx.send(SessionEvent::Error(e.to_string()));
                        set_state(&worker_state, SessionState::Failed);
                    }
                }
            })
            .map_err(|e| SessionError::Configuration(format!("failed to spawn worker: {}", e)))?;

        Ok(SessionHandle {
            stop,
            state,
            worker: Some(worker),
            events: event_rx,
        })
    }
}

fn run_worker(
    settings: &Settings,
    whisper_model: &WhisperModel,
    stop: &AtomicBool,
    state: &Mutex<SessionState>,
    events: &Sender<SessionEvent>,
) -> Result<(), SessionError> {
    set_state(state, SessionState::Loading);
    let _ = events.send(SessionEvent::Text("loading models...\n".to_string()));

    let whisper_path =
        download_whisper_model(whisper_model).map_err(|e| SessionError::ModelLoad(e.to_string()))?;
    let mut transcriber = WhisperTranscriber::new(
        &whisper_path,
        whisper_model,
        settings.device,
        &settings.language,
    )
    .map_err(|e| SessionError::ModelLoad(e.to_string()))?;

    let diarization_paths = download_diarization_models(&settings.hf_token)
        .map_err(|e| SessionError::ModelLoad(e.to_string()))?;
    let mut diarizer = PyannoteDiarizer::new(&diarization_paths, settings.max_speakers)
        .map_err(|e| SessionError::ModelLoad(e.to_string()))?;

    let device = select_capture_device(&settings.loopback_patterns)?;
    let mut source = CaptureStream::open(&device)
        .map_err(|e| SessionError::DeviceUnavailable(e.to_string()))?;

    let _ = events.send(SessionEvent::Text(
        "models loaded, transcription started\n".to_string(),
    ));
    set_state(state, SessionState::Running);

    let result = run_capture_loop(
        &mut source,
        &mut transcriber,
        &mut diarizer,
        Duration::from_secs(settings.interval_seconds),
        stop,
        events,
    );

    if result.is_ok() {
        set_state(state, SessionState::Stopping);
    }
    drop(source); // release the audio device before reporting Idle
    result
}

/// One window cycle per iteration: capture, transcribe, diarize, align,
/// emit. Stop is observed only here, between iterations, never inside a
/// model call. Emitted chunks are ordered because there is only one worker.
pub(crate) fn run_capture_loop<S, T, D>(
    source: &mut S,
    transcriber: &mut T,
    diarizer: &mut D,
    interval: Duration,
    stop: &AtomicBool,
    events: &Sender<SessionEvent>,
) -> Result<(), SessionError>
where
    S: AudioSource,
    T: Transcriber,
    D: Diarizer,
{
    while !stop.load(Ordering::Relaxed) {
        let window = source
            .next_window(interval)
            .map_err(|e| SessionError::DeviceUnavailable(e.to_string()))?;

        let words = transcriber
            .transcribe(&window)
            .map_err(|e| SessionError::Inference(e.to_string()))?;
        if words.is_empty() {
            continue;
        }

        let segments = diarizer
            .diarize(&window)
            .map_err(|e| SessionError::Inference(e.to_string()))?;

        let text = format_lines(&align(&words, &segments));
        if text.is_empty() {
            continue;
        }
        if events.send(SessionEvent::Text(text)).is_err() {
            // Presentation side is gone; nothing left to emit to.
            break;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::align::{SpeakerSegment, Word};
    use crate::audio::{AudioWindow, SAMPLE_RATE};
    use anyhow::anyhow;

    fn silent_window() -> AudioWindow {
        AudioWindow {
            samples: vec![0.0; SAMPLE_RATE as usize],
            sample_rate: SAMPLE_RATE,
        }
    }

    fn word(text: &str, start: f64, end: f64) -> Word {
        Word {
            text: text.to_string(),
            start,
            end,
        }
    }

    /// Yields windows until its script runs out, then raises the stop flag
    /// while still returning one final window, mimicking a stop request that
    /// arrives mid-iteration.
    struct ScriptedSource {
        remaining: usize,
        stop: Arc<AtomicBool>,
    }

    impl AudioSource for ScriptedSource {
        fn next_window(&mut self, _duration: Duration) -> anyhow::Result<AudioWindow> {
            self.remaining -= 1;
            if self.remaining == 0 {
                self.stop.store(true, Ordering::Relaxed);
            }
            Ok(silent_window())
        }
    }

    struct ScriptedTranscriber {
        script: Vec<Vec<Word>>,
        calls: usize,
    }

    impl Transcriber for ScriptedTranscriber {
        fn transcribe(&mut self, _window: &AudioWindow) -> anyhow::Result<Vec<Word>> {
            let words = self.script.get(self.calls).cloned().unwrap_or_default();
            self.calls += 1;
            Ok(words)
        }
    }

    struct FixedDiarizer {
        segments: Vec<SpeakerSegment>,
        calls: usize,
    }

    impl Diarizer for FixedDiarizer {
        fn diarize(&mut self, _window: &AudioWindow) -> anyhow::Result<Vec<SpeakerSegment>> {
            self.calls += 1;
            Ok(self.segments.clone())
        }
    }

    struct FailingTranscriber;

    impl Transcriber for FailingTranscriber {
        fn transcribe(&mut self, _window: &AudioWindow) -> anyhow::Result<Vec<Word>> {
            Err(anyhow!("model exploded"))
        }
    }

    fn wide_segment(speaker: &str) -> SpeakerSegment {
        SpeakerSegment {
            start: 0.0,
            end: 10.0,
            speaker: speaker.to_string(),
        }
    }

    #[test]
    fn emits_chunks_in_window_order_and_honors_stop() {
        let stop = Arc::new(AtomicBool::new(false));
        let mut source = ScriptedSource {
            remaining: 2,
            stop: stop.clone(),
        };
        let mut transcriber = ScriptedTranscriber {
            script: vec![
                vec![word("first", 0.0, 0.5)],
                vec![word("second", 0.0, 0.5)],
            ],
            calls: 0,
        };
        let mut diarizer = FixedDiarizer {
            segments: vec![wide_segment("S0")],
            calls: 0,
        };
        let (tx, rx) = unbounded();

        let result = run_capture_loop(
            &mut source,
            &mut transcriber,
            &mut diarizer,
            Duration::from_secs(1),
            &stop,
            &tx,
        );
        assert!(result.is_ok());

        // Stop was raised while window 2 was being captured; its full
        // pipeline still ran and its chunk was emitted last.
        let chunks: Vec<_> = rx.try_iter().collect();
        assert_eq!(chunks.len(), 2);
        assert!(matches!(&chunks[0], SessionEvent::Text(t) if t == "[S0]: first\n"));
        assert!(matches!(&chunks[1], SessionEvent::Text(t) if t == "[S0]: second\n"));
    }

    #[test]
    fn empty_transcription_skips_diarization_and_emits_nothing() {
        let stop = Arc::new(AtomicBool::new(false));
        let mut source = ScriptedSource {
            remaining: 3,
            stop: stop.clone(),
        };
        let mut transcriber = ScriptedTranscriber {
            script: vec![vec![], vec![], vec![]],
            calls: 0,
        };
        let mut diarizer = FixedDiarizer {
            segments: vec![wide_segment("S0")],
            calls: 0,
        };
        let (tx, rx) = unbounded();

        run_capture_loop(
            &mut source,
            &mut transcriber,
            &mut diarizer,
            Duration::from_secs(1),
            &stop,
            &tx,
        )
        .unwrap();

        assert_eq!(diarizer.calls, 0);
        assert!(rx.try_iter().next().is_none());
    }

    #[test]
    fn words_outside_all_segments_emit_nothing() {
        let stop = Arc::new(AtomicBool::new(false));
        let mut source = ScriptedSource {
            remaining: 1,
            stop: stop.clone(),
        };
        let mut transcriber = ScriptedTranscriber {
            script: vec![vec![word("late", 20.0, 21.0)]],
            calls: 0,
        };
        let mut diarizer = FixedDiarizer {
            segments: vec![wide_segment("S0")],
            calls: 0,
        };
        let (tx, rx) = unbounded();

        run_capture_loop(
            &mut source,
            &mut transcriber,
            &mut diarizer,
            Duration::from_secs(1),
            &stop,
            &tx,
        )
        .unwrap();

        assert_eq!(diarizer.calls, 1);
        assert!(rx.try_iter().next().is_none());
    }

    #[test]
    fn inference_error_is_fatal_and_classified() {
        let stop = Arc::new(AtomicBool::new(false));
        let mut source = ScriptedSource {
            remaining: 5,
            stop: stop.clone(),
        };
        let mut diarizer = FixedDiarizer {
            segments: vec![],
            calls: 0,
        };
        let (tx, rx) = unbounded();

        let result = run_capture_loop(
            &mut source,
            &mut FailingTranscriber,
            &mut diarizer,
            Duration::from_secs(1),
            &stop,
            &tx,
        );

        match result {
            Err(SessionError::Inference(msg)) => assert!(msg.contains("model exploded")),
            other => panic!("expected inference error, got {:?}", other.err()),
        }
        // One bad window kills the session; nothing was emitted first.
        assert!(rx.try_iter().next().is_none());
    }

    #[test]
    fn capture_failure_is_classified_as_device_error() {
        struct BrokenSource;
        impl AudioSource for BrokenSource {
            fn next_window(&mut self, _duration: Duration) -> anyhow::Result<AudioWindow> {
                Err(anyhow!("device vanished"))
            }
        }

        let stop = AtomicBool::new(false);
        let (tx, _rx) = unbounded();
        let result = run_capture_loop(
            &mut BrokenSource,
            &mut ScriptedTranscriber {
                script: vec![],
                calls: 0,
            },
            &mut FixedDiarizer {
                segments: vec![],
                calls: 0,
            },
            Duration::from_secs(1),
            &stop,
            &tx,
        );
        assert!(matches!(result, Err(SessionError::DeviceUnavailable(_))));
    }

    #[test]
    fn pre_raised_stop_runs_no_iteration() {
        let stop = Arc::new(AtomicBool::new(true));
        let mut source = ScriptedSource {
            remaining: 1,
            stop: stop.clone(),
        };
        let mut transcriber = ScriptedTranscriber {
            script: vec![vec![word("never", 0.0, 0.5)]],
            calls: 0,
        };
        let mut diarizer = FixedDiarizer {
            segments: vec![wide_segment("S0")],
            calls: 0,
        };
        let (tx, rx) = unbounded();

        run_capture_loop(
            &mut source,
            &mut transcriber,
            &mut diarizer,
            Duration::from_secs(1),
            &stop,
            &tx,
        )
        .unwrap();

        assert_eq!(transcriber.calls, 0);
        assert!(rx.try_iter().next().is_none());
    }

    #[test]
    fn session_start_rejects_bad_config_without_spawning() {
        let settings = Settings::default(); // no token
        assert!(matches!(
            Session::start(settings),
            Err(SessionError::Configuration(_))
        ));

        let settings = Settings {
            hf_token: "hf_abc".to_string(),
            whisper_model: "not-a-model".to_string(),
            ..Settings::default()
        };
        assert!(matches!(
            Session::start(settings),
            Err(SessionError::Configuration(_))
        ));
    }
}
