use std::io::BufRead;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use crossbeam::channel::RecvTimeoutError;
use diascribe::{
    list_audio_devices, Session, SessionEvent, Settings, TranscriptBuffer,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[clap(author, version, about = "Live speaker-attributed transcription of system audio")]
struct Args {
    #[clap(short, long, default_value = "diascribe.toml", help = "Path to the config file")]
    config: PathBuf,

    #[clap(long, env = "HF_TOKEN", help = "Hugging Face token (overrides config)")]
    hf_token: Option<String>,

    #[clap(long, help = "Directory for the transcript written on stop", default_value = ".")]
    output_dir: PathBuf,

    #[clap(long, help = "List available audio devices and exit")]
    list_devices: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    if args.list_devices {
        println!("Available audio devices:");
        for (i, device) in list_audio_devices()?.iter().enumerate() {
            println!("  {}. {}", i + 1, device);
        }
        return Ok(());
    }

    let mut settings = if args.config.exists() {
        Settings::load(&args.config)?
    } else {
        warn!("config file {} not found, using defaults", args.config.display());
        Settings::default()
    };
    if let Some(token) = args.hf_token {
        settings.hf_token = token;
    }

    let handle = Session::start(settings)?;

    // Stop on Ctrl-C or Enter; either way the in-flight window finishes.
    let stop_requested = Arc::new(AtomicBool::new(false));
    {
        let flag = stop_requested.clone();
        ctrlc::set_handler(move || flag.store(true, Ordering::Relaxed))?;
    }
    {
        let flag = stop_requested.clone();
        thread::spawn(move || {
            let mut line = String::new();
            let _ = std::io::stdin().lock().read_line(&mut line);
            flag.store(true, Ordering::Relaxed);
        });
    }
    println!("transcribing... press Enter or Ctrl-C to stop");

    let mut transcript = TranscriptBuffer::new();
    let mut stop_sent = false;
    loop {
        if stop_requested.load(Ordering::Relaxed) && !stop_sent {
            info!("stop requested, finishing current window");
            handle.stop();
            stop_sent = true;
        }

        match handle.events().recv_timeout(Duration::from_millis(200)) {
            Ok(SessionEvent::Text(chunk)) => {
                print!("{}", chunk);
                transcript.append(&chunk);
            }
            Ok(SessionEvent::Error(message)) => {
                eprintln!("session error: {}", message);
                transcript.append(&format!("--- error ---\n{}\n", message));
                handle.stop();
                stop_sent = true;
            }
            Err(RecvTimeoutError::Timeout) => continue,
            // Worker exited and dropped its sender.
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    handle.join();

    if !transcript.is_empty() {
        let path = transcript.flush_to(&args.output_dir)?;
        info!("transcript written to {}", path.display());
    }

    Ok(())
}
