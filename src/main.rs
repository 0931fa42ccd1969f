//! avsync - audio/video playback timing CLI

use anyhow::{Context, Result};
use clap::Parser;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use avsync::audio::{
    AudioFormat, AudioOutput, AudioRenderer, RingBuffer, SampleFormat, VolumeLevel,
};
use avsync::config::{Args, Command, PlaybackConfig};
use avsync::media::Frame;
use avsync::render::{
    LogSubtitleSink, LogVideoSink, SubtitleRenderer, TrackRenderer, VideoRenderer,
};
use avsync::session::{PlaybackSession, SessionEvent};
use avsync::source::SyntheticSource;
use avsync::sync::{SystemClock, TrackDuration};

/// How often the output thread pulls a period from the ring buffer
const OUTPUT_PERIOD: Duration = Duration::from_millis(10);

/// Longest wait for queued audio to be played out after the end of stream
const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

fn main() -> Result<()> {
    let args = Args::parse();

    let config = load_config(args.config.as_deref())?;

    // Initialize logging
    init_logging(&args, &config)?;

    // Execute command
    match args.command.unwrap_or_default() {
        Command::Play {
            duration_ms,
            rate,
            volume,
            loops,
            no_video,
            no_subtitles,
        } => {
            let mut config = config;
            if let Some(rate) = rate {
                config.playback_rate = rate;
            }
            if let Some(volume) = volume {
                config.volume = volume;
            }
            cmd_play(config, duration_ms, loops, !no_video, !no_subtitles)
        }
        Command::Config => {
            print!("{}", PlaybackConfig::sample_config());
            Ok(())
        }
        Command::CheckConfig { path } => cmd_check_config(&path),
    }
}

fn load_config(path: Option<&Path>) -> Result<PlaybackConfig> {
    let config = match path {
        Some(path) => PlaybackConfig::load(path)?,
        None => PlaybackConfig::load_default()?,
    };
    Ok(config)
}

fn init_logging(args: &Args, config: &PlaybackConfig) -> Result<()> {
    // command line flags win over the config file
    let level = if args.quiet || args.verbose > 0 {
        args.log_level().to_string()
    } else {
        config.log_level.clone()
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);

    let log_file = args
        .log
        .clone()
        .or_else(|| Some(config.log_file.clone()).filter(|f| !f.is_empty()));

    if let Some(log_file) = log_file {
        let file = std::fs::File::create(&log_file)
            .with_context(|| format!("cannot create log file {}", log_file))?;
        subscriber.with_writer(file).init();
    } else {
        subscriber.init();
    }

    Ok(())
}

/// Validate a configuration file
fn cmd_check_config(path: &Path) -> Result<()> {
    let config = PlaybackConfig::load(path)?;
    config.validate()?;

    println!("{}: OK", path.display());
    println!("  Playback rate:   {}", config.playback_rate);
    println!("  Soft sync:       {} ms", config.soft_sync_fixing_time_ms);
    println!("  Ring buffer:     {} ms", config.ring_buffer_ms);
    println!("  Volume:          {}", config.volume);
    println!(
        "  Step on seek:    {}",
        if config.force_step_on_seek { "Yes" } else { "No" }
    );
    Ok(())
}

/// Play synthetic media through the renderers until it ends
fn cmd_play(
    config: PlaybackConfig,
    duration_ms: u64,
    loops: u32,
    with_video: bool,
    with_subtitles: bool,
) -> Result<()> {
    config.validate()?;
    println!("avsync {}\n", avsync::VERSION);

    let format = AudioFormat::new(48_000, 2, SampleFormat::Int16);
    let ring = RingBuffer::<u8>::new(format.buffer_size_for_ms(config.ring_buffer_ms));
    let (producer, consumer) = ring.split();
    let volume = Arc::new(VolumeLevel::with_volume(config.volume));

    let periods = Arc::new(AtomicU64::new(0));
    let sink_periods = Arc::clone(&periods);
    let mut output = AudioOutput::start(
        format,
        consumer,
        move |_: &[u8]| -> avsync::Result<()> {
            sink_periods.fetch_add(1, Ordering::Relaxed);
            Ok(())
        },
        OUTPUT_PERIOD,
    )?;

    let mut session = PlaybackSession::new(config, SystemClock::shared())?;

    let mut source = SyntheticSource::new(
        format,
        TrackDuration::from_millis(duration_ms as i64),
        loops,
    );

    let audio = session.spawn_renderer(AudioRenderer::new(format, producer, volume))?;
    let audio_frames = source.audio_frames();
    let audio_bytes: u64 = audio_frames
        .iter()
        .filter_map(|frame| frame.as_audio())
        .map(|payload| payload.data.len() as u64)
        .sum();
    feed(&audio, audio_frames)?;

    if with_video {
        let video = session.spawn_renderer(VideoRenderer::new(LogVideoSink::new()))?;
        feed(&video, source.video_frames())?;
    }

    if with_subtitles {
        let subtitles = session.spawn_renderer(SubtitleRenderer::new(LogSubtitleSink))?;
        feed(&subtitles, source.subtitle_frames())?;
    }

    // Setup Ctrl+C handler
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        println!("\nReceived Ctrl+C, stopping...");
        r.store(false, Ordering::SeqCst);
    }) {
        warn!("Failed to install Ctrl+C handler: {}", e);
    }

    println!("Audio format: {}", format);
    println!(
        "Playing {} loop(s) of {} ms at rate {}. Press Ctrl+C to stop.\n",
        source.loops(),
        duration_ms,
        session.playback_rate()
    );

    session.play()?;
    audio.change_renderer_time(output.latency())?;

    let mut finished = false;
    while running.load(Ordering::SeqCst) {
        if !output.is_running() {
            warn!("Audio output stopped unexpectedly");
            break;
        }

        match session.poll_event(Duration::from_millis(100))? {
            Some(SessionEvent::PositionChanged(position)) => {
                debug!("Position {}", position);
            }
            Some(SessionEvent::LoopChanged(offset)) => {
                info!("Loop {} starts at {}", offset.index + 1, offset.pos);
            }
            Some(SessionEvent::EndOfStream) => {
                info!("End of stream");
                finished = true;
                break;
            }
            Some(SessionEvent::Error { kind, description }) => {
                error!("Playback error ({:?}): {}", kind, description);
                break;
            }
            None => {}
        }
    }

    if finished {
        // the ring buffer still holds audio that has not been played
        let deadline = Instant::now() + DRAIN_TIMEOUT;
        while output.bytes_played() < audio_bytes && Instant::now() < deadline {
            std::thread::sleep(OUTPUT_PERIOD);
        }
    }

    let position = session.position();
    session.shutdown();
    output.stop();

    println!("\nStopped at {}", position);
    println!(
        "Audio: {} of {} bytes played in {} periods, {} underruns",
        output.bytes_played(),
        audio_bytes,
        periods.load(Ordering::Relaxed),
        output.underruns()
    );

    Ok(())
}

/// Queue every frame on `renderer`, followed by the end marker
fn feed(renderer: &dyn TrackRenderer, frames: Vec<Frame>) -> Result<()> {
    let count = frames.len();
    for frame in frames {
        renderer.render(frame)?;
    }
    renderer.on_final_frame_received()?;

    debug!("Queued {} {} frames", count, renderer.track_type());
    Ok(())
}
