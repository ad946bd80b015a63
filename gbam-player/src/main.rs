mod renderer;

use crate::renderer::WgpuRenderer;
use anyhow::Context;
use clap::Parser;
use env_logger::Env;
use gbam_archive::{Archive, DirectoryArchive};
use gbam_core::api::{FrameSink, SampleSink, Ticker};
use gbam_core::playback::{FramePacer, PlaybackEngine};
use gbam_core::video::{VersionKey, VideoDecoder};
use gbam_core::AudioEngine;
use sdl2::audio::{AudioQueue, AudioSpecDesired};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};
use winit::dpi::LogicalSize;
use winit::event::{Event, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoop};
use winit::window::WindowBuilder;

/// Plays back a GBA movie container: a `.gbs` audio stream and a `.gbm`
/// video stream sharing one identifier in an archive directory.
#[derive(Debug, Parser)]
struct Args {
    /// Directory containing the `.gbs`/`.gbm` pair.
    #[arg(short = 'd', long)]
    archive_dir: String,
    /// Identifier shared by the audio and video containers (file stem).
    #[arg(short = 'i', long)]
    identifier: String,
    /// Which generation's XOR obfuscation constant to undo for video frames.
    #[arg(long, value_enum, default_value = "gen1")]
    version_key: VersionKeyArg,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum VersionKeyArg {
    #[value(name = "gen1")]
    Gen1,
    #[value(name = "gen3")]
    Gen3,
    #[value(name = "v130")]
    V130,
}

impl From<VersionKeyArg> for VersionKey {
    fn from(value: VersionKeyArg) -> Self {
        match value {
            VersionKeyArg::Gen1 => VersionKey::Gen1,
            VersionKeyArg::Gen3 => VersionKey::Gen3,
            VersionKeyArg::V130 => VersionKey::V130,
        }
    }
}

/// Low-water mark, in queued bytes, below which the audio thread decodes
/// and submits the next buffer (spec.md §4.3 double buffering).
const AUDIO_LOW_WATER_BYTES: u32 = 1024;

struct SdlAudioOutput {
    audio_queue: AudioQueue<i8>,
}

impl SdlAudioOutput {
    fn new(sdl: &sdl2::Sdl, sample_rate: u32, channels: u8) -> anyhow::Result<Self> {
        let audio = sdl.audio().map_err(anyhow::Error::msg)?;
        let audio_queue = audio
            .open_queue(
                None,
                &AudioSpecDesired {
                    freq: Some(sample_rate as i32),
                    channels: Some(channels),
                    samples: Some(1024),
                },
            )
            .map_err(anyhow::Error::msg)?;
        audio_queue.resume();

        Ok(Self { audio_queue })
    }
}

impl SampleSink for SdlAudioOutput {
    fn submit(&mut self, _channel: usize, buffer: &[i8]) {
        if let Err(err) = self.audio_queue.queue_audio(buffer) {
            log::error!("failed to queue audio samples: {err}");
        }
    }
}

/// Host `Ticker`: a background thread increments the shared [`FramePacer`]
/// at 60 Hz, standing in for the real device's vblank interrupt. The
/// audio-buffer-consumed side is driven from the main loop by polling the
/// SDL audio queue's backlog instead, since `gbam-player` pushes samples
/// rather than receiving a pull callback from SDL.
struct FramePacingTicker;

impl Ticker for FramePacingTicker {
    fn register_frame_pacing(&mut self, mut callback: Box<dyn FnMut() + Send>) {
        thread::spawn(move || loop {
            thread::sleep(Duration::from_micros(16_667));
            callback();
        });
    }

    fn register_buffer_consumed(&mut self, _callback: Box<dyn FnMut() + Send>) {
        // Driven by polling the SDL audio queue's backlog in the main loop
        // (see `AUDIO_LOW_WATER_BYTES`); no periodic timer is needed here.
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    let archive = DirectoryArchive::new(&args.archive_dir);
    let audio_bytes = archive
        .load(&args.identifier, "gbs")
        .with_context(|| format!("loading audio container '{}'", args.identifier))?;
    let video_bytes = archive
        .load(&args.identifier, "gbm")
        .with_context(|| format!("loading video container '{}'", args.identifier))?;

    let audio_engine = AudioEngine::init(audio_bytes).context("parsing audio container")?;
    let info = audio_engine.info();
    log::info!(
        "loaded '{}': {:?}, {} Hz, {} channel(s), ~{} minutes",
        args.identifier,
        info.mode,
        info.sample_rate,
        info.channels,
        info.total_minutes
    );

    let sdl = sdl2::init().map_err(anyhow::Error::msg)?;
    let audio_output = SdlAudioOutput::new(&sdl, info.sample_rate, info.channels as u8)?;

    let video_decoder = VideoDecoder::new(args.version_key.into());
    let playback = PlaybackEngine::new(video_decoder, video_bytes, 0);

    let event_loop = EventLoop::new()?;
    let window = WindowBuilder::new()
        .with_title(format!("GBA movie player - {}", args.identifier))
        .with_inner_size(LogicalSize::new(480, 320))
        .build(&event_loop)?;

    // SAFETY: the renderer does not outlive the window.
    let mut renderer = pollster::block_on(unsafe {
        WgpuRenderer::new(&window, (window.inner_size().width, window.inner_size().height))
    })?;

    let pacer = Arc::new(FramePacer::new());
    let mut ticker = FramePacingTicker;
    {
        let pacer = Arc::clone(&pacer);
        ticker.register_frame_pacing(Box::new(move || pacer.tick_60hz()));
    }

    let audio_engine = Arc::new(Mutex::new(audio_engine));
    let audio_output = Arc::new(Mutex::new(audio_output));
    let playback = Arc::new(Mutex::new(playback));

    audio_engine.lock().unwrap().start(&mut *audio_output.lock().unwrap());

    // Minute-boundary resync (spec.md §4.8, §9): a dedicated thread polls the
    // audio clock and nudges the video playback engine to match.
    {
        let audio_engine = Arc::clone(&audio_engine);
        let audio_output = Arc::clone(&audio_output);
        let playback = Arc::clone(&playback);
        thread::spawn(move || loop {
            thread::sleep(Duration::from_millis(20));

            let mut engine = audio_engine.lock().unwrap();
            let mut output = audio_output.lock().unwrap();
            if output.audio_queue.size() < AUDIO_LOW_WATER_BYTES {
                engine.on_buffer_consumed(&mut *output);
            }
            if let Some(minute) = engine.check_minute_sync() {
                playback.lock().unwrap().sync_to_minute(minute);
            }
        });
    }

    event_loop.set_control_flow(ControlFlow::Poll);

    event_loop.run(move |event, elwt| match event {
        Event::WindowEvent { event: WindowEvent::CloseRequested, .. } => {
            elwt.exit();
        }
        Event::WindowEvent { event: WindowEvent::Resized(size), .. } => {
            renderer.handle_resize(size.width, size.height);
        }
        Event::AboutToWait => {
            playback.lock().unwrap().run_iteration(&pacer, &mut renderer as &mut dyn FrameSink);
            elwt.set_control_flow(ControlFlow::WaitUntil(
                Instant::now() + Duration::from_millis(1),
            ));
        }
        _ => {}
    })?;

    Ok(())
}
