use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, bail};
use clap::Parser;

use glyphcast::pipeline::{self, PipelineConfig};
use glyphcast::sinks::{AnsiSink, NullSink};
use glyphcast::sources::ImageSequenceSource;

/// Renders a directory of frame images as colored character art, converting
/// each frame across a chain of cooperating workers.
#[derive(Parser, Debug)]
#[command(name = "glyphcast", version)]
struct Cli {
    /// Directory of frame images (sorted by file name)
    frames: Option<PathBuf>,

    /// Number of cooperating workers in the chain
    #[arg(long, default_value_t = num_cpus::get())]
    workers: usize,

    /// Horizontal repetitions per glyph cell
    #[arg(long, default_value_t = 1)]
    scale: u32,

    /// Nominal playback rate in frames per second
    #[arg(long, default_value_t = 24)]
    fps: u32,

    /// Headless benchmark: repeat the whole pipeline this many times and
    /// print timings instead of rendering
    #[arg(long, value_name = "REPS")]
    bench: Option<u32>,

    /// Optional `key = value` config file; its values override the flags
    /// (keys: video_path, scale_size, fps, profiler)
    #[arg(long)]
    config: Option<PathBuf>,
}

impl Cli {
    fn apply_config_file(&mut self, path: &PathBuf) -> anyhow::Result<()> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read config file {}", path.display()))?;
        for line in text.lines() {
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let (key, value) = (key.trim(), value.trim());
            match key {
                "video_path" => self.frames = Some(PathBuf::from(value)),
                "scale_size" => self.scale = value.parse().context("bad scale_size")?,
                "fps" => self.fps = value.parse().context("bad fps")?,
                "profiler" => {
                    if value == "1" {
                        self.bench.get_or_insert(10);
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_writer(std::io::stderr)
        .init();

    let mut cli = Cli::parse();
    if let Some(config) = cli.config.clone() {
        cli.apply_config_file(&config)?;
    }
    let Some(frames_dir) = cli.frames.clone() else {
        bail!("no frame directory given on the command line or in the config file");
    };

    let config = PipelineConfig {
        participants: cli.workers,
        pixel_scale: cli.scale,
    };

    match cli.bench {
        Some(reps) => {
            for rep in 0..reps {
                let source = ImageSequenceSource::open(&frames_dir, cli.fps)?;
                let start = Instant::now();
                let stats = pipeline::run(config, source, NullSink::default()).await?;
                let elapsed = start.elapsed().as_secs_f64();

                let per_frame_ms = elapsed / stats.frames_converted.max(1) as f64 * 1000.0;
                let nominal_ms = 1000.0 / stats.info.frame_rate.max(1) as f64;
                println!("run {rep}: {elapsed:.5}s total");
                println!(
                    "per frame: {per_frame_ms:.5}ms, nominal frame interval: {nominal_ms:.5}ms"
                );
            }
        }
        None => {
            let source = ImageSequenceSource::open(&frames_dir, cli.fps)?;
            let stats = pipeline::run(config, source, AnsiSink::stdout(cli.scale)).await?;
            tracing::info!(frames = stats.frames_converted, "stream finished");
        }
    }
    Ok(())
}
