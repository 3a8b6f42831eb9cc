use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use flurry_particles::{
    Attribute, EffectConfig, Firework, ParticleEffect, ParticleSystem, Snow, SystemConfig,
};
use flurry_render::{
    DeviceCall, FrameStats, RecordingDevice, RenderError, RendererConfig, StreamingRenderer,
};
use flurry_render_wgpu::{ParticleView, WgpuParticleDevice};
use glam::Vec3;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "flurry-cli", about = "Streaming particle system driver")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum EffectKind {
    Snow,
    Firework,
}

#[derive(Subcommand)]
enum Commands {
    /// Print crate versions
    Info,
    /// Simulate and render headless against a recording device
    Simulate {
        /// Particle count (overrides the config file)
        #[arg(short, long)]
        particles: Option<usize>,
        /// Number of frames to run
        #[arg(short, long, default_value = "600")]
        frames: u32,
        /// Seconds per frame
        #[arg(long, default_value = "0.016666")]
        dt: f32,
        /// RNG seed (overrides the config file)
        #[arg(short, long)]
        seed: Option<u64>,
        /// Effect to run (overrides the config file)
        #[arg(short, long, value_enum)]
        effect: Option<EffectKind>,
        /// JSON system configuration
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Show the draw calls one frame of N alive particles produces
    Batches {
        /// Alive particles in the frame
        #[arg(short, long)]
        alive: u32,
        /// Ring buffer capacity in vertices
        #[arg(short, long, default_value = "2048")]
        capacity: u32,
        /// Vertices per segment
        #[arg(short, long, default_value = "512")]
        batch: u32,
    },
    /// Render snow offscreen through wgpu
    Gpu {
        /// Number of frames to render
        #[arg(short, long, default_value = "120")]
        frames: u32,
        /// Sprite texture (png or dds)
        #[arg(short, long)]
        texture: PathBuf,
        /// Snowflake count
        #[arg(short, long, default_value = "5000")]
        particles: usize,
        /// Render target width and height
        #[arg(long, default_value = "640")]
        width: u32,
        #[arg(long, default_value = "480")]
        height: u32,
    },
}

#[derive(Debug, Default)]
struct RunTotals {
    frames: u32,
    draw_calls: u64,
    particles_drawn: u64,
    resets: u32,
    skipped: u32,
}

impl RunTotals {
    fn record(&mut self, stats: &FrameStats) {
        self.frames += 1;
        self.draw_calls += u64::from(stats.draw_calls);
        self.particles_drawn += u64::from(stats.particles_drawn);
    }

    /// Fold one frame's result into the totals. A recoverable error skips
    /// the frame; any other error is returned.
    fn record_frame(
        &mut self,
        frame: u32,
        result: Result<FrameStats, RenderError>,
    ) -> Result<(), RenderError> {
        match result {
            Ok(stats) => {
                tracing::debug!(frame, ?stats, "frame rendered");
                self.record(&stats);
                Ok(())
            }
            Err(e) if e.is_recoverable() => {
                tracing::warn!(frame, error = %e, "frame skipped");
                self.skipped += 1;
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    fn print(&self) {
        let frames = self.frames.max(1) as f64;
        println!(
            "frames={} skipped={} draw_calls={} particles_drawn={} resets={}",
            self.frames, self.skipped, self.draw_calls, self.particles_drawn, self.resets
        );
        println!(
            "per frame: {:.1} draws, {:.1} particles",
            self.draw_calls as f64 / frames,
            self.particles_drawn as f64 / frames
        );
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match cli.command {
        Commands::Info => {
            println!("flurry-cli v{}", env!("CARGO_PKG_VERSION"));
            println!("common: {}", flurry_common::crate_info());
            println!("particles: {}", flurry_particles::crate_info());
            println!("render: {}", flurry_render::crate_info());
            println!("render-wgpu: {}", flurry_render_wgpu::crate_info());
        }
        Commands::Simulate {
            particles,
            frames,
            dt,
            seed,
            effect,
            config,
        } => {
            let mut system_config = match config {
                Some(path) => SystemConfig::load(&path)
                    .with_context(|| format!("loading {}", path.display()))?,
                None => SystemConfig::default(),
            };
            if let Some(particles) = particles {
                system_config.particle_count = particles;
            }
            if let Some(seed) = seed {
                system_config.seed = seed;
            }
            match effect {
                Some(EffectKind::Snow) if system_config.effect.snow().is_none() => {
                    system_config.effect = EffectConfig::default();
                }
                Some(EffectKind::Firework) if system_config.effect.firework().is_none() => {
                    let firework = Firework::default();
                    system_config.effect = EffectConfig::Firework {
                        origin: firework.origin(),
                        speed: firework.speed(),
                        lifetime: firework.lifetime(),
                    };
                }
                _ => {}
            }

            println!(
                "Simulating {} particles for {frames} frames (dt={dt}, seed={})",
                system_config.particle_count, system_config.seed
            );
            let SystemConfig {
                effect,
                particle_count,
                seed,
            } = system_config;
            if let Some(snow) = effect.snow() {
                simulate(
                    ParticleSystem::with_seed(snow, particle_count, seed),
                    frames,
                    dt,
                )?;
            } else if let Some(firework) = effect.firework() {
                simulate(
                    ParticleSystem::with_seed(firework, particle_count, seed),
                    frames,
                    dt,
                )?;
            }
        }
        Commands::Batches {
            alive,
            capacity,
            batch,
        } => {
            let config = RendererConfig {
                capacity,
                batch_size: batch,
                ..RendererConfig::default()
            };
            let mut device = RecordingDevice::new();
            let mut renderer = StreamingRenderer::init(&mut device, "snowflake.dds", config)?;
            device.clear_calls();

            let particles = vec![Attribute::default(); alive as usize];
            let stats = renderer.render(&mut device, &particles)?;

            println!("{alive} alive, ring {capacity} x {batch}:");
            for call in device.calls() {
                match call {
                    DeviceCall::Lock { segment, .. } => println!(
                        "  lock   [{}, {}) {:?}",
                        segment.offset,
                        segment.end(),
                        segment.mode
                    ),
                    DeviceCall::Draw { first, count, .. } => {
                        println!("  draw   first={first} count={count}")
                    }
                    _ => {}
                }
            }
            println!(
                "draw_calls={} particles_drawn={} next_offset={}",
                stats.draw_calls, stats.particles_drawn, stats.offset
            );
        }
        Commands::Gpu {
            frames,
            texture,
            particles,
            width,
            height,
        } => render_offscreen(frames, &texture, particles, width, height)?,
    }

    Ok(())
}

/// Run `system` for `frames` frames, rendering each into a recording device.
fn simulate<E: ParticleEffect>(
    mut system: ParticleSystem<E>,
    frames: u32,
    dt: f32,
) -> anyhow::Result<()> {
    let mut device = RecordingDevice::new();
    let mut renderer =
        StreamingRenderer::init(&mut device, "snowflake.dds", RendererConfig::default())?;
    let totals = run_recorded(&mut system, &mut renderer, &mut device, frames, dt)?;

    totals.print();
    println!(
        "alive={} of {} overwrite_hazards={} unscoped_draws={}",
        system.alive_count(),
        system.len(),
        device.overwrite_hazards().len(),
        device.unscoped_draws()
    );
    Ok(())
}

fn run_recorded<E: ParticleEffect>(
    system: &mut ParticleSystem<E>,
    renderer: &mut StreamingRenderer,
    device: &mut RecordingDevice,
    frames: u32,
    dt: f32,
) -> Result<RunTotals, RenderError> {
    let mut totals = RunTotals::default();
    for frame in 0..frames {
        system.update(dt);
        if system.is_dead() {
            tracing::debug!(frame, effect = system.effect().name(), "all particles dead, resetting");
            system.reset();
            totals.resets += 1;
        }
        let result = renderer.render(device, system.particles());
        totals.record_frame(frame, result)?;
        device.clear_calls();
    }
    Ok(totals)
}

fn render_offscreen(
    frames: u32,
    texture: &Path,
    particles: usize,
    width: u32,
    height: u32,
) -> anyhow::Result<()> {
    let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
        backends: wgpu::Backends::all(),
        ..Default::default()
    });
    let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
        power_preference: wgpu::PowerPreference::HighPerformance,
        compatible_surface: None,
        force_fallback_adapter: false,
    }))
    .context("no suitable GPU adapter")?;
    tracing::info!(adapter = ?adapter.get_info().name, "using adapter");

    let (device, queue) = pollster::block_on(adapter.request_device(
        &wgpu::DeviceDescriptor {
            label: Some("flurry_device"),
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default(),
            memory_hints: Default::default(),
        },
        None,
    ))?;

    let format = wgpu::TextureFormat::Rgba8UnormSrgb;
    let target = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("offscreen_target"),
        size: wgpu::Extent3d {
            width: width.max(1),
            height: height.max(1),
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        view_formats: &[],
    });

    let mut gpu = WgpuParticleDevice::new(&device, &queue, format);
    let mut renderer = StreamingRenderer::init(&mut gpu, texture, RendererConfig::default())?;
    let mut snow = ParticleSystem::with_seed(Snow::default(), particles, 123);
    let bounds = *snow.effect().bounds();
    let view = ParticleView::looking_at(
        bounds.center() - Vec3::Z * bounds.extent().y * 1.25,
        bounds.center(),
        width.max(1) as f32 / height.max(1) as f32,
    );
    let clear = wgpu::Color {
        r: 0.02,
        g: 0.02,
        b: 0.05,
        a: 1.0,
    };

    let mut totals = RunTotals::default();
    let start = std::time::Instant::now();
    for frame in 0..frames {
        snow.update(1.0 / 60.0);
        gpu.begin_frame(target.create_view(&Default::default()), &view, Some(clear));
        let result = renderer.render(&mut gpu, snow.particles());
        gpu.end_frame();
        totals.record_frame(frame, result)?;
    }
    let _ = device.poll(wgpu::Maintain::Wait);

    totals.print();
    println!(
        "submissions={} elapsed={:?}",
        gpu.submissions(),
        start.elapsed()
    );
    Ok(())
}
