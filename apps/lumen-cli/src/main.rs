use std::path::PathBuf;

use anyhow::Context;
use clap::{ArgAction, Parser, Subcommand};
use lumen_frame::{FixedStep, FrameLoop, ManualHost};
use lumen_gpu::{GpuContext, HeadlessDevice, ProgramReflection};
use lumen_input::InputState;
use lumen_scenes::{CameraKind, Demo, DemoConfig, RunReport, SceneKind, shaders};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "lumen-cli", about = "Headless tooling for the lumen renderer")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print version and crate info
    Info,
    /// Render demo frames on the headless device and print counters
    Run {
        /// Number of host frames to drive
        #[arg(short, long, default_value = "120")]
        frames: usize,
        /// Host frame rate the timestamps are spaced at
        #[arg(long, default_value = "60")]
        fps: f64,
        #[arg(long, default_value = "cubes")]
        scene: SceneKind,
        #[arg(long, default_value = "orbit")]
        camera: CameraKind,
        #[arg(long, default_value_t = true, action = ArgAction::Set)]
        fxaa: bool,
        #[arg(long)]
        motion_blur: bool,
        #[arg(long, default_value = "320")]
        width: u32,
        #[arg(long, default_value = "240")]
        height: u32,
    },
    /// Feed scripted frame deltas to the fixed-step loop
    LoopSim {
        /// Milliseconds between host frames; cycled when shorter than --frames
        #[arg(short, long, value_delimiter = ',', default_value = "16.7")]
        delta_ms: Vec<f64>,
        /// Number of host frames
        #[arg(short, long, default_value = "10")]
        frames: usize,
    },
    /// Print the reflected interface of a WGSL program
    Reflect {
        /// Shader file; omit to list the built-in programs
        path: Option<PathBuf>,
    },
}

fn run_demo(config: DemoConfig, frames: usize, fps: f64) -> RunReport {
    tracing::info!(
        scene = %config.scene,
        camera = %config.camera,
        frames,
        fps,
        "starting headless run"
    );
    let device = HeadlessDevice::new(config.width, config.height);
    let mut ctx = GpuContext::new(Box::new(device), config.width, config.height);
    let mut demo = Demo::new(&mut ctx, config);
    let mut frame_loop = FrameLoop::new(FixedStep::new());
    let mut input = InputState::new();
    let mut host = ManualHost::at_fps(fps, frames);

    let report = demo.run_loop(&mut ctx, &mut frame_loop, &mut host, &mut input);
    tracing::info!(
        presented = report.presented,
        updates = report.loop_stats.updates,
        "headless run finished"
    );

    let stats = ctx.stats();
    println!(
        "scene={} camera={} size={}x{} fxaa={} motion_blur={}",
        config.scene, config.camera, config.width, config.height, config.fxaa, config.motion_blur
    );
    println!(
        "frames: presented={}, updates={}, final_tick={}",
        report.presented,
        report.loop_stats.updates,
        frame_loop.step().tick()
    );
    println!(
        "draws: issued={}, skipped={}, clears={}, presents={}",
        stats.draws, stats.skipped_draws, stats.clears, stats.presents
    );
    println!(
        "post-process: effects={}, velocity_passes={}",
        demo.pipeline().post_process.len(),
        report.velocity_passes
    );
    if let Some(device) = ctx.device_as::<HeadlessDevice>() {
        println!("headless: draw_records={}", device.draws().len());
    }
    let diagnostics = ctx.diagnostics();
    if diagnostics.is_empty() {
        tracing::debug!("no diagnostics recorded");
    } else {
        tracing::warn!(count = diagnostics.len(), "run recorded diagnostics");
    }
    println!("diagnostics: {}", diagnostics.len());
    for diagnostic in diagnostics {
        println!("  {:?} {:?}: {}", diagnostic.kind, diagnostic.program, diagnostic.message);
    }
    report
}

fn loop_sim(deltas: &[f64], frames: usize) {
    let mut step = FixedStep::new();
    let mut now = 0.0;
    let mut total = 0u64;
    tracing::debug!(frames, deltas = deltas.len(), "simulating fixed-step loop");
    println!(
        "Fixed step: {:.3} ms, cap {:.0} ms",
        step.step() * 1000.0,
        step.cap() * 1000.0
    );
    for (frame, delta) in deltas.iter().cycle().take(frames).enumerate() {
        if frame > 0 {
            now += delta;
        }
        let report = step.advance(now, |_| {}, |_| {});
        total += u64::from(report.updates);
        println!(
            "frame {frame:>3}: t={now:>8.1} ms updates={} lag={:.3} ms tick={}",
            report.updates,
            report.lag * 1000.0,
            report.tick
        );
    }
    println!("Total updates: {total}");
}

fn print_reflection(name: &str, reflection: &ProgramReflection) {
    println!(
        "{name}: vertex={} fragment={} uniform_size={}",
        reflection.vertex_entry, reflection.fragment_entry, reflection.uniform_size
    );
    for field in &reflection.uniforms {
        println!("  uniform {:<12} {:?} @ {}", field.name, field.ty, field.offset);
    }
    for texture in &reflection.textures {
        println!(
            "  texture unit {} {:<10} {:?} sampler={}",
            texture.unit, texture.name, texture.kind, texture.has_sampler
        );
    }
    for block in &reflection.blocks {
        println!("  block slot {} {:<10} size={}", block.slot, block.name, block.size);
        for field in &block.fields {
            println!("    {:<12} {:?} @ {}", field.name, field.ty, field.offset);
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match cli.command {
        Commands::Info => {
            println!("lumen-cli v{}", env!("CARGO_PKG_VERSION"));
            println!("frame: step={:.4}s", FixedStep::new().step());
            println!("scenes: {}, {}", SceneKind::Cubes, SceneKind::Textured);
            println!("cameras: {}, {}", CameraKind::Orbit, CameraKind::Fps);
            println!(
                "gpu: max texture units={}, uniform block slots={}",
                lumen_gpu::MAX_TEXTURE_UNITS,
                lumen_gpu::MAX_UNIFORM_BLOCKS
            );
        }
        Commands::Run {
            frames,
            fps,
            scene,
            camera,
            fxaa,
            motion_blur,
            width,
            height,
        } => {
            anyhow::ensure!(width > 0 && height > 0, "surface size must be non-zero");
            anyhow::ensure!(fps > 0.0, "--fps must be positive");
            let config = DemoConfig {
                width,
                height,
                scene,
                camera,
                fxaa,
                motion_blur,
                ..DemoConfig::default()
            };
            run_demo(config, frames, fps);
        }
        Commands::LoopSim { delta_ms, frames } => {
            anyhow::ensure!(
                delta_ms.iter().all(|d| *d >= 0.0),
                "frame deltas must not be negative"
            );
            loop_sim(&delta_ms, frames);
        }
        Commands::Reflect { path: Some(path) } => {
            tracing::debug!(path = %path.display(), "reflecting shader file");
            let source = std::fs::read_to_string(&path)
                .with_context(|| format!("reading {}", path.display()))?;
            let reflection = lumen_gpu::reflect::reflect(&source, &source)
                .with_context(|| format!("reflecting {}", path.display()))?;
            print_reflection(&path.display().to_string(), &reflection);
        }
        Commands::Reflect { path: None } => {
            let builtin = [
                ("cube", shaders::CUBE),
                ("grid", shaders::GRID),
                ("textured", shaders::TEXTURED),
                ("velocity", shaders::VELOCITY),
                ("passthrough", shaders::PASSTHROUGH),
                ("fxaa", shaders::FXAA),
                ("motion_blur", shaders::MOTION_BLUR),
            ];
            tracing::debug!(count = builtin.len(), "reflecting built-in programs");
            for (name, source) in builtin {
                let reflection = lumen_gpu::reflect::reflect(source, source)
                    .with_context(|| format!("reflecting built-in {name}"))?;
                print_reflection(name, &reflection);
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn headless_run_drives_the_frame_loop_and_logs() {
        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::new("info"))
            .with_writer(move || writer.clone())
            .finish();
        let config = DemoConfig {
            width: 32,
            height: 24,
            motion_blur: true,
            ..DemoConfig::default()
        };

        let report = tracing::subscriber::with_default(subscriber, || run_demo(config, 4, 60.0));
        assert_eq!(report.loop_stats.frames, 4);
        assert_eq!(report.presented, 4);
        assert_eq!(report.velocity_passes, 4);

        let log = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
        assert!(log.contains("starting headless run"), "{log}");
        assert!(log.contains("headless run finished"), "{log}");
    }

    #[test]
    fn run_arguments_parse() {
        let cli = Cli::try_parse_from(["lumen-cli", "run", "--frames", "3", "--motion-blur"]).unwrap();
        match cli.command {
            Commands::Run {
                frames,
                motion_blur,
                fxaa,
                ..
            } => assert_eq!((frames, motion_blur, fxaa), (3, true, true)),
            _ => panic!("expected the run subcommand"),
        }
    }
}
