use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use clap::{ArgAction, Parser};
use lumen_frame::FixedStep;
use lumen_gpu::GpuContext;
use lumen_input::{InputState, Key};
use lumen_render_wgpu::WgpuDevice;
use lumen_scenes::{CameraKind, Demo, DemoConfig, SceneKind};
use tracing_subscriber::EnvFilter;
use winit::application::ApplicationHandler;
use winit::dpi::{PhysicalPosition, PhysicalSize};
use winit::event::{
    DeviceEvent, DeviceId, ElementState, KeyEvent, MouseButton, Touch, TouchPhase, WindowEvent,
};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{Key as WinitKey, KeyCode, NamedKey, PhysicalKey};
use winit::window::{CursorGrabMode, Window, WindowId};

#[derive(Parser)]
#[command(name = "lumen-desktop", about = "Interactive lumen demo window")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Initial window width in physical pixels
    #[arg(long, default_value_t = 1280)]
    width: u32,

    /// Initial window height in physical pixels
    #[arg(long, default_value_t = 720)]
    height: u32,

    /// Scene to show: cubes or textured
    #[arg(long, default_value = "cubes")]
    scene: SceneKind,

    /// Camera rig: orbit (drag to rotate) or fps (click to lock, WASD)
    #[arg(long, default_value = "orbit")]
    camera: CameraKind,

    /// Anti-alias the final image
    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    fxaa: bool,

    /// Blur along screen-space velocity
    #[arg(long)]
    motion_blur: bool,
}

/// Everything that exists only once the window and device are up.
struct Running {
    window: Arc<Window>,
    ctx: GpuContext,
    demo: Demo,
}

struct App {
    config: DemoConfig,
    running: Option<Running>,
    failure: Option<anyhow::Error>,
    input: InputState,
    step: FixedStep,
    started: Instant,
    cursor: Option<PhysicalPosition<f64>>,
    touch: Option<u64>,
    frames: u64,
}

impl App {
    fn new(config: DemoConfig) -> Self {
        Self {
            config,
            running: None,
            failure: None,
            input: InputState::new(),
            step: FixedStep::default(),
            started: Instant::now(),
            cursor: None,
            touch: None,
            frames: 0,
        }
    }

    fn start(&mut self, event_loop: &ActiveEventLoop) -> Result<Running> {
        let attrs = Window::default_attributes()
            .with_title("lumen")
            .with_inner_size(PhysicalSize::new(self.config.width, self.config.height));
        let window = Arc::new(event_loop.create_window(attrs)?);
        let size = window.inner_size();
        let (width, height) = (size.width.max(1), size.height.max(1));

        let device = WgpuDevice::new(window.clone(), width, height)?;
        tracing::info!(adapter = device.adapter_name(), "device opened");
        let mut ctx = GpuContext::new(Box::new(device), width, height);
        let demo = Demo::new(&mut ctx, self.config);
        Ok(Running { window, ctx, demo })
    }

    fn set_pointer_lock(&mut self, locked: bool) {
        let Some(running) = &self.running else {
            return;
        };
        let window = &running.window;
        if locked {
            let grabbed = window
                .set_cursor_grab(CursorGrabMode::Locked)
                .or_else(|_| window.set_cursor_grab(CursorGrabMode::Confined));
            if let Err(err) = grabbed {
                tracing::warn!(%err, "pointer lock unavailable");
                return;
            }
        } else if let Err(err) = window.set_cursor_grab(CursorGrabMode::None) {
            tracing::warn!(%err, "failed to release pointer");
        }
        window.set_cursor_visible(!locked);
        self.input.set_pointer_locked(locked);
    }

    fn handle_key(&mut self, event: &KeyEvent) {
        let pressed = event.state == ElementState::Pressed;
        if let Some(key) = map_key(&event.logical_key) {
            self.input.key(key, pressed);
            if key == Key::Escape && pressed && self.input.pointer_locked {
                self.set_pointer_lock(false);
            }
        }
        if !pressed || event.repeat {
            return;
        }
        let Some(running) = &mut self.running else {
            return;
        };
        match event.physical_key {
            PhysicalKey::Code(KeyCode::KeyF) => {
                let on = !running.demo.config().fxaa;
                running.demo.set_fxaa(on);
                tracing::info!(on, "fxaa toggled");
            }
            PhysicalKey::Code(KeyCode::KeyM) => {
                let on = !running.demo.config().motion_blur;
                running.demo.set_motion_blur(on);
                tracing::info!(on, "motion blur toggled");
            }
            PhysicalKey::Code(KeyCode::Tab) => {
                let next = match running.demo.scene().kind() {
                    SceneKind::Cubes => SceneKind::Textured,
                    SceneKind::Textured => SceneKind::Cubes,
                };
                running.demo.switch_scene(&mut running.ctx, next);
            }
            _ => {}
        }
    }

    fn handle_cursor(&mut self, position: PhysicalPosition<f64>) {
        let Some(running) = &self.running else {
            return;
        };
        let size = running.window.inner_size();
        let (x, y) = normalize(position, size);
        let (dx, dy) = match self.cursor {
            Some(last) => ((position.x - last.x) as f32, (position.y - last.y) as f32),
            None => (0.0, 0.0),
        };
        self.cursor = Some(position);
        // Locked pointers report motion through device events instead.
        if self.input.pointer_locked {
            self.input.pointer_move(x, y, 0.0, 0.0);
        } else {
            self.input.pointer_move(x, y, dx, dy);
        }
    }

    fn handle_touch(&mut self, touch: Touch) {
        let Some(running) = &self.running else {
            return;
        };
        if self.touch.is_some_and(|id| id != touch.id) {
            return;
        }
        match touch.phase {
            TouchPhase::Started | TouchPhase::Moved => {
                self.touch = Some(touch.id);
                let size = running.window.inner_size();
                self.input.touch(Some(normalize(touch.location, size)));
            }
            TouchPhase::Ended | TouchPhase::Cancelled => {
                self.touch = None;
                self.input.touch(None);
            }
        }
    }

    fn redraw(&mut self) {
        let Some(running) = &mut self.running else {
            return;
        };
        let now_ms = self.started.elapsed().as_secs_f64() * 1000.0;
        let (tick, frame) =
            running
                .demo
                .advance(&mut running.ctx, &mut self.step, now_ms, &mut self.input);

        self.frames += 1;
        if self.frames % 600 == 0 {
            let stats = running.ctx.take_stats();
            tracing::debug!(
                frames = self.frames,
                updates = tick.updates,
                draws = stats.draws,
                skipped = stats.skipped_draws,
                composite = ?frame.map(|f| f.composite),
                "frame stats"
            );
        }
        running.window.request_redraw();
    }
}

fn normalize(position: PhysicalPosition<f64>, size: PhysicalSize<u32>) -> (f32, f32) {
    (
        (position.x / f64::from(size.width.max(1))) as f32,
        (position.y / f64::from(size.height.max(1))) as f32,
    )
}

fn map_key(key: &WinitKey) -> Option<Key> {
    match key {
        WinitKey::Named(NamedKey::ArrowUp) => Some(Key::Up),
        WinitKey::Named(NamedKey::ArrowDown) => Some(Key::Down),
        WinitKey::Named(NamedKey::ArrowLeft) => Some(Key::Left),
        WinitKey::Named(NamedKey::ArrowRight) => Some(Key::Right),
        WinitKey::Named(NamedKey::Space) => Some(Key::Space),
        WinitKey::Named(NamedKey::Escape) => Some(Key::Escape),
        WinitKey::Named(NamedKey::Shift) => Some(Key::Shift),
        WinitKey::Character(text) => Key::from_name(text.as_str()),
        _ => None,
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.running.is_some() {
            return;
        }
        match self.start(event_loop) {
            Ok(running) => {
                running.window.request_redraw();
                self.running = Some(running);
            }
            Err(err) => {
                eprintln!("lumen: cannot start rendering: {err:#}");
                tracing::error!(error = %err, "startup failed");
                self.failure = Some(err);
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _window_id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => event_loop.exit(),
            WindowEvent::Resized(size) => {
                if let Some(running) = &mut self.running {
                    running.demo.resize(&mut running.ctx, size.width, size.height);
                }
            }
            WindowEvent::Focused(false) => {
                if self.input.pointer_locked {
                    self.set_pointer_lock(false);
                }
            }
            WindowEvent::KeyboardInput { event, .. } => self.handle_key(&event),
            WindowEvent::CursorMoved { position, .. } => self.handle_cursor(position),
            WindowEvent::CursorLeft { .. } => self.cursor = None,
            WindowEvent::MouseInput {
                button: MouseButton::Left,
                state,
                ..
            } => {
                let pressed = state == ElementState::Pressed;
                self.input.pointer_button(pressed);
                if pressed && self.config.camera == CameraKind::Fps && !self.input.pointer_locked {
                    self.set_pointer_lock(true);
                }
            }
            WindowEvent::Touch(touch) => self.handle_touch(touch),
            WindowEvent::RedrawRequested => self.redraw(),
            _ => {}
        }
    }

    fn device_event(&mut self, _event_loop: &ActiveEventLoop, _device_id: DeviceId, event: DeviceEvent) {
        if let DeviceEvent::MouseMotion { delta } = event {
            if self.input.pointer_locked {
                let (x, y) = (self.input.ptr_x, self.input.ptr_y);
                self.input.pointer_move(x, y, delta.0 as f32, delta.1 as f32);
            }
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(running) = &self.running {
            running.window.request_redraw();
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let config = DemoConfig {
        width: cli.width,
        height: cli.height,
        scene: cli.scene,
        camera: cli.camera,
        fxaa: cli.fxaa,
        motion_blur: cli.motion_blur,
        ..DemoConfig::default()
    };
    tracing::info!(scene = %config.scene, camera = %config.camera, "lumen-desktop starting");

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::new(config);
    event_loop.run_app(&mut app)?;

    match app.failure {
        Some(err) => Err(err),
        None => Ok(()),
    }
}
