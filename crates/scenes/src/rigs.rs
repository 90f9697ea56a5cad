//! Camera rigs: input components that steer a shared [`Camera`].

use std::cell::RefCell;
use std::rc::Rc;

use glam::{Mat3, Vec3};
use lumen_camera::Camera;
use lumen_input::InputState;
use lumen_pipeline::{InputFn, Pipeline};

pub type SharedCamera = Rc<RefCell<Camera>>;

/// Which rig a demo drives its camera with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CameraKind {
    #[default]
    Orbit,
    Fps,
}

impl std::str::FromStr for CameraKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "orbit" => Ok(Self::Orbit),
            "fps" => Ok(Self::Fps),
            other => Err(format!("unknown camera `{other}` (expected orbit or fps)")),
        }
    }
}

impl std::fmt::Display for CameraKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Orbit => "orbit",
            Self::Fps => "fps",
        })
    }
}

/// Registration of one input entry, toggled without duplicates.
struct Binding {
    entry: Rc<InputFn>,
}

impl Binding {
    fn enable(&self, pipeline: &Pipeline) {
        if !pipeline.input.contains(&self.entry) {
            pipeline.input.push(self.entry.clone());
        }
    }

    fn disable(&self, pipeline: &Pipeline) {
        pipeline.input.remove(&self.entry);
    }

    fn is_enabled(&self, pipeline: &Pipeline) -> bool {
        pipeline.input.contains(&self.entry)
    }
}

/// First-person rig. Arrows or WASD move in the view plane, shift triples
/// the speed, and pointer motion turns the camera while the pointer is
/// locked.
pub struct FpsRig {
    camera: SharedCamera,
    binding: Binding,
}

impl FpsRig {
    /// World units per second.
    pub const SPEED: f32 = 10.0;
    pub const SPRINT: f32 = 3.0;

    pub fn new(camera: SharedCamera) -> Self {
        let shared = camera.clone();
        let entry: Rc<InputFn> = Rc::new(move |input: &InputState, dt: f32| {
            fps_step(&mut shared.borrow_mut(), input, dt);
        });
        Self {
            camera,
            binding: Binding { entry },
        }
    }

    pub fn camera(&self) -> &SharedCamera {
        &self.camera
    }

    pub fn enable(&self, pipeline: &Pipeline) {
        self.binding.enable(pipeline);
    }

    pub fn disable(&self, pipeline: &Pipeline) {
        self.binding.disable(pipeline);
    }

    pub fn is_enabled(&self, pipeline: &Pipeline) -> bool {
        self.binding.is_enabled(pipeline)
    }
}

fn fps_step(camera: &mut Camera, input: &InputState, dt: f32) {
    let speed = FpsRig::SPEED * dt * if input.shift { FpsRig::SPRINT } else { 1.0 };
    let axis = |pos: bool, neg: bool| f32::from(u8::from(pos)) - f32::from(u8::from(neg));
    let dx = axis(input.right, input.left) * speed;
    let dz = axis(input.up, input.down) * speed;
    camera.move_by(dx, 0.0, dz);

    if input.pointer_locked {
        camera.rotate(-input.ptr_dy, input.ptr_dx);
    }
}

/// Orbit rig. While the pointer is held, drag motion swings the eye around
/// the origin and the camera keeps looking at it.
pub struct OrbitRig {
    camera: SharedCamera,
    binding: Binding,
}

impl OrbitRig {
    pub const DISTANCE: f32 = 20.0;
    /// Radians per unit of pointer delta.
    pub const SPEED: f32 = 2.0;

    pub fn new(camera: SharedCamera) -> Self {
        camera
            .borrow_mut()
            .move_to(0.0, 0.0, Self::DISTANCE)
            .look_at(0.0, 0.0, 0.0);
        let shared = camera.clone();
        let entry: Rc<InputFn> = Rc::new(move |input: &InputState, _dt: f32| {
            orbit_step(&mut shared.borrow_mut(), input);
        });
        Self {
            camera,
            binding: Binding { entry },
        }
    }

    pub fn camera(&self) -> &SharedCamera {
        &self.camera
    }

    pub fn enable(&self, pipeline: &Pipeline) {
        self.binding.enable(pipeline);
    }

    pub fn disable(&self, pipeline: &Pipeline) {
        self.binding.disable(pipeline);
    }

    pub fn is_enabled(&self, pipeline: &Pipeline) -> bool {
        self.binding.is_enabled(pipeline)
    }
}

fn orbit_step(camera: &mut Camera, input: &InputState) {
    if !input.clicked {
        return;
    }
    let yaw = -input.ptr_dx * OrbitRig::SPEED;
    let pitch = -input.ptr_dy * OrbitRig::SPEED;
    let eye: Vec3 = Mat3::from_rotation_x(pitch) * (Mat3::from_rotation_y(yaw) * camera.eye());
    camera.move_to(eye.x, eye.y, eye.z).look_at(0.0, 0.0, 0.0);
}

/// Perspective camera used by both rigs: 45° vertical field of view,
/// near 0.1, far 500.
pub fn demo_camera(aspect: f32) -> SharedCamera {
    Rc::new(RefCell::new(Camera::perspective(
        45f32.to_radians(),
        0.1,
        500.0,
        aspect,
    )))
}

/// Either rig behind one handle.
pub enum Rig {
    Orbit(OrbitRig),
    Fps(FpsRig),
}

impl Rig {
    pub fn new(kind: CameraKind, camera: SharedCamera) -> Self {
        match kind {
            CameraKind::Orbit => Self::Orbit(OrbitRig::new(camera)),
            CameraKind::Fps => {
                camera.borrow_mut().move_to(0.0, 2.0, OrbitRig::DISTANCE);
                Self::Fps(FpsRig::new(camera))
            }
        }
    }

    pub fn kind(&self) -> CameraKind {
        match self {
            Self::Orbit(_) => CameraKind::Orbit,
            Self::Fps(_) => CameraKind::Fps,
        }
    }

    pub fn camera(&self) -> &SharedCamera {
        match self {
            Self::Orbit(rig) => rig.camera(),
            Self::Fps(rig) => rig.camera(),
        }
    }

    pub fn enable(&self, pipeline: &Pipeline) {
        match self {
            Self::Orbit(rig) => rig.enable(pipeline),
            Self::Fps(rig) => rig.enable(pipeline),
        }
    }

    pub fn disable(&self, pipeline: &Pipeline) {
        match self {
            Self::Orbit(rig) => rig.disable(pipeline),
            Self::Fps(rig) => rig.disable(pipeline),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dispatch(pipeline: &Pipeline, input: &mut InputState) {
        pipeline.run_input(input, 0.5);
    }

    #[test]
    fn fps_forward_moves_along_front() {
        let camera = demo_camera(1.0);
        let rig = FpsRig::new(camera.clone());
        let pipeline = Pipeline::new();
        rig.enable(&pipeline);

        let start = camera.borrow().eye();
        let mut input = InputState::new();
        input.up = true;
        dispatch(&pipeline, &mut input);
        let moved = camera.borrow().eye() - start;
        assert!((moved - Vec3::new(0.0, 0.0, -5.0)).length() < 1e-5, "{moved:?}");
    }

    #[test]
    fn fps_shift_triples_strafe() {
        let camera = demo_camera(1.0);
        let rig = FpsRig::new(camera.clone());
        let pipeline = Pipeline::new();
        rig.enable(&pipeline);

        let mut input = InputState::new();
        input.right = true;
        input.shift = true;
        dispatch(&pipeline, &mut input);
        assert!((camera.borrow().eye().x - 15.0).abs() < 1e-4);
    }

    #[test]
    fn fps_only_looks_while_locked() {
        let camera = demo_camera(1.0);
        let rig = FpsRig::new(camera.clone());
        let pipeline = Pipeline::new();
        rig.enable(&pipeline);

        let mut input = InputState::new();
        input.pointer_move(0.5, 0.5, 100.0, 0.0);
        dispatch(&pipeline, &mut input);
        let yaw = camera.borrow().yaw();

        input.set_pointer_locked(true);
        input.pointer_move(0.5, 0.5, 100.0, 0.0);
        dispatch(&pipeline, &mut input);
        assert!((camera.borrow().yaw() - yaw - 0.1).abs() < 1e-5);
    }

    #[test]
    fn orbit_keeps_distance_and_faces_origin() {
        let camera = demo_camera(1.0);
        let rig = OrbitRig::new(camera.clone());
        let pipeline = Pipeline::new();
        rig.enable(&pipeline);

        let mut input = InputState::new();
        input.pointer_button(true);
        input.pointer_move(0.5, 0.5, 300.0, -120.0);
        dispatch(&pipeline, &mut input);

        let cam = camera.borrow();
        assert!((cam.eye().length() - OrbitRig::DISTANCE).abs() < 1e-3);
        assert!(cam.eye().x.abs() > 1.0);
        let to_origin = (-cam.eye()).normalize();
        assert!(cam.front().dot(to_origin) > 0.9999);
    }

    #[test]
    fn orbit_ignores_motion_without_click() {
        let camera = demo_camera(1.0);
        let rig = OrbitRig::new(camera.clone());
        let pipeline = Pipeline::new();
        rig.enable(&pipeline);

        let mut input = InputState::new();
        input.pointer_move(0.5, 0.5, 300.0, 0.0);
        dispatch(&pipeline, &mut input);
        assert_eq!(camera.borrow().eye(), Vec3::new(0.0, 0.0, OrbitRig::DISTANCE));
    }

    #[test]
    fn enable_twice_registers_once() {
        let rig = Rig::new(CameraKind::Fps, demo_camera(1.0));
        let pipeline = Pipeline::new();
        rig.enable(&pipeline);
        rig.enable(&pipeline);
        assert_eq!(pipeline.input.len(), 1);
        rig.disable(&pipeline);
        assert!(pipeline.input.is_empty());
        assert_eq!(rig.kind(), CameraKind::Fps);
    }

    #[test]
    fn camera_kind_parses_case_insensitively() {
        assert_eq!("FPS".parse::<CameraKind>(), Ok(CameraKind::Fps));
        assert_eq!("orbit".parse::<CameraKind>(), Ok(CameraKind::Orbit));
        assert!("free".parse::<CameraKind>().is_err());
        assert_eq!(CameraKind::Fps.to_string(), "fps");
    }
}
