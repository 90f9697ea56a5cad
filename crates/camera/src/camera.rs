use std::f32::consts::FRAC_PI_2;

use glam::{Mat4, Vec3};

/// Pitch limit that keeps the front vector away from the up axis.
pub const MAX_PITCH: f32 = FRAC_PI_2 - 0.01;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Projection {
    Perspective {
        fov: f32,
        aspect: f32,
        near: f32,
        far: f32,
    },
    Orthographic {
        left: f32,
        right: f32,
        bottom: f32,
        top: f32,
        near: f32,
        far: f32,
    },
}

impl Projection {
    pub fn matrix(&self) -> Mat4 {
        match *self {
            Self::Perspective {
                fov,
                aspect,
                near,
                far,
            } => Mat4::perspective_rh(fov, aspect, near, far),
            Self::Orthographic {
                left,
                right,
                bottom,
                top,
                near,
                far,
            } => Mat4::orthographic_rh(left, right, bottom, top, near, far),
        }
    }
}

/// Yaw/pitch camera. Mutators mark it dirty; [`Camera::recalculate`]
/// refreshes the view and combined matrices.
#[derive(Debug, Clone)]
pub struct Camera {
    position: Vec3,
    yaw: f32,
    pitch: f32,
    front: Vec3,
    up: Vec3,
    projection: Projection,
    projection_matrix: Mat4,
    view: Mat4,
    matrix: Mat4,
    dirty: bool,
}

impl Camera {
    fn with_projection(projection: Projection) -> Self {
        let projection_matrix = projection.matrix();
        Self {
            position: Vec3::ZERO,
            yaw: -FRAC_PI_2,
            pitch: 0.0,
            front: Vec3::NEG_Z,
            up: Vec3::Y,
            projection,
            projection_matrix,
            view: Mat4::IDENTITY,
            matrix: projection_matrix,
            dirty: true,
        }
    }

    /// `fov` is the vertical field of view in radians.
    pub fn perspective(fov: f32, near: f32, far: f32, aspect: f32) -> Self {
        Self::with_projection(Projection::Perspective {
            fov,
            aspect,
            near,
            far,
        })
    }

    pub fn orthographic(left: f32, right: f32, bottom: f32, top: f32, near: f32, far: f32) -> Self {
        Self::with_projection(Projection::Orthographic {
            left,
            right,
            bottom,
            top,
            near,
            far,
        })
    }

    pub fn with_position(mut self, position: Vec3) -> Self {
        self.position = position;
        self.dirty = true;
        self
    }

    /// Move relative to the current orientation: `dz` along front, `dy`
    /// along world up, `dx` along the right vector.
    pub fn move_by(&mut self, dx: f32, dy: f32, dz: f32) -> &mut Self {
        if dz != 0.0 {
            self.position += self.front * dz;
        }
        if dy != 0.0 {
            self.position += self.up * dy;
        }
        if dx != 0.0 {
            let side = self.front.cross(self.up).normalize_or_zero();
            self.position += side * dx;
        }
        self.dirty = true;
        self
    }

    /// Accumulate pitch and yaw (radians) and rebuild the front vector.
    pub fn rotate(&mut self, delta_pitch: f32, delta_yaw: f32) -> &mut Self {
        self.pitch = (self.pitch + delta_pitch).clamp(-MAX_PITCH, MAX_PITCH);
        self.yaw += delta_yaw;
        self.front = Vec3::new(
            self.yaw.cos() * self.pitch.cos(),
            self.pitch.sin(),
            self.yaw.sin() * self.pitch.cos(),
        )
        .normalize();
        self.dirty = true;
        self
    }

    pub fn move_to(&mut self, x: f32, y: f32, z: f32) -> &mut Self {
        self.position = Vec3::new(x, y, z);
        self.dirty = true;
        self
    }

    /// Point the camera at a world position. Yaw and pitch are left as they
    /// were, so the next [`rotate`](Self::rotate) returns to that orientation.
    pub fn look_at(&mut self, x: f32, y: f32, z: f32) -> &mut Self {
        if let Some(front) = (Vec3::new(x, y, z) - self.position).try_normalize() {
            self.front = front;
        }
        self.dirty = true;
        self
    }

    /// Rebuild a perspective projection for a new surface aspect.
    /// Orthographic cameras ignore it.
    pub fn set_aspect(&mut self, aspect: f32) -> &mut Self {
        if let Projection::Perspective { aspect: current, .. } = &mut self.projection {
            *current = aspect;
            self.projection_matrix = self.projection.matrix();
            self.dirty = true;
        }
        self
    }

    pub fn recalculate(&mut self) -> &mut Self {
        self.view = Mat4::look_at_rh(self.position, self.position + self.front, self.up);
        self.matrix = self.projection_matrix * self.view;
        self.dirty = false;
        tracing::trace!(eye = ?self.position, front = ?self.front, "camera recalculated");
        self
    }

    pub fn eye(&self) -> Vec3 {
        self.position
    }

    pub fn front(&self) -> Vec3 {
        self.front
    }

    pub fn yaw(&self) -> f32 {
        self.yaw
    }

    pub fn pitch(&self) -> f32 {
        self.pitch
    }

    /// Projection × view, valid as of the last [`recalculate`](Self::recalculate).
    pub fn matrix(&self) -> Mat4 {
        self.matrix
    }

    pub fn view_matrix(&self) -> Mat4 {
        self.view
    }

    pub fn projection_matrix(&self) -> Mat4 {
        self.projection_matrix
    }

    pub fn projection(&self) -> Projection {
        self.projection
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }
}
