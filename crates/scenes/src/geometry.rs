use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};
use lumen_gpu::{
    BufferId, BufferTarget, BufferUsage, DrawMode, GpuContext, Mesh, VertexArrayId, VertexAttrib,
};

/// First of the four locations carrying an instance model matrix.
pub const MODEL_LOCATION: u32 = 3;
/// Per-instance colour location.
pub const COLOR_LOCATION: u32 = 7;

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct CubeVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
}

impl CubeVertex {
    pub const STRIDE: u32 = std::mem::size_of::<Self>() as u32;

    /// Position at 0, normal at 1, uv at 2.
    pub fn attribs() -> [VertexAttrib; 3] {
        [
            VertexAttrib::new(0, 3).stride(Self::STRIDE),
            VertexAttrib::new(1, 3).stride(Self::STRIDE).offset(12),
            VertexAttrib::new(2, 2).stride(Self::STRIDE).offset(24),
        ]
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct GridVertex {
    pub position: [f32; 3],
    pub color: [f32; 4],
}

impl GridVertex {
    pub const STRIDE: u32 = std::mem::size_of::<Self>() as u32;

    pub fn attribs() -> [VertexAttrib; 2] {
        [
            VertexAttrib::new(0, 3).stride(Self::STRIDE),
            VertexAttrib::new(1, 4).stride(Self::STRIDE).offset(12),
        ]
    }
}

/// Unit cube centred on the origin: four vertices per face so normals and
/// texture coordinates stay flat.
pub fn cube() -> (Vec<CubeVertex>, Vec<u16>) {
    // (normal, right, up) per face; corners are built from these.
    const FACES: [([f32; 3], [f32; 3], [f32; 3]); 6] = [
        ([0.0, 0.0, 1.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
        ([0.0, 0.0, -1.0], [-1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
        ([1.0, 0.0, 0.0], [0.0, 0.0, -1.0], [0.0, 1.0, 0.0]),
        ([-1.0, 0.0, 0.0], [0.0, 0.0, 1.0], [0.0, 1.0, 0.0]),
        ([0.0, 1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, -1.0]),
        ([0.0, -1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0]),
    ];
    const CORNERS: [(f32, f32); 4] = [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)];

    let mut vertices = Vec::with_capacity(24);
    let mut indices = Vec::with_capacity(36);
    for (normal, right, up) in FACES {
        let (n, r, u) = (Vec3::from(normal), Vec3::from(right), Vec3::from(up));
        let base = vertices.len() as u16;
        for (sx, sy) in CORNERS {
            let position = (n + r * sx + u * sy) * 0.5;
            vertices.push(CubeVertex {
                position: position.to_array(),
                normal,
                uv: [sx * 0.5 + 0.5, 0.5 - sy * 0.5],
            });
        }
        indices.extend_from_slice(&[base, base + 1, base + 2, base + 2, base + 3, base]);
    }
    (vertices, indices)
}

/// Floor grid on the XZ plane as line pairs, `2 * half_extent + 1` lines
/// each way.
pub fn grid(half_extent: i32, spacing: f32) -> Vec<GridVertex> {
    let half_extent = half_extent.max(0);
    let extent = half_extent as f32 * spacing;
    let mut verts = Vec::with_capacity((2 * half_extent as usize + 1) * 4);
    for i in -half_extent..=half_extent {
        let offset = i as f32 * spacing;
        let color = if i == 0 {
            [0.55, 0.55, 0.6, 1.0]
        } else {
            [0.3, 0.3, 0.33, 1.0]
        };
        for position in [
            [-extent, 0.0, offset],
            [extent, 0.0, offset],
            [offset, 0.0, -extent],
            [offset, 0.0, extent],
        ] {
            verts.push(GridVertex { position, color });
        }
    }
    verts
}

pub fn cube_mesh(ctx: &mut GpuContext) -> Mesh {
    let (vertices, indices) = cube();
    ctx.mesh(&vertices, &indices, &CubeVertex::attribs(), DrawMode::Triangles)
}

pub fn grid_mesh(ctx: &mut GpuContext, half_extent: i32, spacing: f32) -> Mesh {
    ctx.mesh(&grid(half_extent, spacing), &[], &GridVertex::attribs(), DrawMode::Lines)
}

/// Instance model matrices fed to a vertex array at locations 3 to 6.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelInstances {
    buffer: BufferId,
    count: usize,
}

impl ModelInstances {
    /// Upload `models` and point the instanced attributes of `vao` at them.
    /// Leaves `vao` bound.
    pub fn attach(ctx: &mut GpuContext, vao: VertexArrayId, models: &[Mat4]) -> Self {
        let buffer = ctx.create_buffer();
        ctx.set_buffer_data(
            BufferTarget::Array,
            buffer,
            &columns(models),
            BufferUsage::Dynamic,
        );
        for column in 0..4 {
            let location = MODEL_LOCATION + column;
            ctx.set_vertex_attrib(vao, VertexAttrib::new(location, 4).stride(64).offset(column * 16))
                .set_instance_divisor(vao, location, 1);
        }
        Self {
            buffer,
            count: models.len(),
        }
    }

    /// Overwrite the matrices in place. Extra matrices beyond the attached
    /// count are dropped.
    pub fn update(&self, ctx: &mut GpuContext, models: &[Mat4]) {
        let models = &models[..models.len().min(self.count)];
        ctx.set_buffer_sub_data(BufferTarget::Array, self.buffer, 0, &columns(models));
    }

    pub fn buffer(&self) -> BufferId {
        self.buffer
    }

    pub fn count(&self) -> usize {
        self.count
    }
}

/// Per-instance `vec3` colours at location 7. Leaves `vao` bound.
pub fn attach_colors(ctx: &mut GpuContext, vao: VertexArrayId, colors: &[[f32; 3]]) -> BufferId {
    let buffer = ctx.create_buffer();
    ctx.set_buffer_data(BufferTarget::Array, buffer, colors, BufferUsage::Static)
        .set_vertex_attrib(vao, VertexAttrib::new(COLOR_LOCATION, 3))
        .set_instance_divisor(vao, COLOR_LOCATION, 1);
    buffer
}

fn columns(models: &[Mat4]) -> Vec<[[f32; 4]; 4]> {
    models.iter().map(Mat4::to_cols_array_2d).collect()
}

/// `count` transforms spaced evenly on a circle of `radius` in the XZ plane,
/// each spun by `spin` radians around Y plus its own phase.
pub fn ring_models(count: usize, radius: f32, spin: f32) -> Vec<Mat4> {
    (0..count)
        .map(|i| {
            let angle = i as f32 / count.max(1) as f32 * std::f32::consts::TAU;
            let position = Vec3::new(angle.cos() * radius, 0.5, angle.sin() * radius);
            Mat4::from_translation(position)
                * Mat4::from_rotation_y(spin + angle)
                * Mat4::from_rotation_x(spin * 0.5)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumen_gpu::HeadlessDevice;

    #[test]
    fn cube_has_flat_faces() {
        let (vertices, indices) = cube();
        assert_eq!(vertices.len(), 24);
        assert_eq!(indices.len(), 36);
        for v in &vertices {
            let p = Vec3::from(v.position);
            let n = Vec3::from(v.normal);
            assert!((p.dot(n) - 0.5).abs() < 1e-6, "vertex {v:?} off its face");
            assert!(p.abs().max_element() <= 0.5 + 1e-6);
        }
        assert_eq!(CubeVertex::STRIDE, 32);
    }

    #[test]
    fn grid_emits_two_lines_per_step() {
        let verts = grid(5, 1.0);
        assert_eq!(verts.len(), 11 * 4);
        assert_eq!(GridVertex::STRIDE, 28);
        assert!(grid(-3, 1.0).len() == 4);
    }

    #[test]
    fn instances_bind_four_columns_with_divisor() {
        let mut ctx = GpuContext::new(Box::new(HeadlessDevice::new(8, 8)), 8, 8);
        let mesh = cube_mesh(&mut ctx);
        let models = ring_models(3, 2.0, 0.0);
        let instances = ModelInstances::attach(&mut ctx, mesh.vao(), &models);
        assert_eq!(instances.count(), 3);

        let dev = ctx.device_as::<HeadlessDevice>().unwrap();
        let instanced: Vec<(u32, u32, u32)> = dev
            .vertex_attribs(mesh.vao())
            .iter()
            .filter(|(_, _, divisor)| *divisor == 1)
            .map(|(a, _, d)| (a.location, a.offset, *d))
            .collect();
        assert_eq!(instanced, vec![(3, 0, 1), (4, 16, 1), (5, 32, 1), (6, 48, 1)]);
        assert_eq!(dev.buffer(instances.buffer()).unwrap().len(), 3 * 64);
    }

    #[test]
    fn update_ignores_extra_models() {
        let mut ctx = GpuContext::new(Box::new(HeadlessDevice::new(8, 8)), 8, 8);
        let mesh = cube_mesh(&mut ctx);
        let instances = ModelInstances::attach(&mut ctx, mesh.vao(), &[Mat4::IDENTITY]);
        let moved = Mat4::from_translation(Vec3::new(7.0, 0.0, 0.0));
        instances.update(&mut ctx, &[moved, moved]);

        let bytes = ctx
            .device_as::<HeadlessDevice>()
            .unwrap()
            .buffer(instances.buffer())
            .unwrap();
        assert_eq!(bytes.len(), 64);
        // translation x sits in the fourth column
        let x: f32 = bytemuck::pod_read_unaligned(&bytes[48..52]);
        assert_eq!(x, 7.0);
    }

    #[test]
    fn ring_places_models_at_radius() {
        for model in ring_models(6, 4.0, 1.3) {
            let t = model.w_axis.truncate();
            assert!((Vec3::new(t.x, 0.0, t.z).length() - 4.0).abs() < 1e-4);
        }
    }
}
