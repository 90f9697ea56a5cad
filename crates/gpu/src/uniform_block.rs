use crate::context::GpuContext;
use crate::error::BlockError;
use crate::handle::{BufferId, ProgramId};
use crate::reflect::UniformBlockLayout;
use crate::types::{BufferTarget, BufferUsage, UniformValue};

/// One uniform buffer feeding the same block in several programs.
///
/// The block is a struct bound at `@group(2) @binding(slot) var<uniform>`;
/// every program declaring that struct at that slot reads the buffer, so a
/// value written once is seen by all of them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniformBlock {
    buffer: BufferId,
    layout: UniformBlockLayout,
}

impl UniformBlock {
    /// Allocate a zeroed buffer sized for block `name` as `program` declares
    /// it and attach it to the block's slot. Leaves the buffer bound to
    /// [`BufferTarget::Uniform`].
    pub fn new(ctx: &mut GpuContext, program: ProgramId, name: &str) -> Result<Self, BlockError> {
        let layout = ctx
            .program_reflection(program)
            .and_then(|r| r.block(name))
            .cloned()
            .ok_or_else(|| BlockError::Missing {
                program,
                name: name.to_string(),
            })?;
        let buffer = ctx.create_buffer();
        ctx.set_buffer_data(
            BufferTarget::Uniform,
            buffer,
            vec![0u8; layout.size].as_slice(),
            BufferUsage::Dynamic,
        )
        .bind_uniform_block(layout.slot, Some(buffer));
        tracing::debug!(
            block = name,
            slot = layout.slot,
            size = layout.size,
            %program,
            "uniform block created"
        );
        Ok(Self { buffer, layout })
    }

    /// Check that `program` declares the same block at the same slot with
    /// the same layout, so this buffer feeds it too.
    pub fn bind_program(&self, ctx: &GpuContext, program: ProgramId) -> Result<(), BlockError> {
        let name = &self.layout.name;
        let Some(other) = ctx.program_reflection(program).and_then(|r| r.block(name)) else {
            return Err(BlockError::Missing {
                program,
                name: name.clone(),
            });
        };
        if other.slot != self.layout.slot || !other.is_compatible(&self.layout) {
            return Err(BlockError::Incompatible {
                program,
                name: name.clone(),
            });
        }
        Ok(())
    }

    /// Attach the buffer to its slot again, e.g. after another buffer took
    /// it. Leaves the buffer bound to [`BufferTarget::Uniform`].
    pub fn bind(&self, ctx: &mut GpuContext) {
        ctx.bind_buffer(BufferTarget::Uniform, self.buffer)
            .bind_uniform_block(self.layout.slot, Some(self.buffer));
    }

    /// Write fields in declaration order, one value each.
    pub fn set(&self, ctx: &mut GpuContext, values: &[UniformValue]) {
        if values.len() != self.layout.fields.len() {
            tracing::warn!(
                block = %self.layout.name,
                expected = self.layout.fields.len(),
                got = values.len(),
                "uniform block set with a different field count"
            );
        }
        for (index, value) in values.iter().enumerate() {
            self.set_field(ctx, index, *value);
        }
    }

    /// Write a single field. Unknown indices and mistyped values are
    /// ignored. Leaves the buffer bound to [`BufferTarget::Uniform`].
    pub fn set_field(&self, ctx: &mut GpuContext, index: usize, value: impl Into<UniformValue>) {
        let value = value.into();
        let Some(field) = self.layout.fields.get(index) else {
            tracing::warn!(block = %self.layout.name, index, "uniform block field out of range");
            return;
        };
        if field.ty != value.ty() {
            tracing::warn!(
                block = %self.layout.name,
                field = %field.name,
                expected = ?field.ty,
                got = ?value.ty(),
                "uniform block type mismatch, ignored"
            );
            return;
        }
        ctx.set_buffer_sub_data(
            BufferTarget::Uniform,
            self.buffer,
            field.offset,
            value.to_bytes().as_slice(),
        );
    }

    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.layout.field(name).map(|(index, _)| index)
    }

    pub fn buffer(&self) -> BufferId {
        self.buffer
    }

    pub fn slot(&self) -> u32 {
        self.layout.slot
    }

    pub fn layout(&self) -> &UniformBlockLayout {
        &self.layout
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headless::HeadlessDevice;
    use crate::types::{DrawMode, VertexAttrib};
    use glam::{Mat4, Vec3, Vec4};

    const SETTINGS: &str = r#"
        struct Settings { color: vec3<f32>, pos: vec4<f32>, mat: mat4x4<f32> };
        @group(2) @binding(0) var<uniform> settings: Settings;
    "#;

    fn program(ctx: &mut GpuContext, offset: f32) -> ProgramId {
        let src = format!(
            "{SETTINGS}
            @vertex fn vs_main(@location(0) p: vec4<f32>) -> @builtin(position) vec4<f32> {{
                return settings.mat * (settings.pos + p + vec4<f32>({offset:.1}, 0.0, 0.0, 0.0));
            }}
            @fragment fn fs_main() -> @location(0) vec4<f32> {{
                return vec4<f32>(settings.color, 1.0);
            }}"
        );
        ctx.create_program(&src, &src)
    }

    fn ctx() -> GpuContext {
        GpuContext::new(Box::new(HeadlessDevice::new(8, 8)), 8, 8)
    }

    fn f32_at(bytes: &[u8], offset: usize) -> f32 {
        bytemuck::pod_read_unaligned(&bytes[offset..offset + 4])
    }

    #[test]
    fn two_programs_read_the_same_block() {
        let mut ctx = ctx();
        let first = program(&mut ctx, 0.0);
        let second = program(&mut ctx, 10.0);
        let block = UniformBlock::new(&mut ctx, first, "Settings").unwrap();
        assert_eq!(block.bind_program(&ctx, second), Ok(()));
        assert_eq!(ctx.bindings().uniform_block(0), Some(block.buffer()));

        block.set(
            &mut ctx,
            &[
                Vec3::new(0.25, 0.5, 0.75).into(),
                Vec4::ZERO.into(),
                Mat4::IDENTITY.into(),
            ],
        );
        let mesh = ctx.mesh(&[0.0f32; 12], &[], &[VertexAttrib::new(0, 4)], DrawMode::Triangles);
        ctx.use_program(first);
        mesh.draw(&mut ctx);
        ctx.use_program(second);
        mesh.draw(&mut ctx);

        let dev = ctx.device_as::<HeadlessDevice>().unwrap();
        let draws = dev.draws();
        assert_eq!(draws.len(), 2);
        assert_eq!(draws[0].blocks, draws[1].blocks);
        let (slot, bytes) = &draws[1].blocks[0];
        assert_eq!(*slot, 0);
        assert_eq!(bytes.len(), 96);
        assert_eq!(f32_at(bytes, 4), 0.5);
        assert_eq!(f32_at(bytes, 32), 1.0);
    }

    #[test]
    fn set_field_updates_only_that_member() {
        let mut ctx = ctx();
        let prg = program(&mut ctx, 0.0);
        let block = UniformBlock::new(&mut ctx, prg, "Settings").unwrap();
        block.set(
            &mut ctx,
            &[Vec3::ONE.into(), Vec4::splat(2.0).into(), Mat4::IDENTITY.into()],
        );
        let mat = block.field_index("mat").unwrap();
        block.set_field(&mut ctx, mat, Mat4::from_scale(Vec3::splat(3.0)));

        let dev = ctx.device_as::<HeadlessDevice>().unwrap();
        let bytes = dev.buffer(block.buffer()).unwrap();
        assert_eq!(f32_at(bytes, 0), 1.0);
        assert_eq!(f32_at(bytes, 16), 2.0);
        assert_eq!(f32_at(bytes, 32), 3.0);
        assert_eq!(ctx.bindings().uniform_buffer, Some(block.buffer()));
    }

    #[test]
    fn mistyped_field_is_ignored() {
        let mut ctx = ctx();
        let prg = program(&mut ctx, 0.0);
        let block = UniformBlock::new(&mut ctx, prg, "Settings").unwrap();
        block.set_field(&mut ctx, 0, 1.0f32);
        block.set_field(&mut ctx, 7, 1.0f32);
        let dev = ctx.device_as::<HeadlessDevice>().unwrap();
        assert!(dev.buffer(block.buffer()).unwrap().iter().all(|b| *b == 0));
    }

    #[test]
    fn program_without_the_block_is_rejected() {
        let mut ctx = ctx();
        let prg = program(&mut ctx, 0.0);
        let plain = ctx.create_program(
            "@vertex fn vs_main() -> @builtin(position) vec4<f32> { return vec4<f32>(); }",
            "@fragment fn fs_main() -> @location(0) vec4<f32> { return vec4<f32>(1.0); }",
        );
        assert!(matches!(
            UniformBlock::new(&mut ctx, plain, "Settings"),
            Err(BlockError::Missing { .. })
        ));
        let block = UniformBlock::new(&mut ctx, prg, "Settings").unwrap();
        assert_eq!(
            block.bind_program(&ctx, plain),
            Err(BlockError::Missing {
                program: plain,
                name: "Settings".into(),
            })
        );
    }

    #[test]
    fn different_layout_is_incompatible() {
        let mut ctx = ctx();
        let prg = program(&mut ctx, 0.0);
        let src = r#"
            struct Settings { color: vec4<f32> };
            @group(2) @binding(0) var<uniform> settings: Settings;
            @vertex fn vs_main() -> @builtin(position) vec4<f32> { return settings.color; }
            @fragment fn fs_main() -> @location(0) vec4<f32> { return settings.color; }
        "#;
        let other = ctx.create_program(src, src);
        let block = UniformBlock::new(&mut ctx, prg, "Settings").unwrap();
        assert!(matches!(
            block.bind_program(&ctx, other),
            Err(BlockError::Incompatible { .. })
        ));
    }

    #[test]
    fn draw_is_skipped_until_the_block_is_bound() {
        let mut ctx = ctx();
        let prg = program(&mut ctx, 0.0);
        let mesh = ctx.mesh(&[0.0f32; 12], &[], &[VertexAttrib::new(0, 4)], DrawMode::Triangles);
        ctx.use_program(prg);
        mesh.draw(&mut ctx);
        assert_eq!(ctx.stats().skipped_draws, 1);

        let block = UniformBlock::new(&mut ctx, prg, "Settings").unwrap();
        ctx.bind_uniform_block(0, None);
        block.bind(&mut ctx);
        mesh.draw(&mut ctx);
        assert_eq!(ctx.stats().draws, 1);
    }
}
