//! WGSL sources for the demo stages.
//!
//! Per-program uniforms live at `@group(0) @binding(0)`; texture unit `n` is
//! `@group(1) @binding(2n)` with its sampler at `2n + 1`. Blocks shared
//! between programs sit at `@group(2) @binding(slot)`. Instance model
//! matrices arrive as four `vec4` columns at locations 3 to 6.

/// Camera block shared by the cube and grid programs, slot 0.
macro_rules! camera_block {
    () => {
        r#"
struct Camera {
    matrix: mat4x4<f32>,
    eye: vec3<f32>,
};

@group(2) @binding(0)
var<uniform> camera: Camera;
"#
    };
}

/// Lit, per-instance coloured cubes.
pub const CUBE: &str = concat!(
    camera_block!(),
    r#"
struct Material {
    ambient: f32,
};

@group(0) @binding(0)
var<uniform> material: Material;

struct CubeInput {
    @location(0) position: vec3<f32>,
    @location(1) normal: vec3<f32>,
    @location(3) model_0: vec4<f32>,
    @location(4) model_1: vec4<f32>,
    @location(5) model_2: vec4<f32>,
    @location(6) model_3: vec4<f32>,
    @location(7) color: vec3<f32>,
};

struct CubeOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) world_position: vec3<f32>,
    @location(1) world_normal: vec3<f32>,
    @location(2) color: vec3<f32>,
};

@vertex
fn vs_main(in: CubeInput) -> CubeOutput {
    let model = mat4x4<f32>(in.model_0, in.model_1, in.model_2, in.model_3);
    let world = model * vec4<f32>(in.position, 1.0);

    var out: CubeOutput;
    out.clip_position = camera.matrix * world;
    out.world_position = world.xyz;
    out.world_normal = normalize((model * vec4<f32>(in.normal, 0.0)).xyz);
    out.color = in.color;
    return out;
}

@fragment
fn fs_main(in: CubeOutput) -> @location(0) vec4<f32> {
    let light_position = vec3<f32>(10.0, 20.0, 15.0);
    let normal = normalize(in.world_normal);
    let light_dir = normalize(light_position - in.world_position);
    let view_dir = normalize(camera.eye - in.world_position);
    let half_dir = normalize(light_dir + view_dir);

    let diffuse = max(dot(normal, light_dir), 0.0);
    let specular = pow(max(dot(normal, half_dir), 0.0), 32.0) * 0.4;
    return vec4<f32>((material.ambient + diffuse) * in.color + vec3<f32>(specular), 1.0);
}
"#
);

/// Floor grid lines with per-vertex colour.
pub const GRID: &str = concat!(
    camera_block!(),
    r#"

struct GridInput {
    @location(0) position: vec3<f32>,
    @location(1) color: vec4<f32>,
};

struct GridOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) color: vec4<f32>,
};

@vertex
fn vs_grid(in: GridInput) -> GridOutput {
    var out: GridOutput;
    out.clip_position = camera.matrix * vec4<f32>(in.position, 1.0);
    out.color = in.color;
    return out;
}

@fragment
fn fs_grid(in: GridOutput) -> @location(0) vec4<f32> {
    return in.color;
}
"#
);

/// Texture-mapped cubes sampling unit 0.
pub const TEXTURED: &str = r#"
struct Globals {
    matrix: mat4x4<f32>,
};

@group(0) @binding(0)
var<uniform> globals: Globals;

@group(1) @binding(0)
var surface: texture_2d<f32>;
@group(1) @binding(1)
var surface_sampler: sampler;

struct TexturedInput {
    @location(0) position: vec3<f32>,
    @location(2) uv: vec2<f32>,
    @location(3) model_0: vec4<f32>,
    @location(4) model_1: vec4<f32>,
    @location(5) model_2: vec4<f32>,
    @location(6) model_3: vec4<f32>,
};

struct TexturedOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) uv: vec2<f32>,
};

@vertex
fn vs_main(in: TexturedInput) -> TexturedOutput {
    let model = mat4x4<f32>(in.model_0, in.model_1, in.model_2, in.model_3);
    var out: TexturedOutput;
    out.clip_position = globals.matrix * model * vec4<f32>(in.position, 1.0);
    out.uv = in.uv;
    return out;
}

@fragment
fn fs_main(in: TexturedOutput) -> @location(0) vec4<f32> {
    return textureSample(surface, surface_sampler, in.uv);
}
"#;

/// Screen-space velocity into an `Rg16Uint` target.
///
/// NDC motion `d` is stored as `(d * 0.5 + 0.5) * 1000`, so a still pixel
/// reads 500 on both channels.
pub const VELOCITY: &str = r#"
struct Motion {
    matrix: mat4x4<f32>,
    prev_matrix: mat4x4<f32>,
};

@group(0) @binding(0)
var<uniform> motion: Motion;

struct VelocityInput {
    @location(0) position: vec3<f32>,
    @location(3) model_0: vec4<f32>,
    @location(4) model_1: vec4<f32>,
    @location(5) model_2: vec4<f32>,
    @location(6) model_3: vec4<f32>,
};

struct VelocityOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) current: vec4<f32>,
    @location(1) previous: vec4<f32>,
};

@vertex
fn vs_main(in: VelocityInput) -> VelocityOutput {
    let model = mat4x4<f32>(in.model_0, in.model_1, in.model_2, in.model_3);
    let world = model * vec4<f32>(in.position, 1.0);

    var out: VelocityOutput;
    out.current = motion.matrix * world;
    out.previous = motion.prev_matrix * world;
    out.clip_position = out.current;
    return out;
}

@fragment
fn fs_main(in: VelocityOutput) -> @location(0) vec2<u32> {
    let a = in.current.xy / in.current.w;
    let b = in.previous.xy / in.previous.w;
    let encoded = ((a - b) * 0.5 + 0.5) * 1000.0;
    return vec2<u32>(clamp(encoded, vec2<f32>(0.0), vec2<f32>(65535.0)));
}
"#;

/// Copies unit 0 to the target.
pub const PASSTHROUGH: &str = r#"
@group(1) @binding(0)
var source: texture_2d<f32>;
@group(1) @binding(1)
var source_sampler: sampler;

struct QuadOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) uv: vec2<f32>,
};

@vertex
fn vs_main(@location(0) corner: vec2<f32>) -> QuadOutput {
    var out: QuadOutput;
    out.clip_position = vec4<f32>(corner, 0.0, 1.0);
    out.uv = vec2<f32>(corner.x * 0.5 + 0.5, 0.5 - corner.y * 0.5);
    return out;
}

@fragment
fn fs_main(in: QuadOutput) -> @location(0) vec4<f32> {
    return textureSample(source, source_sampler, in.uv);
}
"#;

/// Fast approximate anti-aliasing, the variant with few dependent reads.
pub const FXAA: &str = r#"
struct Params {
    resolution: vec2<f32>,
};

@group(0) @binding(0)
var<uniform> params: Params;

@group(1) @binding(0)
var source: texture_2d<f32>;
@group(1) @binding(1)
var source_sampler: sampler;

struct QuadOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) uv: vec2<f32>,
};

@vertex
fn vs_main(@location(0) corner: vec2<f32>) -> QuadOutput {
    var out: QuadOutput;
    out.clip_position = vec4<f32>(corner, 0.0, 1.0);
    out.uv = vec2<f32>(corner.x * 0.5 + 0.5, 0.5 - corner.y * 0.5);
    return out;
}

const REDUCE_MIN: f32 = 1.0 / 128.0;
const REDUCE_MUL: f32 = 1.0 / 8.0;
const SPAN_MAX: f32 = 8.0;

fn tap(uv: vec2<f32>) -> vec4<f32> {
    return textureSampleLevel(source, source_sampler, uv, 0.0);
}

@fragment
fn fs_main(in: QuadOutput) -> @location(0) vec4<f32> {
    let inverse_vp = 1.0 / max(params.resolution, vec2<f32>(1.0));
    let uv = in.uv;

    let rgb_nw = tap(uv + vec2<f32>(-1.0, -1.0) * inverse_vp).rgb;
    let rgb_ne = tap(uv + vec2<f32>(1.0, -1.0) * inverse_vp).rgb;
    let rgb_sw = tap(uv + vec2<f32>(-1.0, 1.0) * inverse_vp).rgb;
    let rgb_se = tap(uv + vec2<f32>(1.0, 1.0) * inverse_vp).rgb;
    let center = tap(uv);

    let luma = vec3<f32>(0.299, 0.587, 0.114);
    let luma_nw = dot(rgb_nw, luma);
    let luma_ne = dot(rgb_ne, luma);
    let luma_sw = dot(rgb_sw, luma);
    let luma_se = dot(rgb_se, luma);
    let luma_m = dot(center.rgb, luma);
    let luma_min = min(luma_m, min(min(luma_nw, luma_ne), min(luma_sw, luma_se)));
    let luma_max = max(luma_m, max(max(luma_nw, luma_ne), max(luma_sw, luma_se)));

    var dir = vec2<f32>(
        -((luma_nw + luma_ne) - (luma_sw + luma_se)),
        (luma_nw + luma_sw) - (luma_ne + luma_se),
    );
    let dir_reduce = max((luma_nw + luma_ne + luma_sw + luma_se) * (0.25 * REDUCE_MUL), REDUCE_MIN);
    let rcp_dir_min = 1.0 / (min(abs(dir.x), abs(dir.y)) + dir_reduce);
    dir = clamp(dir * rcp_dir_min, vec2<f32>(-SPAN_MAX), vec2<f32>(SPAN_MAX)) * inverse_vp;

    let rgb_a = 0.5 * (tap(uv + dir * (1.0 / 3.0 - 0.5)).rgb + tap(uv + dir * (2.0 / 3.0 - 0.5)).rgb);
    let rgb_b = rgb_a * 0.5 + 0.25 * (tap(uv + dir * -0.5).rgb + tap(uv + dir * 0.5).rgb);
    let luma_b = dot(rgb_b, luma);
    if (luma_b < luma_min || luma_b > luma_max) {
        return vec4<f32>(rgb_a, center.a);
    }
    return vec4<f32>(rgb_b, center.a);
}
"#;

/// Four weighted taps stepping back along the velocity at unit 1.
pub const MOTION_BLUR: &str = r#"
@group(1) @binding(0)
var scene: texture_2d<f32>;
@group(1) @binding(1)
var scene_sampler: sampler;
@group(1) @binding(2)
var velocity: texture_2d<u32>;

struct QuadOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) uv: vec2<f32>,
};

@vertex
fn vs_main(@location(0) corner: vec2<f32>) -> QuadOutput {
    var out: QuadOutput;
    out.clip_position = vec4<f32>(corner, 0.0, 1.0);
    out.uv = vec2<f32>(corner.x * 0.5 + 0.5, 0.5 - corner.y * 0.5);
    return out;
}

@fragment
fn fs_main(in: QuadOutput) -> @location(0) vec4<f32> {
    let size = vec2<f32>(textureDimensions(velocity));
    let texel = vec2<i32>(clamp(in.uv * size, vec2<f32>(0.0), size - 1.0));
    let encoded = textureLoad(velocity, texel, 0).rg;
    let ndc = vec2<f32>(encoded) / 1000.0 * 2.0 - 1.0;
    // NDC y points up, texture v points down.
    let stride = vec2<f32>(ndc.x, -ndc.y) * 0.5;

    var color = vec4<f32>(0.0);
    var uv = in.uv;
    for (var i = 4; i > 0; i = i - 1) {
        color += textureSampleLevel(scene, scene_sampler, uv, 0.0) * f32(i) * 0.1;
        uv -= stride;
    }
    return color;
}
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use lumen_gpu::reflect::reflect;
    use lumen_gpu::{SampleKind, UniformType};

    #[test]
    fn every_shader_reflects() {
        for (name, src) in [
            ("cube", CUBE),
            ("grid", GRID),
            ("textured", TEXTURED),
            ("velocity", VELOCITY),
            ("passthrough", PASSTHROUGH),
            ("fxaa", FXAA),
            ("motion blur", MOTION_BLUR),
        ] {
            assert!(reflect(src, src).is_ok(), "{name} failed to reflect");
        }
    }

    #[test]
    fn cube_and_grid_share_the_camera_block() {
        let cube = reflect(CUBE, CUBE).unwrap();
        let grid = reflect(GRID, GRID).unwrap();
        let camera = cube.block("Camera").unwrap();
        assert_eq!(camera.slot, 0);
        assert_eq!(camera.field("eye").unwrap().1.offset, 64);
        assert_eq!(camera.size, 80);
        assert!(camera.is_compatible(grid.block("Camera").unwrap()));

        assert_eq!(cube.uniform("ambient").unwrap().1.offset, 0);
        assert_eq!(cube.uniform_size, 16);
        assert_eq!(grid.uniform_size, 0);
    }

    #[test]
    fn motion_blur_reads_velocity_as_uint_on_unit_one() {
        let r = reflect(MOTION_BLUR, MOTION_BLUR).unwrap();
        let velocity = r.texture(1).unwrap();
        assert_eq!(velocity.kind, SampleKind::Uint);
        assert!(!velocity.has_sampler);
        assert!(r.texture(0).unwrap().has_sampler);
        assert_eq!(r.uniform_size, 0);
    }

    #[test]
    fn fxaa_takes_resolution() {
        let r = reflect(FXAA, FXAA).unwrap();
        assert_eq!(r.uniform("resolution").unwrap().1.ty, UniformType::Vec2);
        assert_eq!(r.fragment_entry, "fs_main");
        let grid = reflect(GRID, GRID).unwrap();
        assert_eq!(grid.vertex_entry, "vs_grid");
    }
}
