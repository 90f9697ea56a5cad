/// Errors raised by device construction and surface handling.
///
/// Shader failures are deliberately absent: they are reported through
/// [`Diagnostic`](crate::Diagnostic) and never abort the caller.
#[derive(Debug, thiserror::Error)]
pub enum GpuError {
    #[error("GPU device unavailable: {0}")]
    DeviceUnavailable(String),
    #[error("surface error: {0}")]
    Surface(String),
    #[error("unsupported texture format {0:?} for this backend")]
    UnsupportedFormat(crate::TextureFormat),
}

/// Errors raised while producing image data for a texture.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LoadError {
    #[error("invalid image dimensions {width}x{height} for {len} bytes")]
    InvalidDimensions { width: u32, height: u32, len: usize },
    #[error("image source failed: {0}")]
    Source(String),
    #[error("loader worker disconnected")]
    Disconnected,
}

/// Errors raised while sharing a uniform block between programs.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BlockError {
    #[error("{program} does not declare uniform block `{name}`")]
    Missing {
        program: crate::ProgramId,
        name: String,
    },
    #[error("uniform block `{name}` of {program} does not match the shared layout")]
    Incompatible {
        program: crate::ProgramId,
        name: String,
    },
}
