//! Opaque device resource handles.
//!
//! Handles are plain `Copy` ids allocated by [`GpuContext`](crate::GpuContext)
//! from a single counter. Id 0 is never issued. A handle is owned by whoever
//! created it and is never reclaimed automatically.

macro_rules! handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub(crate) u32);

        impl $name {
            /// Raw numeric id, stable for the lifetime of the context.
            pub fn raw(self) -> u32 {
                self.0
            }

            /// Rebuild a handle from a raw id. Intended for backends and tests.
            pub fn from_raw(raw: u32) -> Self {
                Self(raw)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}#{}", stringify!($name), self.0)
            }
        }
    };
}

handle!(
    /// A device buffer (vertex, element or uniform data).
    BufferId
);
handle!(
    /// A vertex-array object: attribute layout plus element buffer binding.
    VertexArrayId
);
handle!(
    /// A 2D texture.
    TextureId
);
handle!(
    /// An offscreen framebuffer. The default surface has no id (`None`).
    FramebufferId
);
handle!(
    /// A linked (or failed-to-link) shader program.
    ProgramId
);

/// Location of a uniform inside the currently used program.
///
/// Lookups that do not resolve return [`UniformLocation::INVALID`]; setting a
/// value through the sentinel is a silent no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UniformLocation {
    pub(crate) program: Option<ProgramId>,
    pub(crate) index: i32,
}

impl UniformLocation {
    pub const INVALID: Self = Self {
        program: None,
        index: -1,
    };

    pub fn is_valid(self) -> bool {
        self.index >= 0 && self.program.is_some()
    }

    pub fn program(self) -> Option<ProgramId> {
        self.program
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinel_is_invalid() {
        assert!(!UniformLocation::INVALID.is_valid());
        assert_eq!(UniformLocation::INVALID.program(), None);
    }

    #[test]
    fn handles_display_kind_and_id() {
        assert_eq!(TextureId(3).to_string(), "TextureId#3");
        assert_eq!(BufferId::from_raw(9).raw(), 9);
    }
}
