//! The video layer: shaders, primitive drawing and the device-loss state
//! machine over OpenGL, Direct3D 9 and software displays.
//!
//! A `System` holds the process-wide caches. Every `Display` owns one device
//! and keeps the textures, framebuffers, vertex declarations and the default
//! shader it created. Draw calls go through `primitives::draw_prim`, which
//! picks the fastest path the display supports and falls back to the
//! software rasterizer otherwise.

pub mod errors;
pub mod settings;
pub mod state;
pub mod pixel;
pub mod lifecycle;
pub mod bitmap;
pub mod vertex;
pub mod shader;
pub mod primitives;
pub mod fbo;
pub mod display;
pub mod system;
pub mod backends;

pub mod prelude {
    pub use super::backends::{BackendKind, D3dDevice, GlDevice};
    pub use super::bitmap::{Bitmap, LockMode};
    pub use super::display::{Backend, Display, DisplayParams};
    pub use super::errors::{Error as VideoError, Result as VideoResult};
    pub use super::lifecycle::{CallbackId, DeviceState};
    pub use super::pixel::PixelFormat;
    pub use super::primitives::{draw_prim, draw_vertices, Topology};
    pub use super::settings::VideoSettings;
    pub use super::shader::{current_shader, use_shader, Shader, ShaderPlatform, ShaderStage};
    pub use super::state::{BlendFactor, BlendOp, Blender, RenderState};
    pub use super::system::{CapabilityTier, System};
    pub use super::vertex::{Attribute, Vertex, VertexDecl, VertexElement};
}
