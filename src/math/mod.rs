//! Math utils, mainly re-exported from `cgmath`.

pub use cgmath::*;

mod color;
pub use self::color::Color;

/// The transform type used for projection, view and texture matrices.
pub type Transform = Matrix4<f32>;

/// Flattens a transform into column-major order, the layout both GLSL
/// uniforms and effect parameters expect.
pub fn flatten(m: &Transform) -> [f32; 16] {
    let r: &[f32; 16] = m.as_ref();
    *r
}

pub mod prelude {
    pub use super::{Color, Matrix4, SquareMatrix, Transform, Vector2, Vector3, Vector4};
}
