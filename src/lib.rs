//! # What is This?
//!
//! Rastrum is the shader, primitive and device-lifecycle layer of a 2D
//! graphics library. It compiles GLSL and HLSL shaders, draws indexed and
//! non-indexed primitives with arbitrary vertex layouts, and keeps device
//! resources consistent across Direct3D device loss and context recreation.
//!
//! Devices plug in through the `GlDevice` and `D3dDevice` traits. The crate
//! ships an OpenGL implementation over the `gl` crate and in-memory headless
//! devices that record every call.

#[macro_use]
extern crate failure;
#[macro_use]
extern crate log;

pub extern crate cgmath;

pub mod errors;
#[macro_use]
pub mod utils;
pub mod math;
pub mod video;

pub mod prelude {
    pub use crate::math::prelude::*;
    pub use crate::utils::prelude::*;
    pub use crate::video::prelude::*;
}
