use gl;
use gl::types::*;

use super::super::super::pixel::PixelFormat;
use super::super::super::primitives::Topology;
use super::super::super::state::{BlendFactor, BlendOp, Wrap};
use super::super::ComponentKind;

impl From<Topology> for GLenum {
    fn from(topology: Topology) -> Self {
        match topology {
            Topology::PointList => gl::POINTS,
            Topology::LineList => gl::LINES,
            Topology::LineStrip => gl::LINE_STRIP,
            Topology::LineLoop => gl::LINE_LOOP,
            Topology::TriangleList => gl::TRIANGLES,
            Topology::TriangleStrip => gl::TRIANGLE_STRIP,
            Topology::TriangleFan => gl::TRIANGLE_FAN,
        }
    }
}

impl From<BlendOp> for GLenum {
    fn from(op: BlendOp) -> Self {
        match op {
            BlendOp::Add => gl::FUNC_ADD,
            BlendOp::SrcMinusDest => gl::FUNC_SUBTRACT,
            BlendOp::DestMinusSrc => gl::FUNC_REVERSE_SUBTRACT,
        }
    }
}

impl From<BlendFactor> for GLenum {
    fn from(factor: BlendFactor) -> Self {
        match factor {
            BlendFactor::Zero => gl::ZERO,
            BlendFactor::One => gl::ONE,
            BlendFactor::Alpha => gl::SRC_ALPHA,
            BlendFactor::InverseAlpha => gl::ONE_MINUS_SRC_ALPHA,
            BlendFactor::SrcColor => gl::SRC_COLOR,
            BlendFactor::DestColor => gl::DST_COLOR,
            BlendFactor::InverseSrcColor => gl::ONE_MINUS_SRC_COLOR,
            BlendFactor::InverseDestColor => gl::ONE_MINUS_DST_COLOR,
        }
    }
}

impl From<ComponentKind> for GLenum {
    fn from(kind: ComponentKind) -> Self {
        match kind {
            ComponentKind::Float => gl::FLOAT,
            ComponentKind::HalfFloat => gl::HALF_FLOAT,
            ComponentKind::Short => gl::SHORT,
            ComponentKind::UShort => gl::UNSIGNED_SHORT,
            ComponentKind::UByte => gl::UNSIGNED_BYTE,
        }
    }
}

impl From<Wrap> for GLenum {
    fn from(wrap: Wrap) -> Self {
        match wrap {
            Wrap::Repeat => gl::REPEAT,
            Wrap::Mirror => gl::MIRRORED_REPEAT,
            Wrap::Clamp => gl::CLAMP_TO_EDGE,
        }
    }
}

pub fn wrap(v: GLint) -> Wrap {
    match v as GLenum {
        gl::REPEAT => Wrap::Repeat,
        gl::MIRRORED_REPEAT => Wrap::Mirror,
        _ => Wrap::Clamp,
    }
}

/// Internal format, format and type of a texture holding `format` pixels.
pub fn texture_format(format: PixelFormat, es: bool) -> (GLenum, GLenum, GLenum) {
    if es {
        match format {
            PixelFormat::Abgr8888 | PixelFormat::Argb8888 => {
                (gl::RGBA, gl::RGBA, gl::UNSIGNED_BYTE)
            }
            PixelFormat::Rgb888 => (gl::RGB, gl::RGB, gl::UNSIGNED_BYTE),
            PixelFormat::Rgb565 => (gl::RGB, gl::RGB, gl::UNSIGNED_SHORT_5_6_5),
            PixelFormat::SingleChannel8 => (gl::RED, gl::RED, gl::UNSIGNED_BYTE),
        }
    } else {
        match format {
            PixelFormat::Abgr8888 => (gl::RGBA8, gl::RGBA, gl::UNSIGNED_BYTE),
            PixelFormat::Argb8888 => (gl::RGBA8, gl::BGRA, gl::UNSIGNED_BYTE),
            PixelFormat::Rgb888 => (gl::RGB8, gl::RGB, gl::UNSIGNED_BYTE),
            PixelFormat::Rgb565 => (gl::RGB565, gl::RGB, gl::UNSIGNED_SHORT_5_6_5),
            PixelFormat::SingleChannel8 => (gl::R8, gl::RED, gl::UNSIGNED_BYTE),
        }
    }
}
