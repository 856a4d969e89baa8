//! Turns vertex data and a topology into backend draw calls.
//!
//! Every draw returns the canonical primitive count of its input, whichever
//! path carried it out:
//!
//! - `opengl` binds the target framebuffer and feeds attributes either to the
//!   active program or to the fixed-function client arrays.
//! - `direct3d` drives effects, the primitives vertex shader or, on legacy
//!   devices, the fixed `LEGACY_FVF` layout produced by `legacy`.
//! - `soft` rasterizes into the CPU copy of the target. It takes over whenever
//!   the backend can't express a draw.
//!
//! Nothing touches a backend while the display's device is lost.

pub mod direct3d;
pub mod legacy;
pub mod opengl;
pub mod soft;
pub mod topology;

pub use self::topology::{index_range, loop_closure, point_runs, Topology};

use std::mem;

use super::backends::BackendKind;
use super::bitmap::Bitmap;
use super::display::Display;
use super::system::CapabilityTier;
use super::vertex::{self, Vertex, VertexDecl};

/// What a backend and capability tier can do natively. Draws needing a
/// missing feature are decomposed or handed to the software rasterizer.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Features {
    pub custom_declarations: bool,
    pub programmable: bool,
    pub native_line_loop: bool,
    pub native_indexed_points: bool,
    pub indexed_draws: bool,
}

impl Features {
    pub fn of(display: &Display) -> Features {
        let programmable = display.flags().programmable;
        match (display.backend_kind(), display.capability_tier()) {
            (BackendKind::OpenGl, _) | (BackendKind::Software, _) => Features {
                custom_declarations: true,
                programmable,
                native_line_loop: true,
                native_indexed_points: true,
                indexed_draws: true,
            },
            (BackendKind::Direct3D, CapabilityTier::Modern) => Features {
                custom_declarations: true,
                programmable,
                native_line_loop: false,
                native_indexed_points: false,
                indexed_draws: true,
            },
            (BackendKind::Direct3D, CapabilityTier::Legacy) => Features {
                custom_declarations: false,
                programmable,
                native_line_loop: false,
                native_indexed_points: false,
                indexed_draws: false,
            },
        }
    }

    /// The operations this feature set lacks.
    pub fn unsupported(&self) -> Vec<&'static str> {
        let mut out = Vec::new();
        if !self.custom_declarations {
            out.push("custom vertex declarations");
        }

        if !self.programmable {
            out.push("shaders");
        }

        if !self.native_line_loop {
            out.push("line loops");
        }

        if !self.native_indexed_points {
            out.push("indexed points");
        }

        if !self.indexed_draws {
            out.push("indexed draws");
        }

        out
    }
}

/// One validated draw.
#[derive(Debug, Copy, Clone)]
pub struct Prim<'a> {
    pub vertices: &'a [u8],
    pub decl: Option<&'a VertexDecl>,
    pub indices: Option<&'a [u32]>,
    pub topology: Topology,
    /// Vertices referenced, in draw order.
    pub count: usize,
    pub primitives: usize,
}

impl<'a> Prim<'a> {
    #[inline]
    pub fn stride(&self) -> usize {
        match self.decl {
            Some(v) => v.stride(),
            None => mem::size_of::<Vertex>(),
        }
    }

    /// The index of the `i`-th vertex in draw order.
    #[inline]
    pub fn vertex(&self, i: usize) -> usize {
        match self.indices {
            Some(v) => v[i] as usize,
            None => i,
        }
    }
}

/// How a backend path ended.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Path {
    Drawn,
    /// The backend can't express this draw.
    Software,
}

fn use_software(display: &Display, target: &Bitmap, texture: Option<&Bitmap>) -> bool {
    if display.backend_kind() == BackendKind::Software || target.is_memory() || target.is_locked() {
        return true;
    }

    match texture {
        Some(t) => t.is_memory() || !display.owns(t),
        None => false,
    }
}

/// Draws `vertices`, laid out as `decl` or as `Vertex` without one, onto
/// `target`. Returns the number of primitives drawn, 0 if nothing was.
pub fn draw_prim(
    display: &mut Display,
    target: &Bitmap,
    texture: Option<&Bitmap>,
    vertices: &[u8],
    decl: Option<&VertexDecl>,
    indices: Option<&[u32]>,
    topology: Topology,
) -> usize {
    if display.is_lost() {
        return 0;
    }

    if !target.is_memory() && !display.owns(target) {
        warn!("Target bitmap belongs to another display.");
        return 0;
    }

    let stride = decl.map(|v| v.stride()).unwrap_or_else(|| mem::size_of::<Vertex>());
    let available = vertices.len() / stride;
    let count = indices.map(|v| v.len()).unwrap_or(available);
    let primitives = topology.primitive_count(count);
    if primitives == 0 {
        return 0;
    }

    if let Some(indices) = indices {
        match index_range(indices) {
            Some((_, hi)) if (hi as usize) < available => {}
            _ => {
                warn!("Index out of range of {} vertices.", available);
                return 0;
            }
        }
    }

    let prim = Prim {
        vertices: &vertices[..available * stride],
        decl,
        indices,
        topology,
        count,
        primitives,
    };

    if use_software(display, target, texture) {
        return soft::draw(display, target, texture, &prim);
    }

    let result = match display.backend_kind() {
        BackendKind::OpenGl => opengl::draw(display, target, texture, &prim),
        BackendKind::Direct3D => direct3d::draw(display, target, texture, &prim),
        BackendKind::Software => Ok(Path::Software),
    };

    match result {
        Ok(Path::Drawn) => primitives,
        Ok(Path::Software) => {
            debug!("Drawing {:?} in software.", topology);
            soft::draw(display, target, texture, &prim)
        }
        Err(err) => {
            warn!("Failed to draw {:?}: {}", topology, err);
            0
        }
    }
}

/// Draws default vertices.
pub fn draw_vertices(
    display: &mut Display,
    target: &Bitmap,
    texture: Option<&Bitmap>,
    vertices: &[Vertex],
    indices: Option<&[u32]>,
    topology: Topology,
) -> usize {
    draw_prim(
        display,
        target,
        texture,
        vertex::as_bytes(vertices),
        None,
        indices,
        topology,
    )
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::video::backends::headless::HeadlessD3d;
    use crate::video::display::{Backend, DisplayParams};
    use crate::video::settings::VideoSettings;
    use crate::video::system::System;

    #[test]
    fn legacy_features() {
        let system = System::new(VideoSettings::default()).unwrap();
        let d3d = HeadlessD3d::new(5).with_pixel_shader((1, 1));
        let display =
            Display::new(&system, Backend::Direct3D(Box::new(d3d)), DisplayParams::default())
                .unwrap();

        let features = Features::of(&display);
        assert!(!features.custom_declarations);
        assert!(features.unsupported().contains(&"line loops"));
        display.destroy();
    }
}
