//! Conversion into the fixed vertex layout of devices without custom vertex
//! formats: position, a packed `D3DCOLOR` and one texcoord pair.

use std::mem;

use byteorder::{ByteOrder, NativeEndian};

use super::super::vertex::{Vertex, VertexReader};
use super::{Prim, Topology};

/// Bytes per converted vertex: `x, y, z: f32`, `color: u32`, `u, v: f32`.
pub const LEGACY_STRIDE: usize = 24;

/// Vertices ready for a non-indexed draw.
#[derive(Debug)]
pub struct Converted<'a> {
    pub data: &'a [u8],
    pub stride: usize,
    pub topology: Topology,
    pub count: usize,
}

/// Writes one vertex in the legacy layout.
pub fn write_legacy(out: &mut [u8], pos: [f32; 3], color: u32, uv: [f32; 2]) {
    NativeEndian::write_f32(&mut out[0..4], pos[0]);
    NativeEndian::write_f32(&mut out[4..8], pos[1]);
    NativeEndian::write_f32(&mut out[8..12], pos[2]);
    NativeEndian::write_u32(&mut out[12..16], color);
    NativeEndian::write_f32(&mut out[16..20], uv[0]);
    NativeEndian::write_f32(&mut out[20..24], uv[1]);
}

/// Lays the vertices of `prim` out in draw order inside `scratch`. Indices
/// are resolved and line loops get their first vertex appended, so the
/// result is drawn without indices as a list or strip. Programmable devices
/// keep the `Vertex` layout and unindexed input that needs no closing vertex
/// is passed through untouched.
pub fn convert<'a>(prim: &Prim<'a>, programmable: bool, scratch: &'a mut Vec<u8>) -> Converted<'a> {
    let closing = prim.topology == Topology::LineLoop;
    let topology = if closing {
        Topology::LineStrip
    } else {
        prim.topology
    };

    if programmable && prim.indices.is_none() && !closing {
        return Converted {
            data: prim.vertices,
            stride: prim.stride(),
            topology,
            count: prim.count,
        };
    }

    let count = prim.count + if closing { 1 } else { 0 };
    let stride = if programmable {
        mem::size_of::<Vertex>()
    } else {
        LEGACY_STRIDE
    };

    let needed = count * stride;
    if scratch.len() < needed {
        scratch.resize(needed * 3 / 2, 0);
    }

    let reader = VertexReader::new(prim.vertices, prim.decl);
    for (i, out) in scratch[..needed].chunks_mut(stride).enumerate() {
        let index = prim.vertex(i % prim.count);
        if programmable {
            out.copy_from_slice(reader.raw(index));
        } else {
            let v = reader.get(index);
            write_legacy(out, v.pos, v.color.to_argb_u32(), v.uv);
        }
    }

    Converted {
        data: &scratch[..needed],
        stride,
        topology,
        count,
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::math::Color;
    use crate::video::vertex::{self, Vertex};

    fn prim<'a>(data: &'a [u8], indices: Option<&'a [u32]>, topology: Topology) -> Prim<'a> {
        let count = indices.map(|v| v.len()).unwrap_or(data.len() / 36);
        Prim {
            vertices: data,
            decl: None,
            indices,
            topology,
            count,
            primitives: topology.primitive_count(count),
        }
    }

    #[test]
    fn loops_are_closed() {
        let vertices = [
            Vertex::new(0.0, 0.0, 0.0, 0.0, Color::red()),
            Vertex::new(1.0, 0.0, 1.0, 0.0, Color::green()),
            Vertex::new(1.0, 1.0, 1.0, 1.0, Color::blue()),
        ];

        let mut scratch = Vec::new();
        let p = prim(vertex::as_bytes(&vertices), None, Topology::LineLoop);
        let out = convert(&p, false, &mut scratch);

        assert_eq!(out.topology, Topology::LineStrip);
        assert_eq!(out.count, 4);
        assert_eq!(out.stride, LEGACY_STRIDE);
        assert_eq!(&out.data[..24], &out.data[72..96]);
        assert_eq!(NativeEndian::read_u32(&out.data[12..16]), 0xFFFF_0000);
        assert_eq!(NativeEndian::read_f32(&out.data[24..28]), 1.0);
        assert!(scratch.len() >= 96 * 3 / 2);
    }

    #[test]
    fn programmable_passthrough() {
        let vertices = [Vertex::new(0.0, 0.0, 0.0, 0.0, Color::white()); 3];
        let data = vertex::as_bytes(&vertices);

        let mut scratch = Vec::new();
        let p = prim(data, None, Topology::TriangleList);
        let out = convert(&p, true, &mut scratch);
        assert_eq!(out.data.as_ptr(), data.as_ptr());
        assert!(scratch.is_empty());

        let indices = [2, 0];
        let p = prim(data, Some(&indices), Topology::LineList);
        let out = convert(&p, true, &mut scratch);
        assert_eq!(out.count, 2);
        assert_eq!(out.data.len(), 72);
    }
}
