//! The Direct3D draw path.
//!
//! Programmable displays draw through the passes of the active effect. Fixed
//! pipelines use a per-declaration primitives vertex shader that reads the
//! texture matrix from a constant register, unless the device is legacy: then
//! vertices are converted to `LEGACY_FVF` and texture coordinates go through
//! the texture stage transform.

use std::collections::HashMap;

use crate::errors::*;
use crate::math;

use super::super::backends::{
    D3dDevice, UniformData, Viewport, DEFAULT_FVF, LEGACY_FVF, TEX_MATRIX_REGISTER, TTFF_COUNT2,
};
use super::super::bitmap::Bitmap;
use super::super::display::{ActiveProgram, Display};
use super::super::shader::{self, names};
use super::super::state::Wrap;
use super::super::system::CapabilityTier;
use super::super::vertex::{self, VertexDecl, VertexReader};
use super::legacy;
use super::opengl::texture_matrix;
use super::{index_range, loop_closure, point_runs, Features, Path, Prim, Topology};

#[derive(Default)]
struct Saved {
    vertex_shader: Option<Option<u32>>,
    address: Option<(Wrap, Wrap)>,
    transform_flags: Option<u32>,
    texture: bool,
    render_target: bool,
    projview: bool,
    texture_params: Option<u32>,
}

/// The primitives vertex shader of `decl`, built on first use.
fn prim_shader(
    d3d: &mut dyn D3dDevice,
    cache: &mut HashMap<Option<u64>, u32>,
    decl: Option<&VertexDecl>,
) -> Result<Option<u32>> {
    let key = decl.map(|v| v.id());
    if let Some(&v) = cache.get(&key) {
        return Ok(Some(v));
    }

    let elements = match decl {
        Some(v) => v.elements(),
        None => VertexDecl::default_vertex(),
    };

    let elements = match vertex::d3d_elements(elements, &d3d.caps()) {
        Some(v) => v,
        None => return Ok(None),
    };

    let shader = d3d.create_primitives_shader(&elements)?;
    cache.insert(key, shader);
    Ok(Some(shader))
}

pub(super) fn draw(
    display: &mut Display,
    target: &Bitmap,
    texture: Option<&Bitmap>,
    prim: &Prim,
) -> Result<Path> {
    let features = Features::of(display);
    let legacy = display.capability_tier() == CapabilityTier::Legacy;

    if prim.decl.is_some() && !features.custom_declarations {
        return Ok(Path::Software);
    }

    let declaration = match prim.decl {
        Some(decl) => match display.d3d_parts() {
            Some((d3d, decls, _)) => match decls.d3d(d3d, Some(decl)) {
                Some(v) => Some(v),
                None => return Ok(Path::Software),
            },
            None => bail!("Not a Direct3D display."),
        },
        None => None,
    };

    let target_texture = if target.is_backbuffer() {
        None
    } else {
        match display.ensure_texture(target)? {
            Some(v) => Some(v),
            None => return Ok(Path::Software),
        }
    };

    let handle = match texture {
        Some(t) => match display.ensure_texture(t)? {
            Some(v) => Some(v),
            None => return Ok(Path::Software),
        },
        None => None,
    };

    let effect = if features.programmable {
        if display.active().is_none() && !shader::bind_default_shader(display) {
            bail!("No shader program could be bound.");
        }

        match display.active() {
            Some(&ActiveProgram::Hlsl { effect, .. }) => Some(effect),
            _ => bail!("The active program is not an HLSL effect."),
        }
    } else {
        None
    };

    let mut saved = Saved::default();
    let result = setup(
        display,
        target,
        target_texture,
        texture.and_then(|t| handle.map(|h| (t, h))),
        prim,
        declaration,
        effect,
        legacy,
        &mut saved,
    )
    .and_then(|_| {
        let system = display.system().clone();
        let mut scratch = system.scratch();
        let converted = if legacy {
            Some(legacy::convert(prim, features.programmable, &mut scratch))
        } else {
            None
        };

        let d3d = match display.d3d() {
            Some(v) => v,
            None => bail!("Not a Direct3D display."),
        };

        match effect {
            Some(effect) => {
                let passes = d3d.effect_begin(effect)?;
                let mut result = Ok(());
                for pass in 0..passes {
                    result = d3d
                        .effect_pass(effect, pass)
                        .and_then(|_| issue(d3d, prim, converted.as_ref()));
                    if result.is_err() {
                        break;
                    }
                }

                d3d.effect_end(effect)?;
                result
            }
            None => issue(d3d, prim, converted.as_ref()),
        }
    });

    revert(display, effect, &saved);
    result.map(|_| Path::Drawn)
}

#[allow(clippy::too_many_arguments)]
fn setup(
    display: &mut Display,
    target: &Bitmap,
    target_texture: Option<u32>,
    texture: Option<(&Bitmap, u32)>,
    prim: &Prim,
    declaration: Option<u32>,
    effect: Option<u32>,
    legacy: bool,
    saved: &mut Saved,
) -> Result<()> {
    if let Some(v) = target_texture {
        let ((x, y), _) = target.texture_origin_and_size();
        let viewport = Viewport::new(x, y, target.width(), target.height());
        saved.render_target = true;
        if let Some(d3d) = display.d3d() {
            d3d.set_render_target(Some(v))?;
            d3d.set_viewport(viewport)?;
        }
    }

    if !target.is_backbuffer() {
        let projview = display.target_projview(target);
        display.load_projview(&projview);
        saved.projview = true;
    }

    let blender = *display.blender();
    let pixel_texcoords = VertexReader::new(prim.vertices, prim.decl).pixel_texcoords();

    let (d3d, _, prim_shaders) = match display.d3d_parts() {
        Some(v) => v,
        None => bail!("Not a Direct3D display."),
    };

    d3d.set_blender(&blender)?;

    saved.vertex_shader = Some(d3d.vertex_shader()?);
    if effect.is_none() {
        if legacy {
            d3d.set_vertex_shader(None)?;
        } else {
            match prim_shader(d3d, prim_shaders, prim.decl)? {
                Some(v) => d3d.set_vertex_shader(Some(v))?,
                None => bail!("No primitives vertex shader for this declaration."),
            }
        }
    }

    match declaration {
        Some(v) => d3d.set_vertex_declaration(v)?,
        None if legacy && effect.is_none() => d3d.set_fvf(LEGACY_FVF)?,
        None => d3d.set_fvf(DEFAULT_FVF)?,
    }

    let (texture, handle) = match texture {
        Some(v) => v,
        None => {
            if let Some(effect) = effect {
                d3d.effect_set(effect, names::USE_TEX, &UniformData::Bool(false))?;
                d3d.effect_set(effect, names::USE_TEX_MATRIX, &UniformData::Bool(false))?;
            }

            saved.texture = true;
            d3d.set_texture(0, None)?;
            return Ok(());
        }
    };

    let matrix = math::flatten(&texture_matrix(texture, pixel_texcoords));

    match effect {
        Some(effect) => {
            saved.texture_params = Some(effect);
            d3d.effect_set(effect, names::TEX_MATRIX, &UniformData::Matrix(matrix))?;
            d3d.effect_set(effect, names::USE_TEX_MATRIX, &UniformData::Bool(true))?;
            d3d.effect_set(effect, names::USE_TEX, &UniformData::Bool(true))?;
            d3d.effect_set_texture(effect, names::TEX, Some(handle))?;
        }
        None if legacy => {
            saved.transform_flags = Some(d3d.texture_transform_flags(0)?);
            d3d.set_texture_transform_flags(0, TTFF_COUNT2)?;
            d3d.set_texture_transform(0, &matrix)?;
        }
        None => d3d.set_vertex_shader_constant(TEX_MATRIX_REGISTER, &matrix)?,
    }

    saved.texture = true;
    d3d.set_texture(0, Some(handle))?;
    saved.address = Some(d3d.sampler_address(0)?);
    d3d.set_sampler_address(0, Wrap::Repeat, Wrap::Repeat)?;
    Ok(())
}

/// Issues the draw calls of `prim`, or of its converted vertices.
fn issue(d3d: &mut dyn D3dDevice, prim: &Prim, converted: Option<&legacy::Converted>) -> Result<()> {
    if let Some(v) = converted {
        let primitives = v.topology.primitive_count(v.count);
        return d3d.draw_primitive_up(v.topology, primitives, v.data, v.stride);
    }

    let (data, stride) = (prim.vertices, prim.stride());
    match (prim.topology, prim.indices) {
        (Topology::LineLoop, None) => {
            d3d.draw_primitive_up(Topology::LineStrip, prim.count - 1, data, stride)?;
            if let Some(closure) = loop_closure(None, prim.count) {
                d3d.draw_indexed_primitive_up(
                    Topology::LineList,
                    0,
                    prim.count,
                    1,
                    &closure,
                    data,
                    stride,
                )?;
            }

            Ok(())
        }
        (Topology::LineLoop, Some(indices)) => {
            let (lo, hi) = index_range(indices).unwrap_or((0, 0));
            d3d.draw_indexed_primitive_up(
                Topology::LineStrip,
                lo,
                (hi - lo + 1) as usize,
                prim.count - 1,
                indices,
                data,
                stride,
            )?;

            if let Some(closure) = loop_closure(Some(indices), prim.count) {
                let (lo, hi) = index_range(&closure).unwrap_or((0, 0));
                d3d.draw_indexed_primitive_up(
                    Topology::LineList,
                    lo,
                    (hi - lo + 1) as usize,
                    1,
                    &closure,
                    data,
                    stride,
                )?;
            }

            Ok(())
        }
        (Topology::PointList, Some(indices)) => {
            for (start, len) in point_runs(indices) {
                let start = start as usize * stride;
                let run = &data[start..start + len * stride];
                d3d.draw_primitive_up(Topology::PointList, len, run, stride)?;
            }

            Ok(())
        }
        (topology, Some(indices)) => {
            let (lo, hi) = index_range(indices).unwrap_or((0, 0));
            d3d.draw_indexed_primitive_up(
                topology,
                lo,
                (hi - lo + 1) as usize,
                prim.primitives,
                indices,
                data,
                stride,
            )
        }
        (topology, None) => d3d.draw_primitive_up(topology, prim.primitives, data, stride),
    }
}

fn revert(display: &mut Display, effect: Option<u32>, saved: &Saved) {
    if saved.projview {
        let projview = display.projview();
        display.load_projview(&projview);
    }

    let backbuffer = Viewport::new(0, 0, display.width(), display.height());
    let d3d = match display.d3d() {
        Some(v) => v,
        None => return,
    };

    let mut errors = Vec::new();
    if let Some((u, v)) = saved.address {
        errors.push(d3d.set_sampler_address(0, u, v));
    }

    if let Some(flags) = saved.transform_flags {
        errors.push(d3d.set_texture_transform_flags(0, flags));
    }

    if saved.texture {
        errors.push(d3d.set_texture(0, None));
    }

    if let (Some(effect), Some(_)) = (effect, saved.texture_params) {
        for name in &[names::USE_TEX, names::USE_TEX_MATRIX] {
            errors.push(d3d.effect_set(effect, name, &UniformData::Bool(false)).map(|_| ()));
        }
    }

    if let Some(shader) = saved.vertex_shader {
        errors.push(d3d.set_vertex_shader(shader));
    }

    if saved.render_target {
        errors.push(d3d.set_render_target(None));
        errors.push(d3d.set_viewport(backbuffer));
    }

    for err in errors.into_iter().filter_map(|v| v.err()) {
        warn!("Failed to restore draw state: {}", err);
    }
}
