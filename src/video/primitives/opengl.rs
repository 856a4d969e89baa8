//! The OpenGL draw path.

use crate::errors::*;
use crate::math::{self, Matrix4, Transform};

use super::super::backends::{AttribLayout, ClientArray, GlDevice, UniformData, Viewport};
use super::super::bitmap::Bitmap;
use super::super::display::{ActiveProgram, Display};
use super::super::fbo::Binding;
use super::super::shader::{self, glsl::VarLocations};
use super::super::state::Wrap;
use super::super::vertex::{Attribute, VertexReader};
use super::{Features, Path, Prim};

/// Texture transform mapping the vertex texcoords into the root texture of
/// `texture`. Pixel texcoords are divided by the root size, normalized ones
/// are scaled down to the sub-bitmap first.
pub fn texture_matrix(texture: &Bitmap, pixel_texcoords: bool) -> Transform {
    let ((x, y), (w, h)) = texture.texture_origin_and_size();
    let (w, h) = (w as f32, h as f32);

    let (sx, sy) = if pixel_texcoords {
        (1.0 / w, 1.0 / h)
    } else {
        (texture.width() as f32 / w, texture.height() as f32 / h)
    };

    Matrix4::from_translation(math::vec3(x as f32 / w, y as f32 / h, 0.0))
        * Matrix4::from_nonuniform_scale(sx, sy, 1.0)
}

/// Everything changed for a draw, restored afterwards.
#[derive(Default)]
struct Saved {
    attribs: Vec<u32>,
    arrays: Vec<ClientArray>,
    wrap: Option<(Wrap, Wrap)>,
    texture_matrix: Option<[f32; 16]>,
    texturing: bool,
    texture_uniforms: bool,
    projview: bool,
    viewport: bool,
}

fn set(gl: &mut dyn GlDevice, location: Option<i32>, data: UniformData) -> Result<()> {
    match location {
        Some(v) => gl.set_uniform(v, &data),
        None => Ok(()),
    }
}

fn attribute_location(varlocs: &VarLocations, attribute: Attribute) -> Option<u32> {
    match attribute {
        Attribute::Position => varlocs.pos,
        Attribute::Color => varlocs.color,
        Attribute::TexCoord | Attribute::TexCoordPixel => varlocs.texcoord,
        Attribute::UserAttr(n) => varlocs.user_attr.get(n as usize).cloned().unwrap_or(None),
    }
}

fn client_array(attribute: Attribute) -> Option<ClientArray> {
    match attribute {
        Attribute::Position => Some(ClientArray::Vertex),
        Attribute::Color => Some(ClientArray::Color),
        Attribute::TexCoord | Attribute::TexCoordPixel => Some(ClientArray::TexCoord),
        Attribute::UserAttr(_) => None,
    }
}

/// Binds the framebuffer rendering into `target`. False if the device
/// can't render into it.
fn bind_target(display: &mut Display, target: &Bitmap) -> Result<bool> {
    if target.is_backbuffer() {
        if let Some((gl, fbos, _)) = display.gl_parts() {
            fbos.bind_backbuffer(gl)?;
        }

        return Ok(true);
    }

    let texture = match display.ensure_texture(target)? {
        Some(v) => v,
        None => return Ok(false),
    };

    let owner = target.storage_id();
    let binding = match display.gl_parts() {
        Some((gl, fbos, _)) => fbos.bind_target(gl, owner, texture)?,
        None => bail!("Not an OpenGL display."),
    };

    Ok(binding != Binding::Incomplete)
}

pub(super) fn draw(
    display: &mut Display,
    target: &Bitmap,
    texture: Option<&Bitmap>,
    prim: &Prim,
) -> Result<Path> {
    let features = Features::of(display);

    if !bind_target(display, target)? {
        return Ok(Path::Software);
    }

    let handle = match texture {
        Some(t) => match display.ensure_texture(t)? {
            Some(v) => Some(v),
            None => return Ok(Path::Software),
        },
        None => None,
    };

    let varlocs = if features.programmable {
        if display.active().is_none() && !shader::bind_default_shader(display) {
            bail!("No shader program could be bound.");
        }

        match display.active() {
            Some(&ActiveProgram::Glsl { ref varlocs, .. }) => Some(varlocs.clone()),
            _ => bail!("The active program is not a GLSL program."),
        }
    } else {
        None
    };

    let mut saved = Saved::default();
    let result = setup(display, target, texture, handle, prim, varlocs.as_ref(), &mut saved)
        .and_then(|_| issue(display, prim));

    revert(display, varlocs.as_ref(), &saved);
    result.map(|_| Path::Drawn)
}

fn setup(
    display: &mut Display,
    target: &Bitmap,
    texture: Option<&Bitmap>,
    handle: Option<u32>,
    prim: &Prim,
    varlocs: Option<&VarLocations>,
    saved: &mut Saved,
) -> Result<()> {
    let viewport = if target.is_backbuffer() {
        None
    } else {
        // Framebuffer rows run bottom-up while textures keep the top row of
        // the bitmap first, so the target is drawn upside down.
        let flip = Matrix4::from_nonuniform_scale(1.0, -1.0, 1.0);
        let projview = flip * display.target_projview(target);
        display.load_projview(&projview);
        saved.projview = true;

        let ((x, y), _) = target.texture_origin_and_size();
        Some(Viewport::new(x, y, target.width(), target.height()))
    };

    let blender = *display.blender();
    let pixel_texcoords = VertexReader::new(prim.vertices, prim.decl).pixel_texcoords();

    let (gl, _, decls) = match display.gl_parts() {
        Some(v) => v,
        None => bail!("Not an OpenGL display."),
    };

    if let Some(v) = viewport {
        saved.viewport = true;
        gl.set_viewport(v)?;
    }

    gl.set_blender(&blender)?;
    gl.stream_vertices(prim.vertices)?;

    let streams = decls.gl(prim.decl);
    for &(attribute, layout) in streams.iter() {
        enable(gl, varlocs, attribute, layout, saved)?;
    }

    let (texture, handle) = match (texture, handle) {
        (Some(t), Some(h)) => (t, h),
        _ => {
            if let Some(varlocs) = varlocs {
                set(gl, varlocs.use_tex, UniformData::Bool(false))?;
                set(gl, varlocs.use_tex_matrix, UniformData::Bool(false))?;
            } else {
                gl.set_texturing(false)?;
            }

            return Ok(());
        }
    };

    let matrix = math::flatten(&texture_matrix(texture, pixel_texcoords));
    gl.bind_texture(0, Some(handle))?;
    saved.wrap = Some(gl.texture_wrap()?);
    gl.set_texture_wrap(Wrap::Repeat, Wrap::Repeat)?;

    match varlocs {
        Some(varlocs) => {
            saved.texture_uniforms = true;
            set(gl, varlocs.tex_matrix, UniformData::Matrix(matrix))?;
            set(gl, varlocs.use_tex_matrix, UniformData::Bool(true))?;
            set(gl, varlocs.use_tex, UniformData::Bool(true))?;
            set(gl, varlocs.tex, UniformData::Int(0))?;
        }
        None => {
            saved.texture_matrix = Some(gl.texture_matrix()?);
            gl.load_texture_matrix(&matrix)?;
            saved.texturing = true;
            gl.set_texturing(true)?;
        }
    }

    Ok(())
}

fn enable(
    gl: &mut dyn GlDevice,
    varlocs: Option<&VarLocations>,
    attribute: Attribute,
    layout: AttribLayout,
    saved: &mut Saved,
) -> Result<()> {
    match varlocs {
        Some(varlocs) => {
            if let Some(location) = attribute_location(varlocs, attribute) {
                gl.vertex_attrib(location, Some(layout))?;
                saved.attribs.push(location);
            }
        }
        None => {
            if let Some(array) = client_array(attribute) {
                gl.client_array(array, Some(layout))?;
                saved.arrays.push(array);
            }
        }
    }

    Ok(())
}

fn issue(display: &mut Display, prim: &Prim) -> Result<()> {
    let gl = match display.gl() {
        Some(v) => v,
        None => bail!("Not an OpenGL display."),
    };

    match prim.indices {
        Some(indices) => gl.draw_elements(prim.topology, indices),
        None => gl.draw_arrays(prim.topology, 0, prim.count),
    }
}

fn revert(display: &mut Display, varlocs: Option<&VarLocations>, saved: &Saved) {
    if saved.projview {
        let projview = display.projview();
        display.load_projview(&projview);
    }

    let backbuffer = Viewport::new(0, 0, display.width(), display.height());
    let gl = match display.gl() {
        Some(v) => v,
        None => return,
    };

    let mut errors = Vec::new();
    if saved.viewport {
        errors.push(gl.set_viewport(backbuffer));
    }

    for &location in &saved.attribs {
        errors.push(gl.vertex_attrib(location, None));
    }

    for &array in &saved.arrays {
        errors.push(gl.client_array(array, None));
    }

    if let Some((u, v)) = saved.wrap {
        errors.push(gl.set_texture_wrap(u, v));
    }

    if let Some(ref matrix) = saved.texture_matrix {
        errors.push(gl.load_texture_matrix(matrix));
    }

    if saved.texturing {
        errors.push(gl.set_texturing(false));
    }

    if let (true, Some(varlocs)) = (saved.texture_uniforms, varlocs) {
        errors.push(set(gl, varlocs.use_tex, UniformData::Bool(false)));
        errors.push(set(gl, varlocs.use_tex_matrix, UniformData::Bool(false)));
    }

    for err in errors.into_iter().filter_map(|v| v.err()) {
        warn!("Failed to restore draw state: {}", err);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::math::Vector4;
    use crate::video::pixel::PixelFormat;

    #[test]
    fn sub_bitmap_texture_matrix() {
        let root = Bitmap::memory(8, 4, PixelFormat::Abgr8888);
        let sub = root.sub_bitmap(4, 2, 2, 2).unwrap();

        let m = texture_matrix(&sub, true);
        let uv = m * Vector4::new(1.0, 1.0, 0.0, 1.0);
        assert_eq!((uv.x, uv.y), (5.0 / 8.0, 3.0 / 4.0));

        let m = texture_matrix(&sub, false);
        let uv = m * Vector4::new(1.0, 1.0, 0.0, 1.0);
        assert_eq!((uv.x, uv.y), (6.0 / 8.0, 4.0 / 4.0));

        let origin = m * Vector4::new(0.0, 0.0, 0.0, 1.0);
        assert_eq!((origin.x, origin.y), (0.5, 0.5));
    }
}
