use gl;
use gl::types::*;
use std::cmp;
use std::ffi;

use crate::errors::*;

use super::super::GlFeatures;

/// Describes the OpenGL context profile.
#[derive(Debug, Copy, Clone)]
pub enum Profile {
    /// The context uses only future-compatible functions and definitions.
    Core,
    /// The context includes all immediate mode functions and definitions.
    Compatibility,
}

/// Describes a version.
///
/// A version can only be compared to another version if they belong to the same API.
/// For example, both `Version::GL(3, 0) >= Version::ES(3, 0)` and `Version::ES(3, 0) >=
/// Version::GL(3, 0)` return `false`.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Version {
    /// Regular OpenGL.
    GL(u8, u8),
    /// OpenGL embedded system.
    ES(u8, u8),
}

impl PartialOrd for Version {
    #[inline]
    fn partial_cmp(&self, other: &Version) -> Option<cmp::Ordering> {
        let (es1, major1, minor1) = match *self {
            Version::GL(major, minor) => (false, major, minor),
            Version::ES(major, minor) => (true, major, minor),
        };

        let (es2, major2, minor2) = match *other {
            Version::GL(major, minor) => (false, major, minor),
            Version::ES(major, minor) => (true, major, minor),
        };

        if es1 != es2 {
            None
        } else {
            match major1.cmp(&major2) {
                cmp::Ordering::Equal => Some(minor1.cmp(&minor2)),
                v => Some(v),
            }
        }
    }
}

impl Version {
    /// Parses a `GL_VERSION` string such as `4.5.0 NVIDIA 390.87` or
    /// `OpenGL ES 3.0 Mesa 18.0.5`.
    pub fn from_str(desc: &str) -> Result<Version> {
        let (es, desc) = if desc.starts_with("OpenGL ES ") {
            (true, &desc[10..])
        } else if desc.starts_with("OpenGL ES-") {
            (true, &desc[13..])
        } else {
            (false, desc)
        };

        let desc = desc
            .split(' ')
            .next()
            .ok_or_else(|| format_err!("[GL] String is unformaled."))?;

        let mut iter = desc.split('.');
        let mut component = || -> Result<u8> {
            iter.next()
                .and_then(|v| v.parse().ok())
                .ok_or_else(|| format_err!("[GL] Failed to parse version {}.", desc))
        };

        let major = component()?;
        let minor = component()?;

        if es {
            Ok(Version::ES(major, minor))
        } else {
            Ok(Version::GL(major, minor))
        }
    }

    /// Obtains the OpenGL version of the current context using the loaded functions.
    ///
    /// # Unsafe
    ///
    /// You must ensure that the functions belong to the current context, otherwise you will get
    /// an undefined behavior.
    pub unsafe fn parse() -> Result<Version> {
        Version::from_str(&parse_str(gl::VERSION)?)
    }
}

unsafe fn parse_str(id: GLenum) -> Result<String> {
    let s = gl::GetString(id);
    if s.is_null() {
        bail!("[GL] String of {} is null.", id);
    }

    String::from_utf8(ffi::CStr::from_ptr(s as *const _).to_bytes().to_vec())
        .map_err(|_| format_err!("[GL] String of {} is unformaled.", id))
}

macro_rules! extensions {
    ($($string:expr => $field:ident,)+) => {
/// Contains data about the list of extensions.
        #[derive(Debug, Clone, Copy)]
        pub struct Extensions {
            $(
                pub $field: bool,
            )+
        }

/// Returns the list of extensions supported by the backend.
///
/// *Safety*: the OpenGL context corresponding to `gl` must be current in the thread.
        impl Extensions {
            pub unsafe fn parse(version: Version) -> Result<Extensions> {
                let strings: Vec<String> = if version >= Version::GL(3, 0) || version >= Version::ES(3, 0) {
                    let mut num_extensions = 0;
                    gl::GetIntegerv(gl::NUM_EXTENSIONS, &mut num_extensions);
                    let mut strings = Vec::with_capacity(num_extensions as usize);
                    for i in 0..num_extensions {
                        let ext = gl::GetStringi(gl::EXTENSIONS, i as GLuint);
                        if !ext.is_null() {
                            let ext = ffi::CStr::from_ptr(ext as *const _);
                            strings.push(ext.to_string_lossy().into_owned());
                        }
                    }

                    strings
                } else {
                    parse_str(gl::EXTENSIONS)?.split(' ').map(|e| e.to_owned()).collect()
                };

                let mut extensions = Extensions {
                    $(
                        $field: false,
                    )+
                };

                for extension in strings {
                    match &extension[..] {
                        $(
                            $string => extensions.$field = true,
                        )+
                        _ => ()
                    }
                }

                Ok(extensions)
            }
        }
    }
}

extensions! {
    "GL_ARB_shader_objects" => gl_arb_shader_objects,
    "GL_ARB_vertex_shader" => gl_arb_vertex_shader,
    "GL_ARB_fragment_shader" => gl_arb_fragment_shader,
    "GL_ARB_vertex_buffer_object" => gl_arb_vertex_buffer_object,
    "GL_ARB_framebuffer_object" => gl_arb_framebuffer_object,
    "GL_EXT_framebuffer_object" => gl_ext_framebuffer_object,
    "GL_ARB_vertex_array_object" => gl_arb_vertex_array_object,
    "GL_APPLE_vertex_array_object" => gl_apple_vertex_array_object,
    "GL_OES_vertex_array_object" => gl_oes_vertex_array_object,
    "GL_ARB_half_float_vertex" => gl_arb_half_float_vertex,
    "GL_OES_vertex_half_float" => gl_oes_vertex_half_float,
}

/// Represents the capabilities of the context.
///
/// Contrary to the state, these values never change.
#[derive(Debug)]
pub struct Capabilities {
    /// Returns a version or release number. Vendor-specific information may follow the version
    /// number.
    pub version: Version,

    /// The company responsible for this GL implementation.
    pub vendor: String,

    /// The list of OpenGL extensions support by this implementation.
    pub extensions: Extensions,

    /// The name of the renderer. This name is typically specific to a particular
    /// configuration of a hardware platform.
    pub renderer: String,

    /// The OpenGL context profile if available.
    ///
    /// The context profile is available from OpenGL 3.2 onwards. `None` if not supported.
    pub profile: Option<Profile>,

    /// Maximum number of textures that can be bound to a program.
    ///
    /// `glActiveTexture` must be between `GL_TEXTURE0` and `GL_TEXTURE0` + this value - 1.
    pub max_combined_texture_image_units: u32,
}

impl Capabilities {
    pub unsafe fn parse() -> Result<Capabilities> {
        let version = Version::parse()?;
        let extensions = Extensions::parse(version)?;

        Ok(Capabilities {
            version,
            extensions,
            vendor: parse_str(gl::VENDOR)?,
            renderer: parse_str(gl::RENDERER)?,
            profile: Capabilities::parse_profile(version),
            max_combined_texture_image_units: Capabilities::parse_texture_image_units(),
        })
    }

    /// Shader objects, either core or through the ARB extensions.
    pub fn programmable(&self) -> bool {
        self.version >= Version::GL(2, 0)
            || self.version >= Version::ES(2, 0)
            || (self.extensions.gl_arb_shader_objects
                && self.extensions.gl_arb_vertex_shader
                && self.extensions.gl_arb_fragment_shader)
    }

    pub fn framebuffer_objects(&self) -> bool {
        self.version >= Version::GL(3, 0)
            || self.version >= Version::ES(2, 0)
            || self.extensions.gl_arb_framebuffer_object
            || self.extensions.gl_ext_framebuffer_object
    }

    pub fn vertex_array_objects(&self) -> bool {
        self.version >= Version::GL(3, 0)
            || self.version >= Version::ES(3, 0)
            || self.extensions.gl_arb_vertex_array_object
            || self.extensions.gl_apple_vertex_array_object
            || self.extensions.gl_oes_vertex_array_object
    }

    pub fn features(&self) -> GlFeatures {
        GlFeatures {
            programmable: self.programmable(),
            framebuffer_objects: self.framebuffer_objects(),
            es: match self.version {
                Version::ES(_, _) => true,
                Version::GL(_, _) => false,
            },
            max_texture_units: self.max_combined_texture_image_units,
        }
    }

    #[inline]
    unsafe fn parse_profile(version: Version) -> Option<Profile> {
        if version >= Version::GL(3, 2) {
            let mut val = 0;
            gl::GetIntegerv(gl::CONTEXT_PROFILE_MASK, &mut val);
            let val = val as GLenum;
            if (val & gl::CONTEXT_COMPATIBILITY_PROFILE_BIT) != 0 {
                Some(Profile::Compatibility)
            } else if (val & gl::CONTEXT_CORE_PROFILE_BIT) != 0 {
                Some(Profile::Core)
            } else {
                None
            }
        } else {
            None
        }
    }

    #[inline]
    unsafe fn parse_texture_image_units() -> u32 {
        let mut val = 2;
        gl::GetIntegerv(gl::MAX_COMBINED_TEXTURE_IMAGE_UNITS, &mut val);
        val.max(1) as u32
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn version_strings() {
        assert_eq!(Version::from_str("4.5.0 NVIDIA 390.87").unwrap(), Version::GL(4, 5));
        assert_eq!(Version::from_str("OpenGL ES 3.0 Mesa 18.0.5").unwrap(), Version::ES(3, 0));
        assert!(Version::from_str("garbage").is_err());
        assert!(Version::GL(3, 3) >= Version::GL(3, 0));
        assert!(!(Version::ES(3, 0) >= Version::GL(2, 0)));
    }
}
