//! Built-in shader sources, HLSL effect assembly and a small declaration
//! scanner used by backends that do not run a real compiler.

use super::{ShaderPlatform, ShaderStage};

pub const GLSL_VERTEX: &str = r#"attribute vec4 al_pos;
attribute vec4 al_color;
attribute vec2 al_texcoord;
uniform mat4 al_projview_matrix;
uniform bool al_use_tex_matrix;
uniform mat4 al_tex_matrix;
varying vec4 varying_color;
varying vec2 varying_texcoord;
void main()
{
  varying_color = al_color;
  if (al_use_tex_matrix) {
    vec4 uv = al_tex_matrix * vec4(al_texcoord, 0.0, 1.0);
    varying_texcoord = vec2(uv.x, uv.y);
  }
  else
    varying_texcoord = al_texcoord;
  gl_Position = al_projview_matrix * al_pos;
}
"#;

pub const GLSL_PIXEL: &str = r#"#ifdef GL_ES
precision lowp float;
#endif
uniform sampler2D al_tex;
uniform bool al_use_tex;
uniform bool al_alpha_test;
uniform int al_alpha_func;
uniform float al_alpha_test_val;
varying vec4 varying_color;
varying vec2 varying_texcoord;

bool alpha_test_func(float x, int op, float compare);

void main()
{
  vec4 c;
  if (al_use_tex)
    c = varying_color * texture2D(al_tex, varying_texcoord);
  else
    c = varying_color;
  if (!al_alpha_test || alpha_test_func(c.a, al_alpha_func, al_alpha_test_val))
    gl_FragColor = c;
  else
    discard;
}

bool alpha_test_func(float x, int op, float compare)
{
  if (op == 0) return false;
  else if (op == 1) return true;
  else if (op == 2) return x < compare;
  else if (op == 3) return x == compare;
  else if (op == 4) return x <= compare;
  else if (op == 5) return x > compare;
  else if (op == 6) return x != compare;
  else if (op == 7) return x >= compare;
  return false;
}
"#;

pub const GLSL_MINIMAL_PIXEL: &str = r#"#ifdef GL_ES
precision lowp float;
#endif
uniform sampler2D al_tex;
uniform bool al_use_tex;
varying vec4 varying_color;
varying vec2 varying_texcoord;
void main()
{
  if (al_use_tex)
    gl_FragColor = varying_color * texture2D(al_tex, varying_texcoord);
  else
    gl_FragColor = varying_color;
}
"#;

pub const HLSL_VERTEX: &str = r#"struct VS_INPUT
{
   float4 Position : POSITION0;
   float2 TexCoord : TEXCOORD0;
   float4 Color    : TEXCOORD1;
};
struct VS_OUTPUT
{
   float4 Position : POSITION0;
   float4 Color    : COLOR0;
   float2 TexCoord : TEXCOORD0;
};

float4x4 al_projview_matrix;
bool al_use_tex_matrix;
float4x4 al_tex_matrix;

VS_OUTPUT vs_main(VS_INPUT Input)
{
   VS_OUTPUT Output;
   Output.Color = Input.Color;
   if (al_use_tex_matrix) {
      Output.TexCoord = mul(float4(Input.TexCoord, 1.0f, 0.0f), al_tex_matrix).xy;
   }
   else {
      Output.TexCoord = Input.TexCoord;
   }
   Output.Position = mul(Input.Position, al_projview_matrix);
   return Output;
}
"#;

pub const HLSL_PIXEL: &str = r#"bool al_use_tex;
texture al_tex;
sampler2D s = sampler_state { texture = <al_tex>; };

float4 ps_main(VS_OUTPUT Input) : COLOR0
{
   if (al_use_tex) {
      return Input.Color * tex2D(s, Input.TexCoord);
   }
   else {
      return Input.Color;
   }
}
"#;

/// The built-in source for `platform` and `stage`, or `None` for platforms
/// without one. `platform` must already be resolved.
pub fn default_source(platform: ShaderPlatform, stage: ShaderStage) -> Option<&'static str> {
    match (platform, stage) {
        (ShaderPlatform::Glsl, ShaderStage::Vertex) => Some(GLSL_VERTEX),
        (ShaderPlatform::Glsl, ShaderStage::Pixel) => Some(GLSL_PIXEL),
        (ShaderPlatform::GlslMinimal, ShaderStage::Vertex) => Some(GLSL_VERTEX),
        (ShaderPlatform::GlslMinimal, ShaderStage::Pixel) => Some(GLSL_MINIMAL_PIXEL),
        (ShaderPlatform::Hlsl, ShaderStage::Vertex)
        | (ShaderPlatform::HlslMinimal, ShaderStage::Vertex)
        | (ShaderPlatform::HlslSm3, ShaderStage::Vertex) => Some(HLSL_VERTEX),
        (ShaderPlatform::Hlsl, ShaderStage::Pixel)
        | (ShaderPlatform::HlslMinimal, ShaderStage::Pixel)
        | (ShaderPlatform::HlslSm3, ShaderStage::Pixel) => Some(HLSL_PIXEL),
        _ => None,
    }
}

/// Joins both stages into one effect source. A `technique TECH` block for
/// the given shader model is appended unless either stage already declares a
/// technique. Returns `None` if both stages are empty.
pub fn effect_source(vertex: &str, pixel: &str, sm3: bool) -> Option<String> {
    if vertex.is_empty() && pixel.is_empty() {
        return None;
    }

    let technique = if vertex.contains("technique") || pixel.contains("technique") {
        String::new()
    } else {
        let (vs, ps) = if sm3 {
            ("vs_3_0", "ps_3_0")
        } else {
            ("vs_2_0", "ps_2_0")
        };

        let vertex_shader = if vertex.is_empty() {
            "null".to_owned()
        } else {
            format!("compile {} vs_main()", vs)
        };

        let pixel_shader = if pixel.is_empty() {
            "null".to_owned()
        } else {
            format!("compile {} ps_main()", ps)
        };

        format!(
            "technique TECH\n{{\n   pass p1\n   {{\n      VertexShader = {};\n      PixelShader = {};\n   }}\n}}\n",
            vertex_shader, pixel_shader
        )
    };

    Some(format!("{}\n#line 1\n{}\n{}\n", vertex, pixel, technique))
}

fn strip_name(token: &str) -> &str {
    let token = token.trim_end_matches(';');
    match token.find('[') {
        Some(i) => &token[..i],
        None => token,
    }
}

/// Names declared with `keyword` (`uniform`, `attribute` or `in`) at the
/// start of a line of GLSL source.
pub fn glsl_declarations(source: &str, keyword: &str) -> Vec<String> {
    let mut names = Vec::new();
    for line in source.lines() {
        let mut tokens = line.split_whitespace();
        if tokens.next() != Some(keyword) {
            continue;
        }

        let mut rest: Vec<&str> = tokens.collect();
        // Skip precision qualifiers.
        rest.retain(|t| !["lowp", "mediump", "highp"].contains(t));
        if let Some(name) = rest.get(1) {
            let name = strip_name(name);
            if !name.is_empty() && !names.iter().any(|v| v == name) {
                names.push(name.to_owned());
            }
        }
    }

    names
}

const HLSL_TYPES: &[&str] = &[
    "bool", "int", "int2", "int3", "int4", "float", "float2", "float3", "float4", "float4x4",
    "float3x3", "texture", "sampler2D", "sampler",
];

/// Global variables of an HLSL effect: `<type> <name>;` at brace depth zero.
pub fn hlsl_parameters(source: &str) -> Vec<String> {
    let mut names = Vec::new();
    let mut depth = 0i32;

    for line in source.lines() {
        if depth == 0 {
            let mut tokens = line.split_whitespace();
            if let (Some(ty), Some(name)) = (tokens.next(), tokens.next()) {
                let name = strip_name(name);
                if HLSL_TYPES.contains(&ty)
                    && !name.is_empty()
                    && !name.contains('(')
                    && !names.iter().any(|v| v == name)
                {
                    names.push(name.to_owned());
                }
            }
        }

        for c in line.chars() {
            match c {
                '{' => depth += 1,
                '}' => depth -= 1,
                _ => {}
            }
        }
    }

    names
}
