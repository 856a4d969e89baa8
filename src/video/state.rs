//! Blend and render state carried by a display.

use crate::math::Color;

/// The equation combining the source and destination terms of a blend.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum BlendOp {
    Add,
    SrcMinusDest,
    DestMinusSrc,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum BlendFactor {
    Zero,
    One,
    Alpha,
    InverseAlpha,
    SrcColor,
    DestColor,
    InverseSrcColor,
    InverseDestColor,
}

/// Separate color and alpha blend triples.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Blender {
    pub op: BlendOp,
    pub src: BlendFactor,
    pub dst: BlendFactor,
    pub alpha_op: BlendOp,
    pub alpha_src: BlendFactor,
    pub alpha_dst: BlendFactor,
}

impl Default for Blender {
    fn default() -> Self {
        Blender::new(BlendOp::Add, BlendFactor::One, BlendFactor::InverseAlpha)
    }
}

impl Blender {
    /// Uses the same triple for color and alpha.
    pub fn new(op: BlendOp, src: BlendFactor, dst: BlendFactor) -> Self {
        Blender {
            op,
            src,
            dst,
            alpha_op: op,
            alpha_src: src,
            alpha_dst: dst,
        }
    }

    /// Blends `src` over `dst` in software.
    pub fn blend(&self, src: Color, dst: Color) -> Color {
        let factor = |f: BlendFactor, alpha: bool| -> Color {
            let v = match f {
                BlendFactor::Zero => Color::new(0.0, 0.0, 0.0, 0.0),
                BlendFactor::One => Color::new(1.0, 1.0, 1.0, 1.0),
                BlendFactor::Alpha => Color::new(src.a, src.a, src.a, src.a),
                BlendFactor::InverseAlpha => {
                    let a = 1.0 - src.a;
                    Color::new(a, a, a, a)
                }
                BlendFactor::SrcColor => src,
                BlendFactor::DestColor => dst,
                BlendFactor::InverseSrcColor => {
                    Color::new(1.0 - src.r, 1.0 - src.g, 1.0 - src.b, 1.0 - src.a)
                }
                BlendFactor::InverseDestColor => {
                    Color::new(1.0 - dst.r, 1.0 - dst.g, 1.0 - dst.b, 1.0 - dst.a)
                }
            };

            if alpha {
                Color::new(v.a, v.a, v.a, v.a)
            } else {
                v
            }
        };

        let apply = |op: BlendOp, s: f32, d: f32| match op {
            BlendOp::Add => s + d,
            BlendOp::SrcMinusDest => s - d,
            BlendOp::DestMinusSrc => d - s,
        };

        let sc = src * factor(self.src, false);
        let dc = dst * factor(self.dst, false);
        let sa = src.a * factor(self.alpha_src, true).a;
        let da = dst.a * factor(self.alpha_dst, true).a;

        Color::new(
            apply(self.op, sc.r, dc.r),
            apply(self.op, sc.g, dc.g),
            apply(self.op, sc.b, dc.b),
            apply(self.alpha_op, sa, da),
        )
        .clip()
    }
}

/// Comparison used by depth and alpha tests. The discriminants are the values
/// the default pixel shader receives through `al_alpha_func`.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CompareFunc {
    Never = 0,
    Always = 1,
    Less = 2,
    Equal = 3,
    LessEqual = 4,
    Greater = 5,
    NotEqual = 6,
    GreaterEqual = 7,
}

impl CompareFunc {
    pub fn compare(self, x: f32, reference: f32) -> bool {
        match self {
            CompareFunc::Never => false,
            CompareFunc::Always => true,
            CompareFunc::Less => x < reference,
            CompareFunc::Equal => (x - reference).abs() < ::std::f32::EPSILON,
            CompareFunc::LessEqual => x <= reference,
            CompareFunc::Greater => x > reference,
            CompareFunc::NotEqual => (x - reference).abs() >= ::std::f32::EPSILON,
            CompareFunc::GreaterEqual => x >= reference,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct AlphaTest {
    pub enabled: bool,
    pub func: CompareFunc,
    pub value: f32,
}

impl Default for AlphaTest {
    fn default() -> Self {
        AlphaTest {
            enabled: false,
            func: CompareFunc::Always,
            value: 0.0,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct WriteMask {
    pub color: bool,
    pub alpha: bool,
    pub depth: bool,
}

impl Default for WriteMask {
    fn default() -> Self {
        WriteMask {
            color: true,
            alpha: true,
            depth: true,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct RenderState {
    pub depth_test: bool,
    pub depth_func: CompareFunc,
    pub write_mask: WriteMask,
    pub alpha_test: AlphaTest,
}

impl Default for RenderState {
    fn default() -> Self {
        RenderState {
            depth_test: false,
            depth_func: CompareFunc::Less,
            write_mask: WriteMask::default(),
            alpha_test: AlphaTest::default(),
        }
    }
}

/// Texture addressing outside of [0, 1].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Wrap {
    Repeat,
    Clamp,
    Mirror,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn default_blender_is_premultiplied_over() {
        let blender = Blender::default();
        let dst = Color::new(0.0, 0.0, 1.0, 1.0);

        assert_eq!(blender.blend(Color::red(), dst), Color::red());
        let half = Color::new(0.5, 0.0, 0.0, 0.5);
        assert_eq!(blender.blend(half, dst), Color::new(0.5, 0.0, 0.5, 1.0));
    }

    #[test]
    fn compare() {
        assert!(CompareFunc::Always.compare(0.0, 1.0));
        assert!(!CompareFunc::Never.compare(0.0, 1.0));
        assert!(CompareFunc::GreaterEqual.compare(0.5, 0.5));
        assert!(!CompareFunc::Greater.compare(0.5, 0.5));
        assert_eq!(CompareFunc::GreaterEqual as i32, 7);
    }
}
