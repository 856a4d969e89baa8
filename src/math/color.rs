use std::ops::Mul;

/// A RGBA `Color`. Each component is a floating point value with a range
/// from 0 to 1.
#[repr(C)]
#[derive(Debug, Default, Copy, Clone, PartialEq)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    pub const fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Color { r, g, b, a }
    }

    pub fn from_rgba8(v: [u8; 4]) -> Self {
        let max = 255.0;
        Color::new(
            f32::from(v[0]) / max,
            f32::from(v[1]) / max,
            f32::from(v[2]) / max,
            f32::from(v[3]) / max,
        )
    }

    /// Quantizes into 8-bit channels, rounding to nearest.
    pub fn to_rgba8(self) -> [u8; 4] {
        let v = self.clip();
        let q = |c: f32| (c * 255.0 + 0.5) as u8;
        [q(v.r), q(v.g), q(v.b), q(v.a)]
    }

    /// Packs into a `0xAARRGGBB` word, the layout of a Direct3D `D3DCOLOR`.
    pub fn to_argb_u32(self) -> u32 {
        let [r, g, b, a] = self.to_rgba8();
        (u32::from(a) << 24) | (u32::from(r) << 16) | (u32::from(g) << 8) | u32::from(b)
    }

    /// Creates `Color` from a `0xAARRGGBB` word.
    pub fn from_argb_u32(encoded: u32) -> Self {
        Color::from_rgba8([
            (encoded >> 16) as u8,
            (encoded >> 8) as u8,
            encoded as u8,
            (encoded >> 24) as u8,
        ])
    }

    /// Clip to [0.0, 1.0] range.
    pub fn clip(self) -> Self {
        let c = |v: f32| v.max(0.0).min(1.0);
        Color::new(c(self.r), c(self.g), c(self.b), c(self.a))
    }

    pub fn rgba(self) -> [f32; 4] {
        [self.r, self.g, self.b, self.a]
    }

    pub fn white() -> Self {
        Color::new(1.0, 1.0, 1.0, 1.0)
    }

    pub fn black() -> Self {
        Color::new(0.0, 0.0, 0.0, 1.0)
    }

    pub fn red() -> Self {
        Color::new(1.0, 0.0, 0.0, 1.0)
    }

    pub fn green() -> Self {
        Color::new(0.0, 1.0, 0.0, 1.0)
    }

    pub fn blue() -> Self {
        Color::new(0.0, 0.0, 1.0, 1.0)
    }

    pub fn transparent() -> Self {
        Color::new(0.0, 0.0, 0.0, 0.0)
    }
}

/// Component-wise modulation.
impl Mul for Color {
    type Output = Color;

    fn mul(self, rhs: Color) -> Color {
        Color::new(self.r * rhs.r, self.g * rhs.g, self.b * rhs.b, self.a * rhs.a)
    }
}
