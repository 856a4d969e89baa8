//! Pixel formats and the conversion tables used when uploading to a backend.

use crate::math::Color;

use super::backends::BackendKind;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// Bytes in memory order R, G, B, A.
    Abgr8888,
    /// Bytes in memory order B, G, R, A.
    Argb8888,
    /// Bytes in memory order R, G, B.
    Rgb888,
    /// 16-bits little-endian word, red in the high bits.
    Rgb565,
    /// One luminance byte.
    SingleChannel8,
}

impl PixelFormat {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Abgr8888 | PixelFormat::Argb8888 => 4,
            PixelFormat::Rgb888 => 3,
            PixelFormat::Rgb565 => 2,
            PixelFormat::SingleChannel8 => 1,
        }
    }

    pub fn has_alpha(self) -> bool {
        match self {
            PixelFormat::Abgr8888 | PixelFormat::Argb8888 => true,
            _ => false,
        }
    }

    /// Decodes the pixel at the start of `bytes`.
    pub fn read(self, bytes: &[u8]) -> Color {
        match self {
            PixelFormat::Abgr8888 => Color::from_rgba8([bytes[0], bytes[1], bytes[2], bytes[3]]),
            PixelFormat::Argb8888 => Color::from_rgba8([bytes[2], bytes[1], bytes[0], bytes[3]]),
            PixelFormat::Rgb888 => Color::from_rgba8([bytes[0], bytes[1], bytes[2], 255]),
            PixelFormat::Rgb565 => {
                let v = u16::from(bytes[0]) | (u16::from(bytes[1]) << 8);
                let r = ((v >> 11) & 0x1F) as f32 / 31.0;
                let g = ((v >> 5) & 0x3F) as f32 / 63.0;
                let b = (v & 0x1F) as f32 / 31.0;
                Color::new(r, g, b, 1.0)
            }
            PixelFormat::SingleChannel8 => {
                let l = f32::from(bytes[0]) / 255.0;
                Color::new(l, l, l, 1.0)
            }
        }
    }

    /// Encodes `color` into the start of `bytes`.
    pub fn write(self, color: Color, bytes: &mut [u8]) {
        let [r, g, b, a] = color.to_rgba8();
        match self {
            PixelFormat::Abgr8888 => bytes[..4].copy_from_slice(&[r, g, b, a]),
            PixelFormat::Argb8888 => bytes[..4].copy_from_slice(&[b, g, r, a]),
            PixelFormat::Rgb888 => bytes[..3].copy_from_slice(&[r, g, b]),
            PixelFormat::Rgb565 => {
                let c = color.clip();
                let r = (c.r * 31.0 + 0.5) as u16;
                let g = (c.g * 63.0 + 0.5) as u16;
                let b = (c.b * 31.0 + 0.5) as u16;
                let v = (r << 11) | (g << 5) | b;
                bytes[0] = v as u8;
                bytes[1] = (v >> 8) as u8;
            }
            PixelFormat::SingleChannel8 => {
                let l = u16::from(r) * 77 + u16::from(g) * 151 + u16::from(b) * 28;
                bytes[0] = (l >> 8) as u8;
            }
        }
    }

    /// The format a backend texture is created with for pixel data in this
    /// format. Formats a backend can't consume natively are converted first.
    pub fn upload_format(self, backend: BackendKind) -> PixelFormat {
        match (backend, self) {
            (BackendKind::OpenGl, PixelFormat::Argb8888) => PixelFormat::Abgr8888,
            (BackendKind::Direct3D, PixelFormat::Rgb888) => PixelFormat::Argb8888,
            (BackendKind::Direct3D, PixelFormat::SingleChannel8) => PixelFormat::Argb8888,
            (_, format) => format,
        }
    }

    /// The `D3DFORMAT` code of this format, if Direct3D can sample it directly.
    pub fn d3d_format(self) -> Option<u32> {
        match self {
            PixelFormat::Argb8888 => Some(21),
            PixelFormat::Abgr8888 => Some(32),
            PixelFormat::Rgb565 => Some(23),
            _ => None,
        }
    }
}

/// Converts a tightly packed buffer of `src` pixels into `dst` pixels.
pub fn convert(src: PixelFormat, dst: PixelFormat, pixels: &[u8]) -> Vec<u8> {
    if src == dst {
        return pixels.to_vec();
    }

    let (sb, db) = (src.bytes_per_pixel(), dst.bytes_per_pixel());
    let count = pixels.len() / sb;
    let mut out = vec![0; count * db];
    for (i, o) in pixels.chunks(sb).zip(out.chunks_mut(db)) {
        dst.write(src.read(i), o);
    }

    out
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn round_trip_channels() {
        let c = Color::new(1.0, 0.0, 1.0, 1.0);
        for &format in &[
            PixelFormat::Abgr8888,
            PixelFormat::Argb8888,
            PixelFormat::Rgb888,
            PixelFormat::Rgb565,
        ] {
            let mut buf = [0u8; 4];
            format.write(c, &mut buf);
            assert_eq!(format.read(&buf), c, "{:?}", format);
        }
    }

    #[test]
    fn byte_order() {
        let mut buf = [0u8; 4];
        PixelFormat::Argb8888.write(Color::red(), &mut buf);
        assert_eq!(buf, [0, 0, 255, 255]);

        let converted = convert(PixelFormat::Argb8888, PixelFormat::Abgr8888, &buf);
        assert_eq!(converted, vec![255, 0, 0, 255]);
    }

    #[test]
    fn upload_tables() {
        assert_eq!(
            PixelFormat::Argb8888.upload_format(BackendKind::OpenGl),
            PixelFormat::Abgr8888
        );
        assert_eq!(
            PixelFormat::Rgb888.upload_format(BackendKind::Direct3D),
            PixelFormat::Argb8888
        );

        for &f in &[PixelFormat::Rgb888, PixelFormat::SingleChannel8, PixelFormat::Argb8888] {
            assert!(f.upload_format(BackendKind::Direct3D).d3d_format().is_some());
        }
    }
}
