//! CPU rasterization into the pixel copy of the target bitmap.
//!
//! Triangles follow the top-left fill rule and are sampled at pixel centres.
//! Lines are walked with a DDA that leaves out their last pixel, so strips
//! and loops touch every shared vertex once.

use std::sync::RwLockWriteGuard;

use crate::math::{Color, Vector4};

use super::super::bitmap::{self, Bitmap, Storage};
use super::super::display::Display;
use super::super::state::{AlphaTest, Blender, WriteMask};
use super::super::vertex::VertexReader;
use super::{Prim, Topology};

/// A vertex in target pixel space.
#[derive(Debug, Copy, Clone)]
struct Point {
    x: f32,
    y: f32,
    color: Color,
    uv: [f32; 2],
}

impl Point {
    fn lerp(&self, other: &Point, t: f32) -> (Color, [f32; 2]) {
        let c = |a: f32, b: f32| a + (b - a) * t;
        (
            Color::new(
                c(self.color.r, other.color.r),
                c(self.color.g, other.color.g),
                c(self.color.b, other.color.b),
                c(self.color.a, other.color.a),
            ),
            [c(self.uv[0], other.uv[0]), c(self.uv[1], other.uv[1])],
        )
    }
}

/// Snapshot of the texture, addressed with repeat wrapping.
struct Texels {
    width: u32,
    height: u32,
    pixels: Vec<Color>,
}

impl Texels {
    fn new(texture: &Bitmap) -> Self {
        let (width, height) = (texture.width(), texture.height());
        let mut pixels = Vec::with_capacity((width * height) as usize);
        for y in 0..height {
            for x in 0..width {
                pixels.push(texture.get_pixel(x, y).unwrap_or_default());
            }
        }

        Texels {
            width,
            height,
            pixels,
        }
    }

    fn sample(&self, uv: [f32; 2]) -> Color {
        if self.pixels.is_empty() {
            return Color::white();
        }

        let x = (uv[0].floor() as i64).rem_euclid(i64::from(self.width));
        let y = (uv[1].floor() as i64).rem_euclid(i64::from(self.height));
        self.pixels[(y * i64::from(self.width) + x) as usize]
    }
}

struct Raster<'a> {
    storage: RwLockWriteGuard<'a, Storage>,
    origin: (u32, u32),
    width: u32,
    height: u32,
    blender: Blender,
    alpha_test: AlphaTest,
    mask: WriteMask,
    texels: Option<Texels>,
}

impl<'a> Raster<'a> {
    fn plot(&mut self, x: i64, y: i64, color: Color, uv: [f32; 2]) {
        if x < 0 || y < 0 || x >= i64::from(self.width) || y >= i64::from(self.height) {
            return;
        }

        let src = match self.texels {
            Some(ref t) => color * t.sample(uv),
            None => color,
        };

        if self.alpha_test.enabled && !self.alpha_test.func.compare(src.a, self.alpha_test.value) {
            return;
        }

        let (x, y) = (self.origin.0 + x as u32, self.origin.1 + y as u32);
        let dst = self.storage.get(x, y);
        let mut out = self.blender.blend(src, dst);
        if !self.mask.color {
            out = Color::new(dst.r, dst.g, dst.b, out.a);
        }

        if !self.mask.alpha {
            out.a = dst.a;
        }

        self.storage.put(x, y, out);
    }

    fn point(&mut self, p: &Point) {
        self.plot(p.x.floor() as i64, p.y.floor() as i64, p.color, p.uv);
    }

    fn line(&mut self, a: &Point, b: &Point) {
        let (t0, t1) = match clip(a, b, f64::from(self.width), f64::from(self.height)) {
            Some(v) => v,
            None => return,
        };

        // Only the steps inside the target are walked.
        let (ax, ay) = (f64::from(a.x), f64::from(a.y));
        let (dx, dy) = (f64::from(b.x) - ax, f64::from(b.y) - ay);
        let steps = dx.abs().max(dy.abs()).round();
        let first = (t0 * steps).floor() as u64;
        let last = (t1 * steps).ceil().min(steps) as u64;
        for i in first..last {
            let t = i as f64 / steps;
            let (color, uv) = a.lerp(b, t as f32);
            let (x, y) = (ax + dx * t, ay + dy * t);
            self.plot(x.floor() as i64, y.floor() as i64, color, uv);
        }
    }

    fn triangle(&mut self, a: &Point, b: &Point, c: &Point) {
        let mut area = edge(a, b, c.x, c.y);
        if area == 0.0 {
            return;
        }

        let (b, c) = if area < 0.0 { (c, b) } else { (b, c) };
        area = area.abs();

        let min_x = a.x.min(b.x).min(c.x).floor().max(0.0) as i64;
        let min_y = a.y.min(b.y).min(c.y).floor().max(0.0) as i64;
        let max_x = (a.x.max(b.x).max(c.x).ceil() as i64).min(i64::from(self.width));
        let max_y = (a.y.max(b.y).max(c.y).ceil() as i64).min(i64::from(self.height));

        for y in min_y..max_y {
            for x in min_x..max_x {
                let (px, py) = (x as f32 + 0.5, y as f32 + 0.5);
                let w0 = edge(b, c, px, py);
                let w1 = edge(c, a, px, py);
                let w2 = edge(a, b, px, py);
                if !(covers(w0, b, c) && covers(w1, c, a) && covers(w2, a, b)) {
                    continue;
                }

                let (l0, l1, l2) = (w0 / area, w1 / area, w2 / area);
                let mix = |x: f32, y: f32, z: f32| x * l0 + y * l1 + z * l2;
                let color = Color::new(
                    mix(a.color.r, b.color.r, c.color.r),
                    mix(a.color.g, b.color.g, c.color.g),
                    mix(a.color.b, b.color.b, c.color.b),
                    mix(a.color.a, b.color.a, c.color.a),
                );

                let uv = [
                    mix(a.uv[0], b.uv[0], c.uv[0]),
                    mix(a.uv[1], b.uv[1], c.uv[1]),
                ];

                self.plot(x, y, color, uv);
            }
        }
    }
}

/// The part of `a -> b` within one pixel of a `width` by `height` target, as
/// a range of the line parameter. `None` when nothing of it is inside.
fn clip(a: &Point, b: &Point, width: f64, height: f64) -> Option<(f64, f64)> {
    let (ax, ay) = (f64::from(a.x), f64::from(a.y));
    let (dx, dy) = (f64::from(b.x) - ax, f64::from(b.y) - ay);
    if !(ax.is_finite() && ay.is_finite() && dx.is_finite() && dy.is_finite()) {
        return None;
    }

    let (mut t0, mut t1) = (0.0, 1.0);
    let bounds = [
        (-dx, ax + 1.0),
        (dx, width + 1.0 - ax),
        (-dy, ay + 1.0),
        (dy, height + 1.0 - ay),
    ];

    for &(p, q) in &bounds {
        if p == 0.0 {
            if q < 0.0 {
                return None;
            }

            continue;
        }

        let r = q / p;
        if p < 0.0 {
            if r > t1 {
                return None;
            }

            t0 = r.max(t0);
        } else {
            if r < t0 {
                return None;
            }

            t1 = r.min(t1);
        }
    }

    Some((t0, t1))
}

#[inline]
fn edge(a: &Point, b: &Point, x: f32, y: f32) -> f32 {
    (b.x - a.x) * (y - a.y) - (b.y - a.y) * (x - a.x)
}

/// Top-left rule for a sample exactly on the edge `from -> to`.
#[inline]
fn covers(w: f32, from: &Point, to: &Point) -> bool {
    if w > 0.0 {
        return true;
    }

    w == 0.0 && ((from.y == to.y && to.x > from.x) || to.y < from.y)
}

/// Rasterizes `prim` onto `target`. Returns the primitive count.
pub fn draw(display: &Display, target: &Bitmap, texture: Option<&Bitmap>, prim: &Prim) -> usize {
    let reader = VertexReader::new(prim.vertices, prim.decl);
    let texels = texture.map(Texels::new);
    let pixel_texcoords = reader.pixel_texcoords();

    let (tw, th) = match texels {
        Some(ref t) => (t.width as f32, t.height as f32),
        None => (1.0, 1.0),
    };

    let (w, h) = (target.width() as f32, target.height() as f32);
    let projview = display.target_projview(target);
    let points: Vec<Point> = (0..prim.count)
        .map(|i| {
            let v = reader.get(prim.vertex(i));
            let p = projview * Vector4::new(v.pos[0], v.pos[1], v.pos[2], 1.0);
            let (nx, ny) = if p.w != 0.0 {
                (p.x / p.w, p.y / p.w)
            } else {
                (p.x, p.y)
            };

            let uv = if pixel_texcoords {
                v.uv
            } else {
                [v.uv[0] * tw, v.uv[1] * th]
            };

            Point {
                x: (nx + 1.0) * 0.5 * w,
                y: (1.0 - ny) * 0.5 * h,
                color: v.color,
                uv,
            }
        })
        .collect();

    let ((ox, oy), _) = target.texture_origin_and_size();
    let mut raster = Raster {
        storage: bitmap::write(target.storage()),
        origin: (ox, oy),
        width: target.width(),
        height: target.height(),
        blender: *display.blender(),
        alpha_test: display.render_state().alpha_test,
        mask: display.render_state().write_mask,
        texels,
    };

    let n = points.len();
    match prim.topology {
        Topology::PointList => points.iter().for_each(|p| raster.point(p)),
        Topology::LineList => {
            for pair in points.chunks(2).filter(|v| v.len() == 2) {
                raster.line(&pair[0], &pair[1]);
            }
        }
        Topology::LineStrip | Topology::LineLoop => {
            for pair in points.windows(2) {
                raster.line(&pair[0], &pair[1]);
            }

            if prim.topology == Topology::LineLoop && n >= 2 {
                raster.line(&points[n - 1], &points[0]);
            }
        }
        Topology::TriangleList => {
            for tri in points.chunks(3).filter(|v| v.len() == 3) {
                raster.triangle(&tri[0], &tri[1], &tri[2]);
            }
        }
        Topology::TriangleStrip => {
            for tri in points.windows(3) {
                raster.triangle(&tri[0], &tri[1], &tri[2]);
            }
        }
        Topology::TriangleFan => {
            for i in 1..n.saturating_sub(1) {
                raster.triangle(&points[0], &points[i], &points[i + 1]);
            }
        }
    }

    prim.primitives
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::math::{self, SquareMatrix};
    use crate::video::display::{Backend, DisplayParams};
    use crate::video::pixel::PixelFormat;
    use crate::video::settings::VideoSettings;
    use crate::video::state::{BlendFactor, BlendOp};
    use crate::video::system::System;
    use crate::video::vertex::{self, Vertex};

    fn software_display() -> (System, Display) {
        let system = System::new(VideoSettings::default()).unwrap();
        let mut display = Display::new(&system, Backend::Software, DisplayParams::default()).unwrap();
        display.set_view(&math::Matrix4::identity());
        display.set_blender(Blender::new(BlendOp::Add, BlendFactor::One, BlendFactor::Zero));
        (system, display)
    }

    fn prim<'a>(vertices: &'a [Vertex], topology: Topology) -> Prim<'a> {
        Prim {
            vertices: vertex::as_bytes(vertices),
            decl: None,
            indices: None,
            topology,
            count: vertices.len(),
            primitives: topology.primitive_count(vertices.len()),
        }
    }

    #[test]
    fn quad_covers_every_pixel_once() {
        let (_system, display) = software_display();
        let target = Bitmap::memory(4, 4, PixelFormat::Abgr8888);

        let c = Color::red();
        let quad = [
            Vertex::new(0.0, 0.0, 0.0, 0.0, c),
            Vertex::new(4.0, 0.0, 0.0, 0.0, c),
            Vertex::new(0.0, 4.0, 0.0, 0.0, c),
            Vertex::new(4.0, 4.0, 0.0, 0.0, c),
        ];

        let n = draw(&display, &target, None, &prim(&quad, Topology::TriangleStrip));
        assert_eq!(n, 2);

        for y in 0..4 {
            for x in 0..4 {
                assert_eq!(target.get_pixel(x, y), Some(Color::red()));
            }
        }

        display.destroy();
    }

    #[test]
    fn line_skips_last_pixel() {
        let (_system, display) = software_display();
        let target = Bitmap::memory(4, 1, PixelFormat::Abgr8888);

        let line = [
            Vertex::new(0.5, 0.5, 0.0, 0.0, Color::white()),
            Vertex::new(3.5, 0.5, 0.0, 0.0, Color::white()),
        ];

        assert_eq!(draw(&display, &target, None, &prim(&line, Topology::LineList)), 1);
        assert_eq!(target.get_pixel(2, 0), Some(Color::white()));
        assert_eq!(target.get_pixel(3, 0), Some(Color::transparent()));
        display.destroy();
    }

    #[test]
    fn textured_triangle_samples_pixel_texcoords() {
        let (_system, display) = software_display();
        let target = Bitmap::memory(2, 2, PixelFormat::Abgr8888);
        let texture = Bitmap::memory(2, 2, PixelFormat::Abgr8888);
        texture.put_pixel(0, 0, Color::blue());
        texture.put_pixel(1, 0, Color::green());
        texture.put_pixel(0, 1, Color::red());
        texture.put_pixel(1, 1, Color::white());

        let w = Color::white();
        let quad = [
            Vertex::new(0.0, 0.0, 0.0, 0.0, w),
            Vertex::new(2.0, 0.0, 2.0, 0.0, w),
            Vertex::new(0.0, 2.0, 0.0, 2.0, w),
            Vertex::new(2.0, 2.0, 2.0, 2.0, w),
        ];

        draw(&display, &target, Some(&texture), &prim(&quad, Topology::TriangleStrip));
        assert_eq!(target.get_pixel(0, 0), Some(Color::blue()));
        assert_eq!(target.get_pixel(1, 0), Some(Color::green()));
        assert_eq!(target.get_pixel(0, 1), Some(Color::red()));
        assert_eq!(target.get_pixel(1, 1), Some(Color::white()));
        display.destroy();
    }

    #[test]
    fn far_lines_only_walk_the_target() {
        let (_system, display) = software_display();
        let target = Bitmap::memory(4, 4, PixelFormat::Abgr8888);

        let line = [
            Vertex::new(-1.0e8, 0.5, 0.0, 0.0, Color::white()),
            Vertex::new(1.0e8, 0.5, 0.0, 0.0, Color::white()),
            Vertex::new(1.5, 1.0e9, 0.0, 0.0, Color::red()),
            Vertex::new(1.5, -1.0e9, 0.0, 0.0, Color::red()),
        ];

        let start = std::time::Instant::now();
        assert_eq!(draw(&display, &target, None, &prim(&line, Topology::LineList)), 2);
        assert!(start.elapsed() < std::time::Duration::from_secs(1));

        for x in [0, 2, 3].iter() {
            assert_eq!(target.get_pixel(*x, 0), Some(Color::white()));
        }

        for y in 1..4 {
            assert_eq!(target.get_pixel(1, y), Some(Color::red()));
            assert_eq!(target.get_pixel(0, y), Some(Color::transparent()));
        }

        display.destroy();
    }

    #[test]
    fn unbounded_lines_are_skipped() {
        let (_system, display) = software_display();
        let target = Bitmap::memory(4, 4, PixelFormat::Abgr8888);

        let line = [
            Vertex::new(0.5, 0.5, 0.0, 0.0, Color::white()),
            Vertex::new(std::f32::INFINITY, 0.5, 0.0, 0.0, Color::white()),
            Vertex::new(std::f32::NAN, 0.5, 0.0, 0.0, Color::white()),
            Vertex::new(2.5, 2.5, 0.0, 0.0, Color::white()),
        ];

        assert_eq!(draw(&display, &target, None, &prim(&line, Topology::LineList)), 2);
        assert_eq!(target.get_pixel(0, 0), Some(Color::transparent()));
        assert_eq!(target.get_pixel(2, 2), Some(Color::transparent()));
        display.destroy();
    }
}
