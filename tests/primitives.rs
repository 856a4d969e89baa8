extern crate env_logger;
extern crate rand;
extern crate rastrum;

use rand::prng::XorShiftRng;
use rand::{Rng, SeedableRng};

use rastrum::math::Color;
use rastrum::video::backends::headless::{DrawCall, HeadlessD3d, HeadlessGl, Recorder};
use rastrum::video::backends::Viewport;
use rastrum::video::prelude::*;
use rastrum::video::primitives::point_runs;
use rastrum::video::settings::LegacyDetection;
use rastrum::video::vertex::Storage;

fn settings() -> VideoSettings {
    let _ = env_logger::try_init();
    VideoSettings::default()
}

fn d3d(system: &System, id: u64, pixel_shader: (u8, u8), programmable: bool) -> (Display, Recorder) {
    let device = HeadlessD3d::new(id).with_pixel_shader(pixel_shader);
    let recorder = device.recorder();
    let params = DisplayParams {
        programmable,
        ..DisplayParams::default()
    };

    let display = Display::new(system, Backend::Direct3D(Box::new(device)), params).unwrap();
    (display, recorder)
}

fn gl(system: &System, id: u64) -> (Display, Recorder) {
    let device = HeadlessGl::new(id);
    let recorder = device.recorder();
    let display = Display::new(system, Backend::OpenGl(Box::new(device)), DisplayParams::default()).unwrap();
    (display, recorder)
}

fn polygon(n: usize) -> Vec<Vertex> {
    (0..n)
        .map(|i| {
            let a = i as f32 / n as f32 * 6.28;
            Vertex::new(100.0 + a.cos() * 50.0, 100.0 + a.sin() * 50.0, 0.0, 0.0, Color::white())
        })
        .collect()
}

fn drawn(draws: &[DrawCall]) -> usize {
    draws.iter().map(|v| v.primitives).sum()
}

/// Where `(x, y)` lands in the render target of `call`, with clip space `+y`
/// pointing at higher rows.
fn landing(call: &DrawCall, x: f32, y: f32) -> (f32, f32) {
    let m = call.projview.expect("draw without a projview matrix");
    let viewport = call.viewport.expect("draw without a viewport");
    let w = m[3] * x + m[7] * y + m[15];
    let nx = (m[0] * x + m[4] * y + m[12]) / w;
    let ny = (m[1] * x + m[5] * y + m[13]) / w;
    (
        viewport.x as f32 + (nx + 1.0) * 0.5 * viewport.w as f32,
        viewport.y as f32 + (ny + 1.0) * 0.5 * viewport.h as f32,
    )
}

fn close(a: (f32, f32), b: (f32, f32)) -> bool {
    (a.0 - b.0).abs() < 1e-4 && (a.1 - b.1).abs() < 1e-4
}

#[test]
fn d3d_line_loops_are_closed_with_an_extra_segment() {
    let system = System::new(settings()).unwrap();
    let (mut display, recorder) = d3d(&system, 0x100, (3, 0), false);
    let target = display.backbuffer();
    let vertices = polygon(5);

    let n = draw_vertices(&mut display, &target, None, &vertices, None, Topology::LineLoop);
    assert_eq!(n, 5);

    let draws = recorder.draws();
    assert_eq!(draws.len(), 2);
    assert_eq!(draws[0].topology, Topology::LineStrip);
    assert_eq!(draws[0].primitives, 4);
    assert_eq!(draws[1].topology, Topology::LineList);
    assert_eq!(draws[1].indices, Some(vec![4, 0]));

    recorder.clear_draws();
    let indices = [3, 1, 4, 2];
    let n = draw_vertices(&mut display, &target, None, &vertices, Some(&indices), Topology::LineLoop);
    assert_eq!(n, 4);

    let draws = recorder.draws();
    assert_eq!(draws.len(), 2);
    assert_eq!(draws[0].indices, Some(indices.to_vec()));
    assert_eq!(draws[1].indices, Some(vec![2, 3]));
    assert_eq!(drawn(&draws), 4);

    display.destroy();
}

#[test]
fn d3d_indexed_points_are_split_into_runs() {
    let system = System::new(settings()).unwrap();
    let (mut display, recorder) = d3d(&system, 0x101, (3, 0), false);
    let target = display.backbuffer();
    let vertices = polygon(8);

    let indices = [0, 1, 2, 5];
    let n = draw_vertices(&mut display, &target, None, &vertices, Some(&indices), Topology::PointList);
    assert_eq!(n, 4);

    let draws = recorder.draws();
    assert_eq!(draws.len(), 2);
    assert_eq!(draws[0].primitives, 3);
    assert_eq!(draws[1].primitives, 1);
    assert!(draws.iter().all(|v| v.indices.is_none()));

    display.destroy();
}

#[test]
fn point_runs_cover_every_index() {
    let mut rng = XorShiftRng::from_seed([3; 16]);
    for _ in 0..32 {
        let len = rng.gen_range(1, 40);
        let indices: Vec<u32> = (0..len).map(|_| rng.gen_range(0, 16)).collect();

        let runs = point_runs(&indices);
        let expanded: Vec<u32> = runs
            .iter()
            .flat_map(|&(start, len)| (start..start + len as u32))
            .collect();

        assert_eq!(expanded, indices);
        for pair in runs.windows(2) {
            assert_ne!(pair[0].0 + pair[0].1 as u32, pair[1].0);
        }
    }
}

#[test]
fn legacy_and_modern_devices_draw_the_same_primitives() {
    let system = System::new(settings()).unwrap();
    let (mut legacy, legacy_recorder) = d3d(&system, 0x102, (1, 4), false);
    let (mut modern, modern_recorder) = d3d(&system, 0x103, (3, 0), false);
    assert_eq!(legacy.capability_tier(), CapabilityTier::Legacy);
    assert_eq!(modern.capability_tier(), CapabilityTier::Modern);

    let (legacy_target, modern_target) = (legacy.backbuffer(), modern.backbuffer());
    let vertices = polygon(9);
    let indices = [0, 2, 4, 6, 8, 1, 3];
    let topologies = [
        Topology::PointList,
        Topology::LineList,
        Topology::LineStrip,
        Topology::LineLoop,
        Topology::TriangleList,
        Topology::TriangleStrip,
        Topology::TriangleFan,
    ];

    for &topology in &topologies {
        for &indices in &[None, Some(&indices[..])] {
            legacy_recorder.clear_draws();
            modern_recorder.clear_draws();

            let a = draw_vertices(&mut legacy, &legacy_target, None, &vertices, indices, topology);
            let b = draw_vertices(&mut modern, &modern_target, None, &vertices, indices, topology);

            assert_eq!(a, b, "{:?} {:?}", topology, indices);
            assert_eq!(drawn(&legacy_recorder.draws()), a, "{:?} {:?}", topology, indices);
            assert_eq!(drawn(&modern_recorder.draws()), b, "{:?} {:?}", topology, indices);
            assert!(legacy_recorder.draws().iter().all(|v| v.indices.is_none()));
        }
    }

    assert_eq!(legacy_recorder.fvf(), Some(rastrum::video::backends::LEGACY_FVF));

    legacy.destroy();
    modern.destroy();
}

#[test]
fn forced_legacy_detection_overrides_the_recorder() {
    let mut settings = settings();
    settings.legacy_detection = LegacyDetection::ForceLegacy;
    let system = System::new(settings).unwrap();

    let (display, _) = d3d(&system, 0x104, (3, 0), true);
    assert_eq!(display.capability_tier(), CapabilityTier::Legacy);
    display.destroy();
}

#[test]
fn custom_declarations_fall_back_to_software_on_legacy_devices() {
    let system = System::new(settings()).unwrap();
    let (mut display, recorder) = d3d(&system, 0x105, (1, 1), false);

    let decl = VertexDecl::new(
        &[
            VertexElement::new(Attribute::Position, Storage::Float2, 0),
            VertexElement::new(Attribute::Color, Storage::Float4, 8),
        ],
        24,
    )
    .unwrap();

    let mut data = Vec::new();
    for &(x, y) in &[(0.0f32, 0.0f32), (8.0, 0.0), (0.0, 8.0)] {
        for v in &[x, y, 1.0, 0.0, 0.0, 1.0] {
            data.extend_from_slice(&v.to_bits().to_ne_bytes());
        }
    }

    let target = display.create_bitmap(8, 8, PixelFormat::Argb8888).unwrap();
    let n = draw_prim(&mut display, &target, None, &data, Some(&decl), None, Topology::TriangleList);
    assert_eq!(n, 1);
    assert!(recorder.draws().is_empty());
    assert_eq!(target.get_pixel(1, 1), Some(Color::red()));

    display.destroy();
}

#[test]
fn lost_devices_are_never_touched() {
    let system = System::new(settings()).unwrap();
    let (mut display, recorder) = gl(&system, 0x106);
    let target = display.backbuffer();
    let texture = display.create_bitmap(4, 4, PixelFormat::Abgr8888).unwrap();

    let vertices = polygon(3);
    assert_eq!(
        draw_vertices(&mut display, &target, Some(&texture), &vertices, None, Topology::TriangleList),
        1
    );

    display.notify_device_lost();
    let calls = recorder.calls();

    assert_eq!(
        draw_vertices(&mut display, &target, Some(&texture), &vertices, None, Topology::TriangleList),
        0
    );
    assert!(!use_shader(&mut display, &target, None));
    assert!(display.create_bitmap(4, 4, PixelFormat::Abgr8888).is_err());
    assert!(texture.lock(None, LockMode::ReadWrite).is_none());
    display.set_view(&rastrum::math::Transform::from_scale(2.0));
    assert_eq!(recorder.calls(), calls);

    assert!(display.notify_device_restored());
    assert_eq!(
        draw_vertices(&mut display, &target, Some(&texture), &vertices, None, Topology::TriangleList),
        1
    );

    display.destroy();
}

#[test]
fn gl_draws_into_framebuffers() {
    let system = System::new(settings()).unwrap();
    let (mut display, recorder) = gl(&system, 0x107);
    let target = display.create_bitmap(16, 16, PixelFormat::Abgr8888).unwrap();
    let vertices = polygon(4);

    let n = draw_vertices(&mut display, &target, None, &vertices, None, Topology::LineLoop);
    assert_eq!(n, 4);

    let draws = recorder.draws();
    assert_eq!(draws.len(), 1);
    assert_eq!(draws[0].topology, Topology::LineLoop);
    assert!(draws[0].target.is_some());
    assert_eq!(recorder.live_framebuffers(), 1);

    // Sub-bitmaps render through the framebuffer of their root.
    let sub = target.sub_bitmap(4, 4, 8, 8).unwrap();
    draw_vertices(&mut display, &sub, None, &vertices, None, Topology::PointList);
    assert_eq!(recorder.live_framebuffers(), 1);
    assert_eq!(recorder.draws()[1].target, draws[0].target);

    display.destroy();
    assert_eq!(recorder.live_framebuffers(), 0);
    assert_eq!(recorder.live_textures(), 0);
}

#[test]
fn incomplete_framebuffers_fall_back_to_software() {
    let system = System::new(settings()).unwrap();
    let (mut display, recorder) = gl(&system, 0x108);
    recorder.set_incomplete_framebuffers(true);

    let target = display.create_bitmap(4, 4, PixelFormat::Abgr8888).unwrap();
    let quad = [
        Vertex::new(0.0, 0.0, 0.0, 0.0, Color::green()),
        Vertex::new(4.0, 0.0, 0.0, 0.0, Color::green()),
        Vertex::new(4.0, 4.0, 0.0, 0.0, Color::green()),
        Vertex::new(0.0, 4.0, 0.0, 0.0, Color::green()),
    ];

    let n = draw_vertices(&mut display, &target, None, &quad, None, Topology::TriangleFan);
    assert_eq!(n, 2);
    assert!(recorder.draws().is_empty());
    assert_eq!(recorder.live_framebuffers(), 0);
    for y in 0..4 {
        for x in 0..4 {
            assert_eq!(target.get_pixel(x, y), Some(Color::green()));
        }
    }

    display.destroy();
}

#[test]
fn software_displays_rasterize() {
    let system = System::new(settings()).unwrap();
    let mut display = Display::new(&system, Backend::Software, DisplayParams::default()).unwrap();
    display.set_blender(Blender::new(BlendOp::Add, BlendFactor::One, BlendFactor::Zero));

    let target = Bitmap::memory(8, 8, PixelFormat::Abgr8888);
    let texture = Bitmap::memory(2, 2, PixelFormat::Abgr8888);
    assert!(texture.put_pixel(0, 0, Color::red()));
    assert!(texture.put_pixel(1, 0, Color::blue()));
    assert!(texture.put_pixel(0, 1, Color::blue()));
    assert!(texture.put_pixel(1, 1, Color::red()));

    // Texcoords span the texture four times, so sampling repeats.
    let quad = [
        Vertex::new(0.0, 0.0, 0.0, 0.0, Color::white()),
        Vertex::new(8.0, 0.0, 8.0, 0.0, Color::white()),
        Vertex::new(8.0, 8.0, 8.0, 8.0, Color::white()),
        Vertex::new(0.0, 8.0, 0.0, 8.0, Color::white()),
    ];

    let indices = [0, 1, 2, 0, 2, 3];
    let n = draw_vertices(&mut display, &target, Some(&texture), &quad, Some(&indices), Topology::TriangleList);
    assert_eq!(n, 2);

    for y in 0..8 {
        for x in 0..8 {
            let expected = if (x + y) % 2 == 0 { Color::red() } else { Color::blue() };
            assert_eq!(target.get_pixel(x, y), Some(expected), "({}, {})", x, y);
        }
    }

    display.destroy();
}

#[test]
fn gl_sub_bitmaps_draw_at_their_offset() {
    let system = System::new(settings()).unwrap();
    let (mut display, recorder) = gl(&system, 0x10a);
    let root = display.create_bitmap(8, 4, PixelFormat::Abgr8888).unwrap();
    let sub = root.sub_bitmap(4, 2, 2, 2).unwrap();

    let point = [Vertex::new(0.5, 0.5, 0.0, 0.0, Color::white())];
    assert_eq!(draw_vertices(&mut display, &sub, None, &point, None, Topology::PointList), 1);

    let call = &recorder.draws()[0];
    assert_eq!(call.viewport, Some(Viewport::new(4, 2, 2, 2)));
    // Framebuffer rows are texture rows, which hold the top of the bitmap first.
    let at = landing(call, 0.5, 0.5);
    assert!(close(at, (4.5, 2.5)), "{:?}", at);

    // The whole root gets a viewport of its own size.
    assert_eq!(draw_vertices(&mut display, &root, None, &point, None, Topology::PointList), 1);
    let call = &recorder.draws()[1];
    assert_eq!(call.viewport, Some(Viewport::new(0, 0, 8, 4)));
    assert!(close(landing(call, 0.5, 0.5), (0.5, 0.5)));

    assert_eq!(recorder.viewport(), Some(Viewport::new(0, 0, display.width(), display.height())));
    display.destroy();
}

#[test]
fn d3d_sub_bitmaps_draw_at_their_offset() {
    let system = System::new(settings()).unwrap();
    let (mut display, recorder) = d3d(&system, 0x10b, (3, 0), true);
    let root = display.create_bitmap(8, 4, PixelFormat::Argb8888).unwrap();
    let sub = root.sub_bitmap(4, 2, 2, 2).unwrap();

    let point = [Vertex::new(0.5, 0.5, 0.0, 0.0, Color::white())];
    assert_eq!(draw_vertices(&mut display, &sub, None, &point, None, Topology::PointList), 1);

    let call = &recorder.draws()[0];
    assert_eq!(call.viewport, Some(Viewport::new(4, 2, 2, 2)));
    // Direct3D viewports count rows from the top, so mirror the row inside it.
    let (x, y) = landing(call, 0.5, 0.5);
    let row = 2.0 * 2.0 + 2.0 - y;
    assert!(close((x, row), (4.5, 2.5)), "{:?}", (x, row));

    assert_eq!(recorder.viewport(), Some(Viewport::new(0, 0, display.width(), display.height())));
    display.destroy();
}

#[test]
fn textured_strips_keep_texel_positions() {
    let system = System::new(settings()).unwrap();
    let mut display = Display::new(&system, Backend::Software, DisplayParams::default()).unwrap();
    display.set_blender(Blender::new(BlendOp::Add, BlendFactor::One, BlendFactor::Zero));

    let texture = Bitmap::memory(2, 2, PixelFormat::Abgr8888);
    let texels = [Color::red(), Color::green(), Color::blue(), Color::white()];
    for (i, &c) in texels.iter().enumerate() {
        assert!(texture.put_pixel(i as u32 % 2, i as u32 / 2, c));
    }

    let decl = VertexDecl::new(
        &[
            VertexElement::new(Attribute::Position, Storage::Float2, 0),
            VertexElement::new(Attribute::TexCoord, Storage::Float2, 8),
            VertexElement::new(Attribute::Color, Storage::Float4, 16),
        ],
        32,
    )
    .unwrap();

    let mut data = Vec::new();
    for &(x, y, u, v) in &[(0.0f32, 0.0f32, 0.0f32, 0.0f32), (2.0, 0.0, 1.0, 0.0), (0.0, 2.0, 0.0, 1.0), (2.0, 2.0, 1.0, 1.0)] {
        for c in &[x, y, u, v, 1.0, 1.0, 1.0, 1.0] {
            data.extend_from_slice(&c.to_bits().to_ne_bytes());
        }
    }

    let target = Bitmap::memory(2, 2, PixelFormat::Abgr8888);
    let n = draw_prim(&mut display, &target, Some(&texture), &data, Some(&decl), None, Topology::TriangleStrip);
    assert_eq!(n, 2);

    for (i, &c) in texels.iter().enumerate() {
        let (x, y) = (i as u32 % 2, i as u32 / 2);
        assert_eq!(target.get_pixel(x, y), Some(c), "({}, {})", x, y);
    }

    display.destroy();
}
