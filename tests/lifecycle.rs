extern crate env_logger;
extern crate rastrum;

use std::thread;
use std::time::{Duration, Instant};

use rastrum::math::Color;
use rastrum::video::backends::headless::{HeadlessD3d, HeadlessGl, Recorder};
use rastrum::video::backends::Cooperative;
use rastrum::video::fbo::FboState;
use rastrum::video::prelude::*;

fn settings(max_fbos: usize, reset_timeout_ms: u64) -> VideoSettings {
    let _ = env_logger::try_init();
    VideoSettings {
        max_fbos,
        reset_timeout_ms,
        ..VideoSettings::default()
    }
}

fn gl(system: &System, id: u64) -> (Display, Recorder) {
    let device = HeadlessGl::new(id);
    let recorder = device.recorder();
    let display = Display::new(system, Backend::OpenGl(Box::new(device)), DisplayParams::default()).unwrap();
    (display, recorder)
}

fn d3d(system: &System, id: u64) -> (Display, Recorder) {
    let device = HeadlessD3d::new(id);
    let recorder = device.recorder();
    let display = Display::new(system, Backend::Direct3D(Box::new(device)), DisplayParams::default()).unwrap();
    (display, recorder)
}

fn point(display: &mut Display, target: &Bitmap) {
    let vertices = [Vertex::new(1.0, 1.0, 0.0, 0.0, Color::white())];
    assert_eq!(draw_vertices(display, target, None, &vertices, None, Topology::PointList), 1);
}

#[test]
fn not_reset_devices_are_reset_on_check() {
    let system = System::new(settings(8, 1000)).unwrap();
    let (mut display, recorder) = d3d(&system, 0x200);
    let epoch = display.epoch();

    assert_eq!(display.check_device(), DeviceState::Valid);
    assert_eq!(recorder.resets(), 0);

    recorder.set_cooperative(Cooperative::NotReset);
    assert_eq!(display.check_device(), DeviceState::Valid);
    assert_eq!(recorder.resets(), 1);
    assert_eq!(display.epoch(), epoch + 1);

    display.destroy();
}

#[test]
fn failed_resets_stay_lost() {
    let system = System::new(settings(8, 1000)).unwrap();
    let (mut display, recorder) = d3d(&system, 0x201);
    let target = display.backbuffer();

    recorder.set_cooperative(Cooperative::Lost);
    assert_eq!(display.check_device(), DeviceState::Lost);
    assert!(display.is_lost());

    recorder.set_cooperative(Cooperative::NotReset);
    recorder.set_fail_reset(true);
    assert_eq!(display.check_device(), DeviceState::Lost);

    let calls = recorder.calls();
    let vertices = [Vertex::new(1.0, 1.0, 0.0, 0.0, Color::white())];
    assert_eq!(draw_vertices(&mut display, &target, None, &vertices, None, Topology::PointList), 0);
    assert_eq!(recorder.calls(), calls);

    recorder.set_fail_reset(false);
    recorder.set_cooperative(Cooperative::Ok);
    assert_eq!(display.check_device(), DeviceState::Valid);
    assert!(!display.is_lost());

    display.destroy();
}

#[test]
fn resize_waits_for_a_reset_from_another_thread() {
    let system = System::new(settings(8, 5000)).unwrap();
    let (mut display, recorder) = gl(&system, 0x202);
    let target = display.create_bitmap(4, 4, PixelFormat::Abgr8888).unwrap();
    display.notify_device_lost();
    assert_eq!(display.state(), DeviceState::Lost);

    let signal = display.reset_signal();
    let handle = thread::spawn(move || {
        thread::sleep(Duration::from_millis(20));
        signal.complete();
    });

    let start = Instant::now();
    assert!(display.acknowledge_resize(320, 200));
    assert!(start.elapsed() < Duration::from_secs(5));
    handle.join().unwrap();

    assert_eq!((display.width(), display.height()), (320, 200));
    assert_eq!(display.backbuffer().width(), 320);

    // The display is usable again, not only resized.
    assert_eq!(display.state(), DeviceState::Valid);
    assert!(!display.is_lost());
    recorder.clear_draws();
    point(&mut display, &target);
    assert_eq!(recorder.draws().len(), 1);
    display.destroy();
}

#[test]
fn resize_polls_lost_d3d_devices() {
    let system = System::new(settings(8, 5000)).unwrap();
    let (mut display, recorder) = d3d(&system, 0x203);

    recorder.set_cooperative(Cooperative::Lost);
    assert_eq!(display.check_device(), DeviceState::Lost);

    let remote = recorder.clone();
    let handle = thread::spawn(move || {
        thread::sleep(Duration::from_millis(20));
        remote.set_cooperative(Cooperative::NotReset);
    });

    assert!(display.acknowledge_resize(640, 480));
    handle.join().unwrap();

    assert_eq!(display.state(), DeviceState::Valid);
    assert_eq!(recorder.resets(), 1);
    assert_eq!(display.width(), 640);
    assert!(!display.acknowledge_resize(0, 480));

    display.destroy();
}

#[test]
fn render_targets_own_their_framebuffers() {
    let system = System::new(settings(8, 1000)).unwrap();
    let (mut display, recorder) = gl(&system, 0x204);
    let target = display.create_bitmap(32, 16, PixelFormat::Abgr8888).unwrap();

    let fbo = display.create_render_target(&target, true).unwrap();
    assert_eq!(recorder.live_framebuffers(), 1);
    assert_eq!(recorder.live_depth_buffers(), 1);

    let info = display.fbos().find(target.storage_id()).unwrap();
    assert_eq!(info.fbo, fbo);
    assert_eq!(info.state, FboState::Persistent);
    assert!(info.depth_buffer.is_some());

    // Drawing goes through the same framebuffer.
    point(&mut display, &target);
    assert_eq!(recorder.draws()[0].target, Some(fbo));
    assert_eq!(recorder.live_framebuffers(), 1);

    display.destroy_bitmap(target);
    assert_eq!(recorder.live_framebuffers(), 0);
    assert_eq!(recorder.live_depth_buffers(), 0);
    assert_eq!(recorder.live_textures(), 0);

    let backbuffer = display.backbuffer();
    assert!(display.create_render_target(&backbuffer, false).is_err());

    display.destroy();
}

#[test]
fn render_targets_need_opengl() {
    let system = System::new(settings(8, 1000)).unwrap();
    let (mut display, _) = d3d(&system, 0x205);
    let target = display.create_bitmap(8, 8, PixelFormat::Abgr8888).unwrap();

    match display.create_render_target(&target, false) {
        Err(VideoError::BackendMismatch(BackendKind::OpenGl, BackendKind::Direct3D)) => {}
        other => panic!("unexpected {:?}", other),
    }

    display.destroy();
}

#[test]
fn transient_framebuffers_are_stolen_least_recently_used() {
    let system = System::new(settings(2, 1000)).unwrap();
    let (mut display, recorder) = gl(&system, 0x206);
    assert_eq!(display.fbos().capacity(), 2);

    let a = display.create_bitmap(4, 4, PixelFormat::Abgr8888).unwrap();
    let b = display.create_bitmap(4, 4, PixelFormat::Abgr8888).unwrap();
    let c = display.create_bitmap(4, 4, PixelFormat::Abgr8888).unwrap();

    point(&mut display, &a);
    point(&mut display, &b);
    point(&mut display, &a);
    point(&mut display, &c);

    // `b` was used least recently.
    assert!(display.fbos().find(b.storage_id()).is_none());
    assert!(display.fbos().find(a.storage_id()).is_some());
    assert!(display.fbos().find(c.storage_id()).is_some());
    assert_eq!(recorder.live_framebuffers(), 2);

    assert!(display.persist_render_target(&a));
    assert!(display.persist_render_target(&c));
    assert!(!display.persist_render_target(&b));

    // Every entry is persistent now, nothing is left to steal.
    recorder.clear_draws();
    let vertices = [Vertex::new(1.0, 1.0, 0.0, 0.0, Color::white())];
    assert_eq!(draw_vertices(&mut display, &b, None, &vertices, None, Topology::PointList), 0);
    assert!(recorder.draws().is_empty());
    assert!(display.fbos().find(b.storage_id()).is_none());

    display.destroy_bitmap(a);
    point(&mut display, &b);
    assert_eq!(recorder.draws().len(), 1);
    assert!(display.fbos().find(b.storage_id()).is_some());

    display.destroy();
    assert_eq!(recorder.live_framebuffers(), 0);
}

#[test]
fn loss_forgets_framebuffers_and_textures() {
    let system = System::new(settings(8, 1000)).unwrap();
    let (mut display, recorder) = gl(&system, 0x207);
    let target = display.create_bitmap(4, 4, PixelFormat::Abgr8888).unwrap();
    point(&mut display, &target);

    let epoch = display.epoch();
    display.notify_device_lost();
    display.notify_device_lost();
    assert_eq!(display.epoch(), epoch + 1);
    assert!(display.create_bitmap(4, 4, PixelFormat::Abgr8888).is_err());

    assert!(display.notify_device_restored());
    recorder.clear_draws();
    point(&mut display, &target);
    assert_eq!(recorder.draws().len(), 1);

    display.destroy();
}
