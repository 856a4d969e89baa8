extern crate env_logger;
extern crate rand;
extern crate rastrum;

use rand::prng::XorShiftRng;
use rand::{Rng, SeedableRng};

use rastrum::math;
use rastrum::video::backends::headless::{HeadlessD3d, HeadlessGl, Recorder};
use rastrum::video::backends::UniformData;
use rastrum::video::prelude::*;
use rastrum::video::shader::{default_shader_source, source, ShaderState};

const VERTEX: &str = "attribute vec4 al_pos;
attribute vec4 al_color;
uniform mat4 al_projview_matrix;
uniform float u_scale;
uniform vec2 u_offset;
void main() {}
";

const PIXEL: &str = "uniform bool al_use_tex;
uniform int u_mode;
void main() {}
";

fn gl_display(system: &System, id: u64) -> (Display, Recorder) {
    let _ = env_logger::try_init();

    let gl = HeadlessGl::new(id);
    let recorder = gl.recorder();
    let display = Display::new(system, Backend::OpenGl(Box::new(gl)), DisplayParams::default()).unwrap();
    (display, recorder)
}

fn d3d_display(system: &System, id: u64) -> (Display, Recorder) {
    let _ = env_logger::try_init();

    let d3d = HeadlessD3d::new(id);
    let recorder = d3d.recorder();
    let display = Display::new(system, Backend::Direct3D(Box::new(d3d)), DisplayParams::default()).unwrap();
    (display, recorder)
}

fn build(display: &mut Display, platform: ShaderPlatform, vs: &str, ps: &str) -> Shader {
    let mut shader = Shader::create(display, platform).unwrap();
    assert!(shader.attach_source(display, ShaderStage::Vertex, Some(vs)));
    assert!(shader.attach_source(display, ShaderStage::Pixel, Some(ps)));
    assert!(shader.build(display), "{}", shader.log());
    shader
}

#[test]
fn deferred_uniforms_replay_latest_values() {
    let system = System::new(VideoSettings::default()).unwrap();
    let (mut display, recorder) = gl_display(&system, 0x10);
    let target = display.backbuffer();

    let mut shader = build(&mut display, ShaderPlatform::Glsl, VERTEX, PIXEL);
    assert!(use_shader(&mut display, &target, Some(&mut shader)));
    let program = recorder.current_program();

    // Bind the default shader, so every write below is queued.
    assert!(use_shader(&mut display, &target, None));
    assert_ne!(recorder.current_program(), program);

    let mut rng = XorShiftRng::from_seed([7; 16]);
    let mut scale = None;
    let mut mode = None;
    let mut offset = None;

    for _ in 0..64 {
        match rng.gen_range(0, 3) {
            0 => {
                let v = rng.gen_range(-10.0, 10.0);
                assert!(shader.set_float(&mut display, "u_scale", v));
                scale = Some(v);
            }
            1 => {
                let v = rng.gen_range(0, 8);
                assert!(shader.set_int(&mut display, "u_mode", v));
                mode = Some(v);
            }
            _ => {
                let v = [rng.gen_range(0.0, 1.0), rng.gen_range(0.0, 1.0)];
                assert!(shader.set_float_vector(&mut display, "u_offset", 2, &v, 1));
                offset = Some(v);
            }
        }
    }

    assert!(!shader.set_float(&mut display, "u_missing", 1.0));
    assert_eq!(recorder.uniform(program, "u_scale"), None);

    assert!(use_shader(&mut display, &target, Some(&mut shader)));
    assert_eq!(recorder.uniform(program, "u_scale"), scale.map(UniformData::Float));
    assert_eq!(recorder.uniform(program, "u_mode"), mode.map(UniformData::Int));
    assert_eq!(
        recorder.uniform(program, "u_offset"),
        offset.map(|v| UniformData::FloatVector(2, v.to_vec()))
    );

    shader.destroy(&mut display);
    display.destroy();
}

#[test]
fn glsl_objects_are_released() {
    let system = System::new(VideoSettings::default()).unwrap();
    let (mut display, recorder) = gl_display(&system, 0x11);
    let target = display.backbuffer();

    let mut shader = build(&mut display, ShaderPlatform::Auto, VERTEX, PIXEL);
    assert_eq!(shader.platform(), ShaderPlatform::Glsl);
    assert_eq!(shader.state(), ShaderState::Linked);
    assert_eq!(recorder.live_programs(), 1);

    assert!(use_shader(&mut display, &target, Some(&mut shader)));
    assert_eq!(current_shader(&target), Some(shader.id()));

    let program = recorder.current_program();
    let projview = math::flatten(&display.projview());
    assert_eq!(
        recorder.uniform(program, "al_projview_matrix"),
        Some(UniformData::Matrix(projview))
    );

    shader.destroy(&mut display);
    assert_eq!(current_shader(&target), None);
    assert_eq!(display.active_shader(), None);

    display.destroy();
    assert_eq!(recorder.live_shaders(), 0);
    assert_eq!(recorder.live_programs(), 0);
}

#[test]
fn failed_compiles_keep_the_linked_program() {
    let system = System::new(VideoSettings::default()).unwrap();
    let (mut display, recorder) = gl_display(&system, 0x12);

    let mut shader = build(&mut display, ShaderPlatform::Glsl, VERTEX, PIXEL);
    assert!(!shader.attach_source(&mut display, ShaderStage::Pixel, Some("#error nope\n")));
    assert!(shader.log().contains("#error"));
    assert_eq!(shader.source(ShaderStage::Pixel), Some(PIXEL));
    assert_eq!(recorder.live_programs(), 1);

    shader.destroy(&mut display);
    display.destroy();
}

#[test]
fn default_shader_is_created_once_and_evicted_on_loss() {
    let system = System::new(VideoSettings::default()).unwrap();
    let (mut display, recorder) = gl_display(&system, 0x13);
    let target = display.backbuffer();

    assert!(use_shader(&mut display, &target, None));
    let first = display.default_shader().unwrap();
    assert_eq!(display.active_shader(), Some(first));
    assert!(use_shader(&mut display, &target, None));
    assert_eq!(display.default_shader(), Some(first));
    assert_eq!(recorder.live_programs(), 1);

    display.notify_device_lost();
    assert_eq!(display.default_shader(), None);
    assert!(!use_shader(&mut display, &target, None));

    assert!(display.notify_device_restored());
    assert!(use_shader(&mut display, &target, None));
    assert_ne!(display.default_shader(), Some(first));

    display.destroy();
}

#[test]
fn stale_glsl_handles_need_a_rebuild() {
    let system = System::new(VideoSettings::default()).unwrap();
    let (mut display, recorder) = gl_display(&system, 0x14);
    let target = display.backbuffer();

    let mut shader = build(&mut display, ShaderPlatform::Glsl, VERTEX, PIXEL);
    display.notify_device_lost();
    let calls = recorder.calls();
    assert!(!shader.set_int(&mut display, "u_mode", 1));
    assert_eq!(recorder.calls(), calls);

    display.notify_device_restored();
    assert!(!use_shader(&mut display, &target, Some(&mut shader)));
    assert_eq!(shader.state(), ShaderState::Unlinked);

    assert!(shader.attach_source(&mut display, ShaderStage::Vertex, Some(VERTEX)));
    assert!(shader.attach_source(&mut display, ShaderStage::Pixel, Some(PIXEL)));
    assert!(shader.build(&mut display));
    assert!(use_shader(&mut display, &target, Some(&mut shader)));

    shader.destroy(&mut display);
    display.destroy();
}

#[test]
fn hlsl_effects_follow_the_device() {
    let system = System::new(VideoSettings::default()).unwrap();
    let (mut display, recorder) = d3d_display(&system, 0x20);
    let target = display.backbuffer();

    let vs = default_shader_source(ShaderPlatform::Hlsl, ShaderStage::Vertex).unwrap();
    let ps = default_shader_source(ShaderPlatform::Hlsl, ShaderStage::Pixel).unwrap();
    let mut shader = build(&mut display, ShaderPlatform::Hlsl, vs, ps);
    assert_eq!(recorder.live_effects(), 1);

    assert!(use_shader(&mut display, &target, Some(&mut shader)));
    assert!(shader.set_bool(&mut display, "al_use_tex", false));
    assert!(!shader.set_bool(&mut display, "u_missing", false));

    display.notify_device_lost();
    assert!(!use_shader(&mut display, &target, Some(&mut shader)));
    assert!(display.notify_device_restored());
    assert!(use_shader(&mut display, &target, Some(&mut shader)));
    assert_eq!(recorder.live_effects(), 1);

    shader.destroy(&mut display);
    assert_eq!(recorder.live_effects(), 0);
    display.destroy();
}

#[test]
fn dropped_hlsl_shaders_stop_following_the_device() {
    let system = System::new(VideoSettings::default()).unwrap();
    let vs = default_shader_source(ShaderPlatform::Hlsl, ShaderStage::Vertex).unwrap();
    let ps = default_shader_source(ShaderPlatform::Hlsl, ShaderStage::Pixel).unwrap();

    // Device calls made by a loss and a reset.
    let cycle = |display: &mut Display, recorder: &Recorder| {
        let calls = recorder.calls();
        display.notify_device_lost();
        assert!(display.notify_device_restored());
        recorder.calls() - calls
    };

    let (mut destroyed, destroyed_recorder) = d3d_display(&system, 0x21);
    let mut shader = build(&mut destroyed, ShaderPlatform::Hlsl, vs, ps);
    shader.destroy(&mut destroyed);
    let expected = cycle(&mut destroyed, &destroyed_recorder);

    let (mut dropped, dropped_recorder) = d3d_display(&system, 0x22);
    let shader = build(&mut dropped, ShaderPlatform::Hlsl, vs, ps);
    drop(shader);

    // The first cycle lets the callbacks notice the shader is gone.
    cycle(&mut dropped, &dropped_recorder);
    assert_eq!(cycle(&mut dropped, &dropped_recorder), expected);

    // Only `destroy` releases the effect.
    assert_eq!(dropped_recorder.live_effects(), 1);
    dropped.destroy();
    destroyed.destroy();
}

#[test]
fn platforms_resolve_against_the_display() {
    let system = System::new(VideoSettings::default()).unwrap();
    let (mut gl, _) = gl_display(&system, 0x30);
    let (mut d3d, _) = d3d_display(&system, 0x31);

    assert!(Shader::create(&mut gl, ShaderPlatform::Hlsl).is_none());
    assert!(Shader::create(&mut gl, ShaderPlatform::Cg).is_none());
    assert!(Shader::create(&mut d3d, ShaderPlatform::Glsl).is_none());

    let mut minimal = Shader::create(&mut d3d, ShaderPlatform::AutoMinimal).unwrap();
    assert_eq!(minimal.platform(), ShaderPlatform::HlslMinimal);
    minimal.destroy(&mut d3d);

    assert_eq!(
        default_shader_source(ShaderPlatform::Glsl, ShaderStage::Vertex),
        Some(source::GLSL_VERTEX)
    );
    assert!(default_shader_source(ShaderPlatform::Auto, ShaderStage::Vertex).is_none());

    gl.destroy();
    d3d.destroy();
}
