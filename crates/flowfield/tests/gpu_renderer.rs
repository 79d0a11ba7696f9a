//! Headless runs of the shader-based wind renderer.
//!
//! Every test prints SKIP and returns when the machine has no usable adapter.

use flowfield::gpu::{GpuWindRenderer, ParticleStateTexture};
use flowfield::viewport::GeoExtent;
use flowfield::{
    EngineConfig, FieldError, GpuConfig, GridHeader, GridRecord, HolePolicy, IntensityRamp, VectorField,
};
use glam::{DVec2, Vec2};

const TARGET_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;
const SIZE: (u32, u32) = (64, 64);

async fn create_test_device() -> Option<(wgpu::Device, wgpu::Queue)> {
    let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::default());
    let adapter = instance
        .request_adapter(&wgpu::RequestAdapterOptions::default())
        .await
        .ok()?;
    adapter
        .request_device(&wgpu::DeviceDescriptor {
            label: Some("wind test device"),
            required_limits: wgpu::Limits::downlevel_defaults(),
            ..Default::default()
        })
        .await
        .ok()
}

/// Uniform eastward wind over lon 0..10, lat 0..10.
fn breeze(width: usize, height: usize) -> VectorField {
    let header = GridHeader::new(DVec2::new(0.0, 10.0), DVec2::new(10.0 / (width - 1) as f64, -10.0 / (height - 1) as f64), width, height);
    let n = width * height;
    let u = GridRecord::new(header.with_parameter(2, 2), vec![Some(10.0); n]).unwrap();
    let v = GridRecord::new(header.with_parameter(2, 3), vec![Some(0.0); n]).unwrap();
    VectorField::build(&u, &v, HolePolicy::Strict).unwrap()
}

fn config() -> GpuConfig {
    GpuConfig {
        state_texture_side: 16,
        drop_rate: 0.0,
        drop_rate_bump: 0.0,
        ..GpuConfig::default()
    }
}

fn extent() -> GeoExtent {
    GeoExtent {
        min: DVec2::new(0.0, 0.0),
        max: DVec2::new(10.0, 10.0),
    }
}

fn target(device: &wgpu::Device, width: u32, height: u32) -> wgpu::TextureView {
    device
        .create_texture(&wgpu::TextureDescriptor {
            label: Some("wind test target"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: TARGET_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        })
        .create_view(&Default::default())
}

fn renderer(device: &wgpu::Device, queue: &wgpu::Queue, field: &VectorField) -> GpuWindRenderer {
    let ramp = IntensityRamp::from_config(&EngineConfig::default());
    GpuWindRenderer::new(device, queue, field, &ramp, config(), TARGET_FORMAT, SIZE).unwrap()
}

/// Share of particles whose position moved by `expected` within quantisation error.
fn advected_share(before: &ParticleStateTexture, after: &ParticleStateTexture, expected: Vec2) -> f32 {
    let moved = (0..before.len())
        .filter(|&i| (after.position(i) - before.position(i) - expected).abs().max_element() < 1e-4)
        .count();
    moved as f32 / before.len() as f32
}

#[test]
fn test_frames_advect_state_and_alternate_textures() {
    pollster::block_on(async {
        let Some((device, queue)) = create_test_device().await else {
            println!("SKIP: No GPU adapter available");
            return;
        };
        let mut renderer = renderer(&device, &queue, &breeze(11, 11));
        let view = target(&device, SIZE.0, SIZE.1);
        assert_eq!(renderer.particle_count(), 256);

        let before = renderer.read_state(&device, &queue).unwrap();
        assert_eq!(renderer.state_read_index(), 0);

        renderer.render(&device, &queue, &view, &extent());
        assert_eq!(renderer.state_read_index(), 1);
        let after = renderer.read_state(&device, &queue).unwrap();
        assert_ne!(before.pixels, after.pixels);

        // 10 m/s east over a square 64px view: 64 * k * 10 / 64 of the width per frame.
        let k = config().velocity_scale_factor * config().speed_scale;
        let share = advected_share(&before, &after, Vec2::new(10.0 * k, 0.0));
        assert!(share > 0.9, "only {share} of particles advected");

        renderer.render(&device, &queue, &view, &extent());
        assert_eq!(renderer.state_read_index(), 0);
        let third = renderer.read_state(&device, &queue).unwrap();
        assert_ne!(after.pixels, third.pixels);
    });
}

#[test]
fn test_resize_and_new_field_rebind_resources() {
    pollster::block_on(async {
        let Some((device, queue)) = create_test_device().await else {
            println!("SKIP: No GPU adapter available");
            return;
        };
        let mut renderer = renderer(&device, &queue, &breeze(11, 11));
        renderer.render(&device, &queue, &target(&device, SIZE.0, SIZE.1), &extent());

        renderer.resize(&device, 96, 48).unwrap();
        assert_eq!(renderer.size(), (96, 48));
        renderer.set_field(&device, &queue, &breeze(21, 6));
        let view = target(&device, 96, 48);
        let before = renderer.read_state(&device, &queue).unwrap();
        renderer.render(&device, &queue, &view, &extent());
        renderer.render(&device, &queue, &view, &extent());
        let after = renderer.read_state(&device, &queue).unwrap();
        assert_eq!(after.len(), 256);
        assert_ne!(before.pixels, after.pixels);
    });
}

#[test]
fn test_oversized_targets_are_unavailable() {
    pollster::block_on(async {
        let Some((device, queue)) = create_test_device().await else {
            println!("SKIP: No GPU adapter available");
            return;
        };
        let mut renderer = renderer(&device, &queue, &breeze(11, 11));
        let limit = device.limits().max_texture_dimension_2d;
        assert!(matches!(
            renderer.resize(&device, limit + 1, 4),
            Err(FieldError::ResourceUnavailable(_))
        ));
        assert_eq!(renderer.size(), SIZE);

        let ramp = IntensityRamp::from_config(&EngineConfig::default());
        let oversized = GpuWindRenderer::new(
            &device,
            &queue,
            &breeze(11, 11),
            &ramp,
            config(),
            TARGET_FORMAT,
            (limit + 1, 4),
        );
        assert!(matches!(oversized, Err(FieldError::ResourceUnavailable(_))));
    });
}
