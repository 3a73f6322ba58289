//! Hardware smoke tests for the optical flow engine.
//!
//! Run with `cargo test -- --ignored` on a machine with an NVIDIA
//! Turing-or-newer GPU and a driver that ships `libnvidia-opticalflow.so`.

use std::sync::Arc;

use flowviz_core::types::{
    BufferDescriptor, BufferFormat, BufferUsage, OutputGridSize, VectorField,
};
use flowviz_nvof::{DeviceBuffer, ExecuteOptions, FlowSession, FlowSessionConfig, GpuContext, OfBinding};

fn open_session() -> (Arc<OfBinding>, Arc<GpuContext>, FlowSession) {
    let binding = OfBinding::load().expect("driver binding");
    let gpu = GpuContext::new(0).expect("GPU context");
    let session = FlowSession::open(binding.clone(), gpu.clone()).expect("session open");
    (binding, gpu, session)
}

#[test]
#[ignore = "requires NVIDIA Turing+ GPU with optical flow driver"]
fn session_open_caps_and_drop() {
    let (_binding, _gpu, session) = open_session();
    let caps = session.caps_summary().expect("caps");
    assert!(caps.output_grids.contains(&1) || caps.output_grids.contains(&4));
    assert!(caps.width_max >= 1920);
    assert!(caps.height_max >= 1080);
    // Drop destroys the session; repeated open/drop must not leak handles.
    drop(session);
    let (_b, _g, again) = open_session();
    drop(again);
}

#[test]
#[ignore = "requires NVIDIA Turing+ GPU with optical flow driver"]
fn buffer_upload_download_round_trip() {
    let (_binding, _gpu, mut session) = open_session();
    let config = FlowSessionConfig {
        width: 256,
        height: 128,
        ..Default::default()
    };
    session.initialize(&config).expect("init");
    let session = Arc::new(session);

    let desc = BufferDescriptor {
        width: 256,
        height: 128,
        usage: BufferUsage::Input,
        format: BufferFormat::Abgr8,
    };
    let buffer = DeviceBuffer::create(session.clone(), desc).expect("buffer");

    let pattern: Vec<u8> = (0..buffer.required_host_bytes())
        .map(|i| (i % 251) as u8)
        .collect();
    buffer.upload(&pattern).expect("upload");

    let mut readback = vec![0u8; buffer.required_host_bytes()];
    buffer.download(&mut readback).expect("download");
    assert_eq!(pattern, readback);
}

#[test]
#[ignore = "requires NVIDIA Turing+ GPU with optical flow driver"]
fn full_hd_execute_produces_vector_field() {
    let (_binding, _gpu, mut session) = open_session();
    let config = FlowSessionConfig::default();
    session.initialize(&config).expect("init");
    let session = Arc::new(session);

    let frame_desc = BufferDescriptor {
        width: 1920,
        height: 1080,
        usage: BufferUsage::Input,
        format: BufferFormat::Abgr8,
    };
    let input = DeviceBuffer::create(session.clone(), frame_desc).expect("input buffer");
    let reference = DeviceBuffer::create(session.clone(), frame_desc).expect("reference buffer");

    let (out_w, out_h) = VectorField::output_dims(1920, 1080, OutputGridSize::Grid4);
    let output = DeviceBuffer::create(
        session.clone(),
        BufferDescriptor {
            width: out_w,
            height: out_h,
            usage: BufferUsage::Output,
            format: BufferFormat::Short2,
        },
    )
    .expect("output buffer");

    // A flat frame against a shifted copy: the engine should find motion.
    let mut frame_a = vec![0u8; input.required_host_bytes()];
    let mut frame_b = vec![0u8; input.required_host_bytes()];
    for y in 0..1080usize {
        for x in 0..1920usize {
            let lum = if (x / 64 + y / 64) % 2 == 0 { 230 } else { 20 };
            let idx = (y * 1920 + x) * 4;
            frame_a[idx..idx + 4].copy_from_slice(&[255, lum, lum, lum]);
            let shifted = ((x + 8) % 1920, y);
            let idx_b = (shifted.1 * 1920 + shifted.0) * 4;
            frame_b[idx_b..idx_b + 4].copy_from_slice(&[255, lum, lum, lum]);
        }
    }
    input.upload(&frame_a).expect("upload a");
    reference.upload(&frame_b).expect("upload b");

    session
        .execute(&input, &reference, &output, &ExecuteOptions::default())
        .expect("execute");

    let mut raw = vec![0u8; output.required_host_bytes()];
    output.download(&mut raw).expect("download");
    let field = VectorField::from_raw(out_w, out_h, &raw).expect("parse");
    assert_eq!((field.width(), field.height()), (480, 270));
    // At least some block should report non-zero motion.
    assert!(field.vectors().iter().any(|v| v.flow_x != 0 || v.flow_y != 0));
}
