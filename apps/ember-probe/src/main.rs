//! Ember device probe
//!
//! Builds a headless GPU context and reports the device, queue families and
//! queue requests Ember selects on this machine.
//!
//! ## Usage
//!
//! ```bash
//! cargo run -p ember-probe -- [OPTIONS]
//! ```
//!
//! ## Options
//!
//! - `--validation`: Enable validation layers
//! - `--no-validation`: Disable validation layers (default in release builds)
//! - `--fail-fast`: Abort selection at the first device that does not conform
//! - `--smoke`: Upload a small buffer and allocate descriptor sets on the device
//! - `-h, --help`: Print help message
//!
//! ## Environment Variables
//!
//! - `RUST_LOG`: Set log level (e.g., info, debug, trace)

use anyhow::Context as _;
use ash::vk;
use ember_core::scalars_to_vectors;
use ember_gpu::{
    DescriptorAllocatorConfig, DescriptorSetLayoutBuilder, DeviceRequirements, GpuContext,
    GpuContextBuilder, GrowableDescriptorAllocator, ImmediateSubmit, QueuePurpose,
    SelectionPolicy,
};
use tracing_subscriber::EnvFilter;

/// Command line options.
#[derive(Debug, Clone, Copy)]
struct ProbeOptions {
    validation: bool,
    policy: SelectionPolicy,
    smoke: bool,
}

impl ProbeOptions {
    fn from_args() -> Self {
        let mut options = Self {
            validation: cfg!(debug_assertions),
            policy: SelectionPolicy::FirstConforming,
            smoke: false,
        };

        for arg in std::env::args().skip(1) {
            match arg.as_str() {
                "--validation" => options.validation = true,
                "--no-validation" => options.validation = false,
                "--fail-fast" => options.policy = SelectionPolicy::FailFast,
                "--smoke" => options.smoke = true,
                other => tracing::warn!("Ignoring unknown argument {other}"),
            }
        }

        options
    }
}

fn main() -> anyhow::Result<()> {
    if std::env::args().any(|arg| arg == "-h" || arg == "--help") {
        print_help();
        return Ok(());
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let options = ProbeOptions::from_args();

    let gpu = GpuContextBuilder::new()
        .app_name("ember-probe")
        .validation(options.validation)
        .requirements(DeviceRequirements::headless().policy(options.policy))
        .build()
        .context("failed to create GPU context")?;

    report(&gpu);

    if options.smoke {
        smoke_test(&gpu).context("device smoke test failed")?;
    }

    gpu.memory_tracker().log_summary();
    Ok(())
}

fn report(gpu: &GpuContext) {
    tracing::info!("Device: {}", gpu.device_summary());
    tracing::info!("Queue families: {}", gpu.queue_assignment());

    for request in gpu.logical_device().requests() {
        tracing::info!(
            "Family {}: {} queue(s) for {:?}",
            request.family,
            request.queue_count,
            request.purposes,
        );
    }

    for purpose in QueuePurpose::ALL {
        match gpu.queue(purpose) {
            Ok(queue) => tracing::info!("{purpose} queue: {queue:?}"),
            Err(_) => tracing::info!("{purpose} queue: not assigned"),
        }
    }
}

/// Upload a triangle through a staging buffer and allocate descriptor sets
/// until the allocator has to grow.
fn smoke_test(gpu: &GpuContext) -> anyhow::Result<()> {
    let device = gpu.device();
    let family = gpu.queue_family(QueuePurpose::Transfer)?;
    let queue = gpu.queue(QueuePurpose::Transfer)?;

    let positions: Vec<[f32; 3]> =
        scalars_to_vectors(&[0.0, -0.5, 0.0, 0.5, 0.5, 0.0, -0.5, 0.5, 0.0])?;

    unsafe {
        let submit = ImmediateSubmit::new(device, family)?;
        let uploaded = gpu.allocator().lock().upload_to_device_local(
            &submit,
            queue,
            &positions,
            vk::BufferUsageFlags::VERTEX_BUFFER,
            "probe-triangle",
        );
        submit.destroy(device);
        let mut buffer = uploaded?;
        tracing::info!("Uploaded {} bytes", buffer.size);
        gpu.allocator().lock().free_buffer(&mut buffer)?;

        let layout = DescriptorSetLayoutBuilder::new()
            .storage_buffer(0, vk::ShaderStageFlags::COMPUTE)
            .build(device)?;

        let mut descriptors = GrowableDescriptorAllocator::new(
            DescriptorAllocatorConfig::default().initial_sets(8),
            gpu.memory_tracker(),
        );
        let allocated = (0..32).try_for_each(|_| descriptors.allocate(device, layout).map(drop));
        tracing::info!(
            "Descriptor pools after 32 sets: {} ({} retired)",
            descriptors.pool_count(),
            descriptors.used_count()
        );
        let cleared = descriptors.clear_pools(device);
        descriptors.destroy_pools(device);
        device.destroy_descriptor_set_layout(layout, None);
        allocated?;
        cleared?;
    }

    Ok(())
}

fn print_help() {
    eprintln!(
        "Ember device probe

USAGE:
    cargo run -p ember-probe -- [OPTIONS]

OPTIONS:
    --validation        Enable validation layers
    --no-validation     Disable validation layers
    --fail-fast         Abort selection at the first non-conforming device
    --smoke             Upload a buffer and allocate descriptor sets
    -h, --help          Print this help message

ENVIRONMENT VARIABLES:
    RUST_LOG            Set log level (e.g., info, debug, trace)"
    );
}
