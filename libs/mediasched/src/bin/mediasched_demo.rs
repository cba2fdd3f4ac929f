// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Runs a decode -> vpp -> encode pipeline on a scheduler and prints its
//! statistics as JSON.

#![allow(clippy::disallowed_macros)]

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;

use mediasched::core::logging;
use mediasched::{
    CallStatus, DependencyKey, EntryPoint, PerformanceMessage, RoutineCall, SchedulerConfig,
    Session, SessionComponent, TaskSpec, ThreadingPolicy,
};

#[derive(Parser)]
#[command(name = "mediasched-demo")]
#[command(author, version, about = "Run a synthetic transcode pipeline on the scheduler", long_about = None)]
struct Cli {
    /// Scheduler config file (YAML)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Frames to push through the pipeline
    #[arg(short, long, default_value = "64")]
    frames: u64,

    /// Worker threads (overrides the config file)
    #[arg(short, long)]
    workers: Option<usize>,

    /// Concurrent VPP submissions
    #[arg(long, default_value = "2")]
    vpp_slots: usize,

    /// Make decode fail on this frame
    #[arg(long)]
    fail_frame: Option<u64>,

    /// Simulated per-stage work in microseconds
    #[arg(long, default_value = "200")]
    work_us: u64,
}

struct Stage {
    name: &'static str,
    work: Duration,
    fail_frame: Option<u64>,
    processed: AtomicU64,
}

struct Encoder {
    work: Duration,
    /// Cleared by the hardware thread once the "device" accepted a frame.
    device_busy: AtomicBool,
    processed: AtomicU64,
}

fn surface_key(stage: u64, frame: u64) -> DependencyKey {
    DependencyKey((stage << 32) | frame)
}

fn run_stage(call: &RoutineCall<'_>) -> CallStatus {
    let (Some(stage), Some(&frame)) = (call.state::<Stage>(), call.param::<u64>()) else {
        return CallStatus::Error(-1);
    };
    std::thread::sleep(stage.work);
    if stage.fail_frame == Some(frame) {
        tracing::warn!("{} fails frame {}", stage.name, frame);
        return CallStatus::Error(-2);
    }
    stage.processed.fetch_add(1, Ordering::Relaxed);
    CallStatus::Done
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init("info")?;

    let mut config = match &cli.config {
        Some(path) => SchedulerConfig::load(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => SchedulerConfig::default(),
    }
    .apply_env_overrides()?;
    if let Some(workers) = cli.workers {
        config.worker_threads = workers;
    }
    config.max_tasks = config.max_tasks.max(cli.frames as usize * 3);
    config.hw_event_poll_interval_ms = config.hw_event_poll_interval_ms.min(10);

    let session = Session::new(config)?;
    let scheduler = session.scheduler();
    scheduler.adjust_performance(PerformanceMessage::StartHwListening)?;
    let work = Duration::from_micros(cli.work_us);

    let decode_state = Arc::new(Stage {
        name: "decode",
        work,
        fail_frame: cli.fail_frame,
        processed: AtomicU64::new(0),
    });
    let vpp_state = Arc::new(Stage {
        name: "vpp",
        work,
        fail_frame: None,
        processed: AtomicU64::new(0),
    });
    let encoder = Arc::new(Encoder {
        work,
        device_busy: AtomicBool::new(true),
        processed: AtomicU64::new(0),
    });

    let decode = EntryPoint::new(decode_state.clone(), run_stage).with_name("decode");
    let vpp = EntryPoint::new(vpp_state.clone(), run_stage).with_name("vpp");
    let encode = EntryPoint::new(encoder.clone(), |call| {
        let Some(encoder) = call.state::<Encoder>() else {
            return CallStatus::Error(-1);
        };
        if encoder.device_busy.swap(true, Ordering::AcqRel) {
            return CallStatus::Busy;
        }
        std::thread::sleep(encoder.work);
        encoder.processed.fetch_add(1, Ordering::Relaxed);
        CallStatus::Done
    })
    .with_name("encode");

    // Stands in for the accelerator interrupt: frees the device and signals.
    let hw_running = Arc::new(AtomicBool::new(true));
    let hw_thread = {
        let running = hw_running.clone();
        let encoder = encoder.clone();
        let signal = scheduler
            .hardware_signal()
            .context("scheduler has no hardware signal")?;
        std::thread::Builder::new()
            .name("demo-device".into())
            .spawn(move || {
                while running.load(Ordering::Acquire) {
                    std::thread::sleep(Duration::from_micros(500));
                    encoder.device_busy.store(false, Ordering::Release);
                    signal.notify();
                }
            })?
    };

    let mut encodes = Vec::with_capacity(cli.frames as usize);
    for frame in 0..cli.frames {
        session.submit(
            SessionComponent::Decode,
            TaskSpec::new(decode.clone().with_param(frame))
                .with_policy(ThreadingPolicy::Intra)
                .produces(surface_key(1, frame)),
        )?;
        session.submit(
            SessionComponent::Vpp,
            TaskSpec::new(vpp.clone().with_param(frame))
                .with_policy(ThreadingPolicy::Shared {
                    max_concurrency: cli.vpp_slots,
                })
                .consumes(surface_key(1, frame))
                .produces(surface_key(2, frame)),
        )?;
        encodes.push(session.submit(
            SessionComponent::Encode,
            TaskSpec::new(encode.clone().with_param(frame))
                .with_policy(ThreadingPolicy::Intra)
                .consumes(surface_key(2, frame)),
        )?);
    }

    let mut failed = 0;
    for handle in encodes {
        if let Err(e) = session.synchronize(handle, Duration::from_secs(30)) {
            tracing::info!("{} did not complete: {}", handle, e);
            failed += 1;
        }
    }
    session.close()?;
    hw_running.store(false, Ordering::Release);
    let _ = hw_thread.join();

    println!(
        "decoded={} processed={} encoded={} failed={}",
        decode_state.processed.load(Ordering::Relaxed),
        vpp_state.processed.load(Ordering::Relaxed),
        encoder.processed.load(Ordering::Relaxed),
        failed
    );
    println!("{}", serde_json::to_string_pretty(&scheduler.stats())?);
    Ok(())
}
