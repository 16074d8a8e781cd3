mod host;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use motion_governor_core::{GovernorConfig, ManualRuntime, PerformanceGovernor, Priority};
use serde_json::json;
use tracing_subscriber::EnvFilter;

use crate::host::HostRuntime;

fn main() -> motion_governor_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Commands::Simulate {
            profile,
            seconds,
            config,
        } => run_simulate(profile, seconds, config.as_deref()),
        Commands::Monitor { seconds, config } => run_monitor(seconds, config.as_deref()),
        Commands::Config { config } => print_config(config.as_deref()),
    }
}

fn load_config(path: Option<&Path>) -> motion_governor_core::Result<GovernorConfig> {
    match path {
        Some(path) => {
            tracing::info!(?path, "loading governor config");
            GovernorConfig::load(path)
        }
        None => Ok(GovernorConfig::default()),
    }
}

fn run_simulate(
    profile: Profile,
    seconds: u32,
    config: Option<&Path>,
) -> motion_governor_core::Result<()> {
    tracing::info!(?profile, seconds, "starting simulation");

    let runtime = Arc::new(profile.runtime());
    let mut governor = PerformanceGovernor::new(runtime.clone(), load_config(config)?)?;
    governor.start_monitoring()?;

    let mut levels = Vec::new();
    let mut running: Vec<String> = Vec::new();
    let mut alerts = 0usize;
    let mut started = 0usize;
    let mut skipped = 0usize;
    let mut next_id = 0u64;

    for second in 0..seconds {
        let frame_ms = profile.frame_ms(second, seconds);
        let frames = (1_000.0 / frame_ms).round().max(1.0) as u32;

        if second % 4 == 0 {
            let transition = governor.start_transition(8);
            runtime.advance(frame_ms * 2.0);
            governor.end_transition(transition)?;
        }

        // A burst of entrance animations at the start of every second.
        for priority in [Priority::High, Priority::Medium, Priority::Low, Priority::Medium] {
            if governor.should_skip(priority, false) {
                skipped += 1;
                continue;
            }
            let id = format!("anim-{next_id}");
            next_id += 1;
            if governor.request_admission(id.clone(), || {}) {
                running.push(id);
            }
        }

        for frame in 0..frames {
            runtime.advance(frame_ms);
            let report = governor.on_frame();
            alerts += report.alerts.len();
            running.extend(report.started);

            // Animations run for roughly a third of a second.
            if frame == frames / 3 {
                for id in std::mem::take(&mut running) {
                    started += 1;
                    running.extend(governor.complete_animation(&id));
                }
            }
        }

        levels.push(governor.degradation_level().value());
    }
    started += running.len();

    governor.stop_monitoring();

    let report = json!({
        "profile": format!("{profile:?}"),
        "seconds": seconds,
        "levels": levels,
        "final_level": governor.degradation_level(),
        "snapshot": governor.snapshot(),
        "animation_settings": governor.animation_settings(),
        "network_settings": governor.network_settings(),
        "admission": {
            "started": started,
            "skipped": skipped,
            "active": governor.queue().active_count(),
            "queued": governor.queue().queued_count(),
            "max_concurrent": governor.queue().max_concurrent(),
        },
        "alerts": alerts,
        "transitions": governor.performance_summary(),
        "adaptive": governor.adaptive_configuration(),
    });

    println!("{}", serde_json::to_string_pretty(&report)?);
    governor.dispose();
    Ok(())
}

fn run_monitor(seconds: u64, config: Option<&Path>) -> motion_governor_core::Result<()> {
    tracing::info!(seconds, "monitoring host signals");

    let runtime = Arc::new(HostRuntime::new());
    let mut governor = PerformanceGovernor::new(runtime, load_config(config)?)?;
    let _alerts = governor.subscribe_to_alerts(|alert| {
        tracing::info!(
            kind = ?alert.kind,
            severity = ?alert.severity,
            recommendation = %alert.recommendation,
            "{}",
            alert.message
        );
    });
    governor.start_monitoring()?;

    let frame = Duration::from_micros(16_667);
    let frames = seconds.saturating_mul(60);
    let mut level = governor.degradation_level();

    for _ in 0..frames {
        std::thread::sleep(frame);
        governor.on_frame();

        let next = governor.degradation_level();
        if next != level {
            tracing::info!(
                from = level.value(),
                to = next.value(),
                fps = governor.snapshot().fps,
                "host degradation level changed"
            );
            level = next;
        }
    }

    let snapshot = governor.snapshot();
    tracing::info!(
        fps = snapshot.fps,
        memory = snapshot.memory_usage_ratio,
        low_end = snapshot.is_low_end_device,
        level = level.value(),
        "monitoring finished"
    );
    governor.dispose();
    Ok(())
}

fn print_config(path: Option<&Path>) -> motion_governor_core::Result<()> {
    let config = load_config(path)?;
    println!("{}", config.to_json_pretty()?);
    Ok(())
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .try_init();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Adaptive animation performance governor", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Drive the governor with a scripted device and print a JSON report.
    Simulate {
        /// Device behaviour to simulate.
        #[arg(short, long, value_enum, default_value_t = Profile::Steady)]
        profile: Profile,
        /// Simulated wall-clock seconds.
        #[arg(short, long, default_value_t = 20, value_parser = clap::value_parser!(u32).range(1..))]
        seconds: u32,
        /// Optional JSON config overriding the defaults.
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Sample this machine at roughly 60 Hz and log level changes.
    Monitor {
        #[arg(short, long, default_value_t = 10)]
        seconds: u64,
        /// Optional JSON config overriding the defaults.
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Print the effective configuration as JSON.
    Config {
        /// Config file to validate and print; defaults are printed without one.
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum Profile {
    /// Healthy device holding 60 fps.
    Steady,
    /// Frame rate sliding from 60 down to 20 fps.
    Degrading,
    /// Two cores and one gigabyte of memory.
    LowEnd,
    /// 2G connection on a low battery.
    SlowNetwork,
}

impl Profile {
    fn runtime(self) -> ManualRuntime {
        let base = ManualRuntime::new().with_heap(300 << 20, 2 << 30);
        match self {
            Profile::Steady | Profile::Degrading => base
                .with_hardware_concurrency(8)
                .with_device_memory_gb(8.0)
                .with_network("4g")
                .with_battery(0.9),
            Profile::LowEnd => base
                .with_hardware_concurrency(2)
                .with_device_memory_gb(1.0)
                .with_network("3g"),
            Profile::SlowNetwork => base
                .with_hardware_concurrency(4)
                .with_device_memory_gb(4.0)
                .with_network("2g")
                .with_battery(0.3),
        }
    }

    /// Frame time for `second` out of `total`.
    fn frame_ms(self, second: u32, total: u32) -> f64 {
        match self {
            Profile::Degrading => {
                let progress = f64::from(second) / f64::from(total.max(1));
                let fps = 60.0 - 40.0 * progress;
                1_000.0 / fps
            }
            Profile::LowEnd => 1_000.0 / 40.0,
            Profile::Steady | Profile::SlowNetwork => 1_000.0 / 60.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn degrading_profile_slows_down() {
        assert!(Profile::Degrading.frame_ms(0, 10) < Profile::Degrading.frame_ms(9, 10));
        assert_eq!(Profile::Steady.frame_ms(5, 10), 1_000.0 / 60.0);
    }

    #[test]
    fn low_end_profile_is_detected() {
        let runtime = Arc::new(Profile::LowEnd.runtime());
        let governor = PerformanceGovernor::new(runtime, GovernorConfig::default()).unwrap();
        assert!(governor.snapshot().is_low_end_device);
        assert_eq!(governor.queue().max_concurrent(), 3);
    }

    #[test]
    fn cli_parses_simulate() {
        let cli = Cli::parse_from(["motion-governor", "simulate", "-p", "slow-network", "-s", "5"]);
        match cli.command {
            Commands::Simulate {
                profile, seconds, ..
            } => {
                assert_eq!(profile, Profile::SlowNetwork);
                assert_eq!(seconds, 5);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
