//! `scrub` command implementation.
//!
//! Simulates a user dragging the slider across the navigable range: every
//! step seeks the session, waits for the primary frames and releases them.

use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use contracts::ReferenceInstant;
use frame_cache::{CacheError, ConfiguredExtractor};
use tracing::{debug, info, warn};

use crate::cli::ScrubArgs;
use crate::commands::common::{load_blueprint, load_record, open_session};
use crate::pipeline::{ScrubStats, Session};

/// Execute the `scrub` command
pub async fn run_scrub(args: &ScrubArgs) -> Result<()> {
    let blueprint = load_blueprint(&args.config.config)?;
    let mut session = open_session(blueprint).await?;

    if let Some(path) = &args.offsets {
        let record = load_record(path)?;
        session.restore(&record)?;
    }

    let nav = session.sync().navigable();
    let frames: Vec<usize> = (nav.start_index..=nav.end_index)
        .step_by(args.step.max(1))
        .take(if args.limit == 0 {
            usize::MAX
        } else {
            args.limit as usize
        })
        .collect();
    info!(
        seeks = frames.len(),
        start = nav.start_index,
        end = nav.end_index,
        step = args.step,
        "Starting scrub sweep"
    );

    let started = Instant::now();
    let mut stats = ScrubStats::default();
    let deadline = async {
        if args.timeout > 0 {
            tokio::time::sleep(Duration::from_secs(args.timeout)).await;
        } else {
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        result = sweep(&mut session, &frames, &mut stats) => {
            result.context("Scrub sweep failed")?;
        }
        _ = shutdown_signal() => {
            warn!("Received shutdown signal, stopping sweep...");
        }
        _ = deadline => {
            warn!(timeout_secs = args.timeout, "Scrub sweep timed out");
        }
    }

    stats.duration = started.elapsed();
    stats.cache = session.cache().stats();
    observability::record_cache_stats(&stats.cache);

    info!(
        seeks = stats.seeks,
        frames_ready = stats.frames_ready,
        frames_failed = stats.frames_failed,
        hit_rate = format!("{:.3}", stats.cache.hit_rate()),
        duration_secs = stats.duration.as_secs_f64(),
        "Scrub sweep completed"
    );
    stats.print_summary();
    Ok(())
}

async fn sweep(
    session: &mut Session<ConfiguredExtractor>,
    frames: &[usize],
    stats: &mut ScrubStats,
) -> Result<()> {
    for &frame in frames {
        let seek = session.seek(ReferenceInstant::Frame(frame))?;
        stats.seeks += 1;
        stats.metrics.update(&seek.resolution);

        for ticket in seek.frames {
            let key = ticket.key().clone();
            let requested = Instant::now();
            let result = ticket.pinned().await;
            let wait_ms = requested.elapsed().as_secs_f64() * 1000.0;
            observability::record_frame_wait_ms(&key.modality_id, wait_ms);
            stats.metrics.record_frame(wait_ms, result.is_ok());

            match result {
                // the pin is held only while the frame would be on screen
                Ok(pinned) => {
                    stats.frames_ready += 1;
                    debug!(key = %key, bytes = pinned.frame().byte_len(), wait_ms, "frame displayed");
                }
                Err(CacheError::Superseded { .. }) => {
                    stats.frames_failed += 1;
                    debug!(key = %key, "frame superseded");
                }
                Err(e) => {
                    stats.frames_failed += 1;
                    warn!(key = %key, error = %e, "frame unavailable");
                }
            }
        }
    }
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
