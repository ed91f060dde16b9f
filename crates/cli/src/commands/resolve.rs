//! `resolve` command implementation.

use anyhow::{Context, Result};
use contracts::{ReferenceInstant, Resolution};
use frame_cache::write_image;
use serde::Serialize;
use tracing::{info, warn};

use crate::cli::ResolveArgs;
use crate::commands::common::{load_blueprint, load_record, open_session};
use crate::error::CliError;

#[derive(Serialize)]
struct ResolveOutput<'a> {
    resolution: &'a Resolution,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    extracted: Vec<String>,
}

/// Execute the `resolve` command
pub async fn run_resolve(args: &ResolveArgs) -> Result<()> {
    let blueprint = load_blueprint(&args.config.config)?;
    let mut session = open_session(blueprint).await?;
    if args.extract.is_none() {
        session = session.without_frames();
    }

    if let Some(path) = &args.offsets {
        let record = load_record(path)?;
        session.restore(&record)?;
    }

    let nav = session.sync().navigable();
    let at = match (args.at, args.frame) {
        (Some(t), _) if args.clamp => ReferenceInstant::Timestamp(nav.clamp(t)),
        (Some(t), _) => ReferenceInstant::Timestamp(t),
        (None, Some(frame)) if args.clamp => ReferenceInstant::Frame(nav.clamp_frame(frame)),
        (None, Some(frame)) => ReferenceInstant::Frame(frame),
        (None, None) => anyhow::bail!("either --at or --frame is required"),
    };
    info!(at = ?at, "Resolving");

    let seek = session.seek(at).context("Failed to resolve reference instant")?;

    let mut extracted = Vec::new();
    if let Some(dir) = &args.extract {
        std::fs::create_dir_all(dir).map_err(CliError::from)?;
        let total = seek.frames.len();
        let mut failed = 0;
        for ticket in seek.frames {
            let key = ticket.key().clone();
            match ticket.resolve().await {
                Ok(frame) => {
                    let path = dir.join(format!("{}.png", key.modality_id.frame_stem(key.frame_index)));
                    write_image(&frame, &path).map_err(CliError::from)?;
                    info!(key = %key, path = %path.display(), "Frame saved");
                    extracted.push(path.display().to_string());
                }
                Err(e) => {
                    warn!(key = %key, error = %e, "Frame unavailable");
                    failed += 1;
                }
            }
        }
        if failed > 0 {
            print_resolution(&seek.resolution, &extracted, args.json)?;
            return Err(CliError::FramesFailed { failed, total }.into());
        }
    }

    print_resolution(&seek.resolution, &extracted, args.json)
}

fn print_resolution(resolution: &Resolution, extracted: &[String], json: bool) -> Result<()> {
    if json {
        let output = ResolveOutput {
            resolution,
            extracted: extracted.to_vec(),
        };
        let json =
            serde_json::to_string_pretty(&output).context("Failed to serialize resolution")?;
        println!("{}", json);
        return Ok(());
    }

    println!(
        "\nReference instant {:.6} (frame {})\n",
        resolution.instant, resolution.reference_index
    );
    for r in &resolution.indices {
        let clamp_note = if r.clamped {
            format!(" (requested {}, clamped)", r.requested)
        } else {
            String::new()
        };
        println!(
            "  {:<20} base {:>7} {:+5} -> {:>7} @ {:.6}{}",
            r.modality_id.as_str(),
            r.base_index,
            r.offset,
            r.index,
            r.instant,
            clamp_note
        );
    }
    if !extracted.is_empty() {
        println!("\nExtracted:");
        for path in extracted {
            println!("  {}", path);
        }
    }
    println!();
    Ok(())
}
