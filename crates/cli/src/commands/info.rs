//! `info` command implementation.

use anyhow::{Context, Result};
use contracts::{DegradedModality, ReferenceInstant, ResolvedIndex};
use serde::Serialize;
use sync_engine::Synchronizer;
use tracing::info;

use crate::cli::InfoArgs;
use crate::commands::common::{load_blueprint, load_record};
use crate::pipeline::build_synchronizer;

/// Session info for JSON output
#[derive(Serialize)]
struct SessionInfo {
    session: String,
    reference: String,
    navigable: NavigableInfo,
    anchor: AnchorInfo,
    modalities: Vec<ModalityInfo>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    degraded: Vec<DegradedModality>,
}

#[derive(Serialize)]
struct NavigableInfo {
    t_lo: f64,
    t_hi: f64,
    start_frame: usize,
    end_frame: usize,
}

#[derive(Serialize)]
struct AnchorInfo {
    reference_frame: usize,
    instant: f64,
}

#[derive(Serialize)]
struct ModalityInfo {
    id: String,
    encoding: &'static str,
    samples: usize,
    first_instant: f64,
    last_instant: f64,
    truncated_start: usize,
    truncated_end: usize,
    anchor_index: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    group: Option<String>,
    offset: i64,
    /// Index at the anchor instant with the offset applied
    #[serde(skip_serializing_if = "Option::is_none")]
    at_anchor: Option<ResolvedIndex>,
}

/// Execute the `info` command
pub fn run_info(args: &InfoArgs) -> Result<()> {
    let blueprint = load_blueprint(&args.config.config)?;
    let sync = build_synchronizer(&blueprint)
        .with_context(|| format!("Failed to open session '{}'", blueprint.session.name))?;

    if let Some(path) = &args.offsets {
        let record = load_record(path)?;
        let batch = sync.offsets().restore(record.batch());
        info!(
            path = %path.display(),
            affected = batch.affected.len(),
            ignored = batch.ignored.len(),
            "Offsets restored"
        );
    }

    let info = build_session_info(&blueprint.session.name, &sync)?;
    if args.json {
        let json =
            serde_json::to_string_pretty(&info).context("Failed to serialize session info")?;
        println!("{}", json);
    } else {
        print_session_info(&info);
    }

    Ok(())
}

fn build_session_info(name: &str, sync: &Synchronizer) -> Result<SessionInfo> {
    let nav = sync.navigable();
    let anchor = sync.anchor();

    // anchor frame may sit before the common window when a modality starts late
    let anchor_frame = nav.clamp_frame(anchor.reference_frame);
    let at_anchor = sync
        .resolve(ReferenceInstant::Frame(anchor_frame))
        .context("Failed to resolve the anchor frame")?;

    let modalities = sync
        .streams()
        .iter()
        .map(|stream| {
            let id = stream.modality_id();
            let range = sync.valid_range(id);
            ModalityInfo {
                id: id.to_string(),
                encoding: stream.encoding_name(),
                samples: stream.len(),
                first_instant: stream.first_instant(),
                last_instant: stream.last_instant(),
                truncated_start: range.map_or(0, |r| r.start_index),
                truncated_end: range.map_or(0, |r| r.end_index),
                anchor_index: anchor
                    .points
                    .iter()
                    .find(|p| &p.modality_id == id)
                    .map_or(0, |p| p.index),
                group: sync.offsets().group_of(id).map(|g| g.to_string()),
                offset: sync.offsets().get(id),
                at_anchor: at_anchor.get(id).cloned(),
            }
        })
        .collect();

    Ok(SessionInfo {
        session: name.to_string(),
        reference: sync.reference_id().to_string(),
        navigable: NavigableInfo {
            t_lo: nav.lo,
            t_hi: nav.hi,
            start_frame: nav.start_index,
            end_frame: nav.end_index,
        },
        anchor: AnchorInfo {
            reference_frame: anchor.reference_frame,
            instant: anchor.instant,
        },
        modalities,
        degraded: sync.degraded().to_vec(),
    })
}

fn print_session_info(info: &SessionInfo) {
    println!("\n=== Session: {} ===\n", info.session);
    println!("Reference: {}", info.reference);
    println!(
        "Navigable: [{:.6}, {:.6}] (frames {}..={})",
        info.navigable.t_lo, info.navigable.t_hi, info.navigable.start_frame, info.navigable.end_frame
    );
    println!(
        "Anchor: frame {} at {:.6}",
        info.anchor.reference_frame, info.anchor.instant
    );

    println!("\nModalities ({}):", info.modalities.len());
    for m in &info.modalities {
        println!(
            "  - {} [{}] {} samples, covers [{:.6}, {:.6}], truncated {}..={}",
            m.id, m.encoding, m.samples, m.first_instant, m.last_instant, m.truncated_start, m.truncated_end
        );
        let group = m
            .group
            .as_deref()
            .map(|g| format!(" (group {g})"))
            .unwrap_or_default();
        match &m.at_anchor {
            Some(r) if r.clamped => println!(
                "      anchor index {}, offset {}{} -> {} (requested {}, clamped)",
                m.anchor_index, m.offset, group, r.index, r.requested
            ),
            Some(r) => println!(
                "      anchor index {}, offset {}{} -> {}",
                m.anchor_index, m.offset, group, r.index
            ),
            None => println!("      anchor index {}, offset {}{}", m.anchor_index, m.offset, group),
        }
    }

    if !info.degraded.is_empty() {
        println!("\nDegraded ({}):", info.degraded.len());
        for d in &info.degraded {
            println!("  - {}: {}", d.modality_id, d.reason);
        }
    }

    println!();
}
