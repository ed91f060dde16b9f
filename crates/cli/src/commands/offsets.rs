//! `offsets` command implementation.

use anyhow::{Context, Result};
use contracts::{ModalityId, ReferenceInstant};
use frame_cache::ConfiguredExtractor;
use tracing::info;

use crate::cli::OffsetsArgs;
use crate::commands::common::{load_blueprint, load_record, open_session};
use crate::pipeline::{OffsetEdit, Session};

/// Execute the `offsets` command
///
/// Edits are applied in order: `--reset-all`, `--set`, `--nudge`, `--reset`.
pub async fn run_offsets(args: &OffsetsArgs) -> Result<()> {
    let blueprint = load_blueprint(&args.config.config)?;
    let record = load_record(&args.file)?;
    let mut session = open_session(blueprint).await?.without_frames();
    session.restore(&record)?;

    // show effects at the anchor so clamping is visible
    let nav = session.sync().navigable();
    let anchor_frame = nav.clamp_frame(session.sync().anchor().reference_frame);
    session
        .seek(ReferenceInstant::Frame(anchor_frame))
        .context("Failed to resolve the anchor frame")?;

    if !args.has_edits() {
        print_offsets(&session);
        return Ok(());
    }

    if args.reset_all {
        let edit = session.reset_all_offsets()?;
        print_edit("reset all", &edit);
    }
    for (key, value) in &args.set {
        let edit = session
            .set_offset(&ModalityId::from(key.as_str()), *value)
            .with_context(|| format!("Failed to set '{key}'"))?;
        print_edit(&format!("set {key}={value}"), &edit);
    }
    for (key, delta) in &args.nudge {
        let edit = session
            .nudge_offset(&ModalityId::from(key.as_str()), *delta)
            .with_context(|| format!("Failed to nudge '{key}'"))?;
        print_edit(&format!("nudge {key}{delta:+}"), &edit);
    }
    for key in &args.reset {
        let edit = session
            .reset_offset(&ModalityId::from(key.as_str()))
            .with_context(|| format!("Failed to reset '{key}'"))?;
        print_edit(&format!("reset {key}"), &edit);
    }

    print_offsets(&session);

    if args.dry_run {
        println!("(dry run, {} not written)", args.file.display());
        return Ok(());
    }

    let updated = session.record(record.annotations.clone());
    updated
        .save(&args.file)
        .with_context(|| format!("Failed to write {}", args.file.display()))?;
    info!(
        path = %args.file.display(),
        offsets = updated.offsets.len(),
        "Offsets record saved"
    );
    Ok(())
}

fn print_edit(label: &str, edit: &OffsetEdit) {
    println!("{label}:");
    if edit.resolved.is_empty() {
        for id in &edit.affected {
            println!("  {id}");
        }
        return;
    }
    for r in &edit.resolved {
        let note = if r.clamped {
            format!(" (requested {}, clamped)", r.requested)
        } else {
            String::new()
        };
        println!("  {:<20} offset {:+5} -> index {}{}", r.modality_id.as_str(), r.offset, r.index, note);
    }
}

fn print_offsets(session: &Session<ConfiguredExtractor>) {
    let snapshot = session.offsets().snapshot();
    println!("\nOffsets:");
    for (key, value) in &snapshot {
        let members = session.offsets().members_of(key);
        if members.len() > 1 || members.first() != Some(key) {
            let names: Vec<&str> = members.iter().map(|m| m.as_str()).collect();
            println!("  {:<20} {:+5} (group: {})", key.as_str(), value, names.join(", "));
        } else {
            println!("  {:<20} {:+5}", key.as_str(), value);
        }
    }
    if snapshot.is_empty() {
        println!("  (all zero)");
    }
    println!();
}
