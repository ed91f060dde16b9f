//! `validate` command implementation.

use anyhow::{Context, Result};
use contracts::{SessionBlueprint, TimestampSourceConfig};
use serde::Serialize;
use tracing::info;

use crate::cli::ValidateArgs;
use crate::commands::common::load_blueprint;

/// Validation result for JSON output
#[derive(Serialize)]
struct ValidationResult {
    valid: bool,
    config_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    warnings: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<ConfigSummary>,
}

#[derive(Serialize)]
struct ConfigSummary {
    version: String,
    session: String,
    reference: String,
    modality_count: usize,
    video_count: usize,
    offset_group_count: usize,
    extractor: String,
}

/// Execute the `validate` command
pub fn run_validate(args: &ValidateArgs) -> Result<()> {
    let path = &args.config.config;
    info!(config = %path.display(), "Validating configuration");

    let result = validate_config(args);

    if args.json {
        let json = serde_json::to_string_pretty(&result)
            .context("Failed to serialize validation result")?;
        println!("{}", json);
    } else {
        print_validation_result(&result);
    }

    if result.valid {
        Ok(())
    } else {
        anyhow::bail!("Configuration validation failed")
    }
}

fn validate_config(args: &ValidateArgs) -> ValidationResult {
    let config_path = args.config.config.display().to_string();

    match load_blueprint(&args.config.config) {
        Ok(blueprint) => {
            let warnings = collect_warnings(&blueprint);
            ValidationResult {
                valid: true,
                config_path,
                error: None,
                warnings: (!warnings.is_empty()).then_some(warnings),
                summary: Some(ConfigSummary::from(&blueprint)),
            }
        }
        Err(e) => ValidationResult {
            valid: false,
            config_path,
            error: Some(e.to_string()),
            warnings: None,
            summary: None,
        },
    }
}

impl From<&SessionBlueprint> for ConfigSummary {
    fn from(blueprint: &SessionBlueprint) -> Self {
        Self {
            version: format!("{:?}", blueprint.version),
            session: blueprint.session.name.clone(),
            reference: blueprint
                .reference()
                .map(|m| m.id.clone())
                .unwrap_or_default(),
            modality_count: blueprint.modalities.len(),
            video_count: blueprint
                .modalities
                .iter()
                .filter(|m| m.video.is_some())
                .count(),
            offset_group_count: blueprint.offset_groups.len(),
            extractor: format!("{:?}", blueprint.extractor.kind),
        }
    }
}

/// Collect configuration warnings (non-fatal issues)
fn collect_warnings(blueprint: &SessionBlueprint) -> Vec<String> {
    let mut warnings = Vec::new();

    for modality in &blueprint.modalities {
        match &modality.timestamps {
            TimestampSourceConfig::File { path } if !path.exists() => {
                let note = if modality.reference {
                    "the session cannot open"
                } else {
                    "the modality will be degraded"
                };
                warnings.push(format!(
                    "Modality '{}': timestamps file {} not found, {note}",
                    modality.id,
                    path.display()
                ));
            }
            TimestampSourceConfig::Synthetic(_) => {
                warnings.push(format!("Modality '{}' uses synthetic timestamps", modality.id));
            }
            _ => {}
        }

        if let Some(video) = &modality.video {
            if video.frame_count.is_none() {
                warnings.push(format!(
                    "Modality '{}': video frame_count unknown, it will be probed at load",
                    modality.id
                ));
            }
        }
    }

    if blueprint.cache.prefetch_radius * 2 + 1 > blueprint.cache.queue_capacity {
        warnings.push(format!(
            "cache.prefetch_radius={} needs a queue_capacity of at least {}; prefetches will be superseded",
            blueprint.cache.prefetch_radius,
            blueprint.cache.prefetch_radius * 2 + 1
        ));
    }

    warnings
}

fn print_validation_result(result: &ValidationResult) {
    if result.valid {
        println!("✓ Configuration is valid: {}", result.config_path);

        if let Some(ref summary) = result.summary {
            println!("\n  Version: {}", summary.version);
            println!("  Session: {}", summary.session);
            println!("  Reference: {}", summary.reference);
            println!("  Modalities: {}", summary.modality_count);
            println!("  Video sources: {}", summary.video_count);
            println!("  Offset groups: {}", summary.offset_group_count);
            println!("  Extractor: {}", summary.extractor);
        }

        if let Some(ref warnings) = result.warnings {
            println!("\n⚠ Warnings:");
            for warning in warnings {
                println!("  - {}", warning);
            }
        }
    } else {
        println!("✗ Configuration is invalid: {}", result.config_path);
        if let Some(ref error) = result.error {
            println!("\n  Error: {}", error);
        }
    }
}
