//! Helpers shared by the commands.

use std::path::Path;

use config_loader::{ConfigLoader, OffsetsRecord};
use contracts::{ExtractorKind, SessionBlueprint};
use frame_cache::{ConfiguredExtractor, FfmpegExtractor};
use tracing::info;

use crate::error::CliError;
use crate::pipeline::{probe_videos, Session};

/// Load and validate the session configuration
pub fn load_blueprint(path: &Path) -> Result<SessionBlueprint, CliError> {
    if !path.exists() {
        return Err(CliError::config_not_found(path.display().to_string()));
    }
    let blueprint = ConfigLoader::load_from_path(path)?;
    info!(
        config = %path.display(),
        session = %blueprint.session.name,
        modalities = blueprint.modalities.len(),
        "Configuration loaded"
    );
    Ok(blueprint)
}

/// Load an offsets record; a missing file is an empty record
pub fn load_record(path: &Path) -> Result<OffsetsRecord, CliError> {
    Ok(OffsetsRecord::load(path)?)
}

/// Open a session with the extractor the blueprint selects
///
/// ffmpeg sessions probe videos without a configured frame count first.
pub async fn open_session(
    mut blueprint: SessionBlueprint,
) -> Result<Session<ConfiguredExtractor>, CliError> {
    if blueprint.extractor.kind == ExtractorKind::Ffmpeg {
        let prober = FfmpegExtractor::new(&blueprint.extractor);
        probe_videos(&mut blueprint, &prober).await;
    }
    let extractor = ConfiguredExtractor::from_config(&blueprint.extractor);
    Ok(Session::open(&blueprint, extractor)?)
}
