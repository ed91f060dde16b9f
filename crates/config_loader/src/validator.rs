//! 配置校验模块
//!
//! 字段级规则由 `validator` derive 完成，跨字段规则在此手写：
//! - modality id 唯一且是合法键名，offset 组 id 不与模态 id 冲突
//! - 恰好一个参考模态
//! - offset 组成员存在，且每个模态至多属于一个组
//! - camera / gaze 模态必须带视频源
//! - 合成时间戳参数合法

use std::collections::{HashMap, HashSet};

use ::validator::Validate;
use contracts::{ContractError, ModalityId, SessionBlueprint, TimestampSourceConfig};

/// 校验 SessionBlueprint 配置
///
/// 返回第一个遇到的错误，或 Ok(())。
pub fn validate(blueprint: &SessionBlueprint) -> Result<(), ContractError> {
    validate_fields(blueprint)?;
    validate_modality_ids(blueprint)?;
    validate_reference(blueprint)?;
    validate_offset_groups(blueprint)?;
    validate_video_sources(blueprint)?;
    validate_synthetic_sources(blueprint)?;
    Ok(())
}

/// derive 规则 (长度、范围、嵌套结构)
fn validate_fields(blueprint: &SessionBlueprint) -> Result<(), ContractError> {
    blueprint
        .validate()
        .map_err(|e| ContractError::config_validation("blueprint", e.to_string()))
}

/// 校验 modality id 唯一性
fn validate_modality_ids(blueprint: &SessionBlueprint) -> Result<(), ContractError> {
    let mut seen = HashSet::new();
    for modality in &blueprint.modalities {
        ModalityId::check_name(&modality.id).map_err(|e| {
            ContractError::config_validation(format!("modalities[id={}]", modality.id), e.to_string())
        })?;
        if !seen.insert(modality.id.as_str()) {
            return Err(ContractError::config_validation(
                format!("modalities[id={}]", modality.id),
                "duplicate modality id",
            ));
        }
    }
    Ok(())
}

/// 校验参考模态恰好一个
fn validate_reference(blueprint: &SessionBlueprint) -> Result<(), ContractError> {
    let references: Vec<&str> = blueprint
        .modalities
        .iter()
        .filter(|m| m.reference)
        .map(|m| m.id.as_str())
        .collect();

    match references.as_slice() {
        [_] => Ok(()),
        [] => Err(ContractError::config_validation(
            "modalities[].reference",
            "no reference modality; mark exactly one with reference = true",
        )),
        many => Err(ContractError::config_validation(
            "modalities[].reference",
            format!("multiple reference modalities: {}", many.join(", ")),
        )),
    }
}

/// 校验 offset 组
fn validate_offset_groups(blueprint: &SessionBlueprint) -> Result<(), ContractError> {
    let modality_ids: HashSet<&str> = blueprint.modalities.iter().map(|m| m.id.as_str()).collect();
    let mut group_ids = HashSet::new();
    let mut owner: HashMap<&str, &str> = HashMap::new();

    for group in &blueprint.offset_groups {
        ModalityId::check_name(&group.id).map_err(|e| {
            ContractError::config_validation(format!("offset_groups[id={}]", group.id), e.to_string())
        })?;
        if !group_ids.insert(group.id.as_str()) {
            return Err(ContractError::config_validation(
                format!("offset_groups[id={}]", group.id),
                "duplicate offset group id",
            ));
        }
        if modality_ids.contains(group.id.as_str()) {
            return Err(ContractError::config_validation(
                format!("offset_groups[id={}]", group.id),
                "offset group id collides with a modality id",
            ));
        }

        for member in &group.members {
            if !modality_ids.contains(member.as_str()) {
                return Err(ContractError::config_validation(
                    format!("offset_groups[{}].members", group.id),
                    format!("member '{member}' is not a declared modality"),
                ));
            }
            if let Some(previous) = owner.insert(member.as_str(), group.id.as_str()) {
                return Err(ContractError::config_validation(
                    format!("offset_groups[{}].members", group.id),
                    format!("modality '{member}' is already bound to group '{previous}'"),
                ));
            }
        }
    }
    Ok(())
}

/// 视频模态必须声明视频源
fn validate_video_sources(blueprint: &SessionBlueprint) -> Result<(), ContractError> {
    for modality in &blueprint.modalities {
        if modality.kind.is_video() && modality.video.is_none() {
            return Err(ContractError::config_validation(
                format!("modalities[{}].video", modality.id),
                format!("{:?} modality requires a video source", modality.kind),
            ));
        }
    }
    Ok(())
}

/// 合成时间戳参数 (enum 变体不走 derive)
fn validate_synthetic_sources(blueprint: &SessionBlueprint) -> Result<(), ContractError> {
    for modality in &blueprint.modalities {
        if let TimestampSourceConfig::Synthetic(cfg) = &modality.timestamps {
            cfg.validate().map_err(|e| {
                ContractError::config_validation(
                    format!("modalities[{}].timestamps", modality.id),
                    e.to_string(),
                )
            })?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{
        CacheConfig, ConfigVersion, ExtractorConfig, ModalityConfig, ModalityKind,
        OffsetGroupConfig, SessionConfig, SyntheticStreamConfig, VideoConfig,
    };
    use std::path::PathBuf;

    fn synthetic(rate_hz: f64) -> TimestampSourceConfig {
        TimestampSourceConfig::Synthetic(SyntheticStreamConfig {
            rate_hz,
            start: 0.0,
            duration: 10.0,
            jitter: 0.0,
            drop_ratio: 0.0,
            burst: None,
            seed: 1,
        })
    }

    fn modality(id: &str, kind: ModalityKind, reference: bool) -> ModalityConfig {
        ModalityConfig {
            id: id.to_string(),
            kind,
            reference,
            timestamps: synthetic(30.0),
            video: kind.is_video().then(|| VideoConfig {
                path: PathBuf::from(format!("{id}.mp4")),
                fps: 30.0,
                frame_count: None,
            }),
        }
    }

    fn create_valid_blueprint() -> SessionBlueprint {
        SessionBlueprint {
            version: ConfigVersion::V1,
            session: SessionConfig {
                name: "trial".to_string(),
                baseline_frame: 100,
            },
            modalities: vec![
                modality("camera_1", ModalityKind::Camera, true),
                modality("skeleton", ModalityKind::Skeleton, false),
                modality("imu", ModalityKind::Imu, false),
            ],
            offset_groups: vec![OffsetGroupConfig {
                id: "skeleton_imu_shared".to_string(),
                members: vec!["skeleton".to_string(), "imu".to_string()],
            }],
            cache: CacheConfig::default(),
            extractor: ExtractorConfig::default(),
        }
    }

    #[test]
    fn test_valid_blueprint() {
        let bp = create_valid_blueprint();
        assert!(validate(&bp).is_ok());
    }

    #[test]
    fn test_duplicate_modality_id() {
        let mut bp = create_valid_blueprint();
        bp.modalities.push(modality("imu", ModalityKind::Imu, false));
        let result = validate(&bp);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("duplicate"));
    }

    #[test]
    fn test_missing_reference() {
        let mut bp = create_valid_blueprint();
        bp.modalities[0].reference = false;
        let err = validate(&bp).unwrap_err();
        assert!(err.to_string().contains("no reference"));
    }

    #[test]
    fn test_multiple_references() {
        let mut bp = create_valid_blueprint();
        bp.modalities[2].reference = true;
        let err = validate(&bp).unwrap_err();
        assert!(err.to_string().contains("camera_1, imu"));
    }

    #[test]
    fn test_group_member_unknown() {
        let mut bp = create_valid_blueprint();
        bp.offset_groups[0].members.push("emg".to_string());
        let err = validate(&bp).unwrap_err();
        assert!(err.to_string().contains("'emg'"));
    }

    #[test]
    fn test_modality_in_two_groups() {
        let mut bp = create_valid_blueprint();
        bp.offset_groups.push(OffsetGroupConfig {
            id: "imu_only".to_string(),
            members: vec!["imu".to_string()],
        });
        let err = validate(&bp).unwrap_err();
        assert!(err.to_string().contains("already bound"));
    }

    #[test]
    fn test_ids_must_be_usable_as_keys() {
        let mut bp = create_valid_blueprint();
        bp.modalities[1].id = "left foot".to_string();
        let err = validate(&bp).unwrap_err();
        assert!(err.to_string().contains("whitespace"));

        let mut bp = create_valid_blueprint();
        bp.offset_groups[0].id = "body=1".to_string();
        let err = validate(&bp).unwrap_err();
        assert!(err.to_string().contains("offset_groups[id=body=1]"));
        assert!(err.to_string().contains("reserved character '='"));
    }

    #[test]
    fn test_group_id_collides_with_modality() {
        let mut bp = create_valid_blueprint();
        bp.offset_groups[0].id = "imu".to_string();
        let err = validate(&bp).unwrap_err();
        assert!(err.to_string().contains("collides"));
    }

    #[test]
    fn test_camera_without_video() {
        let mut bp = create_valid_blueprint();
        bp.modalities[0].video = None;
        let err = validate(&bp).unwrap_err();
        assert!(err.to_string().contains("requires a video source"));
    }

    #[test]
    fn test_synthetic_rate_must_be_positive() {
        let mut bp = create_valid_blueprint();
        bp.modalities[1].timestamps = synthetic(0.0);
        let err = validate(&bp).unwrap_err();
        assert!(matches!(err, ContractError::ConfigValidation { .. }));
    }

    #[test]
    fn test_zero_cache_budget_rejected() {
        let mut bp = create_valid_blueprint();
        bp.cache.max_in_flight_per_modality = 0;
        assert!(validate(&bp).is_err());
    }
}
