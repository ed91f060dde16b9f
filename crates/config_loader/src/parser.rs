//! 配置解析模块
//!
//! 支持 TOML (主要) 和 JSON (可选) 格式。

use std::path::Path;

use contracts::{ContractError, SessionBlueprint};

/// 配置文件格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// TOML 格式 (推荐)
    Toml,
    /// JSON 格式
    Json,
}

impl ConfigFormat {
    /// 从文件扩展名推断格式
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "toml" => Some(Self::Toml),
            "json" => Some(Self::Json),
            _ => None,
        }
    }

    /// 从路径推断格式，扩展名缺失或不支持时报错
    pub fn from_path(path: &Path) -> Result<Self, ContractError> {
        let ext = path.extension().and_then(|e| e.to_str()).ok_or_else(|| {
            ContractError::config_parse(format!(
                "{}: cannot determine file format from extension",
                path.display()
            ))
        })?;
        Self::from_extension(ext).ok_or_else(|| {
            ContractError::config_parse(format!("unsupported config format: .{ext}"))
        })
    }
}

/// 解析 TOML 格式配置
pub fn parse_toml(content: &str) -> Result<SessionBlueprint, ContractError> {
    toml::from_str(content).map_err(|e| ContractError::ConfigParse {
        message: format!("TOML parse error: {e}"),
        source: Some(Box::new(e)),
    })
}

/// 解析 JSON 格式配置
pub fn parse_json(content: &str) -> Result<SessionBlueprint, ContractError> {
    serde_json::from_str(content).map_err(|e| ContractError::ConfigParse {
        message: format!("JSON parse error: {e}"),
        source: Some(Box::new(e)),
    })
}

/// 根据格式解析配置
pub fn parse(content: &str, format: ConfigFormat) -> Result<SessionBlueprint, ContractError> {
    match format {
        ConfigFormat::Toml => parse_toml(content),
        ConfigFormat::Json => parse_json(content),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{ModalityKind, TimestampSourceConfig};

    #[test]
    fn test_parse_toml_minimal() {
        let content = r#"
[session]
name = "trial"

[[modalities]]
id = "camera_1"
kind = "camera"
reference = true
timestamps = { type = "file", path = "camera_1.json" }
video = { path = "camera_1.mp4", fps = 30.0 }
"#;
        let result = parse_toml(content);
        assert!(result.is_ok(), "Failed: {:?}", result.err());
        let bp = result.unwrap();
        assert_eq!(bp.session.name, "trial");
        assert_eq!(bp.modalities.len(), 1);
        assert_eq!(bp.modalities[0].kind, ModalityKind::Camera);
        assert!(bp.offset_groups.is_empty());
    }

    #[test]
    fn test_parse_json_minimal() {
        let content = r#"{
            "session": { "name": "trial", "baseline_frame": 30 },
            "modalities": [
                {
                    "id": "camera_1",
                    "kind": "camera",
                    "reference": true,
                    "timestamps": { "type": "file", "path": "camera_1.json" },
                    "video": { "path": "camera_1.mp4", "fps": 30.0, "frame_count": 900 }
                },
                {
                    "id": "insole",
                    "kind": "insole",
                    "timestamps": {
                        "type": "synthetic",
                        "rate_hz": 100.0,
                        "duration": 30.0,
                        "burst": { "samples": 10, "gap": 0.05 }
                    }
                }
            ]
        }"#;
        let result = parse_json(content);
        assert!(result.is_ok(), "Failed: {:?}", result.err());
        let bp = result.unwrap();
        assert_eq!(bp.session.baseline_frame, 30);
        match &bp.modalities[1].timestamps {
            TimestampSourceConfig::Synthetic(cfg) => {
                assert_eq!(cfg.burst.unwrap().samples, 10);
            }
            other => panic!("unexpected source: {other:?}"),
        }
    }

    #[test]
    fn test_parse_toml_syntax_error() {
        let content = "invalid toml [[[";
        let result = parse_toml(content);
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert!(matches!(err, ContractError::ConfigParse { .. }));
    }

    #[test]
    fn test_format_from_extension() {
        assert_eq!(
            ConfigFormat::from_extension("toml"),
            Some(ConfigFormat::Toml)
        );
        assert_eq!(
            ConfigFormat::from_extension("JSON"),
            Some(ConfigFormat::Json)
        );
        assert_eq!(ConfigFormat::from_extension("yaml"), None);
    }

    #[test]
    fn test_format_from_path_without_extension() {
        let err = ConfigFormat::from_path(Path::new("trial/session")).unwrap_err();
        assert!(err.to_string().contains("cannot determine file format"));
        assert_eq!(
            ConfigFormat::from_path(Path::new("trial/session.toml")).unwrap(),
            ConfigFormat::Toml
        );
    }
}
