//! ffmpeg extractor: one subprocess per frame, PNG over a pipe.
//!
//! Seeks by time (`frame_index / fps`) because input seeking is far faster
//! than counting frames; this assumes the video dropped no frames.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use bytes::Bytes;
use contracts::{
    ContractError, DecodedFrame, ExtractorConfig, FrameExtractor, FrameSource, ModalityId,
    PixelFormat,
};
use serde_json::Value;
use tokio::process::Command;
use tracing::{debug, instrument};

/// Video properties reported by ffprobe
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VideoProbe {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    /// `round(duration * fps)`
    pub frame_count: usize,
}

/// Shells out to `ffmpeg` for every frame
#[derive(Debug, Clone)]
pub struct FfmpegExtractor {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
    hwaccel: Option<String>,
}

impl FfmpegExtractor {
    pub fn new(config: &ExtractorConfig) -> Self {
        Self {
            ffmpeg: config.ffmpeg_path.clone(),
            ffprobe: config.ffprobe_path.clone(),
            hwaccel: config.hwaccel.clone(),
        }
    }

    /// ffmpeg arguments that write exactly one PNG frame to stdout
    pub fn frame_args(&self, source: &FrameSource, frame_index: usize) -> Vec<String> {
        let mut args: Vec<String> = vec!["-v".into(), "error".into(), "-nostdin".into()];
        if let Some(hwaccel) = &self.hwaccel {
            args.push("-hwaccel".into());
            args.push(hwaccel.clone());
        }
        args.extend([
            "-ss".to_string(),
            format!("{:.6}", source.seek_seconds(frame_index)),
            "-i".to_string(),
            source.path.to_string_lossy().into_owned(),
            "-frames:v".to_string(),
            "1".to_string(),
            "-f".to_string(),
            "image2pipe".to_string(),
            "-vcodec".to_string(),
            "png".to_string(),
            "pipe:1".to_string(),
        ]);
        args
    }

    /// Query width, height, frame rate and frame count of a video file
    #[instrument(skip(self), fields(path = %path.display()))]
    pub async fn probe(&self, path: &Path) -> Result<VideoProbe, ContractError> {
        let output = Command::new(&self.ffprobe)
            .args([
                "-v",
                "error",
                "-select_streams",
                "v:0",
                "-show_entries",
                "stream=width,height,r_frame_rate:format=duration",
                "-of",
                "json",
            ])
            .arg(path)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await?;

        if !output.status.success() {
            return Err(ContractError::Other(format!(
                "ffprobe exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        parse_probe(&String::from_utf8_lossy(&output.stdout))
    }
}

/// Parse `ffprobe -of json` output
pub fn parse_probe(json: &str) -> Result<VideoProbe, ContractError> {
    let value: Value = serde_json::from_str(json).map_err(|e| ContractError::ConfigParse {
        message: "ffprobe output is not JSON".into(),
        source: Some(Box::new(e)),
    })?;
    let stream = &value["streams"][0];
    let missing = |field: &str| ContractError::Other(format!("ffprobe output lacks {field}"));

    let width = stream["width"].as_u64().ok_or_else(|| missing("width"))? as u32;
    let height = stream["height"].as_u64().ok_or_else(|| missing("height"))? as u32;
    let fps = stream["r_frame_rate"]
        .as_str()
        .and_then(parse_rate)
        .ok_or_else(|| missing("r_frame_rate"))?;
    // ffprobe prints duration as a string
    let duration = match &value["format"]["duration"] {
        Value::String(s) => s.parse::<f64>().ok(),
        other => other.as_f64(),
    }
    .filter(|d| d.is_finite() && *d >= 0.0)
    .ok_or_else(|| missing("format.duration"))?;

    Ok(VideoProbe {
        width,
        height,
        fps,
        frame_count: (duration * fps).round() as usize,
    })
}

/// "30000/1001" or "30"
fn parse_rate(rate: &str) -> Option<f64> {
    let fps = match rate.split_once('/') {
        Some((num, den)) => {
            let den: f64 = den.trim().parse().ok()?;
            if den == 0.0 {
                return None;
            }
            num.trim().parse::<f64>().ok()? / den
        }
        None => rate.trim().parse().ok()?,
    };
    (fps.is_finite() && fps > 0.0).then_some(fps)
}

fn decode_png(bytes: &[u8]) -> Result<DecodedFrame, image::ImageError> {
    let rgb = image::load_from_memory_with_format(bytes, image::ImageFormat::Png)?.to_rgb8();
    let (width, height) = rgb.dimensions();
    Ok(DecodedFrame {
        width,
        height,
        format: PixelFormat::Rgb8,
        data: Bytes::from(rgb.into_raw()),
    })
}

impl FrameExtractor for FfmpegExtractor {
    fn name(&self) -> &str {
        "ffmpeg"
    }

    async fn extract_frame(
        &self,
        modality_id: &ModalityId,
        source: &FrameSource,
        frame_index: usize,
    ) -> Result<DecodedFrame, ContractError> {
        let fail = |message: String| ContractError::decode(modality_id.clone(), frame_index, message);

        if let Some(count) = source.frame_count {
            if frame_index >= count {
                return Err(fail(format!("frame index beyond the file's {count} frames")));
            }
        }
        if !source.path.exists() {
            return Err(fail(format!("video file {} not found", source.path.display())));
        }

        let args = self.frame_args(source, frame_index);
        debug!(modality = %modality_id, frame_index, "spawning ffmpeg");
        let output = Command::new(&self.ffmpeg)
            .args(&args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| fail(format!("failed to spawn {}: {e}", self.ffmpeg.display())))?;

        if !output.status.success() {
            return Err(fail(format!(
                "ffmpeg exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        // seeking past the last frame exits 0 with nothing written
        if output.stdout.is_empty() {
            return Err(fail("ffmpeg produced no frame".into()));
        }
        decode_png(&output.stdout).map_err(|e| fail(format!("invalid PNG from ffmpeg: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extractor(hwaccel: Option<&str>) -> FfmpegExtractor {
        FfmpegExtractor::new(&ExtractorConfig {
            hwaccel: hwaccel.map(str::to_string),
            ..ExtractorConfig::default()
        })
    }

    fn source() -> FrameSource {
        FrameSource {
            path: PathBuf::from("/data/cam1.mp4"),
            fps: 30.0,
            frame_count: Some(900),
        }
    }

    #[test]
    fn test_frame_args_seek_by_time() {
        let args = extractor(None).frame_args(&source(), 45);
        let ss = args.iter().position(|a| a == "-ss").unwrap();
        assert_eq!(args[ss + 1], "1.500000");
        assert!(!args.contains(&"-hwaccel".to_string()));
        assert_eq!(args.last().map(String::as_str), Some("pipe:1"));
    }

    #[test]
    fn test_frame_args_hwaccel_precedes_input() {
        let args = extractor(Some("cuda")).frame_args(&source(), 0);
        let hw = args.iter().position(|a| a == "-hwaccel").unwrap();
        let input = args.iter().position(|a| a == "-i").unwrap();
        assert_eq!(args[hw + 1], "cuda");
        assert!(hw < input);
    }

    #[test]
    fn test_parse_probe() {
        let json = r#"{
            "programs": [],
            "streams": [{"width": 1920, "height": 1080, "r_frame_rate": "30000/1001"}],
            "format": {"duration": "10.010000"}
        }"#;
        let probe = parse_probe(json).unwrap();
        assert_eq!((probe.width, probe.height), (1920, 1080));
        assert!((probe.fps - 29.97).abs() < 0.01);
        assert_eq!(probe.frame_count, 300);
    }

    #[test]
    fn test_parse_probe_missing_rate() {
        let json = r#"{"streams": [{"width": 2, "height": 2, "r_frame_rate": "0/0"}],
                       "format": {"duration": "1.0"}}"#;
        let err = parse_probe(json).unwrap_err();
        assert!(err.to_string().contains("r_frame_rate"));
    }

    #[test]
    fn test_decode_png_roundtrip_pixels() {
        let mut png = Vec::new();
        let pixels = [255u8, 0, 0, 0, 255, 0];
        image::write_buffer_with_format(
            &mut std::io::Cursor::new(&mut png),
            &pixels,
            2,
            1,
            image::ColorType::Rgb8,
            image::ImageFormat::Png,
        )
        .unwrap();

        let frame = decode_png(&png).unwrap();
        assert_eq!((frame.width, frame.height), (2, 1));
        assert_eq!(&frame.data[..], &pixels);
        assert!(frame.is_consistent());
    }

    #[tokio::test]
    async fn test_missing_file_is_decode_failure() {
        let err = extractor(None)
            .extract_frame(&"cam".into(), &source(), 3)
            .await
            .unwrap_err();
        assert!(matches!(err, ContractError::DecodeFailure { frame_index: 3, .. }));
    }

    #[tokio::test]
    async fn test_index_beyond_frame_count() {
        let err = extractor(None)
            .extract_frame(&"cam".into(), &source(), 900)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("beyond"));
    }
}
