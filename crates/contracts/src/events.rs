//! SessionEvent - 会话内部事件
//!
//! 参考时刻变化、offset 变化、解码完成三类事件，广播给关心的模态处理方。

use serde::{Deserialize, Serialize};

use crate::{FrameKey, ModalityId};

/// 解码结果摘要
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DecodeOutcome {
    Ready { bytes: usize },
    Failed { message: String },
}

/// 会话事件
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// 时钟源发出新的参考时刻
    ReferenceChanged {
        instant: f64,
        reference_index: usize,
    },

    /// offset 被修改；`affected` 为需要重新解析的模态
    OffsetChanged {
        key: ModalityId,
        value: i64,
        affected: Vec<ModalityId>,
    },

    /// 某一帧解码结束
    DecodeCompleted { key: FrameKey, outcome: DecodeOutcome },
}

impl SessionEvent {
    /// 事件类型名 (日志/指标标签)
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ReferenceChanged { .. } => "reference_changed",
            Self::OffsetChanged { .. } => "offset_changed",
            Self::DecodeCompleted { .. } => "decode_completed",
        }
    }

    /// 该事件是否需要 `modality_id` 重新解析/重绘
    pub fn concerns(&self, modality_id: &str) -> bool {
        match self {
            Self::ReferenceChanged { .. } => true,
            Self::OffsetChanged { affected, .. } => affected.iter().any(|m| m == &modality_id),
            Self::DecodeCompleted { key, .. } => key.modality_id == modality_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offset_event_concerns_only_affected() {
        let event = SessionEvent::OffsetChanged {
            key: "skeleton_imu_shared".into(),
            value: 3,
            affected: vec!["skeleton".into(), "imu".into()],
        };
        assert!(event.concerns("imu"));
        assert!(!event.concerns("camera_1"));
        assert_eq!(event.kind(), "offset_changed");
    }

    #[test]
    fn test_decode_event_concerns_its_modality() {
        let event = SessionEvent::DecodeCompleted {
            key: FrameKey::new("camera_2", 9),
            outcome: DecodeOutcome::Ready { bytes: 12 },
        };
        assert!(event.concerns("camera_2"));
        assert!(!event.concerns("camera_1"));
    }
}
