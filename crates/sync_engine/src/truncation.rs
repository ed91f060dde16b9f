//! Common playable window and load-time anchor.

use contracts::{Anchor, AnchorPoint, ContractError, Coverage, NavigableRange, ValidRange};
use tracing::{error, warn};

use crate::stream_index::StreamIndex;

/// Intersect every stream's coverage and project the window into each index space
///
/// `streams` must include `reference`. Offsets are ignored.
///
/// # Errors
/// `NoOverlappingCoverage` with every modality's span when the latest first
/// instant is after the earliest last instant.
pub fn compute_coverage(
    reference: &StreamIndex,
    streams: &[StreamIndex],
) -> Result<Coverage, ContractError> {
    let spans: Vec<_> = streams.iter().map(StreamIndex::coverage_span).collect();

    let t_lo = spans
        .iter()
        .map(|s| s.first_instant)
        .fold(f64::NEG_INFINITY, f64::max);
    let t_hi = spans
        .iter()
        .map(|s| s.last_instant)
        .fold(f64::INFINITY, f64::min);

    if t_lo > t_hi {
        error!(
            t_lo,
            t_hi,
            spans = ?spans,
            "recordings share no common time window"
        );
        return Err(ContractError::NoOverlappingCoverage { t_lo, t_hi, spans });
    }

    let navigable = NavigableRange {
        lo: t_lo,
        hi: t_hi,
        start_index: reference.resolve_index(t_lo),
        end_index: reference.resolve_index(t_hi),
    };

    let ranges = streams
        .iter()
        .map(|s| {
            (
                s.modality_id().clone(),
                ValidRange {
                    start_index: s.resolve_index(t_lo),
                    end_index: s.resolve_index(t_hi),
                },
            )
        })
        .collect();

    Ok(Coverage {
        navigable,
        spans,
        ranges,
    })
}

/// Resolve the anchor frame's instant in every stream
///
/// `baseline_frame` is clamped to the reference length.
pub fn compute_anchor(
    reference: &StreamIndex,
    streams: &[StreamIndex],
    baseline_frame: usize,
) -> Result<Anchor, ContractError> {
    let last = reference.len() - 1;
    let reference_frame = if baseline_frame > last {
        warn!(
            reference = %reference.modality_id(),
            baseline_frame,
            len = reference.len(),
            "reference stream shorter than baseline frame, anchoring at its last frame"
        );
        last
    } else {
        baseline_frame
    };

    let instant = reference.instant_at(reference_frame)?;
    let points = streams
        .iter()
        .map(|s| {
            let index = s.resolve_index(instant);
            Ok(AnchorPoint {
                modality_id: s.modality_id().clone(),
                index,
                instant: s.instant_at(index)?,
            })
        })
        .collect::<Result<Vec<_>, ContractError>>()?;

    Ok(Anchor {
        reference_frame,
        instant,
        points,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::TimestampSeries;

    fn uniform(id: &str, start: f64, end: f64, step: f64) -> StreamIndex {
        let n = ((end - start) / step).round() as usize + 1;
        let timestamps = (0..n).map(|i| start + i as f64 * step).collect();
        StreamIndex::build(id, TimestampSeries::Continuous { timestamps }).unwrap()
    }

    #[test]
    fn test_intersection_window() {
        let a = uniform("a", 0.0, 10000.0, 100.0);
        let b = uniform("b", 2000.0, 12000.0, 50.0);
        let streams = vec![a.clone(), b];

        let coverage = compute_coverage(&a, &streams).unwrap();
        assert_eq!(coverage.navigable.lo, 2000.0);
        assert_eq!(coverage.navigable.hi, 10000.0);
        assert_eq!(coverage.navigable.start_index, 20);
        assert_eq!(coverage.navigable.end_index, 100);
        assert!(!coverage.navigable.contains(1000.0));

        assert_eq!(
            coverage.range_of("b"),
            Some(ValidRange {
                start_index: 0,
                end_index: 160
            })
        );
    }

    #[test]
    fn test_disjoint_recordings_fail() {
        let a = uniform("a", 0.0, 10.0, 1.0);
        let b = uniform("b", 20.0, 30.0, 1.0);
        let err = compute_coverage(&a, &[a.clone(), b]).unwrap_err();
        match err {
            ContractError::NoOverlappingCoverage { t_lo, t_hi, spans } => {
                assert_eq!(t_lo, 20.0);
                assert_eq!(t_hi, 10.0);
                assert_eq!(spans.len(), 2);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_touching_ranges_overlap_in_one_instant() {
        let a = uniform("a", 0.0, 10.0, 1.0);
        let b = uniform("b", 10.0, 20.0, 1.0);
        let coverage = compute_coverage(&a, &[a.clone(), b]).unwrap();
        assert_eq!(coverage.navigable.start_index, 10);
        assert_eq!(coverage.navigable.end_index, 10);
    }

    #[test]
    fn test_anchor_resolves_every_stream() {
        let reference = uniform("cam", 0.0, 9.9, 0.033);
        let imu = uniform("imu", 0.5, 12.0, 0.01);
        let anchor = compute_anchor(&reference, &[reference.clone(), imu], 100).unwrap();

        assert_eq!(anchor.reference_frame, 100);
        assert!((anchor.instant - 3.3).abs() < 1e-9);
        assert_eq!(anchor.points[0].index, 100);
        assert_eq!(anchor.points[1].index, 280);
    }

    #[test]
    fn test_anchor_clamped_to_short_reference() {
        let reference = uniform("cam", 0.0, 1.0, 0.1);
        let anchor = compute_anchor(&reference, &[reference.clone()], 100).unwrap();
        assert_eq!(anchor.reference_frame, 10);
    }
}
