//! Per-modality timestamp index.
//!
//! Continuous streams keep one instant per sample. Burst streams keep only the
//! bursts and derive per-sample instants on demand; a prefix table of flat
//! sample offsets maps a flat index back to its burst.

use contracts::{Burst, ContractError, CoverageSpan, ModalityId, TimestampSeries};

#[derive(Debug, Clone)]
enum Encoding {
    Continuous {
        timestamps: Vec<f64>,
    },
    Burst {
        bursts: Vec<Burst>,
        /// Flat index of each burst's first sample
        first_index: Vec<usize>,
    },
}

/// Immutable, sorted timestamp index of one modality
#[derive(Debug, Clone)]
pub struct StreamIndex {
    modality_id: ModalityId,
    encoding: Encoding,
    len: usize,
}

impl StreamIndex {
    /// Build from a timestamp series
    ///
    /// # Errors
    /// `MalformedTimestamps` when the series is empty, contains non-finite
    /// values, is not sorted ascending, or has overlapping bursts.
    pub fn build(
        modality_id: impl Into<ModalityId>,
        series: TimestampSeries,
    ) -> Result<Self, ContractError> {
        let modality_id = modality_id.into();
        match series {
            TimestampSeries::Continuous { timestamps } => {
                Self::build_continuous(modality_id, timestamps)
            }
            TimestampSeries::Burst { bursts } => Self::build_burst(modality_id, bursts),
        }
    }

    fn build_continuous(
        modality_id: ModalityId,
        timestamps: Vec<f64>,
    ) -> Result<Self, ContractError> {
        if timestamps.is_empty() {
            return Err(ContractError::malformed(modality_id, "empty timestamp series"));
        }
        if let Some(i) = timestamps.iter().position(|t| !t.is_finite()) {
            return Err(ContractError::malformed(
                modality_id,
                format!("non-finite timestamp at index {i}"),
            ));
        }
        if let Some(i) = timestamps.windows(2).position(|w| w[1] < w[0]) {
            return Err(ContractError::malformed(
                modality_id,
                format!(
                    "timestamps not sorted: [{}]={} > [{}]={}",
                    i,
                    timestamps[i],
                    i + 1,
                    timestamps[i + 1]
                ),
            ));
        }

        let len = timestamps.len();
        Ok(Self {
            modality_id,
            encoding: Encoding::Continuous { timestamps },
            len,
        })
    }

    fn build_burst(modality_id: ModalityId, bursts: Vec<Burst>) -> Result<Self, ContractError> {
        let bursts: Vec<Burst> = bursts.into_iter().filter(|b| b.samples > 0).collect();
        if bursts.is_empty() {
            return Err(ContractError::malformed(modality_id, "no samples in any burst"));
        }

        for (i, burst) in bursts.iter().enumerate() {
            if !burst.start.is_finite() || !burst.period.is_finite() || burst.period < 0.0 {
                return Err(ContractError::malformed(
                    modality_id,
                    format!(
                        "burst {i}: invalid start={} period={}",
                        burst.start, burst.period
                    ),
                ));
            }
        }
        if let Some(i) = bursts
            .windows(2)
            .position(|w| w[1].start < w[0].last_instant())
        {
            return Err(ContractError::malformed(
                modality_id,
                format!(
                    "burst {} starts at {} before burst {} ends at {}",
                    i + 1,
                    bursts[i + 1].start,
                    i,
                    bursts[i].last_instant()
                ),
            ));
        }

        let mut first_index = Vec::with_capacity(bursts.len());
        let mut len = 0usize;
        for (i, burst) in bursts.iter().enumerate() {
            first_index.push(len);
            len = len.checked_add(burst.samples).ok_or_else(|| {
                ContractError::malformed(
                    modality_id.clone(),
                    format!("burst {i}: sample count {} overflows the index space", burst.samples),
                )
            })?;
        }

        Ok(Self {
            modality_id,
            encoding: Encoding::Burst {
                bursts,
                first_index,
            },
            len,
        })
    }

    #[inline]
    pub fn modality_id(&self) -> &ModalityId {
        &self.modality_id
    }

    /// Total resolvable sample count (never zero)
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Always false; an index is never built from an empty series
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn encoding_name(&self) -> &'static str {
        match self.encoding {
            Encoding::Continuous { .. } => "continuous",
            Encoding::Burst { .. } => "burst",
        }
    }

    #[inline]
    pub fn first_instant(&self) -> f64 {
        self.instant_unchecked(0)
    }

    #[inline]
    pub fn last_instant(&self) -> f64 {
        self.instant_unchecked(self.len - 1)
    }

    pub fn coverage_span(&self) -> CoverageSpan {
        CoverageSpan {
            modality_id: self.modality_id.clone(),
            first_instant: self.first_instant(),
            last_instant: self.last_instant(),
        }
    }

    /// Instant of sample `index`
    ///
    /// # Errors
    /// `IndexOutOfRange` when `index >= len`.
    pub fn instant_at(&self, index: usize) -> Result<f64, ContractError> {
        if index >= self.len {
            return Err(ContractError::IndexOutOfRange {
                modality_id: self.modality_id.clone(),
                index,
                len: self.len,
            });
        }
        Ok(self.instant_unchecked(index))
    }

    /// Index of the sample closest to `instant`
    ///
    /// Equidistant neighbours resolve to the earlier one, and runs of equal
    /// instants resolve to their lowest index. Queries before the first or
    /// after the last sample resolve to the ends.
    pub fn resolve_index(&self, instant: f64) -> usize {
        let i = self.lower_bound(instant);
        if i == 0 {
            return 0;
        }
        if i == self.len {
            return self.lower_bound(self.last_instant());
        }

        let left = self.instant_unchecked(i - 1);
        let right = self.instant_unchecked(i);
        if instant - left <= right - instant {
            self.lower_bound(left)
        } else {
            i
        }
    }

    /// First index whose instant is `>= value`, or `len` if none
    pub fn lower_bound(&self, value: f64) -> usize {
        match &self.encoding {
            Encoding::Continuous { timestamps } => timestamps.partition_point(|&t| t < value),
            Encoding::Burst {
                bursts,
                first_index,
            } => {
                let b = bursts.partition_point(|burst| burst.last_instant() < value);
                if b == bursts.len() {
                    return self.len;
                }
                first_index[b] + burst_lower_bound(&bursts[b], value)
            }
        }
    }

    fn instant_unchecked(&self, index: usize) -> f64 {
        match &self.encoding {
            Encoding::Continuous { timestamps } => timestamps[index],
            Encoding::Burst {
                bursts,
                first_index,
            } => {
                let b = first_index.partition_point(|&first| first <= index) - 1;
                bursts[b].instant(index - first_index[b])
            }
        }
    }
}

/// Offset of the first sample in `burst` at or after `value`.
/// Caller guarantees `burst.last_instant() >= value`.
fn burst_lower_bound(burst: &Burst, value: f64) -> usize {
    if value <= burst.start {
        return 0;
    }
    // value > start and last >= value imply period > 0
    let last = burst.samples - 1;
    let mut k = (((value - burst.start) / burst.period).ceil() as usize).min(last);

    // float guard: the division can land one sample off
    while k > 0 && burst.instant(k - 1) >= value {
        k -= 1;
    }
    while k < last && burst.instant(k) < value {
        k += 1;
    }
    k
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn continuous(ts: &[f64]) -> StreamIndex {
        StreamIndex::build(
            "m",
            TimestampSeries::Continuous {
                timestamps: ts.to_vec(),
            },
        )
        .unwrap()
    }

    /// Brute-force nearest index, ties to the smaller index
    fn oracle(ts: &[f64], q: f64) -> usize {
        let mut best = 0;
        for i in 1..ts.len() {
            if (ts[i] - q).abs() < (ts[best] - q).abs() {
                best = i;
            }
        }
        best
    }

    #[test]
    fn test_build_rejects_empty() {
        let err = StreamIndex::build("cam", TimestampSeries::Continuous { timestamps: vec![] })
            .unwrap_err();
        assert!(matches!(err, ContractError::MalformedTimestamps { .. }));
    }

    #[test]
    fn test_build_rejects_unsorted() {
        let err = StreamIndex::build(
            "cam",
            TimestampSeries::Continuous {
                timestamps: vec![0.0, 2.0, 1.0],
            },
        )
        .unwrap_err();
        assert!(err.to_string().contains("not sorted"));
    }

    #[test]
    fn test_build_rejects_nan() {
        let err = StreamIndex::build(
            "cam",
            TimestampSeries::Continuous {
                timestamps: vec![0.0, f64::NAN],
            },
        )
        .unwrap_err();
        assert!(err.to_string().contains("non-finite"));
    }

    #[test]
    fn test_build_rejects_overlapping_bursts() {
        let err = StreamIndex::build(
            "emg",
            TimestampSeries::Burst {
                bursts: vec![
                    Burst {
                        start: 0.0,
                        samples: 5,
                        period: 1.0,
                    },
                    Burst {
                        start: 3.0,
                        samples: 2,
                        period: 1.0,
                    },
                ],
            },
        )
        .unwrap_err();
        assert!(err.to_string().contains("before burst 0 ends"));
    }

    #[test]
    fn test_build_rejects_overflowing_sample_count() {
        let half = usize::MAX / 2 + 1;
        let err = StreamIndex::build(
            "insole",
            TimestampSeries::Burst {
                bursts: vec![
                    Burst {
                        start: 0.0,
                        samples: half,
                        period: 0.0,
                    },
                    Burst {
                        start: 1.0,
                        samples: half,
                        period: 0.0,
                    },
                ],
            },
        )
        .unwrap_err();
        assert!(matches!(err, ContractError::MalformedTimestamps { .. }));
        assert!(err.to_string().contains("burst 1"));
    }

    #[test]
    fn test_resolve_nearest_and_ties() {
        let idx = continuous(&[5.0, 40.0, 95.0, 140.0]);
        assert_eq!(idx.resolve_index(99.0), 2);
        assert_eq!(idx.resolve_index(-100.0), 0);
        assert_eq!(idx.resolve_index(1000.0), 3);
        // 22.5 is equidistant from 5 and 40
        assert_eq!(idx.resolve_index(22.5), 0);
        assert_eq!(idx.resolve_index(22.6), 1);
    }

    #[test]
    fn test_duplicates_resolve_to_lowest_index() {
        let idx = continuous(&[0.0, 1.0, 1.0, 1.0, 2.0, 2.0]);
        assert_eq!(idx.resolve_index(1.0), 1);
        assert_eq!(idx.resolve_index(1.2), 1);
        assert_eq!(idx.resolve_index(1.5), 1);
        assert_eq!(idx.resolve_index(1.6), 4);
        assert_eq!(idx.resolve_index(9.0), 4);
    }

    #[test]
    fn test_instant_at_bounds() {
        let idx = continuous(&[0.0, 33.0, 66.0]);
        assert_eq!(idx.instant_at(2).unwrap(), 66.0);
        let err = idx.instant_at(3).unwrap_err();
        assert!(matches!(
            err,
            ContractError::IndexOutOfRange { index: 3, len: 3, .. }
        ));
    }

    #[test]
    fn test_burst_flat_indexing() {
        let idx = StreamIndex::build(
            "insole",
            TimestampSeries::Burst {
                bursts: vec![
                    Burst {
                        start: 0.0,
                        samples: 3,
                        period: 10.0,
                    },
                    Burst {
                        start: 0.0,
                        samples: 0,
                        period: 1.0,
                    },
                    Burst {
                        start: 100.0,
                        samples: 2,
                        period: 5.0,
                    },
                ],
            },
        );
        // zero-sample burst is dropped rather than treated as overlapping
        let idx = idx.unwrap();
        assert_eq!(idx.len(), 5);
        assert_eq!(idx.encoding_name(), "burst");
        assert_eq!(idx.instant_at(2).unwrap(), 20.0);
        assert_eq!(idx.instant_at(3).unwrap(), 100.0);
        assert_eq!(idx.instant_at(4).unwrap(), 105.0);
        assert_eq!(idx.resolve_index(59.0), 2);
        assert_eq!(idx.resolve_index(61.0), 3);
        assert_eq!(idx.resolve_index(104.0), 4);
        assert_eq!(idx.last_instant(), 105.0);
    }

    #[test]
    fn test_continuous_matches_oracle() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..200 {
            let n = rng.random_range(1..40);
            // half-unit grid so ties and duplicates are common
            let mut ts: Vec<f64> = (0..n)
                .map(|_| rng.random_range(0..60) as f64 * 0.5)
                .collect();
            ts.sort_by(|a, b| a.partial_cmp(b).unwrap());
            let idx = continuous(&ts);

            for _ in 0..50 {
                let q = rng.random_range(-8..130) as f64 * 0.25;
                assert_eq!(idx.resolve_index(q), oracle(&ts, q), "ts={ts:?} q={q}");
            }
        }
    }

    #[test]
    fn test_burst_matches_flattened_oracle() {
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..100 {
            let mut bursts = Vec::new();
            let mut start = rng.random_range(0..4) as f64;
            for _ in 0..rng.random_range(1..8) {
                let burst = Burst {
                    start,
                    samples: rng.random_range(1..6),
                    period: 0.25 * rng.random_range(1..4) as f64,
                };
                start = burst.last_instant() + 0.5 * rng.random_range(0..6) as f64;
                bursts.push(burst);
            }

            let flat: Vec<f64> = bursts
                .iter()
                .flat_map(|b| (0..b.samples).map(move |k| b.instant(k)))
                .collect();
            let idx = StreamIndex::build(
                "emg",
                TimestampSeries::Burst {
                    bursts: bursts.clone(),
                },
            )
            .unwrap();
            assert_eq!(idx.len(), flat.len());

            for (i, t) in flat.iter().enumerate() {
                assert_eq!(idx.instant_at(i).unwrap(), *t);
            }
            for _ in 0..50 {
                let q = rng.random_range(-4..(4.0 * start) as i64 + 8) as f64 * 0.125;
                assert_eq!(idx.resolve_index(q), oracle(&flat, q), "bursts={bursts:?} q={q}");
            }
        }
    }
}
