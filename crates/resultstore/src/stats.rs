//! Aggregate counts and the diff-percentage histogram for one run.
use serde::Serialize;

use crate::record::Record;

/// Ten buckets: `[0,10)`, `[10,20)`, ... `[80,90)`, then the closed `[90,100]`.
pub const HISTOGRAM_BUCKETS: usize = 10;
const BUCKET_WIDTH: f64 = 10.0;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultStats {
    pub num_total_results: usize,
    /// Records with at least one dynamic pixel.
    pub num_dynamic_content: usize,
    /// Records with exactly 0% difference.
    pub num_zero_diff: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Histogram {
    counts: [usize; HISTOGRAM_BUCKETS],
}

impl Histogram {
    /// Bucket index for a diff percentage. 90 and above land in the last
    /// bucket; negative or NaN input lands in the first.
    pub fn bucket_for(percent: f64) -> usize {
        if percent >= BUCKET_WIDTH * (HISTOGRAM_BUCKETS - 1) as f64 {
            return HISTOGRAM_BUCKETS - 1;
        }
        // `as` saturates: NaN and negatives become 0.
        ((percent / BUCKET_WIDTH) as usize).min(HISTOGRAM_BUCKETS - 1)
    }

    pub fn add(&mut self, percent: f64) {
        self.counts[Self::bucket_for(percent)] += 1;
    }

    pub fn counts(&self) -> &[usize; HISTOGRAM_BUCKETS] {
        &self.counts
    }

    /// Interval label of bucket `idx`, e.g. `[10,20)`.
    pub fn label(idx: usize) -> String {
        let lo = idx * 10;
        if idx + 1 == HISTOGRAM_BUCKETS {
            format!("[{},100]", lo)
        } else {
            format!("[{},{})", lo, lo + 10)
        }
    }
}

/// Computes counts and histogram in one pass. Records without metrics count
/// toward the total only.
pub fn compute(records: &[Record]) -> (ResultStats, Histogram) {
    let mut stats = ResultStats {
        num_total_results: records.len(),
        ..ResultStats::default()
    };
    let mut histogram = Histogram::default();

    for m in records.iter().filter_map(|r| r.diff_metrics.as_ref()) {
        if m.num_dynamic_pixels > 0 {
            stats.num_dynamic_content += 1;
        }
        if m.pixel_diff_percent == 0.0 {
            stats.num_zero_diff += 1;
        }
        histogram.add(m.pixel_diff_percent);
    }

    (stats, histogram)
}
