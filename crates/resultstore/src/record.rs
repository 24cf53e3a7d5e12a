use serde::{Deserialize, Serialize};

/// Pixel comparison results for one URL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffMetrics {
    pub num_diff_pixels: u64,
    /// Share of differing pixels, 0 to 100.
    pub pixel_diff_percent: f64,
    /// Largest per-channel difference: red, green, blue.
    pub max_rgb_diffs: [u32; 3],
    pub num_static_pixels: u64,
    /// Pixels that differ between repeated captures of the same side.
    pub num_dynamic_pixels: u64,
}

/// One visual-diff observation, keyed by `(run_id, url)`.
///
/// The ingestion side writes a record several times as it progresses: first
/// with the reference image only, then with both images, finally with diff
/// metrics. Each write replaces the previous one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    pub run_id: String,
    pub url: String,
    #[serde(default)]
    pub rank: i64,
    #[serde(default)]
    pub reference_image_id: String,
    #[serde(default)]
    pub patch_image_id: String,
    #[serde(default)]
    pub diff_metrics: Option<DiffMetrics>,
}

impl Record {
    /// A record with only its identity filled in.
    pub fn new(run_id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            url: url.into(),
            rank: 0,
            reference_image_id: String::new(),
            patch_image_id: String::new(),
            diff_metrics: None,
        }
    }

    /// Both screenshots are present.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        !self.reference_image_id.is_empty() && !self.patch_image_id.is_empty()
    }

    /// Diff metrics have been computed. Only eligible records are cached.
    #[must_use]
    pub fn is_eligible(&self) -> bool {
        self.diff_metrics.is_some()
    }

    #[must_use]
    pub fn diff_percent(&self) -> Option<f64> {
        self.diff_metrics.as_ref().map(|m| m.pixel_diff_percent)
    }

    pub(crate) fn to_bytes(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }

    pub(crate) fn from_bytes(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }
}
