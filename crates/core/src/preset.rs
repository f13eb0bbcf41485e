//! Built-in calibration frame sets.

use serde::{Deserialize, Serialize};

use crate::job::{JobKind, KindParams};
use crate::request::StartJobRequest;

struct PresetRow {
    name: &'static str,
    description: &'static str,
    kind: JobKind,
    count: u32,
    exposure_times: &'static [&'static str],
    target_adu: Option<u32>,
    filters: &'static [&'static str],
}

const PRESETS: &[PresetRow] = &[
    PresetRow {
        name: "Standard Dark Set",
        description: "20 dark frames for each exposure time used in session",
        kind: JobKind::CalibrationDark,
        count: 20,
        exposure_times: &["30", "60", "120", "300"],
        target_adu: None,
        filters: &[],
    },
    PresetRow {
        name: "Bias Frame Set",
        description: "50 bias frames for readout noise calibration",
        kind: JobKind::CalibrationBias,
        count: 50,
        exposure_times: &[],
        target_adu: None,
        filters: &[],
    },
    PresetRow {
        name: "L Filter Flats",
        description: "20 flat field frames for luminance filter",
        kind: JobKind::CalibrationFlat,
        count: 20,
        exposure_times: &[],
        target_adu: Some(30_000),
        filters: &[],
    },
    PresetRow {
        name: "RGB Filter Flats",
        description: "15 flat frames each for R, G, B filters",
        kind: JobKind::CalibrationFlat,
        count: 15,
        exposure_times: &[],
        target_adu: Some(25_000),
        filters: &["R", "G", "B"],
    },
];

/// A named calibration frame set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationPreset {
    pub name: String,
    pub description: String,
    pub kind: JobKind,
    /// Frames per exposure time and filter.
    pub count: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exposure_times: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_adu: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub filters: Vec<String>,
}

impl CalibrationPreset {
    /// One start request per exposure time and filter, ready for a batch.
    pub fn requests(&self) -> Vec<StartJobRequest> {
        let exposures: Vec<Option<&str>> = if self.exposure_times.is_empty() {
            vec![None]
        } else {
            self.exposure_times.iter().map(|e| Some(e.as_str())).collect()
        };
        let filters: Vec<Option<&str>> = if self.filters.is_empty() {
            vec![None]
        } else {
            self.filters.iter().map(|f| Some(f.as_str())).collect()
        };

        let mut requests = Vec::with_capacity(exposures.len() * filters.len());
        for filter in &filters {
            for exposure in &exposures {
                let params = KindParams {
                    base_name: filter.map(|f| {
                        let frame_type = self.kind.calibration_frame_type().unwrap_or("frame");
                        format!("{frame_type}_{f}")
                    }),
                    exposure_time: exposure.map(str::to_string),
                    target_adu: self.target_adu,
                    ..Default::default()
                };
                requests.push(StartJobRequest::new(self.kind, self.count, 0.0).with_params(params));
            }
        }
        requests
    }
}

/// The built-in calibration presets.
pub fn calibration_presets() -> Vec<CalibrationPreset> {
    PRESETS
        .iter()
        .map(|row| CalibrationPreset {
            name: row.name.to_string(),
            description: row.description.to_string(),
            kind: row.kind,
            count: row.count,
            exposure_times: row.exposure_times.iter().map(|e| e.to_string()).collect(),
            target_adu: row.target_adu,
            filters: row.filters.iter().map(|f| f.to_string()).collect(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::ValidationLimits;

    #[test]
    fn every_preset_expands_to_valid_requests() {
        let limits = ValidationLimits::default();
        for preset in calibration_presets() {
            let requests = preset.requests();
            assert!(!requests.is_empty(), "{}", preset.name);
            for request in requests {
                request.validate(&limits).unwrap();
                assert_eq!(request.total, preset.count);
            }
        }
    }

    #[test]
    fn dark_set_has_one_request_per_exposure() {
        let darks = calibration_presets()
            .into_iter()
            .find(|p| p.kind == JobKind::CalibrationDark)
            .unwrap();
        let exposures: Vec<_> = darks
            .requests()
            .into_iter()
            .map(|r| r.kind_params.exposure_time.unwrap())
            .collect();
        assert_eq!(exposures, vec!["30", "60", "120", "300"]);
    }

    #[test]
    fn filter_flats_are_named_per_filter() {
        let rgb = calibration_presets()
            .into_iter()
            .find(|p| p.filters.len() == 3)
            .unwrap();
        let requests = rgb.requests();
        let names: Vec<_> = requests
            .iter()
            .map(|r| r.kind_params.base_name.clone().unwrap())
            .collect();
        assert_eq!(names, vec!["flat_R", "flat_G", "flat_B"]);
        assert!(requests.iter().all(|r| r.kind_params.target_adu == Some(25_000)));
    }
}
