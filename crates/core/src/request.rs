//! Start request and its validation.

use serde::{Deserialize, Serialize};

use crate::error::{JobError, JobResult};
use crate::id::SessionId;
use crate::job::{Job, JobKind, KindParams};

/// Accepted ADU range for flat targeting.
pub const TARGET_ADU_RANGE: core::ops::RangeInclusive<u32> = 10_000..=50_000;

/// Upper bounds applied to start requests.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValidationLimits {
    pub max_frames_per_job: u32,
    pub max_interval_seconds: f64,
    pub max_start_delay_seconds: f64,
}

impl Default for ValidationLimits {
    fn default() -> Self {
        Self {
            max_frames_per_job: 1000,
            max_interval_seconds: 3600.0,
            max_start_delay_seconds: 3600.0,
        }
    }
}

/// Body of a start call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartJobRequest {
    pub kind: JobKind,
    pub total: u32,
    #[serde(default)]
    pub interval_seconds: f64,
    #[serde(default)]
    pub kind_params: KindParams,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_session_id: Option<SessionId>,
}

impl StartJobRequest {
    pub fn new(kind: JobKind, total: u32, interval_seconds: f64) -> Self {
        Self {
            kind,
            total,
            interval_seconds,
            kind_params: KindParams::default(),
            target_session_id: None,
        }
    }

    pub fn with_params(mut self, kind_params: KindParams) -> Self {
        self.kind_params = kind_params;
        self
    }

    pub fn with_session(mut self, session_id: SessionId) -> Self {
        self.target_session_id = Some(session_id);
        self
    }

    /// Check the request against `limits` and the per-kind requirements.
    pub fn validate(&self, limits: &ValidationLimits) -> JobResult<()> {
        if self.total < 1 {
            return Err(JobError::invalid_request("total must be at least 1"));
        }
        if self.total > limits.max_frames_per_job {
            return Err(JobError::invalid_request(format!(
                "total must not exceed {}",
                limits.max_frames_per_job
            )));
        }
        if !self.interval_seconds.is_finite() || self.interval_seconds < 0.0 {
            return Err(JobError::invalid_request(
                "interval_seconds must be a non-negative number",
            ));
        }
        if self.interval_seconds > limits.max_interval_seconds {
            return Err(JobError::invalid_request(format!(
                "interval_seconds must not exceed {}",
                limits.max_interval_seconds
            )));
        }

        let params = &self.kind_params;
        let delay = params.delay_before_start_seconds;
        if !delay.is_finite() || delay < 0.0 || delay > limits.max_start_delay_seconds {
            return Err(JobError::invalid_request(format!(
                "delay_before_start_seconds must be within 0..={}",
                limits.max_start_delay_seconds
            )));
        }
        if let Some(adu) = params.target_adu {
            if !TARGET_ADU_RANGE.contains(&adu) {
                return Err(JobError::invalid_request(format!(
                    "target_adu must be within {}..={}",
                    TARGET_ADU_RANGE.start(),
                    TARGET_ADU_RANGE.end()
                )));
            }
        }

        match self.kind {
            JobKind::Single if self.total != 1 => {
                Err(JobError::invalid_request("single captures take exactly one frame"))
            }
            JobKind::SessionCapture if self.target_session_id.is_none() => Err(
                JobError::invalid_request("session-capture requires target_session_id"),
            ),
            JobKind::CalibrationDark | JobKind::CalibrationFlatDark
                if params.exposure_time.is_none() =>
            {
                Err(JobError::invalid_request(format!(
                    "{} requires exposure_time",
                    self.kind
                )))
            }
            JobKind::CalibrationFlat
                if params.exposure_time.is_none() && params.target_adu.is_none() =>
            {
                Err(JobError::invalid_request(
                    "calibration-flat requires target_adu or exposure_time",
                ))
            }
            _ => Ok(()),
        }
    }

    /// Build the pending job record for a validated request.
    pub fn into_job(self) -> Job {
        Job::new(
            self.kind,
            self.total,
            self.interval_seconds,
            self.kind_params,
            self.target_session_id,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::JobStatus;

    fn limits() -> ValidationLimits {
        ValidationLimits::default()
    }

    fn assert_invalid(req: StartJobRequest) {
        assert!(
            matches!(req.validate(&limits()), Err(JobError::InvalidRequest(_))),
            "expected rejection for {:?}",
            req
        );
    }

    #[test]
    fn accepts_plain_bulk_request() {
        let req = StartJobRequest::new(JobKind::Bulk, 5, 0.0);
        req.validate(&limits()).unwrap();
        let job = req.into_job();
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.total, 5);
    }

    #[test]
    fn rejects_zero_total_and_bad_interval() {
        assert_invalid(StartJobRequest::new(JobKind::Bulk, 0, 0.0));
        assert_invalid(StartJobRequest::new(JobKind::Bulk, 1001, 0.0));
        assert_invalid(StartJobRequest::new(JobKind::Bulk, 3, -1.0));
        assert_invalid(StartJobRequest::new(JobKind::Bulk, 3, f64::NAN));
        assert_invalid(StartJobRequest::new(JobKind::Bulk, 3, 3601.0));
    }

    #[test]
    fn kind_specific_requirements() {
        assert_invalid(StartJobRequest::new(JobKind::Single, 2, 0.0));
        assert_invalid(StartJobRequest::new(JobKind::SessionCapture, 1, 0.0));
        assert_invalid(StartJobRequest::new(JobKind::CalibrationDark, 10, 1.0));
        assert_invalid(StartJobRequest::new(JobKind::CalibrationFlatDark, 10, 1.0));
        assert_invalid(StartJobRequest::new(JobKind::CalibrationFlat, 10, 1.0));

        StartJobRequest::new(JobKind::CalibrationBias, 10, 1.0)
            .validate(&limits())
            .unwrap();
        StartJobRequest::new(JobKind::SessionCapture, 1, 0.0)
            .with_session(SessionId::new("m42"))
            .validate(&limits())
            .unwrap();
        StartJobRequest::new(JobKind::CalibrationDark, 10, 1.0)
            .with_params(KindParams {
                exposure_time: Some("30".to_string()),
                ..Default::default()
            })
            .validate(&limits())
            .unwrap();
    }

    #[test]
    fn target_adu_must_be_in_range() {
        let flat = |adu| {
            StartJobRequest::new(JobKind::CalibrationFlat, 10, 1.0).with_params(KindParams {
                target_adu: Some(adu),
                ..Default::default()
            })
        };
        assert_invalid(flat(5_000));
        assert_invalid(flat(60_000));
        flat(30_000).validate(&limits()).unwrap();
    }

    #[test]
    fn start_delay_is_bounded() {
        let req = StartJobRequest::new(JobKind::Bulk, 2, 0.0).with_params(KindParams {
            delay_before_start_seconds: -1.0,
            ..Default::default()
        });
        assert_invalid(req);
    }

    #[test]
    fn deserializes_with_defaults() {
        let req: StartJobRequest = serde_json::from_str(
            r#"{"kind":"calibration-flat-dark","total":3,"kind_params":{"exposure_time":"1/60"}}"#,
        )
        .unwrap();
        assert_eq!(req.kind, JobKind::CalibrationFlatDark);
        assert_eq!(req.interval_seconds, 0.0);
        req.validate(&limits()).unwrap();
    }
}
