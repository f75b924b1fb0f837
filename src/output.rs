//! Result types returned by a degradation run.

use crate::config::DegradationParameters;
use crate::error::DegradeError;
use serde::Serialize;

/// The coarse outcome of [`crate::run_pipeline`].
///
/// On failure `page_count` is always 0, whatever stage the run reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PipelineResult {
    pub success: bool,
    pub page_count: usize,
}

impl PipelineResult {
    pub fn failed() -> Self {
        Self {
            success: false,
            page_count: 0,
        }
    }
}

impl From<&Result<DegradeReport, DegradeError>> for PipelineResult {
    fn from(result: &Result<DegradeReport, DegradeError>) -> Self {
        match result {
            Ok(report) => Self {
                success: true,
                page_count: report.page_count,
            },
            Err(_) => Self::failed(),
        }
    }
}

/// Detailed record of a successful run.
#[derive(Debug, Clone, Serialize)]
pub struct DegradeReport {
    /// Pages in the output document; always equal to the source page count.
    pub page_count: usize,
    /// Size of the written output in bytes.
    pub output_bytes: u64,
    /// Wall-clock time from opening the source to persisting the output.
    pub duration_ms: u64,
    pub params: DegradationParameters,
}

impl DegradeReport {
    /// Output size relative to `original_bytes`, in percent.
    ///
    /// Negative when the output grew. `None` for an empty original.
    pub fn reduction_percent(&self, original_bytes: u64) -> Option<f64> {
        if original_bytes == 0 {
            return None;
        }
        Some((1.0 - self.output_bytes as f64 / original_bytes as f64) * 100.0)
    }
}

/// An in-memory degradation result from [`crate::degrade_bytes`].
#[derive(Debug, Clone)]
pub struct DegradeOutput {
    /// The complete output PDF.
    pub pdf: Vec<u8>,
    pub report: DegradeReport,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(output_bytes: u64) -> DegradeReport {
        DegradeReport {
            page_count: 4,
            output_bytes,
            duration_ms: 12,
            params: DegradationParameters::default(),
        }
    }

    #[test]
    fn pipeline_result_from_success() {
        let r: Result<DegradeReport, DegradeError> = Ok(report(10));
        assert_eq!(
            PipelineResult::from(&r),
            PipelineResult {
                success: true,
                page_count: 4
            }
        );
    }

    #[test]
    fn pipeline_result_from_failure_has_zero_pages() {
        let r: Result<DegradeReport, DegradeError> =
            Err(DegradeError::Internal("worker gone".into()));
        assert_eq!(PipelineResult::from(&r), PipelineResult::failed());
    }

    #[test]
    fn reduction_percent_signs() {
        assert_eq!(report(50).reduction_percent(100), Some(50.0));
        assert_eq!(report(150).reduction_percent(100), Some(-50.0));
        assert_eq!(report(1).reduction_percent(0), None);
    }

    #[test]
    fn pipeline_result_serialises() {
        let json = serde_json::to_string(&PipelineResult {
            success: true,
            page_count: 3,
        })
        .unwrap();
        assert_eq!(json, r#"{"success":true,"page_count":3}"#);
    }
}
