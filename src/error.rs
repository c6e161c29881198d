use thiserror::Error;

/// Failures the caller is expected to branch on. Everything else travels as a
/// plain `anyhow::Error`.
#[derive(Debug, Clone, Error)]
pub enum PipelineError {
    #[error("validation failed for season {season} week {week}: {}", errors.join("; "))]
    Validation {
        season: i32,
        week: u32,
        errors: Vec<String>,
    },
    #[error("raw source has no rows for season {season}")]
    NoRawData { season: i32 },
    #[error("pipeline run already in progress for season {season} week {week} (holder {holder})")]
    RunInProgress {
        season: i32,
        week: u32,
        holder: String,
    },
    #[error("refusing to publish season {season} week {week}: validation did not pass")]
    ValidationNotPassed { season: i32, week: u32 },
}

impl PipelineError {
    pub fn from_anyhow(err: &anyhow::Error) -> Option<&PipelineError> {
        err.downcast_ref::<PipelineError>()
    }
}
