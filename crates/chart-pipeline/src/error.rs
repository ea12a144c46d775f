use core_types::OrchestrationError;
use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum ChartError {
    #[error("chart renderer unavailable: {0}")]
    RendererUnavailable(String),

    #[error("chart upload failed: {0}")]
    UploadFailed(String),

    #[error("chart pipeline exceeded its deadline")]
    Timeout,

    #[error("renderer returned a placeholder image, refusing to use it")]
    PlaceholderRejected,
}

impl From<ChartError> for OrchestrationError {
    fn from(e: ChartError) -> Self {
        OrchestrationError::ChartGenerationFailed(e.to_string())
    }
}
