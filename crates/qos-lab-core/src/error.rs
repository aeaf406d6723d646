use qos_lab_abstract::EngineError;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum GenerateError {
    #[error("unknown variant '{0}' (expected EDCA or WMM)")]
    InvalidVariant(String),
    #[error(
        "invalid schedule for {flow}: start {start_ms} ms, stop {stop_ms} ms, duration {duration_ms} ms"
    )]
    InvalidSchedule {
        flow: String,
        start_ms: u64,
        stop_ms: u64,
        duration_ms: u64,
    },
    #[error("invalid parameter {name} = {value}")]
    InvalidParameter { name: &'static str, value: String },
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum RunError {
    #[error("variant {variant}: scenario generation failed: {source}")]
    Generate {
        variant: String,
        #[source]
        source: GenerateError,
    },
    #[error("variant {variant}: engine failure: {source}")]
    Engine {
        variant: String,
        #[source]
        source: EngineError,
    },
}

impl RunError {
    pub fn variant(&self) -> &str {
        match self {
            RunError::Generate { variant, .. } | RunError::Engine { variant, .. } => variant,
        }
    }
}
