pub mod assemble;
pub mod batching;
pub mod coverage;
pub mod domain;
pub mod importance;
pub mod markdown;
pub mod pipeline;
pub mod ports;
pub mod prompts;
pub mod threading;

pub use domain::{
    MessageReference, NormalizedMessage, RunOutcome, ScoredThread, StoredReport, SummaryDocument,
    Thread,
};
pub use pipeline::{PipelineConfig, PipelineError, ReportPipeline};
pub use ports::{
    FetchWindow, GenerationError, GenerationResponse, MailSource, MailSourceError, PortError,
    PortResult, ReportStore, TextGeneration,
};
