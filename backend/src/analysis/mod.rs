pub mod client;
pub mod pipeline;
pub mod prompt;
pub mod request;

pub use client::{OpenAiVisionClient, VisionModel};
pub use pipeline::{AnalysisPipeline, RetryPolicy, Stage};
pub use request::{AnalysisRequest, AnalysisRequestBuilder};
