//! Run orchestration: locus, adapters, identity resolution, integration.

mod pipeline_service;
mod run_report;

pub use pipeline_service::Pipeline;
pub use run_report::RunReport;
