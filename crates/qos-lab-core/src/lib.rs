pub mod aggregate;
pub mod error;
pub mod generator;
pub mod point_to_point;
pub mod policy;
pub mod report;
pub mod runner;

pub use aggregate::{FlowMetrics, VariantSummary, summarize};
pub use error::{GenerateError, RunError};
pub use generator::{Scenario, generate};
pub use point_to_point::{point_to_point_scenario, run_point_to_point, run_point_to_point_variants};
pub use policy::Variant;
pub use report::{
    MetricLeader, compare, outperforms, render_comparison, render_flow_listing,
    render_summary_table,
};
pub use runner::{
    FlowReport, VariantOutcome, VariantReport, VariantRequest, run_variant, run_variants,
};
