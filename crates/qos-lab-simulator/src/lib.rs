pub mod engine;
pub mod experiment_runner;
pub mod rate;
pub mod trace;

pub use engine::{BuiltinEngine, DropStats, SessionRecord};
pub use experiment_runner::{
    ExperimentPlan, check_expectations, load_experiment, parse_experiment, run_plan,
};
pub use trace::{ExperimentReport, VariantFailure};
