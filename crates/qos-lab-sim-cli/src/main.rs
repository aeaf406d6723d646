use anyhow::{Context, Result};
use clap::Parser;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use qos_lab_abstract::{
    ChannelConfigOverride, PointToPointParamsOverride, ScenarioParamsOverride, Topology,
};
use qos_lab_core::{render_comparison, render_flow_listing, render_summary_table};
use qos_lab_simulator::{
    ExperimentPlan, ExperimentReport, check_expectations, load_experiment, run_plan,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Compare Wi-Fi QoS variants on a VoIP-like workload")]
struct Args {
    /// Load an experiment from disk. Flags below override its values.
    #[arg(long)]
    experiment: Option<PathBuf>,

    /// Variants to run, in order (e.g. EDCA,WMM).
    #[arg(long, value_delimiter = ',')]
    variants: Option<Vec<String>>,

    /// Number of stations around the access point.
    #[arg(short = 'n', long)]
    stations: Option<u32>,

    /// Placement radius in meters.
    #[arg(long)]
    radius: Option<f64>,

    /// Payload bytes per packet.
    #[arg(long)]
    packet_size: Option<u32>,

    /// Base packet interval of the first station.
    #[arg(long)]
    interval_ms: Option<u64>,

    #[arg(short = 's', long)]
    duration_ms: Option<u64>,

    /// Channel RNG seed.
    #[arg(long)]
    seed: Option<u64>,

    /// Per-frame loss probability at the lowest rate mode.
    #[arg(long)]
    loss_rate: Option<f64>,

    /// Run the single wired RTP-like link instead of the Wi-Fi scenario.
    #[arg(long, default_value_t = false)]
    point_to_point: bool,

    /// Stop each point-to-point source after this many packets.
    #[arg(long)]
    max_packets: Option<u64>,

    /// Print one line per flow after the summary table.
    #[arg(long, default_value_t = false)]
    per_flow: bool,

    /// Write a JSON report of the finished experiment.
    #[arg(long)]
    trace_out: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging();
    info!("qos-lab starting…");

    let mut plan = match &args.experiment {
        Some(path) => ExperimentPlan::from_experiment(&load_experiment(path)?),
        None => ExperimentPlan::default(),
    };
    args.apply_to(&mut plan);

    let report = run_plan(&plan);
    print_report(&report, args.per_flow);

    if let Some(trace_path) = &args.trace_out {
        write_trace(trace_path, &report)?;
    }

    if !report.failures.is_empty() {
        let names: Vec<&str> = report.failures.iter().map(|f| f.variant.as_str()).collect();
        anyhow::bail!(
            "{} of {} variants failed: {}",
            names.len(),
            plan.requests.len(),
            names.join(", ")
        );
    }
    check_expectations(&report, &plan.expectations)?;
    Ok(())
}

impl Args {
    fn apply_to(&self, plan: &mut ExperimentPlan) {
        ScenarioParamsOverride {
            station_count: self.stations,
            radius_m: self.radius,
            packet_size: self.packet_size,
            base_interval_ms: self.interval_ms,
            duration_ms: self.duration_ms,
        }
        .apply_to(&mut plan.params);
        PointToPointParamsOverride {
            packet_size: self.packet_size,
            interval_ms: self.interval_ms,
            max_packets: self.max_packets,
            duration_ms: self.duration_ms,
            ..Default::default()
        }
        .apply_to(&mut plan.link);
        if self.point_to_point {
            plan.topology = Topology::PointToPoint;
        }
        ChannelConfigOverride {
            loss_rate: self.loss_rate,
            seed: self.seed,
            ..Default::default()
        }
        .apply_to(&mut plan.channel);
        if let Some(variants) = &self.variants {
            plan.set_variants(variants);
        }
    }
}

/// Logs go to stderr; stdout carries only the report.
fn init_logging() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .init();
}

fn print_report(report: &ExperimentReport, per_flow: bool) {
    print!("{}", render_summary_table(&report.summaries()));
    for failure in &report.failures {
        println!("{:<10} FAILED: {}", failure.variant, failure.error);
    }
    if per_flow {
        for variant in &report.variants {
            println!();
            print!("{}", render_flow_listing(variant));
        }
    }
    println!();
    print!("{}", render_comparison(&report.leaders));
}

fn write_trace(path: &Path, report: &ExperimentReport) -> Result<()> {
    let data = serde_json::to_vec_pretty(report).context("Failed to serialize experiment report")?;
    fs::write(path, &data)
        .with_context(|| format!("Failed to write trace file {}", path.display()))?;
    Ok(())
}
