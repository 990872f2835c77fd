//! Parallel verification sweep over the reference network
//!
//! Runs every convolution layer of the reference classifier through the
//! pipeline model on seeded random data, one rayon task per layer (layer
//! invocations are independent; each per-layer pipeline stays sequential),
//! cross-checks the totals, and optionally dumps the summaries as JSON.
//!
//! Run in release mode:
//! ```bash
//! cargo run --release -p qcar-cli --bin qcar-layer-sweep -- --json sweep.json
//! ```

use std::fs::File;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use qcar_cli::presets::{self, LayerPreset};
use qcar_core::ConvConfig;
use qcar_io::datagen;
use qcar_model::{AcceleratorModel, LayerSummary, NullSink};
use rayon::prelude::*;
use serde::Serialize;

#[derive(Parser)]
#[command(name = "qcar-layer-sweep")]
#[command(about = "Run and verify every reference-network conv layer", long_about = None)]
struct Cli {
    /// Write per-layer summaries to this JSON file
    #[arg(short, long)]
    json: Option<PathBuf>,

    /// Seed for the random RAM images
    #[arg(short, long, default_value_t = 42)]
    seed: u64,
}

#[derive(Debug, Serialize)]
struct SweepRow {
    name: &'static str,
    input: String,
    stored_output: String,
    pooled: bool,
    summary: LayerSummary,
    consistent: bool,
}

fn run_layer(preset: &LayerPreset, seed: u64) -> Result<SweepRow> {
    let conv = ConvConfig::new(preset.shape)
        .with_context(|| format!("{}: invalid configuration", preset.name))?;
    let quant = presets::default_quant();

    let input = datagen::seeded_bytes(conv.input_len() as usize, seed);
    let weights = datagen::seeded_bytes(conv.weight_len() as usize, seed.wrapping_add(1));

    let mut model = AcceleratorModel::new(
        conv.clone(),
        quant,
        presets::output_config(&conv, preset.pool_after),
    )
    .with_context(|| format!("{}: failed to build pipeline", preset.name))?;
    let summary = model
        .run_layer(&input, &weights, &mut NullSink)
        .with_context(|| format!("{}: simulation failed", preset.name))?;

    let word_addresses: Vec<u32> = model.storage().words().map(|(addr, _)| addr).collect();
    let storage_report = model.storage().verify(&word_addresses);

    let stored_elements = u64::from(summary.output_height)
        * u64::from(summary.output_width)
        * u64::from(summary.output_channels);
    let consistent = summary.total_macs == conv.total_macs()
        && summary.outputs_stored == stored_elements
        && storage_report.passed();

    Ok(SweepRow {
        name: preset.name,
        input: format!(
            "{}x{}x{}",
            conv.input_height(),
            conv.input_width(),
            conv.input_channels()
        ),
        stored_output: format!(
            "{}x{}x{}",
            summary.output_height, summary.output_width, summary.output_channels
        ),
        pooled: preset.pool_after,
        summary,
        consistent,
    })
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    println!("{}", "=".repeat(78));
    println!("QCAR Layer Sweep - {} conv layers", presets::NETWORK.len());
    println!("{}", "=".repeat(78));
    println!();

    let rows: Vec<SweepRow> = presets::NETWORK
        .par_iter()
        .map(|preset| run_layer(preset, cli.seed))
        .collect::<Result<Vec<_>>>()?;

    println!(
        "{:<7} {:>10} {:>12} {:>12} {:>10} {:>8}  Status",
        "Layer", "Input", "Stored", "MACs", "Cycles", "Outputs"
    );
    println!("{}", "-".repeat(78));
    for row in &rows {
        println!(
            "{:<7} {:>10} {:>12} {:>12} {:>10} {:>8}  {}",
            row.name,
            row.input,
            row.stored_output,
            row.summary.total_macs,
            row.summary.cycles,
            row.summary.outputs_stored,
            if row.consistent { "ok" } else { "FAIL" }
        );
    }
    println!();

    let total_macs: u64 = rows.iter().map(|row| row.summary.total_macs).sum();
    println!("Network total MACs: {}", total_macs);

    if let Some(path) = &cli.json {
        let file = File::create(path)
            .with_context(|| format!("failed to create {}", path.display()))?;
        serde_json::to_writer_pretty(file, &rows).context("failed to write JSON report")?;
        println!("Summaries written to {}", path.display());
    }
    println!();

    if rows.iter().all(|row| row.consistent) {
        println!("All {} layers PASSED", rows.len());
        Ok(())
    } else {
        bail!("one or more layers failed verification")
    }
}
