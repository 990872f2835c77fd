//! End-to-end one-layer accelerator simulation
//!
//! Runs a layer preset through the complete pipeline model (index
//! generation, MAC cluster, dequantization, output storage), echoes the
//! first golden-trace lines for waveform comparison, and prints the totals
//! with an explicit PASSED/FAILED verdict.
//!
//! Run in release mode:
//! ```bash
//! cargo run --release -p qcar-cli --bin qcar-pipeline -- --layer conv3
//! ```

use anyhow::{bail, Context, Result};
use clap::Parser;
use qcar_cli::presets;
use qcar_core::{q824_to_f64, ConvConfig};
use qcar_io::datagen;
use qcar_model::{AcceleratorModel, VecSink};

#[derive(Parser)]
#[command(name = "qcar-pipeline")]
#[command(about = "End-to-end one-layer accelerator simulation", long_about = None)]
struct Cli {
    /// Layer preset (conv1..conv6 or pad3x3)
    #[arg(short, long, default_value = "pad3x3")]
    layer: String,

    /// Echo the first N golden-trace lines
    #[arg(short, long, default_value_t = 40)]
    trace: usize,

    /// Seed for random RAM images; the modular ramps are used when omitted
    #[arg(short, long)]
    seed: Option<u64>,

    /// Fuse 2x2 max pooling into the store path
    #[arg(short, long)]
    pooling: bool,
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let preset = presets::find(&cli.layer).with_context(|| {
        format!(
            "unknown layer '{}' (expected one of: {})",
            cli.layer,
            presets::all_names().join(", ")
        )
    })?;
    let conv = ConvConfig::new(preset.shape).context("invalid layer configuration")?;
    let quant = presets::default_quant();
    let pooling = cli.pooling || preset.pool_after;

    println!("{}", "=".repeat(70));
    println!("QCAR Pipeline Simulation - {}", preset.name);
    println!("{}", "=".repeat(70));
    println!();
    println!("Configuration:");
    println!(
        "  Input:        {}x{}x{}",
        conv.input_height(),
        conv.input_width(),
        conv.input_channels()
    );
    println!(
        "  Filters:      {} {}x{} (stride={}, padding={})",
        conv.num_filters(),
        conv.filter_height(),
        conv.filter_width(),
        conv.stride(),
        conv.padding()
    );
    println!(
        "  Output:       {}x{}x{}",
        conv.output_height(),
        conv.output_width(),
        conv.num_filters()
    );
    println!("  MACs/pixel:   {}", conv.macs_per_pixel());
    println!(
        "  Scale factor: 0x{:08x} (Q8.24 = {:.2})",
        quant.scale_factor,
        q824_to_f64(quant.scale_factor)
    );
    println!("  ReLU:         {}", quant.enable_relu);
    println!("  Pooling:      {}", pooling);
    println!();

    let (input, weights) = match cli.seed {
        Some(seed) => (
            datagen::seeded_bytes(conv.input_len() as usize, seed),
            datagen::seeded_bytes(conv.weight_len() as usize, seed.wrapping_add(1)),
        ),
        None => (
            datagen::ramp_activations(conv.input_len() as usize),
            datagen::ramp_weights(conv.weight_len() as usize),
        ),
    };

    let mut model = AcceleratorModel::new(conv.clone(), quant, presets::output_config(&conv, pooling))
        .context("failed to build pipeline")?;
    let mut sink = VecSink::new();
    let summary = model
        .run_layer(&input, &weights, &mut sink)
        .context("layer simulation failed")?;
    log::info!("layer {} simulated in {} cycles", preset.name, summary.cycles);

    if cli.trace > 0 {
        println!("First {} pipeline operations:", cli.trace.min(sink.len()));
        println!("{}", "-".repeat(70));
        for event in sink.events().iter().take(cli.trace) {
            println!("{}", event);
        }
        if sink.len() > cli.trace {
            println!("... ({} more operations) ...", sink.len() - cli.trace);
        }
        println!();
    }

    let word_addresses: Vec<u32> = model.storage().words().map(|(addr, _)| addr).collect();
    let report = model.storage().verify(&word_addresses);

    println!("{}", "=".repeat(70));
    println!("PIPELINE SIMULATION SUMMARY");
    println!("{}", "=".repeat(70));
    println!("{}", summary);
    println!("BRAM words written:    {}", word_addresses.len());
    println!("{}", report);
    println!();

    if report.passed() {
        println!("PASSED");
        Ok(())
    } else {
        bail!("output storage verification failed")
    }
}
