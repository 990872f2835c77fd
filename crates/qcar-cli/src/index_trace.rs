//! Address-stream trace and verification
//!
//! Prints the first rows of the index generator's MAC descriptor table for
//! a layer preset (the bring-up artifact a VHDL testbench is diffed
//! against), then generates the complete stream and runs the aggregated
//! verification: total count, TLAST placement, address windows, lane range.
//!
//! Run in release mode:
//! ```bash
//! cargo run --release -p qcar-cli --bin qcar-index-trace -- --layer pad3x3
//! ```

use anyhow::{bail, Context, Result};
use clap::Parser;
use qcar_cli::presets;
use qcar_core::ConvConfig;
use qcar_model::IndexGenerator;

#[derive(Parser)]
#[command(name = "qcar-index-trace")]
#[command(about = "Index generator trace and verification", long_about = None)]
struct Cli {
    /// Layer preset (conv1..conv6 or pad3x3)
    #[arg(short, long, default_value = "pad3x3")]
    layer: String,

    /// Rows of the address table to print
    #[arg(short, long, default_value_t = 100)]
    rows: usize,

    /// Output tile edge length
    #[arg(long, default_value_t = 16)]
    tile_size: u32,
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
    let gen = IndexGenerator::new(conv.clone(), 0, 0, cli.tile_size)
        .context("failed to build index generator")?;

    println!("{}", "=".repeat(50));
    println!("IndexGenerator Trace - {}", preset.name);
    println!("{}", "=".repeat(50));
    println!();
    println!("Configuration:");
    println!(
        "  Input:       {}x{}x{}",
        conv.input_height(),
        conv.input_width(),
        conv.input_channels()
    );
    println!(
        "  Filter:      {}x{}x{} (stride={}, padding={})",
        conv.filter_height(),
        conv.filter_width(),
        conv.input_channels(),
        conv.stride(),
        conv.padding()
    );
    println!(
        "  Output:      {}x{}x{}",
        conv.output_height(),
        conv.output_width(),
        conv.num_filters()
    );
    println!("  MACs/pixel:  {}", conv.macs_per_pixel());
    println!("  Tile size:   {}x{}", gen.tile_size(), gen.tile_size());
    println!(
        "  Tiles:       {}x{} ({} total)",
        gen.tiles_per_row(),
        gen.tiles_per_col(),
        gen.total_tiles()
    );
    println!();
    println!("Expected total MACs: {}", conv.total_macs());
    println!(
        "  = {} x {} x {} x {}",
        conv.output_height(),
        conv.output_width(),
        conv.num_filters(),
        conv.macs_per_pixel()
    );
    println!();

    let macs_per_pixel = conv.macs_per_pixel() as usize;
    let first = gen.generate_first_n(cli.rows);
    println!("First {} addresses:", first.len());
    println!();
    println!("{:>5} | {:>8} | {:>8} | TLAST | OC", "Idx", "Input", "Weight");
    println!("{}", "-".repeat(50));
    for (i, record) in first.iter().enumerate() {
        println!(
            "{:>5} | 0x{:06x} | 0x{:06x} | {:>5} | {}",
            i,
            record.input_addr,
            record.weight_addr,
            if record.tlast { "Y" } else { "N" },
            record.oc_lane
        );
        if (i + 1) % macs_per_pixel == 0 {
            println!("{}", "-".repeat(50));
        }
    }
    let tlast_in_prefix = first.iter().filter(|r| r.tlast).count();
    println!();
    println!(
        "TLAST in prefix: {} (expected {})",
        tlast_in_prefix,
        first.len() / macs_per_pixel
    );
    println!();

    println!("Generating all addresses and verifying...");
    let records = gen.generate_all();
    let report = gen.verify(&records);
    let tlast_total = records.iter().filter(|r| r.tlast).count();

    println!("{}", report);
    println!("  Total MACs:      {}", records.len());
    println!(
        "  TLAST count:     {} (every {} MACs)",
        tlast_total, macs_per_pixel
    );
    println!();

    if report.passed() {
        println!("PASSED");
        Ok(())
    } else {
        bail!("address stream verification failed")
    }
}
