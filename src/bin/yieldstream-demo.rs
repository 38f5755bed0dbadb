#![forbid(unsafe_code)]
//! Deploys the native-yield contracts on a dev chain and runs the demo scenario

use clap::Parser;
use colored::*;
use yieldstream::amount::format_amount;
use yieldstream::config::{load_config, LogFormat};
use yieldstream::logging::init_logging;
use yieldstream::scenario::Scenario;

#[derive(Parser)]
#[command(name = "yieldstream-demo", about = "Native-yield lending-market demo driver")]
struct Args {
    /// Path to the configuration file
    #[arg(long)]
    config: Option<String>,

    /// JSON-RPC endpoint of the dev chain
    #[arg(long)]
    rpc_url: Option<String>,

    /// Directory holding compiled contract artifacts
    #[arg(long)]
    artifacts: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let mut config = load_config(args.config.as_deref())?;
    if let Some(url) = args.rpc_url {
        config.demo.rpc_url = url;
    }
    if let Some(dir) = args.artifacts {
        config.demo.artifacts_dir = dir;
    }

    // Humans watch this one
    config.logging.format = LogFormat::Pretty;
    init_logging(&config.logging)?;

    println!("{}", "YieldStream demo".bright_cyan().bold());
    println!("{}", "----------------".bright_cyan());

    let scenario = Scenario::new(config.demo.clone())?;
    let report = match scenario.run().await {
        Ok(report) => report,
        Err(e) => {
            eprintln!("{} {}", "Demo failed:".red().bold(), e);
            std::process::exit(1);
        }
    };

    println!();
    println!("{}", "Deployed contracts".bright_green().underline());
    println!("  InputBoxWrapper:  {}", report.input_box_wrapper.to_string().bright_white());
    println!("  YieldBridge:      {}", report.yield_bridge.to_string().bright_white());
    println!("  AssetAllocator:   {}", report.asset_allocator.to_string().bright_white());
    println!("  Morpho:           {}", report.morpho.to_string().bright_white());
    println!("  Loan token:       {}", report.loan_token.to_string().bright_white());
    println!("  Collateral token: {}", report.collateral_token.to_string().bright_white());
    println!("  Market id:        {}", report.market_id.to_string().bright_white());
    println!();
    println!("{}", "Dapp balances".bright_green().underline());
    println!("  After deposit: {}", format_amount(report.balance_after_deposit).yellow());
    println!("  After rebase:  {}", format_amount(report.balance_after_rebase).yellow());
    println!();
    println!(
        "{} {} ({} voucher(s) found)",
        "Voucher executed in".bright_green(),
        report.executed_voucher_tx.to_string().bright_white(),
        report.voucher_count
    );
    Ok(())
}
