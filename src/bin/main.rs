#![forbid(unsafe_code)]

use colored::*;

fn main() {
    println!("{}", "YieldStream CLI".bright_cyan().bold());
    println!("{}", "---------------".bright_cyan());
    println!();
    println!(
        "{}",
        "This is the main entry point, but the functionality lives in separate binaries.".yellow()
    );
    println!(
        "{}",
        "Use 'cargo run --bin <binary_name>' to run a specific command.".yellow()
    );
    println!();
    println!("{}", "Available binaries:".bright_green().underline());
    println!(
        "  - {}  {}",
        "yieldstream-dapp".bright_white(),
        "rollup backend: serves /finish requests against the SQLite ledger".dimmed()
    );
    println!(
        "  - {}  {}",
        "yieldstream-demo".bright_white(),
        "deploys the contracts and runs the lending-market scenario".dimmed()
    );
    println!();
    println!("{}", "Both accept --config <path> (default: config.toml).".yellow());
    println!();
    println!("{}", "Example:".bright_green().underline());
    println!("{}", "  cargo run --bin yieldstream-dapp -- --config config.toml".italic());
}
