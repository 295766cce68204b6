//! data-bakery CLI: bake YAML recipes into SQL seed files.

use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    name = "data-bakery",
    version,
    about = "Bake declarative YAML recipes into deterministic SQL seed data with resolved IDs"
)]
struct Cli {
    #[command(subcommand)]
    command: data_bakery::cli::Commands,
}

fn main() {
    let cli = Cli::parse();
    if let Err(e) = data_bakery::cli::dispatch(cli.command) {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}
