use clap::Parser;
use maeum_ffi::write_demo_artifacts;
use std::path::PathBuf;

#[derive(Parser)]
struct Args {
    /// Directory for the tokenizer and weight files
    #[arg(long, default_value = "models")]
    out: PathBuf,

    /// Seed for the random weights
    #[arg(long, default_value_t = 0)]
    seed: u64,
}

fn main() -> maeum::ChatResult<()> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();
    let config = write_demo_artifacts(&args.out, args.seed)?;
    println!(
        "Saved demo artifacts for {} models to {:?}",
        config.variants.len(),
        args.out
    );
    Ok(())
}
