use clap::Parser;
use hpv_network::{
    logging::{set_log_level, LevelFilter},
    parameters::load_parameters,
    Context, ContextModelExt, ContextSimulationExt, ContextSurveillanceExt, HpvError, ModelData,
    ReferenceTables,
};
use log::info;
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(name = "hpv-network")]
#[command(about = "Simulate HPV transmission over a dynamic sexual partnership network")]
struct Args {
    /// JSON parameter file. Table paths in it are relative to its directory
    #[arg(short, long)]
    config: PathBuf,

    /// Override the seed from the parameter file
    #[arg(short, long)]
    seed: Option<u64>,

    /// Where to write the per-(age, year) surveillance counts
    #[arg(short, long, default_value = "surveillance.csv")]
    output: PathBuf,

    /// Log level: off, error, warn, info, debug or trace
    #[arg(long, default_value = "info")]
    log_level: LevelFilter,
}

fn main() -> Result<(), HpvError> {
    let args = Args::parse();
    set_log_level(args.log_level)?;

    let mut parameters = load_parameters(&args.config)?;
    if let Some(seed) = args.seed {
        parameters.seed = seed;
    }
    let base_dir = args.config.parent().unwrap_or_else(|| Path::new("."));
    let table_paths = parameters
        .tables
        .as_ref()
        .ok_or_else(|| HpvError::ConfigError(String::from("the parameter file lists no tables")))?
        .resolve(base_dir);
    let tables = ReferenceTables::load(&table_paths)?;

    let mut context = Context::new();
    context.load_model(ModelData::new(parameters, tables)?);
    context.initialize_population()?;
    context.run_simulation()?;

    context.write_surveillance_csv(&args.output)?;
    info!("wrote surveillance counts to {}", args.output.display());
    Ok(())
}
