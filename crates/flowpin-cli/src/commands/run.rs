use flowpin_core::{Config, Result, Runtime};

/// Full pipeline: load the configuration, initialize the runtime against
/// this host, drain the DAG, and write the report.
pub fn run(config_path: &str) -> Result<()> {
    let config = Config::from_file(config_path)?;
    let out_file = config.out_file_name.clone();

    let mut runtime = Runtime::initialize(config)?;
    runtime.run()?;
    runtime.stop()?;

    println!("report: {}", out_file.display());
    Ok(())
}
