//! Entry point for the filecube application.
//! Handles CLI parsing, scans the directory and prints the coordinate index and
//! the commands a selection resolves to.

use clap::Parser;
use filecube::backend::Backend;
use filecube::cli::Args;
use filecube::parallel::get_parallel_info;
use serde_json::json;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

fn init_logging(verbose: bool) {
    let default = if verbose { "filecube=debug" } else { "filecube=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[cfg(feature = "netcdf")]
fn backend() -> Arc<dyn Backend> {
    Arc::new(filecube::netcdf_io::NetcdfBackend::new())
}

#[cfg(not(feature = "netcdf"))]
fn backend() -> Arc<dyn Backend> {
    Arc::new(filecube::backend::NoBackend)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse command-line arguments
    let args = Args::parse();
    init_logging(args.verbose);

    if args.verbose {
        get_parallel_info().log();
    }

    let mut session = args.session(backend())?;
    let summaries = session.scan()?;

    let selection = session.select(args.selections.iter().map(|(d, k)| (d.as_str(), k.clone())))?;
    let commands = session.commands(&selection)?;

    if args.json {
        let report = json!({
            "scan": summaries.iter().map(|s| json!({
                "filegroup": s.filegroup,
                "files_seen": s.files_seen,
                "files_matched": s.files_matched,
                "files_opened": s.files_opened,
            })).collect::<Vec<_>>(),
            "dimensions": session.dims().iter().map(|d| json!({
                "name": d.name(),
                "units": d.unit_str(),
                "values": d.values(),
            })).collect::<Vec<_>>(),
            "selection": selection.to_string(),
            "commands": commands.iter().flat_map(|(fg, cmds)| cmds.iter().map(move |cmd| json!({
                "filegroup": fg,
                "file": cmd.filename().display().to_string(),
                "keyrings": cmd.iter().map(|pair| json!({
                    "infile": pair.infile.to_string(),
                    "memory": pair.memory.to_string(),
                })).collect::<Vec<_>>(),
            }))).collect::<Vec<_>>(),
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    for summary in &summaries {
        println!(
            "Scanned {} under {}: {} files matched out of {}",
            summary.filegroup,
            args.root.display(),
            summary.files_matched,
            summary.files_seen
        );
    }
    println!("\nDimensions:");
    for dim in session.dims() {
        println!("  {:<12} {:>6} values  {}", dim.name(), dim.size(), dim.extent_str());
    }
    println!("\nSelection: [{selection}]");
    let n_commands: usize = commands.iter().map(|(_, cmds)| cmds.len()).sum();
    println!("Commands ({n_commands}):");
    for (_, cmds) in &commands {
        for cmd in cmds {
            println!("  {cmd}");
        }
    }

    if let Some(variable) = &args.variable {
        if let Some(attributes) = session.attributes(variable) {
            println!("\nAttributes of {variable}:");
            let mut entries: Vec<_> = attributes.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            for (name, value) in entries {
                println!("  {name} = {value}");
            }
        }
    }

    Ok(())
}
