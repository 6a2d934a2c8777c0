//! Cubeserve loader CLI - loads a manifest tree once (or keeps reloading it)
//! and logs what was indexed.
//!
//! Usage: cubeserve [OPTIONS]
//!
//! Options:
//!   --config <FILE>     JSON storage config
//!   --manifest <URL>    Root manifest URL (file://, http(s):// or a path)
//!   --snapshot <FILE>   Last-known-good snapshot location
//!   --watch             Keep reloading until killed
//!
//! Flags override `CUBESERVE_*` environment variables, which override the config file.

use std::path::PathBuf;
use std::process::ExitCode;

use cubeserve::core::{logging, Result, StorageConfig};
use cubeserve::dataset::Snapshot;
use cubeserve::streaming::{LoadStatus, Storage};

#[derive(Debug, Default)]
struct Args {
    config: Option<PathBuf>,
    manifest: Option<String>,
    snapshot: Option<PathBuf>,
    watch: bool,
}

fn parse_args() -> std::result::Result<Args, String> {
    let mut args = std::env::args().skip(1);
    let mut parsed = Args::default();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => {
                parsed.config = Some(args.next().ok_or("--config needs a file")?.into());
            }
            "--manifest" => {
                parsed.manifest = Some(args.next().ok_or("--manifest needs a URL")?);
            }
            "--snapshot" => {
                parsed.snapshot = Some(args.next().ok_or("--snapshot needs a file")?.into());
            }
            "--watch" => parsed.watch = true,
            "-h" | "--help" => return Err("show_help".to_string()),
            other => return Err(format!("unknown argument: {}", other)),
        }
    }

    Ok(parsed)
}

fn print_help() {
    println!("Usage: cubeserve [--config <file>] [--manifest <url>] [--snapshot <file>] [--watch]");
}

fn build_config(args: &Args) -> Result<StorageConfig> {
    let mut config = match &args.config {
        Some(path) => StorageConfig::load_sync(path)?,
        None => StorageConfig::default(),
    };
    config.apply_process_env()?;
    if let Some(manifest) = &args.manifest {
        config.manifest_url = manifest.clone();
    }
    if let Some(snapshot) = &args.snapshot {
        config.snapshot_path = Some(snapshot.clone());
    }
    config.validate()?;
    Ok(config)
}

fn log_summary(snapshot: &Snapshot) {
    for version in snapshot.set_versions() {
        log::info!("{} / {}", version.name(), version.version());
        for lod in version.detail_levels().values() {
            log::info!(
                "  {}: {} cubes, set size {}, world {:?} -> {:?}",
                lod.name(),
                lod.cubes().object_count(),
                lod.set_size(),
                lod.world_bounds().min,
                lod.world_bounds().max
            );
        }
    }
}

fn log_failures(storage: &Storage) {
    if let Some(failed) = storage.last_loader_results() {
        for error in failed.errors() {
            log::error!("{}", error);
        }
    }
}

async fn run(storage: &Storage, watch: bool) -> bool {
    let mut rx = storage.subscribe();
    let mut seen = 0;

    loop {
        let status: LoadStatus = match rx.wait_for(|s| s.cycles > seen).await {
            Ok(status) => *status,
            Err(_) => {
                log::error!("Loader stopped unexpectedly");
                return false;
            }
        };
        seen = status.cycles;

        if status.last_cycle_ok {
            if let Some(snapshot) = storage.last_known_good() {
                log_summary(&snapshot);
            }
        } else {
            log_failures(storage);
        }

        if !watch {
            return status.last_cycle_ok;
        }
    }
}

fn main() -> ExitCode {
    logging::init();

    let args = match parse_args() {
        Ok(args) => args,
        Err(e) if e == "show_help" => {
            print_help();
            return ExitCode::SUCCESS;
        }
        Err(e) => {
            log::error!("{}", e);
            print_help();
            return ExitCode::FAILURE;
        }
    };

    let config = match build_config(&args) {
        Ok(config) => config,
        Err(e) => {
            log::error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            log::error!("Failed to create runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let mut storage = match Storage::start(config) {
        Ok(storage) => storage,
        Err(e) => {
            log::error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let ok = runtime.block_on(run(&storage, args.watch));
    storage.shutdown();

    if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE }
}
