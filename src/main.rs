use clap::Parser;
use log::{error, info};
use std::path::Path;

use checkride::configuration::config::Config;
use checkride::controller::controller_handler::Controller;

#[derive(Parser)]
#[command(name = "checkride")]
#[command(version = "0.1.0")]
#[command(about = "ACS mock oral evaluation and scoring service")]
struct Args {
    /// Optional TOML configuration file; built-in defaults apply when omitted
    config_file: Option<String>,
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .format_target(false)
        .init();

    println!(
        "
==============================================================================
         Checkride - ACS mock oral evaluation and scoring service
==============================================================================
"
    );

    info!("Importing configuration");

    let args = Args::parse();
    let config = match args.config_file {
        Some(path) => match Config::from_file(Path::new(path.as_str())) {
            Ok(config) => config,
            Err(e) => {
                error!("Unable to import configuration from file: {:?}", e);
                std::process::exit(1);
            }
        },
        None => {
            info!("No configuration file given, using defaults");
            Config::default()
        }
    };

    info!("Configuration imported successfully");

    // Storage construction blocks on its own runtime, so it cannot run
    // on an async worker thread.
    let controller = match tokio::task::spawn_blocking(move || Controller::new(config)).await {
        Ok(Ok(controller)) => controller,
        Ok(Err(e)) => {
            error!(
                "Unable to create a controller instance: {:?}, exiting...",
                e
            );
            std::process::exit(1);
        }
        Err(e) => {
            error!("Controller startup task failed: {:?}, exiting...", e);
            std::process::exit(1);
        }
    };

    info!("Spawning the controller");
    if let Err(e) = controller.run().await {
        error!(
            "Error occured in the controller process: {:?}, exiting...",
            e
        );
        std::process::exit(1);
    }
}
