mod cli;

use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use log::{error, info};
use nexus_core::{CoreConfig, KernelError, LifecycleController};
use serde::Serialize;

use cli::{CliArgs, Commands};

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = CliArgs::parse();

    if args.ping {
        println!("pong");
        return ExitCode::SUCCESS;
    }

    let config = match &args.config {
        Some(path) => match CoreConfig::load(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Failed to load configuration: {}", e);
                return ExitCode::FAILURE;
            }
        },
        None => cli::builtin_config(),
    };

    let controller = LifecycleController::from_config(&config, cli::core_catalog());
    let result = match controller.start(config.plugins.clone()).await {
        Ok(report) => {
            info!("Loaded plugins in order: {}", report.order.join(", "));
            run(&controller, &config, args.command).await
        }
        Err(e) => Err(e),
    };

    match controller.shutdown().await {
        Ok(report) if report.timed_out => {
            error!("Shutdown grace exceeded; abandoned {} delivery(ies)", report.abandoned)
        }
        Ok(_) => {}
        Err(e) => error!("Shutdown failed: {}", e),
    }

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error [{}]: {}", e.kind(), e);
            ExitCode::FAILURE
        }
    }
}

async fn run(controller: &LifecycleController, config: &CoreConfig, command: Option<Commands>) -> Result<(), KernelError> {
    match command {
        Some(Commands::ListAddons) => print_json(&controller.list_addons().await),
        Some(Commands::Enable { id }) => {
            controller.enable(&id).await?;
            print_state(controller, &id).await;
            Ok(())
        }
        Some(Commands::Disable { id }) => {
            controller.disable(&id).await?;
            print_state(controller, &id).await;
            Ok(())
        }
        Some(Commands::Reload { id }) => {
            controller.reload(&id, None).await?;
            print_state(controller, &id).await;
            Ok(())
        }
        Some(Commands::Execute { task, payload, timeout_ms }) => {
            let payload = serde_json::from_str(&payload).map_err(|e| KernelError::Other(format!("invalid --payload: {}", e)))?;
            let timeout = timeout_ms.map(Duration::from_millis).unwrap_or_else(|| config.execute_timeout());
            let outcome = controller.execute(&task, payload, timeout).await?;
            print_json(&outcome)?;
            if outcome.ok {
                Ok(())
            } else {
                Err(KernelError::Other(format!("task '{}' reported failure", task)))
            }
        }
        Some(Commands::Status) => print_json(&controller.status().await),
        None => {
            let status = controller.status().await;
            println!(
                "Nexus running with {} of {} plugin(s) active",
                status.plugins.count(nexus_core::PluginState::Active),
                status.plugins.total
            );
            Ok(())
        }
    }
}

async fn print_state(controller: &LifecycleController, id: &str) {
    match controller.instance_state(id).await {
        Some(state) => println!("{}: {}", id, state),
        None => println!("{}: unknown", id),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<(), KernelError> {
    let text = serde_json::to_string_pretty(value).map_err(|e| KernelError::Other(format!("cannot render output: {}", e)))?;
    println!("{}", text);
    Ok(())
}
