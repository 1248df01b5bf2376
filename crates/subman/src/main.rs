#![forbid(unsafe_code)]

mod commands;
mod output;

use std::process::ExitCode;

use subman_core::config::SubmanConfig;
use subman_core::errors::FAILURE_EXIT;
use subman_core::resolve::{strip_command_tokens, CommandTable};
use subman_engine::remote::HttpEntitlementService;
use tracing_subscriber::EnvFilter;

use commands::{Context, Handler};

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().skip(1).collect();
    init_logging(args.iter().any(|a| a == "--debug"));

    let registry = commands::registry();
    let Some(resolved) = registry.resolve(&args) else {
        print_usage(&registry);
        return ExitCode::from(FAILURE_EXIT);
    };
    tracing::debug!(command = resolved.name, "resolved command");

    let config = match SubmanConfig::load_default() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e:#}");
            return ExitCode::from(FAILURE_EXIT);
        }
    };

    let service = match HttpEntitlementService::new(&config.server) {
        Ok(service) => service,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::from(FAILURE_EXIT);
        }
    };

    let rest = strip_command_tokens(&args, resolved.consumed);
    resolved.command.run(&rest, &Context::new(config, service))
}

/// `error` unless `--debug`; `RUST_LOG` wins over both.
fn init_logging(debug: bool) {
    let default = if debug { "debug" } else { "error" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();
}

fn print_usage(registry: &CommandTable<Handler>) {
    println!("\nUsage: subman [options] MODULENAME --help\n");
    println!("Supported modules:\n");
    for (name, handler) in registry.iter() {
        println!("\t{name:<14} {:<25}", handler.describe());
    }
    println!();
}
