//! Command handlers and the registry the resolver searches.

pub mod list;
pub mod register;
pub mod subscribe;
pub mod unsubscribe;

#[cfg(test)]
pub(crate) mod testing;

use std::io::{self, Write};
use std::process::ExitCode;

use clap::error::ErrorKind;
use clap::{Args, CommandFactory, FromArgMatches, Parser};
use subman_core::config::SubmanConfig;
use subman_core::errors::{SyncError, ValidationError, FAILURE_EXIT, VALIDATION_EXIT};
use subman_core::resolve::CommandTable;
use subman_core::traits::EntitlementService;
use subman_engine::remote::HttpEntitlementService;
use subman_engine::store::FsCertStore;
use subman_engine::sync::SyncEngine;

/// Options every command accepts.
#[derive(Args, Debug, Default)]
pub struct CommonOptions {
    /// Print debug logging to stderr.
    #[arg(long)]
    pub debug: bool,
}

/// What a handler runs against: the loaded configuration and the service
/// every engine it builds talks to.
pub struct Context<S> {
    pub config: SubmanConfig,
    service: S,
}

impl<S: EntitlementService> Context<S> {
    pub fn new(config: SubmanConfig, service: S) -> Self {
        Self { config, service }
    }

    pub fn store(&self) -> FsCertStore {
        FsCertStore::new(&self.config.paths)
    }

    pub fn engine(&self) -> SyncEngine<&S, FsCertStore> {
        SyncEngine::new(&self.service, self.store())
    }
}

/// One CLI operation: an option grammar, a pre-flight check and the work.
pub trait Command {
    type Options: Parser;

    /// Canonical, possibly multi-word, name.
    const NAME: &'static str;

    /// One-line description for the usage listing.
    fn describe() -> &'static str;

    /// Runs before anything touches the store or the network.
    fn validate_options(_options: &Self::Options) -> Result<(), ValidationError> {
        Ok(())
    }

    fn execute<S: EntitlementService>(
        options: Self::Options,
        ctx: &Context<S>,
        out: &mut dyn Write,
    ) -> anyhow::Result<()>;
}

/// Type-erased [`Command`] stored in the registry.
pub struct Handler {
    describe: &'static str,
    run: fn(&[String], &Context<HttpEntitlementService>) -> ExitCode,
}

impl Handler {
    pub fn of<C: Command>() -> Self {
        Self {
            describe: C::describe(),
            run: run::<C>,
        }
    }

    pub fn describe(&self) -> &'static str {
        self.describe
    }

    /// Parse `args` (the tokens left after the command name) and run.
    pub fn run(&self, args: &[String], ctx: &Context<HttpEntitlementService>) -> ExitCode {
        (self.run)(args, ctx)
    }
}

pub fn registry() -> CommandTable<Handler> {
    let mut table = CommandTable::new();
    table.insert(register::RegisterCommand::NAME, Handler::of::<register::RegisterCommand>());
    table.insert(subscribe::SubscribeCommand::NAME, Handler::of::<subscribe::SubscribeCommand>());
    table.insert(
        unsubscribe::UnsubscribeCommand::NAME,
        Handler::of::<unsubscribe::UnsubscribeCommand>(),
    );
    table.insert(list::ListCommand::NAME, Handler::of::<list::ListCommand>());
    table
}

fn run<C: Command>(args: &[String], ctx: &Context<HttpEntitlementService>) -> ExitCode {
    let options = match parse_options::<C>(args) {
        Ok(options) => options,
        Err(e) => {
            let code = match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => 0,
                _ => VALIDATION_EXIT,
            };
            let _ = e.print();
            return ExitCode::from(code);
        }
    };

    if let Err(e) = C::validate_options(&options) {
        eprintln!("{e}");
        return ExitCode::from(VALIDATION_EXIT);
    }

    let stdout = io::stdout();
    let mut out = stdout.lock();
    match C::execute(options, ctx, &mut out).and_then(|()| Ok(out.flush()?)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            report(&e);
            ExitCode::from(exit_code(&e))
        }
    }
}

fn parse_options<C: Command>(args: &[String]) -> Result<C::Options, clap::Error> {
    let mut command = C::Options::command().bin_name(format!("subman {}", C::NAME));
    let argv = std::iter::once(C::NAME.to_string()).chain(args.iter().cloned());
    let matches = command.try_get_matches_from_mut(argv)?;
    C::Options::from_arg_matches(&matches)
}

fn report(err: &anyhow::Error) {
    match err.downcast_ref::<SyncError>() {
        Some(e) => eprintln!("{e}"),
        None => eprintln!("Error: {err:#}"),
    }
}

fn exit_code(err: &anyhow::Error) -> u8 {
    if let Some(e) = err.downcast_ref::<SyncError>() {
        return e.exit_code();
    }
    if err.downcast_ref::<ValidationError>().is_some() {
        return VALIDATION_EXIT;
    }
    FAILURE_EXIT
}
