use std::io::Write;

use anyhow::bail;
use clap::Parser;
use subman_core::errors::ValidationError;
use subman_core::register::DEFAULT_CONSUMER_NAME;
use subman_core::traits::{CertificateStore, EntitlementService};
use subman_engine::facts::collect_facts;
use tracing::debug;

use super::{Command, CommonOptions, Context};

/// Register this system with the entitlement service.
#[derive(Parser, Debug)]
pub struct RegisterOptions {
    #[command(flatten)]
    pub common: CommonOptions,

    /// Account user name.
    #[arg(long)]
    pub username: Option<String>,

    /// Account password.
    #[arg(long)]
    pub password: Option<String>,

    /// Register again even if this system already has an identity.
    #[arg(long)]
    pub force: bool,

    /// Consumer display name.
    #[arg(long, default_value = DEFAULT_CONSUMER_NAME)]
    pub name: String,
}

const MISSING_CREDENTIALS: &str =
    "Error: username and password are required to register, try --help.";

pub struct RegisterCommand;

impl Command for RegisterCommand {
    type Options = RegisterOptions;
    const NAME: &'static str = "register";

    fn describe() -> &'static str {
        "register the client to a Unified Entitlement Platform."
    }

    fn validate_options(options: &RegisterOptions) -> Result<(), ValidationError> {
        let given = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.is_empty());
        if !(given(&options.username) && given(&options.password)) {
            return Err(ValidationError::new(MISSING_CREDENTIALS));
        }
        Ok(())
    }

    fn execute<S: EntitlementService>(
        options: RegisterOptions,
        ctx: &Context<S>,
        out: &mut dyn Write,
    ) -> anyhow::Result<()> {
        let username = options.username.unwrap_or_default();
        let password = options.password.unwrap_or_default();

        if ctx.store().identity_exists() && !options.force {
            bail!("This system is already registered. Use --force to register again.");
        }

        let engine = ctx.engine();
        let facts = collect_facts();
        debug!(facts = facts.len(), "collected host facts");
        let registration = engine.register_as(&username, &password, &options.name, &facts)?;

        writeln!(out, "The system has been registered with id: {}", registration.identity.uuid)?;
        for outcome in registration.auto_bind.iter().filter(|o| o.is_ok()) {
            writeln!(out, "Bind Product {}", outcome.product_id)?;
        }
        Ok(())
    }
}
