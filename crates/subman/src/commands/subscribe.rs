use std::io::Write;

use clap::Parser;
use subman_core::errors::ValidationError;
use subman_core::traits::EntitlementService;
use subman_core::types::SubscribeSelector;

use super::{Command, CommonOptions, Context};

/// Subscribe this system to a product, registration token or pool.
#[derive(Parser, Debug)]
pub struct SubscribeOptions {
    #[command(flatten)]
    pub common: CommonOptions,

    /// Product id to subscribe to.
    #[arg(long)]
    pub product: Option<String>,

    /// Registration token.
    #[arg(long)]
    pub regtoken: Option<String>,

    /// Subscription pool id.
    #[arg(long)]
    pub pool: Option<String>,
}

impl SubscribeOptions {
    fn selector(&self) -> Result<SubscribeSelector, ValidationError> {
        SubscribeSelector::from_flags(
            self.product.as_deref(),
            self.regtoken.as_deref(),
            self.pool.as_deref(),
        )
    }
}

pub struct SubscribeCommand;

impl Command for SubscribeCommand {
    type Options = SubscribeOptions;
    const NAME: &'static str = "subscribe";

    fn describe() -> &'static str {
        "subscribe the registered user to a specified product or regtoken."
    }

    fn validate_options(options: &SubscribeOptions) -> Result<(), ValidationError> {
        options.selector().map(drop)
    }

    fn execute<S: EntitlementService>(
        options: SubscribeOptions,
        ctx: &Context<S>,
        out: &mut dyn Write,
    ) -> anyhow::Result<()> {
        let selector = options.selector()?;
        let engine = ctx.engine();
        let consumer = engine.require_identity()?;
        let bundles = engine.subscribe(&consumer, &selector)?;
        writeln!(
            out,
            "Subscribed to {selector} ({} certificate(s) issued)",
            bundles.len()
        )?;
        Ok(())
    }
}
