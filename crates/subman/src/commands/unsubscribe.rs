use std::io::Write;

use clap::Parser;
use subman_core::traits::EntitlementService;

use super::{Command, CommonOptions, Context};

/// Remove one product's subscription, or all of them.
#[derive(Parser, Debug)]
pub struct UnsubscribeOptions {
    #[command(flatten)]
    pub common: CommonOptions,

    /// Product id to unsubscribe from; all subscriptions when omitted.
    #[arg(long)]
    pub product: Option<String>,
}

pub struct UnsubscribeCommand;

impl Command for UnsubscribeCommand {
    type Options = UnsubscribeOptions;
    const NAME: &'static str = "unsubscribe";

    fn describe() -> &'static str {
        "unsubscribe the registered user from all or specific subscriptions."
    }

    fn execute<S: EntitlementService>(
        options: UnsubscribeOptions,
        ctx: &Context<S>,
        out: &mut dyn Write,
    ) -> anyhow::Result<()> {
        let engine = ctx.engine();
        let consumer = engine.require_identity()?;
        match options.product {
            Some(product) => {
                if let Some(entitlement) = engine.unsubscribe_product(&consumer, &product)? {
                    writeln!(out, "Removed entitlement {entitlement} for product {product}")?;
                }
            }
            None => {
                let summary = engine.unsubscribe_all(&consumer)?;
                writeln!(out, "Removed all subscriptions ({} certificate(s))", summary.removed)?;
            }
        }
        Ok(())
    }
}
