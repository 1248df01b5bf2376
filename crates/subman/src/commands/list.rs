use std::io::Write;

use chrono::Utc;
use clap::Parser;
use subman_core::status::product_status;
use subman_core::traits::{CertificateStore, EntitlementService};

use super::{Command, CommonOptions, Context};
use crate::output;

/// Show installed product status, or pools and entitlements from the service.
#[derive(Parser, Debug)]
pub struct ListOptions {
    #[command(flatten)]
    pub common: CommonOptions,

    /// List pools this system can subscribe to.
    #[arg(long)]
    pub available: bool,

    /// List entitlements this system consumes.
    #[arg(long)]
    pub consumed: bool,
}

pub struct ListCommand;

impl Command for ListCommand {
    type Options = ListOptions;
    const NAME: &'static str = "list";

    fn describe() -> &'static str {
        "list available or consumer subscriptions for registered user"
    }

    fn execute<S: EntitlementService>(
        options: ListOptions,
        ctx: &Context<S>,
        out: &mut dyn Write,
    ) -> anyhow::Result<()> {
        let engine = ctx.engine();
        let consumer = engine.require_identity()?;

        if !(options.available || options.consumed) {
            let store = engine.store();
            let installed = store.installed_products()?;
            let certificates = store.certificates()?;
            let status = product_status(&installed, &certificates, Utc::now());
            output::print_status(out, &status)?;
        }

        if options.available {
            let pools = engine.available_pools(&consumer)?;
            output::print_pools(out, &pools)?;
        }

        if options.consumed {
            let grants = engine.consumed(&consumer)?;
            output::print_consumed(out, &grants)?;
        }
        Ok(())
    }
}
