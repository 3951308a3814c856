use anyhow::Result;
use reconcile::{Error, Request, State, Transport};

use super::want_for;
use crate::Context;
use crate::cli::ApplyArgs;
use crate::engine::{self, ApplyOptions};
use crate::resource;
use crate::transport::RestTransport;
use crate::ui;

/// Stands in for the device in check mode when none is configured
struct Offline;

impl Transport for Offline {
    fn send(&self, request: &Request) -> reconcile::Result<()> {
        Err(Error::transport(format!("{request}: no device configured"), None))
    }
}

pub fn run(ctx: &Context, args: ApplyArgs) -> Result<()> {
    let config = ctx.config()?;
    let schema = resource::find(&args.resource)?;
    let state = State::from(args.state);
    let want = want_for(state, args.want.as_deref())?;
    let store = ctx.store()?;

    let transport: Box<dyn Transport> = if args.check && config.device.is_none() {
        Box::new(Offline)
    } else {
        Box::new(RestTransport::new(config.device()?))
    };

    let opts = ApplyOptions {
        state,
        check: args.check,
        yes: args.yes,
        diff: args.diff,
        quiet: ctx.quiet,
    };
    let report = engine::apply(
        schema.as_ref(),
        want.as_ref(),
        &store,
        transport.as_ref(),
        opts,
    )?;

    if report.aborted {
        log::info!("{}: aborted at confirmation", schema.name());
    } else if report.changed {
        log::info!(
            "{}: {} sent",
            schema.name(),
            ui::count(report.summary.total(), "request")
        );
    }
    Ok(())
}
