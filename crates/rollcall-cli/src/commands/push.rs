//! Push command sending a stored log to the configured HTTP endpoint.

use std::io::Write;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow, bail};
use clap::Args;
use rollcall_core::{PushLogError, PushlogService, PushlogTarget, SessionLogStore, UserId};
use rollcall_push::HttpPushlogTarget;

use super::util::parse_log_id;
use crate::Config;

#[derive(Debug, Args)]
pub struct PushArgs {
    /// Log to push. Defaults to the most recently stored unpushed log.
    #[arg(long)]
    pub log: Option<String>,

    /// Topic the session covered.
    #[arg(long)]
    pub topic: String,

    /// Name of whoever documented the session.
    #[arg(long)]
    pub recorder: String,

    /// Mentor user ID (repeatable, at least one).
    #[arg(long = "mentor", required = true)]
    pub mentors: Vec<String>,

    /// Endpoint to push to, overriding the configured one.
    #[arg(long)]
    pub endpoint: Option<String>,
}

pub fn run<W: Write>(
    writer: &mut W,
    args: &PushArgs,
    config: &Config,
    logs: Arc<dyn SessionLogStore>,
) -> Result<()> {
    let endpoint = args
        .endpoint
        .as_deref()
        .or(config.pushlog_endpoint.as_deref())
        .ok_or_else(|| {
            anyhow!("missing pushlog endpoint (set RC_PUSHLOG_ENDPOINT, config.toml, or --endpoint)")
        })?;
    let target = HttpPushlogTarget::new(endpoint).context("failed to create push target")?;
    let service = PushlogService::new(logs, target);

    let runtime = tokio::runtime::Runtime::new().context("failed to initialize tokio runtime")?;
    runtime.block_on(execute(writer, args, &service))
}

/// Pushes per `args` through `service` and reports the outcome.
pub async fn execute<W: Write, T: PushlogTarget>(
    writer: &mut W,
    args: &PushArgs,
    service: &PushlogService<T>,
) -> Result<()> {
    if args.mentors.is_empty() {
        bail!("at least one --mentor is required");
    }
    let log_id = args.log.as_deref().map(parse_log_id).transpose()?;
    let mentors = args
        .mentors
        .iter()
        .map(|id| UserId::new(id.as_str()))
        .collect::<Result<Vec<_>, _>>()
        .context("invalid mentor id")?;

    let log = service
        .push_session_log(&args.topic, &args.recorder, mentors, log_id.as_ref())
        .await
        .map_err(describe)?;

    writeln!(
        writer,
        "Pushed session log {} ({}:{})",
        log.id, log.session.guild_id, log.session.channel_id
    )?;
    Ok(())
}

fn describe(err: PushLogError) -> anyhow::Error {
    match err {
        PushLogError::NoUnpushed => {
            anyhow!("nothing to push: every stored session log has been pushed")
        }
        PushLogError::LogNotFound { id } => anyhow!("session log {id} not found"),
        PushLogError::PushedButGone { id } => {
            anyhow!("session log {id} was pushed but is no longer stored")
        }
        err @ PushLogError::PushUnsuccessful { .. } => anyhow::Error::new(err)
            .context("push unsuccessful; the log stays unpushed and can be retried with --log"),
        err @ PushLogError::Store(_) => {
            anyhow::Error::new(err).context("failed to push session log")
        }
    }
}
