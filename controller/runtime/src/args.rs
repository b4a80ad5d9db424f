use crate::{
    admission::{Admission, ENDPOINT},
    core::{annotations::ALLOWED_OPERATIONS, AllowedOperations, Audit},
    resolve::KubeResolver,
    trace::TraceSink,
};
use anyhow::{bail, Result};
use clap::Parser;
use std::io;
use tokio::time::Duration;
use tracing::info;

#[derive(Debug, Parser)]
#[clap(
    name = "resource-protection",
    about = "Admits operations on resources according to their allowed-operations annotation"
)]
pub struct Args {
    #[clap(
        long,
        default_value = "resource_protection=info,warn",
        env = "RESOURCE_PROTECTION_LOG"
    )]
    log_level: kubert::LogFilter,

    #[clap(long, default_value = "plain")]
    log_format: kubert::LogFormat,

    #[clap(flatten)]
    client: kubert::ClientArgs,

    #[clap(flatten)]
    server: kubert::ServerArgs,

    #[clap(flatten)]
    admin: kubert::AdminArgs,

    /// Logs each admission request and its decision.
    #[clap(long, env = "RESOURCE_PROTECTION_DEBUG")]
    debug: bool,

    /// Bounds how long to wait for the API server when a request refers to an
    /// object that it does not carry.
    #[clap(long, default_value = "5000")]
    fetch_timeout_ms: u64,
}

impl Args {
    #[inline]
    pub async fn parse_and_run() -> Result<()> {
        Self::parse().run().await
    }

    pub async fn run(self) -> Result<()> {
        let Self {
            log_level,
            log_format,
            client,
            server,
            admin,
            debug: audit,
            fetch_timeout_ms,
        } = self;

        let runtime = kubert::Runtime::builder()
            .with_log(log_level, log_format)
            .with_admin(admin.into_builder())
            .with_client(client)
            .with_server(server)
            .build()
            .await?;

        let resolver =
            KubeResolver::new(runtime.client(), Duration::from_millis(fetch_timeout_ms));
        let sink = audit.then(|| Box::new(TraceSink::default()) as Box<dyn io::Write + Send>);
        let admission = Admission::new(Audit::new(AllowedOperations::new(resolver), sink));

        info!(
            endpoint = ENDPOINT,
            annotation = ALLOWED_OPERATIONS,
            debug = audit,
            "Serving admission requests"
        );
        let runtime = runtime.spawn_server(admission);

        // Block the main thread on the shutdown signal.
        if runtime.run().await.is_err() {
            bail!("Aborted");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let args = Args::try_parse_from(["resource-protection"]).unwrap();
        assert!(!args.debug);
        assert_eq!(args.fetch_timeout_ms, 5000);
    }

    #[test]
    fn debug_flag() {
        let args = Args::try_parse_from([
            "resource-protection",
            "--debug",
            "--fetch-timeout-ms=250",
            "--log-format=json",
        ])
        .unwrap();
        assert!(args.debug);
        assert_eq!(args.fetch_timeout_ms, 250);
    }
}
