use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::pin::pin;

use clap::Args;
use eyre::WrapErr;
use recoverykit_core::{
    CheckpointDecision, CheckpointPrompt, Environment, HkdfCredentialDeriver, HttpChainClient,
    RecoveryConfig, RecoveryController, RecoveryError, RecoveryEvent, RecoveryEvents, RecoveryReport,
    RecoverySession, SoftwareDevice,
};
use serde::Serialize;
use tokio::sync::oneshot;

use super::CliStore;
use crate::output;

#[derive(Debug, Args)]
pub struct RecoverArgs {
    /// Network whose default node is queried.
    #[arg(long, env = "RECOVERYKIT_NETWORK", default_value = "mainnet")]
    network: Environment,

    /// Node base URL, overriding the network default.
    #[arg(long, env = "RECOVERYKIT_NODE_URL")]
    node_url: Option<String>,

    /// File with the hex encoded 32-byte master secret of the software device.
    #[arg(long)]
    seed_file: PathBuf,

    /// Credential numbers looked up per identity.
    #[arg(long)]
    max_credentials: Option<u32>,

    /// Empty identities in a row before asking whether to continue.
    #[arg(long)]
    spaces: Option<u32>,

    /// Concurrent lookups per identity.
    #[arg(long)]
    concurrency: Option<usize>,

    /// Answer the first N checkpoints with "continue" without asking.
    #[arg(long, default_value_t = 0)]
    auto_continue: u32,
}

impl RecoverArgs {
    fn config(&self) -> RecoveryConfig {
        let defaults = RecoveryConfig::from_environment(self.network, self.node_url.clone());
        RecoveryConfig {
            max_credentials_on_account: self
                .max_credentials
                .unwrap_or(defaults.max_credentials_on_account),
            identity_spaces_between_warning: self
                .spaces
                .unwrap_or(defaults.identity_spaces_between_warning),
            scan_concurrency: self.concurrency.unwrap_or(defaults.scan_concurrency),
            ..defaults
        }
    }
}

/// Loads the software device from a file holding its hex master secret.
fn load_device(path: &Path) -> eyre::Result<SoftwareDevice> {
    let contents = std::fs::read_to_string(path)
        .wrap_err_with(|| format!("failed to read seed file {}", path.display()))?;
    Ok(SoftwareDevice::from_hex(&contents)?)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ReportOutput {
    identities_scanned: u32,
    recovered_total: usize,
    stop_reason: String,
}

impl From<&RecoveryReport> for ReportOutput {
    fn from(report: &RecoveryReport) -> Self {
        Self {
            identities_scanned: report.identities_scanned,
            recovered_total: report.recovered_total,
            stop_reason: format!("{:?}", report.stop_reason),
        }
    }
}

pub async fn run(args: &RecoverArgs, store: &CliStore, json: bool) -> eyre::Result<()> {
    let config = args.config();
    let device = load_device(&args.seed_file)?;
    let chain = HttpChainClient::new(&config.node_url)?;
    tracing::info!(node = %chain.base_url(), "starting recovery");

    let (session, events) =
        RecoverySession::new(&device, &chain, &HkdfCredentialDeriver, store, config)?;
    let controller = session.controller();

    let session_run = async {
        let mut running = pin!(session.run());
        tokio::select! {
            report = &mut running => report,
            _ = tokio::signal::ctrl_c() => {
                tracing::warn!("interrupted, stopping recovery");
                controller.abort();
                running.await
            }
        }
    };
    let answers = Answers::new(args.auto_continue);
    let (report, ()) = tokio::join!(
        session_run,
        drive_events(events, answers, &controller, json)
    );
    let report = report.map_err(failure_report)?;

    let out = ReportOutput::from(&report);
    if json {
        output::print_json(&out)?;
    } else {
        println!(
            "scanned {} identities, recovered {} accounts ({})",
            out.identities_scanned, out.recovered_total, out.stop_reason
        );
    }
    Ok(())
}

/// Checkpoint answers: a budget of automatic "continue"s, then the terminal.
#[derive(Debug)]
struct Answers {
    auto_continue: u32,
}

impl Answers {
    const fn new(auto_continue: u32) -> Self {
        Self { auto_continue }
    }

    /// Takes one automatic answer, if any are left.
    const fn take_auto(&mut self) -> Option<CheckpointDecision> {
        if self.auto_continue == 0 {
            return None;
        }
        self.auto_continue -= 1;
        Some(CheckpointDecision::Continue)
    }
}

async fn drive_events(
    mut events: RecoveryEvents,
    mut answers: Answers,
    controller: &RecoveryController,
    json: bool,
) {
    while let Some(event) = events.recv().await {
        match event {
            RecoveryEvent::SessionStarted {
                block_hash,
                wallet_id,
            } => tracing::info!(%block_hash, %wallet_id, "session started"),
            RecoveryEvent::AwaitingDevice { identity_number } => {
                tracing::info!(identity_number, "confirm the key export on the device");
            }
            RecoveryEvent::Searching { identity_number } => {
                tracing::info!(identity_number, "searching for accounts");
            }
            RecoveryEvent::IdentityDone {
                identity_number,
                identity_name,
                accounts,
            } => {
                tracing::info!(identity_number, found = accounts.len(), "identity done");
                if !json {
                    for account in &accounts {
                        println!("{identity_name}: {} ({})", account.address, account.name);
                    }
                }
            }
            RecoveryEvent::Checkpoint(prompt) => {
                if let Some(decision) = answers.take_auto() {
                    tracing::info!(empty_run = prompt.empty_run, "continuing automatically");
                    prompt.respond(decision);
                } else {
                    ask(prompt, controller).await;
                }
            }
            RecoveryEvent::Stopped(report) => {
                tracing::info!(stop_reason = ?report.stop_reason, "recovery stopped");
            }
            RecoveryEvent::Failed(error) => tracing::error!(%error, "recovery failed"),
        }
    }
}

/// Asks on the terminal whether to continue, unless the session is cancelled first.
async fn ask(prompt: CheckpointPrompt, controller: &RecoveryController) {
    eprint!(
        "No accounts on the last {} identities. Continue from identity {}? [y/N] ",
        prompt.empty_run, prompt.next_identity_number
    );

    // A plain thread, so a pending read does not hold up runtime shutdown.
    let (tx, rx) = oneshot::channel();
    std::thread::spawn(move || {
        let mut line = String::new();
        let read = std::io::stdin().lock().read_line(&mut line).map(|_| line);
        let _ = tx.send(read);
    });

    tokio::select! {
        () = controller.cancelled() => {}
        line = rx => {
            let decision = match line {
                Ok(Ok(line)) => parse_answer(&line),
                _ => CheckpointDecision::Stop,
            };
            prompt.respond(decision);
        }
    }
}

/// Adds a hint on how to resume when the device ended the session.
fn failure_report(error: RecoveryError) -> eyre::Report {
    if error.is_device_error() {
        eyre::Report::new(error).wrap_err(
            "the device stopped the recovery; reconnect and unlock it, then run recover again",
        )
    } else {
        eyre::Report::new(error)
    }
}

fn parse_answer(line: &str) -> CheckpointDecision {
    match line.trim().to_ascii_lowercase().as_str() {
        "y" | "yes" => CheckpointDecision::Continue,
        _ => CheckpointDecision::Stop,
    }
}
