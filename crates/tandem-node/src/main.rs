//! Tandem node binary.
//!
//! Runs a therapist and a patient host in one process over an in-memory
//! link and walks the therapist through a list of apps. Useful for watching
//! the session protocol in the logs and for producing session log files.
//!
//! # Usage
//!
//! ```bash
//! # Open every reference app for two seconds each
//! tandem-node --dwell-secs 2
//!
//! # Only the card deck, with logs written to ./logs
//! tandem-node --app card-deck --log-dir logs --log-level debug
//! ```

use std::{path::PathBuf, time::Duration};

use clap::Parser;
use tandem_core::{SessionAction, SessionConfig, SessionEvent};
use tandem_node::{
    ActionReceiver, ChannelTransport, DEFAULT_FRAME_RATE, Host, NodeConfig, NodeError, SystemEnv,
};
use tandem_proto::{AppId, Role};
use tokio::task::JoinHandle;
use tracing::{debug, info};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Tandem session host
#[derive(Parser, Debug)]
#[command(name = "tandem-node")]
#[command(about = "Runs a therapist and a patient session side by side")]
#[command(version)]
struct Args {
    /// Frames per second
    #[arg(
        long,
        default_value_t = DEFAULT_FRAME_RATE,
        value_parser = clap::value_parser!(u32).range(1..=240)
    )]
    frame_rate: u32,

    /// Directory for session logs
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Apps to open, in order
    #[arg(long = "app", default_values = ["word-board", "card-deck", "timed-trial"])]
    apps: Vec<String>,

    /// Seconds each app stays open
    #[arg(long, default_value_t = 1)]
    dwell_secs: u64,

    /// Delay before a peer processes its own broadcasts, in milliseconds
    #[arg(long, default_value_t = 0)]
    echo_delay_ms: u64,
}

impl Args {
    fn node_config(&self, role: Role) -> NodeConfig {
        let mut session = SessionConfig::new(role);
        session.echo_delay = Duration::from_millis(self.echo_delay_ms);
        NodeConfig { session, frame_rate: self.frame_rate, log_dir: self.log_dir.clone() }
    }

    fn app_ids(&self) -> Result<Vec<AppId>, NodeError> {
        let registry = tandem_apps::registry();
        self.apps
            .iter()
            .map(|name| {
                let unknown = || NodeError::Config(format!("unknown app {name:?}"));
                registry.find(name).ok_or_else(unknown)
            })
            .collect()
    }
}

fn report(role: Role, mut actions: ActionReceiver) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(action) = actions.recv().await {
            match action {
                SessionAction::Indicator(_) | SessionAction::Cursor(_) => {
                    debug!(?role, ?action, "overlay");
                },
                action => info!(?role, ?action, "session"),
            }
        }
    })
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    let app_ids = args.app_ids()?;
    let dwell = Duration::from_secs(args.dwell_secs);
    info!(apps = ?args.apps, ?dwell, "tandem node starting");

    let (therapist_link, patient_link) = ChannelTransport::pair();
    let (therapist, therapist_commands, therapist_actions) = Host::new(
        SystemEnv::new(),
        therapist_link,
        args.node_config(Role::Therapist),
        tandem_apps::registry(),
    )?;
    let (patient, patient_commands, patient_actions) = Host::new(
        SystemEnv::new(),
        patient_link,
        args.node_config(Role::Patient),
        tandem_apps::registry(),
    )?;

    let therapist = tokio::spawn(therapist.run());
    let patient = tokio::spawn(patient.run());
    let reporters =
        [report(Role::Therapist, therapist_actions), report(Role::Patient, patient_actions)];

    let settle = args.node_config(Role::Therapist).frame_interval() * 10;
    tokio::time::sleep(settle).await;

    for app_id in app_ids {
        therapist_commands
            .send(SessionEvent::OpenApp { app_id, seed: None })
            .map_err(|_| NodeError::HostStopped)?;
        tokio::time::sleep(dwell).await;
    }
    therapist_commands.send(SessionEvent::CloseApp).map_err(|_| NodeError::HostStopped)?;
    tokio::time::sleep(settle).await;

    drop(patient_commands);
    patient.await??;
    drop(therapist_commands);
    therapist.await??;
    for reporter in reporters {
        reporter.await?;
    }

    info!("tandem node finished");
    Ok(())
}
