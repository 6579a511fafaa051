//! authgate - terminal host for the authentication gate.

mod terminal;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use gate_auth::{AuthSession, SessionSource, SupabaseSessionSource};
use gate_config::{init_logging_with, Config, LogConfig, Paths};
use gate_flow::{
    GateController, GateDeps, GateSettings, GateStateMachine, HttpProfileSyncClient,
};
use gate_storage::{ActionStore, FileStorage, GateReason, PersistentKv, StorageKeys};
use terminal::{RunOutcome, TerminalNavigator};
use tracing::info;

/// authgate command-line interface.
#[derive(Parser)]
#[command(name = "authgate")]
#[command(about = "Sign in, complete your profile, and resume gated actions")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error). Defaults to the configured level
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// Base directory for config, state, and logs. Defaults to ~/.authgate
    #[arg(long, global = true)]
    base_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Open the gate for an action and walk through sign-in
    Gate {
        /// Why the gate is opened (quiz, save, report)
        reason: GateReason,
        /// Item the action applies to
        #[arg(long)]
        subject: Option<String>,
    },
    /// Finish a federated sign-in and resume the pending action, if any
    CompleteSignIn {
        /// URL the identity provider redirected to
        callback_url: String,
    },
    /// Show persisted gate state
    Status,
    /// Print and clear the resume action
    TakeResume,
    /// Forget the pending action
    ClearPending,
    /// End the stored session
    SignOut,
}

/// Everything a command may need, built once from configuration.
struct Host {
    config: Config,
    storage: Arc<dyn PersistentKv>,
    actions: ActionStore,
    source: Arc<SupabaseSessionSource>,
}

impl Host {
    fn open(config: Config, paths: &Paths) -> Result<Self, Box<dyn std::error::Error>> {
        let storage: Arc<dyn PersistentKv> = Arc::new(FileStorage::open(paths.state_file())?);
        let source = Arc::new(SupabaseSessionSource::new(
            config.supabase_url.clone(),
            config.supabase_publishable_key.clone(),
            config.site_url.clone(),
            config.federated_provider.clone(),
            storage.clone(),
        ));

        Ok(Self {
            config,
            actions: ActionStore::new(storage.clone()),
            storage,
            source,
        })
    }

    /// Wire up session state and a gate machine. The machine subscribes
    /// before the session source is attached so the startup fetch reaches it.
    async fn gate(
        &self,
    ) -> Result<(GateStateMachine, Arc<GateController>), Box<dyn std::error::Error>> {
        let auth = Arc::new(AuthSession::new());
        let controller = Arc::new(GateController::new(self.actions.clone()));
        let sync = Arc::new(HttpProfileSyncClient::new(&self.config.api_url()?)?);

        let gate = GateStateMachine::new(GateDeps {
            auth: auth.clone(),
            controller: controller.clone(),
            source: self.source.clone(),
            actions: self.actions.clone(),
            sync,
            navigator: Arc::new(TerminalNavigator),
            settings: GateSettings::from_config(&self.config),
        });

        // The forwarder stops once `auth` is dropped with the machine.
        let _feed = auth.attach(self.source.clone()).await;

        Ok((gate, controller))
    }

    fn report_outcome(&self, outcome: RunOutcome) {
        match outcome {
            RunOutcome::Redirected => {}
            RunOutcome::Closed => match self.actions.peek_resume_action() {
                Some(resume) => println!(
                    "Done. Pending follow-up: {}",
                    serde_json::to_string(&resume).unwrap_or_default()
                ),
                None => println!("Done."),
            },
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let paths = match cli.base_dir {
        Some(base) => Paths::with_base_dir(base),
        None => Paths::new()?,
    };
    let config = Config::load(&paths)?;

    init_logging_with(LogConfig {
        default_level: cli.log_level.unwrap_or_else(|| config.log_level.clone()),
        log_path: Some(paths.log_file()),
        also_stderr: true,
    });

    let host = Host::open(config, &paths)?;

    match cli.command {
        Commands::Gate { reason, subject } => {
            let (mut gate, controller) = host.gate().await?;
            controller.request(reason, subject);
            let outcome = terminal::run(&mut gate).await?;
            host.report_outcome(outcome);
        }
        Commands::CompleteSignIn { callback_url } => {
            let session = host.source.complete_federated_sign_in(&callback_url).await?;
            info!(user_id = %session.user.id, "Federated sign-in stored");
            println!("Signed in.");

            if host.actions.read_pending_action().is_none() {
                println!("Nothing to resume.");
                return Ok(());
            }
            let (mut gate, _controller) = host.gate().await?;
            let outcome = terminal::run(&mut gate).await?;
            host.report_outcome(outcome);
        }
        Commands::Status => {
            let status = serde_json::json!({
                "pendingAuthAction": host.actions.read_pending_action(),
                "resumeAction": host.actions.peek_resume_action(),
                "session": host.storage.has(StorageKeys::SESSION)?,
            });
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
        Commands::TakeResume => {
            let resume = host.actions.take_resume_action();
            println!("{}", serde_json::to_string(&resume)?);
        }
        Commands::ClearPending => {
            if host.actions.clear_pending_action()? {
                println!("Pending action cleared.");
            } else {
                println!("No pending action.");
            }
        }
        Commands::SignOut => {
            host.source.sign_out().await?;
            println!("Signed out.");
        }
    }

    Ok(())
}
