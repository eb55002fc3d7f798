//! cloudfem - run FEM solvers on a remote compute service
//!
//! The binary wires the controller to the in-memory compute service and host,
//! so the whole lifecycle (submit, poll, load, recover) can be exercised
//! without a vendor SDK or a CAD application.

mod panel;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, anyhow, bail};
use clap::{Parser, Subcommand};
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio::sync::{Mutex, watch};
use tracing::info;
use tracing_subscriber::EnvFilter;

use cloudfem_core::app::{Controller, ControllerBuilder, PollScheduler, SchedulingDelegate};
use cloudfem_core::config::{Credential, CredentialError, CredentialStore, Settings};
use cloudfem_core::domain::events::DomainEvent;
use cloudfem_core::impls::{InMemoryCompute, InMemoryHost, ScriptedSolvers};
use cloudfem_core::ports::HostEnvironment;

use crate::panel::{PanelDelegate, print_panel};

/// Solver objects of the demo document: (name, label, type).
const DEMO_SOLVERS: &[(&str, &str, &str)] = &[
    ("SolverCcxTools", "CalculiX", "Fem::SolverCcxTools"),
    ("SolverCalculix", "CalculiXNew", "Fem::SolverCalculix"),
    ("SolverElmer", "Elmer", "Fem::SolverElmer"),
    ("SolverZ88", "Z88", "Fem::SolverZ88"),
];

#[derive(Parser, Debug)]
#[command(name = "cloudfem", version, about = "Run FEM solvers on a remote compute service")]
struct Cli {
    /// Path to the YAML configuration file
    #[arg(short, long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Log filter used when RUST_LOG is not set
    #[arg(long = "log-level", global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Submit a computation and load its results
    Run {
        /// Label of the solver object
        #[arg(long, default_value = "CalculiX")]
        solver: String,

        /// Task name; generated from the solver label and time when omitted
        #[arg(long)]
        name: Option<String>,

        /// Working directory for inputs and results
        #[arg(long)]
        dir: Option<PathBuf>,

        /// Make the remote computation fail
        #[arg(long)]
        fail: bool,

        /// Polls answering "still computing" before the task concludes
        #[arg(long, default_value_t = 2)]
        steps: u32,
    },

    /// Manage the saved API token
    Token {
        #[command(subcommand)]
        action: TokenAction,
    },

    /// Simulate a restart and recover the tasks of the previous session
    Recover {
        #[arg(long, default_value_t = 2)]
        steps: u32,
    },
}

#[derive(Subcommand, Debug)]
enum TokenAction {
    /// Save a token
    Set { token: String },
    /// Show where the token is stored
    Show,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level)?;

    let settings = Settings::load(cli.config.as_deref()).context("load configuration")?;

    match cli.command {
        Command::Run {
            solver,
            name,
            dir,
            fail,
            steps,
        } => {
            let compute = InMemoryCompute::new();
            compute.set_waits_until_done(steps);
            if fail {
                compute.fail_next_tasks(Some("simulated solver failure"));
            }
            run(&settings, &compute, &solver, name.as_deref(), dir.as_deref()).await
        }
        Command::Token { action } => token(&settings, action),
        Command::Recover { steps } => {
            let compute = InMemoryCompute::new();
            compute.set_waits_until_done(steps);
            recover(&settings, &compute).await
        }
    }
}

fn init_tracing(log_level: &str) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(log_level).context("invalid log level")?,
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

/// One plugin session: a host with the demo document and a controller.
struct Session {
    controller: Arc<Mutex<Controller>>,
    events: UnboundedReceiver<DomainEvent>,
    host: Arc<InMemoryHost>,
}

impl Session {
    /// Controller events keep `scheduler` polling while tasks compute.
    fn open(
        settings: &Settings,
        compute: &InMemoryCompute,
        scheduler: &Arc<PollScheduler>,
    ) -> Result<Self> {
        let host = Arc::new(match settings.data_dir() {
            Some(dir) => InMemoryHost::with_data_dir(dir),
            None => InMemoryHost::new(),
        });
        let document = host.open_document("Beam", demo_document_path());
        for (name, label, type_id) in DEMO_SOLVERS {
            host.add_solver(&document, name, label, type_id);
        }
        let solvers = Arc::new(ScriptedSolvers::new(host.clone()));

        let (tx, events) = mpsc::unbounded_channel();
        let delegate = SchedulingDelegate::new(scheduler.clone(), Arc::new(PanelDelegate::new(tx)));
        let controller = ControllerBuilder::new(Arc::new(compute.clone()), host.clone(), solvers)
            .events(Arc::new(delegate))
            .config(settings.controller_config())
            .build()?;

        Ok(Self {
            controller: Arc::new(Mutex::new(controller)),
            events,
            host,
        })
    }

    fn credential(&self) -> Result<Credential> {
        let dir = self.host.user_data_dir().ok_or(CredentialError::NoDataDir)?;
        CredentialStore::in_dir(&dir)
            .load()?
            .ok_or_else(|| anyhow!("no valid token saved, run `cloudfem token set <TOKEN>`"))
    }

    async fn connect(&self) -> Result<()> {
        let credential = self.credential()?;
        let mut controller = self.controller.lock().await;
        if !controller.establish_connection(&credential).await {
            bail!("unable to connect to the compute service");
        }
        Ok(())
    }

    /// Load results as tasks conclude, until nothing computes.
    async fn drive(&mut self) -> Result<()> {
        loop {
            {
                let controller = self.controller.lock().await;
                if !controller.is_computing() && self.events.is_empty() {
                    break;
                }
            }
            let Some(event) = self.events.recv().await else {
                break;
            };

            let mut controller = self.controller.lock().await;
            match event {
                DomainEvent::TaskFinished(id) => {
                    controller.load_result(&id).await?;
                    print_panel(&controller)?;
                }
                DomainEvent::TaskFailed(id) => {
                    let output = controller.task_output(&id).await?;
                    eprintln!("task {id} failed:\n{}", output.stderr);
                    controller.delete_task(&id).await;
                }
                _ => {}
            }
        }
        Ok(())
    }
}

fn demo_document_path() -> PathBuf {
    std::env::temp_dir().join("cloudfem-demo").join("beam.FCStd")
}

fn scheduler(settings: &Settings) -> Result<Arc<PollScheduler>> {
    if settings.poll_interval().is_zero() {
        bail!("poll_interval_ms must be positive to wait for results");
    }
    Ok(Arc::new(PollScheduler::new(settings.poll_interval())))
}

async fn run(
    settings: &Settings,
    compute: &InMemoryCompute,
    solver_label: &str,
    name: Option<&str>,
    dir: Option<&Path>,
) -> Result<()> {
    let scheduler = scheduler(settings)?;
    let mut session = Session::open(settings, compute, &scheduler)?;
    session.connect().await?;

    let solver = session
        .host
        .solver_by_label(solver_label)
        .ok_or_else(|| anyhow!("no solver labelled {solver_label}"))?;
    {
        let mut controller = session.controller.lock().await;
        let id = controller
            .start(&solver, name, dir)
            .await?
            .ok_or_else(|| anyhow!("submission failed, see the log"))?;
        info!(task_id = %id, "waiting for results");
        print_panel(&controller)?;
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = scheduler.spawn(session.controller.clone(), shutdown_rx);
    session.drive().await?;

    shutdown_tx.send(true)?;
    handle.await?;
    Ok(())
}

async fn recover(settings: &Settings, compute: &InMemoryCompute) -> Result<()> {
    let scheduler = scheduler(settings)?;

    {
        // never spawned, the previous session is closed before any poll
        let previous = Session::open(settings, compute, &self::scheduler(settings)?)?;
        previous.connect().await?;
        let mut controller = previous.controller.lock().await;
        for label in ["CalculiX", "Elmer"] {
            let solver = previous
                .host
                .solver_by_label(label)
                .ok_or_else(|| anyhow!("no solver labelled {label}"))?;
            controller.start(&solver, None, None).await?;
        }
        info!("previous session closed with tasks still computing");
    }

    let mut session = Session::open(settings, compute, &scheduler)?;
    session.connect().await?;
    {
        let mut controller = session.controller.lock().await;
        print_panel(&controller)?;
        let retrieved = controller.retrieve_all().await;
        info!(retrieved, "tasks recovered");
        print_panel(&controller)?;
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = scheduler.spawn(session.controller.clone(), shutdown_rx);
    session.drive().await?;

    shutdown_tx.send(true)?;
    handle.await?;
    Ok(())
}

fn token(settings: &Settings, action: TokenAction) -> Result<()> {
    let dir = settings.data_dir().ok_or(CredentialError::NoDataDir)?;
    let store = CredentialStore::in_dir(&dir);
    match action {
        TokenAction::Set { token } => {
            let credential = Credential::new(token.trim());
            if !credential.is_well_formed() {
                bail!("a token is 64 lowercase hexadecimal characters");
            }
            store.save(&credential)?;
            println!("token saved to {}", store.path().display());
        }
        TokenAction::Show => match store.load()? {
            Some(credential) => {
                let shown: String = credential.as_str().chars().take(6).collect();
                println!("{shown}… ({})", store.path().display());
            }
            None => println!("no valid token in {}", store.path().display()),
        },
    }
    Ok(())
}
