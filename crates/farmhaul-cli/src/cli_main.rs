//! farmhaul CLI.
//!
//! Usage:
//!   farmhaul login --actor transporter:T1 --token <TOKEN>
//!   farmhaul jobs [--available|--active|--completed]
//!   farmhaul accept <JOB_ID> [--yes]
//!   farmhaul advance <JOB_ID> [STATUS]
//!   farmhaul unread
//!   farmhaul watch [--kind job_status_changed ...]
//!   farmhaul logout
//!
//! Settings come from an optional TOML file (`--config`); flags and
//! `FARMHAUL_*` environment variables override it.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use farmhaul_client::{
    next_status, ClientConfig, DeliveryClient, DispatchedEvent, HttpApi, Session, WsConnector,
};
use farmhaul_core::{Actor, DeliveryJob, Environment, EventKind, JobId, JobStatus, Priority};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

type Client = DeliveryClient<HttpApi, WsConnector>;

#[derive(Debug, Parser)]
#[command(name = "farmhaul", version, about = "Delivery jobs and live notifications")]
struct Cli {
    /// TOML config file.
    #[arg(long, env = "FARMHAUL_CONFIG")]
    config: Option<PathBuf>,

    /// Backend to talk to.
    #[arg(long = "env", env = "FARMHAUL_ENV", value_enum)]
    environment: Option<EnvArg>,

    /// API base URL, overriding the environment default.
    #[arg(long, env = "FARMHAUL_API_URL")]
    api_url: Option<String>,

    /// Notification WebSocket URL, overriding the one derived from the API URL.
    #[arg(long, env = "FARMHAUL_WS_URL")]
    ws_url: Option<String>,

    /// Where the login is kept between invocations.
    #[arg(long, env = "FARMHAUL_SESSION_FILE")]
    session_file: Option<PathBuf>,

    /// Print JSON instead of text.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum EnvArg {
    Development,
    Production,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Store a credential for later commands.
    Login {
        /// `role:id`, e.g. `transporter:T1`.
        #[arg(long)]
        actor: Actor,
        #[arg(long, env = "FARMHAUL_TOKEN", hide_env_values = true)]
        token: String,
    },
    /// Forget the stored credential.
    Logout,
    /// List jobs visible to the current actor.
    Jobs {
        #[arg(long, conflicts_with_all = ["active", "completed"])]
        available: bool,
        #[arg(long, conflicts_with = "completed")]
        active: bool,
        #[arg(long)]
        completed: bool,
    },
    /// Accept an available job.
    Accept {
        job: String,
        /// Skip the confirmation prompt.
        #[arg(long, short = 'y')]
        yes: bool,
    },
    /// Move a job to its next status.
    Advance {
        job: String,
        /// Expected target; defaults to the job's successor.
        status: Option<JobStatus>,
    },
    /// Show the unread notification count.
    Unread,
    /// Follow live notifications until interrupted.
    Watch {
        /// Only show these kinds. High-priority events are always shown.
        #[arg(long = "kind", value_parser = parse_kind)]
        kinds: Vec<EventKind>,
    },
}

/// Wire name of a known kind. Unknown names are an error, not `generic`.
fn parse_kind(raw: &str) -> Result<EventKind, String> {
    let kind = EventKind::from(raw.to_string());
    if kind.as_str() == raw {
        Ok(kind)
    } else {
        Err(format!("unknown notification kind `{raw}`"))
    }
}

impl Cli {
    fn client_config(&self) -> Result<ClientConfig> {
        let mut config = match &self.config {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("reading {}", path.display()))?;
                ClientConfig::from_toml(&text)?
            }
            None => ClientConfig::default(),
        };
        if let Some(env) = self.environment {
            config.environment = match env {
                EnvArg::Development => Environment::Development,
                EnvArg::Production => Environment::Production,
            };
        }
        if let Some(url) = &self.api_url {
            config.api_url = Some(url.clone());
        }
        if let Some(url) = &self.ws_url {
            config.ws_url = Some(url.clone());
        }
        if let Some(path) = &self.session_file {
            config.session_file = Some(path.clone());
        }
        if config.session_file.is_none() {
            config.session_file = default_session_file();
        }
        Ok(config)
    }
}

fn default_session_file() -> Option<PathBuf> {
    std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".farmhaul").join("session.json"))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let config = cli.client_config()?;
    let client = DeliveryClient::from_config(&config)?;

    match cli.command {
        Command::Login { actor, token } => {
            client.session().login(Session::new(actor.clone(), token))?;
            println!("Logged in as {actor}");
        }
        Command::Logout => {
            if let Err(e) = client.session().restore() {
                tracing::warn!("Discarding unreadable session: {}", e);
            }
            client.logout().await?;
            println!("Logged out");
        }
        Command::Jobs {
            available,
            active,
            completed,
        } => {
            load(&client).await?;
            let deliveries = client.deliveries();
            let jobs = if available {
                deliveries.available()
            } else if active {
                deliveries.active()
            } else if completed {
                deliveries.completed()
            } else {
                [deliveries.available(), deliveries.active(), deliveries.completed()].concat()
            };
            print_jobs(&jobs, cli.json)?;
        }
        Command::Accept { job, yes } => {
            let actor = load(&client).await?;
            let id = JobId::from(job);
            let accepted = client
                .deliveries()
                .accept_job_with(&id, &actor, |job| yes || confirm(job))
                .await?;
            print_job(&accepted, cli.json)?;
        }
        Command::Advance { job, status } => {
            load(&client).await?;
            let id = JobId::from(job);
            let current = client
                .deliveries()
                .get(&id)
                .with_context(|| format!("job {id} is not visible to you"))?;
            let target = match status.or_else(|| next_status(current.status)) {
                Some(target) => target,
                None => bail!("job {id} is already {}", current.status),
            };
            let job = client.deliveries().advance(&id, target).await?;
            print_job(&job, cli.json)?;
        }
        Command::Unread => {
            require_session(&client)?;
            let count = client.refresh_unread().await?;
            if cli.json {
                println!("{}", serde_json::json!({ "count": count }));
            } else {
                println!("{count} unread");
            }
        }
        Command::Watch { kinds } => watch(&client, kinds, cli.json).await?,
    }
    Ok(())
}

fn require_session(client: &Client) -> Result<Actor> {
    match client.session().restore()? {
        Some(session) => Ok(session.actor),
        None => bail!("not logged in; run `farmhaul login` first"),
    }
}

async fn load(client: &Client) -> Result<Actor> {
    let actor = require_session(client)?;
    client.refresh().await?;
    Ok(actor)
}

fn confirm(job: &DeliveryJob) -> bool {
    print!(
        "Accept {} ({} {} {}, {} -> {}) for {:.2}? [y/N] ",
        job.id,
        job.cargo.quantity,
        job.cargo.unit,
        job.cargo.crop_type,
        job.route.pickup_location,
        job.route.delivery_location,
        job.payment.amount,
    );
    if io::stdout().flush().is_err() {
        return false;
    }
    let mut answer = String::new();
    match io::stdin().lock().read_line(&mut answer) {
        Ok(_) => matches!(answer.trim(), "y" | "Y" | "yes"),
        Err(_) => false,
    }
}

async fn watch(client: &Client, kinds: Vec<EventKind>, json: bool) -> Result<()> {
    let print = move |dispatched: &DispatchedEvent| {
        if json {
            match serde_json::to_string(&dispatched.event) {
                Ok(line) => println!("{line}"),
                Err(e) => tracing::warn!("Cannot encode event: {}", e),
            }
            return;
        }
        let marker = match dispatched.priority {
            Priority::High => "!",
            Priority::Normal => " ",
        };
        let message = dispatched.event.message.as_deref().unwrap_or("");
        println!(
            "{marker} #{:<4} {:<20} {} {}",
            dispatched.seq, dispatched.event.kind, dispatched.event.title, message
        );
    };
    if kinds.is_empty() {
        client.channel().on_event(print);
    } else {
        client
            .channel()
            .on_event_filtered(kinds, print);
    }

    if !client.resume().await? {
        bail!("not logged in; run `farmhaul login` first");
    }
    if !json {
        println!("{} unread", client.ledger().unread_count());
    }

    let mut state = client.channel().watch_state();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = state.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = *state.borrow_and_update();
                tracing::info!("Connection {:?}", current);
            }
        }
    }
    client.channel().disconnect().await;
    Ok(())
}

fn print_jobs(jobs: &[DeliveryJob], json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(jobs)?);
        return Ok(());
    }
    if jobs.is_empty() {
        println!("No jobs");
    }
    for job in jobs {
        print_job(job, false)?;
    }
    Ok(())
}

fn print_job(job: &DeliveryJob, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(job)?);
        return Ok(());
    }
    println!(
        "{:<10} {:<10} {} {} {:<12} {} -> {}  {:.2}{}",
        job.id,
        job.status,
        job.cargo.quantity,
        job.cargo.unit,
        job.cargo.crop_type,
        job.route.pickup_location,
        job.route.delivery_location,
        job.payment.amount,
        match job.payable_amount() {
            Some(_) => " (paid)",
            None => "",
        }
    );
    Ok(())
}
