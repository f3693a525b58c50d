use std::{
    collections::HashMap,
    error::Error,
    path::PathBuf,
    process::ExitCode
};

use tokio::{
    runtime::Builder,
    task::JoinSet
};
use clap::{ArgAction, Parser, Subcommand};

use tokio_rustls::TlsAcceptor;

use tracing::{error, info, warn, Level};
use tracing_subscriber;

use mudbridge::{
    config::Config,
    networking::{ClientListener, LinkAcceptor, LinkConnector, tls::load_acceptor},
    portal::{ConnectionRegistry, Portal},
    server::{Server, SessionRegistry},
    session::StatusHandler
};

#[derive(Parser, Debug)]
#[clap(version, author = "Andrew Bastien <volundmush@gmail.com>", about = "Connection portal and session server for MUDs.")]
pub struct Args {
    #[arg(short, long, value_name = "path", help = "Sets the TOML config file. Built-in defaults are used if omitted")]
    pub config: Option<PathBuf>,

    #[arg(short, long, action = ArgAction::Count, help = "More logging. -v for debug, -vv for trace")]
    pub verbose: u8,

    #[command(subcommand)]
    pub role: Role
}

#[derive(Subcommand, Debug, Clone, Copy)]
pub enum Role {
    /// Accept client connections and serve the link.
    Portal,
    /// Connect to the portal and host sessions.
    Server
}

async fn run_portal(config: Config) -> Result<(), Box<dyn Error>> {
    let mut registry = ConnectionRegistry::new();
    registry.register_from_config(&config)?;
    let defs: Vec<_> = registry.listeners().cloned().collect();

    let mut acceptors: HashMap<String, TlsAcceptor> = HashMap::new();
    for def in defs.iter() {
        if let Some(name) = &def.tls {
            if !acceptors.contains_key(name) {
                if let Some(keys) = config.tls.get(name) {
                    acceptors.insert(name.clone(), load_acceptor(name, keys)?);
                }
            }
        }
    }

    let mut portal = Portal::new(registry);
    let mut tasks = JoinSet::new();

    for def in defs {
        let tls = def.tls.as_ref().and_then(|name| acceptors.get(name)).cloned();
        let mut listener = ClientListener::bind(def, tls, portal.tx_portal.clone()).await?;
        tasks.spawn(async move { listener.run().await });
    }

    let (host, port) = config.link_addr()?;
    let mut link_acceptor = LinkAcceptor::bind(&host, port, portal.tx_portal.clone()).await?;
    tasks.spawn(async move { link_acceptor.run().await });

    tasks.spawn(async move { portal.run().await });

    supervise(tasks).await;
    Ok(())
}

async fn run_server(config: Config) -> Result<(), Box<dyn Error>> {
    let registry = SessionRegistry::new(StatusHandler::new(config.mssp_pairs()));
    let mut server = Server::new(registry);

    let (host, port) = config.link_addr()?;
    let mut connector = LinkConnector::new(&host, port, server.tx_server.clone());

    let mut tasks = JoinSet::new();
    tasks.spawn(async move { connector.run().await });
    tasks.spawn(async move { server.run().await });

    supervise(tasks).await;
    Ok(())
}

// Runs until Ctrl-C or until any task finishes on its own, then tears everything down.
async fn supervise(mut tasks: JoinSet<()>) {
    tokio::select! {
        res = tokio::signal::ctrl_c() => {
            if let Err(e) = res {
                warn!(error = %e, "could not listen for ctrl-c");
            }
            info!("interrupted, shutting down");
        },
        res = tasks.join_next() => {
            if let Some(Err(e)) = res {
                error!(error = %e, "task failed");
            } else {
                warn!("a task stopped unexpectedly, shutting down");
            }
        }
    }
    tasks.abort_all();
    while tasks.join_next().await.is_some() {}
}

async fn run(args: Args) -> Result<(), Box<dyn Error>> {
    let config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default()
    };

    info!(role = ?args.role, "mudbridge starting up");
    match args.role {
        Role::Portal => run_portal(config).await?,
        Role::Server => run_server(config).await?
    }
    info!("mudbridge shut down");
    Ok(())
}

fn main() -> ExitCode {
    let args: Args = Args::parse();

    let level = match args.verbose {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .init();

    let runtime = match Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            error!(error = %e, "could not start the runtime");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(args)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "fatal");
            ExitCode::FAILURE
        }
    }
}
