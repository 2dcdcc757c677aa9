use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::sync::{mpsc, watch};

use snake_qlearn::channel::{Outbox, mailbox};
use snake_qlearn::config::SessionConfig;
use snake_qlearn::db::{self, Checkpoint};
use snake_qlearn::driver::{Controls, Frame, InteractionDriver};
use snake_qlearn::session::{EpisodeStats, Session};
use snake_qlearn::web::{self, WebState};
use snake_qlearn::{log, render, train};

#[derive(Parser)]
#[command(name = "snake_qlearn")]
#[command(version, about = "Snake on a grid learned with tabular Q-learning")]
struct Cli {
    /// JSON config file; missing fields fall back to defaults
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Grid size (cells per side)
    #[arg(long, global = true)]
    grid_size: Option<u32>,

    /// Q-table checkpoint path
    #[arg(long, global = true)]
    checkpoint: Option<PathBuf>,

    /// Seed for both environment and agent
    #[arg(long, global = true)]
    seed: Option<u64>,

    /// Default log level when RUST_LOG is unset
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the driver behind the web server (websocket + control endpoints)
    Serve {
        #[arg(long)]
        bind: Option<String>,
    },
    /// Headless training, episodes back to back
    Train {
        #[arg(long, default_value = "1000")]
        episodes: u64,
    },
    /// Run the driver in the terminal until Ctrl-C
    Play {
        /// Training mode: faster cadence, stops after one episode
        #[arg(long)]
        train: bool,
        /// Print the board after every cycle
        #[arg(long)]
        render: bool,
    },
    /// Greedy evaluation of the saved table
    Eval {
        #[arg(long, default_value = "100")]
        episodes: u64,
    },
}

fn load_config(cli: &Cli) -> Result<SessionConfig> {
    let mut cfg = match &cli.config {
        Some(path) => SessionConfig::from_file(path)
            .with_context(|| format!("reading config {}", path.display()))?,
        None => SessionConfig::default(),
    };
    if let Some(n) = cli.grid_size {
        cfg.grid_size = n;
    }
    if let Some(p) = &cli.checkpoint {
        cfg.checkpoint_path = p.clone();
    }
    if let Some(seed) = cli.seed {
        cfg.env_seed = Some(seed);
        cfg.agent.seed = Some(seed ^ 0xA5A5_5A5A);
    }
    if let Command::Serve { bind: Some(b) } = &cli.command {
        cfg.bind = b.clone();
    }
    cfg.validate()?;
    Ok(cfg)
}

fn open_session(cfg: &SessionConfig) -> Result<Session> {
    let mut session = Session::new(cfg)?;
    match db::load_checkpoint(&cfg.checkpoint_path) {
        Ok(Some(cp)) => cp.restore_into(&mut session)?,
        Ok(None) => tracing::info!("no checkpoint, starting with an empty table"),
        Err(e) => tracing::warn!(error = %e, "checkpoint unreadable, starting with an empty table"),
    }
    Ok(session)
}

fn save(session: &Session, path: &Path) {
    if let Err(e) = db::save_checkpoint(path, &Checkpoint::of(session)) {
        tracing::error!(error = %e, "could not save checkpoint");
    }
}

/// Writes finished episodes to the ledger off the async runtime.
fn spawn_ledger(path: PathBuf) -> (mpsc::UnboundedSender<EpisodeStats>, tokio::task::JoinHandle<()>) {
    let (tx, mut rx) = mpsc::unbounded_channel::<EpisodeStats>();
    let handle = tokio::task::spawn_blocking(move || {
        let conn = match db::init_db(&path) {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!(error = %e, "episode ledger unavailable");
                while rx.blocking_recv().is_some() {}
                return;
            }
        };
        while let Some(stats) = rx.blocking_recv() {
            if let Err(e) = db::insert_episode(&conn, &stats) {
                tracing::warn!(error = %e, "could not record episode");
            }
        }
    });
    (tx, handle)
}

async fn serve(cfg: SessionConfig) -> Result<()> {
    let addr: SocketAddr = cfg.bind.parse().with_context(|| format!("bad bind address {}", cfg.bind))?;
    let session = open_session(&cfg)?;
    let controls = Controls::new();
    let (inbox, mb) = mailbox();
    let outbox = Outbox::new(256);
    let (ledger_tx, ledger) = spawn_ledger(cfg.ledger_path.clone());

    let driver = InteractionDriver::new(session, controls.clone(), mb, outbox.clone())
        .with_cadence(cfg.interactive_cadence(), cfg.training_cadence())
        .with_episode_sink(ledger_tx);
    let state = WebState { controls: controls.clone(), inbox, outbox, frames: driver.frames() };
    let driver = tokio::spawn(driver.run());

    let shutdown_controls = controls.clone();
    let served = web::serve(addr, state, async move {
        if tokio::signal::ctrl_c().await.is_err() {
            tracing::warn!("ctrl-c handler unavailable");
        }
        shutdown_controls.shutdown();
    })
    .await;

    controls.shutdown();
    let session = driver.await?;
    save(&session, &cfg.checkpoint_path);
    ledger.await?;
    served.context("web server failed")?;
    Ok(())
}

async fn play(cfg: SessionConfig, training: bool, show: bool) -> Result<()> {
    let session = open_session(&cfg)?;
    let grid_size = cfg.grid_size;
    let controls = Controls::new();
    let (_inbox, mb) = mailbox();
    let (ledger_tx, ledger) = spawn_ledger(cfg.ledger_path.clone());
    let (episode_tx, mut episodes) = mpsc::unbounded_channel::<EpisodeStats>();

    let driver = InteractionDriver::new(session, controls.clone(), mb, Outbox::new(16))
        .with_cadence(cfg.interactive_cadence(), cfg.training_cadence())
        .with_episode_sink(episode_tx);
    let mut frames: watch::Receiver<Frame> = driver.frames();
    let driver = tokio::spawn(driver.run());

    if training {
        controls.start_training();
    } else {
        controls.start();
    }

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = frames.changed() => {
                if changed.is_err() {
                    break;
                }
                let frame = frames.borrow_and_update().clone();
                if show {
                    println!(
                        "episode {} score {} steps {} eps {:.3}\n{}",
                        frame.episode,
                        frame.score,
                        frame.steps,
                        frame.epsilon,
                        render::to_text(&frame.state, grid_size)
                    );
                }
            }
            Some(stats) = episodes.recv() => {
                let _ = ledger_tx.send(stats);
                if training {
                    break;
                }
            }
        }
    }
    drop(ledger_tx);

    controls.shutdown();
    let session = driver.await?;
    save(&session, &cfg.checkpoint_path);
    ledger.await?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    log::init(&cli.log_level, Path::new(log::LOG_FILE));
    let cfg = load_config(&cli)?;

    match cli.command {
        Command::Serve { .. } => serve(cfg).await?,
        Command::Train { episodes } => {
            let mut session = open_session(&cfg)?;
            let ledger = match db::init_db(&cfg.ledger_path) {
                Ok(c) => Some(c),
                Err(e) => {
                    tracing::warn!(error = %e, "episode ledger unavailable");
                    None
                }
            };
            let summary = train::run(
                &mut session,
                episodes,
                cfg.max_episode_steps,
                ledger.as_ref(),
                Some(&cfg.checkpoint_path),
            )?;
            tracing::info!(?summary, "training finished");
            if let Some(conn) = &ledger {
                for ep in db::best_episodes(conn, 5)? {
                    tracing::info!(episode = ep.episode, score = ep.score, steps = ep.steps, "top episode");
                }
            }
        }
        Command::Play { train, render } => play(cfg, train, render).await?,
        Command::Eval { episodes } => {
            let mut session = open_session(&cfg)?;
            let summary = train::evaluate(&mut session, episodes, cfg.max_episode_steps);
            tracing::info!(?summary, "evaluation finished");
        }
    }
    Ok(())
}
