use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{mpsc, watch};

use crate::channel::{Mailbox, Outbox, WireMessage};
use crate::session::{CycleReport, EpisodeStats, Session};
use crate::snake::Action;
use crate::state::GridState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Idle,
    /// Auto-resets after each episode and keeps going.
    Interactive,
    /// Faster cadence, goes back to `Idle` when the episode ends.
    Training,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ControlState {
    mode: Mode,
    resets: u64,
    shutdown: bool,
}

/// Handle the UI side uses to steer the driver. Requests take effect at the
/// start of the driver's next cycle.
#[derive(Clone)]
pub struct Controls {
    tx: Arc<watch::Sender<ControlState>>,
}

impl Default for Controls {
    fn default() -> Self {
        Self::new()
    }
}

impl Controls {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(ControlState {
            mode: Mode::Idle,
            resets: 0,
            shutdown: false,
        });
        Self { tx: Arc::new(tx) }
    }

    pub fn start(&self) {
        self.tx.send_modify(|c| c.mode = Mode::Interactive);
    }

    pub fn pause(&self) {
        self.tx.send_modify(|c| {
            if c.mode == Mode::Interactive {
                c.mode = Mode::Idle;
            }
        });
    }

    /// Pauses and asks for a fresh episode.
    pub fn stop(&self) {
        self.tx.send_modify(|c| {
            c.mode = Mode::Idle;
            c.resets += 1;
        });
    }

    pub fn start_training(&self) {
        self.tx.send_modify(|c| c.mode = Mode::Training);
    }

    pub fn stop_training(&self) {
        self.tx.send_modify(|c| {
            if c.mode == Mode::Training {
                c.mode = Mode::Idle;
            }
        });
    }

    pub fn shutdown(&self) {
        self.tx.send_modify(|c| c.shutdown = true);
    }

    pub fn mode(&self) -> Mode {
        self.tx.borrow().mode
    }

    fn subscribe(&self) -> watch::Receiver<ControlState> {
        self.tx.subscribe()
    }
}

/// What renderers and the web layer see after each cycle.
#[derive(Debug, Clone, Serialize)]
pub struct Frame {
    pub mode: Mode,
    pub episode: u64,
    pub score: u32,
    pub steps: u64,
    pub epsilon: f32,
    pub q_states: usize,
    pub state: GridState,
    pub last_action: Option<usize>,
    pub last_reward: Option<f32>,
}

pub struct InteractionDriver {
    session: Session,
    controls: Controls,
    mailbox: Mailbox,
    outbox: Outbox,
    frames: watch::Sender<Frame>,
    episodes: Option<mpsc::UnboundedSender<EpisodeStats>>,
    interactive_cadence: Duration,
    training_cadence: Duration,
}

impl InteractionDriver {
    pub fn new(session: Session, controls: Controls, mailbox: Mailbox, outbox: Outbox) -> Self {
        let first = frame_of(&session, Mode::Idle, None, None);
        let (frames, _) = watch::channel(first);
        Self {
            session,
            controls,
            mailbox,
            outbox,
            frames,
            episodes: None,
            interactive_cadence: Duration::from_millis(200),
            training_cadence: Duration::from_millis(50),
        }
    }

    pub fn with_cadence(mut self, interactive: Duration, training: Duration) -> Self {
        self.interactive_cadence = interactive;
        self.training_cadence = training;
        self
    }

    /// Every finished episode is also sent here.
    pub fn with_episode_sink(mut self, tx: mpsc::UnboundedSender<EpisodeStats>) -> Self {
        self.episodes = Some(tx);
        self
    }

    pub fn frames(&self) -> watch::Receiver<Frame> {
        self.frames.subscribe()
    }

    /// Runs cycles until `Controls::shutdown`, then hands the session back.
    ///
    /// The control state is read once at the top of each iteration; a request
    /// made while a cycle runs or while it sleeps is seen at the next one.
    pub async fn run(mut self) -> Session {
        let mut rx = self.controls.subscribe();
        let mut seen_resets = rx.borrow().resets;
        let mut forced: Option<usize> = None;

        loop {
            let ctl = *rx.borrow_and_update();
            if ctl.shutdown {
                break;
            }
            if ctl.resets != seen_resets {
                seen_resets = ctl.resets;
                self.session.reset();
                self.publish(ctl.mode, None, None);
            }

            let cadence = match ctl.mode {
                Mode::Idle => {
                    self.publish(Mode::Idle, None, None);
                    if rx.changed().await.is_err() {
                        break;
                    }
                    continue;
                }
                Mode::Interactive => self.interactive_cadence,
                Mode::Training => self.training_cadence,
            };

            if self.session.env().is_done() {
                self.session.reset();
            }
            if let Some(msg) = self.mailbox.latest() {
                if let Some(action) = self.session.apply(msg) {
                    forced = Some(action);
                }
            }

            let report = self.session.cycle(forced.take());
            match Action::from_index(report.action) {
                Some(a) => {
                    self.outbox.send(WireMessage::action(a));
                }
                None => tracing::warn!(action = report.action, "action has no wire form, not sent"),
            }

            if let Some(stats) = &report.finished {
                tracing::info!(
                    episode = stats.episode,
                    steps = stats.steps,
                    score = stats.score,
                    total_reward = stats.total_reward,
                    epsilon = stats.epsilon,
                    "episode over"
                );
                if let Some(tx) = &self.episodes {
                    let _ = tx.send(stats.clone());
                }
            }

            self.finish_cycle(ctl.mode, &report);

            tokio::time::sleep(cadence).await;
        }

        tracing::debug!("driver shut down");
        self.session
    }

    // `sampled` is the mode the cycle ran under; the controls may have moved since,
    // so the frame carries whatever they hold now.
    fn finish_cycle(&mut self, sampled: Mode, report: &CycleReport) {
        if report.done {
            match sampled {
                Mode::Interactive => {
                    self.session.reset();
                }
                Mode::Training => {
                    tracing::info!("training episode ended, halting");
                    self.controls.stop_training();
                }
                Mode::Idle => {}
            }
        }
        self.publish(self.controls.mode(), Some(report.action), Some(report.reward));
    }

    fn publish(&self, mode: Mode, action: Option<usize>, reward: Option<f32>) {
        self.frames.send_replace(frame_of(&self.session, mode, action, reward));
    }
}

fn frame_of(session: &Session, mode: Mode, action: Option<usize>, reward: Option<f32>) -> Frame {
    Frame {
        mode,
        episode: session.episode(),
        score: session.score(),
        steps: session.steps(),
        epsilon: session.agent().epsilon(),
        q_states: session.agent().q_table().len(),
        state: session.env().state(),
        last_action: action,
        last_reward: reward,
    }
}
