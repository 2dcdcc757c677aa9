use std::path::Path;

use rusqlite::Connection;

use crate::db::{Checkpoint, insert_episode, save_checkpoint};
use crate::error::CheckpointError;
use crate::log;
use crate::session::{EpisodeStats, Session};
use crate::utils::vec_stats;

const LOG_EVERY: u64 = 100;

#[derive(Debug, Clone, PartialEq)]
pub struct TrainSummary {
    pub episodes: u64,
    pub best_score: u32,
    pub mean_score: f32,
    pub mean_steps: f32,
    pub q_states: usize,
}

impl TrainSummary {
    fn from_episodes(scores: &[f32], steps: &[f32], q_states: usize) -> Self {
        let score = vec_stats(scores);
        TrainSummary {
            episodes: scores.len() as u64,
            best_score: score.max as u32,
            mean_score: score.mean,
            mean_steps: vec_stats(steps).mean,
            q_states,
        }
    }
}

/// Runs one episode to completion, or until `max_steps` cycles. Episodes cut
/// by the step cap are reported with the steps taken so far.
pub fn run_episode(session: &mut Session, max_steps: usize) -> EpisodeStats {
    for _ in 0..max_steps {
        let report = session.cycle(None);
        if let Some(stats) = report.finished {
            return stats;
        }
    }
    session.truncate_episode()
}

/// Back-to-back episodes without any cadence.
///
/// Every episode goes to the ledger when one is given; the checkpoint is
/// written on each new best score and once at the end.
pub fn run(
    session: &mut Session,
    episodes: u64,
    max_steps: usize,
    ledger: Option<&Connection>,
    checkpoint: Option<&Path>,
) -> Result<TrainSummary, CheckpointError> {
    let mut best_score = 0u32;
    let mut scores = Vec::with_capacity(episodes as usize);
    let mut steps = Vec::with_capacity(episodes as usize);

    for _ in 0..episodes {
        if session.env().is_done() || session.steps() > 0 {
            session.reset();
        }
        let stats = run_episode(session, max_steps);
        scores.push(stats.score as f32);
        steps.push(stats.steps as f32);

        if let Some(conn) = ledger {
            if let Err(e) = insert_episode(conn, &stats) {
                tracing::warn!(error = %e, "could not record episode");
            }
        }

        if stats.score > best_score {
            best_score = stats.score;
            tracing::info!(episode = stats.episode, score = stats.score, "new best score");
            if let Some(path) = checkpoint {
                save_checkpoint(path, &Checkpoint::of(session))?;
            }
        }

        if stats.episode % LOG_EVERY == 0 {
            log::scalar(stats.episode, "score", stats.score as f32);
            log::scalar(stats.episode, "steps", stats.steps as f32);
            log::scalar(stats.episode, "epsilon", stats.epsilon);
            log::scalar(stats.episode, "q_states", session.agent().q_table().len() as f32);
        }
    }

    if let Some(path) = checkpoint {
        save_checkpoint(path, &Checkpoint::of(session))?;
    }

    Ok(TrainSummary::from_episodes(&scores, &steps, session.agent().q_table().len()))
}

/// Greedy play (epsilon 0) for `episodes` episodes. Epsilon is restored afterwards.
///
/// The agent keeps updating while it plays, as it does in every mode.
pub fn evaluate(session: &mut Session, episodes: u64, max_steps: usize) -> TrainSummary {
    let saved_epsilon = session.agent().epsilon();
    session.agent_mut().set_epsilon(0.0);

    let mut scores = Vec::with_capacity(episodes as usize);
    let mut steps = Vec::with_capacity(episodes as usize);
    for _ in 0..episodes {
        session.reset();
        let stats = run_episode(session, max_steps);
        scores.push(stats.score as f32);
        steps.push(stats.steps as f32);
    }

    session.agent_mut().set_epsilon(saved_epsilon);
    TrainSummary::from_episodes(&scores, &steps, session.agent().q_table().len())
}
