use serde::Serialize;

use crate::agent::QLearningAgent;
use crate::channel::WireMessage;
use crate::config::{RewardMode, SessionConfig};
use crate::error::EnvError;
use crate::game::{SnakeEnv, StepEvent};
use crate::state::GridState;

/// Summary of one finished episode.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EpisodeStats {
    pub episode: u64,
    pub steps: u64,
    pub score: u32,
    pub total_reward: f32,
    pub epsilon: f32,
}

/// Result of one read -> act -> step -> update cycle.
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub action: usize,
    /// Reward the agent learned from, chosen by `RewardMode`.
    pub reward: f32,
    /// Shaped reward the environment produced.
    pub env_reward: f32,
    pub done: bool,
    pub event: StepEvent,
    pub state: GridState,
    pub finished: Option<EpisodeStats>,
}

/// Owns the environment and the agent for one interaction session.
pub struct Session {
    env: SnakeEnv,
    agent: QLearningAgent,
    reward: RewardMode,
    episode: u64,
    steps: u64,
    score: u32,
    total_reward: f32,
}

impl Session {
    pub fn new(cfg: &SessionConfig) -> Result<Self, EnvError> {
        let env = SnakeEnv::new(cfg.grid_size, cfg.env_seed)?;
        let agent = QLearningAgent::new(cfg.agent.clone());
        Ok(Self::from_parts(env, agent, cfg.reward))
    }

    pub fn from_parts(env: SnakeEnv, agent: QLearningAgent, reward: RewardMode) -> Self {
        Self {
            env,
            agent,
            reward,
            episode: 1,
            steps: 0,
            score: 0,
            total_reward: 0.0,
        }
    }

    /// One cycle. `override_action` replaces the agent's choice (remote control);
    /// the agent still learns from the transition.
    pub fn cycle(&mut self, override_action: Option<usize>) -> CycleReport {
        let state = self.env.state_key();
        let action = match override_action {
            Some(a) => a,
            None => self.agent.select_action(&state),
        };

        let step = self.env.step(action);
        let reward = self.reward.signal(step.reward, step.event);
        let next_state = step.state.key();
        if let Err(e) = self.agent.update(&state, action, reward, &next_state) {
            tracing::warn!(error = %e, "skipping q update");
        }

        if step.event != StepEvent::AlreadyDone {
            self.steps += 1;
            self.total_reward += reward;
        }
        if matches!(step.event, StepEvent::Ate | StepEvent::BoardFilled) {
            self.score += 1;
        }

        let finished = if step.done && step.event != StepEvent::AlreadyDone {
            Some(self.close_episode())
        } else {
            None
        };

        CycleReport {
            action,
            reward,
            env_reward: step.reward,
            done: step.done,
            event: step.event,
            state: step.state,
            finished,
        }
    }

    /// Ends the running episode early (step cap) and reports it.
    pub fn truncate_episode(&mut self) -> EpisodeStats {
        self.close_episode()
    }

    fn close_episode(&mut self) -> EpisodeStats {
        self.agent.end_episode();
        let stats = EpisodeStats {
            episode: self.episode,
            steps: self.steps,
            score: self.score,
            total_reward: self.total_reward,
            epsilon: self.agent.epsilon(),
        };
        tracing::debug!(?stats, "episode finished");
        stats
    }

    /// Starts a new episode.
    pub fn reset(&mut self) -> GridState {
        self.episode += 1;
        self.steps = 0;
        self.score = 0;
        self.total_reward = 0.0;
        self.env.reset()
    }

    /// Overrides local body/food with a remote state vector.
    pub fn sync_state(&mut self, values: &[i32]) -> Result<(), EnvError> {
        self.env.restore(values)
    }

    /// Applies an inbound message; returns the action to force on the next cycle, if any.
    pub fn apply(&mut self, msg: WireMessage) -> Option<usize> {
        match msg {
            WireMessage::Action { action } => Some(action as usize),
            WireMessage::StateSync { state } => {
                if let Err(e) = self.sync_state(&state) {
                    tracing::warn!(error = %e, "ignoring remote state");
                }
                None
            }
        }
    }

    pub fn env(&self) -> &SnakeEnv {
        &self.env
    }

    pub fn agent(&self) -> &QLearningAgent {
        &self.agent
    }

    pub fn agent_mut(&mut self) -> &mut QLearningAgent {
        &mut self.agent
    }

    pub fn episode(&self) -> u64 {
        self.episode
    }

    pub fn score(&self) -> u32 {
        self.score
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AgentConfig;
    use crate::utils::Point;

    fn session(reward: RewardMode) -> Session {
        let cfg = SessionConfig {
            env_seed: Some(1),
            agent: AgentConfig { seed: Some(2), ..AgentConfig::default() },
            reward,
            ..SessionConfig::default()
        };
        Session::new(&cfg).unwrap()
    }

    #[test]
    fn flat_reward_is_the_default_signal() {
        let mut s = session(RewardMode::default());
        s.sync_state(&[5, 5, 2, 2]).unwrap();
        let r = s.cycle(Some(3));
        assert_eq!(r.reward, 1.0);
        assert!((r.env_reward - (-5.01)).abs() < 1e-5);
        let q = s.agent().q_table().get(&"5,5,2,2".parse().unwrap()).unwrap()[3];
        assert!((q - 0.1).abs() <= 0.005 + 1e-6);
    }

    #[test]
    fn shaped_reward_passes_through() {
        let mut s = session(RewardMode::Shaped);
        s.sync_state(&[5, 5, 2, 2]).unwrap();
        let r = s.cycle(Some(3));
        assert_eq!(r.reward, r.env_reward);
    }

    #[test]
    fn terminal_cycle_reports_episode() {
        let mut s = session(RewardMode::default());
        s.sync_state(&[0, 0, 5, 5]).unwrap();
        let r = s.cycle(Some(0));
        assert!(r.done);
        assert_eq!(r.reward, -10.0);
        let stats = r.finished.unwrap();
        assert_eq!(stats.episode, 1);
        assert_eq!(stats.steps, 1);
        assert_eq!(stats.score, 0);

        // stepping an ended episode does not finish it again
        assert!(s.cycle(Some(1)).finished.is_none());

        s.reset();
        assert_eq!(s.episode(), 2);
        assert_eq!(s.steps(), 0);
        assert!(!s.env().is_done());
    }

    #[test]
    fn filled_board_pays_the_step_reward() {
        let cfg = SessionConfig {
            grid_size: 2,
            env_seed: Some(1),
            agent: AgentConfig { seed: Some(2), ..AgentConfig::default() },
            ..SessionConfig::default()
        };
        let mut s = Session::new(&cfg).unwrap();
        s.sync_state(&[0, 1, 0, 0, 1, 0, 1, 1]).unwrap();
        let r = s.cycle(Some(3));
        assert_eq!(r.event, StepEvent::BoardFilled);
        assert!(r.done);
        assert_eq!(r.reward, 1.0);
        assert_eq!(r.finished.unwrap().score, 1);
    }

    #[test]
    fn eating_counts_score() {
        let mut s = session(RewardMode::Shaped);
        s.sync_state(&[3, 2, 2, 2, 4, 2]).unwrap();
        let r = s.cycle(Some(3));
        assert_eq!(r.event, StepEvent::Ate);
        assert_eq!(s.score(), 1);
        assert_eq!(r.state.body[0], Point::new(4, 2));
    }

    #[test]
    fn inbound_messages() {
        let mut s = session(RewardMode::default());
        assert_eq!(s.apply(WireMessage::Action { action: 2 }), Some(2));
        assert_eq!(s.apply(WireMessage::StateSync { state: vec![1, 1, 8, 8] }), None);
        assert_eq!(s.env().state().flatten(), vec![1, 1, 8, 8]);
        // invalid sync leaves the state alone
        s.apply(WireMessage::StateSync { state: vec![1, 1, 1, 1] });
        assert_eq!(s.env().state().flatten(), vec![1, 1, 8, 8]);
    }
}
