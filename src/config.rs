use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::game::{MAX_GRID_SIZE, StepEvent};
use crate::snake::NUM_ACTIONS;

/// When epsilon shrinks. `Off` keeps it fixed for the agent's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EpsilonDecay {
    #[default]
    Off,
    PerAction,
    PerEpisode,
}

/// Hyperparameters of the tabular agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub num_actions: usize,
    pub alpha: f32,           // learning rate
    pub gamma: f32,           // discount factor
    pub epsilon: f32,         // exploration probability
    pub epsilon_decay: f32,   // multiplicative factor applied per decay tick
    pub epsilon_min: f32,     // floor for decay
    pub decay: EpsilonDecay,
    pub init_bias: f32,       // first-visit values drawn from [0, init_bias)
    pub update_noise: f32,    // width of the symmetric perturbation after each update
    pub seed: Option<u64>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            num_actions: NUM_ACTIONS,
            alpha: 0.1,
            gamma: 0.99,
            epsilon: 0.1,
            epsilon_decay: 0.995,
            epsilon_min: 0.01,
            decay: EpsilonDecay::Off,
            init_bias: 0.01,
            update_noise: 0.01,
            seed: None,
        }
    }
}

/// Which reward the agent learns from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum RewardMode {
    /// Distance-shaped reward computed by the environment.
    Shaped,
    /// `terminal` on a collision, `step` for every other move (a filled board included).
    Flat { step: f32, terminal: f32 },
}

impl Default for RewardMode {
    fn default() -> Self {
        RewardMode::Flat { step: 1.0, terminal: -10.0 }
    }
}

impl RewardMode {
    pub fn signal(&self, env_reward: f32, event: StepEvent) -> f32 {
        match *self {
            RewardMode::Shaped => env_reward,
            RewardMode::Flat { step, terminal } => match event {
                StepEvent::Collided | StepEvent::AlreadyDone => terminal,
                StepEvent::Moved | StepEvent::Ate | StepEvent::BoardFilled => step,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub grid_size: u32,
    pub env_seed: Option<u64>,
    pub agent: AgentConfig,
    pub reward: RewardMode,
    pub interactive_cadence_ms: u64,
    pub training_cadence_ms: u64,
    /// Step cap for one headless training episode.
    pub max_episode_steps: usize,
    pub checkpoint_path: PathBuf,
    pub ledger_path: PathBuf,
    pub bind: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            grid_size: 10,
            env_seed: None,
            agent: AgentConfig::default(),
            reward: RewardMode::default(),
            interactive_cadence_ms: 200,
            training_cadence_ms: 50,
            max_episode_steps: 1_000,
            checkpoint_path: PathBuf::from("qtable.json"),
            ledger_path: PathBuf::from("episodes.db"),
            bind: "127.0.0.1:3030".to_string(),
        }
    }
}

impl SessionConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        let cfg: SessionConfig = serde_json::from_str(&content)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let a = &self.agent;
        if !(2..=MAX_GRID_SIZE).contains(&self.grid_size) {
            return Err(ConfigError::Invalid(format!(
                "grid_size {} not in [2, {MAX_GRID_SIZE}]",
                self.grid_size
            )));
        }
        // the environment and the wire only know the four moves
        if a.num_actions != NUM_ACTIONS {
            return Err(ConfigError::Invalid(format!(
                "num_actions {} must be {NUM_ACTIONS}",
                a.num_actions
            )));
        }
        if !(a.alpha > 0.0 && a.alpha <= 1.0) {
            return Err(ConfigError::Invalid(format!("alpha {} not in (0, 1]", a.alpha)));
        }
        if !(0.0..=1.0).contains(&a.gamma) {
            return Err(ConfigError::Invalid(format!("gamma {} not in [0, 1]", a.gamma)));
        }
        if !(0.0..=1.0).contains(&a.epsilon) {
            return Err(ConfigError::Invalid(format!("epsilon {} not in [0, 1]", a.epsilon)));
        }
        if !(0.0..=1.0).contains(&a.epsilon_min) || !(0.0..=1.0).contains(&a.epsilon_decay) {
            return Err(ConfigError::Invalid("epsilon_min and epsilon_decay must be in [0, 1]".into()));
        }
        if a.init_bias < 0.0 || a.update_noise < 0.0 {
            return Err(ConfigError::Invalid("init_bias and update_noise must be non-negative".into()));
        }
        if self.max_episode_steps == 0 {
            return Err(ConfigError::Invalid("max_episode_steps must be positive".into()));
        }
        Ok(())
    }

    pub fn interactive_cadence(&self) -> Duration {
        Duration::from_millis(self.interactive_cadence_ms)
    }

    pub fn training_cadence(&self) -> Duration {
        Duration::from_millis(self.training_cadence_ms)
    }
}
