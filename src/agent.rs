//! tabular Q-learning: sparse table, epsilon-greedy selection, TD update, snapshot/restore

use std::collections::HashMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::config::{AgentConfig, EpsilonDecay};
use crate::error::AgentError;
use crate::state::StateKey;
use crate::utils::{argmax, max_value};

/// State key -> one value per action. Rows are created on first visit and never removed.
///
/// Serialises as a JSON object `{"5,5,2,2": [q0, q1, q2, q3], ...}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QTable {
    rows: HashMap<StateKey, Vec<f32>>,
}

impl QTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn get(&self, key: &StateKey) -> Option<&[f32]> {
        self.rows.get(key).map(|v| v.as_slice())
    }

    pub fn insert(&mut self, key: StateKey, values: Vec<f32>) {
        self.rows.insert(key, values);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&StateKey, &Vec<f32>)> {
        self.rows.iter()
    }

    fn row_or_zeros(&mut self, key: &StateKey, num_actions: usize) -> &mut Vec<f32> {
        self.rows.entry(key.clone()).or_insert_with(|| vec![0.0; num_actions])
    }
}

pub struct QLearningAgent {
    cfg: AgentConfig,
    table: QTable,
    epsilon: f32,
    rng: StdRng,
}

impl QLearningAgent {
    pub fn new(cfg: AgentConfig) -> Self {
        let rng = match cfg.seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_entropy(),
        };
        let epsilon = cfg.epsilon;
        Self { cfg, table: QTable::new(), epsilon, rng }
    }

    pub fn epsilon(&self) -> f32 {
        self.epsilon
    }

    /// Overrides the current exploration probability, e.g. 0 for greedy evaluation.
    pub fn set_epsilon(&mut self, epsilon: f32) {
        self.epsilon = epsilon.clamp(0.0, 1.0);
    }

    /// Epsilon-greedy choice for `state`.
    ///
    /// A state seen here for the first time gets small random values and a
    /// random action. A row whose values are all equal also yields a random
    /// action; otherwise the first maximal index is returned.
    pub fn select_action(&mut self, state: &StateKey) -> usize {
        let action = self.choose(state);
        if self.cfg.decay == EpsilonDecay::PerAction {
            self.decay_epsilon();
        }
        action
    }

    fn choose(&mut self, state: &StateKey) -> usize {
        let n = self.cfg.num_actions;
        if self.rng.r#gen::<f32>() < self.epsilon {
            return self.rng.gen_range(0..n);
        }
        let Some(row) = self.table.get(state) else {
            let bias = self.cfg.init_bias;
            let row: Vec<f32> = (0..n).map(|_| self.rng.r#gen::<f32>() * bias).collect();
            self.table.insert(state.clone(), row);
            return self.rng.gen_range(0..n);
        };
        if row.iter().all(|&v| v == row[0]) {
            return self.rng.gen_range(0..n);
        }
        argmax(row)
    }

    /// `Q(s,a) += alpha * (r + gamma * max Q(s',.) - Q(s,a))`, then a uniform
    /// offset in `[-update_noise/2, update_noise/2)` is added to `Q(s,a)`.
    ///
    /// Missing rows for `state` and `next_state` start at zero. Returns the new `Q(s,a)`.
    pub fn update(
        &mut self,
        state: &StateKey,
        action: usize,
        reward: f32,
        next_state: &StateKey,
    ) -> Result<f32, AgentError> {
        let n = self.cfg.num_actions;
        if action >= n {
            return Err(AgentError::ActionOutOfRange { action, num_actions: n });
        }
        self.table.row_or_zeros(state, n);
        let next_max = max_value(self.table.row_or_zeros(next_state, n));
        let target = reward + self.cfg.gamma * next_max;

        let noise = (self.rng.r#gen::<f32>() - 0.5) * self.cfg.update_noise;
        let alpha = self.cfg.alpha;
        let row = self.table.row_or_zeros(state, n);
        row[action] += alpha * (target - row[action]);
        row[action] += noise;

        tracing::trace!(%state, action, reward, target, q = row[action], "q update");
        Ok(row[action])
    }

    /// Called once per finished episode.
    pub fn end_episode(&mut self) {
        if self.cfg.decay == EpsilonDecay::PerEpisode {
            self.decay_epsilon();
        }
    }

    fn decay_epsilon(&mut self) {
        self.epsilon = (self.epsilon * self.cfg.epsilon_decay).max(self.cfg.epsilon_min);
    }

    pub fn q_table(&self) -> &QTable {
        &self.table
    }

    /// Replaces the whole table. Rows must have one value per action.
    pub fn load_q_table(&mut self, table: QTable) -> Result<(), AgentError> {
        let n = self.cfg.num_actions;
        if let Some((key, row)) = table.iter().find(|(_, row)| row.len() != n) {
            return Err(AgentError::RowLength {
                key: key.to_string(),
                len: row.len(),
                num_actions: n,
            });
        }
        self.table = table;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> AgentConfig {
        AgentConfig { seed: Some(9), ..AgentConfig::default() }
    }

    fn key(v: &[i32]) -> StateKey {
        StateKey(v.to_vec())
    }

    #[test]
    fn first_visit_creates_biased_row() {
        let mut agent = QLearningAgent::new(AgentConfig { epsilon: 0.0, ..cfg() });
        let s = key(&[5, 5, 2, 2]);
        let a = agent.select_action(&s);
        assert!(a < 4);
        let row = agent.q_table().get(&s).unwrap();
        assert_eq!(row.len(), 4);
        assert!(row.iter().all(|&v| (0.0..0.01).contains(&v)));
    }

    #[test]
    fn greedy_picks_first_max() {
        let mut agent = QLearningAgent::new(AgentConfig { epsilon: 0.0, ..cfg() });
        let s = key(&[1, 1, 3, 3]);
        let mut table = QTable::new();
        table.insert(s.clone(), vec![0.1, 0.7, 0.7, 0.2]);
        agent.load_q_table(table).unwrap();
        for _ in 0..20 {
            assert_eq!(agent.select_action(&s), 1);
        }
    }

    #[test]
    fn uniform_row_explores_all_actions() {
        let mut agent = QLearningAgent::new(AgentConfig { epsilon: 0.0, ..cfg() });
        let s = key(&[1, 1, 3, 3]);
        let mut table = QTable::new();
        table.insert(s.clone(), vec![0.0; 4]);
        agent.load_q_table(table).unwrap();
        let mut seen = [false; 4];
        for _ in 0..200 {
            seen[agent.select_action(&s)] = true;
        }
        assert!(seen.iter().all(|&x| x));
    }

    #[test]
    fn full_exploration_ignores_table() {
        let mut agent = QLearningAgent::new(AgentConfig { epsilon: 1.0, ..cfg() });
        let s = key(&[1, 1, 3, 3]);
        let mut table = QTable::new();
        table.insert(s.clone(), vec![9.0, 0.0, 0.0, 0.0]);
        agent.load_q_table(table).unwrap();
        let picks: Vec<usize> = (0..100).map(|_| agent.select_action(&s)).collect();
        assert!(picks.iter().any(|&a| a != 0));
    }

    #[test]
    fn update_moves_toward_td_target() {
        let mut agent = QLearningAgent::new(cfg());
        let s = key(&[5, 5, 2, 2]);
        let s2 = key(&[6, 5, 2, 2]);
        let mut table = QTable::new();
        table.insert(s.clone(), vec![1.0, 0.0, 0.0, 0.0]);
        table.insert(s2.clone(), vec![0.5, 2.0, -1.0, 0.0]);
        agent.load_q_table(table).unwrap();

        let q = agent.update(&s, 0, 1.0, &s2).unwrap();
        // 1.0 + 0.1 * ((1.0 + 0.99 * 2.0) - 1.0) = 1.198
        let expected = 1.0 + 0.1 * (1.0 + 0.99 * 2.0 - 1.0);
        assert!((q - expected).abs() <= 0.005 + 1e-6, "q = {q}");
        assert_eq!(agent.q_table().get(&s).unwrap()[0], q);
        assert_eq!(agent.q_table().get(&s2).unwrap(), &[0.5, 2.0, -1.0, 0.0]);
    }

    #[test]
    fn update_zero_initialises_missing_rows() {
        let mut agent = QLearningAgent::new(cfg());
        let s = key(&[5, 5, 2, 2]);
        let s2 = key(&[6, 5, 2, 2]);
        let q = agent.update(&s, 3, -10.0, &s2).unwrap();
        assert!((q - (-1.0)).abs() <= 0.005 + 1e-6);
        assert_eq!(agent.q_table().get(&s2).unwrap(), &[0.0; 4]);
        assert_eq!(agent.q_table().get(&s).unwrap()[..3], [0.0; 3]);
        assert_eq!(agent.q_table().len(), 2);
    }

    #[test]
    fn update_on_self_loop() {
        let mut agent = QLearningAgent::new(AgentConfig { update_noise: 0.0, ..cfg() });
        let s = key(&[0, 0, 1, 1]);
        let q = agent.update(&s, 1, 2.0, &s).unwrap();
        assert!((q - 0.2).abs() < 1e-6);
    }

    #[test]
    fn update_rejects_bad_action() {
        let mut agent = QLearningAgent::new(cfg());
        let s = key(&[0, 0, 1, 1]);
        assert_eq!(
            agent.update(&s, 4, 0.0, &s),
            Err(AgentError::ActionOutOfRange { action: 4, num_actions: 4 })
        );
        assert!(agent.q_table().is_empty());
    }

    #[test]
    fn table_round_trip_keeps_greedy_choices() {
        let mut agent = QLearningAgent::new(AgentConfig { epsilon: 0.0, ..cfg() });
        let mut table = QTable::new();
        table.insert(key(&[1, 1, 3, 3]), vec![0.1, 0.2, 0.9, 0.3]);
        table.insert(key(&[2, 1, 1, 1, 3, 3]), vec![-1.0, 4.0, 0.0, 0.3]);
        table.insert(key(&[7, 7, 0, 0]), vec![0.0, 0.0, 0.0, 0.5]);
        agent.load_q_table(table).unwrap();

        let json = serde_json::to_string(agent.q_table()).unwrap();
        let restored: QTable = serde_json::from_str(&json).unwrap();
        let mut other = QLearningAgent::new(AgentConfig { epsilon: 0.0, ..cfg() });
        other.load_q_table(restored).unwrap();

        let keys: Vec<StateKey> = agent.q_table().iter().map(|(k, _)| k.clone()).collect();
        for k in keys {
            assert_eq!(agent.select_action(&k), other.select_action(&k));
        }
        assert!(json.contains("\"2,1,1,1,3,3\""));
    }

    #[test]
    fn load_rejects_wrong_row_length() {
        let mut agent = QLearningAgent::new(cfg());
        let mut table = QTable::new();
        table.insert(key(&[1, 1, 3, 3]), vec![0.1, 0.2]);
        assert!(matches!(
            agent.load_q_table(table),
            Err(AgentError::RowLength { len: 2, num_actions: 4, .. })
        ));
    }

    #[test]
    fn epsilon_decay_is_opt_in() {
        let s = key(&[1, 1, 3, 3]);
        let mut off = QLearningAgent::new(cfg());
        for _ in 0..50 {
            off.select_action(&s);
            off.end_episode();
        }
        assert_eq!(off.epsilon(), 0.1);

        let mut per_action = QLearningAgent::new(AgentConfig {
            decay: EpsilonDecay::PerAction,
            epsilon: 1.0,
            epsilon_decay: 0.5,
            ..cfg()
        });
        per_action.select_action(&s);
        assert_eq!(per_action.epsilon(), 0.5);
        for _ in 0..20 {
            per_action.select_action(&s);
        }
        assert_eq!(per_action.epsilon(), 0.01);

        let mut per_episode = QLearningAgent::new(AgentConfig {
            decay: EpsilonDecay::PerEpisode,
            epsilon: 0.5,
            epsilon_decay: 0.5,
            ..cfg()
        });
        per_episode.select_action(&s);
        assert_eq!(per_episode.epsilon(), 0.5);
        per_episode.end_episode();
        assert_eq!(per_episode.epsilon(), 0.25);
    }
}
