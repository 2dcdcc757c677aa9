use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, params};
use serde::{Deserialize, Serialize};

use crate::agent::QTable;
use crate::error::{CheckpointError, LedgerError};
use crate::session::{EpisodeStats, Session};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CheckpointMeta {
    pub episode: u64,
    pub epsilon: f32,
    pub grid_size: u32,
    pub saved_at: DateTime<Utc>,
}

/// Learned values plus enough metadata to resume.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Checkpoint {
    pub meta: CheckpointMeta,
    pub q_table: QTable,
}

impl Checkpoint {
    pub fn of(session: &Session) -> Self {
        Checkpoint {
            meta: CheckpointMeta {
                episode: session.episode(),
                epsilon: session.agent().epsilon(),
                grid_size: session.env().grid_size(),
                saved_at: Utc::now(),
            },
            q_table: session.agent().q_table().clone(),
        }
    }

    /// Loads the table and epsilon into `session`'s agent.
    pub fn restore_into(self, session: &mut Session) -> Result<(), CheckpointError> {
        if self.meta.grid_size != session.env().grid_size() {
            tracing::warn!(
                saved = self.meta.grid_size,
                current = session.env().grid_size(),
                "checkpoint was trained on a different grid size"
            );
        }
        let agent = session.agent_mut();
        agent.load_q_table(self.q_table)?;
        agent.set_epsilon(self.meta.epsilon);
        Ok(())
    }
}

/// Writes the checkpoint as JSON, via a temporary file next to `path`.
pub fn save_checkpoint(path: &Path, checkpoint: &Checkpoint) -> Result<(), CheckpointError> {
    let json = serde_json::to_string(checkpoint)?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, json)?;
    fs::rename(&tmp, path)?;
    tracing::info!(path = %path.display(), states = checkpoint.q_table.len(), "checkpoint saved");
    Ok(())
}

/// `Ok(None)` when there is no file yet.
pub fn load_checkpoint(path: &Path) -> Result<Option<Checkpoint>, CheckpointError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    let checkpoint: Checkpoint = serde_json::from_str(&content)?;
    tracing::info!(path = %path.display(), states = checkpoint.q_table.len(), "checkpoint loaded");
    Ok(Some(checkpoint))
}

/// Opens (or creates) the episode ledger.
pub fn init_db(path: &Path) -> Result<Connection, LedgerError> {
    let conn = Connection::open(path)?;
    create_schema(&conn)?;
    Ok(conn)
}

pub fn init_memory_db() -> Result<Connection, LedgerError> {
    let conn = Connection::open_in_memory()?;
    create_schema(&conn)?;
    Ok(conn)
}

fn create_schema(conn: &Connection) -> Result<(), LedgerError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS episodes (
            id           INTEGER PRIMARY KEY AUTOINCREMENT,
            episode      INTEGER NOT NULL,
            steps        INTEGER NOT NULL,
            score        INTEGER NOT NULL,
            total_reward REAL NOT NULL,
            epsilon      REAL NOT NULL,
            recorded_at  TEXT NOT NULL
        )",
        [],
    )?;
    Ok(())
}

pub fn insert_episode(conn: &Connection, stats: &EpisodeStats) -> Result<(), LedgerError> {
    conn.execute(
        "INSERT INTO episodes (episode, steps, score, total_reward, epsilon, recorded_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            stats.episode as i64,
            stats.steps as i64,
            stats.score,
            stats.total_reward as f64,
            stats.epsilon as f64,
            Utc::now().to_rfc3339(),
        ],
    )?;
    Ok(())
}

/// Highest-scoring episodes, longest first on equal score.
pub fn best_episodes(conn: &Connection, limit: usize) -> Result<Vec<EpisodeStats>, LedgerError> {
    let mut stmt = conn.prepare(
        "SELECT episode, steps, score, total_reward, epsilon FROM episodes
         ORDER BY score DESC, steps DESC, id ASC LIMIT ?1",
    )?;
    let rows = stmt.query_map(params![limit as i64], |row| {
        Ok(EpisodeStats {
            episode: row.get::<_, i64>(0)? as u64,
            steps: row.get::<_, i64>(1)? as u64,
            score: row.get(2)?,
            total_reward: row.get::<_, f64>(3)? as f32,
            epsilon: row.get::<_, f64>(4)? as f32,
        })
    })?;
    let mut out = Vec::new();
    for r in rows {
        out.push(r?);
    }
    Ok(out)
}

pub fn episode_count(conn: &Connection) -> Result<u64, LedgerError> {
    let n: i64 = conn.query_row("SELECT COUNT(*) FROM episodes", [], |row| row.get(0))?;
    Ok(n as u64)
}
