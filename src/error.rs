use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum EnvError {
    #[error("grid size {0} is too small, need at least 2")]
    GridTooSmall(u32),
    #[error("grid size {size} is too large, at most {max}")]
    GridTooLarge { size: u32, max: u32 },
    #[error("state vector must hold an even number of at least 4 values, got {0}")]
    BadStateLength(usize),
    #[error("cell ({x}, {y}) is outside the grid")]
    OutOfBounds { x: i32, y: i32 },
    #[error("body cell ({x}, {y}) appears twice")]
    OverlappingBody { x: i32, y: i32 },
    #[error("food cell ({x}, {y}) lies on the body")]
    FoodOnBody { x: i32, y: i32 },
}

#[derive(Error, Debug, PartialEq)]
pub enum AgentError {
    #[error("action {action} out of range for {num_actions} actions")]
    ActionOutOfRange { action: usize, num_actions: usize },
    #[error("q-table row for state {key} has {len} values, expected {num_actions}")]
    RowLength { key: String, len: usize, num_actions: usize },
}

#[derive(Error, Debug)]
pub enum KeyError {
    #[error("state key component {0:?} is not an integer")]
    NotAnInteger(String),
}

#[derive(Error, Debug)]
pub enum CheckpointError {
    #[error("checkpoint io: {0}")]
    Io(#[from] std::io::Error),
    #[error("checkpoint json: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Agent(#[from] AgentError),
}

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("ledger sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

#[derive(Error, Debug)]
pub enum WireError {
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("action {0} is not one of 0..=3")]
    ActionOutOfRange(i64),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("config io: {0}")]
    Io(#[from] std::io::Error),
    #[error("config json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}
