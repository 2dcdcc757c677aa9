use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::border::Border;
use crate::error::{EnvError, KeyError};
use crate::utils::Point;

/// Snapshot of the environment: body head-to-tail, food, terminal flag.
///
/// `food` is `None` only after the snake has filled the whole board.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridState {
    pub body: Vec<Point>,
    pub food: Option<Point>,
    pub done: bool,
}

impl GridState {
    /// Body cells head to tail, then the food cell, as one integer sequence.
    pub fn flatten(&self) -> Vec<i32> {
        let mut out = Vec::with_capacity(self.body.len() * 2 + 2);
        for p in &self.body {
            out.push(p.x);
            out.push(p.y);
        }
        if let Some(f) = self.food {
            out.push(f.x);
            out.push(f.y);
        }
        out
    }

    pub fn key(&self) -> StateKey {
        StateKey(self.flatten())
    }

    /// Parses a flattened `[x0, y0, ..., food_x, food_y]` vector and checks it
    /// describes a legal, non-terminal position on `border`.
    pub fn from_flat(values: &[i32], border: &Border) -> Result<GridState, EnvError> {
        if values.len() < 4 || values.len() % 2 != 0 {
            return Err(EnvError::BadStateLength(values.len()));
        }
        let mut cells: Vec<Point> = values.chunks_exact(2).map(|c| Point::new(c[0], c[1])).collect();
        for p in &cells {
            if !border.is_inside(*p) {
                return Err(EnvError::OutOfBounds { x: p.x, y: p.y });
            }
        }
        let food = cells.pop().ok_or(EnvError::BadStateLength(values.len()))?;
        for (i, p) in cells.iter().enumerate() {
            if cells[..i].contains(p) {
                return Err(EnvError::OverlappingBody { x: p.x, y: p.y });
            }
        }
        if cells.contains(&food) {
            return Err(EnvError::FoodOnBody { x: food.x, y: food.y });
        }
        Ok(GridState { body: cells, food: Some(food), done: false })
    }
}

/// Hashable Q-table key: the exact flattened state.
///
/// Its length varies with the snake's length. Serialised as the
/// comma-joined integers, e.g. `"5,5,2,2"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct StateKey(pub Vec<i32>);

impl fmt::Display for StateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, v) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{v}")?;
        }
        Ok(())
    }
}

impl FromStr for StateKey {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Ok(StateKey(Vec::new()));
        }
        s.split(',')
            .map(|part| {
                part.trim()
                    .parse::<i32>()
                    .map_err(|_| KeyError::NotAnInteger(part.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()
            .map(StateKey)
    }
}

impl From<StateKey> for String {
    fn from(k: StateKey) -> String {
        k.to_string()
    }
}

impl TryFrom<String> for StateKey {
    type Error = KeyError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}
