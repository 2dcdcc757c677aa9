use serde::{Deserialize, Serialize};

/// One grid cell. `x` grows to the right, `y` grows downwards.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Cell reached by one step of `(dx, dy)`.
    pub fn offset(&self, (dx, dy): (i32, i32)) -> Point {
        Point { x: self.x + dx, y: self.y + dy }
    }

    /// Manhattan distance, used for reward shaping.
    pub fn manhattan(&self, other: Point) -> i32 {
        (self.x - other.x).abs() + (self.y - other.y).abs()
    }
}

/// Index of the largest value; the first one wins on ties.
pub fn argmax(v: &[f32]) -> usize {
    let mut best_i = 0;
    let mut best_v = f32::NEG_INFINITY;
    for (i, &x) in v.iter().enumerate() {
        if x > best_v {
            best_v = x;
            best_i = i;
        }
    }
    best_i
}

/// Largest value of a slice, `0.0` for an empty one.
pub fn max_value(v: &[f32]) -> f32 {
    if v.is_empty() {
        return 0.0;
    }
    v.iter().cloned().fold(f32::NEG_INFINITY, f32::max)
}

/// min / max / mean of a vector of values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Stats {
    pub min: f32,
    pub max: f32,
    pub mean: f32,
}

pub fn vec_stats(xs: &[f32]) -> Stats {
    if xs.is_empty() {
        return Stats { min: 0.0, max: 0.0, mean: 0.0 };
    }
    let mut mn = xs[0];
    let mut mx = xs[0];
    let mut sum = 0.0f32;
    for &v in xs {
        if v < mn { mn = v; }
        if v > mx { mx = v; }
        sum += v;
    }
    Stats { min: mn, max: mx, mean: sum / (xs.len() as f32) }
}
