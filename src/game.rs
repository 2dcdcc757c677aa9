use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::border::Border;
use crate::error::EnvError;
use crate::food;
use crate::snake::{Snake, delta_for};
use crate::state::{GridState, StateKey};
use crate::utils::Point;

pub const REWARD_COLLISION: f32 = -10.0;
pub const REWARD_FOOD: f32 = 20.0;
pub const REWARD_STEP: f32 = -0.01;
pub const REWARD_SHAPING: f32 = 5.0;

/// Largest accepted side length. Coordinates are `i32` and the renderer allocates n*n cells.
pub const MAX_GRID_SIZE: u32 = 1024;

/// What happened during one `step`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepEvent {
    Moved,
    Ate,
    /// Wall or body hit; the move was not applied.
    Collided,
    /// The last food filled the board, nothing is left to place.
    BoardFilled,
    /// Step on an episode that had already ended.
    AlreadyDone,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    pub state: GridState,
    pub reward: f32,
    pub done: bool,
    pub event: StepEvent,
}

/// Single snake on an `n x n` grid. Everything is deterministic except food placement.
pub struct SnakeEnv {
    border: Border,
    snake: Snake,
    food: Option<Point>,
    done: bool,
    rng: StdRng,
}

impl SnakeEnv {
    pub fn new(grid_size: u32, seed: Option<u64>) -> Result<Self, EnvError> {
        if grid_size < 2 {
            return Err(EnvError::GridTooSmall(grid_size));
        }
        if grid_size > MAX_GRID_SIZE {
            return Err(EnvError::GridTooLarge { size: grid_size, max: MAX_GRID_SIZE });
        }
        let border = Border::new(grid_size);
        let rng = match seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_entropy(),
        };
        let mut env = SnakeEnv {
            border,
            snake: Snake::new(border.center()),
            food: None,
            done: false,
            rng,
        };
        env.reset();
        Ok(env)
    }

    pub fn grid_size(&self) -> u32 {
        self.border.size
    }

    pub fn border(&self) -> &Border {
        &self.border
    }

    /// Length-1 snake at the center, fresh food, terminal flag cleared.
    pub fn reset(&mut self) -> GridState {
        self.snake = Snake::new(self.border.center());
        self.food = food::place(&self.snake, &self.border, &mut self.rng);
        self.done = self.food.is_none();
        self.state()
    }

    /// Applies action `0 up, 1 down, 2 left, 3 right`.
    ///
    /// Any other id leaves the head in place, which then collides with the body.
    pub fn step(&mut self, action: usize) -> Step {
        if self.done {
            return self.finish(REWARD_COLLISION, StepEvent::AlreadyDone);
        }
        let Some(food) = self.food else {
            self.done = true;
            return self.finish(REWARD_COLLISION, StepEvent::AlreadyDone);
        };

        let head = self.snake.head();
        let old_distance = head.manhattan(food);
        let new_head = head.offset(delta_for(action));

        if !self.border.is_inside(new_head) || self.snake.contains(new_head) {
            self.done = true;
            return self.finish(REWARD_COLLISION, StepEvent::Collided);
        }

        let ate = new_head == food;
        self.snake.advance(new_head, ate);

        let (mut reward, mut event) = if ate {
            (REWARD_FOOD, StepEvent::Ate)
        } else {
            (REWARD_STEP, StepEvent::Moved)
        };

        if ate {
            self.food = food::place(&self.snake, &self.border, &mut self.rng);
            if self.food.is_none() {
                tracing::info!(len = self.snake.len(), "snake filled the board");
                self.done = true;
                event = StepEvent::BoardFilled;
            }
        }

        // shaping compares against the food the move was aimed at
        let new_distance = new_head.manhattan(food);
        if new_distance < old_distance {
            reward += REWARD_SHAPING;
        } else if new_distance > old_distance {
            reward -= REWARD_SHAPING;
        }

        self.finish(reward, event)
    }

    pub fn state(&self) -> GridState {
        GridState {
            body: self.snake.body().to_vec(),
            food: self.food,
            done: self.done,
        }
    }

    /// Flattened `[body..., food]` key consumed by the agent.
    pub fn state_key(&self) -> StateKey {
        self.state().key()
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    pub fn snake(&self) -> &Snake {
        &self.snake
    }

    pub fn food(&self) -> Option<Point> {
        self.food
    }

    /// Overwrites body and food from a flattened state vector and clears the
    /// terminal flag. The local state is untouched when the vector is invalid.
    pub fn restore(&mut self, values: &[i32]) -> Result<(), EnvError> {
        let state = GridState::from_flat(values, &self.border)?;
        self.snake = Snake::from_body(state.body);
        self.food = state.food;
        self.done = false;
        Ok(())
    }

    fn finish(&self, reward: f32, event: StepEvent) -> Step {
        Step {
            state: self.state(),
            reward,
            done: self.done,
            event,
        }
    }
}
