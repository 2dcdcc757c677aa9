use crate::utils::Point;

pub const NUM_ACTIONS: usize = 4;

/// Absolute move of the head. The discriminants are the wire/agent action ids.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Action {
    Up = 0,
    Down = 1,
    Left = 2,
    Right = 3,
}

impl Action {
    pub const ALL: [Action; NUM_ACTIONS] = [Action::Up, Action::Down, Action::Left, Action::Right];

    /// `None` for ids outside `0..4`.
    pub fn from_index(i: usize) -> Option<Action> {
        Self::ALL.get(i).copied()
    }

    pub fn index(self) -> usize {
        self as usize
    }

    /// `(dx, dy)` of one step in this direction.
    pub fn delta(self) -> (i32, i32) {
        match self {
            Action::Up => (0, -1),
            Action::Down => (0, 1),
            Action::Left => (-1, 0),
            Action::Right => (1, 0),
        }
    }
}

/// Delta for a raw action id. Unknown ids do not move the head.
pub fn delta_for(action: usize) -> (i32, i32) {
    Action::from_index(action).map(Action::delta).unwrap_or((0, 0))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snake {
    body: Vec<Point>, // body[0] - head
}

impl Snake {
    pub fn new(head: Point) -> Snake {
        Snake { body: vec![head] }
    }

    /// Caller guarantees a non-empty body of distinct cells.
    pub fn from_body(body: Vec<Point>) -> Snake {
        debug_assert!(!body.is_empty());
        Snake { body }
    }

    pub fn head(&self) -> Point {
        self.body[0]
    }

    pub fn body(&self) -> &[Point] {
        &self.body
    }

    pub fn len(&self) -> usize {
        self.body.len()
    }

    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }

    pub fn contains(&self, p: Point) -> bool {
        self.body.contains(&p)
    }

    /// Pushes `new_head` to the front; the tail is dropped unless `grow`.
    pub fn advance(&mut self, new_head: Point, grow: bool) {
        self.body.insert(0, new_head);
        if !grow {
            self.body.pop();
        }
    }
}
