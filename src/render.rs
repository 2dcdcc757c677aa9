use crate::state::GridState;

const EMPTY: char = '.';
const HEAD: char = 'H';
const BODY: char = 'o';
const FOOD: char = '*';

/// Draws the board as `size` lines of `size` characters.
/// Read-only: it only looks at a snapshot.
pub fn to_text(state: &GridState, size: u32) -> String {
    let n = size as usize;
    let mut cells = vec![EMPTY; n * n];

    // food first, snake on top
    if let Some(f) = state.food {
        if let Some(c) = cell_index(f.x, f.y, n) {
            cells[c] = FOOD;
        }
    }
    for (i, seg) in state.body.iter().enumerate() {
        if let Some(c) = cell_index(seg.x, seg.y, n) {
            cells[c] = if i == 0 { HEAD } else { BODY };
        }
    }

    let mut out = String::with_capacity(n * (n + 1));
    for row in cells.chunks(n.max(1)) {
        out.extend(row.iter());
        out.push('\n');
    }
    out
}

fn cell_index(x: i32, y: i32, n: usize) -> Option<usize> {
    if x < 0 || y < 0 || x as usize >= n || y as usize >= n {
        return None;
    }
    Some(y as usize * n + x as usize)
}
