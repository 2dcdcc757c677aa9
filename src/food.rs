use rand::Rng;

use crate::border::Border;
use crate::snake::Snake;
use crate::utils::Point;

/// Random draws tried before falling back to a scan of the free cells.
pub const MAX_FOOD_ATTEMPTS: usize = 256;

/// Picks a food cell disjoint from the snake.
///
/// Rejection sampling first; after `MAX_FOOD_ATTEMPTS` misses the free cells
/// are enumerated and one is picked uniformly. Returns `None` only when the
/// snake covers the whole board.
pub fn place<R: Rng + ?Sized>(snake: &Snake, border: &Border, rng: &mut R) -> Option<Point> {
    if snake.len() >= border.cell_count() {
        return None;
    }
    let n = border.size as i32;
    for _ in 0..MAX_FOOD_ATTEMPTS {
        let pos = Point::new(rng.gen_range(0..n), rng.gen_range(0..n));
        if !snake.contains(pos) {
            return Some(pos);
        }
    }
    tracing::debug!(len = snake.len(), "food rejection sampling exhausted, scanning free cells");
    let free: Vec<Point> = border.cells().filter(|p| !snake.contains(*p)).collect();
    if free.is_empty() {
        return None;
    }
    Some(free[rng.gen_range(0..free.len())])
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn food_never_lands_on_snake() {
        let border = Border::new(3);
        let snake = Snake::from_body(vec![Point::new(1, 1), Point::new(0, 1), Point::new(0, 0)]);
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..200 {
            let f = place(&snake, &border, &mut rng).unwrap();
            assert!(border.is_inside(f));
            assert!(!snake.contains(f));
        }
    }

    #[test]
    fn single_free_cell_is_found() {
        let border = Border::new(2);
        let snake = Snake::from_body(vec![Point::new(0, 0), Point::new(1, 0), Point::new(1, 1)]);
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(place(&snake, &border, &mut rng), Some(Point::new(0, 1)));
    }

    #[test]
    fn full_board_has_no_food() {
        let border = Border::new(2);
        let snake = Snake::from_body(vec![
            Point::new(0, 0),
            Point::new(1, 0),
            Point::new(1, 1),
            Point::new(0, 1),
        ]);
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(place(&snake, &border, &mut rng), None);
    }
}
