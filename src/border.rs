use crate::utils::Point;

/// Square playing field `[0, size) x [0, size)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Border {
    pub size: u32,
}

impl Border {
    pub fn new(size: u32) -> Self {
        Self { size }
    }

    pub fn is_inside(&self, p: Point) -> bool {
        p.x >= 0 && p.y >= 0 && (p.x as u32) < self.size && (p.y as u32) < self.size
    }

    pub fn center(&self) -> Point {
        let c = (self.size / 2) as i32;
        Point::new(c, c)
    }

    pub fn cell_count(&self) -> usize {
        (self.size as usize) * (self.size as usize)
    }

    /// All cells in row-major order.
    pub fn cells(&self) -> impl Iterator<Item = Point> + '_ {
        let n = self.size as i32;
        (0..n).flat_map(move |y| (0..n).map(move |x| Point::new(x, y)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inside_and_outside() {
        let b = Border::new(10);
        assert!(b.is_inside(Point::new(0, 0)));
        assert!(b.is_inside(Point::new(9, 9)));
        assert!(!b.is_inside(Point::new(-1, 3)));
        assert!(!b.is_inside(Point::new(3, 10)));
    }

    #[test]
    fn center_floors_odd_sizes() {
        assert_eq!(Border::new(10).center(), Point::new(5, 5));
        assert_eq!(Border::new(7).center(), Point::new(3, 3));
    }

    #[test]
    fn cells_cover_the_board() {
        assert_eq!(Border::new(4).cells().count(), Border::new(4).cell_count());
    }
}
