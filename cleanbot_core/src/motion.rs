//! Moves the robot's footprint from one waypoint to the next.
//!
//! In inspection mode a step is a jump. In normal mode the footprint slides
//! toward the waypoint a few world units per frame, finishing the horizontal
//! leg before starting the vertical one.

use serde::{Deserialize, Serialize};

use crate::{Point, Rect};

/// Footprint origin that centers a cell-sized rectangle on `waypoint`.
#[inline]
fn origin_for(waypoint: Point, cell_size: i32) -> Point {
    Point::new(waypoint.x - cell_size / 2, waypoint.y - cell_size / 2)
}

/// Moves `current` toward `target` by `speed` without overshooting.
#[inline]
fn approach(current: i32, target: i32, speed: i32) -> i32 {
    if current < target {
        (current + speed).min(target)
    } else {
        (current - speed).max(target)
    }
}

/// Places the footprint on `waypoint` immediately.
pub fn teleport(rect: &mut Rect, waypoint: Point, cell_size: i32) {
    let origin = origin_for(waypoint, cell_size);
    rect.x = origin.x;
    rect.y = origin.y;
}

/// Interpolation state of a single step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Motion {
    target: Point,
    direction: (i32, i32),
    moving: bool,
}

impl Motion {
    /// A motion at rest on the given footprint origin.
    pub fn at_rest(origin: Point) -> Self {
        Motion {
            target: origin,
            direction: (0, 1),
            moving: false,
        }
    }

    #[inline]
    pub fn is_moving(&self) -> bool {
        self.moving
    }

    /// Footprint origin the current step is heading for.
    pub fn target(&self) -> Point {
        self.target
    }

    /// Starts sliding `rect` toward `waypoint`.
    pub fn begin(&mut self, rect: &Rect, waypoint: Point, cell_size: i32) {
        self.target = origin_for(waypoint, cell_size);
        let (dx, dy) = (self.target.x - rect.x, self.target.y - rect.y);
        if dx != 0 || dy != 0 {
            self.direction = (dx.signum(), dy.signum());
        }
        self.moving = dx != 0 || dy != 0;
    }

    /// Advances one frame. Returns true on the frame the step completes.
    pub fn advance(&mut self, rect: &mut Rect, speed: i32) -> bool {
        if !self.moving {
            return false;
        }
        if rect.x != self.target.x {
            rect.x = approach(rect.x, self.target.x, speed);
        } else if rect.y != self.target.y {
            rect.y = approach(rect.y, self.target.y, speed);
        }
        if rect.x == self.target.x && rect.y == self.target.y {
            self.moving = false;
            return true;
        }
        false
    }

    /// Finishes the current step at once.
    pub fn snap(&mut self, rect: &mut Rect) {
        if self.moving {
            rect.x = self.target.x;
            rect.y = self.target.y;
            self.moving = false;
        }
        self.target = Point::new(rect.x, rect.y);
    }

    /// Last non-zero heading, as a unit vector.
    pub fn direction(&self) -> (i32, i32) {
        self.direction
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn teleport_centers_on_waypoint() {
        let mut rect = Rect::new(0, 60, 30, 30);
        teleport(&mut rect, Point::new(45, 105), 30);
        assert_eq!(rect, Rect::new(30, 90, 30, 30));
        assert_eq!(rect.center(), Point::new(45, 105));
    }

    #[test]
    fn slides_horizontally_then_vertically() {
        let mut rect = Rect::new(0, 60, 30, 30);
        let mut motion = Motion::at_rest(Point::new(0, 60));
        // A diagonal target is never produced by a path, but shows the axis order.
        motion.target = Point::new(10, 70);
        motion.moving = true;

        assert!(!motion.advance(&mut rect, 5));
        assert_eq!((rect.x, rect.y), (5, 60));
        assert!(!motion.advance(&mut rect, 5));
        assert_eq!((rect.x, rect.y), (10, 60));
        assert!(!motion.advance(&mut rect, 5));
        assert_eq!((rect.x, rect.y), (10, 65));
        assert!(motion.advance(&mut rect, 5));
        assert_eq!((rect.x, rect.y), (10, 70));
        assert!(!motion.is_moving());
        assert!(!motion.advance(&mut rect, 5));
    }

    #[test]
    fn one_cell_step_takes_cell_over_speed_frames() {
        let mut rect = Rect::new(30, 90, 30, 30);
        let mut motion = Motion::at_rest(Point::new(30, 90));
        motion.begin(&rect, Point::new(45, 75), 30);
        assert!(motion.is_moving());
        assert_eq!(motion.direction(), (0, -1));
        let frames = (1..=10).find(|_| motion.advance(&mut rect, 7)).unwrap();
        assert_eq!(frames, 5);
        assert_eq!(rect, Rect::new(30, 60, 30, 30));
    }

    #[test]
    fn begin_on_current_cell_does_not_move() {
        let rect = Rect::new(30, 90, 30, 30);
        let mut motion = Motion::at_rest(Point::new(30, 90));
        motion.begin(&rect, rect.center(), 30);
        assert!(!motion.is_moving());
    }

    #[test]
    fn snap_completes_the_step() {
        let mut rect = Rect::new(30, 90, 30, 30);
        let mut motion = Motion::at_rest(Point::new(30, 90));
        motion.begin(&rect, Point::new(75, 105), 30);
        motion.advance(&mut rect, 5);
        motion.snap(&mut rect);
        assert_eq!(rect, Rect::new(60, 90, 30, 30));
        assert!(!motion.is_moving());
    }
}
