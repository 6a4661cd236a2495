//! The moving avatar each playing session steers.

use shared::TurnDirection;

/// A player's bug: floating-point position and an integer heading in degrees,
/// always normalized to `[0, 360)`. The bug advances exactly one unit per
/// turn in the heading direction.
#[derive(Debug, Clone, PartialEq)]
pub struct Bug {
    pub x: f64,
    pub y: f64,
    pub heading: i32,
}

impl Bug {
    /// The board cell currently under the bug: floor of each coordinate.
    /// Floor (not truncation) so that positions just past the left or top
    /// edge land outside the board.
    pub fn cell(&self) -> (i32, i32) {
        (self.x.floor() as i32, self.y.floor() as i32)
    }

    /// Applies one turn of steering and movement: rotate by the turning speed
    /// when the last key is right or left, then move one unit forward.
    pub fn advance(&mut self, key: TurnDirection, turning_speed: u16) {
        match key {
            TurnDirection::Right => self.heading += turning_speed as i32,
            TurnDirection::Left => self.heading -= turning_speed as i32,
            TurnDirection::Straight => {}
        }
        self.heading = self.heading.rem_euclid(360);
        let theta = (self.heading as f64).to_radians();
        self.x += theta.cos();
        self.y += theta.sin();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn advances_one_unit_along_heading() {
        let mut bug = Bug {
            x: 2.5,
            y: 3.5,
            heading: 0,
        };
        bug.advance(TurnDirection::Straight, 6);
        assert_approx_eq!(bug.x, 3.5);
        assert_approx_eq!(bug.y, 3.5);

        let mut bug = Bug {
            x: 2.5,
            y: 3.5,
            heading: 90,
        };
        bug.advance(TurnDirection::Straight, 6);
        assert_approx_eq!(bug.x, 2.5);
        assert_approx_eq!(bug.y, 4.5);
    }

    #[test]
    fn steering_wraps_heading() {
        let mut bug = Bug {
            x: 0.5,
            y: 0.5,
            heading: 358,
        };
        bug.advance(TurnDirection::Right, 6);
        assert_eq!(bug.heading, 4);

        let mut bug = Bug {
            x: 0.5,
            y: 0.5,
            heading: 0,
        };
        bug.advance(TurnDirection::Left, 6);
        assert_eq!(bug.heading, 354);
    }

    #[test]
    fn four_right_angles_close_the_loop() {
        let mut bug = Bug {
            x: 5.5,
            y: 5.5,
            heading: 0,
        };
        for _ in 0..4 {
            bug.advance(TurnDirection::Right, 90);
        }
        assert_approx_eq!(bug.x, 5.5, 1e-9);
        assert_approx_eq!(bug.y, 5.5, 1e-9);
        assert_eq!(bug.heading, 0);
    }

    #[test]
    fn cell_uses_floor_for_negative_positions() {
        let bug = Bug {
            x: -0.25,
            y: 0.75,
            heading: 0,
        };
        assert_eq!(bug.cell(), (-1, 0));
    }
}
