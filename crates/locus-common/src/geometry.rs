use serde::{Deserialize, Serialize};

/// A point in CSS pixels relative to the top-left of the viewport.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance_to(&self, other: &Point) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }

    pub fn offset(&self, dx: f64, dy: f64) -> Point {
        Point::new(self.x + dx, self.y + dy)
    }
}

/// Axis-aligned rectangle, as reported by `getBoundingClientRect`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub const fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn center(&self) -> Point {
        Point::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    pub fn contains(&self, point: &Point) -> bool {
        point.x >= self.x
            && point.x <= self.x + self.width
            && point.y >= self.y
            && point.y <= self.y + self.height
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }
}

/// Quadrilateral from a box model: four corners, clockwise from top-left.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quad {
    pub points: [Point; 4],
}

impl Quad {
    /// Build from the flat `[x1, y1, x2, y2, x3, y3, x4, y4]` layout used by
    /// the DevTools protocol. Returns `None` for any other length.
    pub fn from_flat(values: &[f64]) -> Option<Self> {
        if values.len() != 8 {
            return None;
        }
        Some(Self {
            points: [
                Point::new(values[0], values[1]),
                Point::new(values[2], values[3]),
                Point::new(values[4], values[5]),
                Point::new(values[6], values[7]),
            ],
        })
    }

    pub fn from_rect(rect: &Rect) -> Self {
        Self {
            points: [
                Point::new(rect.x, rect.y),
                Point::new(rect.x + rect.width, rect.y),
                Point::new(rect.x + rect.width, rect.y + rect.height),
                Point::new(rect.x, rect.y + rect.height),
            ],
        }
    }

    /// Click point: `((x1 + x2) / 2, (y1 + y4) / 2)`.
    pub fn center(&self) -> Point {
        let [p1, p2, _, p4] = self.points;
        Point::new((p1.x + p2.x) / 2.0, (p1.y + p4.y) / 2.0)
    }
}

/// Direction of travel, e.g. the last leg of a cursor trail.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vector {
    pub dx: f64,
    pub dy: f64,
}

impl Vector {
    pub const fn new(dx: f64, dy: f64) -> Self {
        Self { dx, dy }
    }

    pub fn between(from: &Point, to: &Point) -> Self {
        Self::new(to.x - from.x, to.y - from.y)
    }

    pub fn length(&self) -> f64 {
        (self.dx * self.dx + self.dy * self.dy).sqrt()
    }

    /// Unit vector in the same direction, or `None` for a zero-length vector.
    pub fn normalized(&self) -> Option<Vector> {
        let len = self.length();
        if len <= f64::EPSILON {
            return None;
        }
        Some(Vector::new(self.dx / len, self.dy / len))
    }

    pub fn dot(&self, other: &Vector) -> f64 {
        self.dx * other.dx + self.dy * other.dy
    }
}
