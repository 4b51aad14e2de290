//! Runtime debug lines; nothing is persisted

use crate::foundation::math::{Vec3, Vec4};
use crate::scene::component::Lifecycle;

/// Colored line segment
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Line {
    /// Start point
    pub from: Vec3,
    /// End point
    pub to: Vec3,
    /// RGBA color
    pub color: Vec4,
}

/// Line list rebuilt every frame by whoever owns it
#[derive(Debug, Clone, Default)]
pub struct LineRenderer {
    lines: Vec<Line>,
}

impl LineRenderer {
    /// Queue a line
    pub fn add_line(&mut self, from: Vec3, to: Vec3, color: Vec4) {
        self.lines.push(Line { from, to, color });
    }

    /// Queue the twelve edges of a box
    pub fn add_box(&mut self, min: Vec3, max: Vec3, color: Vec4) {
        let corner = |x: bool, y: bool, z: bool| {
            Vec3::new(
                if x { max.x } else { min.x },
                if y { max.y } else { min.y },
                if z { max.z } else { min.z },
            )
        };
        for (a, b) in [
            ((false, false, false), (true, false, false)),
            ((false, true, false), (true, true, false)),
            ((false, false, true), (true, false, true)),
            ((false, true, true), (true, true, true)),
            ((false, false, false), (false, true, false)),
            ((true, false, false), (true, true, false)),
            ((false, false, true), (false, true, true)),
            ((true, false, true), (true, true, true)),
            ((false, false, false), (false, false, true)),
            ((true, false, false), (true, false, true)),
            ((false, true, false), (false, true, true)),
            ((true, true, false), (true, true, true)),
        ] {
            self.add_line(corner(a.0, a.1, a.2), corner(b.0, b.1, b.2), color);
        }
    }

    /// Queued lines
    pub fn lines(&self) -> &[Line] {
        &self.lines
    }

    /// Drop every queued line
    pub fn clear(&mut self) {
        self.lines.clear();
    }
}

impl Lifecycle for LineRenderer {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_box_has_twelve_edges() {
        let mut lines = LineRenderer::default();
        lines.add_box(Vec3::zeros(), Vec3::new(1.0, 1.0, 1.0), Vec4::new(1.0, 0.0, 0.0, 1.0));
        assert_eq!(lines.lines().len(), 12);
        lines.clear();
        assert!(lines.lines().is_empty());
    }
}
