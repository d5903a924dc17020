//! Spatial types shared by the pipeline

use serde::{Deserialize, Serialize};

/// Target bounding box of a generated asset, in scene units
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Dimensions {
    pub height: f64,
    pub width: f64,
    pub depth: f64,
}

impl Dimensions {
    /// Unit cube, used whenever classification cannot provide real sizes
    pub const UNIT: Self = Self {
        height: 1.0,
        width: 1.0,
        depth: 1.0,
    };

    pub const fn new(height: f64, width: f64, depth: f64) -> Self {
        Self {
            height,
            width,
            depth,
        }
    }

    /// All three extents are finite and strictly positive
    pub fn is_valid(&self) -> bool {
        [self.height, self.width, self.depth]
            .iter()
            .all(|v| v.is_finite() && *v > 0.0)
    }
}

impl Default for Dimensions {
    fn default() -> Self {
        Self::UNIT
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_is_valid() {
        assert!(Dimensions::UNIT.is_valid());
        assert_eq!(Dimensions::default(), Dimensions::UNIT);
    }

    #[test]
    fn test_rejects_non_positive_and_non_finite() {
        assert!(!Dimensions::new(0.0, 1.0, 1.0).is_valid());
        assert!(!Dimensions::new(1.0, -2.0, 1.0).is_valid());
        assert!(!Dimensions::new(1.0, 1.0, f64::NAN).is_valid());
        assert!(!Dimensions::new(f64::INFINITY, 1.0, 1.0).is_valid());
    }
}
