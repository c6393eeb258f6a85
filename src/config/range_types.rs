use derive_more::{Display, From};
use serde::{Deserialize, Serialize};

/// A normalized brush strength constrained to [0.0, 1.0]
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Display, From, Serialize, Deserialize)]
pub struct BrushStrength(f32);

impl BrushStrength {
    const MIN: f32 = 0.0;
    const MAX: f32 = 1.0;

    pub fn new(value: f32) -> Self {
        Self(value.clamp(Self::MIN, Self::MAX))
    }

    pub fn get(self) -> f32 {
        self.0
    }
}

impl Default for BrushStrength {
    fn default() -> Self {
        Self::new(0.5)
    }
}

/// A raise brush strength in world elevation units, constrained to [0.0, 2000.0]
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Display, From, Serialize, Deserialize)]
pub struct RaiseStrength(f32);

impl RaiseStrength {
    const MIN: f32 = 0.0;
    const MAX: f32 = 2000.0;

    pub fn new(value: f32) -> Self {
        Self(value.clamp(Self::MIN, Self::MAX))
    }

    pub fn get(self) -> f32 {
        self.0
    }
}

impl Default for RaiseStrength {
    fn default() -> Self {
        Self::new(10.0)
    }
}

/// A brush footprint edge in heightmap squares, constrained to [1.0, 1024.0]
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Display, From, Serialize, Deserialize)]
pub struct BrushSize(f32);

impl BrushSize {
    const MIN: f32 = 1.0;
    const MAX: f32 = 1024.0;

    pub fn new(value: f32) -> Self {
        Self(value.clamp(Self::MIN, Self::MAX))
    }

    pub fn get(self) -> f32 {
        self.0
    }
}

impl Default for BrushSize {
    fn default() -> Self {
        Self::new(16.0)
    }
}

/// A world elevation bound constrained to [-10000.0, 10000.0]
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Display, From, Serialize, Deserialize)]
pub struct HeightBound(f32);

impl HeightBound {
    const MIN: f32 = -10000.0;
    const MAX: f32 = 10000.0;

    pub fn new(value: f32) -> Self {
        Self(value.clamp(Self::MIN, Self::MAX))
    }

    pub fn get(self) -> f32 {
        self.0
    }
}

impl Default for HeightBound {
    fn default() -> Self {
        Self::new(0.0)
    }
}

/// A per-pass smoothing strength constrained to [0.0, 1.0]
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Display, From, Serialize, Deserialize)]
pub struct SmoothingStrength(f32);

impl SmoothingStrength {
    const MIN: f32 = 0.0;
    const MAX: f32 = 1.0;

    pub fn new(value: f32) -> Self {
        Self(value.clamp(Self::MIN, Self::MAX))
    }

    pub fn get(self) -> f32 {
        self.0
    }
}

impl Default for SmoothingStrength {
    fn default() -> Self {
        Self::new(0.5)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_brush_strength_clamping() {
        assert_eq!(BrushStrength::new(-1.0).get(), 0.0);
        assert_eq!(BrushStrength::new(0.5).get(), 0.5);
        assert_eq!(BrushStrength::new(3.0).get(), 1.0);
    }

    #[test]
    fn test_raise_and_height_clamping() {
        assert_eq!(RaiseStrength::new(5000.0).get(), 2000.0);
        assert_eq!(RaiseStrength::new(-5.0).get(), 0.0);
        assert_eq!(HeightBound::new(-20000.0).get(), -10000.0);
        assert_eq!(BrushSize::new(0.0).get(), 1.0);
    }

    #[test]
    fn test_display() {
        let strength = BrushStrength::new(0.25);
        assert_eq!(format!("{strength}"), "0.25");
    }

    #[test]
    fn test_defaults() {
        assert_eq!(BrushStrength::default().get(), 0.5);
        assert_eq!(RaiseStrength::default().get(), 10.0);
        assert_eq!(BrushSize::default().get(), 16.0);
        assert_eq!(SmoothingStrength::default().get(), 0.5);
    }
}
