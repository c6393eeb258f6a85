//! Conversions between heightmap squares, world units and layer cells.

/// World units covered by one heightmap square
pub const SQUARE_SIZE: f32 = 8.0;

/// World coordinates (floating point, engine units)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WorldCoord {
    pub x: f32,
    pub z: f32,
}

impl WorldCoord {
    pub fn new(x: f32, z: f32) -> Self {
        Self { x, z }
    }
}

/// Convert world coordinates to fractional heightmap squares
pub fn world_to_grid(world_x: f32, world_z: f32) -> (f32, f32) {
    (world_x / SQUARE_SIZE, world_z / SQUARE_SIZE)
}

/// Convert heightmap squares to world coordinates
pub fn grid_to_world(grid_x: f32, grid_z: f32) -> WorldCoord {
    WorldCoord::new(grid_x * SQUARE_SIZE, grid_z * SQUARE_SIZE)
}

/// Map a normalized height onto the world elevation range
pub fn elevation(normalized: f32, min_height: f32, max_height: f32) -> f32 {
    min_height + normalized * (max_height - min_height)
}

/// Scale heightmap-square coordinates onto a layer with the given resolution ratio
pub fn to_layer_cell(grid_x: f32, grid_z: f32, ratio: f32) -> (f32, f32) {
    (grid_x * ratio, grid_z * ratio)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coordinate_transformations() {
        let (grid_x, grid_z) = world_to_grid(16.0, 40.0);
        assert_eq!((grid_x, grid_z), (2.0, 5.0));

        let world = grid_to_world(2.0, 5.0);
        assert_eq!(world, WorldCoord::new(16.0, 40.0));
    }

    #[test]
    fn test_elevation_and_layer_scaling() {
        assert_eq!(elevation(0.5, -100.0, 300.0), 100.0);
        assert_eq!(to_layer_cell(3.0, 4.0, 8.0), (24.0, 32.0));
        assert_eq!(to_layer_cell(6.0, 2.0, 0.25), (1.5, 0.5));
    }
}
