//! Erosion of the normalized heightmap.
//!
//! Three variants share one parameter set:
//! - `Wet`: grid based hydraulic erosion. Every cell receives rain, dissolves
//!   terrain into its water, passes water and sediment to lower neighbours and
//!   deposits what the remaining water can no longer carry.
//! - `Wet2`: droplet erosion. Single droplets follow the gradient with
//!   inertia, eroding while below capacity and depositing above it.
//! - `Dry`: thermal erosion moving material down slopes steeper than the
//!   talus threshold.
//!
//! Every variant runs at most `iterations` steps and leaves heights in
//! `[0, 1]`.

use super::{Region, resolve_region};
use crate::config::ErosionSetup;
use crate::errors::{MapEditError, MapEditResult};
use crate::raster::Raster;
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64;
use std::str::FromStr;
use tracing::{debug, info};

const NEIGHBOURS: [(i64, i64); 4] = [(1, 0), (-1, 0), (0, 1), (0, -1)];
const MIN_DROPLET_WATER: f32 = 0.01;
const MIN_DROPLET_SLOPE: f32 = 0.0001;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErosionKind {
    Wet,
    Wet2,
    Dry,
}

impl FromStr for ErosionKind {
    type Err = MapEditError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "wet" => Ok(Self::Wet),
            "wet2" => Ok(Self::Wet2),
            "dry" => Ok(Self::Dry),
            _ => Err(MapEditError::InvalidSettings {
                reason: format!("Unknown erosion type '{s}'. Available: wet, wet2, dry"),
            }),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ErosionStats {
    pub iterations: u32,
    pub total_eroded: f64,
    pub total_deposited: f64,
    /// Stopped before `iterations` because nothing was left to move
    pub converged: bool,
}

/// Run one erosion variant over the heightmap, or a region of it
pub fn erode(
    heightmap: &mut Raster<f32>,
    kind: ErosionKind,
    setup: &ErosionSetup,
    region: Option<Region>,
) -> MapEditResult<ErosionStats> {
    let Some(region) = resolve_region(heightmap, region) else {
        return Err(MapEditError::DimensionMismatch {
            reason: "Erosion region lies outside the heightmap".to_string(),
        });
    };

    let stats = match kind {
        ErosionKind::Wet => erode_wet(heightmap, setup, region),
        ErosionKind::Wet2 => erode_droplets(heightmap, setup, region),
        ErosionKind::Dry => erode_thermal(heightmap, setup, region),
    };

    for y in region.y..region.y + region.height {
        for value in &mut heightmap.row_mut(y)[region.x..region.x + region.width] {
            *value = value.clamp(0.0, 1.0);
        }
    }

    info!(
        "{:?} erosion: {} iterations, eroded {:.4}, deposited {:.4}",
        kind, stats.iterations, stats.total_eroded, stats.total_deposited
    );
    Ok(stats)
}

/// Cell grid local to the eroded region
struct RegionGrid {
    region: Region,
}

impl RegionGrid {
    fn index(&self, x: usize, y: usize) -> usize {
        (y - self.region.y) * self.region.width + (x - self.region.x)
    }

    fn neighbour(&self, x: usize, y: usize, (dx, dy): (i64, i64)) -> Option<(usize, usize)> {
        let nx = x as i64 + dx;
        let ny = y as i64 + dy;
        if nx < 0 || ny < 0 {
            return None;
        }
        let (nx, ny) = (nx as usize, ny as usize);
        self.region.contains(nx, ny).then_some((nx, ny))
    }

    fn cells(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        let region = self.region;
        (region.y..region.y + region.height)
            .flat_map(move |y| (region.x..region.x + region.width).map(move |x| (x, y)))
    }
}

fn erode_wet(heightmap: &mut Raster<f32>, setup: &ErosionSetup, region: Region) -> ErosionStats {
    let grid = RegionGrid { region };
    let mut water = vec![0.0f32; region.area()];
    let mut sediment = vec![0.0f32; region.area()];
    let mut stats = ErosionStats::default();

    for _ in 0..setup.iterations {
        stats.iterations += 1;

        // Rain and dissolve
        for (x, y) in grid.cells() {
            let i = grid.index(x, y);
            water[i] += setup.rain;
            let height = heightmap.at(x, y);
            let dissolved = (setup.solubility * water[i]).min(height.max(0.0));
            heightmap.set(x, y, height - dissolved);
            sediment[i] += dissolved;
            stats.total_eroded += dissolved as f64;
        }

        // Flow to lower neighbours, proportional to the surface drop
        let mut water_delta = vec![0.0f32; region.area()];
        let mut sediment_delta = vec![0.0f32; region.area()];
        for (x, y) in grid.cells() {
            let i = grid.index(x, y);
            if water[i] <= 0.0 {
                continue;
            }
            let surface = heightmap.at(x, y) + water[i];

            let mut lower = [(0usize, 0.0f32); 4];
            let mut lower_count = 0;
            let mut drop_total = 0.0;
            let mut surface_total = surface;
            for offset in NEIGHBOURS {
                let Some((nx, ny)) = grid.neighbour(x, y, offset) else {
                    continue;
                };
                let j = grid.index(nx, ny);
                let neighbour_surface = heightmap.at(nx, ny) + water[j];
                if neighbour_surface < surface {
                    let drop = surface - neighbour_surface;
                    lower[lower_count] = (j, drop);
                    lower_count += 1;
                    drop_total += drop;
                    surface_total += neighbour_surface;
                }
            }
            if lower_count == 0 || drop_total <= 0.0 {
                continue;
            }

            let average = surface_total / (lower_count + 1) as f32;
            let moved = water[i].min(surface - average);
            if moved <= 0.0 {
                continue;
            }
            let moved_sediment = sediment[i] * moved / water[i];
            water_delta[i] -= moved;
            sediment_delta[i] -= moved_sediment;
            for &(j, drop) in &lower[..lower_count] {
                let share = drop / drop_total;
                water_delta[j] += moved * share;
                sediment_delta[j] += moved_sediment * share;
            }
        }

        // Evaporate and deposit what the remaining water cannot carry
        let mut total_water = 0.0f64;
        for (x, y) in grid.cells() {
            let i = grid.index(x, y);
            water[i] = ((water[i] + water_delta[i]) * (1.0 - setup.evaporation)).max(0.0);
            sediment[i] = (sediment[i] + sediment_delta[i]).max(0.0);
            total_water += water[i] as f64;

            let carried = setup.capacity * water[i];
            if sediment[i] > carried {
                let deposit = sediment[i] - carried;
                sediment[i] = carried;
                heightmap.set(x, y, heightmap.at(x, y) + deposit);
                stats.total_deposited += deposit as f64;
            }
        }

        if total_water < setup.break_threshold as f64 {
            debug!("Wet erosion water below break threshold after {} iterations", stats.iterations);
            stats.converged = true;
            break;
        }
    }

    // Whatever is still in suspension settles where it is
    for (x, y) in grid.cells() {
        let i = grid.index(x, y);
        if sediment[i] > 0.0 {
            heightmap.set(x, y, heightmap.at(x, y) + sediment[i]);
            stats.total_deposited += sediment[i] as f64;
        }
    }
    stats
}

/// A single water droplet of the `Wet2` variant
struct Droplet {
    x: f32,
    y: f32,
    dir_x: f32,
    dir_y: f32,
    velocity: f32,
    water: f32,
    sediment: f32,
}

/// Height and gradient at a fractional position, bilinear over the cell
fn height_and_gradient(heightmap: &Raster<f32>, x: f32, y: f32) -> (f32, f32, f32) {
    let x0 = (x.floor() as usize).min(heightmap.width() - 2);
    let y0 = (y.floor() as usize).min(heightmap.height() - 2);
    let fx = x - x0 as f32;
    let fy = y - y0 as f32;

    let h00 = heightmap.at(x0, y0);
    let h10 = heightmap.at(x0 + 1, y0);
    let h01 = heightmap.at(x0, y0 + 1);
    let h11 = heightmap.at(x0 + 1, y0 + 1);

    let grad_x = (h10 - h00) * (1.0 - fy) + (h11 - h01) * fy;
    let grad_y = (h01 - h00) * (1.0 - fx) + (h11 - h10) * fx;
    let height = (h00 * (1.0 - fx) + h10 * fx) * (1.0 - fy) + (h01 * (1.0 - fx) + h11 * fx) * fy;
    (height, grad_x, grad_y)
}

/// Add `amount` at a fractional position, split over the four cell corners
fn deposit_at(heightmap: &mut Raster<f32>, x: f32, y: f32, amount: f32) {
    let x0 = (x.floor() as usize).min(heightmap.width() - 2);
    let y0 = (y.floor() as usize).min(heightmap.height() - 2);
    let fx = x - x0 as f32;
    let fy = y - y0 as f32;

    let corners = [
        (x0, y0, (1.0 - fx) * (1.0 - fy)),
        (x0 + 1, y0, fx * (1.0 - fy)),
        (x0, y0 + 1, (1.0 - fx) * fy),
        (x0 + 1, y0 + 1, fx * fy),
    ];
    for (cx, cy, weight) in corners {
        if let Some(cell) = heightmap.get_mut(cx, cy) {
            *cell += amount * weight;
        }
    }
}

fn erode_droplets(heightmap: &mut Raster<f32>, setup: &ErosionSetup, region: Region) -> ErosionStats {
    let mut stats = ErosionStats::default();
    // Droplets need a full cell to interpolate over
    if region.width < 2 || region.height < 2 {
        return stats;
    }

    let mut rng = Pcg64::seed_from_u64(setup.seed);
    let min_x = region.x as f32;
    let min_y = region.y as f32;
    let max_x = (region.x + region.width - 1) as f32;
    let max_y = (region.y + region.height - 1) as f32;

    for _ in 0..setup.iterations {
        stats.iterations += 1;
        let mut droplet = Droplet {
            x: rng.gen_range(min_x..max_x),
            y: rng.gen_range(min_y..max_y),
            dir_x: 0.0,
            dir_y: 0.0,
            velocity: 1.0,
            water: 1.0,
            sediment: 0.0,
        };

        for _ in 0..setup.droplet_lifetime {
            let (old_x, old_y) = (droplet.x, droplet.y);
            let (old_height, grad_x, grad_y) = height_and_gradient(heightmap, old_x, old_y);

            droplet.dir_x = droplet.dir_x * setup.inertia - grad_x * (1.0 - setup.inertia);
            droplet.dir_y = droplet.dir_y * setup.inertia - grad_y * (1.0 - setup.inertia);
            let length = (droplet.dir_x * droplet.dir_x + droplet.dir_y * droplet.dir_y).sqrt();
            if length <= f32::EPSILON {
                // Flat ground or a pit: leave the sediment here
                deposit_at(heightmap, old_x, old_y, droplet.sediment);
                stats.total_deposited += droplet.sediment as f64;
                droplet.sediment = 0.0;
                break;
            }
            droplet.dir_x /= length;
            droplet.dir_y /= length;
            droplet.x += droplet.dir_x;
            droplet.y += droplet.dir_y;

            if droplet.x < min_x || droplet.y < min_y || droplet.x >= max_x || droplet.y >= max_y {
                break;
            }

            let (new_height, _, _) = height_and_gradient(heightmap, droplet.x, droplet.y);
            let delta = new_height - old_height;
            let capacity = (-delta).max(MIN_DROPLET_SLOPE) * droplet.velocity * droplet.water * setup.capacity;

            if droplet.sediment > capacity || delta > 0.0 {
                // Uphill: fill the step behind, otherwise drop the excess
                let amount = if delta > 0.0 {
                    delta.min(droplet.sediment)
                } else {
                    (droplet.sediment - capacity) * setup.deposition
                };
                droplet.sediment -= amount;
                deposit_at(heightmap, old_x, old_y, amount);
                stats.total_deposited += amount as f64;
            } else {
                let amount = ((capacity - droplet.sediment) * setup.erosion_rate).min(-delta);
                if amount > 0.0 {
                    droplet.sediment += amount;
                    deposit_at(heightmap, old_x, old_y, -amount);
                    stats.total_eroded += amount as f64;
                }
            }

            droplet.velocity = (droplet.velocity * droplet.velocity - delta * setup.gravity).max(0.0).sqrt();
            droplet.water *= 1.0 - setup.evaporation;
            if droplet.water < MIN_DROPLET_WATER {
                break;
            }
        }
    }
    stats
}

fn erode_thermal(heightmap: &mut Raster<f32>, setup: &ErosionSetup, region: Region) -> ErosionStats {
    let grid = RegionGrid { region };
    let mut stats = ErosionStats::default();

    for _ in 0..setup.iterations {
        stats.iterations += 1;
        let mut delta = vec![0.0f32; region.area()];
        let mut moved_total = 0.0f64;

        for (x, y) in grid.cells() {
            let height = heightmap.at(x, y);
            let mut steeper = [(0usize, 0.0f32); 4];
            let mut count = 0;
            let mut excess_total = 0.0;
            let mut max_drop = 0.0f32;

            for offset in NEIGHBOURS {
                let Some((nx, ny)) = grid.neighbour(x, y, offset) else {
                    continue;
                };
                let drop = height - heightmap.at(nx, ny);
                if drop > setup.talus {
                    steeper[count] = (grid.index(nx, ny), drop - setup.talus);
                    count += 1;
                    excess_total += drop - setup.talus;
                    max_drop = max_drop.max(drop);
                }
            }
            if count == 0 {
                continue;
            }

            let moved = setup.thermal_rate * (max_drop - setup.talus) / 2.0;
            delta[grid.index(x, y)] -= moved;
            for &(j, excess) in &steeper[..count] {
                delta[j] += moved * excess / excess_total;
            }
            moved_total += moved as f64;
        }

        if moved_total <= f64::EPSILON {
            stats.converged = true;
            break;
        }
        for (x, y) in grid.cells() {
            let i = grid.index(x, y);
            heightmap.set(x, y, heightmap.at(x, y) + delta[i]);
        }
        stats.total_eroded += moved_total;
        stats.total_deposited += moved_total;
    }
    stats
}
