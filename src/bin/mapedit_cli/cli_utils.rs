use mapedit::errors::{MapEditError, MapEditResult};
use mapedit::terrain::Region;

/// Generic parser for delimited strings that return fixed-size arrays
pub fn parse_delimited<T, const N: usize>(
    input: &str,
    delimiter: char,
    type_name: &str,
    parser: impl Fn(&str) -> Result<T, std::num::ParseFloatError>,
) -> MapEditResult<[T; N]>
where
    T: Copy + Default,
{
    let parts: Vec<&str> = input.split(delimiter).collect();
    if parts.len() != N {
        return Err(MapEditError::InvalidMapData {
            reason: format!(
                "Invalid {type_name} format '{input}'. Expected {N} {delimiter}-separated values"
            ),
        });
    }

    let mut result = [T::default(); N];
    for (i, part) in parts.iter().enumerate() {
        result[i] = parser(part.trim()).map_err(|_| MapEditError::InvalidMapData {
            reason: format!("Invalid {type_name} value: '{part}'"),
        })?;
    }

    Ok(result)
}

/// Parse map size "WIDTHxHEIGHT" in engine units
pub fn parse_size(size_str: &str) -> MapEditResult<(usize, usize)> {
    let [width, height] = parse_delimited::<f32, 2>(size_str, 'x', "size", |s| s.parse())?;
    if width.fract() != 0.0 || height.fract() != 0.0 {
        return Err(MapEditError::InvalidMapData {
            reason: format!("Map size '{size_str}' must be whole engine units"),
        });
    }
    let (width, height) = (width as usize, height as usize);

    if !(1..=64).contains(&width) || !(1..=64).contains(&height) {
        return Err(MapEditError::InvalidMapData {
            reason: "Width and height must be between 1 and 64".to_string(),
        });
    }

    Ok((width, height))
}

/// Parse height bounds "MIN,MAX" in world elevation
pub fn parse_height_bounds(bounds_str: &str) -> MapEditResult<(f32, f32)> {
    let [min, max] = parse_delimited::<f32, 2>(bounds_str, ',', "height bounds", |s| s.parse())?;

    if min >= max {
        return Err(MapEditError::InvalidMapData {
            reason: "Minimum height must be below maximum height".to_string(),
        });
    }

    Ok((min, max))
}

/// Parse a heightmap region "X,Y,WIDTH,HEIGHT"
pub fn parse_region(region_str: &str) -> MapEditResult<Region> {
    let values = parse_delimited::<f32, 4>(region_str, ',', "region", |s| s.parse())?;
    if values.iter().any(|v| *v < 0.0 || v.fract() != 0.0) {
        return Err(MapEditError::InvalidMapData {
            reason: format!("Region '{region_str}' needs non-negative whole numbers"),
        });
    }
    let [x, y, width, height] = values.map(|v| v as usize);
    if width == 0 || height == 0 {
        return Err(MapEditError::InvalidMapData {
            reason: "Region width and height must be greater than 0".to_string(),
        });
    }
    Ok(Region::new(x, y, width, height))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_size() {
        assert_eq!(parse_size("8x8").unwrap(), (8, 8));
        assert_eq!(parse_size("4x12").unwrap(), (4, 12));
        assert_eq!(parse_size("1x1").unwrap(), (1, 1));

        assert!(parse_size("8").is_err());
        assert!(parse_size("0x8").is_err());
        assert!(parse_size("65x8").is_err());
        assert!(parse_size("2.5x8").is_err());
    }

    #[test]
    fn test_parse_height_bounds() {
        assert_eq!(parse_height_bounds("-50,300").unwrap(), (-50.0, 300.0));
        assert_eq!(parse_height_bounds("0, 120.5").unwrap(), (0.0, 120.5));

        assert!(parse_height_bounds("10").is_err());
        assert!(parse_height_bounds("200,100").is_err());
        assert!(parse_height_bounds("abc,def").is_err());
    }

    #[test]
    fn test_parse_region() {
        assert_eq!(parse_region("0,0,64,32").unwrap(), Region::new(0, 0, 64, 32));

        assert!(parse_region("0,0,64").is_err());
        assert!(parse_region("-1,0,4,4").is_err());
        assert!(parse_region("0,0,0,4").is_err());
    }
}
