//! The `.smf` map header file.
//!
//! The header carries absolute offsets to each section. They are written as
//! placeholders and patched by [`FixupWriter`] once the sections are laid
//! out. Section order on disk: heightmap, typemap, tile index, minimap,
//! metalmap, features, vegetation.

use crate::codec::binary::{
    FixupWriter, expect_i32, expect_magic, non_negative, read_cstring, reserve_hint, write_cstring,
};
use crate::codec::compressor::COMPRESSED_MINIMAP_SIZE;
use crate::codec::features::{read_feature_table, write_feature_table};
use crate::codec::raw::{height_to_sample, sample_to_height};
use crate::codec::tiles::TileIndex;
use crate::errors::{MapEditError, MapEditResult};
use crate::features::FeatureStore;
use crate::raster::Raster;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Read, Seek, SeekFrom, Write};
use tracing::{debug, warn};

pub const SMF_MAGIC: &[u8; 16] = b"spring map file\0";
pub const SMF_VERSION: i32 = 1;
pub const SMF_SQUARE_SIZE: i32 = 8;
pub const SMF_TEXELS_PER_SQUARE: i32 = 8;
pub const SMF_TILE_SIZE: i32 = 32;

/// Longest map side in heightmap squares (64 engine units)
pub const MAX_MAP_SQUARES: usize = 64 * 64;

/// Elevation added to both bounds of maps without water
pub const NO_WATER_OFFSET: f32 = 500.0;

pub const EXTRA_HEADER_VEGETATION: i32 = 1;
const VEGETATION_HEADER_SIZE: i32 = 12;

/// Bytes before the pixel data of a DDS file
pub const DDS_HEADER_SIZE: u64 = 128;

/// World elevation mapped onto normalized heights
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeightBounds {
    pub min_height: f32,
    pub max_height: f32,
    pub has_water: bool,
}

impl Default for HeightBounds {
    fn default() -> Self {
        Self {
            min_height: -50.0,
            max_height: 300.0,
            has_water: true,
        }
    }
}

impl HeightBounds {
    /// Bounds as stored in the header
    pub fn to_file(self) -> (f32, f32) {
        if self.has_water {
            (self.min_height, self.max_height)
        } else {
            (
                self.min_height + NO_WATER_OFFSET,
                self.max_height + NO_WATER_OFFSET,
            )
        }
    }

    /// Recover editor bounds from stored header values
    pub fn from_file(min_height: f32, max_height: f32) -> Self {
        let has_water = min_height < 0.0;
        if !has_water && min_height >= NO_WATER_OFFSET {
            Self {
                min_height: min_height - NO_WATER_OFFSET,
                max_height: max_height - NO_WATER_OFFSET,
                has_water,
            }
        } else {
            Self {
                min_height,
                max_height,
                has_water,
            }
        }
    }

    pub fn range(self) -> f32 {
        self.max_height - self.min_height
    }
}

/// Borrowed layers to serialize
pub struct SmfSource<'a> {
    pub map_id: i32,
    pub bounds: HeightBounds,
    pub heightmap: &'a Raster<f32>,
    pub typemap: &'a Raster<u8>,
    pub metalmap: &'a Raster<u8>,
    pub vegetation: &'a Raster<u8>,
    /// Tile file name as referenced from the header, without directories
    pub tile_file_name: &'a str,
    pub tile_index: &'a TileIndex,
    pub minimap: &'a [u8],
    pub features: &'a FeatureStore,
}

/// Everything decoded from an `.smf` file
#[derive(Debug)]
pub struct SmfMap {
    pub map_id: i32,
    /// Map extent in heightmap squares
    pub map_x: usize,
    pub map_y: usize,
    pub bounds: HeightBounds,
    pub heightmap: Raster<f32>,
    pub typemap: Raster<u8>,
    pub metalmap: Raster<u8>,
    pub vegetation: Option<Raster<u8>>,
    /// Referenced tile files with their tile counts, in ID order
    pub tile_files: Vec<(String, usize)>,
    pub tile_index: TileIndex,
    pub minimap: Vec<u8>,
    pub features: FeatureStore,
}

fn check_dimensions<T: Copy>(
    name: &str,
    raster: &Raster<T>,
    expected: (usize, usize),
) -> MapEditResult<()> {
    if raster.dimensions() != expected {
        return Err(MapEditError::DimensionMismatch {
            reason: format!(
                "{name} is {}x{}, the map needs {}x{}",
                raster.width(),
                raster.height(),
                expected.0,
                expected.1
            ),
        });
    }
    Ok(())
}

fn dimension_to_i32(value: usize) -> MapEditResult<i32> {
    i32::try_from(value).map_err(|_| MapEditError::invalid(format!("Map dimension {value} too large")))
}

/// Serialize an `.smf` header file
pub fn write_smf<W: Write + Seek>(writer: W, source: &SmfSource) -> MapEditResult<()> {
    let map_x = source.heightmap.width().saturating_sub(1);
    let map_y = source.heightmap.height().saturating_sub(1);
    if map_x == 0 || map_y == 0 || map_x % 4 != 0 || map_y % 4 != 0 {
        return Err(MapEditError::DimensionMismatch {
            reason: format!("Heightmap of {map_x}x{map_y} squares cannot be tiled"),
        });
    }
    check_dimensions("Typemap", source.typemap, (map_x / 2, map_y / 2))?;
    check_dimensions("Metalmap", source.metalmap, (map_x / 2, map_y / 2))?;
    check_dimensions("Vegetation map", source.vegetation, (map_x / 4, map_y / 4))?;
    check_dimensions("Tile index", &source.tile_index.ids, (map_x / 4, map_y / 4))?;
    if source.minimap.len() != COMPRESSED_MINIMAP_SIZE {
        return Err(MapEditError::invalid(format!(
            "Minimap holds {} bytes, expected {COMPRESSED_MINIMAP_SIZE}",
            source.minimap.len()
        )));
    }

    let mut out = FixupWriter::new(writer)?;

    out.write_all(SMF_MAGIC)?;
    out.write_i32::<LittleEndian>(SMF_VERSION)?;
    out.write_i32::<LittleEndian>(source.map_id)?;
    out.write_i32::<LittleEndian>(dimension_to_i32(map_x)?)?;
    out.write_i32::<LittleEndian>(dimension_to_i32(map_y)?)?;
    out.write_i32::<LittleEndian>(SMF_SQUARE_SIZE)?;
    out.write_i32::<LittleEndian>(SMF_TEXELS_PER_SQUARE)?;
    out.write_i32::<LittleEndian>(SMF_TILE_SIZE)?;
    let (min_height, max_height) = source.bounds.to_file();
    out.write_f32::<LittleEndian>(min_height)?;
    out.write_f32::<LittleEndian>(max_height)?;

    let heightmap_ptr = out.placeholder("heightmapPtr")?;
    let typemap_ptr = out.placeholder("typeMapPtr")?;
    let tiles_ptr = out.placeholder("tilesPtr")?;
    let minimap_ptr = out.placeholder("minimapPtr")?;
    let metalmap_ptr = out.placeholder("metalmapPtr")?;
    let feature_ptr = out.placeholder("featurePtr")?;

    out.write_i32::<LittleEndian>(1)?;
    out.write_i32::<LittleEndian>(VEGETATION_HEADER_SIZE)?;
    out.write_i32::<LittleEndian>(EXTRA_HEADER_VEGETATION)?;
    let vegetation_ptr = out.placeholder("vegetationPtr")?;

    out.resolve_here(heightmap_ptr)?;
    for &value in source.heightmap.data() {
        out.write_u16::<LittleEndian>(height_to_sample(value))?;
    }

    out.resolve_here(typemap_ptr)?;
    out.write_all(source.typemap.data())?;

    out.resolve_here(tiles_ptr)?;
    let tile_count = dimension_to_i32(source.tile_index.tile_count)?;
    out.write_i32::<LittleEndian>(1)?;
    out.write_i32::<LittleEndian>(tile_count)?;
    out.write_i32::<LittleEndian>(tile_count)?;
    write_cstring(&mut out, source.tile_file_name)?;
    for &id in source.tile_index.ids.data() {
        out.write_i32::<LittleEndian>(id as i32)?;
    }

    out.resolve_here(minimap_ptr)?;
    out.write_all(source.minimap)?;

    out.resolve_here(metalmap_ptr)?;
    out.write_all(source.metalmap.data())?;

    out.resolve_here(feature_ptr)?;
    write_feature_table(&mut out, source.features)?;

    out.resolve_here(vegetation_ptr)?;
    out.write_all(source.vegetation.data())?;

    let written = out.position();
    out.finish()?;
    debug!("Wrote {written} bytes of map header file");
    Ok(())
}

fn read_at<R: Read + Seek>(reader: &mut R, offset: i32, what: &str) -> MapEditResult<()> {
    let offset = non_negative(offset, what)?;
    reader.seek(SeekFrom::Start(offset as u64))?;
    Ok(())
}

fn read_bytes<R: Read>(reader: &mut R, width: usize, height: usize) -> MapEditResult<Raster<u8>> {
    let mut data = vec![0u8; width * height];
    reader.read_exact(&mut data)?;
    Raster::from_vec(width, height, data)
}

/// Decode an `.smf` header file
pub fn read_smf<R: Read + Seek>(reader: &mut R) -> MapEditResult<SmfMap> {
    expect_magic(reader, SMF_MAGIC, "map header file")?;
    expect_i32(reader.read_i32::<LittleEndian>()?, SMF_VERSION, "map file version")?;
    let map_id = reader.read_i32::<LittleEndian>()?;
    let map_x = non_negative(reader.read_i32::<LittleEndian>()?, "map width")?;
    let map_y = non_negative(reader.read_i32::<LittleEndian>()?, "map height")?;
    expect_i32(reader.read_i32::<LittleEndian>()?, SMF_SQUARE_SIZE, "square size")?;
    expect_i32(
        reader.read_i32::<LittleEndian>()?,
        SMF_TEXELS_PER_SQUARE,
        "texels per square",
    )?;
    expect_i32(reader.read_i32::<LittleEndian>()?, SMF_TILE_SIZE, "tile size")?;
    if map_x == 0 || map_y == 0 || map_x % 4 != 0 || map_y % 4 != 0 {
        return Err(MapEditError::format(format!(
            "Map size {map_x}x{map_y} is not a positive multiple of 4"
        )));
    }
    if map_x > MAX_MAP_SQUARES || map_y > MAX_MAP_SQUARES {
        return Err(MapEditError::format(format!(
            "Map size {map_x}x{map_y} squares exceeds {MAX_MAP_SQUARES}x{MAX_MAP_SQUARES}"
        )));
    }

    let min_height = reader.read_f32::<LittleEndian>()?;
    let max_height = reader.read_f32::<LittleEndian>()?;
    let bounds = HeightBounds::from_file(min_height, max_height);

    let heightmap_ptr = reader.read_i32::<LittleEndian>()?;
    let typemap_ptr = reader.read_i32::<LittleEndian>()?;
    let tiles_ptr = reader.read_i32::<LittleEndian>()?;
    let minimap_ptr = reader.read_i32::<LittleEndian>()?;
    let metalmap_ptr = reader.read_i32::<LittleEndian>()?;
    let feature_ptr = reader.read_i32::<LittleEndian>()?;

    let num_extra_headers = non_negative(reader.read_i32::<LittleEndian>()?, "extra header count")?;
    let mut vegetation_ptr = None;
    for _ in 0..num_extra_headers {
        let size = reader.read_i32::<LittleEndian>()?;
        let kind = reader.read_i32::<LittleEndian>()?;
        if size < 8 {
            return Err(MapEditError::format(format!("Extra header of size {size}")));
        }
        match kind {
            EXTRA_HEADER_VEGETATION if size >= VEGETATION_HEADER_SIZE => {
                vegetation_ptr = Some(reader.read_i32::<LittleEndian>()?);
                reader.seek(SeekFrom::Current((size - VEGETATION_HEADER_SIZE) as i64))?;
            }
            _ => {
                debug!("Skipping extra header of type {kind} ({size} bytes)");
                reader.seek(SeekFrom::Current((size - 8) as i64))?;
            }
        }
    }

    read_at(reader, heightmap_ptr, "heightmap offset")?;
    let mut samples = vec![0u16; (map_x + 1) * (map_y + 1)];
    reader.read_u16_into::<LittleEndian>(&mut samples)?;
    let heightmap = Raster::from_vec(
        map_x + 1,
        map_y + 1,
        samples.into_iter().map(sample_to_height).collect(),
    )?;

    read_at(reader, typemap_ptr, "typemap offset")?;
    let typemap = read_bytes(reader, map_x / 2, map_y / 2)?;

    read_at(reader, tiles_ptr, "tile section offset")?;
    let num_tile_files = non_negative(reader.read_i32::<LittleEndian>()?, "tile file count")?;
    let total_tiles = non_negative(reader.read_i32::<LittleEndian>()?, "tile count")?;
    let mut tile_files = Vec::with_capacity(reserve_hint(num_tile_files));
    let mut listed = 0usize;
    for _ in 0..num_tile_files {
        let count = non_negative(reader.read_i32::<LittleEndian>()?, "tiles in file")?;
        let name = read_cstring(reader)?;
        listed = listed
            .checked_add(count)
            .ok_or_else(|| MapEditError::format("Tile file counts overflow"))?;
        tile_files.push((name, count));
    }
    if listed != total_tiles {
        warn!("Tile files list {listed} tiles, header claims {total_tiles}");
    }
    let (columns, rows) = (map_x / 4, map_y / 4);
    let mut ids = Vec::with_capacity(columns * rows);
    for _ in 0..columns * rows {
        let id = reader.read_i32::<LittleEndian>()?;
        let id = u32::try_from(id)
            .map_err(|_| MapEditError::format(format!("Negative tile id {id}")))?;
        ids.push(id);
    }
    let tile_index = TileIndex {
        ids: Raster::from_vec(columns, rows, ids)?,
        tile_count: listed,
    };

    read_at(reader, minimap_ptr, "minimap offset")?;
    let mut minimap = vec![0u8; COMPRESSED_MINIMAP_SIZE];
    reader.read_exact(&mut minimap)?;

    read_at(reader, metalmap_ptr, "metalmap offset")?;
    let metalmap = read_bytes(reader, map_x / 2, map_y / 2)?;

    read_at(reader, feature_ptr, "feature offset")?;
    let mut features = FeatureStore::new(map_x, map_y);
    read_feature_table(reader, &mut features)?;

    let vegetation = match vegetation_ptr {
        Some(ptr) => {
            read_at(reader, ptr, "vegetation offset")?;
            let raw = read_bytes(reader, map_x / 4, map_y / 4)?;
            Some(raw.map(|v| u8::from(v != 0)))
        }
        None => None,
    };

    Ok(SmfMap {
        map_id,
        map_x,
        map_y,
        bounds,
        heightmap,
        typemap,
        metalmap,
        vegetation,
        tile_files,
        tile_index,
        minimap,
        features,
    })
}

/// Read a replacement minimap from a DDS file, skipping its header
pub fn read_dds_minimap<R: Read>(reader: &mut R) -> MapEditResult<Vec<u8>> {
    io::copy(&mut reader.by_ref().take(DDS_HEADER_SIZE), &mut io::sink())?;
    let mut minimap = vec![0u8; COMPRESSED_MINIMAP_SIZE];
    reader.read_exact(&mut minimap).map_err(|e| match e.kind() {
        io::ErrorKind::UnexpectedEof => MapEditError::format(format!(
            "Minimap image holds fewer than {COMPRESSED_MINIMAP_SIZE} compressed bytes"
        )),
        _ => MapEditError::Io(e),
    })?;
    Ok(minimap)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    struct Layers {
        heightmap: Raster<f32>,
        typemap: Raster<u8>,
        metalmap: Raster<u8>,
        vegetation: Raster<u8>,
        tile_index: TileIndex,
        minimap: Vec<u8>,
        features: FeatureStore,
    }

    /// A one-unit (64x64 squares) map
    fn layers() -> Layers {
        let mut heightmap = Raster::new(65, 65, 0.0f32);
        heightmap.set(3, 0, 1.0);
        heightmap.set(0, 64, 0.5);
        let mut typemap = Raster::new(32, 32, 0u8);
        typemap.set(31, 31, 7);
        let mut metalmap = Raster::new(32, 32, 0u8);
        metalmap.set(1, 2, 200);
        let mut vegetation = Raster::new(16, 16, 0u8);
        vegetation.set(5, 5, 1);
        let mut ids = Raster::new(16, 16, 0u32);
        ids.set(15, 0, 1);
        let mut features = FeatureStore::new(64, 64);
        let tree = features.types_mut().register("tree");
        features.insert(10.0, 4.0, 20.0, 180.0, tree);

        Layers {
            heightmap,
            typemap,
            metalmap,
            vegetation,
            tile_index: TileIndex { ids, tile_count: 2 },
            minimap: vec![0xAB; COMPRESSED_MINIMAP_SIZE],
            features,
        }
    }

    fn encode(layers: &Layers, bounds: HeightBounds) -> Vec<u8> {
        let source = SmfSource {
            map_id: 42,
            bounds,
            heightmap: &layers.heightmap,
            typemap: &layers.typemap,
            metalmap: &layers.metalmap,
            vegetation: &layers.vegetation,
            tile_file_name: "Comet.smt",
            tile_index: &layers.tile_index,
            minimap: &layers.minimap,
            features: &layers.features,
        };
        let mut cursor = Cursor::new(Vec::new());
        write_smf(&mut cursor, &source).unwrap();
        cursor.into_inner()
    }

    #[test]
    fn test_smf_round_trip() {
        let layers = layers();
        let bytes = encode(&layers, HeightBounds::default());
        let map = read_smf(&mut Cursor::new(bytes)).unwrap();

        assert_eq!(map.map_id, 42);
        assert_eq!((map.map_x, map.map_y), (64, 64));
        assert_eq!(map.bounds, HeightBounds::default());
        assert_eq!(map.heightmap, layers.heightmap);
        assert_eq!(map.typemap, layers.typemap);
        assert_eq!(map.metalmap, layers.metalmap);
        assert_eq!(map.vegetation.as_ref(), Some(&layers.vegetation));
        assert_eq!(map.tile_files, vec![("Comet.smt".to_string(), 2)]);
        assert_eq!(map.tile_index, layers.tile_index);
        assert_eq!(map.minimap, layers.minimap);
        assert_eq!(map.features.len(), 1);
        let feature = map.features.features()[0].clone();
        assert_eq!((feature.x, feature.y, feature.z), (10.0, 4.0, 20.0));
    }

    #[test]
    fn test_header_layout() {
        let bytes = encode(&layers(), HeightBounds::default());
        let mut cursor = Cursor::new(&bytes);
        cursor.set_position(16);
        let fields: Vec<i32> = (0..6).map(|_| cursor.read_i32::<LittleEndian>().unwrap()).collect();
        assert_eq!(fields, vec![1, 42, 64, 64, 8, 8]);
        assert_eq!(cursor.read_i32::<LittleEndian>().unwrap(), 32);

        cursor.set_position(52);
        let heightmap_ptr = cursor.read_i32::<LittleEndian>().unwrap();
        // Fixed header (80 bytes) plus one 12-byte vegetation extra header
        assert_eq!(heightmap_ptr, 92);
        let typemap_ptr = cursor.read_i32::<LittleEndian>().unwrap();
        assert_eq!(typemap_ptr, 92 + 65 * 65 * 2);
    }

    #[test]
    fn test_no_water_offset() {
        let bounds = HeightBounds {
            min_height: 10.0,
            max_height: 200.0,
            has_water: false,
        };
        assert_eq!(bounds.to_file(), (510.0, 700.0));
        assert_eq!(HeightBounds::from_file(510.0, 700.0), bounds);

        let bytes = encode(&layers(), bounds);
        let map = read_smf(&mut Cursor::new(bytes)).unwrap();
        assert_eq!(map.bounds, bounds);
    }

    #[test]
    fn test_rejects_bad_constants() {
        let mut bytes = encode(&layers(), HeightBounds::default());
        bytes[16] = 2; // version
        assert!(matches!(
            read_smf(&mut Cursor::new(bytes.clone())),
            Err(MapEditError::Format { .. })
        ));

        bytes[16] = 1;
        bytes[40] = 64; // tile size
        assert!(matches!(
            read_smf(&mut Cursor::new(bytes)),
            Err(MapEditError::Format { .. })
        ));
    }

    #[test]
    fn test_rejects_oversized_map_size() {
        let mut bytes = encode(&layers(), HeightBounds::default());
        bytes[24..28].copy_from_slice(&0x7FFF_FFFCi32.to_le_bytes());
        bytes[28..32].copy_from_slice(&0x7FFF_FFFCi32.to_le_bytes());
        assert!(matches!(
            read_smf(&mut Cursor::new(bytes.clone())),
            Err(MapEditError::Format { .. })
        ));

        // One step past 64 units on a single axis
        bytes[24..28].copy_from_slice(&64i32.to_le_bytes());
        bytes[28..32].copy_from_slice(&((MAX_MAP_SQUARES + 4) as i32).to_le_bytes());
        assert!(matches!(
            read_smf(&mut Cursor::new(bytes)),
            Err(MapEditError::Format { .. })
        ));
    }

    #[test]
    fn test_unknown_extra_headers_are_skipped() {
        let bytes = encode(&layers(), HeightBounds::default());

        // Rebuild the header with an extra 16-byte unknown header before the
        // vegetation one, shifting every section by 16 bytes.
        let mut patched = bytes[..76].to_vec();
        for ptr in 0..6 {
            let at = 52 + ptr * 4;
            let value = i32::from_le_bytes(patched[at..at + 4].try_into().unwrap()) + 16;
            patched[at..at + 4].copy_from_slice(&value.to_le_bytes());
        }
        patched.extend_from_slice(&2i32.to_le_bytes());
        patched.extend_from_slice(&16i32.to_le_bytes());
        patched.extend_from_slice(&99i32.to_le_bytes());
        patched.extend_from_slice(&[0u8; 8]);
        patched.extend_from_slice(&bytes[80..88]);
        let veg_ptr = i32::from_le_bytes(bytes[88..92].try_into().unwrap()) + 16;
        patched.extend_from_slice(&veg_ptr.to_le_bytes());
        patched.extend_from_slice(&bytes[92..]);

        let map = read_smf(&mut Cursor::new(patched)).unwrap();
        assert_eq!(map.vegetation.unwrap().at(5, 5), 1);
        assert_eq!(map.metalmap.at(1, 2), 200);
    }

    #[test]
    fn test_write_rejects_stale_layer_dimensions() {
        let mut layers = layers();
        layers.metalmap = Raster::new(16, 16, 0);
        let source = SmfSource {
            map_id: 1,
            bounds: HeightBounds::default(),
            heightmap: &layers.heightmap,
            typemap: &layers.typemap,
            metalmap: &layers.metalmap,
            vegetation: &layers.vegetation,
            tile_file_name: "x.smt",
            tile_index: &layers.tile_index,
            minimap: &layers.minimap,
            features: &layers.features,
        };
        let result = write_smf(Cursor::new(Vec::new()), &source);
        assert!(matches!(result, Err(MapEditError::DimensionMismatch { .. })));
    }

    #[test]
    fn test_dds_minimap_skips_header() {
        let mut dds = vec![0u8; DDS_HEADER_SIZE as usize];
        dds.extend(std::iter::repeat(7u8).take(COMPRESSED_MINIMAP_SIZE));
        let minimap = read_dds_minimap(&mut Cursor::new(dds)).unwrap();
        assert!(minimap.iter().all(|&b| b == 7));

        let short = vec![0u8; 200];
        assert!(matches!(
            read_dds_minimap(&mut Cursor::new(short)),
            Err(MapEditError::Format { .. })
        ));
    }
}
