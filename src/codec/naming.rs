//! File name conventions for the per-layer "all maps" bundle.

use std::path::{Path, PathBuf};

/// Layers written as separate files of a bundle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LayerFile {
    Height,
    Metal,
    Feature,
    Type,
    Vegetation,
    Texture,
}

impl LayerFile {
    pub const ALL: [LayerFile; 6] = [
        LayerFile::Height,
        LayerFile::Metal,
        LayerFile::Feature,
        LayerFile::Type,
        LayerFile::Vegetation,
        LayerFile::Texture,
    ];

    pub fn suffix(self) -> &'static str {
        match self {
            LayerFile::Height => "_Height.png",
            LayerFile::Metal => "_Metal.bmp",
            LayerFile::Feature => "_Feature.fmf",
            LayerFile::Type => "_Type.bmp",
            LayerFile::Vegetation => "_Vegetation.bmp",
            LayerFile::Texture => "_Texture.bmp",
        }
    }

    /// `<base><suffix>` next to `base`
    pub fn path_for(self, base: &Path) -> PathBuf {
        let mut name = base
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(self.suffix());
        base.with_file_name(name)
    }
}

/// Strip a recognised layer suffix, or a plain extension, from a file path
pub fn trim_layer_suffix(path: &Path) -> PathBuf {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return path.to_path_buf();
    };
    for layer in LayerFile::ALL {
        if let Some(base) = name.strip_suffix(layer.suffix()) {
            return path.with_file_name(base);
        }
    }
    path.with_extension("")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trim_layer_suffix() {
        assert_eq!(
            trim_layer_suffix(Path::new("maps/Comet_Height.png")),
            PathBuf::from("maps/Comet")
        );
        assert_eq!(
            trim_layer_suffix(Path::new("Comet_Vegetation.bmp")),
            PathBuf::from("Comet")
        );
        assert_eq!(trim_layer_suffix(Path::new("maps/Comet.smf")), PathBuf::from("maps/Comet"));
    }

    #[test]
    fn test_path_for_appends_suffix() {
        let base = Path::new("out/Comet");
        assert_eq!(
            LayerFile::Metal.path_for(base),
            PathBuf::from("out/Comet_Metal.bmp")
        );
        // Dots in the base name are preserved
        assert_eq!(
            LayerFile::Feature.path_for(Path::new("Comet.v2")),
            PathBuf::from("Comet.v2_Feature.fmf")
        );
    }
}
