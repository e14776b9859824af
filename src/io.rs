use image::codecs::bmp::BmpEncoder;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::codecs::tga::TgaEncoder;
use image::codecs::tiff::TiffEncoder;
use image::{DynamicImage, ImageEncoder, ImageError, RgbaImage};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IoError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("image error: {0}")]
    Image(#[from] ImageError),
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),
}

/// Output formats the flattened canvas can be written as.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum SaveFormat {
    #[default]
    Png,
    Jpeg,
    Bmp,
    Tga,
    Tiff,
}

impl SaveFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            SaveFormat::Png => "png",
            SaveFormat::Jpeg => "jpg",
            SaveFormat::Bmp => "bmp",
            SaveFormat::Tga => "tga",
            SaveFormat::Tiff => "tiff",
        }
    }

    pub fn all() -> &'static [SaveFormat] {
        &[
            SaveFormat::Png,
            SaveFormat::Jpeg,
            SaveFormat::Bmp,
            SaveFormat::Tga,
            SaveFormat::Tiff,
        ]
    }

    /// Parse a format name or file extension (case-insensitive).
    pub fn from_name(name: &str) -> Option<SaveFormat> {
        match name.trim().trim_start_matches('.').to_ascii_lowercase().as_str() {
            "png" => Some(SaveFormat::Png),
            "jpg" | "jpeg" => Some(SaveFormat::Jpeg),
            "bmp" => Some(SaveFormat::Bmp),
            "tga" => Some(SaveFormat::Tga),
            "tif" | "tiff" => Some(SaveFormat::Tiff),
            _ => None,
        }
    }

    pub fn from_path(path: &Path) -> Option<SaveFormat> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(SaveFormat::from_name)
    }
}

/// Decode any supported image file, keeping its original colour type.
pub fn open_dynamic(path: &Path) -> Result<DynamicImage, IoError> {
    Ok(image::open(path)?)
}

/// Decode any supported image file into RGBA.
pub fn load_image(path: &Path) -> Result<RgbaImage, IoError> {
    Ok(open_dynamic(path)?.to_rgba8())
}

/// Encode and write an image to a file.
/// `quality` only affects JPEG (1–100).
pub fn encode_and_write(image: &RgbaImage, path: &Path, format: SaveFormat, quality: u8) -> Result<(), IoError> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);

    match format {
        SaveFormat::Png => {
            PngEncoder::new(&mut writer).write_image(
                image.as_raw(),
                image.width(),
                image.height(),
                image::ColorType::Rgba8,
            )?;
        }
        SaveFormat::Jpeg => {
            // JPEG has no alpha channel.
            let rgb_image = DynamicImage::ImageRgba8(image.clone()).to_rgb8();
            let mut encoder = JpegEncoder::new_with_quality(&mut writer, quality.clamp(1, 100));
            encoder.encode(
                rgb_image.as_raw(),
                rgb_image.width(),
                rgb_image.height(),
                image::ColorType::Rgb8,
            )?;
        }
        SaveFormat::Bmp => {
            let mut encoder = BmpEncoder::new(&mut writer);
            encoder.encode(
                image.as_raw(),
                image.width(),
                image.height(),
                image::ColorType::Rgba8,
            )?;
        }
        SaveFormat::Tga => {
            TgaEncoder::new(&mut writer).encode(
                image.as_raw(),
                image.width(),
                image.height(),
                image::ColorType::Rgba8,
            )?;
        }
        SaveFormat::Tiff => {
            TiffEncoder::new(&mut writer).encode(
                image.as_raw(),
                image.width(),
                image.height(),
                image::ColorType::Rgba8,
            )?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn temp_path(ext: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("layerfe_io_{}.{}", uuid::Uuid::new_v4(), ext))
    }

    #[test]
    fn format_from_name_and_path() {
        assert_eq!(SaveFormat::from_name("JPEG"), Some(SaveFormat::Jpeg));
        assert_eq!(SaveFormat::from_name(".tif"), Some(SaveFormat::Tiff));
        assert_eq!(SaveFormat::from_name("webp"), None);
        assert_eq!(SaveFormat::from_path(Path::new("out/a.BMP")), Some(SaveFormat::Bmp));
        assert_eq!(SaveFormat::from_path(Path::new("noext")), None);
        for f in SaveFormat::all() {
            assert_eq!(SaveFormat::from_name(f.extension()), Some(*f));
        }
    }

    #[test]
    fn png_preserves_pixels() {
        let img = RgbaImage::from_fn(5, 3, |x, y| Rgba([x as u8 * 40, y as u8 * 80, 7, 128 + x as u8]));
        let path = temp_path("png");
        encode_and_write(&img, &path, SaveFormat::Png, 90).unwrap();
        let back = load_image(&path).unwrap();
        let _ = std::fs::remove_file(&path);
        assert_eq!(back, img);
    }

    #[test]
    fn jpeg_drops_alpha_and_keeps_size() {
        let img = RgbaImage::from_pixel(16, 8, Rgba([200, 10, 10, 40]));
        let path = temp_path("jpg");
        encode_and_write(&img, &path, SaveFormat::Jpeg, 95).unwrap();
        let back = load_image(&path).unwrap();
        let _ = std::fs::remove_file(&path);
        assert_eq!(back.dimensions(), (16, 8));
        assert!(back.pixels().all(|p| p[3] == 255));
    }

    #[test]
    fn missing_file_is_an_error() {
        let err = load_image(&temp_path("png")).unwrap_err();
        assert!(matches!(err, IoError::Image(_) | IoError::Io(_)));
    }
}
