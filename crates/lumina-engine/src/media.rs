use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use image::{DynamicImage, ImageFormat};
use tracing::{debug, error, warn};

use crate::wire::Part;

pub fn load_reference_parts(paths: &[PathBuf]) -> Vec<Part> {
    let mut parts = Vec::new();
    for path in paths {
        if !path.exists() {
            warn!("Reference image not found: {}", path.display());
            continue;
        }
        match reference_part(path) {
            Ok(part) => parts.push(part),
            Err(err) => error!("Failed to load image {}: {err:#}", path.display()),
        }
    }
    parts
}

fn reference_part(path: &Path) -> Result<Part> {
    let bytes = fs::read(path).with_context(|| format!("failed reading {}", path.display()))?;
    let format = image::guess_format(&bytes).context("unrecognized image format")?;
    image::load_from_memory_with_format(&bytes, format).context("image decode failed")?;
    debug!(path = %path.display(), mime = format.to_mime_type(), "loaded reference image");
    Ok(Part::inline(format.to_mime_type(), &bytes))
}

/// Writes image bytes to `path`, re-encoding only when the payload format
/// differs from the one implied by the file extension.
pub fn save_image(bytes: &[u8], path: &Path) -> Result<()> {
    let target = ImageFormat::from_path(path).ok();
    let source = image::guess_format(bytes).ok();
    match (source, target) {
        (Some(source), Some(target)) if source != target => {
            let decoded = image::load_from_memory_with_format(bytes, source)
                .with_context(|| format!("failed decoding {source:?} payload"))?;
            let decoded = if target == ImageFormat::Jpeg {
                DynamicImage::ImageRgb8(decoded.to_rgb8())
            } else {
                decoded
            };
            decoded
                .save_with_format(path, target)
                .with_context(|| format!("failed to write {}", path.display()))
        }
        _ => fs::write(path, bytes).with_context(|| format!("failed to write {}", path.display())),
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::io::Cursor;

    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};

    pub fn png_bytes() -> anyhow::Result<Vec<u8>> {
        let img = RgbImage::from_pixel(2, 2, Rgb([200, 40, 10]));
        let mut out = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(img).write_to(&mut out, ImageFormat::Png)?;
        Ok(out.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::png_bytes;
    use super::*;

    #[test]
    fn references_skip_missing_and_corrupt_files() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let good = temp.path().join("good.png");
        let corrupt = temp.path().join("corrupt.png");
        let missing = temp.path().join("missing.png");
        fs::write(&good, png_bytes()?)?;
        fs::write(&corrupt, b"definitely not an image")?;

        let parts = load_reference_parts(&[missing, corrupt, good]);
        assert_eq!(parts.len(), 1);
        let inline = parts[0].inline_data.as_ref();
        assert_eq!(inline.map(|data| data.mime_type.as_str()), Some("image/png"));
        Ok(())
    }

    #[test]
    fn matching_format_is_written_verbatim() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let bytes = png_bytes()?;
        let path = temp.path().join("out.png");
        save_image(&bytes, &path)?;
        assert_eq!(fs::read(&path)?, bytes);
        Ok(())
    }

    #[test]
    fn mismatched_extension_is_reencoded() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("out.jpg");
        save_image(&png_bytes()?, &path)?;
        let written = fs::read(&path)?;
        assert_eq!(image::guess_format(&written)?, ImageFormat::Jpeg);
        Ok(())
    }
}
