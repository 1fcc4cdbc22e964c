//! Local persistence of generated and re-hosted images.

use std::io::Cursor;
use std::path::{Path, PathBuf};

use image::{ImageFormat, Rgb, RgbImage};
use rand::seq::SliceRandom;
use uuid::Uuid;

use crate::dispatch::HttpClient;
use crate::error::WonderlandError;

/// URL prefix under which the output directory is served.
pub const OUTPUT_URL_PREFIX: &str = "/ai-photos";

/// Mock placeholder palette.
pub const MOCK_PALETTE: [[u8; 3]; 4] = [
    [0xFC, 0x6A, 0x59],
    [0xFF, 0xC6, 0x3E],
    [0xFD, 0x54, 0x3F],
    [0x6C, 0xC8, 0xCC],
];

const MOCK_SIZE: u32 = 512;

/// Filename prefix naming where an image came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    Cartoon,
    Original,
    Gemini,
}

impl ImageKind {
    pub fn prefix(self) -> &'static str {
        match self {
            Self::Cartoon => "cartoon_",
            Self::Original => "original_",
            Self::Gemini => "gemini_",
        }
    }
}

pub fn unique_filename(kind: ImageKind, extension: &str) -> String {
    format!("{}{}.{extension}", kind.prefix(), Uuid::new_v4())
}

/// Writes images under one directory and hands back the URL each is served at.
#[derive(Debug, Clone)]
pub struct ImageStore {
    dir: PathBuf,
    url_prefix: String,
}

impl ImageStore {
    pub fn new(dir: impl Into<PathBuf>, url_prefix: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            url_prefix: url_prefix.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub async fn save_bytes(
        &self,
        kind: ImageKind,
        extension: &str,
        bytes: &[u8],
    ) -> Result<String, WonderlandError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let filename = unique_filename(kind, extension);
        let path = self.dir.join(&filename);

        // Temp file + rename so the static server never serves a partial image.
        let tmp_path = path.with_extension("tmp");
        tokio::fs::write(&tmp_path, bytes).await?;
        if let Err(e) = tokio::fs::rename(&tmp_path, &path).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(e.into());
        }

        Ok(format!("{}/{filename}", self.url_prefix))
    }

    pub async fn save_from_url(
        &self,
        http: &HttpClient,
        kind: ImageKind,
        url: &str,
    ) -> Result<String, WonderlandError> {
        let bytes = http.fetch_bytes(url).await?;
        self.save_bytes(kind, "png", &bytes).await
    }

    /// Render a solid-colour placeholder from the mock palette.
    pub async fn save_mock_placeholder(&self) -> Result<String, WonderlandError> {
        let color = *MOCK_PALETTE
            .choose(&mut rand::thread_rng())
            .unwrap_or(&MOCK_PALETTE[0]);
        let png = render_solid_png(color, MOCK_SIZE)?;
        self.save_bytes(ImageKind::Cartoon, "png", &png).await
    }
}

pub fn render_solid_png(color: [u8; 3], size: u32) -> Result<Vec<u8>, WonderlandError> {
    let img = RgbImage::from_pixel(size, size, Rgb(color));
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, ImageFormat::Png)?;
    Ok(out.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filenames_carry_kind_prefix() {
        let name = unique_filename(ImageKind::Gemini, "png");
        assert!(name.starts_with("gemini_"));
        assert!(name.ends_with(".png"));
        assert_ne!(name, unique_filename(ImageKind::Gemini, "png"));
    }

    #[tokio::test]
    async fn save_bytes_returns_prefixed_url() {
        let dir = tempfile::tempdir().unwrap();
        let store = ImageStore::new(dir.path(), "/ai-photos/");
        let url = store
            .save_bytes(ImageKind::Original, "jpg", b"jpeg")
            .await
            .unwrap();
        assert!(url.starts_with("/ai-photos/original_"));
        let filename = url.rsplit('/').next().unwrap();
        let written = std::fs::read(dir.path().join(filename)).unwrap();
        assert_eq!(written, b"jpeg");
    }

    #[tokio::test]
    async fn mock_placeholder_is_palette_png() {
        let dir = tempfile::tempdir().unwrap();
        let store = ImageStore::new(dir.path(), OUTPUT_URL_PREFIX);
        let url = store.save_mock_placeholder().await.unwrap();
        assert!(url.starts_with("/ai-photos/cartoon_"));
        assert!(url.ends_with(".png"));

        let filename = url.rsplit('/').next().unwrap();
        let decoded = image::open(dir.path().join(filename)).unwrap().to_rgb8();
        assert_eq!(decoded.dimensions(), (512, 512));
        let pixel = decoded.get_pixel(0, 0).0;
        assert!(MOCK_PALETTE.contains(&pixel));
        assert_eq!(decoded.get_pixel(511, 511).0, pixel);
    }
}
