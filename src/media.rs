use std::path::{Component, Path, PathBuf};

use image::ImageFormat;

/// A file field pulled out of a multipart form.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub file_name: String,
    pub data: Vec<u8>,
}

/// An upload that decoded as an image.
#[derive(Debug, Clone)]
pub struct ValidImage {
    pub data: Vec<u8>,
    pub format: ImageFormat,
}

impl ValidImage {
    pub fn extension(&self) -> &'static str {
        self.format.extensions_str().first().copied().unwrap_or("img")
    }
}

/// Accept the payload only if its format is recognised and it fully decodes.
pub fn inspect_image(upload: ImageUpload) -> Result<ValidImage, image::ImageError> {
    let format = image::guess_format(&upload.data)?;
    image::load_from_memory_with_format(&upload.data, format)?;
    tracing::debug!(
        file_name = %upload.file_name,
        bytes = upload.data.len(),
        "Accepted {:?} upload",
        format
    );
    Ok(ValidImage {
        data: upload.data,
        format,
    })
}

/// Write the image under `<root>/posts/` with a fresh name. Returns the path
/// relative to `root`, which is what gets stored on the post.
pub async fn save_post_image(root: &Path, image: &ValidImage) -> std::io::Result<String> {
    let dir = root.join("posts");
    tokio::fs::create_dir_all(&dir).await?;

    let name = format!("{}.{}", uuid::Uuid::now_v7(), image.extension());
    tokio::fs::write(dir.join(&name), &image.data).await?;
    Ok(format!("posts/{}", name))
}

/// Join a request path onto the uploads root, refusing anything that could
/// escape it.
pub fn resolve_media_path(root: &Path, requested: &str) -> Option<PathBuf> {
    let relative = Path::new(requested);
    let safe = relative
        .components()
        .all(|c| matches!(c, Component::Normal(_)));
    if !safe || requested.is_empty() {
        return None;
    }
    Some(root.join(relative))
}

#[cfg(test)]
pub(crate) mod fixtures {
    /// 2x1 GIF, the smallest image that decodes.
    pub const SMALL_GIF: &[u8] = &[
        0x47, 0x49, 0x46, 0x38, 0x39, 0x61, 0x02, 0x00, 0x01, 0x00, 0x80, 0x00, 0x00, 0x00, 0x00,
        0x00, 0xFF, 0xFF, 0xFF, 0x21, 0xF9, 0x04, 0x00, 0x00, 0x00, 0x00, 0x00, 0x2C, 0x00, 0x00,
        0x00, 0x00, 0x02, 0x00, 0x01, 0x00, 0x00, 0x02, 0x02, 0x0C, 0x0A, 0x00, 0x3B,
    ];
}

#[cfg(test)]
mod tests {
    use super::fixtures::SMALL_GIF;
    use super::*;

    fn upload(data: &[u8]) -> ImageUpload {
        ImageUpload {
            file_name: "small.gif".into(),
            data: data.to_vec(),
        }
    }

    #[test]
    fn accepts_small_gif() {
        let image = inspect_image(upload(SMALL_GIF)).unwrap();
        assert_eq!(image.format, ImageFormat::Gif);
        assert_eq!(image.extension(), "gif");
    }

    #[test]
    fn rejects_text_payload() {
        assert!(inspect_image(upload(b"definitely not an image")).is_err());
    }

    #[test]
    fn rejects_truncated_image() {
        assert!(inspect_image(upload(&SMALL_GIF[..12])).is_err());
    }

    #[tokio::test]
    async fn saves_under_posts_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let image = inspect_image(upload(SMALL_GIF)).unwrap();
        let relative = save_post_image(tmp.path(), &image).await.unwrap();
        assert!(relative.starts_with("posts/"));
        assert!(relative.ends_with(".gif"));
        assert_eq!(std::fs::read(tmp.path().join(&relative)).unwrap(), SMALL_GIF);
    }

    #[test]
    fn media_path_rejects_traversal() {
        let root = Path::new("/srv/media");
        assert_eq!(
            resolve_media_path(root, "posts/a.gif"),
            Some(PathBuf::from("/srv/media/posts/a.gif"))
        );
        assert!(resolve_media_path(root, "../etc/passwd").is_none());
        assert!(resolve_media_path(root, "/etc/passwd").is_none());
        assert!(resolve_media_path(root, "").is_none());
    }
}
