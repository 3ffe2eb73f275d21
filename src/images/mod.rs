//! Image placeholders: generate (or find) an image per
//! `<!-- image: query -->` marker, upload it, and swap the marker for a
//! figure.

pub mod openai;
pub mod placeholder;
pub mod search;

use futures::future::join_all;
use tracing::{info, warn};

use crate::error::Result;
use crate::wordpress::{Media, WordPressClient};

pub use openai::OpenAiImages;
pub use search::ImageSearch;
pub use placeholder::{Placeholder, figure_html, find_placeholders, replace_placeholders};

#[derive(Debug)]
pub struct GeneratedImage {
    pub bytes: Vec<u8>,
    pub extension: &'static str,
}

#[async_trait::async_trait]
pub trait ImageGenerator: Send + Sync {
    async fn generate(&self, query: &str) -> Result<GeneratedImage>;
}

#[async_trait::async_trait]
pub trait MediaUploader: Send + Sync {
    async fn upload(&self, bytes: Vec<u8>, filename: &str, mime: &str) -> Result<Media>;
}

#[async_trait::async_trait]
impl MediaUploader for WordPressClient {
    async fn upload(&self, bytes: Vec<u8>, filename: &str, mime: &str) -> Result<Media> {
        self.upload_media(bytes, filename, mime).await
    }
}

pub struct ImageResolver<'a> {
    generator: &'a dyn ImageGenerator,
    uploader: &'a dyn MediaUploader,
    batch_size: usize,
}

impl<'a> ImageResolver<'a> {
    pub fn new(
        generator: &'a dyn ImageGenerator,
        uploader: &'a dyn MediaUploader,
        batch_size: usize,
    ) -> Self {
        Self {
            generator,
            uploader,
            batch_size: batch_size.max(1),
        }
    }

    /// Resolve every placeholder in `document`.  A placeholder whose image
    /// cannot be produced is removed.
    pub async fn resolve(&self, document: &str, slug: &str) -> String {
        let placeholders = find_placeholders(document);
        if placeholders.is_empty() {
            return document.to_string();
        }

        let mut resolved = Vec::with_capacity(placeholders.len());
        for (batch_no, batch) in placeholders.chunks(self.batch_size).enumerate() {
            let offset = batch_no * self.batch_size;
            let results = join_all(
                batch
                    .iter()
                    .enumerate()
                    .map(|(i, p)| self.produce(p, slug, offset + i + 1)),
            )
            .await;
            resolved.extend(batch.iter().cloned().zip(results));
        }

        let placed = resolved.iter().filter(|(_, m)| m.is_some()).count();
        info!(placeholders = resolved.len(), placed, "image placeholders resolved");
        replace_placeholders(document, &resolved)
    }

    async fn produce(&self, placeholder: &Placeholder, slug: &str, n: usize) -> Option<String> {
        match self.try_produce(placeholder, slug, n).await {
            Ok(markup) => Some(markup),
            Err(e) => {
                warn!(query = %placeholder.query, error = %e, "image placeholder dropped");
                None
            }
        }
    }

    async fn try_produce(&self, placeholder: &Placeholder, slug: &str, n: usize) -> Result<String> {
        let image = self.generator.generate(&placeholder.query).await?;
        let stem = if slug.is_empty() { "image" } else { slug };
        let filename = format!("{stem}-{n}.{}", image.extension);
        let mime = mime_guess::from_path(&filename).first_or_octet_stream();
        let media = self
            .uploader
            .upload(image.bytes, &filename, mime.essence_str())
            .await?;
        Ok(figure_html(&media.source_url, &placeholder.query))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AutoblogError;
    use std::sync::Mutex;

    struct StubGenerator;

    #[async_trait::async_trait]
    impl ImageGenerator for StubGenerator {
        async fn generate(&self, query: &str) -> Result<GeneratedImage> {
            if query.contains("fail") {
                return Err(AutoblogError::Llm("content policy".into()));
            }
            Ok(GeneratedImage {
                bytes: query.as_bytes().to_vec(),
                extension: "png",
            })
        }
    }

    #[derive(Default)]
    struct StubUploader {
        uploads: Mutex<Vec<(String, String)>>,
    }

    #[async_trait::async_trait]
    impl MediaUploader for StubUploader {
        async fn upload(&self, _bytes: Vec<u8>, filename: &str, mime: &str) -> Result<Media> {
            let mut uploads = self.uploads.lock().unwrap();
            uploads.push((filename.to_string(), mime.to_string()));
            Ok(Media {
                id: uploads.len() as u64,
                source_url: format!("https://blog.example/uploads/{filename}"),
            })
        }
    }

    #[tokio::test]
    async fn placeholders_become_figures_or_vanish() {
        let doc = "<div><!-- image: cold tea --><p>x</p><!-- image: fail here --><p>y</p><!-- image: rest --></div>";
        let uploader = StubUploader::default();
        let resolver = ImageResolver::new(&StubGenerator, &uploader, 2);

        let out = resolver.resolve(doc, "common-cold").await;
        assert_eq!(
            out,
            r#"<div><figure><img src="https://blog.example/uploads/common-cold-1.png" alt="cold tea"></figure><p>x</p><p>y</p><figure><img src="https://blog.example/uploads/common-cold-3.png" alt="rest"></figure></div>"#
        );
        let uploads = uploader.uploads.lock().unwrap();
        assert_eq!(uploads.len(), 2);
        assert_eq!(uploads[0].1, "image/png");
    }

    #[tokio::test]
    async fn documents_without_placeholders_are_untouched() {
        let uploader = StubUploader::default();
        let resolver = ImageResolver::new(&StubGenerator, &uploader, 3);
        assert_eq!(resolver.resolve("<p>x</p>", "").await, "<p>x</p>");
    }
}
