use std::sync::{Arc, LazyLock};

use artmark_core::{
    AssetRef, Document, ExtractionContext, PathContext, PreparedContext, SecondaryRequest,
};
use artmark_logging::{artmark_debug, artmark_error};
use scraper::Selector;

use crate::decode::{decode_page, DecodeError};
use crate::fetch::SecondaryFetcher;
use crate::FetchError;

static IMAGES: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("img[src]").expect("image selector is valid"));

#[derive(Debug, thiserror::Error)]
pub enum PathError {
    #[error("secondary fetch failed: {0}")]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error("secondary document at {0} has no matching images")]
    NoImages(String),
}

/// Finishes a [`PreparedContext`] by resolving a deferred path.
#[derive(Clone)]
pub struct ContextExtractor {
    fetcher: Arc<dyn SecondaryFetcher>,
}

impl ContextExtractor {
    pub fn new(fetcher: Arc<dyn SecondaryFetcher>) -> Self {
        Self { fetcher }
    }

    /// A failed secondary fetch leaves the path absent and keeps the rest.
    pub async fn resolve(&self, prepared: PreparedContext) -> ExtractionContext {
        let PreparedContext {
            mut context,
            pending_path,
        } = prepared;
        if let Some(request) = pending_path {
            match self.secondary_path(&request).await {
                Ok(path) => context.path = Some(path),
                Err(err) => artmark_error!("path context unavailable: {err}"),
            }
        }
        context
    }

    pub async fn secondary_path(
        &self,
        request: &SecondaryRequest,
    ) -> Result<PathContext, PathError> {
        let output = self.fetcher.fetch(request).await?;
        let final_url = output.metadata.final_url;
        let tld = url::Url::parse(&final_url)
            .ok()
            .and_then(|url| {
                url.host_str()
                    .and_then(|host| host.rsplit('.').next())
                    .map(str::to_owned)
            });
        let decoded = decode_page(
            &output.bytes,
            output.metadata.content_type.as_deref(),
            tld.as_deref(),
        )?;
        artmark_debug!(
            "secondary document {final_url} decoded as {}",
            decoded.encoding_label
        );

        let doc = Document::parse(final_url.clone(), &decoded.html);
        let assets: Vec<AssetRef> = doc
            .query_all(None, &IMAGES)
            .into_iter()
            .filter_map(|img| img.value().attr("src"))
            .filter_map(|src| doc.absolute_url(src))
            .filter(|src| request.image_pattern.is_match(src))
            .map(|src| AssetRef { src })
            .collect();

        if assets.is_empty() {
            return Err(PathError::NoImages(final_url));
        }
        Ok(PathContext::uniform(assets))
    }
}
