//! Structured context extraction.
//!
//! Each sub-record (`path`, `item`, `author`) is built independently. A builder
//! that fails logs the fault and leaves its sub-record empty; the others are
//! unaffected. Path resolution may need a secondary document, so
//! [`ContextBuilder::prepare`] returns the request instead of performing it.

use artmark_logging::artmark_error;
use scraper::ElementRef;
use serde::{Deserialize, Serialize};
use url::form_urlencoded;

use crate::dates::PostedDate;
use crate::dom::{text_of, Document};
use crate::error::ExtractError;
use crate::identity::{IdentityPattern, UrlPattern};
use crate::selectors::ElementBundle;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExtractionContext {
    pub path: Option<PathContext>,
    pub item: Option<ItemContext>,
    pub author: Option<AuthorContext>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssetRef {
    pub src: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PathContext {
    pub thumbnail: Vec<AssetRef>,
    pub original: Vec<AssetRef>,
}

impl PathContext {
    /// Same asset list for both resolutions.
    pub fn uniform(assets: Vec<AssetRef>) -> Self {
        Self {
            thumbnail: assets.clone(),
            original: assets,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemContext {
    pub url: String,
    pub id: String,
    pub title: Option<String>,
    pub posted: Option<i64>,
    #[serde(rename = "postedYMD")]
    pub posted_ymd: Option<String>,
    pub tags: Vec<String>,
    pub caption: Option<String>,
    #[serde(rename = "R18")]
    pub r18: bool,
}

/// `linked_id` and `memoized_name` are cross references resolved by the
/// download history, never by the page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorContext {
    pub id: String,
    pub name: String,
    pub linked_id: Option<String>,
    pub memoized_name: Option<String>,
}

/// Which sub-records a caller wants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextParts {
    pub path: bool,
    pub item: bool,
    pub author: bool,
}

impl ContextParts {
    pub const ALL: Self = Self {
        path: true,
        item: true,
        author: true,
    };
    pub const METADATA: Self = Self {
        path: false,
        item: true,
        author: true,
    };
}

#[derive(Debug, Clone, Deserialize)]
pub struct ContextRules {
    #[serde(default)]
    pub path: Vec<PathStrategy>,
    pub item: ItemRules,
    pub author: AuthorRules,
}

fn default_src_attr() -> String {
    "src".to_string()
}

/// Tried in order; the first strategy whose `when` field resolves is used.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum PathStrategy {
    /// One asset per resolution, read from two single fields.
    Attributes {
        when: String,
        thumbnail: String,
        original: String,
        #[serde(default = "default_src_attr")]
        attr: String,
    },
    /// Every node of a multi field; thumbnails and originals are the same.
    Gallery {
        when: String,
        images: String,
        #[serde(default = "default_src_attr")]
        attr: String,
    },
    /// Post the hidden form inputs back to the page and collect the matching
    /// images of the response.
    Secondary {
        when: String,
        params: String,
        #[serde(rename = "imagePattern")]
        image_pattern: UrlPattern,
    },
}

impl PathStrategy {
    fn when(&self) -> &str {
        match self {
            PathStrategy::Attributes { when, .. }
            | PathStrategy::Gallery { when, .. }
            | PathStrategy::Secondary { when, .. } => when,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ItemUrl {
    #[default]
    Location,
    Link(String),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DateEncoding {
    EpochAttribute(String),
    Text,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PostedRule {
    pub field: String,
    pub encoding: DateEncoding,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemRules {
    #[serde(default)]
    pub url: ItemUrl,
    pub title: String,
    #[serde(default)]
    pub posted: Option<PostedRule>,
    #[serde(default)]
    pub tags: Option<String>,
    #[serde(default)]
    pub tag_marker: Option<String>,
    #[serde(default)]
    pub caption: Option<String>,
    #[serde(default)]
    pub r18: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorRules {
    pub link: String,
    pub id_pattern: IdentityPattern,
}

/// Request for the one asynchronous step of extraction.
#[derive(Debug, Clone)]
pub struct SecondaryRequest {
    pub url: String,
    pub form: Vec<(String, String)>,
    pub image_pattern: UrlPattern,
}

impl SecondaryRequest {
    pub fn body(&self) -> String {
        form_urlencoded::Serializer::new(String::new())
            .extend_pairs(self.form.iter())
            .finish()
    }
}

/// Output of the synchronous phase: everything but a deferred path.
#[derive(Debug, Clone)]
pub struct PreparedContext {
    pub context: ExtractionContext,
    pub pending_path: Option<SecondaryRequest>,
}

enum PathPlan {
    Ready(PathContext),
    Fetch(SecondaryRequest),
}

pub struct ContextBuilder<'r> {
    rules: &'r ContextRules,
    identity: &'r IdentityPattern,
}

impl<'r> ContextBuilder<'r> {
    pub fn new(rules: &'r ContextRules, identity: &'r IdentityPattern) -> Self {
        Self { rules, identity }
    }

    pub fn prepare(
        &self,
        doc: &Document,
        bundle: &mut ElementBundle,
        parts: ContextParts,
    ) -> PreparedContext {
        let mut context = ExtractionContext::default();
        let mut pending_path = None;

        if parts.path {
            match self.path(doc, bundle) {
                Ok(PathPlan::Ready(path)) => context.path = Some(path),
                Ok(PathPlan::Fetch(request)) => pending_path = Some(request),
                Err(err) => artmark_error!("path context unavailable: {err}"),
            }
        }
        if parts.item {
            context.item = isolate("item", self.item(doc, bundle));
        }
        if parts.author {
            context.author = isolate("author", self.author(doc, bundle));
        }

        PreparedContext {
            context,
            pending_path,
        }
    }

    fn path(&self, doc: &Document, bundle: &mut ElementBundle) -> Result<PathPlan, ExtractError> {
        let strategy = self
            .rules
            .path
            .iter()
            .find(|strategy| bundle.has(doc, strategy.when()))
            .ok_or(ExtractError::NoPathStrategy)?;

        match strategy {
            PathStrategy::Attributes {
                thumbnail,
                original,
                attr,
                ..
            } => {
                let thumbnail = asset(doc, required(doc, bundle, thumbnail)?, thumbnail, attr)?;
                let original = asset(doc, required(doc, bundle, original)?, original, attr)?;
                Ok(PathPlan::Ready(PathContext {
                    thumbnail: vec![thumbnail],
                    original: vec![original],
                }))
            }
            PathStrategy::Gallery { images, attr, .. } => {
                let assets = bundle
                    .resolve_all(doc, images)
                    .into_iter()
                    .map(|el| asset(doc, el, images, attr))
                    .collect::<Result<Vec<_>, _>>()?;
                if assets.is_empty() {
                    return Err(ExtractError::MissingNode(images.clone()));
                }
                Ok(PathPlan::Ready(PathContext::uniform(assets)))
            }
            PathStrategy::Secondary {
                params,
                image_pattern,
                ..
            } => {
                let form = bundle
                    .resolve_all(doc, params)
                    .into_iter()
                    .filter_map(|input| {
                        let name = input.value().attr("name")?;
                        let value = input.value().attr("value").unwrap_or_default();
                        Some((name.to_string(), value.to_string()))
                    })
                    .collect();
                Ok(PathPlan::Fetch(SecondaryRequest {
                    url: doc.location().to_string(),
                    form,
                    image_pattern: image_pattern.clone(),
                }))
            }
        }
    }

    fn item(
        &self,
        doc: &Document,
        bundle: &mut ElementBundle,
    ) -> Result<ItemContext, ExtractError> {
        let rules = &self.rules.item;

        let url = match &rules.url {
            ItemUrl::Location => doc.location().to_string(),
            ItemUrl::Link(field) => href(doc, required(doc, bundle, field)?, field)?,
        };
        let id = self
            .identity
            .identify(&url)
            .ok_or_else(|| ExtractError::PatternMismatch {
                field: "item.url".into(),
                value: url.clone(),
            })?;

        let title = bundle
            .resolve(doc, &rules.title)
            .map(text_of)
            .filter(|t| !t.is_empty());
        if title.is_none() {
            artmark_error!("item {id}: no title at `{}`", rules.title);
        }

        let posted = match &rules.posted {
            Some(rule) => posted_date(doc, bundle, rule),
            None => PostedDate::fault(),
        };

        let tags = match &rules.tags {
            Some(field) => bundle
                .resolve_all(doc, field)
                .into_iter()
                .map(|el| normalize_tag(&text_of(el), rules.tag_marker.as_deref()))
                .filter(|tag| !tag.is_empty())
                .collect(),
            None => Vec::new(),
        };

        let caption = rules.caption.as_ref().and_then(|field| {
            let joined = bundle
                .resolve_all(doc, field)
                .into_iter()
                .map(text_of)
                .collect::<Vec<_>>()
                .join("\n");
            let joined = joined.trim();
            (!joined.is_empty()).then(|| joined.to_string())
        });

        Ok(ItemContext {
            url,
            id,
            title,
            posted: posted.timestamp_ms.filter(|_| !posted.fault),
            posted_ymd: posted.ymd.filter(|_| !posted.fault),
            tags,
            caption,
            r18: rules.r18,
        })
    }

    fn author(
        &self,
        doc: &Document,
        bundle: &mut ElementBundle,
    ) -> Result<AuthorContext, ExtractError> {
        let rules = &self.rules.author;
        let link = required(doc, bundle, &rules.link)?;
        let href = href(doc, link, &rules.link)?;
        let id = rules
            .id_pattern
            .identify(&href)
            .ok_or_else(|| ExtractError::PatternMismatch {
                field: rules.link.clone(),
                value: href.clone(),
            })?;

        Ok(AuthorContext {
            id,
            name: text_of(link),
            linked_id: None,
            memoized_name: None,
        })
    }
}

/// Trim a raw tag and drop its leading marker (e.g. `#`).
pub fn normalize_tag(raw: &str, marker: Option<&str>) -> String {
    let trimmed = raw.trim();
    let stripped = match marker {
        Some(marker) if !marker.is_empty() => trimmed.strip_prefix(marker).unwrap_or(trimmed),
        _ => trimmed,
    };
    stripped.trim().to_string()
}

fn isolate<T>(part: &str, result: Result<T, ExtractError>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(err) => {
            artmark_error!("{part} context unavailable: {err}");
            None
        }
    }
}

fn posted_date(doc: &Document, bundle: &mut ElementBundle, rule: &PostedRule) -> PostedDate {
    let Some(node) = bundle.resolve(doc, &rule.field) else {
        artmark_error!("no posted date at `{}`", rule.field);
        return PostedDate::fault();
    };
    let posted = match &rule.encoding {
        DateEncoding::EpochAttribute(attr) => match node.value().attr(attr) {
            Some(raw) => PostedDate::from_epoch_seconds(raw),
            None => PostedDate::fault(),
        },
        DateEncoding::Text => PostedDate::from_text(&text_of(node)),
    };
    if posted.fault {
        artmark_error!("posted date at `{}` could not be read", rule.field);
    }
    posted
}

fn required<'d>(
    doc: &'d Document,
    bundle: &mut ElementBundle,
    field: &str,
) -> Result<ElementRef<'d>, ExtractError> {
    bundle
        .resolve(doc, field)
        .ok_or_else(|| ExtractError::MissingNode(field.to_string()))
}

fn href(doc: &Document, element: ElementRef<'_>, field: &str) -> Result<String, ExtractError> {
    asset(doc, element, field, "href").map(|a| a.src)
}

fn asset(
    doc: &Document,
    element: ElementRef<'_>,
    field: &str,
    attr: &str,
) -> Result<AssetRef, ExtractError> {
    let raw = element
        .value()
        .attr(attr)
        .ok_or_else(|| ExtractError::MissingAttribute {
            field: field.to_string(),
            attr: attr.to_string(),
        })?;
    let src = doc.absolute_url(raw).unwrap_or_else(|| raw.trim().to_string());
    Ok(AssetRef { src })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_marker_is_stripped_after_trimming() {
        assert_eq!(normalize_tag("  #artwork ", Some("#")), "artwork");
        assert_eq!(normalize_tag("#artwork", Some("#")), "artwork");
        assert_eq!(normalize_tag("artwork", Some("#")), "artwork");
        assert_eq!(normalize_tag(" # spaced", Some("#")), "spaced");
    }

    #[test]
    fn without_marker_only_whitespace_goes() {
        assert_eq!(normalize_tag("\n #keep \t", None), "#keep");
    }

    #[test]
    fn secondary_body_is_form_encoded() {
        let request = SecondaryRequest {
            url: "https://www.board.example/view/1".into(),
            form: vec![
                ("ego".into(), "1 2".into()),
                ("token".into(), "a&b".into()),
            ],
            image_pattern: UrlPattern::new("img").unwrap(),
        };
        assert_eq!(request.body(), "ego=1+2&token=a%26b");
    }
}
