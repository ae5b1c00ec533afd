//! Thumbnail discovery for articles.
//!
//! [`ImageResolver::resolve`] walks a fixed list of tiers and returns the
//! first non-empty hit:
//!
//! | Tier | Where | Network |
//! |------|-------|---------|
//! | 1 | feed `media:content` / `media:thumbnail` | no |
//! | 2 | feed enclosure with an `image/*` type | no |
//! | 3 | feed link with an `image/*` type | no |
//! | 4 | listing HTML fragment: `img[src]`, `og:image`, `twitter:image` | no |
//! | 5 | the article page itself: meta tags, then the first usable `<img>` | yes |
//! | 6 | the configured placeholder | no |
//!
//! Tier 5 is bounded by its own timeout and can be switched off; its failures
//! are logged at debug level and never surface.

use crate::config::ImageSettings;
use crate::fetch::PageFetch;
use crate::utils::absolutize;
use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use std::time::Duration;
use tracing::debug;

/// A link to a media object found in a feed entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MediaRef {
    pub href: String,
    /// MIME type, when the feed declared one.
    pub mime: Option<String>,
}

impl MediaRef {
    fn is_image(&self) -> bool {
        !self.href.is_empty()
            && self
                .mime
                .as_deref()
                .is_some_and(|m| m.trim().to_ascii_lowercase().starts_with("image/"))
    }
}

/// Everything known about an article that might lead to an image.
#[derive(Debug, Clone, Default)]
pub struct ImageCandidate {
    /// Media URLs in document order (`media:content`, then `media:thumbnail`).
    pub media: Vec<String>,
    pub enclosures: Vec<MediaRef>,
    pub links: Vec<MediaRef>,
    /// HTML that came with the article: a feed summary or a listing block.
    pub fragment: Option<String>,
    /// Canonical article URL, base for relative paths and tier-5 target.
    pub url: String,
}

static FRAGMENT_IMG: Lazy<Selector> = Lazy::new(|| sel("img[src]"));
static OG_IMAGE: Lazy<Selector> = Lazy::new(|| sel(r#"meta[property="og:image"]"#));
static TWITTER_NAME: Lazy<Selector> = Lazy::new(|| sel(r#"meta[name="twitter:image"]"#));
static TWITTER_PROPERTY: Lazy<Selector> = Lazy::new(|| sel(r#"meta[property="twitter:image"]"#));
static IMAGE_PROPERTY: Lazy<Selector> = Lazy::new(|| sel(r#"meta[property="image"]"#));
static IMAGE_NAME: Lazy<Selector> = Lazy::new(|| sel(r#"meta[name="image"]"#));
static ANY_IMG: Lazy<Selector> = Lazy::new(|| sel("img"));

fn sel(css: &str) -> Selector {
    Selector::parse(css).expect("static image selector is valid")
}

/// Tiers 1 to 3: media, image enclosures, image links.
pub fn from_feed(candidate: &ImageCandidate) -> Option<String> {
    candidate
        .media
        .iter()
        .find(|m| !m.trim().is_empty())
        .map(|m| m.trim().to_string())
        .or_else(|| {
            candidate
                .enclosures
                .iter()
                .find(|e| e.is_image())
                .map(|e| e.href.clone())
        })
        .or_else(|| {
            candidate
                .links
                .iter()
                .find(|l| l.is_image())
                .map(|l| l.href.clone())
        })
}

/// Tier 4: look inside an HTML fragment without touching the network.
///
/// The first element matching each selector is consulted in turn; a match
/// without a usable attribute falls through to the next selector.
/// Relative values are resolved against `base` when possible.
pub fn from_fragment(html: &str, base: &str) -> Option<String> {
    if html.trim().is_empty() {
        return None;
    }
    let fragment = Html::parse_fragment(html);
    let tiers: [(&Selector, &str); 4] = [
        (&*FRAGMENT_IMG, "src"),
        (&*OG_IMAGE, "content"),
        (&*TWITTER_NAME, "content"),
        (&*TWITTER_PROPERTY, "content"),
    ];
    tiers.iter().find_map(|(selector, attr)| {
        let value = fragment
            .select(selector)
            .next()?
            .value()
            .attr(attr)?
            .trim();
        if value.is_empty() {
            return None;
        }
        Some(absolutize(base, value).unwrap_or_else(|| value.to_string()))
    })
}

/// Tier 5 parsing: find an image in a full article page.
///
/// Meta tags must carry an absolute or protocol-relative URL. Otherwise the
/// first `<img>` whose `src` is not a `data:` URI and is longer than 10
/// characters wins, resolved against `page_url`.
pub fn from_document(html: &str, page_url: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let metas: [&Selector; 5] = [
        &*OG_IMAGE,
        &*TWITTER_NAME,
        &*TWITTER_PROPERTY,
        &*IMAGE_PROPERTY,
        &*IMAGE_NAME,
    ];
    let from_meta = metas.iter().find_map(|selector| {
        let content = document.select(selector).next()?.value().attr("content")?.trim();
        if content.starts_with("http") {
            Some(content.to_string())
        } else {
            content.strip_prefix("//").map(|rest| format!("https://{rest}"))
        }
    });
    if from_meta.is_some() {
        return from_meta;
    }

    document.select(&ANY_IMG).find_map(|img| {
        let src = img.value().attr("src")?.trim();
        if src.starts_with("data:") || src.chars().count() <= 10 {
            return None;
        }
        absolutize(page_url, src)
    })
}

/// Resolves a thumbnail URL for every article, falling back to a
/// placeholder so the result is never empty.
#[derive(Debug)]
pub struct ImageResolver<F> {
    fetcher: F,
    /// Tier-5 timeout; `None` disables article page lookups.
    lookup_timeout: Option<Duration>,
    placeholder: String,
}

impl<F: PageFetch> ImageResolver<F> {
    pub fn new(fetcher: F, settings: &ImageSettings) -> Self {
        Self {
            fetcher,
            lookup_timeout: settings
                .enabled
                .then(|| Duration::from_secs(settings.timeout_secs)),
            placeholder: settings.placeholder.clone(),
        }
    }

    pub fn placeholder(&self) -> &str {
        &self.placeholder
    }

    /// Walk the tiers for `candidate`; never fails.
    pub async fn resolve(&self, candidate: &ImageCandidate) -> String {
        if let Some(found) = from_feed(candidate) {
            return found;
        }
        if let Some(found) = candidate
            .fragment
            .as_deref()
            .and_then(|html| from_fragment(html, &candidate.url))
        {
            return found;
        }
        if let Some(found) = self.from_article(&candidate.url).await {
            return found;
        }
        self.placeholder.clone()
    }

    /// Tier 5: download the article page and look for an image in it.
    pub async fn from_article(&self, url: &str) -> Option<String> {
        let timeout = self.lookup_timeout?;
        if !url.starts_with("http") {
            return None;
        }

        let body = match tokio::time::timeout(timeout, self.fetcher.fetch(url, timeout)).await {
            Ok(Ok(body)) => body,
            Ok(Err(e)) => {
                debug!(%url, error = %e, "Could not fetch article for image extraction");
                return None;
            }
            Err(_) => {
                debug!(%url, ?timeout, "Article image lookup timed out");
                return None;
            }
        };

        let found = from_document(&body, url);
        if found.is_none() {
            debug!(%url, "No image found in article page");
        }
        found
    }
}
