//! HTML listing sources scraped with CSS selectors.
//!
//! Two listing layouts cover the built-in sources:
//!
//! - [`ListingLayout::StoryRows`]: link aggregator front pages (`tr.athing`
//!   rows with a `span.titleline` link). No description or date is available,
//!   so a short description is synthesized and today's date is used.
//! - [`ListingLayout::ArticleBlocks`]: blog indexes made of `<article>`
//!   blocks, or `div.post` blocks when a page has no `<article>` at all.
//!
//! Links are resolved against the source's base URL. A block with a heading
//! but no link still produces a draft, with an empty URL.

use super::{Draft, ScrapeContext, SourceError, SourceMeta, finish};
use crate::config::ListingLayout;
use crate::fetch::PageFetch;
use crate::images::ImageCandidate;
use crate::models::Article;
use crate::relevance::RelevanceFilter;
use crate::utils::{absolutize, collapse_whitespace, today_stamp, truncate_description};
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, instrument};

static STORY_ROW: Lazy<Selector> = Lazy::new(|| sel("tr.athing"));
static STORY_LINK: Lazy<Selector> = Lazy::new(|| sel("span.titleline a"));
static ARTICLE_BLOCK: Lazy<Selector> = Lazy::new(|| sel("article"));
static POST_BLOCK: Lazy<Selector> = Lazy::new(|| sel("div.post"));
static HEADING_H2: Lazy<Selector> = Lazy::new(|| sel("h2"));
static HEADING_H3: Lazy<Selector> = Lazy::new(|| sel("h3"));
static ANCHOR: Lazy<Selector> = Lazy::new(|| sel("a"));
static PARAGRAPH: Lazy<Selector> = Lazy::new(|| sel("p"));

fn sel(css: &str) -> Selector {
    Selector::parse(css).expect("static listing selector is valid")
}

/// One entry found on a listing page, before filtering.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Listing {
    pub title: String,
    pub url: String,
    pub description: Option<String>,
    /// Outer HTML of the block, searched for an image later.
    pub fragment: Option<String>,
}

fn element_text(element: ElementRef<'_>) -> String {
    collapse_whitespace(&element.text().collect::<String>())
}

fn link_url(base_url: &str, link: Option<ElementRef<'_>>) -> String {
    link.and_then(|a| a.value().attr("href"))
        .and_then(|href| absolutize(base_url, href))
        .unwrap_or_default()
}

/// Parse a story-row listing, looking at no more than `max` rows.
pub fn story_rows(html: &str, base_url: &str, max: usize) -> Vec<Listing> {
    let document = Html::parse_document(html);
    document
        .select(&STORY_ROW)
        .take(max)
        .filter_map(|row| {
            let link = row.select(&STORY_LINK).next()?;
            Some(Listing {
                title: element_text(link),
                url: link_url(base_url, Some(link)),
                description: None,
                fragment: None,
            })
        })
        .collect()
}

/// Parse a blog listing, looking at no more than `max` blocks.
pub fn article_blocks(html: &str, base_url: &str, max: usize) -> Vec<Listing> {
    let document = Html::parse_document(html);
    let mut blocks: Vec<ElementRef<'_>> = document.select(&ARTICLE_BLOCK).collect();
    if blocks.is_empty() {
        blocks = document.select(&POST_BLOCK).collect();
    }

    blocks
        .into_iter()
        .take(max)
        .filter_map(|block| {
            let heading = block
                .select(&HEADING_H2)
                .next()
                .or_else(|| block.select(&HEADING_H3).next())?;
            let link = heading
                .select(&ANCHOR)
                .next()
                .or_else(|| block.select(&ANCHOR).next());
            Some(Listing {
                title: element_text(heading),
                url: link_url(base_url, link),
                description: block.select(&PARAGRAPH).next().map(element_text),
                fragment: Some(block.html()),
            })
        })
        .collect()
}

/// A source backed by an HTML listing page.
#[derive(Debug, Clone)]
pub struct HtmlAdapter {
    meta: SourceMeta,
    layout: ListingLayout,
    base_url: String,
}

impl HtmlAdapter {
    pub fn new(meta: SourceMeta, layout: ListingLayout, base_url: String) -> Self {
        Self {
            meta,
            layout,
            base_url,
        }
    }

    pub fn meta(&self) -> &SourceMeta {
        &self.meta
    }

    #[instrument(level = "info", skip_all, fields(source = %self.meta.key))]
    pub async fn fetch<P, I>(&self, ctx: &ScrapeContext<P, I>) -> Result<Vec<Article>, SourceError>
    where
        P: PageFetch,
        I: PageFetch,
    {
        let body = ctx.pages.fetch(&self.meta.url, ctx.fetch_timeout).await?;
        let drafts = self.drafts(&body, &ctx.relevance);
        debug!(relevant = drafts.len(), "Parsed listing");
        Ok(finish(&self.meta, drafts, ctx).await)
    }

    /// Parse the listing and keep entries with a title that pass the
    /// relevance filter on their title.
    pub fn drafts(&self, html: &str, relevance: &RelevanceFilter) -> Vec<Draft> {
        let listings = match self.layout {
            ListingLayout::StoryRows => story_rows(html, &self.base_url, self.meta.max_entries),
            ListingLayout::ArticleBlocks => {
                article_blocks(html, &self.base_url, self.meta.max_entries)
            }
        };
        let today = today_stamp();

        listings
            .into_iter()
            .filter(|listing| !listing.title.is_empty())
            .filter(|listing| relevance.is_relevant(&listing.title, ""))
            .map(|listing| {
                let description = match (self.layout, listing.description) {
                    (ListingLayout::StoryRows, _) => {
                        truncate_description(&format!("{} story: {}", self.meta.label, listing.title))
                    }
                    (_, Some(text)) => truncate_description(&text),
                    (_, None) => String::new(),
                };
                Draft {
                    image: ImageCandidate {
                        fragment: listing.fragment,
                        url: listing.url.clone(),
                        ..ImageCandidate::default()
                    },
                    title: listing.title,
                    description,
                    url: listing.url,
                    published_date: today.clone(),
                }
            })
            .collect()
    }
}
