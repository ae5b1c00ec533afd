//! RSS 2.0 and Atom feed sources.
//!
//! The parser is a small event loop over `quick_xml::Reader` that understands
//! the handful of elements the adapters need:
//!
//! | Field | RSS | Atom |
//! |-------|-----|------|
//! | title | `title` | `title` |
//! | link | `link` | `link rel="alternate" href` |
//! | summary | `description`, then `content:encoded` | `summary`, then `content` |
//! | published | `pubDate`, `dc:date` | `published`, then `updated` |
//! | images | `media:content`, `media:thumbnail`, `enclosure` | `link type="image/*"` |

use super::{Draft, ScrapeContext, SourceError, SourceMeta, finish};
use crate::fetch::PageFetch;
use crate::images::{ImageCandidate, MediaRef};
use crate::models::Article;
use crate::relevance::RelevanceFilter;
use crate::utils::{clean_html_content, collapse_whitespace, truncate_for_log};
use quick_xml::escape::unescape;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use thiserror::Error;
use tracing::{debug, instrument};

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("malformed feed XML near byte {position}: {source}")]
    Xml {
        position: u64,
        #[source]
        source: quick_xml::Error,
    },
    #[error("document is not an RSS or Atom feed")]
    NotAFeed,
}

/// One `<item>` or `<entry>` with entities decoded and text trimmed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeedEntry {
    pub title: String,
    pub link: String,
    /// Raw summary markup; may contain HTML.
    pub summary: String,
    pub published: String,
    pub media: Vec<String>,
    pub enclosures: Vec<MediaRef>,
    pub links: Vec<MediaRef>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Title,
    Link,
    Summary,
    Content,
    Published,
    Updated,
}

impl Field {
    fn for_tag(tag: &[u8]) -> Option<Field> {
        match tag {
            b"title" => Some(Field::Title),
            b"link" => Some(Field::Link),
            b"description" | b"summary" => Some(Field::Summary),
            b"content:encoded" | b"content" => Some(Field::Content),
            b"pubDate" | b"published" | b"dc:date" => Some(Field::Published),
            b"updated" => Some(Field::Updated),
            _ => None,
        }
    }
}

#[derive(Default)]
struct EntryBuilder {
    entry: FeedEntry,
    content: String,
    updated: String,
}

impl EntryBuilder {
    fn assign(&mut self, field: Field, text: &str) {
        let text = text.trim();
        let slot = match field {
            Field::Title => &mut self.entry.title,
            Field::Link => &mut self.entry.link,
            Field::Summary => &mut self.entry.summary,
            Field::Content => &mut self.content,
            Field::Published => &mut self.entry.published,
            Field::Updated => &mut self.updated,
        };
        // first occurrence wins
        if slot.is_empty() {
            *slot = text.to_string();
        }
    }

    fn collect_media(&mut self, element: &BytesStart<'_>) {
        match element.name().as_ref() {
            b"media:content" | b"media:thumbnail" => {
                if let Some(url) = attribute(element, b"url") {
                    self.entry.media.push(url);
                }
            }
            b"enclosure" => {
                if let Some(href) = attribute(element, b"url") {
                    let mime = attribute(element, b"type");
                    self.entry.enclosures.push(MediaRef { href, mime });
                }
            }
            b"link" => {
                let Some(href) = attribute(element, b"href") else {
                    return;
                };
                let rel = attribute(element, b"rel").unwrap_or_else(|| "alternate".to_string());
                let link = MediaRef {
                    href,
                    mime: attribute(element, b"type"),
                };
                if rel == "alternate" && self.entry.link.is_empty() {
                    self.entry.link = link.href.clone();
                }
                if rel == "enclosure" {
                    self.entry.enclosures.push(link.clone());
                }
                self.entry.links.push(link);
            }
            _ => {}
        }
    }

    fn build(self) -> FeedEntry {
        let mut entry = self.entry;
        if entry.summary.is_empty() {
            entry.summary = self.content;
        }
        if entry.published.is_empty() {
            entry.published = self.updated;
        }
        entry
    }
}

fn decode(raw: &[u8]) -> String {
    let text = String::from_utf8_lossy(raw);
    unescape(&text)
        .map(|decoded| decoded.into_owned())
        .unwrap_or_else(|_| text.to_string())
}

fn attribute(element: &BytesStart<'_>, name: &[u8]) -> Option<String> {
    element
        .attributes()
        .flatten()
        .find(|attr| attr.key.as_ref() == name)
        .map(|attr| decode(&attr.value))
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Parse an RSS 2.0, RSS 1.0 or Atom document into entries, in document order.
pub fn parse_feed(xml: &str) -> Result<Vec<FeedEntry>, FeedError> {
    let mut reader = Reader::from_str(xml);
    let mut entries = Vec::new();
    let mut current: Option<EntryBuilder> = None;
    // field being read and the tag that closes it
    let mut field: Option<(Field, Vec<u8>)> = None;
    let mut text = String::new();
    let mut is_feed = false;

    loop {
        let event = reader.read_event().map_err(|source| FeedError::Xml {
            position: reader.buffer_position() as u64,
            source,
        })?;

        match event {
            Event::Start(element) => {
                let name = element.name();
                match name.as_ref() {
                    b"rss" | b"feed" | b"rdf:RDF" => is_feed = true,
                    b"item" | b"entry" => current = Some(EntryBuilder::default()),
                    tag => {
                        if let Some(builder) = current.as_mut() {
                            builder.collect_media(&element);
                            if field.is_none() {
                                if let Some(kind) = Field::for_tag(tag) {
                                    field = Some((kind, tag.to_vec()));
                                    text.clear();
                                }
                            }
                        }
                    }
                }
            }
            Event::Empty(element) => {
                if let Some(builder) = current.as_mut() {
                    builder.collect_media(&element);
                }
            }
            Event::Text(chunk) if field.is_some() => {
                text.push_str(&decode(&chunk));
            }
            Event::CData(chunk) if field.is_some() => {
                text.push_str(&String::from_utf8_lossy(&chunk));
            }
            Event::GeneralRef(reference) if field.is_some() => {
                let raw = format!("&{};", String::from_utf8_lossy(&reference));
                text.push_str(&decode(raw.as_bytes()));
            }
            Event::End(element) => {
                let name = element.name();
                let closes_field = field
                    .as_ref()
                    .is_some_and(|(_, tag)| tag.as_slice() == name.as_ref());
                if closes_field {
                    if let (Some((kind, _)), Some(builder)) = (field.take(), current.as_mut()) {
                        builder.assign(kind, &text);
                    }
                    text.clear();
                } else if matches!(name.as_ref(), b"item" | b"entry") {
                    if let Some(builder) = current.take() {
                        entries.push(builder.build());
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !is_feed {
        return Err(FeedError::NotAFeed);
    }
    Ok(entries)
}

/// A source backed by an RSS or Atom feed.
#[derive(Debug, Clone)]
pub struct FeedAdapter {
    meta: SourceMeta,
}

impl FeedAdapter {
    pub fn new(meta: SourceMeta) -> Self {
        Self { meta }
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
        let drafts = match self.drafts(&body, &ctx.relevance) {
            Ok(drafts) => drafts,
            Err(e) => {
                debug!(preview = %truncate_for_log(&body, 200), "Unparseable feed body");
                return Err(e.into());
            }
        };
        debug!(relevant = drafts.len(), "Parsed feed");
        Ok(finish(&self.meta, drafts, ctx).await)
    }

    /// Parse `xml` and keep the first `max_entries` entries that have a title
    /// and pass the relevance filter.
    pub fn drafts(&self, xml: &str, relevance: &RelevanceFilter) -> Result<Vec<Draft>, FeedError> {
        let entries = parse_feed(xml)?;
        Ok(entries
            .into_iter()
            .take(self.meta.max_entries)
            .filter(|entry| !entry.title.trim().is_empty())
            .filter(|entry| relevance.is_relevant(&entry.title, &entry.summary))
            .map(|entry| {
                let fragment = entry.summary.contains('<').then(|| entry.summary.clone());
                Draft {
                    title: collapse_whitespace(&entry.title),
                    description: clean_html_content(&entry.summary),
                    published_date: entry.published,
                    image: ImageCandidate {
                        media: entry.media,
                        enclosures: entry.enclosures,
                        links: entry.links,
                        fragment,
                        url: entry.link.clone(),
                    },
                    url: entry.link,
                }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ImageSettings, KeywordSets};
    use crate::fetch::fake::StaticFetch;
    use crate::images::ImageResolver;
    use crate::models::Category;
    use std::time::Duration;

    const RSS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0" xmlns:media="http://search.yahoo.com/mrss/" xmlns:content="http://purl.org/rss/1.0/modules/content/">
<channel>
  <title>Example Tech</title>
  <link>https://tech.test/</link>
  <item>
    <title>New Python framework &amp; toolkit</title>
    <link>https://tech.test/python</link>
    <description><![CDATA[<p>A fresh <b>web</b> framework.</p><img src="https://tech.test/inline.png">]]></description>
    <pubDate>Tue, 14 Oct 2025 09:00:00 +0000</pubDate>
    <media:content url="https://tech.test/python.jpg" medium="image"/>
  </item>
  <item>
    <title>Gardening tips for autumn</title>
    <link>https://tech.test/garden</link>
    <description>Leaves and soil.</description>
    <pubDate>Tue, 14 Oct 2025 08:00:00 +0000</pubDate>
  </item>
  <item>
    <title>Podcast: Rust in production</title>
    <link>https://tech.test/podcast</link>
    <description>Episode notes</description>
    <pubDate>Mon, 13 Oct 2025 08:00:00 +0000</pubDate>
    <enclosure url="https://tech.test/ep.mp3" type="audio/mpeg" length="1"/>
    <enclosure url="https://tech.test/cover.png" type="image/png" length="1"/>
  </item>
  <item>
    <title>   </title>
    <link>https://tech.test/untitled</link>
    <description>python</description>
  </item>
</channel>
</rss>"#;

    const ATOM: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>Dev Posts</title>
  <entry>
    <title>Understanding Kubernetes operators</title>
    <link rel="alternate" type="text/html" href="https://dev.test/k8s"/>
    <link rel="enclosure" type="image/jpeg" href="https://dev.test/k8s.jpg"/>
    <updated>2025-10-12T10:00:00Z</updated>
    <content type="html">&lt;p&gt;Reconcile loops explained.&lt;/p&gt;</content>
  </entry>
</feed>"#;

    fn adapter(max_entries: usize) -> FeedAdapter {
        FeedAdapter::new(SourceMeta {
            key: "tech".to_string(),
            label: "Example Tech".to_string(),
            url: "https://tech.test/feed".to_string(),
            category: Category::Tech,
            max_entries,
        })
    }

    #[test]
    fn test_parse_rss_entries() {
        let entries = parse_feed(RSS).unwrap();
        assert_eq!(entries.len(), 4);

        let first = &entries[0];
        assert_eq!(first.title, "New Python framework & toolkit");
        assert_eq!(first.link, "https://tech.test/python");
        assert!(first.summary.starts_with("<p>A fresh"));
        assert_eq!(first.published, "Tue, 14 Oct 2025 09:00:00 +0000");
        assert_eq!(first.media, ["https://tech.test/python.jpg"]);

        let podcast = &entries[2];
        assert_eq!(podcast.enclosures.len(), 2);
        assert_eq!(podcast.enclosures[1].mime.as_deref(), Some("image/png"));
    }

    #[test]
    fn test_parse_atom_entry() {
        let entries = parse_feed(ATOM).unwrap();
        assert_eq!(entries.len(), 1);
        let entry = &entries[0];
        assert_eq!(entry.link, "https://dev.test/k8s");
        assert_eq!(entry.published, "2025-10-12T10:00:00Z");
        assert_eq!(entry.summary, "<p>Reconcile loops explained.</p>");
        assert_eq!(entry.enclosures[0].href, "https://dev.test/k8s.jpg");
        assert_eq!(entry.links.len(), 2);
    }

    #[test]
    fn test_malformed_xml_is_an_error() {
        let err = parse_feed("<rss><channel><item><title>x</titl></item></channel></rss>").unwrap_err();
        assert!(matches!(err, FeedError::Xml { .. }));
    }

    #[test]
    fn test_non_feed_document_is_rejected() {
        assert!(matches!(parse_feed("<html></html>"), Err(FeedError::NotAFeed)));
        assert!(matches!(parse_feed(""), Err(FeedError::NotAFeed)));
    }

    #[test]
    fn test_drafts_filter_and_clean() {
        let relevance = RelevanceFilter::new(&KeywordSets::default());
        let drafts = adapter(20).drafts(RSS, &relevance).unwrap();
        let titles: Vec<&str> = drafts.iter().map(|d| d.title.as_str()).collect();
        assert_eq!(titles, ["New Python framework & toolkit", "Podcast: Rust in production"]);
        assert_eq!(drafts[0].description, "A fresh web framework.");
        assert!(drafts[0].image.fragment.is_some());
        assert!(drafts[1].image.fragment.is_none());
    }

    #[test]
    fn test_drafts_respect_entry_cap() {
        let relevance = RelevanceFilter::new(&KeywordSets::default());
        let drafts = adapter(1).drafts(RSS, &relevance).unwrap();
        assert_eq!(drafts.len(), 1);
    }

    #[tokio::test]
    async fn test_fetch_builds_articles_with_images() {
        let fetcher = StaticFetch::new().with_page("https://tech.test/feed", RSS);
        let ctx = ScrapeContext {
            pages: fetcher,
            images: ImageResolver::new(StaticFetch::new(), &ImageSettings::default()),
            relevance: RelevanceFilter::new(&KeywordSets::default()),
            fetch_timeout: Duration::from_secs(1),
            image_concurrency: 2,
        };
        let articles = adapter(20).fetch(&ctx).await.unwrap();
        assert_eq!(articles.len(), 2);
        assert_eq!(articles[0].image_url, "https://tech.test/python.jpg");
        assert_eq!(articles[1].image_url, "https://tech.test/cover.png");
        assert!(articles.iter().all(|a| a.category == Category::Tech));
        assert!(articles.iter().all(|a| a.source == "Example Tech"));
        // the source key is stamped later, during aggregation
        assert!(articles.iter().all(|a| a.source_key.is_empty()));
    }
}
