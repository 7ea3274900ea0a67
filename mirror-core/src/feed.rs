use std::io::Cursor;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{MirrorError, Result};

/// One entry of the mirrored listing. `link` is the stable key shared by every
/// language variant of the same article.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Article {
    pub id: String,
    pub title: String,
    pub snippet: String,
    pub link: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

impl Article {
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        snippet: impl Into<String>,
        link: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            snippet: snippet.into(),
            link: link.into(),
            image_url: None,
        }
    }

    pub fn from_rss_item(item: &rss::Item) -> Option<Self> {
        let link = item.link().map(str::to_owned)?;
        let id = item
            .guid()
            .map(|guid| guid.value().to_owned())
            .unwrap_or_else(|| link.clone());
        let base = Url::parse(&link).ok();
        let image_url = item
            .enclosure()
            .filter(|enclosure| enclosure.mime_type().starts_with("image/"))
            .and_then(|enclosure| normalize_image_url(enclosure.url(), base.as_ref()));

        Some(Self {
            id,
            title: item.title().unwrap_or_default().to_owned(),
            snippet: item.description().unwrap_or_default().to_owned(),
            link,
            image_url,
        })
    }

    pub fn from_atom_entry(entry: &atom_syndication::Entry) -> Option<Self> {
        // Blogger-style feeds list several links; the alternate one is the page.
        let link = entry
            .links()
            .iter()
            .find(|link| link.rel() == "alternate")
            .or_else(|| entry.links().first())
            .map(|link| link.href().to_owned())?;
        let base = Url::parse(&link).ok();
        let image_url = entry
            .links()
            .iter()
            .find(|link| {
                link.rel() == "enclosure"
                    && link.mime_type().is_some_and(|mime| mime.starts_with("image/"))
            })
            .and_then(|link| normalize_image_url(link.href(), base.as_ref()));
        let snippet = entry
            .summary()
            .map(|text| text.value.clone())
            .or_else(|| {
                entry
                    .content()
                    .and_then(|content| content.value().map(str::to_owned))
            })
            .unwrap_or_default();

        Some(Self {
            id: entry.id().to_owned(),
            title: entry.title().value.clone(),
            snippet,
            link,
            image_url,
        })
    }
}

/// Parses a feed document, trying RSS 2.0 first and Atom second. Items without
/// a link cannot be joined across languages and are skipped.
pub fn parse_feed(body: Bytes) -> Result<Vec<Article>> {
    match rss::Channel::read_from(Cursor::new(body.as_ref())) {
        Ok(channel) => Ok(channel
            .items()
            .iter()
            .filter_map(Article::from_rss_item)
            .collect()),
        Err(rss_err) => match atom_syndication::Feed::read_from(Cursor::new(body.as_ref())) {
            Ok(feed) => Ok(feed
                .entries()
                .iter()
                .filter_map(Article::from_atom_entry)
                .collect()),
            Err(atom_err) => Err(MirrorError::Parse(format!(
                "not an RSS ({rss_err}) or Atom ({atom_err}) document"
            ))),
        },
    }
}

/// Resolves an image reference found on a page. Protocol-relative URLs get
/// `https:`; anything that does not end up as http(s) is dropped.
pub fn normalize_image_url(raw: &str, base: Option<&Url>) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    let resolved = if let Some(rest) = raw.strip_prefix("//") {
        Url::parse(&format!("https://{rest}")).ok()?
    } else {
        match Url::parse(raw) {
            Ok(url) => url,
            Err(url::ParseError::RelativeUrlWithoutBase) => base?.join(raw).ok()?,
            Err(_) => return None,
        }
    };
    matches!(resolved.scheme(), "http" | "https").then(|| resolved.to_string())
}
