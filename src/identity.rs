//! Turns art links into identity keys for repost detection.
//!
//! Two links name the same content when they point at the same Pixiv artwork or the same tweet,
//! whatever mirror domain, language prefix or query string was used.

use crate::{
    ordered_set::OrderedSet,
    transport::{Embed, Payload},
};
use regex::Regex;
use std::sync::{Arc, LazyLock};

static PIXIV: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)https?://(?:www\.)?pixiv\.net/(?:[a-z]{2}/)?(?:artworks/|member_illust\.php\?\S*illust_id=)(\d+)",
    )
    .expect("pixiv pattern is valid")
});

static TWITTER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)https?://(?:(?:www|mobile)\.)?(?:twitter|x|fxtwitter|vxtwitter|fixupx)\.com/(\w+)/status(?:es)?/(\d+)",
    )
    .expect("twitter pattern is valid")
});

pub trait IdentityNormalizer: Send + Sync {
    /// Normalized identity of `raw`, or `None` if it is not content we track.
    fn normalize(&self, raw: &str) -> Option<String>;
}

pub type SharedNormalizer = Arc<dyn IdentityNormalizer>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArtSource {
    Pixiv,
    Twitter,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArtLink {
    pub source: ArtSource,
    pub id: String,
    /// Tweet author handle; empty for Pixiv.
    pub author: String,
}

impl ArtLink {
    pub fn identity_key(&self) -> String {
        match self.source {
            ArtSource::Pixiv => format!("pixiv:{}", self.id),
            ArtSource::Twitter => format!("twitter:{}", self.id),
        }
    }

    pub fn canonical_url(&self) -> String {
        match self.source {
            ArtSource::Pixiv => format!("https://www.pixiv.net/en/artworks/{}", self.id),
            ArtSource::Twitter => format!("https://twitter.com/{}/status/{}", self.author, self.id),
        }
    }

    /// Rendered post for this link.  Tweets are left to Discord's own unfurling.
    pub fn render(&self, poster: &str) -> Payload {
        match self.source {
            ArtSource::Pixiv => Payload::embed(
                Embed::new()
                    .title(format!("Pixiv artwork {}", self.id))
                    .url(self.canonical_url())
                    .footer(format!("Posted by {}", poster)),
            ),
            ArtSource::Twitter => {
                Payload::text(format!("{}\nPosted by {}", self.canonical_url(), poster))
            }
        }
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct LinkNormalizer;

impl LinkNormalizer {
    /// Every distinct art link in `content`, in order of appearance.
    pub fn extract(&self, content: &str) -> Vec<ArtLink> {
        let mut found: Vec<(usize, ArtLink)> = Vec::new();

        for caps in PIXIV.captures_iter(content) {
            let start = caps.get(0).map_or(0, |m| m.start());
            found.push((
                start,
                ArtLink {
                    source: ArtSource::Pixiv,
                    id: caps[1].to_owned(),
                    author: String::new(),
                },
            ));
        }
        for caps in TWITTER.captures_iter(content) {
            let start = caps.get(0).map_or(0, |m| m.start());
            found.push((
                start,
                ArtLink {
                    source: ArtSource::Twitter,
                    id: caps[2].to_owned(),
                    author: caps[1].to_owned(),
                },
            ));
        }

        found.sort_by_key(|(start, _)| *start);

        let mut keys = OrderedSet::new();
        found
            .into_iter()
            .map(|(_, link)| link)
            .filter(|link| keys.insert(link.identity_key()))
            .collect()
    }
}

impl IdentityNormalizer for LinkNormalizer {
    fn normalize(&self, raw: &str) -> Option<String> {
        self.extract(raw).first().map(ArtLink::identity_key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pixiv_variants_share_one_identity() {
        let n = LinkNormalizer;
        let expected = Some("pixiv:84534187".to_owned());
        assert_eq!(n.normalize("https://www.pixiv.net/en/artworks/84534187"), expected);
        assert_eq!(n.normalize("https://pixiv.net/artworks/84534187?p=2"), expected);
        assert_eq!(
            n.normalize("http://www.pixiv.net/member_illust.php?mode=medium&illust_id=84534187"),
            expected
        );
    }

    #[test]
    fn twitter_mirrors_share_one_identity() {
        let n = LinkNormalizer;
        let expected = Some("twitter:1258684420011069442".to_owned());
        assert_eq!(
            n.normalize("https://twitter.com/mhy_shima/status/1258684420011069442"),
            expected
        );
        assert_eq!(
            n.normalize("https://x.com/mhy_shima/status/1258684420011069442?s=20"),
            expected
        );
        assert_eq!(
            n.normalize("https://mobile.twitter.com/mhy_shima/statuses/1258684420011069442"),
            expected
        );
    }

    #[test]
    fn other_links_have_no_identity() {
        let n = LinkNormalizer;
        assert_eq!(n.normalize("https://example.com/artworks/1"), None);
        assert_eq!(n.normalize("no links here"), None);
    }

    #[test]
    fn extract_keeps_order_and_drops_duplicates() {
        let links = LinkNormalizer.extract(
            "look https://x.com/a/status/2 and https://www.pixiv.net/en/artworks/1 \
             again https://twitter.com/a/status/2",
        );
        let keys: Vec<String> = links.iter().map(ArtLink::identity_key).collect();
        assert_eq!(keys, vec!["twitter:2".to_owned(), "pixiv:1".to_owned()]);
        assert_eq!(links[0].canonical_url(), "https://twitter.com/a/status/2");
    }
}
