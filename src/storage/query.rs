//! Search, tag filtering and ordering of songs

use std::{cmp::Reverse, convert::Infallible, fmt::Display, str::FromStr};

use feruca::Collator;

use crate::domain::song::Song;

/// Result ordering. Unknown names fall back to [`SortKey::Az`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortKey {
    #[default]
    Az,
    Za,
    Newest,
    Oldest,
}

impl SortKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortKey::Az => "az",
            SortKey::Za => "za",
            SortKey::Newest => "newest",
            SortKey::Oldest => "oldest",
        }
    }
}

impl From<&str> for SortKey {
    fn from(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "za" => SortKey::Za,
            "newest" => SortKey::Newest,
            "oldest" => SortKey::Oldest,
            _ => SortKey::Az,
        }
    }
}

impl FromStr for SortKey {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(SortKey::from(s))
    }
}

impl Display for SortKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A text query, a tag filter and an ordering, evaluated in that order.
///
/// Empty text or an empty tag list disables that filter. Both filters must
/// pass for a song to be kept.
#[derive(Debug, Clone, Default)]
pub struct SearchQuery {
    pub text: String,
    pub sort: SortKey,
    pub tags: Vec<String>,
}

impl SearchQuery {
    pub fn new(text: &str, sort: SortKey, tags: &[String]) -> Self {
        Self {
            text: text.to_string(),
            sort,
            tags: tags.to_vec(),
        }
    }

    /// Runs the query over `songs`, returning matching copies in query order
    pub fn run(&self, songs: &[Song]) -> Vec<Song> {
        let text = self.text.to_lowercase();
        let tags = self
            .tags
            .iter()
            .map(|tag| tag.to_lowercase())
            .collect::<Vec<_>>();

        let mut found = songs
            .iter()
            .filter(|song| text.is_empty() || matches_text(song, &text))
            .filter(|song| tags.is_empty() || matches_any_tag(song, &tags))
            .cloned()
            .collect::<Vec<_>>();

        sort_songs(&mut found, self.sort);
        found
    }
}

/// `needle` must already be lowercase
fn matches_text(song: &Song, needle: &str) -> bool {
    contains_folded(&song.name, needle)
        || contains_folded(&song.composer, needle)
        || contains_folded(&song.lyrics, needle)
        || song.tags.iter().any(|tag| contains_folded(tag, needle))
}

/// Substring match, so the filter "hym" keeps songs tagged "hymn"
fn matches_any_tag(song: &Song, wanted: &[String]) -> bool {
    wanted
        .iter()
        .any(|want| song.tags.iter().any(|tag| contains_folded(tag, want)))
}

fn contains_folded(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(needle)
}

/// Names are compared with the Unicode Collation Algorithm (CLDR root order),
/// so accented letters sort next to their base letter and lowercase precedes
/// uppercase on otherwise equal names.
pub fn sort_songs(songs: &mut [Song], key: SortKey) {
    match key {
        SortKey::Az => {
            let mut collator = Collator::default();
            songs.sort_by(|a, b| collator.collate(a.name.as_str(), b.name.as_str()));
        }
        SortKey::Za => {
            let mut collator = Collator::default();
            songs.sort_by(|a, b| collator.collate(b.name.as_str(), a.name.as_str()));
        }
        SortKey::Newest => songs.sort_by_key(|song| Reverse(song.date)),
        SortKey::Oldest => songs.sort_by_key(|song| song.date),
    }
}
