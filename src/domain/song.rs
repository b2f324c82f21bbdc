use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use super::audio::AudioBlob;

pub type Timestamp = DateTime<Utc>;

/// Shown on the song card when no demo text was provided
pub const DEFAULT_DEMO_TEXT: &str = "Demo song";

/// Represent a catalog song
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Song {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub composer: String,
    #[serde(default)]
    pub lyrics: String,
    #[serde(default, deserialize_with = "deserialize_tags")]
    pub tags: Vec<String>,
    /// Creation time, never changes after the song is created
    pub date: Timestamp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<Timestamp>,
    #[serde(default)]
    pub demo_text: String,
}

/// Tags as they come from a form: either one comma separated field or a
/// ready list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TagsInput {
    Joined(String),
    List(Vec<String>),
}

impl TagsInput {
    /// Splits joined tags on commas, trims them and drops the empty ones.
    /// Lists are kept as given, duplicates included.
    pub fn normalize(self) -> Vec<String> {
        match self {
            TagsInput::Joined(joined) => joined
                .split(',')
                .map(str::trim)
                .filter(|tag| !tag.is_empty())
                .map(str::to_string)
                .collect(),
            TagsInput::List(tags) => tags,
        }
    }
}

impl From<&str> for TagsInput {
    fn from(joined: &str) -> Self {
        TagsInput::Joined(joined.to_string())
    }
}

impl From<Vec<String>> for TagsInput {
    fn from(tags: Vec<String>) -> Self {
        TagsInput::List(tags)
    }
}

fn deserialize_tags<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let tags = Option::<TagsInput>::deserialize(deserializer)?;
    Ok(tags.map(TagsInput::normalize).unwrap_or_default())
}

/// Fields supplied when uploading a song. Id and creation date are assigned
/// by the store.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NewSong {
    pub name: String,
    pub composer: String,
    pub lyrics: String,
    pub tags: Option<TagsInput>,
    pub demo_text: Option<String>,
}

/// Partial update of a song. Only the fields listed here can change; anything
/// else in a deserialized patch (an `id`, a `date`) is ignored.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SongPatch {
    pub name: Option<String>,
    pub composer: Option<String>,
    pub lyrics: Option<String>,
    pub tags: Option<TagsInput>,
    pub demo_text: Option<String>,
}

impl SongPatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.composer.is_none()
            && self.lyrics.is_none()
            && self.tags.is_none()
            && self.demo_text.is_none()
    }
}

/// A song joined with its audio at read time
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SongDetails {
    #[serde(flatten)]
    pub song: Song,
    pub audio_data: Option<AudioBlob>,
}

impl Song {
    pub fn from_new(id: String, date: Timestamp, new: NewSong) -> Self {
        Self {
            id,
            name: new.name,
            composer: new.composer,
            lyrics: new.lyrics,
            tags: new.tags.map(TagsInput::normalize).unwrap_or_default(),
            date,
            last_modified: None,
            demo_text: demo_text_or_default(new.demo_text.as_deref(), None),
        }
    }

    /// Applies a patch over this record, keeping its identity and creation date
    pub fn apply(&mut self, patch: SongPatch, now: Timestamp) {
        if let Some(name) = patch.name {
            self.name = name;
        }
        if let Some(composer) = patch.composer {
            self.composer = composer;
        }
        if let Some(lyrics) = patch.lyrics {
            self.lyrics = lyrics;
        }
        if let Some(tags) = patch.tags {
            self.tags = tags.normalize();
        }
        self.demo_text =
            demo_text_or_default(patch.demo_text.as_deref(), Some(self.demo_text.as_str()));
        self.last_modified = Some(now);
    }

    pub fn display_title(&self) -> String {
        if self.composer.trim().is_empty() {
            self.name.clone()
        } else {
            format!("{} - {}", self.name, self.composer)
        }
    }
}

fn demo_text_or_default(given: Option<&str>, existing: Option<&str>) -> String {
    [given, existing]
        .into_iter()
        .flatten()
        .find(|text| !text.is_empty())
        .unwrap_or(DEFAULT_DEMO_TEXT)
        .to_string()
}
