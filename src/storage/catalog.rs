use std::collections::{BTreeMap, BTreeSet};

use chrono::Utc;
use log::{debug, info, warn};
use serde::de::DeserializeOwned;

use crate::{
    domain::{
        audio::AudioBlob,
        song::{NewSong, Song, SongDetails, SongPatch, Timestamp},
    },
    storage::{
        error::StorageError,
        kv::KeyValueStore,
        query::{SearchQuery, SortKey},
        schema::keys,
        seed,
    },
};

/// Owns the songs and their audio blobs, persisting both as full snapshots
/// into a key-value backend after every change.
///
/// Songs keep upload order. Audio lives in its own map keyed by song id so
/// listing songs never drags the payloads along.
pub struct CatalogStore<S: KeyValueStore = Box<dyn KeyValueStore>> {
    kv: S,
    songs: Vec<Song>,
    audio: BTreeMap<String, AudioBlob>,
}

impl<S: KeyValueStore> CatalogStore<S> {
    /// Loads the snapshots and writes the sample songs if the catalog is empty
    pub fn open(kv: S) -> Result<Self, StorageError> {
        Self::open_with(kv, true)
    }

    pub fn open_with(kv: S, seed: bool) -> Result<Self, StorageError> {
        let songs: Vec<Song> = load_snapshot(&kv, keys::SONGS)?;
        let audio: BTreeMap<String, AudioBlob> = load_snapshot(&kv, keys::AUDIO)?;

        let mut store = Self { kv, songs, audio };
        debug!(
            "Loaded {} songs and {} audio blobs",
            store.songs.len(),
            store.audio.len()
        );

        if seed && store.songs.is_empty() {
            info!("Catalog is empty, writing sample songs");
            store.songs = seed::sample_songs();
            store.persist()?;
        }

        Ok(store)
    }

    pub fn backend(&self) -> &S {
        &self.kv
    }

    pub fn len(&self) -> usize {
        self.songs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.songs.is_empty()
    }

    /// Writes both snapshots in full
    fn persist(&mut self) -> Result<(), StorageError> {
        let songs = serde_json::to_string(&self.songs)?;
        let audio = serde_json::to_string(&self.audio)?;
        debug!(
            "Persisting snapshots: {} = {} bytes, {} = {} bytes",
            keys::SONGS,
            songs.len(),
            keys::AUDIO,
            audio.len()
        );
        self.kv.set(keys::SONGS, &songs)?;
        self.kv.set(keys::AUDIO, &audio)?;
        Ok(())
    }

    /// Persists, or undoes the in-memory change with `rollback` when the save
    /// fails. The first snapshot may already be written by then, so the old
    /// state is written back before the error is returned.
    fn persist_or_rollback<F>(&mut self, rollback: F) -> Result<(), StorageError>
    where
        F: FnOnce(&mut Self),
    {
        let Err(err) = self.persist() else {
            return Ok(());
        };

        rollback(self);
        if let Err(restore_err) = self.persist() {
            warn!("Failed to restore snapshots after a failed save: {restore_err}");
        }
        Err(err)
    }

    /// Millisecond creation time, bumped until it collides with no song and
    /// no stray audio entry
    fn next_id(&self, now: Timestamp) -> String {
        let mut candidate = now.timestamp_millis();
        loop {
            let id = candidate.to_string();
            if !self.songs.iter().any(|song| song.id == id) && !self.audio.contains_key(&id) {
                return id;
            }
            candidate += 1;
        }
    }

    pub fn create(
        &mut self,
        input: NewSong,
        audio: Option<AudioBlob>,
    ) -> Result<Song, StorageError> {
        let now = Utc::now();
        let song = Song::from_new(self.next_id(now), now, input);

        // next_id never hands out a key already present in the audio map
        let with_audio = audio.is_some();
        if let Some(blob) = audio {
            self.audio.insert(song.id.clone(), blob);
        }
        self.songs.push(song.clone());
        self.persist_or_rollback(|store| {
            store.songs.pop();
            if with_audio {
                store.audio.remove(&song.id);
            }
        })?;

        info!("Created song {} '{}'", song.id, song.name);
        Ok(song)
    }

    /// All songs in upload order
    pub fn list(&self) -> &[Song] {
        &self.songs
    }

    /// The song together with its audio, if any
    pub fn get(&self, id: &str) -> Option<SongDetails> {
        self.songs
            .iter()
            .find(|song| song.id == id)
            .map(|song| SongDetails {
                song: song.clone(),
                audio_data: self.audio.get(id).cloned(),
            })
    }

    /// Returns false, leaving everything untouched, when no song has this id
    pub fn update(&mut self, id: &str, patch: SongPatch) -> Result<bool, StorageError> {
        let Some(index) = self.songs.iter().position(|song| song.id == id) else {
            debug!("Update of unknown song {id} ignored");
            return Ok(false);
        };

        let previous = self.songs[index].clone();
        self.songs[index].apply(patch, Utc::now());
        self.persist_or_rollback(|store| store.songs[index] = previous)?;

        info!("Updated song {id}");
        Ok(true)
    }

    /// Removes the song and its audio. Returns false if there was no such song.
    pub fn delete(&mut self, id: &str) -> Result<bool, StorageError> {
        let Some(index) = self.songs.iter().position(|song| song.id == id) else {
            debug!("Delete of unknown song {id} ignored");
            return Ok(false);
        };

        let removed = self.songs.remove(index);
        let removed_audio = self.audio.remove(id);
        self.persist_or_rollback(|store| {
            store.songs.insert(index, removed);
            if let Some(blob) = removed_audio {
                store.audio.insert(id.to_string(), blob);
            }
        })?;

        info!("Deleted song {id}");
        Ok(true)
    }

    /// Sets or replaces the audio of `id`. The song itself is not required to
    /// exist.
    pub fn set_audio(&mut self, id: &str, blob: AudioBlob) -> Result<(), StorageError> {
        if !self.songs.iter().any(|song| song.id == id) {
            warn!("Storing audio for {id}, which is not a known song");
        }

        info!("Setting audio of {id} ({} bytes)", blob.len());
        let previous = self.audio.insert(id.to_string(), blob);
        self.persist_or_rollback(|store| match previous {
            Some(blob) => {
                store.audio.insert(id.to_string(), blob);
            }
            None => {
                store.audio.remove(id);
            }
        })
    }

    pub fn get_audio(&self, id: &str) -> Option<&AudioBlob> {
        self.audio.get(id)
    }

    /// Text search, then tag filter, then ordering. See [`SearchQuery`].
    pub fn search(&self, query: &str, sort: SortKey, tags: &[String]) -> Vec<Song> {
        let found = SearchQuery::new(query, sort, tags).run(&self.songs);
        debug!(
            "Search '{query}' sort={sort} tags={tags:?}: {} of {} songs",
            found.len(),
            self.songs.len()
        );
        found
    }

    /// Every distinct tag, ordered by UTF-16 code units
    pub fn all_tags(&self) -> Vec<String> {
        let mut tags = self
            .songs
            .iter()
            .flat_map(|song| song.tags.iter().cloned())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect::<Vec<_>>();
        tags.sort_by(|a, b| a.encode_utf16().cmp(b.encode_utf16()));
        tags
    }
}

/// A missing key reads as an empty snapshot; an unreadable one is fatal
fn load_snapshot<S, T>(kv: &S, key: &str) -> Result<T, StorageError>
where
    S: KeyValueStore,
    T: DeserializeOwned + Default,
{
    match kv.get(key)? {
        Some(raw) => serde_json::from_str(&raw).map_err(|source| StorageError::CorruptSnapshot {
            key: key.to_string(),
            source,
        }),
        None => Ok(T::default()),
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use tempfile::tempdir;

    use crate::{
        domain::{
            audio::AudioBlob,
            song::{NewSong, SongPatch, TagsInput},
        },
        storage::{
            catalog::CatalogStore,
            db::SqliteStore,
            error::StorageError,
            fs::DirectoryStore,
            kv::{KeyValueStore, MemoryStore},
            query::SortKey,
            schema::keys,
        },
    };

    fn seeded() -> anyhow::Result<CatalogStore<MemoryStore>> {
        Ok(CatalogStore::open(MemoryStore::new())?)
    }

    fn empty() -> anyhow::Result<CatalogStore<MemoryStore>> {
        Ok(CatalogStore::open_with(MemoryStore::new(), false)?)
    }

    fn new_song(name: &str, tags: &str) -> NewSong {
        NewSong {
            name: name.to_string(),
            composer: "Anonymous".to_string(),
            lyrics: "La la la".to_string(),
            tags: Some(TagsInput::from(tags)),
            demo_text: None,
        }
    }

    fn snapshot(store: &CatalogStore<MemoryStore>) -> anyhow::Result<(String, String)> {
        let kv = store.backend();
        Ok((
            kv.get(keys::SONGS)?.unwrap_or_default(),
            kv.get(keys::AUDIO)?.unwrap_or_default(),
        ))
    }

    fn names(songs: &[crate::domain::song::Song]) -> Vec<&str> {
        songs.iter().map(|s| s.name.as_str()).collect()
    }

    #[test]
    fn test_open_seeds_empty_catalog() -> anyhow::Result<()> {
        let store = seeded()?;

        assert_eq!(store.len(), 3);
        let (songs, audio) = snapshot(&store)?;
        assert!(songs.contains("Amazing Grace"));
        assert_eq!(audio, "{}");

        Ok(())
    }

    #[test]
    fn test_open_without_seed_stays_empty() -> anyhow::Result<()> {
        let store = empty()?;

        assert!(store.is_empty());
        assert_eq!(store.backend().get(keys::SONGS)?, None);

        Ok(())
    }

    #[test]
    fn test_open_does_not_reseed_existing_catalog() -> anyhow::Result<()> {
        let mut store = empty()?;
        store.create(new_song("Only One", ""), None)?;

        let kv = store.backend().clone();
        let reopened = CatalogStore::open(kv)?;

        assert_eq!(names(reopened.list()), vec!["Only One"]);
        Ok(())
    }

    #[test]
    fn test_create_assigns_id_date_and_normalizes_tags() -> anyhow::Result<()> {
        let mut store = empty()?;
        let before = Utc::now();

        let song = store.create(new_song("Psalm 23", "a, b , b"), None)?;

        assert_eq!(song.tags, vec!["a", "b", "b"]);
        assert_eq!(song.demo_text, "Demo song");
        assert!(song.date >= before);
        assert_eq!(song.last_modified, None);
        assert_eq!(store.list(), &[song.clone()]);

        let reopened = CatalogStore::open(store.backend().clone())?;
        assert_eq!(reopened.list(), &[song]);

        Ok(())
    }

    #[test]
    fn test_create_ids_are_unique() -> anyhow::Result<()> {
        let mut store = seeded()?;

        for i in 0..20 {
            store.create(new_song(&format!("Song {i}"), ""), None)?;
        }

        let mut ids: Vec<_> = store.list().iter().map(|s| s.id.clone()).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 23);

        Ok(())
    }

    #[test]
    fn test_create_id_skips_stray_audio_entry() -> anyhow::Result<()> {
        let mut store = empty()?;
        let now = Utc::now();
        let taken = now.timestamp_millis().to_string();
        store.set_audio(&taken, AudioBlob("data:audio/mpeg;base64,AA==".into()))?;

        assert_ne!(store.next_id(now), taken);
        Ok(())
    }

    #[test]
    fn test_create_with_audio_stores_it_separately() -> anyhow::Result<()> {
        let mut store = empty()?;
        let blob = AudioBlob::from_bytes(b"riff", "audio/wav");

        let song = store.create(new_song("With Audio", "demo"), Some(blob.clone()))?;

        assert_eq!(store.get_audio(&song.id), Some(&blob));

        let details = store.get(&song.id).unwrap();
        assert_eq!(details.song, song);
        assert_eq!(details.audio_data, Some(blob));

        let (songs, audio) = snapshot(&store)?;
        assert!(!songs.contains("base64"));
        assert!(audio.contains(&song.id));

        Ok(())
    }

    #[test]
    fn test_get_unknown_and_without_audio() -> anyhow::Result<()> {
        let store = seeded()?;

        assert!(store.get("missing").is_none());
        let details = store.get("2").unwrap();
        assert_eq!(details.song.name, "How Great Thou Art");
        assert_eq!(details.audio_data, None);

        Ok(())
    }

    #[test]
    fn test_update_unknown_id_changes_nothing() -> anyhow::Result<()> {
        let mut store = seeded()?;
        let before = snapshot(&store)?;

        let updated = store.update(
            "nope",
            SongPatch {
                name: Some("Changed".into()),
                ..Default::default()
            },
        )?;

        assert!(!updated);
        assert_eq!(snapshot(&store)?, before);
        assert_eq!(store.len(), 3);

        Ok(())
    }

    #[test]
    fn test_update_preserves_id_and_date() -> anyhow::Result<()> {
        let mut store = seeded()?;
        let patch: SongPatch =
            serde_json::from_str(r#"{"id": "other", "date": "2000-01-01T00:00:00Z"}"#)?;

        assert!(store.update("1", patch)?);

        let song = store.get("1").unwrap().song;
        assert_eq!(song.id, "1");
        assert_eq!(
            song.date,
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
        );
        assert!(song.last_modified.is_some());
        assert!(store.get("other").is_none());

        Ok(())
    }

    #[test]
    fn test_update_merges_patch_and_persists() -> anyhow::Result<()> {
        let mut store = seeded()?;

        assert!(store.update(
            "3",
            SongPatch {
                lyrics: Some("New verse".into()),
                tags: Some(" peace ,, calm".into()),
                ..Default::default()
            },
        )?);

        let reopened = CatalogStore::open(store.backend().clone())?;
        let song = reopened.get("3").unwrap().song;
        assert_eq!(song.name, "It Is Well");
        assert_eq!(song.lyrics, "New verse");
        assert_eq!(song.tags, vec!["peace", "calm"]);
        assert_eq!(song.demo_text, "Demo song");
        assert!(song.last_modified.is_some());

        Ok(())
    }

    #[test]
    fn test_delete_removes_song_and_audio() -> anyhow::Result<()> {
        let mut store = seeded()?;
        store.set_audio("2", AudioBlob::from_bytes(b"ogg", "audio/ogg"))?;

        assert!(store.delete("2")?);
        assert!(store.get("2").is_none());
        assert!(store.get_audio("2").is_none());
        assert_eq!(store.len(), 2);

        assert!(!store.delete("2")?);

        let (_, audio) = snapshot(&store)?;
        assert_eq!(audio, "{}");

        Ok(())
    }

    #[test]
    fn test_set_audio_replaces_and_allows_unknown_ids() -> anyhow::Result<()> {
        let mut store = seeded()?;

        store.set_audio("1", AudioBlob("first".into()))?;
        store.set_audio("1", AudioBlob("second".into()))?;
        store.set_audio("ghost", AudioBlob("orphan".into()))?;

        assert_eq!(store.get_audio("1"), Some(&AudioBlob("second".into())));
        assert_eq!(store.get_audio("ghost"), Some(&AudioBlob("orphan".into())));
        assert!(store.get("ghost").is_none());

        let reopened = CatalogStore::open(store.backend().clone())?;
        assert_eq!(reopened.get_audio("1"), Some(&AudioBlob("second".into())));

        Ok(())
    }

    #[test]
    fn test_search_orders_seeded_songs() -> anyhow::Result<()> {
        let store = seeded()?;

        let newest = store.search("", SortKey::Newest, &[]);
        assert_eq!(
            names(&newest),
            vec!["It Is Well", "How Great Thou Art", "Amazing Grace"]
        );

        let az = store.search("", SortKey::Az, &[]);
        assert_eq!(
            names(&az),
            vec!["Amazing Grace", "How Great Thou Art", "It Is Well"]
        );

        let oldest = store.search("", SortKey::Oldest, &[]);
        assert_eq!(names(&oldest), names(&az));

        let za = store.search("", SortKey::Za, &[]);
        assert_eq!(
            names(&za),
            vec!["It Is Well", "How Great Thou Art", "Amazing Grace"]
        );

        Ok(())
    }

    #[test]
    fn test_search_text_on_seeded_songs() -> anyhow::Result<()> {
        let store = seeded()?;

        let found = store.search("grace", SortKey::Az, &[]);
        assert_eq!(names(&found), vec!["Amazing Grace"]);

        // lyrics of song 2 and 3 both mention "thou"
        let found = store.search("THOU", SortKey::Az, &[]);
        assert_eq!(names(&found), vec!["How Great Thou Art", "It Is Well"]);

        Ok(())
    }

    #[test]
    fn test_search_tag_filter_on_seeded_songs() -> anyhow::Result<()> {
        let store = seeded()?;

        let found = store.search("", SortKey::Az, &["hym".to_string()]);
        assert_eq!(found.len(), 3);

        let found = store.search("", SortKey::Az, &["peace".to_string(), "tradition".to_string()]);
        assert_eq!(names(&found), vec!["How Great Thou Art", "It Is Well"]);

        let found = store.search("grace", SortKey::Az, &["peace".to_string()]);
        assert!(found.is_empty());

        Ok(())
    }

    #[test]
    fn test_search_leaves_stored_order() -> anyhow::Result<()> {
        let mut store = empty()?;
        store.create(new_song("Zion", ""), None)?;
        store.create(new_song("Abide", ""), None)?;

        let _ = store.search("", SortKey::Az, &[]);
        assert_eq!(names(store.list()), vec!["Zion", "Abide"]);

        Ok(())
    }

    #[test]
    fn test_all_tags_sorted_and_distinct() -> anyhow::Result<()> {
        let store = seeded()?;

        assert_eq!(
            store.all_tags(),
            vec!["classic", "hymn", "peace", "traditional", "worship"]
        );

        Ok(())
    }

    #[test]
    fn test_all_tags_order_by_utf16_units() -> anyhow::Result<()> {
        let mut store = empty()?;
        // U+FF21 is a single unit, the emoji starts with surrogate 0xD83D
        store.create(new_song("Wide", "\u{FF21}, hymn"), None)?;
        store.create(new_song("Smile", "\u{1F600}, hymn"), None)?;

        assert_eq!(store.all_tags(), vec!["hymn", "\u{1F600}", "\u{FF21}"]);

        Ok(())
    }

    /// Memory store whose writes to the listed keys fail
    #[derive(Default)]
    struct FlakyStore {
        inner: MemoryStore,
        failing: Vec<&'static str>,
    }

    impl KeyValueStore for FlakyStore {
        fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
            self.inner.get(key)
        }

        fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
            if self.failing.iter().any(|failing| *failing == key) {
                return Err(StorageError::Internal(anyhow::anyhow!(
                    "disk full writing {key}"
                )));
            }
            self.inner.set(key, value)
        }

        fn remove(&mut self, key: &str) -> Result<(), StorageError> {
            self.inner.remove(key)
        }
    }

    fn flaky_seeded() -> anyhow::Result<CatalogStore<FlakyStore>> {
        let mut store = CatalogStore::open(FlakyStore::default())?;
        store.set_audio("1", AudioBlob("first".into()))?;
        Ok(store)
    }

    fn stored(store: &CatalogStore<FlakyStore>) -> anyhow::Result<(String, String)> {
        let kv = &store.backend().inner;
        Ok((
            kv.get(keys::SONGS)?.unwrap_or_default(),
            kv.get(keys::AUDIO)?.unwrap_or_default(),
        ))
    }

    #[test]
    fn test_failed_save_leaves_catalog_unchanged() -> anyhow::Result<()> {
        let mut store = flaky_seeded()?;
        let before = stored(&store)?;
        let songs_before = store.list().to_vec();
        store.kv.failing = vec![keys::SONGS, keys::AUDIO];

        assert!(store.create(new_song("Ghost", ""), None).is_err());
        assert_eq!(store.list(), songs_before.as_slice());

        let patch = SongPatch {
            name: Some("Changed".into()),
            ..Default::default()
        };
        assert!(store.update("1", patch).is_err());
        let song = store.get("1").unwrap().song;
        assert_eq!(song.name, "Amazing Grace");
        assert_eq!(song.last_modified, None);

        assert!(store.delete("1").is_err());
        assert_eq!(store.list(), songs_before.as_slice());
        assert_eq!(store.get_audio("1"), Some(&AudioBlob("first".into())));

        assert!(store.set_audio("1", AudioBlob("second".into())).is_err());
        assert!(store.set_audio("2", AudioBlob("new".into())).is_err());
        assert_eq!(store.get_audio("1"), Some(&AudioBlob("first".into())));
        assert_eq!(store.get_audio("2"), None);

        assert_eq!(stored(&store)?, before);

        Ok(())
    }

    #[test]
    fn test_half_written_save_is_restored() -> anyhow::Result<()> {
        let mut store = flaky_seeded()?;
        let before = stored(&store)?;
        store.kv.failing = vec![keys::AUDIO];

        // the songs snapshot goes through, the audio one does not
        let created = store.create(new_song("Ghost", ""), Some(AudioBlob("boo".into())));
        assert!(created.is_err());
        assert_eq!(store.len(), 3);
        assert_eq!(stored(&store)?, before);

        store.kv.failing.clear();
        let reopened = CatalogStore::open(store.kv.inner.clone())?;
        assert!(reopened.search("ghost", SortKey::Az, &[]).is_empty());

        Ok(())
    }

    #[test]
    fn test_corrupt_snapshot_is_fatal() -> anyhow::Result<()> {
        let mut kv = MemoryStore::new();
        kv.set(keys::SONGS, "{not json")?;

        match CatalogStore::open(kv) {
            Err(StorageError::CorruptSnapshot { key, .. }) => assert_eq!(key, keys::SONGS),
            Err(other) => panic!("unexpected error {other}"),
            Ok(_) => panic!("corrupt snapshot was accepted"),
        }

        Ok(())
    }

    #[test]
    fn test_reads_snapshot_written_by_browser_version() -> anyhow::Result<()> {
        let mut kv = MemoryStore::new();
        kv.set(
            keys::SONGS,
            r#"[{"id":"1712000000000","name":"Shalom","composer":"Trad.","lyrics":"",
                 "tags":["round"],"date":"2024-04-01T19:33:20.000Z",
                 "lastModified":"2024-04-02T08:00:00.000Z","demoText":""}]"#,
        )?;
        kv.set(keys::AUDIO, r#"{"1712000000000":"data:audio/mpeg;base64,SUQz"}"#)?;

        let store = CatalogStore::open(kv)?;

        assert_eq!(store.len(), 1);
        let details = store.get("1712000000000").unwrap();
        assert_eq!(details.song.tags, vec!["round"]);
        assert!(details.song.last_modified.is_some());
        assert_eq!(details.audio_data.unwrap().decode()?.bytes, b"ID3");

        Ok(())
    }

    #[test]
    fn test_directory_backend_round_trip() -> anyhow::Result<()> {
        let tmp = tempdir()?;

        let id = {
            let mut store = CatalogStore::open(DirectoryStore::open(tmp.path())?)?;
            let song = store.create(new_song("Kept", "disk"), Some(AudioBlob("blob".into())))?;
            song.id
        };

        let store = CatalogStore::open(DirectoryStore::open(tmp.path())?)?;
        assert_eq!(store.len(), 4);
        assert_eq!(store.get_audio(&id), Some(&AudioBlob("blob".into())));
        assert!(tmp.path().join("songs.json").is_file());
        assert!(tmp.path().join("audioData.json").is_file());

        Ok(())
    }

    #[test]
    fn test_sqlite_backend_behind_trait_object() -> anyhow::Result<()> {
        let tmp = tempdir()?;
        let path = tmp.path().join("songbook.db");

        {
            let kv: Box<dyn KeyValueStore> = Box::new(SqliteStore::open(&path)?);
            let mut store: CatalogStore = CatalogStore::open(kv)?;
            assert!(store.delete("1")?);
        }

        let kv: Box<dyn KeyValueStore> = Box::new(SqliteStore::open(&path)?);
        let store: CatalogStore = CatalogStore::open(kv)?;
        assert_eq!(names(store.list()), vec!["How Great Thou Art", "It Is Well"]);

        Ok(())
    }
}
