//! Sample songs written into a fresh, empty catalog

use chrono::{TimeZone, Utc};

use crate::domain::song::{DEFAULT_DEMO_TEXT, Song, Timestamp};

fn new_year_day(day: u32) -> Timestamp {
    Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0)
        .single()
        .unwrap_or_default()
}

fn sample(id: &str, name: &str, composer: &str, lyrics: &str, tags: &[&str], day: u32) -> Song {
    Song {
        id: id.to_string(),
        name: name.to_string(),
        composer: composer.to_string(),
        lyrics: lyrics.to_string(),
        tags: tags.iter().map(|tag| tag.to_string()).collect(),
        date: new_year_day(day),
        last_modified: None,
        demo_text: DEFAULT_DEMO_TEXT.to_string(),
    }
}

pub fn sample_songs() -> Vec<Song> {
    vec![
        sample(
            "1",
            "Amazing Grace",
            "John Newton",
            "Amazing grace, how sweet the sound\n\
             That saved a wretch like me.\n\
             I once was lost, but now am found,\n\
             Was blind, but now I see.",
            &["hymn", "classic", "worship"],
            1,
        ),
        sample(
            "2",
            "How Great Thou Art",
            "Carl Boberg",
            "O Lord my God, when I in awesome wonder\n\
             Consider all the worlds Thy hands have made,\n\
             I see the stars, I hear the rolling thunder,\n\
             Thy power throughout the universe displayed.",
            &["hymn", "worship", "traditional"],
            2,
        ),
        sample(
            "3",
            "It Is Well",
            "Horatio Spafford",
            "When peace like a river attendeth my way,\n\
             When sorrows like sea billows roll,\n\
             Whatever my lot, Thou hast taught me to say,\n\
             It is well, it is well with my soul.",
            &["hymn", "peace", "classic"],
            3,
        ),
    ]
}
