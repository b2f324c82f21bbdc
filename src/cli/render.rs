//! Text and JSON output of the CLI

use serde::Serialize;

use crate::domain::song::{Song, SongDetails};

fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn date_line(song: &Song) -> String {
    let created = song.date.format("%Y-%m-%d %H:%M");
    match song.last_modified {
        Some(modified) => format!("{created} (edited {})", modified.format("%Y-%m-%d %H:%M")),
        None => created.to_string(),
    }
}

pub fn songs(songs: &[Song], json: bool) -> anyhow::Result<()> {
    if json {
        return print_json(songs);
    }

    if songs.is_empty() {
        println!("No songs found");
        return Ok(());
    }

    for song in songs {
        println!("[{}] {}", song.id, song.display_title());
        if !song.tags.is_empty() {
            println!("  tags: {}", song.tags.join(", "));
        }
        println!("  added: {}", date_line(song));
    }
    Ok(())
}

pub fn details(details: &SongDetails, json: bool) -> anyhow::Result<()> {
    if json {
        return print_json(details);
    }

    let song = &details.song;
    println!("[{}] {}", song.id, song.name);
    println!("Composer: {}", song.composer);
    println!("Tags: {}", song.tags.join(", "));
    println!("Added: {}", date_line(song));
    println!("Demo: {}", song.demo_text);
    match &details.audio_data {
        Some(blob) => println!("Audio: {blob}"),
        None => println!("Audio: none"),
    }
    println!();
    for line in song.lyrics.lines() {
        println!("    {line}");
    }
    Ok(())
}

pub fn created(song: &Song, json: bool) -> anyhow::Result<()> {
    if json {
        return print_json(song);
    }
    println!("Song uploaded with id {}", song.id);
    Ok(())
}

pub fn tags(tags: &[String], json: bool) -> anyhow::Result<()> {
    if json {
        return print_json(tags);
    }
    for tag in tags {
        println!("{tag}");
    }
    Ok(())
}
