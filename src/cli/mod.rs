use anyhow::{Context, anyhow, bail};
use clap::{Args, Parser, Subcommand};
use log::error;
use std::path::{Path, PathBuf};

use crate::config;
use crate::domain::{
    audio::AudioBlob,
    song::{NewSong, SongPatch, TagsInput},
};
use crate::storage::{self, catalog::CatalogStore, query::SortKey};

mod render;

/// Shown whenever an audio file cannot be turned into a blob
const AUDIO_READ_FAILED: &str = "Error processing audio file. Please try again.";

#[derive(Parser)]
#[command(name = "songbook")]
#[command(version = "0.1")]
#[command(about = "Song catalog: upload, browse and search songs")]
pub struct Cli {
    /// Path to the config TOML file
    #[arg(short, long, default_value = "songbook.toml")]
    pub config: PathBuf,

    /// Print records as JSON
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List all songs in upload order
    List,
    /// Show one song
    Show { id: String },
    /// Upload a new song
    Add {
        #[command(flatten)]
        fields: SongFields,
        /// Audio file to attach
        #[arg(long)]
        audio: Option<PathBuf>,
    },
    /// Edit an existing song, only the given fields change
    Edit {
        id: String,
        #[command(flatten)]
        fields: SongFields,
        /// Audio file replacing the current one
        #[arg(long)]
        audio: Option<PathBuf>,
    },
    /// Delete a song and its audio
    Delete { id: String },
    /// Attach or replace the audio of a song
    SetAudio { id: String, file: PathBuf },
    /// Write the audio of a song to a file
    ExportAudio { id: String, out: PathBuf },
    /// Search songs by text and tags
    Search {
        /// Matched against name, composer, lyrics and tags
        query: Option<String>,
        /// az, za, newest or oldest
        #[arg(short, long, default_value = "az")]
        sort: String,
        /// Keep songs having a tag containing this, repeatable
        #[arg(short, long = "tag")]
        tags: Vec<String>,
    },
    /// List every tag in use
    Tags,
}

#[derive(Args, Debug, Default)]
pub struct SongFields {
    #[arg(long)]
    pub name: Option<String>,
    #[arg(long)]
    pub composer: Option<String>,
    #[arg(long, conflicts_with = "lyrics_file")]
    pub lyrics: Option<String>,
    /// Read lyrics from a text file
    #[arg(long)]
    pub lyrics_file: Option<PathBuf>,
    /// Comma separated, e.g. "hymn, worship"
    #[arg(long)]
    pub tags: Option<String>,
    #[arg(long)]
    pub demo_text: Option<String>,
}

impl SongFields {
    fn lyrics(&self) -> anyhow::Result<Option<String>> {
        match (&self.lyrics, &self.lyrics_file) {
            (Some(lyrics), _) => Ok(Some(lyrics.clone())),
            (None, Some(path)) => std::fs::read_to_string(path)
                .map(Some)
                .with_context(|| format!("Failed to read lyrics from {}", path.display())),
            (None, None) => Ok(None),
        }
    }

    pub fn into_new_song(self) -> anyhow::Result<NewSong> {
        let lyrics = self.lyrics()?;
        Ok(NewSong {
            name: self.name.unwrap_or_default(),
            composer: self.composer.unwrap_or_default(),
            lyrics: lyrics.unwrap_or_default(),
            tags: self.tags.map(TagsInput::Joined),
            demo_text: self.demo_text,
        })
    }

    pub fn into_patch(self) -> anyhow::Result<SongPatch> {
        let lyrics = self.lyrics()?;
        Ok(SongPatch {
            name: self.name,
            composer: self.composer,
            lyrics,
            tags: self.tags.map(TagsInput::Joined),
            demo_text: self.demo_text,
        })
    }
}

fn read_audio(path: &Path) -> anyhow::Result<AudioBlob> {
    AudioBlob::from_file(path).map_err(|err| {
        error!("{err:#}");
        anyhow!(AUDIO_READ_FAILED)
    })
}

/// Entrypoint for CLI
pub fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = config::Config::load(&cli.config)?;
    let mut catalog =
        storage::open_catalog(&cfg.storage).with_context(|| "Failed to open the catalog")?;

    execute(&mut catalog, cli.command, cli.json)
}

pub fn execute(catalog: &mut CatalogStore, command: Commands, json: bool) -> anyhow::Result<()> {
    match command {
        Commands::List => render::songs(catalog.list(), json)?,

        Commands::Show { id } => {
            let details = catalog
                .get(&id)
                .ok_or(anyhow!("Song {id} not found"))?;
            render::details(&details, json)?;
        }

        Commands::Add { fields, audio } => {
            let audio = audio.as_deref().map(read_audio).transpose()?;
            let song = catalog.create(fields.into_new_song()?, audio)?;
            render::created(&song, json)?;
        }

        Commands::Edit { id, fields, audio } => {
            let audio = audio.as_deref().map(read_audio).transpose()?;
            let patch = fields.into_patch()?;
            if patch.is_empty() && audio.is_none() {
                bail!("Nothing to change, pass at least one field or --audio");
            }

            if !catalog.update(&id, patch)? {
                bail!("Error updating song: {id} not found");
            }
            if let Some(blob) = audio {
                catalog.set_audio(&id, blob)?;
            }
            println!("Song {id} updated");
        }

        Commands::Delete { id } => {
            if !catalog.delete(&id)? {
                bail!("Error deleting song: {id} not found");
            }
            println!("Song {id} deleted");
        }

        Commands::SetAudio { id, file } => {
            let blob = read_audio(&file)?;
            catalog.set_audio(&id, blob)?;
            println!("Audio of {id} set from {}", file.display());
        }

        Commands::ExportAudio { id, out } => {
            let blob = catalog
                .get_audio(&id)
                .ok_or(anyhow!("Song {id} has no audio"))?;
            let decoded = blob.decode()?;
            std::fs::write(&out, &decoded.bytes)
                .with_context(|| format!("Failed to write {}", out.display()))?;
            println!(
                "Wrote {} bytes of {} to {}",
                decoded.bytes.len(),
                decoded.mime,
                out.display()
            );
        }

        Commands::Search { query, sort, tags } => {
            let found = catalog.search(
                query.as_deref().unwrap_or_default(),
                SortKey::from(sort.as_str()),
                &tags,
            );
            render::songs(&found, json)?;
        }

        Commands::Tags => render::tags(&catalog.all_tags(), json)?,
    }

    Ok(())
}
