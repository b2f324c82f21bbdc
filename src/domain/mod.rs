pub mod audio;
pub mod song;
