use lofty::{AudioFile, ItemKey, TaggedFileExt};
use std::path::{Path, PathBuf};

/// Tag data pulled from an uploaded audio file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AudioTags {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub genre: Option<String>,
    pub track_number: Option<i64>,
    pub duration_secs: Option<i64>,
}

fn text(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|s| !s.is_empty()).map(str::to_string)
}

/// "3/12" style track numbers keep only the first part.
fn track_number(raw: &str) -> Option<i64> {
    raw.split('/').next()?.trim().parse().ok()
}

fn from_tag(tag: &lofty::Tag) -> AudioTags {
    let mut tags = AudioTags::default();
    for item in tag.items() {
        let value = item.value().text();
        match item.key() {
            ItemKey::TrackTitle => tags.title = text(value),
            ItemKey::TrackArtist => tags.artist = text(value),
            ItemKey::AlbumArtist if tags.artist.is_none() => tags.artist = text(value),
            ItemKey::AlbumTitle => tags.album = text(value),
            ItemKey::Genre => tags.genre = text(value),
            ItemKey::TrackNumber => tags.track_number = value.and_then(track_number),
            _ => {}
        }
    }
    tags
}

/// Reads tags and duration. Unreadable or untagged files give `None`.
pub fn read_tags(path: &Path) -> Option<AudioTags> {
    let tagged_file = match lofty::read_from_path(path) {
        Ok(file) => file,
        Err(e) => {
            tracing::debug!(path = %path.display(), "No readable tags: {}", e);
            return None;
        }
    };

    let mut tags = tagged_file
        .primary_tag()
        .or_else(|| tagged_file.tags().first())
        .map(from_tag)
        .unwrap_or_default();

    let duration = tagged_file.properties().duration().as_secs();
    if duration > 0 {
        tags.duration_secs = Some(duration as i64);
    }

    Some(tags)
}

pub async fn read_tags_async(path: PathBuf) -> Option<AudioTags> {
    tokio::task::spawn_blocking(move || read_tags(&path))
        .await
        .ok()
        .flatten()
}
