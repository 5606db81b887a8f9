use std::str::FromStr;
use std::sync::Arc;

use indicatif::ProgressBar;
use lofty::file::{AudioFile, TaggedFileExt};
use lofty::picture::{MimeType, Picture, PictureType};
use lofty::probe::Probe;
use lofty::tag::{Accessor, ItemKey, ItemValue, TagExt, TagItem};

use crate::domain::canonical_track::CanonicalTrack;
use crate::repository::Registry;
use crate::services::EmbeddingError;

pub struct Embedder {
    registry: Arc<Registry>,
    http: reqwest::Client,
}

impl Embedder {
    pub fn new(registry: Arc<Registry>, http: reqwest::Client) -> Self {
        Self { registry, http }
    }

    pub async fn run_pending(&self, progress: &ProgressBar) -> Result<usize, EmbeddingError> {
        let tracks = self.registry.tracks_needing_embedding().await?;
        progress.set_length(tracks.len() as u64);
        let mut embedded = 0;

        for track in tracks {
            match self.embed_one(&track).await {
                Ok(()) => embedded += 1,
                Err(err) => log::error!(
                    "embedding failed for '{}' by '{}': {err}",
                    track.metadata.name,
                    track.metadata.primary_artist
                ),
            }
            progress.inc(1);
        }

        Ok(embedded)
    }

    async fn embed_one(&self, track: &CanonicalTrack) -> Result<(), EmbeddingError> {
        let Some(file_path) = &track.file_path else {
            return Err(EmbeddingError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "track has no acquired file path",
            )));
        };

        let mut tagged_file = Probe::open(file_path)
            .map_err(|source| EmbeddingError::OpenFailed { path: file_path.display().to_string(), source })?
            .read()
            .map_err(|source| EmbeddingError::OpenFailed { path: file_path.display().to_string(), source })?;

        let tag = match tagged_file.primary_tag_mut() {
            Some(tag) => tag,
            None => {
                let tag_type = tagged_file.primary_tag_type();
                tagged_file.insert_tag(lofty::tag::Tag::new(tag_type));
                tagged_file.primary_tag_mut().expect("tag was just inserted")
            }
        };

        write_container_tags(tag, &track.metadata);

        if let Some(cover_url) = &track.metadata.cover_url {
            match fetch_cover(&self.http, cover_url).await {
                Ok(picture) => tag.push_picture(picture),
                Err(err) => log::warn!("cover download failed for '{}': {err}", track.metadata.name),
            }
        }

        let mut lyrics_written = false;
        if let Some(lyrics) = &track.lyrics_text {
            tag.insert_text(ItemKey::Lyrics, lyrics.clone());
            lyrics_written = true;
        }

        tag.save_to_path(file_path, lofty::config::WriteOptions::default())
            .map_err(|source| EmbeddingError::SaveFailed { path: file_path.display().to_string(), source })?;

        self.registry.mark_metadata_embedded(&track.external_id, None).await?;
        if lyrics_written {
            self.registry.mark_lyrics_embedded(&track.external_id).await?;
        }

        Ok(())
    }
}

/// §4.8 step 2: title/artists/album/album artist/date/genre/track/disc/
/// copyright/publisher/explicit plus two custom free-form keys.
fn write_container_tags(tag: &mut lofty::tag::Tag, metadata: &crate::domain::canonical_track::CanonicalTrackMetadata) {
    tag.set_title(metadata.name.clone());
    tag.set_artist(metadata.artists.join(", "));

    if let Some(album) = &metadata.album {
        tag.set_album(album.clone());
    }
    if let Some(album_artist) = &metadata.album_artist {
        tag.insert_text(ItemKey::AlbumArtist, album_artist.clone());
    }
    if let Some(release_date) = &metadata.release_date {
        tag.insert_text(ItemKey::RecordingDate, release_date.clone());
    }
    if let Some(genre) = metadata.genres.first() {
        tag.set_genre(genre.clone());
    }
    if let Some(track_number) = metadata.track_number {
        tag.set_track(track_number);
    }
    if let Some(disc_number) = metadata.disc_number {
        tag.set_disk(disc_number);
    }
    if let Some(copyright) = &metadata.copyright {
        tag.insert_text(ItemKey::CopyrightMessage, copyright.clone());
    }
    if let Some(publisher) = &metadata.publisher {
        tag.insert_text(ItemKey::Publisher, publisher.clone());
    }
    if metadata.explicit {
        tag.insert_text(ItemKey::ParentalAdvisory, "1".to_string());
    }
    if let Some(external_url) = &metadata.external_url {
        tag.insert(TagItem::new(
            ItemKey::Unknown("CATALOG_A_URL".to_string()),
            ItemValue::Text(external_url.clone()),
        ));
    }
    if let Some(isrc) = &metadata.isrc {
        tag.insert_text(ItemKey::Isrc, isrc.clone());
    }
}

async fn fetch_cover(client: &reqwest::Client, url: &str) -> Result<Picture, reqwest::Error> {
    let response = client.get(url).send().await?.error_for_status()?;
    let mime_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(|s| s.to_string());
    let bytes = response.bytes().await?.to_vec();

    Ok(Picture::new_unchecked(
        PictureType::CoverFront,
        mime_type.and_then(|m| MimeType::from_str(&m).ok()),
        None,
        bytes,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::canonical_track::CanonicalTrackMetadata;

    #[test]
    fn write_container_tags_sets_title_and_artists() {
        let mut tag = lofty::tag::Tag::new(lofty::tag::TagType::Id3v2);
        let mut metadata = CanonicalTrackMetadata::new(
            "Song",
            "Artist",
            vec!["Artist".to_string(), "Feature".to_string()],
            200_000,
        )
        .unwrap();
        metadata.genres = vec!["pop".to_string()];
        metadata.track_number = Some(3);

        write_container_tags(&mut tag, &metadata);

        assert_eq!(tag.title().as_deref(), Some("Song"));
        assert_eq!(tag.artist().as_deref(), Some("Artist, Feature"));
        assert_eq!(tag.genre().as_deref(), Some("pop"));
        assert_eq!(tag.track(), Some(3));
    }

    #[test]
    fn write_container_tags_skips_absent_optional_fields() {
        let mut tag = lofty::tag::Tag::new(lofty::tag::TagType::Id3v2);
        let metadata = CanonicalTrackMetadata::new("Song", "Artist", vec!["Artist".to_string()], 200_000).unwrap();

        write_container_tags(&mut tag, &metadata);

        assert!(tag.album().is_none());
        assert!(tag.get_string(&ItemKey::Isrc).is_none());
    }
}
