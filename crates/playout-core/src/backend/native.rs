//! Native element adapter
//!
//! The element plays the HLS URL itself. Used for FairPlay and SAMPLE-AES,
//! and on runtimes where hls.js is unavailable. No quality selection.

use super::{
    element_text_tracks, set_element_text_track, translate_media, AdapterCore, Backend, BackendEvent,
    BackendKind, BackendState, EventSender, MediaElement, MediaEvent,
};
use crate::negotiate::PlayoutNegotiation;
use crate::recovery::MediaFault;
use crate::types::{Drm, TrackDescriptor, TrackList};
use crate::{Error, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, instrument};

/// Element events, including element-level errors
pub fn translate(event: &MediaEvent) -> Option<BackendEvent> {
    match event {
        MediaEvent::Error(details) => Some(BackendEvent::Error(MediaFault::other(details.clone(), true))),
        other => translate_media(other),
    }
}

pub struct NativeHlsAdapter {
    core: Arc<AdapterCore>,
}

impl NativeHlsAdapter {
    pub fn new(events: EventSender) -> Self {
        Self {
            core: AdapterCore::new(BackendKind::NativeHls, events, translate),
        }
    }

    fn media(&self) -> Result<Arc<dyn MediaElement>> {
        self.core.media().ok_or(Error::NoBackend)
    }
}

#[async_trait]
impl Backend for NativeHlsAdapter {
    fn kind(&self) -> BackendKind {
        BackendKind::NativeHls
    }

    fn state(&self) -> BackendState {
        self.core.state()
    }

    #[instrument(skip_all, fields(drm = %playout.drm))]
    async fn attach(
        &self,
        media: Arc<dyn MediaElement>,
        playout: &PlayoutNegotiation,
        _token: Option<&str>,
    ) -> Result<()> {
        if !self.core.transition(BackendState::Attaching) {
            return Err(Error::Destroyed);
        }

        if playout.drm == Drm::FairPlay {
            media.configure_key_system(Drm::FairPlay, playout.key_servers())?;
        }

        self.core.bind_media(Arc::clone(&media));
        media.set_src(Some(playout.playout_url.as_str()));

        info!(url = %playout.playout_url, "Native playback attached");
        Ok(())
    }

    fn levels(&self) -> TrackList {
        TrackList::default()
    }

    fn set_level(&self, _index: i32) -> Result<()> {
        Err(Error::BackendUnsupported("native playback has no quality selection".to_string()))
    }

    fn audio_tracks(&self) -> TrackList {
        let Ok(media) = self.media() else {
            return TrackList::default();
        };

        let tracks = media
            .audio_tracks()
            .into_iter()
            .enumerate()
            .map(|(index, track)| {
                let label = if track.label.is_empty() {
                    track.language.clone().unwrap_or_default()
                } else {
                    track.label
                };
                TrackDescriptor::new(index as i32, label, track.enabled).with_language(track.language)
            })
            .collect();

        TrackList::new(tracks)
    }

    fn set_audio_track(&self, index: i32) -> Result<()> {
        let media = self.media()?;
        let count = media.audio_tracks().len();
        if index < 0 || index as usize >= count {
            return Err(Error::InvalidConfig(format!("no audio track {}", index)));
        }

        for i in 0..count {
            media.set_audio_track_enabled(i, i == index as usize);
        }
        Ok(())
    }

    fn text_tracks(&self) -> TrackList {
        self.media()
            .map(|media| element_text_tracks(media.as_ref()))
            .unwrap_or_default()
    }

    fn set_text_track(&self, index: i32) -> Result<()> {
        set_element_text_track(self.media()?.as_ref(), index)
    }

    fn destroy(&self) {
        let media = self.core.media();
        if self.core.release() {
            if let Some(media) = media {
                media.pause();
                media.set_src(None);
            }
            info!("Native playback released");
        }
    }
}
