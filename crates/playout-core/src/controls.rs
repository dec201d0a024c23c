//! Playback controls
//!
//! Synchronous getters read the live backend and element; setters notify the
//! settings bus.

use crate::backend::BackendKind;
use crate::collection::CollectionTarget;
use crate::config::{Autoplay, MuteMode, PlayerProfile};
use crate::session::PlayoutSession;
use crate::types::{RestartHints, TrackDescriptor, TrackList};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Selectable playback rates
pub const PLAYBACK_RATES: [f64; 8] = [0.25, 0.5, 0.75, 1.0, 1.25, 1.5, 1.75, 2.0];

fn same_rate(a: f64, b: f64) -> bool {
    (a * 100.0).round() == (b * 100.0).round()
}

/// Result of a playback rate change
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RateChange {
    pub rate: f64,
    /// True when the new rate is faster than the previous one
    pub increase: bool,
}

/// Everything a settings menu needs
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlayerSettings {
    pub quality: TrackList,
    pub audio: TrackList,
    pub text: TrackList,
    pub profile: TrackList,
    pub rate: TrackList,
    pub has_quality_options: bool,
    pub has_audio_options: bool,
    pub has_text_options: bool,
    pub has_profile_options: bool,
    pub has_rate_options: bool,
}

/// Title and description of what is playing
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContentDetails {
    pub title: Option<String>,
    pub subtitle: Option<String>,
    pub description: Option<String>,
}

impl PlayoutSession {
    // ------------------------------------------------------------------
    // Playback
    // ------------------------------------------------------------------

    /// Start playback. Returns whether the element accepted `play`.
    ///
    /// With mute mode `OffIfPossible`, a rejected `play` is retried muted
    /// after `autoplay_retry_delay_ms`.
    pub async fn play(&self) -> Result<bool> {
        if self.is_destroyed() {
            return Err(Error::Destroyed);
        }

        let media = self.media();
        let err = match media.play().await {
            Ok(()) => return Ok(true),
            Err(err) => err,
        };

        let player = self.config().player.clone();
        if player.muted != MuteMode::OffIfPossible || !media.paused() || media.muted() {
            warn!(error = %err, "Unable to start playback");
            return Ok(false);
        }

        info!(error = %err, "Playback blocked, retrying muted");
        tokio::time::sleep(Duration::from_millis(player.autoplay_retry_delay_ms)).await;
        if self.is_destroyed() {
            return Ok(false);
        }

        media.set_muted(true);
        self.notify();

        match media.play().await {
            Ok(()) => Ok(true),
            Err(err) => {
                warn!(error = %err, "Unable to start muted playback");
                Ok(false)
            }
        }
    }

    pub fn pause(&self) {
        self.media().pause();
    }

    /// Play if paused, pause otherwise. Returns whether playback is starting.
    pub async fn toggle_play(&self) -> Result<bool> {
        if self.media().paused() {
            self.play().await
        } else {
            self.pause();
            Ok(false)
        }
    }

    /// Pause and rewind to the start
    pub fn stop(&self) {
        let media = self.media();
        media.pause();
        media.set_current_time(0.0);
        self.inner
            .flags
            .playback_started
            .store(false, std::sync::atomic::Ordering::SeqCst);
        self.notify();
    }

    // ------------------------------------------------------------------
    // Visibility
    // ------------------------------------------------------------------

    /// Report whether the element is in view
    ///
    /// With autoplay `WhenVisible`, entering the view plays and leaving it
    /// pauses. With mute mode `WhenNotVisible`, entering the view unmutes and
    /// leaving it mutes. Each action is taken once until the opposite one.
    #[instrument(skip(self))]
    pub async fn set_visible(&self, visible: bool) -> Result<()> {
        if self.is_destroyed() {
            return Err(Error::Destroyed);
        }

        let player = self.config().player.clone();
        let media = self.media();

        if player.autoplay == Autoplay::WhenVisible {
            let last = self.inner.visibility.lock().play;
            if last != Some(true) && visible && media.paused() {
                self.inner.visibility.lock().play = Some(true);
                self.play().await?;
            } else if last != Some(false) && !visible && !media.paused() {
                self.inner.visibility.lock().play = Some(false);
                self.pause();
            }
        }

        if player.muted == MuteMode::WhenNotVisible {
            let last = self.inner.visibility.lock().mute;
            if last != Some(false) && visible && media.muted() {
                self.inner.visibility.lock().mute = Some(false);
                media.set_muted(false);
                self.notify();
            } else if last != Some(true) && !visible && !media.muted() {
                self.inner.visibility.lock().mute = Some(true);
                media.set_muted(true);
                self.notify();
            }
        }

        Ok(())
    }

    // ------------------------------------------------------------------
    // Position
    // ------------------------------------------------------------------

    pub fn current_time(&self) -> f64 {
        self.media().current_time()
    }

    /// Duration in seconds; infinite for live streams
    pub fn duration(&self) -> f64 {
        self.media().duration()
    }

    /// Seek to `time` seconds. Returns true when seeking forward.
    pub fn seek(&self, time: f64) -> bool {
        let media = self.media();
        let duration = media.duration();
        let current = media.current_time();

        let target = if duration.is_finite() && duration > 0.0 {
            time.clamp(0.0, duration)
        } else {
            time.max(0.0)
        };

        media.set_current_time(target);
        self.notify();
        target > current
    }

    /// Seek to a fraction of the duration
    pub fn seek_fraction(&self, fraction: f64) -> Result<bool> {
        let duration = self.duration();
        if !duration.is_finite() || duration <= 0.0 {
            return Err(Error::InvalidConfig("cannot seek without a finite duration".to_string()));
        }

        Ok(self.seek(fraction.clamp(0.0, 1.0) * duration))
    }

    /// Seek by `delta` seconds from the current position
    pub fn seek_relative(&self, delta: f64) -> bool {
        self.seek(self.current_time() + delta)
    }

    // ------------------------------------------------------------------
    // Volume
    // ------------------------------------------------------------------

    pub fn volume(&self) -> f64 {
        self.media().volume()
    }

    /// Set volume in `[0, 1]`; a positive volume unmutes
    pub fn set_volume(&self, volume: f64) {
        let media = self.media();
        let volume = volume.clamp(0.0, 1.0);

        media.set_volume(volume);
        if volume > 0.0 && media.muted() {
            media.set_muted(false);
        }
        self.notify();
    }

    pub fn set_volume_relative(&self, delta: f64) {
        self.set_volume(self.volume() + delta);
    }

    pub fn muted(&self) -> bool {
        self.media().muted()
    }

    pub fn set_muted(&self, muted: bool) {
        let media = self.media();
        media.set_muted(muted);
        if !muted && media.volume() == 0.0 {
            media.set_volume(1.0);
        }
        self.notify();
    }

    /// Returns the new muted state
    pub fn toggle_muted(&self) -> bool {
        let muted = !self.muted();
        self.set_muted(muted);
        muted
    }

    // ------------------------------------------------------------------
    // Tracks
    // ------------------------------------------------------------------

    pub fn levels(&self) -> TrackList {
        self.backend().map(|backend| backend.levels()).unwrap_or_default()
    }

    /// Select a quality level; `-1` restores automatic selection
    pub fn set_level(&self, index: i32) -> Result<()> {
        let backend = self.backend().ok_or(Error::NoBackend)?;
        backend.set_level(index)?;
        self.notify();
        Ok(())
    }

    pub fn audio_tracks(&self) -> TrackList {
        self.backend()
            .map(|backend| backend.audio_tracks())
            .unwrap_or_default()
    }

    pub fn set_audio_track(&self, index: i32) -> Result<()> {
        let backend = self.backend().ok_or(Error::NoBackend)?;
        backend.set_audio_track(index)?;
        self.notify();
        Ok(())
    }

    pub fn text_tracks(&self) -> TrackList {
        self.backend()
            .map(|backend| backend.text_tracks())
            .unwrap_or_default()
    }

    /// Show a text track; `-1` disables text
    pub fn set_text_track(&self, index: i32) -> Result<()> {
        let backend = self.backend().ok_or(Error::NoBackend)?;
        backend.set_text_track(index)?;

        if index >= 0 {
            *self.inner.last_text_track.lock() = Some(index);
        }
        self.notify();
        Ok(())
    }

    /// Turn text off, or back on. Returns whether text is now showing.
    ///
    /// Re-enables the last chosen track, else the first track matching one of
    /// `languages` (exact or by primary subtag), else the first track.
    #[instrument(skip(self))]
    pub fn toggle_text_track(&self, languages: &[String]) -> Result<bool> {
        let tracks = self.text_tracks();
        let available: Vec<&TrackDescriptor> = tracks.options.iter().filter(|track| track.index >= 0).collect();
        if available.is_empty() {
            return Err(Error::InvalidConfig("no text tracks".to_string()));
        }

        if tracks.active.as_ref().is_some_and(|active| active.index >= 0) {
            self.set_text_track(-1)?;
            return Ok(false);
        }

        let last = *self.inner.last_text_track.lock();
        let by_language = || {
            languages.iter().find_map(|wanted| {
                let wanted = wanted.to_lowercase();
                let primary = wanted.split('-').next().unwrap_or_default().to_string();
                available
                    .iter()
                    .find(|track| {
                        track.language.as_deref().is_some_and(|language| {
                            let language = language.to_lowercase();
                            language == wanted || language.split('-').next() == Some(primary.as_str())
                        })
                    })
                    .map(|track| track.index)
            })
        };

        let index = last
            .filter(|last| available.iter().any(|track| track.index == *last))
            .or_else(by_language)
            .unwrap_or(available[0].index);

        debug!(index, "Enabling text track");
        self.set_text_track(index)?;
        Ok(true)
    }

    // ------------------------------------------------------------------
    // Playback rate
    // ------------------------------------------------------------------

    /// Fixed rates plus a custom entry (index -1) when the current rate is
    /// not one of them
    pub fn playback_rates(&self) -> TrackList {
        let current = self.media().playback_rate();

        let mut options: Vec<TrackDescriptor> = PLAYBACK_RATES
            .iter()
            .enumerate()
            .map(|(index, rate)| TrackDescriptor::new(index as i32, format!("{}x", rate), same_rate(*rate, current)))
            .collect();

        if !options.iter().any(|option| option.active) {
            options.push(TrackDescriptor::new(-1, format!("{}x", current), true));
        }

        TrackList::new(options)
    }

    pub fn set_playback_rate(&self, rate: f64) -> Result<RateChange> {
        if !rate.is_finite() || rate <= 0.0 {
            return Err(Error::InvalidConfig(format!("invalid playback rate {}", rate)));
        }

        let media = self.media();
        let previous = media.playback_rate();
        media.set_playback_rate(rate);
        self.notify();

        Ok(RateChange {
            rate,
            increase: rate > previous,
        })
    }

    /// Select one of `PLAYBACK_RATES`
    pub fn set_playback_rate_index(&self, index: usize) -> Result<RateChange> {
        let rate = PLAYBACK_RATES
            .get(index)
            .copied()
            .ok_or_else(|| Error::InvalidConfig(format!("no playback rate {}", index)))?;
        self.set_playback_rate(rate)
    }

    // ------------------------------------------------------------------
    // Summary
    // ------------------------------------------------------------------

    /// hls.js profiles; empty on other backends
    pub fn player_profiles(&self) -> TrackList {
        if self.backend_kind() != Some(BackendKind::HlsJs) {
            return TrackList::default();
        }

        let current = self.config().player.player_profile;
        TrackList::new(
            PlayerProfile::ALL
                .iter()
                .enumerate()
                .map(|(index, profile)| TrackDescriptor::new(index as i32, profile.label(), *profile == current))
                .collect(),
        )
    }

    pub fn options(&self) -> PlayerSettings {
        let quality = self.levels();
        let audio = self.audio_tracks();
        let text = self.text_tracks();
        let profile = self.player_profiles();
        let rate = self.playback_rates();

        PlayerSettings {
            has_quality_options: quality.len() > 1,
            has_audio_options: audio.len() > 1,
            has_text_options: !text.is_empty(),
            has_profile_options: !profile.is_empty(),
            has_rate_options: !self.is_live(),
            quality,
            audio,
            text,
            profile,
            rate,
        }
    }

    /// Active collection entry, else the configured content info
    pub fn content_details(&self) -> ContentDetails {
        if let Some(entry) = self.collection().as_ref().and_then(|collection| collection.active().cloned()) {
            return ContentDetails {
                title: entry.title,
                subtitle: None,
                description: entry.description,
            };
        }

        let info = self.config().source.content_info.clone();
        ContentDetails {
            title: info.title,
            subtitle: info.subtitle,
            description: info.description,
        }
    }

    // ------------------------------------------------------------------
    // Collections
    // ------------------------------------------------------------------

    /// Play a collection entry from the start
    ///
    /// Ignored while an initialization is in flight. `autoplay` defaults to
    /// the current playing state.
    #[instrument(skip(self), fields(session_id = %self.id()))]
    pub async fn collection_play(&self, target: CollectionTarget, autoplay: Option<bool>) -> Result<()> {
        if self.is_destroyed() {
            return Err(Error::Destroyed);
        }
        if self.is_loading() {
            debug!("Ignoring collection play while loading");
            return Ok(());
        }

        let index = {
            let mut guard = self.inner.collection.write();
            let collection = guard
                .as_mut()
                .ok_or_else(|| Error::collection("No collection loaded"))?;
            let index = collection
                .resolve(&target)
                .ok_or_else(|| Error::collection(format!("No collection entry {:?}", target)))?;
            collection.select(index);
            index
        };

        info!(index, "Playing collection entry");
        self.notify();

        let media = self.media();
        let hints = RestartHints {
            volume: media.volume(),
            muted: media.muted(),
            current_time: None,
            playing: autoplay.unwrap_or(!media.paused()),
        };

        self.reinitialize(Some(hints)).await
    }

    pub async fn collection_next(&self, autoplay: Option<bool>) -> Result<()> {
        let Some((cursor, next)) = self
            .collection()
            .map(|collection| (collection.cursor(), collection.next_index()))
        else {
            return Err(Error::collection("No collection loaded"));
        };

        if next == cursor {
            return Ok(());
        }
        self.collection_play(CollectionTarget::Index(next), autoplay).await
    }

    pub async fn collection_previous(&self, autoplay: Option<bool>) -> Result<()> {
        let Some((cursor, previous)) = self
            .collection()
            .map(|collection| (collection.cursor(), collection.previous_index()))
        else {
            return Err(Error::collection("No collection loaded"));
        };

        if previous == cursor {
            return Ok(());
        }
        self.collection_play(CollectionTarget::Index(previous), autoplay).await
    }
}
