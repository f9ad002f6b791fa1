//! Shared volume and mute state for every playback and capture component of
//! a process. Components hold a clone of the controller; there is no global.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, RwLock};

/// Volume plus mute flag as seen by subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AudioLevel {
    /// 0.0-1.0
    pub volume: f32,
    pub muted: bool,
}

impl AudioLevel {
    /// Gain a player should apply: `0` while muted.
    pub fn effective_gain(&self) -> f32 {
        if self.muted {
            0.0
        } else {
            self.volume
        }
    }
}

impl Default for AudioLevel {
    fn default() -> Self {
        Self {
            volume: 1.0,
            muted: false,
        }
    }
}

/// Injected volume/mute service.
#[derive(Debug, Clone)]
pub struct AudioSessionController {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    level: RwLock<AudioLevel>,
    tx: broadcast::Sender<AudioLevel>,
}

impl Default for AudioSessionController {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioSessionController {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(32);
        Self {
            inner: Arc::new(Inner {
                level: RwLock::new(AudioLevel::default()),
                tx,
            }),
        }
    }

    pub async fn level(&self) -> AudioLevel {
        *self.inner.level.read().await
    }

    /// Set the volume, clamped to 0.0-1.0. Zero mutes; any other value
    /// unmutes.
    pub async fn set_volume(&self, volume: f32) -> AudioLevel {
        let mut level = self.inner.level.write().await;
        level.volume = if volume.is_nan() {
            0.0
        } else {
            volume.clamp(0.0, 1.0)
        };
        level.muted = level.volume == 0.0;
        let updated = *level;
        drop(level);
        self.publish(updated);
        updated
    }

    /// Unmuting at volume zero restores full volume.
    pub async fn set_muted(&self, muted: bool) -> AudioLevel {
        let mut level = self.inner.level.write().await;
        level.muted = muted;
        if !muted && level.volume == 0.0 {
            level.volume = 1.0;
        }
        let updated = *level;
        drop(level);
        self.publish(updated);
        updated
    }

    pub async fn toggle_mute(&self) -> AudioLevel {
        let muted = self.level().await.muted;
        self.set_muted(!muted).await
    }

    /// Receive every later change.
    pub fn subscribe(&self) -> broadcast::Receiver<AudioLevel> {
        self.inner.tx.subscribe()
    }

    fn publish(&self, level: AudioLevel) {
        tracing::debug!(volume = level.volume, muted = level.muted, "audio level changed");
        // No subscribers is fine.
        let _ = self.inner.tx.send(level);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn volume_is_clamped() {
        let audio = AudioSessionController::new();
        assert_eq!(audio.level().await.volume, 1.0);
        assert_eq!(audio.set_volume(0.5).await.volume, 0.5);
        assert_eq!(audio.set_volume(1.5).await.volume, 1.0);
        assert_eq!(audio.set_volume(-0.5).await.volume, 0.0);
        assert_eq!(audio.set_volume(f32::NAN).await.volume, 0.0);
    }

    #[tokio::test]
    async fn zero_volume_mutes_and_unmute_restores() {
        let audio = AudioSessionController::new();
        let level = audio.set_volume(0.0).await;
        assert!(level.muted);
        assert_eq!(level.effective_gain(), 0.0);

        let level = audio.set_muted(false).await;
        assert!(!level.muted);
        assert_eq!(level.volume, 1.0);
    }

    #[tokio::test]
    async fn raising_volume_unmutes() {
        let audio = AudioSessionController::new();
        audio.set_muted(true).await;
        let level = audio.set_volume(0.3).await;
        assert!(!level.muted);
        assert_eq!(level.effective_gain(), 0.3);
    }

    #[tokio::test]
    async fn clones_share_state_and_subscribers_see_changes() {
        let audio = AudioSessionController::new();
        let player_side = audio.clone();
        let mut rx = player_side.subscribe();

        audio.set_volume(0.25).await;
        audio.toggle_mute().await;

        assert_eq!(rx.recv().await.unwrap().volume, 0.25);
        let muted = rx.recv().await.unwrap();
        assert!(muted.muted);
        assert_eq!(player_side.level().await, muted);
    }
}
