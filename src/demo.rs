//! Offline stand-ins used when no API or playlist is configured.

use crate::interaction::EffectsBackend;
use crate::media::{ItemId, MediaItem};
use crate::playback::{MediaSurface, Volume};
use futures_util::future::BoxFuture;
use rand::Rng;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

const CAPTIONS: &[&str] = &[
    "Good morning",
    "Look at this view",
    "Weekend plans?",
    "New drop tonight",
    "Behind the scenes",
];

/// Build `count` items with a random mix of kinds and durations.
pub fn random_sequence<R: Rng>(rng: &mut R, count: usize) -> Vec<MediaItem> {
    (0..count)
        .map(|i| {
            let id = format!("demo-{i}");
            match rng.gen_range(0..3) {
                0 => MediaItem::image(
                    &id,
                    &format!("/files/{id}.jpg"),
                    rng.gen_range(3..=7) * 1000,
                ),
                1 => MediaItem::video(&id, &format!("/files/{id}.mp4")),
                _ => {
                    let caption = CAPTIONS[rng.gen_range(0..CAPTIONS.len())];
                    MediaItem::text(&id, caption, 4000)
                }
            }
        })
        .collect()
}

/// Video surface that pretends to decode with random latency.
///
/// Roughly one video in ten fails to load and one in ten never reports a
/// duration, so the fallback paths get exercised too.
pub struct SimulatedSurface {
    durations: Mutex<HashMap<ItemId, Option<Duration>>>,
}

impl SimulatedSurface {
    pub fn new() -> Self {
        Self {
            durations: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for SimulatedSurface {
    fn default() -> Self {
        Self::new()
    }
}

impl MediaSurface for SimulatedSurface {
    fn load<'a>(&'a self, item: &'a MediaItem) -> BoxFuture<'a, anyhow::Result<()>> {
        let (latency, fails, duration) = {
            let mut rng = rand::thread_rng();
            let duration = rng
                .gen_bool(0.9)
                .then(|| Duration::from_millis(rng.gen_range(2_000..20_000)));
            (
                Duration::from_millis(rng.gen_range(50..800)),
                rng.gen_bool(0.1),
                duration,
            )
        };

        Box::pin(async move {
            tokio::time::sleep(latency).await;
            if fails {
                anyhow::bail!("decoder rejected {}", item.id);
            }
            if let Ok(mut durations) = self.durations.lock() {
                durations.insert(item.id.clone(), duration);
            }
            Ok(())
        })
    }

    /// Warm-up only. The outcome of an item is rolled once, by `load`.
    fn prefetch<'a>(&'a self, item: &'a MediaItem) -> BoxFuture<'a, anyhow::Result<()>> {
        let latency = Duration::from_millis(rand::thread_rng().gen_range(20..200));
        Box::pin(async move {
            tokio::time::sleep(latency).await;
            tracing::debug!("Warmed {}", item.id);
            Ok(())
        })
    }

    fn duration<'a>(&'a self, item: &'a MediaItem) -> BoxFuture<'a, Option<Duration>> {
        let known = self
            .durations
            .lock()
            .ok()
            .and_then(|d| d.get(&item.id).copied());
        Box::pin(async move {
            match known {
                Some(Some(duration)) => Some(duration),
                _ => futures_util::future::pending().await,
            }
        })
    }

    fn play(&self, item: &MediaItem) {
        tracing::info!("▶ {}", item.id);
    }

    fn pause(&self) {
        tracing::info!("⏸ paused");
    }

    fn stop(&self) {
        tracing::debug!("■ stopped");
    }

    fn set_muted(&self, muted: bool) {
        tracing::info!("Muted: {}", muted);
    }

    fn set_volume(&self, volume: Volume) {
        tracing::info!("Volume: {:.1}", volume.value());
    }
}

/// Effects backend that logs each call and occasionally fails.
pub struct LoggingEffects {
    failure_rate: f64,
}

impl LoggingEffects {
    pub fn new(failure_rate: f64) -> Self {
        Self {
            failure_rate: failure_rate.clamp(0.0, 1.0),
        }
    }

    fn call(&self, name: &'static str, item: ItemId) -> BoxFuture<'static, anyhow::Result<()>> {
        let (delay, fails) = {
            let mut rng = rand::thread_rng();
            (
                Duration::from_millis(rng.gen_range(100..600)),
                rng.gen_bool(self.failure_rate),
            )
        };

        Box::pin(async move {
            tokio::time::sleep(delay).await;
            if fails {
                tracing::warn!("{} for {} failed", name, item);
                anyhow::bail!("simulated {name} failure");
            }
            tracing::info!("{} for {} confirmed", name, item);
            Ok(())
        })
    }
}

impl EffectsBackend for LoggingEffects {
    fn like_item(&self, item: ItemId) -> BoxFuture<'static, anyhow::Result<()>> {
        self.call("like", item)
    }

    fn unlike_item(&self, item: ItemId) -> BoxFuture<'static, anyhow::Result<()>> {
        self.call("unlike", item)
    }

    fn save_item(&self, item: ItemId) -> BoxFuture<'static, anyhow::Result<()>> {
        self.call("save", item)
    }

    fn unsave_item(&self, item: ItemId) -> BoxFuture<'static, anyhow::Result<()>> {
        self.call("unsave", item)
    }

    fn send_reply(&self, item: ItemId, text: String) -> BoxFuture<'static, anyhow::Result<()>> {
        tracing::info!("Reply to {}: {:?}", item, text);
        self.call("reply", item)
    }

    fn record_share(&self, item: ItemId) -> BoxFuture<'static, anyhow::Result<()>> {
        self.call("share", item)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::Sequence;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn random_sequence_is_valid() {
        let mut rng = StdRng::seed_from_u64(7);
        let items = random_sequence(&mut rng, 12);
        assert_eq!(items.len(), 12);
        assert!(items
            .iter()
            .filter(|i| !i.is_video())
            .all(|i| i.display_duration().is_some()));
        assert!(Sequence::new(items).is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn prefetch_leaves_rolled_outcome_alone() {
        let surface = SimulatedSurface::new();
        let item = MediaItem::video("v", "/v.mp4");

        for _ in 0..20 {
            assert!(surface.prefetch(&item).await.is_ok());
        }
        assert!(surface.durations.lock().unwrap().is_empty());

        if surface.load(&item).await.is_ok() {
            let rolled = surface.durations.lock().unwrap().get(&item.id).copied();
            for _ in 0..20 {
                surface.prefetch(&item).await.unwrap();
            }
            assert_eq!(surface.durations.lock().unwrap().get(&item.id).copied(), rolled);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn effects_without_failures_confirm() {
        let effects = LoggingEffects::new(0.0);
        assert!(effects.like_item(ItemId::from("a")).await.is_ok());
        assert!(effects
            .send_reply(ItemId::from("a"), "hi".into())
            .await
            .is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn effects_with_certain_failure_fail() {
        let effects = LoggingEffects::new(1.0);
        assert!(effects.record_share(ItemId::from("a")).await.is_err());
    }
}
