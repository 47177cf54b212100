//! Audio output seam.
//!
//! The playback queue never touches an audio device directly; it drives a
//! [`ClipPlayer`]. Hosts plug in whatever output they have. The crate ships a
//! headless [`SilentPlayer`] and, behind the `rodio` feature, `RodioPlayer`.

use async_trait::async_trait;
use tracing::info;
use url::Url;

use crate::error::Result;

/// Plays one narration clip at a time.
///
/// `play` resolves when the clip finishes naturally and fails with
/// [`Error::Playback`](crate::Error::Playback) when it cannot be played.
/// Dropping the returned future must stop the clip and release it.
#[async_trait]
pub trait ClipPlayer: Send + Sync {
    async fn play(&self, url: &Url, volume: f32) -> Result<()>;

    /// Change the volume of the clip currently playing, if any
    fn set_volume(&self, volume: f32);
}

/// Logs each clip and completes immediately
#[derive(Debug, Clone, Copy, Default)]
pub struct SilentPlayer;

#[async_trait]
impl ClipPlayer for SilentPlayer {
    async fn play(&self, url: &Url, volume: f32) -> Result<()> {
        info!(url = %url, volume, "narration clip (silent output)");
        Ok(())
    }

    fn set_volume(&self, _volume: f32) {}
}

#[cfg(feature = "rodio")]
pub use self::rodio_output::RodioPlayer;

#[cfg(any(feature = "rodio", test))]
mod claim {
    use parking_lot::Mutex;
    use std::sync::Arc;

    /// Output handle a clip plays on
    pub(super) trait ClipSink: Send + Sync {
        fn stop(&self);
        fn set_volume(&self, volume: f32);
    }

    /// The sink currently playing, shared by the player and its play calls
    pub(super) type Output<S> = Arc<Mutex<Option<Arc<S>>>>;

    struct ClaimState<S> {
        cancelled: bool,
        sink: Option<Arc<S>>,
    }

    /// One play call's hold on the output.
    ///
    /// `start` and `cancel` serialize on the claim's lock, so a clip is
    /// either never started or stopped by a later `cancel`.
    pub(super) struct Claim<S> {
        output: Output<S>,
        state: Mutex<ClaimState<S>>,
    }

    impl<S: ClipSink> Claim<S> {
        pub(super) fn new(output: &Output<S>) -> Arc<Self> {
            Arc::new(Self {
                output: Arc::clone(output),
                state: Mutex::new(ClaimState {
                    cancelled: false,
                    sink: None,
                }),
            })
        }

        /// Run `begin` on the sink and publish it as the current output.
        /// Returns `false` without calling `begin` once cancelled.
        pub(super) fn start(&self, sink: Arc<S>, begin: impl FnOnce(&S)) -> bool {
            let mut state = self.state.lock();
            if state.cancelled {
                return false;
            }
            begin(&sink);
            *self.output.lock() = Some(Arc::clone(&sink));
            state.sink = Some(sink);
            true
        }

        /// The clip ended on its own
        pub(super) fn finish(&self) {
            if let Some(sink) = self.state.lock().sink.take() {
                self.release(&sink);
            }
        }

        pub(super) fn cancel(&self) {
            let mut state = self.state.lock();
            state.cancelled = true;
            if let Some(sink) = state.sink.take() {
                sink.stop();
                self.release(&sink);
            }
        }

        /// Clear the current output only if it is still this claim's sink
        fn release(&self, sink: &Arc<S>) {
            let mut current = self.output.lock();
            if current.as_ref().is_some_and(|c| Arc::ptr_eq(c, sink)) {
                *current = None;
            }
        }
    }

    /// Cancels the claim when the play future is dropped
    pub(super) struct CancelOnDrop<S: ClipSink>(pub(super) Arc<Claim<S>>);

    impl<S: ClipSink> Drop for CancelOnDrop<S> {
        fn drop(&mut self) {
            self.0.cancel();
        }
    }

    pub(super) fn set_output_volume<S: ClipSink>(output: &Output<S>, volume: f32) {
        if let Some(sink) = output.lock().as_ref() {
            sink.set_volume(volume);
        }
    }
}

#[cfg(feature = "rodio")]
mod rodio_output {
    use async_trait::async_trait;
    use std::io::Cursor;
    use std::sync::Arc;
    use tracing::debug;
    use url::Url;

    use super::claim::{set_output_volume, CancelOnDrop, Claim, ClipSink, Output};
    use super::ClipPlayer;
    use crate::error::{Error, Result};

    impl ClipSink for rodio::Sink {
        fn stop(&self) {
            rodio::Sink::stop(self);
        }

        fn set_volume(&self, volume: f32) {
            rodio::Sink::set_volume(self, volume);
        }
    }

    /// Fetches each clip over HTTP and plays it on the default output device
    #[derive(Clone, Default)]
    pub struct RodioPlayer {
        http: reqwest::Client,
        current: Output<rodio::Sink>,
    }

    impl RodioPlayer {
        pub fn new() -> Self {
            Self::default()
        }

        async fn fetch(&self, url: &Url) -> Result<Vec<u8>> {
            let response = self
                .http
                .get(url.clone())
                .send()
                .await
                .map_err(|e| Error::Playback(format!("{}: {}", url, e)))?;
            let status = response.status();
            if !status.is_success() {
                return Err(Error::Playback(format!("{} returned {}", url, status)));
            }
            let bytes = response
                .bytes()
                .await
                .map_err(|e| Error::Playback(format!("{}: {}", url, e)))?;
            Ok(bytes.to_vec())
        }
    }

    #[async_trait]
    impl ClipPlayer for RodioPlayer {
        async fn play(&self, url: &Url, volume: f32) -> Result<()> {
            let bytes = self.fetch(url).await?;

            let claim = Claim::new(&self.current);
            let _guard = CancelOnDrop(Arc::clone(&claim));
            let label = url.to_string();

            tokio::task::spawn_blocking(move || -> Result<()> {
                let stream = rodio::OutputStreamBuilder::open_default_stream()
                    .map_err(|e| Error::Playback(e.to_string()))?;
                let sink = Arc::new(rodio::Sink::connect_new(stream.mixer()));
                let source = rodio::Decoder::new(Cursor::new(bytes))
                    .map_err(|e| Error::Playback(format!("{}: {}", label, e)))?;

                let started = claim.start(Arc::clone(&sink), |sink| {
                    sink.set_volume(volume);
                    sink.append(source);
                });
                if !started {
                    debug!(url = %label, "clip cancelled before start");
                    return Ok(());
                }

                debug!(url = %label, "clip playing");
                sink.sleep_until_end();
                claim.finish();
                Ok(())
            })
            .await
            .map_err(|e| Error::Playback(e.to_string()))?
        }

        fn set_volume(&self, volume: f32) {
            set_output_volume(&self.current, volume);
        }
    }
}
