//! Asynchronous texture loading.
//!
//! Image sources run on worker threads; results come back over a channel
//! and are installed by whoever owns the [`GpuContext`], usually the render
//! stage calling [`TextureLoader::poll`] once per frame. Until then the
//! texture keeps sampling its placeholder.

use std::collections::HashSet;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, unbounded};

use crate::context::GpuContext;
use crate::error::LoadError;
use crate::handle::TextureId;
use crate::types::ImageData;

type LoadResult = (TextureId, Result<ImageData, LoadError>);

pub struct TextureLoader {
    tx: Sender<LoadResult>,
    rx: Receiver<LoadResult>,
    pending: HashSet<TextureId>,
    ready: HashSet<TextureId>,
}

impl Default for TextureLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl TextureLoader {
    pub fn new() -> Self {
        let (tx, rx) = unbounded();
        Self {
            tx,
            rx,
            pending: HashSet::new(),
            ready: HashSet::new(),
        }
    }

    /// Run `source` on a worker thread; its image will replace the contents
    /// of `texture` on a later [`poll`](Self::poll).
    pub fn request<F>(&mut self, texture: TextureId, source: F)
    where
        F: FnOnce() -> Result<ImageData, LoadError> + Send + 'static,
    {
        self.pending.insert(texture);
        self.ready.remove(&texture);
        let tx = self.tx.clone();
        let spawned = thread::Builder::new()
            .name(format!("texture-load-{}", texture.raw()))
            .spawn(move || {
                // Receiver gone means the loader was dropped; nothing to do.
                let _ = tx.send((texture, source()));
            });
        if let Err(err) = spawned {
            tracing::error!(%texture, %err, "failed to spawn texture loader thread");
            self.pending.remove(&texture);
        }
    }

    pub fn is_ready(&self, texture: TextureId) -> bool {
        self.ready.contains(&texture)
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Install every completed image. Returns how many were installed.
    pub fn poll(&mut self, ctx: &mut GpuContext) -> usize {
        let results: Vec<_> = self.rx.try_iter().collect();
        let mut installed = 0;
        for (texture, result) in results {
            if self.install(ctx, texture, &result) {
                installed += 1;
            }
        }
        installed
    }

    /// Block until every pending request finished or `timeout` elapsed.
    /// Returns how many images were installed.
    pub fn wait_all(&mut self, ctx: &mut GpuContext, timeout: Duration) -> usize {
        let deadline = Instant::now() + timeout;
        let mut installed = 0;
        while !self.pending.is_empty() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.rx.recv_timeout(remaining) {
                Ok((texture, result)) => {
                    if self.install(ctx, texture, &result) {
                        installed += 1;
                    }
                }
                Err(RecvTimeoutError::Timeout) => {
                    tracing::warn!(pending = self.pending.len(), "texture loads timed out");
                    break;
                }
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        installed
    }

    fn install(
        &mut self,
        ctx: &mut GpuContext,
        texture: TextureId,
        result: &Result<ImageData, LoadError>,
    ) -> bool {
        self.pending.remove(&texture);
        match result {
            Ok(image) => {
                ctx.set_texture_image(texture, image);
                self.ready.insert(texture);
                tracing::debug!(%texture, width = image.width, height = image.height, "texture loaded");
                true
            }
            Err(err) => {
                tracing::warn!(%texture, %err, "texture load failed, keeping placeholder");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headless::HeadlessDevice;
    use crate::types::PLACEHOLDER_TEXEL;

    fn ctx() -> GpuContext {
        GpuContext::new(Box::new(HeadlessDevice::new(8, 8)), 8, 8)
    }

    #[test]
    fn placeholder_until_polled_then_loaded() {
        let mut ctx = ctx();
        let tex = ctx.create_texture();
        let mut loader = TextureLoader::new();
        loader.request(tex, || Ok(ImageData::solid(2, 2, [10, 20, 30, 255])));

        let dev = ctx.device_as::<HeadlessDevice>().unwrap();
        assert_eq!(dev.texel(tex, 0.5, 0.5), Some(PLACEHOLDER_TEXEL));
        assert!(!loader.is_ready(tex));

        assert_eq!(loader.wait_all(&mut ctx, Duration::from_secs(5)), 1);
        assert!(loader.is_ready(tex));
        let dev = ctx.device_as::<HeadlessDevice>().unwrap();
        assert_eq!(dev.texel(tex, 0.5, 0.5), Some([10, 20, 30, 255]));
    }

    #[test]
    fn failed_source_keeps_placeholder() {
        let mut ctx = ctx();
        let tex = ctx.create_texture();
        let mut loader = TextureLoader::new();
        loader.request(tex, || Err(LoadError::Source("missing file".into())));
        assert_eq!(loader.wait_all(&mut ctx, Duration::from_secs(5)), 0);
        assert!(!loader.is_ready(tex));
        assert_eq!(loader.pending(), 0);
        let dev = ctx.device_as::<HeadlessDevice>().unwrap();
        assert_eq!(dev.texel(tex, 0.0, 0.0), Some(PLACEHOLDER_TEXEL));
    }

    #[test]
    fn poll_without_results_installs_nothing() {
        let mut ctx = ctx();
        let mut loader = TextureLoader::new();
        assert_eq!(loader.poll(&mut ctx), 0);
    }
}
