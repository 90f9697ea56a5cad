use std::cell::Cell;
use std::collections::VecDeque;
use std::rc::Rc;

use crate::step::{FixedStep, TickReport};

/// The host's animation-frame primitive.
pub trait AnimationHost {
    /// Timestamp in milliseconds of the next frame, or `None` when the host
    /// has no more frames to give.
    fn next_frame(&mut self) -> Option<f64>;
}

/// Host fed with scripted timestamps.
#[derive(Debug, Clone, Default)]
pub struct ManualHost {
    frames: VecDeque<f64>,
}

impl ManualHost {
    pub fn new(timestamps: impl IntoIterator<Item = f64>) -> Self {
        Self {
            frames: timestamps.into_iter().collect(),
        }
    }

    /// `frames` timestamps spaced evenly at `fps`, starting at 0.
    pub fn at_fps(fps: f64, frames: usize) -> Self {
        let interval = if fps > 0.0 { 1000.0 / fps } else { 0.0 };
        Self::new((0..frames).map(|i| i as f64 * interval))
    }

    pub fn push(&mut self, timestamp: f64) {
        self.frames.push_back(timestamp);
    }

    pub fn remaining(&self) -> usize {
        self.frames.len()
    }
}

impl AnimationHost for ManualHost {
    fn next_frame(&mut self) -> Option<f64> {
        self.frames.pop_front()
    }
}

/// Shared stop flag for a running loop. Clones refer to the same loop.
#[derive(Debug, Clone, Default)]
pub struct LoopHandle {
    stopped: Rc<Cell<bool>>,
}

impl LoopHandle {
    /// Stop scheduling frames. A tick already in progress completes.
    pub fn stop(&self) {
        self.stopped.set(true);
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.get()
    }
}

/// Totals over one [`FrameLoop::run`].
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LoopStats {
    pub frames: u64,
    pub updates: u64,
    pub last: Option<TickReport>,
}

/// A [`FixedStep`] driven by an [`AnimationHost`].
#[derive(Debug, Default)]
pub struct FrameLoop {
    step: FixedStep,
    handle: LoopHandle,
}

impl FrameLoop {
    pub fn new(step: FixedStep) -> Self {
        Self {
            step,
            handle: LoopHandle::default(),
        }
    }

    pub fn handle(&self) -> LoopHandle {
        self.handle.clone()
    }

    pub fn step(&self) -> &FixedStep {
        &self.step
    }

    /// Pull frames from `host` until it runs dry or the loop is stopped.
    pub fn run<H, U, R>(&mut self, host: &mut H, mut update: U, mut render: R) -> LoopStats
    where
        H: AnimationHost + ?Sized,
        U: FnMut(f32),
        R: FnMut(u64),
    {
        let mut stats = LoopStats::default();
        while !self.handle.is_stopped() {
            let Some(now) = host.next_frame() else {
                break;
            };
            let report = self.step.advance(now, &mut update, &mut render);
            stats.frames += 1;
            stats.updates += u64::from(report.updates);
            stats.last = Some(report);
        }
        tracing::debug!(
            frames = stats.frames,
            updates = stats.updates,
            stopped = self.handle.is_stopped(),
            "frame loop finished"
        );
        stats
    }
}

/// Run a default 60 Hz loop over `host` until it runs dry.
pub fn start_loop<H, U, R>(host: &mut H, update: U, render: R) -> LoopStats
where
    H: AnimationHost + ?Sized,
    U: FnMut(f32),
    R: FnMut(u64),
{
    FrameLoop::new(FixedStep::default()).run(host, update, render)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_host_at_sixty_fps_updates_about_once_per_frame() {
        let mut host = ManualHost::at_fps(60.0, 61);
        let mut renders = 0;
        let stats = start_loop(&mut host, |_| {}, |_| renders += 1);
        assert_eq!(stats.frames, 61);
        assert_eq!(renders, 61);
        assert!((59..=60).contains(&stats.updates), "got {}", stats.updates);
        assert_eq!(host.remaining(), 0);
    }

    #[test]
    fn stop_inside_render_finishes_that_tick_only() {
        let mut frame_loop = FrameLoop::new(FixedStep::default());
        let handle = frame_loop.handle();
        let mut host = ManualHost::at_fps(30.0, 10);
        let mut rendered = Vec::new();
        let stats = frame_loop.run(
            &mut host,
            |_| {},
            |tick| {
                rendered.push(tick);
                if tick == 2 {
                    handle.stop();
                }
            },
        );
        assert_eq!(rendered, vec![0, 1, 2]);
        assert_eq!(stats.frames, 3);
        assert_eq!(host.remaining(), 7);
    }

    #[test]
    fn stopped_loop_pulls_no_frames() {
        let mut frame_loop = FrameLoop::default();
        frame_loop.handle().stop();
        let mut host = ManualHost::new([0.0, 16.0]);
        let stats = frame_loop.run(&mut host, |_| {}, |_| {});
        assert_eq!(stats.frames, 0);
        assert_eq!(host.remaining(), 2);
    }
}
