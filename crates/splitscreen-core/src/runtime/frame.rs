//! Callbacks invoked on the host's own threads.
//!
//! Each entry point forwards to the original function exactly once. Internal
//! work runs inside `catch_unwind` and never blocks on a contended lock.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use tracing::{debug, info, warn};

use super::{FeatureState, SplitScreenMod, try_lock};
use crate::input::{GamepadState, MAX_PLAYERS, PlayerSlot, record_input};
use crate::memory::{Address, MemoryAccessExt, offset_address};
use crate::offset::{CameraLayout, OffsetName, OffsetRegistry};
use crate::render::split_viewports;

/// Longest frame delta fed to the camera simulation, in seconds.
const MAX_DELTA_TIME: f32 = 0.1;

/// Holds the "rendering in progress" flag for the current frame.
struct RenderGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> RenderGuard<'a> {
    fn try_acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for RenderGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

impl SplitScreenMod {
    /// Per-frame callback for the intercepted present call.
    ///
    /// A frame that arrives while another is still being processed skips the
    /// internal work. `forward` is always called exactly once.
    pub fn on_present<F, R>(&self, surface: Address, forward: F) -> R
    where
        F: FnOnce() -> R,
    {
        match RenderGuard::try_acquire(&self.shared.rendering) {
            Some(guard) => {
                if panic::catch_unwind(AssertUnwindSafe(|| self.process_frame(surface))).is_err() {
                    warn!("Frame processing panicked; frame forwarded unchanged");
                }
                drop(guard);
            }
            None => {
                self.shared.skipped_frames.fetch_add(1, Ordering::Relaxed);
            }
        }
        forward()
    }

    /// Resize callback: drop compositor resources tied to the old buffers.
    pub fn on_resize<F, R>(&self, forward: F) -> R
    where
        F: FnOnce() -> R,
    {
        if panic::catch_unwind(AssertUnwindSafe(|| self.shared.compositor.release())).is_err() {
            warn!("Compositor release panicked during resize");
        }
        forward()
    }

    /// Input-query callback. `forward` returns the host's result code and
    /// the state it reported, if any; that state is recorded afterwards.
    pub fn on_input_query<F>(&self, index: u32, forward: F) -> u32
    where
        F: FnOnce() -> (u32, Option<GamepadState>),
    {
        let (code, state) = forward();
        if let Some(state) = state
            && panic::catch_unwind(AssertUnwindSafe(|| self.record_input(index, state))).is_err()
        {
            warn!("Input recording panicked");
        }
        code
    }

    /// Store `state` in the slot bound to device `index`.
    ///
    /// Returns `false` when no slot is bound or the slots are busy.
    pub fn record_input(&self, index: u32, state: GamepadState) -> bool {
        match try_lock(&self.shared.slots) {
            Some(mut slots) => record_input(&mut slots, index, state),
            None => false,
        }
    }

    fn process_frame(&self, surface: Address) {
        let shared = &self.shared;
        let frame = shared.frames.fetch_add(1, Ordering::Relaxed) + 1;
        self.update_delta_time();

        let Some(registry) = shared.registry.try_snapshot() else {
            return;
        };
        // The game can flip these at any time, so read them every frame.
        let feature = self.read_feature_state(&registry);
        let render = shared.hooks_installed.load(Ordering::SeqCst)
            && feature.as_ref().is_some_and(FeatureState::should_render);
        shared.feature_active.store(render, Ordering::SeqCst);

        let interval = shared.config.timing.frame_log_interval;
        if interval > 0 && frame % interval == 0 {
            self.report_frame_rate(frame, feature);
        }

        if !render {
            return;
        }

        let viewports = shared
            .compositor
            .surface_size(surface)
            .map(|(width, height)| split_viewports(width, height, MAX_PLAYERS));
        if let Some(viewports) = &viewports {
            shared.compositor.compose(surface, viewports);
        }

        // Slots are busy while the device mapper rebinds; try again next frame.
        let Some(mut slots) = try_lock(&shared.slots) else {
            return;
        };
        if let Some(viewports) = &viewports {
            for (slot, viewport) in slots.iter_mut().zip(viewports) {
                slot.camera.set_aspect_ratio(viewport.aspect_ratio());
            }
        }
        self.inject_cameras(&registry, &mut slots);
    }

    fn update_delta_time(&self) {
        let Some(mut last) = try_lock(&self.shared.last_frame) else {
            return;
        };
        let now = Instant::now();
        if let Some(previous) = last.replace(now) {
            let delta = now.duration_since(previous).as_secs_f32().min(MAX_DELTA_TIME);
            self.shared
                .delta_time
                .store(delta.to_bits(), Ordering::Relaxed);
        }
    }

    fn report_frame_rate(&self, frame: u64, feature: Option<FeatureState>) {
        let Some(mut last) = try_lock(&self.shared.last_report) else {
            return;
        };
        let now = Instant::now();
        if let Some((at, frames_then)) = last.replace((now, frame)) {
            let elapsed = now.duration_since(at).as_secs_f64();
            if elapsed > 0.0 {
                let fps = (frame - frames_then) as f64 / elapsed;
                match feature {
                    Some(state) => info!(
                        "Frame {}: {:.1} fps, players = {}, split screen = {}",
                        frame, fps, state.player_count, state.split_screen_enabled
                    ),
                    None => info!("Frame {}: {:.1} fps, offsets unresolved", frame, fps),
                }
            }
        }
    }

    /// Write the active slots' cameras into the game's camera block.
    ///
    /// The game has a single camera block, so the last active slot wins.
    fn inject_cameras(&self, registry: &OffsetRegistry, slots: &mut [PlayerSlot]) {
        let (Some(base), Some(layout)) = (
            registry.address(OffsetName::CameraBase),
            registry.camera_layout(),
        ) else {
            return;
        };

        for slot in slots.iter_mut().filter(|slot| slot.active) {
            slot.camera.update();
            if let Err(e) = self.write_camera(base, &layout, slot) {
                debug!("Camera write for player {} failed: {}", slot.index, e);
            }
        }
    }

    fn write_camera(
        &self,
        base: Address,
        layout: &CameraLayout,
        slot: &PlayerSlot,
    ) -> crate::error::Result<()> {
        let memory = self.shared.memory.as_ref();
        if layout.view_matrix != 0 {
            memory.write_pod(offset_address(base, layout.view_matrix)?, &slot.camera.view_matrix())?;
        }
        if layout.projection_matrix != 0 {
            memory.write_pod(
                offset_address(base, layout.projection_matrix)?,
                &slot.camera.projection_matrix(),
            )?;
        }
        if layout.position != 0 {
            memory.write_pod(offset_address(base, layout.position)?, &slot.camera.position())?;
        }
        Ok(())
    }
}
