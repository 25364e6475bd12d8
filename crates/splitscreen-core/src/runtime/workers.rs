//! Background loops owned by the coordinator.
//!
//! Every loop sleeps through [`ShutdownSignal::wait`], so cancellation is
//! observed at each sleep or retry boundary.

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::thread;

use tracing::{debug, error, info, warn};

use super::{ModState, ShutdownSignal, SplitScreenMod, lock, try_lock};
use crate::error::Result;
use crate::hotkey::HotkeyPoller;
use crate::input::{assign_controllers, connected_devices};

/// Start every worker, registering each handle as soon as it exists.
pub(super) fn spawn_all(instance: &SplitScreenMod, shutdown: &Arc<ShutdownSignal>) -> Result<()> {
    type Worker = fn(&SplitScreenMod, &ShutdownSignal);
    let workers: [(&str, Worker); 4] = [
        ("splitscreen-install", run_installer),
        ("splitscreen-devices", run_device_mapper),
        ("splitscreen-camera", run_camera_tick),
        ("splitscreen-hotkeys", run_hotkeys),
    ];

    for (name, worker) in workers {
        let instance_for_thread = instance.clone();
        let shutdown = Arc::clone(shutdown);
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || worker(&instance_for_thread, &shutdown))?;
        lock(&instance.shared.workers).push(handle);
    }
    Ok(())
}

/// Bounded hook installation, gated on environment readiness.
fn run_installer(instance: &SplitScreenMod, shutdown: &ShutdownSignal) {
    let shared = &instance.shared;
    let timing = &shared.config.timing;

    if shutdown.wait(timing.startup_delay()) {
        return;
    }

    for attempt in 1..=timing.install_attempts {
        if shutdown.is_shutdown() {
            return;
        }

        if !shared.environment.is_ready() {
            debug!(
                "Environment not ready (attempt {}/{})",
                attempt, timing.install_attempts
            );
            if shutdown.wait(timing.not_ready_delay()) {
                return;
            }
            continue;
        }

        let result = {
            let mut hooks = lock(&shared.hooks);
            // A detach may have torn hooks down while this thread waited.
            if shutdown.is_shutdown() {
                return;
            }
            shared.installer.install(&mut hooks)
        };

        match result {
            Ok(()) => {
                shared.hooks_installed.store(true, Ordering::SeqCst);
                let mut state = lock(&shared.lifecycle);
                if *state == ModState::Attaching {
                    *state = ModState::Active;
                }
                drop(state);
                info!("Hooks installed on attempt {}", attempt);

                if !shared.registry.snapshot().is_valid() {
                    // The window may not have existed at attach time.
                    instance.rescan_offsets();
                }
                return;
            }
            Err(e) => {
                warn!(
                    "Hook installation failed (attempt {}/{}): {}",
                    attempt, timing.install_attempts, e
                );
                if shutdown.wait(timing.install_retry_delay()) {
                    return;
                }
            }
        }
    }

    shared.install_failed.store(true, Ordering::SeqCst);
    error!(
        "Hook installation gave up after {} attempts; split screen disabled for this session",
        timing.install_attempts
    );
}

fn run_device_mapper(instance: &SplitScreenMod, shutdown: &ShutdownSignal) {
    let shared = &instance.shared;
    loop {
        let connected = connected_devices(shared.input.as_ref());
        {
            let mut slots = lock(&shared.slots);
            assign_controllers(&mut slots, &connected);
        }
        if shutdown.wait(shared.config.timing.device_poll()) {
            break;
        }
    }
}

fn run_camera_tick(instance: &SplitScreenMod, shutdown: &ShutdownSignal) {
    let shared = &instance.shared;
    let tick = shared.config.timing.camera_tick();
    loop {
        let frame_delta = f32::from_bits(shared.delta_time.load(Ordering::Relaxed));
        let delta_time = if frame_delta > 0.0 {
            frame_delta
        } else {
            tick.as_secs_f32()
        };

        if let Some(mut slots) = try_lock(&shared.slots) {
            for slot in slots.iter_mut().filter(|slot| slot.active) {
                let input = slot.last_input;
                slot.camera.apply_input(&input, &shared.config.camera, delta_time);
            }
        }

        if shutdown.wait(tick) {
            break;
        }
    }
}

fn run_hotkeys(instance: &SplitScreenMod, shutdown: &ShutdownSignal) {
    let shared = &instance.shared;
    let mut poller = HotkeyPoller::new();
    loop {
        for action in poller.poll(shared.keys.as_ref(), &shared.config.hotkeys) {
            info!("Hotkey pressed: {}", action);
            instance.trigger(action);
        }
        if shutdown.wait(shared.config.timing.hotkey_poll()) {
            break;
        }
    }
}
