//! Background watchdogs.
//!
//! Two recurring timers run on the shared runtime: the control-availability
//! watchdog (15 s) and the mode-availability watchdog (5 s).  Both are
//! cancelled on system sleep and re-armed on wake; cancelling a watchdog
//! that never started is a no-op.
//!
//! Within a control tick, per-display work runs sequentially — a blocking
//! user prompt must never be issued concurrently for multiple displays from
//! the same tick.  A prompt suspends only the watchdog task and resolves via
//! the prompter's channel or its 60-second timeout.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use lux_core::{Capability, DisplayId, DisplayRecord};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::application::engine::EngineContext;
use crate::infrastructure::control::{Command, ControlBackend, ControlError};
use crate::infrastructure::prompt::{PromptRequest, PromptResponse};

pub const CONTROL_WATCHDOG_PERIOD: Duration = Duration::from_secs(15);
pub const MODE_WATCHDOG_PERIOD: Duration = Duration::from_secs(5);
/// A display is not re-prompted about fallback within this window.
pub const FALLBACK_PROMPT_COOLDOWN: Duration = Duration::from_secs(20 * 60);
/// A prompt resolves to the default response after this long.
pub const FALLBACK_PROMPT_TIMEOUT: Duration = Duration::from_secs(60);
/// Re-adaptation attempts after a backend reset.
pub const RESET_ATTEMPTS: u32 = 5;
/// Delay between reset re-adaptation attempts.
pub const RESET_DELAY: Duration = Duration::from_secs(3);

/// Handles of the two running watchdog tasks.
#[derive(Default)]
pub struct WatchdogTasks {
    control: Option<JoinHandle<()>>,
    mode: Option<JoinHandle<()>>,
}

impl WatchdogTasks {
    /// Aborts both tasks.  Safe to call when neither ever started.
    pub fn cancel_all(&mut self) {
        if let Some(task) = self.control.take() {
            task.abort();
        }
        if let Some(task) = self.mode.take() {
            task.abort();
        }
    }

    pub fn is_running(&self) -> bool {
        self.control.is_some() || self.mode.is_some()
    }
}

/// Arms both watchdogs.  Already-running watchdogs are left untouched.
pub fn start(ctx: &Arc<EngineContext>) {
    let mut tasks = ctx.watchdogs.lock().expect("lock poisoned");

    if tasks.control.is_none() {
        let ctx = Arc::clone(ctx);
        tasks.control = Some(tokio::spawn(async move {
            let start = tokio::time::Instant::now() + CONTROL_WATCHDOG_PERIOD;
            let mut interval = tokio::time::interval_at(start, CONTROL_WATCHDOG_PERIOD);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                control_tick(&ctx).await;
            }
        }));
    }

    if tasks.mode.is_none() {
        let ctx = Arc::clone(ctx);
        tasks.mode = Some(tokio::spawn(async move {
            let start = tokio::time::Instant::now() + MODE_WATCHDOG_PERIOD;
            let mut interval = tokio::time::interval_at(start, MODE_WATCHDOG_PERIOD);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                mode_tick(&ctx).await;
            }
        }));
    }
}

/// Cancels both watchdogs.  No-op when none are running.
pub fn stop(ctx: &Arc<EngineContext>) {
    ctx.watchdogs.lock().expect("lock poisoned").cancel_all();
}

/// Sleep/wake notification entry point.
pub async fn handle_power(ctx: &Arc<EngineContext>, asleep: bool) {
    ctx.screens_sleeping.store(asleep, Ordering::SeqCst);
    if asleep {
        stop(ctx);
        info!("screens asleep, watchdogs cancelled");
    } else {
        start(ctx);
        info!("screens awake, watchdogs re-armed");
        ctx.adapt_all(true).await;
    }
}

/// One pass of the control-availability watchdog.
///
/// Re-resolves each active display's backend and raises the fallback prompt
/// where warranted.  Entirely a no-op while the display set is asleep.
pub async fn control_tick(ctx: &Arc<EngineContext>) {
    if ctx.screens_sleeping.load(Ordering::SeqCst) {
        return;
    }

    let mut ids: Vec<DisplayId> = {
        let displays = ctx.displays.read().await;
        displays.values().filter(|d| d.active).map(|d| d.id).collect()
    };
    ids.sort_unstable();

    for id in ids {
        let Some(record) = ctx.displays.read().await.get(&id).cloned() else {
            continue;
        };
        let backend = ctx.collaborators.backends.select(&record).await;
        debug!(display = id, backend = ?backend.kind(), "control channel re-resolved");

        if should_prompt_about_fallback(ctx, &record, backend.as_ref()).await {
            prompt_fallback(ctx, &record).await;
        }
    }
}

/// One pass of the mode-availability watchdog.
pub async fn mode_tick(ctx: &Arc<EngineContext>) {
    if ctx.screens_sleeping.load(Ordering::SeqCst) {
        return;
    }
    ctx.auto_adapt_mode().await;
}

/// Whether the fallback prompt should be raised for this display now.
pub async fn should_prompt_about_fallback(
    ctx: &EngineContext,
    record: &DisplayRecord,
    backend: &dyn ControlBackend,
) -> bool {
    if record.never_fallback || !record.active {
        return false;
    }
    // Gamma is the fallback itself; nothing further to offer.
    if backend.kind() == Capability::Gamma {
        return false;
    }
    if ctx.screens_sleeping.load(Ordering::SeqCst) {
        return false;
    }
    if backend.is_responsive(record).await {
        return false;
    }
    let times = ctx.fallback_prompt_times.lock().await;
    match times.get(&record.id) {
        Some(last) => last.elapsed() >= FALLBACK_PROMPT_COOLDOWN,
        None => true,
    }
}

/// Raises the fallback prompt for one display and applies the decision.
///
/// Idempotent under concurrency: a second call while a prompt for the same
/// display is in flight returns immediately.
pub async fn prompt_fallback(ctx: &Arc<EngineContext>, record: &DisplayRecord) {
    if !ctx.prompts_in_flight.lock().await.insert(record.id) {
        return;
    }
    // The cooldown stamps at issue time, not at answer time.
    ctx.fallback_prompt_times
        .lock()
        .await
        .insert(record.id, Instant::now());

    warn!(
        display = record.id,
        name = %record.name,
        "display not responding to control commands"
    );

    let response = if record.always_fallback {
        PromptResponse::default_choice()
    } else {
        ctx.collaborators
            .prompter
            .ask(PromptRequest {
                id: Uuid::new_v4(),
                message: format!("Non-responsive display \"{}\"", record.name),
                info: "This display is not responding to commands on its current control \
                       channel.\n\nFall back to adjusting brightness in software?"
                    .to_string(),
                buttons: vec![
                    "Yes".to_string(),
                    "Not now".to_string(),
                    "No, never ask again".to_string(),
                ],
                suppression: Some(
                    "Always fall back to software controls for this display when needed"
                        .to_string(),
                ),
                timeout: FALLBACK_PROMPT_TIMEOUT,
            })
            .await
    };

    let mut persist = false;
    if response.suppressed {
        let mut displays = ctx.displays.write().await;
        if let Some(stored) = displays.get_mut(&record.id) {
            stored.always_fallback = true;
            persist = true;
        }
    }
    match response.button {
        0 => accept_gamma_fallback(ctx, record.id).await,
        2 => {
            let mut displays = ctx.displays.write().await;
            if let Some(stored) = displays.get_mut(&record.id) {
                stored.never_fallback = true;
                persist = true;
            }
        }
        _ => debug!(display = record.id, "fallback declined, retrying later"),
    }
    if persist {
        ctx.persist_displays().await;
    }

    ctx.prompts_in_flight.lock().await.remove(&record.id);
}

/// Switches the display to the gamma channel (by downgrading every hardware
/// channel for the session) and issues an immediate brightness write so the
/// panel re-renders linearly.
pub async fn accept_gamma_fallback(ctx: &Arc<EngineContext>, id: DisplayId) {
    {
        let mut displays = ctx.displays.write().await;
        if let Some(record) = displays.get_mut(&id) {
            for capability in [Capability::NativeApi, Capability::Ddc, Capability::Network] {
                record.downgrade(capability);
            }
        }
    }
    let record = ctx.displays.read().await.get(&id).cloned();
    if let Some(record) = record {
        info!(display = id, "gamma fallback accepted");
        let gamma = ctx.collaborators.backends.gamma();
        if let Err(e) = gamma
            .write(&record, Command::Brightness, record.brightness)
            .await
        {
            warn!(display = id, error = %e, "gamma fallback write failed");
        }
    }
}

/// Recovery operation for a wedged backend: calibration write, then repeated
/// forced re-adaptation with a fixed delay, to overcome display controllers
/// with eventual-consistency firmware.
pub async fn reset_control(ctx: &Arc<EngineContext>, id: DisplayId) -> Result<(), ControlError> {
    let record = ctx
        .displays
        .read()
        .await
        .get(&id)
        .cloned()
        .ok_or_else(|| ControlError::Bus(format!("unknown display {id}")))?;

    let backend = ctx.collaborators.backends.select(&record).await;
    backend.reset_state(&record).await?;

    if let Some(record) = ctx.displays.write().await.get_mut(&id) {
        record.clear_downgrades();
    }

    for attempt in 1..=RESET_ATTEMPTS {
        debug!(display = id, attempt, "forced re-adaptation after reset");
        ctx.adapt_all(true).await;
        if attempt < RESET_ATTEMPTS {
            tokio::time::sleep(RESET_DELAY).await;
        }
    }
    Ok(())
}
