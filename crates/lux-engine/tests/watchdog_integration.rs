//! Integration tests for the control-availability watchdog and the fallback
//! prompt flow.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use lux_core::{Capability, HardwareAttributes};
use lux_engine::application::{engine, registry, watchdog};
use lux_engine::infrastructure::control::mock::MockControl;
use lux_engine::infrastructure::enumeration::MockEnumerator;
use lux_engine::infrastructure::location::StaticLocation;
use lux_engine::infrastructure::prompt::{PromptRequest, PromptResponse, Prompter};
use lux_engine::infrastructure::sensor::MockSensor;
use lux_engine::infrastructure::storage::datastore::MemoryDatastore;
use lux_engine::{BackendSet, Command};

/// Prompter returning scripted responses and counting every ask.
struct ScriptedPrompter {
    responses: Mutex<VecDeque<PromptResponse>>,
    asks: AtomicU32,
    delay: Option<Duration>,
}

impl ScriptedPrompter {
    fn new(responses: Vec<PromptResponse>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            asks: AtomicU32::new(0),
            delay: None,
        }
    }

    fn slow(responses: Vec<PromptResponse>, delay: Duration) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            asks: AtomicU32::new(0),
            delay: Some(delay),
        }
    }

    fn asks(&self) -> u32 {
        self.asks.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Prompter for ScriptedPrompter {
    async fn ask(&self, _request: PromptRequest) -> PromptResponse {
        self.asks.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.responses
            .lock()
            .expect("lock poisoned")
            .pop_front()
            .unwrap_or_else(PromptResponse::default_choice)
    }
}

struct Harness {
    ctx: Arc<engine::EngineContext>,
    enumerator: Arc<MockEnumerator>,
    prompter: Arc<ScriptedPrompter>,
    ddc: Arc<MockControl>,
    gamma: Arc<MockControl>,
}

fn attrs(name: &str, serial: i64) -> HardwareAttributes {
    HardwareAttributes {
        name: name.to_string(),
        serial_number: serial,
        product_id: 100,
        manufacture_year: 2020,
        vendor_id: None,
    }
}

fn harness(prompter: ScriptedPrompter) -> Harness {
    let enumerator = Arc::new(MockEnumerator::new());
    let prompter = Arc::new(prompter);
    let ddc = Arc::new(MockControl::new(Capability::Ddc));
    let gamma = Arc::new(MockControl::new(Capability::Gamma));

    let backends = BackendSet::new(Arc::clone(&gamma) as Arc<dyn lux_engine::ControlBackend>)
        .with_ddc(Arc::clone(&ddc) as Arc<dyn lux_engine::ControlBackend>);

    let collaborators = engine::Collaborators {
        datastore: Arc::new(MemoryDatastore::new()),
        enumerator: Arc::clone(&enumerator)
            as Arc<dyn lux_engine::infrastructure::enumeration::DisplayEnumerator>,
        backends: Arc::new(backends),
        sensor: Arc::new(MockSensor::new()),
        location: Arc::new(StaticLocation::new(None)),
        prompter: Arc::clone(&prompter) as Arc<dyn Prompter>,
        topology: Arc::new(engine::NullTopology),
        audio: Arc::new(engine::NoAudio),
    };

    Harness {
        ctx: engine::EngineContext::new(engine::EngineConfig::default(), collaborators),
        enumerator,
        prompter,
        ddc,
        gamma,
    }
}

async fn connect_one(h: &Harness) {
    h.enumerator.connect(1, "Display", attrs("Display", 1));
    registry::refresh(&h.ctx).await;
}

// ── Fallback prompt flow ──────────────────────────────────────────────────────

#[tokio::test]
async fn test_responsive_backend_never_prompts() {
    let h = harness(ScriptedPrompter::new(vec![]));
    connect_one(&h).await;

    watchdog::control_tick(&h.ctx).await;

    assert_eq!(h.prompter.asks(), 0);
}

#[tokio::test]
async fn test_unresponsive_backend_prompts_and_accept_switches_to_gamma() {
    // Button 0 = accept the gamma fallback.
    let h = harness(ScriptedPrompter::new(vec![PromptResponse {
        button: 0,
        suppressed: false,
    }]));
    connect_one(&h).await;
    {
        let mut displays = h.ctx.displays.write().await;
        displays.get_mut(&1).unwrap().brightness = 64;
    }
    h.ddc.set_responsive(false);

    watchdog::control_tick(&h.ctx).await;

    assert_eq!(h.prompter.asks(), 1);
    // Every hardware channel is downgraded; selection now derives gamma.
    let record = h.ctx.displays.read().await.get(&1).cloned().unwrap();
    assert!(record.is_downgraded(Capability::Ddc));
    let selected = h.ctx.collaborators.backends.select(&record).await;
    assert_eq!(selected.kind(), Capability::Gamma);
    // Acceptance issued an immediate brightness write through gamma.
    assert_eq!(h.gamma.writes(), vec![(1, Command::Brightness, 64)]);
}

#[tokio::test]
async fn test_prompt_not_reissued_within_cooldown_window() {
    let h = harness(ScriptedPrompter::new(vec![PromptResponse {
        button: 1, // "Not now"
        suppressed: false,
    }]));
    connect_one(&h).await;
    h.ddc.set_responsive(false);

    // Probed unresponsive on every tick, but only the first one prompts.
    watchdog::control_tick(&h.ctx).await;
    watchdog::control_tick(&h.ctx).await;
    watchdog::control_tick(&h.ctx).await;

    assert_eq!(h.prompter.asks(), 1);
}

#[tokio::test]
async fn test_decline_permanently_sets_never_fallback() {
    let h = harness(ScriptedPrompter::new(vec![PromptResponse {
        button: 2, // "No, never ask again"
        suppressed: false,
    }]));
    connect_one(&h).await;
    h.ddc.set_responsive(false);

    watchdog::control_tick(&h.ctx).await;

    let record = h.ctx.displays.read().await.get(&1).cloned().unwrap();
    assert!(record.never_fallback);
    // No gamma switch happened.
    assert!(!record.is_downgraded(Capability::Ddc));
    assert!(h.gamma.writes().is_empty());

    // A display that declined permanently is never asked again, cooldown or
    // not.
    h.ctx.fallback_prompt_times.lock().await.clear();
    watchdog::control_tick(&h.ctx).await;
    assert_eq!(h.prompter.asks(), 1);
}

#[tokio::test]
async fn test_suppression_checkbox_sets_always_fallback() {
    let h = harness(ScriptedPrompter::new(vec![PromptResponse {
        button: 1,
        suppressed: true,
    }]));
    connect_one(&h).await;
    h.ddc.set_responsive(false);

    watchdog::control_tick(&h.ctx).await;

    assert!(h.ctx.displays.read().await.get(&1).unwrap().always_fallback);
}

#[tokio::test]
async fn test_always_fallback_auto_accepts_without_prompting() {
    let h = harness(ScriptedPrompter::new(vec![]));
    connect_one(&h).await;
    {
        let mut displays = h.ctx.displays.write().await;
        let record = displays.get_mut(&1).unwrap();
        record.always_fallback = true;
        record.brightness = 40;
    }
    h.ddc.set_responsive(false);

    watchdog::control_tick(&h.ctx).await;

    assert_eq!(h.prompter.asks(), 0, "auto-accept must not prompt");
    assert_eq!(h.gamma.writes(), vec![(1, Command::Brightness, 40)]);
}

#[tokio::test]
async fn test_control_tick_is_a_no_op_while_screens_sleep() {
    let h = harness(ScriptedPrompter::new(vec![]));
    connect_one(&h).await;
    h.ddc.set_responsive(false);
    h.ctx
        .screens_sleeping
        .store(true, Ordering::SeqCst);

    watchdog::control_tick(&h.ctx).await;

    assert_eq!(h.prompter.asks(), 0);
    assert!(h.gamma.writes().is_empty());
}

#[tokio::test]
async fn test_at_most_one_prompt_in_flight_per_display() {
    let h = harness(ScriptedPrompter::slow(
        vec![
            PromptResponse {
                button: 1,
                suppressed: false,
            },
            PromptResponse {
                button: 1,
                suppressed: false,
            },
        ],
        Duration::from_millis(50),
    ));
    connect_one(&h).await;
    h.ddc.set_responsive(false);

    let record = h.ctx.displays.read().await.get(&1).cloned().unwrap();
    let first = {
        let ctx = Arc::clone(&h.ctx);
        let record = record.clone();
        tokio::spawn(async move { watchdog::prompt_fallback(&ctx, &record).await })
    };
    let second = {
        let ctx = Arc::clone(&h.ctx);
        tokio::spawn(async move { watchdog::prompt_fallback(&ctx, &record).await })
    };
    first.await.unwrap();
    second.await.unwrap();

    assert_eq!(h.prompter.asks(), 1, "concurrent prompt must deduplicate");
}

// ── Watchdog lifecycle ────────────────────────────────────────────────────────

#[tokio::test]
async fn test_cancel_before_start_is_safe_and_start_is_idempotent() {
    let h = harness(ScriptedPrompter::new(vec![]));

    // Never started: cancelling is a no-op.
    watchdog::stop(&h.ctx);
    assert!(!h.ctx.watchdogs.lock().unwrap().is_running());

    watchdog::start(&h.ctx);
    watchdog::start(&h.ctx);
    assert!(h.ctx.watchdogs.lock().unwrap().is_running());

    watchdog::stop(&h.ctx);
    watchdog::stop(&h.ctx);
    assert!(!h.ctx.watchdogs.lock().unwrap().is_running());
}

#[tokio::test]
async fn test_sleep_cancels_watchdogs_and_wake_rearms_them() {
    let h = harness(ScriptedPrompter::new(vec![]));
    connect_one(&h).await;

    watchdog::start(&h.ctx);
    watchdog::handle_power(&h.ctx, true).await;
    assert!(!h.ctx.watchdogs.lock().unwrap().is_running());
    assert!(h.ctx.screens_sleeping.load(Ordering::SeqCst));

    watchdog::handle_power(&h.ctx, false).await;
    assert!(h.ctx.watchdogs.lock().unwrap().is_running());
    assert!(!h.ctx.screens_sleeping.load(Ordering::SeqCst));

    watchdog::stop(&h.ctx);
}

// ── Reset recovery ────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_reset_control_calibrates_and_readapts_with_fixed_attempts() {
    let h = harness(ScriptedPrompter::new(vec![]));
    connect_one(&h).await;
    {
        let mut displays = h.ctx.displays.write().await;
        displays.get_mut(&1).unwrap().downgrade(Capability::Ddc);
    }

    watchdog::reset_control(&h.ctx, 1).await.unwrap();

    // The calibration sequence ran once on the selected backend (gamma,
    // since DDC was downgraded), and the downgrade was cleared.
    assert_eq!(h.gamma.reset_count(), 1);
    assert!(!h
        .ctx
        .displays
        .read()
        .await
        .get(&1)
        .unwrap()
        .is_downgraded(Capability::Ddc));
}

#[tokio::test(start_paused = true)]
async fn test_reset_control_unknown_display_errors_without_panic() {
    let h = harness(ScriptedPrompter::new(vec![]));
    assert!(watchdog::reset_control(&h.ctx, 99).await.is_err());
}
