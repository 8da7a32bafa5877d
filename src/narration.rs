//! Voice narration of personal health suggestions.
//!
//! The controller is the single owner of [`NarrationState`] and of the text
//! captured for the current session. Engines report progress through an
//! event channel registered once via [`NarrationEngine::subscribe`].

use crate::config::NarrationSettings;
use crate::error::NarrationError;
use std::ops::RangeInclusive;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Accepted speech rate multipliers.
pub const RATE_RANGE: RangeInclusive<f32> = 0.1..=10.0;
pub const PITCH_RANGE: RangeInclusive<f32> = 0.0..=2.0;
pub const VOLUME_RANGE: RangeInclusive<f32> = 0.0..=1.0;
/// Pacing bounds for [`PacedEngine`].
pub const WORDS_PER_SECOND_RANGE: RangeInclusive<f32> = 0.1..=50.0;

#[derive(Debug, Clone, PartialEq)]
pub struct Utterance {
    pub id: u64,
    pub text: String,
    pub lang: String,
    pub rate: f32,
    pub pitch: f32,
    pub volume: f32,
}

impl Utterance {
    /// Prefix followed by the suggestions joined with the separator.
    pub fn compose(
        id: u64,
        suggestions: &[String],
        settings: &NarrationSettings,
    ) -> Result<Self, NarrationError> {
        let parts: Vec<&str> = suggestions
            .iter()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .collect();
        if parts.is_empty() {
            return Err(NarrationError::EmptyContent);
        }

        Ok(Self {
            id,
            text: format!("{}{}", settings.prefix, parts.join(&settings.separator)),
            lang: settings.lang.clone(),
            rate: settings.rate,
            pitch: settings.pitch,
            volume: settings.volume,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineErrorCause {
    /// The utterance was cut off by a cancel request.
    Interrupted,
    Canceled,
    Other(String),
}

impl EngineErrorCause {
    pub fn is_cancellation(&self) -> bool {
        matches!(self, EngineErrorCause::Interrupted | EngineErrorCause::Canceled)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    Start { id: u64 },
    End { id: u64 },
    Error { id: u64, cause: EngineErrorCause },
}

impl EngineEvent {
    pub fn id(&self) -> u64 {
        match self {
            EngineEvent::Start { id } | EngineEvent::End { id } | EngineEvent::Error { id, .. } => *id,
        }
    }
}

/// Speech backend. Calls return immediately; outcomes arrive as events.
pub trait NarrationEngine: Send {
    fn subscribe(&mut self, listener: mpsc::UnboundedSender<EngineEvent>);
    fn speak(&mut self, utterance: Utterance) -> Result<(), NarrationError>;
    fn pause(&mut self);
    fn resume(&mut self);
    fn cancel(&mut self);
    /// An utterance is queued or playing.
    fn is_busy(&self) -> bool;
    /// Text revealed so far, for engines that render captions.
    fn caption(&self) -> String {
        String::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NarrationState {
    Idle,
    Speaking,
    Paused,
}

impl NarrationState {
    pub fn indicator(&self) -> &'static str {
        match self {
            NarrationState::Idle => "🔊 Narrate",
            NarrationState::Speaking => "⏸ Pause",
            NarrationState::Paused => "▶ Resume",
        }
    }
}

pub struct NarrationController<E: NarrationEngine> {
    engine: E,
    settings: NarrationSettings,
    state: NarrationState,
    /// Captured at submission, kept until the session ends.
    current: Option<Utterance>,
    awaiting_start: bool,
    next_id: u64,
    events: mpsc::UnboundedReceiver<EngineEvent>,
    notice: Option<String>,
}

impl<E: NarrationEngine> NarrationController<E> {
    pub fn new(mut engine: E, settings: NarrationSettings) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        engine.subscribe(tx);
        Self {
            engine,
            settings,
            state: NarrationState::Idle,
            current: None,
            awaiting_start: false,
            next_id: 0,
            events: rx,
            notice: None,
        }
    }

    pub fn state(&self) -> NarrationState {
        self.state
    }

    pub fn indicator(&self) -> &'static str {
        self.state.indicator()
    }

    pub fn captured_text(&self) -> Option<&str> {
        self.current.as_ref().map(|u| u.text.as_str())
    }

    pub fn is_awaiting_start(&self) -> bool {
        self.awaiting_start
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Last user-facing failure, cleared on read.
    pub fn take_notice(&mut self) -> Option<String> {
        self.notice.take()
    }

    /// Single-click action.
    ///
    /// From `Idle` the suggestions are captured and submitted; the state only
    /// becomes `Speaking` once the engine reports start.
    pub fn toggle(&mut self, suggestions: &[String]) -> Result<NarrationState, NarrationError> {
        match self.state {
            NarrationState::Idle if self.awaiting_start => {
                debug!("narration start pending, toggle ignored");
            }
            NarrationState::Idle => {
                let utterance = Utterance::compose(self.next_id + 1, suggestions, &self.settings)?;
                if self.engine.is_busy() {
                    info!("cancelling lingering narration session");
                    self.engine.cancel();
                }

                self.next_id = utterance.id;
                self.current = Some(utterance.clone());
                self.awaiting_start = true;
                if let Err(err) = self.engine.speak(utterance) {
                    warn!(error = %err, "narration engine refused utterance");
                    self.reset();
                    self.notice = Some(err.to_string());
                    return Err(err);
                }
                info!(id = self.next_id, "narration submitted");
            }
            NarrationState::Speaking => {
                self.engine.pause();
                self.state = NarrationState::Paused;
                info!("narration paused");
            }
            NarrationState::Paused => {
                self.engine.resume();
                self.state = NarrationState::Speaking;
                info!("narration resumed");
            }
        }
        Ok(self.state)
    }

    /// Double-click action. Cancels any session, including one awaiting start.
    pub fn stop(&mut self) {
        if self.state == NarrationState::Idle && !self.awaiting_start {
            debug!("stop ignored, nothing is narrating");
            return;
        }
        self.engine.cancel();
        self.reset();
        info!("narration stopped");
    }

    pub fn on_start(&mut self, id: u64) {
        if !self.is_current(id) {
            debug!(id, "ignoring start for superseded utterance");
            return;
        }
        self.awaiting_start = false;
        self.state = NarrationState::Speaking;
        debug!(id, "narration started");
    }

    pub fn on_end(&mut self, id: u64) {
        if !self.is_current(id) {
            debug!(id, "ignoring end for superseded utterance");
            return;
        }
        self.reset();
        info!(id, "narration finished");
    }

    pub fn on_error(&mut self, id: u64, cause: EngineErrorCause) {
        if !self.is_current(id) {
            debug!(id, ?cause, "ignoring error for superseded utterance");
            return;
        }
        self.reset();
        match cause {
            cause if cause.is_cancellation() => debug!(id, ?cause, "narration cancelled"),
            EngineErrorCause::Other(reason) => {
                warn!(id, reason = %reason, "narration engine error");
                self.notice = Some(NarrationError::Engine(reason).to_string());
            }
            _ => {}
        }
    }

    /// Apply every engine event received so far. Returns how many were seen.
    pub fn process_events(&mut self) -> usize {
        let mut seen = 0;
        while let Ok(event) = self.events.try_recv() {
            seen += 1;
            match event {
                EngineEvent::Start { id } => self.on_start(id),
                EngineEvent::End { id } => self.on_end(id),
                EngineEvent::Error { id, cause } => self.on_error(id, cause),
            }
        }
        seen
    }

    fn is_current(&self, id: u64) -> bool {
        self.current.as_ref().map(|u| u.id) == Some(id)
    }

    fn reset(&mut self) {
        self.state = NarrationState::Idle;
        self.current = None;
        self.awaiting_start = false;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Control {
    Run,
    Pause,
    Cancel,
}

struct Session {
    control: watch::Sender<Control>,
    task: JoinHandle<()>,
}

/// Terminal engine: reveals the utterance a word at a time into a caption.
///
/// Text without spaces (Chinese) is revealed a character at a time.
pub struct PacedEngine {
    words_per_second: f32,
    listener: Option<mpsc::UnboundedSender<EngineEvent>>,
    session: Option<Session>,
    caption: Arc<Mutex<String>>,
}

impl PacedEngine {
    pub fn new(words_per_second: f32) -> Self {
        Self {
            words_per_second: if words_per_second.is_finite() {
                words_per_second.clamp(*WORDS_PER_SECOND_RANGE.start(), *WORDS_PER_SECOND_RANGE.end())
            } else {
                3.0
            },
            listener: None,
            session: None,
            caption: Arc::new(Mutex::new(String::new())),
        }
    }

    fn units(text: &str) -> Vec<String> {
        let words: Vec<&str> = text.split_whitespace().collect();
        if words.len() > 1 {
            words.iter().map(|w| format!("{w} ")).collect()
        } else {
            text.chars().map(String::from).collect()
        }
    }

    fn signal(&self, control: Control) {
        if let Some(session) = &self.session {
            let _ = session.control.send(control);
        }
    }
}

impl NarrationEngine for PacedEngine {
    fn subscribe(&mut self, listener: mpsc::UnboundedSender<EngineEvent>) {
        self.listener = Some(listener);
    }

    fn speak(&mut self, utterance: Utterance) -> Result<(), NarrationError> {
        let listener = self
            .listener
            .clone()
            .ok_or_else(|| NarrationError::Engine("engine has no listener".into()))?;
        self.cancel();

        let rate = if utterance.rate.is_finite() && utterance.rate > 0.0 {
            utterance.rate.clamp(*RATE_RANGE.start(), *RATE_RANGE.end())
        } else {
            1.0
        };
        let interval = Duration::from_secs_f32(1.0 / (self.words_per_second * rate));
        let units = Self::units(&utterance.text);
        let caption = self.caption.clone();
        let (control, mut control_rx) = watch::channel(Control::Run);
        let id = utterance.id;

        let task = tokio::spawn(async move {
            if let Ok(mut c) = caption.lock() {
                c.clear();
            }
            let _ = listener.send(EngineEvent::Start { id });

            let interrupted = || {
                let _ = listener.send(EngineEvent::Error {
                    id,
                    cause: EngineErrorCause::Interrupted,
                });
            };

            for unit in units {
                loop {
                    let current = *control_rx.borrow_and_update();
                    match current {
                        Control::Cancel => return interrupted(),
                        Control::Pause => {
                            if control_rx.changed().await.is_err() {
                                return interrupted();
                            }
                        }
                        Control::Run => {
                            tokio::select! {
                                _ = tokio::time::sleep(interval) => break,
                                changed = control_rx.changed() => {
                                    if changed.is_err() {
                                        return interrupted();
                                    }
                                }
                            }
                        }
                    }
                }
                if let Ok(mut c) = caption.lock() {
                    c.push_str(&unit);
                }
            }

            let _ = listener.send(EngineEvent::End { id });
        });

        self.session = Some(Session { control, task });
        Ok(())
    }

    fn pause(&mut self) {
        self.signal(Control::Pause);
    }

    fn resume(&mut self) {
        self.signal(Control::Run);
    }

    fn cancel(&mut self) {
        if let Some(session) = self.session.take() {
            if !session.task.is_finished() {
                let _ = session.control.send(Control::Cancel);
            }
        }
    }

    fn is_busy(&self) -> bool {
        self.session
            .as_ref()
            .map(|s| !s.task.is_finished())
            .unwrap_or(false)
    }

    fn caption(&self) -> String {
        match self.caption.lock() {
            Ok(caption) => caption.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Engine that records calls; optionally confirms start immediately.
    #[derive(Clone, Default)]
    pub(crate) struct RecordingEngine {
        pub calls: Arc<Mutex<Vec<String>>>,
        pub spoken: Arc<Mutex<Vec<Utterance>>>,
        listener: Arc<Mutex<Option<mpsc::UnboundedSender<EngineEvent>>>>,
        busy: Arc<Mutex<bool>>,
        pub auto_start: bool,
        pub fail_speak: bool,
    }

    impl RecordingEngine {
        pub(crate) fn auto_start() -> Self {
            Self {
                auto_start: true,
                ..Self::default()
            }
        }

        pub(crate) fn emit(&self, event: EngineEvent) {
            if matches!(event, EngineEvent::End { .. } | EngineEvent::Error { .. }) {
                *self.busy.lock().unwrap() = false;
            }
            if let Some(tx) = self.listener.lock().unwrap().as_ref() {
                tx.send(event).unwrap();
            }
        }

        pub(crate) fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        pub(crate) fn last_id(&self) -> u64 {
            self.spoken.lock().unwrap().last().map(|u| u.id).unwrap_or(0)
        }

        fn record(&self, call: &str) {
            self.calls.lock().unwrap().push(call.to_string());
        }
    }

    impl NarrationEngine for RecordingEngine {
        fn subscribe(&mut self, listener: mpsc::UnboundedSender<EngineEvent>) {
            *self.listener.lock().unwrap() = Some(listener);
        }

        fn speak(&mut self, utterance: Utterance) -> Result<(), NarrationError> {
            self.record("speak");
            if self.fail_speak {
                return Err(NarrationError::Engine("no voices installed".into()));
            }
            let id = utterance.id;
            self.spoken.lock().unwrap().push(utterance);
            *self.busy.lock().unwrap() = true;
            if self.auto_start {
                self.emit(EngineEvent::Start { id });
            }
            Ok(())
        }

        fn pause(&mut self) {
            self.record("pause");
        }

        fn resume(&mut self) {
            self.record("resume");
        }

        fn cancel(&mut self) {
            self.record("cancel");
            *self.busy.lock().unwrap() = false;
        }

        fn is_busy(&self) -> bool {
            *self.busy.lock().unwrap()
        }
    }

    fn suggestions() -> Vec<String> {
        vec!["少盐饮食".to_string(), "每天步行三十分钟".to_string()]
    }

    fn controller(engine: RecordingEngine) -> NarrationController<RecordingEngine> {
        NarrationController::new(engine, NarrationSettings::default())
    }

    #[test]
    fn test_compose_text() {
        let utterance = Utterance::compose(1, &suggestions(), &NarrationSettings::default()).unwrap();
        assert_eq!(utterance.text, "个性化健康建议：少盐饮食。每天步行三十分钟");
        assert_eq!(utterance.lang, "zh-CN");
        assert_eq!(utterance.rate, 0.9);
    }

    #[test]
    fn test_empty_content_blocks_transition() {
        let engine = RecordingEngine::auto_start();
        let mut narration = controller(engine.clone());
        let blank = vec!["  ".to_string()];

        assert_eq!(narration.toggle(&[]), Err(NarrationError::EmptyContent));
        assert_eq!(narration.toggle(&blank), Err(NarrationError::EmptyContent));
        assert_eq!(narration.state(), NarrationState::Idle);
        assert!(engine.calls().is_empty());
    }

    #[test]
    fn test_speaking_only_after_engine_start() {
        let engine = RecordingEngine::default();
        let mut narration = controller(engine.clone());

        assert_eq!(narration.toggle(&suggestions()), Ok(NarrationState::Idle));
        assert!(narration.is_awaiting_start());
        assert_eq!(narration.indicator(), "🔊 Narrate");

        engine.emit(EngineEvent::Start { id: engine.last_id() });
        narration.process_events();
        assert_eq!(narration.state(), NarrationState::Speaking);
        assert_eq!(narration.indicator(), "⏸ Pause");
    }

    #[test]
    fn test_toggle_cycles_pause_and_resume() {
        let engine = RecordingEngine::auto_start();
        let mut narration = controller(engine.clone());

        narration.toggle(&suggestions()).unwrap();
        narration.process_events();
        assert_eq!(narration.state(), NarrationState::Speaking);

        assert_eq!(narration.toggle(&suggestions()), Ok(NarrationState::Paused));
        assert_eq!(narration.indicator(), "▶ Resume");
        assert_eq!(narration.toggle(&suggestions()), Ok(NarrationState::Speaking));
        assert_eq!(engine.calls(), vec!["speak", "pause", "resume"]);
    }

    #[test]
    fn test_captured_text_is_fixed_for_session() {
        let engine = RecordingEngine::auto_start();
        let mut narration = controller(engine.clone());

        narration.toggle(&suggestions()).unwrap();
        narration.process_events();
        let captured = narration.captured_text().unwrap().to_string();

        narration.toggle(&["完全不同的建议".to_string()]).unwrap();
        narration.toggle(&["完全不同的建议".to_string()]).unwrap();
        assert_eq!(narration.captured_text(), Some(captured.as_str()));
        assert_eq!(engine.spoken.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_stop_from_idle_is_noop() {
        let engine = RecordingEngine::auto_start();
        let mut narration = controller(engine.clone());
        narration.stop();
        assert_eq!(narration.state(), NarrationState::Idle);
        assert!(engine.calls().is_empty());
    }

    #[test]
    fn test_stop_from_paused_and_late_interrupt_suppressed() {
        let engine = RecordingEngine::auto_start();
        let mut narration = controller(engine.clone());
        narration.toggle(&suggestions()).unwrap();
        narration.process_events();
        narration.toggle(&suggestions()).unwrap();
        let id = engine.last_id();

        narration.stop();
        assert_eq!(narration.state(), NarrationState::Idle);
        assert!(narration.captured_text().is_none());

        engine.emit(EngineEvent::Error {
            id,
            cause: EngineErrorCause::Interrupted,
        });
        narration.process_events();
        assert_eq!(narration.state(), NarrationState::Idle);
        assert!(narration.take_notice().is_none());
    }

    #[test]
    fn test_on_end_always_idles() {
        for pause_first in [false, true] {
            let engine = RecordingEngine::auto_start();
            let mut narration = controller(engine.clone());
            narration.toggle(&suggestions()).unwrap();
            narration.process_events();
            if pause_first {
                narration.toggle(&suggestions()).unwrap();
                assert_eq!(narration.state(), NarrationState::Paused);
            }

            engine.emit(EngineEvent::End { id: engine.last_id() });
            narration.process_events();
            assert_eq!(narration.state(), NarrationState::Idle);
            assert!(narration.captured_text().is_none());
        }
    }

    #[test]
    fn test_cancel_cause_error_is_silent() {
        let engine = RecordingEngine::auto_start();
        let mut narration = controller(engine.clone());
        narration.toggle(&suggestions()).unwrap();
        narration.process_events();

        narration.on_error(engine.last_id(), EngineErrorCause::Canceled);
        assert_eq!(narration.state(), NarrationState::Idle);
        assert!(narration.take_notice().is_none());
    }

    #[test]
    fn test_engine_error_surfaces_notice() {
        let engine = RecordingEngine::auto_start();
        let mut narration = controller(engine.clone());
        narration.toggle(&suggestions()).unwrap();
        narration.process_events();

        engine.emit(EngineEvent::Error {
            id: engine.last_id(),
            cause: EngineErrorCause::Other("audio-busy".into()),
        });
        narration.process_events();
        assert_eq!(narration.state(), NarrationState::Idle);
        assert_eq!(
            narration.take_notice().as_deref(),
            Some("narration failed: audio-busy")
        );
    }

    #[test]
    fn test_refused_speak_surfaces_notice() {
        let engine = RecordingEngine {
            fail_speak: true,
            ..RecordingEngine::default()
        };
        let mut narration = controller(engine);
        assert!(matches!(
            narration.toggle(&suggestions()),
            Err(NarrationError::Engine(_))
        ));
        assert_eq!(narration.state(), NarrationState::Idle);
        assert!(!narration.is_awaiting_start());
        assert!(narration.take_notice().is_some());
    }

    #[test]
    fn test_stale_events_ignored() {
        let engine = RecordingEngine::auto_start();
        let mut narration = controller(engine.clone());
        narration.toggle(&suggestions()).unwrap();
        narration.process_events();
        let first = engine.last_id();
        engine.emit(EngineEvent::End { id: first });
        narration.process_events();

        narration.toggle(&suggestions()).unwrap();
        narration.process_events();
        assert_ne!(engine.last_id(), first);

        engine.emit(EngineEvent::End { id: first });
        engine.emit(EngineEvent::Start { id: first });
        narration.process_events();
        assert_eq!(narration.state(), NarrationState::Speaking);
    }

    #[test]
    fn test_toggle_while_awaiting_start_is_ignored() {
        let engine = RecordingEngine::default();
        let mut narration = controller(engine.clone());
        narration.toggle(&suggestions()).unwrap();
        narration.toggle(&suggestions()).unwrap();
        assert_eq!(engine.calls(), vec!["speak"]);

        // double click during the pending start still cancels
        narration.stop();
        assert!(!narration.is_awaiting_start());
        assert_eq!(engine.calls(), vec!["speak", "cancel"]);
    }

    #[test]
    fn test_lingering_session_cancelled_before_new_submission() {
        let engine = RecordingEngine::auto_start();
        let mut narration = controller(engine.clone());
        narration.toggle(&suggestions()).unwrap();
        narration.process_events();

        // controller idles on a cancel-cause error while the engine is still busy
        narration.on_error(engine.last_id(), EngineErrorCause::Interrupted);
        assert!(engine.is_busy());

        narration.toggle(&suggestions()).unwrap();
        assert_eq!(engine.calls(), vec!["speak", "cancel", "speak"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_paced_engine_reveals_then_ends() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut engine = PacedEngine::new(10.0);
        engine.subscribe(tx);

        let utterance = Utterance {
            id: 7,
            text: "eat more greens".into(),
            lang: "en-US".into(),
            rate: 1.0,
            pitch: 1.0,
            volume: 1.0,
        };
        engine.speak(utterance).unwrap();
        assert!(engine.is_busy());

        assert_eq!(rx.recv().await, Some(EngineEvent::Start { id: 7 }));
        assert_eq!(rx.recv().await, Some(EngineEvent::End { id: 7 }));
        assert_eq!(engine.caption().trim_end(), "eat more greens");
    }

    #[tokio::test(start_paused = true)]
    async fn test_paced_engine_clamps_extreme_pacing() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut engine = PacedEngine::new(f32::NAN);
        engine.subscribe(tx);

        let utterance = Utterance {
            id: 9,
            text: "rest".into(),
            lang: "en-US".into(),
            rate: 1e-30,
            pitch: 1.0,
            volume: 1.0,
        };
        engine.speak(utterance).unwrap();

        assert_eq!(rx.recv().await, Some(EngineEvent::Start { id: 9 }));
        assert_eq!(rx.recv().await, Some(EngineEvent::End { id: 9 }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_paced_engine_cancel_reports_interrupted() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut engine = PacedEngine::new(1.0);
        engine.subscribe(tx);

        let settings = NarrationSettings::default();
        engine
            .speak(Utterance::compose(3, &suggestions(), &settings).unwrap())
            .unwrap();
        assert_eq!(rx.recv().await, Some(EngineEvent::Start { id: 3 }));
        engine.cancel();

        assert_eq!(
            rx.recv().await,
            Some(EngineEvent::Error {
                id: 3,
                cause: EngineErrorCause::Interrupted
            })
        );
        assert!(!engine.is_busy());
    }

    #[tokio::test(start_paused = true)]
    async fn test_paced_engine_drives_controller() {
        let mut narration = NarrationController::new(PacedEngine::new(50.0), NarrationSettings::default());
        narration.toggle(&suggestions()).unwrap();

        tokio::time::sleep(Duration::from_millis(1)).await;
        narration.process_events();
        assert_eq!(narration.state(), NarrationState::Speaking);

        tokio::time::sleep(Duration::from_secs(5)).await;
        narration.process_events();
        assert_eq!(narration.state(), NarrationState::Idle);
        assert!(narration.engine().caption().starts_with("个性化健康建议"));
    }
}
