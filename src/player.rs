use crate::ReelState;
use crate::audio::{AudioUnlock, GESTURES};
use crate::config::{DeviceClass, DeviceHints, ReelConfig};
use crate::controller::Controller;
use crate::embed::{self, describe};
use crate::error::Error;
use crate::layout::ClipLayout;
use crate::manifest::Manifest;
use crate::parallax::{FrameGate, Parallax};
use crate::stage::DomStage;
use crate::ClipId;

use wasm_bindgen::JsCast;
use wasm_bindgen::closure::Closure;

use web_sys::{AddEventListenerOptions, EventTarget, HtmlAudioElement, HtmlElement};

use futures::StreamExt;
use futures::channel::mpsc::Receiver;
use futures::future::FutureExt;
use futures::stream::FuturesUnordered;

use gloo_timers::future::TimeoutFuture;

use core::future::Future;
use core::pin::Pin;
use core::time::Duration;

pub type ScheduledEvent = Pin<Box<dyn Future<Output = InternalEvent>>>;

pub struct ReelPlayer {
    config: ReelConfig,
    controller: Option<Controller<DomStage>>,

    /// Internal event queue is used to react to events such as those coming from event listeners
    /// and player callbacks, without blocking the UI in any way.
    rcvr: flume::Receiver<InternalEvent>,
    sndr: flume::Sender<InternalEvent>,

    scheduled_events: FuturesUnordered<ScheduledEvent>,

    sections: Vec<(HtmlElement, Parallax)>,
    frame_gate: FrameGate,

    audio: AudioUnlock,
    audio_element: Option<HtmlAudioElement>,

    /// Page listeners of the current reel. Dropping them detaches them.
    listeners: Vec<Listener>,
}

impl ReelPlayer {
    pub fn new() -> Self {
        let (sndr, rcvr) = flume::unbounded();

        Self {
            config: ReelConfig::default(),
            controller: None,
            sndr,
            rcvr,
            scheduled_events: FuturesUnordered::new(),
            sections: vec![],
            frame_gate: FrameGate::default(),
            audio: AudioUnlock::default(),
            audio_element: None,
            listeners: vec![],
        }
    }

    pub async fn listen(&mut self, mut cx: Receiver<ReelState>) -> Result<(), Error> {
        loop {
            let wake = futures::select_biased! {
                event = cx.next() => Wake::Command(event),
                event = self.rcvr.recv_async() => Wake::Internal(event.ok()),
                event = self.scheduled_events.next() => Wake::Scheduled(event),
            };

            match wake {
                Wake::Command(None) => {
                    tracing::info!("Breaking because events dropped.");
                    self.detach();
                    break;
                }
                Wake::Command(Some(ReelState::Created { root_id, manifest, tx })) => {
                    self.detach();

                    let result = self.attach(&root_id, &manifest);
                    if let Err(e) = &result {
                        tracing::error!(error = ?e, "Attach failed.");
                    }
                    if let Some(tx) = tx {
                        let _ = tx.send(result);
                    }
                }
                Wake::Command(Some(ReelState::Cleanup)) => {
                    self.detach();
                    break;
                }
                Wake::Internal(None) => {
                    tracing::info!("Breaking because internal_events dropped.");
                    break;
                }
                Wake::Internal(Some(event)) | Wake::Scheduled(Some(event)) => {
                    self.process_internal_event(event);
                }
                // An empty timer set yields `None` until something is scheduled again.
                Wake::Scheduled(None) => {}
            }
        }

        Ok(())
    }

    pub fn process_internal_event(&mut self, event: InternalEvent) {
        let now = now();

        match event {
            InternalEvent::Heartbeat => {
                if let Some(controller) = self.controller.as_mut() {
                    controller.tick(now);
                    self.schedule(InternalEvent::Heartbeat, self.config.heartbeat);
                }
            }
            InternalEvent::Ready { clip, generation } => {
                if let Some(controller) = self.controller.as_mut() {
                    controller.on_ready(clip, generation, now);
                }
            }
            InternalEvent::Progress {
                clip,
                generation,
                position,
            } => {
                if let Some(controller) = self.controller.as_mut() {
                    controller.on_progress(clip, generation, position, now);
                }
            }
            InternalEvent::ViewportChanged => {
                if let Some(controller) = self.controller.as_mut() {
                    controller.on_viewport_change(now);
                }
                self.request_frame();
            }
            InternalEvent::Frame => self.on_frame(),
            InternalEvent::Gesture => self.on_gesture(),
            InternalEvent::AudioResult { ok } => {
                if self.audio.on_play_result(ok) {
                    if let Some(audio) = &self.audio_element {
                        audio.load();
                    }
                    self.schedule(InternalEvent::AudioRetry, self.config.audio.retry_delay);
                } else if ok {
                    tracing::info!("Background audio playing.");
                } else {
                    tracing::warn!("Background audio refused to start.");
                }
            }
            InternalEvent::AudioRetry => self.play_audio(),
            InternalEvent::SdkLoaded => {
                tracing::info!("Player SDK loaded.");
                if let Some(controller) = self.controller.as_mut() {
                    controller.start(now);
                }
            }
            InternalEvent::SdkFailed => {
                // Without the SDK no embed can be driven, the placeholders stay empty.
                tracing::error!(src = embed::PLAYER_SDK, "Player SDK failed to load.");
            }
        }
    }

    fn attach(&mut self, root_id: &str, manifest: &Manifest) -> Result<(), Error> {
        tracing::info!(root_id, clips = manifest.len(), "Attaching reel");

        gloo_utils::document()
            .get_element_by_id(root_id)
            .ok_or_else(|| Error::MissingElement(root_id.to_string()))?;

        let device = DeviceClass::detect(&device_hints());
        self.config = ReelConfig::resolve(device, manifest.overrides());

        let layouts: Vec<ClipLayout> = manifest
            .clips()
            .iter()
            .enumerate()
            .map(|(index, clip)| ClipLayout::new(index, clip))
            .collect();

        self.sections = layouts
            .iter()
            .filter(|layout| layout.speed != 0.0)
            .filter_map(|layout| {
                let section = gloo_utils::document()
                    .get_element_by_id(&layout.frame_id())?
                    .parent_element()?
                    .dyn_into::<HtmlElement>()
                    .ok()?;
                Some((section, Parallax::new(layout.speed)))
            })
            .collect();

        let stage = DomStage::new(layouts, self.sndr.clone());
        let mut controller = Controller::new(self.config.clone(), manifest, stage);

        // Mounting waits for `Vimeo.Player`, every embed needs it.
        if embed::sdk_ready() {
            controller.start(now());
        } else {
            self.load_sdk()?;
        }
        self.controller = Some(controller);

        let window: EventTarget = gloo_utils::window().into();

        for event in ["scroll", "resize", "load"] {
            let sndr = self.sndr.clone();
            self.listen_to(&window, event, false, move || {
                let _ = sndr.send(InternalEvent::ViewportChanged);
            });
        }

        for event in GESTURES {
            let sndr = self.sndr.clone();
            self.listen_to(&window, event, true, move || {
                let _ = sndr.send(InternalEvent::Gesture);
            });
        }

        self.request_frame();
        self.schedule(InternalEvent::Heartbeat, self.config.heartbeat);

        Ok(())
    }

    /// Stops the current controller. Safe to call any number of times.
    fn detach(&mut self) {
        // Drop pending timers and swap the internal channel so stale callbacks go nowhere.
        self.scheduled_events = FuturesUnordered::new();
        let (sndr, rcvr) = flume::unbounded();

        self.sndr = sndr;
        self.rcvr = rcvr;

        if let Some(mut controller) = self.controller.take() {
            controller.stop();
        }

        self.listeners.clear();
        self.sections.clear();
        self.frame_gate.release();
    }

    fn load_sdk(&mut self) -> Result<(), Error> {
        tracing::info!(src = embed::PLAYER_SDK, "Loading player SDK...");

        let script: EventTarget = embed::inject_sdk()?.into();

        let sndr = self.sndr.clone();
        self.listen_to(&script, "load", true, move || {
            let _ = sndr.send(InternalEvent::SdkLoaded);
        });

        let sndr = self.sndr.clone();
        self.listen_to(&script, "error", true, move || {
            let _ = sndr.send(InternalEvent::SdkFailed);
        });

        Ok(())
    }

    fn listen_to(
        &mut self,
        target: &EventTarget,
        event: &'static str,
        once: bool,
        callback: impl FnMut() + 'static,
    ) {
        if let Some(listener) = Listener::add(target, event, once, callback) {
            self.listeners.push(listener);
        }
    }

    fn schedule(&mut self, event: InternalEvent, deadline: Duration) {
        self.scheduled_events.push(
            async move {
                TimeoutFuture::new(deadline.as_millis() as _).await;
                event
            }
            .boxed_local(),
        );
    }

    fn request_frame(&mut self) {
        if self.sections.is_empty() || !self.frame_gate.request() {
            return;
        }

        let sndr = self.sndr.clone();
        let callback = Closure::once_into_js(move || {
            let _ = sndr.send(InternalEvent::Frame);
        });

        if let Err(error) = gloo_utils::window().request_animation_frame(callback.unchecked_ref()) {
            tracing::debug!(error = %describe(&error), "Animation frame refused.");
            self.frame_gate.release();
        }
    }

    fn on_frame(&mut self) {
        self.frame_gate.release();

        let scroll_y = gloo_utils::window().scroll_y().unwrap_or(0.0);
        let mut more = false;

        for (section, parallax) in &mut self.sections {
            let (transform, moving) = parallax.step(scroll_y, &self.config.parallax);

            if let Some(transform) = transform {
                let _ = section.style().set_property("transform", &transform);
            }
            more |= moving;
        }

        if more {
            self.request_frame();
        }
    }

    fn on_gesture(&mut self) {
        if !self.audio.on_gesture() {
            return;
        }

        match HtmlAudioElement::new_with_src(&self.config.audio.src) {
            Ok(audio) => {
                audio.set_loop(true);
                audio.set_preload("auto");
                audio.set_volume(self.config.audio.volume);
                self.audio_element = Some(audio);
                self.play_audio();
            }
            Err(error) => {
                tracing::warn!(error = %describe(&error), "Audio element unavailable.");
            }
        }
    }

    fn play_audio(&mut self) {
        let Some(audio) = &self.audio_element else {
            return;
        };

        let sndr = self.sndr.clone();

        match audio.play() {
            Ok(promise) => wasm_bindgen_futures::spawn_local(async move {
                let ok = wasm_bindgen_futures::JsFuture::from(promise).await.is_ok();
                let _ = sndr.send(InternalEvent::AudioResult { ok });
            }),
            Err(_) => {
                let _ = sndr.send(InternalEvent::AudioResult { ok: false });
            }
        }
    }
}

impl Default for ReelPlayer {
    fn default() -> Self {
        Self::new()
    }
}

enum Wake {
    Command(Option<ReelState>),
    Internal(Option<InternalEvent>),
    Scheduled(Option<InternalEvent>),
}

pub enum InternalEvent {
    Heartbeat,
    Ready {
        clip: ClipId,
        generation: u32,
    },
    Progress {
        clip: ClipId,
        generation: u32,
        position: f64,
    },
    ViewportChanged,
    Frame,
    Gesture,
    AudioResult {
        ok: bool,
    },
    AudioRetry,
    SdkLoaded,
    SdkFailed,
}

/// Time since page load, the one clock every subsystem reads.
fn now() -> Duration {
    let millis = gloo_utils::window()
        .performance()
        .map(|performance| performance.now())
        .unwrap_or(0.0);

    Duration::from_secs_f64(millis.max(0.0) / 1000.0)
}

fn device_hints() -> DeviceHints {
    let window = gloo_utils::window();

    DeviceHints {
        viewport_width: window
            .inner_width()
            .ok()
            .and_then(|width| width.as_f64())
            .unwrap_or(0.0),
        coarse_pointer: window
            .match_media("(pointer: coarse)")
            .ok()
            .flatten()
            .is_some_and(|query| query.matches()),
        user_agent: window.navigator().user_agent().unwrap_or_default(),
    }
}

/// An event listener that is removed from its target when dropped.
struct Listener {
    target: EventTarget,
    event: &'static str,
    callback: Closure<dyn FnMut()>,
}

impl Listener {
    fn add(
        target: &EventTarget,
        event: &'static str,
        once: bool,
        callback: impl FnMut() + 'static,
    ) -> Option<Self> {
        let callback: Closure<dyn FnMut()> = Closure::new(callback);

        let options = AddEventListenerOptions::new();
        options.set_passive(true);
        options.set_once(once);

        if let Err(error) = target.add_event_listener_with_callback_and_add_event_listener_options(
            event,
            callback.as_ref().unchecked_ref(),
            &options,
        ) {
            tracing::debug!(event, error = %describe(&error), "Listener not added.");
            return None;
        }

        Some(Self {
            target: target.clone(),
            event,
            callback,
        })
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        let _ = self
            .target
            .remove_event_listener_with_callback(self.event, self.callback.as_ref().unchecked_ref());
    }
}
