//! Bindings to the Vimeo player SDK and the [`PlayerHandle`] built on them.
//!
//! Every SDK call returns a promise. Rejections are logged and dropped, the next health check
//! retries whatever did not take.

use js_sys::Promise;
use wasm_bindgen::JsCast;
use wasm_bindgen::closure::Closure;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::{JsFuture, spawn_local};
use web_sys::HtmlIFrameElement;

use crate::ClipId;
use crate::controller::PlayerHandle;
use crate::error::Error;
use crate::player::InternalEvent;

/// The player SDK. Defines `Vimeo.Player` on the window.
pub const PLAYER_SDK: &str = "https://player.vimeo.com/api/player.js";
const SDK_ELEMENT_ID: &str = "vimeo-player-sdk";

#[wasm_bindgen]
extern "C" {
    #[wasm_bindgen(js_namespace = Vimeo, js_name = Player)]
    pub type VimeoPlayer;

    #[wasm_bindgen(constructor, js_namespace = Vimeo, js_class = "Player", catch)]
    fn new(element: &HtmlIFrameElement) -> Result<VimeoPlayer, JsValue>;

    #[wasm_bindgen(method, catch)]
    fn ready(this: &VimeoPlayer) -> Result<Promise, JsValue>;

    #[wasm_bindgen(method, catch)]
    fn play(this: &VimeoPlayer) -> Result<Promise, JsValue>;

    #[wasm_bindgen(method, catch)]
    fn pause(this: &VimeoPlayer) -> Result<Promise, JsValue>;

    #[wasm_bindgen(method, catch)]
    fn unload(this: &VimeoPlayer) -> Result<Promise, JsValue>;

    #[wasm_bindgen(method, js_name = setCurrentTime, catch)]
    fn set_current_time(this: &VimeoPlayer, seconds: f64) -> Result<Promise, JsValue>;

    #[wasm_bindgen(method)]
    fn on(this: &VimeoPlayer, event: &str, callback: &js_sys::Function);

    #[wasm_bindgen(method)]
    fn off(this: &VimeoPlayer, event: &str);
}

pub struct VimeoHandle {
    clip: ClipId,
    player: VimeoPlayer,
    _timeupdate: Closure<dyn FnMut(JsValue)>,
}

impl VimeoHandle {
    /// Wraps the player living in `iframe` and forwards its readiness and progress.
    pub fn attach(
        iframe: &HtmlIFrameElement,
        clip: ClipId,
        generation: u32,
        sndr: flume::Sender<InternalEvent>,
    ) -> Result<Self, Error> {
        let player = VimeoPlayer::new(iframe).map_err(|e| Error::Mount(describe(&e)))?;

        let ready = player.ready().map_err(|e| Error::Mount(describe(&e)))?;
        let ready_sndr = sndr.clone();

        spawn_local(async move {
            match JsFuture::from(ready).await {
                Ok(_) => {
                    let _ = ready_sndr.send(InternalEvent::Ready { clip, generation });
                }
                Err(error) => {
                    tracing::debug!(
                        clip = clip.0,
                        generation,
                        error = %describe(&error),
                        "Player never became ready."
                    );
                }
            }
        });

        let timeupdate: Closure<dyn FnMut(JsValue)> = Closure::new(move |data: JsValue| {
            let Some(position) = js_sys::Reflect::get(&data, &"seconds".into())
                .ok()
                .and_then(|seconds| seconds.as_f64())
            else {
                return;
            };

            let _ = sndr.send(InternalEvent::Progress {
                clip,
                generation,
                position,
            });
        });

        player.on("timeupdate", timeupdate.as_ref().unchecked_ref());

        Ok(Self {
            clip,
            player,
            _timeupdate: timeupdate,
        })
    }

    fn request(&self, call: &'static str, promise: Result<Promise, JsValue>) -> Result<(), Error> {
        let promise = promise.map_err(|e| Error::PlayerCall(describe(&e)))?;
        let clip = self.clip;

        spawn_local(async move {
            if let Err(error) = JsFuture::from(promise).await {
                tracing::debug!(
                    clip = clip.0,
                    call,
                    error = %describe(&error),
                    "Player rejected call."
                );
            }
        });

        Ok(())
    }
}

impl PlayerHandle for VimeoHandle {
    fn play(&self) -> Result<(), Error> {
        self.request("play", self.player.play())
    }

    fn pause(&self) -> Result<(), Error> {
        self.request("pause", self.player.pause())
    }

    fn set_current_time(&self, seconds: f64) -> Result<(), Error> {
        self.request("setCurrentTime", self.player.set_current_time(seconds))
    }

    fn unload(&self) -> Result<(), Error> {
        self.request("unload", self.player.unload())
    }
}

impl Drop for VimeoHandle {
    fn drop(&mut self) {
        self.player.off("timeupdate");
    }
}

/// Whether `window.Vimeo.Player` exists yet.
pub fn sdk_ready() -> bool {
    js_sys::Reflect::get(&gloo_utils::window(), &"Vimeo".into())
        .ok()
        .filter(|vimeo| vimeo.is_object())
        .and_then(|vimeo| js_sys::Reflect::get(&vimeo, &"Player".into()).ok())
        .is_some_and(|player| player.is_function())
}

/// Adds a fresh SDK script to the page. Any earlier, unfinished one is replaced.
pub fn inject_sdk() -> Result<web_sys::Element, Error> {
    let document = gloo_utils::document();

    if let Some(stale) = document.get_element_by_id(SDK_ELEMENT_ID) {
        stale.remove();
    }

    let script = document
        .create_element("script")
        .map_err(|e| Error::Sdk(describe(&e)))?;

    for (name, value) in [("id", SDK_ELEMENT_ID), ("src", PLAYER_SDK), ("async", "")] {
        script
            .set_attribute(name, value)
            .map_err(|e| Error::Sdk(describe(&e)))?;
    }

    let head = document
        .head()
        .ok_or_else(|| Error::Sdk("document has no head".into()))?;
    head.append_child(&script)
        .map_err(|e| Error::Sdk(describe(&e)))?;

    Ok(script)
}

pub(crate) fn describe(value: &JsValue) -> String {
    value
        .dyn_ref::<js_sys::Error>()
        .and_then(|error| error.message().as_string())
        .or_else(|| value.as_string())
        .unwrap_or_else(|| format!("{value:?}"))
}
