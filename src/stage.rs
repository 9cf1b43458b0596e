use std::collections::HashMap;

use wasm_bindgen::JsCast;
use web_sys::{Element, HtmlIFrameElement};

use crate::ClipId;
use crate::controller::Stage;
use crate::embed::{VimeoHandle, describe};
use crate::error::Error;
use crate::layout::{ClipLayout, IFRAME_ALLOW};
use crate::orchestrator::{Bounds, Viewport};
use crate::player::InternalEvent;

/// Mounts iframes into the frame elements rendered for each clip.
pub struct DomStage {
    layouts: Vec<ClipLayout>,
    sndr: flume::Sender<InternalEvent>,
    iframes: HashMap<ClipId, HtmlIFrameElement>,
}

impl DomStage {
    pub fn new(layouts: Vec<ClipLayout>, sndr: flume::Sender<InternalEvent>) -> Self {
        Self {
            layouts,
            sndr,
            iframes: HashMap::new(),
        }
    }

    fn frame(&self, clip: ClipId) -> Result<Element, Error> {
        let id = crate::layout::frame_id(clip.0);

        gloo_utils::document()
            .get_element_by_id(&id)
            .ok_or(Error::MissingElement(id))
    }

    fn create_iframe(&self, clip: ClipId, src: &str) -> Result<HtmlIFrameElement, Error> {
        let title = self
            .layouts
            .get(clip.0)
            .map(|layout| layout.title.as_str())
            .unwrap_or("video");

        let iframe = gloo_utils::document()
            .create_element("iframe")
            .map_err(|e| Error::Mount(describe(&e)))?
            .dyn_into::<HtmlIFrameElement>()
            .map_err(|_| Error::Mount("not an iframe".into()))?;

        iframe.set_src(src);
        iframe.set_title(title);

        for (name, value) in [
            ("allow", IFRAME_ALLOW),
            ("frameborder", "0"),
            ("playsinline", ""),
            ("webkit-playsinline", ""),
        ] {
            iframe
                .set_attribute(name, value)
                .map_err(|e| Error::Mount(describe(&e)))?;
        }

        Ok(iframe)
    }
}

impl Stage for DomStage {
    type Handle = VimeoHandle;

    fn mount(&mut self, clip: ClipId, generation: u32, src: &str) -> Result<VimeoHandle, Error> {
        let frame = self.frame(clip)?;

        // Never two iframes under one frame, whatever the bookkeeping says.
        self.unmount(clip);
        frame.set_inner_html("");

        let iframe = self.create_iframe(clip, src)?;
        frame
            .append_child(&iframe)
            .map_err(|e| Error::Mount(describe(&e)))?;

        self.iframes.insert(clip, iframe.clone());

        VimeoHandle::attach(&iframe, clip, generation, self.sndr.clone())
    }

    fn unmount(&mut self, clip: ClipId) {
        if let Some(iframe) = self.iframes.remove(&clip) {
            iframe.remove();
        }
    }

    fn bounds(&self, clip: ClipId) -> Option<Bounds> {
        let rect = self.frame(clip).ok()?.get_bounding_client_rect();

        Some(Bounds {
            top: rect.top(),
            height: rect.height(),
        })
    }

    fn viewport(&self) -> Viewport {
        let height = gloo_utils::window()
            .inner_height()
            .ok()
            .and_then(|height| height.as_f64())
            .unwrap_or(0.0);

        Viewport { height }
    }
}
