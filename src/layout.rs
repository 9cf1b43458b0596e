use crate::manifest::ClipDescriptor;

pub const IFRAME_ALLOW: &str = "autoplay; fullscreen; picture-in-picture";

/// Everything the page needs to build one clip section before any embed exists.
#[derive(Clone, Debug, PartialEq)]
pub struct ClipLayout {
    pub index: usize,
    pub title: String,
    /// Pixel offset applied to every section but the first.
    pub margin_top: Option<f64>,
    /// CSS `aspect-ratio` value of the frame.
    pub aspect_ratio: Option<String>,
    /// Parallax speed multiplier, `0.0` leaves the section in place.
    pub speed: f64,
}

impl ClipLayout {
    pub fn new(index: usize, clip: &ClipDescriptor) -> Self {
        let title = clip
            .title
            .as_deref()
            .filter(|title| !title.trim().is_empty())
            .unwrap_or("video")
            .to_string();

        Self {
            index,
            title,
            margin_top: clip.overlap.filter(|overlap| index > 0 && overlap.is_finite()),
            aspect_ratio: clip
                .aspect
                .filter(|aspect| aspect.is_finite() && *aspect > 0.0)
                .map(|aspect| format!("{aspect} / 1")),
            speed: clip.parallax.filter(|speed| speed.is_finite()).unwrap_or(0.0),
        }
    }

    /// Id of the frame element embeds are mounted into.
    pub fn frame_id(&self) -> String {
        frame_id(self.index)
    }

    pub fn section_style(&self) -> String {
        self.margin_top
            .map(|margin| format!("margin-top: {margin}px;"))
            .unwrap_or_default()
    }

    pub fn frame_style(&self) -> String {
        self.aspect_ratio
            .as_ref()
            .map(|ratio| format!("aspect-ratio: {ratio};"))
            .unwrap_or_default()
    }
}

pub fn frame_id(index: usize) -> String {
    format!("clip-{index}")
}
