#[cfg(target_arch = "wasm32")]
mod app {
    use dioxus::prelude::*;
    use showreel::layout::ClipLayout;
    use showreel::{Manifest, Reel, manifest};

    const ROOT_ID: &str = "reel";
    const MANIFEST_PATH: &str = "./assets/js/manifest.json";

    #[component]
    pub fn App() -> Element {
        let manifest = use_resource(|| async move {
            let location = manifest_location()?;
            let now = js_sys::Date::now() as u64;

            match manifest::fetch(&location, now).await {
                Ok(manifest) => Some(manifest),
                Err(error) => {
                    // The reel simply stays empty.
                    tracing::error!(%error, "Manifest unavailable.");
                    None
                }
            }
        });

        match &*manifest.read() {
            Some(Some(manifest)) => rsx! {
                ReelView { manifest: manifest.clone() }
            },
            _ => rsx! {
                main { id: ROOT_ID }
            },
        }
    }

    #[component]
    fn ReelView(manifest: Manifest) -> Element {
        let reel = use_hook(Reel::new);

        let layouts: Vec<ClipLayout> = manifest
            .clips()
            .iter()
            .enumerate()
            .map(|(index, clip)| ClipLayout::new(index, clip))
            .collect();

        use_effect({
            let reel = reel.clone();
            move || {
                let reel = reel.clone();
                let manifest = manifest.clone();

                spawn(async move {
                    let _ = reel.create(ROOT_ID.to_string(), manifest).await;
                });
            }
        });

        use_drop(move || reel.destroy());

        rsx! {
            main { id: ROOT_ID,
                for layout in layouts {
                    section {
                        key: "{layout.index}",
                        class: "clip",
                        style: layout.section_style(),
                        "data-speed": layout.speed.to_string(),
                        div {
                            class: "frame",
                            id: layout.frame_id(),
                            style: layout.frame_style(),
                        }
                    }
                }
            }
        }
    }

    fn manifest_location() -> Option<String> {
        let href = gloo_utils::window().location().href().ok()?;
        let base = url::Url::parse(&href).ok()?;

        Some(base.join(MANIFEST_PATH).ok()?.to_string())
    }
}

#[cfg(target_arch = "wasm32")]
fn main() {
    tracing_wasm::set_as_global_default();
    dioxus::launch(app::App);
}

#[cfg(not(target_arch = "wasm32"))]
fn main() {
    eprintln!("showreel runs in the browser, build it for wasm32-unknown-unknown.");
}
