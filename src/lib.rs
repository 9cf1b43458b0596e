pub mod audio;
pub mod config;
pub mod controller;
pub mod error;
pub mod health;
pub mod layout;
pub mod manifest;
pub mod orchestrator;
pub mod parallax;
pub mod scheduler;

#[cfg(target_arch = "wasm32")]
pub mod embed;
#[cfg(target_arch = "wasm32")]
pub mod player;
#[cfg(target_arch = "wasm32")]
pub mod stage;

pub use config::{DeviceClass, ReelConfig};
pub use controller::{Controller, PlayerHandle, Stage};
pub use error::Error;
pub use manifest::{ClipDescriptor, Manifest};

/// Position of a clip in the manifest. Stable for the whole page session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClipId(pub usize);

#[cfg(target_arch = "wasm32")]
pub use web::*;

#[cfg(target_arch = "wasm32")]
mod web {
    use futures::channel::{mpsc, oneshot};
    use wasm_bindgen_futures::spawn_local;

    use crate::error::Error;
    use crate::manifest::Manifest;

    #[derive(Debug)]
    pub enum ReelState {
        Created {
            root_id: String,
            manifest: Manifest,
            tx: Option<oneshot::Sender<Result<(), Error>>>,
        },
        Cleanup,
    }

    /// Handle to the reel runtime running on the page's event loop.
    #[derive(Clone)]
    pub struct Reel {
        tx: mpsc::Sender<ReelState>,
    }

    impl Reel {
        pub fn new() -> Self {
            let (tx, rx) = mpsc::channel(16);

            spawn_local(async move {
                let mut player = crate::player::ReelPlayer::new();
                if let Err(e) = player.listen(rx).await {
                    tracing::error!("Reel listen failed: {:?}", e);
                }
            });

            Self { tx }
        }

        /// Starts mounting `manifest` into the placeholders rendered under `root_id`.
        pub async fn create(&self, root_id: String, manifest: Manifest) -> Result<(), Error> {
            let (tx, rx) = oneshot::channel();

            self.tx
                .clone()
                .try_send(ReelState::Created {
                    root_id,
                    manifest,
                    tx: Some(tx),
                })
                .map_err(|_| Error::ChannelClosed)?;

            match rx.await {
                Ok(Ok(())) => {
                    tracing::info!("Reel started");
                    Ok(())
                }
                Ok(Err(e)) => {
                    tracing::error!("Failed to start reel: {:?}", e);
                    Err(e)
                }
                Err(_) => {
                    tracing::error!("Channel canceled");
                    Err(Error::ChannelClosed)
                }
            }
        }

        pub fn destroy(mut self) {
            // The runtime stops the controller and leaves its loop.
            let _ = self.tx.try_send(ReelState::Cleanup);
        }
    }

    impl Default for Reel {
        fn default() -> Self {
            Self::new()
        }
    }
}
