pub mod canvas;
pub mod font;
pub mod overlay;
pub mod skeleton;
#[cfg(feature = "desktop")]
pub mod window;

pub use canvas::Canvas;
pub use overlay::{guidance_arrow, marker_state, Guidance, GuidanceStatus, MarkerState, OverlayRenderer, RenderInput};
pub use skeleton::{HAND_CONNECTIONS, POSE_CONNECTIONS};
#[cfg(feature = "desktop")]
pub use minifb::Key;
#[cfg(feature = "desktop")]
pub use window::MinifbWindow;
