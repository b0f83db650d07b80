pub mod queue;
pub mod renderer;

pub use queue::{RenderQueue, RenderQueueStatus};
pub use renderer::{ImageRenderer, Rendered, Renderer, PREVIEW_MAX_DIM, THUMBNAIL_MAX_DIM};
