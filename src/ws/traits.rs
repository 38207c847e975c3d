//! Core traits for the WebSocket infrastructure.

use std::sync::Arc;

/// Consumer of inbound text frames.
///
/// The connection driver calls [`FrameHandler::on_frame`] once per text frame,
/// in arrival order, and waits for it to return before handling the next
/// socket event. Implementations must not block.
///
/// # Example
///
/// ```ignore
/// pub struct Printer;
///
/// impl FrameHandler for Printer {
///     fn on_frame(&self, frame: &str) {
///         println!("{frame}");
///     }
/// }
/// ```
pub trait FrameHandler: Send + 'static {
    fn on_frame(&self, frame: &str);
}

impl<H: FrameHandler + Sync> FrameHandler for Arc<H> {
    fn on_frame(&self, frame: &str) {
        self.as_ref().on_frame(frame);
    }
}
