// SPDX-License-Identifier: MPL-2.0
//! Renderer boundary: the effect-aware frame sink bound to a compositor
//! surface.
//!
//! The compositor and the effect shaders are external; the engine hands
//! each accepted frame to a [`RenderInput`] together with the active effect
//! mask and rendering mode, and forwards framing-overlay pixels through the
//! factory's out-of-band setter.

use std::sync::Arc;

use crate::effects::EffectMask;
use crate::media::format::MediaFormat;
use crate::media::source::FrameBuffer;

/// How a frame is fitted to the output surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RenderingMode {
    /// Stretch to the output size.
    Resize,

    /// Center-crop to the output aspect.
    Crop,

    /// Letterbox/pillarbox with black bars.
    BlackBorders,

    /// Sentinel used before the controller configures a mode.
    #[default]
    Invalid,
}

/// Opaque handle to the compositor window a decoder attaches its output to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TargetWindow(pub u64);

/// A per-clip frame sink created by the renderer factory.
pub trait RenderInput: Send {
    /// Displays `frame` with the given effects applied. Ownership of the
    /// buffer transfers to the renderer only for the duration of this call.
    fn render(
        &mut self,
        frame: &FrameBuffer,
        effects: EffectMask,
        mode: RenderingMode,
        is_still_image: bool,
    );

    /// Re-reads frame geometry after a decoder format change.
    fn update_video_size(&mut self, format: &MediaFormat);

    /// The window the video decoder should attach its output buffers to.
    fn target_window(&self) -> TargetWindow;
}

/// Creates render inputs and accepts out-of-band overlay pixels.
pub trait RendererFactory: Send + Sync {
    /// Creates a frame sink bound to the compositor surface.
    fn create_render_input(&self) -> Box<dyn RenderInput>;

    /// Uploads (or clears, with `None`) the RGBA overlay image for the
    /// framing effect at `effect_index`. Called by the controller when it
    /// receives an overlay-update notification.
    fn set_framing_overlay(&self, effect_index: usize, rgba: Option<Arc<Vec<u8>>>);
}
