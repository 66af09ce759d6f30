//! Mask authoring: an explicit RGBA framebuffer and the paintable surface
//! built on it.

pub mod framebuffer;
pub mod surface;

pub use framebuffer::{Framebuffer, Point, Rgba, StrokeOp};
pub use surface::{fit_within, DisplayRect, MaskSurface, PointerEvent, Tool};
