//! Audio device backends for beatline.
//!
//! The output backend moves the [`bl_engine::Engine`] into the device
//! callback; after that the control thread reaches the engine only
//! through its handle. The input backend feeds capture data into a
//! record queue.

mod cpal_backend;
mod traits;

pub use cpal_backend::{CpalInput, CpalOutput};
pub use traits::{AudioBackend, AudioError};
