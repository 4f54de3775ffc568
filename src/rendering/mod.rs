//! Rendering helpers: markup inspection and aspect ratio tracking

pub mod aspect;
pub mod markup;

pub use aspect::AspectRatioTracker;
