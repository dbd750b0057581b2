//! ANSI-aware text helpers: escape tokenizing, visible width and column slicing.
//!
//! Pure string-in/string-out functions shared by the renderer and the overlay compositor.

pub mod ansi;
pub mod slice;
pub mod width;
