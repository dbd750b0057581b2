//! Contracts shared by every layer plus pure helpers.

pub mod component;
pub mod container;
pub mod cursor;
pub mod image;
pub mod input;
pub mod output;
pub mod terminal;
pub mod text;
