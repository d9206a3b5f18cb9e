//! The tenant registry table.

pub mod entity;

pub use entity::{ActiveModel, Column, Entity, Model};
