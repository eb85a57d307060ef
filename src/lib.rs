// lib.rs - trip duration training, serving and monitoring
pub mod api;
pub mod common;
pub mod data;
pub mod evaluation;
pub mod features;
pub mod inference;
pub mod simulate;
pub mod training;
