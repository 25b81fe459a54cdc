// src/lib.rs

//! anekdot: background sampling cache serving random channel posts

pub mod error;
pub mod models;
pub mod pipeline;
pub mod services;
pub mod storage;
pub mod utils;
