//! NLP inference service: model registry, task dispatch and HTTP surface.

pub mod api;
pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod nlp;
