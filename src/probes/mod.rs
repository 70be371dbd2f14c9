// src/probes/mod.rs
mod http;

pub use http::{http_check, HttpProbe};
