//! fantasee: immersive panoramic photo viewer.
//!
//! The core is the session lifecycle bridge (`session`), which keeps one
//! native rendering/head-tracking session in lockstep with the host
//! lifecycle and the storage permission, and feeds it one decoded panorama.

pub mod activity;
pub mod backend;
pub mod config;
pub mod immersion;
pub mod loader;
pub mod permission;
pub mod script;
pub mod session;
pub mod surface;
