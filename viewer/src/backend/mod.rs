//! Host backends. Only the headless backend is built in; device hosts
//! embed `ViewerActivity` directly with their own engine and surface.

pub mod headless;
