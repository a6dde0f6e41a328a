// Overmark: watermark compositing library

pub mod config;
pub mod logging;
pub mod watermark;
