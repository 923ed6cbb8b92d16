//! 具体 host 实现

pub mod http;
pub mod recording;

pub use http::{GatewayConfig, HttpHost};
pub use recording::{RecordedCall, RecordingHost};
