//! CLI command handling

pub mod check;
pub mod output;
pub mod policy;
pub mod send;

pub use check::*;
pub use output::*;
pub use policy::*;
pub use send::*;

use anyhow::Result;
use std::path::Path;

use crate::notification::NotifierConfig;

/// 加载配置：显式路径优先，否则使用默认路径
pub fn load_config(path: Option<&Path>) -> Result<NotifierConfig> {
    match path {
        Some(path) => NotifierConfig::load(path),
        None => NotifierConfig::load(&NotifierConfig::default_path()),
    }
}
