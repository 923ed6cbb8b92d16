//! 问候语选择
//!
//! 问候语是可选的：没有对应 slot 或列表为空时返回空串，永远不会报错。
//! 随机源由调用方注入，测试可以固定种子。

use rand::seq::IndexedRandom;
use rand::RngCore;
use serde::Deserialize;
use std::collections::HashMap;

/// slot 名 -> 问候语列表
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GreetingTable {
    entries: HashMap<String, Vec<String>>,
}

/// 请求级覆盖值：单个字符串等价于单元素列表
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum GreetingOverride {
    One(String),
    Many(Vec<String>),
}

impl GreetingOverride {
    pub fn into_list(self) -> Vec<String> {
        match self {
            GreetingOverride::One(s) => vec![s],
            GreetingOverride::Many(list) => list,
        }
    }
}

impl GreetingTable {
    pub fn new(entries: HashMap<String, Vec<String>>) -> Self {
        Self { entries }
    }

    pub fn get(&self, slot: &str) -> Option<&[String]> {
        self.entries.get(slot).map(|v| v.as_slice())
    }

    /// 按 key 合并覆盖，返回派生副本；原表不变
    pub fn with_overrides(&self, overrides: &HashMap<String, GreetingOverride>) -> GreetingTable {
        let mut entries = self.entries.clone();
        for (slot, value) in overrides {
            entries.insert(slot.clone(), value.clone().into_list());
        }
        GreetingTable { entries }
    }
}

/// 选择当前 slot 的问候语
pub fn select(
    slot: &str,
    table: &GreetingTable,
    overrides: Option<&HashMap<String, GreetingOverride>>,
    skip_greeting: bool,
    rng: &mut dyn RngCore,
) -> String {
    if skip_greeting {
        return String::new();
    }

    let pick = |options: &[String], rng: &mut dyn RngCore| {
        options.choose(rng).cloned().unwrap_or_default()
    };

    match overrides.filter(|o| !o.is_empty()) {
        Some(overrides) => {
            let effective = table.with_overrides(overrides);
            pick(effective.get(slot).unwrap_or_default(), rng)
        }
        None => pick(table.get(slot).unwrap_or_default(), rng),
    }
}
