//! 时段策略 - 当前时段、基础音量和勿扰状态
//!
//! 时段按开始时间排序。当前时段是最后一个开始时间 <= now 的时段；
//! 早于最早开始时间时，仍处于前一天的最后一个时段。

use chrono::NaiveTime;
use serde::Serialize;

use super::error::NotifyError;

/// 带默认音量的命名时段
#[derive(Debug, Clone, PartialEq)]
pub struct TimeSlot {
    pub name: String,
    pub start: NaiveTime,
    pub volume: f64,
}

/// 时段表：非空，按开始时间排序，名字唯一
#[derive(Debug, Clone)]
pub struct SlotTable {
    slots: Vec<TimeSlot>,
}

impl SlotTable {
    pub fn new(mut slots: Vec<TimeSlot>) -> Result<Self, NotifyError> {
        if slots.is_empty() {
            return Err(NotifyError::config("time slot table is empty"));
        }
        for (i, slot) in slots.iter().enumerate() {
            if slots[..i].iter().any(|s| s.name == slot.name) {
                return Err(NotifyError::config(format!(
                    "duplicate time slot '{}'",
                    slot.name
                )));
            }
            if !(0.0..=1.0).contains(&slot.volume) {
                return Err(NotifyError::config(format!(
                    "time slot '{}' volume {} outside [0, 1]",
                    slot.name, slot.volume
                )));
            }
        }
        slots.sort_by(|a, b| a.start.cmp(&b.start));
        Ok(Self { slots })
    }

    pub fn slots(&self) -> &[TimeSlot] {
        &self.slots
    }

    /// `now` 所在的时段
    pub fn active(&self, now: NaiveTime) -> &TimeSlot {
        let found = self.slots.iter().take_while(|s| s.start <= now).last();
        // 非空由构造函数保证
        found.unwrap_or_else(|| &self.slots[self.slots.len() - 1])
    }
}

/// 勿扰窗口 `[start, end)`，start > end 时跨越午夜
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DndWindow {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl DndWindow {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Self {
        Self { start, end }
    }

    /// start == end 表示关闭勿扰
    pub fn is_disabled(&self) -> bool {
        self.start == self.end
    }

    pub fn contains(&self, now: NaiveTime) -> bool {
        if self.is_disabled() {
            false
        } else if self.start < self.end {
            self.start <= now && now < self.end
        } else {
            now >= self.start || now < self.end
        }
    }
}

/// 一次策略计算的结果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimePolicy {
    pub slot: String,
    pub volume: f64,
    pub dnd_active: bool,
}

pub fn resolve(now: NaiveTime, slots: &SlotTable, dnd: &DndWindow) -> TimePolicy {
    let slot = slots.active(now);
    TimePolicy {
        slot: slot.name.clone(),
        volume: slot.volume,
        dnd_active: dnd.contains(now),
    }
}

/// 解析 `HH:MM` 或 `HH:MM:SS`
pub fn parse_time(value: &str) -> Result<NaiveTime, NotifyError> {
    let value = value.trim();
    NaiveTime::parse_from_str(value, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M"))
        .map_err(|_| NotifyError::config(format!("invalid time '{}', expected HH:MM[:SS]", value)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(s: &str) -> NaiveTime {
        parse_time(s).unwrap()
    }

    fn default_table() -> SlotTable {
        SlotTable::new(vec![
            TimeSlot { name: "night".into(), start: t("22:00"), volume: 0.1 },
            TimeSlot { name: "morning".into(), start: t("07:00"), volume: 0.35 },
            TimeSlot { name: "evening".into(), start: t("19:00"), volume: 0.3 },
            TimeSlot { name: "afternoon".into(), start: t("12:00"), volume: 0.4 },
        ])
        .unwrap()
    }

    #[test]
    fn test_active_slot() {
        let table = default_table();
        assert_eq!(table.active(t("07:00")).name, "morning");
        assert_eq!(table.active(t("11:59")).name, "morning");
        assert_eq!(table.active(t("12:00")).name, "afternoon");
        assert_eq!(table.active(t("21:30")).name, "evening");
        assert_eq!(table.active(t("23:59")).name, "night");
    }

    #[test]
    fn test_before_first_slot_wraps_to_last() {
        let table = default_table();
        let slot = table.active(t("03:00"));
        assert_eq!(slot.name, "night");
        assert_eq!(slot.volume, 0.1);
    }

    #[test]
    fn test_every_minute_resolves_to_a_known_slot() {
        let table = default_table();
        let names: Vec<&str> = table.slots().iter().map(|s| s.name.as_str()).collect();
        for minute in 0..(24 * 60) {
            let now = NaiveTime::from_hms_opt(minute / 60, minute % 60, 0).unwrap();
            assert!(names.contains(&table.active(now).name.as_str()));
        }
    }

    #[test]
    fn test_single_slot_table() {
        let table = SlotTable::new(vec![TimeSlot {
            name: "always".into(),
            start: t("09:00"),
            volume: 0.5,
        }])
        .unwrap();
        assert_eq!(table.active(t("08:00")).name, "always");
        assert_eq!(table.active(t("10:00")).name, "always");
    }

    #[test]
    fn test_empty_table_is_config_error() {
        assert!(matches!(SlotTable::new(vec![]), Err(NotifyError::Config(_))));
    }

    #[test]
    fn test_duplicate_slot_names_rejected() {
        let slots = vec![
            TimeSlot { name: "a".into(), start: t("01:00"), volume: 0.1 },
            TimeSlot { name: "a".into(), start: t("02:00"), volume: 0.2 },
        ];
        assert!(SlotTable::new(slots).is_err());
    }

    #[test]
    fn test_dnd_wrap_around() {
        let dnd = DndWindow::new(t("23:00"), t("06:00"));
        assert!(dnd.contains(t("23:30")));
        assert!(dnd.contains(t("02:00")));
        assert!(!dnd.contains(t("12:00")));
        assert!(!dnd.contains(t("06:00")));
        assert!(dnd.contains(t("23:00")));
    }

    #[test]
    fn test_dnd_same_day_and_disabled() {
        let dnd = DndWindow::new(t("13:00"), t("15:00"));
        assert!(dnd.contains(t("14:00")));
        assert!(!dnd.contains(t("15:00")));

        let off = DndWindow::new(t("00:00"), t("00:00"));
        assert!(off.is_disabled());
        assert!(!off.contains(t("00:00")));
        assert!(!off.contains(t("12:00")));
    }

    #[test]
    fn test_resolve() {
        let policy = resolve(t("02:00"), &default_table(), &DndWindow::new(t("23:00"), t("06:00")));
        assert_eq!(policy.slot, "night");
        assert_eq!(policy.volume, 0.1);
        assert!(policy.dnd_active);
    }

    #[test]
    fn test_parse_time() {
        assert_eq!(t("7:05"), NaiveTime::from_hms_opt(7, 5, 0).unwrap());
        assert_eq!(t("07:05:30"), NaiveTime::from_hms_opt(7, 5, 30).unwrap());
        assert!(parse_time("25:00").is_err());
        assert!(parse_time("noon").is_err());
    }
}
