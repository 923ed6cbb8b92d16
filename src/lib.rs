//! Universal Notifier - 通知扇出路由：一条消息，多个语音 / 可视渠道

pub mod cli;
pub mod notification;

pub use notification::{
    DispatchReport, NotificationDispatcher, NotificationRequest, NotifierConfig, NotifyError,
    SendResult, ServiceHost,
};
