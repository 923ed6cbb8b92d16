//! 分发端到端测试 - 通过 RecordingHost 观察实际发出的服务调用

use chrono::{NaiveDate, NaiveDateTime};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use universal_notifier::notification::dispatcher::DEADLINE_EXCEEDED;
use universal_notifier::notification::hosts::RecordingHost;
use universal_notifier::notification::{
    NotificationDispatcher, NotificationRequest, NotifierConfig, SendResult,
};

fn at(h: u32, m: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 6, 1)
        .unwrap()
        .and_hms_opt(h, m, 0)
        .unwrap()
}

fn config_with(policy: Value) -> NotifierConfig {
    NotifierConfig::from_value(json!({
        "greetings": {
            "morning": ["Buongiorno"],
            "afternoon": ["Ciao"],
            "evening": ["Buonasera"],
            "night": ["Buonanotte"]
        },
        "policy": policy,
        "channels": {
            "alexa": {
                "service": "notify.alexa_media",
                "is_voice": true,
                "target": "media_player.echo_dot"
            },
            "google": {
                "service": "tts.speak",
                "is_voice": true,
                "target": "tts.google_it",
                "service_data": {"media_player_entity_id": ["media_player.cucina"]}
            },
            "telegram": {
                "service": "telegram_bot.send_message",
                "target": [111, 222, 333],
                "alt_services": {
                    "photo": {
                        "service": "telegram_bot.send_photo",
                        "service_data": {"url": "http://cam.local/snap.jpg"}
                    }
                }
            },
            "telegram_solo": {"service": "telegram_bot.send_message", "target": 111},
            "telefono": {"service": "notify.mobile_app_pixel"},
            "rotto": {"service": "notify_senza_punto"}
        }
    }))
    .unwrap()
}

fn setup_with(host: RecordingHost, policy: Value) -> (NotificationDispatcher, Arc<RecordingHost>) {
    let host = Arc::new(host);
    let dispatcher = NotificationDispatcher::new(Arc::new(config_with(policy)), host.clone())
        .with_rng(StdRng::seed_from_u64(42));
    (dispatcher, host)
}

fn setup(host: RecordingHost) -> (NotificationDispatcher, Arc<RecordingHost>) {
    setup_with(host, json!({}))
}

#[tokio::test]
async fn test_unknown_alias_does_not_block_others() {
    let (dispatcher, host) = setup(RecordingHost::new().with_clock(at(12, 30)));
    let request = NotificationRequest::new("Porta aperta", ["sconosciuto", "telefono", "rotto"]);

    let report = dispatcher.send(&request).await.unwrap();

    assert!(matches!(report.targets[0].result, SendResult::Skipped(_)));
    assert_eq!(report.targets[1].result, SendResult::Sent);
    assert!(matches!(report.targets[2].result, SendResult::Skipped(_)));
    assert_eq!(host.calls().len(), 1);
    assert_eq!(
        host.calls_to("notify", "mobile_app_pixel")[0].payload["message"],
        json!("[Hal9000 - 12:30:00] Ciao. Porta aperta")
    );
}

#[tokio::test]
async fn test_voice_channel_uses_slot_volume() {
    let (dispatcher, host) = setup(RecordingHost::new().with_clock(at(12, 30)));
    dispatcher
        .send(&NotificationRequest::new("Porta aperta", ["alexa"]))
        .await
        .unwrap();

    let volume = host.calls_to("media_player", "volume_set");
    assert_eq!(volume.len(), 1);
    assert_eq!(
        Value::Object(volume[0].payload.clone()),
        json!({"entity_id": ["media_player.echo_dot"], "volume_level": 0.4})
    );

    let message = host.calls_to("notify", "alexa_media");
    assert_eq!(
        Value::Object(message[0].payload.clone()),
        json!({"message": "Ciao. Porta aperta", "target": "media_player.echo_dot"})
    );
}

#[tokio::test]
async fn test_dnd_skips_voice_but_not_visual() {
    let (dispatcher, host) = setup(RecordingHost::new().with_clock(at(2, 0)));
    let report = dispatcher
        .send(&NotificationRequest::new("Movimento in giardino", ["alexa", "telefono"]))
        .await
        .unwrap();

    assert_eq!(report.targets[0].result, SendResult::Skipped("do not disturb".to_string()));
    assert_eq!(report.targets[0].invocations, 0);
    assert_eq!(report.targets[1].result, SendResult::Sent);

    assert!(host.calls_to("media_player", "volume_set").is_empty());
    assert!(host.calls_to("notify", "alexa_media").is_empty());
    assert_eq!(host.calls_to("notify", "mobile_app_pixel").len(), 1);
}

#[tokio::test]
async fn test_priority_bypasses_dnd_with_high_volume() {
    let (dispatcher, host) = setup(RecordingHost::new().with_clock(at(2, 0)));
    let request = NotificationRequest::new("Allarme fumo", ["alexa"]).with_priority(true);
    dispatcher.send(&request).await.unwrap();

    let volume = host.calls_to("media_player", "volume_set");
    assert_eq!(volume[0].payload["volume_level"], json!(0.9));
    assert_eq!(
        host.calls_to("notify", "alexa_media")[0].payload["message"],
        json!("Buonanotte. Allarme fumo")
    );
}

#[tokio::test]
async fn test_explicit_volume_passes_dnd_gate() {
    let (dispatcher, host) = setup(RecordingHost::new().with_clock(at(2, 0)));
    let request = NotificationRequest::new("Buonanotte a tutti", ["alexa"])
        .with_target_data("alexa", json!({"volume": "0.2"}));
    dispatcher.send(&request).await.unwrap();

    let volume = host.calls_to("media_player", "volume_set");
    assert_eq!(volume[0].payload["volume_level"], json!(0.2));
    let message = &host.calls_to("notify", "alexa_media")[0];
    assert!(message.payload.get("volume").is_none());
    assert!(message.payload.get("data").is_none());
}

#[tokio::test]
async fn test_dnd_all_channels_policy() {
    let (dispatcher, host) = setup_with(
        RecordingHost::new().with_clock(at(2, 0)),
        json!({"dnd_scope": "all_channels"}),
    );
    let report = dispatcher
        .send(&NotificationRequest::new("Movimento", ["telefono"]))
        .await
        .unwrap();

    assert!(matches!(report.targets[0].result, SendResult::Skipped(_)));
    assert!(host.calls().is_empty());
}

#[tokio::test]
async fn test_chat_bot_broadcast_three_ids() {
    let (dispatcher, host) = setup(RecordingHost::new().with_clock(at(12, 30)));
    let report = dispatcher
        .send(&NotificationRequest::new("Porta aperta", ["telegram"]))
        .await
        .unwrap();

    assert_eq!(report.targets[0].invocations, 3);
    let calls = host.calls_to("telegram_bot", "send_message");
    assert_eq!(calls.len(), 3);

    let mut ids: Vec<i64> = calls
        .iter()
        .map(|c| c.payload["target"].as_i64().unwrap())
        .collect();
    ids.sort();
    assert_eq!(ids, vec![111, 222, 333]);

    for call in &calls {
        assert_eq!(call.payload["message"], json!("[Hal9000 - 12:30:00] Ciao. Porta aperta"));
        assert_eq!(call.payload["parse_mode"], json!("html"));
    }
}

#[tokio::test]
async fn test_alternate_service_for_photo() {
    let (dispatcher, host) = setup(RecordingHost::new().with_clock(at(12, 30)));
    let request = NotificationRequest::new("Qualcuno alla porta", ["telegram"])
        .with_target_data("telegram", json!({"type": "photo", "disable_notification": true}));
    dispatcher.send(&request).await.unwrap();

    assert!(host.calls_to("telegram_bot", "send_message").is_empty());
    let photos = host.calls_to("telegram_bot", "send_photo");
    assert_eq!(photos.len(), 3);
    for photo in &photos {
        assert_eq!(photo.payload["url"], json!("http://cam.local/snap.jpg"));
        assert_eq!(photo.payload["caption"], json!("[Hal9000 - 12:30:00] Ciao. Qualcuno alla porta"));
        assert_eq!(photo.payload["disable_notification"], json!(true));
        assert!(photo.payload.get("message").is_none());
        assert!(photo.payload.get("type").is_none());
    }
}

#[tokio::test]
async fn test_command_passthrough_on_voice_and_visual() {
    let (dispatcher, host) = setup(RecordingHost::new().with_clock(at(12, 30)));
    dispatcher
        .send(&NotificationRequest::new("stop_tts", ["alexa", "telefono"]))
        .await
        .unwrap();

    assert_eq!(host.calls_to("notify", "alexa_media")[0].payload["message"], json!("stop_tts"));
    assert_eq!(
        host.calls_to("notify", "mobile_app_pixel")[0].payload["message"],
        json!("stop_tts")
    );
}

#[tokio::test]
async fn test_voice_text_is_cleaned_and_devices_get_volume() {
    let (dispatcher, host) = setup(RecordingHost::new().with_clock(at(12, 30)));
    dispatcher
        .send(&NotificationRequest::new(
            "La <b>lavatrice</b> ha *finito* https://casa.local/log 🧺",
            ["google"],
        ))
        .await
        .unwrap();

    let volume = host.calls_to("media_player", "volume_set");
    assert_eq!(volume[0].payload["entity_id"], json!(["media_player.cucina"]));

    let speak = host.calls_to("tts", "speak");
    assert_eq!(
        Value::Object(speak[0].payload.clone()),
        json!({
            "media_player_entity_id": ["media_player.cucina"],
            "message": "Ciao. La lavatrice ha finito",
            "entity_id": "tts.google_it"
        })
    );
}

#[tokio::test]
async fn test_markdown_dialect_with_bold_prefix() {
    let (dispatcher, host) = setup(RecordingHost::new().with_clock(at(12, 30)));
    let request = NotificationRequest::new("Fatto!", ["telegram_solo"])
        .with_bold_prefix(true)
        .with_target_data("telegram_solo", json!({"parse_mode": "MarkdownV2"}));
    dispatcher.send(&request).await.unwrap();

    let call = &host.calls_to("telegram_bot", "send_message")[0];
    assert_eq!(call.payload["message"], json!(r"\[*Hal9000* \- *12:30:00*\] Ciao\. Fatto\!"));
    assert_eq!(call.payload["parse_mode"], json!("MarkdownV2"));
    assert_eq!(call.payload["target"], json!(111));
}

#[tokio::test]
async fn test_request_level_prefix_and_greeting_overrides() {
    let (dispatcher, host) = setup(RecordingHost::new().with_clock(at(12, 30)));
    let request = NotificationRequest::from_value(json!({
        "message": "Cena pronta",
        "targets": ["telefono"],
        "title": "Cucina",
        "assistant_name": "Jarvis",
        "include_time": false,
        "override_greetings": {"afternoon": "Salve"},
        "data": {"push": {"sound": "default"}},
        "target_data": {"telefono": {"message": "Cena pronta in tavola"}}
    }))
    .unwrap();
    dispatcher.send(&request).await.unwrap();

    let call = &host.calls_to("notify", "mobile_app_pixel")[0];
    assert_eq!(
        Value::Object(call.payload.clone()),
        json!({
            "message": "[Jarvis] Salve. Cena pronta in tavola",
            "title": "Cucina",
            "data": {"push": {"sound": "default"}}
        })
    );
}

#[tokio::test]
async fn test_skip_greeting() {
    let (dispatcher, host) = setup(RecordingHost::new().with_clock(at(12, 30)));
    let request = NotificationRequest::new("Porta aperta", ["telefono", "alexa"]).with_skip_greeting(true);
    dispatcher.send(&request).await.unwrap();

    assert_eq!(
        host.calls_to("notify", "mobile_app_pixel")[0].payload["message"],
        json!("[Hal9000 - 12:30:00] Porta aperta")
    );
    assert_eq!(host.calls_to("notify", "alexa_media")[0].payload["message"], json!("Porta aperta"));
}

#[tokio::test]
async fn test_duplicate_targets_processed_independently() {
    let (dispatcher, host) = setup(RecordingHost::new().with_clock(at(12, 30)));
    let report = dispatcher
        .send(&NotificationRequest::new("Doppio", ["telefono", "telefono"]))
        .await
        .unwrap();

    assert_eq!(report.targets.len(), 2);
    assert_eq!(host.calls_to("notify", "mobile_app_pixel").len(), 2);
}

#[tokio::test]
async fn test_unavailable_domain_skips_target_only() {
    let (dispatcher, host) = setup(
        RecordingHost::new()
            .with_clock(at(12, 30))
            .with_domains(["notify"]),
    );
    let report = dispatcher
        .send(&NotificationRequest::new("Porta aperta", ["telegram", "alexa"]))
        .await
        .unwrap();

    assert!(matches!(&report.targets[0].result, SendResult::Skipped(r) if r.contains("telegram_bot")));
    // media_player 不可用：不调音量，但消息照常发送
    assert_eq!(report.targets[1].result, SendResult::Sent);
    assert_eq!(report.targets[1].invocations, 1);
    assert_eq!(host.calls().len(), 1);
}

#[tokio::test]
async fn test_invocation_failure_is_isolated() {
    let (dispatcher, host) = setup(
        RecordingHost::new()
            .with_clock(at(12, 30))
            .failing("notify.alexa_media"),
    );
    let report = dispatcher
        .send(&NotificationRequest::new("Porta aperta", ["alexa", "telefono", "telegram"]))
        .await
        .unwrap();

    assert!(matches!(&report.targets[0].result, SendResult::Failed(r) if r.contains("alexa_media")));
    assert_eq!(report.targets[1].result, SendResult::Sent);
    assert_eq!(report.targets[2].result, SendResult::Sent);
    assert_eq!(report.failed().count(), 1);
    // volume + telefono + 3 telegram
    assert_eq!(host.calls().len(), 5);
}

#[tokio::test]
async fn test_deadline_marks_pending_invocations_failed() {
    let (dispatcher, host) = setup(
        RecordingHost::new()
            .with_clock(at(12, 30))
            .delayed("notify.mobile_app_pixel", Duration::from_secs(5)),
    );
    let report = dispatcher
        .send_with_deadline(
            &NotificationRequest::new("Porta aperta", ["telefono", "telegram_solo"]),
            Some(Duration::from_millis(100)),
        )
        .await
        .unwrap();

    assert_eq!(report.targets[0].result, SendResult::Failed(DEADLINE_EXCEEDED.to_string()));
    assert_eq!(report.targets[1].result, SendResult::Sent);
    assert!(host.calls_to("notify", "mobile_app_pixel").is_empty());
}

#[tokio::test]
async fn test_concurrent_requests_share_dispatcher() {
    let (dispatcher, host) = setup(RecordingHost::new().with_clock(at(12, 30)));
    let dispatcher = Arc::new(dispatcher);

    let handles: Vec<_> = (0..4)
        .map(|i| {
            let dispatcher = dispatcher.clone();
            tokio::spawn(async move {
                dispatcher
                    .send(&NotificationRequest::new(format!("Messaggio {}", i), ["telefono"]))
                    .await
            })
        })
        .collect();

    for handle in handles {
        assert!(handle.await.unwrap().unwrap().is_complete());
    }
    assert_eq!(host.calls().len(), 4);
}

#[tokio::test]
async fn test_invalid_request_is_rejected_before_dispatch() {
    let (dispatcher, host) = setup(RecordingHost::new());
    let empty: Vec<String> = Vec::new();
    assert!(dispatcher.send(&NotificationRequest::new("x", empty)).await.is_err());
    assert!(host.calls().is_empty());
}
