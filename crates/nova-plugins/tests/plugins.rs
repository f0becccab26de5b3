use std::sync::Arc;

use nova_commands::{
    handler_fn, AdminRole, BlockAction, CommandRegistry, CommandSpec, DispatchSettings,
    Dispatcher, GroupMetadata, GroupSetting, Participant, ParticipantAction, RegistryError,
};
use nova_core::NovaConfig;
use nova_message::{OutgoingContent, RawEnvelope};
use nova_plugins::{builtin, Plugin, PluginError, PluginLoader};
use nova_testkit::{Call, RecordingTransport, BOT};
use serde_json::json;

const OWNER: &str = "9476@s.whatsapp.net";
const USER: &str = "9475@s.whatsapp.net";
const MEMBER: &str = "9477@s.whatsapp.net";
const GROUP: &str = "1203@g.us";

struct Harness {
    _data: tempfile::TempDir,
    transport: Arc<RecordingTransport>,
    dispatcher: Dispatcher,
}

async fn harness(transport: RecordingTransport) -> Harness {
    let data = tempfile::tempdir().unwrap();
    let mut config = NovaConfig::default();
    config.bot.owner_numbers = vec!["+94 76".into()];
    config.autoresponse.data_dir = data.path().to_string_lossy().into_owned();

    let mut registry = CommandRegistry::new();
    let report = builtin(&config).load(&mut registry).await;
    assert!(report.is_clean(), "{:?}", report.failed);

    let transport = Arc::new(transport);
    let dispatcher = Dispatcher::new(
        Arc::new(registry),
        transport.clone(),
        DispatchSettings::from(&config),
        BOT,
    );
    Harness {
        _data: data,
        transport,
        dispatcher,
    }
}

fn dm(from: &str, body: &str) -> RawEnvelope {
    RawEnvelope::from_value(&json!({
        "key": {"remoteJid": from, "id": "IN"},
        "pushName": "Tester",
        "message": {"conversation": body}
    }))
}

fn in_group(from: &str, body: &str, quoting: Option<&str>) -> RawEnvelope {
    let context = match quoting {
        Some(author) => json!({
            "stanzaId": "Q",
            "participant": author,
            "quotedMessage": {"conversation": "earlier"}
        }),
        None => json!({}),
    };
    RawEnvelope::from_value(&json!({
        "key": {"remoteJid": GROUP, "participant": from, "id": "IN"},
        "message": {"extendedTextMessage": {"text": body, "contextInfo": context}}
    }))
}

fn group(admins: &[&str], members: &[&str]) -> GroupMetadata {
    let mut participants: Vec<Participant> = admins
        .iter()
        .map(|id| Participant {
            id: id.to_string(),
            admin: Some(AdminRole::Admin),
        })
        .collect();
    participants.extend(members.iter().map(|id| Participant {
        id: id.to_string(),
        admin: None,
    }));
    GroupMetadata {
        id: GROUP.into(),
        subject: "test".into(),
        owner: None,
        participants,
    }
}

#[tokio::test]
async fn builtin_plugins_load_cleanly() {
    let data = tempfile::tempdir().unwrap();
    let mut config = NovaConfig::default();
    config.autoresponse.data_dir = data.path().join("nested").to_string_lossy().into_owned();

    let mut registry = CommandRegistry::new();
    let report = builtin(&config).load(&mut registry).await;

    let loaded: Vec<(&str, usize)> = report
        .loaded
        .iter()
        .map(|p| (p.name.as_str(), p.commands))
        .collect();
    assert_eq!(loaded, vec![("general", 7), ("autoresponse", 5), ("admin", 10)]);
    assert_eq!(report.total_commands(), registry.len());
    assert_eq!(registry.all_passive_handlers().len(), 3);
    assert!(data.path().join("nested/autoreply.json").exists());

    for keyword in [
        "alive", "ONLINE", "ar", "aresbackup", "kick", "everyone", "cmdinfo", "about", "stats",
    ] {
        assert!(registry.find_by_keyword(keyword).is_some(), "{keyword}");
    }
}

struct HalfBroken;

#[async_trait::async_trait]
impl Plugin for HalfBroken {
    fn name(&self) -> &str {
        "half-broken"
    }

    fn register(&self, registry: &mut CommandRegistry) -> Result<(), RegistryError> {
        registry.register(CommandSpec::new("first").handler(handler_fn(|_| async { Ok(()) })))?;
        registry.register(CommandSpec::new("second"))?;
        Ok(())
    }
}

struct Fine;

#[async_trait::async_trait]
impl Plugin for Fine {
    fn name(&self) -> &str {
        "fine"
    }

    fn register(&self, registry: &mut CommandRegistry) -> Result<(), RegistryError> {
        registry.register(CommandSpec::new("fine").handler(handler_fn(|_| async { Ok(()) })))?;
        Ok(())
    }
}

#[tokio::test]
async fn failed_plugin_is_rolled_back_and_others_load() {
    let mut registry = CommandRegistry::new();
    let report = PluginLoader::new()
        .with(Arc::new(HalfBroken))
        .with(Arc::new(Fine))
        .load(&mut registry)
        .await;

    assert!(!report.is_clean());
    assert!(matches!(
        &report.failed[..],
        [PluginError::Registration { plugin, .. }] if plugin == "half-broken"
    ));
    assert_eq!(report.loaded.len(), 1);
    assert!(registry.find_by_keyword("first").is_none());
    assert!(registry.find_by_keyword("fine").is_some());
    assert_eq!(registry.len(), 1);
}

#[tokio::test]
async fn alive_reacts_then_replies() {
    let h = harness(RecordingTransport::new()).await;
    let report = h.dispatcher.dispatch(dm(USER, ".alive")).await;
    assert!(report.command.unwrap().failure.is_none());

    let calls = h.transport.calls();
    assert!(matches!(
        &calls[0],
        Call::Send { content: OutgoingContent::Reaction { emoji, .. }, .. } if emoji == "🤖"
    ));
    let texts = h.transport.sent_texts();
    assert_eq!(texts.len(), 1);
    assert!(texts[0].contains("is online"));
    assert!(texts[0].contains("Prefix: ."));
    assert!(texts[0].contains("Mode: public"));
}

#[tokio::test]
async fn ping_sends_two_messages() {
    let h = harness(RecordingTransport::new()).await;
    h.dispatcher.dispatch(dm(USER, ".speed")).await;
    let texts = h.transport.sent_texts();
    assert_eq!(texts[0], "Pinging...");
    assert!(texts[1].starts_with("*Pong!*"));
}

#[tokio::test]
async fn menu_hides_group_commands_in_direct_chats() {
    let h = harness(RecordingTransport::new().with_group(group(&[], &[USER]))).await;

    h.dispatcher.dispatch(dm(USER, ".menu")).await;
    let direct = h.transport.sent_texts().pop().unwrap();
    assert!(direct.contains("Hello Tester!"));
    assert!(direct.contains(".alive (bot, online, check)"));
    assert!(direct.contains("*OWNER*"));
    assert!(!direct.contains(".kick"));
    assert!(!direct.contains("autovoice"));

    h.dispatcher.dispatch(in_group(USER, ".menu", None)).await;
    let grouped = h.transport.sent_texts().pop().unwrap();
    assert!(grouped.contains("*GROUP*"));
    assert!(grouped.contains(".kick (remove)"));
}

#[tokio::test]
async fn help_describes_one_command() {
    let h = harness(RecordingTransport::new()).await;

    h.dispatcher.dispatch(dm(USER, ".help .AR")).await;
    let text = h.transport.sent_texts().pop().unwrap();
    assert!(text.starts_with("*.autoresponse*"));
    assert!(text.contains("Aliases: autores, ar"));
    assert!(text.contains("Category: owner"));

    h.dispatcher.dispatch(dm(USER, ".help nosuch")).await;
    assert!(h.transport.sent_texts().pop().unwrap().contains("not found"));

    h.dispatcher.dispatch(dm(USER, ".help")).await;
    assert!(h.transport.sent_texts().pop().unwrap().contains("Please name a command"));
}

#[tokio::test]
async fn owner_manages_auto_replies() {
    let h = harness(RecordingTransport::new()).await;

    h.dispatcher
        .dispatch(dm(USER, ".ar add reply hi | Hello!"))
        .await;
    assert!(h.transport.sent_texts().pop().unwrap().contains("Only the owner"));

    h.dispatcher
        .dispatch(dm(OWNER, ".ar add reply Good Morning | Morning to you!"))
        .await;
    assert!(h.transport.sent_texts().pop().unwrap().contains("response added"));

    h.dispatcher
        .dispatch(dm(OWNER, ".ar add reply good morning again"))
        .await;
    assert!(h.transport.sent_texts().pop().unwrap().contains("already exists"));

    let before = h.transport.calls().len();
    let report = h.dispatcher.dispatch(dm(USER, "  good MORNING ")).await;
    assert!(report.passive_failed.is_empty());
    let calls = h.transport.calls();
    assert_eq!(calls.len(), before + 1);
    assert_eq!(
        calls[before],
        Call::Send {
            to: USER.into(),
            content: OutgoingContent::text("Morning to you!"),
            quoted: Some("IN".into()),
        }
    );

    h.dispatcher.dispatch(dm(OWNER, ".ar list reply")).await;
    assert!(h.transport.sent_texts().pop().unwrap().contains("\"Good Morning\""));

    h.dispatcher
        .dispatch(dm(OWNER, ".ar remove reply good morning"))
        .await;
    assert!(h.transport.sent_texts().pop().unwrap().contains("removed"));

    let before = h.transport.calls().len();
    h.dispatcher.dispatch(dm(USER, "good morning")).await;
    assert_eq!(h.transport.calls().len(), before);
}

#[tokio::test]
async fn voice_responses_show_recording_presence() {
    let h = harness(RecordingTransport::new()).await;
    h.dispatcher
        .dispatch(dm(OWNER, ".ar add voice hello https://cdn.example/hello.mp3"))
        .await;

    let before = h.transport.calls().len();
    h.dispatcher.dispatch(dm(USER, "hello")).await;
    let calls = h.transport.calls()[before..].to_vec();
    assert_eq!(
        calls[0],
        Call::Presence(USER.into(), nova_message::Presence::Recording)
    );
    assert!(matches!(
        &calls[1],
        Call::Send { content: OutgoingContent::Audio { url, ptt: true, .. }, .. }
            if url == "https://cdn.example/hello.mp3"
    ));
}

#[tokio::test]
async fn kick_requires_admins_and_spares_other_admins() {
    let meta = group(&[USER, BOT, "9478@s.whatsapp.net"], &[MEMBER]);
    let h = harness(RecordingTransport::new().with_group(meta)).await;

    h.dispatcher
        .dispatch(in_group(MEMBER, ".kick", Some(USER)))
        .await;
    assert!(h
        .transport
        .sent_texts()
        .pop()
        .unwrap()
        .contains("Only group admins"));

    h.dispatcher
        .dispatch(in_group(USER, ".kick", Some("9478@s.whatsapp.net")))
        .await;
    assert!(h
        .transport
        .sent_texts()
        .pop()
        .unwrap()
        .contains("another admin"));

    h.dispatcher
        .dispatch(in_group(USER, ".kick", Some(MEMBER)))
        .await;
    assert!(h.transport.calls().contains(&Call::Participants(
        GROUP.into(),
        vec![MEMBER.into()],
        ParticipantAction::Remove
    )));
}

#[tokio::test]
async fn bot_must_be_admin_for_group_changes() {
    let meta = group(&[USER], &[MEMBER, BOT]);
    let h = harness(RecordingTransport::new().with_group(meta)).await;

    h.dispatcher.dispatch(in_group(USER, ".mute", None)).await;
    assert!(h
        .transport
        .sent_texts()
        .pop()
        .unwrap()
        .contains("I need to be an admin"));

    // tagall only needs the sender to be an admin
    h.dispatcher
        .dispatch(in_group(USER, ".tagall meeting now", None))
        .await;
    let last = h.transport.calls().pop().unwrap();
    match last {
        Call::Send {
            content: OutgoingContent::Text { text, mentions },
            quoted: None,
            ..
        } => {
            assert!(text.starts_with("*meeting now*"));
            assert_eq!(mentions.len(), 3);
        }
        other => panic!("unexpected call {other:?}"),
    }
}

#[tokio::test]
async fn add_by_phone_number() {
    let meta = group(&[USER, BOT], &[MEMBER]);
    let h = harness(RecordingTransport::new().with_group(meta)).await;

    h.dispatcher
        .dispatch(in_group(USER, ".add +94 77", None))
        .await;
    assert!(h
        .transport
        .sent_texts()
        .pop()
        .unwrap()
        .contains("already in the group"));

    h.dispatcher
        .dispatch(in_group(USER, ".add +94-71-000", None))
        .await;
    assert!(h.transport.calls().contains(&Call::Participants(
        GROUP.into(),
        vec!["9471000@s.whatsapp.net".into()],
        ParticipantAction::Add
    )));
}

fn last_text(h: &Harness) -> String {
    h.transport.sent_texts().pop().unwrap_or_default()
}

#[tokio::test]
async fn botinfo_lists_owner_and_counts() {
    let h = harness(RecordingTransport::new()).await;
    h.dispatcher.dispatch(dm(USER, ".owner")).await;

    let text = last_text(&h);
    assert!(text.starts_with("*Nova Information*"));
    assert!(text.contains("Owner: 9476"));
    assert!(text.contains("Mode: public"));
    assert!(text.contains("Total Commands: 22"));
    assert!(text.ends_with("Use .menu to see all commands"));
}

#[tokio::test]
async fn system_reports_host_figures() {
    let h = harness(RecordingTransport::new()).await;
    let report = h.dispatcher.dispatch(dm(USER, ".status")).await;
    assert!(report.command.unwrap().failure.is_none());

    let text = last_text(&h);
    assert!(text.starts_with("*System Status*"));
    assert!(text.contains("Commands Loaded: 22"));
    assert!(text.contains("Total RAM:"));
    assert!(text.ends_with("Mode: public"));
}

#[tokio::test]
async fn block_and_unblock_target_the_quoted_author() {
    let h = harness(RecordingTransport::new()).await;

    h.dispatcher.dispatch(dm(USER, ".block")).await;
    assert!(last_text(&h).contains("Only the owner"));

    h.dispatcher.dispatch(dm(OWNER, ".block")).await;
    assert_eq!(last_text(&h), "Reply to the user's message.");
    assert!(!h.transport.calls().iter().any(|c| matches!(c, Call::Block(..))));

    let quoting = |body: &str| {
        RawEnvelope::from_value(&json!({
            "key": {"remoteJid": OWNER, "id": "IN"},
            "message": {"extendedTextMessage": {
                "text": body,
                "contextInfo": {
                    "stanzaId": "Q",
                    "participant": MEMBER,
                    "quotedMessage": {"conversation": "spam"}
                }
            }}
        }))
    };

    h.dispatcher.dispatch(quoting(".ban")).await;
    assert!(h
        .transport
        .calls()
        .contains(&Call::Block(MEMBER.into(), BlockAction::Block)));
    assert_eq!(last_text(&h), "Blocked @9477");

    h.dispatcher.dispatch(quoting(".unblock")).await;
    assert!(h
        .transport
        .calls()
        .contains(&Call::Block(MEMBER.into(), BlockAction::Unblock)));
    assert_eq!(last_text(&h), "Unblocked @9477");
}

#[tokio::test]
async fn left_says_goodbye_then_leaves() {
    let meta = group(&[], &[OWNER, USER, BOT]);
    let h = harness(RecordingTransport::new().with_group(meta)).await;

    h.dispatcher.dispatch(dm(OWNER, ".left")).await;
    assert!(last_text(&h).contains("only be used in a group"));

    h.dispatcher.dispatch(in_group(USER, ".leave", None)).await;
    assert!(last_text(&h).contains("Only the owner"));

    h.dispatcher.dispatch(in_group(OWNER, ".exit", None)).await;
    let calls = h.transport.calls();
    let n = calls.len();
    assert_eq!(calls[n - 1], Call::Leave(GROUP.into()));
    assert!(matches!(
        &calls[n - 2],
        Call::Send { to, content: OutgoingContent::Text { text, .. }, .. }
            if to == GROUP && text == "Goodbye everyone!"
    ));
}

#[tokio::test]
async fn promote_and_demote_check_membership_and_current_role() {
    let meta = group(&[USER, BOT], &[MEMBER]);
    let h = harness(RecordingTransport::new().with_group(meta)).await;

    h.dispatcher
        .dispatch(in_group(USER, ".promote", Some("9479@s.whatsapp.net")))
        .await;
    assert_eq!(last_text(&h), "User not found in the group.");

    h.dispatcher
        .dispatch(in_group(USER, ".promote", Some(BOT)))
        .await;
    assert_eq!(last_text(&h), "@94700000000 is already an admin.");

    h.dispatcher
        .dispatch(in_group(USER, ".demote", Some(MEMBER)))
        .await;
    assert_eq!(last_text(&h), "@9477 is not an admin.");
    assert!(!h
        .transport
        .calls()
        .iter()
        .any(|c| matches!(c, Call::Participants(..))));

    h.dispatcher
        .dispatch(in_group(USER, ".makeadmin", Some(MEMBER)))
        .await;
    assert!(h.transport.calls().contains(&Call::Participants(
        GROUP.into(),
        vec![MEMBER.into()],
        ParticipantAction::Promote
    )));
    assert_eq!(last_text(&h), "Promoted @9477");
}

#[tokio::test]
async fn mute_and_unmute_change_the_announcement_setting() {
    let meta = group(&[USER, BOT], &[MEMBER]);
    let h = harness(RecordingTransport::new().with_group(meta)).await;

    h.dispatcher.dispatch(in_group(MEMBER, ".lock", None)).await;
    assert!(last_text(&h).contains("Only group admins"));

    h.dispatcher.dispatch(in_group(USER, ".mute", None)).await;
    assert!(h
        .transport
        .calls()
        .contains(&Call::Setting(GROUP.into(), GroupSetting::Announcement)));
    assert!(last_text(&h).starts_with("Group muted."));

    h.dispatcher.dispatch(in_group(USER, ".unlock", None)).await;
    assert!(h
        .transport
        .calls()
        .contains(&Call::Setting(GROUP.into(), GroupSetting::NotAnnouncement)));
    assert!(last_text(&h).starts_with("Group unmuted."));
}

#[tokio::test]
async fn tagall_mentions_everyone_and_needs_only_sender_admin() {
    // the bot is a plain member here
    let meta = group(&[USER], &[MEMBER, BOT]);
    let h = harness(RecordingTransport::new().with_group(meta)).await;

    h.dispatcher.dispatch(in_group(MEMBER, ".tagall", None)).await;
    assert!(last_text(&h).contains("Only group admins"));

    h.dispatcher.dispatch(in_group(USER, ".everyone", None)).await;
    match h.transport.calls().pop().unwrap() {
        Call::Send {
            to,
            content: OutgoingContent::Text { text, mentions },
            quoted: None,
        } => {
            assert_eq!(to, GROUP);
            assert!(text.starts_with("*Attention everyone*"));
            assert_eq!(mentions, vec![USER, MEMBER, BOT]);
            for id in ["@9475", "@9477", "@94700000000"] {
                assert!(text.contains(id), "{id}");
            }
        }
        other => panic!("unexpected call {other:?}"),
    }
}

#[tokio::test]
async fn sticker_trigger_sends_quoted_sticker() {
    let h = harness(RecordingTransport::new()).await;
    h.dispatcher
        .dispatch(dm(OWNER, ".ar add sticker hi https://cdn.example/wave.webp"))
        .await;
    assert!(last_text(&h).contains("response added"));

    let before = h.transport.calls().len();
    let report = h.dispatcher.dispatch(dm(USER, "Hi")).await;
    assert!(report.passive_failed.is_empty());
    assert_eq!(
        h.transport.calls()[before..],
        [Call::Send {
            to: USER.into(),
            content: OutgoingContent::Sticker {
                url: "https://cdn.example/wave.webp".into()
            },
            quoted: Some("IN".into()),
        }]
    );
}

#[tokio::test]
async fn autobackup_saves_and_restores_through_commands() {
    let h = harness(RecordingTransport::new()).await;

    h.dispatcher.dispatch(dm(USER, ".autobackup save")).await;
    assert_eq!(last_text(&h), "Owner only.");

    h.dispatcher.dispatch(dm(OWNER, ".autobackup load")).await;
    assert_eq!(last_text(&h), "No backup file found.");

    h.dispatcher
        .dispatch(dm(OWNER, ".ar add reply ping me | pong"))
        .await;
    h.dispatcher.dispatch(dm(OWNER, ".aresbackup save")).await;
    assert!(last_text(&h).starts_with("Auto-response backup saved."));

    h.dispatcher
        .dispatch(dm(OWNER, ".ar remove reply ping me"))
        .await;
    let before = h.transport.calls().len();
    h.dispatcher.dispatch(dm(USER, "ping me")).await;
    assert_eq!(h.transport.calls().len(), before);

    h.dispatcher.dispatch(dm(OWNER, ".autobackup restore")).await;
    assert_eq!(last_text(&h), "Restored 1 auto-responses from backup.");

    h.dispatcher.dispatch(dm(USER, "ping me")).await;
    assert_eq!(last_text(&h), "pong");

    h.dispatcher.dispatch(dm(OWNER, ".autobackup")).await;
    assert_eq!(last_text(&h), "Usage: .autobackup save|load");
}
