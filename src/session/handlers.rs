//! Request handlers: one function per protocol operation, plus the
//! `dispatch` entry point that enforces the auth/in-channel gates before
//! any handler-specific field is even decoded.

use bytes::Bytes;
use chrono::DateTime;
use relay_proto::{Document, Envelope, ProtoError, Request, Value};

use crate::bus::{CONTROL_TOPIC, channel_subject};
use crate::db::{JoinInfo, UsageLog};
use crate::error::RelayError;
use crate::history::{Message, MessageQuery};
use crate::queue::{AUDIT_QUEUE, NOTIFICATION_QUEUE};
use crate::session::state::{Authenticated, JoinInfoCache, Session, SessionPhase};
use crate::time::now_millis;

const UNREAD_BEFORE_LIMIT: usize = 100;
const RECENT_MESSAGES_LIMIT: usize = 20;

/// Auth-required / in-channel-required gates per method, driven by the
/// parsed request tag rather than runtime introspection.
fn gates(req: &Request) -> (bool, bool) {
    match req {
        Request::Authenticate | Request::Ping => (false, false),
        Request::Publish | Request::Ack { .. } => (true, true),
        _ => (true, false),
    }
}

/// Parse, gate, and dispatch one request envelope to its handler.
///
/// `Ok(None)` means the request succeeded but carries no direct reply —
/// currently only `publish`, whose sole delivery path is the Dispatcher
/// fan-out (see `publish` below).
pub async fn dispatch(session: &mut Session, envelope: &Envelope) -> Result<Option<Envelope>, RelayError> {
    let request = Request::try_from(envelope).map_err(|e| match e {
        ProtoError::UnknownMethod(m) => RelayError::UnknownMethod(m),
        other => RelayError::Protocol(other),
    })?;

    let (auth_required, in_channel_required) = gates(&request);
    if auth_required && !session.is_authenticated() {
        return Err(RelayError::Unauthenticated);
    }
    if in_channel_required {
        let attending = session.authenticated().and_then(|a| a.attending.as_ref());
        if attending.is_none() {
            return Err(RelayError::NotAttending);
        }
    }

    match request {
        Request::Authenticate => authenticate(session, envelope).await.map(Some),
        Request::Create => create(session, envelope).await.map(Some),
        Request::GetChannels => get_channels(session).await.map(Some),
        Request::Unread => unread(session, envelope).await.map(Some),
        Request::Join { channel } => join(session, channel).await.map(Some),
        Request::Withdrawal { channel } => withdrawal(session, channel).await.map(Some),
        Request::Attend { channel } => attend(session, channel).await.map(Some),
        Request::Exit => {
            exit_impl(session).await;
            Ok(Some(Envelope::new("exit")))
        }
        Request::Publish => {
            publish(session, envelope).await?;
            Ok(None)
        }
        Request::Ack {
            channel,
            published_at,
        } => ack(session, channel, published_at).await.map(Some),
        Request::Ping => Ok(Some(ping())),
    }
}

async fn authenticate(session: &mut Session, envelope: &Envelope) -> Result<Envelope, RelayError> {
    let user_id = session
        .ctx
        .authenticator
        .authenticate(envelope.document())
        .await
        .map_err(|_| RelayError::AuthFailed)?;

    let joins = session.ctx.db.store().join_infos_by_user(&user_id).await?;

    // The outbound sender itself is registered by the connection loop at
    // session creation time (see `session::connection::run`), before any
    // request is dispatched; here we only add this now-known user's
    // channel subscriptions.
    for join in &joins {
        session.ctx.registry.subscribe(&join.channel, session.id);
    }

    session.phase = SessionPhase::Authenticated(Authenticated {
        user_id,
        joins: JoinInfoCache::from_joins(joins),
        attending: None,
        last_published_at: None,
    });

    let mut reply = Envelope::new("authenticate");
    reply.set("status", "OK");
    Ok(reply)
}

async fn create(session: &mut Session, envelope: &Envelope) -> Result<Envelope, RelayError> {
    let doc = envelope.document();
    let user_id = session.authenticated().unwrap().user_id.clone();
    let now = now_millis();

    let mut reply = Envelope::new("create");

    if let Ok(partner_id) = doc.get_str("partner_id") {
        let store = session.ctx.db.store();
        let existing = store.find_private_channel(&user_id, partner_id).await?;
        let channel_name = if let Some(name) = existing {
            name
        } else {
            let (channel, joins) = store
                .insert_channel_with_members(
                    &[user_id.clone(), partner_id.to_string()],
                    false,
                    now,
                )
                .await?;
            adopt_new_channel(session, &channel.name, joins);
            announce_create(session, &channel.name, &[user_id.clone(), partner_id.to_string()])
                .await?;
            channel.name
        };
        reply.set("channel", channel_name);
        reply.set("partner_id", partner_id.to_string());
        return Ok(reply);
    }

    let partner_ids: Vec<String> = doc
        .get("partner_ids")
        .and_then(Value::as_array)
        .ok_or(RelayError::InvalidChannel)?
        .iter()
        .filter_map(|v| v.as_str().map(str::to_string))
        .collect();

    let mut members = vec![user_id.clone()];
    members.extend(partner_ids.iter().cloned());

    let store = session.ctx.db.store();
    let (channel, joins) = store.insert_channel_with_members(&members, true, now).await?;
    adopt_new_channel(session, &channel.name, joins);
    announce_create(session, &channel.name, &members).await?;

    reply.set("channel", channel.name);
    reply.set(
        "partner_ids",
        Value::Array(partner_ids.into_iter().map(Value::from).collect()),
    );
    Ok(reply)
}

fn adopt_new_channel(session: &mut Session, channel: &str, joins: Vec<JoinInfo>) {
    session.ctx.registry.subscribe(channel, session.id);
    if let Some(auth) = session.authenticated_mut()
        && let Some(mine) = joins.into_iter().find(|j| j.user_id == auth.user_id)
    {
        auth.joins.joins.insert(channel.to_string(), mine);
    }
}

async fn announce_create(
    session: &Session,
    channel: &str,
    users: &[String],
) -> Result<(), RelayError> {
    let mut announce = Document::new();
    announce.insert("channel", channel.to_string());
    announce.insert(
        "users",
        Value::Array(users.iter().cloned().map(Value::from).collect()),
    );
    let env = Envelope::from_document(announce);
    session
        .ctx
        .bus
        .publish(CONTROL_TOPIC, env.to_bytes())
        .await?;
    Ok(())
}

async fn get_channels(session: &mut Session) -> Result<Envelope, RelayError> {
    let user_id = session.authenticated().unwrap().user_id.clone();
    let joins: Vec<JoinInfo> = session
        .authenticated()
        .unwrap()
        .joins
        .joins
        .values()
        .cloned()
        .collect();

    let now = now_millis();
    let mut channel_docs = Vec::new();
    let mut mentioned_users = std::collections::BTreeSet::new();
    let mut advanced: Vec<JoinInfo> = Vec::new();

    for join in joins {
        let Some(channel) = session.ctx.db.store().get_channel(&join.channel).await? else {
            continue;
        };

        let recent = session
            .ctx
            .history
            .query(
                &channel.name,
                MessageQuery {
                    limit: RECENT_MESSAGES_LIMIT,
                    newest_first: true,
                    ..Default::default()
                },
            )
            .await?;

        if !channel.is_group_chat && recent.is_empty() {
            continue;
        }

        let others = session
            .ctx
            .db
            .store()
            .join_infos_by_channel(&channel.name)
            .await?
            .into_iter()
            .filter(|j| j.user_id != user_id)
            .collect::<Vec<_>>();

        let unread_count = session
            .ctx
            .history
            .count_messages(&channel.name, join.last_read_at)
            .await?;

        let mut doc = Document::new();
        doc.insert("channel", channel.name.clone());
        doc.insert("is_group_chat", channel.is_group_chat);
        doc.insert("unread_count", unread_count as i64);
        doc.insert(
            "messages",
            Value::Array(recent.iter().map(message_to_value).collect()),
        );
        let mut other_docs = Vec::new();
        for other in &others {
            mentioned_users.insert(other.user_id.clone());
            let mut od = Document::new();
            od.insert("user_id", other.user_id.clone());
            od.insert("last_read_at", other.last_read_at);
            other_docs.push(Value::Document(od));
        }
        doc.insert("members", Value::Array(other_docs));
        channel_docs.push(Value::Document(doc));

        let mut updated = join.clone();
        updated.last_sent_at = now;
        advanced.push(updated);
    }

    for join in &advanced {
        session.ctx.db.store().put_join_info(join).await?;
        if let Some(auth) = session.authenticated_mut() {
            auth.joins.joins.insert(join.channel.clone(), join.clone());
        }
    }

    let mut reply = Envelope::new("get_channels");
    reply.set("channels", Value::Array(channel_docs));
    reply.set(
        "users",
        Value::Array(mentioned_users.into_iter().map(Value::from).collect()),
    );
    Ok(reply)
}

fn message_to_value(msg: &Message) -> Value {
    let mut doc = Document::new();
    doc.insert("channel", msg.channel.clone());
    doc.insert("published_at", msg.published_at);
    doc.insert("writer", msg.writer.clone());
    doc.insert("type", msg.r#type.clone());
    doc.insert("message", msg.message.clone());
    Value::Document(doc)
}

async fn unread(session: &mut Session, envelope: &Envelope) -> Result<Envelope, RelayError> {
    let doc = envelope.document();
    let user_id = session.authenticated().unwrap().user_id.clone();
    let requested_channel = doc.get_str_opt("channel").map(str::to_string);
    let before = doc.get_i64("before").ok();

    if let Some(channel) = &requested_channel
        && !session
            .authenticated()
            .unwrap()
            .joins
            .joins
            .contains_key(channel)
    {
        return Err(RelayError::InvalidChannel);
    }

    let relevant: Vec<JoinInfo> = {
        let auth = session.authenticated().unwrap();
        match &requested_channel {
            Some(channel) => vec![auth.joins.joins[channel].clone()],
            None => auth.joins.joins.values().cloned().collect(),
        }
    };

    let now = now_millis();
    let mut messages = Vec::new();
    let mut advanced = Vec::new();

    for join in relevant {
        let results = if let Some(before) = before {
            session
                .ctx
                .history
                .query(
                    &join.channel,
                    MessageQuery {
                        before: Some(before),
                        limit: UNREAD_BEFORE_LIMIT,
                        newest_first: true,
                        ..Default::default()
                    },
                )
                .await?
        } else {
            session
                .ctx
                .history
                .query(
                    &join.channel,
                    MessageQuery {
                        after: Some(join.last_sent_at),
                        newest_first: false,
                        ..Default::default()
                    },
                )
                .await?
        };

        if !results.is_empty() {
            let mut updated = join.clone();
            updated.last_sent_at = now;
            advanced.push(updated);
        }
        messages.extend(results);
    }

    for join in &advanced {
        session.ctx.db.store().put_join_info(join).await?;
        if let Some(auth) = session.authenticated_mut() {
            auth.joins.joins.insert(join.channel.clone(), join.clone());
        }
    }

    let mut reply = Envelope::new("unread");
    reply.set(
        "messages",
        Value::Array(messages.iter().map(message_to_value).collect()),
    );
    Ok(reply)
}

async fn join(session: &mut Session, channel: String) -> Result<Envelope, RelayError> {
    let user_id = session.authenticated().unwrap().user_id.clone();
    let chan = session
        .ctx
        .db
        .store()
        .get_channel(&channel)
        .await?
        .ok_or(RelayError::InvalidChannel)?;
    if !chan.is_group_chat {
        return Err(RelayError::NotGroupChat);
    }

    let now = now_millis();
    let info = JoinInfo {
        channel: channel.clone(),
        user_id: user_id.clone(),
        joined_at: now,
        last_read_at: now,
        last_sent_at: now,
        last_published_at: None,
    };
    session.ctx.db.store().put_join_info(&info).await?;
    session.ctx.registry.subscribe(&channel, session.id);
    if let Some(auth) = session.authenticated_mut() {
        auth.joins.joins.insert(channel.clone(), info);
    }

    publish_control(session, &channel, "join", &user_id, "").await?;

    let members: Vec<String> = session
        .ctx
        .db
        .store()
        .join_infos_by_channel(&channel)
        .await?
        .into_iter()
        .map(|j| j.user_id)
        .collect();

    let mut reply = Envelope::new("join");
    reply.set("channel", channel);
    reply.set("members", Value::Array(members.into_iter().map(Value::from).collect()));
    Ok(reply)
}

async fn withdrawal(session: &mut Session, channel: String) -> Result<Envelope, RelayError> {
    let user_id = session.authenticated().unwrap().user_id.clone();
    let existing = session
        .authenticated()
        .unwrap()
        .joins
        .joins
        .get(&channel)
        .cloned();

    let Some(info) = existing else {
        let mut reply = Envelope::new("withdrawal");
        reply.set("channel", channel);
        return Ok(reply);
    };

    session.ctx.db.store().withdraw(&info, now_millis()).await?;
    session.ctx.registry.unsubscribe(&channel, session.id);
    if let Some(auth) = session.authenticated_mut() {
        auth.joins.joins.remove(&channel);
        if auth.attending.as_deref() == Some(channel.as_str()) {
            auth.attending = None;
        }
    }

    publish_control(session, &channel, "withdrawal", &user_id, "").await?;

    let mut reply = Envelope::new("withdrawal");
    reply.set("channel", channel);
    Ok(reply)
}

async fn attend(session: &mut Session, channel: String) -> Result<Envelope, RelayError> {
    let user_id = session.authenticated().unwrap().user_id.clone();
    let my_join = session
        .authenticated()
        .unwrap()
        .joins
        .joins
        .get(&channel)
        .cloned()
        .ok_or(RelayError::NotMember)?;

    let others = session
        .ctx
        .db
        .store()
        .join_infos_by_channel(&channel)
        .await?
        .into_iter()
        .filter(|j| j.user_id != user_id)
        .collect::<Vec<_>>();

    let chan = session
        .ctx
        .db
        .store()
        .get_channel(&channel)
        .await?
        .ok_or(RelayError::InvalidChannel)?;

    let mut reply = Envelope::new("attend");
    reply.set("channel", channel.clone());

    if chan.is_group_chat {
        let mut map = Document::new();
        for other in &others {
            map.insert(other.user_id.clone(), other.last_read_at);
        }
        reply.set("last_read", Value::Document(map));
    } else {
        let other = others.first().ok_or(RelayError::InvalidChannel)?;
        reply.set("last_read", other.last_read_at);
    }

    if let Some(auth) = session.authenticated_mut() {
        auth.attending = Some(channel.clone());
        auth.last_published_at = None;
    }
    session
        .cursor_handle
        .set_attending(Some(channel), my_join.last_read_at);

    Ok(reply)
}

pub(crate) async fn exit_impl(session: &mut Session) {
    let Some(auth) = session.authenticated_mut() else {
        return;
    };
    let Some(channel) = auth.attending.take() else {
        return;
    };
    let last_published_at = auth.last_published_at.take();
    let user_id = auth.user_id.clone();
    session.cursor_handle.set_attending(None, 0);

    if let Some(ts) = last_published_at {
        let date = DateTime::from_timestamp_millis(ts)
            .map(|dt| dt.format("%Y-%m-%d").to_string())
            .unwrap_or_default();
        let log = UsageLog {
            date,
            channel,
            user_id,
            last_published_at: ts,
        };
        if let Err(e) = session.ctx.db.store().put_usage_log(&log).await {
            tracing::warn!(error = %e, "failed to write usage log on exit");
        }
    }
}

/// Publishes a message to the session's attended channel.
///
/// Returns no reply envelope of its own: delivery to every subscribed
/// session, including this one, happens exactly once, via the Dispatcher
/// fan-out over the bus.
async fn publish(session: &mut Session, envelope: &Envelope) -> Result<(), RelayError> {
    let doc = envelope.document();
    let msg_type = doc.get_str("type").unwrap_or("text").to_string();
    let message = doc.get_str("message").unwrap_or("").to_string();
    if message.trim().is_empty() {
        return Err(RelayError::BlankMessage);
    }

    let user_id = session.authenticated().unwrap().user_id.clone();
    let channel = session.authenticated().unwrap().attending.clone().unwrap();

    let published_at = publish_control(session, &channel, &msg_type, &user_id, &message).await?;

    if let Some(auth) = session.authenticated_mut() {
        auth.last_published_at = Some(published_at);
    }

    let env = publish_envelope(&channel, &msg_type, &user_id, &message, published_at);
    enqueue_fire_and_forget(session, NOTIFICATION_QUEUE, env.clone());
    enqueue_fire_and_forget(session, AUDIT_QUEUE, env.clone());

    Ok(())
}

async fn ack(session: &mut Session, channel: String, published_at: i64) -> Result<Envelope, RelayError> {
    let user_id = session.authenticated().unwrap().user_id.clone();

    let mut env = Envelope::new("ack");
    env.set("sender", user_id.clone());
    env.set("channel", channel.clone());
    env.set("published_at", published_at);

    session
        .ctx
        .bus
        .publish(&channel_subject(&channel), env.to_bytes())
        .await?;
    enqueue_fire_and_forget(session, AUDIT_QUEUE, env.clone());

    let mut reply = Envelope::new("ack");
    reply.set("channel", channel);
    reply.set("published_at", published_at);
    Ok(reply)
}

fn ping() -> Envelope {
    let mut reply = Envelope::new("ping");
    reply.set("time", now_millis());
    reply
}

/// Append a control/content message to the channel's durable log and
/// publish it on the bus, returning the assigned `published_at`. Shared by
/// `publish`, `join`, and `withdrawal` — all three are, on the wire, a
/// `publish`-shaped envelope distinguished only by `type`.
async fn publish_control(
    session: &Session,
    channel: &str,
    msg_type: &str,
    writer: &str,
    message: &str,
) -> Result<i64, RelayError> {
    let published_at = session.ctx.clock.next();
    let stored = Message {
        channel: channel.to_string(),
        published_at,
        writer: writer.to_string(),
        r#type: msg_type.to_string(),
        message: message.to_string(),
    };
    session.ctx.history.append(&stored).await?;
    crate::metrics::MESSAGES_PUBLISHED.inc();

    let env = publish_envelope(channel, msg_type, writer, message, published_at);
    session
        .ctx
        .bus
        .publish(&channel_subject(channel), env.to_bytes())
        .await?;
    Ok(published_at)
}

fn publish_envelope(
    channel: &str,
    msg_type: &str,
    writer: &str,
    message: &str,
    published_at: i64,
) -> Envelope {
    let mut env = Envelope::new("publish");
    env.set("type", msg_type.to_string());
    env.set("channel", channel.to_string());
    env.set("message", message.to_string());
    env.set("writer", writer.to_string());
    env.set("published_at", published_at);
    env
}

/// Enqueue without blocking the reply path; failures are logged, never
/// surfaced to the client (§7).
fn enqueue_fire_and_forget(session: &Session, queue_name: &'static str, envelope: Envelope) {
    let queue = session.ctx.queue.clone();
    let payload: Bytes = envelope.to_bytes();
    tokio::spawn(async move {
        if let Err(e) = queue.enqueue(queue_name, payload).await {
            tracing::warn!(queue = queue_name, error = %e, "failed to enqueue envelope");
        }
    });
}
