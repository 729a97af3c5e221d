//! Unread recovery after a disconnect, and withdrawal notifying the rest
//! of a channel's members.

mod common;

use common::TestServer;
use relay_proto::Value;

#[tokio::test]
async fn unread_recovers_messages_sent_while_disconnected() {
    let server = TestServer::spawn().await;

    let mut alice = server.connect().await;
    alice.authenticate("alice").await;
    let mut create = relay_proto::Envelope::new("create");
    create.set("partner_ids", Value::Array(vec![Value::from("bob")]));
    alice.send(create).await;
    let channel = alice.recv().await.document().get_str("channel").unwrap().to_string();

    // Bob is a member from channel creation, but never connects before
    // alice publishes — no live session to fan out to.
    let mut attend = relay_proto::Envelope::new("attend");
    attend.set("channel", channel.clone());
    alice.send(attend).await;
    alice.recv().await;

    for msg in ["first", "second", "third"] {
        let mut publish = relay_proto::Envelope::new("publish");
        publish.set("type", "text");
        publish.set("message", msg);
        alice.send(publish).await;
        alice.recv().await; // alice's own fan-out loopback
    }

    let mut bob = server.connect().await;
    bob.authenticate("bob").await;

    let unread = relay_proto::Envelope::new("unread");
    bob.send(unread).await;
    let reply = bob.recv().await;
    let messages = reply
        .document()
        .get("messages")
        .and_then(Value::as_array)
        .unwrap();
    assert_eq!(messages.len(), 3);
    let texts: Vec<&str> = messages
        .iter()
        .filter_map(|m| m.as_document().and_then(|d| d.get_str_opt("message")))
        .collect();
    assert_eq!(texts, vec!["first", "second", "third"]);
}

#[tokio::test]
async fn withdrawal_notifies_remaining_members() {
    let server = TestServer::spawn().await;

    let mut alice = server.connect().await;
    alice.authenticate("alice").await;
    let mut create = relay_proto::Envelope::new("create");
    create.set("partner_ids", Value::Array(vec![Value::from("bob")]));
    alice.send(create).await;
    let channel = alice.recv().await.document().get_str("channel").unwrap().to_string();

    let mut bob = server.connect().await;
    bob.authenticate("bob").await;

    let mut withdrawal = relay_proto::Envelope::new("withdrawal");
    withdrawal.set("channel", channel.clone());
    alice.send(withdrawal).await;
    let reply = alice.recv().await;
    assert_eq!(reply.document().get_str("channel").unwrap(), channel);

    let notice = bob.recv().await;
    assert_eq!(notice.method().unwrap(), "publish");
    assert_eq!(notice.document().get_str("type").unwrap(), "withdrawal");
    assert_eq!(notice.document().get_str("writer").unwrap(), "alice");
}

#[tokio::test]
async fn repeated_withdrawal_is_idempotent() {
    let server = TestServer::spawn().await;

    let mut alice = server.connect().await;
    alice.authenticate("alice").await;
    let mut create = relay_proto::Envelope::new("create");
    create.set("partner_ids", Value::Array(vec![Value::from("bob")]));
    alice.send(create).await;
    let channel = alice.recv().await.document().get_str("channel").unwrap().to_string();

    let mut withdrawal = relay_proto::Envelope::new("withdrawal");
    withdrawal.set("channel", channel.clone());
    alice.send(withdrawal.clone()).await;
    let first = alice.recv().await;
    assert!(!first.is_error());

    alice.send(withdrawal).await;
    let second = alice.recv().await;
    assert!(!second.is_error(), "withdrawing twice must not error");
}
