//! End-to-end group-channel flow: creation, membership fan-out on publish,
//! blank-message rejection, and ack broadcast.

mod common;

use common::TestServer;
use relay_proto::Value;
use std::time::Duration;

#[tokio::test]
async fn group_create_then_publish_fans_out_to_members() {
    let server = TestServer::spawn().await;

    let mut alice = server.connect().await;
    alice.authenticate("alice").await;

    let mut create = relay_proto::Envelope::new("create");
    create.set(
        "partner_ids",
        Value::Array(vec![Value::from("bob")]),
    );
    alice.send(create).await;
    let reply = alice.recv().await;
    let channel = reply.document().get_str("channel").unwrap().to_string();

    // Bob authenticates after the channel exists, so his subscription is
    // picked up from his persisted join_infos.
    let mut bob = server.connect().await;
    bob.authenticate("bob").await;

    let mut attend = relay_proto::Envelope::new("attend");
    attend.set("channel", channel.clone());
    alice.send(attend).await;
    alice.recv().await;

    let mut publish = relay_proto::Envelope::new("publish");
    publish.set("type", "text");
    publish.set("message", "hello bob");
    alice.send(publish).await;

    // The publisher is a channel member too, so her own copy of the fan-out
    // is her only reply — there is no separate direct "publish" ack.
    let own_copy = alice.recv().await;
    assert_eq!(own_copy.method().unwrap(), "publish");
    assert_eq!(own_copy.document().get_str("channel").unwrap(), channel);

    let fanned_out = bob.recv().await;
    assert_eq!(fanned_out.method().unwrap(), "publish");
    assert_eq!(fanned_out.document().get_str("message").unwrap(), "hello bob");
    assert_eq!(fanned_out.document().get_str("writer").unwrap(), "alice");
}

#[tokio::test]
async fn blank_publish_is_rejected() {
    let server = TestServer::spawn().await;
    let mut alice = server.connect().await;
    alice.authenticate("alice").await;

    let mut create = relay_proto::Envelope::new("create");
    create.set("partner_ids", Value::Array(vec![Value::from("bob")]));
    alice.send(create).await;
    let reply = alice.recv().await;
    let channel = reply.document().get_str("channel").unwrap().to_string();

    let mut attend = relay_proto::Envelope::new("attend");
    attend.set("channel", channel);
    alice.send(attend).await;
    alice.recv().await;

    let mut publish = relay_proto::Envelope::new("publish");
    publish.set("type", "text");
    publish.set("message", "   ");
    alice.send(publish).await;

    let reply = alice.recv().await;
    assert!(reply.is_error(), "blank message should be rejected, got {reply:?}");
}

#[tokio::test]
async fn ack_is_broadcast_to_channel_members() {
    let server = TestServer::spawn().await;

    let mut alice = server.connect().await;
    alice.authenticate("alice").await;
    let mut create = relay_proto::Envelope::new("create");
    create.set("partner_ids", Value::Array(vec![Value::from("bob")]));
    alice.send(create).await;
    let channel = alice.recv().await.document().get_str("channel").unwrap().to_string();

    let mut bob = server.connect().await;
    bob.authenticate("bob").await;

    let mut attend = relay_proto::Envelope::new("attend");
    attend.set("channel", channel.clone());
    alice.send(attend).await;
    alice.recv().await;

    let mut publish = relay_proto::Envelope::new("publish");
    publish.set("type", "text");
    publish.set("message", "ping");
    alice.send(publish).await;
    alice.recv().await; // alice is a channel member too, sees her own publish fan out
    let published = bob.recv().await;
    let published_at = published.document().get_i64("published_at").unwrap();

    let mut ack = relay_proto::Envelope::new("ack");
    ack.set("channel", channel.clone());
    ack.set("published_at", published_at);
    bob.send(ack).await;
    let reply = bob.recv().await;
    assert_eq!(reply.document().get_str("channel").unwrap(), channel);

    // Alice (also subscribed) observes the ack fan out on the channel.
    let seen = alice.recv_timeout(Duration::from_secs(2)).await.expect("expected ack fan-out");
    assert_eq!(seen.method().unwrap(), "ack");
    assert_eq!(seen.document().get_i64("published_at").unwrap(), published_at);
}
