//! Channel lifecycle flows: join, names, topic, messages, moderation.

mod common;

use common::TestServer;
use std::time::Duration;

#[tokio::test]
async fn join_names_and_topic() {
    let server = TestServer::spawn(16682).await.expect("spawn server");
    let mut alice = server.connect("alice").await.expect("connect alice");
    alice.register().await.expect("register alice");

    alice.join("#flow").await.expect("join");
    let messages = alice
        .recv_until(|m| m.command == "366")
        .await
        .expect("names burst");
    assert!(messages
        .iter()
        .any(|m| m.command == "JOIN" && m.arg(0) == Some("#flow")));
    let names = messages
        .iter()
        .find(|m| m.command == "353")
        .expect("RPL_NAMREPLY");
    // The names list follows the nick and the `=` visibility marker.
    // The creator gets ops.
    assert!(names.arg(3).expect("names list").contains("@alice"));

    alice
        .send_raw("TOPIC #flow :today: timestamps")
        .await
        .expect("set topic");
    alice
        .recv_until(|m| m.command == "TOPIC")
        .await
        .expect("topic echo");

    // A later joiner sees the topic in the join burst.
    let mut bob = server.connect("bob").await.expect("connect bob");
    bob.register().await.expect("register bob");
    bob.join("#flow").await.expect("join");
    let messages = bob.recv_until(|m| m.command == "366").await.expect("names");
    let topic = messages
        .iter()
        .find(|m| m.command == "332")
        .expect("RPL_TOPIC");
    assert_eq!(topic.arg(2), Some("today: timestamps"));
}

#[tokio::test]
async fn privmsg_reaches_other_members_only() {
    let server = TestServer::spawn(16684).await.expect("spawn server");
    let mut alice = server.connect("alice").await.expect("connect alice");
    let mut bob = server.connect("bob").await.expect("connect bob");
    alice.register().await.expect("register alice");
    bob.register().await.expect("register bob");

    alice.join("#chat").await.expect("join");
    alice.recv_until(|m| m.command == "366").await.expect("names");
    bob.join("#chat").await.expect("join");
    bob.recv_until(|m| m.command == "366").await.expect("names");
    alice.drain().await;

    alice
        .privmsg("#chat", "hello from alice")
        .await
        .expect("privmsg");
    let messages = bob
        .recv_until(|m| m.command == "PRIVMSG")
        .await
        .expect("bob receives");
    let msg = messages.last().expect("privmsg");
    assert_eq!(msg.arg(0), Some("#chat"));
    assert_eq!(msg.arg(1), Some("hello from alice"));

    // No self-echo for the sender.
    assert!(alice
        .recv_timeout(Duration::from_millis(200))
        .await
        .is_err());
}

#[tokio::test]
async fn kick_is_seen_by_the_target() {
    let server = TestServer::spawn(16686).await.expect("spawn server");
    let mut alice = server.connect("alice").await.expect("connect alice");
    let mut bob = server.connect("bob").await.expect("connect bob");
    alice.register().await.expect("register alice");
    bob.register().await.expect("register bob");

    alice.join("#mod").await.expect("join");
    alice.recv_until(|m| m.command == "366").await.expect("names");
    bob.join("#mod").await.expect("join");
    bob.recv_until(|m| m.command == "366").await.expect("names");

    alice
        .send_raw("KICK #mod bob :enough")
        .await
        .expect("kick");
    let messages = bob
        .recv_until(|m| m.command == "KICK")
        .await
        .expect("bob sees kick");
    let kick = messages.last().expect("kick line");
    assert_eq!(kick.arg(0), Some("#mod"));
    assert_eq!(kick.arg(1), Some("bob"));
    assert_eq!(kick.arg(2), Some("enough"));

    // Non-ops cannot kick: bob rejoins and tries to return the favor.
    bob.join("#mod").await.expect("rejoin");
    bob.recv_until(|m| m.command == "366").await.expect("names");
    bob.send_raw("KICK #mod alice :revenge").await.expect("kick");
    bob.recv_until(|m| m.command == "482").await.expect("482 reply");
}

#[tokio::test]
async fn banned_user_cannot_join() {
    let server = TestServer::spawn(16688).await.expect("spawn server");
    let mut alice = server.connect("alice").await.expect("connect alice");
    let mut bob = server.connect("bob").await.expect("connect bob");
    alice.register().await.expect("register alice");
    bob.register().await.expect("register bob");

    alice.join("#gate").await.expect("join");
    alice.recv_until(|m| m.command == "366").await.expect("names");
    alice
        .send_raw("MODE #gate +b bob!*@*")
        .await
        .expect("set ban");
    alice
        .recv_until(|m| m.command == "MODE")
        .await
        .expect("mode echo");

    bob.join("#gate").await.expect("join attempt");
    let messages = bob.recv_until(|m| m.command == "474").await.expect("474");
    assert_eq!(messages.last().expect("reply").arg(1), Some("#gate"));

    // Lifting the ban reopens the door.
    alice
        .send_raw("MODE #gate -b bob!*@*")
        .await
        .expect("unban");
    alice
        .recv_until(|m| m.command == "MODE")
        .await
        .expect("mode echo");
    bob.join("#gate").await.expect("join again");
    bob.recv_until(|m| m.command == "366").await.expect("names");
}

#[tokio::test]
async fn mode_query_reports_channel_modes() {
    let server = TestServer::spawn(16690).await.expect("spawn server");
    let mut alice = server.connect("alice").await.expect("connect alice");
    alice.register().await.expect("register alice");

    alice.join("#q").await.expect("join");
    alice.recv_until(|m| m.command == "366").await.expect("names");
    alice.send_raw("MODE #q +mtk sekrit").await.expect("set modes");
    alice.recv_until(|m| m.command == "MODE").await.expect("echo");

    alice.send_raw("MODE #q").await.expect("query");
    let messages = alice.recv_until(|m| m.command == "324").await.expect("324");
    let reply = messages.last().expect("mode reply");
    assert_eq!(reply.arg(1), Some("#q"));
    let modes = reply.arg(2).expect("mode string");
    assert!(modes.contains('m') && modes.contains('t') && modes.contains('k'));
    // Creation time follows.
    alice.recv_until(|m| m.command == "329").await.expect("329");
}
