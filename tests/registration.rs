//! Connection registration flows.

mod common;

use common::{TestClient, TestServer};

#[tokio::test]
async fn welcome_burst_ends_registration() {
    let server = TestServer::spawn(16672).await.expect("spawn server");
    let mut alice = server.connect("alice").await.expect("connect");

    alice
        .send_raw("NICK alice")
        .await
        .expect("send NICK");
    alice
        .send_raw("USER alice 0 * :Alice Example")
        .await
        .expect("send USER");

    let messages = alice
        .recv_until(|m| m.command == "004")
        .await
        .expect("welcome burst");
    let codes: Vec<&str> = messages.iter().map(|m| m.command.as_str()).collect();
    assert_eq!(codes, vec!["001", "002", "003", "004"]);
    assert_eq!(messages[0].arg(0), Some("alice"));
    assert!(messages[0]
        .arg(1)
        .expect("welcome text")
        .starts_with("Welcome"));
}

#[tokio::test]
async fn taken_nick_is_rejected() {
    let server = TestServer::spawn(16674).await.expect("spawn server");
    let mut alice = server.connect("alice").await.expect("connect alice");
    alice.register().await.expect("register alice");

    let mut imposter = TestClient::connect(&server.address(), "alice")
        .await
        .expect("connect imposter");
    imposter.send_raw("NICK alice").await.expect("send NICK");
    let messages = imposter
        .recv_until(|m| m.command == "433")
        .await
        .expect("433 reply");
    let reply = messages.last().expect("at least one message");
    // Unregistered connections are addressed as `*`.
    assert_eq!(reply.arg(0), Some("*"));
    assert_eq!(reply.arg(1), Some("alice"));
}

#[tokio::test]
async fn erroneous_nick_is_rejected() {
    let server = TestServer::spawn(16676).await.expect("spawn server");
    let mut client = server.connect("x").await.expect("connect");
    client.send_raw("NICK 9lives").await.expect("send NICK");
    client
        .recv_until(|m| m.command == "432")
        .await
        .expect("432 reply");
}

#[tokio::test]
async fn commands_before_registration_get_451() {
    let server = TestServer::spawn(16678).await.expect("spawn server");
    let mut client = server.connect("x").await.expect("connect");
    client.send_raw("JOIN #early").await.expect("send JOIN");
    client
        .recv_until(|m| m.command == "451")
        .await
        .expect("451 reply");
}
