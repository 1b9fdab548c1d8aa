//! Live socket tests: a real server on an ephemeral port and a
//! tungstenite client.

use civic_fanout::{ChangeFanout, ChangeKind, ChangePublisher, IssueChange};
use civic_types::{
    Category, Coordinates, Issue, IssueId, IssueStatus, Severity, Timestamp, VoterId,
};
use civic_websocket::{ServerMessage, WebSocketServer};
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio_tungstenite::tungstenite::Message;

type Client = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

fn issue(seed: u8, revision: u64) -> Issue {
    Issue {
        id: IssueId::new([seed; 32]),
        reporter: VoterId::new("reporter"),
        title: "Flooded underpass".into(),
        question: "Is the underpass on Ring Road flooded?".into(),
        category: Category::Roads,
        severity: Severity::High,
        origin: Coordinates::new(51.5, -0.12),
        radius_meters: 1_000.0,
        vote_threshold: 5,
        yes_votes: revision as u32 - 1,
        no_votes: 0,
        status: IssueStatus::Active,
        created_at: Timestamp::new(1),
        updated_at: Timestamp::new(revision),
        expires_at: Timestamp::new(86_401),
        revision,
        repost_count: 0,
        escalation_count: 0,
    }
}

async fn start() -> (ChangeFanout, String) {
    let fanout = ChangeFanout::new();
    let server = WebSocketServer::new(0, fanout.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = server.router();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (fanout, format!("ws://{addr}/ws"))
}

async fn next_message(client: &mut Client) -> ServerMessage {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), client.next())
            .await
            .expect("message in time")
            .expect("stream open")
            .expect("valid frame");
        if let Message::Text(text) = msg {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

async fn send(client: &mut Client, raw: String) {
    client.send(Message::Text(raw)).await.unwrap();
}

async fn wait_for_subscribers(fanout: &ChangeFanout, expected: usize) {
    for _ in 0..100 {
        if fanout.subscriber_count() == expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("expected {expected} subscribers, have {}", fanout.subscriber_count());
}

#[tokio::test]
async fn subscribed_client_receives_changes_in_order() {
    let (fanout, url) = start().await;
    let (mut client, _) = tokio_tungstenite::connect_async(url).await.unwrap();

    send(&mut client, r#"{"action":"subscribe"}"#.to_string()).await;
    assert!(matches!(next_message(&mut client).await, ServerMessage::Ack { .. }));

    // Revision 2 arrives first; it must wait for the creation event.
    fanout.publish(IssueChange::updated(issue(1, 2)));
    fanout.publish(IssueChange::created(issue(1, 1)));

    for expected in 1..=2 {
        match next_message(&mut client).await {
            ServerMessage::Change { issue, .. } => assert_eq!(issue.revision, expected),
            other => panic!("unexpected message {other:?}"),
        }
    }
}

#[tokio::test]
async fn issue_scope_filters_other_issues() {
    let (fanout, url) = start().await;
    let (mut client, _) = tokio_tungstenite::connect_async(url).await.unwrap();
    let wanted = IssueId::new([2; 32]);

    send(&mut client, format!(r#"{{"action":"subscribe","issue":"{wanted}"}}"#)).await;
    assert!(matches!(next_message(&mut client).await, ServerMessage::Ack { .. }));

    fanout.publish(IssueChange::created(issue(9, 1)));
    fanout.publish(IssueChange::created(issue(2, 1)));

    match next_message(&mut client).await {
        ServerMessage::Change { issue, .. } => assert_eq!(issue.id, wanted),
        other => panic!("unexpected message {other:?}"),
    }
}

#[tokio::test]
async fn overlapping_scopes_deliver_each_change_once_in_order() {
    let (fanout, url) = start().await;
    let (mut client, _) = tokio_tungstenite::connect_async(url).await.unwrap();
    let watched = IssueId::new([5; 32]);

    send(&mut client, r#"{"action":"subscribe"}"#.to_string()).await;
    next_message(&mut client).await;
    send(&mut client, format!(r#"{{"action":"subscribe","issue":"{watched}"}}"#)).await;
    next_message(&mut client).await;
    wait_for_subscribers(&fanout, 1).await;

    fanout.publish(IssueChange::updated(issue(5, 2)));
    fanout.publish(IssueChange::created(issue(5, 1)));

    for (expected_kind, expected_revision) in [(ChangeKind::Created, 1), (ChangeKind::Updated, 2)] {
        match next_message(&mut client).await {
            ServerMessage::Change { kind, issue } => {
                assert_eq!(kind, expected_kind);
                assert_eq!(issue.revision, expected_revision);
            }
            other => panic!("unexpected message {other:?}"),
        }
    }

    // No duplicate copies are queued ahead of the pong.
    send(&mut client, r#"{"action":"ping"}"#.to_string()).await;
    assert_eq!(next_message(&mut client).await, ServerMessage::Pong);
}

#[tokio::test]
async fn bad_requests_get_errors_and_ping_gets_pong() {
    let (_fanout, url) = start().await;
    let (mut client, _) = tokio_tungstenite::connect_async(url).await.unwrap();

    send(&mut client, "not json".to_string()).await;
    assert!(matches!(next_message(&mut client).await, ServerMessage::Error { .. }));

    send(&mut client, r#"{"action":"unsubscribe"}"#.to_string()).await;
    assert!(matches!(next_message(&mut client).await, ServerMessage::Error { .. }));

    send(&mut client, r#"{"action":"ping"}"#.to_string()).await;
    assert_eq!(next_message(&mut client).await, ServerMessage::Pong);
}

#[tokio::test]
async fn disconnect_releases_subscriptions() {
    let (fanout, url) = start().await;
    let (mut client, _) = tokio_tungstenite::connect_async(url).await.unwrap();

    send(&mut client, r#"{"action":"subscribe"}"#.to_string()).await;
    next_message(&mut client).await;
    send(&mut client, format!(r#"{{"action":"subscribe","issue":"{}"}}"#, IssueId::new([4; 32]))).await;
    next_message(&mut client).await;
    wait_for_subscribers(&fanout, 1).await;

    client.close(None).await.unwrap();
    drop(client);
    wait_for_subscribers(&fanout, 0).await;
}
