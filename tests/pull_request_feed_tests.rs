// ABOUTME: Tests for the pull request feed against a mock Azure DevOps server.
// ABOUTME: Verifies the request, the created-since window, ordering, and the announcement message.

#![cfg(feature = "tfs")]

use chrono::{Duration as ChronoDuration, Utc};
use serde_json::json;
use slackbot::tfs::PullRequestFeed;
use slackbot_core::config::PullRequestFeedConfig;
use slackbot_core::{Feed, MessageSubtype};
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config(collection: &str) -> PullRequestFeedConfig {
    PullRequestFeedConfig {
        project_collection: collection.to_string(),
        project: "Projects".to_string(),
        username: "bot".to_string(),
        password: "secret".to_string(),
        channel: "general".to_string(),
        interval_secs: 180,
    }
}

fn pull_request(id: u64, minutes_ago: i64) -> serde_json::Value {
    json!({
        "pullRequestId": id,
        "url": format!("https://tfs.test/pr/{}", id),
        "creationDate": (Utc::now() - ChronoDuration::minutes(minutes_ago)).to_rfc3339(),
        "title": format!("PR {}", id),
        "createdBy": {
            "displayName": "Ada",
            "uniqueName": "ada@contoso.com",
            "imageUrl": format!("https://tfs.test/avatar/{}", id)
        }
    })
}

#[tokio::test]
async fn test_poll_announces_new_pull_requests_newest_first() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/Projects/_apis/git/pullrequests"))
        .and(query_param("searchCriteria.status", "active"))
        .and(header("authorization", "Basic Ym90OnNlY3JldA=="))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": [pull_request(1, 120), pull_request(2, 5), pull_request(3, 1)],
            "count": 3
        })))
        .mount(&server)
        .await;

    let feed = PullRequestFeed::new(&config(&server.uri()))
        .since(Utc::now() - ChronoDuration::minutes(30));

    let messages = feed.poll(&CancellationToken::new()).await.unwrap();

    assert_eq!(messages.len(), 1);
    let announcement = &messages[0];
    assert_eq!(announcement.channel, "general");
    assert_eq!(announcement.text, "Watch out humans!");
    assert_eq!(announcement.subtype, MessageSubtype::BotMessage);

    let titles: Vec<_> = announcement
        .attachments
        .iter()
        .map(|a| a.title.clone().unwrap_or_default())
        .collect();
    assert_eq!(titles, vec!["PR 3", "PR 2"]);
    assert_eq!(
        announcement.attachments[0].image_url.as_deref(),
        Some("https://tfs.test/avatar/3")
    );
    assert_eq!(
        announcement.attachments[0].title_link.as_deref(),
        Some("https://tfs.test/pr/3")
    );
}

#[tokio::test]
async fn test_second_poll_only_reports_newer_pull_requests() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/Projects/_apis/git/pullrequests"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"value": [pull_request(4, 2)]})),
        )
        .mount(&server)
        .await;

    let feed = PullRequestFeed::new(&config(&server.uri()));
    let cancel = CancellationToken::new();

    assert_eq!(feed.poll(&cancel).await.unwrap().len(), 1);
    // PR 4 predates the previous poll's start, so it is not announced again
    assert!(feed.poll(&cancel).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_failed_poll_keeps_window() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/Projects/_apis/git/pullrequests"))
        .respond_with(ResponseTemplate::new(401).set_body_string("unauthorized"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/Projects/_apis/git/pullrequests"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"value": [pull_request(5, 10)]})),
        )
        .mount(&server)
        .await;

    let feed = PullRequestFeed::new(&config(&server.uri()));
    let cancel = CancellationToken::new();

    let err = feed.poll(&cancel).await.unwrap_err();
    assert!(err.to_string().contains("401"));

    let messages = feed.poll(&cancel).await.unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].attachments[0].fallback, "PR 5");
}

#[test]
fn test_feed_identity() {
    let feed = PullRequestFeed::new(&config("https://tfs.test"));
    assert_eq!(feed.name(), "pull_requests");
    assert_eq!(feed.interval(), std::time::Duration::from_secs(180));
}
