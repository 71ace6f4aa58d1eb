//! Relevance strategies and exit-IP checks against mock services

use serde_json::Value;
use veil_fetch::config::RelevanceConfig;
use veil_fetch::identity::PublicIpChecker;
use veil_fetch::relevance::{build_classifier, RelevanceError};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

/// Embeds texts mentioning "economy" as [1, 0] and everything else as [0, 1]
struct TopicEmbedder;

impl Respond for TopicEmbedder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let body: Value = match serde_json::from_slice(&request.body) {
            Ok(body) => body,
            Err(_) => return ResponseTemplate::new(400),
        };
        let embeddings: Vec<Vec<f32>> = body["inputs"]
            .as_array()
            .map(|inputs| {
                inputs
                    .iter()
                    .map(|input| {
                        let text = input.as_str().unwrap_or_default().to_lowercase();
                        if text.contains("economy") {
                            vec![1.0, 0.0]
                        } else {
                            vec![0.0, 1.0]
                        }
                    })
                    .collect()
            })
            .unwrap_or_default();
        ResponseTemplate::new(200).set_body_json(embeddings)
    }
}

fn semantic_config(server: &MockServer) -> RelevanceConfig {
    RelevanceConfig::Semantic {
        query: "economy news".to_string(),
        threshold: 0.5,
        embedding_url: server.uri(),
        max_tokens: 512,
    }
}

#[tokio::test]
async fn test_semantic_classifier_scores_by_similarity() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/embed"))
        .respond_with(TopicEmbedder)
        .mount(&server)
        .await;

    let classifier = build_classifier(&semantic_config(&server), reqwest::Client::new())
        .await
        .unwrap();
    assert_eq!(classifier.name(), "semantic");

    let relevant = classifier
        .classify("The economy grew faster than expected")
        .await
        .unwrap();
    assert!(relevant.is_relevant);
    assert!((relevant.score - 1.0).abs() < 1e-6);
    assert_eq!(relevant.embedding, Some(vec![1.0, 0.0]));

    let irrelevant = classifier
        .classify("A recipe for sourdough bread")
        .await
        .unwrap();
    assert!(!irrelevant.is_relevant);
    assert!(irrelevant.score.abs() < 1e-6);
    assert_eq!(irrelevant.threshold, 0.5);
}

#[tokio::test]
async fn test_semantic_classifier_surfaces_service_errors() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/embed"))
        .respond_with(ResponseTemplate::new(503).set_body_string("model loading"))
        .mount(&server)
        .await;

    let result = build_classifier(&semantic_config(&server), reqwest::Client::new()).await;

    match result {
        Err(RelevanceError::Status { status, body }) => {
            assert_eq!(status, 503);
            assert_eq!(body, "model loading");
        }
        Err(other) => panic!("unexpected error: {other:?}"),
        Ok(_) => panic!("classifier built against a failing service"),
    }
}

#[tokio::test]
async fn test_ip_checker_falls_through_failing_services() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/broken"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/ip"))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"origin": "1.2.3.4"}"#))
        .mount(&server)
        .await;

    let checker = PublicIpChecker::new(vec![
        format!("{}/broken", server.uri()),
        format!("{}/ip", server.uri()),
    ]);

    assert_eq!(
        checker.current_ip(&reqwest::Client::new()).await,
        Some("1.2.3.4".to_string())
    );
}

#[tokio::test]
async fn test_ip_checker_gives_up_when_all_services_fail() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;

    let checker = PublicIpChecker::new(vec![
        format!("{}/a", server.uri()),
        format!("{}/b", server.uri()),
    ]);

    assert_eq!(checker.current_ip(&reqwest::Client::new()).await, None);
}
