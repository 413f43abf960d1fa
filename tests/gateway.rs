use reach::reach_gateway::config::{GatewayConfig, GeminiSettings};
use reach::start_gateway;
use serde_json::{json, Value};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const GENERATE_PATH: &str = "/v1beta/models/gemini-test:generateContent";

fn config_for(gemini: &MockServer) -> GatewayConfig {
    GatewayConfig {
        gemini: Some(GeminiSettings {
            api_key: "test-key".into(),
            model: "gemini-test".into(),
            base_url: gemini.uri(),
        }),
        ..GatewayConfig::default()
    }
}

fn generated(text: &str) -> Value {
    json!({ "candidates": [{ "content": { "parts": [{ "text": text }] } }] })
}

#[tokio::test]
async fn described_audience_becomes_a_campaign() -> anyhow::Result<()> {
    let gemini = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .and(header("x-goog-api-key", "test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(generated(
            "```json\n{\"id\":\"root\",\"combinator\":\"AND\",\"rules\":[\
             {\"id\":\"rule-1\",\"field\":\"spend\",\"operator\":\">=\",\"value\":\"5000\"}]}\n```",
        )))
        .expect(1)
        .mount(&gemini)
        .await;

    let gateway = start_gateway(config_for(&gemini)).await?;
    let base = gateway.base_url();
    let http = reqwest::Client::new();

    let health: Value = http.get(format!("{base}/health")).send().await?.json().await?;
    assert_eq!(health["ai"], true);

    let tree: Value = http
        .post(format!("{base}/api/ai/rules"))
        .header("x-session-id", "e2e")
        .json(&json!({ "description": "customers who spent at least 5000" }))
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;
    assert_eq!(tree["rules"][0]["field"], "spend");

    let translation: Value = http
        .post(format!("{base}/api/rules/translate"))
        .json(&json!({ "rules": tree }))
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;
    assert_eq!(translation["lossy"], false);

    let response = http
        .post(format!("{base}/api/campaigns"))
        .json(&json!({
            "campaignName": "VIP thank you",
            "message": "Hello {name}, thanks for being with us!",
            "segmentRules": translation["query"],
        }))
        .send()
        .await?;
    assert_eq!(response.status(), reqwest::StatusCode::CREATED);
    let created: Value = response.json().await?;
    assert_eq!(created["campaign"]["audienceSize"], 5);
    assert_eq!(created["campaign"]["status"], "PROCESSING");

    let stats: Value = http
        .get(format!("{base}/api/dashboard/stats"))
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(stats["data"]["totalCampaigns"], 2);
    assert_eq!(stats["data"]["totalSegments"], 2);

    gateway.shutdown();
    Ok(())
}

#[tokio::test]
async fn generator_failures_surface_one_message() -> anyhow::Result<()> {
    let gemini = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .respond_with(ResponseTemplate::new(500).set_body_string("upstream exploded"))
        .expect(1)
        .mount(&gemini)
        .await;

    let gateway = start_gateway(config_for(&gemini)).await?;
    let response = reqwest::Client::new()
        .post(format!("{}/api/ai/rules", gateway.base_url()))
        .json(&json!({ "description": "lapsed customers" }))
        .send()
        .await?;

    assert_eq!(response.status(), reqwest::StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = response.json().await?;
    assert_eq!(body["error"], "Failed to convert description to rules");

    gateway.shutdown();
    Ok(())
}
