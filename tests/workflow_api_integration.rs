//! End-to-end tests: the workflow API served on a random port, wired to the
//! real X, Gemini and Trello clients pointed at in-process fakes.

mod common;

use std::sync::Arc;
use std::time::Duration;

use secrecy::SecretString;
use serde_json::{Value, json};
use tokio::time::timeout;

use feedback_triage::api::{ApiState, api_routes};
use feedback_triage::board::TrelloConnector;
use feedback_triage::feed::XFeedClient;
use feedback_triage::jobs::JobManager;
use feedback_triage::llm::{LlmConfig, create_provider};
use feedback_triage::pipeline::{LlmClassifier, WorkflowOrchestrator};
use feedback_triage::store::{JobStore, LibSqlBackend};

use common::{Shared, TEST_TIMEOUT, TRELLO_KEY, TRELLO_TOKEN, X_TOKEN, serve, start_fakes};

/// Start fakes plus the real API server. Returns (api base URL, fake state).
async fn start_stack() -> (String, Shared) {
    let (fake_base, state) = start_fakes().await;

    let llm = create_provider(&LlmConfig {
        api_key: SecretString::from("gemini-key"),
        model: "gemini-2.0-flash".into(),
        base_url: Some(fake_base.clone()),
    })
    .unwrap();
    let orchestrator = Arc::new(WorkflowOrchestrator::new(
        Arc::new(XFeedClient::new(SecretString::from(X_TOKEN)).with_base_url(&fake_base)),
        Arc::new(LlmClassifier::new(llm)),
        Arc::new(TrelloConnector::new(&fake_base)),
    ));
    let store: Arc<dyn JobStore> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
    let app = api_routes(ApiState {
        jobs: JobManager::new(store, orchestrator),
    });

    (serve(app).await, state)
}

fn acme_request() -> Value {
    json!({
        "product_name": "Acme",
        "product_description": "Rocket skates for road runners",
        "trello_api_key": TRELLO_KEY,
        "trello_token": TRELLO_TOKEN,
        "prioritization_rule": {"High": {"min_likes": 100, "min_retweets": 50}},
        "time_period": "1d",
        "max_items": 3
    })
}

async fn wait_for_terminal(client: &reqwest::Client, base: &str, job_id: &str) -> Value {
    loop {
        let job: Value = client
            .get(format!("{base}/api/v1/workflows/{job_id}"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        if job["status"] == "COMPLETED" || job["status"] == "FAILED" {
            return job;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

#[tokio::test]
async fn acme_scenario_files_one_high_card() {
    timeout(TEST_TIMEOUT, async {
        let (base, state) = start_stack().await;
        state.lock().unwrap().posts = vec![
            ("101".into(), "Loving my new Acme skates".into(), 5, 1),
            ("102".into(), "Acme app crashes on login every time".into(), 150, 75),
            ("103".into(), "Acme meme of the day".into(), 40, 2),
        ];

        let client = reqwest::Client::new();
        let resp = client
            .post(format!("{base}/api/v1/workflows"))
            .json(&acme_request())
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        let ticket: Value = resp.json().await.unwrap();
        assert_eq!(ticket["status"], "PENDING");
        let job_id = ticket["job_id"].as_str().unwrap().to_string();

        let job = wait_for_terminal(&client, &base, &job_id).await;

        assert_eq!(job["status"], "COMPLETED");
        assert!(job["error"].is_null());
        let result = &job["result"];
        assert_eq!(result["success"], true);
        assert_eq!(result["message"], "Workflow executed successfully");
        assert_eq!(result["metrics"]["processed"], 3);
        assert_eq!(result["metrics"]["cards_added"], 1);
        assert_eq!(result["metrics"]["classification_errors"], 0);
        assert_eq!(result["metrics"]["card_errors"], 0);
        assert!(result["metrics"]["time_taken"].as_f64().unwrap() > 0.0);

        let s = state.lock().unwrap();
        assert_eq!(s.gemini_requests, 3);
        assert_eq!(s.cards.len(), 1);
        assert_eq!(s.cards[0].name, "[High] [Bug Report] App crashes on login");
        assert_eq!(s.boards[0].1, "Product Development");
        assert_eq!(s.lists[0].2, "Social Media");

        let search = &s.x_requests[0];
        assert_eq!(search.get("query").map(String::as_str), Some("Acme"));
        assert_eq!(search.get("max_results").map(String::as_str), Some("10"));
        assert!(search.get("start_time").unwrap().ends_with('Z'));
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn no_posts_completes_with_no_items_found() {
    timeout(TEST_TIMEOUT, async {
        let (base, state) = start_stack().await;
        let client = reqwest::Client::new();

        let ticket: Value = client
            .post(format!("{base}/api/v1/workflows"))
            .json(&acme_request())
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        let job = wait_for_terminal(&client, &base, ticket["job_id"].as_str().unwrap()).await;

        assert_eq!(job["status"], "COMPLETED");
        assert_eq!(job["result"]["success"], true);
        assert_eq!(job["result"]["message"], "No items found");
        assert_eq!(job["result"]["metrics"]["processed"], 0);
        assert_eq!(state.lock().unwrap().trello_requests, 0);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn invalid_request_returns_400_without_creating_a_job() {
    timeout(TEST_TIMEOUT, async {
        let (base, state) = start_stack().await;
        let client = reqwest::Client::new();

        let mut body = acme_request();
        body["time_period"] = json!("2w");
        let resp = client
            .post(format!("{base}/api/v1/workflows"))
            .json(&body)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 400);
        let err: Value = resp.json().await.unwrap();
        assert!(err["error"].as_str().unwrap().contains("2w"));

        let list: Value = client
            .get(format!("{base}/api/v1/workflows"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert!(list["jobs"].as_array().unwrap().is_empty());
        assert!(state.lock().unwrap().x_requests.is_empty());
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn unknown_job_returns_404() {
    timeout(TEST_TIMEOUT, async {
        let (base, _state) = start_stack().await;
        let resp = reqwest::Client::new()
            .get(format!("{base}/api/v1/workflows/{}", uuid::Uuid::new_v4()))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 404);
    })
    .await
    .expect("test timed out");
}
