// Integration tests for `NomadClient` using wiremock.

use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{body_json, header, method, path, query_param, query_param_is_missing};
use wiremock::{Mock, MockServer, ResponseTemplate};

use hashilink_api::{Error, NomadClient, QueryOptions, TransportConfig};

// ── Helpers ─────────────────────────────────────────────────────────

async fn setup() -> (MockServer, NomadClient) {
    let server = MockServer::start().await;
    let client = NomadClient::from_reqwest(&server.uri(), reqwest::Client::new()).unwrap();
    (server, client)
}

fn opts(index: u64) -> QueryOptions {
    QueryOptions::new(Some("global".into()), index, Duration::from_secs(10))
}

// ── Blocking reads ──────────────────────────────────────────────────

#[tokio::test]
async fn test_initial_query_omits_index_and_wait() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/v1/nodes"))
        .and(query_param("region", "global"))
        .and(query_param_is_missing("index"))
        .and(query_param_is_missing("wait"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("X-Nomad-Index", "5")
                .set_body_json(json!([{ "ID": "n1" }, { "ID": "n2" }, { "ID": "n3" }])),
        )
        .expect(1)
        .mount(&server)
        .await;

    let result = client.nodes(&opts(0)).await.unwrap();

    assert_eq!(result.index, 5);
    assert_eq!(result.data.unwrap().as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn test_blocking_query_sends_index_and_wait() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/v1/jobs"))
        .and(query_param("index", "5"))
        .and(query_param("wait", "10s"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("X-Nomad-Index", "7")
                .set_body_json(json!([{ "ID": "web" }])),
        )
        .expect(1)
        .mount(&server)
        .await;

    let result = client.jobs(&opts(5)).await.unwrap();

    assert_eq!(result.index, 7);
    assert_eq!(result.data.unwrap()[0]["ID"], "web");
}

#[tokio::test]
async fn test_missing_job_is_reported_as_gone_with_index() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/v1/job/batch-42"))
        .respond_with(
            ResponseTemplate::new(404)
                .insert_header("X-Nomad-Index", "12")
                .set_body_string("job not found"),
        )
        .mount(&server)
        .await;

    let result = client.job("batch-42", &opts(10)).await.unwrap();

    assert_eq!(result.index, 12);
    assert!(result.data.is_none());
}

#[tokio::test]
async fn test_job_ids_with_slashes_are_encoded() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/v1/job/batch%2Fperiodic-1/allocations"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("X-Nomad-Index", "3")
                .set_body_json(json!([])),
        )
        .expect(1)
        .mount(&server)
        .await;

    let result = client
        .job_allocations("batch/periodic-1", &opts(0))
        .await
        .unwrap();
    assert_eq!(result.index, 3);
}

#[tokio::test]
async fn test_leader_election_error_is_transient() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/v1/evaluations"))
        .respond_with(ResponseTemplate::new(500).set_body_string("No cluster leader"))
        .mount(&server)
        .await;

    let err = client.evaluations(&opts(0)).await.unwrap_err();
    assert!(err.is_transient());

    match err {
        Error::Api {
            backend,
            status,
            ref message,
        } => {
            assert_eq!(backend, "nomad");
            assert_eq!(status, 500);
            assert_eq!(message, "No cluster leader");
        }
        other => panic!("expected Api error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_permission_denied_is_not_transient() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/v1/evaluations"))
        .respond_with(ResponseTemplate::new(403).set_body_string("Permission denied"))
        .mount(&server)
        .await;

    let err = client.evaluations(&opts(0)).await.unwrap_err();
    assert_eq!(err.status(), Some(403));
    assert!(!err.is_transient());
}

#[tokio::test]
async fn test_unavailable_is_transient() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/v1/deployments"))
        .respond_with(ResponseTemplate::new(503).set_body_string("No cluster leader"))
        .mount(&server)
        .await;

    let err = client.deployments(&opts(0)).await.unwrap_err();
    assert!(err.is_transient());
}

#[tokio::test]
async fn test_malformed_index_header() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/v1/allocations"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("X-Nomad-Index", "abc")
                .set_body_json(json!([])),
        )
        .mount(&server)
        .await;

    let err = client.allocations(&opts(0)).await.unwrap_err();
    assert!(matches!(err, Error::InvalidIndex { value, .. } if value == "abc"));
}

#[tokio::test]
async fn test_acl_token_header_is_sent() {
    let server = MockServer::start().await;
    let transport = TransportConfig {
        acl_token: Some(secrecy::SecretString::from("nomad-secret".to_string())),
        ..TransportConfig::default()
    };
    let client = NomadClient::new(server.uri().parse().unwrap(), &transport).unwrap();

    Mock::given(method("GET"))
        .and(path("/v1/regions"))
        .and(header("X-Nomad-Token", "nomad-secret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!(["eu-west", "global"])))
        .expect(1)
        .mount(&server)
        .await;

    let regions = client.regions().await.unwrap();
    assert_eq!(regions, vec!["eu-west", "global"]);
}

// ── Writes ──────────────────────────────────────────────────────────

#[tokio::test]
async fn test_stop_job_with_purge() {
    let (server, client) = setup().await;

    Mock::given(method("DELETE"))
        .and(path("/v1/job/web"))
        .and(query_param("purge", "true"))
        .and(query_param("region", "eu-west"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "EvalID": "e1" })))
        .expect(1)
        .mount(&server)
        .await;

    let result = client.stop_job("web", true, Some("eu-west")).await.unwrap();
    assert_eq!(result["EvalID"], "e1");
}

#[tokio::test]
async fn test_scale_task_group_body() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/v1/job/web/scale"))
        .and(body_json(json!({
            "Count": 4,
            "Target": { "Group": "frontend" },
            "Message": "scaled via hashilink"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "EvalID": "e2" })))
        .expect(1)
        .mount(&server)
        .await;

    let result = client.scale_task_group("web", "frontend", 4, None).await.unwrap();
    assert_eq!(result["EvalID"], "e2");
}

#[tokio::test]
async fn test_drain_disable_marks_eligible() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/v1/node/n1/drain"))
        .and(body_json(json!({ "DrainSpec": null, "MarkEligible": true })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    client.drain_node("n1", false, None, None).await.unwrap();
}

#[tokio::test]
async fn test_drain_enable_with_deadline() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/v1/node/n1/drain"))
        .and(body_json(json!({
            "DrainSpec": { "Deadline": 60_000_000_000_i64, "IgnoreSystemJobs": false },
            "MarkEligible": false
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    client
        .drain_node("n1", true, Some(Duration::from_secs(60)), None)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_promote_without_groups_promotes_all() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/v1/deployment/promote/d1"))
        .and(body_json(json!({ "DeploymentID": "d1", "All": true })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    client.promote_deployment("d1", &[], None).await.unwrap();
}

#[tokio::test]
async fn test_force_gc_empty_body() {
    let (server, client) = setup().await;

    Mock::given(method("PUT"))
        .and(path("/v1/system/gc"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let result = client.force_gc(None).await.unwrap();
    assert!(result.is_null());
}

#[tokio::test]
async fn test_evaluate_all_jobs_evaluates_each() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/v1/jobs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "ID": "a" }, { "ID": "b" }])))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/job/a/evaluate"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/job/b/evaluate"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    let evaluated = client.evaluate_all_jobs(None).await.unwrap();
    assert_eq!(evaluated, vec!["a", "b"]);
}
