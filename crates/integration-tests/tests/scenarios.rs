//! End-to-end scenarios driving the assembled router directly, backed by a mocked
//! upstream. One test per scenario named in the external interfaces' testable
//! properties.

use std::sync::Arc;
use std::time::Duration;

use integration_tests::{MODEL_TOKEN, flush_and_read_usage, post_json, post_raw, restart_app, spawn_app};
use serde_json::{Value, json};
use uuid::Uuid;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn openai_provider(id: Uuid, base_url: &str) -> Value {
    json!({
        "id": id,
        "name": "test-openai",
        "dialect": "openai",
        "base_url": base_url,
        "auth": {"kind": "static-key", "api_key": "sk-test"},
    })
}

fn anthropic_provider(id: Uuid, base_url: &str) -> Value {
    json!({
        "id": id,
        "name": "test-anthropic",
        "dialect": "anthropic",
        "base_url": base_url,
        "auth": {"kind": "static-key", "api_key": "sk-test"},
    })
}

#[tokio::test]
async fn s1_unary_passthrough_same_dialect() {
    let upstream = MockServer::start().await;
    let provider_id = Uuid::new_v4();
    let rule_id = Uuid::new_v4();

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "chatcmpl-1",
            "object": "chat.completion",
            "created": 1,
            "model": "gpt-4o-mini",
            "choices": [{"index": 0, "message": {"role": "assistant", "content": "pong"}, "finish_reason": "stop"}],
            "usage": {"prompt_tokens": 1, "completion_tokens": 1, "total_tokens": 2}
        })))
        .expect(1)
        .mount(&upstream)
        .await;

    let config = json!({
        "auth": {"model_token": MODEL_TOKEN},
        "providers": [openai_provider(provider_id, &upstream.uri())],
        "rules": [{
            "id": rule_id,
            "request_model": "tingly-gpt",
            "scenario": "openai",
            "services": [{"provider_id": provider_id, "model": "gpt-4o-mini"}],
        }],
    });

    let app = spawn_app(config).await.unwrap();

    let (status, body) = post_json(
        &app.router,
        "/openai/v1/chat/completions",
        MODEL_TOKEN,
        json!({"model": "tingly-gpt", "messages": [{"role": "user", "content": "ping"}]}),
    )
    .await
    .unwrap();

    assert_eq!(status, 200);
    assert_eq!(body["model"], "gpt-4o-mini");
    assert_eq!(body["choices"][0]["message"]["content"], "pong");

    let rows = flush_and_read_usage(app.shutdown, app.usage_handle, &app.usage_db).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].model, "gpt-4o-mini");
    assert_eq!(rows[0].input_tokens, 1);
    assert_eq!(rows[0].output_tokens, 1);
    assert_eq!(rows[0].status_code, 200);
    assert!(!rows[0].streamed);
}

#[tokio::test]
async fn s2_cross_dialect_unary() {
    let upstream = MockServer::start().await;
    let provider_id = Uuid::new_v4();
    let rule_id = Uuid::new_v4();

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(wiremock::matchers::body_json(json!({
            "model": "gpt-4o-mini",
            "messages": [{"role": "user", "content": "ping"}],
            "max_tokens": 64,
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "chatcmpl-2",
            "object": "chat.completion",
            "created": 1,
            "model": "gpt-4o-mini",
            "choices": [{"index": 0, "message": {"role": "assistant", "content": "pong"}, "finish_reason": "stop"}],
            "usage": {"prompt_tokens": 1, "completion_tokens": 1, "total_tokens": 2}
        })))
        .expect(1)
        .mount(&upstream)
        .await;

    let config = json!({
        "auth": {"model_token": MODEL_TOKEN},
        "providers": [openai_provider(provider_id, &upstream.uri())],
        "rules": [{
            "id": rule_id,
            "request_model": "tingly-claude",
            "scenario": "anthropic",
            "services": [{"provider_id": provider_id, "model": "gpt-4o-mini"}],
        }],
    });

    let app = spawn_app(config).await.unwrap();

    let (status, body) = post_json(
        &app.router,
        "/anthropic/v1/messages",
        MODEL_TOKEN,
        json!({
            "model": "tingly-claude",
            "max_tokens": 64,
            "messages": [{"role": "user", "content": [{"type": "text", "text": "ping"}]}],
        }),
    )
    .await
    .unwrap();

    assert_eq!(status, 200);
    assert_eq!(body["type"], "message");
    assert_eq!(body["role"], "assistant");
    assert_eq!(body["content"][0]["type"], "text");
    assert_eq!(body["content"][0]["text"], "pong");
    assert_eq!(body["usage"]["input_tokens"], 1);
    assert_eq!(body["usage"]["output_tokens"], 1);
}

#[tokio::test]
async fn s3_streaming_tool_call_has_no_partial_argument_frames() {
    let upstream = MockServer::start().await;
    let provider_id = Uuid::new_v4();
    let rule_id = Uuid::new_v4();

    let sse_body = concat!(
        "data: {\"type\":\"message_start\",\"message\":{\"id\":\"msg_1\",\"type\":\"message\",\"role\":\"assistant\",",
        "\"content\":[],\"model\":\"claude-3-haiku\",\"usage\":{\"input_tokens\":5,\"output_tokens\":0}}}\n\n",
        "data: {\"type\":\"content_block_start\",\"index\":0,\"content_block\":{\"type\":\"text\",\"text\":\"\"}}\n\n",
        "data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"hel\"}}\n\n",
        "data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"lo\"}}\n\n",
        "data: {\"type\":\"content_block_stop\",\"index\":0}\n\n",
        "data: {\"type\":\"content_block_start\",\"index\":1,\"content_block\":{\"type\":\"tool_use\",\"id\":\"toolu_1\",",
        "\"name\":\"calc\",\"input\":{}}}\n\n",
        "data: {\"type\":\"content_block_delta\",\"index\":1,\"delta\":{\"type\":\"input_json_delta\",\"partial_json\":\"{\\\"x\\\":\"}}\n\n",
        "data: {\"type\":\"content_block_delta\",\"index\":1,\"delta\":{\"type\":\"input_json_delta\",\"partial_json\":\"1}\"}}\n\n",
        "data: {\"type\":\"content_block_stop\",\"index\":1}\n\n",
        "data: {\"type\":\"message_delta\",\"delta\":{\"stop_reason\":\"tool_use\",\"stop_sequence\":null},\"usage\":{\"input_tokens\":5,\"output_tokens\":3}}\n\n",
        "data: {\"type\":\"message_stop\"}\n\n",
    );

    Mock::given(method("POST"))
        .and(path("/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(sse_body, "text/event-stream"))
        .expect(1)
        .mount(&upstream)
        .await;

    let config = json!({
        "auth": {"model_token": MODEL_TOKEN},
        "providers": [anthropic_provider(provider_id, &upstream.uri())],
        "rules": [{
            "id": rule_id,
            "request_model": "tingly-claude-tool",
            "scenario": "anthropic",
            "services": [{"provider_id": provider_id, "model": "claude-3-haiku"}],
        }],
    });

    let app = spawn_app(config).await.unwrap();

    let response = post_raw(
        &app.router,
        "/anthropic/v1/messages",
        MODEL_TOKEN,
        json!({
            "model": "tingly-claude-tool",
            "max_tokens": 64,
            "stream": true,
            "messages": [{"role": "user", "content": [{"type": "text", "text": "use the tool"}]}],
        }),
    )
    .await
    .unwrap();

    assert_eq!(response.status().as_u16(), 200);

    use http_body_util::BodyExt;
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = String::from_utf8(bytes.to_vec()).unwrap();

    let events: Vec<Value> = body
        .lines()
        .filter_map(|line| line.strip_prefix("data: "))
        .map(|data| serde_json::from_str(data).unwrap())
        .collect();

    let text: String = events
        .iter()
        .filter(|e| e["type"] == "content_block_delta" && e["delta"]["type"] == "text_delta")
        .map(|e| e["delta"]["text"].as_str().unwrap())
        .collect();
    assert_eq!(text, "hello");

    let tool_starts: Vec<&Value> = events
        .iter()
        .filter(|e| e["type"] == "content_block_start" && e["content_block"]["type"] == "tool_use")
        .collect();
    assert_eq!(tool_starts.len(), 1);
    assert_eq!(tool_starts[0]["content_block"]["name"], "calc");

    let argument_frames: Vec<&Value> = events
        .iter()
        .filter(|e| e["type"] == "content_block_delta" && e["delta"]["type"] == "input_json_delta")
        .collect();
    assert_eq!(argument_frames.len(), 1, "arguments must arrive in a single frame, not fragmented");
    assert_eq!(argument_frames[0]["delta"]["partial_json"], "{\"x\":1}");

    assert!(
        !events.iter().any(|e| e["type"] == "content_block_stop" || e["type"] == "message_stop"),
        "internal housekeeping events must not reach the client"
    );
}

#[tokio::test]
async fn s4_oauth_refresh_coalesces_to_one_token_call() {
    use jiff::{SignedDuration, Timestamp};
    use secrecy::SecretString;
    use vault::{CredentialRecord, OAuthEndpoints, OAuthFlow, Vault};

    let token_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "refreshed-token",
            "refresh_token": "still-the-same-refresh-token",
            "id_token": null,
            "token_type": "Bearer",
            "expires_in": 3600,
        })))
        .expect(1)
        .mount(&token_server)
        .await;

    let provider_id = Uuid::new_v4();
    let store = vault::CredentialStore::in_memory().unwrap();
    let vault = Arc::new(Vault::new(reqwest::Client::new(), store));

    vault
        .store_issued(CredentialRecord {
            provider_id,
            access_token: SecretString::from("expired-token".to_string()),
            refresh_token: Some(SecretString::from("old-refresh-token".to_string())),
            id_token: None,
            expiry: Timestamp::now() - SignedDuration::from_secs(600),
            token_type: "Bearer".to_string(),
            resource_url: None,
            provider_metadata: Value::Null,
        })
        .await
        .unwrap();

    let token_url: &'static str = Box::leak(format!("{}/token", token_server.uri()).into_boxed_str());
    let endpoints = OAuthEndpoints {
        flow: OAuthFlow::AuthCodePkce,
        authorize_url: "",
        device_authorize_url: "",
        token_url,
        scopes: "",
        callback_path: "",
        callback_ports: &[],
    };

    let mut handles = Vec::new();
    for _ in 0..10 {
        let vault = vault.clone();
        let endpoints = endpoints.clone();
        handles.push(tokio::spawn(async move {
            use secrecy::ExposeSecret;
            vault
                .oauth_token_for_test(provider_id, &endpoints, Some("client-id"), None)
                .await
                .map(|t| t.expose_secret().to_string())
        }));
    }

    let mut results = Vec::new();
    for handle in handles {
        results.push(handle.await.unwrap().unwrap());
    }

    assert!(results.iter().all(|token| token == "refreshed-token"));
}

fn round_robin_config(rule_id: Uuid, provider_id: Uuid, upstream_uri: &str) -> Value {
    json!({
        "auth": {"model_token": MODEL_TOKEN},
        "providers": [openai_provider(provider_id, upstream_uri)],
        "rules": [{
            "id": rule_id,
            "request_model": "tingly-pool",
            "scenario": "openai",
            "services": [
                {"provider_id": provider_id, "model": "model-a"},
                {"provider_id": provider_id, "model": "model-b"},
            ],
            "tactic": {"type": "round-robin", "request_threshold": 3},
        }],
    })
}

async fn mount_round_robin_upstream(upstream: &MockServer) {
    for model in ["model-a", "model-b"] {
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(wiremock::matchers::body_string_contains(format!("\"model\":\"{model}\"")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "chatcmpl",
                "object": "chat.completion",
                "created": 1,
                "model": model,
                "choices": [{"index": 0, "message": {"role": "assistant", "content": "pong"}, "finish_reason": "stop"}],
                "usage": {"prompt_tokens": 1, "completion_tokens": 1, "total_tokens": 2}
            })))
            .mount(upstream)
            .await;
    }
}

async fn send_and_get_model(router: &axum::Router) -> String {
    let (status, body) = post_json(
        router,
        "/openai/v1/chat/completions",
        MODEL_TOKEN,
        json!({"model": "tingly-pool", "messages": [{"role": "user", "content": "ping"}]}),
    )
    .await
    .unwrap();
    assert_eq!(status, 200);
    body["model"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn s5_round_robin_rotates_at_threshold() {
    let upstream = MockServer::start().await;
    mount_round_robin_upstream(&upstream).await;

    let provider_id = Uuid::new_v4();
    let rule_id = Uuid::new_v4();
    let config = round_robin_config(rule_id, provider_id, &upstream.uri());

    let app = spawn_app(config).await.unwrap();

    let expected = ["model-a", "model-a", "model-a", "model-b", "model-b", "model-b", "model-a"];
    for (i, want) in expected.iter().enumerate() {
        let got = send_and_get_model(&app.router).await;
        assert_eq!(&got, want, "request {} expected {want}, got {got}", i + 1);
    }
}

#[tokio::test]
async fn s5_rotation_index_persists_across_restart() {
    let upstream = MockServer::start().await;
    mount_round_robin_upstream(&upstream).await;

    let provider_id = Uuid::new_v4();
    let rule_id = Uuid::new_v4();
    let config = round_robin_config(rule_id, provider_id, &upstream.uri());

    let app = spawn_app(config.clone()).await.unwrap();

    assert_eq!(send_and_get_model(&app.router).await, "model-a");
    assert_eq!(send_and_get_model(&app.router).await, "model-a");

    let (restarted_router, shutdown, usage_handle) = restart_app(&app, config).await.unwrap();

    assert_eq!(send_and_get_model(&restarted_router).await, "model-a");

    shutdown.cancel();
    usage_handle.await.unwrap();
}

#[tokio::test]
async fn s6_client_cancel_mid_stream_records_499() {
    let upstream = MockServer::start().await;
    let provider_id = Uuid::new_v4();
    let rule_id = Uuid::new_v4();

    let mut sse_body = String::new();
    for i in 0..50 {
        sse_body.push_str(&format!(
            "data: {{\"id\":\"chatcmpl-3\",\"object\":\"chat.completion.chunk\",\"created\":1,\"model\":\"gpt-4o-mini\",\
             \"system_fingerprint\":null,\"choices\":[{{\"index\":0,\"logprobs\":null,\"delta\":{{\"content\":\"chunk{i} \"}},\
             \"finish_reason\":null}}],\"usage\":null}}\n\n"
        ));
    }
    sse_body.push_str("data: [DONE]\n\n");

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(sse_body, "text/event-stream"))
        .mount(&upstream)
        .await;

    let config = json!({
        "auth": {"model_token": MODEL_TOKEN},
        "providers": [openai_provider(provider_id, &upstream.uri())],
        "rules": [{
            "id": rule_id,
            "request_model": "tingly-gpt",
            "scenario": "openai",
            "services": [{"provider_id": provider_id, "model": "gpt-4o-mini"}],
        }],
    });

    let app = spawn_app(config).await.unwrap();

    let response = post_raw(
        &app.router,
        "/openai/v1/chat/completions",
        MODEL_TOKEN,
        json!({"model": "tingly-gpt", "stream": true, "messages": [{"role": "user", "content": "ping"}]}),
    )
    .await
    .unwrap();
    assert_eq!(response.status().as_u16(), 200);

    {
        use futures::StreamExt;
        let mut stream = response.into_body().into_data_stream();

        let first = tokio::time::timeout(Duration::from_secs(1), stream.next())
            .await
            .expect("stream should yield a frame within the timeout");
        assert!(first.is_some(), "expected at least one frame before the client gives up");

        tokio::time::sleep(Duration::from_millis(500)).await;
        // `stream` drops here without being polled to completion, simulating the
        // client closing its connection mid-stream.
    }

    let rows = flush_and_read_usage(app.shutdown, app.usage_handle, &app.usage_db).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].status_code, 499);
    assert!(rows[0].streamed);
    assert_eq!(rows[0].error_kind.as_deref(), Some("client_disconnected"));
}
