use std::env;
use std::sync::{Mutex, OnceLock};

use bandscore_cli::commands::assess::{self, AssessArgs};
use bandscore_cli::commands::{config, migrate};
use serde_json::{json, Value};
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[test]
fn migrate_returns_success_with_valid_env() {
    with_env(
        &[
            ("BANDSCORE_DIRECTLINE_TOKEN", "dl-secret"),
            ("BANDSCORE_DATABASE_URL", "sqlite::memory:"),
        ],
        || {
            let result = migrate::run();
            assert_eq!(result.exit_code, 0, "expected successful migrate run");

            let payload = parse_payload(&result.output);
            assert_eq!(payload["command"], "migrate");
            assert_eq!(payload["status"], "ok");
        },
    );
}

#[test]
fn migrate_returns_config_failure_without_token() {
    with_env(&[("BANDSCORE_DATABASE_URL", "sqlite::memory:")], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 2, "expected config validation failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "config_validation");
        assert!(payload["message"].as_str().unwrap_or_default().contains("directline.token"));
    });
}

#[test]
fn config_reports_sources_and_redacts_the_secret() {
    with_env(
        &[
            ("COPILOT_TOKEN", "super-secret-value"),
            ("BANDSCORE_ASSESSMENT_STRATEGY", "reply_to"),
        ],
        || {
            let result = config::run();
            assert_eq!(result.exit_code, 0);
            assert!(!result.output.contains("super-secret-value"), "secret leaked into output");

            let payload = parse_payload(&result.output);
            assert_eq!(payload["command"], "config");
            let token = field(&payload, "directline.token");
            assert_eq!(token["value"], "<redacted:18 chars>");
            assert_eq!(token["source"], "env (COPILOT_TOKEN)");

            let strategy = field(&payload, "assessment.strategy");
            assert_eq!(strategy["value"], "reply_to");
            assert_eq!(strategy["source"], "env (BANDSCORE_ASSESSMENT_STRATEGY)");

            assert_eq!(field(&payload, "assessment.session_mode")["source"], "default");
        },
    );
}

#[test]
fn assess_rejects_blank_candidate_text_before_any_network_call() {
    with_env(&[("BANDSCORE_DIRECTLINE_TOKEN", "dl-secret")], || {
        let result = assess::run(AssessArgs {
            category: 1,
            statement: "Describe the chart".to_string(),
            candidate: "  ".to_string(),
            user: None,
        });

        assert_eq!(result.exit_code, 2);
        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "assess");
        assert_eq!(payload["error_class"], "invalid_request");
    });
}

#[test]
fn assess_runs_against_a_direct_line_endpoint() {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("test runtime should build");
    let server = rt.block_on(async {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/tokens/generate"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"conversationId": "conv-9", "token": "generated"})),
            )
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/conversations"))
            .respond_with(
                ResponseTemplate::new(201)
                    .set_body_json(json!({"conversationId": "conv-9", "token": "conv-token"})),
            )
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/conversations/conv-9/activities"))
            .and(body_partial_json(json!({"from": {"id": "cli-user"}})))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"id": "conv-9|0000001"})),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/conversations/conv-9/activities"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "activities": [
                    {"type": "message", "id": "conv-9|0000002",
                     "text": "Details: 1) Task Achievement: - Band score: 6"}
                ],
                "watermark": "2"
            })))
            .mount(&server)
            .await;
        server
    });

    let base_url = server.uri();
    with_env(
        &[
            ("BANDSCORE_DIRECTLINE_TOKEN", "dl-secret"),
            ("BANDSCORE_DIRECTLINE_BASE_URL", base_url.as_str()),
            ("BANDSCORE_ASSESSMENT_INITIAL_DELAY_MS", "10"),
            ("BANDSCORE_ASSESSMENT_MAX_DELAY_MS", "20"),
        ],
        || {
            let result = assess::run(AssessArgs {
                category: 1,
                statement: "Describe the chart".to_string(),
                candidate: "The chart shows a steady rise.".to_string(),
                user: Some("cli-user".to_string()),
            });

            assert_eq!(result.exit_code, 0, "unexpected output: {}", result.output);
            let payload = parse_payload(&result.output);
            assert_eq!(payload["message"], "Details: 1) Task Achievement: - Band score: 6");
            assert_eq!(payload["details"]["success"], true);
            assert_eq!(payload["details"]["resent"], false);
        },
    );

    drop(server);
}

fn field<'a>(payload: &'a Value, key: &str) -> &'a Value {
    payload["details"]["fields"]
        .as_array()
        .and_then(|fields| fields.iter().find(|field| field["key"] == key))
        .unwrap_or_else(|| panic!("field {key} missing from config output"))
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "BANDSCORE_DATABASE_URL",
        "BANDSCORE_DATABASE_MAX_CONNECTIONS",
        "BANDSCORE_DATABASE_TIMEOUT_SECS",
        "BANDSCORE_DIRECTLINE_BASE_URL",
        "BANDSCORE_DIRECTLINE_TOKEN",
        "BANDSCORE_DIRECTLINE_DEFAULT_SESSION_ID",
        "BANDSCORE_DIRECTLINE_REQUEST_TIMEOUT_SECS",
        "BANDSCORE_ASSESSMENT_SESSION_MODE",
        "BANDSCORE_ASSESSMENT_STRATEGY",
        "BANDSCORE_ASSESSMENT_PROMPT_FORMAT",
        "BANDSCORE_ASSESSMENT_SENDER_ID",
        "BANDSCORE_ASSESSMENT_INITIAL_DELAY_MS",
        "BANDSCORE_ASSESSMENT_MAX_DELAY_MS",
        "BANDSCORE_ASSESSMENT_MAX_ATTEMPTS",
        "BANDSCORE_ASSESSMENT_DEADLINE_SECS",
        "BANDSCORE_ASSESSMENT_MAX_CONCURRENT_RUNS",
        "BANDSCORE_CACHE_ENABLED",
        "BANDSCORE_SERVER_BIND_ADDRESS",
        "BANDSCORE_SERVER_PORT",
        "BANDSCORE_SERVER_GRACEFUL_SHUTDOWN_SECS",
        "BANDSCORE_LOGGING_LEVEL",
        "BANDSCORE_LOGGING_FORMAT",
        "BANDSCORE_LOG_LEVEL",
        "BANDSCORE_LOG_FORMAT",
        "COPILOT_TOKEN",
        "COPILOT_CONVERSATION_ID",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
    }
}
