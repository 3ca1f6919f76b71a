mod common;

use common::{deploy_body, read_events, spawn_app, spawn_app_with};
use deployer::deploy::{EventKind, Plan};
use deployer::models::{DeploymentKind, DeploymentStatus};
use std::time::Duration;

fn percentages(events: &[deployer::deploy::ProgressEvent]) -> Vec<u8> {
    events
        .iter()
        .filter(|e| e.kind == EventKind::Progress)
        .filter_map(|e| e.percentage)
        .collect()
}

fn count(events: &[deployer::deploy::ProgressEvent], kind: EventKind) -> usize {
    events.iter().filter(|e| e.kind == kind).count()
}

#[tokio::test]
async fn full_deploy_streams_every_checkpoint() {
    let app = spawn_app().await;

    let response = app
        .post("/api/deploy")
        .json(&deploy_body())
        .send()
        .await
        .expect("Failed to execute request.");

    assert_eq!(response.status().as_u16(), 200);
    let content_type = response.headers()["content-type"].to_str().unwrap().to_string();
    assert!(content_type.starts_with("text/plain"));
    assert_eq!(response.headers()["cache-control"], "no-cache");

    let events = read_events(response).await;
    assert_eq!(
        percentages(&events),
        Plan::for_kind(DeploymentKind::Deployment).checkpoints()
    );

    assert_eq!(count(&events, EventKind::Error), 0);
    let successes: Vec<_> = events
        .iter()
        .filter(|e| e.kind == EventKind::Success)
        .collect();
    assert_eq!(successes.len(), 1);
    assert!(successes[0].message.contains("https://example.com"));

    let last = events.last().unwrap();
    assert_eq!(last.percentage, Some(100));
    assert!(!app.in_progress().await);

    let history = app.history.list().await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].kind, DeploymentKind::Deployment);
    assert_eq!(history[0].status, DeploymentStatus::Success);
    assert!(history[0].duration.is_some());
}

#[tokio::test]
async fn full_deploy_runs_remote_steps_in_order() {
    let app = spawn_app().await;

    let response = app.post("/api/deploy").json(&deploy_body()).send().await.unwrap();
    read_events(response).await;

    let commands = app.remote.commands();
    let position = |needle: &str| {
        commands
            .iter()
            .position(|c| c.contains(needle))
            .unwrap_or_else(|| panic!("no command containing {:?} in {:?}", needle, commands))
    };
    assert!(position("mkdir -p") < position("tar -xzf"));
    assert!(position("tar -xzf") < position("npm ci --production"));
    assert!(position("npm ci --production") < position("pm2 start"));
    assert!(position("pm2 start") < position("apt-get install"));
    assert!(position("apt-get install") < position("nginx -t"));
    assert!(position("nginx -t") < position("certbot --nginx"));

    assert_eq!(app.remote.uploads(), vec!["/var/www/memopyk/deployment.tar.gz"]);
    let writes = app.remote.writes();
    assert!(writes.iter().any(|(path, _)| path == "/var/www/memopyk/.env"));
    let (_, vhost) = writes
        .iter()
        .find(|(path, _)| path.starts_with("/etc/nginx/sites-available/"))
        .expect("vhost written");
    assert!(vhost.contains("server_name example.com www.example.com;"));
    assert!(vhost.contains("proxy_pass http://localhost:3000"));
}

#[tokio::test]
async fn session_is_closed_exactly_once() {
    let app = spawn_app().await;

    let response = app.post("/api/deploy").json(&deploy_body()).send().await.unwrap();
    read_events(response).await;

    assert_eq!(app.remote.connects(), 1);
    assert_eq!(app.remote.disconnects(), 1);
}

#[tokio::test]
async fn dependency_failure_ends_with_one_error() {
    let app = spawn_app().await;
    app.remote
        .fail_on("npm ci", 1, "npm ERR! missing package-lock.json");

    let response = app.post("/api/deploy").json(&deploy_body()).send().await.unwrap();
    assert_eq!(response.status().as_u16(), 200);
    let events = read_events(response).await;

    let errors: Vec<_> = events.iter().filter(|e| e.kind == EventKind::Error).collect();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].message.starts_with("Deployment failed"));
    assert!(errors[0].message.contains("npm ERR! missing package-lock.json"));
    assert_eq!(count(&events, EventKind::Success), 0);
    assert_eq!(events.last().unwrap().kind, EventKind::Error);

    assert!(!app.remote.commands().iter().any(|c| c.contains("pm2 start")));
    assert_eq!(app.remote.disconnects(), 1);
    assert!(!app.in_progress().await);

    let history = app.history.list().await.unwrap();
    assert_eq!(history[0].status, DeploymentStatus::Failed);
}

#[tokio::test]
async fn connection_failure_is_fatal() {
    let app = spawn_app().await;
    app.remote.refuse_connections("connection refused");

    let response = app.post("/api/deploy").json(&deploy_body()).send().await.unwrap();
    let events = read_events(response).await;

    assert_eq!(count(&events, EventKind::Error), 1);
    assert_eq!(count(&events, EventKind::Success), 0);
    assert!(percentages(&events).iter().all(|p| *p <= 65));
    assert_eq!(app.remote.disconnects(), 0);
    assert!(!app.in_progress().await);
}

#[tokio::test]
async fn certificate_failure_only_warns() {
    let app = spawn_app().await;
    app.remote
        .fail_on("certbot --nginx", 1, "DNS problem: NXDOMAIN looking up A for example.com");

    let response = app.post("/api/deploy").json(&deploy_body()).send().await.unwrap();
    let events = read_events(response).await;

    let warnings: Vec<_> = events.iter().filter(|e| e.kind == EventKind::Warning).collect();
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].message.contains("SSL certificate setup warning"));
    assert_eq!(count(&events, EventKind::Error), 0);
    assert_eq!(count(&events, EventKind::Success), 1);
    assert_eq!(events.last().unwrap().percentage, Some(100));

    let history = app.history.list().await.unwrap();
    assert_eq!(history[0].status, DeploymentStatus::Success);
}

#[tokio::test]
async fn nginx_setup_streams_its_own_plan() {
    let app = spawn_app().await;

    let response = app
        .post("/api/deploy/setup-nginx")
        .json(&deploy_body())
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
    let events = read_events(response).await;

    assert_eq!(
        percentages(&events),
        Plan::for_kind(DeploymentKind::NginxConfig).checkpoints()
    );
    assert_eq!(count(&events, EventKind::Error), 0);
    assert!(events
        .iter()
        .any(|e| e.kind == EventKind::Success && e.message == "Nginx and SSL setup completed!"));
    assert!(!app.remote.commands().iter().any(|c| c.contains("npm ci")));

    let history = app.history.list().await.unwrap();
    assert_eq!(history[0].kind, DeploymentKind::NginxConfig);
    assert_eq!(history[0].status, DeploymentStatus::Success);
}

#[tokio::test]
async fn nginx_certificate_failure_only_warns() {
    let app = spawn_app().await;
    app.remote
        .fail_on("certbot --nginx", 1, "DNS problem: NXDOMAIN looking up A for example.com");

    let response = app
        .post("/api/deploy/setup-nginx")
        .json(&deploy_body())
        .send()
        .await
        .unwrap();
    let events = read_events(response).await;

    let warnings: Vec<_> = events.iter().filter(|e| e.kind == EventKind::Warning).collect();
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].message.starts_with("SSL certificate setup warning"));
    assert!(warnings[0].message.contains("NXDOMAIN"));
    assert!(events.iter().any(|e| e.kind == EventKind::Log
        && e.message == "You may need to configure DNS first and retry: sudo certbot --nginx"));
    assert_eq!(count(&events, EventKind::Error), 0);
    assert!(!events
        .iter()
        .any(|e| e.message == "SSL certificate installed successfully!"));
    assert!(events
        .iter()
        .any(|e| e.kind == EventKind::Success && e.message == "Nginx and SSL setup completed!"));
    assert_eq!(events.last().unwrap().percentage, Some(100));

    let history = app.history.list().await.unwrap();
    assert_eq!(history[0].status, DeploymentStatus::Success);
}

#[tokio::test]
async fn dropped_stream_does_not_cancel_the_run() {
    let app = spawn_app_with(true).await;

    let response = app.post("/api/deploy").json(&deploy_body()).send().await.unwrap();
    assert_eq!(response.status().as_u16(), 200);
    assert!(app.in_progress().await);
    drop(response);

    app.build_gate.notify_one();
    let mut waited = 0;
    while app.in_progress().await {
        assert!(waited < 100, "run did not finish after the client went away");
        tokio::time::sleep(Duration::from_millis(50)).await;
        waited += 1;
    }

    let history = app.history.list().await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].status, DeploymentStatus::Success);
    assert!(app.remote.commands().iter().any(|c| c.contains("certbot --nginx")));
    assert_eq!(app.remote.disconnects(), 1);
}

#[tokio::test]
async fn deploy_is_rejected_while_nginx_setup_runs() {
    let app = spawn_app().await;
    let connect_gate = app.remote.hold_connections();

    let nginx = app
        .post("/api/deploy/setup-nginx")
        .json(&deploy_body())
        .send()
        .await
        .unwrap();
    assert_eq!(nginx.status().as_u16(), 200);
    assert!(app.in_progress().await);

    let deploy = app.post("/api/deploy").json(&deploy_body()).send().await.unwrap();
    assert_eq!(deploy.status().as_u16(), 409);
    let body: serde_json::Value = deploy.json().await.unwrap();
    assert_eq!(
        body["message"],
        "Deployment already in progress. Please wait or reset the deployment status."
    );

    connect_gate.notify_one();
    let events = read_events(nginx).await;
    assert_eq!(count(&events, EventKind::Error), 0);
    assert!(!app.in_progress().await);

    let history = app.history.list().await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].kind, DeploymentKind::NginxConfig);
}

#[tokio::test]
async fn busy_guard_wins_over_an_incomplete_body() {
    let app = spawn_app_with(true).await;

    let first = app.post("/api/deploy").json(&deploy_body()).send().await.unwrap();
    assert_eq!(first.status().as_u16(), 200);

    let nginx = app
        .post("/api/deploy/setup-nginx")
        .json(&serde_json::json!({"host": "203.0.113.7", "username": "root"}))
        .send()
        .await
        .unwrap();
    assert_eq!(nginx.status().as_u16(), 409);

    let deploy = app
        .post("/api/deploy")
        .json(&serde_json::json!({"host": "203.0.113.7"}))
        .send()
        .await
        .unwrap();
    assert_eq!(deploy.status().as_u16(), 409);
    assert!(app.in_progress().await);

    app.build_gate.notify_one();
    read_events(first).await;
    assert!(!app.in_progress().await);
}

#[tokio::test]
async fn second_run_is_rejected_while_one_is_active() {
    let app = spawn_app_with(true).await;

    let first = app.post("/api/deploy").json(&deploy_body()).send().await.unwrap();
    assert_eq!(first.status().as_u16(), 200);
    assert!(app.in_progress().await);

    let second = app
        .post("/api/deploy/setup-nginx")
        .json(&deploy_body())
        .send()
        .await
        .unwrap();
    assert_eq!(second.status().as_u16(), 409);
    let body: serde_json::Value = second.json().await.unwrap();
    assert_eq!(body["message"], "Deployment in progress. Please wait.");

    let third = app.post("/api/deploy").json(&deploy_body()).send().await.unwrap();
    assert_eq!(third.status().as_u16(), 409);

    app.build_gate.notify_one();
    let events = read_events(first).await;
    assert_eq!(count(&events, EventKind::Success), 1);
    assert!(!app.in_progress().await);
    assert_eq!(app.history.list().await.unwrap().len(), 1);
}

#[tokio::test]
async fn reset_clears_the_flag_and_is_idempotent() {
    let app = spawn_app_with(true).await;

    let run = app.post("/api/deploy").json(&deploy_body()).send().await.unwrap();
    assert!(app.in_progress().await);

    for _ in 0..2 {
        let response = app.post("/api/deploy/reset").send().await.unwrap();
        assert_eq!(response.status().as_u16(), 200);
        let body: serde_json::Value = response.json().await.unwrap();
        assert_eq!(body["inProgress"], false);
        assert!(!app.in_progress().await);
    }

    app.build_gate.notify_one();
    read_events(run).await;
    assert!(!app.in_progress().await);
}

#[tokio::test]
async fn missing_fields_are_rejected_before_anything_runs() {
    let app = spawn_app().await;

    let response = app
        .post("/api/deploy")
        .json(&serde_json::json!({"host": "203.0.113.7"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 400);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["message"], "Host, username, and domain are required");

    assert!(!app.in_progress().await);
    assert!(app.history.list().await.unwrap().is_empty());
    assert_eq!(app.remote.connects(), 0);

    // the rejected request released the guard
    let response = app.post("/api/deploy").json(&deploy_body()).send().await.unwrap();
    assert_eq!(response.status().as_u16(), 200);
    read_events(response).await;
}

#[tokio::test]
async fn malformed_json_is_invalid_data() {
    let app = spawn_app().await;

    let response = app
        .post("/api/deploy")
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 400);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["message"], "Invalid data");
}

#[tokio::test]
async fn requests_without_admin_token_are_unauthorized() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    let response = client
        .post(app.url("/api/deploy"))
        .json(&deploy_body())
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 401);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["message"], "Unauthorized");

    let response = client
        .get(app.url("/api/deploy/status"))
        .bearer_auth("wrong")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 401);
    assert_eq!(app.remote.connects(), 0);
}

#[tokio::test]
async fn admin_cookie_is_accepted() {
    let app = spawn_app().await;

    let response = reqwest::Client::new()
        .get(app.url("/api/deploy/status"))
        .header("cookie", format!("admin_token={}", common::ADMIN_TOKEN))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
}

#[tokio::test]
async fn connection_test_reports_remote_user() {
    let app = spawn_app().await;

    let response = app
        .post("/api/deploy/test")
        .json(&serde_json::json!({"host": "203.0.113.7", "username": "root"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["success"], true);
    assert_eq!(body["message"], "Connection successful. Connected as: root");
    assert_eq!(app.remote.disconnects(), 1);
}

#[tokio::test]
async fn connection_test_failure_is_500() {
    let app = spawn_app().await;
    app.remote.refuse_connections("no route to host");

    let response = app
        .post("/api/deploy/test")
        .json(&serde_json::json!({"host": "203.0.113.7", "username": "root"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 500);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["message"], "Connection test failed");
    assert!(body["error"]
        .as_str()
        .unwrap()
        .starts_with("SSH connection failed:"));

    let response = app
        .post("/api/deploy/test")
        .json(&serde_json::json!({"host": "203.0.113.7"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 400);
}
