// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use axum::{
	body::Body,
	http::{header, Method, Request, StatusCode},
	response::Response,
	Router,
};
use pikotunnel_common::{IpAllocator, PeerId, RelayEndpoint, DEFAULT_MAX_ATTEMPTS};
use pikotunnel_db::testing::create_test_pool;
use pikotunnel_db::{AccessRuleRepository, PeerRepository};
use pikotunnel_netdriver::testing::FakeHost;
use pikotunnel_netdriver::{DriverConfig, NetworkDriver};
use pikotunnel_reconciler::{job_queue, ConvergenceWorker, JobReceiver, TunnelService};
use pikotunnel_server::{create_router, AppState};
use serde_json::Value;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tower::ServiceExt;

const TOKEN: &str = "test-token";

struct TestApp {
	router: Router,
	host: Arc<FakeHost>,
	worker: Option<(ConvergenceWorker, JobReceiver)>,
}

impl TestApp {
	async fn new() -> Self {
		let pool = create_test_pool().await;
		let host = Arc::new(FakeHost::new());
		let config = DriverConfig {
			interface: "wg0".to_string(),
			chain: "WG_RULES".to_string(),
			relay_cidr: "10.8.0.1/24".parse().unwrap(),
			listen_port: 51820,
			private_key: "relay-private".into(),
		};
		let allocator = IpAllocator::from_relay_cidr(config.relay_cidr, DEFAULT_MAX_ATTEMPTS).unwrap();
		let relay = RelayEndpoint {
			public_key: "relay-public".to_string(),
			public_ip: "203.0.113.10".to_string(),
			listen_port: 51820,
			client_subnet: allocator.subnet(),
		};
		let driver = Arc::new(NetworkDriver::new(host.clone(), config));
		driver.initialize_interface().await.unwrap();

		let (tx, rx) = job_queue(64);
		let peers = PeerRepository::new(pool.clone());
		let rules = AccessRuleRepository::new(pool);
		let worker = ConvergenceWorker::new(peers.clone(), rules.clone(), driver.clone());
		let service = TunnelService::new(peers, rules, driver, tx, allocator, relay);

		Self {
			router: create_router(AppState::new(service), TOKEN.into()),
			host,
			worker: Some((worker, rx)),
		}
	}

	async fn request(&self, method: Method, path: &str) -> Response {
		let request = Request::builder()
			.method(method)
			.uri(path)
			.header(header::AUTHORIZATION, format!("Bearer {TOKEN}"))
			.body(Body::empty())
			.unwrap();
		self.router.clone().oneshot(request).await.unwrap()
	}

	async fn create_peer(&self) -> Value {
		let response = self.request(Method::POST, "/peers").await;
		assert_eq!(response.status(), StatusCode::CREATED);
		json_body(response).await
	}
}

async fn json_body(response: Response) -> Value {
	let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
		.await
		.unwrap();
	serde_json::from_slice(&bytes).unwrap()
}

async fn text_body(response: Response) -> String {
	let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
		.await
		.unwrap();
	String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn health_needs_no_token() {
	let app = TestApp::new().await;
	let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
	let response = app.router.clone().oneshot(request).await.unwrap();
	assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn rejects_missing_or_wrong_token() {
	let app = TestApp::new().await;

	let request = Request::builder().uri("/peers").body(Body::empty()).unwrap();
	let response = app.router.clone().oneshot(request).await.unwrap();
	assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
	assert_eq!(json_body(response).await["error"], "unauthorized");

	for value in ["wrong-token", "Bearer wrong-token", "Bearer test-tokenX"] {
		let request = Request::builder()
			.uri("/peers")
			.header(header::AUTHORIZATION, value)
			.body(Body::empty())
			.unwrap();
		let response = app.router.clone().oneshot(request).await.unwrap();
		assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{value}");
	}
}

#[tokio::test]
async fn accepts_bare_token() {
	let app = TestApp::new().await;
	let request = Request::builder()
		.uri("/peers")
		.header(header::AUTHORIZATION, TOKEN)
		.body(Body::empty())
		.unwrap();
	let response = app.router.clone().oneshot(request).await.unwrap();
	assert_eq!(response.status(), StatusCode::OK);
	assert_eq!(json_body(response).await, serde_json::json!([]));
}

#[tokio::test]
async fn create_peer_returns_private_key_once() {
	let app = TestApp::new().await;
	let created = app.create_peer().await;

	assert_eq!(created["status"], "pending");
	assert_eq!(created["private_key"].as_str().map(str::len), Some(44));
	let ip: Ipv4Addr = created["ip"].as_str().unwrap().parse().unwrap();
	assert_ne!(ip, Ipv4Addr::new(10, 8, 0, 1));

	let id = created["id"].as_str().unwrap();
	let fetched = json_body(app.request(Method::GET, &format!("/peers/{id}")).await).await;
	assert_eq!(fetched["public_key"], created["public_key"]);
	assert!(fetched.get("private_key").is_none());

	let listed = json_body(app.request(Method::GET, "/peers").await).await;
	assert_eq!(listed.as_array().map(Vec::len), Some(1));
	assert!(listed[0].get("private_key").is_none());

	let status = json_body(app.request(Method::GET, &format!("/peers/{id}/status")).await).await;
	assert_eq!(status["status"], "pending");
}

#[tokio::test]
async fn peer_lookups_report_not_found_and_bad_ids() {
	let app = TestApp::new().await;
	let unknown = PeerId::new();

	for suffix in ["", "/status", "/config", "/script"] {
		let response = app.request(Method::GET, &format!("/peers/{unknown}{suffix}")).await;
		assert_eq!(response.status(), StatusCode::NOT_FOUND, "{suffix}");
		assert_eq!(json_body(response).await["error"], "not_found");
	}

	let response = app.request(Method::GET, "/peers/not-a-uuid").await;
	assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn client_config_and_script() {
	let app = TestApp::new().await;
	let created = app.create_peer().await;
	let id = created["id"].as_str().unwrap();

	let config = json_body(app.request(Method::GET, &format!("/peers/{id}/config")).await).await;
	assert_eq!(config["private_key"], created["private_key"]);
	assert_eq!(config["allowed_ips"], "10.8.0.0/24");
	assert_eq!(config["endpoint"], "203.0.113.10:51820");
	assert_eq!(config["relay_public_key"], "relay-public");

	let response = app.request(Method::GET, &format!("/peers/{id}/script")).await;
	assert_eq!(response.status(), StatusCode::OK);
	assert_eq!(
		response.headers().get(header::CONTENT_TYPE).unwrap(),
		"text/x-shellscript"
	);
	let script = text_body(response).await;
	assert!(script.starts_with("#!/bin/bash"));
	assert!(script.contains(created["ip"].as_str().unwrap()));
}

#[tokio::test]
async fn delete_peer_statuses() {
	let app = TestApp::new().await;
	let created = app.create_peer().await;
	let id = created["id"].as_str().unwrap();

	let response = app.request(Method::DELETE, &format!("/peers/{}", PeerId::new())).await;
	assert_eq!(response.status(), StatusCode::NO_CONTENT);

	let response = app.request(Method::DELETE, &format!("/peers/{id}")).await;
	assert_eq!(response.status(), StatusCode::ACCEPTED);
	assert_eq!(json_body(response).await["status"], "deleting");

	let response = app.request(Method::DELETE, &format!("/peers/{id}")).await;
	assert_eq!(response.status(), StatusCode::NO_CONTENT);

	let status = json_body(app.request(Method::GET, &format!("/peers/{id}/status")).await).await;
	assert_eq!(status["status"], "deleting");
}

#[tokio::test]
async fn access_rule_crud() {
	let app = TestApp::new().await;
	let a = app.create_peer().await["id"].as_str().unwrap().to_string();
	let b = app.create_peer().await["id"].as_str().unwrap().to_string();

	let response = app.request(Method::POST, &format!("/access-rule/{a}/{a}")).await;
	assert_eq!(response.status(), StatusCode::BAD_REQUEST);
	assert_eq!(json_body(response).await["error"], "bad_request");

	let response = app
		.request(Method::POST, &format!("/access-rule/{a}/{}", PeerId::new()))
		.await;
	assert_eq!(response.status(), StatusCode::BAD_REQUEST);

	let response = app.request(Method::POST, &format!("/access-rule/{a}/{b}")).await;
	assert_eq!(response.status(), StatusCode::CREATED);
	let created = json_body(response).await;
	assert_eq!(created["status"], "pending");
	let response = app.request(Method::POST, &format!("/access-rule/{b}/{a}")).await;
	assert_eq!(response.status(), StatusCode::OK);
	let again = json_body(response).await;
	assert_eq!(again["id"], created["id"]);

	let fetched = json_body(app.request(Method::GET, &format!("/access-rule/{b}/{a}")).await).await;
	assert_eq!(fetched["id"], created["id"]);

	let listed = json_body(app.request(Method::GET, "/access-rules").await).await;
	assert_eq!(listed.as_array().map(Vec::len), Some(1));

	let response = app.request(Method::DELETE, &format!("/access-rule/{a}/{b}")).await;
	assert_eq!(response.status(), StatusCode::NO_CONTENT);

	let response = app.request(Method::GET, &format!("/access-rule/{a}/{b}")).await;
	assert_eq!(response.status(), StatusCode::NOT_FOUND);
	let response = app.request(Method::DELETE, &format!("/access-rule/{a}/{b}")).await;
	assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

async fn wait_for(app: &TestApp, path: &str, expected: &str) {
	for _ in 0..200 {
		let response = app.request(Method::GET, path).await;
		if response.status() == StatusCode::OK && json_body(response).await["status"] == expected {
			return;
		}
		tokio::time::sleep(Duration::from_millis(5)).await;
	}
	panic!("{path} never reached {expected}");
}

#[tokio::test]
async fn peers_and_rules_converge_with_running_worker() {
	let mut app = TestApp::new().await;
	let (worker, jobs) = app.worker.take().unwrap();
	let (shutdown_tx, shutdown_rx) = watch::channel(false);
	let handle = tokio::spawn(worker.run(jobs, shutdown_rx));

	let a = app.create_peer().await;
	let b = app.create_peer().await;
	let a_id = a["id"].as_str().unwrap();
	let b_id = b["id"].as_str().unwrap();
	wait_for(&app, &format!("/peers/{a_id}/status"), "created").await;
	wait_for(&app, &format!("/peers/{b_id}/status"), "created").await;

	app.request(Method::POST, &format!("/access-rule/{a_id}/{b_id}")).await;
	wait_for(&app, &format!("/access-rule/{a_id}/{b_id}"), "created").await;

	let a_ip: Ipv4Addr = a["ip"].as_str().unwrap().parse().unwrap();
	let b_ip: Ipv4Addr = b["ip"].as_str().unwrap().parse().unwrap();
	assert!(app.host.allows(a_ip, b_ip));
	assert!(app.host.allows(b_ip, a_ip));

	app.request(Method::DELETE, &format!("/peers/{a_id}")).await;
	for _ in 0..200 {
		let response = app.request(Method::GET, &format!("/peers/{a_id}")).await;
		if response.status() == StatusCode::NOT_FOUND {
			break;
		}
		tokio::time::sleep(Duration::from_millis(5)).await;
	}
	let response = app.request(Method::GET, &format!("/access-rule/{a_id}/{b_id}")).await;
	assert_eq!(response.status(), StatusCode::NOT_FOUND);
	assert!(!app.host.allows(a_ip, b_ip));

	shutdown_tx.send(true).unwrap();
	let stats = handle.await.unwrap();
	assert_eq!(stats.abandoned, 0);
}
