// std
use std::time::Duration as StdDuration;
// crates.io
use httpmock::prelude::*;
// self
use paced_relay::{
	_preludet::*,
	auth::TokenCache,
	client::ApiClient,
	config::ApiConfig,
	dispatch::{DispatchCounts, DispatchQueue, QueuedRequest},
	error::{DownstreamError, QueueError},
	http::Method,
	relay::Relay,
};

fn incident(id: &str) -> QueuedRequest {
	QueuedRequest::new(id, "Incident", "incident", format!("{{\"short_description\":\"{id}\"}}"))
}

fn reqwest_client(server: &MockServer, source: Arc<CountingSource>) -> ApiClient {
	let base = Url::parse(&server.base_url()).expect("Mock base URL should parse successfully.");

	ApiClient::new(
		ApiConfig::new(base),
		Arc::new(test_reqwest_transport()),
		Arc::new(TokenCache::new(source)),
	)
}

#[tokio::test]
async fn unauthorized_call_is_retried_once_with_a_fresh_token() {
	let server = MockServer::start_async().await;
	let source = Arc::new(CountingSource::new(3600));
	let client = reqwest_client(&server, source.clone());
	let stale = server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/api/now/table/incident")
				.header("authorization", "Bearer token-1");
			then.status(401).body("{\"error\":\"token expired\"}");
		})
		.await;
	let fresh = server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/api/now/table/incident")
				.header("authorization", "Bearer token-2");
			then.status(201).body("{\"result\":{\"number\":\"INC0010001\"}}");
		})
		.await;
	let response = client
		.call(Method::Post, "incident", Some("{}".into()))
		.await
		.expect("Retry with a fresh token should succeed.");

	assert_eq!(response.status, 201);
	assert!(response.body.contains("INC0010001"));
	assert_eq!(source.fetches(), 2);

	stale.assert_calls_async(1).await;
	fresh.assert_calls_async(1).await;
}

#[tokio::test]
async fn second_unauthorized_is_terminal() {
	let server = MockServer::start_async().await;
	let source = Arc::new(CountingSource::new(3600));
	let client = reqwest_client(&server, source.clone());
	let mock = server
		.mock_async(|when, then| {
			when.method(PATCH).path("/api/now/table/incident/abc");
			then.status(401).body("{\"error\":\"revoked\"}");
		})
		.await;
	let err = client
		.call(Method::Patch, "incident/abc", Some("{}".into()))
		.await
		.expect_err("A second 401 should not be retried.");

	assert!(matches!(err, DownstreamError::Unauthorized { .. }));
	assert_eq!(source.fetches(), 2);

	mock.assert_calls_async(2).await;
}

#[tokio::test]
async fn server_error_is_not_retried() {
	let server = MockServer::start_async().await;
	let source = Arc::new(CountingSource::new(3600));
	let client = reqwest_client(&server, source.clone());
	let mock = server
		.mock_async(|when, then| {
			when.method(GET).path("/api/now/table/incident").query_param("sysparm_limit", "1");
			then.status(503).body("maintenance");
		})
		.await;
	let err = client
		.query("incident", [("sysparm_limit", "1")])
		.await
		.expect_err("A 503 should fail immediately.");

	assert_eq!(err.status(), Some(503));
	assert_eq!(source.fetches(), 1);

	mock.assert_calls_async(1).await;
}

#[tokio::test(start_paused = true)]
async fn capacity_three_rate_two_drains_four_items_in_pace() {
	let transport = Arc::new(ScriptedTransport::default());
	let relay = Relay::with_parts(
		test_relay_config("https://instance.example.com", 2, 3),
		transport.clone(),
		Arc::new(CountingSource::new(3600)),
	)
	.expect("Relay should start.");
	let started = tokio::time::Instant::now();

	for id in ["inc-1", "inc-2", "inc-3", "inc-4"] {
		relay.submit(incident(id)).await.expect("Submit should succeed within the timeout.");
	}

	tokio::time::sleep(StdDuration::from_secs(3)).await;

	let calls = transport.calls();
	let ids = calls
		.iter()
		.map(|call| call.request.body.clone().unwrap_or_default())
		.collect::<Vec<_>>();

	assert_eq!(calls.len(), 4);
	assert!(ids[0].contains("inc-1") && ids[3].contains("inc-4"));

	for pair in calls.windows(2) {
		assert!(pair[1].started_at - pair[0].started_at >= StdDuration::from_millis(500));
	}

	let drained = calls[3].started_at - started;

	assert!(drained >= StdDuration::from_millis(1_500));
	assert!(drained < StdDuration::from_millis(1_600));
	assert_eq!(relay.status().counts, DispatchCounts { processed: 4, failed: 0 });

	relay.shutdown(StdDuration::from_secs(1)).await;
}

#[tokio::test(start_paused = true)]
async fn rate_change_applies_from_the_next_cycle() {
	let transport = Arc::new(ScriptedTransport::default());
	let relay = Relay::with_parts(
		test_relay_config("https://instance.example.com", 1, 10),
		transport.clone(),
		Arc::new(CountingSource::new(3600)),
	)
	.expect("Relay should start.");

	for id in ["a", "b", "c"] {
		relay.submit(incident(id)).await.expect("Submit should succeed.");
	}

	tokio::time::sleep(StdDuration::from_millis(10)).await;
	relay.set_rate(10).expect("Rate 10 should be accepted.");
	tokio::time::sleep(StdDuration::from_secs(2)).await;

	let calls = transport.calls();

	assert_eq!(calls.len(), 3);
	// The sleep already in progress keeps the old one-second interval.
	assert!(calls[1].started_at - calls[0].started_at >= StdDuration::from_secs(1));
	assert!(calls[2].started_at - calls[1].started_at < StdDuration::from_millis(200));
	assert!(relay.set_rate(101).is_err());
	assert_eq!(relay.status().queue.rate_per_second, 10);

	relay.shutdown(StdDuration::from_secs(1)).await;
}

#[tokio::test(start_paused = true)]
async fn full_queue_times_out_without_dropping_accepted_items() {
	let queue = DispatchQueue::new(2).expect("Queue should build.");

	queue.submit(incident("a"), StdDuration::ZERO).await.expect("First item should fit.");
	queue.submit(incident("b"), StdDuration::ZERO).await.expect("Second item should fit.");

	let err = queue
		.submit(incident("c"), StdDuration::from_millis(250))
		.await
		.expect_err("Third item should time out.");

	assert_eq!(err, QueueError::Full { capacity: 2, waited_ms: 250 });
	assert_eq!(queue.len(), 2);
	assert_eq!(queue.drain_abandoned().len(), 2);
}
