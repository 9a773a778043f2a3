//! Relays a handful of incidents through a paced relay against a local mock instance, then
//! prints the status snapshot and the shutdown report.

// std
use std::time::Duration;
// crates.io
use color_eyre::Result;
use httpmock::prelude::*;
// self
use paced_relay::{config::RelayConfig, dispatch::QueuedRequest, relay::Relay};

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;

	let server = MockServer::start_async().await;
	let token_mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/oauth_token.do");
			then.status(200).header("content-type", "application/json").body(
				"{\"access_token\":\"demo-access\",\"token_type\":\"Bearer\",\"expires_in\":1800}",
			);
		})
		.await;
	let api_mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/api/now/table/incident");
			then.status(201).header("content-type", "application/json").body("{\"result\":{}}");
		})
		.await;
	let config = RelayConfig::from_json_str(&format!(
		r#"{{
			"dispatch": {{ "rate_per_second": 4, "queue_capacity": 8 }},
			"credentials": {{
				"token_url": "{}",
				"client_id": "demo-client",
				"client_secret": "demo-secret"
			}},
			"api": {{ "base_url": "{}" }}
		}}"#,
		server.url("/oauth_token.do"),
		server.base_url(),
	))?;
	let relay = Relay::start(config)?;

	for n in 1..=4 {
		let payload = format!("{{\"short_description\":\"Demo incident {n}\"}}");
		let item = QueuedRequest::new(format!("demo-{n}"), "Incident", "incident", payload);

		relay.submit(item).await?;
	}

	tokio::time::sleep(Duration::from_secs(2)).await;

	println!("Status: {:?}.", relay.status());

	let report = relay.shutdown(Duration::from_secs(5)).await;

	println!("Shutdown graceful: {}, lost: {}.", report.graceful, report.lost);

	token_mock.assert_calls_async(1).await;
	api_mock.assert_calls_async(4).await;

	Ok(())
}
