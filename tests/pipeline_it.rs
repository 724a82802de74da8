// crates.io
use serde_json::Value;
// self
use crumb_broker::{
	_preludet::*,
	config::{CacheConfig, PipelineConfig, RateLimitConfig},
	decode::JsonDecoder,
	error::ErrorKind,
	pipeline::{PipelineBuilder, RequestPipeline},
	transport::{RawResponse, RequestSpec, TransportOutcome},
};

fn build_pipeline(
	config: PipelineConfig,
	transport: &Arc<ScriptedTransport>,
	fetcher: &Arc<CountingFetcher>,
) -> RequestPipeline<Value> {
	PipelineBuilder::new(config)
		.with_transport(transport.clone())
		.with_credential_fetcher(fetcher.clone())
		.with_decoder(Arc::new(JsonDecoder::<Value>::new()))
		.build()
		.expect("Pipeline should build from valid configuration.")
}

fn price(symbol: &str) -> RequestSpec {
	RequestSpec::get(
		"quoteSummary",
		Url::parse(&format!("https://query2.example.test/v10/finance/quoteSummary/{symbol}"))
			.expect("Fixture URL should parse."),
	)
	.with_query("symbol", symbol)
	.with_query("modules", "price")
}

fn chart(symbol: &str) -> RequestSpec {
	RequestSpec::get(
		"chart",
		Url::parse(&format!("https://query1.example.test/v8/finance/chart/{symbol}"))
			.expect("Fixture URL should parse."),
	)
	.with_query("interval", "1d")
}

#[tokio::test(start_paused = true)]
async fn burst_is_admitted_then_sixth_call_waits_for_refill() {
	let transport = Arc::new(ScriptedTransport::always(json_ok("{}")));
	let fetcher = Arc::new(CountingFetcher::default());
	let pipeline = build_pipeline(PipelineConfig::default(), &transport, &fetcher);
	let started = Instant::now();
	let finished = futures::future::join_all((0..6).map(|idx| {
		let pipeline = pipeline.clone();

		async move {
			pipeline
				.execute(price(&format!("SYM{idx}")))
				.await
				.expect("Every admitted call should succeed.");

			started.elapsed()
		}
	}))
	.await;
	let immediate = finished.iter().filter(|elapsed| elapsed.is_zero()).count();
	let slowest = finished.iter().max().copied().unwrap_or_default();

	assert_eq!(immediate, 5);
	assert_eq!(slowest, Duration::from_secs(1));
	assert_eq!(transport.calls(), 6);
	assert_eq!(fetcher.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn cached_value_expires_after_ttl() {
	let transport = Arc::new(ScriptedTransport::always(json_ok(r#"{"price":1}"#)));
	let fetcher = Arc::new(CountingFetcher::default());
	let cache = CacheConfig::default().with_endpoint_ttl("quoteSummary", Duration::from_secs(60));
	let config = PipelineConfig::default().with_cache(cache);
	let pipeline = build_pipeline(config, &transport, &fetcher);

	pipeline.execute(price("AAPL")).await.expect("First call should succeed.");
	tokio::time::advance(Duration::from_secs(30)).await;
	pipeline.execute(price("AAPL")).await.expect("Cached call should succeed.");

	assert_eq!(transport.calls(), 1);

	tokio::time::advance(Duration::from_secs(31)).await;
	pipeline.execute(price("AAPL")).await.expect("Expired entry should be refetched.");

	assert_eq!(transport.calls(), 2);
	assert_eq!(pipeline.metrics().cache_hits(), 1);
	assert_eq!(pipeline.metrics().cache_misses(), 2);
}

#[tokio::test(start_paused = true)]
async fn crumb_outlives_many_requests_and_refreshes_after_window() {
	let transport = Arc::new(ScriptedTransport::always(json_ok("{}")));
	let fetcher = Arc::new(CountingFetcher::default());
	let config = PipelineConfig::default().with_rate_limit(RateLimitConfig::disabled());
	let pipeline = build_pipeline(config, &transport, &fetcher);

	for idx in 0..10 {
		pipeline.execute_uncached(price(&format!("S{idx}"))).await.expect("Call should succeed.");
	}

	assert_eq!(fetcher.calls(), 1);

	tokio::time::advance(Duration::from_secs(3_601)).await;
	pipeline.execute_uncached(price("LATE")).await.expect("Call should succeed.");

	assert_eq!(fetcher.calls(), 2);
	assert_eq!(transport.crumbs().last().map(String::as_str), Some("crumb-2"));
}

#[tokio::test(start_paused = true)]
async fn concurrent_rejections_refresh_the_crumb_once() {
	let transport = Arc::new(
		ScriptedTransport::always(json_ok("{}")).with_delay(Duration::from_millis(10)),
	);
	let fetcher = Arc::new(CountingFetcher::default().with_delay(Duration::from_millis(50)));
	let config = PipelineConfig::default().with_rate_limit(RateLimitConfig::disabled());
	let pipeline = build_pipeline(config, &transport, &fetcher);

	for _ in 0..3 {
		transport.push(Ok(TransportOutcome::CredentialRejected {
			status: Some(401),
			message: "Invalid Crumb".into(),
		}));
	}

	let results = futures::future::join_all(
		["AAPL", "MSFT", "GOOG"].map(|symbol| pipeline.execute(price(symbol))),
	)
	.await;

	assert!(results.iter().all(|result| result.is_ok()));
	assert_eq!(fetcher.calls(), 2);
	assert_eq!(pipeline.metrics().credential_retries(), 3);
	assert_eq!(transport.crumbs()[3..], ["crumb-2", "crumb-2", "crumb-2"]);
}

#[tokio::test(start_paused = true)]
async fn authentication_failure_surfaces_to_every_caller() {
	let transport = Arc::new(ScriptedTransport::always(json_ok("{}")));
	let fetcher = Arc::new(CountingFetcher::default().with_delay(Duration::from_millis(20)));

	fetcher.fail_next(Error::authentication("crumb endpoint unreachable"));

	let pipeline = build_pipeline(PipelineConfig::default(), &transport, &fetcher);
	let (a, b) = tokio::join!(pipeline.execute(price("AAPL")), pipeline.execute(price("MSFT")));

	for result in [a, b] {
		assert_eq!(
			result.expect_err("Authentication failure should surface.").kind(),
			ErrorKind::Authentication
		);
	}

	assert_eq!(fetcher.calls(), 1);
	assert_eq!(transport.calls(), 0);
	assert!(pipeline.responses().is_empty());
}

#[tokio::test(start_paused = true)]
async fn upstream_errors_are_categorized_and_not_cached() {
	let transport = Arc::new(ScriptedTransport::default());
	let fetcher = Arc::new(CountingFetcher::default());
	let pipeline = build_pipeline(PipelineConfig::default(), &transport, &fetcher);

	transport.push(Ok(TransportOutcome::Response(RawResponse::new(500, "upstream exploded"))));
	transport.push(Ok(TransportOutcome::Response(json_ok(
		r#"{"quoteSummary":{"result":null,"error":{"code":"Not Found","description":"Quote not found for symbol: ZZZZ"}}}"#,
	))));
	transport.push(Ok(TransportOutcome::Response(json_ok("not json"))));

	let external = pipeline.execute(price("ZZZZ")).await.expect_err("500 should fail.");
	let not_found = pipeline.execute(price("ZZZZ")).await.expect_err("Embedded error should fail.");
	let parsing = pipeline.execute(price("ZZZZ")).await.expect_err("Garbage should fail.");

	assert_eq!(external.kind(), ErrorKind::ExternalService);
	assert!(external.to_string().contains("upstream exploded"));
	assert_eq!(not_found.kind(), ErrorKind::NotFound);
	assert_eq!(parsing.kind(), ErrorKind::Parsing);
	assert_eq!(transport.calls(), 3);
	assert_eq!(pipeline.metrics().failures(), 3);
	assert!(pipeline.responses().is_empty());
}

#[tokio::test(start_paused = true)]
async fn symbols_in_the_path_get_their_own_entries() {
	let transport = Arc::new(ScriptedTransport::default());
	let fetcher = Arc::new(CountingFetcher::default());
	let pipeline = build_pipeline(PipelineConfig::default(), &transport, &fetcher);

	transport.push(Ok(TransportOutcome::Response(json_ok(r#"{"symbol":"AAPL"}"#))));
	transport.push(Ok(TransportOutcome::Response(json_ok(r#"{"symbol":"MSFT"}"#))));

	let aapl = pipeline.execute(chart("AAPL")).await.expect("AAPL should succeed.");
	let msft = pipeline.execute(chart("MSFT")).await.expect("MSFT should succeed.");
	let cached = pipeline.execute(chart("AAPL")).await.expect("AAPL should hit the cache.");

	assert_eq!(aapl["symbol"], "AAPL");
	assert_eq!(msft["symbol"], "MSFT");
	assert_eq!(cached, aapl);
	assert_eq!(transport.calls(), 2);
	assert_eq!(pipeline.responses().len(), 2);
}
