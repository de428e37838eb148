use listing_aggregator::llm_adapter::CompletionRequest;
use listing_aggregator::{
    AggregatorError, BinanceAdapter, ContentFormat, FetchConfig, LlmAdapter, LlmConfig, OpenAiCompatibleAdapter,
    SiteAdapter,
};
use mockito::Matcher;

const LIST_PATH: &str = r"^/bapi/apex/v1/public/apex/cms/article/list/query";
const DETAIL_PATH: &str = r"^/bapi/apex/v1/public/cms/article/detail/query";

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

fn catalog_body(articles: &str) -> String {
    format!(r#"{{"code":"000000","message":null,"data":{{"catalogs":[{{"articles":[{}]}}]}}}}"#, articles)
}

#[tokio::test]
async fn binance_lists_both_catalogs_newest_first() {
    init_tracing();
    let mut server = mockito::Server::new_async().await;

    let listings = server
        .mock("GET", Matcher::Regex(LIST_PATH.to_string()))
        .match_query(Matcher::UrlEncoded("catalogId".into(), "48".into()))
        .with_header("content-type", "application/json")
        .with_body(catalog_body(
            r#"{"code":"abc123","title":"Binance Will List FOO (FOO)","releaseDate":1754618400000}"#,
        ))
        .create_async()
        .await;
    let delistings = server
        .mock("GET", Matcher::Regex(LIST_PATH.to_string()))
        .match_query(Matcher::UrlEncoded("catalogId".into(), "161".into()))
        .with_header("content-type", "application/json")
        .with_body(catalog_body(
            r#"{"code":"def456","title":"Binance Will Delist BAR","releaseDate":1754704800000}"#,
        ))
        .create_async()
        .await;

    let adapter = BinanceAdapter::new(FetchConfig::immediate())
        .unwrap()
        .with_base_url(server.url());
    let targets = adapter.list().await.expect("Should list announcements");

    listings.assert_async().await;
    delistings.assert_async().await;
    assert_eq!(targets.len(), 2);
    assert_eq!(targets[0].key, "def456", "Newest announcement should come first");
    assert_eq!(targets[1].key, "abc123");
    assert_eq!(targets[1].exchange, "binance");
    assert_eq!(
        targets[1].url,
        format!("{}/en/support/announcement/detail/abc123", server.url())
    );
    assert_eq!(
        targets[1].release_hint.map(|t| t.timestamp_millis()),
        Some(1_754_618_400_000)
    );
}

#[tokio::test]
async fn binance_survives_one_failing_catalog() {
    init_tracing();
    let mut server = mockito::Server::new_async().await;

    server
        .mock("GET", Matcher::Regex(LIST_PATH.to_string()))
        .match_query(Matcher::UrlEncoded("catalogId".into(), "48".into()))
        .with_body(catalog_body(r#"{"code":"abc123","title":"Binance Will List FOO","releaseDate":1754618400000}"#))
        .create_async()
        .await;
    server
        .mock("GET", Matcher::Regex(LIST_PATH.to_string()))
        .match_query(Matcher::UrlEncoded("catalogId".into(), "161".into()))
        .with_body(r#"{"code":"100002","message":"busy","data":null}"#)
        .create_async()
        .await;

    let adapter = BinanceAdapter::new(FetchConfig::immediate())
        .unwrap()
        .with_base_url(server.url());
    let targets = adapter.list().await.unwrap();
    assert_eq!(targets.len(), 1);
}

#[tokio::test]
async fn binance_detail_reads_body_and_publish_date() {
    init_tracing();
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", Matcher::Regex(DETAIL_PATH.to_string()))
        .match_query(Matcher::UrlEncoded("articleCode".into(), "abc123".into()))
        .with_body(
            r#"{"code":"000000","data":{"body":"<p>Binance will list FOO/USDT</p>","publishDate":1754618400000}}"#,
        )
        .create_async()
        .await;

    let adapter = BinanceAdapter::new(FetchConfig::immediate())
        .unwrap()
        .with_base_url(server.url());
    let target = listing_aggregator::CrawlTarget {
        exchange: "binance".to_string(),
        key: "abc123".to_string(),
        title: "Binance Will List FOO".to_string(),
        url: format!("{}/en/support/announcement/detail/abc123", server.url()),
        release_hint: None,
        locator: "abc123".to_string(),
    };
    let detail = adapter.detail(&target).await.unwrap();

    mock.assert_async().await;
    assert_eq!(detail.format, ContentFormat::Html);
    assert!(detail.content.contains("FOO/USDT"));
    assert!(detail.release_time.is_some());
}

#[tokio::test]
async fn binance_list_error_status_is_reported() {
    init_tracing();
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", Matcher::Regex(LIST_PATH.to_string()))
        .with_status(403)
        .expect(2)
        .create_async()
        .await;

    let adapter = BinanceAdapter::new(FetchConfig::immediate())
        .unwrap()
        .with_base_url(server.url());
    let err = adapter.list().await.unwrap_err();
    assert!(matches!(err, AggregatorError::Status { status: 403, .. }), "got {:?}", err);
}

fn llm_config(server: &mockito::Server) -> LlmConfig {
    LlmConfig {
        api_key: "test-key".to_string(),
        base_url: server.url(),
        timeout_seconds: 5,
        ..Default::default()
    }
}

fn request() -> CompletionRequest {
    CompletionRequest {
        system: "Extract listings".to_string(),
        prompt: "Binance will list FOO/USDT".to_string(),
        temperature: 0.1,
        max_tokens: 1000,
    }
}

#[tokio::test]
async fn openai_adapter_returns_first_choice() {
    init_tracing();
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/chat/completions")
        .match_header("authorization", "Bearer test-key")
        .match_body(Matcher::PartialJsonString(r#"{"model":"deepseek-chat"}"#.to_string()))
        .with_header("content-type", "application/json")
        .with_body(r#"{"choices":[{"message":{"role":"assistant","content":"{\"listings\":[],\"delistings\":[]}"}}]}"#)
        .create_async()
        .await;

    let adapter = OpenAiCompatibleAdapter::new(&llm_config(&server)).unwrap();
    let reply = adapter.complete(&request()).await.unwrap();

    mock.assert_async().await;
    assert_eq!(reply, r#"{"listings":[],"delistings":[]}"#);
}

#[tokio::test]
async fn openai_adapter_maps_http_errors() {
    init_tracing();
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/chat/completions")
        .with_status(500)
        .with_body("overloaded")
        .create_async()
        .await;

    let adapter = OpenAiCompatibleAdapter::new(&llm_config(&server)).unwrap();
    let err = adapter.complete(&request()).await.unwrap_err();
    assert!(matches!(err, AggregatorError::Llm(_)), "got {:?}", err);
}
