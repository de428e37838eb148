use chrono::{NaiveDate, TimeZone, Utc};
use listing_aggregator::{
    Action, Aggregator, AnnouncementRecord, ArtifactStore, CrawlTarget, EffectiveDate, MarketType, RunConfig,
};

fn target(exchange: &str, key: &str) -> CrawlTarget {
    CrawlTarget {
        exchange: exchange.to_string(),
        key: key.to_string(),
        title: format!("{} notice {}", exchange, key),
        url: format!("https://{}.example/{}", exchange, key),
        release_hint: None,
        locator: key.to_string(),
    }
}

fn record(target: &CrawlTarget, symbol: &str, action: Action, market_type: MarketType, date: EffectiveDate) -> AnnouncementRecord {
    AnnouncementRecord {
        symbol: symbol.to_string(),
        action,
        market_type,
        date,
        exchange: target.exchange.clone(),
        title: target.title.clone(),
        url: target.url.clone(),
        release_time: None,
        content: format!("{} {}", action, symbol),
        provenance: None,
    }
}

async fn store_records(store: &ArtifactStore, target: &CrawlTarget, records: Vec<AnnouncementRecord>) {
    let claim = store.claim(&target.exchange, &target.key).expect("Key should be free");
    store.write_records(&claim, records).await.expect("Should write artifact");
}

#[tokio::test]
async fn aggregates_stored_artifacts_into_csv_tables() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let root = tempfile::tempdir().unwrap();
    let store = ArtifactStore::new(root.path().join("artifacts"));
    let aug8 = EffectiveDate::Date(NaiveDate::from_ymd_opt(2025, 8, 8).unwrap());

    let first = target("binance", "a1");
    store_records(&store, &first, vec![record(&first, "FOO/USDT", Action::Listing, MarketType::Spot, aug8)]).await;
    let second = target("binance", "a2");
    store_records(&store, &second, vec![record(&second, "BAR/USDT", Action::Delisting, MarketType::Spot, aug8)]).await;
    let third = target("bybit", "b1");
    store_records(
        &store,
        &third,
        vec![record(&third, "BAZ/USDT", Action::Listing, MarketType::Futures, EffectiveDate::Undetermined)],
    )
    .await;
    let empty = target("okx", "o1");
    store_records(&store, &empty, Vec::new()).await;

    let config = RunConfig {
        output_root: root.path().to_path_buf(),
        ..Default::default()
    };
    let now = Utc.with_ymd_and_hms(2025, 8, 9, 2, 0, 0).unwrap();
    let tables = Aggregator::new(&config)
        .run(&store, root.path(), now)
        .await
        .expect("Aggregation should succeed");

    assert_eq!(tables.run_date, NaiveDate::from_ymd_opt(2025, 8, 9).unwrap());
    assert_eq!(tables.long_form.len(), 3);

    let aug8 = NaiveDate::from_ymd_opt(2025, 8, 8).unwrap();
    let cell = tables.spot.cell(aug8, "binance").unwrap();
    assert_eq!(cell.lines().count(), 2, "Same-day records should share one cell");
    assert!(cell.contains("listing FOO/USDT"));
    assert!(cell.contains("delisting BAR/USDT"));
    assert_eq!(tables.spot.cell(aug8, "upbit"), Some(""));
    assert_eq!(
        tables.futures.cell(tables.run_date, "bybit"),
        Some("to-confirm listing BAZ/USDT")
    );

    let long = std::fs::read_to_string(root.path().join("announcements.csv")).unwrap();
    assert!(long.contains("to-confirm"));
    assert!(long.contains("binance_a1.json"), "Long form should point at the artifact file");

    let spot = std::fs::read_to_string(root.path().join("announcements_spot.csv")).unwrap();
    let mut reader = csv::Reader::from_reader(spot.as_bytes());
    let headers = reader.headers().unwrap().clone();
    assert_eq!(&headers[0], "time");
    assert_eq!(headers.len(), config.spot_exchanges.len() + 1);
    let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
    assert_eq!(rows.len(), 1);
    assert_eq!(&rows[0][0], "2025-08-08");

    assert!(root.path().join("announcements_futures.csv").exists());
}

#[tokio::test]
async fn empty_store_still_writes_headers() {
    let root = tempfile::tempdir().unwrap();
    let store = ArtifactStore::new(root.path().join("artifacts"));
    let config = RunConfig::default();

    let tables = Aggregator::new(&config)
        .run(&store, root.path(), Utc::now())
        .await
        .unwrap();

    assert!(tables.long_form.is_empty());
    let spot = std::fs::read_to_string(root.path().join("announcements_spot.csv")).unwrap();
    assert_eq!(spot.lines().count(), 1);
}
