//! Integration tests for whole-batch behavior: aggregation, fail-fast errors,
//! deadlines and charset handling over real HTTP.
//!
//! Each test starts its own wiremock server for isolation.

use std::time::Duration;

use chrono::{TimeZone, Utc};
use feedpool::feed::{ParseError, PoolConfig};
use feedpool::{parse_urls, Aggregator, BatchError, Cancellation, FetchError, HttpError, Item};
use pretty_assertions::assert_eq;
use wiremock::matchers::{any, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const RSS2: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
  <channel>
    <title>RSS2 Title</title>
    <link>http://example.com</link>
    <item>
      <title>Example item 1</title>
      <link>http://example.com/1</link>
      <description>Here is some text 1.</description>
      <pubDate>Sun, 01 Jan 2023 00:01:00 +0000</pubDate>
    </item>
    <item>
      <title>Example item 2</title>
      <link>http://example.com/2</link>
      <description>Here is some text 2.</description>
      <pubDate>Sun, 01 Jan 2023 00:01:00 +0000</pubDate>
    </item>
  </channel>
</rss>"#;

fn single_item_feed(title: &str) -> String {
    format!(
        r#"<rss version="2.0"><channel><title>{title}</title>
<item><title>{title} item</title><link>http://example.com/{title}</link></item>
</channel></rss>"#
    )
}

async fn serve(path_str: &str, template: ResponseTemplate) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(path_str))
        .respond_with(template)
        .mount(&server)
        .await;
    server
}

// ============================================================================
// Success
// ============================================================================

#[tokio::test]
async fn test_single_feed_items() {
    let server = serve("/rss", ResponseTemplate::new(200).set_body_string(RSS2)).await;
    let url = format!("{}/rss", server.uri());

    let items = parse_urls([url.clone()], &Cancellation::new()).await.unwrap();

    let date = Utc.with_ymd_and_hms(2023, 1, 1, 0, 1, 0).unwrap();
    assert_eq!(
        items,
        vec![
            Item {
                title: "Example item 1".into(),
                source: "RSS2 Title".into(),
                source_url: url.clone(),
                link: "http://example.com/1".into(),
                publish_date: date,
                description: "Here is some text 1.".into(),
            },
            Item {
                title: "Example item 2".into(),
                source: "RSS2 Title".into(),
                source_url: url.clone(),
                link: "http://example.com/2".into(),
                publish_date: date,
                description: "Here is some text 2.".into(),
            },
        ]
    );
}

#[tokio::test]
async fn test_many_feeds_item_count_and_sources() {
    let server = MockServer::start().await;
    for name in ["a", "b", "c", "d"] {
        Mock::given(method("GET"))
            .and(path(format!("/{}", name)))
            .respond_with(ResponseTemplate::new(200).set_body_string(single_item_feed(name)))
            .mount(&server)
            .await;
    }
    Mock::given(method("GET"))
        .and(path("/full"))
        .respond_with(ResponseTemplate::new(200).set_body_string(RSS2))
        .mount(&server)
        .await;

    let urls: Vec<String> = ["a", "b", "c", "d", "full"]
        .iter()
        .map(|name| format!("{}/{}", server.uri(), name))
        .collect();

    let items = parse_urls(urls.clone(), &Cancellation::new()).await.unwrap();

    assert_eq!(items.len(), 4 + 2);
    for item in &items {
        assert!(urls.contains(&item.source_url));
    }
    for name in ["a", "b", "c", "d"] {
        let item = items
            .iter()
            .find(|i| i.source == name)
            .expect("item for every feed");
        assert_eq!(item.source_url, format!("{}/{}", server.uri(), name));
    }

    // Items from one feed stay in document order
    let full: Vec<&str> = items
        .iter()
        .filter(|i| i.source == "RSS2 Title")
        .map(|i| i.title.as_str())
        .collect();
    assert_eq!(full, vec!["Example item 1", "Example item 2"]);
}

#[tokio::test]
async fn test_fixed_worker_count_smaller_than_batch() {
    let server = serve("/rss", ResponseTemplate::new(200).set_body_string(RSS2)).await;
    let urls = vec![format!("{}/rss", server.uri()); 7];

    let aggregator = Aggregator::from_config(
        PoolConfig {
            workers: 2,
            max_workers: 32,
        },
        &Default::default(),
    )
    .unwrap();
    let items = aggregator.run(urls, &Cancellation::new()).await.unwrap();
    assert_eq!(items.len(), 14);
}

#[tokio::test]
async fn test_unparsable_date_falls_back_to_now() {
    let feed = r#"<rss><channel><title>T</title>
<item><title>Bad date</title><pubDate>32 Foo 2023</pubDate></item>
</channel></rss>"#;
    let server = serve("/rss", ResponseTemplate::new(200).set_body_string(feed)).await;

    let before = Utc::now();
    let items = parse_urls([format!("{}/rss", server.uri())], &Cancellation::new())
        .await
        .unwrap();
    let after = Utc::now();

    assert_eq!(items.len(), 1);
    assert!(items[0].publish_date >= before && items[0].publish_date <= after);
}

#[tokio::test]
async fn test_windows_1251_feed_over_http() {
    let mut body = br#"<?xml version="1.0" encoding="windows-1251"?>
<rss version="2.0"><channel><title>"#
        .to_vec();
    // "Новости"
    body.extend_from_slice(&[0xCD, 0xEE, 0xE2, 0xEE, 0xF1, 0xF2, 0xE8]);
    body.extend_from_slice(b"</title><item><title>");
    // "Привет"
    body.extend_from_slice(&[0xCF, 0xF0, 0xE8, 0xE2, 0xE5, 0xF2]);
    body.extend_from_slice(b"</title><description>");
    // "мир"
    body.extend_from_slice(&[0xEC, 0xE8, 0xF0]);
    body.extend_from_slice(b"</description></item></channel></rss>");

    let server = serve(
        "/rss",
        ResponseTemplate::new(200)
            .set_body_bytes(body)
            .insert_header("Content-Type", "application/rss+xml; charset=windows-1251"),
    )
    .await;

    let items = parse_urls([format!("{}/rss", server.uri())], &Cancellation::new())
        .await
        .unwrap();

    assert_eq!(items.len(), 1);
    assert_eq!(items[0].source, "Новости");
    assert_eq!(items[0].title, "Привет");
    assert_eq!(items[0].description, "мир");
}

// ============================================================================
// Failures
// ============================================================================

#[tokio::test]
async fn test_empty_batch_makes_no_requests() {
    let server = MockServer::start().await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let aggregator = Aggregator::from_config(PoolConfig::default(), &Default::default()).unwrap();
    let err = aggregator
        .run(Vec::<String>::new(), &Cancellation::new())
        .await
        .unwrap_err();
    assert!(matches!(err, BatchError::NoUrls));
}

#[tokio::test]
async fn test_404_fails_whole_batch() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string(RSS2))
        .mount(&server)
        .await;

    let urls = vec![
        format!("{}/ok1", server.uri()),
        format!("{}/missing", server.uri()),
        format!("{}/ok2", server.uri()),
    ];
    let err = parse_urls(urls, &Cancellation::new()).await.unwrap_err();

    match err {
        BatchError::Job(FetchError::Http(HttpError {
            status,
            status_text,
        })) => {
            assert_eq!(status, 404);
            assert_eq!(status_text, "404 Not Found");
        }
        e => panic!("Expected Http(404), got {:?}", e),
    }
}

#[tokio::test]
async fn test_deadline_shorter_than_response() {
    let server = serve(
        "/slow",
        ResponseTemplate::new(404).set_delay(Duration::from_secs(60)),
    )
    .await;

    let cancel = Cancellation::with_timeout(Duration::from_millis(300));
    let started = std::time::Instant::now();
    let err = parse_urls([format!("{}/slow", server.uri())], &cancel)
        .await
        .unwrap_err();

    assert!(matches!(err, BatchError::Job(FetchError::DeadlineExceeded)));
    assert!(err.to_string().contains("context deadline exceeded"));
    assert!(started.elapsed() < Duration::from_secs(10));
}

#[tokio::test]
async fn test_explicit_cancel_aborts_in_flight_fetches() {
    let server = serve(
        "/slow",
        ResponseTemplate::new(200)
            .set_body_string(RSS2)
            .set_delay(Duration::from_secs(60)),
    )
    .await;

    let cancel = Cancellation::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });

    let urls = vec![format!("{}/slow", server.uri()); 3];
    let err = parse_urls(urls, &cancel).await.unwrap_err();
    assert!(matches!(err, BatchError::Job(FetchError::Cancelled)));
}

#[tokio::test]
async fn test_first_error_does_not_cancel_callers_token() {
    let server = serve("/missing", ResponseTemplate::new(404)).await;
    let cancel = Cancellation::new();

    let err = parse_urls([format!("{}/missing", server.uri())], &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, BatchError::Job(FetchError::Http(_))));
    assert!(!cancel.is_done());
}

#[tokio::test]
async fn test_rss1_feed_is_unsupported_format() {
    let rss1 = r#"<?xml version="1.0"?>
<rdf:RDF xmlns:rdf="http://www.w3.org/1999/02/22-rdf-syntax-ns#" xmlns="http://purl.org/rss/1.0/">
  <channel><title>Old</title></channel>
</rdf:RDF>"#;
    let server = serve("/rdf", ResponseTemplate::new(200).set_body_string(rss1)).await;

    let err = parse_urls([format!("{}/rdf", server.uri())], &Cancellation::new())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        BatchError::Job(FetchError::Parse(ParseError::UnsupportedFormat(_)))
    ));
}

#[tokio::test]
async fn test_atom_feed_is_unsupported_format() {
    let atom = r#"<?xml version="1.0"?><feed xmlns="http://www.w3.org/2005/Atom"><title>A</title></feed>"#;
    let server = serve("/atom", ResponseTemplate::new(200).set_body_string(atom)).await;

    let err = parse_urls([format!("{}/atom", server.uri())], &Cancellation::new())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("unsupported feed format"));
}

#[tokio::test]
async fn test_unsupported_charset_fails_batch() {
    let feed = r#"<?xml version="1.0" encoding="koi8-r"?><rss><channel><title>x</title></channel></rss>"#;
    let server = serve("/rss", ResponseTemplate::new(200).set_body_string(feed)).await;

    let err = parse_urls([format!("{}/rss", server.uri())], &Cancellation::new())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        BatchError::Job(FetchError::Parse(ParseError::Charset(_)))
    ));
    assert!(err.to_string().contains("unsupported charset: koi8-r"));
}
