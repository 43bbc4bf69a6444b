//! End-to-end packaging runs against fixture responses

mod common;

use chrono::Duration;
use common::{period, signing_date, url, FakeExchangeFactory, FixtureClient};
use reqwest::header::LINK;
use std::sync::Arc;
use sxg_packager::cache::{CacheKey, MemoryCache, ResourceCache};
use sxg_packager::exchange::ExchangeFactory;
use sxg_packager::html::HtmlTaskSet;
use sxg_packager::packager::FetchRequest;
use sxg_packager::preload::parse_link_header;
use sxg_packager::processor::{comprehensive, PreverifyError, ProcessorConfig};
use sxg_packager::{Packager, PackagerError, Resource, Response, ValidPeriod};

const HELLO: &str = "https://example.org/hello.html";
const STYLE: &str = "https://example.org/style.css";
const CSS: &str = "body { font-family: sans-serif; }";

struct Harness {
    packager: Packager,
    client: Arc<FixtureClient>,
    cache: Arc<MemoryCache>,
}

fn harness(client: FixtureClient, factory: FakeExchangeFactory, same_origin_only: bool) -> Harness {
    harness_with_cache(client, factory, same_origin_only, Arc::new(MemoryCache::new()))
}

fn harness_with_cache(
    client: FixtureClient,
    factory: FakeExchangeFactory,
    same_origin_only: bool,
    cache: Arc<MemoryCache>,
) -> Harness {
    let client = Arc::new(client);
    let mut config = ProcessorConfig::default();
    config.html.task_set = HtmlTaskSet::Aggressive;
    config.same_origin_only = same_origin_only;

    let packager = Packager::builder(factory)
        .fetch_client(client.clone())
        .resource_cache(cache.clone())
        .processor(comprehensive(config))
        .build()
        .unwrap();

    Harness {
        packager,
        client,
        cache,
    }
}

fn cached(cache: &MemoryCache, u: &str) -> Option<Resource> {
    cache.get(&CacheKey::get(url(u))).unwrap()
}

fn link_header(cache: &MemoryCache, u: &str) -> Option<String> {
    let resource = cached(cache, u).expect("resource is cached");
    let exchange = resource.exchange().expect("resource is packaged");
    exchange
        .headers
        .get(LINK)
        .map(|v| v.to_str().unwrap().to_string())
}

fn integrity(cache: &MemoryCache, u: &str) -> String {
    cached(cache, u)
        .and_then(|r| r.integrity().cloned())
        .expect("resource is packaged")
        .to_string()
}

fn stylesheet_page(href: &str) -> String {
    format!(
        r#"<!doctype html><link href="{}" rel="stylesheet"><p>Hello, world!</p>"#,
        href
    )
}

/// Signs a resource outside any run and stores it in `cache`
async fn prepackage(cache: &MemoryCache, factory: &FakeExchangeFactory, target: &str, body: &str) {
    let target = url(target);
    let mut headers = reqwest::header::HeaderMap::new();
    headers.insert("content-type", "text/css".parse().unwrap());
    let response = Response::new(
        target.clone(),
        reqwest::StatusCode::OK,
        headers,
        body.as_bytes().to_vec(),
    );
    let validity_url = url(&format!("{}.validity.1557743400", target));

    let exchange = factory
        .new_exchange(&response, &period(), &validity_url)
        .await
        .unwrap();
    let integrity = factory.verify(&exchange, signing_date()).await.unwrap();

    let mut resource = Resource::new(target.clone());
    resource.set_physical_url(target.clone()).unwrap();
    resource.set_validity_url(validity_url).unwrap();
    resource.set_exchange(exchange, integrity).unwrap();
    cache.store(&CacheKey::get(target), &resource).await.unwrap();
}

#[tokio::test]
async fn test_same_origin_stylesheet() {
    let client = FixtureClient::new()
        .with(HELLO, "text/html", &stylesheet_page(STYLE))
        .with(STYLE, "text/css", CSS);
    let h = harness(client, FakeExchangeFactory::default(), false);

    h.packager.run(url(HELLO), period()).await.unwrap();

    assert_eq!(h.client.fetched(), vec![HELLO, STYLE]);
    assert_eq!(h.cache.len(), 2);
    assert_eq!(
        link_header(&h.cache, HELLO).unwrap(),
        format!(
            r#"<{STYLE}>;rel="allowed-alt-sxg";header-integrity="{}",<{STYLE}>;rel="preload";as="style""#,
            integrity(&h.cache, STYLE)
        )
    );
    assert!(link_header(&h.cache, STYLE).is_none());
}

#[tokio::test]
async fn test_cached_integrity_matches_verification() {
    let client = FixtureClient::new()
        .with(HELLO, "text/html", &stylesheet_page(STYLE))
        .with(STYLE, "text/css", CSS);
    let factory = FakeExchangeFactory::default();
    let h = harness(client, factory, false);

    h.packager.run(url(HELLO), period()).await.unwrap();

    for resource in h.cache.resources().unwrap() {
        let exchange = resource.exchange().unwrap();
        let verified = factory
            .verify(exchange, exchange.valid_period.date())
            .await
            .unwrap();
        assert_eq!(Some(&verified), resource.integrity());
    }
}

#[tokio::test]
async fn test_cross_origin_stylesheet_with_cached_exchange() {
    let other = "https://example.com/style.css";
    let client = FixtureClient::new().with(HELLO, "text/html", &stylesheet_page(other));
    let factory = FakeExchangeFactory::keeping_non_sxg_preloads();
    let cache = Arc::new(MemoryCache::new());
    prepackage(&cache, &factory, other, CSS).await;
    let h = harness_with_cache(client, factory, true, cache);

    h.packager.run(url(HELLO), period()).await.unwrap();

    assert_eq!(h.client.fetched(), vec![HELLO]);
    assert_eq!(
        link_header(&h.cache, HELLO).unwrap(),
        format!(
            r#"<{other}>;rel="allowed-alt-sxg";header-integrity="{}",<{other}>;rel="preload";as="style""#,
            integrity(&h.cache, other)
        )
    );
}

#[tokio::test]
async fn test_cross_origin_stylesheet_without_exchange() {
    let other = "https://example.com/style.css";

    let client = FixtureClient::new().with(HELLO, "text/html", &stylesheet_page(other));
    let h = harness(client, FakeExchangeFactory::keeping_non_sxg_preloads(), true);
    h.packager.run(url(HELLO), period()).await.unwrap();
    assert_eq!(h.client.fetched(), vec![HELLO]);
    assert_eq!(
        link_header(&h.cache, HELLO).unwrap(),
        format!(r#"<{other}>;rel="preload";as="style""#)
    );

    let client = FixtureClient::new().with(HELLO, "text/html", &stylesheet_page(other));
    let h = harness(client, FakeExchangeFactory::default(), true);
    h.packager.run(url(HELLO), period()).await.unwrap();
    assert!(link_header(&h.cache, HELLO).is_none());
}

#[tokio::test]
async fn test_deduplication_across_runs() {
    let quick = "https://example.org/quick.html";
    let client = FixtureClient::new()
        .with(HELLO, "text/html", &stylesheet_page(STYLE))
        .with(quick, "text/html", &stylesheet_page(STYLE))
        .with(STYLE, "text/css", CSS);
    let h = harness(client, FakeExchangeFactory::default(), false);

    h.packager.run(url(HELLO), period()).await.unwrap();
    h.packager.run(url(quick), period()).await.unwrap();

    assert_eq!(h.client.fetched(), vec![HELLO, STYLE, quick]);
    assert_eq!(h.cache.len(), 3);
    assert!(link_header(&h.cache, quick)
        .unwrap()
        .contains(&integrity(&h.cache, STYLE)));
}

#[tokio::test]
async fn test_second_run_reuses_everything() {
    let client = FixtureClient::new()
        .with(HELLO, "text/html", &stylesheet_page(STYLE))
        .with(STYLE, "text/css", CSS);
    let h = harness(client, FakeExchangeFactory::default(), false);

    h.packager.run(url(HELLO), period()).await.unwrap();
    let later = ValidPeriod::with_lifetime(signing_date() + Duration::days(1), Duration::days(7));
    h.packager.run(url(HELLO), later).await.unwrap();

    assert_eq!(h.client.fetch_count(HELLO), 1);
    assert_eq!(h.client.fetch_count(STYLE), 1);
}

#[tokio::test]
async fn test_expired_exchanges_are_refetched() {
    let client = FixtureClient::new()
        .with(HELLO, "text/html", &stylesheet_page(STYLE))
        .with(STYLE, "text/css", CSS);
    let h = harness(client, FakeExchangeFactory::default(), false);

    h.packager.run(url(HELLO), period()).await.unwrap();
    let expired = ValidPeriod::with_lifetime(signing_date() + Duration::days(8), Duration::days(7));
    h.packager.run(url(HELLO), expired).await.unwrap();

    assert_eq!(h.client.fetched(), vec![HELLO, STYLE, HELLO, STYLE]);
    let resource = cached(&h.cache, HELLO).unwrap();
    assert_eq!(
        resource.exchange().unwrap().valid_period.date(),
        expired.date()
    );
}

#[tokio::test]
async fn test_redirect_is_failure() {
    let old = "https://example.org/old.html";
    let client = FixtureClient::new()
        .with_redirect(old, "/hello.html")
        .with(HELLO, "text/html", "<p>Hello</p>");
    let h = harness(client, FakeExchangeFactory::default(), false);

    let errors = h.packager.run(url(old), period()).await.unwrap_err();

    assert_eq!(errors.len(), 1);
    match &errors.errors()[0] {
        PackagerError::Redirect { url: from, location } => {
            assert_eq!(from.as_str(), old);
            assert_eq!(location, "/hello.html");
        }
        other => panic!("expected a redirect error, got {other:?}"),
    }
    assert_eq!(h.client.fetched(), vec![old]);
    assert!(h.cache.is_empty());
}

#[tokio::test]
async fn test_subresource_errors_do_not_fail_the_main_resource() {
    let page = r#"<!doctype html><head>
<link rel="stylesheet" href="valid.css">
<link rel="stylesheet" href="nonexistent1.css">
<link rel="stylesheet" href="nonexistent2.css">
</head><p>Hello</p>"#;
    let valid = "https://example.org/valid.css";
    let client = FixtureClient::new()
        .with(HELLO, "text/html", page)
        .with(valid, "text/css", CSS);
    let h = harness(client, FakeExchangeFactory::default(), false);

    let errors = h.packager.run(url(HELLO), period()).await.unwrap_err();

    let failed: Vec<&str> = errors.urls().map(|u| u.as_str()).collect();
    assert_eq!(
        failed,
        vec![
            "https://example.org/nonexistent1.css",
            "https://example.org/nonexistent2.css"
        ]
    );
    assert!(errors.errors().iter().all(|e| matches!(
        e,
        PackagerError::Preverify {
            source: PreverifyError::Status(_),
            ..
        }
    )));

    assert_eq!(
        link_header(&h.cache, HELLO).unwrap(),
        format!(
            r#"<{valid}>;rel="allowed-alt-sxg";header-integrity="{}",<{valid}>;rel="preload";as="style""#,
            integrity(&h.cache, valid)
        )
    );
    assert!(errors.to_string().lines().all(|l| l.starts_with("error with processing ")));
}

#[tokio::test]
async fn test_blocking_script_above_the_fold() {
    let script = "https://example.org/foo.js";
    let client = FixtureClient::new()
        .with(
            HELLO,
            "text/html",
            r#"<!doctype html><body><script src="foo.js"></script></body>"#,
        )
        .with(script, "application/javascript", "console.log(1);");
    let h = harness(client, FakeExchangeFactory::default(), false);

    h.packager.run(url(HELLO), period()).await.unwrap();

    assert_eq!(h.client.fetched(), vec![HELLO, script]);
    let link = link_header(&h.cache, HELLO).unwrap();
    assert!(link.ends_with(&format!(r#"<{script}>;rel="preload";as="script""#)));
}

#[tokio::test]
async fn test_script_after_text_is_not_preloaded() {
    let client = FixtureClient::new().with(
        HELLO,
        "text/html",
        r#"<!doctype html><body>Hello<script src="foo.js"></script></body>"#,
    );
    let h = harness(client, FakeExchangeFactory::keeping_non_sxg_preloads(), false);

    h.packager.run(url(HELLO), period()).await.unwrap();

    assert_eq!(h.client.fetched(), vec![HELLO]);
    assert!(link_header(&h.cache, HELLO).is_none());
}

#[tokio::test]
async fn test_preload_cycle_terminates() {
    let a = "https://example.org/a.html";
    let b = "https://example.org/b.html";
    let client = FixtureClient::new()
        .with(
            a,
            "text/html",
            r#"<!doctype html><link rel="preload" href="/b.html" as="document"><p>A</p>"#,
        )
        .with(
            b,
            "text/html",
            r#"<!doctype html><link rel="preload" href="/a.html" as="document"><p>B</p>"#,
        );
    let h = harness(client, FakeExchangeFactory::default(), false);

    h.packager.run(url(a), period()).await.unwrap();

    assert_eq!(h.client.fetched(), vec![a, b]);
    assert_eq!(h.cache.len(), 2);
    // a was still in flight when b was signed
    assert!(link_header(&h.cache, b).is_none());
    assert!(link_header(&h.cache, a)
        .unwrap()
        .contains(&integrity(&h.cache, b)));
}

#[tokio::test]
async fn test_duplicate_preloads_fetch_once() {
    let page = format!(
        r#"<!doctype html><head>
<link rel="preload" href="{STYLE}" as="style">
<link rel="stylesheet" href="/style.css">
<link rel="preload" href="/style.css#top" as="style">
</head><p>Hello</p>"#
    );
    let client = FixtureClient::new()
        .with(HELLO, "text/html", &page)
        .with(STYLE, "text/css", CSS);
    let h = harness(client, FakeExchangeFactory::default(), false);

    h.packager.run(url(HELLO), period()).await.unwrap();

    assert_eq!(h.client.fetch_count(STYLE), 1);
}

#[tokio::test]
async fn test_preload_with_multiline_attribute_is_dropped() {
    let page = "<!doctype html><head>\n\
<link rel=\"preload\" href=\"/style.css\" as=\"style\" media=\"screen and\n (min-width: 600px)\">\n\
<link rel=\"preload\" href=\"/a.css\" as=\"style\">\n\
</head><p>Hello</p>";
    let client = FixtureClient::new()
        .with(HELLO, "text/html", page)
        .with(STYLE, "text/css", CSS)
        .with("https://example.org/a.css", "text/css", "a {}");
    let h = harness(client, FakeExchangeFactory::default(), false);

    h.packager.run(url(HELLO), period()).await.unwrap();

    assert!(cached(&h.cache, STYLE).is_some());
    let link = link_header(&h.cache, HELLO).unwrap();
    assert!(!link.contains(STYLE));
    assert_eq!(
        link,
        format!(
            r#"<https://example.org/a.css>;rel="allowed-alt-sxg";header-integrity="{}",<https://example.org/a.css>;rel="preload";as="style""#,
            integrity(&h.cache, "https://example.org/a.css")
        )
    );
}

#[tokio::test]
async fn test_allowed_alt_sxg_entries_match_cache() {
    let page = r#"<!doctype html><head>
<link rel="stylesheet" href="a.css">
<link rel="preload" href="b.css" as="style">
</head><p>Hello</p>"#;
    let client = FixtureClient::new()
        .with(HELLO, "text/html", page)
        .with("https://example.org/a.css", "text/css", "a {}")
        .with("https://example.org/b.css", "text/css", "b {}");
    let h = harness(client, FakeExchangeFactory::default(), false);

    h.packager.run(url(HELLO), period()).await.unwrap();

    let link = link_header(&h.cache, HELLO).unwrap();
    let alternates: Vec<_> = parse_link_header(&link)
        .into_iter()
        .filter(|v| v.has_rel("allowed-alt-sxg"))
        .collect();
    assert_eq!(alternates.len(), 2);
    for alt in alternates {
        let claimed = alt
            .params
            .iter()
            .find(|p| p.name == "header-integrity")
            .and_then(|p| p.value.clone())
            .unwrap();
        assert_eq!(claimed, integrity(&h.cache, &alt.target));
    }
}

#[tokio::test]
async fn test_origin_link_header_is_kept() {
    let client = FixtureClient::new()
        .with_link(
            HELLO,
            r#"<https://example.org/feed.xml>;rel="alternate", <style.css>;rel=preload;as=style"#,
            "<p>Hello</p>",
        )
        .with(STYLE, "text/css", CSS);
    let h = harness(client, FakeExchangeFactory::default(), false);

    h.packager.run(url(HELLO), period()).await.unwrap();

    assert_eq!(h.client.fetched(), vec![HELLO, STYLE]);
    let link = link_header(&h.cache, HELLO).unwrap();
    let values = parse_link_header(&link);
    assert_eq!(values.len(), 3);
    assert!(values[0].has_rel("alternate"));
    assert!(values[1].has_rel("allowed-alt-sxg"));
    assert!(values[2].has_rel("preload"));
    assert_eq!(values[2].target, STYLE);
}

#[tokio::test]
async fn test_signing_is_deterministic() {
    let fixture = || {
        FixtureClient::new()
            .with(HELLO, "text/html", &stylesheet_page(STYLE))
            .with(STYLE, "text/css", CSS)
    };
    let first = harness(fixture(), FakeExchangeFactory::default(), false);
    let second = harness(fixture(), FakeExchangeFactory::default(), false);

    first.packager.run(url(HELLO), period()).await.unwrap();
    second.packager.run(url(HELLO), period()).await.unwrap();

    for u in [HELLO, STYLE] {
        let a = cached(&first.cache, u).unwrap();
        let b = cached(&second.cache, u).unwrap();
        assert_eq!(a.exchange().unwrap().signed, b.exchange().unwrap().signed);
        assert_eq!(a.integrity(), b.integrity());
    }
}

#[tokio::test]
async fn test_cancelled_run_packages_root_only() {
    let client = FixtureClient::new()
        .with(HELLO, "text/html", &stylesheet_page(STYLE))
        .with(STYLE, "text/css", CSS);
    let h = harness(client, FakeExchangeFactory::default(), false);

    h.packager.cancel();
    h.packager.run(url(HELLO), period()).await.unwrap();

    assert_eq!(h.client.fetched(), vec![HELLO]);
    assert!(cached(&h.cache, HELLO).is_some());
    assert!(link_header(&h.cache, HELLO).is_none());
}

#[tokio::test]
async fn test_request_headers_reach_every_fetch() {
    let client = FixtureClient::new()
        .with(HELLO, "text/html", &stylesheet_page(STYLE))
        .with(STYLE, "text/css", CSS);
    let h = harness(client, FakeExchangeFactory::default(), false);

    let mut request = FetchRequest::get(url(HELLO));
    request
        .headers
        .insert("accept", "text/html".parse().unwrap());
    h.packager.run_request(request, period()).await.unwrap();

    let requests = h.client.requests();
    assert_eq!(requests.len(), 2);
    for request in requests {
        assert_eq!(request.headers.get("accept").unwrap(), "text/html");
    }
}

#[tokio::test]
async fn test_invalid_entry_url() {
    let h = harness(FixtureClient::new(), FakeExchangeFactory::default(), false);

    let errors = h
        .packager
        .run(url("ftp://example.org/file"), period())
        .await
        .unwrap_err();

    assert!(matches!(
        errors.errors()[0],
        PackagerError::InvalidUrl { .. }
    ));
    assert!(h.client.fetched().is_empty());
}

#[tokio::test]
async fn test_inspect_does_not_sign() {
    let client = FixtureClient::new()
        .with(HELLO, "text/html", &stylesheet_page(STYLE))
        .with(STYLE, "text/css", CSS);
    let h = harness(client, FakeExchangeFactory::default(), false);

    let inspection = h.packager.inspect(url(HELLO)).await.unwrap();

    assert_eq!(h.client.fetched(), vec![HELLO]);
    assert!(h.cache.is_empty());
    assert_eq!(inspection.response.preloads.len(), 1);
    assert_eq!(inspection.response.preloads[0].url().as_str(), STYLE);
    assert_eq!(
        inspection.resource.physical_url().unwrap().as_str(),
        HELLO
    );
    assert!(!inspection.resource.is_packaged());
}
