use super::mock::{MockSession, config_json, list_page, url};
use crate::config::ScrapeConfig;
use crate::crawlers::Session;
use crate::crawlers::paginator::{PageStrategy, Paginator};

fn paginator(extra_list: &str) -> Paginator {
    let config = ScrapeConfig::from_json(&config_json(extra_list, "")).unwrap();
    Paginator::new(&config.list_config, &config.detail_config).unwrap()
}

fn listing() -> MockSession {
    MockSession::new()
        .page("/list", list_page(&[("A", "/a"), ("B", "/b")], Some("/list?page=2")))
        .page("/list?page=2", list_page(&[("C", "/c")], Some("/list?page=3")))
        .page("/list?page=3", list_page(&[("D", "/d")], None))
        .at("/list")
}

#[test]
fn test_strategy_from_config() {
    assert_eq!(*paginator("").strategy(), PageStrategy::Single);
    assert_eq!(
        *paginator(r#", "nextControlSelector": ".next""#).strategy(),
        PageStrategy::NextControl {
            selector: ".next".to_string()
        }
    );

    let templated = paginator(r#", "pageUrlTemplate": "https://example.com/list?page={page}""#);
    assert_eq!(
        templated.page_url(4).as_deref(),
        Some("https://example.com/list?page=4")
    );
    assert_eq!(paginator("").page_url(4), None);
}

#[tokio::test]
async fn test_current_items_rescans_document() {
    let paginator = paginator("");
    let mut session = listing();

    let first = paginator.current_items(&mut session).await.unwrap();
    let second = paginator.current_items(&mut session).await.unwrap();
    assert_eq!(first.len(), 2);
    assert_eq!(first, second);
    assert_eq!(first[1].detail_url_raw.as_deref(), Some("/b"));
}

#[tokio::test]
async fn test_missing_container_yields_no_items() {
    let paginator = paginator("");
    let mut session = MockSession::new().page("/list", "<html><body></body></html>").at("/list");
    assert!(paginator.current_items(&mut session).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_single_page_never_advances() {
    let mut paginator = paginator("");
    let mut session = listing();
    assert!(!paginator.advance(&mut session).await.unwrap());
    assert_eq!(paginator.current_page(), 1);
}

#[tokio::test]
async fn test_next_control_advances_until_gone() {
    let mut paginator = paginator(r#", "nextControlSelector": ".next""#);
    let mut session = listing();

    assert!(paginator.advance(&mut session).await.unwrap());
    assert!(paginator.advance(&mut session).await.unwrap());
    assert!(!paginator.advance(&mut session).await.unwrap());
    assert_eq!(paginator.current_page(), 3);
    assert_eq!(
        session.current_url().await.unwrap().as_str(),
        url("/list?page=3")
    );
}

#[tokio::test]
async fn test_seek_with_next_control() {
    let mut paginator = paginator(r#", "nextControlSelector": ".next""#);
    let mut session = listing();

    assert!(paginator.seek(&mut session, 3).await.unwrap());
    assert_eq!(paginator.current_page(), 3);
    assert!(!paginator.seek(&mut session, 5).await.unwrap());
}

#[tokio::test]
async fn test_template_stops_on_empty_page() {
    let mut paginator =
        paginator(r#", "pageUrlTemplate": "https://example.com/list?page={page}""#);
    let mut session = listing().page("/list?page=4", list_page(&[], None));

    assert!(paginator.seek(&mut session, 3).await.unwrap());
    assert_eq!(paginator.current_page(), 3);
    assert!(!paginator.advance(&mut session).await.unwrap());
    assert_eq!(paginator.current_page(), 3);
}
