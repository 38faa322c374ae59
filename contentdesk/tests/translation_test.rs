use contentdesk::translation::google::GoogleTranslateBackend;
use contentdesk::translation::{Language, TranslationCache, TranslationOrigin};
use mockito::Matcher;
use std::sync::Arc;

const UA: &str = "contentdesk-test";

fn cache_for(server: &mockito::Server) -> TranslationCache {
    let endpoint = format!("{}/translate_a/single", server.url());
    let backend = GoogleTranslateBackend::new(endpoint, 5, UA).unwrap();
    TranslationCache::new(Arc::new(backend))
}

#[tokio::test]
async fn google_backend_translates_and_caches() {
    let mut server = mockito::Server::new_async().await;

    let mock = server
        .mock("POST", "/translate_a/single")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("client".into(), "gtx".into()),
            Matcher::UrlEncoded("sl".into(), "auto".into()),
            Matcher::UrlEncoded("tl".into(), "es".into()),
        ]))
        .match_body(Matcher::UrlEncoded("q".into(), "Good morning.".into()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"[[["Buenos días.","Good morning.",null,null,10]],null,"en"]"#)
        .expect(1)
        .create_async()
        .await;

    let mut cache = cache_for(&server);

    let first = cache.translate("Good morning.", "es").await.unwrap();
    assert_eq!(first.text, "Buenos días.");
    assert_eq!(first.origin, TranslationOrigin::Backend);

    let second = cache.translate("Good morning.", "es").await.unwrap();
    assert_eq!(second.text, "Buenos días.");
    assert_eq!(second.origin, TranslationOrigin::Cache);
    assert!(cache.contains("Good morning.", Language::Es));

    mock.assert_async().await;
}

#[tokio::test]
async fn backend_failure_keeps_original_and_is_retried() {
    let mut server = mockito::Server::new_async().await;

    let mock = server
        .mock("POST", "/translate_a/single")
        .match_query(Matcher::Any)
        .with_status(503)
        .with_body("unavailable")
        .expect(2)
        .create_async()
        .await;

    let mut cache = cache_for(&server);

    let out = cache.translate("Hello world.", "fr").await.unwrap();
    assert_eq!(out.text, "Hello world.");
    assert!(out.is_degraded());
    assert!(cache.is_empty());

    // Not cached, so the backend is asked again
    let again = cache.translate("Hello world.", "fr").await.unwrap();
    assert!(again.is_degraded());

    mock.assert_async().await;
}

#[tokio::test]
async fn english_ascii_never_reaches_backend() {
    let mut server = mockito::Server::new_async().await;

    let mock = server
        .mock("POST", "/translate_a/single")
        .match_query(Matcher::Any)
        .expect(0)
        .create_async()
        .await;

    let mut cache = cache_for(&server);
    let out = cache.translate("Already English.", "en").await.unwrap();
    assert_eq!(out.text, "Already English.");
    assert_eq!(out.origin, TranslationOrigin::Unchanged);

    let err = cache.translate("Hola", "klingon").await.unwrap_err();
    assert_eq!(err.code, "klingon");

    mock.assert_async().await;
}
