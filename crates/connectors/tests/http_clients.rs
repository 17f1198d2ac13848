use std::sync::{Arc, Mutex};

use assert_matches::assert_matches;
use autopilot_connectors::{HttpCatalog, HttpContentStore, HttpEntitlements, HttpGenerator};
use autopilot_core::collaborators::{
    CollaboratorError, ContentSource, ContentStore, Entitlements, Generator,
};
use autopilot_core::content::ContentContext;
use autopilot_core::generation::{GeneratedItem, GenerationError, GenerationResponse};
use axum::extract::Path;
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde_json::{json, Value};

/// Serve `app` on an ephemeral port and return its base URL.
async fn serve(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

fn context() -> ContentContext {
    ContentContext {
        rule_id: "sync_faq_answers".into(),
        target_surface: "product_faq".into(),
        fingerprint_hash: "h".into(),
        fields: Default::default(),
    }
}

#[tokio::test]
async fn entitlements_read_allowed_and_cap() {
    let app = Router::new().route(
        "/tenants/{tenant}/entitlements/{rule}",
        get(|Path((tenant, _rule)): Path<(String, String)>| async move {
            Json(json!({ "allowed": tenant == "paid", "dailyCap": 25 }))
        }),
    );
    let url = serve(app).await;
    let client = HttpEntitlements::new(reqwest::Client::new(), url);

    let paid = client.entitlement("paid", "r").await.unwrap();
    assert!(paid.allowed);
    assert_eq!(paid.daily_cap, Some(25));
    assert!(!client.entitlement("free", "r").await.unwrap().allowed);
}

#[tokio::test]
async fn entitlement_ids_stay_in_their_own_segment() {
    let app = Router::new().route(
        "/tenants/{tenant}/entitlements/{rule}",
        get(|Path((tenant, rule)): Path<(String, String)>| async move {
            Json(json!({ "allowed": tenant == "acme/eu" && rule == "faq?v=2" }))
        }),
    );
    let url = serve(app).await;
    let client = HttpEntitlements::new(reqwest::Client::new(), url);

    assert!(client.entitlement("acme/eu", "faq?v=2").await.unwrap().allowed);
}

#[tokio::test]
async fn catalog_maps_not_found_to_none() {
    let app = Router::new().route(
        "/tenants/{tenant}/entities/{entity}",
        get(|Path((_tenant, entity)): Path<(String, String)>| async move {
            if entity == "gone" {
                return Err(StatusCode::NOT_FOUND);
            }
            Ok(Json(json!({
                "entity_id": entity,
                "fields": { "title": "Jacket" }
            })))
        }),
    );
    let url = serve(app).await;
    let client = HttpCatalog::new(reqwest::Client::new(), url);

    let content = client.fetch("t", "sku-1").await.unwrap().unwrap();
    assert_eq!(content.fields["title"], "Jacket");
    assert!(client.fetch("t", "gone").await.unwrap().is_none());
}

#[tokio::test]
async fn catalog_fetches_the_entity_named_by_reserved_characters() {
    let app = Router::new().route(
        "/tenants/{tenant}/entities/{entity}",
        get(|Path((_tenant, entity)): Path<(String, String)>| async move {
            Json(json!({
                "entity_id": entity,
                "fields": { "title": format!("Item {entity}") }
            }))
        }),
    );
    let url = serve(app).await;
    let client = HttpCatalog::new(reqwest::Client::new(), format!("{url}/"));

    for id in ["sku/1", "sku#1", "sku?1", "sku%2F1"] {
        let content = client.fetch("t", id).await.unwrap().unwrap();
        assert_eq!(content.entity_id, id);
        assert_eq!(content.fields["title"], format!("Item {id}"));
    }
}

#[tokio::test]
async fn catalog_refuses_dot_segment_ids() {
    let client = HttpCatalog::new(reqwest::Client::new(), "http://127.0.0.1:9".into());

    assert_matches!(
        client.fetch("t", "..").await,
        Err(CollaboratorError::Rejected { service: "catalog", .. })
    );
}

#[tokio::test]
async fn catalog_server_error_is_unavailable() {
    let app = Router::new().route(
        "/tenants/{tenant}/entities/{entity}",
        get(|| async { StatusCode::INTERNAL_SERVER_ERROR }),
    );
    let url = serve(app).await;
    let client = HttpCatalog::new(reqwest::Client::new(), url);

    assert_matches!(
        client.fetch("t", "sku-1").await,
        Err(CollaboratorError::Unavailable { service: "catalog", .. })
    );
}

#[tokio::test]
async fn generator_parses_items_and_insufficient_data() {
    let app = Router::new().route(
        "/generate",
        post(|Json(body): Json<Value>| async move {
            if body["entity_id"] == "thin" {
                Json(json!({ "outcome": "insufficient_data" }))
            } else {
                Json(json!({
                    "outcome": "items",
                    "items": [{
                        "key": "faq_1",
                        "value": "Yes",
                        "confidence": 0.9,
                        "source_fields_used": ["description"]
                    }]
                }))
            }
        }),
    );
    let url = serve(app).await;
    let client = HttpGenerator::new(reqwest::Client::new(), url);

    assert_matches!(
        client.generate("sku-1", &context()).await,
        Ok(GenerationResponse::Items { items }) if items.len() == 1
    );
    assert_eq!(
        client.generate("thin", &context()).await,
        Ok(GenerationResponse::InsufficientData)
    );
}

#[tokio::test]
async fn generator_maps_throttling_to_rate_limited() {
    let app = Router::new().route("/generate", post(|| async { StatusCode::TOO_MANY_REQUESTS }));
    let url = serve(app).await;
    let client = HttpGenerator::new(reqwest::Client::new(), url);

    assert_matches!(
        client.generate("sku-1", &context()).await,
        Err(GenerationError::RateLimited(_))
    );
}

#[tokio::test]
async fn content_store_writes_and_snapshots() {
    let app = Router::new().route(
        "/tenants/{tenant}/entities/{entity}/content/{surface}",
        get(|| async { Json(json!([{ "key": "faq_1" }])) })
            .put(|Json(body): Json<Value>| async move {
                if body["items"].as_array().is_some_and(|items| items.len() == 1) {
                    StatusCode::NO_CONTENT
                } else {
                    StatusCode::UNPROCESSABLE_ENTITY
                }
            }),
    );
    let url = serve(app).await;
    let client = HttpContentStore::new(reqwest::Client::new(), url);

    let snapshot = client.snapshot("t", "sku-1", "product_faq").await.unwrap();
    assert_eq!(snapshot.unwrap()[0]["key"], "faq_1");

    let item = GeneratedItem {
        key: "faq_1".into(),
        value: Some(json!("Yes")),
        confidence: 0.9,
        source_fields_used: vec!["description".into()],
    };
    client
        .write_generated_content("t", "sku-1", "product_faq", &[item])
        .await
        .unwrap();

    assert_matches!(
        client
            .write_generated_content("t", "sku-1", "product_faq", &[])
            .await,
        Err(CollaboratorError::Rejected { .. })
    );
}

#[tokio::test]
async fn content_store_writes_to_the_entity_named_by_reserved_characters() {
    let written = Arc::new(Mutex::new(Vec::<(String, String)>::new()));
    let app = Router::new().route(
        "/tenants/{tenant}/entities/{entity}/content/{surface}",
        put({
            let written = written.clone();
            move |Path((_tenant, entity, surface)): Path<(String, String, String)>| {
                let written = written.clone();
                async move {
                    written.lock().unwrap().push((entity, surface));
                    StatusCode::NO_CONTENT
                }
            }
        }),
    );
    let url = serve(app).await;
    let client = HttpContentStore::new(reqwest::Client::new(), url);

    for id in ["sku/1", "sku#1", "sku?1"] {
        client
            .write_generated_content("t", id, "product_faq", &[])
            .await
            .unwrap();
    }

    let written = written.lock().unwrap().clone();
    let entities: Vec<&str> = written.iter().map(|(entity, _)| entity.as_str()).collect();
    assert_eq!(entities, ["sku/1", "sku#1", "sku?1"]);
    assert!(written.iter().all(|(_, surface)| surface == "product_faq"));
}
