#![cfg(feature = "integration_mealie")]

//! Drives the real reqwest-based Mealie client against an in-process axum
//! server standing in for Mealie.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use axum::Json;
use axum::Router;
use axum::body::Bytes;
use axum::extract::Path;
use axum::extract::Query;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::http::StatusCode;
use axum::http::header::AUTHORIZATION;
use axum::http::header::CONTENT_TYPE;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::routing::get;
use axum::routing::put;
use chrono::NaiveDate;
use mealied::integrations::mealie::MealWindows;
use mealied::integrations::mealie::MealieApi;
use mealied::integrations::mealie::MealieClient;
use mealied::integrations::mealie::MealieConfig;
use mealied::integrations::mealie::error::ApiError;
use mealied::integrations::mealie::types::MealType;
use mealied::integrations::mealie::types::NewShoppingListItem;
use serde_json::Value;
use serde_json::json;

const TOKEN: &str = "secret";

#[derive(Default)]
struct Server {
    /// `METHOD path?query` of every request, in order
    requests: Vec<String>,
    bodies: Vec<Value>,
    /// Serve HTML instead of JSON for today's meal plan
    broken: bool,
}

type Shared = Arc<Mutex<Server>>;

fn record(server: &Shared, request: String, body: Option<Value>) {
    let mut server = server.lock().unwrap();
    server.requests.push(request);
    server.bodies.extend(body);
}

fn authorized(headers: &HeaderMap) -> Result<(), Response> {
    let expected = format!("Bearer {}", TOKEN);
    match headers.get(AUTHORIZATION) {
        Some(value) if value == expected.as_str() => Ok(()),
        _ => Err((
            StatusCode::UNAUTHORIZED,
            Json(json!({"detail": "Not authenticated"})),
        )
            .into_response()),
    }
}

async fn group_self(headers: HeaderMap) -> Response {
    if let Err(rejection) = authorized(&headers) {
        return rejection;
    }
    Json(json!({"id": "g1", "name": "Home", "slug": "home", "preferences": {}})).into_response()
}

async fn shopping_lists(State(server): State<Shared>) -> Json<Value> {
    record(&server, "GET /api/groups/shopping/lists".to_string(), None);
    Json(json!({
        "page": 1,
        "perPage": -1,
        "total": 1,
        "totalPages": 1,
        "items": [{"id": "l1", "name": "Groceries", "listItems": []}]
    }))
}

async fn shopping_items(
    State(server): State<Shared>,
    Query(query): Query<HashMap<String, String>>,
) -> Json<Value> {
    let filter = query.get("queryFilter").cloned().unwrap_or_default();
    record(&server, format!("GET /api/groups/shopping/items {}", filter), None);
    Json(json!({
        "page": 1,
        "items": [
            {
                "id": "i1",
                "shoppingListId": "l1",
                "display": "2 eggs",
                "note": "eggs",
                "checked": false,
                "position": 0,
                "quantity": 2.0,
                "isFood": false,
                "labelId": null,
                "extras": {"aisle": "3"}
            },
            {
                "id": "i2",
                "shoppingListId": "l1",
                "note": "milk",
                "position": 1
            }
        ]
    }))
}

async fn create_item(State(server): State<Shared>, Json(body): Json<Value>) -> StatusCode {
    record(&server, "POST /api/groups/shopping/items".to_string(), Some(body));
    StatusCode::CREATED
}

async fn update_item(
    State(server): State<Shared>,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> Response {
    record(&server, format!("PUT /api/groups/shopping/items/{}", id), Some(body));
    if id == "gone" {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({"detail": {"message": "No Entry Found"}})),
        )
            .into_response();
    }
    Json(json!({"updatedItems": []})).into_response()
}

async fn delete_item(State(server): State<Shared>, Path(id): Path<String>) -> StatusCode {
    record(&server, format!("DELETE /api/groups/shopping/items/{}", id), None);
    StatusCode::OK
}

async fn meal_plans_today(State(server): State<Shared>) -> Response {
    if server.lock().unwrap().broken {
        return ([(CONTENT_TYPE, "text/html")], "<html>maintenance</html>").into_response();
    }
    Json(json!([
        {
            "id": 7,
            "date": "2024-05-01",
            "entryType": "dinner",
            "recipeId": "r1",
            "recipe": {"id": "r1", "name": "Lasagne", "slug": "lasagne"},
            "title": ""
        },
        {
            "id": 8,
            "date": "2024-05-01",
            "entryType": "snack",
            "title": "Fruit"
        }
    ]))
    .into_response()
}

async fn meal_plans(
    State(server): State<Shared>,
    Query(query): Query<HashMap<String, String>>,
) -> Json<Value> {
    let range = format!(
        "{}..{}",
        query.get("start_date").cloned().unwrap_or_default(),
        query.get("end_date").cloned().unwrap_or_default()
    );
    record(&server, format!("GET /api/groups/mealplans {}", range), None);
    Json(json!({
        "items": [
            {"id": "e1", "date": "2024-05-02", "entryType": "lunch", "title": "Soup"}
        ]
    }))
}

async fn recipe_image(Path(id): Path<String>) -> Response {
    match id.as_str() {
        "r1" => ([(CONTENT_TYPE, "image/jpeg")], Bytes::from_static(b"jpeg")).into_response(),
        "r2" => (
            [(CONTENT_TYPE, "application/octet-stream")],
            Bytes::from_static(b"webp"),
        )
            .into_response(),
        _ => StatusCode::NOT_FOUND.into_response(),
    }
}

/// Start the fake Mealie server on a random port
async fn start_server() -> (SocketAddr, Shared) {
    let server = Shared::default();
    let app = Router::new()
        .route("/api/groups/self", get(group_self))
        .route("/api/groups/shopping/lists", get(shopping_lists))
        .route(
            "/api/groups/shopping/items",
            get(shopping_items).post(create_item),
        )
        .route(
            "/api/groups/shopping/items/:id",
            put(update_item).delete(delete_item),
        )
        .route("/api/groups/mealplans/today", get(meal_plans_today))
        .route("/api/groups/mealplans", get(meal_plans))
        .route(
            "/api/media/recipes/:id/images/min-original.webp",
            get(recipe_image),
        )
        .with_state(server.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, server)
}

fn client(host: String, token: &str) -> MealieClient {
    let config = MealieConfig {
        host,
        token: token.to_string(),
        group_id: None,
        poll_interval: Duration::from_secs(10),
        meal_windows: MealWindows::default(),
    };
    MealieClient::new(&config).unwrap()
}

#[tokio::test]
async fn test_bearer_token_and_auth_failure() {
    let (addr, _) = start_server().await;

    let group = client(format!("http://{}", addr), TOKEN)
        .group_self()
        .await
        .unwrap();
    assert_eq!(group.slug, "home");

    let err = client(format!("http://{}", addr), "wrong")
        .group_self()
        .await
        .unwrap_err();
    assert!(err.is_auth_failure());
    assert_eq!(err.code(), "Not authenticated");
}

#[tokio::test]
async fn test_host_without_scheme() {
    let (addr, _) = start_server().await;

    // build_url defaults to http:// and drops the trailing slash
    let group = client(format!("{}/", addr), TOKEN).group_self().await.unwrap();
    assert_eq!(group.id, "g1");
}

#[tokio::test]
async fn test_shopping_lists_and_items() {
    let (addr, server) = start_server().await;
    let client = client(format!("http://{}", addr), TOKEN);

    let lists = client.shopping_lists().await.unwrap();
    assert_eq!(lists.len(), 1);
    assert_eq!(lists[0].name, "Groceries");

    let items = client.shopping_list_items("l1").await.unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(items[0].summary(), "2 eggs");
    assert_eq!(items[1].summary(), "milk");
    assert_eq!(items[1].quantity, 0.0);

    assert_eq!(
        server.lock().unwrap().requests,
        [
            "GET /api/groups/shopping/lists",
            "GET /api/groups/shopping/items shoppingListId=l1",
        ]
    );
}

#[tokio::test]
async fn test_update_sends_full_item_back() {
    let (addr, server) = start_server().await;
    let client = client(format!("http://{}", addr), TOKEN);

    let mut item = client.shopping_list_items("l1").await.unwrap().remove(0);
    item.checked = true;
    item.position = 5;
    client.update_shopping_list_item(&item).await.unwrap();

    let body = server.lock().unwrap().bodies[0].clone();
    assert_eq!(body["id"], "i1");
    assert_eq!(body["shoppingListId"], "l1");
    assert_eq!(body["checked"], true);
    assert_eq!(body["position"], 5);
    assert_eq!(body["quantity"], 2.0);
    assert_eq!(body["extras"], json!({"aisle": "3"}));
}

#[tokio::test]
async fn test_update_missing_item_reports_detail() {
    let (addr, _) = start_server().await;
    let client = client(format!("http://{}", addr), TOKEN);

    let mut item = client.shopping_list_items("l1").await.unwrap().remove(0);
    item.id = "gone".to_string();
    let err = client.update_shopping_list_item(&item).await.unwrap_err();

    assert!(matches!(err, ApiError::Status { status: 404, .. }));
    assert_eq!(err.code(), "No Entry Found");
    assert!(!err.is_auth_failure());
}

#[tokio::test]
async fn test_create_and_delete() {
    let (addr, server) = start_server().await;
    let client = client(format!("http://{}", addr), TOKEN);

    client
        .add_shopping_list_item(&NewShoppingListItem::new("l1", "butter", 2))
        .await
        .unwrap();
    client.delete_shopping_list_item("i2").await.unwrap();

    let server = server.lock().unwrap();
    assert_eq!(
        server.requests,
        [
            "POST /api/groups/shopping/items",
            "DELETE /api/groups/shopping/items/i2",
        ]
    );
    assert_eq!(
        server.bodies[0],
        json!({
            "shoppingListId": "l1",
            "note": "butter",
            "position": 2,
            "isFood": false,
            "quantity": 1.0
        })
    );
}

#[tokio::test]
async fn test_meal_plans() {
    let (addr, server) = start_server().await;
    let client = client(format!("http://{}", addr), TOKEN);

    let today = client.meal_plans_today().await.unwrap();
    assert_eq!(today.len(), 2);
    assert_eq!(today[0].display_name(), "Lasagne");
    assert_eq!(today[1].entry_type, MealType::Other);

    let start = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
    let end = NaiveDate::from_ymd_opt(2024, 5, 7).unwrap();
    let range = client.meal_plans(start, end).await.unwrap();
    assert_eq!(range.len(), 1);
    assert_eq!(range[0].display_name(), "Soup");
    assert_eq!(
        server.lock().unwrap().requests,
        ["GET /api/groups/mealplans 2024-05-01..2024-05-07"]
    );
}

#[tokio::test]
async fn test_undecodable_body() {
    let (addr, server) = start_server().await;
    server.lock().unwrap().broken = true;

    let err = client(format!("http://{}", addr), TOKEN)
        .meal_plans_today()
        .await
        .unwrap_err();
    assert_eq!(err.code(), "decode_error");
}

#[tokio::test]
async fn test_images() {
    let (addr, _) = start_server().await;
    let client = client(format!("http://{}", addr), TOKEN);

    let url = client.recipe_image_url("r1");
    assert_eq!(
        url,
        format!("http://{}/api/media/recipes/r1/images/min-original.webp", addr)
    );
    let image = client.fetch_image(&url).await.unwrap();
    assert_eq!(image.content_type, "image/jpeg");
    assert_eq!(image.content, b"jpeg");

    // Non-image content types fall back to webp
    let image = client
        .fetch_image(&client.recipe_image_url("r2"))
        .await
        .unwrap();
    assert_eq!(image.content_type, "image/webp");

    let err = client
        .fetch_image(&client.recipe_image_url("r3"))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "404");
}

#[tokio::test]
async fn test_server_down() {
    let (addr, _) = start_server().await;
    // Nothing listens on the port after this listener is dropped
    let unused = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap()
    };
    assert_ne!(unused, addr);

    let err = client(format!("http://{}", unused), TOKEN)
        .shopping_lists()
        .await
        .unwrap_err();
    assert_eq!(err.code(), "no_connection");
}
