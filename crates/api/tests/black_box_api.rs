use gallery_api::app::{router_with, services::build_in_memory_services};
use gallery_core::UserId;
use reqwest::StatusCode;
use serde_json::json;

struct TestServer {
    base_url: String,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        // Same router as prod over the in-memory store, bound to an ephemeral port.
        let app = router_with(build_in_memory_services());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { base_url, handle }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// A browser: fixed session id, optionally logged in.
struct Visitor {
    client: reqwest::Client,
    session: String,
    user: Option<UserId>,
}

impl Visitor {
    fn guest(session: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            session: session.to_string(),
            user: None,
        }
    }

    fn user(session: &str, user: UserId) -> Self {
        Self {
            user: Some(user),
            ..Self::guest(session)
        }
    }

    fn request(&self, method: reqwest::Method, url: String) -> reqwest::RequestBuilder {
        let builder = self
            .client
            .request(method, url)
            .header("x-session-id", &self.session);
        match self.user {
            Some(user) => builder.header("x-user-id", user.to_string()),
            None => builder,
        }
    }

    async fn add(&self, srv: &TestServer, artwork: &str, qty: i64, price: f64) -> serde_json::Value {
        let res = self
            .request(reqwest::Method::POST, srv.url("/cart/items"))
            .json(&json!({
                "artwork_id": artwork,
                "type": "print",
                "frame": "black",
                "size": "M",
                "quantity": qty,
                "price": price,
                "img_thumb": "https://img.example.com/thumb.jpg",
                "title": format!("Artwork {artwork}"),
            }))
            .send()
            .await
            .unwrap();
        assert!(res.status().is_success(), "add failed: {}", res.status());
        res.json().await.unwrap()
    }

    async fn cart(&self, srv: &TestServer) -> serde_json::Value {
        let res = self
            .request(reqwest::Method::GET, srv.url("/cart"))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        res.json().await.unwrap()
    }
}

#[tokio::test]
async fn health_needs_no_identity() {
    let srv = TestServer::spawn().await;
    let res = reqwest::get(srv.url("/health")).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn session_header_required_for_cart_endpoints() {
    let srv = TestServer::spawn().await;

    let res = reqwest::get(srv.url("/cart")).await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "unauthenticated");

    let res = reqwest::Client::new()
        .get(srv.url("/cart"))
        .header("x-session-id", "s1")
        .header("x-user-id", "not-a-uuid")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn guest_cart_lifecycle() {
    let srv = TestServer::spawn().await;
    let guest = Visitor::guest("guest-session");

    let empty = guest.cart(&srv).await;
    assert_eq!(empty["cart_id"], serde_json::Value::Null);
    assert_eq!(empty["total"], 0.0);

    let added = guest.add(&srv, "A1", 2, 10.0).await;
    assert_eq!(added["created"], true);
    guest.add(&srv, "A2", 1, 5.5).await;
    let again = guest.add(&srv, "A1", 1, 12.0).await;
    assert_eq!(again["created"], false);
    assert_eq!(again["item"]["quantity"], 3);
    assert_eq!(again["item"]["price"], 10.0);

    let cart = guest.cart(&srv).await;
    assert_eq!(cart["items"].as_array().unwrap().len(), 2);
    assert_eq!(cart["total"], 35.5);

    let id = added["item"]["id"].as_i64().unwrap();
    let res = guest
        .request(reqwest::Method::PUT, srv.url(&format!("/cart/items/{id}")))
        .json(&json!({ "quantity": 1 }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = guest
        .request(reqwest::Method::GET, srv.url("/cart/summary"))
        .send()
        .await
        .unwrap();
    let summary: serde_json::Value = res.json().await.unwrap();
    assert_eq!(summary["count"], 2);
    assert_eq!(summary["preview_items"][0]["artwork_id"], "A2");

    let res = guest
        .request(reqwest::Method::DELETE, srv.url(&format!("/cart/items/{id}")))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NO_CONTENT);
    assert_eq!(guest.cart(&srv).await["total"], 5.5);
}

#[tokio::test]
async fn invalid_input_is_rejected() {
    let srv = TestServer::spawn().await;
    let guest = Visitor::guest("s1");

    let res = guest
        .request(reqwest::Method::POST, srv.url("/cart/items"))
        .json(&json!({
            "artwork_id": "A1", "type": "print", "frame": "black", "size": "M",
            "quantity": 1, "price": -3.0
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = guest
        .request(reqwest::Method::PUT, srv.url("/cart/items/abc"))
        .json(&json!({ "quantity": 1 }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let added = guest.add(&srv, "A1", 1, 1.0).await;
    let id = added["item"]["id"].as_i64().unwrap();
    let res = guest
        .request(reqwest::Method::PUT, srv.url(&format!("/cart/items/{id}")))
        .json(&json!({ "quantity": 0 }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn removing_someone_elses_item_is_forbidden() {
    let srv = TestServer::spawn().await;
    let alice = Visitor::guest("alice");
    let mallory = Visitor::guest("mallory");

    let added = alice.add(&srv, "A1", 1, 20.0).await;
    mallory.add(&srv, "A9", 1, 1.0).await;
    let id = added["item"]["id"].as_i64().unwrap();

    let res = mallory
        .request(reqwest::Method::DELETE, srv.url(&format!("/cart/items/{id}")))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    assert_eq!(alice.cart(&srv).await["items"].as_array().unwrap().len(), 1);

    let res = alice
        .request(reqwest::Method::DELETE, srv.url("/cart/items/999999"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn checkout_requires_items() {
    let srv = TestServer::spawn().await;
    let guest = Visitor::guest("s1");

    let res = guest
        .request(reqwest::Method::GET, srv.url("/cart/checkout"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "empty_cart");

    guest.add(&srv, "A1", 1, 20.0).await;
    let res = guest
        .request(reqwest::Method::GET, srv.url("/cart/checkout"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn login_merges_guest_cart_into_user_cart() {
    let srv = TestServer::spawn().await;
    let user = UserId::new();

    // the user filled a cart during an earlier visit
    let earlier = Visitor::user("earlier-session", user);
    earlier.add(&srv, "A1", 2, 20.0).await;

    // now browsing anonymously
    let guest = Visitor::guest("guest-session");
    guest.add(&srv, "A1", 1, 20.0).await;
    guest.add(&srv, "A2", 1, 15.0).await;

    let res = guest
        .request(reqwest::Method::POST, srv.url("/session/login"))
        .json(&json!({ "user_id": user.to_string(), "new_session_id": "rotated-session" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let login: serde_json::Value = res.json().await.unwrap();
    assert_eq!(login["user_id"], user.to_string());

    let after = Visitor::user("rotated-session", user);
    let cart = after.cart(&srv).await;
    assert_eq!(cart["cart_id"], login["cart_id"]);

    let items = cart["items"].as_array().unwrap();
    assert_eq!(items.len(), 2);
    let a1 = items.iter().find(|i| i["artwork_id"] == "A1").unwrap();
    assert_eq!(a1["quantity"], 3);
    assert_eq!(cart["total"], 75.0);

    // the guest cart is gone
    let stale = guest.cart(&srv).await;
    assert_eq!(stale["items"].as_array().unwrap().len(), 0);
}
