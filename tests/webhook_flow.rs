use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use plexrate::app::{build_router, AppState};
use plexrate::debounce::{Debouncer, DEFAULT_CAPACITY, DEFAULT_DELAY};
use plexrate::discord::WebhookApi;
use plexrate::dispatch::{Dispatcher, DEFAULT_CALLS};
use plexrate::imgur::{ImageHostApi, UploadedImage};
use plexrate::notification::NotificationDocument;
use plexrate::plex::MediaServerApi;
use plexrate::poster::PosterManager;
use plexrate::relay::Relay;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tower::util::ServiceExt;

const BOUNDARY: &str = "------------------------plexrateboundary";

struct FakePlex {
    fail: bool,
    fetched: Mutex<Vec<String>>,
}

#[async_trait::async_trait]
impl MediaServerApi for FakePlex {
    async fn fetch_artwork(&self, path: &str) -> anyhow::Result<Vec<u8>> {
        self.fetched.lock().unwrap().push(path.to_string());
        if self.fail {
            anyhow::bail!("Plex artwork HTTP error (status 404 Not Found)");
        }
        Ok(b"poster-bytes".to_vec())
    }
}

#[derive(Default)]
struct FakeImgur {
    uploads: Mutex<Vec<String>>,
    deletes: Mutex<Vec<String>>,
}

#[async_trait::async_trait]
impl ImageHostApi for FakeImgur {
    async fn upload(&self, image: &[u8], title: &str, name: &str) -> anyhow::Result<UploadedImage> {
        assert_eq!(image, b"poster-bytes");
        let mut uploads = self.uploads.lock().unwrap();
        uploads.push(format!("{title}|{name}"));
        let n = uploads.len();
        Ok(UploadedImage {
            link: format!("https://i.imgur.com/poster{n}.png"),
            delete_hash: format!("del{n}"),
        })
    }

    async fn delete(&self, delete_hash: &str) -> anyhow::Result<()> {
        self.deletes.lock().unwrap().push(delete_hash.to_string());
        Ok(())
    }
}

struct FakeDiscord {
    status: StatusCode,
    posted: Mutex<Vec<Value>>,
}

#[async_trait::async_trait]
impl WebhookApi for FakeDiscord {
    async fn post(&self, document: &NotificationDocument) -> anyhow::Result<reqwest::StatusCode> {
        self.posted
            .lock()
            .unwrap()
            .push(serde_json::to_value(document).unwrap());
        Ok(self.status)
    }
}

struct Harness {
    app: Router,
    plex: Arc<FakePlex>,
    imgur: Arc<FakeImgur>,
    discord: Arc<FakeDiscord>,
}

impl Harness {
    fn posted(&self) -> Vec<Value> {
        self.discord.posted.lock().unwrap().clone()
    }
}

fn harness(plex_fails: bool, webhook_status: StatusCode) -> Harness {
    let plex = Arc::new(FakePlex {
        fail: plex_fails,
        fetched: Mutex::new(Vec::new()),
    });
    let imgur = Arc::new(FakeImgur::default());
    let discord = Arc::new(FakeDiscord {
        status: webhook_status,
        posted: Mutex::new(Vec::new()),
    });

    let relay = Relay::new(
        PosterManager::new(plex.clone(), imgur.clone()),
        Dispatcher::with_default_period(discord.clone(), DEFAULT_CALLS),
    );
    let state = AppState {
        debouncer: Debouncer::new(Arc::new(relay), DEFAULT_DELAY, DEFAULT_CAPACITY),
    };

    Harness {
        app: build_router(state),
        plex,
        imgur,
        discord,
    }
}

fn episode_rating(rating: f64) -> Value {
    json!({
        "event": "media.rate",
        "rating": rating,
        "Account": { "title": "alice", "thumb": "https://plex.tv/users/1/avatar" },
        "Metadata": {
            "librarySectionType": "show",
            "type": "episode",
            "title": "Pilot",
            "grandparentTitle": "Show",
            "parentIndex": 1,
            "index": 1,
            "summary": "It begins.",
            "thumb": "/library/metadata/12/thumb/1700000000",
            "grandparentThumb": "/library/metadata/10/thumb/1700000000",
            "Guid": [
                { "id": "imdb://tt0959621" },
                { "id": "tvdb://349232" }
            ]
        }
    })
}

fn multipart_request(payload: &Value) -> Request<Body> {
    let body = format!(
        "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"payload\"\r\n\r\n{payload}\r\n--{BOUNDARY}--\r\n"
    );
    Request::post("/plex")
        .header(
            "content-type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .expect("failed to build request")
}

fn urlencoded_request(payload: &Value) -> Request<Body> {
    let body = format!(
        "payload={}",
        urlencoding::encode(&payload.to_string())
    );
    Request::post("/plex")
        .header("content-type", "application/x-www-form-urlencoded")
        .body(Body::from(body))
        .expect("failed to build request")
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, String) {
    let res = app.clone().oneshot(request).await.unwrap();
    let status = res.status();
    let bytes = axum::body::to_bytes(res.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, String::from_utf8_lossy(&bytes).to_string())
}

async fn past_debounce_window() {
    tokio::time::sleep(DEFAULT_DELAY + Duration::from_secs(1)).await;
}

fn field<'a>(doc: &'a Value, name: &str) -> Option<&'a str> {
    doc["embeds"][0]["fields"]
        .as_array()?
        .iter()
        .find(|f| f["name"] == name)
        .and_then(|f| f["value"].as_str())
}

#[tokio::test(start_paused = true)]
async fn burst_of_corrections_sends_final_rating_once() {
    let h = harness(false, StatusCode::NO_CONTENT);

    for rating in [6.0, 7.0, 9.0] {
        let (status, body) = send(&h.app, multipart_request(&episode_rating(rating))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "Success!");
    }
    assert!(h.posted().is_empty());

    past_debounce_window().await;
    let posted = h.posted();
    assert_eq!(posted.len(), 1);
    let doc = &posted[0];
    assert_eq!(doc["embeds"][0]["title"], "alice rated Show - Pilot (S1 · E1)!");
    assert_eq!(field(doc, "Rating"), Some("9/10"));
    assert_eq!(field(doc, "Description"), Some("It begins."));
    assert_eq!(field(doc, "Audience Rating"), Some("N/A"));
    assert_eq!(
        field(doc, "View Details"),
        Some("[TheTVDB](https://thetvdb.com/?tab=series&id=349232)")
    );
    assert_eq!(doc["embeds"][0]["image"]["url"], "https://i.imgur.com/poster1.png");
    assert_eq!(
        doc["embeds"][0]["thumbnail"]["url"],
        "https://plex.tv/users/1/avatar"
    );

    assert_eq!(
        h.imgur.uploads.lock().unwrap().as_slice(),
        ["Show - Pilot (S1 · E1)|10.png"]
    );
    let fetched = h.plex.fetched.lock().unwrap();
    assert_eq!(fetched.len(), 1);
    assert!(fetched[0].starts_with("/library/metadata/10/thumb/"));
}

#[tokio::test(start_paused = true)]
async fn second_flush_evicts_previous_poster() {
    let h = harness(false, StatusCode::OK);

    send(&h.app, multipart_request(&episode_rating(8.0))).await;
    past_debounce_window().await;
    send(&h.app, urlencoded_request(&episode_rating(4.0))).await;
    past_debounce_window().await;

    let posted = h.posted();
    assert_eq!(posted.len(), 2);
    assert_eq!(field(&posted[1], "Rating"), Some("4/10"));
    assert_eq!(
        posted[1]["embeds"][0]["image"]["url"],
        "https://i.imgur.com/poster2.png"
    );
    assert_eq!(h.imgur.deletes.lock().unwrap().as_slice(), ["del1"]);
}

#[tokio::test(start_paused = true)]
async fn negative_rating_is_sent_as_zero() {
    let h = harness(false, StatusCode::OK);
    send(&h.app, multipart_request(&episode_rating(-1.0))).await;
    past_debounce_window().await;
    assert_eq!(field(&h.posted()[0], "Rating"), Some("0/10"));
}

#[tokio::test(start_paused = true)]
async fn missing_artwork_still_notifies_without_image() {
    let h = harness(true, StatusCode::OK);
    send(&h.app, multipart_request(&episode_rating(7.0))).await;
    past_debounce_window().await;

    let posted = h.posted();
    assert_eq!(posted.len(), 1);
    assert!(posted[0]["embeds"][0].get("image").is_none());
    assert!(h.imgur.uploads.lock().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn rejected_delivery_is_not_retried() {
    let h = harness(false, StatusCode::INTERNAL_SERVER_ERROR);
    send(&h.app, multipart_request(&episode_rating(7.0))).await;
    past_debounce_window().await;
    past_debounce_window().await;
    assert_eq!(h.posted().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn ignores_non_rating_events() {
    let h = harness(false, StatusCode::OK);
    let mut payload = episode_rating(7.0);
    payload["event"] = json!("media.play");

    let (status, body) = send(&h.app, multipart_request(&payload)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "Success!");
    past_debounce_window().await;
    assert!(h.posted().is_empty());
}

#[tokio::test(start_paused = true)]
async fn drops_rating_missing_required_fields() {
    let h = harness(false, StatusCode::OK);
    let mut payload = episode_rating(7.0);
    payload.as_object_mut().unwrap().remove("Account");

    let (status, _) = send(&h.app, multipart_request(&payload)).await;
    assert_eq!(status, StatusCode::OK);
    past_debounce_window().await;
    assert!(h.posted().is_empty());
}

#[tokio::test]
async fn rejects_requests_without_payload() {
    let h = harness(false, StatusCode::OK);

    let req = Request::post("/plex")
        .header("content-type", "application/x-www-form-urlencoded")
        .body(Body::from("other=1"))
        .unwrap();
    assert_eq!(send(&h.app, req).await.0, StatusCode::BAD_REQUEST);

    let req = Request::post("/plex")
        .header("content-type", "application/x-www-form-urlencoded")
        .body(Body::from("payload=%7Bnot-json"))
        .unwrap();
    assert_eq!(send(&h.app, req).await.0, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn rejects_non_post() {
    let h = harness(false, StatusCode::OK);
    let req = Request::get("/plex").body(Body::empty()).unwrap();
    assert_eq!(send(&h.app, req).await.0, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn health_check() {
    let h = harness(false, StatusCode::OK);
    let req = Request::get("/health").body(Body::empty()).unwrap();
    assert_eq!(send(&h.app, req).await, (StatusCode::OK, "OK".to_string()));
}
