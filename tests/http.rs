use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tempfile::TempDir;
use tokio::net::TcpListener;

use blobserve::store::FsStore;

struct TestServer {
    addr: SocketAddr,
    store: Arc<FsStore>,
    _dir: TempDir,
}

impl TestServer {
    fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }
}

async fn serve(chunk_len: u64) -> TestServer {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FsStore::new(dir.path()).with_chunk_len(chunk_len));

    let app = blobserve::router(store.clone(), blobserve::DEFAULT_READ_CHUNK);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestServer {
        addr,
        store,
        _dir: dir,
    }
}

fn content(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

fn header(response: &reqwest::Response, name: &str) -> String {
    response
        .headers()
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned)
        .unwrap_or_default()
}

async fn wait_for_release(store: &FsStore, deadline: Duration) {
    let started = Instant::now();
    while store.open_leases() > 0 {
        if started.elapsed() > deadline {
            panic!("leases were not released: {}", store.open_leases());
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn test_full_get() {
    let server = serve(64).await;
    let data = content(1000);
    let id = server.store.insert("data.bin", None, &data).await.unwrap();

    let response = reqwest::get(server.url(&format!("/{id}"))).await.unwrap();
    assert_eq!(reqwest::StatusCode::OK, response.status());
    assert_eq!("bytes", header(&response, "accept-ranges"));
    assert_eq!("1000", header(&response, "content-length"));
    assert_eq!("application/octet-stream", header(&response, "content-type"));
    assert!(header(&response, "etag").starts_with('"'));
    assert!(!header(&response, "last-modified").is_empty());
    assert_eq!(&data[..], &response.bytes().await.unwrap()[..]);
}

#[tokio::test]
async fn test_range_scenarios() {
    let server = serve(64).await;
    let data = content(1000);
    let id = server.store.insert("data.bin", None, &data).await.unwrap();
    let client = reqwest::Client::new();
    let url = server.url(&format!("/{id}"));

    let cases: &[(&str, (u64, u64))] = &[
        ("bytes=0-399", (0, 400)),
        ("bytes=400-", (400, 1000)),
        ("bytes=400-449", (400, 450)),
        ("bytes=-100", (900, 1000)),
        ("bytes=999-999", (999, 1000)),
    ];

    for (range, (start, end)) in cases {
        let response = client
            .get(&url)
            .header("range", *range)
            .send()
            .await
            .unwrap();
        assert_eq!(
            reqwest::StatusCode::PARTIAL_CONTENT,
            response.status(),
            "{range}"
        );
        assert_eq!(
            format!("bytes {}-{}/1000", start, end - 1),
            header(&response, "content-range"),
            "{range}",
        );
        assert_eq!(
            (end - start).to_string(),
            header(&response, "content-length"),
            "{range}",
        );
        let expected = &data[*start as usize..*end as usize];
        assert_eq!(expected, &response.bytes().await.unwrap()[..], "{range}");
    }

    // Windows starting at or past the end are not satisfiable.
    for range in ["bytes=0-1500", "bytes=1000-", "bytes=-0"] {
        let response = client
            .get(&url)
            .header("range", range)
            .send()
            .await
            .unwrap();
        assert_eq!(
            reqwest::StatusCode::RANGE_NOT_SATISFIABLE,
            response.status(),
            "{range}"
        );
        assert_eq!("bytes */1000", header(&response, "content-range"), "{range}");
    }

    // Several windows and unparseable specs fall back to the whole object.
    for range in ["bytes=0-10,20-30", "bytes=banana", "bytes=10-2"] {
        let response = client
            .get(&url)
            .header("range", range)
            .send()
            .await
            .unwrap();
        assert_eq!(reqwest::StatusCode::OK, response.status(), "{range}");
        assert_eq!("1000", header(&response, "content-length"), "{range}");
    }

    // Units other than bytes are refused outright.
    let response = client
        .get(&url)
        .header("range", "elephants=0-1")
        .send()
        .await
        .unwrap();
    assert_eq!(reqwest::StatusCode::BAD_REQUEST, response.status());
}

#[tokio::test]
async fn test_repeated_range_request_identical() {
    let server = serve(64).await;
    let data = content(1000);
    let id = server.store.insert("data.bin", None, &data).await.unwrap();
    let client = reqwest::Client::new();
    let url = server.url(&format!("/{id}"));

    // Two pulls of the same window off an unchanged object must not
    // differ in anything a client can observe.
    let mut seen = Vec::new();
    for _ in 0..2 {
        let response = client
            .get(&url)
            .header("range", "bytes=100-299")
            .send()
            .await
            .unwrap();
        let status = response.status();
        let headers: Vec<String> = [
            "content-range",
            "content-length",
            "content-type",
            "content-disposition",
            "etag",
            "last-modified",
            "accept-ranges",
        ]
        .iter()
        .map(|name| header(&response, name))
        .collect();
        let body = response.bytes().await.unwrap();
        seen.push((status, headers, body));
    }

    assert_eq!(seen[0], seen[1]);
    assert_eq!(reqwest::StatusCode::PARTIAL_CONTENT, seen[0].0);
    assert_eq!(&data[100..300], &seen[0].2[..]);
}

#[tokio::test]
async fn test_conditional_get() {
    let server = serve(64).await;
    let id = server
        .store
        .insert("page.html", Some("text/html"), b"<html>hello</html>")
        .await
        .unwrap();

    let client = reqwest::Client::new();
    let url = server.url(&format!("/{id}"));

    let response = client.get(&url).send().await.unwrap();
    let last_modified = header(&response, "last-modified");
    let etag = header(&response, "etag");
    assert_eq!("text/html", header(&response, "content-type"));
    assert!(!last_modified.is_empty());
    assert!(!etag.is_empty());

    // A cache that is up to date gets a bare 304.
    let response = client
        .get(&url)
        .header("if-modified-since", &last_modified)
        .send()
        .await
        .unwrap();
    assert_eq!(reqwest::StatusCode::NOT_MODIFIED, response.status());
    assert_eq!("", header(&response, "etag"));
    assert_eq!("", header(&response, "last-modified"));
    assert_eq!(0, response.bytes().await.unwrap().len());

    // A stale date revalidates to the full object.
    let response = client
        .get(&url)
        .header("if-modified-since", "Thu, 01 Jan 1970 00:00:00 GMT")
        .send()
        .await
        .unwrap();
    assert_eq!(reqwest::StatusCode::OK, response.status());

    // Either validator alone is enough for a 304.
    let response = client
        .get(&url)
        .header("if-none-match", &etag)
        .header("if-modified-since", "Thu, 01 Jan 1970 00:00:00 GMT")
        .send()
        .await
        .unwrap();
    assert_eq!(reqwest::StatusCode::NOT_MODIFIED, response.status());

    let response = client
        .get(&url)
        .header("if-none-match", "\"stale\"")
        .header("if-modified-since", &last_modified)
        .send()
        .await
        .unwrap();
    assert_eq!(reqwest::StatusCode::NOT_MODIFIED, response.status());

    // Both validators stale: serve the content again.
    let response = client
        .get(&url)
        .header("if-none-match", "\"stale\"")
        .header("if-modified-since", "Thu, 01 Jan 1970 00:00:00 GMT")
        .send()
        .await
        .unwrap();
    assert_eq!(reqwest::StatusCode::OK, response.status());
}

#[tokio::test]
async fn test_not_found() {
    let server = serve(64).await;
    let id = server.store.insert("data.bin", None, b"hello").await.unwrap();
    let client = reqwest::Client::new();

    for path in [
        "/ffffffffffffffffffffffff".to_owned(),
        "/not-an-id".to_owned(),
        "/00112233445566778899aab".to_owned(),
        format!("/{id}/"),
    ] {
        let response = client.get(server.url(&path)).send().await.unwrap();
        assert_eq!(reqwest::StatusCode::NOT_FOUND, response.status(), "{path}");
    }
}

#[tokio::test]
async fn test_unavailable_objects() {
    let server = serve(64).await;
    let client = reqwest::Client::new();

    for flag in ["pending", "deleted", "blocked"] {
        let id = server
            .store
            .insert(&format!("{flag}.bin"), None, flag.as_bytes())
            .await
            .unwrap();

        server
            .store
            .update_meta(id, |meta| match flag {
                "pending" => meta.pending = true,
                "deleted" => meta.deleted = true,
                _ => meta.blocked = true,
            })
            .await
            .unwrap();

        let response = client
            .get(server.url(&format!("/{id}")))
            .send()
            .await
            .unwrap();
        assert_eq!(reqwest::StatusCode::NOT_FOUND, response.status(), "{flag}");
    }
}

#[tokio::test]
async fn test_content_disposition() {
    let server = serve(64).await;
    let id = server
        .store
        .insert("русское название.jpg", Some("image/jpeg"), &[0xff, 0xd8])
        .await
        .unwrap();

    let response = reqwest::get(server.url(&format!("/{id}"))).await.unwrap();
    let disposition = header(&response, "content-disposition");

    assert_eq!("image/jpeg", header(&response, "content-type"));
    assert!(disposition.starts_with("inline;"), "{disposition}");
    assert!(
        disposition.contains("filename=\"russkoe nazvanie.jpg\""),
        "{disposition}"
    );
    assert!(
        disposition.contains("filename*=UTF-8''%D1%80"),
        "{disposition}"
    );
}

#[tokio::test]
async fn test_leases_release() {
    let server = serve(16).await;
    let data = content(4096);
    let id = server.store.insert("data.bin", None, &data).await.unwrap();
    let client = reqwest::Client::new();
    let url = server.url(&format!("/{id}"));

    // A completed transfer releases its lease.
    let response = client.get(&url).send().await.unwrap();
    assert_eq!(&data[..], &response.bytes().await.unwrap()[..]);
    wait_for_release(&server.store, Duration::from_secs(5)).await;

    // So does a client that goes away after the headers.
    let response = client.get(&url).send().await.unwrap();
    assert_eq!(reqwest::StatusCode::OK, response.status());
    drop(response);
    wait_for_release(&server.store, Duration::from_secs(5)).await;
}

#[tokio::test]
async fn test_empty_object() {
    let server = serve(64).await;
    let id = server.store.insert("empty.bin", None, b"").await.unwrap();
    let client = reqwest::Client::new();
    let url = server.url(&format!("/{id}"));

    let response = client.get(&url).send().await.unwrap();
    assert_eq!(reqwest::StatusCode::OK, response.status());
    assert_eq!("0", header(&response, "content-length"));
    assert_eq!(0, response.bytes().await.unwrap().len());

    let response = client
        .get(&url)
        .header("range", "bytes=0-0")
        .send()
        .await
        .unwrap();
    assert_eq!(reqwest::StatusCode::RANGE_NOT_SATISFIABLE, response.status());
    assert_eq!("bytes */0", header(&response, "content-range"));
}

#[tokio::test]
async fn test_head() {
    let server = serve(64).await;
    let id = server
        .store
        .insert("data.bin", None, b"hello world")
        .await
        .unwrap();
    let client = reqwest::Client::new();

    let response = client
        .head(server.url(&format!("/{id}")))
        .send()
        .await
        .unwrap();
    assert_eq!(reqwest::StatusCode::OK, response.status());
    assert_eq!("11", header(&response, "content-length"));
    assert_eq!(0, response.bytes().await.unwrap().len());
}
