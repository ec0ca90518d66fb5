use std::io::Write;
use std::path::Path;

use http::{header, Method, StatusCode};
use relic_handler::Handler;
use tempfile::TempDir;

use super::{ETagMode, ServeDir, ServeFile};
use crate::context::Context;
use crate::headers::Headers;
use crate::message::{Request, Response};
use crate::services::fs::cache_bust::{short_content_hash, CacheBustingConfig};

fn write_file(dir: &Path, name: &str, contents: &[u8]) {
    let mut file = std::fs::File::create(dir.join(name)).unwrap();
    file.write_all(contents).unwrap();
}

fn fixture() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    write_file(dir.path(), "data.bin", b"0123456789ABCDEF");
    write_file(dir.path(), "page.html", b"<!DOCTYPE html><html></html>");
    write_file(dir.path(), ".env", b"SECRET=1");
    dir
}

fn request(method: Method, path: &str, headers: Headers) -> Context {
    Context::new(
        Request::builder(method, path.parse().unwrap())
            .headers(headers)
            .build(),
    )
}

async fn serve(dir: &ServeDir, method: Method, path: &str, headers: Headers) -> Response {
    let ctx = request(method, path, headers);
    let resolved = dir.call(ctx).await.unwrap();
    let (_, outcome) = resolved.into_outcome().unwrap();
    match outcome {
        crate::context::Outcome::Response(response) => response,
        other => panic!("expected a response, got {other:?}"),
    }
}

#[tokio::test]
async fn serves_whole_files() {
    let dir = fixture();
    let serve_dir = ServeDir::new(dir.path());

    let response = serve(&serve_dir, Method::GET, "/data.bin", Headers::new()).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.body().content_length(), Some(16));
    assert_eq!(
        response.headers().raw_str(&header::ACCEPT_RANGES),
        Some("bytes")
    );
    assert_eq!(
        response.body().read_bytes().await.unwrap().as_ref(),
        b"0123456789ABCDEF"
    );
}

#[tokio::test]
async fn mime_comes_from_the_extension() {
    let dir = fixture();
    let serve_dir = ServeDir::new(dir.path());

    let response = serve(&serve_dir, Method::GET, "/page.html", Headers::new()).await;
    assert_eq!(
        response.headers().raw_str(&header::CONTENT_TYPE),
        Some("text/html")
    );
}

#[tokio::test]
async fn single_range() {
    let dir = fixture();
    let serve_dir = ServeDir::new(dir.path());

    let headers = Headers::builder()
        .raw(header::RANGE, "bytes=0-4".parse().unwrap())
        .build();
    let response = serve(&serve_dir, Method::GET, "/data.bin", headers).await;
    assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
    assert_eq!(
        response.headers().raw_str(&header::CONTENT_RANGE),
        Some("bytes 0-4/16")
    );
    assert_eq!(response.body().read_bytes().await.unwrap().as_ref(), b"01234");
}

#[tokio::test]
async fn suffix_range_clips() {
    let dir = fixture();
    let serve_dir = ServeDir::new(dir.path());

    let headers = Headers::builder()
        .raw(header::RANGE, "bytes=-4".parse().unwrap())
        .build();
    let response = serve(&serve_dir, Method::GET, "/data.bin", headers).await;
    assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
    assert_eq!(
        response.headers().raw_str(&header::CONTENT_RANGE),
        Some("bytes 12-15/16")
    );
    assert_eq!(response.body().read_bytes().await.unwrap().as_ref(), b"CDEF");
}

#[tokio::test]
async fn multiple_ranges_build_a_multipart_body() {
    let dir = fixture();
    let serve_dir = ServeDir::new(dir.path());

    let headers = Headers::builder()
        .raw(header::RANGE, "bytes=0-0,2-3,14-".parse().unwrap())
        .build();
    let response = serve(&serve_dir, Method::GET, "/data.bin", headers).await;
    assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);

    let content_type = response
        .headers()
        .raw_str(&header::CONTENT_TYPE)
        .unwrap()
        .to_owned();
    assert!(content_type.starts_with("multipart/byteranges; boundary="));
    let boundary = content_type.rsplit_once('=').unwrap().1.to_owned();

    let expected_length = response.body().content_length().unwrap();
    let bytes = response.body().read_bytes().await.unwrap();
    assert_eq!(bytes.len() as u64, expected_length);

    let text = String::from_utf8_lossy(&bytes);
    let parts: Vec<&str> = text.split(&format!("--{boundary}")).collect();
    // leading part, three ranges, closing "--\r\n"
    assert_eq!(parts.len(), 5);
    assert!(parts[1].contains("Content-Range: bytes 0-0/16"));
    assert!(parts[1].ends_with("\r\n\r\n0\r\n"));
    assert!(parts[2].contains("Content-Range: bytes 2-3/16"));
    assert!(parts[2].ends_with("\r\n\r\n23\r\n"));
    assert!(parts[3].contains("Content-Range: bytes 14-15/16"));
    assert!(parts[3].ends_with("\r\n\r\nEF\r\n"));
    assert!(parts[4].starts_with("--"));
    for part in &parts[1..4] {
        assert!(part.contains("Content-Type: "));
    }
}

#[tokio::test]
async fn range_past_the_end_is_not_satisfiable() {
    let dir = fixture();
    let serve_dir = ServeDir::new(dir.path());

    let headers = Headers::builder()
        .raw(header::RANGE, "bytes=16-20".parse().unwrap())
        .build();
    let response = serve(&serve_dir, Method::GET, "/data.bin", headers).await;
    assert_eq!(response.status(), StatusCode::RANGE_NOT_SATISFIABLE);
    assert_eq!(
        response.headers().raw_str(&header::CONTENT_RANGE),
        Some("bytes */16")
    );
}

#[tokio::test]
async fn malformed_range_is_an_error() {
    let dir = fixture();
    let serve_dir = ServeDir::new(dir.path());

    let headers = Headers::builder()
        .raw(header::RANGE, "bytes=abc".parse().unwrap())
        .build();
    let ctx = request(Method::GET, "/data.bin", headers);
    let err = serve_dir.call(ctx).await.unwrap_err();
    assert!(err.downcast_ref::<crate::headers::HeaderError>().is_some());
}

#[tokio::test]
async fn if_none_match_wildcard_is_not_modified() {
    let dir = fixture();
    let serve_dir = ServeDir::new(dir.path());

    let headers = Headers::builder()
        .raw(header::IF_NONE_MATCH, "*".parse().unwrap())
        .build();
    let response = serve(&serve_dir, Method::GET, "/data.bin", headers).await;
    assert_eq!(response.status(), StatusCode::NOT_MODIFIED);
    assert_eq!(response.body().content_length(), Some(0));
}

#[tokio::test]
async fn if_none_match_round_trips_the_etag() {
    let dir = fixture();
    let serve_dir = ServeDir::new(dir.path());

    let first = serve(&serve_dir, Method::GET, "/data.bin", Headers::new()).await;
    let etag = first.headers().raw_str(&header::ETAG).unwrap().to_owned();

    let headers = Headers::builder()
        .raw(header::IF_NONE_MATCH, etag.parse().unwrap())
        .build();
    let response = serve(&serve_dir, Method::GET, "/data.bin", headers).await;
    assert_eq!(response.status(), StatusCode::NOT_MODIFIED);
}

#[tokio::test]
async fn if_modified_since_checks_the_mtime() {
    let dir = fixture();
    let serve_dir = ServeDir::new(dir.path());

    let first = serve(&serve_dir, Method::GET, "/data.bin", Headers::new()).await;
    let last_modified = first
        .headers()
        .raw_str(&header::LAST_MODIFIED)
        .unwrap()
        .to_owned();

    let headers = Headers::builder()
        .raw(header::IF_MODIFIED_SINCE, last_modified.parse().unwrap())
        .build();
    let response = serve(&serve_dir, Method::GET, "/data.bin", headers).await;
    assert_eq!(response.status(), StatusCode::NOT_MODIFIED);

    let headers = Headers::builder()
        .raw(
            header::IF_MODIFIED_SINCE,
            "Sun, 06 Nov 1994 08:49:37 GMT".parse().unwrap(),
        )
        .build();
    let response = serve(&serve_dir, Method::GET, "/data.bin", headers).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn stale_if_range_falls_back_to_the_full_file() {
    let dir = fixture();
    let serve_dir = ServeDir::new(dir.path());

    let headers = Headers::builder()
        .raw(header::RANGE, "bytes=0-4".parse().unwrap())
        .raw(header::IF_RANGE, "\"not-the-etag\"".parse().unwrap())
        .build();
    let response = serve(&serve_dir, Method::GET, "/data.bin", headers).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.body().content_length(), Some(16));
}

#[tokio::test]
async fn matching_if_range_honors_the_range() {
    let dir = fixture();
    let serve_dir = ServeDir::new(dir.path());

    let first = serve(&serve_dir, Method::GET, "/data.bin", Headers::new()).await;
    let etag = first.headers().raw_str(&header::ETAG).unwrap().to_owned();

    let headers = Headers::builder()
        .raw(header::RANGE, "bytes=0-4".parse().unwrap())
        .raw(header::IF_RANGE, etag.parse().unwrap())
        .build();
    let response = serve(&serve_dir, Method::GET, "/data.bin", headers).await;
    assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
}

#[tokio::test]
async fn rejects_other_methods_with_allow() {
    let dir = fixture();
    let serve_dir = ServeDir::new(dir.path());

    let response = serve(&serve_dir, Method::POST, "/data.bin", Headers::new()).await;
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(
        response.headers().raw_str(&header::ALLOW),
        Some("GET, HEAD")
    );
}

#[tokio::test]
async fn hides_dotfiles_and_misses() {
    let dir = fixture();
    let serve_dir = ServeDir::new(dir.path());

    let response = serve(&serve_dir, Method::GET, "/.env", Headers::new()).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = serve(&serve_dir, Method::GET, "/missing.txt", Headers::new()).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn directories_are_not_served() {
    let dir = fixture();
    std::fs::create_dir(dir.path().join("sub")).unwrap();
    let serve_dir = ServeDir::new(dir.path());

    let response = serve(&serve_dir, Method::GET, "/sub", Headers::new()).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[cfg(unix)]
#[tokio::test]
async fn symlinks_escaping_the_root_are_hidden() {
    let outside = tempfile::tempdir().unwrap();
    write_file(outside.path(), "secret.txt", b"secret");

    let dir = fixture();
    std::os::unix::fs::symlink(
        outside.path().join("secret.txt"),
        dir.path().join("leak.txt"),
    )
    .unwrap();
    let serve_dir = ServeDir::new(dir.path());

    let response = serve(&serve_dir, Method::GET, "/leak.txt", Headers::new()).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn metadata_etags_also_round_trip() {
    let dir = fixture();
    let serve_dir = ServeDir::new(dir.path()).with_etag_mode(ETagMode::Metadata);

    let first = serve(&serve_dir, Method::GET, "/data.bin", Headers::new()).await;
    let etag = first.headers().raw_str(&header::ETAG).unwrap().to_owned();
    assert!(etag.starts_with("W/"));

    let headers = Headers::builder()
        .raw(header::IF_NONE_MATCH, etag.parse().unwrap())
        .build();
    let response = serve(&serve_dir, Method::GET, "/data.bin", headers).await;
    assert_eq!(response.status(), StatusCode::NOT_MODIFIED);
}

#[tokio::test]
async fn cache_busted_paths_rewrite_and_pin() {
    let dir = fixture();
    let config = CacheBustingConfig::new("/", dir.path(), "@").unwrap();
    let serve_dir = ServeDir::new(dir.path()).with_cache_busting(config);

    let hash = short_content_hash(b"0123456789ABCDEF");
    let response = serve(
        &serve_dir,
        Method::GET,
        &format!("/data@{hash}.bin"),
        Headers::new(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().raw_str(&header::CACHE_CONTROL),
        Some("max-age=31536000, immutable")
    );

    // a stale hash serves the current content, but without the pin
    let response = serve(
        &serve_dir,
        Method::GET,
        "/data@00000000.bin",
        Headers::new(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().raw_str(&header::CACHE_CONTROL).is_none());
}

#[tokio::test]
async fn serve_file_ignores_the_request_path() {
    let dir = fixture();
    let serve_file = ServeFile::new(dir.path().join("page.html"));

    let response = serve_file
        .call(request(Method::GET, "/whatever", Headers::new()))
        .await
        .unwrap();
    let (_, outcome) = response.into_outcome().unwrap();
    let response = match outcome {
        crate::context::Outcome::Response(response) => response,
        other => panic!("expected a response, got {other:?}"),
    };
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.body().content_length(), Some(28));
}
