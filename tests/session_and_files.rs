mod common;

use std::time::Duration;

use appeears::{
    Auth, AuthError, DownloadOutcome, Downloader, Error, FileDescriptor, FileLister, Method,
    Session, TaskHandle, TransportError, ValidationError,
};
use common::{MockService, session};
use serde_json::json;

fn descriptor(id: &str, name: &str, size: Option<u64>) -> FileDescriptor {
    FileDescriptor {
        file_id: id.to_string(),
        file_name: name.to_string(),
        file_size: size,
        file_type: None,
        sha256: None,
    }
}

#[test]
fn login_stores_the_token_for_later_requests() {
    let service = MockService::new();
    service.json(Method::Post, "login", 200, json!({"token": "fresh", "token_type": "Bearer"}));
    service.json(Method::Get, "product", 200, json!([]));

    let session = Session::new(service.clone());
    session.login("alice", "pw").unwrap();
    assert!(session.credential().is_set());

    let _: serde_json::Value = session.get_json("product", "listing products").unwrap();
    let requests = service.requests();
    assert_eq!(
        requests[0].auth,
        Auth::Basic {
            username: "alice".into(),
            password: "pw".into()
        }
    );
    assert_eq!(requests[1].auth, Auth::Bearer("fresh".into()));
}

#[test]
fn rejected_login_leaves_no_credential() {
    let service = MockService::new();
    service.json(Method::Post, "login", 401, json!({"message": "bad credentials"}));

    let session = Session::new(service.clone());
    let err = session.login("alice", "wrong").unwrap_err();
    assert!(matches!(
        err,
        Error::Auth(AuthError::LoginFailed { status: 401, .. })
    ));
    assert!(!session.credential().is_set());
}

#[test]
fn logout_clears_the_shared_credential() {
    let service = MockService::new();
    service.bytes(Method::Post, "logout", 204, b"");

    let session = session(&service);
    let clone = session.clone();
    session.logout().unwrap();
    assert!(!clone.credential().is_set());

    let err = clone.get("task/t").unwrap_err();
    assert!(matches!(err, Error::Auth(AuthError::NotLoggedIn)));
    assert_eq!(service.request_count(), 1);
}

#[test]
fn failed_logout_keeps_the_credential() {
    let service = MockService::new();
    service.bytes(Method::Post, "logout", 500, b"");

    let session = session(&service);
    assert!(matches!(
        session.logout(),
        Err(Error::Auth(AuthError::LogoutFailed { status: 500 }))
    ));
    assert!(session.credential().is_set());
}

#[test]
fn get_json_reports_non_success_replies() {
    let service = MockService::new();
    service.json(Method::Get, "product/X", 403, json!({"message": "forbidden"}));

    let err = session(&service)
        .get_json::<serde_json::Value>("product/X", "fetching product X")
        .unwrap_err();
    match err {
        Error::RequestFailed {
            context,
            status,
            message,
        } => {
            assert_eq!(context, "fetching product X");
            assert_eq!(status, 403);
            assert!(message.starts_with("forbidden"));
            assert!(message.contains("log in again"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn lister_reads_descriptors() {
    let service = MockService::new();
    service.bundle(
        "t",
        json!([
            {"file_id": "a", "file_name": "x.tif", "file_size": 3},
            {"file_id": "b", "file_name": "t-request.json", "file_type": "json"}
        ]),
    );

    let files = FileLister::new(session(&service))
        .list_files(&TaskHandle::new("t"))
        .unwrap();
    assert_eq!(files.len(), 2);
    assert_eq!(files[0], descriptor("a", "x.tif", Some(3)));
    assert_eq!(files[1].file_type.as_deref(), Some("json"));
}

#[test]
fn lister_treats_missing_bundle_as_failure() {
    let service = MockService::new();
    let err = FileLister::new(session(&service))
        .list_files(&TaskHandle::new("gone"))
        .unwrap_err();
    assert!(matches!(err, Error::ListingFailed { status: 404, .. }));
}

#[test]
fn downloads_accepted_files_and_skips_the_rest() {
    let service = MockService::new();
    service.bytes(Method::Get, "bundle/t/f1", 200, b"GTIFF");
    service.bytes(Method::Get, "bundle/t/f2", 200, b"{}");

    let dir = tempfile::tempdir().unwrap();
    let files = [
        descriptor("f1", "MOD11A1/LST_Day_1km_doy2023001.tif", Some(5)),
        descriptor("f2", "t-request.json", None),
    ];
    let saved = Downloader::new(session(&service))
        .download_all(&TaskHandle::new("t"), &files, dir.path())
        .unwrap();

    let expected = dir.path().join("MOD11A1").join("LST_Day_1km_doy2023001.tif");
    assert_eq!(saved, vec![expected.clone()]);
    assert_eq!(std::fs::read(&expected).unwrap(), b"GTIFF");
    assert_eq!(service.calls_to(Method::Get, "bundle/t/f2"), 0);
}

#[test]
fn unfiltered_downloader_keeps_everything() {
    let service = MockService::new();
    service.bytes(Method::Get, "bundle/t/f2", 200, b"{}");

    let dir = tempfile::tempdir().unwrap();
    let outcome = Downloader::new(session(&service))
        .with_extension(None)
        .download(
            &TaskHandle::new("t"),
            &descriptor("f2", "t-request.json", None),
            dir.path(),
        )
        .unwrap();
    assert_eq!(
        outcome,
        DownloadOutcome::Saved(dir.path().join("t-request.json"))
    );
}

#[test]
fn escaping_file_names_are_rejected() {
    let service = MockService::new();
    service.bytes(Method::Get, "bundle/t/evil", 200, b"x");

    let dir = tempfile::tempdir().unwrap();
    let err = Downloader::new(session(&service))
        .download(
            &TaskHandle::new("t"),
            &descriptor("evil", "../outside.tif", None),
            dir.path(),
        )
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Validation(ValidationError::InvalidFileName(_))
    ));
    assert_eq!(service.request_count(), 0);
}

#[test]
fn failed_download_is_reported_with_the_file_name() {
    let service = MockService::new();
    service.json(Method::Get, "bundle/t/f1", 410, json!({"message": "expired"}));

    let dir = tempfile::tempdir().unwrap();
    let err = Downloader::new(session(&service))
        .download(
            &TaskHandle::new("t"),
            &descriptor("f1", "a.tif", None),
            dir.path(),
        )
        .unwrap_err();
    match err {
        Error::DownloadFailed {
            file_name,
            status,
            message,
        } => {
            assert_eq!(file_name, "a.tif");
            assert_eq!(status, 410);
            assert_eq!(message, "expired");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(!dir.path().join("a.tif").exists());
}

fn retrying_downloader(service: &std::sync::Arc<MockService>) -> Downloader {
    Downloader::new(session(service))
        .with_retry_max(2)
        .with_retry_pause(Duration::ZERO)
}

#[test]
fn short_body_is_not_reported_as_saved() {
    let service = MockService::new();
    service.bytes(Method::Get, "bundle/t/f1", 200, b"abc");

    let dir = tempfile::tempdir().unwrap();
    let err = retrying_downloader(&service)
        .download(
            &TaskHandle::new("t"),
            &descriptor("f1", "a.tif", Some(10)),
            dir.path(),
        )
        .unwrap_err();
    match err {
        Error::IncompleteDownload {
            file_name,
            expected,
            received,
        } => {
            assert_eq!(file_name, "a.tif");
            assert_eq!(expected, 10);
            assert_eq!(received, 3);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(service.calls_to(Method::Get, "bundle/t/f1"), 2);
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[test]
fn interrupted_stream_leaves_no_partial_file() {
    let service = MockService::new();
    service.broken_body(Method::Get, "bundle/t/f1", b"II*\0");

    let dir = tempfile::tempdir().unwrap();
    let err = retrying_downloader(&service)
        .download(
            &TaskHandle::new("t"),
            &descriptor("f1", "a.tif", Some(10)),
            dir.path(),
        )
        .unwrap_err();
    assert!(matches!(err, Error::Transport(TransportError::Body(_))));
    assert!(err.is_retryable());
    assert!(!dir.path().join("a.tif").exists());
    assert!(!dir.path().join("a.tif.part").exists());
    assert_eq!(service.calls_to(Method::Get, "bundle/t/f1"), 2);
}

#[test]
fn interrupted_stream_is_fetched_again() {
    let service = MockService::new();
    service.broken_body(Method::Get, "bundle/t/f1", b"II*\0");
    service.bytes(Method::Get, "bundle/t/f1", 200, b"II*\0GTIFF!");

    let dir = tempfile::tempdir().unwrap();
    let outcome = retrying_downloader(&service)
        .download(
            &TaskHandle::new("t"),
            &descriptor("f1", "a.tif", Some(10)),
            dir.path(),
        )
        .unwrap();
    let target = dir.path().join("a.tif");
    assert_eq!(outcome, DownloadOutcome::Saved(target.clone()));
    assert_eq!(std::fs::read(&target).unwrap(), b"II*\0GTIFF!");
    assert!(!dir.path().join("a.tif.part").exists());
}
