//! Integration tests for the typed API client against a live server

mod common;

use reqwest::StatusCode;

use knfs_daemon::http_server::api::client::{ApiClient, ApiError};
use knfs_daemon::http_server::api::v0::capabilities::CapabilitiesRequest;
use knfs_daemon::http_server::api::v0::volumes::{
    CreateRequest, GetRequest, ListRequest, MountRequest, PathRequest, RemoveRequest,
    UnmountRequest,
};

#[tokio::test]
async fn test_client_round_trip() {
    let (state, t) = common::setup_state().await;
    let (url, _shutdown) = common::serve(state).await;
    let mut client = ApiClient::new(&url).unwrap();

    client
        .call(CreateRequest {
            name: "v1".to_string(),
            opts: t.source("data"),
        })
        .await
        .unwrap();

    let mounted = client
        .call(MountRequest {
            name: "v1".to_string(),
            caller: "alice".to_string(),
        })
        .await
        .unwrap();
    let path = client
        .call(PathRequest {
            name: "v1".to_string(),
        })
        .await
        .unwrap();
    assert_eq!(mounted.mountpoint, path.mountpoint);

    let volume = client
        .call(GetRequest {
            name: "v1".to_string(),
        })
        .await
        .unwrap()
        .volume;
    assert_eq!(volume.refcount, 1);
    assert_eq!(volume.target, "nfs.example.com:/data");

    client
        .call(UnmountRequest {
            name: "v1".to_string(),
            caller: "alice".to_string(),
        })
        .await
        .unwrap();
    client
        .call(RemoveRequest {
            name: "v1".to_string(),
        })
        .await
        .unwrap();
    assert!(client.call(ListRequest {}).await.unwrap().volumes.is_empty());

    let capabilities = client.call(CapabilitiesRequest {}).await.unwrap();
    assert_eq!(
        capabilities.capabilities.scope,
        ::common::driver::MountScope::Shared
    );
}

#[tokio::test]
async fn test_client_surfaces_driver_error() {
    let (state, _t) = common::setup_state().await;
    let (url, _shutdown) = common::serve(state).await;
    let mut client = ApiClient::new(&url).unwrap();

    let err = client
        .call(PathRequest {
            name: "unknownvol".to_string(),
        })
        .await
        .unwrap_err();
    match err {
        ApiError::HttpStatus(status, message) => {
            assert_eq!(status, StatusCode::NOT_FOUND);
            assert_eq!(message, "volume not found: unknownvol");
        }
        other => panic!("expected an HTTP status error, got {:?}", other),
    }
}
