use std::io::Write;
use tollbooth::{
    ConfigError, MemoryStore, ProtectRequest, TokenLimit, Tollbooth, TollboothCode, TollboothConfig,
};

const CONFIG: &str = r#"{
    "routes": [
        { "path": "/foo", "method": "get" },
        { "path": "/foo", "method": "post" }
    ],
    "allow_anonymous": false,
    "throttle_interval_secs": 60,
    "throttle_limit": 1,
    "namespace": "svc"
}"#;

#[tokio::test]
async fn tollbooth_from_json_config() {
    let cfg = TollboothConfig::from_json_str(CONFIG).unwrap();
    let tb = Tollbooth::from_config(MemoryStore::new(), &cfg).unwrap();
    assert_eq!(tb.namespace().limit_table(), "svc:limit");
    tb.admin().set_limits(&[TokenLimit::new("tok", 10u64)]).await.unwrap();

    let post = ProtectRequest::new("post", "/foo").with_token("tok");
    assert_eq!(tb.protect(&post).await.code, TollboothCode::Ok);
    assert_eq!(tb.protect(&post).await.code, TollboothCode::TooManyRequests);
    assert_eq!(tb.protect(&ProtectRequest::new("put", "/foo")).await.code, TollboothCode::Ok);
}

#[test]
fn config_from_file() {
    let path = std::env::temp_dir().join(format!("tollbooth-config-{}.json", std::process::id()));
    let mut file = std::fs::File::create(&path).unwrap();
    file.write_all(CONFIG.as_bytes()).unwrap();
    drop(file);

    let cfg = TollboothConfig::from_json_file(&path).unwrap();
    assert_eq!(cfg.routes.len(), 2);
    assert_eq!(cfg.throttle_limit, 1);
    std::fs::remove_file(&path).unwrap();
}

#[test]
fn missing_file_is_io_error() {
    let err = TollboothConfig::from_json_file("/definitely/not/here.json").unwrap_err();
    assert!(matches!(err, ConfigError::Io(_)));
}

#[test]
fn invalid_route_path_is_rejected() {
    let err = TollboothConfig::from_json_str(r#"{ "routes": [{ "path": "", "method": "get" }] }"#)
        .unwrap_err();
    assert!(matches!(err, ConfigError::InvalidRoute { .. }));
    assert!(err.to_string().contains("path cannot be empty"));
}
