use tollbooth::{
    Method, Namespace, ProtectRequest, Quota, Route, TokenLimit, Tollbooth, TollboothCode,
};
use tollbooth_redis::RedisStore;

// Requires Redis running. If TOLLBOOTH_TEST_REDIS_URL is unset, the tests skip.
async fn store() -> Option<RedisStore> {
    let url = match std::env::var("TOLLBOOTH_TEST_REDIS_URL") {
        Ok(v) => v,
        Err(_) => {
            eprintln!("skipping: set TOLLBOOTH_TEST_REDIS_URL (e.g. redis://127.0.0.1:6379/)");
            return None;
        }
    };
    let store = RedisStore::open(&url)
        .await
        .unwrap_or_else(|e| panic!("Failed to connect to redis at '{}': {}", url, e));
    Some(store)
}

fn unique_namespace(test: &str) -> String {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("clock after epoch")
        .as_nanos();
    format!("_tollbooth_test_{test}_{nanos}")
}

#[tokio::test]
async fn quota_is_consumed_then_limit_reached() {
    let Some(store) = store().await else { return };
    let tollbooth = Tollbooth::builder(store)
        .route(Route::new("/foo", Method::Get))
        .throttle_enabled(false)
        .namespace(unique_namespace("quota"))
        .build()
        .expect("valid tollbooth");
    let admin = tollbooth.admin();
    admin.set_limits(&[TokenLimit::new("tok", 5u64)]).await.expect("set limits");

    let req = ProtectRequest::new("get", "/foo").with_token("tok");
    for _ in 0..5 {
        assert_eq!(tollbooth.protect(&req).await.code, TollboothCode::Ok);
    }
    assert_eq!(tollbooth.protect(&req).await.code, TollboothCode::LimitReached);
    assert_eq!(admin.get_limit("tok").await.expect("get"), Quota::Exhausted);

    admin.evict().await.expect("cleanup failed");
}

#[tokio::test]
async fn unknown_token_is_unauthorized_without_counter() {
    let Some(store) = store().await else { return };
    let ns = unique_namespace("unauth");
    let tollbooth = Tollbooth::builder(store)
        .route(Route::wildcard(Method::Post))
        .namespace(ns.clone())
        .build()
        .expect("valid tollbooth");

    let res = tollbooth.protect(&ProtectRequest::new("post", "/any").with_token("ghost")).await;
    assert_eq!(res.code, TollboothCode::Unauthorized);
    assert_eq!(tollbooth.admin().evict().await.expect("evict"), 0);
}

#[tokio::test]
async fn unlimited_token_is_throttled_but_never_decremented() {
    let Some(store) = store().await else { return };
    let tollbooth = Tollbooth::builder(store)
        .route(Route::new("/foo", Method::Get))
        .throttle_interval_secs(60)
        .throttle_limit(2)
        .namespace(unique_namespace("unlimited"))
        .build()
        .expect("valid tollbooth");
    let admin = tollbooth.admin();
    admin.set_limits(&[TokenLimit::unlimited("vip")]).await.expect("set limits");

    let req = ProtectRequest::new("get", "/foo").with_token("vip");
    assert_eq!(tollbooth.protect(&req).await.code, TollboothCode::Ok);
    assert_eq!(tollbooth.protect(&req).await.code, TollboothCode::Ok);
    assert_eq!(tollbooth.protect(&req).await.code, TollboothCode::TooManyRequests);
    assert_eq!(admin.get_limit("vip").await.expect("get"), Quota::Unlimited);

    // quota table plus one throttle counter
    assert_eq!(admin.evict().await.expect("evict"), 2);
}

#[tokio::test]
async fn admin_round_trip_and_scoped_eviction() {
    let Some(store) = store().await else { return };
    let ns = Namespace::new(unique_namespace("admin")).expect("valid namespace");
    let other = Namespace::new(unique_namespace("admin_other")).expect("valid namespace");
    let admin = tollbooth::QuotaAdmin::new(store.clone(), ns);
    let other_admin = tollbooth::QuotaAdmin::new(store, other);

    admin
        .set_limits(&[TokenLimit::new("t1", 11u64), TokenLimit::new("t2", 3u64)])
        .await
        .expect("set limits");
    other_admin.set_limits(&[TokenLimit::new("t1", 1u64)]).await.expect("set limits");

    assert_eq!(admin.get_limit("t1").await.expect("get"), Quota::Remaining(11));
    admin.remove_limits(&["t1"]).await.expect("remove");
    assert_eq!(admin.get_limit("t1").await.expect("get"), Quota::Missing);

    admin.evict().await.expect("evict");
    assert_eq!(admin.get_limit("t2").await.expect("get"), Quota::Missing);
    assert_eq!(other_admin.get_limit("t1").await.expect("get"), Quota::Remaining(1));

    other_admin.evict().await.expect("cleanup failed");
}
