use std::task::{Context, Poll};
use tollbooth::telemetry::{AdmissionEvent, MemorySink, TelemetrySink};
use tollbooth::{MemoryStore, Method, ProtectRequest, Route, TokenLimit, Tollbooth, TollboothCode};

fn tollbooth_with(sink: MemorySink) -> Tollbooth<MemoryStore> {
    Tollbooth::builder(MemoryStore::new())
        .route(Route::new("/foo", Method::Get))
        .throttle_enabled(false)
        .sink(sink)
        .build()
        .unwrap()
}

#[tokio::test]
async fn one_event_per_protected_decision() {
    let sink = MemorySink::new();
    let tb = tollbooth_with(sink.clone());
    tb.admin().set_limits(&[TokenLimit::new("tok", 1u64)]).await.unwrap();

    let req = ProtectRequest::new("get", "/foo").with_token("tok");
    tb.protect(&req).await;
    tb.protect(&req).await;
    tb.protect(&ProtectRequest::new("get", "/foo")).await;
    tb.protect(&ProtectRequest::new("get", "/elsewhere").with_token("tok")).await;

    let events = sink.events();
    let codes: Vec<_> = events.iter().map(|e| e.code).collect();
    assert_eq!(
        codes,
        vec![TollboothCode::Ok, TollboothCode::LimitReached, TollboothCode::Unauthorized]
    );
    assert_eq!(
        events[0],
        AdmissionEvent {
            token: Some("tok".into()),
            method: "get".into(),
            path: "/foo".into(),
            code: TollboothCode::Ok,
        }
    );
    assert_eq!(events[2].token, None);
    assert!(events[0].is_admitted());
}

#[tokio::test]
async fn bounded_sink_keeps_latest() {
    let sink = MemorySink::with_capacity(2);
    let tb = tollbooth_with(sink.clone());

    for _ in 0..5 {
        tb.protect(&ProtectRequest::new("get", "/foo")).await;
    }
    assert_eq!(sink.len(), 2);
    assert_eq!(sink.evicted(), 3);
}

#[derive(Clone)]
struct Unreachable;

impl tower::Service<AdmissionEvent> for Unreachable {
    type Response = ();
    type Error = std::io::Error;
    type Future = std::future::Ready<Result<(), Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, _event: AdmissionEvent) -> Self::Future {
        std::future::ready(Err(std::io::Error::new(std::io::ErrorKind::Other, "collector down")))
    }
}

impl TelemetrySink for Unreachable {
    type SinkError = std::io::Error;
}

#[tokio::test]
async fn failing_sink_does_not_affect_decisions() {
    let tb = Tollbooth::builder(MemoryStore::new())
        .route(Route::new("/foo", Method::Get))
        .throttle_enabled(false)
        .sink(Unreachable)
        .build()
        .unwrap();
    tb.admin().set_limits(&[TokenLimit::new("tok", 1u64)]).await.unwrap();

    let req = ProtectRequest::new("get", "/foo").with_token("tok");
    assert_eq!(tb.protect(&req).await.code, TollboothCode::Ok);
    assert_eq!(tb.protect(&req).await.code, TollboothCode::LimitReached);
    assert_eq!(
        tb.protect(&ProtectRequest::new("get", "/foo")).await.code,
        TollboothCode::Unauthorized
    );
}

#[tokio::test]
async fn sink_counts_by_code() {
    let sink = MemorySink::new();
    let tb = tollbooth_with(sink.clone());
    tb.admin().set_limits(&[TokenLimit::new("tok", 2u64)]).await.unwrap();

    let req = ProtectRequest::new("get", "/foo").with_token("tok");
    for _ in 0..3 {
        tb.protect(&req).await;
    }
    tb.protect(&ProtectRequest::new("get", "/foo")).await;

    assert_eq!(sink.admitted(), 2);
    assert_eq!(sink.count(TollboothCode::LimitReached), 1);
    assert_eq!(sink.for_token(None).len(), 1);
    assert_eq!(sink.for_token(Some("tok")).len(), 3);
}
