use courier_application::command_bus::CommandBus;
use courier_application::context::AppContext;
use courier_application::error::AppError;
use courier_application::send_sms::{DEFAULT_IDEMPOTENCY_CAPACITY, DEFAULT_IDEMPOTENCY_TTL};
use courier_application::{InMemoryCommandBus, SendSms, SendSmsHandler};
use courier_domain::conversation::conversation_id;
use courier_domain::delivery::{Carrier, CarrierResponse, DeliveryPipeline, OutboundMessage};
use courier_domain::error::{DomainError, DomainResult};
use courier_domain::persist::InMemoryOutcomeRepository;
use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// 首次提交返回 queued，之后每次轮询都返回 delivered
#[derive(Default)]
struct QueuedThenDelivered {
    submits: AtomicUsize,
}

#[async_trait::async_trait]
impl Carrier for QueuedThenDelivered {
    async fn submit(&self, message: &OutboundMessage) -> DomainResult<CarrierResponse> {
        self.submits.fetch_add(1, Ordering::SeqCst);
        if message.to() == "+15559999999" {
            return Ok(CarrierResponse::new(
                400,
                json!({"code": 21211, "message": "Invalid 'To' Phone Number"}),
            ));
        }
        Ok(CarrierResponse::new(
            201,
            json!({"sid": "SM1", "status": "queued", "to": message.to(), "from": message.from()}),
        )
        .with_headers([("Twilio-Request-Id", "RQ1")]))
    }

    async fn poll_status(&self, carrier_ref: &str) -> DomainResult<CarrierResponse> {
        Ok(CarrierResponse::new(
            200,
            json!({"sid": carrier_ref, "status": "delivered"}),
        ))
    }
}

fn setup() -> (
    InMemoryCommandBus,
    Arc<QueuedThenDelivered>,
    Arc<InMemoryOutcomeRepository>,
) {
    let (bus, carrier, repo, _handler) =
        setup_with_limits(DEFAULT_IDEMPOTENCY_TTL, DEFAULT_IDEMPOTENCY_CAPACITY);
    (bus, carrier, repo)
}

fn setup_with_limits(
    ttl: Duration,
    capacity: usize,
) -> (
    InMemoryCommandBus,
    Arc<QueuedThenDelivered>,
    Arc<InMemoryOutcomeRepository>,
    Arc<SendSmsHandler>,
) {
    let carrier = Arc::new(QueuedThenDelivered::default());
    let repo = Arc::new(InMemoryOutcomeRepository::new());
    let pipeline = DeliveryPipeline::builder()
        .carrier(carrier.clone())
        .repository(repo.clone())
        .build();
    let handler = Arc::new(
        SendSmsHandler::new(Arc::new(pipeline)).with_idempotency_limits(ttl, capacity),
    );

    let bus = InMemoryCommandBus::new();
    bus.register::<SendSms, _>(handler.clone())
        .expect("register SendSms");
    (bus, carrier, repo, handler)
}

fn keyed(key: &str) -> AppContext {
    AppContext::builder()
        .correlation_id(format!("cor-{key}"))
        .idempotency_key(key.into())
        .build()
}

fn sms(to: &str) -> SendSms {
    SendSms {
        to: to.into(),
        from: "+15550002222".into(),
        body: "hello".into(),
    }
}

#[tokio::test(start_paused = true)]
async fn send_sms_runs_pipeline_and_persists() {
    let (bus, carrier, repo) = setup();

    let result = bus
        .dispatch(&AppContext::correlated(), sms("+15550001111"))
        .await
        .unwrap();

    assert_eq!(result.status, "delivered");
    assert_eq!(result.delivery_status, "delivered");
    assert_eq!(result.delivery_poll_count, 1);
    assert_eq!(result.external_sid.as_deref(), Some("SM1"));
    assert_eq!(result.request_id.as_deref(), Some("RQ1"));
    assert_eq!(
        result.conversation_id,
        conversation_id("+15550001111", "+15550002222")
    );
    assert_eq!(carrier.submits.load(Ordering::SeqCst), 1);
    assert!(repo.get(&result.message_id).is_some());

    let encoded = serde_json::to_value(&result).unwrap();
    assert_eq!(encoded["status"], "delivered");
}

#[tokio::test(start_paused = true)]
async fn idempotency_key_prevents_second_send() {
    let (bus, carrier, repo) = setup();
    let ctx = keyed("idem-1");

    let first = bus.dispatch(&ctx, sms("+15550001111")).await.unwrap();
    let second = bus.dispatch(&ctx, sms("+15550001111")).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(carrier.submits.load(Ordering::SeqCst), 1);
    assert_eq!(repo.len(), 1);
}

#[tokio::test]
async fn invalid_command_never_reaches_carrier() {
    let (bus, carrier, _repo) = setup();

    let err = bus
        .dispatch(&AppContext::default(), sms(""))
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::Validation(_)));
    assert_eq!(carrier.submits.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn carrier_rejection_surfaces_as_domain_error() {
    let (bus, _carrier, repo) = setup();

    let err = bus
        .dispatch(&AppContext::default(), sms("+15559999999"))
        .await
        .unwrap_err();

    match err {
        AppError::Domain(DomainError::CarrierRejected {
            status_code, code, ..
        }) => {
            assert_eq!(status_code, 400);
            assert_eq!(code, Some(21211));
        }
        other => panic!("unexpected {other:?}"),
    }
    assert!(repo.is_empty());
}

#[tokio::test(start_paused = true)]
async fn concurrent_requests_with_same_key_send_once() {
    let (bus, carrier, repo) = setup();
    let ctx = keyed("idem-race");

    let (first, second) = tokio::join!(
        bus.dispatch(&ctx, sms("+15550001111")),
        bus.dispatch(&ctx, sms("+15550001111")),
    );

    assert_eq!(first.unwrap(), second.unwrap());
    assert_eq!(carrier.submits.load(Ordering::SeqCst), 1);
    assert_eq!(repo.len(), 1);
}

#[tokio::test]
async fn failed_send_releases_idempotency_key() {
    let (bus, carrier, repo, handler) =
        setup_with_limits(DEFAULT_IDEMPOTENCY_TTL, DEFAULT_IDEMPOTENCY_CAPACITY);
    let ctx = keyed("idem-rejected");

    for _ in 0..2 {
        let err = bus.dispatch(&ctx, sms("+15559999999")).await.unwrap_err();
        assert!(matches!(err, AppError::Domain(DomainError::CarrierRejected { .. })));
    }

    assert_eq!(carrier.submits.load(Ordering::SeqCst), 2);
    assert_eq!(handler.idempotency_keys(), 0);
    assert!(repo.is_empty());
}

#[tokio::test(start_paused = true)]
async fn completed_keys_expire_and_stay_bounded() {
    let (bus, carrier, repo, handler) = setup_with_limits(Duration::from_secs(60), 2);

    bus.dispatch(&keyed("a"), sms("+15550001111")).await.unwrap();
    bus.dispatch(&keyed("a"), sms("+15550001111")).await.unwrap();
    assert_eq!(carrier.submits.load(Ordering::SeqCst), 1);

    // 超过上限时淘汰最早完成的键
    bus.dispatch(&keyed("b"), sms("+15550001111")).await.unwrap();
    bus.dispatch(&keyed("c"), sms("+15550001111")).await.unwrap();
    assert_eq!(handler.idempotency_keys(), 2);
    assert_eq!(carrier.submits.load(Ordering::SeqCst), 3);

    // 过期后同一个键重新发送
    tokio::time::advance(Duration::from_secs(61)).await;
    bus.dispatch(&keyed("c"), sms("+15550001111")).await.unwrap();
    assert_eq!(carrier.submits.load(Ordering::SeqCst), 4);
    assert_eq!(handler.idempotency_keys(), 1);
    assert_eq!(repo.len(), 4);
}
