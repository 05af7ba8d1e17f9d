// std
use std::{
	collections::VecDeque,
	future::Future,
	pin::Pin,
	sync::{
		Arc,
		atomic::{AtomicBool, AtomicUsize, Ordering},
	},
	time::Duration as StdDuration,
};
// crates.io
use parking_lot::Mutex;
use serde_json::Value;
use tokio::{sync::Semaphore, task::JoinHandle};
// self
use bearer_dispatch::{
	api::{ApiDescriptor, RequestDescriptor},
	auth::{CredentialPair, TokenSecret},
	client::{ApiClient, ApiResponse},
	error::{Error, TransportError},
	http::{ApiHttpClient, PassthroughTransportErrorMapper},
	oauth2::{
		AsyncHttpClient, HttpClientError, HttpRequest, HttpResponse,
		http::{StatusCode, header::AUTHORIZATION},
	},
	refresh::RefreshFailure,
	store::{CredentialStore, KeyValueStorage, MemoryStorage, StoreError, StoreFuture},
	url::Url,
};

type FakeClient = ApiClient<FakeTransport, PassthroughTransportErrorMapper>;

const REFRESH_PATH: &str = "/auth/jwt/refresh";

/// Scripted API server: accepts exactly one access credential and answers refresh calls from
/// a queue, optionally holding them until the test opens the gate.
struct Script {
	accepted: Mutex<Option<String>>,
	always_unauthorized: bool,
	refresh_unreachable: bool,
	refresh_replies: Mutex<VecDeque<(u16, Value)>>,
	refresh_bodies: Mutex<Vec<Value>>,
	refresh_calls: AtomicUsize,
	api_calls: AtomicUsize,
	authorizations: Mutex<Vec<Option<String>>>,
	gate: Semaphore,
}
impl Script {
	fn new(gate_open: bool) -> Self {
		Self {
			accepted: Mutex::new(None),
			always_unauthorized: false,
			refresh_unreachable: false,
			refresh_replies: Mutex::new(VecDeque::new()),
			refresh_bodies: Mutex::new(Vec::new()),
			refresh_calls: AtomicUsize::new(0),
			api_calls: AtomicUsize::new(0),
			authorizations: Mutex::new(Vec::new()),
			gate: Semaphore::new(if gate_open { Semaphore::MAX_PERMITS } else { 0 }),
		}
	}

	fn always_unauthorized(mut self) -> Self {
		self.always_unauthorized = true;

		self
	}

	fn refresh_unreachable(mut self) -> Self {
		self.refresh_unreachable = true;

		self
	}

	fn reply_refresh(self, status: u16, body: Value) -> Self {
		self.refresh_replies.lock().push_back((status, body));

		self
	}

	fn refresh_calls(&self) -> usize {
		self.refresh_calls.load(Ordering::SeqCst)
	}

	fn api_calls(&self) -> usize {
		self.api_calls.load(Ordering::SeqCst)
	}

	async fn respond(&self, request: HttpRequest) -> HttpResponse {
		if request.uri().path() == REFRESH_PATH {
			return self.respond_refresh(request).await;
		}

		self.api_calls.fetch_add(1, Ordering::SeqCst);

		let authorization = request
			.headers()
			.get(AUTHORIZATION)
			.and_then(|value| value.to_str().ok())
			.map(str::to_owned);

		self.authorizations.lock().push(authorization.clone());

		let expected = self.accepted.lock().as_ref().map(|token| format!("Bearer {token}"));

		if self.always_unauthorized || expected.is_none() || authorization != expected {
			return response(401, serde_json::json!({ "detail": "token_not_valid" }));
		}

		response(200, serde_json::json!({ "path": request.uri().path() }))
	}

	async fn respond_refresh(&self, request: HttpRequest) -> HttpResponse {
		self.refresh_calls.fetch_add(1, Ordering::SeqCst);
		self.refresh_bodies
			.lock()
			.push(serde_json::from_slice(request.body()).unwrap_or(Value::Null));

		let _permit = self.gate.acquire().await.expect("Refresh gate should stay open.");
		let (status, body) = self
			.refresh_replies
			.lock()
			.pop_front()
			.unwrap_or((400, serde_json::json!({ "detail": "unscripted" })));

		if status == 200 {
			if let Some(access) = body.get("access").and_then(Value::as_str) {
				*self.accepted.lock() = Some(access.to_owned());
			}
		}

		response(status, body)
	}
}

#[derive(Clone)]
struct FakeTransport(Arc<Script>);
impl ApiHttpClient for FakeTransport {
	type Handle = FakeHandle;
	type TransportError = std::io::Error;

	fn handle(&self) -> Self::Handle {
		FakeHandle(self.0.clone())
	}
}

struct FakeHandle(Arc<Script>);
impl<'c> AsyncHttpClient<'c> for FakeHandle {
	type Error = HttpClientError<std::io::Error>;
	type Future = Pin<Box<dyn Future<Output = Result<HttpResponse, Self::Error>> + 'c + Send>>;

	fn call(&'c self, request: HttpRequest) -> Self::Future {
		Box::pin(async move {
			if self.0.refresh_unreachable && request.uri().path() == REFRESH_PATH {
				self.0.refresh_calls.fetch_add(1, Ordering::SeqCst);

				return Err(HttpClientError::Io(std::io::Error::other("connection reset")));
			}

			Ok(self.0.respond(request).await)
		})
	}
}

/// Memory-backed storage that can fail the next access-credential read or every
/// access-credential write.
#[derive(Default)]
struct FlakyStorage {
	inner: MemoryStorage,
	fail_next_access_read: AtomicBool,
	fail_access_writes: AtomicBool,
}
impl KeyValueStorage for FlakyStorage {
	fn get_item<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<String>> {
		if key == "token" && self.fail_next_access_read.swap(false, Ordering::SeqCst) {
			return Box::pin(async {
				Err::<Option<String>, _>(StoreError::Backend { message: "read".into() })
			});
		}

		self.inner.get_item(key)
	}

	fn set_item<'a>(&'a self, key: &'a str, value: String) -> StoreFuture<'a, ()> {
		if key == "token" && self.fail_access_writes.load(Ordering::SeqCst) {
			return Box::pin(async { Err::<(), _>(StoreError::Backend { message: "write".into() }) });
		}

		self.inner.set_item(key, value)
	}

	fn remove_item<'a>(&'a self, key: &'a str) -> StoreFuture<'a, ()> {
		self.inner.remove_item(key)
	}

	fn multi_remove<'a>(&'a self, keys: &'a [&'a str]) -> StoreFuture<'a, ()> {
		self.inner.multi_remove(keys)
	}
}

fn response(status: u16, body: Value) -> HttpResponse {
	let mut response = HttpResponse::new(body.to_string().into_bytes());

	*response.status_mut() = StatusCode::from_u16(status).expect("Fixture status should be valid.");

	response
}

fn granted(access: &str) -> Value {
	serde_json::json!({ "access": access })
}

fn rejected(detail: &str) -> Value {
	serde_json::json!({ "detail": detail })
}

fn build_client(script: &Arc<Script>, max_auth_retries: u32) -> (FakeClient, Arc<MemoryStorage>) {
	let storage = Arc::new(MemoryStorage::default());
	let client = build_client_over(script, max_auth_retries, storage.clone());

	(client, storage)
}

fn build_client_over(
	script: &Arc<Script>,
	max_auth_retries: u32,
	backend: Arc<dyn KeyValueStorage>,
) -> FakeClient {
	let descriptor =
		ApiDescriptor::builder(Url::parse("https://api.test").expect("Base URL should parse."))
			.max_auth_retries(max_auth_retries)
			.build()
			.expect("Descriptor should build.");

	ApiClient::with_http_client(
		Arc::new(CredentialStore::new(backend)),
		descriptor,
		FakeTransport(script.clone()),
		PassthroughTransportErrorMapper,
	)
}

async fn seed(client: &FakeClient, access: &str, refresh: &str) {
	client
		.sign_in_with(&CredentialPair::new(access, refresh))
		.await
		.expect("Seeding credentials should succeed.");
}

async fn eventually(mut condition: impl FnMut() -> bool) {
	tokio::time::timeout(StdDuration::from_secs(5), async {
		while !condition() {
			tokio::time::sleep(StdDuration::from_millis(5)).await;
		}
	})
	.await
	.expect("Condition should hold within the timeout.");
}

fn spawn_send(client: &FakeClient, path: String) -> JoinHandle<Result<ApiResponse, Error>> {
	let client = client.clone();

	tokio::spawn(async move { client.send(&RequestDescriptor::get(path)).await })
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_unauthorized_requests_share_one_refresh() {
	let script = Arc::new(Script::new(false).reply_refresh(200, granted("tokA")));
	let (client, storage) = build_client(&script, 3);

	seed(&client, "expired", "r-1").await;

	let handles: Vec<_> = (0..8).map(|i| spawn_send(&client, format!("/jobs/{i}"))).collect();

	eventually(|| script.refresh_calls() == 1 && client.coordinator().waiting() == 7).await;
	script.gate.add_permits(1);

	for handle in handles {
		let response =
			handle.await.expect("Task should not panic.").expect("Request should succeed.");

		assert_eq!(response.status, 200);
	}

	assert_eq!(script.refresh_calls(), 1);
	assert_eq!(
		script.refresh_bodies.lock().as_slice(),
		&[serde_json::json!({ "refresh": "r-1" })]
	);
	assert_eq!(storage.peek("token").as_deref(), Some("tokA"));
	assert_eq!(storage.peek("refreshToken").as_deref(), Some("r-1"));
	assert_eq!(client.refresh_metrics().attempts(), 1);
	assert_eq!(client.refresh_metrics().coalesced(), 7);

	let retried = script
		.authorizations
		.lock()
		.iter()
		.filter(|auth| auth.as_deref() == Some("Bearer tokA"))
		.count();

	assert_eq!(retried, 8);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn refresh_failure_is_broadcast_after_clearing_the_store() {
	let script = Arc::new(Script::new(false).reply_refresh(400, rejected("invalid_refresh")));
	let (client, storage) = build_client(&script, 3);

	seed(&client, "expired", "r-1").await;

	let handles: Vec<_> = (0..3).map(|i| spawn_send(&client, format!("/jobs/{i}"))).collect();

	eventually(|| script.refresh_calls() == 1 && client.coordinator().waiting() == 2).await;
	script.gate.add_permits(1);

	for handle in handles {
		let err = handle.await.expect("Task should not panic.").expect_err("Refresh should fail.");

		assert!(err.is_unauthorized());

		match err {
			Error::RefreshFailed(failure @ RefreshFailure::Rejected { status: 400, .. }) =>
				assert_eq!(failure.detail(), Some("invalid_refresh")),
			other => panic!("Unexpected error: {other:?}."),
		}
	}

	assert_eq!(script.refresh_calls(), 1);
	assert!(storage.is_empty());
	assert!(!client.is_signed_in().await);
}

#[tokio::test]
async fn a_failed_cycle_does_not_leak_into_the_next_one() {
	let script = Arc::new(
		Script::new(true)
			.reply_refresh(400, rejected("invalid_refresh"))
			.reply_refresh(200, granted("tokB")),
	);
	let (client, storage) = build_client(&script, 3);

	seed(&client, "expired", "r-1").await;

	let err = client
		.send(&RequestDescriptor::get("/jobs"))
		.await
		.expect_err("First cycle should fail.");

	assert!(matches!(err, Error::RefreshFailed(_)));
	assert!(storage.is_empty());

	seed(&client, "expired-2", "r-2").await;

	let response = client
		.send(&RequestDescriptor::get("/jobs"))
		.await
		.expect("Second cycle should succeed independently.");

	assert_eq!(response.status, 200);
	assert_eq!(script.refresh_calls(), 2);
	assert_eq!(script.refresh_bodies.lock()[1], serde_json::json!({ "refresh": "r-2" }));
	assert_eq!(storage.peek("token").as_deref(), Some("tokB"));
	assert_eq!(storage.peek("refreshToken").as_deref(), Some("r-2"));
}

#[tokio::test]
async fn retries_stop_at_the_configured_bound() {
	let mut script = Script::new(true).always_unauthorized();

	for i in 0..5 {
		script = script.reply_refresh(200, granted(&format!("tok-{i}")));
	}

	let script = Arc::new(script);
	let (client, _storage) = build_client(&script, 3);

	seed(&client, "expired", "r-1").await;

	let err = client
		.send(&RequestDescriptor::get("/jobs"))
		.await
		.expect_err("An always-401 server should exhaust the bound.");

	assert!(matches!(err, Error::Unauthorized { attempts: 3 }));
	assert!(err.is_unauthorized());
	assert_eq!(script.api_calls(), 4);
	assert_eq!(script.refresh_calls(), 3);
}

#[tokio::test]
async fn zero_retry_bound_never_refreshes() {
	let script = Arc::new(Script::new(true).always_unauthorized());
	let (client, storage) = build_client(&script, 0);

	seed(&client, "expired", "r-1").await;

	let err =
		client.send(&RequestDescriptor::get("/jobs")).await.expect_err("Request should fail.");

	assert!(matches!(err, Error::Unauthorized { attempts: 0 }));
	assert_eq!(script.refresh_calls(), 0);
	assert_eq!(storage.peek("token").as_deref(), Some("expired"));
}

#[tokio::test]
async fn missing_access_credential_is_recovered_through_refresh() {
	let script = Arc::new(Script::new(true).reply_refresh(200, granted("tokA")));
	let (client, storage) = build_client(&script, 3);

	storage.set_item("refreshToken", "r-1".into()).await.expect("Seeding should succeed.");

	let response = client
		.send(&RequestDescriptor::get("/auth/users/me/"))
		.await
		.expect("Request should succeed after refresh.");

	assert_eq!(response.status, 200);
	assert_eq!(*script.authorizations.lock(), vec![None, Some("Bearer tokA".to_owned())]);
	assert_eq!(storage.peek("token").as_deref(), Some("tokA"));
	assert_eq!(storage.peek("refreshToken").as_deref(), Some("r-1"));
}

#[tokio::test]
async fn missing_refresh_credential_fails_without_network_call() {
	let script = Arc::new(Script::new(true));
	let (client, storage) = build_client(&script, 3);

	storage.set_item("token", "expired".into()).await.expect("Seeding should succeed.");

	let err =
		client.send(&RequestDescriptor::get("/jobs")).await.expect_err("Request should fail.");

	assert!(matches!(err, Error::NoRefreshCredential));
	assert_eq!(script.refresh_calls(), 0);
	assert!(storage.is_empty());
}

#[tokio::test]
async fn rotated_credential_is_reused_without_calling_the_endpoint() {
	let script = Arc::new(Script::new(true));
	let (client, _storage) = build_client(&script, 3);

	seed(&client, "already-rotated", "r-1").await;

	let token = client
		.request_refresh(Some(&TokenSecret::new("rejected-earlier")))
		.await
		.expect("Rotated credential should be returned.");

	assert_eq!(token.expose(), "already-rotated");
	assert_eq!(script.refresh_calls(), 0);
	assert_eq!(client.refresh_metrics().attempts(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn dropping_the_driver_still_settles_waiters() {
	let script = Arc::new(Script::new(false).reply_refresh(200, granted("tokA")));
	let (client, storage) = build_client(&script, 3);

	seed(&client, "expired", "r-1").await;

	let driver = spawn_send(&client, "/jobs/driver".into());

	eventually(|| script.refresh_calls() == 1).await;

	let waiter = spawn_send(&client, "/jobs/waiter".into());

	eventually(|| client.coordinator().waiting() == 1).await;
	driver.abort();
	eventually(|| script.refresh_calls() == 2).await;
	script.gate.add_permits(1);

	let response = waiter
		.await
		.expect("Waiter task should not panic.")
		.expect("Waiter should be served by a replacement cycle.");

	assert_eq!(response.status, 200);
	assert!(driver.await.expect_err("Driver should be cancelled.").is_cancelled());
	assert_eq!(storage.peek("token").as_deref(), Some("tokA"));
	assert!(!client.coordinator().is_refreshing());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn sign_out_during_refresh_discards_the_late_credential() {
	let script = Arc::new(Script::new(false).reply_refresh(200, granted("tokA")));
	let (client, storage) = build_client(&script, 3);

	seed(&client, "expired", "r-1").await;

	let pending = spawn_send(&client, "/jobs".into());

	eventually(|| script.refresh_calls() == 1).await;
	client.logout().await.expect("Logout should succeed.");
	script.gate.add_permits(1);

	let err = pending
		.await
		.expect("Task should not panic.")
		.expect_err("Signed-out session should not be revived.");

	assert!(matches!(err, Error::NoRefreshCredential));
	assert!(storage.is_empty());
}

#[tokio::test]
async fn unreadable_access_credential_still_reaches_the_refresh_endpoint() {
	let script = Arc::new(Script::new(true).reply_refresh(200, granted("fresh")));
	let storage = Arc::new(FlakyStorage::default());
	let client = build_client_over(&script, 1, storage.clone());

	seed(&client, "expired", "r-1").await;
	storage.fail_next_access_read.store(true, Ordering::SeqCst);

	let response = client
		.send(&RequestDescriptor::get("/jobs"))
		.await
		.expect("Request should succeed after one refresh.");

	assert_eq!(response.status, 200);
	assert_eq!(script.refresh_calls(), 1);
	assert_eq!(*script.authorizations.lock(), vec![None, Some("Bearer fresh".to_owned())]);
	assert_eq!(storage.inner.peek("token").as_deref(), Some("fresh"));
}

#[tokio::test]
async fn malformed_refresh_body_clears_the_store() {
	for body in [serde_json::json!({ "token": "x" }), serde_json::json!({ "access": "" })] {
		let script = Arc::new(Script::new(true).reply_refresh(200, body));
		let (client, storage) = build_client(&script, 3);

		seed(&client, "expired", "r-1").await;

		let err = client
			.send(&RequestDescriptor::get("/jobs"))
			.await
			.expect_err("A refresh body without an access credential should fail.");

		assert!(
			matches!(err, Error::RefreshFailed(RefreshFailure::MalformedBody { status: 200, .. })),
			"Unexpected error: {err:?}."
		);
		assert_eq!(script.refresh_calls(), 1);
		assert!(storage.is_empty());
	}
}

#[tokio::test]
async fn unreachable_refresh_endpoint_clears_the_store() {
	let script = Arc::new(Script::new(true).refresh_unreachable());
	let (client, storage) = build_client(&script, 3);

	seed(&client, "expired", "r-1").await;

	let err = client
		.send(&RequestDescriptor::get("/jobs"))
		.await
		.expect_err("A refresh that never reaches the endpoint should fail.");

	match &err {
		Error::RefreshFailed(RefreshFailure::Request(cause)) =>
			assert!(matches!(cause.as_ref(), Error::Transport(TransportError::Io(_)))),
		other => panic!("Unexpected error: {other:?}."),
	}

	assert!(err.is_unauthorized());
	assert_eq!(script.refresh_calls(), 1);
	assert!(storage.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn persistence_failure_reaches_every_waiter_and_keeps_the_session() {
	let script = Arc::new(Script::new(false).reply_refresh(200, granted("tokA")));
	let storage = Arc::new(FlakyStorage::default());
	let client = build_client_over(&script, 3, storage.clone());

	seed(&client, "expired", "r-1").await;
	storage.fail_access_writes.store(true, Ordering::SeqCst);

	let handles: Vec<_> = (0..3).map(|i| spawn_send(&client, format!("/jobs/{i}"))).collect();

	eventually(|| script.refresh_calls() == 1 && client.coordinator().waiting() == 2).await;
	script.gate.add_permits(1);

	for handle in handles {
		let err = handle
			.await
			.expect("Task should not panic.")
			.expect_err("Persisting the new credential should fail.");

		assert!(matches!(err, Error::Storage(StoreError::Backend { .. })), "Unexpected error: {err:?}.");
		assert!(!err.is_unauthorized());
	}

	assert_eq!(script.refresh_calls(), 1);
	assert_eq!(storage.inner.peek("token").as_deref(), Some("expired"));
	assert_eq!(storage.inner.peek("refreshToken").as_deref(), Some("r-1"));
	assert!(!client.coordinator().is_refreshing());
}
