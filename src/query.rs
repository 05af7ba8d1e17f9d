//! Cache-keyed query and mutation wrappers for the data-fetching layer.
//!
//! The cache itself lives outside this crate. Queries expose a deterministic [`QueryKey`] the
//! cache can store results under, and mutations report the keys they make stale through a
//! [`CacheInvalidator`].

// crates.io
use serde_json::Value;
// self
use crate::{
	_prelude::*,
	api::{Body, RequestDescriptor},
	client::ApiClient,
	http::{ApiHttpClient, TransportErrorMapper},
};

type DescriptorFactory<I> = Arc<dyn Fn(&I) -> Result<RequestDescriptor> + Send + Sync>;

/// Ordered cache key segments.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueryKey(Vec<String>);
impl QueryKey {
	/// Creates a key from explicit segments.
	pub fn new<I, S>(segments: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		Self(segments.into_iter().map(Into::into).collect())
	}

	/// Derives `[METHOD, path, canonical-json(query + body)]` from a request descriptor.
	///
	/// Object keys are sorted while encoding, so two descriptors built with the same data in a
	/// different field order share a key.
	pub fn for_request(descriptor: &RequestDescriptor) -> Self {
		let mut params = serde_json::Map::new();

		if !descriptor.query().is_empty() {
			let mut query = descriptor.query().to_vec();

			query.sort_by(|a, b| a.0.cmp(&b.0));
			params.insert("query".into(), pairs_to_value(&query));
		}
		if let Some(body) = descriptor.body() {
			let body = match body {
				Body::Json(value) => value.clone(),
				Body::Form(pairs) => pairs_to_value(pairs),
			};

			params.insert("body".into(), body);
		}

		let mut canonical = String::new();

		write_canonical(&Value::Object(params), &mut canonical);

		Self(vec![descriptor.method().as_str().to_owned(), descriptor.path().to_owned(), canonical])
	}

	/// Prepends `prefix` segments.
	pub fn with_prefix<I, S>(self, prefix: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		let mut segments: Vec<String> = prefix.into_iter().map(Into::into).collect();

		segments.extend(self.0);

		Self(segments)
	}

	/// Key segments in order.
	pub fn segments(&self) -> &[String] {
		&self.0
	}

	/// Whether `prefix` is a leading run of this key's segments, for prefix invalidation.
	pub fn starts_with(&self, prefix: &QueryKey) -> bool {
		self.0.starts_with(&prefix.0)
	}
}
impl Display for QueryKey {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		Display::fmt(&Value::from(self.0.clone()), f)
	}
}

/// Receives the keys a mutation made stale.
pub trait CacheInvalidator
where
	Self: Send + Sync,
{
	/// Marks every cached entry under `key` as stale.
	fn invalidate(&self, key: &QueryKey);
}
impl<F> CacheInvalidator for F
where
	F: Fn(&QueryKey) + Send + Sync,
{
	fn invalidate(&self, key: &QueryKey) {
		self(key)
	}
}

/// Invalidator for callers without a cache.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopInvalidator;
impl CacheInvalidator for NoopInvalidator {
	fn invalidate(&self, _: &QueryKey) {}
}

/// Cacheable read: a request descriptor plus the key its result is cached under.
///
/// Retrying is left to the caller's cache layer; [`Error::is_retryable`] tells it which
/// failures are worth another attempt.
pub struct Query<T> {
	descriptor: RequestDescriptor,
	key: QueryKey,
	_marker: PhantomData<fn() -> T>,
}
impl<T> Query<T>
where
	T: DeserializeOwned,
{
	/// Creates a query keyed by [`QueryKey::for_request`].
	pub fn new(descriptor: RequestDescriptor) -> Self {
		let key = QueryKey::for_request(&descriptor);

		Self { descriptor, key, _marker: PhantomData }
	}

	/// Prepends caller segments to the key (for example `["auth"]`).
	pub fn with_key_prefix<I, S>(mut self, prefix: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.key = self.key.with_prefix(prefix);

		self
	}

	/// Cache key.
	pub fn key(&self) -> &QueryKey {
		&self.key
	}

	/// Request issued on every fetch.
	pub fn descriptor(&self) -> &RequestDescriptor {
		&self.descriptor
	}

	/// Runs the request through `client` and decodes the result.
	pub async fn fetch<C, M>(&self, client: &ApiClient<C, M>) -> Result<T>
	where
		C: ?Sized + ApiHttpClient,
		M: ?Sized + TransportErrorMapper<C::TransportError>,
	{
		client.send_json(&self.descriptor).await
	}
}
impl<T> Clone for Query<T> {
	fn clone(&self) -> Self {
		Self { descriptor: self.descriptor.clone(), key: self.key.clone(), _marker: PhantomData }
	}
}
impl<T> Debug for Query<T> {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Query")
			.field("key", &self.key)
			.field("descriptor", &self.descriptor)
			.finish()
	}
}

/// One-shot write that invalidates cached queries once it completes.
pub struct Mutation<I, O> {
	build: DescriptorFactory<I>,
	invalidates: Vec<QueryKey>,
	invalidate_on_error: bool,
	_marker: PhantomData<fn() -> O>,
}
impl<I, O> Mutation<I, O>
where
	O: DeserializeOwned,
{
	/// Creates a mutation whose request is built from its input by `build`.
	pub fn new<F>(build: F) -> Self
	where
		F: 'static + Send + Sync + Fn(&I) -> Result<RequestDescriptor>,
	{
		Self {
			build: Arc::new(build),
			invalidates: Vec::new(),
			invalidate_on_error: false,
			_marker: PhantomData,
		}
	}

	/// Declares a key made stale by this mutation.
	pub fn invalidates(mut self, key: QueryKey) -> Self {
		self.invalidates.push(key);

		self
	}

	/// Also invalidates the declared keys when the request fails.
	pub fn invalidate_on_error(mut self, enabled: bool) -> Self {
		self.invalidate_on_error = enabled;

		self
	}

	/// Keys invalidated after the mutation runs.
	pub fn invalidated_keys(&self) -> &[QueryKey] {
		&self.invalidates
	}

	/// Builds the request for `input`, sends it once, and invalidates the declared keys.
	///
	/// A descriptor that cannot be built is returned as-is: nothing was sent, so nothing is
	/// invalidated.
	pub async fn execute<C, M>(
		&self,
		client: &ApiClient<C, M>,
		input: &I,
		cache: &dyn CacheInvalidator,
	) -> Result<O>
	where
		C: ?Sized + ApiHttpClient,
		M: ?Sized + TransportErrorMapper<C::TransportError>,
	{
		let descriptor = (self.build)(input)?;
		let result = client.send_json::<O>(&descriptor).await;

		if result.is_ok() || self.invalidate_on_error {
			for key in &self.invalidates {
				cache.invalidate(key);
			}
		}

		result
	}
}
impl<I, O> Clone for Mutation<I, O> {
	fn clone(&self) -> Self {
		Self {
			build: self.build.clone(),
			invalidates: self.invalidates.clone(),
			invalidate_on_error: self.invalidate_on_error,
			_marker: PhantomData,
		}
	}
}
impl<I, O> Debug for Mutation<I, O> {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Mutation")
			.field("invalidates", &self.invalidates)
			.field("invalidate_on_error", &self.invalidate_on_error)
			.finish_non_exhaustive()
	}
}

fn pairs_to_value(pairs: &[(String, String)]) -> Value {
	pairs.iter().map(|(k, v)| Value::from(vec![k.clone(), v.clone()])).collect()
}

fn write_canonical(value: &Value, out: &mut String) {
	match value {
		Value::Object(map) => {
			let mut entries: Vec<_> = map.iter().collect();

			entries.sort_by(|a, b| a.0.cmp(b.0));
			out.push('{');

			for (i, (key, value)) in entries.into_iter().enumerate() {
				if i > 0 {
					out.push(',');
				}

				out.push_str(&Value::String(key.clone()).to_string());
				out.push(':');
				write_canonical(value, out);
			}

			out.push('}');
		},
		Value::Array(items) => {
			out.push('[');

			for (i, item) in items.iter().enumerate() {
				if i > 0 {
					out.push(',');
				}

				write_canonical(item, out);
			}

			out.push(']');
		},
		other => out.push_str(&other.to_string()),
	}
}
