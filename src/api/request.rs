// crates.io
use oauth2::{
	HttpRequest,
	http::{
		Method as HttpMethod, Request,
		header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
	},
};
use url::form_urlencoded;
// self
use crate::{_prelude::*, api::ApiDescriptor, auth::TokenSecret, error::ConfigError};

const MIME_JSON: &str = "application/json";
const MIME_FORM: &str = "application/x-www-form-urlencoded";

/// HTTP methods the dispatcher issues.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
	/// `GET`
	Get,
	/// `POST`
	Post,
	/// `PUT`
	Put,
	/// `PATCH`
	Patch,
	/// `DELETE`
	Delete,
}
impl Method {
	/// Returns the wire name of the method.
	pub const fn as_str(self) -> &'static str {
		match self {
			Method::Get => "GET",
			Method::Post => "POST",
			Method::Put => "PUT",
			Method::Patch => "PATCH",
			Method::Delete => "DELETE",
		}
	}

	fn as_http(self) -> HttpMethod {
		match self {
			Method::Get => HttpMethod::GET,
			Method::Post => HttpMethod::POST,
			Method::Put => HttpMethod::PUT,
			Method::Patch => HttpMethod::PATCH,
			Method::Delete => HttpMethod::DELETE,
		}
	}
}
impl Display for Method {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Request payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Body {
	/// JSON document sent as `application/json`.
	Json(serde_json::Value),
	/// Ordered pairs sent as `application/x-www-form-urlencoded`.
	Form(Vec<(String, String)>),
}

/// Description of one API call, re-issued verbatim on every retry.
#[derive(Clone, Debug, PartialEq)]
pub struct RequestDescriptor {
	method: Method,
	path: String,
	query: Vec<(String, String)>,
	body: Option<Body>,
	headers: Vec<(String, String)>,
	authenticated: bool,
}
impl RequestDescriptor {
	/// Creates an authenticated descriptor without body or query parameters.
	pub fn new(method: Method, path: impl Into<String>) -> Self {
		Self {
			method,
			path: path.into(),
			query: Vec::new(),
			body: None,
			headers: Vec::new(),
			authenticated: true,
		}
	}

	/// `GET` descriptor.
	pub fn get(path: impl Into<String>) -> Self {
		Self::new(Method::Get, path)
	}

	/// `POST` descriptor.
	pub fn post(path: impl Into<String>) -> Self {
		Self::new(Method::Post, path)
	}

	/// `PUT` descriptor.
	pub fn put(path: impl Into<String>) -> Self {
		Self::new(Method::Put, path)
	}

	/// `PATCH` descriptor.
	pub fn patch(path: impl Into<String>) -> Self {
		Self::new(Method::Patch, path)
	}

	/// `DELETE` descriptor.
	pub fn delete(path: impl Into<String>) -> Self {
		Self::new(Method::Delete, path)
	}

	/// Serializes `body` as the JSON payload.
	pub fn with_json<T>(self, body: &T) -> Result<Self, ConfigError>
	where
		T: ?Sized + Serialize,
	{
		let value = serde_json::to_value(body).map_err(ConfigError::BodyEncode)?;

		Ok(self.with_json_value(value))
	}

	/// Uses an already-built JSON value as the payload.
	pub fn with_json_value(mut self, value: serde_json::Value) -> Self {
		self.body = Some(Body::Json(value));

		self
	}

	/// Sends the pairs as a URL-encoded form.
	pub fn with_form<I, K, V>(mut self, pairs: I) -> Self
	where
		I: IntoIterator<Item = (K, V)>,
		K: Into<String>,
		V: Into<String>,
	{
		self.body = Some(Body::Form(pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect()));

		self
	}

	/// Appends a query parameter.
	pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
		self.query.push((key.into(), value.into()));

		self
	}

	/// Appends an extra header.
	pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		self.headers.push((name.into(), value.into()));

		self
	}

	/// Marks the call as anonymous: no credential is attached and a 401 is not refreshed.
	pub fn anonymous(mut self) -> Self {
		self.authenticated = false;

		self
	}

	/// HTTP method.
	pub fn method(&self) -> Method {
		self.method
	}

	/// Path relative to the API base URL.
	pub fn path(&self) -> &str {
		&self.path
	}

	/// Query parameters in insertion order.
	pub fn query(&self) -> &[(String, String)] {
		&self.query
	}

	/// Payload, if any.
	pub fn body(&self) -> Option<&Body> {
		self.body.as_ref()
	}

	/// Extra headers in insertion order.
	pub fn headers(&self) -> &[(String, String)] {
		&self.headers
	}

	/// Whether the access credential is attached.
	pub fn is_authenticated(&self) -> bool {
		self.authenticated
	}
}

/// Builds the wire request for `descriptor`.
///
/// Pure: the same inputs always yield the same request, which is what lets the dispatcher
/// rebuild a request after a refresh with nothing but a new credential.
pub fn build_request(
	api: &ApiDescriptor,
	descriptor: &RequestDescriptor,
	credential: Option<&TokenSecret>,
) -> Result<HttpRequest, ConfigError> {
	let mut url = api.resolve(descriptor.path())?;

	if !descriptor.query().is_empty() {
		url.query_pairs_mut().extend_pairs(descriptor.query());
	}

	let mut builder = Request::builder()
		.method(descriptor.method().as_http())
		.uri(url.as_str())
		.header(ACCEPT, MIME_JSON);
	let body = match descriptor.body() {
		Some(Body::Json(value)) => {
			builder = builder.header(CONTENT_TYPE, MIME_JSON);

			serde_json::to_vec(value).map_err(ConfigError::BodyEncode)?
		},
		Some(Body::Form(pairs)) => {
			builder = builder.header(CONTENT_TYPE, MIME_FORM);

			form_urlencoded::Serializer::new(String::new()).extend_pairs(pairs).finish().into_bytes()
		},
		None => Vec::new(),
	};
	let credential = credential.filter(|_| descriptor.is_authenticated());

	if let Some(token) = credential {
		builder = builder.header(AUTHORIZATION, token.authorization(&api.auth_scheme));
	}
	for (name, value) in descriptor.headers() {
		builder = builder.header(name.as_str(), value.as_str());
	}

	Ok(builder.body(body)?)
}
