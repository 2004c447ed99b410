//! Thread-safe in-memory stores for tests and single-process hosts.

// self
use crate::{
	_prelude::*,
	store::{CookieStore, SessionStore, StoreFuture},
};

type SessionMap = Arc<RwLock<HashMap<String, String>>>;
type CookieMap = Arc<RwLock<HashMap<String, StoredCookie>>>;

#[derive(Clone, Debug)]
struct StoredCookie {
	value: String,
	expires_at: OffsetDateTime,
}

/// In-process [`SessionStore`] keeping values behind an [`RwLock`].
#[derive(Clone, Debug, Default)]
pub struct MemorySession(SessionMap);
impl SessionStore for MemorySession {
	fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<String>> {
		let map = self.0.clone();

		Box::pin(async move { Ok(map.read().get(key).cloned()) })
	}

	fn put<'a>(&'a self, key: &'a str, value: String) -> StoreFuture<'a, ()> {
		let map = self.0.clone();

		Box::pin(async move {
			map.write().insert(key.to_owned(), value);

			Ok(())
		})
	}

	fn remove<'a>(&'a self, key: &'a str) -> StoreFuture<'a, ()> {
		let map = self.0.clone();

		Box::pin(async move {
			map.write().remove(key);

			Ok(())
		})
	}
}

/// In-process [`CookieStore`] that honors expiry on read.
#[derive(Clone, Debug, Default)]
pub struct MemoryCookieJar(CookieMap);
impl MemoryCookieJar {
	fn get_now(map: CookieMap, name: &str) -> Option<String> {
		let now = OffsetDateTime::now_utc();

		map.read()
			.get(name)
			.filter(|cookie| cookie.expires_at > now)
			.map(|cookie| cookie.value.clone())
	}
}
impl CookieStore for MemoryCookieJar {
	fn get<'a>(&'a self, name: &'a str) -> StoreFuture<'a, Option<String>> {
		let map = self.0.clone();

		Box::pin(async move { Ok(Self::get_now(map, name)) })
	}

	fn set<'a>(&'a self, name: &'a str, value: String, ttl: Duration) -> StoreFuture<'a, ()> {
		let map = self.0.clone();

		Box::pin(async move {
			let cookie = StoredCookie { value, expires_at: OffsetDateTime::now_utc() + ttl };

			map.write().insert(name.to_owned(), cookie);

			Ok(())
		})
	}

	fn clear<'a>(&'a self, name: &'a str) -> StoreFuture<'a, ()> {
		let map = self.0.clone();

		Box::pin(async move {
			map.write().remove(name);

			Ok(())
		})
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[tokio::test]
	async fn session_round_trips_values() {
		let session = MemorySession::default();

		session.put("key", "value".into()).await.expect("Put must succeed.");

		assert_eq!(session.get("key").await.expect("Get must succeed."), Some("value".into()));

		session.remove("key").await.expect("Remove must succeed.");

		assert_eq!(session.get("key").await.expect("Get must succeed."), None);
	}

	#[tokio::test]
	async fn expired_cookies_read_as_absent() {
		let jar = MemoryCookieJar::default();

		jar.set("token", "live".into(), Duration::minutes(5)).await.expect("Set must succeed.");

		assert_eq!(jar.get("token").await.expect("Get must succeed."), Some("live".into()));

		jar.set("token", "dead".into(), Duration::seconds(-1)).await.expect("Set must succeed.");

		assert_eq!(jar.get("token").await.expect("Get must succeed."), None);
	}
}
