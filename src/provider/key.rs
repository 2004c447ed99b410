//! Strongly typed provider and registry identifiers.

// std
use std::{borrow::Borrow, ops::Deref};
// self
use crate::_prelude::*;

const KEY_MAX_LEN: usize = 64;
const STRATEGY_KEY_SUFFIX: &str = "_oauth";

/// Error returned when provider key validation fails.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, ThisError)]
pub enum ProviderKeyError {
	/// The key was empty.
	#[error("Provider key cannot be empty.")]
	Empty,
	/// The key contains a character outside the identifier alphabet.
	#[error("Provider key `{key}` contains `{found}`; only lowercase letters, digits, `_` and `-` are allowed.")]
	InvalidCharacter {
		/// The offending key, after case normalization.
		key: String,
		/// First rejected character.
		found: char,
	},
	/// The key exceeded the allowed character count.
	#[error("Provider key exceeds {max} characters.")]
	TooLong {
		/// Maximum permitted character count.
		max: usize,
	},
}

/// Identifier of one declared provider (e.g. `example`, `github`).
///
/// Construction case-normalizes to lowercase and enforces identifier form, so
/// `Example` and `example` name the same provider and malformed keys are
/// rejected before any registry state exists.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ProviderKey(String);
impl ProviderKey {
	/// Creates a new provider key after normalization and validation.
	pub fn new(value: impl AsRef<str>) -> Result<Self, ProviderKeyError> {
		let normalized = value.as_ref().to_ascii_lowercase();

		validate_view(&normalized)?;

		Ok(Self(normalized))
	}

	/// Derives the registry key this provider's strategy is published under.
	pub fn strategy_key(&self) -> StrategyKey {
		StrategyKey(format!("{}{STRATEGY_KEY_SUFFIX}", self.0))
	}
}
impl Deref for ProviderKey {
	type Target = str;

	fn deref(&self) -> &Self::Target {
		&self.0
	}
}
impl AsRef<str> for ProviderKey {
	fn as_ref(&self) -> &str {
		&self.0
	}
}
impl Borrow<str> for ProviderKey {
	fn borrow(&self) -> &str {
		&self.0
	}
}
impl From<ProviderKey> for String {
	fn from(value: ProviderKey) -> Self {
		value.0
	}
}
impl TryFrom<String> for ProviderKey {
	type Error = ProviderKeyError;

	fn try_from(value: String) -> Result<Self, Self::Error> {
		Self::new(value)
	}
}
impl FromStr for ProviderKey {
	type Err = ProviderKeyError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Self::new(s)
	}
}
impl Debug for ProviderKey {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(f, "ProviderKey({})", self.0)
	}
}
impl Display for ProviderKey {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(&self.0)
	}
}

/// Registry key a strategy binding is published under: `"<provider>_oauth"`.
///
/// Never constructed directly; always derived from a validated
/// [`ProviderKey`], so two configurations of the same provider collide on the
/// same entry instead of registering twice.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct StrategyKey(String);
impl StrategyKey {
	/// Returns the provider key this registry key was derived from.
	pub fn provider(&self) -> &str {
		self.0.strip_suffix(STRATEGY_KEY_SUFFIX).unwrap_or(&self.0)
	}
}
impl Deref for StrategyKey {
	type Target = str;

	fn deref(&self) -> &Self::Target {
		&self.0
	}
}
impl AsRef<str> for StrategyKey {
	fn as_ref(&self) -> &str {
		&self.0
	}
}
impl Borrow<str> for StrategyKey {
	fn borrow(&self) -> &str {
		&self.0
	}
}
impl From<&ProviderKey> for StrategyKey {
	fn from(key: &ProviderKey) -> Self {
		key.strategy_key()
	}
}
impl Debug for StrategyKey {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(f, "StrategyKey({})", self.0)
	}
}
impl Display for StrategyKey {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(&self.0)
	}
}

fn validate_view(view: &str) -> Result<(), ProviderKeyError> {
	if view.is_empty() {
		return Err(ProviderKeyError::Empty);
	}
	if let Some(found) =
		view.chars().find(|c| !(c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '_' | '-')))
	{
		return Err(ProviderKeyError::InvalidCharacter { key: view.to_owned(), found });
	}
	if view.len() > KEY_MAX_LEN {
		return Err(ProviderKeyError::TooLong { max: KEY_MAX_LEN });
	}

	Ok(())
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn keys_normalize_case_and_validate() {
		let key = ProviderKey::new("Example").expect("Mixed-case key should normalize.");

		assert_eq!(key.as_ref(), "example");
		assert_eq!(ProviderKey::new("EXAMPLE").expect("Upper-case key should normalize."), key);
		assert!(ProviderKey::new("").is_err());
		assert!(ProviderKey::new("with space").is_err());
		assert!(ProviderKey::new("with/slash").is_err());
		assert!(ProviderKey::new("a".repeat(KEY_MAX_LEN + 1)).is_err());
		ProviderKey::new("svc_2-beta").expect("Digits, underscore, and dash should be accepted.");
	}

	#[test]
	fn strategy_key_derivation_round_trips() {
		let key = ProviderKey::new("service").expect("Fixture key should be valid.");
		let strategy_key = key.strategy_key();

		assert_eq!(strategy_key.as_ref(), "service_oauth");
		assert_eq!(strategy_key.provider(), "service");
	}

	#[test]
	fn serde_round_trip_enforces_validation() {
		let key: ProviderKey =
			serde_json::from_str("\"Example\"").expect("Key should deserialize successfully.");

		assert_eq!(key.as_ref(), "example");
		assert!(serde_json::from_str::<ProviderKey>("\"with space\"").is_err());
	}

	#[test]
	fn borrow_supports_fast_lookup() {
		let map: HashMap<ProviderKey, u8> = HashMap::from_iter([(
			ProviderKey::new("service").expect("Key used for lookup should be valid."),
			7_u8,
		)]);

		assert_eq!(map.get("service"), Some(&7));
	}
}
