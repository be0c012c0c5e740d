//! Matrix parameter codec
//!
//! Provides [`TransformParams`], the parameter set sent to the resource
//! server as a leading `params;k1=v1;k2=v2` path segment, and the decoding
//! of human-readable attribute tables into that set.
//!
//! Encoding is sorted by key so that equal parameter sets always produce the
//! same segment, whatever order they were built in.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

/// Literal prefix of every encoded segment
pub const SEGMENT_PREFIX: &str = "params;";

/// Key of the version marker
pub const VERSION_KEY: &str = "v";

/// Default version marker value
pub const DEFAULT_VERSION: &str = "0";

static IMAGE_KEY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^Image: (.).*$").expect("image key pattern is valid"));

/// Ordered set of transformation parameters
///
/// Keys are matched case-insensitively on insertion but keep the case they
/// were inserted with. Iteration and encoding are sorted by key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct TransformParams(BTreeMap<String, String>);

impl TransformParams {
    /// Create empty parameter set
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parameter set holding only the default version marker (`v=0`)
    #[inline]
    #[must_use]
    pub fn default_version() -> Self {
        let mut params = Self::new();
        params.insert(VERSION_KEY, DEFAULT_VERSION);
        params
    }

    /// Merge the default version marker underneath the current entries
    #[must_use]
    pub fn with_default_version(self) -> Self {
        Self::default_version().merge(self)
    }

    /// Insert a parameter, replacing any key equal ignoring ASCII case
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        self.0.retain(|existing, _| !existing.eq_ignore_ascii_case(&key));
        self.0.insert(key, value.into());
    }

    /// Overlay `other` onto this set; entries of `other` win
    #[must_use]
    pub fn merge(mut self, other: Self) -> Self {
        for (key, value) in other.0 {
            self.insert(key, value);
        }
        self
    }

    /// Look up a value by key, ignoring ASCII case
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(key))
            .map(|(_, value)| value.as_str())
    }

    /// Number of parameters
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if there are no parameters
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate parameters in key order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Encode as a `params;k=v;...` path segment
    #[must_use]
    pub fn encode(&self) -> String {
        let pairs: Vec<String> = self.0.iter().map(|(k, v)| format!("{k}={v}")).collect();
        format!("{SEGMENT_PREFIX}{}", pairs.join(";"))
    }

    /// Join the encoded segment and an uploaded asset path
    #[must_use]
    pub fn request_path(&self, uploaded_path: &str) -> String {
        format!("{}/{}", self.encode(), uploaded_path.trim_start_matches('/'))
    }

    /// Decode a human attribute table into wire parameters
    ///
    /// `Image: <X>...` keys become `img:<x>`; every other key is lower-cased.
    /// All values are lower-cased. Defaults are not merged in.
    #[must_use]
    pub fn decode<K, V>(table: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut params = Self::new();
        for (key, value) in table {
            let key = IMAGE_KEY.replace(key.as_ref(), "img:$1").to_lowercase();
            params.insert(key, value.as_ref().to_lowercase());
        }
        params
    }
}

impl Display for TransformParams {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

impl FromStr for TransformParams {
    type Err = ParamsParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let body = s
            .strip_prefix(SEGMENT_PREFIX)
            .ok_or_else(|| ParamsParseError::MissingPrefix(s.to_string()))?;

        let mut params = Self::new();
        for pair in body.split(';').filter(|p| !p.is_empty()) {
            let (key, value) = pair
                .split_once('=')
                .ok_or_else(|| ParamsParseError::MalformedPair(pair.to_string()))?;
            if params.get(key).is_some() {
                return Err(ParamsParseError::DuplicateKey(key.to_string()));
            }
            params.insert(key, value);
        }
        Ok(params)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for TransformParams {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = Self::new();
        for (key, value) in iter {
            params.insert(key, value);
        }
        params
    }
}

/// Errors parsing an encoded segment
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParamsParseError {
    /// Segment does not start with `params;`
    #[error("segment does not start with 'params;': '{0}'")]
    MissingPrefix(String),

    /// Pair without `=`
    #[error("malformed parameter pair: '{0}'")]
    MalformedPair(String),

    /// Same key twice
    #[error("duplicate parameter key: '{0}'")]
    DuplicateKey(String),
}
