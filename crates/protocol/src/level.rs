//! Log-level token passed as the last positional argument of a peer.
//!
//! A token is either a bare integer or a level name resolved against a fixed
//! table. Unknown names fall back to [`LogLevel::WARNING`] rather than failing,
//! so a peer always starts with some verbosity.

use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Name -> numeric level table. Aliases come after their canonical name.
const LEVEL_NAMES: &[(&str, u32)] = &[
	("CRITICAL", 50),
	("FATAL", 50),
	("ERROR", 40),
	("WARNING", 30),
	("WARN", 30),
	("INFO", 20),
	("DEBUG", 10),
	("NOTSET", 0),
];

/// Numeric verbosity level understood by both ends of a link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "LevelRepr", into = "String")]
pub struct LogLevel(u32);

impl LogLevel {
	pub const CRITICAL: Self = Self(50);
	pub const ERROR: Self = Self(40);
	pub const WARNING: Self = Self(30);
	pub const INFO: Self = Self(20);
	pub const DEBUG: Self = Self(10);
	pub const NOTSET: Self = Self(0);

	/// Wraps a raw numeric level.
	pub const fn from_value(value: u32) -> Self {
		Self(value)
	}

	/// Resolves a command-line token; never fails.
	pub fn parse(token: &str) -> Self {
		let token = token.trim();
		if let Ok(value) = token.parse::<u32>() {
			return Self(value);
		}
		LEVEL_NAMES
			.iter()
			.find(|(name, _)| name.eq_ignore_ascii_case(token))
			.map(|(_, value)| Self(*value))
			.unwrap_or(Self::WARNING)
	}

	/// Numeric value of the level.
	pub const fn value(self) -> u32 {
		self.0
	}

	/// Canonical name when the value is one of the standard levels.
	pub fn name(self) -> Option<&'static str> {
		LEVEL_NAMES.iter().find(|(_, value)| *value == self.0).map(|(name, _)| *name)
	}

	/// Token to put on a peer command line.
	pub fn token(self) -> String {
		match self.name() {
			Some(name) => name.to_string(),
			None => self.0.to_string(),
		}
	}
}

impl Default for LogLevel {
	fn default() -> Self {
		Self::WARNING
	}
}

impl fmt::Display for LogLevel {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.token())
	}
}

impl FromStr for LogLevel {
	type Err = Infallible;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Ok(Self::parse(s))
	}
}

impl From<LogLevel> for String {
	fn from(level: LogLevel) -> Self {
		level.token()
	}
}

#[derive(Deserialize)]
#[serde(untagged)]
enum LevelRepr {
	Number(u32),
	Name(String),
}

impl From<LevelRepr> for LogLevel {
	fn from(repr: LevelRepr) -> Self {
		match repr {
			LevelRepr::Number(value) => Self(value),
			LevelRepr::Name(name) => Self::parse(&name),
		}
	}
}
