use std::path::PathBuf;
use thiserror::Error;

/// An `Error` aborts the whole estimation. A partially estimated circuit is never returned.
#[derive(Debug, Error)]
pub enum Error {
	/// The options are invalid or do not fit the forest and dataset they are applied to.
	#[error("configuration error: {0}")]
	Configuration(String),
	/// The dataset contains values that cannot be estimated.
	#[error("data error: {0}")]
	Data(String),
	#[error(transparent)]
	Forest(#[from] arf_tree::ForestError),
	#[error("failed to read config file {}", path.display())]
	Io {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},
	#[error("failed to parse config: {0}")]
	Yaml(#[from] serde_yaml::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
