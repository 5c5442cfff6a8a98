//! The ASDF (Adaptable Seismic Data Format) layer.
//!
//! An [`AsdfDataSet`] reads waveforms, QuakeML, StationXML and auxiliary dictionaries from an ASDF container through a [`Session`].
//! Waveforms are stored as 1-D datasets at `/Waveforms/<NET.STA>/<NET.STA.LOC.CHA>__<start>__<end>__<tag>`.

pub mod python_literal;
mod trace;

use std::collections::BTreeMap;

use futures::future::try_join_all;
use itertools::Itertools;
use serde_json::{Map, Value};
use thiserror::Error;

pub use python_literal::PythonLiteralError;
pub use trace::{Trace, TraceName, TRACE_TIME_FORMAT};

use crate::{
    array::{Array, DataType},
    error::ReadError,
    node::NodePath,
    session::{Session, SessionOptions},
    storage::{AsyncReadableStorage, ObjectKey},
};

/// The QuakeML dataset path.
pub const QUAKEML_PATH: &str = "/QuakeML";
/// The waveforms group path.
pub const WAVEFORMS_PATH: &str = "/Waveforms";
/// The ASDF dictionary dataset path.
pub const ASDF_DICT_PATH: &str = "/AuxiliaryData/ASDFDict";

const STATIONXML: &str = "StationXML";

/// An ASDF error.
#[derive(Debug, Error)]
pub enum AsdfError {
    /// A read error.
    #[error(transparent)]
    Read(#[from] ReadError),
    /// The waveform dataset does not exist.
    #[error("waveform {0} is not in the file")]
    WaveformNotInFile(String),
    /// A waveform dataset name is malformed.
    #[error("invalid waveform name {name}: {reason}")]
    InvalidTraceName {
        /// The dataset name.
        name: String,
        /// The reason the name is invalid.
        reason: String,
    },
    /// The ASDF dictionary does not exist.
    #[error("the ASDF dictionary is not in the file")]
    AsdfDictNotInFile,
    /// A stored dictionary could not be parsed.
    #[error("invalid dictionary at {path}: {source}")]
    InvalidAsdfDict {
        /// The dataset path.
        path: String,
        /// The parse error.
        #[source]
        source: PythonLiteralError,
    },
    /// A dataset is not UTF-8 text stored as bytes.
    #[error("{path} is not a text dataset: {reason}")]
    InvalidText {
        /// The dataset path.
        path: String,
        /// The reason the dataset is not text.
        reason: String,
    },
}

/// An ASDF container.
#[derive(Debug)]
pub struct AsdfDataSet {
    session: Session,
}

impl From<Session> for AsdfDataSet {
    fn from(session: Session) -> Self {
        Self { session }
    }
}

impl AsdfDataSet {
    /// Open the ASDF container at `key` in `storage`.
    ///
    /// # Errors
    /// Returns an [`AsdfError`] if the session cannot be opened.
    pub async fn open(
        storage: AsyncReadableStorage,
        key: ObjectKey,
        options: SessionOptions,
    ) -> Result<Self, AsdfError> {
        Ok(Session::open(storage, key, options).await?.into())
    }

    /// Return the underlying session.
    #[must_use]
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Close the container.
    pub fn close(&self) {
        self.session.close();
    }

    /// Read the waveform dataset at `path`.
    ///
    /// # Errors
    /// Returns [`AsdfError::InvalidTraceName`] if the dataset name is malformed, [`AsdfError::WaveformNotInFile`] if the dataset does not exist, or another [`AsdfError`] if the read fails.
    pub async fn read_trace(&self, path: &str) -> Result<Trace, AsdfError> {
        let node_path = NodePath::new(path).map_err(ReadError::from)?;
        let name = node_path.components().last().unwrap_or_default();
        let name = TraceName::parse(name)?;
        let data = self
            .session
            .read_dataset(path, None)
            .await
            .map_err(|err| match err {
                ReadError::PathNotFound(_) => AsdfError::WaveformNotInFile(path.to_string()),
                err => err.into(),
            })?;
        tracing::debug!(path, id = name.id(), npts = data.num_elements(), "read trace");
        Ok(Trace::new(name, data))
    }

    /// Read a text dataset stored as an array of bytes.
    ///
    /// Leading and trailing whitespace and NUL characters are removed.
    ///
    /// # Errors
    /// Returns [`AsdfError::InvalidText`] if the dataset is not UTF-8 bytes, or another [`AsdfError`] if the read fails.
    pub async fn read_text(&self, path: &str) -> Result<String, AsdfError> {
        let array = self.session.read_dataset(path, None).await?;
        let invalid = |reason: String| AsdfError::InvalidText {
            path: path.to_string(),
            reason,
        };
        let bytes = match array.data_type() {
            DataType::Int8 | DataType::UInt8 | DataType::Opaque { .. } => array.bytes(),
            _ => None,
        }
        .ok_or_else(|| invalid(format!("unexpected data type {}", array.data_type())))?;
        let text = std::str::from_utf8(bytes).map_err(|err| invalid(err.to_string()))?;
        Ok(text
            .trim_matches(|c: char| c.is_whitespace() || c == '\0')
            .to_string())
    }

    /// Read the QuakeML event document.
    ///
    /// # Errors
    /// See [`read_text`](Self::read_text).
    pub async fn read_events(&self) -> Result<String, AsdfError> {
        self.read_text(QUAKEML_PATH).await
    }

    /// Read the StationXML document of `station` (`NET.STA`).
    ///
    /// # Errors
    /// See [`read_text`](Self::read_text).
    pub async fn read_stationxml(&self, station: &str) -> Result<String, AsdfError> {
        self.read_text(&format!("{WAVEFORMS_PATH}/{station}/{STATIONXML}"))
            .await
    }

    /// Read a dictionary stored as the text of a Python literal.
    ///
    /// # Errors
    /// Returns [`AsdfError::InvalidAsdfDict`] if the text is not a supported literal, otherwise see [`read_text`](Self::read_text).
    pub async fn read_dict(&self, path: &str) -> Result<Value, AsdfError> {
        let text = self.read_text(path).await?;
        python_literal::parse(&text).map_err(|source| AsdfError::InvalidAsdfDict {
            path: path.to_string(),
            source,
        })
    }

    /// Read the ASDF dictionary at `/AuxiliaryData/ASDFDict`.
    ///
    /// # Errors
    /// Returns [`AsdfError::AsdfDictNotInFile`] if the dictionary does not exist, otherwise see [`read_dict`](Self::read_dict).
    pub async fn asdf_dict(&self) -> Result<Value, AsdfError> {
        self.read_dict(ASDF_DICT_PATH)
            .await
            .map_err(|err| match err {
                AsdfError::Read(ReadError::PathNotFound(_)) => AsdfError::AsdfDictNotInFile,
                err => err,
            })
    }

    /// Read the datasets at `prefix + path + suffix` for each of `paths` concurrently, keyed by `path`.
    ///
    /// # Errors
    /// Returns the first [`AsdfError`] of any read. No partial results are returned.
    pub async fn read_many<S: AsRef<str>>(
        &self,
        paths: &[S],
        prefix: &str,
        suffix: &str,
    ) -> Result<BTreeMap<String, Array>, AsdfError> {
        let reads = paths.iter().map(|path| async move {
            let path = path.as_ref();
            let array = self
                .session
                .read_dataset(&format!("{prefix}{path}{suffix}"), None)
                .await?;
            Ok::<_, AsdfError>((path.to_string(), array))
        });
        Ok(try_join_all(reads).await?.into_iter().collect())
    }

    /// Read the dictionaries at `prefix + path + suffix` for each of `paths` concurrently, keyed by `path`.
    ///
    /// # Errors
    /// Returns the first [`AsdfError`] of any read. No partial results are returned.
    pub async fn read_many_dicts<S: AsRef<str>>(
        &self,
        paths: &[S],
        prefix: &str,
        suffix: &str,
    ) -> Result<BTreeMap<String, Value>, AsdfError> {
        let reads = paths.iter().map(|path| async move {
            let path = path.as_ref();
            let dict = self.read_dict(&format!("{prefix}{path}{suffix}")).await?;
            Ok::<_, AsdfError>((path.to_string(), dict))
        });
        Ok(try_join_all(reads).await?.into_iter().collect())
    }

    /// Return the stations (`NET.STA`) in `/Waveforms`.
    ///
    /// # Errors
    /// Returns an [`AsdfError`] if `/Waveforms` cannot be listed.
    pub async fn stations(&self) -> Result<Vec<String>, AsdfError> {
        Ok(self.session.list(WAVEFORMS_PATH).await?)
    }

    /// Return the distinct waveform tags of `station`, sorted.
    ///
    /// Children of the station group that are not waveform datasets are ignored.
    ///
    /// # Errors
    /// Returns an [`AsdfError`] if the station group cannot be listed.
    pub async fn waveform_tags(&self, station: &str) -> Result<Vec<String>, AsdfError> {
        let names = self
            .session
            .list(&format!("{WAVEFORMS_PATH}/{station}"))
            .await?;
        Ok(names
            .iter()
            .filter(|name| name.as_str() != STATIONXML)
            .filter_map(|name| TraceName::parse(name).ok())
            .map(|name| name.tag().to_string())
            .unique()
            .sorted()
            .collect_vec())
    }

    /// Return the group tree as nested JSON objects, with datasets as `null`.
    ///
    /// # Errors
    /// Returns an [`AsdfError`] if any group cannot be listed.
    pub async fn hierarchy(&self) -> Result<Value, AsdfError> {
        let mut root = Map::new();
        let mut groups = vec![NodePath::root()];
        while let Some(group) = groups.pop() {
            let children = self
                .session
                .list(group.as_str())
                .await?
                .iter()
                .map(|name| group.child(name))
                .collect::<Result<Vec<_>, _>>()
                .map_err(ReadError::from)?;
            let kinds = try_join_all(
                children
                    .iter()
                    .map(|child| self.session.is_dataset(child.as_str())),
            )
            .await?;
            for (child, is_dataset) in children.into_iter().zip(kinds) {
                if is_dataset {
                    insert_path(&mut root, &child, Value::Null);
                } else {
                    insert_path(&mut root, &child, Value::Object(Map::new()));
                    groups.push(child);
                }
            }
        }
        Ok(Value::Object(root))
    }
}

/// Insert `value` at `path` in `root`, where parent groups are already present.
fn insert_path(root: &mut Map<String, Value>, path: &NodePath, value: Value) {
    let components = path.components().collect_vec();
    let Some((last, parents)) = components.split_last() else {
        return;
    };
    let mut map = root;
    for parent in parents {
        let Some(Value::Object(next)) = map.get_mut(*parent) else {
            return;
        };
        map = next;
    }
    map.insert((*last).to_string(), value);
}
