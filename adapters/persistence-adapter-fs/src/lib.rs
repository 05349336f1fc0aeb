//! JSON file persistence for the permanent configuration layer
//!
//! The document is one JSON object of canonical name to value. Saves go to a temporary sibling
//! file first and are renamed into place, so readers never see a half-written document.

#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![forbid(unsafe_code)]

use std::fs::{File, create_dir_all, remove_file, rename};
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

use confguard_types::persistence_adapter::{PersistenceAdapter, Snapshot};
use confguard_types::prelude::*;

#[derive(Debug, Clone)]
pub struct JsonFileAdapter {
	path: Box<Path>,
	pretty: bool,
}

impl JsonFileAdapter {
	/// Adapter for the document at `path`, creating its parent directory if needed
	pub fn new(path: impl Into<PathBuf>) -> CgResult<Self> {
		let path: PathBuf = path.into();
		if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
			create_dir_all(parent)?;
		}
		Ok(Self { path: path.into_boxed_path(), pretty: true })
	}

	/// Write compact instead of indented JSON
	pub fn compact(mut self) -> Self {
		self.pretty = false;
		self
	}

	pub fn path(&self) -> &Path {
		&self.path
	}

	fn tmp_path(&self) -> PathBuf {
		let mut name = self.path.file_name().map(ToOwned::to_owned).unwrap_or_default();
		name.push(format!(".tmp-{}", std::process::id()));
		self.path.with_file_name(name)
	}
}

impl PersistenceAdapter for JsonFileAdapter {
	fn save(&self, values: &Snapshot) -> CgResult<()> {
		let tmp_path = self.tmp_path();
		debug!("Writing configuration document: {:?}", &tmp_path);

		let written = (|| -> CgResult<()> {
			let mut out = BufWriter::new(File::create(&tmp_path)?);
			if self.pretty {
				serde_json::to_writer_pretty(&mut out, values)?;
			} else {
				serde_json::to_writer(&mut out, values)?;
			}
			out.write_all(b"\n")?;
			out.into_inner().map_err(std::io::IntoInnerError::into_error)?.sync_all()?;
			rename(&tmp_path, &self.path)?;
			Ok(())
		})();

		if let Err(err) = written {
			warn!("Configuration save failed, removing tmpfile: {:?}", &tmp_path);
			let _ = remove_file(&tmp_path);
			return Err(err);
		}

		info!("Saved {} values to {:?}", values.len(), &self.path);
		Ok(())
	}

	fn load(&self) -> CgResult<ConfigValue> {
		let data = match std::fs::read(&self.path) {
			Ok(data) => data,
			Err(err) if err.kind() == ErrorKind::NotFound => {
				debug!("No configuration document at {:?}", &self.path);
				return Ok(ConfigValue::map(Snapshot::new()));
			}
			Err(err) => return Err(err.into()),
		};
		let document: ConfigValue = serde_json::from_slice(&data)?;
		debug!("Loaded configuration document from {:?}", &self.path);
		Ok(document)
	}
}

// vim: ts=4
