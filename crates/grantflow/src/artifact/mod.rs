//! Filesystem store for generated proposal and milestone artifacts.
//!
//! Files are keyed `{category}/{template}/{code-or-draft}/{filename}` under a
//! configured root. Creation is atomic (`create_new`) with numbered-variant
//! fallback so two writers never clobber each other.

use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::InfraError;
use crate::sanitize::sanitize_component;

pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Writes `content` under the artifact key and returns the final path.
    /// An existing file with the same name gets a `_2`, `_3`, ... sibling
    /// instead of being overwritten.
    pub fn store(
        &self,
        category: &str,
        template_code: &str,
        code_or_draft: &str,
        filename: &str,
        content: &[u8],
    ) -> Result<PathBuf, InfraError> {
        let dir = self
            .root
            .join(sanitize_component(category))
            .join(sanitize_component(template_code))
            .join(sanitize_component(code_or_draft));
        std::fs::create_dir_all(&dir).map_err(|e| InfraError::ArtifactWrite {
            path: dir.clone(),
            source: e,
        })?;

        self.write_atomic(&dir, &sanitize_component(filename), content)
    }

    fn write_atomic(
        &self,
        dir: &Path,
        filename: &str,
        content: &[u8],
    ) -> Result<PathBuf, InfraError> {
        let (base, ext) = match filename.rfind('.') {
            Some(dot) => (&filename[..dot], Some(&filename[dot..])),
            None => (filename, None),
        };

        for counter in 1..=1000 {
            let candidate = if counter == 1 {
                filename.to_string()
            } else {
                match ext {
                    Some(ext) => format!("{}_{}{}", base, counter, ext),
                    None => format!("{}_{}", base, counter),
                }
            };
            let path = dir.join(&candidate);

            // create_new is O_CREAT | O_EXCL: atomic check-and-create.
            match std::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
            {
                Ok(mut file) => {
                    file.write_all(content).map_err(|e| InfraError::ArtifactWrite {
                        path: path.clone(),
                        source: e,
                    })?;
                    return Ok(path);
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
                Err(e) => {
                    return Err(InfraError::ArtifactWrite { path, source: e });
                }
            }
        }

        Err(InfraError::ArtifactWrite {
            path: dir.join(filename),
            source: std::io::Error::new(
                std::io::ErrorKind::AlreadyExists,
                "exhausted filename variants",
            ),
        })
    }
}
