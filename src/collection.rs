//! Ordered sets of `.xcf` files found by pathname.

use crate::document::Document;
use crate::{Error, Result, RunnerConfig};
use log::debug;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

/// Extension of GIMP's native format
pub const XCF_EXTENSION: &str = ".xcf";

/// An ordered list of document paths
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DocumentCollection {
    files: Vec<String>,
}

impl DocumentCollection {
    pub fn new(files: Vec<String>) -> Self {
        Self { files }
    }

    pub fn files(&self) -> &[String] {
        &self.files
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Collect documents by pathname.
    ///
    /// `pathname` can be a file with or without the `.xcf` extension, a
    /// directory (its `.xcf` files), or a pattern ending in `**` for a
    /// recursive search. `*` and `**` wildcards are allowed. Files are
    /// sorted by directory depth, then by name.
    ///
    /// ```no_run
    /// let c = xcfbridge::DocumentCollection::from_pathname("masks/**")?;
    /// # Ok::<(), xcfbridge::Error>(())
    /// ```
    pub fn from_pathname(pathname: &str) -> Result<Self> {
        let pattern = if pathname.ends_with("**") || pathname.ends_with("**/") {
            format!("{}/*{}", pathname.trim_end_matches('/'), XCF_EXTENSION)
        } else if Path::new(pathname).is_dir() {
            format!("{}/*{}", pathname.trim_end_matches('/'), XCF_EXTENSION)
        } else {
            match split_extension(pathname) {
                (base, "") | (base, XCF_EXTENSION) => format!("{}{}", base, XCF_EXTENSION),
                _ => return Ok(Self::default()),
            }
        };

        let mut files = Vec::new();
        for entry in glob::glob(&pattern)? {
            let path = entry.map_err(|e| Error::Io(e.into()))?;
            files.push(path.to_string_lossy().into_owned());
        }
        files.sort_by(|a, b| depth(a).cmp(&depth(b)).then_with(|| a.cmp(b)));

        debug!("Pattern {} matched {} documents", pattern, files.len());
        Ok(Self { files })
    }

    /// New collection with `prefix` replaced by `new_prefix` in every path.
    pub fn replace_prefix(&self, prefix: &str, new_prefix: &str) -> Result<Self> {
        self.replace_path_components(prefix, new_prefix, "", "")
    }

    /// New collection with `suffix` replaced by `new_suffix` in every path.
    pub fn replace_suffix(&self, suffix: &str, new_suffix: &str) -> Result<Self> {
        self.replace_path_components("", "", suffix, new_suffix)
    }

    /// New collection with both ends of every path replaced.
    ///
    /// Fails with `PathComponentMismatch` unless every file starts with
    /// `prefix` and ends with `suffix`.
    pub fn replace_path_components(
        &self,
        prefix: &str,
        new_prefix: &str,
        suffix: &str,
        new_suffix: &str,
    ) -> Result<Self> {
        let mut files = Vec::with_capacity(self.files.len());
        for file in &self.files {
            let middle = file
                .strip_prefix(prefix)
                .and_then(|rest| rest.strip_suffix(suffix))
                .ok_or_else(|| {
                    Error::PathComponentMismatch(format!(
                        "{} does not start with {:?} and end with {:?}",
                        file, prefix, suffix
                    ))
                })?;
            files.push(format!("{}{}{}", new_prefix, middle, new_suffix));
        }
        Ok(Self { files })
    }

    /// Run `f` on every document, in parallel across up to one thread per
    /// CPU. Each document gets its own runner. Results come back in file
    /// order; the first failure in that order is returned.
    pub fn for_each<T, F>(&self, config: &RunnerConfig, f: F) -> Result<Vec<T>>
    where
        T: Send,
        F: Fn(&Document) -> Result<T> + Sync,
    {
        let workers = num_cpus::get().clamp(1, self.files.len().max(1));
        let next = AtomicUsize::new(0);
        debug!("Processing {} documents on {} threads", self.files.len(), workers);

        let mut results: Vec<(usize, Result<T>)> = thread::scope(|scope| {
            let handles: Vec<_> = (0..workers)
                .map(|_| {
                    scope.spawn(|| {
                        let mut done = Vec::new();
                        loop {
                            let i = next.fetch_add(1, Ordering::SeqCst);
                            let Some(file) = self.files.get(i) else { break };
                            let document = Document::new(file, config.clone());
                            done.push((i, f(&document)));
                        }
                        done
                    })
                })
                .collect();

            handles
                .into_iter()
                .flat_map(|h| match h.join() {
                    Ok(done) => done,
                    Err(panic) => std::panic::resume_unwind(panic),
                })
                .collect()
        });

        results.sort_by_key(|(i, _)| *i);
        results.into_iter().map(|(_, r)| r).collect()
    }
}

fn depth(file: &str) -> usize {
    file.matches('/').count()
}

// Split off the extension of the last path component, dot included.
fn split_extension(pathname: &str) -> (&str, &str) {
    let name_start = pathname.rfind('/').map_or(0, |i| i + 1);
    match pathname[name_start..].rfind('.') {
        Some(dot) if dot > 0 => pathname.split_at(name_start + dot),
        _ => (pathname, ""),
    }
}
