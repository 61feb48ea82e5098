//! Saving and loading object trees.
//!
//! An archive is a version record followed by one node:
//!
//! ```text
//! archive   := version("oxikit.object", 1.0) node
//! node      := name:string hierarchy:string version(hierarchy, class version)
//!              var-count:u32 { key:string kind:u8 payload }*
//!              hook-len:u32 hook-payload
//!              child-count:u32 { child-len:u32 node }*
//! ```
//!
//! Hook payloads and children are length-prefixed. The prefixes are written
//! as placeholders and patched in place once the section is complete, so a
//! reader can skip a section it cannot use. Pointer variables are not
//! written.
//!
//! What happens when a child fails to load is chosen by [`LoadPolicy`].

use crate::error::{Error, Result};
use crate::runtime::context::{Runtime, RuntimeInner};
use crate::runtime::object::{Object, validate_name};
use crate::runtime::variable::{VariableKind, VariableValue};
use oxikit_io::version::{read_version, write_version};
use oxikit_io::{ArchiveVersion, DataSource, DataSourceExt, FileSource};
use std::io::SeekFrom;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

/// Name in the version record opening every object archive.
pub const ARCHIVE_MAGIC: &str = "oxikit.object";

/// Version of the object archive format.
pub const ARCHIVE_VERSION: ArchiveVersion = ArchiveVersion::new(1, 0);

/// What to do when a child subtree fails to load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadPolicy {
    /// Stop at the failure. Children loaded before it stay attached.
    #[default]
    Partial,
    /// Stop at the failure and detach every child this load attached.
    AllOrNothing,
    /// Skip the failed child, record it in the [`LoadReport`] and go on.
    BestEffort,
}

/// A child skipped by a [`LoadPolicy::BestEffort`] load.
#[derive(Debug)]
pub struct SkippedChild {
    /// Path of the parent the child belonged to.
    pub parent: String,
    /// Position of the child in the parent's archived child list.
    pub index: usize,
    /// Why it failed.
    pub error: Error,
}

/// Outcome of a successful load.
#[derive(Debug, Default)]
pub struct LoadReport {
    /// Objects loaded, the receiving object included.
    pub loaded: usize,
    /// Children skipped under [`LoadPolicy::BestEffort`].
    pub skipped: Vec<SkippedChild>,
}

impl LoadReport {
    /// Returns whether nothing was skipped.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.skipped.is_empty()
    }
}

impl Object {
    /// Writes this object and its subtree to `ds`.
    ///
    /// # Errors
    ///
    /// Any write error, any error of a `save` hook, or
    /// [`Error::SectionTooLarge`].
    pub fn save(&self, ds: &mut dyn DataSource) -> Result<()> {
        write_version(ds, ARCHIVE_MAGIC, ARCHIVE_VERSION)?;
        write_node(self, ds)
    }

    /// Loads an archive into this object using the runtime's configured
    /// [`LoadPolicy`].
    ///
    /// # Errors
    ///
    /// See [`Object::load_with`].
    pub fn load(&self, ds: &mut dyn DataSource) -> Result<LoadReport> {
        let policy = self.runtime()?.config.load_policy;
        self.load_with(ds, policy)
    }

    /// Loads an archive into this object.
    ///
    /// The archive must hold an object of the same class. The object's
    /// current children are destroyed, its `reset` hooks run and its
    /// variables are cleared; then the archived variables are set, the `load` hooks run and the archived
    /// children are created and attached. The object keeps its own name.
    ///
    /// # Errors
    ///
    /// - [`Error::ClassMismatch`] if the archive holds another class
    /// - [`Error::Archive`] for malformed or incompatible data
    /// - any error of a `load` hook or of creating a child, subject to
    ///   `policy`
    pub fn load_with(&self, ds: &mut dyn DataSource, policy: LoadPolicy) -> Result<LoadReport> {
        let runtime = self.runtime()?;
        read_version(ds, ARCHIVE_MAGIC, ARCHIVE_VERSION)?;
        let _name = ds.read_string()?;
        let hierarchy = ds.read_string()?;
        if hierarchy != self.hierarchy() {
            return Err(Error::ClassMismatch {
                expected: self.hierarchy().to_string(),
                found: hierarchy,
            });
        }

        for child in self.children() {
            self.detach(&child)?;
        }
        self.reset();
        self.state().variables.clear();

        let mut loader = Loader::new(runtime, policy);
        loader.body(self, ds)?;
        Ok(loader.report)
    }

    /// Saves this subtree to a new file, using the runtime's byte order and
    /// type tag settings.
    ///
    /// # Errors
    ///
    /// See [`Object::save`]; also any file error.
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let settings = self.runtime()?.config.stream_settings();
        let mut file = FileSource::create(path)?.with_settings(settings);
        self.save(&mut file)?;
        file.flush()?;
        Ok(())
    }

    /// Loads a file written by [`Object::save_to_file`] into this object.
    ///
    /// # Errors
    ///
    /// See [`Object::load`]; also any file error.
    pub fn load_from_file(&self, path: impl AsRef<Path>) -> Result<LoadReport> {
        let settings = self.runtime()?.config.stream_settings();
        let mut file = FileSource::open(path)?.with_settings(settings);
        self.load(&mut file)
    }
}

impl Runtime {
    /// Creates an unattached object tree from an archive, using the
    /// configured [`LoadPolicy`].
    ///
    /// # Errors
    ///
    /// See [`Runtime::load_object_with`].
    pub fn load_object(&self, ds: &mut dyn DataSource) -> Result<(Object, LoadReport)> {
        self.load_object_with(ds, self.config().load_policy)
    }

    /// Creates an unattached object tree from an archive.
    ///
    /// The root's class is resolved with
    /// [`ClassRegistry::lookup_or_load`](crate::ClassRegistry::lookup_or_load),
    /// as is every child's. If loading fails, nothing created by this call
    /// survives.
    ///
    /// # Errors
    ///
    /// - [`Error::ClassNotFound`] if a class cannot be resolved
    /// - [`Error::InvalidName`] if an archived name is unusable
    /// - [`Error::Archive`] for malformed or incompatible data
    /// - any hook error, subject to `policy` below the root
    pub fn load_object_with(
        &self,
        ds: &mut dyn DataSource,
        policy: LoadPolicy,
    ) -> Result<(Object, LoadReport)> {
        read_version(ds, ARCHIVE_MAGIC, ARCHIVE_VERSION)?;
        let mut loader = Loader::new(self.inner.clone(), policy);
        let object = loader.instantiate(ds)?;
        match loader.body(&object, ds) {
            Ok(()) => Ok((object, loader.report)),
            Err(error) => {
                object.destroy_subtree();
                Err(error)
            }
        }
    }

    /// Saves `object` to a new file. See [`Object::save_to_file`].
    ///
    /// # Errors
    ///
    /// Any save or file error.
    pub fn save_to_file(&self, object: &Object, path: impl AsRef<Path>) -> Result<()> {
        object.save_to_file(path)
    }

    /// Creates an object tree from a file, using the runtime's byte order
    /// and type tag settings.
    ///
    /// # Errors
    ///
    /// See [`Runtime::load_object`]; also any file error.
    pub fn load_from_file(&self, path: impl AsRef<Path>) -> Result<(Object, LoadReport)> {
        let settings = self.config().stream_settings();
        let mut file = FileSource::open(path)?.with_settings(settings);
        self.load_object(&mut file)
    }
}

fn write_node(object: &Object, ds: &mut dyn DataSource) -> Result<()> {
    let class = object.class();
    ds.write_string(&object.name())?;
    ds.write_string(class.hierarchy())?;
    write_version(ds, class.hierarchy(), class.version())?;

    let variables: Vec<_> = object
        .variables()
        .iter()
        .filter(|var| var.value.kind().is_persistent())
        .cloned()
        .collect();
    ds.write_u32(count_u32(variables.len())?)?;
    for var in &variables {
        ds.write_string(&var.name)?;
        ds.write_u8(var.value.kind().tag())?;
        var.value.encode(ds)?;
    }

    write_section(ds, |ds| {
        for class in class.lineage() {
            class.hooks().save(object, ds)?;
        }
        Ok(())
    })?;

    let children = object.children();
    ds.write_u32(count_u32(children.len())?)?;
    for child in &children {
        write_section(ds, |ds| write_node(child, ds))?;
    }
    Ok(())
}

/// Writes a `u32` length placeholder, the section, then patches the length.
fn write_section<F>(ds: &mut dyn DataSource, body: F) -> Result<()>
where
    F: FnOnce(&mut dyn DataSource) -> Result<()>,
{
    let at = ds.tell();
    ds.write_u32(0)?;
    let start = ds.tell();
    body(ds)?;
    let len = ds.tell() - start;
    let len32 = u32::try_from(len).map_err(|_| Error::SectionTooLarge(len))?;
    ds.write_u32_at(len32, at)?;
    Ok(())
}

fn count_u32(count: usize) -> Result<u32> {
    u32::try_from(count).map_err(|_| Error::SectionTooLarge(count as u64))
}

struct Loader {
    runtime: Arc<RuntimeInner>,
    policy: LoadPolicy,
    report: LoadReport,
}

impl Loader {
    fn new(runtime: Arc<RuntimeInner>, policy: LoadPolicy) -> Self {
        Self {
            runtime,
            policy,
            report: LoadReport::default(),
        }
    }

    /// Reads a node's name and class and constructs it.
    fn instantiate(&self, ds: &mut dyn DataSource) -> Result<Object> {
        let name = ds.read_string()?;
        validate_name(&name)?;
        let hierarchy = ds.read_string()?;
        let class = self.runtime.registry.lookup_or_load(&hierarchy)?;
        Ok(Object::instantiate(Arc::downgrade(&self.runtime), class, name))
    }

    /// Reads everything after a node's name and class into `object`.
    fn body(&mut self, object: &Object, ds: &mut dyn DataSource) -> Result<()> {
        let class = object.class().clone();
        let version = read_version(ds, class.hierarchy(), class.version())?;

        let count = ds.read_u32()?;
        for _ in 0..count {
            let key = ds.read_string()?;
            let tag = ds.read_u8()?;
            let kind = VariableKind::from_tag(tag)
                .ok_or_else(|| Error::UnknownVariableKind { key: key.clone(), tag })?;
            let value = VariableValue::decode(kind, ds)?;
            object.set(&key, value);
        }

        let len = u64::from(ds.read_u32()?);
        let start = ds.tell();
        for class in class.lineage() {
            class.hooks().load(object, ds, version)?;
        }
        let end = start + len;
        if ds.tell() != end {
            debug!(
                class = class.hierarchy(),
                declared = len,
                consumed = ds.tell() - start,
                "hook payload size differs; seeking past it"
            );
            ds.seek(SeekFrom::Start(end))?;
        }

        let children = ds.read_u32()?;
        let mut attached = Vec::new();
        for index in 0..children as usize {
            let len = u64::from(ds.read_u32()?);
            let start = ds.tell();
            match self.child(object, ds) {
                Ok(child) => attached.push(child),
                Err(error) => match self.policy {
                    LoadPolicy::Partial => return Err(error),
                    LoadPolicy::AllOrNothing => {
                        for child in &attached {
                            // Ignored: the load error is the one to report.
                            let _ = object.detach(child);
                        }
                        return Err(error);
                    }
                    LoadPolicy::BestEffort => {
                        let parent = object.path();
                        warn!(parent = %parent, index, %error, "skipped child");
                        self.report.skipped.push(SkippedChild {
                            parent,
                            index,
                            error,
                        });
                        ds.seek(SeekFrom::Start(start + len))?;
                    }
                },
            }
        }

        self.report.loaded += 1;
        Ok(())
    }

    fn child(&mut self, parent: &Object, ds: &mut dyn DataSource) -> Result<Object> {
        let child = self.instantiate(ds)?;
        if let Err(error) = parent.attach(&child) {
            child.destroy_subtree();
            return Err(error);
        }
        if let Err(error) = self.body(&child, ds) {
            let _ = parent.detach(&child);
            return Err(error);
        }
        Ok(child)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::class::{ClassHooks, ClassSpec};
    use oxikit_io::MemorySource;

    struct Payload;

    impl ClassHooks for Payload {
        fn save(&self, object: &Object, ds: &mut dyn DataSource) -> Result<()> {
            ds.write_u16(object.get_or("extra", 0_u16))?;
            Ok(())
        }

        fn load(&self, object: &Object, ds: &mut dyn DataSource, _: ArchiveVersion) -> Result<()> {
            object.set("extra", ds.read_u16()?.wrapping_add(1));
            Ok(())
        }
    }

    #[test]
    fn test_round_trip_variables_and_children() {
        let rt = Runtime::new();
        rt.register(ClassSpec::new("Object:Doc").hooks(Payload)).unwrap();

        let doc = rt.new_object("Object:Doc", "doc").unwrap();
        doc.set("title", "notes");
        doc.set("pages", 3_u32);
        doc.set("extra", 41_u16);
        doc.set("link", doc.to_pointer());
        let page = rt.new_object("Object", "page0").unwrap();
        page.set("ratio", 0.25_f32);
        doc.attach(&page).unwrap();

        let mut ds = MemorySource::new();
        doc.save(&mut ds).unwrap();
        ds.rewind().unwrap();

        let (copy, report) = rt.load_object(&mut ds).unwrap();
        assert!(report.is_complete());
        assert_eq!(report.loaded, 2);
        assert_eq!(copy.name(), "doc");
        assert_eq!(copy.get::<String>("title").unwrap(), "notes");
        assert_eq!(copy.get::<u32>("pages").unwrap(), 3);
        assert_eq!(copy.get::<u16>("extra").unwrap(), 42);
        assert!(!copy.has("link"));
        assert_eq!(copy.find("page0").unwrap().get::<f32>("ratio").unwrap(), 0.25);
    }

    #[test]
    fn test_load_into_checks_class() {
        let rt = Runtime::new();
        rt.register(ClassSpec::new("Object:Doc")).unwrap();
        let doc = rt.new_object("Object:Doc", "doc").unwrap();
        let plain = rt.new_object("Object", "plain").unwrap();

        let mut ds = MemorySource::new();
        doc.save(&mut ds).unwrap();
        ds.rewind().unwrap();

        let err = plain.load(&mut ds).unwrap_err();
        assert!(matches!(err, Error::ClassMismatch { found, .. } if found == "Object:Doc"));
    }

    #[test]
    fn test_load_into_replaces_children() {
        let rt = Runtime::new();
        let saved = rt.new_object("Object", "saved").unwrap();
        saved.attach(&rt.new_object("Object", "kept").unwrap()).unwrap();
        let mut ds = MemorySource::new();
        saved.save(&mut ds).unwrap();
        ds.rewind().unwrap();

        let target = rt.new_object("Object", "target").unwrap();
        let old = rt.new_object("Object", "old").unwrap();
        target.attach(&old).unwrap();

        target.load(&mut ds).unwrap();
        assert!(old.is_destroyed());
        assert_eq!(target.name(), "target");
        assert!(target.child("kept").is_some());
        assert_eq!(target.child_count(), 1);
    }

    #[test]
    fn test_load_into_replaces_variables() {
        let rt = Runtime::new();
        let saved = rt.new_object("Object", "saved").unwrap();
        saved.set("width", 320_i32);
        let mut ds = MemorySource::new();
        saved.save(&mut ds).unwrap();
        ds.rewind().unwrap();

        let target = rt.new_object("Object", "target").unwrap();
        target.set("stale", true);
        target.set("width", 10_i32);

        target.load(&mut ds).unwrap();
        assert_eq!(target.keys(), ["width"]);
        assert_eq!(target.get::<i32>("width").unwrap(), 320);
    }

    #[test]
    fn test_section_lengths_patched() {
        let rt = Runtime::new();
        rt.register(ClassSpec::new("Object:Doc").hooks(Payload)).unwrap();
        let obj = rt.new_object("Object:Doc", "o").unwrap();
        let mut ds = MemorySource::new();
        obj.save(&mut ds).unwrap();
        let bytes = ds.into_inner();

        // header(40) + name "o"(4+2) + hierarchy "Object:Doc"(4+11)
        // + class version(40) + var count(4), then the hook length.
        let hook_len_at = 40 + 6 + 15 + 40 + 4;
        assert_eq!(&bytes[hook_len_at..hook_len_at + 4], &[0, 0, 0, 2]);
        assert_eq!(bytes.len(), hook_len_at + 4 + 2 + 4);
    }
}
