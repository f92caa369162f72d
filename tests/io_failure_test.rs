//! Tests for load and save when the filesystem or file listing fails

use std::fs;
use std::io;
use std::path::Path;
use std::sync::Arc;

use tempfile::TempDir;

use augtree::config::Settings;
use augtree::domain::{ErrorCode, Glob};
use augtree::infrastructure::di::ServiceContainer;
use augtree::infrastructure::lenses::BuiltinLenses;
use augtree::infrastructure::traits::{FileLister, FileSystem, RealFileSystem, WalkDirLister};
use augtree::util::testing::init_test_setup;
use augtree::{AugError, Flags, OpenOptions, Session};

const HOSTS: &str = "127.0.0.1 localhost\n";
const ENVIRONMENT: &str = "LANG=C\n";

/// Real filesystem that refuses to read or write files with a given name
struct MockFileSystem {
    real: RealFileSystem,
    fail_read: Option<&'static str>,
    fail_write: Option<&'static str>,
}

impl MockFileSystem {
    fn failing_read(name: &'static str) -> Self {
        Self {
            real: RealFileSystem,
            fail_read: Some(name),
            fail_write: None,
        }
    }

    fn failing_write(name: &'static str) -> Self {
        Self {
            real: RealFileSystem,
            fail_read: None,
            fail_write: Some(name),
        }
    }

    fn check(path: &Path, name: Option<&str>) -> io::Result<()> {
        match name {
            Some(name) if path.file_name().is_some_and(|f| f == name) => Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!("access to {} denied", path.display()),
            )),
            _ => Ok(()),
        }
    }
}

impl FileSystem for MockFileSystem {
    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        Self::check(path, self.fail_read)?;
        self.real.read_to_string(path)
    }

    fn write(&self, path: &Path, content: &str) -> io::Result<()> {
        Self::check(path, self.fail_write)?;
        self.real.write(path, content)
    }

    fn write_atomic(&self, path: &Path, content: &str) -> io::Result<()> {
        Self::check(path, self.fail_write)?;
        self.real.write_atomic(path, content)
    }

    fn exists(&self, path: &Path) -> bool {
        self.real.exists(path)
    }

    fn copy(&self, from: &Path, to: &Path) -> io::Result<u64> {
        Self::check(to, self.fail_write)?;
        self.real.copy(from, to)
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        Self::check(from, self.fail_write)?;
        self.real.rename(from, to)
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        Self::check(path, self.fail_write)?;
        self.real.remove_file(path)
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        self.real.create_dir_all(path)
    }
}

/// Lister whose directory walk always fails
struct FailingLister;

impl FileLister for FailingLister {
    fn list_files(&self, _root: &Path, _include: &[Glob], _exclude: &[Glob]) -> io::Result<Vec<String>> {
        Err(io::Error::new(io::ErrorKind::Other, "walk aborted"))
    }
}

fn setup() -> TempDir {
    init_test_setup();
    let tmp = TempDir::new().unwrap();
    fs::create_dir_all(tmp.path().join("etc")).unwrap();
    fs::write(tmp.path().join("etc/hosts"), HOSTS).unwrap();
    fs::write(tmp.path().join("etc/environment"), ENVIRONMENT).unwrap();
    tmp
}

fn open(tmp: &TempDir, fs: Arc<dyn FileSystem>, lister: Arc<dyn FileLister>) -> Session {
    let container = ServiceContainer::with_deps(
        Settings::default(),
        fs,
        lister,
        Arc::new(BuiltinLenses::new()),
    );
    let mut aug = Session::open_with(
        OpenOptions::new()
            .root(tmp.path())
            .flags(Flags::NO_MODL_AUTOLOAD | Flags::NO_LOAD),
        container,
    )
    .unwrap();
    aug.register_transform(None, "Hosts.lns", &["/etc/hosts"], &[])
        .unwrap();
    aug.register_transform(None, "Shellvars.lns", &["/etc/environment"], &[])
        .unwrap();
    aug
}

#[test]
fn given_lister_fails_when_loading_then_command_execution_with_hint() {
    // Arrange
    let tmp = setup();
    let mut aug = open(&tmp, Arc::new(RealFileSystem), Arc::new(FailingLister));

    // Act
    let result = aug.load();

    // Assert
    match result {
        Err(AugError::CommandExecution(msg)) => {
            assert!(msg.contains("walk aborted"), "{msg}");
            assert!(msg.contains("/augeas//error"), "{msg}");
        }
        other => panic!("expected CommandExecution, got {other:?}"),
    }
    assert_eq!(aug.error_record().code, ErrorCode::CmdRun);
}

#[test]
fn given_unreadable_file_when_loading_then_read_failed_recorded_and_others_load() {
    // Arrange
    let tmp = setup();
    let mut aug = open(
        &tmp,
        Arc::new(MockFileSystem::failing_read("hosts")),
        Arc::new(WalkDirLister),
    );

    // Act
    aug.load().unwrap();

    // Assert
    assert_eq!(
        aug.get("/augeas/files/etc/hosts/error").unwrap(),
        Some("read_failed".to_string())
    );
    let errors = aug.file_errors();
    assert!(
        matches!(&errors[..], [(file, AugError::FileOperation(msg))] if file == "/etc/hosts" && msg.contains("denied"))
    );
    assert!(aug.matches("/files/etc/hosts").unwrap().is_empty());
    assert_eq!(
        aug.get("/files/etc/environment/LANG").unwrap(),
        Some("C".to_string())
    );
    assert_eq!(aug.error_record().code, ErrorCode::NoError);
}

#[test]
fn given_unwritable_file_when_saving_then_write_failed_recorded_and_others_saved() {
    // Arrange
    let tmp = setup();
    let mut aug = open(
        &tmp,
        Arc::new(MockFileSystem::failing_write("hosts")),
        Arc::new(WalkDirLister),
    );
    aug.load().unwrap();
    aug.set("/files/etc/hosts/1/ipaddr", Some("10.0.0.9")).unwrap();
    aug.set("/files/etc/environment/LANG", Some("de_DE")).unwrap();

    // Act
    let result = aug.save();

    // Assert
    assert!(matches!(&result, Err(AugError::CommandExecution(msg)) if msg.contains("/augeas//error")));
    assert_eq!(aug.error_record().code, ErrorCode::NoError);
    assert_eq!(
        aug.get("/augeas/files/etc/hosts/error").unwrap(),
        Some("write_failed".to_string())
    );
    assert_eq!(fs::read_to_string(tmp.path().join("etc/hosts")).unwrap(), HOSTS);
    assert!(fs::read_to_string(tmp.path().join("etc/environment"))
        .unwrap()
        .contains("LANG=de_DE"));
    assert_eq!(
        aug.matches("/augeas/events/saved").unwrap().len(),
        1
    );
}

#[test]
fn given_unremovable_file_when_saving_then_write_failed_recorded() {
    // Arrange
    let tmp = setup();
    let mut aug = open(
        &tmp,
        Arc::new(MockFileSystem::failing_write("hosts")),
        Arc::new(WalkDirLister),
    );
    aug.load().unwrap();
    aug.rm("/files/etc/hosts").unwrap();

    // Act
    let result = aug.save();

    // Assert
    assert!(matches!(result, Err(AugError::CommandExecution(_))));
    assert!(tmp.path().join("etc/hosts").exists());
    let errors = aug.file_errors();
    assert!(matches!(&errors[..], [(file, AugError::FileOperation(_))] if file == "/etc/hosts"));
}
