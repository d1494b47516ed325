// tests/integration_test.rs

//! Integration tests for packledger
//!
//! These tests verify end-to-end functionality across modules.

use packledger::archive::ExtensionPolicy;
use packledger::install::{InstallOptions, Installer};
use packledger::ledger::{DEFAULT_LEDGER_FILE, OwnershipLedger};
use packledger::progress::NoProgress;
use packledger::Error;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use zip::write::SimpleFileOptions;

fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
    let file = fs::File::create(path).unwrap();
    let mut writer = zip::ZipWriter::new(file);
    let options = SimpleFileOptions::default();
    for (name, content) in entries {
        if name.ends_with('/') {
            writer.add_directory(*name, options).unwrap();
        } else {
            writer.start_file(*name, options).unwrap();
            writer.write_all(content).unwrap();
        }
    }
    writer.finish().unwrap();
}

struct Env {
    dir: TempDir,
    root: PathBuf,
}

impl Env {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("UserSkins");
        Self { dir, root }
    }

    fn archive(&self, name: &str, entries: &[(&str, &[u8])]) -> PathBuf {
        let path = self.dir.path().join(name);
        write_zip(&path, entries);
        path
    }

    fn installer(&self) -> Installer<'static> {
        Installer::new(&self.root, ExtensionPolicy::skins())
            .with_staging_dir(self.dir.path().join("staging"))
    }

    fn ledger_path(&self) -> PathBuf {
        self.root.join(DEFAULT_LEDGER_FILE)
    }
}

fn opts() -> InstallOptions {
    InstallOptions {
        check_space: false,
        ..InstallOptions::default()
    }
}

#[test]
fn test_install_reload_uninstall_lifecycle() {
    let env = Env::new();
    let archive = env.archive(
        "tiger.zip",
        &[
            ("Tiger/", b""),
            ("Tiger/body_c.dds", b"color"),
            ("Tiger/body_n.dds", b"normal"),
            ("Tiger/textures.blk", b"blk"),
            ("__MACOSX/Tiger/._body_c.dds", b"fork"),
        ],
    );
    let installer = env.installer();

    {
        let mut ledger = OwnershipLedger::open(env.ledger_path());
        let report = installer
            .install(&archive, &mut ledger, &opts(), &mut NoProgress)
            .unwrap();
        assert_eq!(report.package, "Tiger");
        assert_eq!(report.files.len(), 3);
        assert!(!env.root.join("__MACOSX").exists());
    }

    // A fresh ledger instance sees the same state
    let mut ledger = OwnershipLedger::load(env.ledger_path()).unwrap();
    assert_eq!(ledger.owner_of("Tiger/body_c.dds"), Some("Tiger"));
    assert_eq!(ledger.installed_files("Tiger").unwrap().len(), 3);
    assert!(ledger.verify_consistency().is_empty());

    let report = installer.uninstall("Tiger", &mut ledger).unwrap();
    assert_eq!(report.removed, 3);
    assert!(!env.root.join("Tiger").exists());

    let ledger = OwnershipLedger::load(env.ledger_path()).unwrap();
    assert!(ledger.is_empty());
}

#[test]
fn test_folder_name_from_content_or_stem() {
    let env = Env::new();
    let installer = env.installer();
    let mut ledger = OwnershipLedger::open(env.ledger_path());

    let single = env.archive("foo.zip", &[("bar/texture.dds", b"t")]);
    installer
        .install(&single, &mut ledger, &opts(), &mut NoProgress)
        .unwrap();
    assert!(env.root.join("bar/texture.dds").is_file());

    let multi = env.archive("foo.zip", &[("a.dds", b"a"), ("b.dds", b"b")]);
    installer
        .install(&multi, &mut ledger, &opts(), &mut NoProgress)
        .unwrap();
    assert!(env.root.join("foo/a.dds").is_file());
    assert!(env.root.join("foo/b.dds").is_file());

    let names: Vec<_> = ledger.packages().map(|r| r.name.clone()).collect();
    assert_eq!(names, vec!["bar".to_string(), "foo".to_string()]);
}

#[test]
fn test_traversal_archive_writes_nothing_outside() {
    let env = Env::new();
    let archive = env.archive(
        "evil.zip",
        &[("skin/ok.dds", b"x"), ("../../evil.dds", b"pwned")],
    );
    let mut ledger = OwnershipLedger::open(env.ledger_path());

    let err = env
        .installer()
        .install(&archive, &mut ledger, &opts(), &mut NoProgress)
        .unwrap_err();

    assert!(matches!(err, Error::UnsafeArchive { .. }));
    assert!(err.is_abort());
    assert!(!env.dir.path().join("evil.dds").exists());
    assert!(!env.dir.path().parent().unwrap().join("evil.dds").exists());
    assert!(!env.ledger_path().exists());
}

#[test]
fn test_executable_payload_is_refused() {
    let env = Env::new();
    let archive = env.archive("cheat.zip", &[("cheat/injector.dll", b"MZ")]);
    let mut ledger = OwnershipLedger::open(env.ledger_path());

    let result = env
        .installer()
        .install(&archive, &mut ledger, &opts(), &mut NoProgress);

    match result {
        Err(Error::UnsafeArchive { entries, .. }) => {
            assert_eq!(entries, vec!["cheat/injector.dll".to_string()]);
        }
        other => panic!("expected UnsafeArchive, got {:?}", other),
    }
    assert!(!env.root.exists());
}

#[test]
fn test_non_zip_input_is_invalid() {
    let env = Env::new();
    let path = env.dir.path().join("skin.rar");
    fs::write(&path, b"Rar!").unwrap();
    let mut ledger = OwnershipLedger::open(env.ledger_path());

    let result = env
        .installer()
        .install(&path, &mut ledger, &opts(), &mut NoProgress);
    assert!(matches!(result, Err(Error::InvalidArchive(_))));

    let corrupt = env.dir.path().join("corrupt.zip");
    fs::write(&corrupt, b"not a zip at all").unwrap();
    let result = env
        .installer()
        .install(&corrupt, &mut ledger, &opts(), &mut NoProgress);
    assert!(matches!(result, Err(Error::InvalidArchive(_))));
}

#[test]
fn test_overlapping_packages_and_partial_removal() {
    let env = Env::new();
    let installer = env.installer();
    let mut ledger = OwnershipLedger::open(env.ledger_path());

    let base = env.archive(
        "base.zip",
        &[("shared/a.dds", b"base-a"), ("shared/b.dds", b"base-b")],
    );
    let patch = env.archive("patch.zip", &[("shared/b.dds", b"patch-b")]);

    installer
        .install(
            &base,
            &mut ledger,
            &InstallOptions {
                package: Some("base".to_string()),
                ..opts()
            },
            &mut NoProgress,
        )
        .unwrap();

    let patch_opts = InstallOptions {
        package: Some("patch".to_string()),
        overwrite: true,
        ..opts()
    };
    let plan = installer.preflight(&patch, &ledger, &patch_opts).unwrap();
    assert_eq!(plan.conflicts.len(), 1);
    assert_eq!(plan.conflicts[0].file, "shared/b.dds");

    installer
        .install(&patch, &mut ledger, &patch_opts, &mut NoProgress)
        .unwrap();
    assert_eq!(ledger.owner_of("shared/b.dds"), Some("patch"));
    assert!(!ledger.installed_files("base").unwrap().contains("shared/b.dds"));
    // the replaced folder took base's other file with it
    assert!(!env.root.join("shared/a.dds").exists());
    assert!(ledger.installed_files("base").unwrap().is_empty());
    assert!(ledger.owner_of("shared/a.dds").is_none());
    assert!(ledger.verify_consistency().is_empty());

    let report = installer
        .remove_files("patch", &["shared/b.dds"], &mut ledger)
        .unwrap();
    assert_eq!(report.removed, 1);
    assert!(ledger.installed_files("patch").unwrap().is_empty());
    assert!(ledger.owner_of("shared/b.dds").is_none());
}

#[test]
fn test_corrupt_ledger_degrades_to_empty() {
    let env = Env::new();
    fs::create_dir_all(&env.root).unwrap();
    fs::write(env.ledger_path(), b"\"just a string\"").unwrap();

    let mut ledger = OwnershipLedger::open(env.ledger_path());
    assert!(ledger.is_empty());

    let archive = env.archive("foo.zip", &[("bar/texture.dds", b"t")]);
    env.installer()
        .install(&archive, &mut ledger, &opts(), &mut NoProgress)
        .unwrap();

    let reloaded = OwnershipLedger::load(env.ledger_path()).unwrap();
    assert_eq!(reloaded.owner_of("bar/texture.dds"), Some("bar"));
}
