//! Shared fixture for integration tests.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;

use smbshare::events::EventBus;
use smbshare::host::{RootMapFiles, RootMapping, StaticUsers};
use smbshare::process::mock::MockRunner;
use smbshare::store::Store;
use smbshare::{Samba, SambaSettings};
use tempfile::TempDir;

/// A `Samba` wired to a temp directory tree, an in-memory store and a mock
/// command runner.
///
/// Virtual roots: `/Home` -> `<tmp>/home`, `/Data` -> `<tmp>/data`.
pub struct TestServer {
    pub temp: TempDir,
    pub runner: MockRunner,
    pub events: EventBus,
    pub samba: Arc<Samba>,
}

impl TestServer {
    pub fn new() -> Self {
        Self::with_runner(MockRunner::new())
    }

    pub fn with_runner(runner: MockRunner) -> Self {
        let temp = TempDir::new().expect("temp dir");
        std::fs::create_dir_all(temp.path().join("home")).unwrap();
        std::fs::create_dir_all(temp.path().join("data")).unwrap();

        let files = RootMapFiles::new(vec![
            RootMapping::new("/Home", temp.path().join("home")),
            RootMapping::new("/Data", temp.path().join("data")),
        ]);
        let settings = SambaSettings {
            config_path: temp.path().join("etc").join("samba").join("smb.conf"),
            share_password_path: temp.path().join("secrets").join("share-password"),
            product_name: "Homeserver".to_string(),
            home_path: "/Home".to_string(),
            service_account: "smbshare".to_string(),
            force_user: "root".to_string(),
            force_group: "smbshare".to_string(),
        };
        let events = EventBus::new();

        let samba = Arc::new(Samba::new(
            Arc::new(Store::open_in_memory().expect("store")),
            Arc::new(files),
            Arc::new(StaticUsers::new(Some("alice".to_string()))),
            Arc::new(runner.clone()),
            events.clone(),
            settings,
        ));

        Self {
            temp,
            runner,
            events,
            samba,
        }
    }

    /// Create a directory below the temp root, e.g. `data/Photos`.
    pub fn mkdir(&self, relative: &str) -> PathBuf {
        let path = self.temp.path().join(relative);
        std::fs::create_dir_all(&path).unwrap();
        path
    }

    pub fn system_path(&self, relative: &str) -> PathBuf {
        self.temp.path().join(relative)
    }

    /// Current contents of the rendered smb.conf.
    pub fn rendered_config(&self) -> String {
        std::fs::read_to_string(&self.samba.settings().config_path).expect("smb.conf")
    }

    pub fn registry_paths(&self) -> Vec<String> {
        self.samba
            .registry()
            .list()
            .unwrap()
            .into_iter()
            .map(|share| share.path)
            .collect()
    }
}
