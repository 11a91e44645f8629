// tests/plugin_loading.rs
//
// Plugin discovery is allow-list driven; a failing plugin never takes the
// workspace down with it.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use reprolab::{install_plugin, Lab, LabError, LabPlugin, LabRole};

struct CountingPlugin {
    name: &'static str,
    registrations: Arc<AtomicUsize>,
}

impl LabPlugin for CountingPlugin {
    fn name(&self) -> &str {
        self.name
    }

    fn register(&self, _lab: &mut Lab) -> reprolab::Result<()> {
        self.registrations.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct BrokenPlugin;

impl LabPlugin for BrokenPlugin {
    fn name(&self) -> &str {
        "broken"
    }

    fn register(&self, _lab: &mut Lab) -> reprolab::Result<()> {
        Err(LabError::Recipe("plugin exploded during register".into()))
    }
}

fn open_with_plugins(root: &std::path::Path, enabled: &[&str]) -> Lab {
    // Seed the workspace config with the allow-list before the first open.
    std::fs::create_dir_all(root).expect("mkdir");
    let doc = format!(
        "config_version: 1.0.0\nenabled_plugins: [{}]\n",
        enabled.join(", ")
    );
    std::fs::write(root.join("config.yaml"), doc).expect("write config");
    Lab::open(Some(root), None, None, None, LabRole::Admin).expect("open lab")
}

#[test]
fn only_allow_listed_plugins_register() {
    let registrations = Arc::new(AtomicUsize::new(0));
    install_plugin(Arc::new(CountingPlugin {
        name: "counting",
        registrations: Arc::clone(&registrations),
    }));
    install_plugin(Arc::new(CountingPlugin {
        name: "dormant",
        registrations: Arc::new(AtomicUsize::new(0)),
    }));

    let tmp = tempfile::tempdir().expect("tempdir");
    let lab = open_with_plugins(&tmp.path().join("ws"), &["counting"]);

    assert_eq!(registrations.load(Ordering::SeqCst), 1);
    assert_eq!(lab.plugin_registry().plugin_names(), vec!["counting"]);
    assert!(lab.plugin_registry().get_plugin("dormant").is_none());
}

#[test]
fn broken_plugin_is_swallowed_and_others_load() {
    let registrations = Arc::new(AtomicUsize::new(0));
    install_plugin(Arc::new(BrokenPlugin));
    install_plugin(Arc::new(CountingPlugin {
        name: "survivor",
        registrations: Arc::clone(&registrations),
    }));

    let tmp = tempfile::tempdir().expect("tempdir");
    let lab = open_with_plugins(&tmp.path().join("ws"), &["broken", "survivor"]);

    // The workspace opened despite the failing register hook.
    assert_eq!(registrations.load(Ordering::SeqCst), 1);
    assert!(lab.plugin_registry().get_plugin("survivor").is_some());
}

#[test]
fn enabling_an_uninstalled_plugin_is_skipped() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let lab = open_with_plugins(&tmp.path().join("ws"), &["no_such_plugin"]);
    assert!(lab.plugin_registry().plugin_names().is_empty());
}
