use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use filetime::{set_file_mtime, FileTime};
use rstest::rstest;
use tempfile::TempDir;

use triad_core::{Depth, NullMonitor, Resource, SubscriberConfig};
use triad_fs::{FsError, FsWorkspace};
use triad_sync::{
    store::store_path_at, ChangeType, ConcurrencyCoordinator, Subscriber, SyncKind,
};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

const T0: i64 = 1_000_000_000;

struct Env {
    _tmp: TempDir,
    home: PathBuf,
    work: PathBuf,
    mirror: PathBuf,
}

impl Env {
    fn new() -> Self {
        let tmp = TempDir::new().expect("tempdir");
        let home = tmp.path().join("home");
        let work = tmp.path().join("work");
        let mirror = tmp.path().join("mirror");
        for dir in [&home, &work, &mirror] {
            fs::create_dir_all(dir).unwrap();
        }
        Self {
            _tmp: tmp,
            home,
            work,
            mirror,
        }
    }

    fn config(&self) -> SubscriberConfig {
        SubscriberConfig::new("work", self.work.clone(), self.mirror.clone())
    }

    fn open_with(&self, config: SubscriberConfig) -> FsWorkspace {
        FsWorkspace::open_at(&self.home, config, Arc::new(ConcurrencyCoordinator::new()))
            .expect("open workspace")
    }

    fn open(&self) -> FsWorkspace {
        self.open_with(self.config())
    }
}

fn write(path: &Path, content: &str, mtime: i64) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
    set_file_mtime(path, FileTime::from_unix_time(mtime, 0)).unwrap();
}

fn kind(ws: &FsWorkspace, path: &str) -> SyncKind {
    let resource = ws.resource(path).unwrap();
    ws.subscriber()
        .sync_info(&resource, &mut NullMonitor::new())
        .unwrap()
        .kind
}

fn paths(resources: &[Resource]) -> Vec<String> {
    resources.iter().map(|r| r.path.to_string()).collect()
}

/// Working copy and mirror agree on `p/A` and `p/B`, recorded as the base.
fn baselined(env: &Env) -> FsWorkspace {
    for root in [&env.work, &env.mirror] {
        write(&root.join("p/A"), "alpha", T0);
        write(&root.join("p/B"), "bravo", T0);
    }
    let ws = env.open();
    assert_eq!(ws.baseline(&mut NullMonitor::new()).unwrap(), 3);
    ws
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[test]
fn three_way_scenario_on_disk() {
    let env = Env::new();
    let ws = baselined(&env);

    write(&env.work.join("p/B"), "bravo, edited", T0 + 500);
    write(&env.work.join("p/C"), "charlie", T0 + 500);
    write(&env.mirror.join("p/B"), "bravo v2", T0 + 600);
    write(&env.mirror.join("p/D"), "delta", T0 + 600);

    let changed = ws
        .refresh(&[Resource::root()], Depth::Infinite, &mut NullMonitor::new())
        .unwrap();
    assert_eq!(paths(&changed), vec!["p/B", "p/D"]);

    assert_eq!(kind(&ws, "p/A"), SyncKind::InSync);
    assert_eq!(
        kind(&ws, "p/B"),
        SyncKind::Conflicting {
            change: ChangeType::Change,
            pseudo: false
        }
    );
    assert_eq!(kind(&ws, "p/C"), SyncKind::Outgoing(ChangeType::Addition));
    assert_eq!(kind(&ws, "p/D"), SyncKind::Incoming(ChangeType::Addition));

    let status: Vec<_> = ws
        .status(&mut NullMonitor::new())
        .unwrap()
        .into_iter()
        .map(|info| info.resource.path.to_string())
        .collect();
    assert_eq!(status, vec!["p/B", "p/C", "p/D"]);
}

#[test]
fn baseline_over_diverged_trees_keeps_the_difference_visible() {
    let env = Env::new();
    write(&env.work.join("p/A"), "alpha, edited locally", T0);
    write(&env.mirror.join("p/A"), "alpha", T0);
    for root in [&env.work, &env.mirror] {
        write(&root.join("p/B"), "bravo", T0);
    }
    let ws = env.open();
    assert_eq!(ws.baseline(&mut NullMonitor::new()).unwrap(), 3);

    let changed = ws
        .refresh(&[Resource::root()], Depth::Infinite, &mut NullMonitor::new())
        .unwrap();
    assert_eq!(paths(&changed), vec!["p/A"]);
    assert_eq!(kind(&ws, "p/A"), SyncKind::Incoming(ChangeType::Change));
    assert_eq!(kind(&ws, "p/B"), SyncKind::InSync);

    let status: Vec<_> = ws
        .status(&mut NullMonitor::new())
        .unwrap()
        .into_iter()
        .map(|info| info.resource.path.to_string())
        .collect();
    assert_eq!(status, vec!["p/A"]);
}

#[test]
fn second_refresh_reports_nothing() {
    let env = Env::new();
    let ws = baselined(&env);
    write(&env.mirror.join("p/D"), "delta", T0);

    let first = ws
        .refresh(&[Resource::root()], Depth::Infinite, &mut NullMonitor::new())
        .unwrap();
    assert_eq!(paths(&first), vec!["p/D"]);
    let second = ws
        .refresh(&[Resource::root()], Depth::Infinite, &mut NullMonitor::new())
        .unwrap();
    assert!(second.is_empty());
}

#[test]
fn sync_state_survives_reopening() {
    let env = Env::new();
    let ws = baselined(&env);
    write(&env.mirror.join("p/D"), "delta", T0);
    ws.refresh(&[Resource::root()], Depth::Infinite, &mut NullMonitor::new())
        .unwrap();
    assert!(store_path_at(&env.home, "work").exists());
    drop(ws);

    let reopened = env.open();
    assert_eq!(kind(&reopened, "p/A"), SyncKind::InSync);
    assert_eq!(kind(&reopened, "p/D"), SyncKind::Incoming(ChangeType::Addition));
}

#[test]
fn local_deletion_is_outgoing() {
    let env = Env::new();
    let ws = baselined(&env);
    fs::remove_file(env.work.join("p/A")).unwrap();

    assert_eq!(kind(&ws, "p/A"), SyncKind::Outgoing(ChangeType::Deletion));
    let status = ws.status(&mut NullMonitor::new()).unwrap();
    assert_eq!(status.len(), 1);
    assert_eq!(status[0].resource, Resource::file("p/A"));
}

#[test]
fn remote_deletion_is_incoming_after_refresh() {
    let env = Env::new();
    let ws = baselined(&env);
    fs::remove_file(env.mirror.join("p/A")).unwrap();

    // Nothing fetched yet: the cached remote still equals the base.
    assert_eq!(kind(&ws, "p/A"), SyncKind::InSync);

    let changed = ws
        .refresh(&[Resource::container("p")], Depth::Infinite, &mut NullMonitor::new())
        .unwrap();
    assert_eq!(paths(&changed), vec!["p/A"]);
    assert_eq!(kind(&ws, "p/A"), SyncKind::Incoming(ChangeType::Deletion));
}

#[test]
fn base_revision_gone_from_mirror_counts_as_modified() {
    let env = Env::new();
    let ws = baselined(&env);
    // Local file touched but unchanged; the mirror moved on, so the base
    // content can no longer be read for comparison.
    write(&env.work.join("p/A"), "alpha", T0 + 10);
    write(&env.mirror.join("p/A"), "alpha v2", T0 + 20);
    ws.refresh(&[Resource::container("p")], Depth::Infinite, &mut NullMonitor::new())
        .unwrap();

    assert_eq!(
        kind(&ws, "p/A"),
        SyncKind::Conflicting {
            change: ChangeType::Change,
            pseudo: false
        }
    );
}

#[rstest]
#[case(true, SyncKind::InSync)]
#[case(false, SyncKind::Outgoing(ChangeType::Change))]
fn whitespace_only_edit(#[case] ignore_whitespace: bool, #[case] expected: SyncKind) {
    let env = Env::new();
    for root in [&env.work, &env.mirror] {
        write(&root.join("p/A"), "alpha beta", T0);
    }
    let mut config = env.config();
    config.ignore_whitespace = ignore_whitespace;
    let ws = env.open_with(config);
    ws.baseline(&mut NullMonitor::new()).unwrap();

    write(&env.work.join("p/A"), "alpha  beta\n", T0 + 5);
    assert_eq!(kind(&ws, "p/A"), expected);
}

#[test]
fn ignored_names_stay_out_of_status() {
    let env = Env::new();
    write(&env.work.join("p/keep.txt"), "k", T0);
    write(&env.work.join("p/scratch.tmp"), "s", T0);
    let mut config = env.config();
    config.ignore = vec!["*.tmp".into()];
    let ws = env.open_with(config);

    let status: Vec<_> = ws
        .status(&mut NullMonitor::new())
        .unwrap()
        .into_iter()
        .map(|info| info.resource.path.to_string())
        .collect();
    assert_eq!(status, vec!["p", "p/keep.txt"]);
    assert!(!ws.subscriber().is_supervised(&Resource::file("p/scratch.tmp")));
}

#[test]
fn resources_resolve_against_both_trees() {
    let env = Env::new();
    write(&env.work.join("p/local.txt"), "l", T0);
    write(&env.mirror.join("p/only/remote.txt"), "r", T0);
    let ws = env.open();

    assert_eq!(ws.resource("p").unwrap(), Resource::container("p"));
    assert_eq!(ws.resource("p/local.txt").unwrap(), Resource::file("p/local.txt"));
    assert_eq!(ws.resource("p/only").unwrap(), Resource::container("p/only"));
    assert_eq!(ws.resource("p/unknown").unwrap(), Resource::file("p/unknown"));
    assert_eq!(ws.resource("/").unwrap(), Resource::root());
    assert_eq!(ws.resource("p/../../local.txt").unwrap(), Resource::file("local.txt"));
}

#[test]
fn missing_root_is_rejected() {
    let env = Env::new();
    let config = SubscriberConfig::new("work", env.work.join("absent"), env.mirror.clone());
    let err = FsWorkspace::open_at(&env.home, config, Arc::new(ConcurrencyCoordinator::new()))
        .err()
        .expect("missing root");
    assert!(matches!(err, FsError::NotADirectory { role: "local", .. }));
}
