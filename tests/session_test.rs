//! Integration tests for Session: tree operations, transforms, loading and
//! the error subtree.

use std::fs;
use std::path::Path;

use rstest::rstest;
use tempfile::TempDir;

use augtree::config::Settings;
use augtree::domain::ErrorCode;
use augtree::infrastructure::di::ServiceContainer;
use augtree::util::testing::init_test_setup;
use augtree::{AugError, Flags, OpenOptions, Session};

const HOSTS: &str = "127.0.0.1 localhost\n192.168.0.1 gateway gw\n";

fn write_file(root: &Path, file: &str, content: &str) {
    let path = root.join(file.trim_start_matches('/'));
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn open(root: &Path, flags: Flags) -> Session {
    init_test_setup();
    let container = ServiceContainer::new(Settings::default());
    Session::open_with(
        OpenOptions::new()
            .root(root)
            .flags(flags | Flags::NO_MODL_AUTOLOAD),
        container,
    )
    .expect("open session")
}

fn open_with_hosts(flags: Flags) -> (TempDir, Session) {
    let tmp = TempDir::new().unwrap();
    write_file(tmp.path(), "/etc/hosts", HOSTS);
    let mut aug = open(tmp.path(), flags);
    aug.register_transform(None, "Hosts.lns", &["/etc/hosts"], &[])
        .unwrap();
    aug.load().unwrap();
    (tmp, aug)
}

// ============================================================
// Load / save scenarios
// ============================================================

#[test]
fn given_hosts_transform_when_loading_then_first_entry_address_readable() {
    let (_tmp, mut aug) = open_with_hosts(Flags::NONE);

    assert_eq!(
        aug.get("/files/etc/hosts/1/ipaddr").unwrap(),
        Some("127.0.0.1".to_string())
    );
    assert_eq!(
        aug.get("/files/etc/hosts/2/alias").unwrap(),
        Some("gw".to_string())
    );
    assert_eq!(
        aug.get("/augeas/files/etc/hosts/lens").unwrap(),
        Some("Hosts.lns".to_string())
    );
}

#[test]
fn given_modified_address_when_saved_and_reloaded_then_new_value_persists() {
    let (tmp, mut aug) = open_with_hosts(Flags::NONE);

    aug.set("/files/etc/hosts/1/ipaddr", Some("10.0.0.9")).unwrap();
    aug.save().unwrap();
    aug.load().unwrap();

    assert_eq!(
        aug.get("/files/etc/hosts/1/ipaddr").unwrap(),
        Some("10.0.0.9".to_string())
    );
    let on_disk = fs::read_to_string(tmp.path().join("etc/hosts")).unwrap();
    assert_eq!(on_disk, "10.0.0.9\tlocalhost\n192.168.0.1 gateway gw\n");
}

#[test]
fn given_load_on_open_with_autoload_when_opening_then_default_transforms_loaded() {
    init_test_setup();
    let tmp = TempDir::new().unwrap();
    write_file(tmp.path(), "/etc/hosts", HOSTS);

    let mut aug = Session::open_with(
        OpenOptions::new().root(tmp.path()),
        ServiceContainer::new(Settings::default()),
    )
    .unwrap();

    assert_eq!(
        aug.get("/augeas/load/Hosts/lens").unwrap(),
        Some("Hosts.lns".to_string())
    );
    assert_eq!(
        aug.get("/files/etc/hosts/1/canonical").unwrap(),
        Some("localhost".to_string())
    );
}

#[test]
fn given_no_load_flag_when_opening_then_files_empty_until_load() {
    init_test_setup();
    let tmp = TempDir::new().unwrap();
    write_file(tmp.path(), "/etc/hosts", HOSTS);

    let mut aug = Session::open_with(
        OpenOptions::new().root(tmp.path()).flags(Flags::NO_LOAD),
        ServiceContainer::new(Settings::default()),
    )
    .unwrap();
    assert!(aug.matches("/files/*").unwrap().is_empty());

    aug.load().unwrap();
    assert_eq!(aug.matches("/files/etc/hosts").unwrap(), vec!["/files/etc/hosts"]);
}

#[test]
fn given_two_transforms_claiming_file_when_loading_then_mxfm_recorded_and_others_load() {
    let tmp = TempDir::new().unwrap();
    write_file(tmp.path(), "/etc/hosts", HOSTS);
    write_file(tmp.path(), "/etc/environment", "LANG=C\n");
    let mut aug = open(tmp.path(), Flags::NONE);
    aug.register_transform(Some("A"), "Hosts.lns", &["/etc/hosts"], &[])
        .unwrap();
    aug.register_transform(
        Some("B"),
        "Shellvars.lns",
        &["/etc/hosts", "/etc/environment"],
        &[],
    )
    .unwrap();

    aug.load().unwrap();

    assert!(aug.matches("/files/etc/hosts").unwrap().is_empty());
    assert_eq!(
        aug.get("/files/etc/environment/LANG").unwrap(),
        Some("C".to_string())
    );
    assert_eq!(
        aug.get("/augeas/files/etc/hosts/error").unwrap(),
        Some("mxfm_load".to_string())
    );
    let errors = aug.file_errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].0, "/etc/hosts");
    assert!(matches!(&errors[0].1, AugError::MultipleTransforms(msg) if msg.contains("Hosts.lns")));
}

#[test]
fn given_unparseable_file_when_loading_then_parse_error_recorded_with_position() {
    let tmp = TempDir::new().unwrap();
    write_file(tmp.path(), "/etc/hosts", "127.0.0.1 localhost\n10.0.0.1\n");
    let mut aug = open(tmp.path(), Flags::NONE);
    aug.register_transform(None, "Hosts.lns", &["/etc/hosts"], &[])
        .unwrap();

    aug.load().unwrap();

    assert_eq!(
        aug.get("/augeas/files/etc/hosts/error").unwrap(),
        Some("parse_failed".to_string())
    );
    assert_eq!(
        aug.get("/augeas/files/etc/hosts/error/line").unwrap(),
        Some("2".to_string())
    );
    assert_eq!(
        aug.get("/augeas/files/etc/hosts/error/char").unwrap(),
        Some("9".to_string())
    );
}

#[test]
fn given_unknown_lens_when_loading_then_lens_not_found_recorded() {
    let tmp = TempDir::new().unwrap();
    write_file(tmp.path(), "/etc/hosts", HOSTS);
    let mut aug = open(tmp.path(), Flags::NONE);
    aug.register_transform(None, "Nope.lns", &["/etc/hosts"], &[])
        .unwrap();

    aug.load().unwrap();

    let errors = aug.file_errors();
    assert!(matches!(&errors[..], [(file, AugError::LensNotFound(_))] if file == "/etc/hosts"));
}

#[test]
fn given_cleared_transforms_when_loading_then_files_subtree_empty() {
    let (_tmp, mut aug) = open_with_hosts(Flags::NONE);
    assert!(!aug.matches("/files/*").unwrap().is_empty());

    aug.clear_transforms().unwrap();
    aug.load().unwrap();

    assert!(aug.matches("/files/*").unwrap().is_empty());
    assert!(aug.matches("/augeas/load/*").unwrap().is_empty());
}

#[test]
fn given_registered_transform_when_reading_load_subtree_then_projection_matches() {
    let tmp = TempDir::new().unwrap();
    let mut aug = open(tmp.path(), Flags::NONE);

    aug.register_transform(Some("Hosts"), "Hosts.lns", &["/etc/hosts"], &["*.bak"])
        .unwrap();
    aug.transform("Hosts.lns", "/etc/hosts.local", false).unwrap();

    assert_eq!(
        aug.matches("/augeas/load/Hosts/incl").unwrap(),
        vec!["/augeas/load/Hosts/incl[1]", "/augeas/load/Hosts/incl[2]"]
    );
    assert_eq!(
        aug.get("/augeas/load/Hosts/excl").unwrap(),
        Some("*.bak".to_string())
    );
    assert!(aug.remove_transform("Hosts").unwrap());
    assert!(aug.matches("/augeas/load/Hosts").unwrap().is_empty());
}

#[test]
fn given_empty_include_when_registering_then_argument_error_and_record_untouched() {
    let tmp = TempDir::new().unwrap();
    let mut aug = open(tmp.path(), Flags::NONE);
    let _ = aug.get("/files/nope");

    let err = aug
        .register_transform(None, "Hosts.lns", &[], &[])
        .unwrap_err();

    assert!(matches!(err, AugError::Argument(_)));
    assert_eq!(aug.error_record().code, ErrorCode::NoMatch);
}

// ============================================================
// Path operations
// ============================================================

#[rstest]
#[case("/files/a", "1")]
#[case("/files/a/b/c", "deep")]
#[case("x/y", "relative")]
#[case("/files/a/b[1]", "positional")]
fn given_path_when_set_then_get_returns_value(#[case] path: &str, #[case] value: &str) {
    let tmp = TempDir::new().unwrap();
    let mut aug = open(tmp.path(), Flags::NONE);

    aug.set(path, Some(value)).unwrap();

    assert_eq!(aug.get(path).unwrap(), Some(value.to_string()));
}

#[test]
fn given_relative_path_when_set_then_created_below_context() {
    let tmp = TempDir::new().unwrap();
    let mut aug = open(tmp.path(), Flags::NONE);

    aug.set("a/b", Some("1")).unwrap();

    assert_eq!(aug.get("/files/a/b").unwrap(), Some("1".to_string()));
}

#[test]
fn given_two_appends_when_setting_last_plus_one_then_two_nodes_in_order() {
    let tmp = TempDir::new().unwrap();
    let mut aug = open(tmp.path(), Flags::NONE);

    aug.set("a/b[last()+1]", Some("v1")).unwrap();
    aug.set("a/b[last()+1]", Some("v2")).unwrap();

    assert_eq!(
        aug.matches("/files/a/b").unwrap(),
        vec!["/files/a/b[1]", "/files/a/b[2]"]
    );
    assert_eq!(aug.get("/files/a/b[1]").unwrap(), Some("v1".to_string()));
    assert_eq!(aug.get("/files/a/b[2]").unwrap(), Some("v2".to_string()));
}

#[test]
fn given_removed_nodes_when_matching_then_empty_and_count_includes_descendants() {
    let tmp = TempDir::new().unwrap();
    let mut aug = open(tmp.path(), Flags::NONE);
    aug.set("/files/a/x", Some("1")).unwrap();
    aug.set("/files/a/y", Some("2")).unwrap();

    assert_eq!(aug.rm("/files/a").unwrap(), 3);
    assert!(aug.matches("/files/a").unwrap().is_empty());
    assert_eq!(aug.rm("/files/a").unwrap(), 0);
}

#[test]
fn given_zero_results_when_matching_then_no_error_but_invalid_path_raises() {
    let tmp = TempDir::new().unwrap();
    let mut aug = open(tmp.path(), Flags::NONE);

    assert!(aug.matches("/files/nothing/here").unwrap().is_empty());
    assert!(matches!(
        aug.matches("/files/a["),
        Err(AugError::InvalidPath(_))
    ));
    assert_eq!(aug.error_record().code, ErrorCode::PathX);
}

#[test]
fn given_ambiguous_or_missing_path_when_getting_then_structural_errors() {
    let tmp = TempDir::new().unwrap();
    let mut aug = open(tmp.path(), Flags::NONE);
    aug.set("/files/a[last()+1]", Some("1")).unwrap();
    aug.set("/files/a[last()+1]", Some("2")).unwrap();

    assert!(matches!(aug.get("/files/a"), Err(AugError::MultipleMatches(_))));
    assert!(matches!(aug.get("/files/b"), Err(AugError::NoMatch(_))));
    assert!(matches!(aug.set("/files/a", Some("x")), Err(AugError::MultipleMatches(_))));
}

#[test]
fn given_matching_bases_when_setm_then_sub_node_set_below_each() {
    let tmp = TempDir::new().unwrap();
    let mut aug = open(tmp.path(), Flags::NONE);
    aug.set("/files/h/1/v", Some("a")).unwrap();
    aug.set("/files/h/2/v", Some("b")).unwrap();
    aug.set("/files/h/3", None).unwrap();

    let changed = aug.setm("/files/h/*", Some("v"), Some("z")).unwrap();

    assert_eq!(changed, 3);
    for n in 1..=3 {
        assert_eq!(aug.get(&format!("/files/h/{n}/v")).unwrap(), Some("z".to_string()));
    }
}

#[test]
fn given_node_when_clearing_then_value_none_but_node_kept() {
    let tmp = TempDir::new().unwrap();
    let mut aug = open(tmp.path(), Flags::NONE);
    aug.set("/files/a", Some("1")).unwrap();

    aug.clear("/files/a").unwrap();

    assert_eq!(aug.get("/files/a").unwrap(), None);
    assert_eq!(aug.matches("/files/a").unwrap(), vec!["/files/a"]);
}

#[test]
fn given_sibling_when_inserting_then_placed_before_or_after() {
    let tmp = TempDir::new().unwrap();
    let mut aug = open(tmp.path(), Flags::NONE);
    aug.set("/files/a/x", Some("1")).unwrap();

    aug.insert("/files/a/x", "before", true).unwrap();
    aug.insert("/files/a/x", "after", false).unwrap();

    assert_eq!(
        aug.matches("/files/a/*").unwrap(),
        vec!["/files/a/before", "/files/a/x", "/files/a/after"]
    );
}

#[test]
fn given_node_when_moving_copying_and_renaming_then_tree_updated() {
    let tmp = TempDir::new().unwrap();
    let mut aug = open(tmp.path(), Flags::NONE);
    aug.set("/files/a/x", Some("1")).unwrap();

    aug.mv("/files/a/x", "/files/b").unwrap();
    assert!(aug.matches("/files/a/x").unwrap().is_empty());
    assert_eq!(aug.get("/files/b").unwrap(), Some("1".to_string()));

    aug.cp("/files/b", "/files/c").unwrap();
    assert_eq!(aug.get("/files/c").unwrap(), Some("1".to_string()));
    assert_eq!(aug.get("/files/b").unwrap(), Some("1".to_string()));

    assert_eq!(aug.rename("/files/c", "d").unwrap(), 1);
    assert_eq!(aug.label("/files/d").unwrap(), Some("d".to_string()));
    assert_eq!(aug.label("/").unwrap(), None);
}

#[test]
fn given_node_when_moving_or_copying_into_own_subtree_then_descendant_errors() {
    let tmp = TempDir::new().unwrap();
    let mut aug = open(tmp.path(), Flags::NONE);
    aug.set("/files/a/y", Some("1")).unwrap();

    assert!(matches!(aug.mv("/files/a", "/files/a/y"), Err(AugError::Descendant(_))));
    assert!(matches!(aug.cp("/files/a", "/files/a/y/z"), Err(AugError::CopyDescendant(_))));
    assert!(aug.matches("/files/a/y/z").unwrap().is_empty());
}

#[test]
fn given_invalid_label_when_renaming_then_label_error() {
    let tmp = TempDir::new().unwrap();
    let mut aug = open(tmp.path(), Flags::NONE);
    aug.set("/files/a", Some("1")).unwrap();

    assert!(matches!(aug.rename("/files/a", "x/y"), Err(AugError::Label(_))));
    assert_eq!(aug.error_record().code, ErrorCode::Label);
}

#[test]
fn given_subtree_when_printing_then_path_value_lines() {
    let tmp = TempDir::new().unwrap();
    let mut aug = open(tmp.path(), Flags::NONE);
    aug.set("/files/a/x", Some("1")).unwrap();

    assert_eq!(aug.print("/files/a").unwrap(), "/files/a\n/files/a/x = \"1\"\n");
    assert!(aug.tree_view("/files/a").unwrap().contains("x = \"1\""));
}

#[test]
fn given_absolute_context_when_set_then_relative_paths_resolve_against_it() {
    let (_tmp, mut aug) = open_with_hosts(Flags::NONE);

    aug.set_context("/files/etc/hosts").unwrap();
    assert_eq!(aug.get("1/ipaddr").unwrap(), Some("127.0.0.1".to_string()));

    assert!(matches!(aug.set_context("files"), Err(AugError::BadArgument(_))));
    assert_eq!(
        aug.get("/augeas/context").unwrap(),
        Some("/files/etc/hosts".to_string())
    );
}

// ============================================================
// Reserved subtree and error record
// ============================================================

#[rstest]
#[case::overwrite_value("/augeas/root")]
#[case::create_below("/augeas/extra")]
#[case::error_record("/augeas/error")]
fn given_augeas_subtree_when_writing_then_bad_argument(#[case] path: &str) {
    let tmp = TempDir::new().unwrap();
    let mut aug = open(tmp.path(), Flags::NONE);

    assert!(matches!(aug.set(path, Some("x")), Err(AugError::BadArgument(_))));
    assert_eq!(aug.error_record().code, ErrorCode::BadArg);
}

#[test]
fn given_augeas_subtree_when_removing_then_bad_argument_and_nothing_removed() {
    let tmp = TempDir::new().unwrap();
    let mut aug = open(tmp.path(), Flags::NONE);

    assert!(matches!(aug.rm("/augeas"), Err(AugError::BadArgument(_))));
    assert!(matches!(aug.rm("/*"), Err(AugError::BadArgument(_))));
    assert_eq!(aug.matches("/augeas").unwrap(), vec!["/augeas"]);
}

#[test]
fn given_failed_operation_when_reading_error_subtree_then_record_describes_it() {
    let tmp = TempDir::new().unwrap();
    let mut aug = open(tmp.path(), Flags::NONE);

    let err = aug.get("/files/missing").unwrap_err();

    let record = aug.error_record();
    assert_eq!(record.code, ErrorCode::NoMatch);
    assert!(record.details.as_deref().unwrap_or_default().contains("/files/missing"));
    assert_eq!(err.to_string(), record.full_message());
    // Reading the subtree sees the previous record, then replaces it
    assert_eq!(aug.get("/augeas/error").unwrap(), Some("nomatch".to_string()));
    assert_eq!(aug.error_record().code, ErrorCode::NoError);
}

#[test]
fn given_open_session_when_reading_meta_then_options_projected() {
    let tmp = TempDir::new().unwrap();
    let mut aug = open(tmp.path(), Flags::SAVE_BACKUP);

    assert_eq!(
        aug.get("/augeas/root").unwrap(),
        Some(tmp.path().to_string_lossy().into_owned())
    );
    assert_eq!(aug.get("/augeas/context").unwrap(), Some("/files".to_string()));
    assert_eq!(aug.get("/augeas/save").unwrap(), Some("backup".to_string()));
    assert_eq!(aug.get("/augeas/span").unwrap(), Some("disable".to_string()));
}

// ============================================================
// Spans and text lenses
// ============================================================

#[test]
fn given_span_flag_when_loading_then_span_points_into_file() {
    let (tmp, mut aug) = open_with_hosts(Flags::ENABLE_SPAN);

    let span = aug.span("/files/etc/hosts/1/canonical").unwrap();

    assert_eq!(
        span.filename,
        tmp.path().join("etc/hosts").to_string_lossy()
    );
    assert_eq!(&HOSTS[span.value.start..span.value.end], "localhost");
}

#[test]
fn given_no_span_flag_when_asking_span_then_no_span_info() {
    let (_tmp, mut aug) = open_with_hosts(Flags::NONE);

    assert!(matches!(
        aug.span("/files/etc/hosts/1/canonical"),
        Err(AugError::NoSpanInfo(_))
    ));
    assert_eq!(aug.error_record().code, ErrorCode::NoSpan);
}

#[test]
fn given_text_node_when_storing_and_retrieving_then_round_trips_through_lens() {
    let tmp = TempDir::new().unwrap();
    let mut aug = open(tmp.path(), Flags::NONE);
    aug.set("/work/in", Some("127.0.0.1 localhost\n")).unwrap();

    aug.text_store("Hosts.lns", "/work/in", "/work/tree").unwrap();
    assert_eq!(
        aug.get("/work/tree/1/canonical").unwrap(),
        Some("localhost".to_string())
    );

    aug.set("/work/tree/1/canonical", Some("box")).unwrap();
    aug.text_retrieve("Hosts.lns", "/work/in", "/work/tree", "/work/out")
        .unwrap();
    assert_eq!(aug.get("/work/out").unwrap(), Some("127.0.0.1\tbox\n".to_string()));
}

#[test]
fn given_bad_text_when_storing_then_lens_error_raised() {
    let tmp = TempDir::new().unwrap();
    let mut aug = open(tmp.path(), Flags::NONE);
    aug.set("/work/in", Some("not-an-address!\n")).unwrap();

    assert!(matches!(
        aug.text_store("Hosts.lns", "/work/in", "/work/tree"),
        Err(AugError::CommandExecution(_))
    ));
    assert!(matches!(
        aug.text_store("Missing.lns", "/work/in", "/work/tree"),
        Err(AugError::LensNotFound(_))
    ));
}

#[test]
fn given_flags_when_combined_then_bits_union() {
    let flags = Flags::SAVE_BACKUP | Flags::NO_LOAD;
    assert_eq!(flags.bits(), 33);
    assert!(flags.contains(Flags::NO_LOAD));
    assert!(!flags.contains(Flags::ENABLE_SPAN));
}
